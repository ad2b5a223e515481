//! Semantic state: the single mutable record the IR generator accumulates
//! into while the syntax recognizer drives it (spec.md §3's "Semantic state").

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Shared handle threaded through every codegen action and FSM semantic
/// action — actions close over this rather than borrowing `&mut` directly,
/// since the same expression sub-FSM template is invoked from many call
/// sites.
pub type SharedState = Rc<RefCell<SemanticState>>;

/// One operand on the expression evaluator's stack: either a literal folded
/// at parse time or a register name produced by an emitted instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Literal(f64),
    Register(String),
    /// A variable reference pushed by `expr::variable` whose `load` hasn't
    /// been emitted yet — resolved into a `Register` the moment it's
    /// actually consumed (by an operator, a function call, or an
    /// expression finalizing), so a reference that turns out to be
    /// array-indexed never gets a spurious scalar load first.
    Unresolved(String),
}

impl ExprValue {
    pub fn as_literal(&self) -> Option<f64> {
        match self {
            ExprValue::Literal(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Literal(v) => write!(f, "{}", format_float(*v)),
            ExprValue::Register(r) => write!(f, "{}", r),
            ExprValue::Unresolved(name) => {
                panic!("ExprValue::Unresolved('{}') used before being resolved", name)
            }
        }
    }
}

/// LLVM floats print with at least one fractional digit (`1.` not `1`).
pub(crate) fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// One item queued by a PRINT statement, in source order.
#[derive(Debug, Clone)]
pub enum PrintParam {
    StringLiteral(String),
    Value(ExprValue),
}

/// An instruction in a function body: either finished text or a computation
/// deferred until every label/reference/data-array fact is known (spec.md §9).
pub enum Instruction {
    Literal(String),
    Deferred(Box<dyn Fn(&SemanticState) -> Option<String>>),
}

impl Instruction {
    pub fn deferred(f: impl Fn(&SemanticState) -> Option<String> + 'static) -> Self {
        Instruction::Deferred(Box::new(f))
    }

    fn resolve(&self, state: &SemanticState) -> Option<String> {
        match self {
            Instruction::Literal(s) => Some(s.clone()),
            Instruction::Deferred(f) => f(state),
        }
    }
}

const BLOCK_TERMINATORS: &[&str] = &[
    "ret", "br", "switch", "indirectbr", "invoke", "resume", "catchswitch", "catchret",
    "cleanupret", "unreachable",
];

pub(crate) fn is_block_terminator(instruction: &str) -> bool {
    instruction
        .trim_start()
        .split_whitespace()
        .next()
        .is_some_and(|opcode| BLOCK_TERMINATORS.contains(&opcode))
}

/// One generated function: `@program`, `@main`, and any `FN…` user function.
pub struct Function {
    pub name: String,
    pub return_type: &'static str,
    pub arguments: &'static str,
    pub attributes: &'static str,
    pub instructions: Vec<Instruction>,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: &'static str, arguments: &'static str, attributes: &'static str) -> Self {
        Function {
            name: name.into(),
            return_type,
            arguments,
            attributes,
            instructions: Vec::new(),
        }
    }

    pub fn append(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Whether the last *real* instruction already emitted is a block
    /// terminator — walking backward past comment lines (`REMARK`/`REM`
    /// lower to a `;`-prefixed `Literal`) and `Deferred` slots (a label's
    /// own branch/header entries, which may resolve to nothing) to find the
    /// semantically-preceding instruction, rather than trusting whatever
    /// happens to sit last in the unresolved stream.
    pub fn ends_with_terminator(&self) -> bool {
        for instruction in self.instructions.iter().rev() {
            match instruction {
                Instruction::Literal(s) if s.starts_with(';') => continue,
                Instruction::Literal(s) => return is_block_terminator(s),
                Instruction::Deferred(_) => continue,
            }
        }
        false
    }

    /// Resolves every deferred instruction against the final state, drops
    /// the ones that resolved to nothing, and synthesizes a terminator if
    /// the body still doesn't end with one.
    pub fn to_ll(&self, final_state: &SemanticState) -> String {
        let mut instructions: Vec<String> = self
            .instructions
            .iter()
            .filter_map(|i| i.resolve(final_state))
            .collect();

        if instructions.is_empty() {
            return format!(
                "; {} @{}({}) omitted because it's empty",
                self.return_type, self.name, self.arguments
            );
        }
        if !is_block_terminator(instructions.last().unwrap()) {
            instructions.push("tail call void @exit(i32 0) noreturn #0".to_string());
            instructions.push("unreachable".to_string());
        }

        let body = instructions
            .iter()
            .map(|x| if x.ends_with(':') { x.clone() } else { format!("  {}", x) })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "define dso_local {} @{}({}) local_unnamed_addr {} {{\n{}\n}}",
            self.return_type, self.name, self.arguments, self.attributes, body
        )
    }
}

/// Tracks one open `FOR` loop; popped by its matching `NEXT`.
pub struct ForContext {
    pub variable: String,
    pub end: Option<ExprValue>,
    pub end_global: Option<String>,
    pub step: Option<ExprValue>,
    pub step_global: Option<String>,
    pub header_label: Option<i64>,
}

impl ForContext {
    pub fn new(variable: String) -> Self {
        ForContext {
            variable,
            end: None,
            end_global: None,
            step: None,
            step_global: None,
            header_label: None,
        }
    }
}

/// The single mutable record the IR generator accumulates into. Owned by
/// `LlvmIrGenerator`; every statement-lowering and expression action takes a
/// `&mut SemanticState` (via `SharedState`'s `RefCell`).
pub struct SemanticState {
    pub filename: String,
    pub exp_result: Option<ExprValue>,
    pub functions: Vec<Function>,
    pub current_function: usize,
    pub referenced_functions: HashSet<String>,
    pub entry_point: Option<i64>,
    pub defined_labels: HashSet<i64>,
    pub goto_targets: HashSet<i64>,
    pub gosub_targets: HashSet<i64>,
    pub const_data: Vec<f64>,
    uid_count: i64,
    pub has_read: bool,
    pub variables: HashSet<String>,
    pub private_globals: Vec<String>,
    pub external_symbols: BTreeSet<&'static str>,
    pub loaded_variables: HashMap<String, String>,
    pub print_parameters: Vec<PrintParam>,
    pub variable_dimensions: HashMap<String, Vec<i64>>,
    pub for_context: Vec<ForContext>,
    pub operator_queue: Vec<String>,
    pub operand_queue: Vec<ExprValue>,

    // Transient per-statement scratch.
    pub if_left: Option<ExprValue>,
    pub if_cond: Option<&'static str>,
    pub if_cond_register: Option<String>,
    pub lvalue_variable: Option<String>,
    pub lvalue_dimensions: Vec<ExprValue>,
    pub lvalue_ptr: Option<String>,
    pub pending_data_sign: f64,
}

impl SemanticState {
    pub fn new(filename: impl Into<String>) -> Self {
        SemanticState {
            filename: filename.into(),
            exp_result: None,
            functions: Vec::new(),
            current_function: 0,
            referenced_functions: HashSet::new(),
            entry_point: None,
            defined_labels: HashSet::new(),
            goto_targets: HashSet::new(),
            gosub_targets: HashSet::new(),
            const_data: Vec::new(),
            uid_count: -1,
            has_read: false,
            variables: HashSet::new(),
            private_globals: Vec::new(),
            external_symbols: BTreeSet::new(),
            loaded_variables: HashMap::new(),
            print_parameters: Vec::new(),
            variable_dimensions: HashMap::new(),
            for_context: Vec::new(),
            operator_queue: Vec::new(),
            operand_queue: Vec::new(),
            if_left: None,
            if_cond: None,
            if_cond_register: None,
            lvalue_variable: None,
            lvalue_dimensions: Vec::new(),
            lvalue_ptr: None,
            pending_data_sign: 1.0,
        }
    }

    pub fn uid(&mut self) -> i64 {
        self.uid_count += 1;
        self.uid_count
    }

    pub fn append_instruction(&mut self, instruction: impl Into<String>) {
        self.functions[self.current_function].append(Instruction::Literal(instruction.into()));
    }

    pub fn append_deferred(&mut self, f: impl Fn(&SemanticState) -> Option<String> + 'static) {
        self.functions[self.current_function].append(Instruction::deferred(f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_float_keeps_a_trailing_dot_on_whole_numbers() {
        assert_eq!(format_float(1.0), "1.");
        assert_eq!(format_float(-3.0), "-3.");
        assert_eq!(format_float(2.5), "2.5");
    }

    #[test]
    fn block_terminator_recognizes_ret_and_br() {
        assert!(is_block_terminator("ret void"));
        assert!(is_block_terminator("  br label %next"));
        assert!(!is_block_terminator("%x = fadd fast double 1., 2."));
    }

    #[test]
    fn empty_function_is_elided_as_a_comment() {
        let state = SemanticState::new("t.bas");
        let f = Function::new("program", "void", "", "#0");
        let ll = f.to_ll(&state);
        assert!(ll.starts_with(';'), "expected an elided-function comment, got {}", ll);
    }

    #[test]
    fn non_terminated_body_gets_a_synthesized_exit() {
        let state = SemanticState::new("t.bas");
        let mut f = Function::new("main", "i32", "", "#0");
        f.append(Instruction::Literal("%x = fadd fast double 1., 2.".to_string()));
        let ll = f.to_ll(&state);
        assert!(ll.contains("call void @exit(i32 0)"));
        assert!(ll.trim_end().ends_with("unreachable\n}"));
    }
}
