//! The shunting-yard expression evaluator (spec.md §4.4), grounded in the
//! original `semantic/Exp.py`. Operates on the operator/operand stacks held
//! in [`SemanticState`]; every function here is a semantic action invoked
//! from the expression sub-FSM built in `crate::syntax::expression`.

use super::state::{ExprValue, SemanticState};

pub fn to_double(text: &str) -> Result<f64, String> {
    text.parse::<f64>().map_err(|_| format!("Not a valid double: {}", text))
}

/// Low to high: `+ -` < `* /` < `^` < unary minus < function call < `(`.
fn operator_priority(operator: &str) -> u8 {
    if operator.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return 4;
    }
    match operator {
        "+" | "-" => 0,
        "*" | "/" => 1,
        "^" | "\u{2191}" => 2,
        "-u" => 3,
        "(" => 5,
        other => panic!("operator_priority: unknown operator '{}'", other),
    }
}

fn is_unary_negative(state: &mut SemanticState) -> bool {
    if state.operator_queue.last().map(String::as_str) == Some("-u") {
        state.operator_queue.pop();
        true
    } else {
        false
    }
}

/// A `-` where a prefix sign is grammatical: toggles unary-minus on/off so
/// two adjacent minus signs cancel.
pub fn negative_expression(state: &mut SemanticState) {
    if !is_unary_negative(state) {
        state.operator_queue.push("-u".to_string());
    }
}

pub fn number(state: &mut SemanticState, text: &str) -> Result<(), String> {
    let mut value = to_double(text)?;
    if is_unary_negative(state) {
        value = -value;
    }
    state.operand_queue.push(ExprValue::Literal(value));
    Ok(())
}

/// Opens a grouping or function-call scope. Bypasses [`operator`]'s priority
/// check entirely — `(` is never reduced on arrival, only ever popped by
/// [`end_expression`].
pub fn open_paren(state: &mut SemanticState) {
    state.operator_queue.push("(".to_string());
}

pub fn variable(state: &mut SemanticState, name: &str) {
    let name = name.to_uppercase();
    state.variables.insert(name.clone());
    state.operand_queue.push(ExprValue::Unresolved(name));
}

/// Closes one array-index dimension: reduces it down to the `(`/`,` boundary
/// `crate::syntax::expression` pushed when this dimension started, resolves
/// it, and stashes it (behind a `,` sentinel) for `end_of_variable` to
/// collect once the whole index list closes.
pub fn variable_dimension(state: &mut SemanticState) -> Result<(), String> {
    evaluate_scope(state)?;
    state.operator_queue.pop();
    let value = state.operand_queue.pop().expect("dimension expression produced no operand");
    let value = resolve(state, value)?;
    state.operator_queue.push(",".to_string());
    state.operand_queue.push(value);
    Ok(())
}

/// Closes an indexed (or bare) variable reference into a loaded value.
/// Called for every variable occurrence, indexed or not — a bare scalar
/// reference just collects zero dimensions.
pub fn end_of_variable(state: &mut SemanticState) -> Result<(), String> {
    let mut dimensions = Vec::new();
    while state.operator_queue.last().map(String::as_str) == Some(",") {
        state.operator_queue.pop();
        dimensions.insert(0, state.operand_queue.pop().expect("dimension operand missing"));
    }
    let variable = match state.operand_queue.pop() {
        Some(ExprValue::Unresolved(name)) => name,
        other => return Err(format!("expected a variable reference, found {:?}", other)),
    };

    let register = if let Some(reg) = state.loaded_variables.get(&variable).cloned() {
        reg
    } else {
        let reg = format!("%{}_{}", variable, state.uid());
        let ptr = super::globals::variable_pointer(state, &variable, &dimensions)?;
        state.append_instruction(format!("{} = load double, {}", reg, ptr));
        reg
    };
    state.operand_queue.push(ExprValue::Register(register));
    Ok(())
}

/// Resolves a bare variable reference into its loaded register on first
/// actual use — the common path for a scalar variable that never goes
/// through `end_of_variable` because no `(` ever followed it.
fn resolve(state: &mut SemanticState, operand: ExprValue) -> Result<ExprValue, String> {
    match operand {
        ExprValue::Unresolved(name) => {
            state.operand_queue.push(ExprValue::Unresolved(name));
            end_of_variable(state)?;
            Ok(state.operand_queue.pop().unwrap())
        }
        other => Ok(other),
    }
}

fn negate(state: &mut SemanticState, operand: ExprValue) -> Result<ExprValue, String> {
    match resolve(state, operand)? {
        ExprValue::Literal(v) => Ok(ExprValue::Literal(-v)),
        ExprValue::Register(r) => {
            let negated = format!("{}_neg", r);
            state.append_instruction(format!("{} = fsub fast double 0., {}", negated, r));
            Ok(ExprValue::Register(negated))
        }
        ExprValue::Unresolved(_) => unreachable!("resolve always returns a Literal or Register"),
    }
}

fn evaluate_expression(state: &mut SemanticState) -> Result<(), String> {
    if is_unary_negative(state) {
        let operand = state.operand_queue.pop().expect("unary minus with no operand");
        let result = negate(state, operand)?;
        state.operand_queue.push(result);
        return Ok(());
    }

    let operator = state.operator_queue.pop().expect("evaluate_expression with empty operator queue");
    let operand_2 = state.operand_queue.pop().expect("missing rhs operand");
    let operand_1 = state.operand_queue.pop().expect("missing lhs operand");
    let operand_1 = resolve(state, operand_1)?;
    let operand_2 = resolve(state, operand_2)?;

    let register = if operator == "^" || operator == "\u{2191}" {
        state.external_symbols.insert("llvm.pow.f64");
        let reg = format!("%pow_{}", state.uid());
        state.append_instruction(format!(
            "{} = tail call fast double @llvm.pow.f64(double {}, double {}) #0",
            reg, operand_1, operand_2
        ));
        reg
    } else {
        let opcode = match operator.as_str() {
            "+" => "fadd",
            "-" => "fsub",
            "*" => "fmul",
            "/" => "fdiv",
            other => return Err(format!("unknown binary operator: {}", other)),
        };
        let reg = format!("%{}_{}", opcode, state.uid());
        state.append_instruction(format!("{} = {} fast double {}, {}", reg, opcode, operand_1, operand_2));
        reg
    };
    state.operand_queue.push(ExprValue::Register(register));
    Ok(())
}

/// Reduces operators down to (but not past) an open `(`, if one is pending.
fn evaluate_scope(state: &mut SemanticState) -> Result<(), String> {
    while let Some(top) = state.operator_queue.last() {
        if top == "(" {
            return Ok(());
        }
        evaluate_expression(state)?;
    }
    Ok(())
}

/// Pushes a new operator, first reducing anything of equal-or-higher
/// priority already pending (shunting yard's core step).
pub fn operator(state: &mut SemanticState, op: &str) -> Result<(), String> {
    if let Some(top) = state.operator_queue.last().cloned() {
        if operator_priority(op) <= operator_priority(&top) {
            evaluate_scope(state)?;
        }
    }
    state.operator_queue.push(op.to_uppercase());
    Ok(())
}

/// Ends an expression scope: a nested `(...)` group closing, or the whole
/// expression reaching its terminator. Reduces to the enclosing `(` (which
/// is then dropped) or, if there is none, finalizes `exp_result`.
pub fn end_expression(state: &mut SemanticState) -> Result<(), String> {
    evaluate_scope(state)?;
    if state.operator_queue.pop().is_none() {
        let result = state.operand_queue.pop().expect("expression produced no operand");
        state.exp_result = Some(resolve(state, result)?);
    }
    Ok(())
}

const BUILTINS: &[(&str, &str)] = &[
    ("SIN", "llvm.sin.f64"),
    ("COS", "llvm.cos.f64"),
    ("TAN", "tan"),
    ("ATN", "atan"),
    ("EXP", "llvm.exp.f64"),
    ("ABS", "llvm.fabs.f64"),
    ("LOG", "llvm.log.f64"),
    ("SQR", "llvm.sqrt.f64"),
    ("INT", "llvm.rint.f64"),
    ("RND", "rand"),
];

fn call_function(state: &mut SemanticState, function: &str) -> Result<(), String> {
    let register = format!("%{}_{}", function, state.uid());
    let operand = state.operand_queue.pop().expect("function call with no argument");
    let operand = resolve(state, operand)?;

    if let Some(name) = function.strip_prefix("FN") {
        let _ = name;
        state.referenced_functions.insert(function.to_string());
        state.append_instruction(format!(
            "{} = tail call fast double @{}(double {}) #0",
            register, function, operand
        ));
    } else {
        let implementation = BUILTINS
            .iter()
            .find(|(name, _)| *name == function)
            .map(|(_, imp)| *imp)
            .ok_or_else(|| format!("Unknown function identifier: {}", function))?;
        state.external_symbols.insert(implementation);
        if function == "RND" {
            state.append_instruction(format!("{}_int = call i32 @rand() #0", register));
            state.append_instruction(format!("{r}_double = sitofp i32 {r}_int to double", r = register));
            state.append_instruction(format!("{r} = fdiv double {r}_double, 2147483647.", r = register));
        } else {
            state.append_instruction(format!(
                "{} = tail call fast double @{}(double {}) #0",
                register, implementation, operand
            ));
        }
    }
    state.operand_queue.push(ExprValue::Register(register));
    Ok(())
}

/// Called right after a `)` closes a nested group; if that paren belonged
/// to a function call (an alpha-leading operator now on top), dispatches it.
pub fn end_nested_expression(state: &mut SemanticState) -> Result<(), String> {
    if let Some(top) = state.operator_queue.last() {
        if top.starts_with(|c: char| c.is_ascii_alphabetic()) {
            let function = state.operator_queue.pop().unwrap();
            return call_function(state, &function);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> SemanticState {
        SemanticState::new("t.bas")
    }

    #[test]
    fn literal_arithmetic_folds_without_emitting_instructions() {
        let mut state = fresh();
        number(&mut state, "2").unwrap();
        operator(&mut state, "+").unwrap();
        number(&mut state, "3").unwrap();
        end_expression(&mut state).unwrap();
        assert_eq!(state.exp_result, Some(ExprValue::Literal(5.0)));
        assert!(state.functions.is_empty());
    }

    #[test]
    fn precedence_multiplies_before_adding() {
        // 2 + 3 * 4: once any operator runs, `+`/`*` always emit an
        // instruction rather than constant-folding, so the result is a
        // register — but `*` must be the first one reduced.
        let mut state = fresh();
        state.functions.push(crate::codegen::state::Function::new("main", "i32", "", "#0"));
        number(&mut state, "2").unwrap();
        operator(&mut state, "+").unwrap();
        number(&mut state, "3").unwrap();
        operator(&mut state, "*").unwrap();
        number(&mut state, "4").unwrap();
        end_expression(&mut state).unwrap();
        match &state.exp_result {
            Some(ExprValue::Register(_)) => {}
            other => panic!("expected a register result once an operator ran, got {:?}", other),
        }
        assert_eq!(state.functions[0].instructions.len(), 2);
    }

    #[test]
    fn double_unary_minus_cancels() {
        let mut state = fresh();
        negative_expression(&mut state);
        negative_expression(&mut state);
        number(&mut state, "7").unwrap();
        end_expression(&mut state).unwrap();
        assert_eq!(state.exp_result, Some(ExprValue::Literal(7.0)));
    }

    #[test]
    fn single_unary_minus_negates() {
        let mut state = fresh();
        negative_expression(&mut state);
        number(&mut state, "7").unwrap();
        end_expression(&mut state).unwrap();
        assert_eq!(state.exp_result, Some(ExprValue::Literal(-7.0)));
    }

    #[test]
    fn unknown_function_identifier_is_an_error() {
        let mut state = fresh();
        number(&mut state, "1").unwrap();
        let err = call_function(&mut state, "NOPE").unwrap_err();
        assert!(err.contains("NOPE"));
    }

    #[test]
    fn sqr_dispatches_to_llvm_sqrt_intrinsic() {
        let mut state = fresh();
        state.functions.push(crate::codegen::state::Function::new("main", "i32", "", "#0"));
        number(&mut state, "9").unwrap();
        call_function(&mut state, "SQR").unwrap();
        assert!(state.external_symbols.contains("llvm.sqrt.f64"));
    }

    #[test]
    fn up_arrow_and_caret_both_lower_to_llvm_pow() {
        let mut state = fresh();
        state.functions.push(crate::codegen::state::Function::new("main", "i32", "", "#0"));
        number(&mut state, "2").unwrap();
        operator(&mut state, "\u{2191}").unwrap();
        number(&mut state, "3").unwrap();
        end_expression(&mut state).unwrap();
        assert!(state.external_symbols.contains("llvm.pow.f64"));
    }
}
