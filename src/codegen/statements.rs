//! Statement-level semantic actions (spec.md §4.3), grounded in the original
//! `semantic/llvm.py` (labels, LET/READ/DIM, GOTO/GOSUB/RETURN/END, DEF FN,
//! REMARK), `semantic/For.py` (FOR/NEXT), and `semantic/If.py` (IF).

use super::expr::to_double;
use super::globals::{assign_to, variable_pointer};
use super::state::{ExprValue, ForContext, Function, Instruction, PrintParam, SemanticState};

fn to_label(identifier: &str) -> Result<i64, String> {
    identifier.parse::<i64>().map_err(|_| format!("Not a valid line number: {}", identifier))
}

/// Fires on the `number` token at the start of every statement.
pub fn label(state: &mut SemanticState, identifier: &str) -> Result<(), String> {
    let identifier = to_label(identifier)?;
    if !state.defined_labels.insert(identifier) {
        return Err(format!("Duplicate label {}", identifier));
    }
    if state.entry_point.is_none() {
        state.entry_point = Some(identifier);
    }
    if let Some(ctx) = state.for_context.last_mut() {
        if ctx.header_label.is_none() {
            ctx.header_label = Some(identifier);
        }
    }

    let label = format!("label_{}", identifier);
    let current_fn = &state.functions[state.current_function];
    let needs_branch = !current_fn.instructions.is_empty() && !current_fn.ends_with_terminator();
    if needs_branch {
        state.append_deferred(move |s: &SemanticState| {
            if s.goto_targets.contains(&identifier) || s.gosub_targets.contains(&identifier) {
                Some(format!("br label %{}", label))
            } else {
                None
            }
        });
    }
    let header_label = format!("label_{}:", identifier);
    state.append_deferred(move |s: &SemanticState| {
        let referenced = s.goto_targets.contains(&identifier)
            || s.gosub_targets.contains(&identifier)
            || s.entry_point == Some(identifier);
        if referenced {
            Some(header_label.clone())
        } else {
            None
        }
    });
    Ok(())
}

// ---- LET / READ / DIM lvalue pipeline --------------------------------

pub fn lvalue(state: &mut SemanticState, variable: &str) {
    let variable = variable.to_uppercase();
    state.variables.insert(variable.clone());
    state.lvalue_variable = Some(variable);
    state.lvalue_dimensions.clear();
}

pub fn lvalue_dimension(state: &mut SemanticState) {
    let result = state.exp_result.clone().expect("lvalue_dimension with no exp_result");
    state.lvalue_dimensions.push(result);
}

pub fn lvalue_end(state: &mut SemanticState) -> Result<(), String> {
    let variable = state.lvalue_variable.clone().expect("lvalue_end with no lvalue_variable");
    let dims = std::mem::take(&mut state.lvalue_dimensions);
    state.lvalue_ptr = Some(variable_pointer(state, &variable, &dims)?);
    Ok(())
}

pub fn let_rvalue(state: &mut SemanticState) {
    let ptr = state.lvalue_ptr.clone().expect("let_rvalue with no lvalue_ptr");
    assign_to(state, &ptr);
}

pub fn read_item(state: &mut SemanticState) {
    state.has_read = true;
    let i = state.uid();
    let ptr = state.lvalue_ptr.clone().expect("read_item with no lvalue_ptr");
    state.append_instruction(format!("%i_{} = load i32, i32* @data_index, align 4", i));
    state.append_deferred(move |s: &SemanticState| {
        Some(format!(
            "%tmp_{i} = getelementptr [{len} x double], [{len} x double]* @DATA, i32 0, i32 %i_{i}",
            len = s.const_data.len(),
            i = i
        ))
    });
    state.append_instruction(format!("%data_value_{i} = load double, double* %tmp_{i}, align 16", i = i));
    state.append_instruction(format!("store double %data_value_{}, {}", i, ptr));
    state.append_instruction(format!("%i_{i}_inc = add i32 %i_{i}, 1", i = i));
    state.append_instruction(format!("store i32 %i_{}_inc, i32* @data_index, align 4", i));
}

pub fn data_sign(state: &mut SemanticState, sign: f64) {
    state.pending_data_sign = sign;
}

pub fn data_item(state: &mut SemanticState, value: &str) -> Result<(), String> {
    let value = to_double(value)? * state.pending_data_sign;
    state.pending_data_sign = 1.0;
    state.const_data.push(value);
    Ok(())
}

pub fn dim_dimension(state: &mut SemanticState, dimension: &str) -> Result<(), String> {
    let n = dimension.parse::<i64>().map_err(|_| format!("Not a valid array dimension: {}", dimension))?;
    state.lvalue_dimensions.push(ExprValue::Literal(n as f64));
    Ok(())
}

pub fn dim_end(state: &mut SemanticState) {
    let variable = state.lvalue_variable.clone().expect("dim_end with no lvalue_variable");
    let dims: Vec<i64> = std::mem::take(&mut state.lvalue_dimensions)
        .into_iter()
        .map(|d| d.as_literal().expect("DIM dimension must be a literal") as i64)
        .collect();
    state.variables.insert(variable.clone());
    state.variable_dimensions.insert(variable, dims);
}

// ---- control flow ------------------------------------------------------

pub fn goto(state: &mut SemanticState, target: &str) -> Result<(), String> {
    let target = to_label(target)?;
    state.goto_targets.insert(target);
    state.append_instruction(format!("br label %label_{}", target));
    Ok(())
}

pub fn gosub(state: &mut SemanticState, target: &str) -> Result<(), String> {
    let target = to_label(target)?;
    state.gosub_targets.insert(target);
    state.append_instruction(format!(
        "tail call void @program(i8* blockaddress(@program, %label_{})) #0",
        target
    ));
    Ok(())
}

pub fn return_statement(state: &mut SemanticState) {
    state.append_instruction("ret void");
}

pub fn end_statement(state: &mut SemanticState) {
    state.external_symbols.insert("exit");
    state.append_instruction("tail call void @exit(i32 0) noreturn #0");
    state.append_instruction("unreachable");
}

pub fn remark(state: &mut SemanticState, text: &str) {
    state.append_instruction(format!(";{}", text));
}

// ---- IF ------------------------------------------------------------

fn relop_to_cond(operator: &str) -> Result<&'static str, String> {
    match operator {
        "=" => Ok("oeq"),
        ">" => Ok("ogt"),
        ">=" => Ok("oge"),
        "<" => Ok("olt"),
        "<=" => Ok("ole"),
        "<>" => Ok("one"),
        other => Err(format!("Unknown operator: {}", other)),
    }
}

pub fn if_left_exp(state: &mut SemanticState) {
    state.if_left = state.exp_result.clone();
}

pub fn if_operator(state: &mut SemanticState, operator: &str) -> Result<(), String> {
    state.if_cond = Some(relop_to_cond(operator)?);
    Ok(())
}

pub fn if_right_exp(state: &mut SemanticState) {
    let register = format!("%cond_{}", state.uid());
    let left = state.if_left.clone().expect("if_right_exp with no if_left");
    let right = state.exp_result.clone().expect("if_right_exp with no exp_result");
    let cond = state.if_cond.expect("if_right_exp with no if_cond");
    state.append_instruction(format!("{} = fcmp {} double {}, {}", register, cond, left, right));
    state.if_cond_register = Some(register);
}

pub fn if_target(state: &mut SemanticState, target: &str) -> Result<(), String> {
    let target = to_label(target)?;
    state.goto_targets.insert(target);
    let cond_register = state.if_cond_register.clone().expect("if_target with no if_cond_register");
    let fallthrough = format!("cond_false_{}", state.uid());
    state.append_instruction(format!(
        "br i1 {}, label %label_{}, label %{}",
        cond_register, target, fallthrough
    ));
    state.append_instruction(format!("{}:", fallthrough));
    Ok(())
}

// ---- FOR / NEXT ------------------------------------------------------

pub fn for_variable(state: &mut SemanticState, variable: &str) {
    let variable = variable.to_uppercase();
    state.variables.insert(variable.clone());
    state.for_context.push(ForContext::new(variable));
}

pub fn for_left_exp(state: &mut SemanticState) {
    let variable = state.for_context.last().unwrap().variable.clone();
    assign_to(state, &variable);
}

pub fn for_right_exp(state: &mut SemanticState) {
    let result = state.exp_result.clone().expect("for_right_exp with no exp_result");
    match result.as_literal() {
        Some(v) => {
            state.for_context.last_mut().unwrap().end = Some(ExprValue::Literal(v));
        }
        None => {
            let variable = state.for_context.last().unwrap().variable.clone();
            let global = format!("for_{}_end_{}", variable, state.uid());
            state
                .private_globals
                .push(format!("@{} = internal global double 0., align 8", global));
            assign_to(state, &global);
            state.for_context.last_mut().unwrap().end_global = Some(global);
        }
    }
}

pub fn for_step_implicit(state: &mut SemanticState) {
    state.for_context.last_mut().unwrap().step = Some(ExprValue::Literal(1.0));
}

pub fn for_step_value(state: &mut SemanticState) {
    let result = state.exp_result.clone().expect("for_step_value with no exp_result");
    match result.as_literal() {
        Some(v) => {
            state.for_context.last_mut().unwrap().step = Some(ExprValue::Literal(v));
        }
        None => {
            let variable = state.for_context.last().unwrap().variable.clone();
            let global = format!("for_{}_step_{}", variable, state.uid());
            state
                .private_globals
                .push(format!("@{} = internal global double 0., align 8", global));
            assign_to(state, &global);
            state.for_context.last_mut().unwrap().step_global = Some(global);
        }
    }
}

pub fn next_statement(state: &mut SemanticState, variable: &str) -> Result<(), String> {
    let variable = variable.to_uppercase();
    let ctx = state
        .for_context
        .pop()
        .ok_or_else(|| "NEXT has no matching FOR".to_string())?;
    if variable != ctx.variable {
        return Err(format!(
            "NEXT and matching FOR have different counter variables ({} and {})",
            variable, ctx.variable
        ));
    }

    let header = ctx.header_label.expect("FOR body must contain at least the header label");
    state.goto_targets.insert(header);
    let label = format!("label_{}", header);

    let old_value = format!("%{}_{}", variable, state.uid());
    state.append_instruction(format!("{} = load double, double* @{}, align 8", old_value, variable));

    let step_value = match (&ctx.step, &ctx.step_global) {
        (Some(ExprValue::Literal(v)), _) => ExprValue::Literal(*v).to_string(),
        (_, Some(global)) => {
            let reg = format!("%step_{}", state.uid());
            state.append_instruction(format!("{} = load double, double* @{}, align 8", reg, global));
            reg
        }
        _ => unreachable!("FOR must set step to a literal or a global"),
    };

    let new_value = format!("new_{}_{}", variable, state.uid());
    state.append_instruction(format!("%{} = fadd fast double %{}, {}", new_value, old_value, step_value));
    state.append_instruction(format!("store double %{}, double* @{}, align 8", new_value, variable));

    let end_value = match (&ctx.end, &ctx.end_global) {
        (Some(ExprValue::Literal(v)), _) => ExprValue::Literal(*v).to_string(),
        (_, Some(global)) => {
            let reg = format!("%end_{}_{}", variable, state.uid());
            state.append_instruction(format!("{} = load double, double* @{}, align 8", reg, global));
            reg
        }
        _ => unreachable!("FOR must set end to a literal or a global"),
    };

    let will_jump = format!("will_jump_{}", state.uid());
    let for_exit = format!("for_exit_{}", state.uid());

    match &ctx.step {
        Some(ExprValue::Literal(step)) if *step >= 0.0 => {
            state.append_instruction(format!("%{} = fcmp ole double %{}, {}", will_jump, new_value, end_value));
            state.append_instruction(format!("br i1 %{}, label %{}, label %{}", will_jump, label, for_exit));
        }
        Some(ExprValue::Literal(_)) => {
            state.append_instruction(format!("%{} = fcmp oge double %{}, {}", will_jump, new_value, end_value));
            state.append_instruction(format!("br i1 %{}, label %{}, label %{}", will_jump, label, for_exit));
        }
        _ => {
            let sign = format!("step_sign_{}", state.uid());
            let positive = format!("positive_{}", state.uid());
            let negative = format!("negative_{}", state.uid());
            state.append_instruction(format!("%{} = fcmp oge double {}, 0.", sign, step_value));
            state.append_instruction(format!("br i1 %{}, label %{}, label %{}", sign, positive, negative));
            state.append_instruction(format!("{}:", positive));
            state.append_instruction(format!("%{} = fcmp ole double %{}, {}", will_jump, new_value, end_value));
            state.append_instruction(format!("br i1 %{}, label %{}, label %{}", will_jump, label, for_exit));
            state.append_instruction(format!("{}:", negative));
            let will_jump_2 = format!("will_jump_2_{}", state.uid());
            state.append_instruction(format!("%{} = fcmp oge double %{}, {}", will_jump_2, new_value, end_value));
            state.append_instruction(format!("br i1 %{}, label %{}, label %{}", will_jump_2, label, for_exit));
        }
    }
    state.append_instruction(format!("{}:", for_exit));
    Ok(())
}

// ---- DEF FN ------------------------------------------------------

pub fn def_identifier(state: &mut SemanticState, identifier: &str) {
    let f = Function::new(identifier.to_uppercase(), "double", "double %arg", "#0");
    state.functions.push(f);
    state.current_function = state.functions.len() - 1;
}

pub fn def_parameter(state: &mut SemanticState, variable: &str) {
    state.loaded_variables.clear();
    state.loaded_variables.insert(variable.to_uppercase(), "%arg".to_string());
}

pub fn def_exp(state: &mut SemanticState) {
    state.loaded_variables.clear();
    let result = state.exp_result.clone().expect("def_exp with no exp_result");
    state.append_instruction(format!("ret double {}", result));
    state.current_function = 0;
}

// ---- PRINT ------------------------------------------------------

/// A bare `PRINT` with no parameters: a single newline, cheaper than going
/// through `printf`.
pub fn print_newline(state: &mut SemanticState) {
    state.external_symbols.insert("putchar");
    state.append_instruction("tail call i32 @putchar(i32 10) #0");
}

pub fn print_string(state: &mut SemanticState, literal: String) {
    state.print_parameters.push(PrintParam::StringLiteral(literal));
}

pub fn print_expression(state: &mut SemanticState) {
    let result = state.exp_result.clone().expect("print_expression with no exp_result");
    state.print_parameters.push(PrintParam::Value(result));
}

fn const_string(state: &mut SemanticState, literal: &str) -> (String, usize) {
    let id = format!("@.str{}", state.private_globals.len());
    let length = literal.len() + 1 - 2 * literal.matches('\\').count();
    state
        .private_globals
        .push(format!("{} = private unnamed_addr constant [{} x i8] c\"{}\\00\", align 1", id, length, literal));
    (id, length)
}

fn print_end(state: &mut SemanticState, suffix: &str) {
    state.external_symbols.insert("printf");

    let mut format_parts = Vec::new();
    let mut va_args = Vec::new();
    for item in std::mem::take(&mut state.print_parameters) {
        match item {
            PrintParam::Value(v) => {
                format_parts.push("%f");
                va_args.push(format!("double {}", v));
            }
            PrintParam::StringLiteral(raw) => {
                // Backslash-escape first: the quote-pair escape below inserts
                // its own literal backslash, which must not be re-escaped by
                // a pass that runs after it.
                let escaped = raw.replace('\\', "\\5C").replace("\"\"", "\\22");
                format_parts.push("%s");
                let (id, len) = const_string(state, &escaped);
                va_args.push(format!(
                    "i8* getelementptr inbounds ([{len} x i8], [{len} x i8]* {id}, i32 0, i32 0)",
                    len = len,
                    id = id
                ));
            }
        }
    }

    let (format_id, format_len) = const_string(state, &format!("{}{}", format_parts.join(" "), suffix));
    state.append_instruction(format!(
        "tail call i32 (i8*, ...) @printf(i8* getelementptr inbounds ([{len} x i8], [{len} x i8]* {id}, i32 0, i32 0), {args}) #0",
        len = format_len,
        id = format_id,
        args = va_args.join(", ")
    ));
}

/// PRINT ended on a trailing comma: no newline.
pub fn print_end_no_newline(state: &mut SemanticState) {
    print_end(state, "");
}

/// PRINT ended at end-of-line: trailing `\n`.
pub fn print_end_with_newline(state: &mut SemanticState) {
    print_end(state, "\\0A");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> SemanticState {
        let mut state = SemanticState::new("t.bas");
        state.functions.push(Function::new("main", "i32", "", "#0"));
        state
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut state = fresh();
        label(&mut state, "10").unwrap();
        let err = label(&mut state, "10").unwrap_err();
        assert!(err.contains("10"));
    }

    #[test]
    fn first_label_becomes_the_entry_point() {
        let mut state = fresh();
        label(&mut state, "10").unwrap();
        label(&mut state, "20").unwrap();
        assert_eq!(state.entry_point, Some(10));
    }

    #[test]
    fn goto_records_its_target_and_emits_a_branch() {
        let mut state = fresh();
        goto(&mut state, "30").unwrap();
        assert!(state.goto_targets.contains(&30));
        assert_eq!(state.functions[0].instructions.len(), 1);
    }

    #[test]
    fn goto_rejects_a_non_numeric_target() {
        let mut state = fresh();
        assert!(goto(&mut state, "ten").is_err());
    }

    #[test]
    fn next_without_for_is_an_error() {
        let mut state = fresh();
        assert!(next_statement(&mut state, "I").is_err());
    }

    #[test]
    fn next_with_mismatched_variable_is_an_error() {
        let mut state = fresh();
        for_variable(&mut state, "I");
        state.exp_result = Some(ExprValue::Literal(1.0));
        for_left_exp(&mut state);
        for_right_exp_literal(&mut state, 10.0);
        for_step_implicit(&mut state);
        state.for_context.last_mut().unwrap().header_label = Some(10);
        let err = next_statement(&mut state, "J").unwrap_err();
        assert!(err.contains('I') && err.contains('J'));
    }

    #[test]
    fn for_next_with_literal_bounds_closes_the_loop() {
        let mut state = fresh();
        for_variable(&mut state, "I");
        state.exp_result = Some(ExprValue::Literal(1.0));
        for_left_exp(&mut state);
        for_right_exp_literal(&mut state, 10.0);
        for_step_implicit(&mut state);
        state.for_context.last_mut().unwrap().header_label = Some(10);
        next_statement(&mut state, "I").unwrap();
        assert!(state.for_context.is_empty());
        assert!(state.goto_targets.contains(&10));
    }

    #[test]
    fn relop_to_cond_rejects_unknown_operators() {
        assert!(relop_to_cond("!=").is_err());
        assert_eq!(relop_to_cond("<>").unwrap(), "one");
    }

    #[test]
    fn if_chain_emits_a_compare_and_a_conditional_branch() {
        let mut state = fresh();
        state.exp_result = Some(ExprValue::Literal(1.0));
        if_left_exp(&mut state);
        if_operator(&mut state, "=").unwrap();
        state.exp_result = Some(ExprValue::Literal(2.0));
        if_right_exp(&mut state);
        if_target(&mut state, "99").unwrap();
        assert!(state.goto_targets.contains(&99));
        assert_eq!(state.functions[0].instructions.len(), 3);
    }

    #[test]
    fn print_string_then_value_builds_two_format_parts() {
        let mut state = fresh();
        print_string(&mut state, "hi".to_string());
        state.exp_result = Some(ExprValue::Literal(3.0));
        print_expression(&mut state);
        assert_eq!(state.print_parameters.len(), 2);
        print_end_with_newline(&mut state);
        assert!(state.print_parameters.is_empty());
        assert!(state.external_symbols.contains("printf"));
    }

    #[test]
    fn remark_is_emitted_as_a_comment_instruction() {
        let mut state = fresh();
        remark(&mut state, "hello world");
        match &state.functions[0].instructions[0] {
            Instruction::Literal(s) => assert_eq!(s, ";hello world"),
            _ => panic!("expected a literal comment instruction"),
        }
    }

    fn for_right_exp_literal(state: &mut SemanticState, v: f64) {
        state.exp_result = Some(ExprValue::Literal(v));
        for_right_exp(state);
    }
}
