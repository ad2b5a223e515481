//! Variable storage: scalar vs. multi-dimensional array declaration and
//! addressing (spec.md §4.3's LET/READ/DIM lvalue pipeline, grounded in
//! `semantic/llvm.py`'s `dimensions_specifier`/`get_multidimensional_ptr`).

use super::state::{ExprValue, SemanticState};

/// `[]` for a scalar, else the nested `[N x [M x double]]` LLVM array type.
pub fn dimensions_specifier(dimensions: &[i64]) -> String {
    match dimensions.split_first() {
        None => "double".to_string(),
        Some((head, rest)) => format!("[{} x {}]", head, dimensions_specifier(rest)),
    }
}

pub fn declare_variable(state: &SemanticState, name: &str) -> String {
    match state.variable_dimensions.get(name) {
        None => format!("@{} = internal global double 0., align 8", name),
        Some(dims) => format!(
            "@{} = internal global {} zeroinitializer, align 16",
            name,
            dimensions_specifier(dims)
        ),
    }
}

/// Builds the `double*` operand text used to load from or store into
/// `variable`, indexing through `dims` if it's declared as an array.
/// Non-constant indices are converted with `fptoui` before the `getelementptr`.
pub fn variable_pointer(state: &mut SemanticState, variable: &str, dims: &[ExprValue]) -> Result<String, String> {
    let declared = state.variable_dimensions.get(variable).cloned().unwrap_or_default();
    if declared.len() != dims.len() {
        return Err(format!(
            "Variable dimensions mismatch for {} (expected {}, got {})",
            variable,
            declared.len(),
            dims.len()
        ));
    }
    if declared.is_empty() {
        return Ok(format!("double* @{}, align 8", variable));
    }

    let mut is_constant = true;
    let mut index_parts = Vec::with_capacity(dims.len());
    for d in dims {
        match d.as_literal() {
            Some(lit) => index_parts.push(format!("i32 {}", lit as i64)),
            None => {
                let reg = format!("%fptoui_{}", state.uid());
                state.append_instruction(format!("{} = fptoui double {} to i32", reg, d));
                index_parts.push(format!("i32 {}", reg));
                is_constant = false;
            }
        }
    }
    let dims_ty = dimensions_specifier(&declared);
    let gep = format!(
        "getelementptr inbounds {dims}, {dims}* @{var}, i32 0, {index}",
        dims = dims_ty,
        var = variable,
        index = index_parts.join(", ")
    );
    let ptr = if is_constant {
        gep
    } else {
        let reg = format!("%ptr_{}", state.uid());
        state.append_instruction(format!("{} = {}", reg, gep));
        reg
    };
    Ok(format!("double* {}, align 16", ptr))
}

/// Emits a `store double <exp_result>, <lvalue>`, qualifying a bare variable
/// name into a pointer operand first.
pub fn assign_to(state: &mut SemanticState, lvalue: &str) {
    let result = state.exp_result.clone().expect("assign_to called with no expression result");
    // A bare variable name (FOR's own bookkeeping) needs qualifying into a
    // pointer operand; a string already built by `variable_pointer` always
    // has an alignment suffix (and thus a comma) and is used as-is.
    let lvalue = if lvalue.contains(',') {
        lvalue.to_string()
    } else {
        format!("double* @{}, align 8", lvalue)
    };
    state.append_instruction(format!("store double {}, {}", result, lvalue));
}
