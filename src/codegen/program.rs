//! Top-level IR assembly (spec.md §4.5), grounded in `semantic/llvm.py`'s
//! `LlvmIrGenerator.to_ll`.

use crate::error::CompileError;

use super::globals::declare_variable;
use super::runtime::{declaration_for, new_main_function, new_program_function, ATTRIBUTE_GROUPS, MODULE_IDENT};
use super::state::{format_float, SemanticState, SharedState};

use std::cell::RefCell;
use std::rc::Rc;

pub struct LlvmIrGenerator {
    pub state: SharedState,
}

impl LlvmIrGenerator {
    pub fn new(filename: impl Into<String>) -> Self {
        let mut state = SemanticState::new(filename.into());
        state.functions.push(new_program_function());
        state.functions.push(new_main_function());
        LlvmIrGenerator {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn to_ll(&self) -> Result<String, CompileError> {
        let state = self.state.borrow();

        let defined_functions: std::collections::HashSet<&str> =
            state.functions.iter().map(|f| f.name.as_str()).collect();
        let undefined_functions: Vec<&String> = state
            .referenced_functions
            .iter()
            .filter(|f| !defined_functions.contains(f.as_str()))
            .collect();
        if !undefined_functions.is_empty() {
            let mut names: Vec<&str> = undefined_functions.iter().map(|s| s.as_str()).collect();
            names.sort_unstable();
            return Err(CompileError::semantic(0, format!("Undefined functions: {}", names.join(", "))));
        }

        let mut undefined_labels: Vec<i64> = state
            .goto_targets
            .iter()
            .chain(state.gosub_targets.iter())
            .filter(|l| !state.defined_labels.contains(l))
            .copied()
            .collect();
        if !undefined_labels.is_empty() {
            undefined_labels.sort_unstable();
            let names: Vec<String> = undefined_labels.iter().map(|l| l.to_string()).collect();
            return Err(CompileError::semantic(0, format!("Undefined labels: {}", names.join(", "))));
        }

        if !state.for_context.is_empty() {
            return Err(CompileError::semantic(0, "FOR without matching NEXT".to_string()));
        }

        if state.has_read && state.const_data.is_empty() {
            return Err(CompileError::semantic(0, "Code has READ statements, but no DATA statement".to_string()));
        }

        let mut private_globals = state.private_globals.clone();
        if !state.const_data.is_empty() {
            let data_array = state
                .const_data
                .iter()
                .map(|v| format!("double {}", format_float(*v)))
                .collect::<Vec<_>>()
                .join(", ");
            private_globals.push("@data_index = internal global i32 0, align 4".to_string());
            private_globals.push(format!(
                "@DATA = private unnamed_addr constant [{} x double] [{}], align 16",
                state.const_data.len(),
                data_array
            ));
        }
        private_globals.sort_unstable();

        let mut variables: Vec<&String> = state.variables.iter().collect();
        variables.sort_unstable();
        let variable_decls = variables
            .iter()
            .map(|v| declare_variable(&state, v))
            .collect::<Vec<_>>()
            .join("\n");

        let header = format!(
            "source_filename = \"{}\"\ntarget triple = \"x86_64-pc-linux-gnu\"",
            state.filename
        );

        let body = state
            .functions
            .iter()
            .map(|f| f.to_ll(&state))
            .collect::<Vec<_>>()
            .join("\n\n");

        let declarations = state
            .external_symbols
            .iter()
            .map(|s| declaration_for(s))
            .collect::<Vec<_>>()
            .join("\n");

        let sections: Vec<String> = [
            header,
            private_globals.join("\n"),
            variable_decls,
            body,
            declarations,
            ATTRIBUTE_GROUPS.to_string(),
            MODULE_IDENT.to_string(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

        Ok(sections.join("\n\n"))
    }
}
