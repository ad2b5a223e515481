//! IR generator: expression evaluator, statement lowerings, and the final
//! `to_ll` assembly pass (spec.md §4.3/§4.4, grounded in the original
//! `semantic/llvm.py`, `semantic/Exp.py`, `semantic/For.py`, `semantic/Print.py`,
//! `semantic/functions.py`).

pub mod expr;
pub mod globals;
pub mod program;
pub mod runtime;
pub mod state;
pub mod statements;

pub use program::LlvmIrGenerator;
pub use state::{ExprValue, SemanticState, SharedState};
