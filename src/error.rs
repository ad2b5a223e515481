//! Compiler error taxonomy.
//!
//! Mirrors the teacher's hand-rolled error types (`codegen::error::CodeGenError`)
//! rather than reaching for `thiserror`/`anyhow`: a plain `enum` with a manual
//! `Display` impl is what this codebase already does for its error paths.
//! Every variant carries a 1-indexed source line so the driver can report a
//! "Line N: ..." context, per spec.md §7.

use std::fmt;

use crate::fsm::FsmError;

/// The four error kinds spec.md §7 names. All are fatal: compilation aborts
/// on the first one and no partial `.ll` output is written.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Tokenizer dead-end: no valid transition for the offending character.
    Lex { line: usize, detail: String },
    /// Syntax recognizer dead-end: no valid statement-grammar transition.
    Parse { line: usize, detail: String },
    /// Invalid program content caught by the IR generator: bad numbers,
    /// duplicate/undefined labels, unknown relational operators, unknown
    /// function identifiers, DIM arity mismatches, unbalanced FOR/NEXT,
    /// READ without DATA, or unresolved function references.
    Semantic { line: usize, detail: String },
    /// Source file missing, or a `clang`/`lli` subprocess failed.
    Io { detail: String },
}

impl CompileError {
    pub fn lex(line: usize, detail: impl Into<String>) -> Self {
        CompileError::Lex {
            line,
            detail: detail.into(),
        }
    }

    pub fn parse(line: usize, detail: impl Into<String>) -> Self {
        CompileError::Parse {
            line,
            detail: detail.into(),
        }
    }

    pub fn semantic(line: usize, detail: impl Into<String>) -> Self {
        CompileError::Semantic {
            line,
            detail: detail.into(),
        }
    }

    pub fn io(detail: impl Into<String>) -> Self {
        CompileError::Io {
            detail: detail.into(),
        }
    }

    pub fn from_fsm(line: usize, err: FsmError) -> Self {
        CompileError::Lex {
            line,
            detail: err.to_string(),
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Lex { line, .. }
            | CompileError::Parse { line, .. }
            | CompileError::Semantic { line, .. } => Some(*line),
            CompileError::Io { .. } => None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex { line, detail } => write!(f, "Line {}: lex error: {}", line, detail),
            CompileError::Parse { line, detail } => {
                write!(f, "Line {}: syntax error: {}", line, detail)
            }
            CompileError::Semantic { line, detail } => {
                write!(f, "Line {}: {}", line, detail)
            }
            CompileError::Io { detail } => write!(f, "{}", detail),
        }
    }
}

impl std::error::Error for CompileError {}

/// A single diagnostic context line contributed by a pipeline module that
/// witnessed the error (spec.md §4.5/§7): the offending source text with a
/// caret under the offending column, when known.
pub fn caret_line(source_line: &str, column: Option<usize>) -> String {
    let trimmed = source_line.trim_end_matches(['\n', '\r']);
    match column {
        Some(col) => format!("{}\n{}^", trimmed, " ".repeat(col)),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_line_prefixed_messages() {
        let err = CompileError::semantic(10, "Duplicate label 10");
        assert_eq!(err.to_string(), "Line 10: Duplicate label 10");
    }

    #[test]
    fn io_errors_have_no_line_and_no_prefix() {
        let err = CompileError::io("source.bas: No such file or directory");
        assert_eq!(err.line(), None);
        assert_eq!(err.to_string(), "source.bas: No such file or directory");
    }

    #[test]
    fn caret_line_places_the_caret_under_the_given_column() {
        let rendered = caret_line("10 PRINT X\n", Some(9));
        assert_eq!(rendered, "10 PRINT X\n         ^");
    }

    #[test]
    fn caret_line_with_no_column_just_trims_the_newline() {
        assert_eq!(caret_line("10 END\n", None), "10 END");
    }
}
