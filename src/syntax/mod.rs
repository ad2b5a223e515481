//! `SyntaxRecognizer` — the root statement-grammar FSM (spec.md §4.3),
//! grounded in the original `syntax_recognizer/SyntaxRecognizer.py`. That
//! table only ever wired up the statements whose lowering had no expression
//! dependency (GOTO/GO TO/GOSUB/RETURN/END/REMARK and the expression-free
//! half of READ/DATA); LET/PRINT/IF/FOR/NEXT/DIM/DEF were left as `# TODO`
//! stubs there. This module completes them, reusing the same lvalue/FOR/IF/
//! PRINT semantic actions in `crate::codegen::statements` and routing every
//! expression position through `expression::build`'s `SubFsm` template.
//!
//! A recurring shape below: whenever the *last* content token of a statement
//! is itself the dead end that terminates an expression sub-FSM (end-of-line,
//! or a following keyword like `TO`/`THEN`/`STEP`), that same token is re-fed
//! to this FSM by the engine (see `crate::fsm::Fsm::transition`), so the
//! target state can go straight back to `start` — there is no need for the
//! `end`-state indirection that statements ending in a plain token (a label
//! number, a bare keyword) still require to consume the separate `end_of_line`
//! event that follows them.

pub mod expression;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::codegen::expr;
use crate::codegen::state::SharedState;
use crate::codegen::statements;
use crate::codegen::LlvmIrGenerator;
use crate::engine::Module;
use crate::error::CompileError;
use crate::event::Event;
use crate::fsm::EventMatcher::{Exact, Kind, SubFsm};
use crate::fsm::{Fsm, FsmEvent, FsmState, FsmTemplate, Transition};

use expression::{action0, action_fallible, action_fallible_payload};

fn kw(identifier: &'static str) -> crate::fsm::EventMatcher {
    Exact("identifier", identifier)
}

fn relop_transitions(state: &SharedState, target: &'static str) -> Vec<Transition> {
    ["=", ">", ">=", "<", "<=", "<>"]
        .into_iter()
        .map(|op| {
            Transition::with_action(
                Exact("special", op),
                target,
                action_fallible_payload(state, statements::if_operator),
            )
        })
        .collect()
}

fn remark_action(buffer: &Rc<RefCell<String>>) -> crate::fsm::SemanticAction {
    let buffer = Rc::clone(buffer);
    Rc::new(move |payload: &str| {
        let mut b = buffer.borrow_mut();
        if !b.is_empty() {
            b.push(' ');
        }
        b.push_str(payload);
        Ok(())
    })
}

fn flush_remark(state: &SharedState, buffer: &Rc<RefCell<String>>) -> crate::fsm::SemanticAction {
    let state = Rc::clone(state);
    let buffer = Rc::clone(buffer);
    Rc::new(move |_: &str| {
        let text = std::mem::take(&mut *buffer.borrow_mut());
        statements::remark(&mut state.borrow_mut(), &text);
        Ok(())
    })
}

fn build_template(state: &SharedState, remark_buffer: Rc<RefCell<String>>) -> Rc<FsmTemplate> {
    let outer_expr = expression::build(state, true);
    let mut states = HashMap::new();

    // An expression sub-FSM invoked as a statement's own content (not one
    // nested inside another expression) always needs `end_expression` run
    // before the statement-specific continuation, since nothing else pops
    // the operator stack down to empty and sets `exp_result` for it.
    macro_rules! expr_entry {
        ($target:expr, |$s:ident| $body:expr) => {
            Transition::with_action(
                SubFsm(Rc::clone(&outer_expr)),
                $target,
                action_fallible(state, move |$s| {
                    expr::end_expression($s)?;
                    $body
                }),
            )
        };
    }

    // ---- start / statement dispatch ----------------------------------

    states.insert(
        "start",
        FsmState::new(
            None,
            vec![
                Transition::with_action(
                    Kind("number"),
                    "statement",
                    action_fallible_payload(state, statements::label),
                ),
                // A blank source line: no label, nothing to lower.
                Transition::new(Kind("end_of_line"), "start"),
            ],
        ),
    );

    states.insert(
        "statement",
        FsmState::new(
            None,
            vec![
                Transition::new(kw("LET"), "let_lvalue"),
                Transition::new(kw("READ"), "read"),
                Transition::new(kw("DATA"), "data"),
                Transition::new(kw("PRINT"), "print"),
                Transition::new(kw("GO"), "go"),
                Transition::new(kw("GOTO"), "goto"),
                Transition::new(kw("GOSUB"), "gosub"),
                Transition::new(kw("IF"), "if_left_entry"),
                Transition::new(kw("FOR"), "for_variable"),
                Transition::new(kw("NEXT"), "next"),
                Transition::new(kw("DIM"), "dim_lvalue"),
                Transition::new(kw("DEF"), "def_identifier"),
                Transition::with_action(kw("RETURN"), "end", action0(state, statements::return_statement)),
                Transition::new(kw("REMARK"), "remark"),
                Transition::new(kw("REM"), "remark"),
                Transition::with_action(kw("END"), "end", action0(state, statements::end_statement)),
            ],
        ),
    );

    states.insert("end", FsmState::new(None, vec![Transition::new(Kind("end_of_line"), "start")]));

    // ---- LET -----------------------------------------------------------
    //
    // Shares the lvalue pipeline with READ/DIM: collect the variable name,
    // an optional `(dim, …)` index list (each an expression here, an integer
    // literal for DIM), then the statement-specific continuation.

    states.insert(
        "let_lvalue",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("variable"), "let_got_var", {
                let state = Rc::clone(state);
                Rc::new(move |payload: &str| {
                    statements::lvalue(&mut state.borrow_mut(), payload);
                    Ok(())
                })
            })],
        ),
    );
    states.insert(
        "let_got_var",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", "("), "let_dim_entry"),
                Transition::with_action(
                    Exact("special", "="),
                    "let_rhs_entry",
                    action_fallible(state, statements::lvalue_end),
                ),
            ],
        ),
    );
    states.insert(
        "let_dim_entry",
        FsmState::new(
            None,
            vec![expr_entry!("let_dim_done", |s| {
                statements::lvalue_dimension(s);
                Ok(())
            })],
        ),
    );
    states.insert(
        "let_dim_done",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", ","), "let_dim_entry"),
                Transition::with_action(
                    Exact("special", ")"),
                    "let_after_dims",
                    action_fallible(state, statements::lvalue_end),
                ),
            ],
        ),
    );
    states.insert(
        "let_after_dims",
        FsmState::new(None, vec![Transition::new(Exact("special", "="), "let_rhs_entry")]),
    );
    states.insert(
        "let_rhs_entry",
        FsmState::new(
            None,
            vec![expr_entry!("start", |s| {
                statements::let_rvalue(s);
                Ok(())
            })],
        ),
    );

    // ---- READ ------------------------------------------------------

    states.insert(
        "read",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("variable"), "read_got_var", {
                let state = Rc::clone(state);
                Rc::new(move |payload: &str| {
                    statements::lvalue(&mut state.borrow_mut(), payload);
                    Ok(())
                })
            })],
        ),
    );
    states.insert(
        "read_got_var",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", "("), "read_dim_entry"),
                Transition::with_action(Exact("special", ","), "read", {
                    action_fallible(state, |s| {
                        statements::lvalue_end(s)?;
                        statements::read_item(s);
                        Ok(())
                    })
                }),
                Transition::with_action(Kind("end_of_line"), "start", {
                    action_fallible(state, |s| {
                        statements::lvalue_end(s)?;
                        statements::read_item(s);
                        Ok(())
                    })
                }),
            ],
        ),
    );
    states.insert(
        "read_dim_entry",
        FsmState::new(
            None,
            vec![expr_entry!("read_dim_done", |s| {
                statements::lvalue_dimension(s);
                Ok(())
            })],
        ),
    );
    states.insert(
        "read_dim_done",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", ","), "read_dim_entry"),
                Transition::with_action(
                    Exact("special", ")"),
                    "read_after_dims",
                    action_fallible(state, statements::lvalue_end),
                ),
            ],
        ),
    );
    states.insert(
        "read_after_dims",
        FsmState::new(
            None,
            vec![
                Transition::with_action(Exact("special", ","), "read", action_fallible(state, |s| {
                    statements::read_item(s);
                    Ok(())
                })),
                Transition::with_action(Kind("end_of_line"), "start", action_fallible(state, |s| {
                    statements::read_item(s);
                    Ok(())
                })),
            ],
        ),
    );

    // ---- DATA ------------------------------------------------------

    states.insert(
        "data",
        FsmState::new(
            None,
            vec![
                Transition::with_action(Exact("special", "+"), "signed_data", action0(state, |s| statements::data_sign(s, 1.0))),
                Transition::with_action(Exact("special", "-"), "signed_data", action0(state, |s| statements::data_sign(s, -1.0))),
                Transition::with_action(
                    Kind("number"),
                    "end_of_data",
                    action_fallible_payload(state, statements::data_item),
                ),
            ],
        ),
    );
    states.insert(
        "signed_data",
        FsmState::new(
            None,
            vec![Transition::with_action(
                Kind("number"),
                "end_of_data",
                action_fallible_payload(state, statements::data_item),
            )],
        ),
    );
    states.insert(
        "end_of_data",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", ","), "data"),
                Transition::new(Kind("end_of_line"), "start"),
            ],
        ),
    );

    // ---- PRINT ------------------------------------------------------

    states.insert("print", FsmState::new(None, print_item_transitions(state, &outer_expr, true)));
    states.insert(
        "print_after_comma",
        FsmState::new(None, print_item_transitions(state, &outer_expr, false)),
    );
    states.insert(
        "print_after_item",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", ","), "print_after_comma"),
                Transition::with_action(Kind("end_of_line"), "start", action0(state, statements::print_end_with_newline)),
            ],
        ),
    );

    // ---- GOTO / GO TO / GOSUB / RETURN / END ---------------------------

    states.insert("go", FsmState::new(None, vec![Transition::new(kw("TO"), "goto")]));
    states.insert(
        "goto",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("number"), "end", action_fallible_payload(state, statements::goto))],
        ),
    );
    states.insert(
        "gosub",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("number"), "end", action_fallible_payload(state, statements::gosub))],
        ),
    );

    // ---- REMARK ------------------------------------------------------

    states.insert(
        "remark",
        FsmState::new(
            None,
            vec![
                Transition::with_action(Kind("identifier"), "remark", remark_action(&remark_buffer)),
                Transition::with_action(Kind("number"), "remark", remark_action(&remark_buffer)),
                Transition::with_action(Kind("special"), "remark", remark_action(&remark_buffer)),
                Transition::with_action(Kind("string"), "remark", remark_action(&remark_buffer)),
                Transition::with_action(Kind("variable"), "remark", remark_action(&remark_buffer)),
                Transition::with_action(Kind("end_of_line"), "start", flush_remark(state, &remark_buffer)),
            ],
        ),
    );

    // ---- IF ------------------------------------------------------

    states.insert(
        "if_left_entry",
        FsmState::new(
            None,
            vec![expr_entry!("if_relop", |s| {
                statements::if_left_exp(s);
                Ok(())
            })],
        ),
    );
    states.insert("if_relop", FsmState::new(None, relop_transitions(state, "if_right_entry")));
    states.insert(
        "if_right_entry",
        FsmState::new(
            None,
            vec![expr_entry!("if_then", |s| {
                statements::if_right_exp(s);
                Ok(())
            })],
        ),
    );
    states.insert("if_then", FsmState::new(None, vec![Transition::new(kw("THEN"), "if_target")]));
    states.insert(
        "if_target",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("number"), "end", action_fallible_payload(state, statements::if_target))],
        ),
    );

    // ---- FOR / NEXT ------------------------------------------------------

    states.insert(
        "for_variable",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("variable"), "for_eq", {
                let state = Rc::clone(state);
                Rc::new(move |payload: &str| {
                    statements::for_variable(&mut state.borrow_mut(), payload);
                    Ok(())
                })
            })],
        ),
    );
    states.insert("for_eq", FsmState::new(None, vec![Transition::new(Exact("special", "="), "for_left_entry")]));
    states.insert(
        "for_left_entry",
        FsmState::new(
            None,
            vec![expr_entry!("for_to", |s| {
                statements::for_left_exp(s);
                Ok(())
            })],
        ),
    );
    states.insert("for_to", FsmState::new(None, vec![Transition::new(kw("TO"), "for_right_entry")]));
    states.insert(
        "for_right_entry",
        FsmState::new(
            None,
            vec![expr_entry!("for_after_right", |s| {
                statements::for_right_exp(s);
                Ok(())
            })],
        ),
    );
    states.insert(
        "for_after_right",
        FsmState::new(
            None,
            vec![
                Transition::new(kw("STEP"), "for_step_entry"),
                Transition::with_action(Kind("end_of_line"), "start", action0(state, statements::for_step_implicit)),
            ],
        ),
    );
    states.insert(
        "for_step_entry",
        FsmState::new(
            None,
            vec![expr_entry!("start", |s| {
                statements::for_step_value(s);
                Ok(())
            })],
        ),
    );
    states.insert(
        "next",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("variable"), "end", action_fallible_payload(state, statements::next_statement))],
        ),
    );

    // ---- DIM ------------------------------------------------------

    states.insert(
        "dim_lvalue",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("variable"), "dim_got_var", {
                let state = Rc::clone(state);
                Rc::new(move |payload: &str| {
                    statements::lvalue(&mut state.borrow_mut(), payload);
                    Ok(())
                })
            })],
        ),
    );
    states.insert("dim_got_var", FsmState::new(None, vec![Transition::new(Exact("special", "("), "dim_dim_entry")]));
    states.insert(
        "dim_dim_entry",
        FsmState::new(
            None,
            vec![Transition::with_action(
                Kind("number"),
                "dim_dim_done",
                action_fallible_payload(state, statements::dim_dimension),
            )],
        ),
    );
    states.insert(
        "dim_dim_done",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("special", ","), "dim_dim_entry"),
                Transition::with_action(Exact("special", ")"), "end", action0(state, statements::dim_end)),
            ],
        ),
    );

    // ---- DEF FN ------------------------------------------------------

    states.insert(
        "def_identifier",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("identifier"), "def_paren", {
                let state = Rc::clone(state);
                Rc::new(move |payload: &str| {
                    statements::def_identifier(&mut state.borrow_mut(), payload);
                    Ok(())
                })
            })],
        ),
    );
    states.insert("def_paren", FsmState::new(None, vec![Transition::new(Exact("special", "("), "def_param")]));
    states.insert(
        "def_param",
        FsmState::new(
            None,
            vec![Transition::with_action(Kind("variable"), "def_close_paren", {
                let state = Rc::clone(state);
                Rc::new(move |payload: &str| {
                    statements::def_parameter(&mut state.borrow_mut(), payload);
                    Ok(())
                })
            })],
        ),
    );
    states.insert("def_close_paren", FsmState::new(None, vec![Transition::new(Exact("special", ")"), "def_eq")]));
    states.insert("def_eq", FsmState::new(None, vec![Transition::new(Exact("special", "="), "def_exp_entry")]));
    states.insert(
        "def_exp_entry",
        FsmState::new(
            None,
            vec![expr_entry!("start", |s| {
                statements::def_exp(s);
                Ok(())
            })],
        ),
    );

    Rc::new(FsmTemplate::new(states))
}

/// PRINT's item-start transitions. `at_statement_start` picks the `end_of_line`
/// action for a zero-item statement (bare `PRINT`) vs. one reached after a
/// trailing comma (non-empty list, no newline) — the only difference between
/// the two states this function builds.
fn print_item_transitions(state: &SharedState, outer_expr: &Rc<FsmTemplate>, at_statement_start: bool) -> Vec<Transition> {
    let eol_action = if at_statement_start {
        action0(state, statements::print_newline)
    } else {
        action0(state, statements::print_end_no_newline)
    };
    vec![
        Transition::with_action(Kind("string"), "print_after_item", {
            let state = Rc::clone(state);
            Rc::new(move |payload: &str| {
                let literal = payload.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(payload);
                statements::print_string(&mut state.borrow_mut(), literal.to_string())
            })
        }),
        Transition::with_action(Kind("end_of_line"), "start", eol_action),
        Transition::with_action(
            SubFsm(Rc::clone(outer_expr)),
            "print_after_item",
            action_fallible(state, |s| {
                expr::end_expression(s)?;
                statements::print_expression(s);
                Ok(())
            }),
        ),
    ]
}

/// Drives the statement grammar; owns the [`LlvmIrGenerator`] whose
/// `to_ll()` is invoked once, on `eof`.
pub struct SyntaxRecognizer {
    generator: LlvmIrGenerator,
    fsm: Fsm,
    current_line: Rc<Cell<usize>>,
    output: Rc<RefCell<Option<String>>>,
}

impl SyntaxRecognizer {
    pub fn new(filename: impl Into<String>, current_line: Rc<Cell<usize>>, output: Rc<RefCell<Option<String>>>) -> Self {
        let generator = LlvmIrGenerator::new(filename);
        let fsm = Fsm::new(build_template(&generator.state, Rc::new(RefCell::new(String::new()))));
        SyntaxRecognizer {
            generator,
            fsm,
            current_line,
            output,
        }
    }
}

impl Module for SyntaxRecognizer {
    fn handles(&self, kind: &str) -> bool {
        matches!(
            kind,
            "number" | "identifier" | "special" | "string" | "variable" | "end_of_line" | "eof"
        )
    }

    fn handle(&mut self, event: &Event, _outbox: &mut Vec<Event>) -> Result<(), CompileError> {
        match event.kind {
            "eof" => {
                let ir = self.generator.to_ll()?;
                *self.output.borrow_mut() = Some(ir);
                Ok(())
            }
            kind @ ("number" | "identifier" | "special" | "string" | "variable" | "end_of_line") => {
                let fsm_event = FsmEvent::new(kind, event.payload_str());
                self.fsm.transition(&fsm_event).map(|_| ()).map_err(|e| match e {
                    crate::fsm::FsmError::Action(detail) => CompileError::semantic(self.current_line.get(), detail),
                    crate::fsm::FsmError::DeadEnd { .. } => {
                        CompileError::parse(self.current_line.get(), e.to_string())
                    }
                })
            }
            _ => Ok(()),
        }
    }

    fn report(&self) -> Option<String> {
        Some(format!("Line {}: in state '{}'", self.current_line.get(), self.fsm.current_state()))
    }
}
