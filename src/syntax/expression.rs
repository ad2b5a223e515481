//! The expression sub-FSM (spec.md §4.4), wired as `EventMatcher::SubFsm`
//! from every syntactic position that accepts an expression (LET's
//! right-hand side, IF's operands, FOR's bounds and step, PRINT's items,
//! READ/DIM's index expressions).
//!
//! Every `(` — grouping, a function call's argument, or one dimension of an
//! array index — hands off to one shared *inner* template via `SubFsm`:
//! `"("` is consumed by a plain transition that pushes the boundary marker
//! (`expr::open_paren`) and lands in a single-transition state whose sole
//! transition activates the inner template on whatever event follows. The
//! inner template parses a flat run of numbers/variables/unary-minus joined
//! by binary operators — it does not itself contain any `(`, so an
//! expression nested two parens deep (`SIN(X+(A*B))`, `A(B(1))`) is out of
//! scope. This is what keeps the template table constructible without
//! `Fsm` needing a self-referential `Rc<FsmTemplate>`; every expression
//! actually used by the Non-goals' worked examples (fibonacci, bubble sort)
//! only ever nests one level.
//!
//! Termination is the FSM engine's ordinary dead-end: the `after_value`
//! state has no transition for THEN/TO/STEP/a relop/comma/end-of-line, so
//! reaching one is a dead end into the accepting `"expression"` token,
//! firing whatever `on_success` the call site supplied when it invoked this
//! template as a sub-FSM (see `crate::syntax`).

use std::collections::HashMap;
use std::rc::Rc;

use crate::codegen::expr;
use crate::codegen::state::{SemanticState, SharedState};
use crate::fsm::EventMatcher::{Exact, Kind, SubFsm};
use crate::fsm::{FsmState, FsmTemplate, SemanticAction, Transition};

pub(super) fn action0(state: &SharedState, f: impl Fn(&mut SemanticState) + 'static) -> SemanticAction {
    let state = Rc::clone(state);
    Rc::new(move |_: &str| {
        f(&mut state.borrow_mut());
        Ok(())
    })
}

/// `operator`/`end_expression`/`end_of_variable`/`variable_dimension`/`number`
/// report errors via `Result`; this forwards an `Err` straight out through
/// the triggering transition as a [`crate::fsm::FsmError::Action`], which the
/// syntax recognizer turns into a `CompileError::Semantic` (spec.md §7) —
/// malformed numeric literals, dimension-count mismatches, and the like are
/// conditions a source program can trigger, not bookkeeping bugs.
pub(super) fn action_fallible(state: &SharedState, f: impl Fn(&mut SemanticState) -> Result<(), String> + 'static) -> SemanticAction {
    let state = Rc::clone(state);
    Rc::new(move |_: &str| f(&mut state.borrow_mut()))
}

/// Like [`action_fallible`] but forwards the triggering event's payload —
/// for actions that need the literal token text (`number`'s digits,
/// `operator`'s identifier name).
pub(super) fn action_fallible_payload(
    state: &SharedState,
    f: impl Fn(&mut SemanticState, &str) -> Result<(), String> + 'static,
) -> SemanticAction {
    let state = Rc::clone(state);
    Rc::new(move |payload: &str| f(&mut state.borrow_mut(), payload))
}

/// Builds the expression grammar. `nestable` is true only for the top-level
/// template handed to statement call sites; it adds the `(` handling
/// (grouping, calls, indexing) that the inner one-level-down template omits.
pub fn build(state: &SharedState, nestable: bool) -> Rc<FsmTemplate> {
    let mut states = HashMap::new();

    let mut value_transitions = vec![
        Transition::with_action(Exact("special", "-"), "value", action0(state, expr::negative_expression)),
        Transition::with_action(Kind("number"), "after_value", action_fallible_payload(state, expr::number)),
        Transition::with_action(Kind("variable"), "after_value", {
            let state = Rc::clone(state);
            Rc::new(move |payload: &str| {
                expr::variable(&mut state.borrow_mut(), payload);
                Ok(())
            })
        }),
    ];

    if nestable {
        value_transitions.push(Transition::with_action(
            Kind("identifier"),
            "value",
            action_fallible_payload(state, expr::operator),
        ));
        value_transitions.push(Transition::with_action(
            Exact("special", "("),
            "paren_opened",
            action0(state, expr::open_paren),
        ));
    }
    states.insert("value", FsmState::new(None, value_transitions));

    let mut after_value_transitions = vec![
        Transition::with_action(Exact("special", "+"), "value", action_fallible_payload(state, expr::operator)),
        Transition::with_action(Exact("special", "-"), "value", action_fallible_payload(state, expr::operator)),
        Transition::with_action(Exact("special", "*"), "value", action_fallible_payload(state, expr::operator)),
        Transition::with_action(Exact("special", "/"), "value", action_fallible_payload(state, expr::operator)),
        Transition::with_action(Exact("special", "^"), "value", action_fallible_payload(state, expr::operator)),
        // spec.md §4.4 writes the exponentiation operator literally as `↑`
        // (matching `original_source/`'s `semantic/Exp.py`); `^` is accepted
        // alongside it as the same operator, the ASCII spelling in common
        // use by this dialect's source programs.
        Transition::with_action(Exact("special", "\u{2191}"), "value", action_fallible_payload(state, expr::operator)),
    ];

    if nestable {
        after_value_transitions.push(Transition::with_action(
            Exact("special", ")"),
            "after_value",
            action_fallible(state, |s| {
                expr::end_expression(s)?;
                expr::end_nested_expression(s)
            }),
        ));
        after_value_transitions.push(Transition::with_action(
            Exact("special", "("),
            "index_entry",
            action0(state, expr::open_paren),
        ));
    }
    states.insert("after_value", FsmState::new(Some("expression"), after_value_transitions));

    if nestable {
        let inner = build(state, false);

        states.insert(
            "paren_opened",
            FsmState::new(
                None,
                vec![Transition::with_action(
                    SubFsm(Rc::clone(&inner)),
                    "after_value",
                    action_fallible(state, |s| {
                        expr::end_expression(s)?;
                        expr::end_nested_expression(s)
                    }),
                )],
            ),
        );
        states.insert(
            "index_entry",
            FsmState::new(
                None,
                vec![Transition::with_action(
                    SubFsm(inner),
                    "index_collected",
                    action_fallible(state, expr::variable_dimension),
                )],
            ),
        );
        states.insert(
            "index_collected",
            FsmState::new(
                None,
                vec![
                    Transition::with_action(Exact("special", ","), "index_entry", action0(state, expr::open_paren)),
                    Transition::with_action(
                        Exact("special", ")"),
                        "after_value",
                        action_fallible(state, expr::end_of_variable),
                    ),
                ],
            ),
        );
    }

    Rc::new(FsmTemplate::new(states))
}
