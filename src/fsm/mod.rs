//! A reusable finite-state-machine engine.
//!
//! The same engine drives both [`crate::tokenizer`] (lexical analysis, one
//! event per source character) and [`crate::syntax`] (syntax analysis, one
//! event per token), which is the point of building it as a standalone
//! module rather than writing two bespoke hand-rolled lexers. A state
//! machine may also activate a *sub-FSM*: a nested machine that takes over
//! event dispatch until it reaches one of its own accepting dead ends, at
//! which point control returns to the parent and the parent's semantic
//! action for that call site fires. This is how the expression grammar
//! (`crate::syntax::expression`) is factored out of every syntactic position
//! that accepts an expression (LET right-hand side, IF operands, FOR bounds,
//! PRINT items, function arguments) without being duplicated in each one.
//!
//! See `spec.md` §4.1 for the algorithm this module implements; the shape
//! here follows it step for step.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Either kind of failure a run through the machine can produce: a dead end
/// (no transition out of a non-accepting state — a syntax error) or a
/// semantic action that rejected its own input (a `Result::Err` returned
/// from a [`SemanticAction`] — a semantic error the source program itself
/// triggered, e.g. a duplicate label or a `NEXT` with no matching `FOR`).
#[derive(Debug, Clone, PartialEq)]
pub enum FsmError {
    DeadEnd {
        state: &'static str,
        event_kind: &'static str,
        payload: String,
    },
    Action(String),
}

impl fmt::Display for FsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsmError::DeadEnd { state, event_kind, payload } => write!(
                f,
                "no transition from state '{}' on {} '{}'",
                state, event_kind, payload
            ),
            FsmError::Action(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for FsmError {}

/// The event an FSM transition is driven by: a kind tag plus its text
/// payload. Built from [`crate::event::Event`] by each consuming module
/// (the tokenizer turns ASCII-category events into `FsmEvent`s; the syntax
/// recognizer turns `Token`s into them).
#[derive(Debug, Clone, PartialEq)]
pub struct FsmEvent {
    pub kind: &'static str,
    pub payload: String,
}

impl FsmEvent {
    pub fn new(kind: &'static str, payload: impl Into<String>) -> Self {
        FsmEvent {
            kind,
            payload: payload.into(),
        }
    }
}

/// A completed token: the accepting state's token kind plus the accumulated
/// lexeme.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: &'static str,
    pub lexeme: String,
}

/// What a transition matches against. Case-insensitive comparison is applied
/// uniformly for [`EventMatcher::Exact`] so that keyword recognition doesn't
/// need to special-case casing at every call site.
#[derive(Clone)]
pub enum EventMatcher {
    /// Matches only events of this kind whose payload equals `value`,
    /// case-insensitively.
    Exact(&'static str, &'static str),
    /// Matches any event of this kind, regardless of payload.
    Kind(&'static str),
    /// Delegates to a nested FSM template. Taken unconditionally once
    /// reached in the scan, same as [`EventMatcher::Empty`] — table authors
    /// place more specific matchers earlier in a state's transition list so
    /// they get first refusal.
    SubFsm(Rc<FsmTemplate>),
    /// Unconditional epsilon-transition. Never consumes the event; always
    /// placed last in a state's transition list.
    Empty,
}

fn matches(matcher: &EventMatcher, event: &FsmEvent) -> bool {
    match matcher {
        EventMatcher::Exact(kind, value) => {
            event.kind == *kind && event.payload.eq_ignore_ascii_case(value)
        }
        EventMatcher::Kind(kind) => event.kind == *kind,
        EventMatcher::SubFsm(_) => true,
        EventMatcher::Empty => true,
    }
}

/// Semantic action attached to a transition: runs with the triggering
/// event's payload. Actions are `Rc`-shared closures rather than plain `fn`
/// pointers because they close over the IR generator's semantic state
/// (`Rc<RefCell<SemanticState>>`); the FSM engine itself stays oblivious to
/// what they do beyond propagating an `Err` as a [`FsmError::Action`] up
/// through the transition that triggered it, so a semantic action can reject
/// the program it was triggered by (spec.md §7's `SemanticError`) instead of
/// only ever succeeding.
pub type SemanticAction = Rc<dyn Fn(&str) -> Result<(), String>>;

/// A single transition out of a state.
#[derive(Clone)]
pub struct Transition {
    pub matcher: EventMatcher,
    pub target: &'static str,
    pub action: Option<SemanticAction>,
}

impl Transition {
    pub fn new(matcher: EventMatcher, target: &'static str) -> Self {
        Transition {
            matcher,
            target,
            action: None,
        }
    }

    pub fn with_action(matcher: EventMatcher, target: &'static str, action: SemanticAction) -> Self {
        Transition {
            matcher,
            target,
            action: Some(action),
        }
    }
}

/// A named state: an optional accepting token kind plus its ordered
/// transition list. A non-`None` `accept` marks the state as accepting.
#[derive(Clone)]
pub struct FsmState {
    pub accept: Option<&'static str>,
    pub transitions: Vec<Transition>,
}

impl FsmState {
    pub fn new(accept: Option<&'static str>, transitions: Vec<Transition>) -> Self {
        FsmState { accept, transitions }
    }
}

/// A static table of states, shared read-only by every runtime instance
/// built from it. Sub-FSM templates in particular are cloned into a fresh
/// runtime on every activation but always point back at the same template.
pub struct FsmTemplate {
    pub states: HashMap<&'static str, FsmState>,
}

impl FsmTemplate {
    pub fn new(states: HashMap<&'static str, FsmState>) -> Self {
        FsmTemplate { states }
    }

    fn state(&self, name: &'static str) -> &FsmState {
        self.states
            .get(name)
            .unwrap_or_else(|| panic!("FSM template missing state '{}'", name))
    }
}

/// A running instance of an [`FsmTemplate`]. Owns its own accumulator and at
/// most one active child FSM; many runtimes may share the same template.
pub struct Fsm {
    template: Rc<FsmTemplate>,
    current: &'static str,
    accumulator: String,
    child: Option<Box<Fsm>>,
    /// Set only on FSMs activated as a sub-FSM; fires when this instance
    /// reaches an accepting dead end, signalling "sub-grammar complete" to
    /// the parent.
    on_success: Option<SemanticAction>,
}

impl Fsm {
    pub fn new(template: Rc<FsmTemplate>) -> Self {
        Fsm {
            template,
            current: "start",
            accumulator: String::new(),
            child: None,
            on_success: None,
        }
    }

    fn child_of(template: Rc<FsmTemplate>, on_success: Option<SemanticAction>) -> Self {
        Fsm {
            template,
            current: "start",
            accumulator: String::new(),
            child: None,
            on_success,
        }
    }

    pub fn reset(&mut self) {
        self.current = "start";
        self.accumulator.clear();
    }

    pub fn current_state(&self) -> &'static str {
        self.current
    }

    /// Complete the current token if the machine happens to be sitting in an
    /// accepting state, used by the tokenizer to flush on whitespace (which
    /// is consumed but never itself lexed into a token — spec.md §4.2).
    /// Returns `Ok(None)` if nothing is pending (machine is at `start`).
    pub fn flush(&mut self) -> Result<Option<Token>, FsmError> {
        if self.current == "start" && self.accumulator.is_empty() {
            return Ok(None);
        }
        let state = self.template.state(self.current);
        match state.accept {
            Some(kind) => {
                let lexeme = std::mem::take(&mut self.accumulator);
                self.reset();
                Ok(Some(Token { kind, lexeme }))
            }
            None => Err(FsmError::DeadEnd {
                state: self.current,
                event_kind: "ascii_delimiter",
                payload: String::new(),
            }),
        }
    }

    /// Feed one event to the machine. Returns the token completed by this
    /// event's arrival, if any.
    pub fn transition(&mut self, event: &FsmEvent) -> Result<Option<Token>, FsmError> {
        if let Some(child) = self.child.as_mut() {
            match child.transition(event)? {
                Some(_token) => {
                    self.child = None;
                    // Sub-FSM accepted; re-dispatch the same event against
                    // our own current state (step 2 of spec.md §4.1).
                }
                None => return Ok(None),
            }
        }
        self.step(event)
    }

    fn step(&mut self, event: &FsmEvent) -> Result<Option<Token>, FsmError> {
        let state = self.template.state(self.current);
        let found = state
            .transitions
            .iter()
            .find(|t| matches(&t.matcher, event))
            .cloned();
        match found {
            Some(t) => self.apply(&t, event),
            None => self.dead_end(event, state),
        }
    }

    fn apply(&mut self, t: &Transition, event: &FsmEvent) -> Result<Option<Token>, FsmError> {
        match &t.matcher {
            EventMatcher::SubFsm(template) => {
                self.current = t.target;
                let mut child = Fsm::child_of(Rc::clone(template), t.action.clone());
                child.reset();
                self.child = Some(Box::new(child));
                self.transition(event)
            }
            EventMatcher::Empty => {
                self.current = t.target;
                if let Some(action) = &t.action {
                    action(&event.payload).map_err(FsmError::Action)?;
                }
                self.step(event)
            }
            _ => {
                self.current = t.target;
                if let Some(action) = &t.action {
                    action(&event.payload).map_err(FsmError::Action)?;
                }
                self.accumulator.push_str(&event.payload);
                Ok(None)
            }
        }
    }

    fn dead_end(&mut self, event: &FsmEvent, state: &FsmState) -> Result<Option<Token>, FsmError> {
        match state.accept {
            None => Err(FsmError::DeadEnd {
                state: self.current,
                event_kind: event.kind,
                payload: event.payload.clone(),
            }),
            Some(kind) => {
                let lexeme = std::mem::take(&mut self.accumulator);
                let token = Token { kind, lexeme };
                if let Some(on_success) = self.on_success.take() {
                    on_success(&event.payload).map_err(FsmError::Action)?;
                    Ok(Some(token))
                } else {
                    self.reset();
                    // Re-feed e as the start of the next token; the token
                    // just completed is still what this call returns.
                    let _ = self.step(event)?;
                    Ok(Some(token))
                }
            }
        }
    }
}

impl Clone for Transition {
    fn clone(&self) -> Self {
        Transition {
            matcher: self.matcher.clone(),
            target: self.target,
            action: self.action.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits_template() -> Rc<FsmTemplate> {
        let mut states = HashMap::new();
        states.insert(
            "start",
            FsmState::new(
                None,
                vec![Transition::new(EventMatcher::Kind("digit"), "number")],
            ),
        );
        states.insert(
            "number",
            FsmState::new(
                Some("number"),
                vec![Transition::new(EventMatcher::Kind("digit"), "number")],
            ),
        );
        Rc::new(FsmTemplate::new(states))
    }

    #[test]
    fn maximal_munch_emits_longest_token() {
        let mut fsm = Fsm::new(digits_template());
        assert_eq!(fsm.transition(&FsmEvent::new("digit", "1")).unwrap(), None);
        assert_eq!(fsm.transition(&FsmEvent::new("digit", "2")).unwrap(), None);
        let token = fsm
            .transition(&FsmEvent::new("other", "x"))
            .unwrap()
            .expect("token should be completed by the dead end");
        assert_eq!(token.kind, "number");
        assert_eq!(token.lexeme, "12");
    }

    #[test]
    fn dead_end_on_non_accepting_state_is_an_error() {
        let mut fsm = Fsm::new(digits_template());
        let err = fsm.transition(&FsmEvent::new("other", "x")).unwrap_err();
        assert_eq!(err, FsmError::DeadEnd { state: "start", event_kind: "other", payload: "x".to_string() });
    }

    #[test]
    fn case_insensitive_exact_match() {
        let mut states = HashMap::new();
        states.insert(
            "start",
            FsmState::new(
                None,
                vec![Transition::new(
                    EventMatcher::Exact("word", "LET"),
                    "let",
                )],
            ),
        );
        states.insert("let", FsmState::new(Some("let"), vec![]));
        let template = Rc::new(FsmTemplate::new(states));
        let mut fsm = Fsm::new(template);
        assert_eq!(fsm.transition(&FsmEvent::new("word", "let")).unwrap(), None);
        let token = fsm
            .transition(&FsmEvent::new("other", ""))
            .unwrap()
            .unwrap();
        assert_eq!(token.kind, "let");
    }

    #[test]
    fn sub_fsm_activation_fires_on_success_and_returns_to_parent() {
        // Parent: start --call--> (sub-fsm "paren") --> target "after"
        let mut sub_states = HashMap::new();
        sub_states.insert(
            "start",
            FsmState::new(
                None,
                vec![Transition::new(EventMatcher::Exact("special", ")"), "done")],
            ),
        );
        sub_states.insert("done", FsmState::new(Some("paren"), vec![]));
        let sub_template = Rc::new(FsmTemplate::new(sub_states));

        let fired = Rc::new(std::cell::RefCell::new(false));
        let fired_clone = Rc::clone(&fired);
        let action: SemanticAction = Rc::new(move |_| {
            *fired_clone.borrow_mut() = true;
            Ok(())
        });

        let mut parent_states = HashMap::new();
        parent_states.insert(
            "start",
            FsmState::new(
                None,
                vec![Transition::with_action(
                    EventMatcher::SubFsm(sub_template),
                    "after",
                    action,
                )],
            ),
        );
        parent_states.insert("after", FsmState::new(Some("after"), vec![]));
        let parent_template = Rc::new(FsmTemplate::new(parent_states));

        let mut fsm = Fsm::new(parent_template);
        assert_eq!(
            fsm.transition(&FsmEvent::new("special", ")")).unwrap(),
            None
        );
        assert!(*fired.borrow(), "on_success action should have fired");
        assert_eq!(fsm.current_state(), "after");
    }
}
