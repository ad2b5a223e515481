//! The event type shared by every pipeline stage.
//!
//! An event is an ordered pair of an interned `kind` and an optional payload.
//! Events are immutable and flow one-way from producer to consumer; nothing
//! downstream of `FileReader` mutates an event once it has been emitted.

use std::fmt;

/// A single event flowing through the [`crate::engine::EventEngine`].
///
/// `kind` doubles as the key into each module's handler table, so it is kept
/// as a `&'static str` rather than a numeric enum — this keeps the handler
/// tables declarative and lets every stage describe its own vocabulary without
/// a shared central registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: &'static str,
    pub payload: Payload,
}

impl Event {
    pub fn new(kind: &'static str, payload: Payload) -> Self {
        Event { kind, payload }
    }

    pub fn with_str(kind: &'static str, payload: impl Into<String>) -> Self {
        Event::new(kind, Payload::Text(payload.into()))
    }

    pub fn with_char(kind: &'static str, c: char) -> Self {
        Event::new(kind, Payload::Char(c))
    }

    pub fn none(kind: &'static str) -> Self {
        Event::new(kind, Payload::None)
    }

    /// The payload rendered as a string, the representation the FSM engine's
    /// matchers and accumulators operate on.
    pub fn payload_str(&self) -> String {
        match &self.payload {
            Payload::Text(s) => s.clone(),
            Payload::Char(c) => c.to_string(),
            Payload::None => String::new(),
        }
    }
}

/// Event payload: a character (ASCII categorizer output), a string (lexeme or
/// source line), or absent (e.g. `eof`).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Char(char),
    Text(String),
    None,
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Char(c) => write!(f, "{}", c),
            Payload::Text(s) => write!(f, "{}", s),
            Payload::None => Ok(()),
        }
    }
}
