//! `AsciiCategorizer` — classifies each character of a source line into the
//! five ASCII categories the tokenizer's FSM is built over.

use std::cell::Cell;
use std::rc::Rc;

use crate::engine::Module;
use crate::error::{caret_line, CompileError};
use crate::event::Event;

pub struct AsciiCategorizer {
    last_line: String,
    last_position: usize,
    current_line: Rc<Cell<usize>>,
}

impl AsciiCategorizer {
    /// `current_line` is shared with the tokenizer and syntax recognizer so
    /// every stage reports the same source row in its error context; it is
    /// bumped here, once per `ascii_line` event, rather than once per
    /// `end_of_line` token, so it is already correct for lex errors that
    /// occur partway through the line being classified.
    pub fn new(current_line: Rc<Cell<usize>>) -> Self {
        AsciiCategorizer {
            last_line: String::new(),
            last_position: 0,
            current_line,
        }
    }

    fn classify_line(&mut self, line: &str, outbox: &mut Vec<Event>) {
        self.last_line = line.to_string();
        self.current_line.set(self.current_line.get() + 1);
        for (position, c) in line.chars().enumerate() {
            self.last_position = position;
            let kind = if c.is_ascii_alphabetic() {
                "ascii_character"
            } else if c.is_ascii_digit() {
                "ascii_digit"
            } else if c == ' ' {
                "ascii_delimiter"
            } else if c == '\n' || c == '\r' {
                "ascii_ctrl"
            } else {
                "ascii_special"
            };
            outbox.push(Event::with_char(kind, c));
        }
    }
}

impl Module for AsciiCategorizer {
    fn handles(&self, kind: &str) -> bool {
        matches!(kind, "ascii_line" | "source_eof")
    }

    fn handle(&mut self, event: &Event, outbox: &mut Vec<Event>) -> Result<(), CompileError> {
        match event.kind {
            "ascii_line" => {
                self.classify_line(&event.payload_str(), outbox);
                Ok(())
            }
            "source_eof" => {
                outbox.push(Event::none("ascii_eof"));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn report(&self) -> Option<String> {
        Some(caret_line(&self.last_line, Some(self.last_position)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_of_the_five_categories() {
        let mut categorizer = AsciiCategorizer::new(Rc::new(Cell::new(0)));
        let mut outbox = Vec::new();
        categorizer.classify_line("A1 +\n", &mut outbox);
        let kinds: Vec<&'static str> = outbox.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec!["ascii_character", "ascii_digit", "ascii_delimiter", "ascii_special", "ascii_ctrl"]
        );
    }

    #[test]
    fn bumps_the_shared_line_counter_once_per_line() {
        let current_line = Rc::new(Cell::new(0));
        let mut categorizer = AsciiCategorizer::new(Rc::clone(&current_line));
        let mut outbox = Vec::new();
        categorizer.classify_line("A\n", &mut outbox);
        categorizer.classify_line("B\n", &mut outbox);
        assert_eq!(current_line.get(), 2);
    }

    #[test]
    fn source_eof_forwards_to_ascii_eof() {
        let mut categorizer = AsciiCategorizer::new(Rc::new(Cell::new(0)));
        let mut outbox = Vec::new();
        categorizer
            .handle(&Event::none("source_eof"), &mut outbox)
            .unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].kind, "ascii_eof");
    }
}
