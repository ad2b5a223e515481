//! `Tokenizer` — maximal-munch lexer built on [`crate::fsm`].
//!
//! Token kinds double as event kinds downstream (`variable`, `identifier`,
//! `number`, `string`, `special`, `end_of_line`, `eof`) per spec.md §4.2's
//! grammar. The tokenizer carries no semantic actions of its own — it is a
//! pure classification FSM — so every transition's `action` is `None`.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::Module;
use crate::error::CompileError;
use crate::event::Event;
use crate::fsm::{Fsm, FsmEvent, FsmState, FsmTemplate, Transition};
use crate::fsm::EventMatcher::{Exact, Kind};

fn build_template() -> Rc<FsmTemplate> {
    let mut states = HashMap::new();

    states.insert(
        "start",
        FsmState::new(
            None,
            vec![
                Transition::new(Kind("ascii_character"), "variable"),
                Transition::new(Kind("ascii_digit"), "number"),
                Transition::new(Exact("ascii_special", "\""), "string_body"),
                Transition::new(Exact("ascii_special", ">"), "greater_than"),
                Transition::new(Exact("ascii_special", "<"), "less_than"),
                Transition::new(Kind("ascii_ctrl"), "eol"),
                Transition::new(Kind("ascii_special"), "special_single"),
            ],
        ),
    );

    states.insert(
        "variable",
        FsmState::new(
            Some("variable"),
            vec![
                Transition::new(Kind("ascii_character"), "identifier"),
                Transition::new(Kind("ascii_digit"), "variable_digit"),
            ],
        ),
    );
    states.insert(
        "variable_digit",
        FsmState::new(
            Some("variable"),
            vec![Transition::new(Kind("ascii_character"), "invalid")],
        ),
    );
    states.insert("invalid", FsmState::new(None, vec![]));
    states.insert(
        "identifier",
        FsmState::new(
            Some("identifier"),
            vec![
                Transition::new(Kind("ascii_character"), "identifier"),
                Transition::new(Kind("ascii_digit"), "identifier"),
            ],
        ),
    );

    states.insert(
        "number",
        FsmState::new(
            Some("number"),
            vec![
                Transition::new(Exact("ascii_character", "E"), "number_exp_start"),
                Transition::new(Kind("ascii_digit"), "number"),
                Transition::new(Exact("ascii_special", "."), "number"),
            ],
        ),
    );
    states.insert(
        "number_exp_start",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("ascii_special", "+"), "number_exp_after_sign"),
                Transition::new(Exact("ascii_special", "-"), "number_exp_after_sign"),
                Transition::new(Kind("ascii_digit"), "number_exp"),
            ],
        ),
    );
    states.insert(
        "number_exp_after_sign",
        FsmState::new(None, vec![Transition::new(Kind("ascii_digit"), "number_exp")]),
    );
    states.insert(
        "number_exp",
        FsmState::new(
            Some("number"),
            vec![
                Transition::new(Kind("ascii_digit"), "number_exp"),
                // Over-accepts a second mantissa/exponent rather than
                // validating — spec.md §9 Open Question 3, kept as-is.
                Transition::new(Exact("ascii_character", "E"), "number_exp_start"),
                Transition::new(Exact("ascii_special", "."), "number_exp"),
            ],
        ),
    );

    states.insert(
        "string_body",
        FsmState::new(
            None,
            vec![
                Transition::new(Exact("ascii_special", "\""), "string_maybe_end"),
                Transition::new(Kind("ascii_character"), "string_body"),
                Transition::new(Kind("ascii_digit"), "string_body"),
                Transition::new(Kind("ascii_delimiter"), "string_body"),
                Transition::new(Kind("ascii_special"), "string_body"),
            ],
        ),
    );
    states.insert(
        "string_maybe_end",
        FsmState::new(
            Some("string"),
            vec![Transition::new(Exact("ascii_special", "\""), "string_body")],
        ),
    );

    states.insert(
        "greater_than",
        FsmState::new(
            Some("special"),
            vec![Transition::new(Exact("ascii_special", "="), "ge")],
        ),
    );
    states.insert("ge", FsmState::new(Some("special"), vec![]));
    states.insert(
        "less_than",
        FsmState::new(
            Some("special"),
            vec![
                Transition::new(Exact("ascii_special", "="), "le"),
                Transition::new(Exact("ascii_special", ">"), "ne"),
            ],
        ),
    );
    states.insert("le", FsmState::new(Some("special"), vec![]));
    states.insert("ne", FsmState::new(Some("special"), vec![]));
    states.insert("special_single", FsmState::new(Some("special"), vec![]));
    states.insert("eol", FsmState::new(Some("end_of_line"), vec![]));

    Rc::new(FsmTemplate::new(states))
}

pub struct Tokenizer {
    fsm: Fsm,
    current_line: Rc<Cell<usize>>,
}

impl Tokenizer {
    pub fn new(current_line: Rc<Cell<usize>>) -> Self {
        Tokenizer {
            fsm: Fsm::new(build_template()),
            current_line,
        }
    }

    fn feed(&mut self, kind: &'static str, payload: String, outbox: &mut Vec<Event>) -> Result<(), CompileError> {
        let event = FsmEvent::new(kind, payload);
        match self.fsm.transition(&event) {
            Ok(Some(token)) => {
                outbox.push(Event::with_str(token.kind, token.lexeme));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(CompileError::from_fsm(self.current_line.get(), e)),
        }
    }
}

impl Module for Tokenizer {
    fn handles(&self, kind: &str) -> bool {
        matches!(
            kind,
            "ascii_character" | "ascii_digit" | "ascii_delimiter" | "ascii_ctrl" | "ascii_special" | "ascii_eof"
        )
    }

    fn handle(&mut self, event: &Event, outbox: &mut Vec<Event>) -> Result<(), CompileError> {
        match event.kind {
            "ascii_delimiter" => {
                // Spaces are consumed but never lexed into a token, unless
                // they occur inside an unterminated string literal, where
                // they are ordinary content.
                if self.fsm.current_state() == "string_body" {
                    self.feed("ascii_delimiter", event.payload_str(), outbox)
                } else {
                    match self.fsm.flush() {
                        Ok(Some(token)) => {
                            outbox.push(Event::with_str(token.kind, token.lexeme));
                            Ok(())
                        }
                        Ok(None) => Ok(()),
                        Err(e) => Err(CompileError::from_fsm(self.current_line.get(), e)),
                    }
                }
            }
            "ascii_eof" => {
                match self.fsm.flush() {
                    Ok(Some(token)) => outbox.push(Event::with_str(token.kind, token.lexeme)),
                    Ok(None) => {}
                    Err(e) => return Err(CompileError::from_fsm(self.current_line.get(), e)),
                }
                outbox.push(Event::none("eof"));
                Ok(())
            }
            kind @ ("ascii_character" | "ascii_digit" | "ascii_ctrl" | "ascii_special") => {
                self.feed(kind, event.payload_str(), outbox)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(line: &str) -> Vec<(String, String)> {
        let mut tok = Tokenizer::new(Rc::new(Cell::new(1)));
        let mut outbox = Vec::new();
        for c in line.chars() {
            let kind = if c.is_ascii_alphabetic() {
                "ascii_character"
            } else if c.is_ascii_digit() {
                "ascii_digit"
            } else if c == ' ' {
                "ascii_delimiter"
            } else if c == '\n' {
                "ascii_ctrl"
            } else {
                "ascii_special"
            };
            let event = Event::with_char(kind, c);
            tok.handle(&event, &mut outbox).unwrap();
        }
        tok.handle(&Event::none("ascii_eof"), &mut outbox).unwrap();
        outbox
            .into_iter()
            .map(|e| (e.kind.to_string(), e.payload_str()))
            .filter(|(k, _)| k != "eof")
            .collect()
    }

    #[test]
    fn keyword_and_number_tokenize_separately() {
        let tokens = tokenize("10 LET X = 5\n");
        let kinds: Vec<&str> = tokens.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(kinds, vec!["number", "identifier", "variable", "special", "number", "end_of_line"]);
    }

    #[test]
    fn a_lone_letter_is_a_variable_not_an_identifier() {
        let tokens = tokenize("X\n");
        assert_eq!(tokens[0], ("variable".to_string(), "X".to_string()));
    }

    #[test]
    fn a_variable_may_carry_one_trailing_digit() {
        let tokens = tokenize("X1\n");
        assert_eq!(tokens[0], ("variable".to_string(), "X1".to_string()));
    }

    #[test]
    fn string_literal_lexeme_includes_its_quotes() {
        let tokens = tokenize("\"hi\"\n");
        assert_eq!(tokens[0], ("string".to_string(), "\"hi\"".to_string()));
    }

    #[test]
    fn relational_operators_maximal_munch() {
        assert_eq!(tokenize(">=\n")[0], ("special".to_string(), ">=".to_string()));
        assert_eq!(tokenize("<>\n")[0], ("special".to_string(), "<>".to_string()));
        assert_eq!(tokenize("<\n")[0], ("special".to_string(), "<".to_string()));
    }

    #[test]
    fn scientific_notation_number() {
        let tokens = tokenize("1.5E+10\n");
        assert_eq!(tokens[0], ("number".to_string(), "1.5E+10".to_string()));
    }
}
