//! The Event Engine: a deterministic, single-threaded driver for the four
//! pipeline stages (spec.md §4.5).
//!
//! Each stage is a [`Module`] with a name-indexed handler table (expressed
//! here as `handles`/`handle`) and its own internal FIFO queue for events it
//! schedules against itself (e.g. `FileReader` re-queuing `read` to keep
//! pulling lines). `add_event` at the engine level is a *broadcast*: every
//! module whose table matches the event's kind receives it, in module
//! declaration order, and each event a handler produces while running is
//! fully resolved — including everything *it* in turn produces — before the
//! engine moves on to the next event at the same level. That nested
//! resolution order is what gives the pipeline its single, reproducible
//! total ordering; it is implemented here as an explicit stack rather than
//! recursion so it holds up under Rust's aliasing rules.

use crate::error::CompileError;
use crate::event::Event;

/// One pipeline stage.
pub trait Module {
    /// Whether this module's handler table has an entry for `kind`.
    fn handles(&self, kind: &str) -> bool;

    /// Handle one event. Events this module wants to broadcast to the rest
    /// of the pipeline are pushed onto `outbox`, in emission order. Events
    /// this module wants to reschedule against only itself should be queued
    /// internally (see [`Module::pop_internal`]) rather than pushed here.
    fn handle(&mut self, event: &Event, outbox: &mut Vec<Event>) -> Result<(), CompileError>;

    /// Pop the next self-scheduled event, if any.
    fn pop_internal(&mut self) -> Option<Event> {
        None
    }

    /// One diagnostic context line, contributed after an uncaught error.
    fn report(&self) -> Option<String> {
        None
    }
}

/// Owns the ordered list of modules and drives them to completion.
pub struct EventEngine {
    modules: Vec<Box<dyn Module>>,
}

impl EventEngine {
    pub fn new(modules: Vec<Box<dyn Module>>) -> Self {
        EventEngine { modules }
    }

    fn broadcast_one(&mut self, event: Event, stack: &mut Vec<Event>) -> Result<(), CompileError> {
        let mut outbox = Vec::new();
        for module in &mut self.modules {
            if module.handles(event.kind) {
                module.handle(&event, &mut outbox)?;
            }
        }
        // Depth-first: events produced by this handler are resolved (and
        // everything *they* produce) before any event already waiting below
        // them on the stack.
        for produced in outbox.into_iter().rev() {
            stack.push(produced);
        }
        Ok(())
    }

    /// Broadcast `event` to every matching module and pump until every
    /// internal queue is drained.
    pub fn start(&mut self, event: Event) -> Result<(), CompileError> {
        let mut stack = vec![event];
        loop {
            if let Some(event) = stack.pop() {
                self.broadcast_one(event, &mut stack)?;
                continue;
            }
            let mut advanced = false;
            for i in 0..self.modules.len() {
                if let Some(event) = self.modules[i].pop_internal() {
                    let mut outbox = Vec::new();
                    self.modules[i].handle(&event, &mut outbox)?;
                    for produced in outbox.into_iter().rev() {
                        stack.push(produced);
                    }
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                return Ok(());
            }
        }
    }

    /// One diagnostic line per module that can contribute one, in module
    /// declaration order (spec.md §4.5).
    pub fn report(&self) -> Vec<String> {
        self.modules.iter().filter_map(|m| m.report()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Re-emits `ping` as three `pong`s, then stops.
    struct Pinger;
    impl Module for Pinger {
        fn handles(&self, kind: &str) -> bool {
            kind == "ping"
        }
        fn handle(&mut self, _event: &Event, outbox: &mut Vec<Event>) -> Result<(), CompileError> {
            for _ in 0..3 {
                outbox.push(Event::none("pong"));
            }
            Ok(())
        }
    }

    /// Counts `pong`s it sees.
    struct Counter {
        seen: std::cell::Cell<usize>,
    }
    impl Module for Counter {
        fn handles(&self, kind: &str) -> bool {
            kind == "pong"
        }
        fn handle(&mut self, _event: &Event, _outbox: &mut Vec<Event>) -> Result<(), CompileError> {
            self.seen.set(self.seen.get() + 1);
            Ok(())
        }
        fn report(&self) -> Option<String> {
            Some(format!("saw {} pongs", self.seen.get()))
        }
    }

    struct Failing;
    impl Module for Failing {
        fn handles(&self, kind: &str) -> bool {
            kind == "boom"
        }
        fn handle(&mut self, _event: &Event, _outbox: &mut Vec<Event>) -> Result<(), CompileError> {
            Err(CompileError::io("kaboom"))
        }
    }

    #[test]
    fn broadcasts_produced_events_to_every_matching_module() {
        let mut engine = EventEngine::new(vec![Box::new(Pinger), Box::new(Counter { seen: std::cell::Cell::new(0) })]);
        engine.start(Event::none("ping")).unwrap();
        assert_eq!(engine.report(), vec!["saw 3 pongs".to_string()]);
    }

    #[test]
    fn start_propagates_the_first_module_error() {
        let mut engine = EventEngine::new(vec![Box::new(Failing)]);
        assert!(engine.start(Event::none("boom")).is_err());
    }

    #[test]
    fn report_collects_one_line_per_contributing_module_in_order() {
        let engine = EventEngine::new(vec![Box::new(Pinger), Box::new(Counter { seen: std::cell::Cell::new(2) })]);
        assert_eq!(engine.report(), vec!["saw 2 pongs".to_string()]);
    }
}
