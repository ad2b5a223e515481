//! `FileReader` — opens the source, emits one `ascii_line` event per line.

use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::engine::Module;
use crate::error::CompileError;
use crate::event::Event;

pub struct FileReader {
    lines: Option<std::io::Lines<BufReader<File>>>,
    line_count: usize,
    last_line: String,
    pending: Vec<Event>,
}

impl FileReader {
    pub fn new() -> Self {
        FileReader {
            lines: None,
            line_count: 0,
            last_line: String::new(),
            pending: Vec::new(),
        }
    }

    fn open(&mut self, path: &str) -> Result<(), CompileError> {
        let file = File::open(path)
            .map_err(|e| CompileError::io(format!("{}: {}", path, e)))?;
        self.lines = Some(BufReader::new(file).lines());
        self.line_count = 0;
        self.pending.push(Event::none("read"));
        Ok(())
    }

    fn read(&mut self, outbox: &mut Vec<Event>) -> Result<(), CompileError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(());
        };
        match lines.next() {
            Some(Ok(line)) => {
                self.line_count += 1;
                self.last_line = line.clone();
                // Re-attach the newline the `Lines` iterator strips, so the
                // ASCII categorizer still sees an `ascii_ctrl` event marking
                // the end of each statement.
                outbox.push(Event::with_str("ascii_line", format!("{}\n", line)));
                self.pending.push(Event::none("read"));
            }
            Some(Err(e)) => {
                return Err(CompileError::io(format!("read error: {}", e)));
            }
            None => {
                self.pending.push(Event::none("close"));
            }
        }
        Ok(())
    }

    fn close(&mut self, outbox: &mut Vec<Event>) {
        self.lines = None;
        outbox.push(Event::none("source_eof"));
    }
}

impl Default for FileReader {
    fn default() -> Self {
        FileReader::new()
    }
}

impl Module for FileReader {
    fn handles(&self, kind: &str) -> bool {
        matches!(kind, "open" | "read" | "close")
    }

    fn handle(&mut self, event: &Event, outbox: &mut Vec<Event>) -> Result<(), CompileError> {
        match event.kind {
            "open" => {
                let path = event.payload_str();
                self.open(&path)
            }
            "read" => self.read(outbox),
            "close" => {
                self.close(outbox);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn pop_internal(&mut self) -> Option<Event> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    fn report(&self) -> Option<String> {
        Some(format!("Line {}: {}", self.line_count, self.last_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_an_io_error() {
        let mut reader = FileReader::new();
        let mut outbox = Vec::new();
        let err = reader.handle(&Event::with_str("open", "/no/such/file.bas"), &mut outbox).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }

    #[test]
    fn reads_every_line_then_closes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10 LET X = 1").unwrap();
        writeln!(file, "20 END").unwrap();

        let mut reader = FileReader::new();
        let mut outbox = Vec::new();
        reader
            .handle(&Event::with_str("open", file.path().to_str().unwrap()), &mut outbox)
            .unwrap();

        let mut lines = Vec::new();
        while let Some(internal) = reader.pop_internal() {
            reader.handle(&internal, &mut outbox).unwrap();
        }

        let ascii_lines: Vec<String> = outbox
            .iter()
            .filter(|e| e.kind == "ascii_line")
            .map(|e| e.payload_str())
            .collect();
        assert_eq!(ascii_lines, vec!["10 LET X = 1\n", "20 END\n"]);
        assert_eq!(outbox.last().unwrap().kind, "source_eof");
    }
}
