use std::collections::VecDeque;

use crate::{
    ast::Statement,
    interpreter::{Command, Interpreter},
    parser::Parser,
    scanner::{ScanError, Scanner, Token},
    value::Lookup,
};

/// Command word that fires the emergency-stop hook the moment the parser
/// recognizes it, independent of anything already waiting in the queue.
pub const EMERGENCY_STOP: &str = "M112";

#[derive(Debug)]
enum Entry {
    Statement(Statement),
    Failed(String),
}

/// Outcome of [`ScriptQueue::exec_next`]. Parse-time and run-time failures
/// surface through the same `Error` arm, so a downstream executor handles
/// one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Exec {
    Empty,
    Error(String),
    Command(Command),
}

/// Bridges the cheap incremental front end to (possibly slow) execution.
/// `parse`/`finish` push completed statements and rendered errors onto an
/// unbounded FIFO ring; `exec_next` pops and evaluates one entry at a time.
pub struct ScriptQueue<L: Lookup> {
    scanner: Scanner,
    parser: Parser,
    interpreter: Interpreter<L>,
    entries: VecDeque<Entry>,
    emergency_stop: Option<Box<dyn FnMut(&Statement)>>,
}

impl<L: Lookup> ScriptQueue<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            scanner: Scanner::new(),
            parser: Parser::new(),
            interpreter: Interpreter::new(lookup),
            entries: VecDeque::new(),
            emergency_stop: None,
        }
    }

    /// Install the out-of-band safety hook. It runs synchronously inside
    /// `parse`, not when the statement is eventually dequeued: the safety
    /// action must not wait behind queued, possibly slow, execution.
    pub fn on_emergency_stop(&mut self, hook: impl FnMut(&Statement) + 'static) {
        self.emergency_stop = Some(Box::new(hook));
    }

    pub fn lookup_mut(&mut self) -> &mut L {
        self.interpreter.lookup_mut()
    }

    /// Feed a chunk of input, which may split statements and even tokens
    /// arbitrarily. Returns the new queue depth.
    pub fn parse(&mut self, input: &str) -> usize {
        let items = self.scanner.scan(input);
        self.ingest(items);
        self.entries.len()
    }

    /// Flush a trailing unterminated statement as if a newline had been
    /// seen. Returns the new queue depth.
    pub fn finish(&mut self) -> usize {
        let items = self.scanner.finish();
        self.ingest(items);
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pop and execute the oldest entry. Statements and errors come back in
    /// exactly the order `parse` produced them.
    pub fn exec_next(&mut self) -> Exec {
        match self.entries.pop_front() {
            None => Exec::Empty,
            Some(Entry::Failed(message)) => Exec::Error(message),
            Some(Entry::Statement(statement)) => match self.interpreter.exec(&statement) {
                Ok(command) => Exec::Command(command),
                Err(error) => Exec::Error(error.to_string()),
            },
        }
    }

    fn ingest(&mut self, items: Vec<Result<Token, ScanError>>) {
        for item in items {
            match item {
                Err(error) => {
                    let message = format!("{} ({})", error, error.location());
                    self.entries.push_back(Entry::Failed(message));
                }
                Ok(token) => match self.parser.feed(token) {
                    Ok(Some(statement)) => {
                        if statement.command.eq_ignore_ascii_case(EMERGENCY_STOP) {
                            if let Some(hook) = self.emergency_stop.as_mut() {
                                hook(&statement);
                            }
                        }
                        self.entries.push_back(Entry::Statement(statement));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        let message = format!("{} ({})", error, error.location());
                        self.entries.push_back(Entry::Failed(message));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value::ParamTable;

    fn queue() -> ScriptQueue<ParamTable> {
        ScriptQueue::new(ParamTable::new())
    }

    fn command(exec: Exec) -> Command {
        match exec {
            Exec::Command(command) => command,
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[test]
    fn statements_drain_in_fifo_order() {
        let mut queue = queue();
        assert_eq!(queue.parse("G1 X=1\nG2 X=2\nG3 X=3\n"), 3);
        for expected in ["G1", "G2", "G3"] {
            assert_eq!(command(queue.exec_next()).name, expected);
        }
        assert_eq!(queue.exec_next(), Exec::Empty);
        assert!(queue.is_empty());
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let mut queue = queue();
        assert_eq!(queue.parse("G1 X="), 0);
        assert_eq!(queue.parse("12 Y={3+"), 0);
        assert_eq!(queue.parse("4}\n"), 1);
        assert_eq!(
            command(queue.exec_next()).params,
            vec!["X", "12", "Y", "7"]
        );
    }

    #[test]
    fn finish_flushes_the_trailing_statement() {
        let mut queue = queue();
        assert_eq!(queue.parse("M400"), 0);
        assert_eq!(queue.finish(), 1);
        assert_eq!(command(queue.exec_next()).name, "M400");
    }

    #[test]
    fn errors_keep_their_place_in_line() {
        let mut queue = queue();
        queue.parse("G1 X=1\nG1 X={1 2}\nG2 Y=2\n");
        assert_eq!(command(queue.exec_next()).name, "G1");
        match queue.exec_next() {
            Exec::Error(message) => {
                assert!(message.contains("line 2:"), "message: {}", message);
            }
            other => panic!("expected an error, got {:?}", other),
        }
        assert_eq!(command(queue.exec_next()).name, "G2");
        assert_eq!(queue.exec_next(), Exec::Empty);
    }

    #[test]
    fn runtime_errors_use_the_same_channel() {
        let mut queue = queue();
        queue.parse("G1 X={foo}\n");
        match queue.exec_next() {
            Exec::Error(message) => {
                assert_eq!(message, "Undefined parameter 'foo'");
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn emergency_stop_fires_at_parse_time() {
        let mut queue = queue();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = fired.clone();
        queue.on_emergency_stop(move |statement| {
            sink.borrow_mut().push(statement.command.clone());
        });

        // the hook runs during parse even though a slow statement is queued
        // ahead and exec_next has not been called at all
        queue.parse("G4 P=1000\nm112\n");
        assert_eq!(*fired.borrow(), vec!["m112".to_string()]);

        // the statement still executes in its queue position
        assert_eq!(command(queue.exec_next()).name, "G4");
        assert_eq!(command(queue.exec_next()).name, "m112");
    }

    #[test]
    fn lexical_errors_recover_on_the_next_line() {
        let mut queue = queue();
        queue.parse("G1 X={1 @ 2}\nG2\n");
        match queue.exec_next() {
            Exec::Error(message) => {
                assert!(message.contains("Unexpected character"), "{}", message);
                assert!(message.contains("(line 1:8)"), "{}", message);
            }
            other => panic!("expected an error, got {:?}", other),
        }
        assert_eq!(command(queue.exec_next()).name, "G2");
    }
}
