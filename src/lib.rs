//! An expression-enabled G-code dialect front end and evaluator: incremental
//! text in, executable `Command { name, params }` values (or error strings)
//! out. Expressions ride inside statements via the `{...}` embedding syntax
//! (`G1 X{1+offset}`) and resolve parameters through an injected [`Lookup`].

pub mod ast;
mod interpreter;
mod parser;
mod queue;
mod scanner;
mod source;
mod value;

pub use interpreter::{Command, EvalError, Interpreter};
pub use parser::{ParseError, Parser};
pub use queue::{Exec, ScriptQueue, EMERGENCY_STOP};
pub use scanner::{ScanError, Scanner, Token, TokenKind, TokenName};
pub use source::Location;
pub use value::{Lookup, ParamTable, Value};
