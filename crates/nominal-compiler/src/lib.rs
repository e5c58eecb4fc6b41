//! Nominal's front end: the lexer, a single-pass recursive-descent
//! parser that emits bytecode directly into a `nominal_runtime::Program`
//! (spec.md §4.4/§4.5), and the `State` embedding facade (spec.md §6)
//! that hosts drive.

pub mod lexer;
pub mod parser;
pub mod state;

pub use lexer::{Lexer, Position, Token, TokenKind};
pub use parser::compile;
pub use state::State;
