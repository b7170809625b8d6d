//! Syntax module - parsing and AST definitions for GSC scripts.

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::{parse, ParseError};
