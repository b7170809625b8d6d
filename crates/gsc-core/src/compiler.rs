//! Compiler frontend driver.
//!
//! Runs source bytes through parsing and lowering and folds every failure
//! into a single [`CompileError`] carrying the canonical name and the
//! rendered diagnostics.

use thiserror::Error;
use tracing::debug;

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::ir::{lower_file, IrModule};
use crate::source::{Source, Span};
use crate::syntax::ast::File;
use crate::syntax::{parse, ParseError};

/// A script failed to compile.
#[derive(Error, Debug, Clone)]
#[error("{rendered}")]
pub struct CompileError {
    /// Canonical name of the script.
    pub name: String,
    pub diagnostics: Diagnostics,
    /// Diagnostics rendered against the source, with locations and snippets.
    pub rendered: String,
}

impl CompileError {
    fn new(source: &Source, diagnostics: Diagnostics) -> Self {
        Self {
            name: source.name.clone(),
            rendered: diagnostics.render(source),
            diagnostics,
        }
    }
}

/// Convert a ParseError to a Diagnostic.
fn parse_error_to_diagnostic(e: &ParseError) -> Diagnostic {
    let message = match e {
        ParseError::Syntax { message, .. } => message.clone(),
        other => other.to_string(),
    };
    Diagnostic::error(message).with_span(e.span().unwrap_or_else(|| Span::point(0)))
}

/// Decode and parse a script.
pub fn parse_source(name: &str, bytes: &[u8]) -> Result<(Source, File), CompileError> {
    let content = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let source = Source::new(name, String::from_utf8_lossy(bytes));
            let mut diagnostics = Diagnostics::new();
            diagnostics.error(
                Span::point(e.valid_up_to()),
                "script source is not valid UTF-8",
            );
            return Err(CompileError::new(&source, diagnostics));
        }
    };
    let source = Source::new(name, content);
    match parse(&source.content) {
        Ok(file) => Ok((source, file)),
        Err(e) => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push(parse_error_to_diagnostic(&e));
            Err(CompileError::new(&source, diagnostics))
        }
    }
}

/// Compile script bytes into an IR module.
///
/// Identical input always yields identical IR.
pub fn compile(name: &str, bytes: &[u8]) -> Result<IrModule, CompileError> {
    let (source, file) = parse_source(name, bytes)?;
    let (module, diagnostics) = lower_file(name, &file);
    if diagnostics.has_errors() {
        return Err(CompileError::new(&source, diagnostics));
    }
    debug!(
        script = name,
        functions = module.functions.len(),
        includes = module.includes.len(),
        "compiled script"
    );
    Ok(module)
}
