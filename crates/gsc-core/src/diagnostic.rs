//! Diagnostic types for error reporting.

use crate::source::{Source, Span};
use std::fmt;

/// A single compile error.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Render the diagnostic with source context.
    pub fn render(&self, source: &Source) -> String {
        let mut output = format!("error: {}\n", self.message);

        if let Some(span) = self.span {
            let (line, col) = source.line_col(span.start);
            output.push_str(&format!("  --> {}:{}:{}\n", source.name, line, col));
            let snippet = source.snippet(line, 1);
            if !snippet.is_empty() {
                output.push_str(&snippet);
                output.push('\n');
            }
        } else {
            output.push_str(&format!("  --> {}\n", source.name));
        }

        for note in &self.notes {
            output.push_str(&format!("  = note: {}\n", note));
        }

        output
    }
}

/// A collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::error(message).with_span(span));
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Render all diagnostics.
    pub fn render(&self, source: &Source) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.render(source))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.diagnostics {
            writeln!(f, "error: {}", diag.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_at_script_name() {
        let source = Source::new("maps/mp/foo", "main()\n{\n  x = ;\n}\n");
        let diag = Diagnostic::error("expected expression").with_span(Span::new(15, 16));
        let rendered = diag.render(&source);
        assert!(rendered.starts_with("error: expected expression\n"));
        assert!(rendered.contains("--> maps/mp/foo:3:7"), "{}", rendered);
        assert!(rendered.contains("   3 |   x = ;"));
    }

    #[test]
    fn test_collects_errors_in_order() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.error(Span::default(), "bad");
        diags.push(Diagnostic::error("worse").with_note("see above"));
        assert_eq!(diags.error_count(), 2);
        assert_eq!(diags.to_string(), "error: bad\nerror: worse\n");

        let rendered = diags.render(&Source::new("a", "main() {}"));
        assert!(rendered.ends_with("  --> a\n  = note: see above\n"), "{}", rendered);
    }
}
