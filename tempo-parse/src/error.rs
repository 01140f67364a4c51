#![forbid(unsafe_code)]

use miette::{Diagnostic, NamedSource};
use tempo_ast::Span;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(tempo::parse))]
pub struct ParseError {
    pub message: String,
    #[label]
    pub span: Span,
    /// The predicate text, so the report handler can render the caret.
    #[source_code]
    pub src: Option<NamedSource<String>>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            src: None,
        }
    }

    pub fn with_source(mut self, name: &str, text: &str) -> Self {
        self.src = Some(NamedSource::new(name, text.to_string()));
        self
    }
}
