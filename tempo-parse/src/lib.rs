#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use tempo_lex::Lexer;

pub use error::ParseError;
pub use fmt::format_formula;
pub use parser::Parser;

/// Parse one PTLTL predicate string into a formula AST. Errors come back
/// with the predicate attached so the report handler can point into it.
pub fn parse_formula(src: &str) -> Result<tempo_ast::Formula, ParseError> {
    parse_bare(src).map_err(|e| e.with_source("predicate", src))
}

fn parse_bare(src: &str) -> Result<tempo_ast::Formula, ParseError> {
    let tokens = Lexer::new(src)
        .lex()
        .map_err(|e| ParseError::new(e.message, e.span))?;
    let mut parser = Parser::new(src, &tokens);
    parser.parse_formula_eof()
}
