#![forbid(unsafe_code)]

use tempo_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Temporal keywords
    KwPrev,
    KwOnce,
    KwHist,
    KwSince,
    KwOld,

    // Boolean connectives
    Bang,
    AndAnd,
    OrOr,
    Arrow,
    DArrow,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,

    /// A host-language operator (`==`, `<=`, `+`, `.`, `,`, …). The parser
    /// never interprets these; they only mark that an atom continues.
    HostOp,

    Ident(String),
    Int,

    Eof,
}

impl TokenKind {
    /// Tokens that may appear inside an atomic proposition.
    pub fn continues_atom(&self) -> bool {
        matches!(
            self,
            TokenKind::HostOp
                | TokenKind::Ident(_)
                | TokenKind::Int
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::KwOld
        )
    }
}
