#![forbid(unsafe_code)]

use logos::Logos;
use miette::Diagnostic;
use tempo_ast::{span_between, Span};
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(tempo::lex))]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
    #[token("Prev")]
    KwPrev,
    #[token("Once")]
    KwOnce,
    #[token("Hist")]
    KwHist,
    #[token("Since")]
    KwSince,
    #[token("Old")]
    KwOld,

    #[token("<->")]
    DArrow,
    #[token("->")]
    Arrow,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    // `!=` is a host comparison; it must win over `!`.
    #[token("!=")]
    HostNeq,
    #[token("!")]
    Bang,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[token("==")]
    #[token("<=")]
    #[token(">=")]
    #[token("<")]
    #[token(">")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token(".")]
    #[token(",")]
    HostOp,

    #[regex(r"0x[0-9a-fA-F]+")]
    #[regex(r"[0-9]+")]
    Int,

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let range = lex.span();
            let span = span_between(range.start, range.end);

            let kind = match raw {
                Ok(RawToken::KwPrev) => TokenKind::KwPrev,
                Ok(RawToken::KwOnce) => TokenKind::KwOnce,
                Ok(RawToken::KwHist) => TokenKind::KwHist,
                Ok(RawToken::KwSince) => TokenKind::KwSince,
                Ok(RawToken::KwOld) => TokenKind::KwOld,

                Ok(RawToken::DArrow) => TokenKind::DArrow,
                Ok(RawToken::Arrow) => TokenKind::Arrow,
                Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                Ok(RawToken::OrOr) => TokenKind::OrOr,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::HostNeq) => TokenKind::HostOp,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,

                Ok(RawToken::HostOp) => TokenKind::HostOp,
                Ok(RawToken::Int) => TokenKind::Int,
                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),

                Err(_) => {
                    return Err(LexError {
                        message: "unexpected character in formula".to_string(),
                        span,
                    });
                }
            };

            tokens.push(Token { kind, span });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
        });

        Ok(tokens)
    }
}
