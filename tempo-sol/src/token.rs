#![forbid(unsafe_code)]

use logos::Logos;
use tempo_ast::{span_between, Span};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum SolTok {
    #[token("contract")]
    KwContract,
    #[token("function")]
    KwFunction,
    #[token("constructor")]
    KwConstructor,
    #[token("fallback")]
    KwFallback,
    #[token("receive")]
    KwReceive,
    #[token("modifier")]
    KwModifier,
    #[token("event")]
    KwEvent,
    #[token("struct")]
    KwStruct,
    #[token("enum")]
    KwEnum,
    #[token("using")]
    KwUsing,
    #[token("returns")]
    KwReturns,
    #[token("return")]
    KwReturn,
    #[token("assembly")]
    KwAssembly,

    #[token("public")]
    KwPublic,
    #[token("external")]
    KwExternal,
    #[token("internal")]
    KwInternal,
    #[token("private")]
    KwPrivate,
    #[token("constant")]
    KwConstant,
    #[token("immutable")]
    KwImmutable,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("=>")]
    FatArrow,
    // Compound assignments must not decompose into `op` + `=`.
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    CompoundOp,
    #[token("=")]
    Eq,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r"'([^'\\]|\\.)*'")]
    Str,

    #[regex(r"[0-9][0-9a-fA-Fx_]*")]
    Num,

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Any other operator or punctuation character, passed through.
    #[regex(r".", priority = 0)]
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tok {
    pub kind: SolTok,
    pub span: Span,
}

impl Tok {
    pub fn start(&self) -> usize {
        self.span.offset()
    }

    pub fn end(&self) -> usize {
        self.span.offset() + self.span.len()
    }
}

/// Tokenize a whole source file. Characters the lexer cannot classify do not
/// exist: the catch-all `Other` rule accepts any single byte.
pub fn tokenize(src: &str) -> Vec<Tok> {
    let mut out = Vec::new();
    let mut lex = SolTok::lexer(src);
    while let Some(raw) = lex.next() {
        let range = lex.span();
        if let Ok(kind) = raw {
            out.push(Tok {
                kind,
                span: span_between(range.start, range.end),
            });
        }
    }
    out
}
