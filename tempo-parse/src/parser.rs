#![forbid(unsafe_code)]

use tempo_ast::{join, span_between, Atom, AtomSegment, Formula, FormulaKind};
use tempo_lex::{Token, TokenKind};

use crate::error::ParseError;

/// Suffix that marks a per-transaction call-flag atom (`transferCalled`).
const CALLED_SUFFIX: &str = "Called";

pub struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    idx: usize,
}

fn tok_start(t: &Token) -> usize {
    t.span.offset()
}

fn tok_end(t: &Token) -> usize {
    t.span.offset() + t.span.len()
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str, tokens: &'a [Token]) -> Self {
        Self { src, tokens, idx: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(&kind)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.idx).cloned();
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind.clone()) {
            return Ok(self.next().unwrap());
        }
        Err(ParseError::new(
            format!("expected {kind:?}"),
            self.peek()
                .map(|t| t.span)
                .unwrap_or_else(|| span_between(self.src.len(), self.src.len())),
        ))
    }

    pub fn parse_formula_eof(&mut self) -> Result<Formula, ParseError> {
        let f = self.parse_iff()?;
        if !self.at(TokenKind::Eof) {
            return Err(ParseError::new(
                "expected end of formula",
                self.peek().map(|t| t.span).unwrap_or(f.span),
            ));
        }
        Ok(f)
    }

    fn parse_iff(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_implies()?;
        while self.at(TokenKind::DArrow) {
            self.next();
            let rhs = self.parse_implies()?;
            let span = join(lhs.span, rhs.span);
            lhs = Formula {
                span,
                kind: FormulaKind::Iff(Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    // Implication is right-associative: `a -> b -> c` is `a -> (b -> c)`.
    fn parse_implies(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_or()?;
        if self.at(TokenKind::Arrow) {
            self.next();
            let rhs = self.parse_implies()?;
            let span = join(lhs.span, rhs.span);
            return Ok(Formula {
                span,
                kind: FormulaKind::Implies(Box::new(lhs), Box::new(rhs)),
            });
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::OrOr) {
            self.next();
            let rhs = self.parse_and()?;
            let span = join(lhs.span, rhs.span);
            lhs = Formula {
                span,
                kind: FormulaKind::Or(Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.at(TokenKind::AndAnd) {
            self.next();
            let rhs = self.parse_not()?;
            let span = join(lhs.span, rhs.span);
            lhs = Formula {
                span,
                kind: FormulaKind::And(Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Formula, ParseError> {
        if self.at(TokenKind::Bang) {
            let bang = self.next().unwrap();
            let sub = self.parse_not()?;
            let span = join(bang.span, sub.span);
            return Ok(Formula {
                span,
                kind: FormulaKind::Not(Box::new(sub)),
            });
        }
        self.parse_since()
    }

    fn parse_since(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_prefix()?;
        while self.at(TokenKind::KwSince) {
            self.next();
            let rhs = self.parse_prefix()?;
            let span = join(lhs.span, rhs.span);
            lhs = Formula {
                span,
                kind: FormulaKind::Since(Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Formula, ParseError> {
        let ctor = match self.peek_kind() {
            Some(TokenKind::KwPrev) => Some(FormulaKind::Prev as fn(Box<Formula>) -> FormulaKind),
            Some(TokenKind::KwOnce) => Some(FormulaKind::Once as fn(Box<Formula>) -> FormulaKind),
            Some(TokenKind::KwHist) => Some(FormulaKind::Hist as fn(Box<Formula>) -> FormulaKind),
            _ => None,
        };
        if let Some(ctor) = ctor {
            let kw = self.next().unwrap();
            let sub = self.parse_prefix()?;
            let span = join(kw.span, sub.span);
            return Ok(Formula {
                span,
                kind: ctor(Box::new(sub)),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Formula, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                if self.paren_opens_atom() {
                    return self.parse_atom();
                }
                let lp = self.next().unwrap();
                let inner = self.parse_iff()?;
                let rp = self.expect(TokenKind::RParen)?;
                Ok(Formula {
                    span: join(lp.span, rp.span),
                    kind: inner.kind,
                })
            }
            Some(TokenKind::Ident(_))
            | Some(TokenKind::Int)
            | Some(TokenKind::HostOp)
            | Some(TokenKind::KwOld) => self.parse_atom(),
            _ => Err(ParseError::new(
                "expected a formula",
                self.peek()
                    .map(|t| t.span)
                    .unwrap_or_else(|| span_between(0, 0)),
            )),
        }
    }

    /// Lookahead for `( … )`: if a host operator follows the matching close
    /// paren, the whole group is part of an atom (`(a + b) == c`), otherwise
    /// it is formula grouping.
    fn paren_opens_atom(&self) -> bool {
        let mut depth = 0usize;
        let mut j = self.idx;
        while let Some(t) = self.tokens.get(j) {
            match t.kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(j + 1).map(|t| &t.kind),
                            Some(TokenKind::HostOp) | Some(TokenKind::LBracket)
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            j += 1;
        }
        false
    }

    /// Consume a maximal atomic proposition. Host-language text is captured
    /// as verbatim source slices; `Old(·)` and `<fn>Called` become structured
    /// segments. Stops at any formula-level operator at bracket depth zero.
    fn parse_atom(&mut self) -> Result<Formula, ParseError> {
        let first = self.peek().ok_or_else(|| {
            ParseError::new(
                "expected an expression",
                span_between(self.src.len(), self.src.len()),
            )
        })?;
        let atom_start = tok_start(first);

        let mut segments: Vec<AtomSegment> = Vec::new();
        let mut anchor = atom_start;
        let mut end = atom_start;
        let mut depth = 0usize;

        loop {
            let Some(tok) = self.peek().cloned() else { break };
            match &tok.kind {
                TokenKind::Eof => {
                    if depth > 0 {
                        return Err(ParseError::new(
                            "unbalanced brackets in expression",
                            span_between(atom_start, end),
                        ));
                    }
                    break;
                }
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RBracket if depth == 0 => {
                    return Err(ParseError::new("unmatched ']' in expression", tok.span));
                }
                TokenKind::AndAnd
                | TokenKind::OrOr
                | TokenKind::Arrow
                | TokenKind::DArrow
                | TokenKind::Bang
                | TokenKind::KwSince
                | TokenKind::KwPrev
                | TokenKind::KwOnce
                | TokenKind::KwHist
                    if depth == 0 =>
                {
                    break;
                }
                TokenKind::KwOld => {
                    if anchor < tok_start(&tok) {
                        segments.push(AtomSegment::Host(
                            self.src[anchor..tok_start(&tok)].to_string(),
                        ));
                    }
                    self.next();
                    let inner_end = self.consume_old_operand(&tok)?;
                    end = inner_end.0;
                    segments.push(AtomSegment::Old(inner_end.1));
                    anchor = end;
                }
                TokenKind::Ident(name)
                    if name.len() > CALLED_SUFFIX.len() && name.ends_with(CALLED_SUFFIX) =>
                {
                    if anchor < tok_start(&tok) {
                        segments.push(AtomSegment::Host(
                            self.src[anchor..tok_start(&tok)].to_string(),
                        ));
                    }
                    let fn_name = name[..name.len() - CALLED_SUFFIX.len()].to_string();
                    segments.push(AtomSegment::Called(fn_name));
                    self.next();
                    end = tok_end(&tok);
                    anchor = end;
                }
                TokenKind::LParen | TokenKind::LBracket => {
                    depth += 1;
                    end = tok_end(&tok);
                    self.next();
                }
                TokenKind::RParen | TokenKind::RBracket => {
                    depth -= 1;
                    end = tok_end(&tok);
                    self.next();
                }
                _ => {
                    end = tok_end(&tok);
                    self.next();
                }
            }
        }

        if anchor < end {
            segments.push(AtomSegment::Host(self.src[anchor..end].to_string()));
        }

        trim_edges(&mut segments);
        if segments.is_empty() {
            return Err(ParseError::new(
                "expected an expression",
                span_between(atom_start, end.max(atom_start)),
            ));
        }

        Ok(Formula::atom(
            span_between(atom_start, end),
            Atom { segments },
        ))
    }

    /// After `Old`, consume `( e )` and return (end offset, operand text).
    fn consume_old_operand(&mut self, old_tok: &Token) -> Result<(usize, String), ParseError> {
        let lp = self.expect(TokenKind::LParen).map_err(|_| {
            ParseError::new(
                "Old must be applied to a parenthesized expression",
                old_tok.span,
            )
        })?;
        let inner_start = tok_end(&lp);

        let mut depth = 1usize;
        loop {
            let Some(tok) = self.next() else {
                return Err(ParseError::new("unterminated Old(...)", old_tok.span));
            };
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = self.src[inner_start..tok_start(&tok)].trim().to_string();
                        if inner.is_empty() {
                            return Err(ParseError::new(
                                "Old(...) requires an operand",
                                join(old_tok.span, tok.span),
                            ));
                        }
                        return Ok((tok_end(&tok), inner));
                    }
                }
                TokenKind::Eof => {
                    return Err(ParseError::new("unterminated Old(...)", old_tok.span));
                }
                _ => {}
            }
        }
    }
}

fn trim_edges(segments: &mut Vec<AtomSegment>) {
    if let Some(AtomSegment::Host(t)) = segments.first_mut() {
        *t = t.trim_start().to_string();
    }
    if let Some(AtomSegment::Host(t)) = segments.last_mut() {
        *t = t.trim_end().to_string();
    }
    segments.retain(|s| !matches!(s, AtomSegment::Host(t) if t.is_empty()));
}
