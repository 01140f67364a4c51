#![forbid(unsafe_code)]

use miette::Diagnostic;
use tempo_ast::{span_between, Span};
use thiserror::Error;

use crate::token::{tokenize, SolTok, Tok};
use crate::{ContractAst, Function, FunctionKind, Param, StateVar, Visibility};

#[derive(Debug, Error, Diagnostic)]
#[error("unsupported contract: {message}")]
#[diagnostic(code(tempo::sol))]
pub struct UnsupportedContract {
    pub message: String,
    #[label]
    pub span: Span,
}

/// Recover the structural view of `name` (or the first contract when `None`)
/// from `src`.
pub fn read_contract(src: &str, name: Option<&str>) -> Result<ContractAst, UnsupportedContract> {
    let tokens = tokenize(src);
    Reader { src, tokens: &tokens }.read(name)
}

struct Reader<'a> {
    src: &'a str,
    tokens: &'a [Tok],
}

impl<'a> Reader<'a> {
    fn read(&self, wanted: Option<&str>) -> Result<ContractAst, UnsupportedContract> {
        let (decl_idx, contract_name) = self.find_contract(wanted)?;

        // Scan past any inheritance list to the body brace.
        let mut open = None;
        for (k, t) in self.tokens.iter().enumerate().skip(decl_idx) {
            if t.kind == SolTok::LBrace {
                open = Some(k);
                break;
            }
        }
        let open = open.ok_or_else(|| UnsupportedContract {
            message: format!("contract '{contract_name}' has no body"),
            span: self.tokens[decl_idx].span,
        })?;
        let close = self.matching_brace(open)?;

        let mut state_vars = Vec::new();
        let mut functions = Vec::new();

        let mut j = open + 1;
        while j < close {
            match &self.tokens[j].kind {
                SolTok::KwFunction => {
                    let (f, next) = self.read_function(j, FunctionKind::Regular)?;
                    functions.push(f);
                    j = next;
                }
                SolTok::KwConstructor => {
                    let (f, next) = self.read_function(j, FunctionKind::Constructor)?;
                    functions.push(f);
                    j = next;
                }
                SolTok::KwFallback => {
                    let (f, next) = self.read_function(j, FunctionKind::Fallback)?;
                    functions.push(f);
                    j = next;
                }
                SolTok::KwReceive => {
                    let (f, next) = self.read_function(j, FunctionKind::Receive)?;
                    functions.push(f);
                    j = next;
                }
                SolTok::KwModifier | SolTok::KwStruct | SolTok::KwEnum => {
                    j = self.skip_braced(j, close)?;
                }
                SolTok::KwEvent | SolTok::KwUsing => {
                    j = self.skip_to_semi(j, close);
                }
                _ => {
                    let (var, next) = self.read_state_var(j, close)?;
                    state_vars.push(var);
                    j = next;
                }
            }
        }

        Ok(ContractAst {
            name: contract_name,
            span: span_between(
                self.tokens[decl_idx].start(),
                self.tokens[close].end(),
            ),
            body_open: self.tokens[open].end(),
            body_close: self.tokens[close].start(),
            state_vars,
            functions,
        })
    }

    fn find_contract(&self, wanted: Option<&str>) -> Result<(usize, String), UnsupportedContract> {
        let mut k = 0;
        while k < self.tokens.len() {
            if self.tokens[k].kind == SolTok::KwContract {
                if let Some(SolTok::Ident(n)) = self.tokens.get(k + 1).map(|t| &t.kind) {
                    match wanted {
                        Some(w) if w != n => {}
                        _ => return Ok((k, n.clone())),
                    }
                }
            }
            k += 1;
        }
        Err(UnsupportedContract {
            message: match wanted {
                Some(w) => format!("contract '{w}' not found in source"),
                None => "no contract declaration found".to_string(),
            },
            span: span_between(0, 0),
        })
    }

    fn matching_brace(&self, open: usize) -> Result<usize, UnsupportedContract> {
        let mut depth = 0usize;
        for (k, t) in self.tokens.iter().enumerate().skip(open) {
            match t.kind {
                SolTok::LBrace => depth += 1,
                SolTok::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(k);
                    }
                }
                _ => {}
            }
        }
        Err(UnsupportedContract {
            message: "unbalanced braces".to_string(),
            span: self.tokens[open].span,
        })
    }

    fn skip_braced(&self, from: usize, limit: usize) -> Result<usize, UnsupportedContract> {
        let mut k = from;
        while k < limit {
            match self.tokens[k].kind {
                SolTok::LBrace => return Ok(self.matching_brace(k)? + 1),
                SolTok::Semi => return Ok(k + 1),
                _ => k += 1,
            }
        }
        Ok(limit)
    }

    fn skip_to_semi(&self, from: usize, limit: usize) -> usize {
        let mut k = from;
        while k < limit && self.tokens[k].kind != SolTok::Semi {
            k += 1;
        }
        (k + 1).min(limit)
    }

    fn read_state_var(
        &self,
        from: usize,
        limit: usize,
    ) -> Result<(StateVar, usize), UnsupportedContract> {
        let start = self.tokens[from].start();
        let mut k = from;
        let mut depth = 0usize;
        let mut eq_at: Option<usize> = None;
        let mut semi_at: Option<usize> = None;

        while k < limit {
            match self.tokens[k].kind {
                SolTok::LParen | SolTok::LBracket | SolTok::LBrace => depth += 1,
                SolTok::RParen | SolTok::RBracket | SolTok::RBrace => depth -= 1,
                SolTok::Eq if depth == 0 && eq_at.is_none() => eq_at = Some(k),
                SolTok::Semi if depth == 0 => {
                    semi_at = Some(k);
                    break;
                }
                _ => {}
            }
            k += 1;
        }

        let semi = semi_at.ok_or_else(|| UnsupportedContract {
            message: "state variable declaration without ';'".to_string(),
            span: self.tokens[from].span,
        })?;
        let decl_end = eq_at.unwrap_or(semi);

        // Name is the last identifier of the declaration head; the type text
        // ends at the name or at the first visibility-ish keyword.
        let mut name: Option<&Tok> = None;
        let mut vis_start: Option<usize> = None;
        for t in &self.tokens[from..decl_end] {
            match &t.kind {
                SolTok::Ident(_) => name = Some(t),
                SolTok::KwPublic
                | SolTok::KwExternal
                | SolTok::KwInternal
                | SolTok::KwPrivate
                | SolTok::KwConstant
                | SolTok::KwImmutable => {
                    if vis_start.is_none() {
                        vis_start = Some(t.start());
                    }
                }
                _ => {}
            }
        }
        let name = name.ok_or_else(|| UnsupportedContract {
            message: "cannot read state variable declaration".to_string(),
            span: span_between(start, self.tokens[semi].end()),
        })?;
        let SolTok::Ident(var_name) = &name.kind else {
            unreachable!("filtered above");
        };

        let ty_end = vis_start.unwrap_or(name.start()).min(name.start());
        let ty = self.src[start..ty_end].trim().to_string();

        Ok((
            StateVar {
                name: var_name.clone(),
                ty,
                span: span_between(start, self.tokens[semi].end()),
            },
            semi + 1,
        ))
    }

    fn read_function(
        &self,
        kw: usize,
        kind: FunctionKind,
    ) -> Result<(Function, usize), UnsupportedContract> {
        let sig_start = self.tokens[kw].start();
        let mut j = kw + 1;

        let (name, name_span) = match kind {
            FunctionKind::Regular => {
                let Some(tok) = self.tokens.get(j) else {
                    return Err(self.err_at(kw, "truncated function declaration"));
                };
                let SolTok::Ident(n) = &tok.kind else {
                    return Err(self.err_at(j, "expected function name"));
                };
                j += 1;
                (n.clone(), Some(tok.span))
            }
            FunctionKind::Constructor => ("constructor".to_string(), None),
            FunctionKind::Fallback => ("fallback".to_string(), None),
            FunctionKind::Receive => ("receive".to_string(), None),
        };

        if self.tokens.get(j).map(|t| &t.kind) != Some(&SolTok::LParen) {
            return Err(self.err_at(j.min(self.tokens.len() - 1), "expected parameter list"));
        }
        let params_open = self.tokens[j].end();
        let (params, after_params) = self.read_params(j)?;
        let params_span = span_between(params_open, self.tokens[after_params - 1].start());
        j = after_params;

        // Attributes run to the body `{` (or a forbidden `;`).
        let attrs_start = self.tokens[j - 1].end();
        let mut depth = 0usize;
        let mut returns: Option<String> = None;
        let mut visibility: Option<Visibility> = None;
        let body_open = loop {
            let Some(tok) = self.tokens.get(j) else {
                return Err(self.err_at(kw, "function declaration without body"));
            };
            match &tok.kind {
                SolTok::LParen => depth += 1,
                SolTok::RParen => depth -= 1,
                SolTok::LBrace if depth == 0 => break j,
                SolTok::Semi if depth == 0 => {
                    return Err(UnsupportedContract {
                        message: format!("function '{name}' has no body"),
                        span: tok.span,
                    });
                }
                SolTok::KwPublic => visibility = Some(Visibility::Public),
                SolTok::KwExternal => visibility = Some(Visibility::External),
                SolTok::KwInternal => visibility = Some(Visibility::Internal),
                SolTok::KwPrivate => visibility = Some(Visibility::Private),
                SolTok::KwReturns => {
                    returns = Some(self.read_returns_group(j)?);
                }
                _ => {}
            }
            j += 1;
        };

        let attrs_span = span_between(attrs_start, self.tokens[body_open].start());
        let attrs = self.src[attrs_start..self.tokens[body_open].start()]
            .trim()
            .to_string();

        let visibility = match (kind, visibility) {
            (FunctionKind::Regular, Some(v)) => v,
            (FunctionKind::Regular, None) => {
                return Err(UnsupportedContract {
                    message: format!("cannot recover visibility of function '{name}'"),
                    span: span_between(sig_start, self.tokens[body_open].start()),
                });
            }
            (FunctionKind::Constructor, _) => Visibility::Public,
            (FunctionKind::Fallback | FunctionKind::Receive, v) => {
                v.unwrap_or(Visibility::External)
            }
        };

        let body_close = self.matching_brace(body_open)?;

        let mut return_spans = Vec::new();
        let mut has_assembly = false;
        for k in body_open + 1..body_close {
            match self.tokens[k].kind {
                SolTok::KwReturn => {
                    let semi = self.skip_to_semi(k, body_close);
                    let end = self
                        .tokens
                        .get(semi.saturating_sub(1))
                        .map(|t| t.end())
                        .unwrap_or_else(|| self.tokens[k].end());
                    return_spans.push(span_between(self.tokens[k].start(), end));
                }
                SolTok::KwAssembly => has_assembly = true,
                _ => {}
            }
        }

        Ok((
            Function {
                name,
                kind,
                visibility,
                params,
                returns,
                params_span,
                attrs,
                attrs_span,
                name_span,
                sig_span: span_between(sig_start, self.tokens[body_open].start()),
                body_span: span_between(
                    self.tokens[body_open].start(),
                    self.tokens[body_close].end(),
                ),
                return_spans,
                has_assembly,
            },
            body_close + 1,
        ))
    }

    fn read_params(&self, lparen: usize) -> Result<(Vec<Param>, usize), UnsupportedContract> {
        let mut params = Vec::new();
        let mut depth = 0usize;
        let mut group_start: Option<usize> = None;
        let mut last_ident: Option<&Tok> = None;
        let mut group_tokens = 0usize;

        let mut k = lparen;
        loop {
            let Some(tok) = self.tokens.get(k) else {
                return Err(self.err_at(lparen, "unterminated parameter list"));
            };
            match &tok.kind {
                SolTok::LParen => {
                    depth += 1;
                    if depth == 1 {
                        k += 1;
                        continue;
                    }
                }
                SolTok::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(gs) = group_start {
                            params.push(self.finish_param(gs, tok.start(), last_ident, group_tokens));
                        }
                        return Ok((params, k + 1));
                    }
                }
                SolTok::Comma if depth == 1 => {
                    if let Some(gs) = group_start {
                        params.push(self.finish_param(gs, tok.start(), last_ident, group_tokens));
                    }
                    group_start = None;
                    last_ident = None;
                    group_tokens = 0;
                    k += 1;
                    continue;
                }
                _ => {}
            }
            if group_start.is_none() {
                group_start = Some(tok.start());
            }
            if let SolTok::Ident(_) = &tok.kind {
                last_ident = Some(tok);
            }
            group_tokens += 1;
            k += 1;
        }
    }

    fn finish_param(
        &self,
        start: usize,
        end: usize,
        last_ident: Option<&Tok>,
        group_tokens: usize,
    ) -> Param {
        // `uint256 amount` -> ty "uint256", name "amount"; a lone token is an
        // unnamed parameter.
        match last_ident {
            Some(id) if group_tokens >= 2 && id.end() == self.src[..end].trim_end().len() => {
                let SolTok::Ident(n) = &id.kind else {
                    unreachable!();
                };
                Param {
                    ty: self.src[start..id.start()].trim().to_string(),
                    name: n.clone(),
                }
            }
            _ => Param {
                ty: self.src[start..end].trim().to_string(),
                name: String::new(),
            },
        }
    }

    fn read_returns_group(&self, kw: usize) -> Result<String, UnsupportedContract> {
        let mut k = kw + 1;
        if self.tokens.get(k).map(|t| &t.kind) != Some(&SolTok::LParen) {
            return Err(self.err_at(kw, "expected '(' after returns"));
        }
        let open_end = self.tokens[k].end();
        let mut depth = 0usize;
        loop {
            let Some(tok) = self.tokens.get(k) else {
                return Err(self.err_at(kw, "unterminated returns clause"));
            };
            match tok.kind {
                SolTok::LParen => depth += 1,
                SolTok::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.src[open_end..tok.start()].trim().to_string());
                    }
                }
                _ => {}
            }
            k += 1;
        }
    }

    fn err_at(&self, idx: usize, message: &str) -> UnsupportedContract {
        UnsupportedContract {
            message: message.to_string(),
            span: self
                .tokens
                .get(idx)
                .map(|t| t.span)
                .unwrap_or_else(|| span_between(0, 0)),
        }
    }
}
