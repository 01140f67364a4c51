#![forbid(unsafe_code)]

//! Read-only structural view of a host-language contract.
//!
//! This is deliberately not a full parser: it recovers exactly what the
//! instrumenter needs (state variables, the constructor, public entry
//! points with their signatures and body spans, and explicit return
//! statements) and passes everything else through untouched as source text.

mod reader;
mod token;

pub use reader::{read_contract, UnsupportedContract};

use tempo_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct ContractAst {
    pub name: String,
    pub span: Span,
    /// Offset just after the contract body's opening `{`.
    pub body_open: usize,
    /// Offset of the contract body's closing `}`.
    pub body_close: usize,
    pub state_vars: Vec<StateVar>,
    pub functions: Vec<Function>,
}

impl ContractAst {
    pub fn constructor(&self) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.kind == FunctionKind::Constructor)
    }

    /// Externally callable entry points, in declaration order. Fallback and
    /// receive count; they start transactions like any public function.
    pub fn public_entries(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| f.is_public_entry())
    }

    pub fn state_var(&self, name: &str) -> Option<&StateVar> {
        self.state_vars.iter().find(|v| v.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateVar {
    pub name: String,
    /// Declared type as source text (visibility keywords stripped).
    pub ty: String,
    pub span: Span,
}

impl StateVar {
    /// Element type of a fully indexed mapping read (`balances[k]` against
    /// `mapping(address => uint256)`). Nested mappings resolve to the type
    /// after the last `=>`.
    pub fn mapping_value_type(&self) -> Option<String> {
        let ty = self.ty.trim();
        if !ty.starts_with("mapping") {
            return None;
        }
        let after = ty.rsplit("=>").next()?;
        Some(after.trim().trim_end_matches(')').trim().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Regular,
    Constructor,
    Fallback,
    Receive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub ty: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    /// `constructor`, `fallback`, `receive`, or the declared identifier.
    pub name: String,
    pub kind: FunctionKind,
    pub visibility: Visibility,
    pub params: Vec<Param>,
    /// Source text of the parenthesized returns list, without `returns`.
    pub returns: Option<String>,
    /// The parameter list text between (not including) the parentheses.
    pub params_span: Span,
    /// Source text between the parameter list's `)` and the body `{`:
    /// visibility, mutability, modifiers, returns clause.
    pub attrs: String,
    /// Region the `attrs` text was read from.
    pub attrs_span: Span,
    /// Span of the declared name identifier (absent for constructor,
    /// fallback and receive).
    pub name_span: Option<Span>,
    /// From the introducing keyword through the token before the body `{`.
    pub sig_span: Span,
    /// The body including both braces.
    pub body_span: Span,
    /// Explicit `return …;` statements inside the body.
    pub return_spans: Vec<Span>,
    /// Body contains an `assembly` block (unroutable control flow).
    pub has_assembly: bool,
}

impl Function {
    pub fn is_public_entry(&self) -> bool {
        match self.kind {
            FunctionKind::Constructor => false,
            FunctionKind::Fallback | FunctionKind::Receive => true,
            FunctionKind::Regular => {
                matches!(self.visibility, Visibility::Public | Visibility::External)
            }
        }
    }
}
