#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub fn join(a: Span, b: Span) -> Span {
    let start = a.offset().min(b.offset());
    let end = (a.offset() + a.len()).max(b.offset() + b.len());
    span_between(start, end)
}

pub type Ident = Spanned<String>;

/// One piece of an atomic proposition. Host-language text is carried
/// opaquely; only the `Old(·)` and `<fn>Called` forms are structured.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AtomSegment {
    /// Verbatim host-language text, emitted unchanged.
    Host(String),
    /// `Old(e)`: the host expression `e`, to be read from a pre-state snapshot.
    Old(String),
    /// `<fn>Called`: the per-transaction call flag for public function `fn`.
    Called(String),
}

/// An atomic proposition over the contract's observable domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Atom {
    pub segments: Vec<AtomSegment>,
}

impl Atom {
    pub fn host(text: impl Into<String>) -> Self {
        Self {
            segments: vec![AtomSegment::Host(text.into())],
        }
    }

    /// Host expressions appearing under `Old(·)`, in order of appearance.
    pub fn old_exprs(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            AtomSegment::Old(e) => Some(e.as_str()),
            _ => None,
        })
    }

    /// Functions referenced through `<fn>Called` flags.
    pub fn called_fns(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            AtomSegment::Called(f) => Some(f.as_str()),
            _ => None,
        })
    }

    /// Render the atom to host-language text, substituting `Old(·)` and
    /// `<fn>Called` occurrences through the given callbacks.
    pub fn render(
        &self,
        mut old: impl FnMut(&str) -> String,
        mut called: impl FnMut(&str) -> String,
    ) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                AtomSegment::Host(t) => out.push_str(t),
                AtomSegment::Old(e) => out.push_str(&old(e)),
                AtomSegment::Called(f) => out.push_str(&called(f)),
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formula {
    pub span: Span,
    pub kind: FormulaKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormulaKind {
    Atom(Atom),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
    Prev(Box<Formula>),
    Once(Box<Formula>),
    Hist(Box<Formula>),
    Since(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn atom(span: Span, atom: Atom) -> Self {
        Self {
            span,
            kind: FormulaKind::Atom(atom),
        }
    }

    /// True when the formula is `ident -> …` with `ident` as a bare atom on
    /// the left. The iteration controller uses this to avoid stacking guards.
    pub fn is_guarded_by(&self, ident: &str) -> bool {
        let FormulaKind::Implies(lhs, _) = &self.kind else {
            return false;
        };
        let FormulaKind::Atom(atom) = &lhs.kind else {
            return false;
        };
        matches!(
            atom.segments.as_slice(),
            [AtomSegment::Host(t)] if t.trim() == ident
        )
    }

    /// Wrap as `guard -> self` without touching the original structure.
    pub fn guarded_by(self, ident: &str) -> Formula {
        let span = self.span;
        Formula {
            span,
            kind: FormulaKind::Implies(
                Box::new(Formula::atom(span, Atom::host(ident))),
                Box::new(self),
            ),
        }
    }
}
