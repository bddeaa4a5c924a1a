//! RDF-style terms and triples.
//!
//! Terms are the atomic values of every graph in this crate: IRIs, blank
//! nodes, and literals. A triple is a subject–predicate–object statement.
//! Everything here is an ordered, hashable value type so graphs can be kept
//! in deterministic order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single RDF-style term.
///
/// # Invariants
/// - `Iri` holds the full IRI string, never a prefixed form.
/// - `Blank` labels are only meaningful within one graph.
/// - Ordering is derived and therefore stable across runs, which the graph
///   store relies on for deterministic iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    /// A full IRI, e.g. `https://brickschema.org/schema/Brick#AHU`.
    Iri(String),
    /// A blank (anonymous) node with a local label.
    Blank(String),
    /// A literal value with an optional datatype IRI.
    Literal {
        /// Lexical form.
        value: String,
        /// Datatype IRI, if typed.
        datatype: Option<String>,
    },
}

impl Term {
    /// Creates an IRI term.
    #[inline]
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    /// Creates a blank node term.
    #[inline]
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    /// Creates an untyped literal term.
    #[inline]
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    /// Returns the IRI string if this term is an IRI.
    #[inline]
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if this term is an IRI.
    #[inline]
    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    /// Returns true if this term is a blank node.
    ///
    /// Blank nodes cannot be named in remediation output, so several
    /// consumers skip them (e.g. the report interpreter drops class
    /// requirements whose expected class is blank).
    #[inline]
    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }

    /// Returns true if this term is a literal.
    #[inline]
    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }
}

impl fmt::Display for Term {
    /// Renders the term in N3-ish form: `<iri>`, `_:label`, `"value"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(s) => write!(f, "<{}>", s),
            Term::Blank(l) => write!(f, "_:{}", l),
            Term::Literal { value, datatype } => match datatype {
                Some(dt) => write!(f, "\"{}\"^^<{}>", value, dt),
                None => write!(f, "\"{}\"", value),
            },
        }
    }
}

/// A subject–predicate–object statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Subject term.
    pub subject: Term,
    /// Predicate term. Always an IRI in well-formed data, but kept as a
    /// `Term` so malformed report graphs can still be carried around.
    pub predicate: Term,
    /// Object term.
    pub object: Term,
}

impl Triple {
    /// Creates a new triple.
    #[inline]
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

impl From<(Term, Term, Term)> for Triple {
    #[inline]
    fn from((s, p, o): (Term, Term, Term)) -> Self {
        Triple::new(s, p, o)
    }
}

/// An IRI namespace: a base IRI that suffixes are appended to.
///
/// Mirrors the namespace objects the vocabulary module is built from; also
/// used for the caller-supplied namespaces that `Template::fill` invents
/// entities inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    base: String,
}

impl Namespace {
    /// Creates a namespace from its base IRI.
    #[inline]
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Returns the base IRI.
    #[inline]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Constructs an IRI term inside this namespace.
    #[inline]
    pub fn term(&self, suffix: &str) -> Term {
        Term::Iri(format!("{}{}", self.base, suffix))
    }

    /// Returns the suffix of `term` if it lives inside this namespace.
    pub fn local_name<'a>(&self, term: &'a Term) -> Option<&'a str> {
        term.as_iri().and_then(|iri| iri.strip_prefix(self.base.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_ordering_is_stable() {
        let a = Term::iri("urn:a");
        let b = Term::iri("urn:b");
        let bl = Term::blank("x");
        assert!(a < b);
        // Variant order: Iri < Blank < Literal.
        assert!(b < bl);
        assert!(bl < Term::literal("x"));
    }

    #[test]
    fn test_term_display() {
        assert_eq!(Term::iri("urn:a").to_string(), "<urn:a>");
        assert_eq!(Term::blank("b0").to_string(), "_:b0");
        assert_eq!(Term::literal("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn test_namespace_roundtrip() {
        let ns = Namespace::new("urn:bldg/");
        let t = ns.term("ahu1");
        assert_eq!(t, Term::iri("urn:bldg/ahu1"));
        assert_eq!(ns.local_name(&t), Some("ahu1"));
        assert_eq!(ns.local_name(&Term::iri("urn:other/x")), None);
    }
}
