//! Well-known vocabulary namespaces and terms.
//!
//! Collects every IRI the engine reads or writes: the RDF/RDFS/OWL core,
//! the SHACL validation vocabulary consumed by the report interpreter, the
//! reserved parameter namespace that marks template placeholders, and the
//! count-constraint vocabulary for graph-level cardinality shapes.

use crate::term::{Namespace, Term};

/// Reserved namespace for template parameter placeholders.
///
/// A node in a template body is a parameter exactly when its IRI starts with
/// this base. The suffix is the parameter name.
pub const PARAM_NS: &str = "urn:___param___#";

/// Reserved namespace for the matcher's invented fill values.
pub const MARK_NS: &str = "urn:___mark___#";

/// Graph-level cardinality constraint vocabulary.
pub const CONSTRAINT_NS: &str = "urn:graft/constraints#";

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
const OWL_NS: &str = "http://www.w3.org/2002/07/owl#";
const SH_NS: &str = "http://www.w3.org/ns/shacl#";

/// `rdf:type`, conventionally written `a`.
pub fn a() -> Term {
    Term::iri(format!("{RDF_NS}type"))
}

/// `rdf:Property`.
pub fn rdf_property() -> Term {
    Term::iri(format!("{RDF_NS}Property"))
}

/// `rdfs:subClassOf`.
pub fn rdfs_subclass_of() -> Term {
    Term::iri(format!("{RDFS_NS}subClassOf"))
}

/// `rdfs:subPropertyOf`.
pub fn rdfs_subproperty_of() -> Term {
    Term::iri(format!("{RDFS_NS}subPropertyOf"))
}

/// `owl:Class`.
pub fn owl_class() -> Term {
    Term::iri(format!("{OWL_NS}Class"))
}

/// `owl:ObjectProperty`.
pub fn owl_object_property() -> Term {
    Term::iri(format!("{OWL_NS}ObjectProperty"))
}

/// `owl:DatatypeProperty`.
pub fn owl_datatype_property() -> Term {
    Term::iri(format!("{OWL_NS}DatatypeProperty"))
}

/// `owl:NamedIndividual` — the generic marker type assigned to nodes with no
/// declared type.
pub fn owl_named_individual() -> Term {
    Term::iri(format!("{OWL_NS}NamedIndividual"))
}

/// `rdf:first` — RDF collection head.
pub fn rdf_first() -> Term {
    Term::iri(format!("{RDF_NS}first"))
}

/// `rdf:rest` — RDF collection tail.
pub fn rdf_rest() -> Term {
    Term::iri(format!("{RDF_NS}rest"))
}

/// `rdf:nil` — RDF collection terminator.
pub fn rdf_nil() -> Term {
    Term::iri(format!("{RDF_NS}nil"))
}

/// Builds a SHACL vocabulary term.
pub fn sh(suffix: &str) -> Term {
    Term::iri(format!("{SH_NS}{suffix}"))
}

/// Builds a count-constraint vocabulary term.
pub fn constraint(suffix: &str) -> Term {
    Term::iri(format!("{CONSTRAINT_NS}{suffix}"))
}

/// Returns the parameter namespace.
pub fn param_ns() -> Namespace {
    Namespace::new(PARAM_NS)
}

/// Builds the placeholder term for a parameter name.
pub fn param(name: &str) -> Term {
    Term::iri(format!("{PARAM_NS}{name}"))
}

/// Extracts the parameter name from a placeholder term, if it is one.
pub fn param_name(term: &Term) -> Option<&str> {
    term.as_iri().and_then(|iri| iri.strip_prefix(PARAM_NS))
}
