//! Graft: a knowledge-graph template engine.
//!
//! This crate implements three cooperating pieces:
//! - A **template algebra**: parameterized graph fragments with named
//!   placeholders, composable through dependencies with scoped renaming and
//!   optionality propagation, then inlined, evaluated against concrete
//!   bindings, or filled with invented entities.
//! - A **semantic subgraph matcher**: an ontology-aware monomorphism search
//!   that finds where (and how completely) a template already occurs in a
//!   data graph, pairing nodes by class/property ancestry rather than
//!   identity.
//! - A **validation-diff synthesizer**: an interpreter that turns a
//!   constraint-violation report into typed diffs and synthesizes, per focus
//!   entity, a minimal remediation template whose evaluation repairs the
//!   violation.
//!
//! The engine is single-threaded and CPU-bound; graphs are plain ordered
//! triple sets with deterministic iteration, so every operation is
//! reproducible run to run. Parsing, storage, and the validation engine
//! itself live outside this crate: it consumes and produces graphs.
//!
//! # Example
//!
//! ```
//! use graft::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let ahu = Term::iri("urn:ex/AHU");
//! let template = Template::new("ahu", Graph::from([(param("name"), a(), ahu.clone())]));
//! let bindings = BTreeMap::from([("name".to_string(), Term::iri("urn:bldg/ahu1"))]);
//! let graph = template
//!     .evaluate(&bindings, EvaluateOptions::default())
//!     .into_graph()
//!     .expect("all parameters bound");
//! assert!(graph.contains(&Term::iri("urn:bldg/ahu1"), &a(), &ahu));
//! ```

pub mod graph;
pub mod matcher;
pub mod namespaces;
pub mod ontology;
pub mod synthesis;
pub mod template;
pub mod term;
pub mod validation;

pub use graph::Graph;
pub use matcher::{Mapping, TemplateMatcher};
pub use ontology::OntologyIndex;
pub use template::{
    Binding, Dependency, EvaluateOptions, Evaluation, Library, Template, TemplateError, TemplateId,
};
pub use term::{Namespace, Term, Triple};
pub use validation::{DiffFocus, DiffKind, DiffSet, GraphDiff, ValidationContext};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::graph::Graph;
    pub use crate::matcher::{Mapping, TemplateMatcher};
    pub use crate::namespaces::{a, param, param_name, sh};
    pub use crate::ontology::OntologyIndex;
    pub use crate::synthesis::diffset_to_templates;
    pub use crate::template::{
        Binding, Dependency, EvaluateOptions, Evaluation, Library, Template, TemplateError,
        TemplateId,
    };
    pub use crate::term::{Namespace, Term, Triple};
    pub use crate::validation::{
        report_to_diffset, DiffFocus, DiffKind, DiffSet, GraphDiff, ValidationContext,
    };
}
