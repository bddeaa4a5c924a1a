//! Memoized ontology hierarchy index.
//!
//! Wraps a plain class/property-hierarchy graph and answers the transitive
//! lookups the matcher's feasibility predicate needs. The index owns its
//! caches: constructing a new `OntologyIndex` over a reloaded graph starts
//! with cold caches, which makes invalidation explicit — freshness is tied to
//! the handle, not to graph content.
//!
//! Caches use `RefCell` interior mutability; the engine is single-threaded
//! and synchronous throughout, and this type is deliberately `!Sync`. Callers
//! using the core from multiple threads must keep one index per invocation
//! or synchronize externally.

use crate::graph::Graph;
use crate::namespaces::{
    a, owl_class, owl_datatype_property, owl_named_individual, owl_object_property, rdf_property,
    rdfs_subclass_of, rdfs_subproperty_of,
};
use crate::term::Term;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// Caller-owned index over an ontology graph.
#[derive(Debug)]
pub struct OntologyIndex {
    graph: Graph,
    ancestor_cache: RefCell<BTreeMap<Term, BTreeSet<Term>>>,
    super_property_cache: RefCell<BTreeMap<Term, BTreeSet<Term>>>,
}

impl OntologyIndex {
    /// Builds an index over the given ontology graph.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            ancestor_cache: RefCell::new(BTreeMap::new()),
            super_property_cache: RefCell::new(BTreeMap::new()),
        }
    }

    /// The underlying ontology graph.
    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Reflexive-transitive closure along `rdfs:subClassOf`.
    ///
    /// Always contains `node` itself. Memoized per node.
    pub fn ancestors_of(&self, node: &Term) -> BTreeSet<Term> {
        if let Some(hit) = self.ancestor_cache.borrow().get(node) {
            return hit.clone();
        }
        let closure = self.graph.transitive_objects(node, &rdfs_subclass_of());
        self.ancestor_cache
            .borrow_mut()
            .insert(node.clone(), closure.clone());
        closure
    }

    /// Reflexive-transitive closure along `rdfs:subPropertyOf`.
    pub fn super_properties_of(&self, node: &Term) -> BTreeSet<Term> {
        if let Some(hit) = self.super_property_cache.borrow().get(node) {
            return hit.clone();
        }
        let closure = self.graph.transitive_objects(node, &rdfs_subproperty_of());
        self.super_property_cache
            .borrow_mut()
            .insert(node.clone(), closure.clone());
        closure
    }

    /// Direct `rdf:type` set of `node` in a given data graph.
    ///
    /// Defaults to the generic `owl:NamedIndividual` marker when the node has
    /// no declared type, so untyped individuals still participate in
    /// covariant type comparison.
    pub fn declared_types(&self, node: &Term, graph: &Graph) -> BTreeSet<Term> {
        let ty = a();
        let types: BTreeSet<Term> = graph
            .objects(node, &ty)
            .filter(|t| t.is_iri())
            .cloned()
            .collect();
        if types.is_empty() {
            BTreeSet::from([owl_named_individual()])
        } else {
            types
        }
    }

    /// Whether `node` is declared an ontology class in the index graph.
    pub fn is_class(&self, node: &Term) -> bool {
        self.graph.contains(node, &a(), &owl_class())
    }

    /// Whether `node` is declared a property in the index graph.
    pub fn is_property(&self, node: &Term) -> bool {
        let ty = a();
        self.graph.contains(node, &ty, &rdf_property())
            || self.graph.contains(node, &ty, &owl_object_property())
            || self.graph.contains(node, &ty, &owl_datatype_property())
    }

    /// Whether one of the two terms is a (reflexive-)transitive subclass
    /// ancestor of the other.
    pub fn covariant_classes(&self, left: &Term, right: &Term) -> bool {
        self.ancestors_of(left).contains(right) || self.ancestors_of(right).contains(left)
    }

    /// Covariance along the property hierarchy.
    pub fn covariant_properties(&self, left: &Term, right: &Term) -> bool {
        self.super_properties_of(left).contains(right)
            || self.super_properties_of(right).contains(left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn brick(suffix: &str) -> Term {
        Term::iri(format!("https://brickschema.org/schema/Brick#{suffix}"))
    }

    fn index() -> OntologyIndex {
        let g = Graph::from([
            (brick("Supply_Fan"), rdfs_subclass_of(), brick("Fan")),
            (brick("Fan"), rdfs_subclass_of(), brick("Equipment")),
            (brick("Supply_Fan"), a(), owl_class()),
            (brick("Fan"), a(), owl_class()),
            (brick("Equipment"), a(), owl_class()),
            (brick("feeds"), a(), owl_object_property()),
            (brick("feedsAir"), rdfs_subproperty_of(), brick("feeds")),
            (brick("feedsAir"), a(), owl_object_property()),
        ]);
        OntologyIndex::new(g)
    }

    #[test]
    fn test_ancestors_are_reflexive_transitive() {
        let idx = index();
        let ancestors = idx.ancestors_of(&brick("Supply_Fan"));
        assert!(ancestors.contains(&brick("Supply_Fan")));
        assert!(ancestors.contains(&brick("Fan")));
        assert!(ancestors.contains(&brick("Equipment")));
        // Memoized path returns the same closure.
        assert_eq!(ancestors, idx.ancestors_of(&brick("Supply_Fan")));
    }

    #[test]
    fn test_covariant_classes_either_direction() {
        let idx = index();
        assert!(idx.covariant_classes(&brick("Fan"), &brick("Supply_Fan")));
        assert!(idx.covariant_classes(&brick("Supply_Fan"), &brick("Fan")));
        assert!(!idx.covariant_classes(&brick("Supply_Fan"), &brick("feeds")));
    }

    #[test]
    fn test_super_properties() {
        let idx = index();
        let supers = idx.super_properties_of(&brick("feedsAir"));
        assert!(supers.contains(&brick("feeds")));
        assert!(idx.covariant_properties(&brick("feeds"), &brick("feedsAir")));
    }

    #[test]
    fn test_declared_types_defaults_to_individual_marker() {
        let idx = index();
        let data = Graph::from([(Term::iri("urn:bldg/sf1"), a(), brick("Supply_Fan"))]);
        assert_eq!(
            idx.declared_types(&Term::iri("urn:bldg/sf1"), &data),
            BTreeSet::from([brick("Supply_Fan")])
        );
        assert_eq!(
            idx.declared_types(&Term::iri("urn:bldg/unknown"), &data),
            BTreeSet::from([owl_named_individual()])
        );
    }

    #[test]
    fn test_is_class_and_is_property() {
        let idx = index();
        assert!(idx.is_class(&brick("Fan")));
        assert!(!idx.is_class(&brick("feeds")));
        assert!(idx.is_property(&brick("feeds")));
        assert!(!idx.is_property(&brick("Fan")));
    }
}
