//! Owned triple-set graphs.
//!
//! A `Graph` is a set of triples with the pattern-lookup and set-algebra
//! operations the rest of the engine needs: `(s?, p?, o?)` matching, union
//! and difference, node substitution, node-induced subgraphs, undirected
//! connectivity, and transitive traversal along a predicate.
//!
//! Triples are stored in a `BTreeSet` so every iteration order is
//! deterministic across runs.

use crate::term::{Term, Triple};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// A set of triples.
///
/// # Invariants
/// - No duplicate triples (set semantics).
/// - Iteration order is the derived `Ord` on `Triple`, which is stable.
/// - Graphs never share triple storage; `clone` produces an independent copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    /// Creates an empty graph.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triples.
    #[inline]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Returns true if the graph has no triples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Inserts a triple. Returns true if it was not already present.
    #[inline]
    pub fn insert(&mut self, triple: impl Into<Triple>) -> bool {
        self.triples.insert(triple.into())
    }

    /// Inserts a `(subject, predicate, object)` statement.
    #[inline]
    pub fn add(&mut self, s: Term, p: Term, o: Term) -> bool {
        self.triples.insert(Triple::new(s, p, o))
    }

    /// Checks whether a statement is present.
    #[inline]
    pub fn contains(&self, s: &Term, p: &Term, o: &Term) -> bool {
        // Cheap clone of three terms beats a custom borrowed key here; graphs
        // in this domain are small, hand-authored fragments.
        self.triples.contains(&Triple::new(s.clone(), p.clone(), o.clone()))
    }

    /// Iterates all triples in deterministic order.
    #[inline]
    pub fn triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Iterates triples matching an optional `(s, p, o)` pattern.
    ///
    /// `None` components match anything.
    pub fn triples_matching<'g>(
        &'g self,
        s: Option<&Term>,
        p: Option<&Term>,
        o: Option<&Term>,
    ) -> impl Iterator<Item = &'g Triple> + 'g {
        // The pattern is cloned into the closure so the returned borrows are
        // tied only to the graph, not to the caller's pattern terms.
        let (s, p, o) = (s.cloned(), p.cloned(), o.cloned());
        self.triples.iter().filter(move |t| {
            s.as_ref().map_or(true, |s| &t.subject == s)
                && p.as_ref().map_or(true, |p| &t.predicate == p)
                && o.as_ref().map_or(true, |o| &t.object == o)
        })
    }

    /// Objects of all `(s, p, _)` triples.
    pub fn objects<'g>(&'g self, s: &Term, p: &Term) -> impl Iterator<Item = &'g Term> + 'g {
        self.triples_matching(Some(s), Some(p), None)
            .map(|t| &t.object)
    }

    /// Subjects of all `(_, p, o)` triples.
    pub fn subjects<'g>(&'g self, p: &Term, o: &Term) -> impl Iterator<Item = &'g Term> + 'g {
        self.triples_matching(None, Some(p), Some(o))
            .map(|t| &t.subject)
    }

    /// First object of `(s, p, _)`, if any.
    ///
    /// The deterministic triple order makes "first" stable, matching the
    /// single-value lookup the report interpreter leans on.
    #[inline]
    pub fn value(&self, s: &Term, p: &Term) -> Option<&Term> {
        self.objects(s, p).next()
    }

    /// Merges all triples of `other` into `self`.
    pub fn extend_from(&mut self, other: &Graph) {
        for t in other.triples() {
            self.triples.insert(t.clone());
        }
    }

    /// Returns the union of two graphs as a new graph.
    pub fn union(&self, other: &Graph) -> Graph {
        let mut g = self.clone();
        g.extend_from(other);
        g
    }

    /// Returns the triples of `self` not present in `other`.
    pub fn difference(&self, other: &Graph) -> Graph {
        Graph {
            triples: self.triples.difference(&other.triples).cloned().collect(),
        }
    }

    /// Replaces every occurrence of the mapped nodes, in subject, predicate,
    /// and object position.
    ///
    /// This is the substitution primitive behind template evaluation and
    /// dependency inlining.
    pub fn replace_nodes(&mut self, mapping: &BTreeMap<Term, Term>) {
        if mapping.is_empty() {
            return;
        }
        let swap = |t: &Term| mapping.get(t).cloned().unwrap_or_else(|| t.clone());
        let replaced: BTreeSet<Triple> = self
            .triples
            .iter()
            .map(|t| Triple::new(swap(&t.subject), swap(&t.predicate), swap(&t.object)))
            .collect();
        self.triples = replaced;
    }

    /// Removes every triple whose subject or object is one of `nodes`.
    ///
    /// Used to prune structure hanging off unbound optional parameters.
    pub fn remove_triples_touching(&mut self, nodes: &BTreeSet<Term>) {
        if nodes.is_empty() {
            return;
        }
        self.triples
            .retain(|t| !nodes.contains(&t.subject) && !nodes.contains(&t.object));
    }

    /// All distinct subject and object nodes, in deterministic order.
    ///
    /// Predicates are not included; they are edge labels, not nodes.
    pub fn all_nodes(&self) -> BTreeSet<Term> {
        let mut nodes = BTreeSet::new();
        for t in &self.triples {
            nodes.insert(t.subject.clone());
            nodes.insert(t.object.clone());
        }
        nodes
    }

    /// The node-induced subgraph: every triple whose subject and object are
    /// both in `nodes`.
    pub fn node_induced_subgraph(&self, nodes: &BTreeSet<Term>) -> Graph {
        Graph {
            triples: self
                .triples
                .iter()
                .filter(|t| nodes.contains(&t.subject) && nodes.contains(&t.object))
                .cloned()
                .collect(),
        }
    }

    /// Whether the graph is connected, treating edges as undirected.
    ///
    /// The empty graph is considered connected (vacuously), matching the
    /// matcher's use where empty induced subgraphs are filtered earlier.
    pub fn is_connected(&self) -> bool {
        let nodes = self.all_nodes();
        let Some(start) = nodes.iter().next() else {
            return true;
        };
        let mut adjacency: BTreeMap<&Term, Vec<&Term>> = BTreeMap::new();
        for t in &self.triples {
            adjacency.entry(&t.subject).or_default().push(&t.object);
            adjacency.entry(&t.object).or_default().push(&t.subject);
        }
        let mut seen: BTreeSet<&Term> = BTreeSet::new();
        let mut queue: VecDeque<&Term> = VecDeque::new();
        seen.insert(start);
        queue.push_back(start);
        while let Some(n) = queue.pop_front() {
            for &next in adjacency.get(n).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.len() == nodes.len()
    }

    /// Reflexive-transitive closure of `(start, predicate, _)` edges.
    ///
    /// The start node is always included, so `x ∈ transitive_objects(x, p)`.
    pub fn transitive_objects(&self, start: &Term, predicate: &Term) -> BTreeSet<Term> {
        let mut closure = BTreeSet::new();
        let mut queue = VecDeque::new();
        closure.insert(start.clone());
        queue.push_back(start.clone());
        while let Some(n) = queue.pop_front() {
            for next in self.objects(&n, predicate) {
                if closure.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        closure
    }

    /// Reflexive-transitive closure of `(_, predicate, start)` edges.
    pub fn transitive_subjects(&self, start: &Term, predicate: &Term) -> BTreeSet<Term> {
        let mut closure = BTreeSet::new();
        let mut queue = VecDeque::new();
        closure.insert(start.clone());
        queue.push_back(start.clone());
        while let Some(n) = queue.pop_front() {
            for next in self.subjects(predicate, &n) {
                if closure.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        closure
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.triples {
            writeln!(f, "{}", t)?;
        }
        Ok(())
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Graph {
            triples: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(Term, Term, Term); N]> for Graph {
    fn from(statements: [(Term, Term, Term); N]) -> Self {
        statements.into_iter().map(Triple::from).collect()
    }
}
