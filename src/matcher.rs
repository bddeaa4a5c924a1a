//! Semantic subgraph matching of templates against a target graph.
//!
//! The matcher fills a template's placeholders with reserved mark nodes,
//! enumerates every node-induced subgraph of the filled body in order of
//! strictly decreasing node count, and embeds each candidate into the target
//! graph with a backtracking directed-monomorphism search. Node compatibility
//! is not identity but a semantic feasibility predicate driven by the
//! ontology index: identical terms, covariant classes, covariant properties,
//! or declared-type sets sharing a covariant pair. Edges must agree on
//! direction and predicate.
//!
//! The search space is bounded by `2^|nodes|`; acceptable because templates
//! are small, hand-authored fragments, not arbitrary graphs. Enumeration is
//! lazy — callers bound cost by stopping consumption once they have enough
//! matches.

use crate::graph::Graph;
use crate::namespaces::MARK_NS;
use crate::ontology::OntologyIndex;
use crate::template::{EvaluateOptions, Evaluation, Template, TemplateError};
use crate::term::{Namespace, Term};
use std::collections::{BTreeMap, BTreeSet};

/// A partial injective correspondence from target-graph nodes to
/// template-graph nodes.
///
/// # Invariants
/// - Never empty when produced by the matcher.
/// - Injective in both directions.
/// - For any two paired nodes connected in the matched template subgraph,
///   the target contains the same-direction edge with the same predicate.
pub type Mapping = BTreeMap<Term, Term>;

/// Computes the set of target subgraphs monomorphic to (subgraphs of) a
/// template, organized by how complete the correspondence is.
pub struct TemplateMatcher<'a> {
    target: &'a Graph,
    template: Template,
    ontology: &'a OntologyIndex,
    focus: Option<Term>,
    /// The template body with every placeholder filled by a mark node.
    template_graph: Graph,
    /// parameter name → mark node invented for it.
    template_bindings: BTreeMap<String, Term>,
}

impl<'a> TemplateMatcher<'a> {
    /// Builds a matcher for `template` against `target`.
    ///
    /// Dependencies should be inlined before matching; only the template's
    /// own body is searched. `focus`, when set, restricts results to
    /// mappings whose matched target nodes include it.
    pub fn new(
        target: &'a Graph,
        template: Template,
        ontology: &'a OntologyIndex,
        focus: Option<Term>,
    ) -> Result<Self, TemplateError> {
        let mark = Namespace::new(MARK_NS);
        let (template_bindings, template_graph) = template.fill(&mark, true)?;
        Ok(Self {
            target,
            template,
            ontology,
            focus,
            template_graph,
            template_bindings,
        })
    }

    /// The template under match.
    #[inline]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The filled template body the search runs over.
    #[inline]
    pub fn template_graph(&self) -> &Graph {
        &self.template_graph
    }

    /// parameter name → mark node.
    #[inline]
    pub fn template_bindings(&self) -> &BTreeMap<String, Term> {
        &self.template_bindings
    }

    /// Lazily yields mappings, deduplicated, walking candidate subgraphs
    /// from largest to smallest.
    ///
    /// Restartable per call but not resumable: each call starts a fresh
    /// enumeration. Stop consuming to bound cost.
    pub fn mappings_iter(&self) -> MappingsIter<'_, 'a> {
        MappingsIter {
            matcher: self,
            subgraphs: SubgraphEnumerator::new(&self.template_graph),
            pending: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    /// Eagerly computes every mapping, indexed by pair count, so callers can
    /// iterate from most- to least-complete matches.
    pub fn mappings_by_size(&self) -> BTreeMap<usize, Vec<Mapping>> {
        let mut by_size: BTreeMap<usize, Vec<Mapping>> = BTreeMap::new();
        for mapping in self.mappings_iter() {
            by_size.entry(mapping.len()).or_default().push(mapping);
        }
        by_size
    }

    /// Size of the largest mapping, if any mapping exists.
    pub fn largest_mapping_size(&self) -> Option<usize> {
        self.mappings_by_size().keys().next_back().copied()
    }

    /// The target subgraph induced by a mapping's matched target nodes.
    pub fn target_subgraph(&self, mapping: &Mapping) -> Graph {
        let nodes: BTreeSet<Term> = mapping.keys().cloned().collect();
        self.target.node_induced_subgraph(&nodes)
    }

    /// Yields `(mapping, induced target subgraph)` pairs, discarding
    /// disconnected subgraphs and deduplicating by the canonical (sorted)
    /// set of matched target nodes.
    pub fn target_subgraphs_iter(&self) -> impl Iterator<Item = (Mapping, Graph)> + '_ {
        let mut seen_keys: BTreeSet<Vec<Term>> = BTreeSet::new();
        self.mappings_iter().filter_map(move |mapping| {
            let subgraph = self.target_subgraph(&mapping);
            if !subgraph.is_connected() {
                return None;
            }
            let key: Vec<Term> = subgraph.all_nodes().into_iter().collect();
            if !seen_keys.insert(key) {
                return None;
            }
            Some((mapping, subgraph))
        })
    }

    /// The part of the template still to be filled out given a mapping.
    ///
    /// `None` when every template parameter is covered by the mapping (or
    /// only optional structure remains); otherwise the residual template
    /// from evaluating with the bindings the mapping implies.
    pub fn remaining_template(&self, mapping: &Mapping) -> Option<Template> {
        let matched_template_nodes: BTreeSet<&Term> = mapping.values().collect();
        let mut bindings: BTreeMap<String, Term> = BTreeMap::new();
        for (param_name, mark_node) in &self.template_bindings {
            if matched_template_nodes.contains(mark_node) {
                // The target node paired with this parameter's mark.
                let target_node = mapping
                    .iter()
                    .find(|(_, template_node)| *template_node == mark_node)
                    .map(|(target_node, _)| target_node.clone())?;
                bindings.insert(param_name.clone(), target_node);
            }
        }
        if bindings.len() == self.template_bindings.len() {
            return None;
        }
        let options = EvaluateOptions {
            require_optional_args: false,
            warn_unused: false,
        };
        match self.template.evaluate(&bindings, options) {
            Evaluation::Partial(rest) => Some(rest),
            Evaluation::Complete(_) => None,
        }
    }

    /// Semantic feasibility of pairing a target node with a template node.
    ///
    /// Feasible when (a) identical; (b) both ontology classes with one a
    /// transitive ancestor of the other, or both properties covariant along
    /// the property hierarchy; (c) their declared-type sets share a
    /// covariant pair. Literals only match by identity.
    pub fn semantically_feasible(&self, target_node: &Term, template_node: &Term) -> bool {
        if target_node == template_node {
            return true;
        }
        if target_node.is_literal() || template_node.is_literal() {
            return false;
        }
        if self.ontology.is_class(target_node) && self.ontology.is_class(template_node) {
            return self.ontology.covariant_classes(target_node, template_node);
        }
        if self.ontology.is_property(target_node) && self.ontology.is_property(template_node) {
            return self.ontology.covariant_properties(target_node, template_node);
        }
        let target_types = self.ontology.declared_types(target_node, self.target);
        let template_types = self
            .ontology
            .declared_types(template_node, &self.template_graph);
        target_types.iter().any(|t1| {
            template_types
                .iter()
                .any(|t2| self.ontology.covariant_classes(t1, t2))
        })
    }

    /// All monomorphisms embedding `subgraph` into the target, as
    /// target-node → template-node mappings.
    fn monomorphisms(&self, subgraph: &Graph) -> Vec<Mapping> {
        let template_nodes: Vec<Term> = {
            // Most-constrained first: nodes with more incident triples fail
            // faster under the edge-consistency check.
            let nodes = subgraph.all_nodes();
            let mut with_degree: Vec<(usize, Term)> = nodes
                .into_iter()
                .map(|n| {
                    let degree = subgraph
                        .triples()
                        .filter(|t| t.subject == n || t.object == n)
                        .count();
                    (degree, n)
                })
                .collect();
            with_degree.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            with_degree.into_iter().map(|(_, n)| n).collect()
        };
        if template_nodes.is_empty() {
            return Vec::new();
        }

        let target_nodes: Vec<Term> = self.target.all_nodes().into_iter().collect();
        let mut results = Vec::new();
        let mut assignment: BTreeMap<Term, Term> = BTreeMap::new(); // template → target
        let mut used: BTreeSet<Term> = BTreeSet::new();
        self.assign(
            subgraph,
            &template_nodes,
            &target_nodes,
            0,
            &mut assignment,
            &mut used,
            &mut results,
        );
        results
    }

    /// Backtracking injective assignment of template-subgraph nodes to
    /// target nodes, checking feasibility and edge consistency as it goes.
    #[allow(clippy::too_many_arguments)]
    fn assign(
        &self,
        subgraph: &Graph,
        template_nodes: &[Term],
        target_nodes: &[Term],
        depth: usize,
        assignment: &mut BTreeMap<Term, Term>,
        used: &mut BTreeSet<Term>,
        results: &mut Vec<Mapping>,
    ) {
        if depth == template_nodes.len() {
            // Reverse to the mapping orientation callers see.
            let mapping: Mapping = assignment
                .iter()
                .map(|(template_node, target_node)| (target_node.clone(), template_node.clone()))
                .collect();
            results.push(mapping);
            return;
        }
        let template_node = &template_nodes[depth];
        'candidates: for target_node in target_nodes {
            if used.contains(target_node) {
                continue;
            }
            if !self.semantically_feasible(target_node, template_node) {
                continue;
            }
            // Every subgraph edge between this node and an already-assigned
            // node must exist in the target with the same predicate.
            for t in subgraph.triples() {
                let (other, outgoing) = if &t.subject == template_node {
                    (&t.object, true)
                } else if &t.object == template_node {
                    (&t.subject, false)
                } else {
                    continue;
                };
                if other == template_node {
                    // Self-loop: the target node must carry it too.
                    if !self.target.contains(target_node, &t.predicate, target_node) {
                        continue 'candidates;
                    }
                    continue;
                }
                let Some(other_target) = assignment.get(other) else {
                    continue;
                };
                let present = if outgoing {
                    self.target.contains(target_node, &t.predicate, other_target)
                } else {
                    self.target.contains(other_target, &t.predicate, target_node)
                };
                if !present {
                    continue 'candidates;
                }
            }
            assignment.insert(template_node.clone(), target_node.clone());
            used.insert(target_node.clone());
            self.assign(
                subgraph,
                template_nodes,
                target_nodes,
                depth + 1,
                assignment,
                used,
                results,
            );
            assignment.remove(template_node);
            used.remove(target_node);
        }
    }

    /// Whether a mapping passes the usability filters: non-empty, touching
    /// at least one of the template's own parameters, and containing the
    /// focus node when one is set.
    fn usable(&self, mapping: &Mapping) -> bool {
        if mapping.is_empty() {
            return false;
        }
        if let Some(focus) = &self.focus {
            if !mapping.contains_key(focus) {
                return false;
            }
        }
        let matched_template_nodes: BTreeSet<&Term> = mapping.values().collect();
        self.template_bindings
            .values()
            .any(|mark| matched_template_nodes.contains(mark))
    }
}

/// Lazy mapping stream over decreasing-size candidate subgraphs.
pub struct MappingsIter<'m, 'a> {
    matcher: &'m TemplateMatcher<'a>,
    subgraphs: SubgraphEnumerator,
    pending: Vec<Mapping>,
    seen: BTreeSet<Mapping>,
}

impl Iterator for MappingsIter<'_, '_> {
    type Item = Mapping;

    fn next(&mut self) -> Option<Mapping> {
        loop {
            if let Some(mapping) = self.pending.pop() {
                if self.matcher.usable(&mapping) && self.seen.insert(mapping.clone()) {
                    return Some(mapping);
                }
                continue;
            }
            let subgraph = self.subgraphs.next()?;
            if subgraph.is_empty() {
                continue;
            }
            self.pending = self.matcher.monomorphisms(&subgraph);
        }
    }
}

/// Enumerates every node-induced subgraph of a graph in order of strictly
/// decreasing node count, dropping edgeless results.
///
/// Node subsets are walked in lexicographic combination order for
/// determinism.
struct SubgraphEnumerator {
    graph: Graph,
    nodes: Vec<Term>,
    /// Current subset size; counts down to 1.
    size: usize,
    combos: Combinations,
}

impl SubgraphEnumerator {
    fn new(graph: &Graph) -> Self {
        let nodes: Vec<Term> = graph.all_nodes().into_iter().collect();
        let size = nodes.len();
        Self {
            graph: graph.clone(),
            combos: Combinations::new(nodes.len(), size),
            nodes,
            size,
        }
    }
}

impl Iterator for SubgraphEnumerator {
    type Item = Graph;

    fn next(&mut self) -> Option<Graph> {
        loop {
            if self.size == 0 {
                return None;
            }
            match self.combos.next() {
                Some(indices) => {
                    let subset: BTreeSet<Term> =
                        indices.iter().map(|&i| self.nodes[i].clone()).collect();
                    return Some(self.graph.node_induced_subgraph(&subset));
                }
                None => {
                    self.size -= 1;
                    if self.size == 0 {
                        return None;
                    }
                    self.combos = Combinations::new(self.nodes.len(), self.size);
                }
            }
        }
    }
}

/// Lexicographic k-of-n index combinations.
struct Combinations {
    n: usize,
    k: usize,
    indices: Vec<usize>,
    exhausted: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            indices: (0..k).collect(),
            exhausted: k > n || k == 0,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.exhausted {
            return None;
        }
        let current = self.indices.clone();
        // Advance to the next lexicographic combination.
        let mut i = self.k;
        loop {
            if i == 0 {
                self.exhausted = true;
                break;
            }
            i -= 1;
            if self.indices[i] != i + self.n - self.k {
                self.indices[i] += 1;
                for j in i + 1..self.k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::{a, owl_class, param, rdfs_subclass_of};

    fn brick(suffix: &str) -> Term {
        Term::iri(format!("https://brickschema.org/schema/Brick#{suffix}"))
    }

    fn bldg(suffix: &str) -> Term {
        Term::iri(format!("urn:bldg/{suffix}"))
    }

    fn ontology() -> OntologyIndex {
        OntologyIndex::new(Graph::from([
            (brick("Supply_Fan"), rdfs_subclass_of(), brick("Fan")),
            (brick("Fan"), rdfs_subclass_of(), brick("Equipment")),
            (brick("Supply_Fan"), a(), owl_class()),
            (brick("Fan"), a(), owl_class()),
            (brick("Equipment"), a(), owl_class()),
            (brick("Temperature_Sensor"), a(), owl_class()),
        ]))
    }

    #[test]
    fn test_combinations_lexicographic() {
        let combos: Vec<Vec<usize>> = Combinations::new(4, 2).collect();
        assert_eq!(
            combos,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(3, 0).count(), 0);
        assert_eq!(Combinations::new(2, 3).count(), 0);
    }

    #[test]
    fn test_empty_template_yields_no_mappings() {
        let ontology = ontology();
        let target = Graph::from([(bldg("sf1"), a(), brick("Fan"))]);
        let matcher =
            TemplateMatcher::new(&target, Template::new("empty", Graph::new()), &ontology, None)
                .unwrap();
        assert_eq!(matcher.mappings_iter().count(), 0);
        assert_eq!(matcher.largest_mapping_size(), None);
    }

    #[test]
    fn test_subtype_match_scenario() {
        // Template requires `name a Supply_Fan` plus an unmatched point; the
        // target only offers `:sf1 a Fan`, an ontology ancestor.
        let ontology = ontology();
        let body = Graph::from([
            (param("name"), a(), brick("Supply_Fan")),
            (param("name"), brick("hasPoint"), param("sensor")),
        ]);
        let template = Template::new("supply-fan", body);
        let target = Graph::from([(bldg("sf1"), a(), brick("Fan"))]);
        let matcher = TemplateMatcher::new(&target, template, &ontology, None).unwrap();

        let by_size = matcher.mappings_by_size();
        let largest = *by_size.keys().next_back().unwrap();
        assert_eq!(largest, 2);
        let mapping = &by_size[&largest][0];
        // :sf1 pairs with the "name" mark node; Fan pairs with Supply_Fan.
        let name_mark = &matcher.template_bindings()["name"];
        assert_eq!(mapping.get(&bldg("sf1")), Some(name_mark));
        assert_eq!(mapping.get(&brick("Fan")), Some(&brick("Supply_Fan")));

        let rest = matcher
            .remaining_template(mapping)
            .expect("'sensor' is not covered by the mapping");
        assert!(rest.parameters().contains("sensor"));
        assert!(!rest.parameters().contains("name"));
    }

    #[test]
    fn test_mappings_pair_only_feasible_nodes_and_preserve_edges() {
        let ontology = ontology();
        let body = Graph::from([
            (param("name"), a(), brick("Supply_Fan")),
            (param("name"), brick("hasPoint"), param("sensor")),
            (param("sensor"), a(), brick("Temperature_Sensor")),
        ]);
        let template = Template::new("supply-fan", body);
        let target = Graph::from([
            (bldg("sf1"), a(), brick("Supply_Fan")),
            (bldg("sf1"), brick("hasPoint"), bldg("ts1")),
            (bldg("ts1"), a(), brick("Temperature_Sensor")),
        ]);
        let matcher = TemplateMatcher::new(&target, template, &ontology, None).unwrap();

        for mapping in matcher.mappings_iter() {
            for (target_node, template_node) in &mapping {
                assert!(
                    matcher.semantically_feasible(target_node, template_node),
                    "infeasible pair {target_node} -> {template_node}"
                );
            }
            // Every template-subgraph edge between paired nodes exists in
            // the target with the same predicate and direction.
            let matched: BTreeSet<&Term> = mapping.values().collect();
            let reverse: BTreeMap<&Term, &Term> =
                mapping.iter().map(|(k, v)| (v, k)).collect();
            for t in matcher.template_graph().triples() {
                if matched.contains(&t.subject) && matched.contains(&t.object) {
                    let s = reverse[&t.subject];
                    let o = reverse[&t.object];
                    assert!(target.contains(s, &t.predicate, o));
                }
            }
        }
        // The full template embeds: some mapping covers all four nodes.
        assert!(matcher.largest_mapping_size().unwrap() >= 4);
    }

    #[test]
    fn test_focus_restricts_mappings() {
        let ontology = ontology();
        let body = Graph::from([(param("name"), a(), brick("Fan"))]);
        let target = Graph::from([
            (bldg("f1"), a(), brick("Fan")),
            (bldg("f2"), a(), brick("Fan")),
        ]);
        let focused = TemplateMatcher::new(
            &target,
            Template::new("fan", body.clone()),
            &ontology,
            Some(bldg("f1")),
        )
        .unwrap();
        for mapping in focused.mappings_iter() {
            assert!(mapping.contains_key(&bldg("f1")));
        }
        assert!(focused.mappings_iter().count() > 0);

        let unfocused =
            TemplateMatcher::new(&target, Template::new("fan", body), &ontology, None).unwrap();
        assert!(unfocused.mappings_iter().count() > focused.mappings_iter().count());
    }

    #[test]
    fn test_target_subgraphs_are_connected_and_deduplicated() {
        let ontology = ontology();
        let body = Graph::from([
            (param("name"), a(), brick("Fan")),
            (param("name"), brick("hasPoint"), param("sensor")),
        ]);
        let target = Graph::from([
            (bldg("f1"), a(), brick("Fan")),
            (bldg("f1"), brick("hasPoint"), bldg("p1")),
        ]);
        let matcher =
            TemplateMatcher::new(&target, Template::new("fan", body), &ontology, None).unwrap();
        let mut seen = BTreeSet::new();
        for (_, subgraph) in matcher.target_subgraphs_iter() {
            assert!(subgraph.is_connected());
            let key: Vec<Term> = subgraph.all_nodes().into_iter().collect();
            assert!(seen.insert(key), "duplicate target node set");
        }
        assert!(!seen.is_empty());
    }

    #[test]
    fn test_mappings_not_touching_any_parameter_are_dropped() {
        let ontology = ontology();
        // A parameterless body embeds structurally, but the mapping pairs no
        // parameter and is therefore useless for binding.
        let body = Graph::from([(brick("Fan"), rdfs_subclass_of(), brick("Equipment"))]);
        let target = Graph::from([(brick("Fan"), rdfs_subclass_of(), brick("Equipment"))]);
        let matcher =
            TemplateMatcher::new(&target, Template::new("axiom", body), &ontology, None).unwrap();
        assert_eq!(matcher.mappings_iter().count(), 0);
    }
}
