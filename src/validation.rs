//! Interpretation of constraint-violation reports into typed diffs.
//!
//! A validation engine hands back a report graph describing every violated
//! constraint. This module reads that report (joined with the shape graphs
//! that produced it) and classifies each violation record into a
//! [`GraphDiff`]: a typed, reason-hashed value naming what is missing and
//! where. Records the interpreter does not understand are skipped with a
//! debug log, never an error; partial interpretation is acceptable.
//!
//! Diff identity is the rendered [`GraphDiff::reason`] string. Two diffs
//! with the same reason are the same diff, so a set built from duplicates
//! collapses to one element.

use crate::graph::Graph;
use crate::namespaces::{constraint, param, rdf_first, rdf_nil, rdf_rest, sh};
use crate::template::short_token;
use crate::term::Term;
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// What a violation is about: a single entity, or the graph as a whole.
///
/// Graph-level diffs (class cardinality over the whole model) use the
/// `Graph` sentinel so they never collide with a real entity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiffFocus {
    /// The violation concerns the graph as a whole.
    Graph,
    /// The violation concerns one entity.
    Node(Term),
}

impl fmt::Display for DiffFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffFocus::Graph => write!(f, "the graph"),
            DiffFocus::Node(t) => write!(f, "{t}"),
        }
    }
}

/// The kind-specific payload of a diff.
#[derive(Debug, Clone)]
pub enum DiffKind {
    /// The graph must contain exactly `expected_count` instances of `class`.
    GraphClassCardinality {
        /// Required class.
        class: Term,
        /// Exact number of instances required.
        expected_count: u64,
    },
    /// The focus entity must carry an additional type assertion.
    RequiredClass {
        /// The class the focus must be an instance of.
        class: Term,
    },
    /// The focus needs between `min_count` and `max_count` objects of
    /// `class` reachable via `path`.
    PathClassCount {
        /// Property path from the focus.
        path: Term,
        /// Required class of the path's objects.
        class: Term,
        /// Lower bound, if any.
        min_count: Option<u64>,
        /// Upper bound, if any.
        max_count: Option<u64>,
    },
    /// The focus needs between `min_count` and `max_count` objects via
    /// `path` that satisfy the named node shape.
    PathShapeCount {
        /// Property path from the focus.
        path: Term,
        /// The node shape each object must satisfy.
        shape: Term,
        /// Lower bound, if any.
        min_count: Option<u64>,
        /// Upper bound, if any.
        max_count: Option<u64>,
        /// Required sub-structure implied by the node shape, expressed as a
        /// parameterized body anchored on the "name" parameter.
        nested_body: Graph,
    },
    /// The focus needs between `min_count` and `max_count` uses of `path`,
    /// with no constraint on the objects.
    RequiredPath {
        /// Property path from the focus.
        path: Term,
        /// Lower bound, if any.
        min_count: Option<u64>,
        /// Upper bound, if any.
        max_count: Option<u64>,
    },
    /// The focus must satisfy at least one of several alternative shapes.
    /// Report-only: no remediation is synthesized for disjunctions.
    Or {
        /// The alternative shapes, in list order.
        alternatives: Vec<Term>,
    },
}

/// One interpreted constraint violation.
///
/// # Invariants
/// - Equality, ordering, and hashing all delegate to [`GraphDiff::reason`];
///   two diffs rendering the same reason are interchangeable.
/// - `focus` is `DiffFocus::Graph` exactly for `GraphClassCardinality`.
#[derive(Debug, Clone)]
pub struct GraphDiff {
    focus: DiffFocus,
    failed_shape: Option<Term>,
    failed_component: Option<Term>,
    kind: DiffKind,
}

impl GraphDiff {
    /// Builds a diff from its classification.
    pub fn new(
        focus: DiffFocus,
        failed_shape: Option<Term>,
        failed_component: Option<Term>,
        kind: DiffKind,
    ) -> Self {
        Self {
            focus,
            failed_shape,
            failed_component,
            kind,
        }
    }

    /// What the violation is about.
    #[inline]
    pub fn focus(&self) -> &DiffFocus {
        &self.focus
    }

    /// The shape whose constraint failed, when the report names one.
    #[inline]
    pub fn failed_shape(&self) -> Option<&Term> {
        self.failed_shape.as_ref()
    }

    /// The constraint component that failed, when the report names one.
    #[inline]
    pub fn failed_component(&self) -> Option<&Term> {
        self.failed_component.as_ref()
    }

    /// The kind-specific payload.
    #[inline]
    pub fn kind(&self) -> &DiffKind {
        &self.kind
    }

    /// Deterministic, human-readable explanation of the violation.
    ///
    /// Doubles as the diff's identity: equality and hashing compare this
    /// string and nothing else.
    pub fn reason(&self) -> String {
        let focus = &self.focus;
        match &self.kind {
            DiffKind::GraphClassCardinality {
                class,
                expected_count,
            } => {
                format!("graph did not have {expected_count} instances of {class}")
            }
            DiffKind::RequiredClass { class } => format!("{focus} needs to be a {class}"),
            DiffKind::PathClassCount {
                path,
                class,
                min_count,
                max_count,
            } => format!(
                "{focus} needs between {} and {} instances of {class} on path {path}",
                bound(*min_count, "0"),
                bound(*max_count, "unbounded"),
            ),
            DiffKind::PathShapeCount {
                path,
                shape,
                min_count,
                max_count,
                ..
            } => format!(
                "{focus} needs between {} and {} instances of {shape} on path {path}",
                bound(*min_count, "0"),
                bound(*max_count, "unbounded"),
            ),
            DiffKind::RequiredPath {
                path,
                min_count,
                max_count,
            } => format!(
                "{focus} needs between {} and {} uses of path {path}",
                bound(*min_count, "0"),
                bound(*max_count, "unbounded"),
            ),
            DiffKind::Or { alternatives } => {
                let alts: Vec<String> = alternatives.iter().map(|t| t.to_string()).collect();
                format!("{focus} needs to satisfy one of: {}", alts.join(", "))
            }
        }
    }
}

fn bound(value: Option<u64>, default: &str) -> String {
    match value {
        Some(n) => n.to_string(),
        None => default.to_string(),
    }
}

impl PartialEq for GraphDiff {
    fn eq(&self, other: &Self) -> bool {
        self.reason() == other.reason()
    }
}

impl Eq for GraphDiff {}

impl PartialOrd for GraphDiff {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphDiff {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reason().cmp(&other.reason())
    }
}

impl Hash for GraphDiff {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reason().hash(state);
    }
}

impl fmt::Display for GraphDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A diffset: every interpreted violation, grouped by focus.
pub type DiffSet = BTreeMap<DiffFocus, BTreeSet<GraphDiff>>;

/// The outcome of one validation run, with lazy diff interpretation.
pub struct ValidationContext {
    shapes: Graph,
    model: Graph,
    valid: bool,
    report: Graph,
    report_string: String,
    diffset: OnceCell<DiffSet>,
}

impl ValidationContext {
    /// Wraps a validation outcome. `shapes` is the union of the shape graphs
    /// the engine validated against, `model` is the data graph that was
    /// validated, and `report` is the engine's report graph.
    pub fn new(
        shapes: Graph,
        model: Graph,
        valid: bool,
        report: Graph,
        report_string: String,
    ) -> Self {
        Self {
            shapes,
            model,
            valid,
            report,
            report_string,
            diffset: OnceCell::new(),
        }
    }

    /// Whether the data graph conformed.
    #[inline]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The raw report graph.
    #[inline]
    pub fn report(&self) -> &Graph {
        &self.report
    }

    /// The engine's human-readable report text.
    #[inline]
    pub fn report_string(&self) -> &str {
        &self.report_string
    }

    /// The shape graphs the report is read against.
    #[inline]
    pub fn shapes(&self) -> &Graph {
        &self.shapes
    }

    /// The data graph the run validated.
    #[inline]
    pub fn model(&self) -> &Graph {
        &self.model
    }

    /// Interpreted violations grouped by focus. Computed on first access.
    pub fn diffset(&self) -> &DiffSet {
        self.diffset
            .get_or_init(|| report_to_diffset(&self.report, &self.shapes))
    }

    /// Every interpreted violation, ungrouped.
    pub fn get_diffs(&self) -> BTreeSet<GraphDiff> {
        self.diffset().values().flatten().cloned().collect()
    }
}

/// Classifies every violation record in `report` (joined with `shapes`).
pub fn report_to_diffset(report: &Graph, shapes: &Graph) -> DiffSet {
    let g = report.union(shapes);
    let mut diffset: DiffSet = BTreeMap::new();
    let mut push = |focus: DiffFocus, diff: GraphDiff| {
        diffset.entry(focus).or_default().insert(diff);
    };

    let result_pred = sh("result");
    let results: Vec<Term> = g
        .triples_matching(None, Some(&result_pred), None)
        .map(|t| t.object.clone())
        .collect();

    for result in &results {
        let focus_node = g.value(result, &sh("focusNode")).cloned();
        let component = g.value(result, &sh("sourceConstraintComponent")).cloned();
        let source_shape = g.value(result, &sh("sourceShape")).cloned();

        let Some(component) = component else {
            tracing::debug!(result = %result, "skipping violation with no constraint component");
            continue;
        };

        if component == constraint("countConstraintComponent") {
            let Some(shape) = &source_shape else {
                tracing::debug!(result = %result, "count constraint without a source shape");
                continue;
            };
            let class = g.value(shape, &constraint("class")).cloned();
            let expected = g
                .value(shape, &constraint("exactCount"))
                .and_then(literal_u64);
            match (class, expected) {
                (Some(class), Some(expected_count)) => {
                    push(
                        DiffFocus::Graph,
                        GraphDiff::new(
                            DiffFocus::Graph,
                            source_shape.clone(),
                            Some(component),
                            DiffKind::GraphClassCardinality {
                                class,
                                expected_count,
                            },
                        ),
                    );
                }
                _ => {
                    tracing::debug!(result = %result, "malformed count constraint, skipping");
                }
            }
            continue;
        }

        let Some(focus) = focus_node else {
            tracing::debug!(result = %result, "skipping violation with no focus node");
            continue;
        };
        let focus = DiffFocus::Node(focus);

        if component == sh("ClassConstraintComponent") {
            let expected = source_shape
                .as_ref()
                .and_then(|s| g.value(s, &sh("class")))
                .cloned();
            match expected {
                Some(class) if !class.is_blank() => {
                    push(
                        focus.clone(),
                        GraphDiff::new(
                            focus,
                            source_shape,
                            Some(component),
                            DiffKind::RequiredClass { class },
                        ),
                    );
                }
                _ => {
                    tracing::debug!(
                        result = %result,
                        "class requirement names no usable class, skipping"
                    );
                }
            }
        } else if component == sh("NodeConstraintComponent") {
            // No usable signal in node-shape constraint violations.
            tracing::debug!(result = %result, "skipping node constraint violation");
        } else if component == sh("OrConstraintComponent") {
            // Collected in the disjunction pass below.
        } else {
            let Some(path) = g.value(result, &sh("resultPath")).cloned() else {
                tracing::debug!(result = %result, "violation carries no result path, skipping");
                continue;
            };
            let shape_val = |p: &Term| -> Option<Term> {
                source_shape.as_ref().and_then(|s| g.value(s, p)).cloned()
            };
            let min_count = shape_val(&sh("minCount"))
                .or_else(|| shape_val(&sh("qualifiedMinCount")))
                .as_ref()
                .and_then(literal_u64);
            let max_count = shape_val(&sh("maxCount"))
                .or_else(|| shape_val(&sh("qualifiedMaxCount")))
                .as_ref()
                .and_then(literal_u64);
            if min_count.is_none() && max_count.is_none() {
                // Path violations without a cardinality bound (nodeKind,
                // datatype, and the like) carry nothing to remediate.
                tracing::debug!(result = %result, "path violation without count bounds, skipping");
                continue;
            }
            let qualified = shape_val(&sh("qualifiedValueShape"));
            let class = shape_val(&sh("class"))
                .or_else(|| qualified.as_ref().and_then(|q| g.value(q, &sh("class"))).cloned());
            let node_shape = shape_val(&sh("node")).or_else(|| {
                qualified
                    .as_ref()
                    .and_then(|q| g.value(q, &sh("node")))
                    .cloned()
            });

            let kind = match (class, node_shape) {
                (Some(class), _) if !class.is_blank() => DiffKind::PathClassCount {
                    path,
                    class,
                    min_count,
                    max_count,
                },
                (_, Some(shape)) if shape.is_iri() => DiffKind::PathShapeCount {
                    nested_body: nested_shape_body(&shape, &g),
                    path,
                    shape,
                    min_count,
                    max_count,
                },
                _ => DiffKind::RequiredPath {
                    path,
                    min_count,
                    max_count,
                },
            };
            push(
                focus.clone(),
                GraphDiff::new(focus, source_shape, Some(component), kind),
            );
        }
    }

    // Disjunction pass: `or` violations are unioned in regardless of the
    // classification above, and never synthesized into remediations.
    for result in &results {
        let component = g.value(result, &sh("sourceConstraintComponent"));
        if component != Some(&sh("OrConstraintComponent")) {
            continue;
        }
        let Some(focus) = g.value(result, &sh("focusNode")).cloned() else {
            tracing::debug!(result = %result, "or violation with no focus node, skipping");
            continue;
        };
        let source_shape = g.value(result, &sh("sourceShape")).cloned();
        let alternatives = source_shape
            .as_ref()
            .and_then(|s| g.value(s, &sh("or")))
            .map(|head| rdf_list(&g, head))
            .unwrap_or_default();
        if alternatives.is_empty() {
            tracing::debug!(result = %result, "or violation with a malformed branch list, skipping");
            continue;
        }
        let focus = DiffFocus::Node(focus);
        push(
            focus.clone(),
            GraphDiff::new(
                focus,
                source_shape,
                Some(sh("OrConstraintComponent")),
                DiffKind::Or { alternatives },
            ),
        );
    }

    diffset
}

/// Reads an RDF collection into a vector. Stops at `rdf:nil`, a missing
/// link, or a cycle.
fn rdf_list(g: &Graph, head: &Term) -> Vec<Term> {
    let (first, rest, nil) = (rdf_first(), rdf_rest(), rdf_nil());
    let mut items = Vec::new();
    let mut seen = BTreeSet::new();
    let mut cursor = head.clone();
    while cursor != nil && seen.insert(cursor.clone()) {
        match (g.value(&cursor, &first), g.value(&cursor, &rest)) {
            (Some(item), Some(next)) => {
                items.push(item.clone());
                cursor = next.clone();
            }
            _ => break,
        }
    }
    items
}

/// Extracts the required sub-structure a node shape implies, as a template
/// body anchored on the "name" parameter.
///
/// Each property constraint of the shape with a path and a class contributes
/// one fresh instance parameter; the shape's own class constraint, if any,
/// contributes a type assertion on "name".
fn nested_shape_body(shape: &Term, g: &Graph) -> Graph {
    let mut body = Graph::new();
    let anchor = param("name");
    let ty = crate::namespaces::a();
    if let Some(class) = g.value(shape, &sh("class")) {
        if !class.is_blank() {
            body.add(anchor.clone(), ty.clone(), class.clone());
        }
    }
    let token = short_token();
    for (n, prop) in g.objects(shape, &sh("property")).enumerate() {
        let Some(path) = g.value(prop, &sh("path")) else {
            continue;
        };
        let Some(class) = g.value(prop, &sh("class")) else {
            continue;
        };
        if class.is_blank() {
            continue;
        }
        let inst = param(&format!("{token}_{n}"));
        body.add(anchor.clone(), path.clone(), inst.clone());
        body.add(inst, ty.clone(), class.clone());
    }
    body
}

/// Parses the numeric value of a literal term.
fn literal_u64(term: &Term) -> Option<u64> {
    match term {
        Term::Literal { value, .. } => value.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::a;

    fn brick(suffix: &str) -> Term {
        Term::iri(format!("https://brickschema.org/schema/Brick#{suffix}"))
    }

    fn bldg(suffix: &str) -> Term {
        Term::iri(format!("urn:bldg/{suffix}"))
    }

    fn shape(suffix: &str) -> Term {
        Term::iri(format!("urn:shapes/{suffix}"))
    }

    #[test]
    fn test_duplicate_reasons_collapse_in_a_set() {
        let d1 = GraphDiff::new(
            DiffFocus::Node(bldg("ahu1")),
            Some(shape("s1")),
            Some(sh("ClassConstraintComponent")),
            DiffKind::RequiredClass {
                class: brick("AHU"),
            },
        );
        // Same reason, different provenance.
        let d2 = GraphDiff::new(
            DiffFocus::Node(bldg("ahu1")),
            Some(shape("s2")),
            None,
            DiffKind::RequiredClass {
                class: brick("AHU"),
            },
        );
        assert_eq!(d1, d2);
        let set: BTreeSet<GraphDiff> = [d1, d2].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_missing_point_classified_as_path_class_count() {
        // :ahu1 lacks a hasPoint edge to a Temperature_Sensor.
        let mut report = Graph::new();
        let r = Term::blank("r0");
        report.add(Term::blank("report"), sh("result"), r.clone());
        report.add(r.clone(), sh("focusNode"), bldg("ahu1"));
        report.add(
            r.clone(),
            sh("sourceConstraintComponent"),
            sh("QualifiedMinCountConstraintComponent"),
        );
        report.add(r.clone(), sh("sourceShape"), shape("has-temp-sensor"));
        report.add(r, sh("resultPath"), brick("hasPoint"));

        let shapes = Graph::from([
            (
                shape("has-temp-sensor"),
                sh("qualifiedMinCount"),
                Term::literal("1"),
            ),
            (
                shape("has-temp-sensor"),
                sh("qualifiedValueShape"),
                shape("temp-sensor"),
            ),
            (
                shape("temp-sensor"),
                sh("class"),
                brick("Temperature_Sensor"),
            ),
        ]);

        let diffset = report_to_diffset(&report, &shapes);
        let focus = DiffFocus::Node(bldg("ahu1"));
        let diffs = &diffset[&focus];
        assert_eq!(diffs.len(), 1);
        let diff = diffs.first().unwrap();
        match diff.kind() {
            DiffKind::PathClassCount {
                path,
                class,
                min_count,
                max_count,
            } => {
                assert_eq!(path, &brick("hasPoint"));
                assert_eq!(class, &brick("Temperature_Sensor"));
                assert_eq!(*min_count, Some(1));
                assert_eq!(*max_count, None);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(diff.failed_shape(), Some(&shape("has-temp-sensor")));
    }

    #[test]
    fn test_required_class_with_blank_class_is_skipped() {
        let mut report = Graph::new();
        let r = Term::blank("r0");
        report.add(Term::blank("report"), sh("result"), r.clone());
        report.add(r.clone(), sh("focusNode"), bldg("x"));
        report.add(
            r.clone(),
            sh("sourceConstraintComponent"),
            sh("ClassConstraintComponent"),
        );
        report.add(r, sh("sourceShape"), shape("anon-class"));
        let shapes = Graph::from([(shape("anon-class"), sh("class"), Term::blank("c"))]);

        let diffset = report_to_diffset(&report, &shapes);
        assert!(diffset.is_empty());
    }

    #[test]
    fn test_path_violation_without_count_bounds_is_skipped() {
        // nodeKind violations carry a path but no cardinality to restore.
        let mut report = Graph::new();
        let r = Term::blank("r0");
        report.add(Term::blank("report"), sh("result"), r.clone());
        report.add(r.clone(), sh("focusNode"), bldg("x"));
        report.add(
            r.clone(),
            sh("sourceConstraintComponent"),
            sh("NodeKindConstraintComponent"),
        );
        report.add(r.clone(), sh("sourceShape"), shape("label-kind"));
        report.add(r, sh("resultPath"), bldg("label"));
        let shapes = Graph::from([(shape("label-kind"), sh("nodeKind"), sh("Literal"))]);

        let diffset = report_to_diffset(&report, &shapes);
        assert!(diffset.is_empty());
    }

    #[test]
    fn test_graph_cardinality_uses_sentinel_focus() {
        let mut report = Graph::new();
        let r = Term::blank("r0");
        report.add(Term::blank("report"), sh("result"), r.clone());
        report.add(
            r.clone(),
            sh("sourceConstraintComponent"),
            constraint("countConstraintComponent"),
        );
        report.add(r, sh("sourceShape"), shape("one-ahu"));
        let shapes = Graph::from([
            (shape("one-ahu"), constraint("class"), brick("AHU")),
            (shape("one-ahu"), constraint("exactCount"), Term::literal("1")),
        ]);

        let diffset = report_to_diffset(&report, &shapes);
        let diffs = &diffset[&DiffFocus::Graph];
        assert_eq!(diffs.len(), 1);
        match diffs.first().unwrap().kind() {
            DiffKind::GraphClassCardinality {
                class,
                expected_count,
            } => {
                assert_eq!(class, &brick("AHU"));
                assert_eq!(*expected_count, 1);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_or_violations_collected_in_list_order() {
        let mut report = Graph::new();
        let r = Term::blank("r0");
        report.add(Term::blank("report"), sh("result"), r.clone());
        report.add(r.clone(), sh("focusNode"), bldg("x"));
        report.add(
            r.clone(),
            sh("sourceConstraintComponent"),
            sh("OrConstraintComponent"),
        );
        report.add(r, sh("sourceShape"), shape("either"));
        let (l1, l2) = (Term::blank("l1"), Term::blank("l2"));
        let shapes = Graph::from([
            (shape("either"), sh("or"), l1.clone()),
            (l1.clone(), rdf_first(), shape("fan")),
            (l1, rdf_rest(), l2.clone()),
            (l2.clone(), rdf_first(), shape("pump")),
            (l2, rdf_rest(), rdf_nil()),
        ]);

        let diffset = report_to_diffset(&report, &shapes);
        let diffs = &diffset[&DiffFocus::Node(bldg("x"))];
        assert_eq!(diffs.len(), 1);
        match diffs.first().unwrap().kind() {
            DiffKind::Or { alternatives } => {
                assert_eq!(alternatives, &vec![shape("fan"), shape("pump")]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_nested_shape_body_anchored_on_name() {
        let g = Graph::from([
            (shape("vav"), sh("class"), brick("VAV")),
            (shape("vav"), sh("property"), Term::blank("p0")),
            (Term::blank("p0"), sh("path"), brick("hasPoint")),
            (Term::blank("p0"), sh("class"), brick("Temperature_Sensor")),
        ]);
        let body = nested_shape_body(&shape("vav"), &g);
        assert!(body.contains(&param("name"), &a(), &brick("VAV")));
        // One fresh instance parameter typed and connected via the path.
        let inst = body
            .triples_matching(Some(&param("name")), Some(&brick("hasPoint")), None)
            .map(|t| t.object.clone())
            .next()
            .expect("path triple present");
        assert!(body.contains(&inst, &a(), &brick("Temperature_Sensor")));
    }
}
