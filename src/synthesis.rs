//! Synthesis of remediation templates from interpreted diffs.
//!
//! Each diff kind resolves to a minimal template body satisfying exactly
//! that one violation. Per focus entity, the resolved templates are unified
//! into one: the first becomes the base, later ones attach as dependencies
//! joined on the shared "name" parameter (or merge bodies directly when they
//! declare no "name"), and the unified template is inlined and evaluated
//! against the real focus entity. Graph-level diffs resolve independently
//! and are never merged with per-entity ones.
//!
//! All templates created during one synthesis call live in a single,
//! uniquely named scratch library. `InvalidBinding` and `NameCollision`
//! propagate, failing the whole call rather than partially completing.

use crate::graph::Graph;
use crate::namespaces::{a, param, param_name};
use crate::template::{
    short_token, Binding, EvaluateOptions, Evaluation, Library, TemplateError, TemplateId,
};
use crate::validation::{DiffFocus, DiffKind, DiffSet, GraphDiff, ValidationContext};
use std::collections::BTreeMap;

impl GraphDiff {
    /// Builds the minimal template(s) satisfying this one violation,
    /// registered in `lib`.
    ///
    /// Most kinds resolve to a single template; graph-level cardinality
    /// resolves to one template per missing instance, and disjunctions
    /// resolve to nothing (report-only).
    pub fn resolve(&self, lib: &mut Library) -> Result<Vec<TemplateId>, TemplateError> {
        match self.kind() {
            DiffKind::GraphClassCardinality {
                class,
                expected_count,
            } => {
                let mut ids = Vec::with_capacity(*expected_count as usize);
                for _ in 0..*expected_count {
                    let body = Graph::from([(param("name"), a(), class.clone())]);
                    ids.push(lib.create_template(fresh_name(), body)?);
                }
                Ok(ids)
            }
            DiffKind::RequiredClass { class } => {
                let body = Graph::from([(param("name"), a(), class.clone())]);
                Ok(vec![lib.create_template(fresh_name(), body)?])
            }
            DiffKind::PathClassCount {
                path,
                class,
                min_count,
                ..
            } => {
                let mut body = Graph::new();
                let token = short_token();
                for i in 0..min_count.unwrap_or(0) {
                    let inst = param(&format!("inst_{token}_{i}"));
                    body.add(param("name"), path.clone(), inst.clone());
                    body.add(inst, a(), class.clone());
                }
                Ok(vec![lib.create_template(fresh_name(), body)?])
            }
            DiffKind::PathShapeCount {
                path,
                shape,
                min_count,
                nested_body,
                ..
            } => {
                let mut body = Graph::new();
                let token = short_token();
                for i in 0..min_count.unwrap_or(0) {
                    let inst_name = format!("inst_{token}_{i}");
                    let inst = param(&inst_name);
                    body.add(param("name"), path.clone(), inst.clone());
                    body.add(inst.clone(), a(), shape.clone());
                    // Re-anchor the shape's required sub-structure on this
                    // instance, scoping its parameters under it.
                    let mut nested = nested_body.clone();
                    let mut rename: BTreeMap<_, _> = BTreeMap::new();
                    for node in nested.all_nodes() {
                        if let Some(p) = param_name(&node) {
                            let target = if p == "name" {
                                inst.clone()
                            } else {
                                param(&format!("{inst_name}_{p}"))
                            };
                            rename.insert(node, target);
                        }
                    }
                    nested.replace_nodes(&rename);
                    body.extend_from(&nested);
                }
                Ok(vec![lib.create_template(fresh_name(), body)?])
            }
            DiffKind::RequiredPath {
                path, min_count, ..
            } => {
                let mut body = Graph::new();
                let token = short_token();
                for i in 0..min_count.unwrap_or(0) {
                    body.add(
                        param("name"),
                        path.clone(),
                        param(&format!("inst_{token}_{i}")),
                    );
                }
                Ok(vec![lib.create_template(fresh_name(), body)?])
            }
            DiffKind::Or { .. } => {
                tracing::debug!(reason = %self.reason(), "no remediation synthesized for disjunction");
                Ok(Vec::new())
            }
        }
    }
}

fn fresh_name() -> String {
    format!("resolve_{}", short_token())
}

/// Unifies a diffset into one remediation per focus.
///
/// Per-entity results are evaluated with "name" bound to the focus:
/// `Complete` when no other parameters remain, `Partial` otherwise (the
/// residual parameters are the invented instances a later `fill` names).
/// Graph-level results are returned unevaluated.
pub fn diffset_to_templates(diffset: &DiffSet) -> Result<Vec<Evaluation>, TemplateError> {
    let mut lib = Library::new(fresh_name());
    let mut out = Vec::new();
    for (focus, diffs) in diffset {
        let focus_node = match focus {
            DiffFocus::Graph => {
                for diff in diffs {
                    for id in diff.resolve(&mut lib)? {
                        let template = lib
                            .get(id)
                            .cloned()
                            .ok_or(TemplateError::UnknownTemplate(id))?;
                        out.push(Evaluation::Partial(template));
                    }
                }
                continue;
            }
            DiffFocus::Node(node) => node,
        };

        let mut ids = Vec::new();
        for diff in diffs {
            ids.extend(diff.resolve(&mut lib)?);
        }
        let Some((&first, rest)) = ids.split_first() else {
            continue;
        };
        let mut base = lib
            .get(first)
            .cloned()
            .ok_or(TemplateError::UnknownTemplate(first))?;
        for &id in rest {
            let dependee = lib
                .get(id)
                .cloned()
                .ok_or(TemplateError::UnknownTemplate(id))?;
            if dependee.parameters().contains("name") {
                let bindings = BTreeMap::from([(
                    "name".to_string(),
                    Binding::Parameter("name".to_string()),
                )]);
                base.add_dependency(&dependee, id, bindings)?;
            } else {
                base.body_mut().extend_from(dependee.body());
            }
        }
        let inlined = base.inline_dependencies(&lib)?;
        // Every per-node result is bound to its focus here, single-diff foci
        // included, so callers only ever fill the fresh instance parameters.
        let bindings = BTreeMap::from([("name".to_string(), focus_node.clone())]);
        let options = EvaluateOptions {
            require_optional_args: false,
            warn_unused: false,
        };
        out.push(inlined.evaluate(&bindings, options));
    }
    Ok(out)
}

impl ValidationContext {
    /// Remediation templates for every interpreted violation.
    pub fn as_templates(&self) -> Result<Vec<Evaluation>, TemplateError> {
        diffset_to_templates(self.diffset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::sh;
    use crate::term::{Namespace, Term};
    use std::collections::BTreeSet;

    fn brick(suffix: &str) -> Term {
        Term::iri(format!("https://brickschema.org/schema/Brick#{suffix}"))
    }

    fn bldg(suffix: &str) -> Term {
        Term::iri(format!("urn:bldg/{suffix}"))
    }

    fn shape(suffix: &str) -> Term {
        Term::iri(format!("urn:shapes/{suffix}"))
    }

    fn path_class_count(focus: Term) -> GraphDiff {
        GraphDiff::new(
            DiffFocus::Node(focus),
            Some(shape("has-temp-sensor")),
            Some(sh("QualifiedMinCountConstraintComponent")),
            DiffKind::PathClassCount {
                path: brick("hasPoint"),
                class: brick("Temperature_Sensor"),
                min_count: Some(1),
                max_count: None,
            },
        )
    }

    #[test]
    fn test_missing_point_remediation_fills_to_fresh_sensor() {
        let diff = path_class_count(bldg("ahu1"));
        let diffset: DiffSet = [(
            DiffFocus::Node(bldg("ahu1")),
            BTreeSet::from([diff]),
        )]
        .into_iter()
        .collect();

        let templates = diffset_to_templates(&diffset).unwrap();
        assert_eq!(templates.len(), 1);
        let template = match &templates[0] {
            Evaluation::Partial(t) => t.clone(),
            Evaluation::Complete(g) => panic!("expected residual instance parameter, got {g:?}"),
        };
        // "name" is already bound to the focus; only the invented instance
        // remains to be named.
        assert!(!template.parameters().contains("name"));
        assert!(template.body().all_nodes().contains(&bldg("ahu1")));

        let ns = Namespace::new("urn:bldg/");
        let (_, graph) = template.fill(&ns, false).unwrap();
        let inst = graph
            .triples_matching(Some(&bldg("ahu1")), Some(&brick("hasPoint")), None)
            .map(|t| t.object.clone())
            .next()
            .expect("hasPoint edge added");
        assert!(graph.contains(&inst, &a(), &brick("Temperature_Sensor")));
    }

    #[test]
    fn test_diffs_for_one_focus_merge_into_one_template() {
        let class_diff = GraphDiff::new(
            DiffFocus::Node(bldg("ahu1")),
            Some(shape("is-ahu")),
            Some(sh("ClassConstraintComponent")),
            DiffKind::RequiredClass {
                class: brick("AHU"),
            },
        );
        let diffset: DiffSet = [(
            DiffFocus::Node(bldg("ahu1")),
            BTreeSet::from([class_diff, path_class_count(bldg("ahu1"))]),
        )]
        .into_iter()
        .collect();

        let templates = diffset_to_templates(&diffset).unwrap();
        assert_eq!(templates.len(), 1);
        let ns = Namespace::new("urn:bldg/");
        let graph = match &templates[0] {
            Evaluation::Partial(t) => t.fill(&ns, false).unwrap().1,
            Evaluation::Complete(g) => g.clone(),
        };
        assert!(graph.contains(&bldg("ahu1"), &a(), &brick("AHU")));
        let inst = graph
            .triples_matching(Some(&bldg("ahu1")), Some(&brick("hasPoint")), None)
            .map(|t| t.object.clone())
            .next()
            .expect("hasPoint edge added");
        assert!(graph.contains(&inst, &a(), &brick("Temperature_Sensor")));
    }

    #[test]
    fn test_graph_cardinality_resolves_one_template_per_missing_instance() {
        let diff = GraphDiff::new(
            DiffFocus::Graph,
            Some(shape("two-ahus")),
            None,
            DiffKind::GraphClassCardinality {
                class: brick("AHU"),
                expected_count: 2,
            },
        );
        let diffset: DiffSet = [(DiffFocus::Graph, BTreeSet::from([diff]))]
            .into_iter()
            .collect();

        let templates = diffset_to_templates(&diffset).unwrap();
        assert_eq!(templates.len(), 2);
        for evaluation in templates {
            let template = match evaluation {
                Evaluation::Partial(t) => t,
                Evaluation::Complete(g) => panic!("graph-level template was evaluated: {g:?}"),
            };
            // Left parameterized: the caller decides the instance names.
            assert!(template.parameters().contains("name"));
            assert!(template
                .body()
                .contains(&param("name"), &a(), &brick("AHU")));
        }
    }

    #[test]
    fn test_disjunctions_synthesize_nothing() {
        let diff = GraphDiff::new(
            DiffFocus::Node(bldg("x")),
            Some(shape("either")),
            Some(sh("OrConstraintComponent")),
            DiffKind::Or {
                alternatives: vec![shape("fan"), shape("pump")],
            },
        );
        let diffset: DiffSet = [(DiffFocus::Node(bldg("x")), BTreeSet::from([diff]))]
            .into_iter()
            .collect();
        assert!(diffset_to_templates(&diffset).unwrap().is_empty());
    }

    #[test]
    fn test_shape_count_remediation_carries_nested_structure() {
        let nested = Graph::from([
            (param("name"), a(), brick("VAV")),
            (param("name"), brick("hasPoint"), param("p0")),
            (param("p0"), a(), brick("Temperature_Sensor")),
        ]);
        let diff = GraphDiff::new(
            DiffFocus::Node(bldg("ahu1")),
            Some(shape("feeds-vav")),
            None,
            DiffKind::PathShapeCount {
                path: brick("feeds"),
                shape: shape("vav"),
                min_count: Some(1),
                max_count: None,
                nested_body: nested,
            },
        );
        let diffset: DiffSet = [(
            DiffFocus::Node(bldg("ahu1")),
            BTreeSet::from([diff]),
        )]
        .into_iter()
        .collect();

        let templates = diffset_to_templates(&diffset).unwrap();
        assert_eq!(templates.len(), 1);
        let ns = Namespace::new("urn:bldg/");
        let graph = match &templates[0] {
            Evaluation::Partial(t) => t.fill(&ns, false).unwrap().1,
            Evaluation::Complete(g) => g.clone(),
        };
        let vav = graph
            .triples_matching(Some(&bldg("ahu1")), Some(&brick("feeds")), None)
            .map(|t| t.object.clone())
            .next()
            .expect("feeds edge added");
        assert!(graph.contains(&vav, &a(), &brick("VAV")));
        let sensor = graph
            .triples_matching(Some(&vav), Some(&brick("hasPoint")), None)
            .map(|t| t.object.clone())
            .next()
            .expect("nested hasPoint edge added");
        assert!(graph.contains(&sensor, &a(), &brick("Temperature_Sensor")));
    }

    #[test]
    fn test_context_end_to_end_interpretation_and_synthesis() {
        // One violation record: :ahu1 lacks a Temperature_Sensor point.
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
        let model = Graph::from([(bldg("ahu1"), a(), brick("AHU"))]);
        let context = ValidationContext::new(shapes, model, false, report, String::new());
        assert!(!context.valid());

        let templates = context.as_templates().unwrap();
        assert_eq!(templates.len(), 1);
        let ns = Namespace::new("urn:bldg/");
        let graph = match &templates[0] {
            Evaluation::Partial(t) => t.fill(&ns, false).unwrap().1,
            Evaluation::Complete(g) => g.clone(),
        };
        let inst = graph
            .triples_matching(Some(&bldg("ahu1")), Some(&brick("hasPoint")), None)
            .map(|t| t.object.clone())
            .next()
            .expect("hasPoint edge added");
        assert!(graph.contains(&inst, &a(), &brick("Temperature_Sensor")));
    }
}
