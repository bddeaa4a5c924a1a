//! Template model and algebra.
//!
//! A template is a parameterized graph fragment: a body whose nodes may be
//! ordinary entities or parameter placeholders (IRIs in the reserved
//! parameter namespace), a set of optional parameters, and an ordered list of
//! dependencies on other templates. The algebra covers dependency inlining
//! (with the `name`-scoped renaming rule), partial evaluation, and automatic
//! filling with fresh entities.
//!
//! Templates live in a [`Library`], a batch registry that tolerates forward
//! references while loading and validates the whole dependency relation once
//! the batch is complete.
//!
//! # Invariants
//! - Template bodies are exclusively owned; every algebra operation copies,
//!   so no two templates alias graph state.
//! - The dependency relation is acyclic (checked by
//!   [`Library::check_dependencies`]).
//! - `optional_args` is always a subset of the template's parameters.

use crate::graph::Graph;
use crate::namespaces::{param, param_name};
use crate::term::{Namespace, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Unique identifier for a template within one [`Library`].
///
/// Transparent `u64` wrapper; equality and ordering are on the inner value.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TemplateId(u64);

impl TemplateId {
    /// Creates a `TemplateId` from a raw `u64`.
    ///
    /// Prefer the ids handed out by [`Library::create_template`].
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw `u64` representation.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplateId({})", self.0)
    }
}

/// The value side of a dependency binding: a dependee parameter is bound
/// either to a parameter of the dependent or to a literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Binding {
    /// Bind to a (possibly new) parameter of the dependent template.
    Parameter(String),
    /// Bind to a fixed literal value.
    Literal(String),
}

impl Binding {
    /// The term the dependee's placeholder is replaced with.
    fn as_term(&self) -> Term {
        match self {
            Binding::Parameter(p) => param(p),
            Binding::Literal(v) => Term::literal(v.clone()),
        }
    }

    /// The lexical form used when this binding scopes unbound parameters.
    fn scope_name(&self) -> &str {
        match self {
            Binding::Parameter(p) => p,
            Binding::Literal(v) => v,
        }
    }
}

/// A dependency edge: dependee template plus the argument binding map from
/// dependee-parameter-name to a [`Binding`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The template being depended on.
    pub dependee: TemplateId,
    /// dependee-parameter-name → dependent-parameter-or-literal.
    pub bindings: BTreeMap<String, Binding>,
}

/// Errors raised by the template algebra and library.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A dependency binding key is not a parameter of the dependee.
    #[error("binding key '{key}' is not a parameter of template '{dependee}'")]
    InvalidBinding {
        /// Name of the dependee template.
        dependee: String,
        /// The offending binding key.
        key: String,
    },

    /// Post-batch check found a binding key absent from the dependee.
    #[error("dependency of '{dependent}' on '{dependee}' references unknown parameter '{key}'")]
    UnresolvedDependency {
        /// Name of the dependent template.
        dependent: String,
        /// Name of the dependee template.
        dependee: String,
        /// The offending binding key.
        key: String,
    },

    /// The dependency relation contains a cycle.
    #[error("template '{0}' participates in a dependency cycle")]
    DependencyCycle(String),

    /// A template with this name already exists in the library.
    #[error("library '{library}' already has a template named '{name}'")]
    NameCollision {
        /// Library name.
        library: String,
        /// Colliding template name.
        name: String,
    },

    /// `fill` did not produce a closed graph.
    #[error("filling template '{template}' left parameters unbound: {params:?}")]
    IncompleteEvaluation {
        /// Template name.
        template: String,
        /// The parameters that stayed unbound.
        params: Vec<String>,
    },

    /// A dependency references a template id not present in the library.
    #[error("unknown template id {0}")]
    UnknownTemplate(TemplateId),
}

/// Result of [`Template::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Every (required) parameter was bound; the graph is closed.
    Complete(Graph),
    /// Some parameters remain; the residual template retains exactly the
    /// unbound ones.
    Partial(Template),
}

impl Evaluation {
    /// Unwraps the closed graph, if evaluation completed.
    pub fn into_graph(self) -> Option<Graph> {
        match self {
            Evaluation::Complete(g) => Some(g),
            Evaluation::Partial(_) => None,
        }
    }

    /// Unwraps the residual template, if evaluation was partial.
    pub fn into_template(self) -> Option<Template> {
        match self {
            Evaluation::Complete(_) => None,
            Evaluation::Partial(t) => Some(t),
        }
    }
}

/// Options for [`Template::evaluate`].
#[derive(Debug, Clone, Copy)]
pub struct EvaluateOptions {
    /// When false (the default), unbound *optional* parameters do not block
    /// closure: their triples are pruned instead.
    pub require_optional_args: bool,
    /// Emit a non-fatal warning naming unbound required parameters.
    pub warn_unused: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            require_optional_args: false,
            warn_unused: true,
        }
    }
}

/// A parameterized graph fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    name: String,
    body: Graph,
    optional_args: BTreeSet<String>,
    dependencies: Vec<Dependency>,
}

impl Template {
    /// Creates a template with the given name and body.
    pub fn new(name: impl Into<String>, body: Graph) -> Self {
        Self {
            name: name.into(),
            body,
            optional_args: BTreeSet::new(),
            dependencies: Vec::new(),
        }
    }

    /// Creates a template with optional parameters.
    ///
    /// Optional names that never appear among the template's parameters are
    /// simply inert; `optional_args()` reports the declared set.
    pub fn with_optional(
        name: impl Into<String>,
        body: Graph,
        optional_args: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            optional_args: optional_args.into_iter().collect(),
            dependencies: Vec::new(),
        }
    }

    /// Template name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The graph body. Exclusively owned by this template.
    #[inline]
    pub fn body(&self) -> &Graph {
        &self.body
    }

    /// Mutable access to the body, for template-authoring steps.
    #[inline]
    pub fn body_mut(&mut self) -> &mut Graph {
        &mut self.body
    }

    /// The declared optional parameter names.
    #[inline]
    pub fn optional_args(&self) -> &BTreeSet<String> {
        &self.optional_args
    }

    /// The dependency list, in insertion order.
    #[inline]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Parameters appearing directly in this template's own body.
    ///
    /// O(body size): scans every triple position for placeholder IRIs.
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut params = BTreeSet::new();
        for t in self.body.triples() {
            for term in [&t.subject, &t.predicate, &t.object] {
                if let Some(name) = param_name(term) {
                    params.insert(name.to_string());
                }
            }
        }
        params
    }

    /// Parameters of this template's own body that are not optional.
    pub fn required_parameters(&self) -> BTreeSet<String> {
        self.parameters()
            .difference(&self.optional_args)
            .cloned()
            .collect()
    }

    /// Union of the dependees' parameter sets.
    pub fn dependency_parameters(&self, library: &Library) -> Result<BTreeSet<String>, TemplateError> {
        let mut params = BTreeSet::new();
        for dep in &self.dependencies {
            let dependee = library
                .get(dep.dependee)
                .ok_or(TemplateError::UnknownTemplate(dep.dependee))?;
            params.extend(dependee.parameters());
            params.extend(dependee.dependency_parameters(library)?);
        }
        Ok(params)
    }

    /// Union of own and dependency parameters.
    pub fn all_parameters(&self, library: &Library) -> Result<BTreeSet<String>, TemplateError> {
        let mut params = self.parameters();
        params.extend(self.dependency_parameters(library)?);
        Ok(params)
    }

    /// Adds a dependency on `dependee`, failing fast when a binding key is
    /// not one of the dependee's parameters.
    ///
    /// For batch loads with forward references, record the edge through
    /// [`Library::add_dependency`] instead and run
    /// [`Library::check_dependencies`] once everything is registered.
    pub fn add_dependency(
        &mut self,
        dependee: &Template,
        dependee_id: TemplateId,
        bindings: BTreeMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        let dependee_params = dependee.parameters();
        for key in bindings.keys() {
            if !dependee_params.contains(key) {
                return Err(TemplateError::InvalidBinding {
                    dependee: dependee.name.clone(),
                    key: key.clone(),
                });
            }
        }
        self.dependencies.push(Dependency {
            dependee: dependee_id,
            bindings,
        });
        Ok(())
    }

    /// Returns a copy whose non-preserved parameters are suffixed with a
    /// fresh token, so the body can be merged into another template without
    /// parameter collisions.
    pub fn to_inline(&self, preserve: &[&str]) -> Template {
        let sfx = short_token();
        let mut rename: BTreeMap<Term, Term> = BTreeMap::new();
        let mut renamed_optional = BTreeSet::new();
        for p in self.parameters() {
            if preserve.contains(&p.as_str()) || p.ends_with("-inlined") {
                if self.optional_args.contains(&p) {
                    renamed_optional.insert(p);
                }
                continue;
            }
            let fresh = format!("{p}-{sfx}-inlined");
            if self.optional_args.contains(&p) {
                renamed_optional.insert(fresh.clone());
            }
            rename.insert(param(&p), param(&fresh));
        }
        let mut body = self.body.clone();
        body.replace_nodes(&rename);
        Template {
            name: self.name.clone(),
            body,
            optional_args: renamed_optional,
            dependencies: self.dependencies.clone(),
        }
    }

    /// Recursively replaces each dependency with a renamed copy of the
    /// dependee's (already inlined) body, merged into this template's body.
    ///
    /// Renaming: explicit bindings map dependee parameters directly; every
    /// unbound dependee parameter `p` (other than `name`) becomes
    /// `"{binding_of_name}-{p}"`, scoping it under the value bound to the
    /// dependee's conventional root parameter.
    ///
    /// Optionality: when the dependee's `name` binding is itself optional on
    /// the dependent, every renamed dependee parameter becomes optional on
    /// the merged template; otherwise only the dependee's own optional
    /// parameters (renamed) are added.
    ///
    /// Idempotent: a dependency-free template inlines to an equivalent copy.
    pub fn inline_dependencies(&self, library: &Library) -> Result<Template, TemplateError> {
        // Iterative post-order walk over the dependency DAG reachable from
        // this template, memoizing fully inlined dependees by id.
        let mut inlined: BTreeMap<TemplateId, Template> = BTreeMap::new();
        let mut on_stack: BTreeSet<TemplateId> = BTreeSet::new();
        let mut stack: Vec<(TemplateId, bool)> = self
            .dependencies
            .iter()
            .rev()
            .map(|d| (d.dependee, false))
            .collect();
        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                on_stack.remove(&id);
                let template = library
                    .get(id)
                    .ok_or(TemplateError::UnknownTemplate(id))?;
                let merged = merge_inlined_dependencies(template, &inlined)?;
                inlined.insert(id, merged);
                continue;
            }
            if inlined.contains_key(&id) {
                continue;
            }
            if !on_stack.insert(id) {
                let name = library
                    .get(id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| id.to_string());
                return Err(TemplateError::DependencyCycle(name));
            }
            stack.push((id, true));
            let template = library
                .get(id)
                .ok_or(TemplateError::UnknownTemplate(id))?;
            for dep in template.dependencies.iter().rev() {
                stack.push((dep.dependee, false));
            }
        }
        merge_inlined_dependencies(self, &inlined)
    }

    /// Substitutes bound placeholders with concrete values.
    ///
    /// Returns [`Evaluation::Complete`] when all parameters are bound, or
    /// when only optional parameters remain unbound and
    /// `require_optional_args` is off — in that case every triple touching an
    /// unbound optional parameter is pruned first. Otherwise returns a
    /// residual template retaining exactly the unbound parameters; with
    /// `warn_unused`, a non-fatal warning names the unbound required ones.
    pub fn evaluate(&self, bindings: &BTreeMap<String, Term>, options: EvaluateOptions) -> Evaluation {
        let mut substitution: BTreeMap<Term, Term> = BTreeMap::new();
        for (name, value) in bindings {
            substitution.insert(param(name), value.clone());
        }
        let mut body = self.body.clone();
        body.replace_nodes(&substitution);

        let residual = Template {
            name: self.name.clone(),
            body,
            optional_args: self.optional_args.clone(),
            dependencies: self.dependencies.clone(),
        };
        let remaining = residual.parameters();
        let unbound_optional: BTreeSet<String> = remaining
            .intersection(&self.optional_args)
            .cloned()
            .collect();
        let unbound_required: BTreeSet<String> = remaining
            .difference(&self.optional_args)
            .cloned()
            .collect();

        if remaining.is_empty()
            || (!options.require_optional_args && unbound_required.is_empty())
        {
            let mut graph = residual.body;
            let doomed: BTreeSet<Term> = unbound_optional.iter().map(|p| param(p)).collect();
            graph.remove_triples_touching(&doomed);
            return Evaluation::Complete(graph);
        }

        if options.warn_unused && !unbound_required.is_empty() {
            warn!(
                template = %self.name,
                unbound = ?unbound_required,
                "evaluation left required parameters unbound"
            );
        }
        let mut partial = residual;
        partial.optional_args = unbound_optional;
        Evaluation::Partial(partial)
    }

    /// Invents one fresh, globally unique entity per required (and, if
    /// requested, optional) parameter inside `namespace`, evaluates, and
    /// returns the bindings with the closed graph.
    ///
    /// The `IncompleteEvaluation` arm is defensive; the generated binding
    /// set covers every parameter the evaluation needs.
    pub fn fill(
        &self,
        namespace: &Namespace,
        include_optional: bool,
    ) -> Result<(BTreeMap<String, Term>, Graph), TemplateError> {
        let to_bind: BTreeSet<String> = if include_optional {
            self.parameters()
        } else {
            self.required_parameters()
        };
        let bindings: BTreeMap<String, Term> = to_bind
            .into_iter()
            .map(|p| {
                let value = namespace.term(&format!("{p}_{}", short_token()));
                (p, value)
            })
            .collect();
        let options = EvaluateOptions {
            require_optional_args: include_optional,
            warn_unused: false,
        };
        match self.evaluate(&bindings, options) {
            Evaluation::Complete(graph) => Ok((bindings, graph)),
            Evaluation::Partial(rest) => Err(TemplateError::IncompleteEvaluation {
                template: self.name.clone(),
                params: rest.parameters().into_iter().collect(),
            }),
        }
    }
}

/// Merges `template`'s direct dependencies — all of which must already be
/// fully inlined in `inlined` — into a fresh copy of its body.
fn merge_inlined_dependencies(
    template: &Template,
    inlined: &BTreeMap<TemplateId, Template>,
) -> Result<Template, TemplateError> {
    let mut result = Template {
        name: template.name.clone(),
        body: template.body.clone(),
        optional_args: template.optional_args.clone(),
        dependencies: Vec::new(),
    };
    for dep in &template.dependencies {
        let dependee = inlined
            .get(&dep.dependee)
            .ok_or(TemplateError::UnknownTemplate(dep.dependee))?;

        // Scope for unbound dependee parameters: the value bound to the
        // dependee's root parameter "name", or a fresh token when unbound.
        let scope: String = match dep.bindings.get("name") {
            Some(binding) => binding.scope_name().to_string(),
            None => format!("{}-{}", dependee.name, short_token()),
        };

        // Parameter-name image of the rename, used for optionality
        // bookkeeping. Literal bindings drop out of the parameter space.
        let mut rename_terms: BTreeMap<Term, Term> = BTreeMap::new();
        let mut renamed: BTreeMap<String, Option<String>> = BTreeMap::new();
        for p in dependee.parameters() {
            match dep.bindings.get(&p) {
                Some(Binding::Parameter(target)) => {
                    rename_terms.insert(param(&p), param(target));
                    renamed.insert(p, Some(target.clone()));
                }
                Some(Binding::Literal(value)) => {
                    rename_terms.insert(param(&p), Term::literal(value.clone()));
                    renamed.insert(p, None);
                }
                None => {
                    let scoped = format!("{scope}-{p}");
                    rename_terms.insert(param(&p), param(&scoped));
                    renamed.insert(p, Some(scoped));
                }
            }
        }

        let anchor_is_optional = matches!(
            dep.bindings.get("name"),
            Some(Binding::Parameter(target)) if template.optional_args.contains(target)
        );
        if anchor_is_optional {
            // Omitting the anchor omits the whole sub-structure.
            result
                .optional_args
                .extend(renamed.values().flatten().cloned());
        } else {
            for opt in &dependee.optional_args {
                if let Some(Some(image)) = renamed.get(opt) {
                    result.optional_args.insert(image.clone());
                }
            }
        }

        let mut body = dependee.body.clone();
        body.replace_nodes(&rename_terms);
        result.body.extend_from(&body);
    }
    Ok(result)
}

/// Eight hex characters of fresh randomness for scoping and fill tokens.
pub(crate) fn short_token() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// A batch registry of templates.
///
/// Remediation synthesis creates one fresh library per call as its scratch
/// namespace; template-authoring steps load a batch and then run
/// [`Library::check_dependencies`], which tolerates the forward references a
/// batch may contain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    name: String,
    templates: BTreeMap<TemplateId, Template>,
    next_id: u64,
}

impl Library {
    /// Creates an empty library.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Library name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a template, failing with `NameCollision` when the name is
    /// already taken.
    pub fn add_template(&mut self, template: Template) -> Result<TemplateId, TemplateError> {
        if self.templates.values().any(|t| t.name == template.name) {
            return Err(TemplateError::NameCollision {
                library: self.name.clone(),
                name: template.name,
            });
        }
        let id = TemplateId::new(self.next_id);
        self.next_id += 1;
        self.templates.insert(id, template);
        Ok(id)
    }

    /// Creates and registers a template from a name and body.
    pub fn create_template(
        &mut self,
        name: impl Into<String>,
        body: Graph,
    ) -> Result<TemplateId, TemplateError> {
        self.add_template(Template::new(name, body))
    }

    /// Looks up a template by id.
    #[inline]
    pub fn get(&self, id: TemplateId) -> Option<&Template> {
        self.templates.get(&id)
    }

    /// Mutable lookup by id.
    #[inline]
    pub fn get_mut(&mut self, id: TemplateId) -> Option<&mut Template> {
        self.templates.get_mut(&id)
    }

    /// Looks up a template by name.
    pub fn get_by_name(&self, name: &str) -> Option<(TemplateId, &Template)> {
        self.templates
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(&id, t)| (id, t))
    }

    /// Iterates all templates in id order.
    pub fn templates(&self) -> impl Iterator<Item = (TemplateId, &Template)> {
        self.templates.iter().map(|(&id, t)| (id, t))
    }

    /// Number of registered templates.
    #[inline]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true when no templates are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Records a dependency edge.
    ///
    /// When verification is possible (the dependee is already registered) the
    /// binding keys are checked immediately and `InvalidBinding` is raised on
    /// a mismatch. A dependee registered later — a forward reference — is
    /// tolerated here and caught by [`Library::check_dependencies`].
    pub fn add_dependency(
        &mut self,
        dependent: TemplateId,
        dependee: TemplateId,
        bindings: BTreeMap<String, Binding>,
    ) -> Result<(), TemplateError> {
        if !self.templates.contains_key(&dependent) {
            return Err(TemplateError::UnknownTemplate(dependent));
        }
        if let Some(dependee_template) = self.templates.get(&dependee) {
            let dependee_params = dependee_template.parameters();
            for key in bindings.keys() {
                if !dependee_params.contains(key) {
                    return Err(TemplateError::InvalidBinding {
                        dependee: dependee_template.name.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        let dependent_template = self
            .templates
            .get_mut(&dependent)
            .expect("presence checked above");
        dependent_template.dependencies.push(Dependency {
            dependee,
            bindings,
        });
        Ok(())
    }

    /// Validates every dependency edge in the library.
    ///
    /// Run after a full batch load so forward references have resolved.
    /// Fails with `UnknownTemplate` for a dangling dependee,
    /// `UnresolvedDependency` for a binding key absent from the dependee's
    /// parameters, and `DependencyCycle` when the relation is not acyclic.
    pub fn check_dependencies(&self) -> Result<(), TemplateError> {
        for (_, template) in self.templates() {
            for dep in template.dependencies() {
                let dependee = self
                    .get(dep.dependee)
                    .ok_or(TemplateError::UnknownTemplate(dep.dependee))?;
                let dependee_params = dependee.parameters();
                for key in dep.bindings.keys() {
                    if !dependee_params.contains(key) {
                        return Err(TemplateError::UnresolvedDependency {
                            dependent: template.name.clone(),
                            dependee: dependee.name.clone(),
                            key: key.clone(),
                        });
                    }
                }
            }
        }
        self.check_acyclic()
    }

    /// DFS cycle detection over the dependency relation.
    fn check_acyclic(&self) -> Result<(), TemplateError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: BTreeMap<TemplateId, Mark> = BTreeMap::new();
        for (&root, _) in &self.templates {
            if marks.contains_key(&root) {
                continue;
            }
            let mut stack: Vec<(TemplateId, bool)> = vec![(root, false)];
            while let Some((id, children_done)) = stack.pop() {
                if children_done {
                    marks.insert(id, Mark::Done);
                    continue;
                }
                match marks.get(&id) {
                    Some(Mark::Done) => continue,
                    Some(Mark::Visiting) => {
                        let name = self
                            .get(id)
                            .map(|t| t.name.clone())
                            .unwrap_or_else(|| id.to_string());
                        return Err(TemplateError::DependencyCycle(name));
                    }
                    None => {}
                }
                marks.insert(id, Mark::Visiting);
                stack.push((id, true));
                if let Some(template) = self.get(id) {
                    for dep in template.dependencies() {
                        if marks.get(&dep.dependee).copied() != Some(Mark::Done) {
                            stack.push((dep.dependee, false));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Serializes the library to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    /// Deserializes a library from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }
}
