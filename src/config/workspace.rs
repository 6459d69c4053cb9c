// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The static resource graph: immutable dashboard definitions.
//!
//! Resources are declared in a workspace file (see [`load_config`](crate::config::load_config))
//! and registered in a [`Workspace`] by their fully-qualified name. A resource
//! lists its children either by name or inline; inline children without a name
//! are given `<parent>.anonymous_<kind>_<index>` when the workspace is loaded.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::config::consts::{ANONYMOUS_PREFIX, INPUT_SEGMENT};
use crate::errors::BuildError;

/// The kind of a static resource.
///
/// `dashboard` and `container` lay out children, `benchmark` and `control`
/// run compliance checks, everything else is a leaf visualisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Dashboard,
    Container,
    Benchmark,
    Control,
    Card,
    Chart,
    Flow,
    Graph,
    Hierarchy,
    Image,
    Input,
    Table,
    Text,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dashboard => "dashboard",
            ResourceKind::Container => "container",
            ResourceKind::Benchmark => "benchmark",
            ResourceKind::Control => "control",
            ResourceKind::Card => "card",
            ResourceKind::Chart => "chart",
            ResourceKind::Flow => "flow",
            ResourceKind::Graph => "graph",
            ResourceKind::Hierarchy => "hierarchy",
            ResourceKind::Image => "image",
            ResourceKind::Input => "input",
            ResourceKind::Table => "table",
            ResourceKind::Text => "text",
        }
    }

    /// Leaf kinds hold no children and (optionally) run one query.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            ResourceKind::Dashboard
                | ResourceKind::Container
                | ResourceKind::Benchmark
                | ResourceKind::Control
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property of a leaf whose value is supplied by the client at runtime.
///
/// # Example
/// ```yaml
/// args:
///   - input: input.region
///     property: region
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDependency {
    /// Name of the input resource providing the value
    pub input: String,
    /// Local property (query argument) the value feeds
    pub property: String,
}

impl RuntimeDependency {
    /// Key under which the input's value is published (`input.<short>`).
    pub fn input_key(&self) -> String {
        unqualified_input_name(&self.input)
            .unwrap_or(&self.input)
            .to_string()
    }
}

/// A child slot: either a reference to a named resource or an inline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChildReference {
    Named(String),
    Inline(Box<ResourceDefinition>),
}

impl ChildReference {
    pub fn name(&self) -> &str {
        match self {
            ChildReference::Named(name) => name,
            ChildReference::Inline(definition) => &definition.name,
        }
    }
}

/// One static dashboard resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    #[serde(default)]
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    /// Display hint, e.g. the chart type
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub args: Vec<RuntimeDependency>,
    #[serde(default)]
    pub children: Vec<ChildReference>,
}

impl ResourceDefinition {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            title: None,
            width: None,
            display: None,
            tags: HashMap::new(),
            sql: None,
            args: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_arg(mut self, input: impl Into<String>, property: impl Into<String>) -> Self {
        self.args.push(RuntimeDependency {
            input: input.into(),
            property: property.into(),
        });
        self
    }

    pub fn with_child(mut self, name: impl Into<String>) -> Self {
        self.children.push(ChildReference::Named(name.into()));
        self
    }

    pub fn with_inline_child(mut self, child: ResourceDefinition) -> Self {
        self.children.push(ChildReference::Inline(Box::new(child)));
        self
    }

    /// SQL text, if any non-blank SQL is declared.
    pub fn executable_sql(&self) -> Option<&str> {
        self.sql.as_deref().map(str::trim).filter(|sql| !sql.is_empty())
    }

    /// Name every anonymous inline child, recursively.
    ///
    /// Idempotent: named children keep their names.
    pub fn assign_anonymous_names(&mut self) {
        let parent = self.name.clone();
        for (index, child) in self.children.iter_mut().enumerate() {
            if let ChildReference::Inline(definition) = child {
                if definition.name.is_empty() {
                    definition.name = format!(
                        "{}.{}{}_{}",
                        parent, ANONYMOUS_PREFIX, definition.kind, index
                    );
                }
                definition.assign_anonymous_names();
            }
        }
    }

    /// Visit this definition and every inline descendant.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ResourceDefinition)) {
        visit(self);
        for child in &self.children {
            if let ChildReference::Inline(definition) = child {
                definition.walk(visit);
            }
        }
    }
}

/// Extract the unqualified name (`input.<short>`) from an input reference.
///
/// Accepts `input.region`, `dashboard.sales.input.region` and
/// `mymod.dashboard.sales.input.region`. Returns `None` when the name has no
/// `input` segment followed by a short name.
pub fn unqualified_input_name(name: &str) -> Option<&str> {
    let segments: Vec<&str> = name.split('.').collect();
    let position = segments
        .iter()
        .rposition(|segment| *segment == INPUT_SEGMENT)?;
    if position + 1 >= segments.len() {
        return None;
    }
    let offset: usize = segments[..position].iter().map(|s| s.len() + 1).sum();
    Some(&name[offset..])
}

/// Immutable registry of every resource in a workspace, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    resources: HashMap<String, Arc<ResourceDefinition>>,
    order: Vec<String>,
}

impl Workspace {
    /// Register resources and all their inline descendants.
    ///
    /// Later duplicates are ignored; run
    /// [`validate_workspace`](crate::config::validate_workspace) first to
    /// reject them instead.
    pub fn new(resources: Vec<ResourceDefinition>) -> Self {
        let mut workspace = Self::default();
        for mut resource in resources {
            resource.assign_anonymous_names();
            workspace.register(resource);
        }
        workspace
    }

    fn register(&mut self, resource: ResourceDefinition) {
        for child in &resource.children {
            if let ChildReference::Inline(definition) = child {
                self.register((**definition).clone());
            }
        }
        if self.resources.contains_key(&resource.name) {
            tracing::warn!(resource = %resource.name, "ignoring duplicate resource definition");
            return;
        }
        self.order.push(resource.name.clone());
        self.resources
            .insert(resource.name.clone(), Arc::new(resource));
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<ResourceDefinition>> {
        self.resources.get(name).cloned()
    }

    pub fn dashboard(&self, name: &str) -> Result<Arc<ResourceDefinition>, BuildError> {
        match self.resolve(name) {
            Some(resource) if resource.kind == ResourceKind::Dashboard => Ok(resource),
            _ => Err(BuildError::DashboardNotFound(name.to_string())),
        }
    }

    /// Names of all dashboards, in declaration order.
    pub fn dashboards(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| {
                self.resources
                    .get(*name)
                    .map(|r| r.kind == ResourceKind::Dashboard)
                    .unwrap_or(false)
            })
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve the direct children of a resource, in declared order.
    pub fn children_of(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<Vec<Arc<ResourceDefinition>>, BuildError> {
        resource
            .children
            .iter()
            .map(|child| match child {
                ChildReference::Named(name) => {
                    self.resolve(name).ok_or_else(|| BuildError::UnknownChild {
                        parent: resource.name.clone(),
                        child: name.clone(),
                    })
                }
                ChildReference::Inline(definition) => Ok(self
                    .resolve(&definition.name)
                    .unwrap_or_else(|| Arc::new((**definition).clone()))),
            })
            .collect()
    }

    /// Unqualified names of every input reachable from `resource`.
    ///
    /// Unresolvable children are skipped; tree construction reports them.
    pub fn declared_inputs(&self, resource: &ResourceDefinition) -> HashSet<String> {
        let mut inputs = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_inputs(resource, &mut inputs, &mut visited);
        inputs
    }

    fn collect_inputs(
        &self,
        resource: &ResourceDefinition,
        inputs: &mut HashSet<String>,
        visited: &mut HashSet<String>,
    ) {
        if !visited.insert(resource.name.clone()) {
            return;
        }
        if resource.kind == ResourceKind::Input {
            if let Some(name) = unqualified_input_name(&resource.name) {
                inputs.insert(name.to_string());
            }
        }
        for child in self.children_of(resource).unwrap_or_default() {
            self.collect_inputs(&child, inputs, visited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unqualified_input_names() {
        struct TestCase {
            name: &'static str,
            expected: Option<&'static str>,
        }

        let test_cases = vec![
            TestCase { name: "input.region", expected: Some("input.region") },
            TestCase { name: "dashboard.sales.input.region", expected: Some("input.region") },
            TestCase { name: "mymod.dashboard.sales.input.region", expected: Some("input.region") },
            TestCase { name: "chart.region", expected: None },
            TestCase { name: "dashboard.sales.input", expected: None },
            TestCase { name: "myinput.region", expected: None },
        ];

        for tc in test_cases {
            assert_eq!(unqualified_input_name(tc.name), tc.expected, "case: {}", tc.name);
        }
    }

    #[test]
    fn anonymous_children_are_named_after_their_parent() {
        let mut dashboard = ResourceDefinition::new("dashboard.sales", ResourceKind::Dashboard)
            .with_inline_child(
                ResourceDefinition::new("", ResourceKind::Container)
                    .with_inline_child(ResourceDefinition::new("", ResourceKind::Text)),
            )
            .with_child("chart.shared");

        dashboard.assign_anonymous_names();

        let container = match &dashboard.children[0] {
            ChildReference::Inline(definition) => definition,
            other => panic!("expected inline child, got {:?}", other),
        };
        assert_eq!(container.name, "dashboard.sales.anonymous_container_0");
        assert_eq!(
            container.children[0].name(),
            "dashboard.sales.anonymous_container_0.anonymous_text_0"
        );
        assert_eq!(dashboard.children[1].name(), "chart.shared");
    }

    #[test]
    fn workspace_registers_inline_children() {
        let workspace = Workspace::new(vec![ResourceDefinition::new(
            "dashboard.sales",
            ResourceKind::Dashboard,
        )
        .with_inline_child(
            ResourceDefinition::new("chart.top", ResourceKind::Chart).with_sql("select 1"),
        )]);

        assert_eq!(workspace.len(), 2);
        assert!(workspace.resolve("chart.top").is_some());
        assert_eq!(workspace.dashboards(), vec!["dashboard.sales"]);
    }

    #[test]
    fn dashboard_lookup_rejects_other_kinds() {
        let workspace = Workspace::new(vec![ResourceDefinition::new(
            "chart.top",
            ResourceKind::Chart,
        )]);
        assert_eq!(
            workspace.dashboard("chart.top").unwrap_err(),
            BuildError::DashboardNotFound("chart.top".into())
        );
    }

    #[test]
    fn declared_inputs_are_collected_recursively() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.sales", ResourceKind::Dashboard)
                .with_child("dashboard.sales.input.region")
                .with_inline_child(
                    ResourceDefinition::new("container.nested", ResourceKind::Container)
                        .with_inline_child(ResourceDefinition::new(
                            "input.year",
                            ResourceKind::Input,
                        )),
                ),
            ResourceDefinition::new("dashboard.sales.input.region", ResourceKind::Input),
        ]);

        let dashboard = workspace.dashboard("dashboard.sales").unwrap();
        let inputs = workspace.declared_inputs(&dashboard);
        assert_eq!(inputs.len(), 2);
        assert!(inputs.contains("input.region"));
        assert!(inputs.contains("input.year"));
    }

    #[test]
    fn runtime_dependency_key_is_unqualified() {
        let dep = RuntimeDependency {
            input: "dashboard.sales.input.region".into(),
            property: "region".into(),
        };
        assert_eq!(dep.input_key(), "input.region");
    }

    #[test]
    fn yaml_children_accept_names_and_inline_definitions() {
        let yaml = r#"
name: dashboard.sales
kind: dashboard
children:
  - chart.shared
  - kind: table
    sql: select 1
"#;
        let definition: ResourceDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definition.children.len(), 2);
        assert_eq!(definition.children[0], ChildReference::Named("chart.shared".into()));
        match &definition.children[1] {
            ChildReference::Inline(table) => {
                assert_eq!(table.kind, ResourceKind::Table);
                assert_eq!(table.executable_sql(), Some("select 1"));
            }
            other => panic!("expected inline table, got {:?}", other),
        }
    }
}
