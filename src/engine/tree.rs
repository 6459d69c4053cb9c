// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One execution of one dashboard.
//!
//! [`ExecutionTree::build`] walks the static resources from the dashboard down,
//! creating one run node per resource. The tree is sealed once built: only
//! node status and data change afterwards.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::consts::DUPLICATE_NAME_SEPARATOR;
use crate::config::{unqualified_input_name, ResourceDefinition, ResourceKind, Workspace};
use crate::engine::check::CheckRun;
use crate::engine::container::ContainerRun;
use crate::engine::context::ExecutionContext;
use crate::engine::events::ExecutionEvent;
use crate::engine::leaf::LeafRun;
use crate::engine::run_node::{NodeCore, ParentNotifier, RunNode, RunStatus};
use crate::engine::snapshot::DashboardSnapshot;
use crate::errors::BuildError;
use crate::observability::messages::engine::{
    ExecutionCompleted, ExecutionFailed, ExecutionStarted, InputsApplied, UnknownInputIgnored,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{EventSink, QueryExecutor};

pub struct ExecutionTree {
    dashboard: String,
    root: Arc<RunNode>,
    nodes: HashMap<String, Arc<RunNode>>,
    order: Vec<String>,
    declared_inputs: HashSet<String>,
    context: Arc<ExecutionContext>,
    finished: watch::Receiver<bool>,
}

impl ExecutionTree {
    /// Build a tree for `dashboard`.
    ///
    /// Fails without side effects if the dashboard does not exist, a child
    /// cannot be resolved, a runtime dependency names an input the dashboard
    /// does not declare, or a resource breaks its kind's contract.
    pub fn build(
        workspace: &Workspace,
        dashboard: &str,
        session_id: &str,
        queries: Arc<dyn QueryExecutor>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, BuildError> {
        let definition = workspace.dashboard(dashboard)?;
        let mut builder = TreeBuilder {
            workspace,
            dashboard,
            declared_inputs: workspace.declared_inputs(&definition),
            names: NameAllocator::default(),
            path: Vec::new(),
            nodes: HashMap::new(),
            order: Vec::new(),
        };
        let root = builder.build_node(definition, None)?;

        // Second phase: nodes whose shape is only known once touched
        for name in &builder.order {
            if let Some(RunNode::Check(check)) = builder.nodes.get(name).map(|n| n.as_ref()) {
                check.initialise(workspace)?;
            }
        }

        let context = Arc::new(ExecutionContext::new(
            session_id.to_string(),
            Uuid::new_v4().to_string(),
            queries,
            sink,
        ));
        let finished = context.subscribe_finished();

        Ok(Self {
            dashboard: dashboard.to_string(),
            root,
            nodes: builder.nodes,
            order: builder.order,
            declared_inputs: builder.declared_inputs,
            context,
            finished,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn execution_id(&self) -> &str {
        &self.context.execution_id
    }

    pub fn dashboard(&self) -> &str {
        &self.dashboard
    }

    pub fn root(&self) -> &Arc<RunNode> {
        &self.root
    }

    pub fn node(&self, name: &str) -> Option<&Arc<RunNode>> {
        self.nodes.get(name)
    }

    /// Every node name, root first, in construction order.
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn status(&self) -> RunStatus {
        self.root.run_status()
    }

    pub fn is_terminal(&self) -> bool {
        self.root.run_complete()
    }

    pub fn declared_inputs(&self) -> &HashSet<String> {
        &self.declared_inputs
    }

    pub fn input_values(&self) -> HashMap<String, Value> {
        self.context.inputs.values().into_iter().collect()
    }

    /// Keep only inputs this dashboard declares, keyed by unqualified name.
    fn normalise_inputs(&self, inputs: HashMap<String, Value>) -> HashMap<String, Value> {
        inputs
            .into_iter()
            .filter_map(|(name, value)| {
                let key = unqualified_input_name(&name).unwrap_or(&name).to_string();
                if self.declared_inputs.contains(&key) {
                    Some((key, value))
                } else {
                    UnknownInputIgnored {
                        session_id: self.session_id(),
                        input: &name,
                    }
                    .log();
                    None
                }
            })
            .collect()
    }

    /// Store input values, releasing any leaf waiting on them.
    ///
    /// Returns the number of waiting leaves released.
    pub fn set_inputs(&self, inputs: HashMap<String, Value>) -> usize {
        let inputs = self.normalise_inputs(inputs);
        let input_count = inputs.len();
        let released_waiters = self.context.inputs.set_values(inputs);
        InputsApplied {
            session_id: self.session_id(),
            execution_id: self.execution_id(),
            input_count,
            released_waiters,
        }
        .log();
        released_waiters
    }

    /// True when `inputs` would change a value some leaf has already used.
    pub fn changes_bound_input(&self, inputs: &HashMap<String, Value>) -> bool {
        let inputs = inputs
            .iter()
            .map(|(name, value)| {
                let key = unqualified_input_name(name).unwrap_or(name).to_string();
                (key, value.clone())
            })
            .collect();
        self.context.inputs.changes_bound(&inputs)
    }

    /// Run the tree on a detached task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let tree = Arc::clone(self);
        tokio::spawn(async move { tree.run().await })
    }

    async fn run(&self) {
        let ctx = Arc::clone(&self.context);
        ExecutionStarted {
            session_id: self.session_id(),
            execution_id: self.execution_id(),
            dashboard: &self.dashboard,
            node_count: self.nodes.len(),
        }
        .log();
        ctx.publish(ExecutionEvent::ExecutionStarted {
            header: ctx.header(),
            dashboard: self.dashboard.clone(),
            layout: self.root.as_tree_node(),
            panels: self.root.panels(),
            inputs: ctx.inputs.values(),
        });

        if self.root.run_complete() {
            // Pure layout: nothing to run
            self.root.publish_terminal(&ctx);
            ctx.finish();
        } else {
            Arc::clone(&self.root).execute(Arc::clone(&ctx)).await;
        }

        match self.root.error() {
            None => ExecutionCompleted {
                session_id: self.session_id(),
                execution_id: self.execution_id(),
                dashboard: &self.dashboard,
                duration: ctx.elapsed(),
            }
            .log(),
            Some(error) => ExecutionFailed {
                session_id: self.session_id(),
                execution_id: self.execution_id(),
                dashboard: &self.dashboard,
                error: &error,
            }
            .log(),
        }
    }

    /// Cancel every pending wait and query; nodes end in `Error`.
    pub fn cancel(&self) {
        self.context.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.context.cancel.is_cancelled()
    }

    /// Resolve once the root's terminal event has been published.
    pub async fn wait_for_completion(&self) -> RunStatus {
        let mut finished = self.finished.clone();
        // The sender lives in the context this tree owns, so it cannot close first
        let _ = finished.wait_for(|done| *done).await;
        self.root.run_status()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            session_id: self.session_id().to_string(),
            execution_id: self.execution_id().to_string(),
            dashboard: self.dashboard.clone(),
            status: self.status(),
            layout: self.root.as_tree_node(),
            panels: self.root.panels(),
            inputs: self.context.inputs.values(),
        }
    }
}

/// Hands out tree-unique node names: `name`, then `name_1`, `name_2`, ...
#[derive(Default)]
struct NameAllocator {
    used: HashMap<String, usize>,
}

impl NameAllocator {
    fn allocate(&mut self, name: &str) -> String {
        match self.used.get_mut(name) {
            None => {
                self.used.insert(name.to_string(), 0);
                name.to_string()
            }
            Some(count) => {
                *count += 1;
                let candidate = format!("{}{}{}", name, DUPLICATE_NAME_SEPARATOR, count);
                // A declared resource may already own the suffixed name
                if self.used.contains_key(&candidate) {
                    self.allocate(&candidate)
                } else {
                    self.used.insert(candidate.clone(), 0);
                    candidate
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    workspace: &'a Workspace,
    dashboard: &'a str,
    declared_inputs: HashSet<String>,
    names: NameAllocator,
    path: Vec<String>,
    nodes: HashMap<String, Arc<RunNode>>,
    order: Vec<String>,
}

impl TreeBuilder<'_> {
    fn build_node(
        &mut self,
        resource: Arc<ResourceDefinition>,
        parent: Option<ParentNotifier>,
    ) -> Result<Arc<RunNode>, BuildError> {
        if let Some(position) = self.path.iter().position(|name| *name == resource.name) {
            let mut cycle = self.path[position..].to_vec();
            cycle.push(resource.name.clone());
            return Err(BuildError::CyclicReference(cycle));
        }
        if !resource.kind.is_leaf() && !resource.args.is_empty() {
            return Err(contract_violation(&resource, "cannot declare runtime dependencies"));
        }
        self.check_runtime_dependencies(&resource)?;

        let name = self.names.allocate(&resource.name);
        self.order.push(name.clone());
        self.path.push(resource.name.clone());

        let node = match resource.kind {
            ResourceKind::Dashboard | ResourceKind::Container => {
                let definitions = self.workspace.children_of(&resource)?;
                let (tx, rx) = mpsc::channel(definitions.len().max(1));
                let children = definitions
                    .into_iter()
                    .map(|child| self.build_node(child, Some(ParentNotifier::new(tx.clone()))))
                    .collect::<Result<Vec<_>, _>>()?;
                let status = if children.iter().all(|child| child.run_complete()) {
                    RunStatus::Complete
                } else {
                    RunStatus::Ready
                };
                let kind = resource.kind;
                let container =
                    ContainerRun::new(NodeCore::new(name.clone(), resource, parent, status), children, rx);
                if kind == ResourceKind::Dashboard {
                    RunNode::Dashboard(container)
                } else {
                    RunNode::Container(container)
                }
            }
            ResourceKind::Benchmark | ResourceKind::Control => {
                if resource.kind == ResourceKind::Control && resource.executable_sql().is_none() {
                    return Err(contract_violation(&resource, "must declare sql"));
                }
                if resource.kind == ResourceKind::Control && !resource.children.is_empty() {
                    return Err(contract_violation(&resource, "cannot have children"));
                }
                let core = NodeCore::new(name.clone(), resource, parent, RunStatus::Ready);
                RunNode::Check(CheckRun::new(core))
            }
            ResourceKind::Card
            | ResourceKind::Chart
            | ResourceKind::Flow
            | ResourceKind::Graph
            | ResourceKind::Hierarchy
            | ResourceKind::Image
            | ResourceKind::Input
            | ResourceKind::Table
            | ResourceKind::Text => {
                if !resource.children.is_empty() {
                    return Err(contract_violation(&resource, "is a leaf and cannot have children"));
                }
                let status = if resource.executable_sql().is_some() {
                    RunStatus::Ready
                } else {
                    RunStatus::Complete
                };
                RunNode::Leaf(LeafRun::new(NodeCore::new(name.clone(), resource, parent, status)))
            }
        };

        self.path.pop();
        let node = Arc::new(node);
        self.nodes.insert(name, Arc::clone(&node));
        Ok(node)
    }

    fn check_runtime_dependencies(&self, resource: &ResourceDefinition) -> Result<(), BuildError> {
        let own_key = match resource.kind {
            ResourceKind::Input => unqualified_input_name(&resource.name),
            _ => None,
        };
        for dependency in &resource.args {
            let key = dependency.input_key();
            if own_key == Some(key.as_str()) {
                return Err(contract_violation(resource, "cannot depend on its own value"));
            }
            if !self.declared_inputs.contains(&key) {
                return Err(BuildError::UnresolvedInput {
                    resource: resource.name.clone(),
                    input: dependency.input.clone(),
                    dashboard: self.dashboard.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn contract_violation(resource: &ResourceDefinition, reason: &str) -> BuildError {
    BuildError::ContractViolation {
        name: resource.name.clone(),
        kind: resource.kind,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{RecordingSink, StubQueryExecutor};

    fn build(workspace: &Workspace, dashboard: &str) -> Result<ExecutionTree, BuildError> {
        ExecutionTree::build(
            workspace,
            dashboard,
            "session-1",
            Arc::new(StubQueryExecutor::new()),
            Arc::new(RecordingSink::new()),
        )
    }

    #[test]
    fn name_allocator_suffixes_duplicates() {
        let mut names = NameAllocator::default();
        assert_eq!(names.allocate("chart.a"), "chart.a");
        assert_eq!(names.allocate("chart.a"), "chart.a_1");
        assert_eq!(names.allocate("chart.a"), "chart.a_2");
        assert_eq!(names.allocate("chart.b"), "chart.b");
    }

    #[test]
    fn name_allocator_skips_names_already_taken() {
        let mut names = NameAllocator::default();
        assert_eq!(names.allocate("chart.a_1"), "chart.a_1");
        assert_eq!(names.allocate("chart.a"), "chart.a");
        assert_eq!(names.allocate("chart.a"), "chart.a_1_1");
    }

    #[test]
    fn shared_resources_get_unique_run_nodes() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard)
                .with_child("chart.shared")
                .with_child("chart.shared"),
            ResourceDefinition::new("chart.shared", ResourceKind::Chart).with_sql("select 1"),
        ]);

        let tree = build(&workspace, "dashboard.d").unwrap();
        assert_eq!(tree.node_names(), ["dashboard.d", "chart.shared", "chart.shared_1"]);
        assert_eq!(tree.root().children().len(), 2);
        assert_eq!(tree.status(), RunStatus::Ready);
    }

    #[test]
    fn pure_layout_starts_complete() {
        let workspace = Workspace::new(vec![ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard)
            .with_inline_child(
                ResourceDefinition::new("", ResourceKind::Container)
                    .with_inline_child(ResourceDefinition::new("", ResourceKind::Text))
                    .with_inline_child(ResourceDefinition::new("", ResourceKind::Text)),
            )]);

        let tree = build(&workspace, "dashboard.d").unwrap();
        assert_eq!(tree.len(), 4);
        assert!(tree.is_terminal());
        assert!(tree.root().children_complete());
    }

    #[test]
    fn undeclared_runtime_dependency_fails_construction() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard).with_inline_child(
                ResourceDefinition::new("chart.by_region", ResourceKind::Chart)
                    .with_sql("select $1")
                    .with_arg("input.region", "region"),
            ),
            ResourceDefinition::new("input.region", ResourceKind::Input),
        ]);

        match build(&workspace, "dashboard.d") {
            Err(BuildError::UnresolvedInput { resource, input, dashboard }) => {
                assert_eq!(resource, "chart.by_region");
                assert_eq!(input, "input.region");
                assert_eq!(dashboard, "dashboard.d");
            }
            other => panic!("expected unresolved input, got {:?}", other.err()),
        }
    }

    #[test]
    fn runtime_dependencies_on_non_leaves_violate_contract() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard)
                .with_child("input.region")
                .with_child("control.by_region"),
            ResourceDefinition::new("input.region", ResourceKind::Input),
            ResourceDefinition::new("control.by_region", ResourceKind::Control)
                .with_sql("select $1")
                .with_arg("input.region", "region"),
        ]);

        match build(&workspace, "dashboard.d") {
            Err(BuildError::ContractViolation { name, reason, .. }) => {
                assert_eq!(name, "control.by_region");
                assert_eq!(reason, "cannot declare runtime dependencies");
            }
            other => panic!("expected contract violation, got {:?}", other.err()),
        }
    }

    #[test]
    fn controls_inside_benchmarks_cannot_bind_inputs() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard)
                .with_child("input.region")
                .with_child("benchmark.b"),
            ResourceDefinition::new("input.region", ResourceKind::Input),
            ResourceDefinition::new("benchmark.b", ResourceKind::Benchmark)
                .with_child("control.by_region"),
            ResourceDefinition::new("control.by_region", ResourceKind::Control)
                .with_sql("select $1")
                .with_arg("input.region", "region"),
        ]);

        assert!(matches!(
            build(&workspace, "dashboard.d"),
            Err(BuildError::ContractViolation { name, .. }) if name == "control.by_region"
        ));
    }

    #[test]
    fn input_depending_on_itself_violates_contract() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard)
                .with_child("dashboard.d.input.region"),
            ResourceDefinition::new("dashboard.d.input.region", ResourceKind::Input)
                .with_sql("select region from regions where region <> $1")
                .with_arg("input.region", "current"),
        ]);

        match build(&workspace, "dashboard.d") {
            Err(BuildError::ContractViolation { name, reason, .. }) => {
                assert_eq!(name, "dashboard.d.input.region");
                assert_eq!(reason, "cannot depend on its own value");
            }
            other => panic!("expected contract violation, got {:?}", other.err()),
        }
    }

    #[test]
    fn leaf_with_children_violates_contract() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard).with_child("chart.a"),
            ResourceDefinition::new("chart.a", ResourceKind::Chart).with_child("text.b"),
            ResourceDefinition::new("text.b", ResourceKind::Text),
        ]);

        assert!(matches!(
            build(&workspace, "dashboard.d"),
            Err(BuildError::ContractViolation { .. })
        ));
    }

    #[test]
    fn cycles_fail_construction() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard).with_child("container.a"),
            ResourceDefinition::new("container.a", ResourceKind::Container).with_child("container.b"),
            ResourceDefinition::new("container.b", ResourceKind::Container).with_child("container.a"),
        ]);

        match build(&workspace, "dashboard.d") {
            Err(BuildError::CyclicReference(cycle)) => {
                assert_eq!(cycle, vec!["container.a", "container.b", "container.a"]);
            }
            other => panic!("expected cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_dashboard_and_child() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard).with_child("chart.missing"),
        ]);
        assert_eq!(
            build(&workspace, "dashboard.nope").err(),
            Some(BuildError::DashboardNotFound("dashboard.nope".into()))
        );
        assert!(matches!(
            build(&workspace, "dashboard.d"),
            Err(BuildError::UnknownChild { .. })
        ));
    }

    #[test]
    fn check_nodes_are_initialised_at_build_time() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard).with_child("benchmark.b"),
            ResourceDefinition::new("benchmark.b", ResourceKind::Benchmark).with_child("control.c"),
            ResourceDefinition::new("control.c", ResourceKind::Control).with_sql("select 'ok' as status"),
        ]);

        let tree = build(&workspace, "dashboard.d").unwrap();
        match tree.node("benchmark.b").map(|n| n.as_ref()) {
            Some(RunNode::Check(check)) => assert!(check.is_initialised()),
            other => panic!("expected check node, got {:?}", other),
        }
        let layout = tree.root().as_tree_node();
        assert_eq!(layout.names(), vec!["dashboard.d", "benchmark.b", "control.c"]);
    }

    #[test]
    fn unknown_inputs_are_ignored() {
        let workspace = Workspace::new(vec![
            ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard).with_child("dashboard.d.input.region"),
            ResourceDefinition::new("dashboard.d.input.region", ResourceKind::Input),
        ]);
        let tree = build(&workspace, "dashboard.d").unwrap();

        tree.set_inputs(HashMap::from([
            ("dashboard.d.input.region".to_string(), serde_json::json!("eu")),
            ("input.nope".to_string(), serde_json::json!(1)),
        ]));

        let values = tree.input_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values["input.region"], serde_json::json!("eu"));
    }
}
