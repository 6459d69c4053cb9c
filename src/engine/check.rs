// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Check nodes: benchmarks and controls.
//!
//! A check node is built in two phases. Construction creates an empty node;
//! [`CheckRun::initialise`] then expands the benchmark into a
//! [`ControlRunTree`] so the final shape is known before execution starts.
//! Execution runs every control concurrently and folds their results into a
//! [`CheckSummary`]. Control failures are recorded in the summary; the node
//! itself only fails when the execution is cancelled.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::task::JoinSet;

use crate::config::consts::CONTROL_STATUS_COLUMN;
use crate::config::{ResourceDefinition, ResourceKind, Workspace};
use crate::engine::container::panic_message;
use crate::engine::context::ExecutionContext;
use crate::engine::run_node::{NodeCore, RunNode};
use crate::engine::snapshot::TreeNode;
use crate::errors::{BuildError, NodeError};
use crate::observability::messages::node::{ChildTaskPanicked, ControlCompleted};
use crate::observability::messages::StructuredLog;
use crate::traits::{QueryRequest, QueryResult};

/// Per-row outcome a control query reports in its `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Ok,
    Alarm,
    Error,
    Info,
    Skip,
}

impl ControlStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ok" => Some(ControlStatus::Ok),
            "alarm" => Some(ControlStatus::Alarm),
            "error" => Some(ControlStatus::Error),
            "info" => Some(ControlStatus::Info),
            "skip" => Some(ControlStatus::Skip),
            _ => None,
        }
    }
}

/// Counts of control results, folded up through benchmark groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub ok: usize,
    pub alarm: usize,
    pub error: usize,
    pub info: usize,
    pub skip: usize,
    /// Controls that could not produce results at all
    pub control_errors: usize,
}

impl CheckSummary {
    pub fn record(&mut self, status: ControlStatus) {
        match status {
            ControlStatus::Ok => self.ok += 1,
            ControlStatus::Alarm => self.alarm += 1,
            ControlStatus::Error => self.error += 1,
            ControlStatus::Info => self.info += 1,
            ControlStatus::Skip => self.skip += 1,
        }
    }

    pub fn merge(&mut self, other: &CheckSummary) {
        self.ok += other.ok;
        self.alarm += other.alarm;
        self.error += other.error;
        self.info += other.info;
        self.skip += other.skip;
        self.control_errors += other.control_errors;
    }

    pub fn total(&self) -> usize {
        self.ok + self.alarm + self.error + self.info + self.skip
    }
}

#[derive(Default)]
struct ControlState {
    summary: CheckSummary,
    row_count: usize,
    error: Option<String>,
    complete: bool,
}

/// One control: a query whose rows each carry a status.
pub struct ControlRun {
    name: String,
    resource: Arc<ResourceDefinition>,
    state: Mutex<ControlState>,
}

impl ControlRun {
    fn new(resource: Arc<ResourceDefinition>) -> Self {
        Self {
            name: resource.name.clone(),
            resource,
            state: Mutex::new(ControlState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    fn summary(&self) -> CheckSummary {
        let state = self.lock();
        let mut summary = state.summary;
        if state.error.is_some() {
            summary.control_errors += 1;
        }
        summary
    }

    async fn run(&self, ctx: &ExecutionContext) {
        let sql = self.resource.executable_sql().unwrap_or_default().to_string();
        let request = QueryRequest {
            sql,
            args: Vec::new(),
        };
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => Err("execution was cancelled".to_string()),
            result = ctx.queries.execute(request) => result.map_err(|e| e.to_string()),
        };

        let mut state = self.lock();
        match outcome {
            Ok(result) => {
                state.row_count = result.row_count();
                let (summary, error) = tally(&result);
                state.summary = summary;
                state.error = error;
            }
            Err(error) => state.error = Some(error),
        }
        state.complete = true;
    }

    /// Close the control as failed; counts towards `control_errors`.
    fn record_failure(&self, error: String) {
        let mut state = self.lock();
        state.error = Some(error);
        state.complete = true;
    }
}

/// Count row statuses; the first invalid row is reported as the control's error.
fn tally(result: &QueryResult) -> (CheckSummary, Option<String>) {
    let mut summary = CheckSummary::default();
    let mut error = None;
    for (index, row) in result.rows.iter().enumerate() {
        let status = row
            .get(CONTROL_STATUS_COLUMN)
            .and_then(|value| value.as_str())
            .and_then(ControlStatus::parse);
        match status {
            Some(status) => summary.record(status),
            None if error.is_none() => {
                error = Some(format!(
                    "row {} has no valid '{}' column",
                    index, CONTROL_STATUS_COLUMN
                ));
            }
            None => {}
        }
    }
    (summary, error)
}

enum ControlItem {
    Group(ControlGroup),
    Control(Arc<ControlRun>),
}

impl ControlItem {
    fn summary(&self) -> CheckSummary {
        match self {
            ControlItem::Group(group) => group.summary(),
            ControlItem::Control(control) => control.summary(),
        }
    }

    fn as_tree_node(&self) -> TreeNode {
        match self {
            ControlItem::Group(group) => group.as_tree_node(),
            ControlItem::Control(control) => TreeNode {
                name: control.name.clone(),
                node_type: ResourceKind::Control,
                display_type: control.resource.display.clone(),
                width: control.resource.width,
                title: control.resource.title.clone(),
                children: Vec::new(),
            },
        }
    }
}

/// A benchmark expanded into nested groups and controls, in declared order.
pub struct ControlGroup {
    name: String,
    resource: Arc<ResourceDefinition>,
    items: Vec<ControlItem>,
}

impl ControlGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> CheckSummary {
        let mut summary = CheckSummary::default();
        for item in &self.items {
            summary.merge(&item.summary());
        }
        summary
    }

    /// Every control beneath this group, depth first.
    pub fn controls(&self) -> Vec<Arc<ControlRun>> {
        let mut controls = Vec::new();
        for item in &self.items {
            match item {
                ControlItem::Group(group) => controls.extend(group.controls()),
                ControlItem::Control(control) => controls.push(Arc::clone(control)),
            }
        }
        controls
    }

    fn as_tree_node(&self) -> TreeNode {
        TreeNode {
            name: self.name.clone(),
            node_type: self.resource.kind,
            display_type: self.resource.display.clone(),
            width: self.resource.width,
            title: self.resource.title.clone(),
            children: self.items.iter().map(ControlItem::as_tree_node).collect(),
        }
    }
}

/// Internal execution tree of a check node.
pub struct ControlRunTree {
    root: ControlGroup,
}

impl ControlRunTree {
    /// Expand `resource` (a benchmark or control) using the workspace.
    pub fn build(workspace: &Workspace, resource: &Arc<ResourceDefinition>) -> Result<Self, BuildError> {
        let mut path = Vec::new();
        let root = match resource.kind {
            ResourceKind::Control => ControlGroup {
                name: resource.name.clone(),
                resource: Arc::clone(resource),
                items: vec![ControlItem::Control(Arc::new(ControlRun::new(Arc::clone(
                    resource,
                ))))],
            },
            _ => build_group(workspace, resource, &mut path)?,
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &ControlGroup {
        &self.root
    }

    pub fn summary(&self) -> CheckSummary {
        self.root.summary()
    }

    pub fn controls(&self) -> Vec<Arc<ControlRun>> {
        self.root.controls()
    }

    /// Group and control names beneath the check node itself.
    fn layout_children(&self) -> Vec<TreeNode> {
        match self.root.resource.kind {
            ResourceKind::Control => Vec::new(),
            _ => self.root.as_tree_node().children,
        }
    }
}

fn build_group(
    workspace: &Workspace,
    resource: &Arc<ResourceDefinition>,
    path: &mut Vec<String>,
) -> Result<ControlGroup, BuildError> {
    if let Some(position) = path.iter().position(|name| *name == resource.name) {
        let mut cycle = path[position..].to_vec();
        cycle.push(resource.name.clone());
        return Err(BuildError::CyclicReference(cycle));
    }
    path.push(resource.name.clone());

    let mut items = Vec::new();
    let mut seen = HashSet::new();
    for child in workspace.children_of(resource)? {
        match child.kind {
            ResourceKind::Benchmark => {
                items.push(ControlItem::Group(build_group(workspace, &child, path)?))
            }
            ResourceKind::Control => {
                if child.executable_sql().is_none() {
                    return Err(BuildError::ContractViolation {
                        name: child.name.clone(),
                        kind: child.kind,
                        reason: "must declare sql".into(),
                    });
                }
                if !child.args.is_empty() {
                    return Err(BuildError::ContractViolation {
                        name: child.name.clone(),
                        kind: child.kind,
                        reason: "cannot declare runtime dependencies".into(),
                    });
                }
                if seen.insert(child.name.clone()) {
                    items.push(ControlItem::Control(Arc::new(ControlRun::new(child))));
                }
            }
            other => {
                return Err(BuildError::ContractViolation {
                    name: resource.name.clone(),
                    kind: resource.kind,
                    reason: format!("cannot contain '{}' ({})", child.name, other),
                })
            }
        }
    }

    path.pop();
    Ok(ControlGroup {
        name: resource.name.clone(),
        resource: Arc::clone(resource),
        items,
    })
}

/// Run node wrapping a [`ControlRunTree`].
pub struct CheckRun {
    core: NodeCore,
    controls: OnceLock<ControlRunTree>,
}

impl CheckRun {
    pub(crate) fn new(core: NodeCore) -> Self {
        Self {
            core,
            controls: OnceLock::new(),
        }
    }

    pub(crate) fn core(&self) -> &NodeCore {
        &self.core
    }

    /// Build the control tree. Calling it again is a no-op.
    pub fn initialise(&self, workspace: &Workspace) -> Result<(), BuildError> {
        if self.controls.get().is_some() {
            return Ok(());
        }
        let resource = Arc::new(self.core.resource().clone());
        let tree = ControlRunTree::build(workspace, &resource)?;
        // A concurrent initialise built an identical tree; either is fine
        let _ = self.controls.set(tree);
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.controls.get().is_some()
    }

    pub fn summary(&self) -> CheckSummary {
        self.controls
            .get()
            .map(ControlRunTree::summary)
            .unwrap_or_default()
    }

    pub(crate) fn layout_children(&self) -> Vec<TreeNode> {
        self.controls
            .get()
            .map(ControlRunTree::layout_children)
            .unwrap_or_default()
    }

    pub(crate) async fn execute(&self, node: &Arc<RunNode>, ctx: Arc<ExecutionContext>) {
        let Some(tree) = self.controls.get() else {
            node.set_error(
                &ctx,
                NodeError::Initialise {
                    node: self.core.name().to_string(),
                    message: "control tree was not initialised".into(),
                },
            );
            return;
        };

        let mut tasks = JoinSet::new();
        for control in tree.controls() {
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(control.run(&ctx)).catch_unwind().await;
                if let Err(panic) = outcome {
                    let message = panic_message(panic.as_ref());
                    control.record_failure(format!("control panicked: {}", message));
                }
                control
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(control) => {
                    let error = control.error();
                    ControlCompleted {
                        check: self.core.name(),
                        control: control.name(),
                        row_count: control.lock().row_count,
                        error: error.as_deref(),
                    }
                    .log();
                    node.publish_progress(&ctx);
                }
                Err(join_error) => {
                    let message = join_error.to_string();
                    ChildTaskPanicked {
                        parent: self.core.name(),
                        child: "control",
                        message: &message,
                    }
                    .log();
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            node.set_error(
                &ctx,
                NodeError::Cancelled {
                    node: self.core.name().to_string(),
                },
            );
        } else {
            node.set_complete(&ctx);
        }
    }
}
