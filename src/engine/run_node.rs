// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The run node contract shared by dashboards, containers, checks and leaves.
//!
//! A [`RunNode`] is the mutable, per-execution counterpart of one static
//! resource. Status moves `Ready -> (Blocked <-> Ready)* -> Complete | Error`
//! and never leaves a terminal state. A terminal transition publishes exactly
//! one event and then signals the parent through a [`ParentNotifier`], the
//! only capability a child holds over its parent.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::config::{ResourceDefinition, ResourceKind};
use crate::engine::check::CheckRun;
use crate::engine::container::ContainerRun;
use crate::engine::context::ExecutionContext;
use crate::engine::events::ExecutionEvent;
use crate::engine::leaf::LeafRun;
use crate::engine::snapshot::{NodeSnapshot, TreeNode};
use crate::errors::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ready,
    Blocked,
    Complete,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Ready => "ready",
            RunStatus::Blocked => "blocked",
            RunStatus::Complete => "complete",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Handle a child uses to tell its parent it reached a terminal state.
#[derive(Clone)]
pub(crate) struct ParentNotifier {
    tx: mpsc::Sender<Arc<RunNode>>,
}

impl ParentNotifier {
    pub(crate) fn new(tx: mpsc::Sender<Arc<RunNode>>) -> Self {
        Self { tx }
    }

    fn signal_complete(&self, child: Arc<RunNode>) {
        // The queue holds one slot per child and each child signals once
        match self.tx.try_send(child) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(child)) => {
                tracing::debug!(node = child.name(), "parent no longer waiting for completion");
            }
            Err(e) => tracing::warn!(error = %e, "parent completion queue rejected signal"),
        }
    }
}

struct NodeState {
    status: RunStatus,
    error: Option<NodeError>,
}

/// Identity and status storage common to every node variant.
pub(crate) struct NodeCore {
    name: String,
    resource: Arc<ResourceDefinition>,
    parent: Option<ParentNotifier>,
    state: Mutex<NodeState>,
}

impl NodeCore {
    pub(crate) fn new(
        name: String,
        resource: Arc<ResourceDefinition>,
        parent: Option<ParentNotifier>,
        status: RunStatus,
    ) -> Self {
        Self {
            name,
            resource,
            parent,
            state: Mutex::new(NodeState {
                status,
                error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn resource(&self) -> &ResourceDefinition {
        &self.resource
    }

    pub(crate) fn status(&self) -> RunStatus {
        self.lock().status
    }

    pub(crate) fn error(&self) -> Option<NodeError> {
        self.lock().error.clone()
    }

    /// Move to a terminal state. Returns false if already terminal.
    fn finish(&self, status: RunStatus, error: Option<NodeError>) -> bool {
        let mut state = self.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.error = error;
        true
    }

    /// `Ready -> Blocked`. Returns false if the node was not ready.
    pub(crate) fn set_blocked(&self) -> bool {
        let mut state = self.lock();
        if state.status != RunStatus::Ready {
            return false;
        }
        state.status = RunStatus::Blocked;
        true
    }

    /// `Blocked -> Ready`; any other state is left alone.
    pub(crate) fn set_unblocked(&self) {
        let mut state = self.lock();
        if state.status == RunStatus::Blocked {
            state.status = RunStatus::Ready;
        }
    }
}

/// One node of an execution tree.
///
/// The set of variants is closed; tree construction is the one place that
/// maps a [`ResourceKind`] to a variant.
pub enum RunNode {
    Dashboard(ContainerRun),
    Container(ContainerRun),
    Check(CheckRun),
    Leaf(LeafRun),
}

impl RunNode {
    pub(crate) fn core(&self) -> &NodeCore {
        match self {
            RunNode::Dashboard(container) | RunNode::Container(container) => container.core(),
            RunNode::Check(check) => check.core(),
            RunNode::Leaf(leaf) => leaf.core(),
        }
    }

    pub fn name(&self) -> &str {
        self.core().name()
    }

    pub fn node_type(&self) -> ResourceKind {
        self.core().resource().kind
    }

    pub fn resource(&self) -> &ResourceDefinition {
        self.core().resource()
    }

    /// Current status.
    ///
    /// A non-terminal container reports `Blocked` while any child is blocked.
    pub fn run_status(&self) -> RunStatus {
        let status = self.core().status();
        if status.is_terminal() {
            return status;
        }
        let blocked_child = self
            .children()
            .iter()
            .any(|child| child.run_status() == RunStatus::Blocked);
        if blocked_child {
            RunStatus::Blocked
        } else {
            status
        }
    }

    pub fn run_complete(&self) -> bool {
        self.core().status().is_terminal()
    }

    /// True when every direct child is terminal; trivially true for leaves.
    pub fn children_complete(&self) -> bool {
        self.children().iter().all(|child| child.run_complete())
    }

    pub fn children(&self) -> &[Arc<RunNode>] {
        match self {
            RunNode::Dashboard(container) | RunNode::Container(container) => container.children(),
            RunNode::Check(_) | RunNode::Leaf(_) => &[],
        }
    }

    pub fn error(&self) -> Option<NodeError> {
        self.core().error()
    }

    pub fn is_root(&self) -> bool {
        self.core().parent.is_none()
    }

    /// Drive this node and its descendants to a terminal state.
    ///
    /// A node that is already terminal (including pure layout) returns at once.
    pub(crate) fn execute(self: Arc<Self>, ctx: Arc<ExecutionContext>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if self.run_complete() {
                return;
            }
            match &*self {
                RunNode::Dashboard(container) | RunNode::Container(container) => {
                    container.execute(&self, ctx).await
                }
                RunNode::Check(check) => check.execute(&self, ctx).await,
                RunNode::Leaf(leaf) => leaf.execute(&self, ctx).await,
            }
        })
    }

    pub(crate) fn set_complete(self: &Arc<Self>, ctx: &ExecutionContext) {
        if self.core().finish(RunStatus::Complete, None) {
            self.publish_terminal(ctx);
            self.signal_parent(ctx);
        }
    }

    pub(crate) fn set_error(self: &Arc<Self>, ctx: &ExecutionContext, error: NodeError) {
        if self.core().finish(RunStatus::Error, Some(error)) {
            self.publish_terminal(ctx);
            self.signal_parent(ctx);
        }
    }

    fn signal_parent(self: &Arc<Self>, ctx: &ExecutionContext) {
        match &self.core().parent {
            Some(parent) => parent.signal_complete(Arc::clone(self)),
            None => ctx.finish(),
        }
    }

    /// Publish the one terminal event for this node's current state.
    pub(crate) fn publish_terminal(&self, ctx: &ExecutionContext) {
        let failed = self.core().status() == RunStatus::Error;
        let header = ctx.header();

        if self.is_root() {
            let root = self.snapshot();
            let layout = self.as_tree_node();
            let panels = self.panels();
            let inputs = ctx.inputs.values();
            let duration_ms = ctx.elapsed().as_millis() as u64;
            let event = if failed {
                ExecutionEvent::ExecutionError {
                    header,
                    root,
                    layout,
                    panels,
                    inputs,
                    duration_ms,
                }
            } else {
                ExecutionEvent::ExecutionComplete {
                    header,
                    root,
                    layout,
                    panels,
                    inputs,
                    duration_ms,
                }
            };
            ctx.publish(event);
            return;
        }

        let node = self.snapshot();
        let event = match (self, failed) {
            (RunNode::Dashboard(_) | RunNode::Container(_), false) => {
                ExecutionEvent::ContainerComplete { header, node }
            }
            (RunNode::Dashboard(_) | RunNode::Container(_), true) => {
                ExecutionEvent::ContainerError { header, node }
            }
            (RunNode::Check(_) | RunNode::Leaf(_), false) => {
                ExecutionEvent::LeafNodeComplete { header, node }
            }
            (RunNode::Check(_) | RunNode::Leaf(_), true) => {
                ExecutionEvent::LeafNodeError { header, node }
            }
        };
        ctx.publish(event);
    }

    pub(crate) fn publish_progress(&self, ctx: &ExecutionContext) {
        ctx.publish(ExecutionEvent::LeafNodeProgress {
            header: ctx.header(),
            node: self.snapshot(),
        });
    }

    /// Layout projection, independent of live status.
    pub fn as_tree_node(&self) -> TreeNode {
        let resource = self.resource();
        let children = match self {
            RunNode::Check(check) => check.layout_children(),
            _ => self
                .children()
                .iter()
                .map(|child| child.as_tree_node())
                .collect(),
        };
        TreeNode {
            name: self.name().to_string(),
            node_type: resource.kind,
            display_type: resource.display.clone(),
            width: resource.width,
            title: resource.title.clone(),
            children,
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let resource = self.resource();
        let (args, data) = match self {
            RunNode::Leaf(leaf) => (leaf.args(), leaf.data()),
            _ => (Vec::new(), None),
        };
        let summary = match self {
            RunNode::Check(check) => Some(check.summary()),
            _ => None,
        };
        NodeSnapshot {
            name: self.name().to_string(),
            node_type: resource.kind,
            title: resource.title.clone(),
            width: resource.width,
            display_type: resource.display.clone(),
            status: self.run_status(),
            error: self.error().map(|e| e.to_string()),
            sql: resource.executable_sql().map(str::to_string),
            args,
            data,
            summary,
            tags: resource.tags.clone(),
        }
    }

    /// Snapshots of this node and every descendant, keyed by name.
    pub fn panels(&self) -> BTreeMap<String, NodeSnapshot> {
        let mut panels = BTreeMap::new();
        self.collect_panels(&mut panels);
        panels
    }

    fn collect_panels(&self, panels: &mut BTreeMap<String, NodeSnapshot>) {
        panels.insert(self.name().to_string(), self.snapshot());
        for child in self.children() {
            child.collect_panels(panels);
        }
    }
}

impl fmt::Debug for RunNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunNode")
            .field("name", &self.name())
            .field("node_type", &self.node_type())
            .field("status", &self.run_status())
            .field("children", &self.children().len())
            .finish()
    }
}
