// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::engine::context::ExecutionContext;
use crate::engine::run_node::{NodeCore, RunNode};
use crate::errors::NodeError;
use crate::observability::messages::node::{ChildTaskPanicked, ContainerResolved};
use crate::observability::messages::StructuredLog;

/// Fan-out/fan-in node used for dashboards and containers.
///
/// Every child runs in its own task. The container waits on its completion
/// queue until each started child has signalled once, then resolves to the
/// aggregate of its children's errors. A failing child never cancels its
/// siblings.
pub struct ContainerRun {
    core: NodeCore,
    children: Vec<Arc<RunNode>>,
    completions: Mutex<Option<mpsc::Receiver<Arc<RunNode>>>>,
}

impl ContainerRun {
    pub(crate) fn new(
        core: NodeCore,
        children: Vec<Arc<RunNode>>,
        completions: mpsc::Receiver<Arc<RunNode>>,
    ) -> Self {
        Self {
            core,
            children,
            completions: Mutex::new(Some(completions)),
        }
    }

    pub(crate) fn core(&self) -> &NodeCore {
        &self.core
    }

    pub(crate) fn children(&self) -> &[Arc<RunNode>] {
        &self.children
    }

    fn take_completions(&self) -> Option<mpsc::Receiver<Arc<RunNode>>> {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) async fn execute(&self, node: &Arc<RunNode>, ctx: Arc<ExecutionContext>) {
        let Some(mut completions) = self.take_completions() else {
            tracing::warn!(node = self.core.name(), "container executed twice");
            return;
        };

        let mut tasks = JoinSet::new();
        let mut outstanding = 0usize;
        for child in &self.children {
            if child.run_complete() {
                continue;
            }
            outstanding += 1;
            tasks.spawn(run_child(
                self.core.name().to_string(),
                Arc::clone(child),
                Arc::clone(&ctx),
            ));
        }

        while outstanding > 0 {
            match completions.recv().await {
                Some(child) => {
                    outstanding -= 1;
                    tracing::trace!(
                        node = self.core.name(),
                        child = child.name(),
                        outstanding,
                        "child signalled completion"
                    );
                }
                None => break,
            }
        }
        while tasks.join_next().await.is_some() {}

        let errors: Vec<NodeError> = self
            .children
            .iter()
            .filter_map(|child| child.error())
            .collect();

        ContainerResolved {
            node: self.core.name(),
            child_count: self.children.len(),
            failed_children: errors.len(),
        }
        .log();

        match NodeError::aggregate(errors) {
            None => node.set_complete(&ctx),
            Some(error) => node.set_error(&ctx, error),
        }
    }
}

/// Run one child, converting a panic or a missing terminal transition into an error.
async fn run_child(parent: String, child: Arc<RunNode>, ctx: Arc<ExecutionContext>) {
    let outcome = AssertUnwindSafe(Arc::clone(&child).execute(Arc::clone(&ctx)))
        .catch_unwind()
        .await;

    let message = match outcome {
        Err(panic) => panic_message(panic.as_ref()),
        Ok(()) if !child.run_complete() => "task ended before reaching a terminal state".into(),
        Ok(()) => return,
    };

    ChildTaskPanicked {
        parent: &parent,
        child: child.name(),
        message: &message,
    }
    .log();
    abandon_descendants(&child, &ctx);
    child.set_error(
        &ctx,
        NodeError::Panicked {
            node: child.name().to_string(),
            message,
        },
    );
}

/// Cancel every descendant still running when `node`'s task died.
///
/// Their tasks were aborted with the dead task's `JoinSet`, so nothing else
/// will move them to a terminal state. Children finish before their parent.
fn abandon_descendants(node: &Arc<RunNode>, ctx: &ExecutionContext) {
    for child in node.children() {
        abandon_descendants(child, ctx);
        if !child.run_complete() {
            child.set_error(
                ctx,
                NodeError::Cancelled {
                    node: child.name().to_string(),
                },
            );
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{RecordingSink, StubQueryExecutor};
    use crate::config::{ResourceDefinition, ResourceKind, Workspace};
    use crate::engine::{EventKind, ExecutionTree, RunStatus};

    #[test]
    fn abandoned_descendants_end_cancelled_before_their_parent() {
        let workspace = Workspace::new(vec![ResourceDefinition::new("dashboard.d", ResourceKind::Dashboard)
            .with_inline_child(
                ResourceDefinition::new("container.outer", ResourceKind::Container).with_inline_child(
                    ResourceDefinition::new("container.inner", ResourceKind::Container)
                        .with_inline_child(
                            ResourceDefinition::new("chart.a", ResourceKind::Chart).with_sql("select a"),
                        ),
                ),
            )]);
        let tree = ExecutionTree::build(
            &workspace,
            "dashboard.d",
            "session-1",
            Arc::new(StubQueryExecutor::new()),
            Arc::new(RecordingSink::new()),
        )
        .ok()
        .unwrap();

        let sink = Arc::new(RecordingSink::new());
        let ctx = ExecutionContext::new(
            "session-1".into(),
            "exec-1".into(),
            Arc::new(StubQueryExecutor::new()),
            sink.clone(),
        );
        let outer = Arc::clone(tree.node("container.outer").unwrap());
        abandon_descendants(&outer, &ctx);

        for name in ["container.inner", "chart.a"] {
            let node = tree.node(name).unwrap();
            assert_eq!(node.run_status(), RunStatus::Error);
            assert!(node.error().unwrap().is_cancellation());
        }
        assert_eq!(outer.run_status(), RunStatus::Ready);

        let order: Vec<(EventKind, String)> = sink
            .events()
            .iter()
            .map(|e| (e.kind(), e.node_name().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (EventKind::LeafNodeError, "chart.a".to_string()),
                (EventKind::ContainerError, "container.inner".to_string()),
            ]
        );
    }
}
