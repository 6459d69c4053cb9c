// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lifecycle events published to an [`EventSink`].
//!
//! Each event carries the session and execution it belongs to; a client that
//! re-executes a dashboard may still see late events from the tree that was
//! replaced and should filter on `execution_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::engine::snapshot::{NodeSnapshot, TreeNode};
use crate::traits::EventSink;

/// Fields common to every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    pub session_id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The tree is built and about to run; carries the final layout.
    ExecutionStarted {
        #[serde(flatten)]
        header: EventHeader,
        dashboard: String,
        layout: TreeNode,
        panels: BTreeMap<String, NodeSnapshot>,
        inputs: BTreeMap<String, Value>,
    },
    LeafNodeProgress {
        #[serde(flatten)]
        header: EventHeader,
        node: NodeSnapshot,
    },
    LeafNodeComplete {
        #[serde(flatten)]
        header: EventHeader,
        node: NodeSnapshot,
    },
    LeafNodeError {
        #[serde(flatten)]
        header: EventHeader,
        node: NodeSnapshot,
    },
    ContainerComplete {
        #[serde(flatten)]
        header: EventHeader,
        node: NodeSnapshot,
    },
    ContainerError {
        #[serde(flatten)]
        header: EventHeader,
        node: NodeSnapshot,
    },
    /// The root completed; always the last event of an execution.
    ExecutionComplete {
        #[serde(flatten)]
        header: EventHeader,
        root: NodeSnapshot,
        layout: TreeNode,
        panels: BTreeMap<String, NodeSnapshot>,
        inputs: BTreeMap<String, Value>,
        duration_ms: u64,
    },
    /// The root ended in error; always the last event of an execution.
    ExecutionError {
        #[serde(flatten)]
        header: EventHeader,
        root: NodeSnapshot,
        layout: TreeNode,
        panels: BTreeMap<String, NodeSnapshot>,
        inputs: BTreeMap<String, Value>,
        duration_ms: u64,
    },
}

/// Discriminant of an [`ExecutionEvent`], handy for filtering and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ExecutionStarted,
    LeafNodeProgress,
    LeafNodeComplete,
    LeafNodeError,
    ContainerComplete,
    ContainerError,
    ExecutionComplete,
    ExecutionError,
}

impl ExecutionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => EventKind::ExecutionStarted,
            ExecutionEvent::LeafNodeProgress { .. } => EventKind::LeafNodeProgress,
            ExecutionEvent::LeafNodeComplete { .. } => EventKind::LeafNodeComplete,
            ExecutionEvent::LeafNodeError { .. } => EventKind::LeafNodeError,
            ExecutionEvent::ContainerComplete { .. } => EventKind::ContainerComplete,
            ExecutionEvent::ContainerError { .. } => EventKind::ContainerError,
            ExecutionEvent::ExecutionComplete { .. } => EventKind::ExecutionComplete,
            ExecutionEvent::ExecutionError { .. } => EventKind::ExecutionError,
        }
    }

    pub fn header(&self) -> &EventHeader {
        match self {
            ExecutionEvent::ExecutionStarted { header, .. }
            | ExecutionEvent::LeafNodeProgress { header, .. }
            | ExecutionEvent::LeafNodeComplete { header, .. }
            | ExecutionEvent::LeafNodeError { header, .. }
            | ExecutionEvent::ContainerComplete { header, .. }
            | ExecutionEvent::ContainerError { header, .. }
            | ExecutionEvent::ExecutionComplete { header, .. }
            | ExecutionEvent::ExecutionError { header, .. } => header,
        }
    }

    /// The node the event is about; the root for execution-level events.
    pub fn node(&self) -> Option<&NodeSnapshot> {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => None,
            ExecutionEvent::LeafNodeProgress { node, .. }
            | ExecutionEvent::LeafNodeComplete { node, .. }
            | ExecutionEvent::LeafNodeError { node, .. }
            | ExecutionEvent::ContainerComplete { node, .. }
            | ExecutionEvent::ContainerError { node, .. } => Some(node),
            ExecutionEvent::ExecutionComplete { root, .. }
            | ExecutionEvent::ExecutionError { root, .. } => Some(root),
        }
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node().map(|node| node.name.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::ExecutionComplete | EventKind::ExecutionError
        )
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: ExecutionEvent) {}
}

/// Forwards events into an unbounded channel.
///
/// Events published after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: ExecutionEvent) {
        if let Err(unsent) = self.tx.send(event) {
            tracing::trace!(action = ?unsent.0.kind(), "event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceKind;
    use crate::engine::run_node::RunStatus;
    use std::collections::HashMap;

    fn header() -> EventHeader {
        EventHeader {
            session_id: "session-1".into(),
            execution_id: "exec-1".into(),
            timestamp: Utc::now(),
        }
    }

    fn snapshot(name: &str, status: RunStatus) -> NodeSnapshot {
        NodeSnapshot {
            name: name.into(),
            node_type: ResourceKind::Chart,
            title: None,
            width: None,
            display_type: None,
            status,
            error: None,
            sql: Some("select 1".into()),
            args: vec![],
            data: None,
            summary: None,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn events_serialize_with_action_tag_and_flat_header() {
        let event = ExecutionEvent::LeafNodeComplete {
            header: header(),
            node: snapshot("chart.a", RunStatus::Complete),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "leaf_node_complete");
        assert_eq!(json["session_id"], "session-1");
        assert_eq!(json["execution_id"], "exec-1");
        assert_eq!(json["node"]["status"], "complete");
        assert_eq!(json["node"]["node_type"], "chart");
    }

    #[test]
    fn kind_and_node_accessors() {
        let event = ExecutionEvent::LeafNodeError {
            header: header(),
            node: snapshot("chart.a", RunStatus::Error),
        };
        assert_eq!(event.kind(), EventKind::LeafNodeError);
        assert_eq!(event.node_name(), Some("chart.a"));
        assert!(!event.is_terminal());
        assert_eq!(event.header().execution_id, "exec-1");
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.publish(ExecutionEvent::LeafNodeProgress {
            header: header(),
            node: snapshot("chart.a", RunStatus::Ready),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::LeafNodeProgress);
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.publish(ExecutionEvent::LeafNodeProgress {
            header: header(),
            node: snapshot("chart.a", RunStatus::Ready),
        });
    }
}
