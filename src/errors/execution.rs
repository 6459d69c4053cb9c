// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors produced while building and running execution trees.

use thiserror::Error;

use crate::config::ResourceKind;

/// Error recorded on a run node when it ends in the `Error` state.
///
/// Node errors are values, not control flow: a node stores its error, emits
/// it in an event and hands it up to its parent by aggregation. They must be
/// `Clone` because the same error is read by the parent, by events and by
/// snapshots.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// The leaf's query failed; the message is the backend's, unaltered.
    #[error("{message}")]
    Query { node: String, message: String },

    /// The execution context was cancelled while the node was waiting.
    #[error("execution of '{node}' was cancelled")]
    Cancelled { node: String },

    /// The node's task panicked before it reached a terminal state.
    #[error("execution of '{node}' panicked: {message}")]
    Panicked { node: String, message: String },

    /// A two-phase node failed to build its internal sub-tree.
    #[error("failed to initialise '{node}': {message}")]
    Initialise { node: String, message: String },

    /// Two or more child failures combined without loss.
    #[error("{}", render_aggregate(.0))]
    Aggregate(Vec<NodeError>),
}

impl NodeError {
    /// Combine child errors into the error a parent should record.
    ///
    /// Returns `None` when nothing failed. A single error is returned as-is
    /// so a parent with one failing child reports exactly the child's message.
    pub fn aggregate(mut errors: Vec<NodeError>) -> Option<NodeError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(NodeError::Aggregate(errors)),
        }
    }

    /// Every leaf-level message contained in this error, depth first.
    pub fn messages(&self) -> Vec<String> {
        match self {
            NodeError::Aggregate(errors) => errors.iter().flat_map(|e| e.messages()).collect(),
            other => vec![other.to_string()],
        }
    }

    pub fn is_cancellation(&self) -> bool {
        match self {
            NodeError::Cancelled { .. } => true,
            NodeError::Aggregate(errors) => errors.iter().all(|e| e.is_cancellation()),
            _ => false,
        }
    }
}

fn render_aggregate(errors: &[NodeError]) -> String {
    let mut out = format!("{} errors occurred:", errors.len());
    for error in errors {
        out.push_str("\n\t* ");
        out.push_str(&error.to_string());
    }
    out
}

/// Construction errors: the static resources cannot be turned into a tree.
///
/// These abort the whole execution request; no tree is left resident.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("dashboard '{0}' not found")]
    DashboardNotFound(String),

    #[error("resource '{parent}' references unknown child '{child}'")]
    UnknownChild { parent: String, child: String },

    #[error("'{resource}' depends on input '{input}' which dashboard '{dashboard}' does not declare")]
    UnresolvedInput {
        resource: String,
        input: String,
        dashboard: String,
    },

    #[error("resource '{name}' ({kind}) {reason}")]
    ContractViolation {
        name: String,
        kind: ResourceKind,
        reason: String,
    },

    #[error("cyclic reference detected: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),
}

/// Errors returned by the session-level executor API.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("no dashboard execution for session '{0}'")]
    UnknownSession(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_error(node: &str, message: &str) -> NodeError {
        NodeError::Query {
            node: node.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn aggregate_of_nothing_is_none() {
        assert_eq!(NodeError::aggregate(vec![]), None);
    }

    #[test]
    fn aggregate_of_one_is_the_error_itself() {
        let error = query_error("chart.a", "relation \"foo\" does not exist");
        let combined = NodeError::aggregate(vec![error.clone()]).unwrap();
        assert_eq!(combined, error);
        assert_eq!(combined.to_string(), "relation \"foo\" does not exist");
    }

    #[test]
    fn aggregate_keeps_every_message() {
        let combined = NodeError::aggregate(vec![
            query_error("chart.a", "E1"),
            query_error("chart.b", "E2"),
        ])
        .unwrap();

        let rendered = combined.to_string();
        assert!(rendered.starts_with("2 errors occurred:"));
        assert!(rendered.contains("\n\t* E1"));
        assert!(rendered.contains("\n\t* E2"));
        assert_eq!(combined.messages(), vec!["E1".to_string(), "E2".to_string()]);
    }

    #[test]
    fn nested_aggregates_flatten_in_messages() {
        let inner = NodeError::aggregate(vec![query_error("a", "E1"), query_error("b", "E2")]).unwrap();
        let outer = NodeError::aggregate(vec![inner, query_error("c", "E3")]).unwrap();
        assert_eq!(outer.messages(), vec!["E1", "E2", "E3"]);
    }

    #[test]
    fn cancellation_detection() {
        let cancelled = NodeError::Cancelled { node: "x".into() };
        assert!(cancelled.is_cancellation());
        let mixed = NodeError::aggregate(vec![cancelled.clone(), query_error("y", "boom")]).unwrap();
        assert!(!mixed.is_cancellation());
        let all = NodeError::aggregate(vec![cancelled.clone(), cancelled]).unwrap();
        assert!(all.is_cancellation());
    }
}
