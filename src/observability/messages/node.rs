// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for individual run node events.
//!
//! This module contains message types for logging events related to:
//! * Leaf query execution
//! * Runtime dependency (input) waits
//! * Container fan-in
//! * Control execution inside check nodes

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A leaf node is about to run its query.
///
/// # Log Level
/// `debug!` - One per leaf per execution
///
/// # Example
/// ```
/// use dashboard_runner::observability::messages::node::LeafQueryStarted;
///
/// let msg = LeafQueryStarted {
///     node: "chart.totals",
///     arg_count: 1,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct LeafQueryStarted<'a> {
    pub node: &'a str,
    pub arg_count: usize,
}

impl Display for LeafQueryStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Running query for '{}' with {} args",
            self.node, self.arg_count
        )
    }
}

impl StructuredLog for LeafQueryStarted<'_> {
    fn log(&self) {
        tracing::debug!(node = self.node, arg_count = self.arg_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "leaf_query",
            span_name = name,
            node = self.node,
            arg_count = self.arg_count,
        )
    }
}

/// A leaf node's query returned rows.
///
/// # Log Level
/// `debug!` - One per leaf per execution
pub struct LeafQueryCompleted<'a> {
    pub node: &'a str,
    pub row_count: usize,
    pub duration: std::time::Duration,
}

impl Display for LeafQueryCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Query for '{}' returned {} rows in {:?}",
            self.node, self.row_count, self.duration
        )
    }
}

impl StructuredLog for LeafQueryCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            node = self.node,
            row_count = self.row_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "leaf_query_completed",
            span_name = name,
            node = self.node,
            row_count = self.row_count,
        )
    }
}

/// A leaf node's query failed; the node ends in the `Error` state.
///
/// # Log Level
/// `warn!` - Recovered at the node boundary
///
/// # Example
/// ```
/// use dashboard_runner::observability::messages::node::LeafQueryFailed;
/// use dashboard_runner::errors::QueryError;
///
/// let error = QueryError::Execution("relation \"sales\" does not exist".into());
/// let msg = LeafQueryFailed {
///     node: "chart.totals",
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct LeafQueryFailed<'a> {
    pub node: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for LeafQueryFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Query for '{}' failed: {}", self.node, self.error)
    }
}

impl StructuredLog for LeafQueryFailed<'_> {
    fn log(&self) {
        tracing::warn!(node = self.node, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "leaf_query_failed",
            span_name = name,
            node = self.node,
            error = %self.error,
        )
    }
}

/// A leaf node is waiting for a client to supply an input value.
///
/// # Log Level
/// `debug!` - Expected while a dashboard awaits user selections
pub struct LeafBlockedOnInput<'a> {
    pub node: &'a str,
    pub input: &'a str,
}

impl Display for LeafBlockedOnInput<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "'{}' is waiting for input '{}'", self.node, self.input)
    }
}

impl StructuredLog for LeafBlockedOnInput<'_> {
    fn log(&self) {
        tracing::debug!(node = self.node, input = self.input, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "input_wait",
            span_name = name,
            node = self.node,
            input = self.input,
        )
    }
}

/// A runtime dependency was bound to a value.
///
/// # Log Level
/// `trace!` - Fine-grained detail
pub struct InputResolved<'a> {
    pub node: &'a str,
    pub input: &'a str,
    pub property: &'a str,
    pub waited: bool,
}

impl Display for InputResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let path = if self.waited { "after waiting" } else { "immediately" };
        write!(
            f,
            "'{}' bound input '{}' to '{}' {}",
            self.node, self.input, self.property, path
        )
    }
}

impl StructuredLog for InputResolved<'_> {
    fn log(&self) {
        tracing::trace!(
            node = self.node,
            input = self.input,
            property = self.property,
            waited = self.waited,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "input_resolved",
            span_name = name,
            node = self.node,
            input = self.input,
        )
    }
}

/// A container or dashboard node observed every child reach a terminal state.
///
/// # Log Level
/// `debug!` - One per container per execution
pub struct ContainerResolved<'a> {
    pub node: &'a str,
    pub child_count: usize,
    pub failed_children: usize,
}

impl Display for ContainerResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "'{}' resolved: {} children, {} failed",
            self.node, self.child_count, self.failed_children
        )
    }
}

impl StructuredLog for ContainerResolved<'_> {
    fn log(&self) {
        tracing::debug!(
            node = self.node,
            child_count = self.child_count,
            failed_children = self.failed_children,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "container_resolved",
            span_name = name,
            node = self.node,
            child_count = self.child_count,
        )
    }
}

/// A control inside a check node finished.
///
/// # Log Level
/// `debug!` - One per control per execution
pub struct ControlCompleted<'a> {
    pub check: &'a str,
    pub control: &'a str,
    pub row_count: usize,
    pub error: Option<&'a str>,
}

impl Display for ControlCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.error {
            Some(error) => write!(
                f,
                "Control '{}' in '{}' failed: {}",
                self.control, self.check, error
            ),
            None => write!(
                f,
                "Control '{}' in '{}' produced {} results",
                self.control, self.check, self.row_count
            ),
        }
    }
}

impl StructuredLog for ControlCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            check = self.check,
            control = self.control,
            row_count = self.row_count,
            error = self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "control",
            span_name = name,
            check = self.check,
            control = self.control,
        )
    }
}

/// A child task panicked before reaching a terminal state.
///
/// # Log Level
/// `error!` - A bug in a node implementation or query backend
pub struct ChildTaskPanicked<'a> {
    pub parent: &'a str,
    pub child: &'a str,
    pub message: &'a str,
}

impl Display for ChildTaskPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task for '{}' under '{}' panicked: {}",
            self.child, self.parent, self.message
        )
    }
}

impl StructuredLog for ChildTaskPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            parent = self.parent,
            child = self.child,
            message = self.message,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "child_panicked",
            span_name = name,
            parent = self.parent,
            child = self.child,
        )
    }
}
