// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for session registry and execution tree lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Execution tree start, completion and failure
//! * Session trees being replaced or cleared
//! * Client-supplied input values

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Execution of a dashboard started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dashboard_runner::observability::messages::engine::ExecutionStarted;
///
/// let msg = ExecutionStarted {
///     session_id: "session-1",
///     execution_id: "4b1c",
///     dashboard: "dashboard.sales",
///     node_count: 5,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ExecutionStarted<'a> {
    pub session_id: &'a str,
    pub execution_id: &'a str,
    pub dashboard: &'a str,
    pub node_count: usize,
}

impl Display for ExecutionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting execution of '{}' for session '{}': {} nodes",
            self.dashboard, self.session_id, self.node_count
        )
    }
}

impl StructuredLog for ExecutionStarted<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            execution_id = self.execution_id,
            dashboard = self.dashboard,
            node_count = self.node_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution",
            span_name = name,
            session_id = self.session_id,
            execution_id = self.execution_id,
            dashboard = self.dashboard,
        )
    }
}

/// Execution completed with every node in the `Complete` state.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutionCompleted<'a> {
    pub session_id: &'a str,
    pub execution_id: &'a str,
    pub dashboard: &'a str,
    pub duration: std::time::Duration,
}

impl Display for ExecutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Execution of '{}' for session '{}' completed in {:?}",
            self.dashboard, self.session_id, self.duration
        )
    }
}

impl StructuredLog for ExecutionCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            execution_id = self.execution_id,
            dashboard = self.dashboard,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution_completed",
            span_name = name,
            session_id = self.session_id,
            execution_id = self.execution_id,
            duration = ?self.duration,
        )
    }
}

/// Execution finished with the root in the `Error` state.
///
/// # Log Level
/// `warn!` - Partial results were still delivered to the client
pub struct ExecutionFailed<'a> {
    pub session_id: &'a str,
    pub execution_id: &'a str,
    pub dashboard: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ExecutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Execution of '{}' for session '{}' failed: {}",
            self.dashboard, self.session_id, self.error
        )
    }
}

impl StructuredLog for ExecutionFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = self.session_id,
            execution_id = self.execution_id,
            dashboard = self.dashboard,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "execution_failed",
            span_name = name,
            session_id = self.session_id,
            execution_id = self.execution_id,
            error = %self.error,
        )
    }
}

/// A session's resident tree was cancelled to make room for a new one.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SessionTreeReplaced<'a> {
    pub session_id: &'a str,
    pub previous_execution_id: &'a str,
    pub dashboard: &'a str,
}

impl Display for SessionTreeReplaced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Replacing execution '{}' for session '{}' with a new run of '{}'",
            self.previous_execution_id, self.session_id, self.dashboard
        )
    }
}

impl StructuredLog for SessionTreeReplaced<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            previous_execution_id = self.previous_execution_id,
            dashboard = self.dashboard,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "session_tree_replaced",
            span_name = name,
            session_id = self.session_id,
            previous_execution_id = self.previous_execution_id,
        )
    }
}

/// A session's tree was cancelled and removed from the registry.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SessionCleared<'a> {
    pub session_id: &'a str,
    pub execution_id: &'a str,
}

impl Display for SessionCleared<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cleared execution '{}' for session '{}'",
            self.execution_id, self.session_id
        )
    }
}

impl StructuredLog for SessionCleared<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            execution_id = self.execution_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "session_cleared",
            span_name = name,
            session_id = self.session_id,
            execution_id = self.execution_id,
        )
    }
}

/// Client input values were stored in a live tree.
///
/// # Log Level
/// `debug!` - Frequent during interactive use
pub struct InputsApplied<'a> {
    pub session_id: &'a str,
    pub execution_id: &'a str,
    pub input_count: usize,
    pub released_waiters: usize,
}

impl Display for InputsApplied<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Applied {} input values to execution '{}', released {} waiting nodes",
            self.input_count, self.execution_id, self.released_waiters
        )
    }
}

impl StructuredLog for InputsApplied<'_> {
    fn log(&self) {
        tracing::debug!(
            session_id = self.session_id,
            execution_id = self.execution_id,
            input_count = self.input_count,
            released_waiters = self.released_waiters,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "inputs_applied",
            span_name = name,
            session_id = self.session_id,
            execution_id = self.execution_id,
        )
    }
}

/// A dashboard is being executed again because of an input update.
///
/// # Log Level
/// `info!` - Important operational event
pub struct DashboardRerunTriggered<'a> {
    pub session_id: &'a str,
    pub dashboard: &'a str,
    pub reason: &'a str,
}

impl Display for DashboardRerunTriggered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Re-executing '{}' for session '{}': {}",
            self.dashboard, self.session_id, self.reason
        )
    }
}

impl StructuredLog for DashboardRerunTriggered<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            dashboard = self.dashboard,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "dashboard_rerun",
            span_name = name,
            session_id = self.session_id,
            dashboard = self.dashboard,
        )
    }
}

/// A client supplied a value for an input the dashboard does not declare.
///
/// # Log Level
/// `warn!` - Client and workspace disagree
pub struct UnknownInputIgnored<'a> {
    pub session_id: &'a str,
    pub input: &'a str,
}

impl Display for UnknownInputIgnored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Ignoring value for undeclared input '{}' from session '{}'",
            self.input, self.session_id
        )
    }
}

impl StructuredLog for UnknownInputIgnored<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = self.session_id,
            input = self.input,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "unknown_input",
            span_name = name,
            session_id = self.session_id,
            input = self.input,
        )
    }
}
