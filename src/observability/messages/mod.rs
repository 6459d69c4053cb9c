// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit the same information as structured `tracing`
//! fields at the level the message is meant for.
//!
//! # Organization
//!
//! * `engine` - Session registry and execution tree lifecycle
//! * `node` - Run node execution, runtime-dependency waits and fan-in
//! * `validation` - Workspace validation errors
//!
//! # Usage Pattern
//!
//! ```rust
//! use dashboard_runner::observability::messages::engine::ExecutionStarted;
//! use dashboard_runner::observability::messages::StructuredLog;
//!
//! let msg = ExecutionStarted {
//!     session_id: "session-1",
//!     execution_id: "4b1c",
//!     dashboard: "dashboard.sales",
//!     node_count: 5,
//! };
//!
//! msg.log();
//! ```

use tracing::Span;

pub mod engine;
pub mod node;
pub mod validation;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the message as a `tracing` event.
    fn log(&self);

    /// A span carrying the same fields, for wrapping the work the message describes.
    fn span(&self, name: &str) -> Span;
}
