// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the dashboard runner. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names identical between the text and the structured form
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - Session registry and execution tree lifecycle
//! * `messages::node` - Run node execution, input waits and fan-in
//! * `messages::validation` - Workspace validation errors
//!
//! # Usage
//!
//! ```rust
//! use dashboard_runner::observability::messages::node::LeafQueryFailed;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
//! let msg = LeafQueryFailed {
//!     node: "chart.totals",
//!     error: &error,
//! };
//!
//! tracing::error!("{}", msg);
//! ```

pub mod messages;
