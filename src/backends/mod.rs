// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Query backends and event sinks that ship with the crate.
//!
//! Real deployments plug their own [`QueryExecutor`](crate::traits::QueryExecutor)
//! (a database client) and [`EventSink`](crate::traits::EventSink) (a socket
//! writer) into the [`DashboardExecutor`](crate::engine::DashboardExecutor).
//! The backends here cover the rest:
//!
//! ## Fixture Backend
//! Answers queries from the `fixtures` section of a workspace file. Used by the
//! `dashboard-runner` binary to run dashboards without a database.
//!
//! ## Stub Backend
//! Programmable collaborators for tests:
//! - **StubQueryExecutor**: canned rows, failures, panics and latency per SQL text
//! - **RecordingSink**: keeps every published event for later assertions
//!
//! # Example
//! ```rust
//! use dashboard_runner::backends::stub::{RecordingSink, StubQueryExecutor};
//! use serde_json::json;
//!
//! let queries = StubQueryExecutor::new()
//!     .with_rows("select region, total from sales", vec![json!({"region": "eu", "total": 3})])
//!     .with_failure("select * from missing", "relation \"missing\" does not exist");
//! let sink = RecordingSink::new();
//! assert!(sink.events().is_empty());
//! assert_eq!(queries.invocations(), 0);
//! ```

pub mod fixture;
pub mod stub;

pub use fixture::FixtureQueryExecutor;
