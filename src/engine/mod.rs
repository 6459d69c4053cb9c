// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Dashboard execution engine.
//!
//! A [`DashboardExecutor`] owns one [`ExecutionTree`] per session. A tree is a
//! sealed hierarchy of [`RunNode`]s built from the static resources of one
//! dashboard; running it fans out one task per node, fans completions back in
//! through each parent's completion queue, and reports every terminal
//! transition to an [`EventSink`](crate::traits::EventSink).

mod check;
mod container;
mod context;
pub mod events;
mod executor;
mod inputs;
mod leaf;
mod run_node;
pub mod snapshot;
mod tree;


pub use check::{CheckRun, CheckSummary, ControlGroup, ControlRun, ControlRunTree, ControlStatus};
pub use container::ContainerRun;
pub use events::{ChannelSink, EventHeader, EventKind, ExecutionEvent, NoopSink};
pub use executor::DashboardExecutor;
pub use leaf::LeafRun;
pub use run_node::{RunNode, RunStatus};
pub use snapshot::{DashboardSnapshot, NodeSnapshot, TreeNode};
pub use tree::ExecutionTree;
