// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::events::ExecutionEvent;

/// Receives lifecycle events produced by execution trees.
///
/// The engine calls `publish` from node tasks and never waits on delivery;
/// implementations decide what to do with events (forward to a socket,
/// record, drop). Must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ExecutionEvent);
}
