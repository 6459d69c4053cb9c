// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::engine::events::{EventHeader, ExecutionEvent};
use crate::engine::inputs::InputTable;
use crate::traits::{EventSink, QueryExecutor};

/// State shared by every node of one execution tree.
///
/// Nodes receive it as `Arc<ExecutionContext>`; it outlives the tree's tasks
/// and is the only thing they share besides the nodes themselves.
pub(crate) struct ExecutionContext {
    pub(crate) session_id: String,
    pub(crate) execution_id: String,
    pub(crate) queries: Arc<dyn QueryExecutor>,
    pub(crate) inputs: InputTable,
    pub(crate) cancel: CancellationToken,
    sink: Arc<dyn EventSink>,
    started: Instant,
    finished: watch::Sender<bool>,
}

impl ExecutionContext {
    pub(crate) fn new(
        session_id: String,
        execution_id: String,
        queries: Arc<dyn QueryExecutor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            session_id,
            execution_id,
            queries,
            inputs: InputTable::default(),
            cancel: CancellationToken::new(),
            sink,
            started: Instant::now(),
            finished,
        }
    }

    pub(crate) fn header(&self) -> EventHeader {
        EventHeader {
            session_id: self.session_id.clone(),
            execution_id: self.execution_id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn publish(&self, event: ExecutionEvent) {
        self.sink.publish(event);
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Mark the tree finished; called once the root's terminal event is out.
    pub(crate) fn finish(&self) {
        self.finished.send_replace(true);
    }

    pub(crate) fn subscribe_finished(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }
}
