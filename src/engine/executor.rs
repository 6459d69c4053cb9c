// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{unqualified_input_name, ExecutorOptions, Workspace};
use crate::engine::snapshot::DashboardSnapshot;
use crate::engine::tree::ExecutionTree;
use crate::errors::EngineError;
use crate::observability::messages::engine::{
    DashboardRerunTriggered, SessionCleared, SessionTreeReplaced,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{EventSink, QueryExecutor};

/// Session registry: at most one live execution tree per client session.
///
/// Every operation runs under one registry-wide lock, so replacing a
/// session's tree is atomic with respect to other calls for that session.
/// Execution itself happens on detached tasks; callers observe progress
/// through the [`EventSink`].
pub struct DashboardExecutor {
    workspace: Arc<Workspace>,
    queries: Arc<dyn QueryExecutor>,
    sink: Arc<dyn EventSink>,
    options: ExecutorOptions,
    sessions: Mutex<HashMap<String, Arc<ExecutionTree>>>,
}

impl DashboardExecutor {
    pub fn new(
        workspace: Arc<Workspace>,
        queries: Arc<dyn QueryExecutor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            workspace,
            queries,
            sink,
            options: ExecutorOptions::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Replace the session's tree with a fresh execution of `dashboard`.
    ///
    /// Returns once the tree is built and started; a construction error
    /// leaves no tree resident for the session.
    pub async fn execute_dashboard(
        &self,
        session_id: &str,
        dashboard: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<Arc<ExecutionTree>, EngineError> {
        let mut sessions = self.sessions.lock().await;
        self.replace_tree(&mut sessions, session_id, dashboard, inputs)
    }

    fn replace_tree(
        &self,
        sessions: &mut HashMap<String, Arc<ExecutionTree>>,
        session_id: &str,
        dashboard: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<Arc<ExecutionTree>, EngineError> {
        if let Some(previous) = sessions.remove(session_id) {
            SessionTreeReplaced {
                session_id,
                previous_execution_id: previous.execution_id(),
                dashboard,
            }
            .log();
            previous.cancel();
        }

        let tree = Arc::new(ExecutionTree::build(
            &self.workspace,
            dashboard,
            session_id,
            Arc::clone(&self.queries),
            Arc::clone(&self.sink),
        )?);
        if !inputs.is_empty() {
            tree.set_inputs(inputs);
        }
        tree.start();
        sessions.insert(session_id.to_string(), Arc::clone(&tree));
        Ok(tree)
    }

    /// Feed input values to the session's dashboard.
    ///
    /// A finished tree is re-executed with its previous inputs merged with
    /// `inputs`. A running tree normally just receives the values, which
    /// releases any leaf waiting on them; when `rerun_on_input_change` is set
    /// and a value a leaf already used changes, it is re-executed instead.
    pub async fn set_dashboard_inputs(
        &self,
        session_id: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<Arc<ExecutionTree>, EngineError> {
        let mut sessions = self.sessions.lock().await;
        let tree = sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;

        let reason = if tree.is_terminal() {
            Some("previous execution finished")
        } else if self.options.rerun_on_input_change && tree.changes_bound_input(&inputs) {
            Some("an input already in use changed")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                DashboardRerunTriggered {
                    session_id,
                    dashboard: tree.dashboard(),
                    reason,
                }
                .log();
                let mut merged = tree.input_values();
                for (name, value) in inputs {
                    let key = unqualified_input_name(&name).unwrap_or(&name).to_string();
                    merged.insert(key, value);
                }
                let dashboard = tree.dashboard().to_string();
                self.replace_tree(&mut sessions, session_id, &dashboard, merged)
            }
            None => {
                tree.set_inputs(inputs);
                Ok(tree)
            }
        }
    }

    /// Cancel and forget the session's tree. Returns false if there was none.
    pub async fn clear_dashboard(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id);
        match removed {
            Some(tree) => {
                tree.cancel();
                SessionCleared {
                    session_id,
                    execution_id: tree.execution_id(),
                }
                .log();
                true
            }
            None => false,
        }
    }

    pub async fn execution(&self, session_id: &str) -> Option<Arc<ExecutionTree>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Layout and node state for a client joining mid-execution.
    pub async fn snapshot(&self, session_id: &str) -> Result<DashboardSnapshot, EngineError> {
        self.execution(session_id)
            .await
            .map(|tree| tree.snapshot())
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))
    }

    /// Sessions with a resident tree, sorted.
    pub async fn sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        sessions.sort();
        sessions
    }
}
