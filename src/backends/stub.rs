// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-memory collaborators for tests and demos.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::engine::{EventKind, ExecutionEvent};
use crate::errors::QueryError;
use crate::traits::{EventSink, QueryExecutor, QueryRequest, QueryResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
enum Behaviour {
    Rows(QueryResult),
    Fail(QueryError),
    Panic(String),
}

#[derive(Clone)]
struct StubResponse {
    behaviour: Behaviour,
    delay: Duration,
}

impl Default for StubResponse {
    fn default() -> Self {
        Self {
            behaviour: Behaviour::Rows(QueryResult::default()),
            delay: Duration::ZERO,
        }
    }
}

/// Query executor answering from canned responses keyed by SQL text.
///
/// SQL without a canned response returns an empty result. Every request is
/// recorded so tests can assert on invocation counts and bound arguments.
#[derive(Default)]
pub struct StubQueryExecutor {
    responses: Mutex<HashMap<String, StubResponse>>,
    requests: Mutex<Vec<QueryRequest>>,
    invocations: AtomicUsize,
}

impl StubQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(self, sql: &str, apply: impl FnOnce(&mut StubResponse)) -> Self {
        apply(lock(&self.responses).entry(sql.to_string()).or_default());
        self
    }

    pub fn with_result(self, sql: &str, result: QueryResult) -> Self {
        self.update(sql, |response| response.behaviour = Behaviour::Rows(result))
    }

    /// Canned rows given as JSON objects; non-objects are skipped.
    pub fn with_rows(self, sql: &str, rows: Vec<Value>) -> Self {
        let rows: Vec<Map<String, Value>> = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.with_result(sql, QueryResult::from_rows(rows))
    }

    pub fn with_failure(self, sql: &str, message: &str) -> Self {
        let error = QueryError::Execution(message.to_string());
        self.update(sql, |response| response.behaviour = Behaviour::Fail(error))
    }

    pub fn with_panic(self, sql: &str, message: &str) -> Self {
        let message = message.to_string();
        self.update(sql, |response| response.behaviour = Behaviour::Panic(message))
    }

    pub fn with_delay(self, sql: &str, delay: Duration) -> Self {
        self.update(sql, |response| response.delay = delay)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_for(&self, sql: &str) -> Vec<QueryRequest> {
        lock(&self.requests)
            .iter()
            .filter(|request| request.sql == sql)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for StubQueryExecutor {
    async fn execute(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let response = lock(&self.responses)
            .get(&request.sql)
            .cloned()
            .unwrap_or_default();
        lock(&self.requests).push(request);

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        match response.behaviour {
            Behaviour::Rows(result) => Ok(result),
            Behaviour::Fail(error) => Err(error),
            Behaviour::Panic(message) => panic!("{}", message),
        }
    }
}

/// Event sink that keeps every event it receives, in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        lock(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.events).iter().map(ExecutionEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    /// Events about `node`, in publication order.
    pub fn for_node(&self, node: &str) -> Vec<ExecutionEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| event.node_name() == Some(node))
            .cloned()
            .collect()
    }

    pub fn for_execution(&self, execution_id: &str) -> Vec<ExecutionEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| event.header().execution_id == execution_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ExecutionEvent) {
        lock(&self.events).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::QueryArg;
    use serde_json::json;

    fn request(sql: &str) -> QueryRequest {
        QueryRequest {
            sql: sql.to_string(),
            args: vec![],
        }
    }

    #[tokio::test]
    async fn canned_rows_failures_and_defaults() {
        let stub = StubQueryExecutor::new()
            .with_rows("select a", vec![json!({"a": 1}), json!("not a row")])
            .with_failure("select b", "boom");

        let rows = stub.execute(request("select a")).await.unwrap();
        assert_eq!(rows.row_count(), 1);

        let error = stub.execute(request("select b")).await.unwrap_err();
        assert_eq!(error.to_string(), "boom");

        let empty = stub.execute(request("select c")).await.unwrap();
        assert_eq!(empty.row_count(), 0);
        assert_eq!(stub.invocations(), 3);
    }

    #[tokio::test]
    async fn requests_keep_their_arguments() {
        let stub = StubQueryExecutor::new();
        stub.execute(QueryRequest {
            sql: "select $1".into(),
            args: vec![QueryArg {
                name: "region".into(),
                value: json!("eu"),
            }],
        })
        .await
        .unwrap();

        let recorded = stub.requests_for("select $1");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].args[0].value, json!("eu"));
    }

    #[tokio::test]
    async fn delay_is_applied() {
        let stub = StubQueryExecutor::new().with_delay("select slow", Duration::from_millis(30));
        let started = std::time::Instant::now();
        stub.execute(request("select slow")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
