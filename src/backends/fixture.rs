// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::FixtureConfig;
use crate::errors::QueryError;
use crate::traits::{QueryExecutor, QueryRequest, QueryResult};

/// Query executor backed by the `fixtures` section of a workspace file.
///
/// SQL is matched after collapsing whitespace, so fixtures may be written on
/// one line while resources use block scalars. Unknown SQL is reported as
/// [`QueryError::Unavailable`].
pub struct FixtureQueryExecutor {
    fixtures: HashMap<String, Result<QueryResult, QueryError>>,
}

impl FixtureQueryExecutor {
    pub fn new(fixtures: &[FixtureConfig]) -> Self {
        let fixtures = fixtures
            .iter()
            .map(|fixture| {
                let outcome = match &fixture.error {
                    Some(message) => Err(QueryError::Execution(message.clone())),
                    None => Ok(QueryResult::from_rows(fixture.rows.clone())),
                };
                (normalise_sql(&fixture.sql), outcome)
            })
            .collect();
        Self { fixtures }
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

fn normalise_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl QueryExecutor for FixtureQueryExecutor {
    async fn execute(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        let key = normalise_sql(&request.sql);
        tracing::trace!(sql = %key, args = request.args.len(), "fixture query");
        self.fixtures
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(QueryError::Unavailable(format!("no fixture for query: {}", key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(sql: &str, rows: Vec<serde_json::Value>, error: Option<&str>) -> FixtureConfig {
        FixtureConfig {
            sql: sql.to_string(),
            rows: rows
                .into_iter()
                .filter_map(|row| row.as_object().cloned())
                .collect(),
            error: error.map(str::to_string),
        }
    }

    fn request(sql: &str) -> QueryRequest {
        QueryRequest {
            sql: sql.to_string(),
            args: vec![],
        }
    }

    #[tokio::test]
    async fn whitespace_is_ignored_when_matching() {
        let executor = FixtureQueryExecutor::new(&[fixture(
            "select region, total from sales",
            vec![json!({"region": "eu", "total": 3})],
            None,
        )]);

        let result = executor
            .execute(request("select region,\n  total\nfrom sales\n"))
            .await
            .unwrap();
        assert_eq!(result.rows[0]["total"], json!(3));
    }

    #[tokio::test]
    async fn error_fixtures_fail() {
        let executor = FixtureQueryExecutor::new(&[fixture(
            "select broken",
            vec![],
            Some("relation \"broken\" does not exist"),
        )]);

        let error = executor.execute(request("select broken")).await.unwrap_err();
        assert_eq!(error.to_string(), "relation \"broken\" does not exist");
        assert_eq!(executor.len(), 1);
    }

    #[tokio::test]
    async fn unknown_sql_is_unavailable() {
        let executor = FixtureQueryExecutor::new(&[]);
        assert!(executor.is_empty());
        let error = executor.execute(request("select 1")).await.unwrap_err();
        assert!(matches!(error, QueryError::Unavailable(_)));
    }
}
