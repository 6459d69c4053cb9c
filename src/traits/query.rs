// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::QueryError;

/// A named argument bound from a runtime dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryArg {
    pub name: String,
    pub value: Value,
}

/// SQL text plus its arguments, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    pub args: Vec<QueryArg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

/// Tabular query output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    /// Build a result from rows, inferring columns from the first row.
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        let columns = rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|(name, value)| ColumnSchema {
                        name: name.clone(),
                        data_type: json_type_name(value).to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "bigint",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "jsonb",
    }
}

/// Runs SQL against the data backend.
///
/// Invoked by leaf and control nodes from their own task; implementations
/// may take as long as they need, the engine races them against cancellation.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, request: QueryRequest) -> Result<QueryResult, QueryError>;
}
