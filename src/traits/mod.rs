// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod query;
pub mod sink;

pub use query::{ColumnSchema, QueryArg, QueryExecutor, QueryRequest, QueryResult};
pub use sink::EventSink;
