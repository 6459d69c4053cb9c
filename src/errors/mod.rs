// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod execution;
mod query;

pub use config::{ConfigError, ValidationError};
pub use execution::{BuildError, EngineError, NodeError};
pub use query::QueryError;
