// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors surfaced by query backends.

use thiserror::Error;

/// Failure reported by a [`QueryExecutor`](crate::traits::QueryExecutor).
///
/// The engine never inspects the variant; a leaf stores the rendered message
/// as its node error, so the text a backend produces is what clients see.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The backend ran the statement and it failed.
    #[error("{0}")]
    Execution(String),

    /// The backend could not be reached.
    #[error("query backend unavailable: {0}")]
    Unavailable(String),

    /// A required argument was missing or had the wrong shape.
    #[error("invalid query argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
}
