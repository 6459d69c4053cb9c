// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for workspace validation errors.
//!
//! This module contains message types for logging events related to:
//! * Duplicate resource names
//! * Unresolved child and input references
//! * Cyclic child references
//! * Node-type contract violations

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Cyclic child reference detected in the workspace.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use dashboard_runner::observability::messages::validation::CyclicReferenceDetected;
///
/// let cycle = vec!["container.a", "container.b", "container.a"];
/// let msg = CyclicReferenceDetected {
///     cycle: &cycle,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct CyclicReferenceDetected<'a> {
    pub cycle: &'a [&'a str],
}

impl Display for CyclicReferenceDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cyclic reference detected: {}", self.cycle.join(" -> "))
    }
}

impl StructuredLog for CyclicReferenceDetected<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
        )
    }
}

/// A resource lists a child that does not exist.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct UnresolvedChildReference<'a> {
    pub parent: &'a str,
    pub child: &'a str,
}

impl Display for UnresolvedChildReference<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resource '{}' references unknown child '{}'",
            self.parent, self.child
        )
    }
}

impl StructuredLog for UnresolvedChildReference<'_> {
    fn log(&self) {
        tracing::error!(parent = self.parent, child = self.child, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            parent = self.parent,
            child = self.child,
        )
    }
}

/// A runtime dependency names something that is not an input resource.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct UnresolvedInputReference<'a> {
    pub resource: &'a str,
    pub input: &'a str,
}

impl Display for UnresolvedInputReference<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resource '{}' depends on unknown input '{}'",
            self.resource, self.input
        )
    }
}

impl StructuredLog for UnresolvedInputReference<'_> {
    fn log(&self) {
        tracing::error!(resource = self.resource, input = self.input, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            resource = self.resource,
            input = self.input,
        )
    }
}

/// Two resources share one name.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct DuplicateResourceDetected<'a> {
    pub name: &'a str,
}

impl Display for DuplicateResourceDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Duplicate resource name: '{}'", self.name)
    }
}

impl StructuredLog for DuplicateResourceDetected<'_> {
    fn log(&self) {
        tracing::error!(resource = self.name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            resource = self.name,
        )
    }
}

/// A resource does not satisfy the contract of its kind.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ContractViolationDetected<'a> {
    pub resource: &'a str,
    pub kind: &'a str,
    pub reason: &'a str,
}

impl Display for ContractViolationDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resource '{}' ({}) {}",
            self.resource, self.kind, self.reason
        )
    }
}

impl StructuredLog for ContractViolationDetected<'_> {
    fn log(&self) {
        tracing::error!(
            resource = self.resource,
            kind = self.kind,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            resource = self.resource,
            kind = self.kind,
        )
    }
}
