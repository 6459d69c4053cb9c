// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use thiserror::Error;

use crate::config::ResourceKind;

/// Errors that can occur during workspace validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two resources share the same fully-qualified name
    DuplicateResource {
        /// The duplicated name
        name: String,
    },
    /// A resource lists a child that is not defined anywhere in the workspace
    UnresolvedChild {
        /// The resource declaring the child
        parent: String,
        /// The child reference that could not be resolved
        child: String,
    },
    /// A runtime dependency points at something that is not an input resource
    UnresolvedInput {
        /// The resource declaring the dependency
        resource: String,
        /// The input reference that could not be resolved
        input: String,
    },
    /// Child references loop back onto themselves
    CyclicReference {
        /// The cycle path showing the circular reference
        cycle: Vec<String>,
    },
    /// A resource does not satisfy the structural rules of its kind
    ContractViolation {
        /// The offending resource
        resource: String,
        /// Its declared kind
        kind: ResourceKind,
        /// What is wrong with it
        reason: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateResource { name } => {
                write!(f, "Duplicate resource name: '{}'", name)
            }
            ValidationError::UnresolvedChild { parent, child } => {
                write!(
                    f,
                    "Resource '{}' references child '{}' which does not exist",
                    parent, child
                )
            }
            ValidationError::UnresolvedInput { resource, input } => {
                write!(
                    f,
                    "Resource '{}' depends on input '{}' which is not an input resource",
                    resource, input
                )
            }
            ValidationError::CyclicReference { cycle } => {
                write!(f, "Cyclic reference detected: {}", cycle.join(" -> "))
            }
            ValidationError::ContractViolation {
                resource,
                kind,
                reason,
            } => {
                write!(f, "Resource '{}' ({}) {}", resource, kind, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading a workspace file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read workspace file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML workspace: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML workspace: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Workspace validation failed:\n{}", render_validation_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn render_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
