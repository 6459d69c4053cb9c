// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::config::workspace::ResourceDefinition;
use crate::errors::{ConfigError, ValidationError};
use crate::observability::messages::{validation::*, StructuredLog};

/// Top-level workspace file.
///
/// Declares the static resource graph, executor options and (for demos and
/// tests) canned query results.
///
/// # Fields
/// * `options` - Executor options (optional)
/// * `resources` - Every dashboard, container, benchmark and leaf definition
/// * `fixtures` - SQL to rows mapping used by the fixture query backend (optional)
///
/// # Example
/// ```yaml
/// options:
///   rerun_on_input_change: true
/// resources:
///   - name: dashboard.sales
///     kind: dashboard
///     children:
///       - kind: chart
///         sql: select region, total from sales
/// fixtures:
///   - sql: select region, total from sales
///     rows:
///       - { region: eu, total: 3 }
/// ```
#[derive(Debug, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub options: ExecutorOptions,
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default)]
    pub fixtures: Vec<FixtureConfig>,
}

impl WorkspaceConfig {
    fn assign_anonymous_names(&mut self) {
        for resource in &mut self.resources {
            resource.assign_anonymous_names();
        }
    }
}

/// Executor-specific configuration options.
///
/// # Fields
/// * `rerun_on_input_change` - Re-execute a running dashboard when a client
///   changes an input value that a leaf has already consumed (default `true`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorOptions {
    pub rerun_on_input_change: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            rerun_on_input_change: true,
        }
    }
}

/// A canned query result.
///
/// When `error` is set the query fails with that message instead.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureConfig {
    pub sql: String,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Load a workspace from a YAML file, or TOML when the extension is `.toml`
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WorkspaceConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let mut cfg: WorkspaceConfig = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    cfg.assign_anonymous_names();
    Ok(cfg)
}

/// Load and validate a workspace file
///
/// Every validation problem is logged and returned together, so a broken
/// workspace can be fixed in one pass.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<WorkspaceConfig, ConfigError> {
    let cfg = load_config(path)?;

    if let Err(validation_errors) = crate::config::validate_workspace(&cfg.resources) {
        for error in &validation_errors {
            log_validation_error(error);
        }
        return Err(ConfigError::Invalid(validation_errors));
    }

    Ok(cfg)
}

fn log_validation_error(error: &ValidationError) {
    match error {
        ValidationError::DuplicateResource { name } => {
            DuplicateResourceDetected { name }.log();
        }
        ValidationError::UnresolvedChild { parent, child } => {
            UnresolvedChildReference { parent, child }.log();
        }
        ValidationError::UnresolvedInput { resource, input } => {
            UnresolvedInputReference { resource, input }.log();
        }
        ValidationError::CyclicReference { cycle } => {
            let cycle: Vec<&str> = cycle.iter().map(String::as_str).collect();
            CyclicReferenceDetected { cycle: &cycle }.log();
        }
        ValidationError::ContractViolation {
            resource,
            kind,
            reason,
        } => {
            ContractViolationDetected {
                resource,
                kind: kind.as_str(),
                reason,
            }
            .log();
        }
    }
}
