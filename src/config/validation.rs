// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Workspace validation for structural integrity.
//!
//! Validation runs over every resource (top-level and inline) and accumulates
//! errors so a workspace can be fixed in one pass:
//!
//! 1. **Uniqueness**: every fully-qualified name is defined once
//! 2. **References**: every named child exists, every runtime dependency
//!    points at an `input` resource
//! 3. **Kind contracts**: leaves have no children, benchmarks only hold
//!    benchmarks and controls, controls carry SQL, only leaves bind inputs
//! 4. **Cycles**: child references form a forest (DFS with recursion stack)
//!
//! Cycle detection is skipped when reference validation failed, since it
//! needs every edge to resolve.

use std::collections::{HashMap, HashSet};

use crate::config::workspace::{
    unqualified_input_name, ChildReference, ResourceDefinition, ResourceKind,
};
use crate::errors::ValidationError;

/// Validates every resource in a workspace.
///
/// # Returns
///
/// * `Ok(())` - The workspace can be turned into execution trees
/// * `Err(Vec<ValidationError>)` - Every problem found
pub fn validate_workspace(resources: &[ResourceDefinition]) -> Result<(), Vec<ValidationError>> {
    let mut all: Vec<&ResourceDefinition> = Vec::new();
    for resource in resources {
        resource.walk(&mut |definition| all.push(definition));
    }

    let mut errors = Vec::new();
    errors.extend(validate_unique_names(&all));

    let reference_errors = validate_references(&all);
    let references_ok = reference_errors.is_empty();
    errors.extend(reference_errors);

    errors.extend(validate_kind_contracts(&all));

    if references_ok && errors.is_empty() {
        errors.extend(validate_acyclic(&all));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_unique_names(all: &[&ResourceDefinition]) -> Vec<ValidationError> {
    let mut seen_names = HashSet::new();
    let mut errors = Vec::new();

    for &resource in all {
        if !seen_names.insert(resource.name.as_str()) {
            errors.push(ValidationError::DuplicateResource {
                name: resource.name.clone(),
            });
        }
    }
    errors
}

fn validate_references(all: &[&ResourceDefinition]) -> Vec<ValidationError> {
    let by_name: HashMap<&str, &ResourceDefinition> =
        all.iter().map(|r| (r.name.as_str(), *r)).collect();
    let input_keys: HashSet<&str> = all
        .iter()
        .filter(|r| r.kind == ResourceKind::Input)
        .filter_map(|r| unqualified_input_name(&r.name))
        .collect();

    let mut errors = Vec::new();
    for resource in all {
        for child in &resource.children {
            if let ChildReference::Named(name) = child {
                if !by_name.contains_key(name.as_str()) {
                    errors.push(ValidationError::UnresolvedChild {
                        parent: resource.name.clone(),
                        child: name.clone(),
                    });
                }
            }
        }

        for dependency in &resource.args {
            let resolves = match by_name.get(dependency.input.as_str()) {
                Some(target) => target.kind == ResourceKind::Input,
                None => input_keys.contains(dependency.input_key().as_str()),
            };
            if !resolves {
                errors.push(ValidationError::UnresolvedInput {
                    resource: resource.name.clone(),
                    input: dependency.input.clone(),
                });
            }
        }
    }
    errors
}

fn validate_kind_contracts(all: &[&ResourceDefinition]) -> Vec<ValidationError> {
    let by_name: HashMap<&str, &ResourceDefinition> =
        all.iter().map(|r| (r.name.as_str(), *r)).collect();
    let mut errors = Vec::new();
    let mut violation = |resource: &ResourceDefinition, reason: String| {
        errors.push(ValidationError::ContractViolation {
            resource: resource.name.clone(),
            kind: resource.kind,
            reason,
        })
    };

    for resource in all {
        if !resource.kind.is_leaf() && !resource.args.is_empty() {
            violation(resource, "cannot declare runtime dependencies".to_string());
        }
        match resource.kind {
            ResourceKind::Control => {
                if resource.executable_sql().is_none() {
                    violation(resource, "must declare sql".to_string());
                }
                if !resource.children.is_empty() {
                    violation(resource, "cannot have children".to_string());
                }
            }
            ResourceKind::Benchmark => {
                for child in &resource.children {
                    let kind = match child {
                        ChildReference::Named(name) => by_name.get(name.as_str()).map(|r| r.kind),
                        ChildReference::Inline(definition) => Some(definition.kind),
                    };
                    if let Some(kind) = kind {
                        if !matches!(kind, ResourceKind::Benchmark | ResourceKind::Control) {
                            violation(
                                resource,
                                format!("cannot contain {} '{}'", kind, child.name()),
                            );
                        }
                    }
                }
            }
            ResourceKind::Input => {
                if !resource.children.is_empty() {
                    violation(resource, "cannot have children".to_string());
                }
                if unqualified_input_name(&resource.name).is_none() {
                    violation(resource, "must be named 'input.<name>'".to_string());
                }
                let own_key = unqualified_input_name(&resource.name);
                if resource
                    .args
                    .iter()
                    .any(|dep| Some(dep.input_key().as_str()) == own_key)
                {
                    violation(resource, "cannot depend on its own value".to_string());
                }
            }
            kind if kind.is_leaf() => {
                if !resource.children.is_empty() {
                    violation(resource, "cannot have children".to_string());
                }
            }
            _ => {}
        }
    }
    errors
}

/// DFS over child edges; grey nodes (on the recursion stack) close a cycle.
fn validate_acyclic(all: &[&ResourceDefinition]) -> Vec<ValidationError> {
    let graph: HashMap<&str, Vec<&str>> = all
        .iter()
        .map(|r| {
            (
                r.name.as_str(),
                r.children.iter().map(ChildReference::name).collect(),
            )
        })
        .collect();

    let mut names: Vec<&str> = graph.keys().copied().collect();
    names.sort_unstable();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for name in names {
        if !visited.contains(name) {
            if let Some(cycle) =
                dfs_cycle_detection(name, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return vec![ValidationError::CyclicReference { cycle }];
            }
        }
    }
    Vec::new()
}

fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(children) = graph.get(node) {
        for &child in children {
            if rec_stack.contains(child) {
                let start = path.iter().position(|&n| n == child).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(child.to_string());
                return Some(cycle);
            }
            if !visited.contains(child) {
                if let Some(cycle) = dfs_cycle_detection(child, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard(name: &str) -> ResourceDefinition {
        ResourceDefinition::new(name, ResourceKind::Dashboard)
    }

    #[test]
    fn valid_workspace_passes() {
        let resources = vec![
            dashboard("dashboard.sales")
                .with_child("input.region")
                .with_child("chart.totals")
                .with_inline_child(
                    ResourceDefinition::new("benchmark.cis", ResourceKind::Benchmark)
                        .with_child("control.mfa"),
                ),
            ResourceDefinition::new("input.region", ResourceKind::Input),
            ResourceDefinition::new("chart.totals", ResourceKind::Chart)
                .with_sql("select 1")
                .with_arg("input.region", "region"),
            ResourceDefinition::new("control.mfa", ResourceKind::Control)
                .with_sql("select 'ok' as status"),
        ];
        assert_eq!(validate_workspace(&resources), Ok(()));
    }

    #[test]
    fn duplicates_are_reported() {
        let resources = vec![
            ResourceDefinition::new("text.a", ResourceKind::Text),
            ResourceDefinition::new("text.a", ResourceKind::Text),
        ];
        let errors = validate_workspace(&resources).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateResource { name: "text.a".into() }]
        );
    }

    #[test]
    fn unresolved_references_are_accumulated() {
        let resources = vec![
            dashboard("dashboard.sales").with_child("chart.missing"),
            ResourceDefinition::new("chart.totals", ResourceKind::Chart)
                .with_sql("select 1")
                .with_arg("input.missing", "region"),
            ResourceDefinition::new("text.not_an_input", ResourceKind::Text),
            ResourceDefinition::new("table.other", ResourceKind::Table)
                .with_sql("select 2")
                .with_arg("text.not_an_input", "x"),
        ];
        let errors = validate_workspace(&resources).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::UnresolvedChild {
            parent: "dashboard.sales".into(),
            child: "chart.missing".into(),
        }));
        assert!(errors.contains(&ValidationError::UnresolvedInput {
            resource: "chart.totals".into(),
            input: "input.missing".into(),
        }));
        assert!(errors.contains(&ValidationError::UnresolvedInput {
            resource: "table.other".into(),
            input: "text.not_an_input".into(),
        }));
    }

    #[test]
    fn qualified_input_references_resolve_by_short_name() {
        let resources = vec![
            dashboard("dashboard.sales").with_child("dashboard.sales.input.region"),
            ResourceDefinition::new("dashboard.sales.input.region", ResourceKind::Input),
            ResourceDefinition::new("chart.totals", ResourceKind::Chart)
                .with_sql("select 1")
                .with_arg("input.region", "region"),
        ];
        assert_eq!(validate_workspace(&resources), Ok(()));
    }

    #[test]
    fn kind_contracts() {
        struct TestCase {
            name: &'static str,
            resource: ResourceDefinition,
            extra: Vec<ResourceDefinition>,
            reason_fragment: &'static str,
        }

        let test_cases = vec![
            TestCase {
                name: "leaf with children",
                resource: ResourceDefinition::new("chart.a", ResourceKind::Chart)
                    .with_child("text.b"),
                extra: vec![ResourceDefinition::new("text.b", ResourceKind::Text)],
                reason_fragment: "cannot have children",
            },
            TestCase {
                name: "control without sql",
                resource: ResourceDefinition::new("control.a", ResourceKind::Control),
                extra: vec![],
                reason_fragment: "must declare sql",
            },
            TestCase {
                name: "benchmark holding a chart",
                resource: ResourceDefinition::new("benchmark.a", ResourceKind::Benchmark)
                    .with_child("chart.b"),
                extra: vec![ResourceDefinition::new("chart.b", ResourceKind::Chart)],
                reason_fragment: "cannot contain chart 'chart.b'",
            },
            TestCase {
                name: "badly named input",
                resource: ResourceDefinition::new("region", ResourceKind::Input),
                extra: vec![],
                reason_fragment: "must be named 'input.<name>'",
            },
            TestCase {
                name: "control with runtime dependencies",
                resource: ResourceDefinition::new("control.a", ResourceKind::Control)
                    .with_sql("select $1")
                    .with_arg("input.region", "region"),
                extra: vec![ResourceDefinition::new("input.region", ResourceKind::Input)],
                reason_fragment: "cannot declare runtime dependencies",
            },
            TestCase {
                name: "container with runtime dependencies",
                resource: ResourceDefinition::new("container.a", ResourceKind::Container)
                    .with_arg("input.region", "region"),
                extra: vec![ResourceDefinition::new("input.region", ResourceKind::Input)],
                reason_fragment: "cannot declare runtime dependencies",
            },
            TestCase {
                name: "input depending on itself",
                resource: ResourceDefinition::new("input.region", ResourceKind::Input)
                    .with_sql("select 1")
                    .with_arg("input.region", "x"),
                extra: vec![],
                reason_fragment: "cannot depend on its own value",
            },
        ];

        for tc in test_cases {
            let mut resources = vec![tc.resource];
            resources.extend(tc.extra);
            let errors = validate_workspace(&resources).unwrap_err();
            assert!(
                errors.iter().any(|e| matches!(
                    e,
                    ValidationError::ContractViolation { reason, .. } if reason.contains(tc.reason_fragment)
                )),
                "case '{}' produced {:?}",
                tc.name,
                errors
            );
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let resources = vec![
            ResourceDefinition::new("container.a", ResourceKind::Container).with_child("container.a"),
        ];
        let errors = validate_workspace(&resources).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicReference {
                cycle: vec!["container.a".into(), "container.a".into()]
            }]
        );
    }

    #[test]
    fn indirect_cycle_reports_path() {
        let resources = vec![
            ResourceDefinition::new("container.a", ResourceKind::Container).with_child("container.b"),
            ResourceDefinition::new("container.b", ResourceKind::Container).with_child("container.c"),
            ResourceDefinition::new("container.c", ResourceKind::Container).with_child("container.a"),
        ];
        let errors = validate_workspace(&resources).unwrap_err();
        match &errors[0] {
            ValidationError::CyclicReference { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let resources = vec![
            dashboard("dashboard.sales")
                .with_child("container.left")
                .with_child("container.right"),
            ResourceDefinition::new("container.left", ResourceKind::Container).with_child("text.shared"),
            ResourceDefinition::new("container.right", ResourceKind::Container).with_child("text.shared"),
            ResourceDefinition::new("text.shared", ResourceKind::Text),
        ];
        assert_eq!(validate_workspace(&resources), Ok(()));
    }
}
