// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context, Result};
use dashboard_runner::backends::FixtureQueryExecutor;
use dashboard_runner::config::{load_and_validate_config, unqualified_input_name, Workspace};
use dashboard_runner::engine::{ChannelSink, DashboardExecutor, ExecutionEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SESSION_ID: &str = "cli";

fn usage(program: &str) -> String {
    format!(
        "Usage: {} <workspace.yaml> <dashboard> [name=value ...]\n\
         Example: {} configs/sales-dashboard.yaml dashboard.sales region=eu",
        program, program
    )
}

/// Parse `name=value` pairs; values are JSON when they parse, strings otherwise.
fn parse_inputs(pairs: &[String]) -> Result<HashMap<String, Value>> {
    let mut inputs = HashMap::new();
    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            bail!("input '{}' is not of the form name=value", pair);
        };
        let name = match unqualified_input_name(name) {
            Some(_) => name.to_string(),
            None => format!("input.{}", name),
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(name, value);
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", usage(&args[0]));
        std::process::exit(2);
    }

    let config = load_and_validate_config(&args[1])
        .with_context(|| format!("failed to load workspace '{}'", args[1]))?;
    let inputs = parse_inputs(&args[3..])?;

    let workspace = Arc::new(Workspace::new(config.resources));
    let queries = Arc::new(FixtureQueryExecutor::new(&config.fixtures));
    let (sink, mut events) = ChannelSink::new();
    let executor = DashboardExecutor::new(workspace, queries, Arc::new(sink))
        .with_options(config.options);

    let tree = executor
        .execute_dashboard(SESSION_ID, &args[2], inputs)
        .await
        .with_context(|| format!("failed to execute '{}'", args[2]))?;

    let mut failed = false;
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.header().execution_id != tree.execution_id() {
            continue;
        }
        match event {
            ExecutionEvent::ExecutionComplete { .. } => break,
            ExecutionEvent::ExecutionError { .. } => {
                failed = true;
                break;
            }
            _ => {}
        }
    }

    if failed {
        let reason = tree
            .root()
            .error()
            .map(|error| error.to_string())
            .unwrap_or_default();
        bail!("dashboard '{}' failed: {}", tree.dashboard(), reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inputs_parse_as_json_or_strings() {
        let inputs = parse_inputs(&[
            "region=eu".to_string(),
            "input.year=2024".to_string(),
            "dashboard.sales.input.flags=[1,2]".to_string(),
        ])
        .unwrap();

        assert_eq!(inputs["input.region"], json!("eu"));
        assert_eq!(inputs["input.year"], json!(2024));
        assert_eq!(inputs["dashboard.sales.input.flags"], json!([1, 2]));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(parse_inputs(&["region".to_string()]).is_err());
    }
}
