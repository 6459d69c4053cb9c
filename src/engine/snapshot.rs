// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Serializable views of an execution tree.
//!
//! [`TreeNode`] is the layout (shape only, no live status) and [`NodeSnapshot`]
//! is the state of one node at the time it was taken. Both are what clients
//! joining mid-execution receive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::ResourceKind;
use crate::engine::check::CheckSummary;
use crate::engine::run_node::RunStatus;
use crate::traits::{QueryArg, QueryResult};

/// Layout projection of a run node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub node_type: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Depth-first list of every name in this layout, self first.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        for child in &self.children {
            names.extend(child.names());
        }
        names
    }
}

/// Live state of one run node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub node_type: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<QueryArg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CheckSummary>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// Everything a client needs to render a session's dashboard from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub session_id: String,
    pub execution_id: String,
    pub dashboard: String,
    pub status: RunStatus,
    pub layout: TreeNode,
    pub panels: BTreeMap<String, NodeSnapshot>,
    pub inputs: BTreeMap<String, Value>,
}
