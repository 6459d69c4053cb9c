// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::engine::context::ExecutionContext;
use crate::engine::run_node::{NodeCore, RunNode};
use crate::errors::NodeError;
use crate::observability::messages::node::{
    InputResolved, LeafBlockedOnInput, LeafQueryCompleted, LeafQueryFailed, LeafQueryStarted,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{QueryArg, QueryRequest, QueryResult};

#[derive(Default)]
struct LeafData {
    args: Vec<QueryArg>,
    result: Option<QueryResult>,
}

/// A node that runs at most one query: charts, cards, tables, inputs and friends.
pub struct LeafRun {
    core: NodeCore,
    data: Mutex<LeafData>,
}

impl LeafRun {
    pub(crate) fn new(core: NodeCore) -> Self {
        Self {
            core,
            data: Mutex::new(LeafData::default()),
        }
    }

    pub(crate) fn core(&self) -> &NodeCore {
        &self.core
    }

    fn lock(&self) -> MutexGuard<'_, LeafData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runtime dependency values bound for the query, in declared order.
    pub fn args(&self) -> Vec<QueryArg> {
        self.lock().args.clone()
    }

    pub fn data(&self) -> Option<QueryResult> {
        self.lock().result.clone()
    }

    pub(crate) async fn execute(&self, node: &Arc<RunNode>, ctx: Arc<ExecutionContext>) {
        let args = match self.resolve_runtime_dependencies(node, &ctx).await {
            Ok(args) => args,
            Err(error) => {
                node.set_error(&ctx, error);
                return;
            }
        };
        self.lock().args = args.clone();

        let Some(sql) = self.core.resource().executable_sql() else {
            node.set_complete(&ctx);
            return;
        };

        LeafQueryStarted {
            node: self.core.name(),
            arg_count: args.len(),
        }
        .log();
        node.publish_progress(&ctx);

        let request = QueryRequest {
            sql: sql.to_string(),
            args,
        };
        let started = Instant::now();
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => Err(NodeError::Cancelled {
                node: self.core.name().to_string(),
            }),
            result = ctx.queries.execute(request) => result.map_err(|e| {
                LeafQueryFailed {
                    node: self.core.name(),
                    error: &e,
                }
                .log();
                NodeError::Query {
                    node: self.core.name().to_string(),
                    message: e.to_string(),
                }
            }),
        };

        match outcome {
            Ok(result) => {
                LeafQueryCompleted {
                    node: self.core.name(),
                    row_count: result.row_count(),
                    duration: started.elapsed(),
                }
                .log();
                self.lock().result = Some(result);
                node.set_complete(&ctx);
            }
            Err(error) => node.set_error(&ctx, error),
        }
    }

    /// Bind every declared runtime dependency, waiting for inputs not yet set.
    async fn resolve_runtime_dependencies(
        &self,
        node: &RunNode,
        ctx: &ExecutionContext,
    ) -> Result<Vec<QueryArg>, NodeError> {
        let dependencies = &self.core.resource().args;
        let mut args = Vec::with_capacity(dependencies.len());

        for dependency in dependencies {
            let key = dependency.input_key();
            let (value, waited) = match ctx.inputs.get(&key) {
                Some(value) => (value, false),
                None => {
                    if self.core.set_blocked() {
                        LeafBlockedOnInput {
                            node: self.core.name(),
                            input: &key,
                        }
                        .log();
                        node.publish_progress(ctx);
                    }
                    let value = ctx
                        .inputs
                        .wait_for(&key, &ctx.cancel)
                        .await
                        .ok_or_else(|| NodeError::Cancelled {
                            node: self.core.name().to_string(),
                        })?;
                    (value, true)
                }
            };

            InputResolved {
                node: self.core.name(),
                input: &key,
                property: &dependency.property,
                waited,
            }
            .log();
            args.push(QueryArg {
                name: dependency.property.clone(),
                value,
            });
        }

        self.core.set_unblocked();
        Ok(args)
    }
}
