// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Input values and the subscription table leaves wait on.
//!
//! Waits are level-triggered: registration and the value check happen under
//! the same lock, so a value set between "check" and "register" cannot be
//! missed. The lock is never held while waiting or while waking waiters.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct InputState {
    values: HashMap<String, Value>,
    waiters: HashMap<String, Vec<oneshot::Sender<()>>>,
    /// Inputs whose value has been read by at least one leaf
    bound: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct InputTable {
    state: Mutex<InputState>,
}

impl InputTable {
    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value of `key`, if one has been supplied.
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        let value = state.values.get(key).cloned()?;
        state.bound.insert(key.to_string());
        Some(value)
    }

    /// Wait until `key` has a value, or until `cancel` fires (`None`).
    pub(crate) async fn wait_for(&self, key: &str, cancel: &CancellationToken) -> Option<Value> {
        let notified = {
            let mut state = self.lock();
            if let Some(value) = state.values.get(key).cloned() {
                state.bound.insert(key.to_string());
                return Some(value);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(key.to_string()).or_default().push(tx);
            rx
        };

        tokio::select! {
            _ = cancel.cancelled() => None,
            woken = notified => match woken {
                Ok(()) => self.get(key),
                Err(_) => None,
            },
        }
    }

    /// Store values and wake everything waiting on them.
    ///
    /// Returns the number of waiters released.
    pub(crate) fn set_values(&self, values: HashMap<String, Value>) -> usize {
        let released: Vec<oneshot::Sender<()>> = {
            let mut state = self.lock();
            let mut released = Vec::new();
            for (key, value) in values {
                if let Some(waiters) = state.waiters.remove(&key) {
                    released.extend(waiters);
                }
                state.values.insert(key, value);
            }
            released
        };

        let count = released.len();
        for waiter in released {
            // A waiter whose wait was cancelled has dropped its receiver
            let _ = waiter.send(());
        }
        count
    }

    /// True when any of `values` would replace a different value a leaf already consumed.
    pub(crate) fn changes_bound(&self, values: &HashMap<String, Value>) -> bool {
        let state = self.lock();
        values.iter().any(|(key, value)| {
            state.bound.contains(key)
                && state
                    .values
                    .get(key)
                    .map(|current| current != value)
                    .unwrap_or(false)
        })
    }

    pub(crate) fn values(&self) -> BTreeMap<String, Value> {
        self.lock()
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self, key: &str) -> usize {
        self.lock()
            .waiters
            .get(key)
            .map(|waiters| waiters.iter().filter(|w| !w.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn single(key: &str, value: Value) -> HashMap<String, Value> {
        HashMap::from([(key.to_string(), value)])
    }

    async fn wait_until_registered(table: &InputTable, key: &str, count: usize) {
        for _ in 0..200 {
            if table.waiter_count(key) == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} waiters on {}", count, key);
    }

    #[tokio::test]
    async fn fast_path_is_idempotent() {
        let table = InputTable::default();
        table.set_values(single("input.region", json!("eu")));
        let cancel = CancellationToken::new();

        let first = table.wait_for("input.region", &cancel).await;
        let second = table.wait_for("input.region", &cancel).await;

        assert_eq!(first, Some(json!("eu")));
        assert_eq!(first, second);
        assert_eq!(table.waiter_count("input.region"), 0);
    }

    #[tokio::test]
    async fn broadcast_releases_every_waiter() {
        for waiters in [0usize, 1, 5] {
            let table = Arc::new(InputTable::default());
            let cancel = CancellationToken::new();

            let mut handles = Vec::new();
            for _ in 0..waiters {
                let table = Arc::clone(&table);
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    table.wait_for("input.region", &cancel).await
                }));
            }
            wait_until_registered(&table, "input.region", waiters).await;

            let released = table.set_values(single("input.region", json!("us")));
            assert_eq!(released, waiters);

            for handle in handles {
                assert_eq!(handle.await.unwrap(), Some(json!("us")));
            }
        }
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiters() {
        let table = Arc::new(InputTable::default());
        let cancel = CancellationToken::new();

        let waiter = {
            let table = Arc::clone(&table);
            let cancel = cancel.clone();
            tokio::spawn(async move { table.wait_for("input.region", &cancel).await })
        };
        wait_until_registered(&table, "input.region", 1).await;

        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), None);
        assert_eq!(table.set_values(single("input.region", json!("eu"))), 1);
    }

    #[tokio::test]
    async fn only_consumed_values_count_as_changes() {
        let table = InputTable::default();
        table.set_values(HashMap::from([
            ("input.region".to_string(), json!("eu")),
            ("input.year".to_string(), json!(2024)),
        ]));
        assert!(table.get("input.region").is_some());

        assert!(!table.changes_bound(&single("input.region", json!("eu"))));
        assert!(table.changes_bound(&single("input.region", json!("us"))));
        assert!(!table.changes_bound(&single("input.year", json!(2025))));
        assert!(!table.changes_bound(&single("input.other", json!(1))));
    }
}
