// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Node sync manager
//!
//! Polls the node's JSON-RPC DAG query, estimates the sync rate over a sliding
//! window, computes an ETA and drives the wait / background / skip strategy
//! protocol. Transient RPC failures retry with bounded backoff.

mod estimator;
mod rpc;
mod strategy;

pub use self::{
    estimator::{format_eta, SyncEstimator, SyncPoint, HISTORY_WINDOW_SECS},
    rpc::{BlockDagInfo, NodeRpcClient, NodeRpcConfig, RpcError, DEFAULT_QUERY_METHOD, DEFAULT_RPC_TIMEOUT},
    strategy::{recommend, SyncStrategy},
};

use crate::{
    alerts::AlertEngine,
    backoff::BackoffPolicy,
    config_store::ConfigStore,
    error::{BoundaryError, ErrorKind},
    events::EventBus,
    tasks::{CompletionHook, ProgressChecker, TaskError, TaskKind, TaskProgress, TaskRecord, TaskSpec, TaskSupervisor},
};
use async_trait::async_trait;
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use serde::Serialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;

const LOG_TARGET: &str = "aio::sync";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FALLBACK_ENDPOINT: &str = "https://api.kaspa.org";

/// Channel for status transitions; progress rides its own channel.
const STATUS_CHANNEL: &str = "sync:status";
const PROGRESS_CHANNEL: &str = "sync:progress";

#[derive(Debug, Clone)]
pub struct SyncManagerConfig {
    pub rpc: NodeRpcConfig,
    pub poll_interval: Duration,
    pub fallback_endpoint: String,
    pub backoff: BackoffPolicy,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self {
            rpc: NodeRpcConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_endpoint: DEFAULT_FALLBACK_ENDPOINT.to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("Sync wait cancelled")]
    Cancelled,
}

impl BoundaryError for SyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Rpc(err) => err.kind(),
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub node_key: String,
    pub block_count: u64,
    pub header_count: u64,
    pub progress_pct: f64,
    pub rate_blocks_per_sec: Option<f64>,
    pub eta_secs: Option<u64>,
    /// "Calculating…" while no estimate is available.
    pub eta_text: String,
    pub is_synced: bool,
    pub network_name: Option<String>,
    pub recommended: SyncStrategy,
}

struct SyncInner {
    config: SyncManagerConfig,
    rpc: NodeRpcClient,
    estimators: Mutex<HashMap<String, SyncEstimator>>,
    known_sync_states: Mutex<HashMap<String, bool>>,
    bus: EventBus,
    alerts: AlertEngine,
}

#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<SyncInner>,
}

impl SyncManager {
    pub fn new(config: SyncManagerConfig, bus: EventBus, alerts: AlertEngine) -> Self {
        let rpc = NodeRpcClient::new(config.rpc.clone());
        Self {
            inner: Arc::new(SyncInner {
                config,
                rpc,
                estimators: Mutex::new(HashMap::new()),
                known_sync_states: Mutex::new(HashMap::new()),
                bus,
                alerts,
            }),
        }
    }

    pub fn fallback_endpoint(&self) -> &str {
        &self.inner.config.fallback_endpoint
    }

    /// One RPC probe (with transient retry), updating the node's history and
    /// emitting `sync:required` / `node:ready` on transitions.
    pub async fn probe(&self, node_key: &str) -> Result<SyncSnapshot, SyncError> {
        let info = self
            .inner
            .config
            .backoff
            .retry_if(|| self.inner.rpc.query(), RpcError::is_transient)
            .await?;

        let snapshot = {
            let mut estimators = self.inner.estimators.lock().await;
            let estimator = estimators.entry(node_key.to_string()).or_insert_with(SyncEstimator::new);
            estimator.push(info.block_count, info.header_count);
            build_snapshot(node_key, &info, estimator)
        };

        self.inner.alerts.on_sync_state(node_key, info.is_synced).await;

        let previous = {
            let mut known = self.inner.known_sync_states.lock().await;
            known.insert(node_key.to_string(), info.is_synced)
        };
        match (previous, info.is_synced) {
            (Some(true), false) | (None, false) => {
                info!(
                    target: LOG_TARGET,
                    "{} requires sync: {}/{} blocks, eta {}",
                    node_key,
                    snapshot.block_count,
                    snapshot.header_count,
                    snapshot.eta_text
                );
                self.inner
                    .bus
                    .publish(STATUS_CHANNEL, "sync:required", json!(snapshot));
            },
            (Some(false), true) => {
                info!(target: LOG_TARGET, "{} is synced", node_key);
                self.inner.bus.publish(STATUS_CHANNEL, "node:ready", json!(snapshot));
            },
            _ => {},
        }
        Ok(snapshot)
    }

    /// Hosts the blocking `Wait` strategy: polls until synced, streaming
    /// progress. Cancellation is cooperative between polls.
    pub async fn wait_until_synced(
        &self,
        node_key: &str,
        mut shutdown: ShutdownSignal,
    ) -> Result<SyncSnapshot, SyncError> {
        loop {
            let snapshot = match self.probe(node_key).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.inner
                        .bus
                        .publish(STATUS_CHANNEL, "sync:error", json!({ "nodeKey": node_key, "error": err.to_string() }));
                    return Err(err);
                },
            };
            self.inner
                .bus
                .publish(PROGRESS_CHANNEL, "sync:progress", json!(snapshot));
            if snapshot.is_synced {
                self.inner.bus.publish(STATUS_CHANNEL, "sync:complete", json!(snapshot));
                return Ok(snapshot);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {},
                _ = &mut shutdown => return Err(SyncError::Cancelled),
            }
        }
    }

    /// A `ProgressChecker` delegating to this manager, for node-sync tasks.
    pub fn checker(&self, node_key: &str) -> Arc<dyn ProgressChecker> {
        Arc::new(SyncChecker {
            manager: self.clone(),
            node_key: node_key.to_string(),
        })
    }

    /// The `Background` strategy: registers and starts a node-sync task. The
    /// completion hook (when given) flips configuration back to the local
    /// node.
    pub async fn start_background_sync(
        &self,
        supervisor: &TaskSupervisor,
        node_key: &str,
        service_id: &str,
        on_complete: Option<Arc<dyn CompletionHook>>,
    ) -> Result<String, TaskError> {
        let mut spec = TaskSpec::new(TaskKind::NodeSync, service_id, self.checker(node_key))
            .with_poll_interval(self.inner.config.poll_interval)
            .with_metadata(json!({
                "nodeKey": node_key,
                "fallbackEndpoint": self.inner.config.fallback_endpoint,
            }));
        if let Some(hook) = on_complete {
            spec = spec.with_completion_hook(hook);
        }
        let task_id = supervisor.register(spec).await;
        supervisor.start(&task_id).await?;
        info!(target: LOG_TARGET, "background sync of {} registered as {}", node_key, task_id);
        Ok(task_id)
    }
}

struct SyncChecker {
    manager: SyncManager,
    node_key: String,
}

#[async_trait]
impl ProgressChecker for SyncChecker {
    async fn check(&self, _task: &TaskRecord) -> TaskProgress {
        match self.manager.probe(&self.node_key).await {
            Ok(snapshot) => {
                self.manager
                    .inner
                    .bus
                    .publish(PROGRESS_CHANNEL, "sync:progress", json!(snapshot));
                TaskProgress {
                    completed: snapshot.is_synced,
                    progress: snapshot.progress_pct,
                    error: None,
                    metadata: Some(json!({
                        "nodeKey": snapshot.node_key,
                        "blockCount": snapshot.block_count,
                        "headerCount": snapshot.header_count,
                        "etaText": snapshot.eta_text,
                    })),
                }
            },
            Err(err) => TaskProgress::failed(&err.to_string()),
        }
    }
}

/// Completion hook that points an environment key back at the local node once
/// sync finishes. Used by the `Background` strategy with `autoSwitch`.
pub struct EndpointSwitchHook {
    store: ConfigStore,
    env_key: String,
    local_value: String,
    bus: EventBus,
}

impl EndpointSwitchHook {
    pub fn new(store: ConfigStore, env_key: &str, local_value: &str, bus: EventBus) -> Self {
        Self {
            store,
            env_key: env_key.to_string(),
            local_value: local_value.to_string(),
            bus,
        }
    }
}

#[async_trait]
impl CompletionHook for EndpointSwitchHook {
    async fn on_complete(&self, task: &TaskRecord) {
        match self.store.read_env().await {
            Ok(mut env) => {
                env.set(&self.env_key, &self.local_value);
                if let Err(err) = self.store.write_env(&env).await {
                    error!(target: LOG_TARGET, "failed to switch {} to local node: {}", self.env_key, err);
                    return;
                }
                info!(target: LOG_TARGET, "switched {} back to the local node", self.env_key);
                self.bus.publish(
                    STATUS_CHANNEL,
                    "node:ready",
                    json!({ "taskId": task.task_id, "switchedKey": self.env_key }),
                );
            },
            Err(err) => error!(target: LOG_TARGET, "failed to read env for endpoint switch: {}", err),
        }
    }
}

fn build_snapshot(node_key: &str, info: &BlockDagInfo, estimator: &SyncEstimator) -> SyncSnapshot {
    let progress_pct = SyncEstimator::progress_pct(info.block_count, info.header_count);
    let eta_secs = if info.is_synced { None } else { estimator.eta_secs() };
    let eta_text = match eta_secs {
        Some(secs) => format_eta(secs),
        None => "Calculating…".to_string(),
    };
    SyncSnapshot {
        node_key: node_key.to_string(),
        block_count: info.block_count,
        header_count: info.header_count,
        progress_pct,
        rate_blocks_per_sec: estimator.rate(),
        eta_secs,
        eta_text,
        is_synced: info.is_synced,
        network_name: info.network_name.clone(),
        recommended: recommend(eta_secs),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};

    fn info(blocks: u64, headers: u64, synced: bool) -> BlockDagInfo {
        BlockDagInfo {
            block_count: blocks,
            header_count: headers,
            is_synced: synced,
            network_name: Some("kaspa-mainnet".to_string()),
            tip_hashes: vec![],
            difficulty: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z").unwrap().with_timezone(&Utc) + ChronoDuration::seconds(secs)
    }

    #[test]
    fn snapshot_recommends_background_for_a_medium_eta() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(100_000, 162_000, at(0));
        estimator.push_at(112_000, 162_000, at(600));

        let snapshot = build_snapshot("kaspa-node", &info(112_000, 162_000, false), &estimator);
        assert_eq!(snapshot.eta_secs, Some(2_500));
        assert_eq!(snapshot.eta_text, "41m 40s");
        assert_eq!(snapshot.recommended, SyncStrategy::Background);
        assert!((snapshot.rate_blocks_per_sec.unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_without_history_is_calculating() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(10, 100, at(0));
        let snapshot = build_snapshot("kaspa-node", &info(10, 100, false), &estimator);
        assert_eq!(snapshot.eta_secs, None);
        assert_eq!(snapshot.eta_text, "Calculating…");
        assert_eq!(snapshot.recommended, SyncStrategy::Background);
        assert!((snapshot.progress_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn a_synced_snapshot_has_no_eta_and_full_progress_bounds() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(200, 200, at(0));
        let snapshot = build_snapshot("kaspa-node", &info(200, 200, true), &estimator);
        assert!(snapshot.is_synced);
        assert_eq!(snapshot.eta_secs, None);
        assert!((snapshot.progress_pct - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn endpoint_switch_hook_rewrites_the_env_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let mut env = crate::config_store::EnvFile::parse("KASPA_NODE_ENDPOINT=https://api.kaspa.org\n");
        store.write_env(&env).await.unwrap();

        let bus = EventBus::new();
        let hook = EndpointSwitchHook::new(store.clone(), "KASPA_NODE_ENDPOINT", "http://kaspad:16110", bus);
        let record = TaskRecord {
            task_id: "task-node-sync-1".to_string(),
            kind: TaskKind::NodeSync,
            service_id: "kaspa-node".to_string(),
            status: crate::tasks::TaskStatus::Complete,
            progress_pct: 100.0,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            last_update: Utc::now(),
            metadata: serde_json::Value::Null,
            poll_interval_ms: 5_000,
            error: None,
        };
        hook.on_complete(&record).await;

        env = store.read_env().await.unwrap();
        assert_eq!(env.get("KASPA_NODE_ENDPOINT"), Some("http://kaspad:16110"));
    }
}
