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

//! # Update / reconfigure pipeline
//!
//! Drives version updates service by service (snapshot, stop, rewrite image
//! tag, start, await health) with per-service rollback on failure, and
//! reconfiguration (environment edits and profile activation) restarting
//! exactly the affected services.

use crate::{
    backup::{BackupError, BackupManager},
    catalog::ProfileCatalog,
    config_store::{ConfigDiff, ConfigError, ConfigStore},
    error::{BoundaryError, ErrorKind},
    events::{channels, EventBus},
    graph,
    monitor::{HealthState, MonitorError, MonitorService, ServiceState},
    runtime::ContainerRuntime,
};
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

const LOG_TARGET: &str = "aio::update";

#[derive(Debug, Clone)]
pub struct UpdatePipelineConfig {
    /// How long an updated service may take to report healthy before the
    /// rollback kicks in.
    pub health_deadline: Duration,
}

impl Default for UpdatePipelineConfig {
    fn default() -> Self {
        Self {
            health_deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    pub service_id: String,
    pub target_version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub updates: Vec<ServiceUpdate>,
    #[serde(default)]
    pub create_backup: bool,
    #[serde(default)]
    pub breaking_acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Updated,
    RolledBack,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub service_id: String,
    pub from_version: String,
    pub to_version: String,
    pub status: UpdateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub backup_id: Option<String>,
    pub outcomes: Vec<UpdateOutcome>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableUpdate {
    pub service_id: String,
    pub current_version: String,
    pub target_version: String,
    pub breaking: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigureRequest {
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Option<Vec<String>>,
    #[serde(default)]
    pub create_backup: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigureReport {
    pub diff: ConfigDiff,
    pub affected_services: Vec<String>,
    pub backup_id: Option<String>,
    pub restarted: Vec<String>,
    pub profiles_started: Vec<String>,
    pub profiles_stopped: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Invalid update request: {0}")]
    Validation(String),
    #[error("Breaking updates require acknowledgment: {}", .0.join(", "))]
    BreakingNotAcknowledged(Vec<String>),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("Update of `{service}` failed: {reason}")]
    Failed {
        service: String,
        reason: String,
        rolled_back: bool,
        report: UpdateReport,
    },
    #[error("Update cancelled")]
    Cancelled,
}

impl BoundaryError for UpdateError {
    fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Validation(_) | UpdateError::BreakingNotAcknowledged(_) => ErrorKind::Validation,
            UpdateError::Backup(err) => err.kind(),
            UpdateError::Config(err) => err.kind(),
            UpdateError::Monitor(err) => err.kind(),
            UpdateError::Failed { .. } => ErrorKind::UpdateFailed,
            UpdateError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Clone)]
pub struct UpdatePipeline {
    catalog: Arc<ProfileCatalog>,
    runtime: Arc<dyn ContainerRuntime>,
    monitor: MonitorService,
    config: ConfigStore,
    backup: BackupManager,
    bus: EventBus,
    pipeline_config: UpdatePipelineConfig,
}

impl UpdatePipeline {
    pub fn new(
        catalog: Arc<ProfileCatalog>,
        runtime: Arc<dyn ContainerRuntime>,
        monitor: MonitorService,
        config: ConfigStore,
        backup: BackupManager,
        bus: EventBus,
        pipeline_config: UpdatePipelineConfig,
    ) -> Self {
        Self {
            catalog,
            runtime,
            monitor,
            config,
            backup,
            bus,
            pipeline_config,
        }
    }

    /// Updates available per service: the catalog's bundled image tag against
    /// what is deployed, minus explicitly skipped versions.
    pub async fn available(&self) -> Result<Vec<AvailableUpdate>, UpdateError> {
        let state = self.config.read_installation_state().await?;
        let compose = self.config.read_compose().await?;
        let mut updates = Vec::new();
        for def in self.catalog.services() {
            let latest = match def.image_tag() {
                Some(tag) => tag,
                None => continue,
            };
            let current = compose
                .image_tag_of(&def.service_id)
                .map(|t| t.to_string())
                .or_else(|| state.service_version(&def.service_id).map(|v| v.to_string()));
            let current = match current {
                Some(current) => current,
                None => continue,
            };
            if current == latest {
                continue;
            }
            if state.skipped_updates.get(&def.service_id).map(|v| v.as_str()) == Some(latest) {
                continue;
            }
            updates.push(AvailableUpdate {
                service_id: def.service_id.clone(),
                current_version: current.clone(),
                target_version: latest.to_string(),
                breaking: is_breaking(&current, latest),
            });
        }
        updates.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(updates)
    }

    /// Marks a version as skipped; it stops appearing in `available`.
    pub async fn skip(&self, service_id: &str, version: &str) -> Result<(), UpdateError> {
        if self.catalog.get_service(service_id).is_none() {
            return Err(UpdateError::Validation(format!("unknown service `{}`", service_id)));
        }
        let mut state = self.config.read_installation_state().await?;
        state.skipped_updates.insert(service_id.to_string(), version.to_string());
        self.config.write_installation_state(&state).await?;
        Ok(())
    }

    /// Applies the requested updates sequentially, dependents before their
    /// dependencies. The first failure rolls the service back and aborts the
    /// remainder.
    pub async fn apply(&self, request: UpdateRequest, shutdown: ShutdownSignal) -> Result<UpdateReport, UpdateError> {
        if request.updates.is_empty() {
            return Err(UpdateError::Validation("no updates requested".to_string()));
        }
        let compose = self.config.read_compose().await?;
        for update in &request.updates {
            if self.catalog.get_service(&update.service_id).is_none() {
                return Err(UpdateError::Validation(format!("unknown service `{}`", update.service_id)));
            }
            if compose.image_of(&update.service_id).is_none() {
                return Err(UpdateError::Validation(format!(
                    "service `{}` has no image in the compose file",
                    update.service_id
                )));
            }
        }

        let breaking: Vec<String> = request
            .updates
            .iter()
            .filter(|u| {
                compose
                    .image_tag_of(&u.service_id)
                    .map(|current| is_breaking(current, &u.target_version))
                    .unwrap_or(false)
            })
            .map(|u| u.service_id.clone())
            .collect();
        if !breaking.is_empty() && !request.breaking_acknowledged {
            return Err(UpdateError::BreakingNotAcknowledged(breaking));
        }

        let backup_id = if request.create_backup {
            let meta = self
                .backup
                .create("pre-update", json!({ "updates": request.updates }))
                .await?;
            Some(meta.snapshot_id)
        } else {
            None
        };

        // The pipeline drives the runtime directly, so it holds the fleet
        // mutation lock itself for the whole run.
        let _fleet = self.monitor.lock_fleet().await;

        self.bus.publish(
            channels::UPDATES_PIPELINE,
            "update:started",
            json!({
                "services": request.updates.iter().map(|u| u.service_id.clone()).collect::<Vec<_>>(),
                "backupId": backup_id,
            }),
        );

        // Dependents are processed before the services they depend on.
        let set: BTreeSet<String> = request.updates.iter().map(|u| u.service_id.clone()).collect();
        let order = graph::topological_sort(&set, &self.catalog.dependency_map())
            .map_err(|cycle| UpdateError::Validation(cycle.to_string()))?;
        let ordered: Vec<&ServiceUpdate> = order
            .iter()
            .rev()
            .filter_map(|id| request.updates.iter().find(|u| &u.service_id == id))
            .collect();

        let mut outcomes: Vec<UpdateOutcome> = Vec::with_capacity(ordered.len());
        for (index, update) in ordered.iter().enumerate() {
            if shutdown.is_triggered() {
                return Err(UpdateError::Cancelled);
            }
            match self.apply_one(update, &shutdown).await {
                Ok(outcome) => {
                    self.bus.publish(
                        channels::UPDATES_PIPELINE,
                        "update:service-done",
                        json!(outcome),
                    );
                    outcomes.push(outcome);
                },
                Err((outcome, reason)) => {
                    let rolled_back = outcome.status == UpdateStatus::RolledBack;
                    self.bus
                        .publish(channels::UPDATES_PIPELINE, "update:failed", json!(outcome));
                    let failed_service = outcome.service_id.clone();
                    outcomes.push(outcome);
                    for skipped in &ordered[index + 1..] {
                        outcomes.push(UpdateOutcome {
                            service_id: skipped.service_id.clone(),
                            from_version: String::new(),
                            to_version: skipped.target_version.clone(),
                            status: UpdateStatus::Skipped,
                            error: None,
                        });
                    }
                    return Err(UpdateError::Failed {
                        service: failed_service,
                        reason,
                        rolled_back,
                        report: UpdateReport {
                            backup_id,
                            outcomes,
                            success: false,
                        },
                    });
                },
            }
        }

        let report = UpdateReport {
            backup_id,
            outcomes,
            success: true,
        };
        self.bus
            .publish(channels::UPDATES_PIPELINE, "update:complete", json!(report));
        Ok(report)
    }

    async fn apply_one(
        &self,
        update: &ServiceUpdate,
        shutdown: &ShutdownSignal,
    ) -> Result<UpdateOutcome, (UpdateOutcome, String)> {
        let service = update.service_id.as_str();
        let fail = |from: &str, status: UpdateStatus, reason: String| {
            (
                UpdateOutcome {
                    service_id: service.to_string(),
                    from_version: from.to_string(),
                    to_version: update.target_version.clone(),
                    status,
                    error: Some(reason.clone()),
                },
                reason,
            )
        };

        self.emit_phase(service, "stop");
        if let Err(err) = self.runtime.stop(std::slice::from_ref(&update.service_id)).await {
            return Err(fail("", UpdateStatus::Failed, err.to_string()));
        }

        self.emit_phase(service, "rewrite");
        let old_tag = match self.rewrite_tag(service, &update.target_version).await {
            Ok(tag) => tag,
            Err(err) => return Err(fail("", UpdateStatus::Failed, err.to_string())),
        };

        self.emit_phase(service, "start");
        if let Err(err) = self.runtime.up(std::slice::from_ref(&update.service_id)).await {
            return Err(fail(&old_tag, UpdateStatus::Failed, err.to_string()));
        }

        self.emit_phase(service, "await-health");
        match self
            .monitor
            .wait_for_healthy(service, self.pipeline_config.health_deadline, shutdown.clone())
            .await
        {
            Ok(()) => {
                if let Err(err) = self.record_version(service, &update.target_version).await {
                    warn!(target: LOG_TARGET, "failed to record {} version: {}", service, err);
                }
                info!(
                    target: LOG_TARGET,
                    "updated {} {} -> {}",
                    service,
                    old_tag,
                    update.target_version
                );
                Ok(UpdateOutcome {
                    service_id: service.to_string(),
                    from_version: old_tag,
                    to_version: update.target_version.clone(),
                    status: UpdateStatus::Updated,
                    error: None,
                })
            },
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    "{} unhealthy on {}: {}; rolling back to {}",
                    service,
                    update.target_version,
                    err,
                    old_tag
                );
                let rolled_back = self.rollback_one(service, &old_tag, shutdown).await;
                let status = if rolled_back { UpdateStatus::RolledBack } else { UpdateStatus::Failed };
                Err(fail(&old_tag, status, err.to_string()))
            },
        }
    }

    /// Restores the previous image tag, restarts and re-awaits health.
    async fn rollback_one(&self, service: &str, old_tag: &str, shutdown: &ShutdownSignal) -> bool {
        self.emit_phase(service, "rollback");
        if let Err(err) = self.rewrite_tag(service, old_tag).await {
            error!(target: LOG_TARGET, "rollback rewrite of {} failed: {}", service, err);
            return false;
        }
        if let Err(err) = self.runtime.stop(&[service.to_string()]).await {
            warn!(target: LOG_TARGET, "rollback stop of {} failed: {}", service, err);
        }
        if let Err(err) = self.runtime.up(&[service.to_string()]).await {
            error!(target: LOG_TARGET, "rollback start of {} failed: {}", service, err);
            return false;
        }
        match self
            .monitor
            .wait_for_healthy(service, self.pipeline_config.health_deadline, shutdown.clone())
            .await
        {
            Ok(()) => {
                info!(target: LOG_TARGET, "{} rolled back to {}", service, old_tag);
                true
            },
            Err(err) => {
                error!(target: LOG_TARGET, "{} still unhealthy after rollback: {}", service, err);
                false
            },
        }
    }

    /// Environment reconfiguration: diff, optional backup, two-phase write,
    /// profile activation changes, and a restart of exactly the services whose
    /// profiles own a changed key (plus their running dependents).
    pub async fn reconfigure(
        &self,
        request: ReconfigureRequest,
        shutdown: ShutdownSignal,
    ) -> Result<ReconfigureReport, UpdateError> {
        let mut env = self.config.read_env().await?;
        let diff = env.diff(&request.config);

        let backup_id = if request.create_backup {
            let meta = self
                .backup
                .create("pre-reconfigure", json!({ "changedKeys": diff.keys().collect::<Vec<_>>() }))
                .await?;
            Some(meta.snapshot_id)
        } else {
            None
        };

        let affected_services = self.affected_services(&diff).await?;

        env.apply(&request.config);
        self.config.write_env(&env).await?;

        let mut profiles_started = Vec::new();
        let mut profiles_stopped = Vec::new();
        if let Some(profiles) = &request.profiles {
            let desired: BTreeSet<String> = profiles
                .iter()
                .map(|p| self.catalog.resolve_profile_id(p).to_string())
                .collect();
            for profile in &desired {
                if self.catalog.get_profile(profile).is_none() {
                    return Err(UpdateError::Validation(format!("unknown profile `{}`", profile)));
                }
            }
            let mut state = self.config.read_installation_state().await?;
            let current: BTreeSet<String> = state.active_profiles.iter().cloned().collect();

            let added: Vec<String> = desired.difference(&current).cloned().collect();
            let removed: Vec<String> = current.difference(&desired).cloned().collect();

            if !removed.is_empty() {
                let keep: BTreeSet<String> = desired
                    .iter()
                    .filter_map(|p| self.catalog.get_profile(p))
                    .flat_map(|p| p.services.iter().cloned())
                    .collect();
                let stop: Vec<String> = removed
                    .iter()
                    .filter_map(|p| self.catalog.get_profile(p))
                    .flat_map(|p| p.services.iter().cloned())
                    .filter(|s| !keep.contains(s))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if !stop.is_empty() {
                    self.monitor.stop_services(&stop).await?;
                }
                profiles_stopped = removed;
            }
            if !added.is_empty() {
                self.monitor.start_profiles(&added, shutdown.clone()).await?;
                profiles_started = added;
            }

            state.active_profiles = desired.into_iter().collect();
            self.config.write_installation_state(&state).await?;
        }

        // Restart affected services that are currently up and were not just
        // (re)started through a profile change.
        let just_started: BTreeSet<String> = profiles_started
            .iter()
            .filter_map(|p| self.catalog.get_profile(p))
            .flat_map(|p| p.services.iter().cloned())
            .collect();
        let mut to_restart = Vec::new();
        for service in &affected_services {
            if just_started.contains(service) {
                continue;
            }
            let up = self
                .monitor
                .observation(service)
                .await
                .map(|o| o.state == ServiceState::Running || o.health == HealthState::Healthy)
                .unwrap_or(false);
            if up {
                to_restart.push(service.clone());
            }
        }
        let restarted = if to_restart.is_empty() {
            Vec::new()
        } else {
            self.monitor.restart_services(&to_restart, shutdown).await?
        };

        let report = ReconfigureReport {
            diff,
            affected_services,
            backup_id,
            restarted,
            profiles_started,
            profiles_stopped,
        };
        self.bus.publish(
            channels::UPDATES_PIPELINE,
            "reconfigure:complete",
            json!({
                "changedKeys": report.diff.keys().collect::<Vec<_>>(),
                "affectedServices": report.affected_services,
                "backupId": report.backup_id,
            }),
        );
        Ok(report)
    }

    /// Services owned by profiles whose config keys intersect the diff, plus
    /// their transitive running dependents, restricted to services present in
    /// the compose file.
    async fn affected_services(&self, diff: &ConfigDiff) -> Result<Vec<String>, UpdateError> {
        let changed: BTreeSet<&str> = diff.keys().collect();
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        let mut affected: BTreeSet<String> = BTreeSet::new();
        for profile in self.catalog.profiles() {
            if profile.config_keys.iter().any(|k| changed.contains(k.as_str())) {
                affected.extend(profile.services.iter().cloned());
            }
        }

        // A dependent of a restarted service bounces with it.
        let mut frontier: Vec<String> = affected.iter().cloned().collect();
        while let Some(service) = frontier.pop() {
            for dependent in self.catalog.dependents_of(&service) {
                if affected.insert(dependent.service_id.clone()) {
                    frontier.push(dependent.service_id.clone());
                }
            }
        }

        let compose = self.config.read_compose().await?;
        let names = compose.service_names();
        let affected = affected
            .into_iter()
            .filter(|s| names.is_empty() || names.contains(s))
            .collect();
        Ok(affected)
    }

    async fn rewrite_tag(&self, service: &str, tag: &str) -> Result<String, ConfigError> {
        let mut compose = self.config.read_compose().await?;
        let old = compose.set_image_tag(service, tag)?;
        self.config.write_compose(&compose).await?;
        Ok(old)
    }

    async fn record_version(&self, service: &str, version: &str) -> Result<(), ConfigError> {
        let mut state = self.config.read_installation_state().await?;
        state.record_service_version(service, version, "running");
        self.config.write_installation_state(&state).await
    }

    fn emit_phase(&self, service: &str, phase: &str) {
        self.bus.publish(
            channels::UPDATES_PIPELINE,
            "update:progress",
            json!({ "service": service, "phase": phase }),
        );
    }
}

/// A major-version bump is treated as breaking and requires acknowledgment.
fn is_breaking(current: &str, target: &str) -> bool {
    fn major(version: &str) -> Option<u64> {
        version
            .trim_start_matches('v')
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|p| p.parse().ok())
    }
    match (major(current), major(target)) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        alerts::{AlertEngine, AlertThresholds},
        catalog::{Profile, ProfileCategory, ServiceDefinition},
        config_store::fs,
        monitor::MonitorConfig,
        runtime::{
            ContainerInfo, ContainerState, ContainerUsage, EngineHealth, RuntimeError, RuntimeInfo,
        },
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use kaspa_aio_shutdown::Shutdown;
    use std::{
        collections::{HashMap, HashSet},
        path::{Path, PathBuf},
        sync::Mutex as StdMutex,
    };
    use tokio::sync::mpsc;

    /// A runtime whose containers pick up the image currently written in the
    /// compose file, and whose health is a function of that image.
    struct ComposeAwareRuntime {
        root: PathBuf,
        healthy_images: StdMutex<HashSet<String>>,
        containers: StdMutex<HashMap<String, (String, bool)>>,
    }

    impl ComposeAwareRuntime {
        fn new(root: &Path, healthy_images: &[&str]) -> Self {
            Self {
                root: root.to_path_buf(),
                healthy_images: StdMutex::new(healthy_images.iter().map(|s| s.to_string()).collect()),
                containers: StdMutex::new(HashMap::new()),
            }
        }

        fn compose_image(&self, service: &str) -> String {
            let contents = std::fs::read_to_string(self.root.join("docker-compose.yml")).unwrap_or_default();
            crate::config_store::ComposeFile::parse(&contents)
                .ok()
                .and_then(|c| c.image_of(service).map(|i| i.to_string()))
                .unwrap_or_else(|| format!("unknown/{}", service))
        }

        fn image_of(&self, service: &str) -> Option<String> {
            self.containers.lock().unwrap().get(service).map(|(image, _)| image.clone())
        }
    }

    #[async_trait]
    impl ContainerRuntime for ComposeAwareRuntime {
        async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
            let healthy = self.healthy_images.lock().unwrap().clone();
            let containers = self.containers.lock().unwrap();
            Ok(containers
                .iter()
                .map(|(service, (image, running))| ContainerInfo {
                    service_id: service.clone(),
                    container_name: service.clone(),
                    state: if *running { ContainerState::Running } else { ContainerState::Exited },
                    started_at: Some(Utc::now()),
                    image: image.clone(),
                    engine_health: if *running {
                        Some(if healthy.contains(image) {
                            EngineHealth::Healthy
                        } else {
                            EngineHealth::Unhealthy
                        })
                    } else {
                        None
                    },
                })
                .collect())
        }

        async fn usage(&self, _service_id: &str) -> Result<ContainerUsage, RuntimeError> {
            Ok(ContainerUsage {
                cpu_pct: 0.0,
                mem_bytes: 0,
                mem_limit_bytes: None,
            })
        }

        async fn up(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
            for service in service_ids {
                let image = self.compose_image(service);
                self.containers
                    .lock()
                    .unwrap()
                    .insert(service.clone(), (image, true));
            }
            Ok(())
        }

        async fn stop(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
            let mut containers = self.containers.lock().unwrap();
            for service in service_ids {
                if let Some(entry) = containers.get_mut(service) {
                    entry.1 = false;
                }
            }
            Ok(())
        }

        async fn restart(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
            self.up(service_ids).await
        }

        async fn logs(&self, _service_id: &str, _tail: usize) -> Result<String, RuntimeError> {
            Ok(String::new())
        }

        async fn logs_follow(&self, _service_id: &str, _tail: usize) -> Result<mpsc::Receiver<String>, RuntimeError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn runtime_info(&self) -> Result<RuntimeInfo, RuntimeError> {
            Ok(RuntimeInfo {
                engine_version: "test".to_string(),
                compose_version: "test".to_string(),
                running: true,
                container_count: 0,
                image_count: 0,
                memory_limit_gb: None,
            })
        }
    }

    fn test_catalog() -> Arc<ProfileCatalog> {
        let services = vec![
            ServiceDefinition::new("kaspa-node", "node-profile", "kaspanet/kaspad:1.0.0").critical(),
            ServiceDefinition::new("indexer", "indexer-profile", "example/indexer:2.0.0")
                .with_dependencies(&["kaspa-node"]),
        ];
        let profiles = vec![
            Profile::new("node-profile", "Node", ProfileCategory::Node, 1)
                .with_services(&["kaspa-node"])
                .with_config_keys(&["B", "C", "KASPA_NETWORK"]),
            Profile::new("indexer-profile", "Indexer", ProfileCategory::Indexer, 2)
                .with_services(&["indexer"])
                .with_prerequisites(&["node-profile"])
                .with_config_keys(&["INDEXER_BATCH_SIZE"]),
        ];
        Arc::new(ProfileCatalog::load(profiles, services, vec![]).unwrap())
    }

    async fn seed_project(root: &Path, node_tag: &str) {
        fs::write_atomic(&root.join(".env"), b"A=1\nB=2\n").await.unwrap();
        let compose = format!(
            "services:\n  kaspa-node:\n    image: kaspanet/kaspad:{}\n  indexer:\n    image: example/indexer:2.0.0\n",
            node_tag
        );
        fs::write_atomic(&root.join("docker-compose.yml"), compose.as_bytes()).await.unwrap();
    }

    struct Fixture {
        pipeline: UpdatePipeline,
        runtime: Arc<ComposeAwareRuntime>,
        store: ConfigStore,
        backup: BackupManager,
        monitor: MonitorService,
        _dir: tempfile::TempDir,
    }

    async fn fixture(healthy_images: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path(), "1.0.0").await;
        let catalog = test_catalog();
        let runtime = Arc::new(ComposeAwareRuntime::new(dir.path(), healthy_images));
        let bus = EventBus::new();
        let alerts = AlertEngine::new(AlertThresholds::default(), bus.clone());
        let monitor_config = MonitorConfig {
            check_interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(100),
            retry_attempts: 3,
            startup_deadline: Duration::from_millis(250),
            health_poll_interval: Duration::from_millis(40),
            probe_host: "127.0.0.1".to_string(),
        };
        let monitor = MonitorService::new(
            catalog.clone(),
            runtime.clone(),
            bus.clone(),
            alerts,
            monitor_config,
        );
        let store = ConfigStore::new(dir.path());
        let backup = BackupManager::new(dir.path());
        let pipeline = UpdatePipeline::new(
            catalog,
            runtime.clone(),
            monitor.clone(),
            store.clone(),
            backup.clone(),
            bus,
            UpdatePipelineConfig {
                health_deadline: Duration::from_millis(250),
            },
        );
        Fixture {
            pipeline,
            runtime,
            store,
            backup,
            monitor,
            _dir: dir,
        }
    }

    fn update_request(service: &str, version: &str) -> UpdateRequest {
        UpdateRequest {
            updates: vec![ServiceUpdate {
                service_id: service.to_string(),
                target_version: version.to_string(),
            }],
            create_backup: true,
            breaking_acknowledged: false,
        }
    }

    #[tokio::test]
    async fn a_successful_update_rewrites_starts_and_records() {
        let fx = fixture(&["kaspanet/kaspad:1.0.0", "kaspanet/kaspad:1.1.0"]).await;
        let shutdown = Shutdown::new();
        fx.runtime.up(&["kaspa-node".to_string()]).await.unwrap();

        let report = fx
            .pipeline
            .apply(update_request("kaspa-node", "1.1.0"), shutdown.to_signal())
            .await
            .unwrap();

        assert!(report.success);
        assert!(report.backup_id.is_some());
        assert_eq!(report.outcomes[0].status, UpdateStatus::Updated);
        assert_eq!(report.outcomes[0].from_version, "1.0.0");

        let compose = fx.store.read_compose().await.unwrap();
        assert_eq!(compose.image_tag_of("kaspa-node"), Some("1.1.0"));
        let state = fx.store.read_installation_state().await.unwrap();
        assert_eq!(state.service_version("kaspa-node"), Some("1.1.0"));
        // The pre-update snapshot captured the old tag.
        let snapshot = fx.backup.list(Some(1)).await.unwrap().remove(0);
        assert_eq!(snapshot.metadata.reason, "pre-update");
    }

    #[tokio::test]
    async fn a_failed_update_rolls_back_to_the_previous_tag() {
        // Only 1.0.0 is a healthy image: 1.1.0 never reports healthy.
        let fx = fixture(&["kaspanet/kaspad:1.0.0"]).await;
        let shutdown = Shutdown::new();
        fx.runtime.up(&["kaspa-node".to_string()]).await.unwrap();

        let err = fx
            .pipeline
            .apply(update_request("kaspa-node", "1.1.0"), shutdown.to_signal())
            .await
            .unwrap_err();

        match err {
            UpdateError::Failed {
                service,
                rolled_back,
                report,
                ..
            } => {
                assert_eq!(service, "kaspa-node");
                assert!(rolled_back);
                assert_eq!(report.outcomes[0].status, UpdateStatus::RolledBack);
            },
            other => panic!("unexpected error {:?}", other),
        }

        // Final state: prior tag on disk, container healthy on the old image.
        let compose = fx.store.read_compose().await.unwrap();
        assert_eq!(compose.image_tag_of("kaspa-node"), Some("1.0.0"));
        assert_eq!(fx.runtime.image_of("kaspa-node").unwrap(), "kaspanet/kaspad:1.0.0");
        fx.monitor
            .wait_for_healthy("kaspa-node", Duration::from_millis(250), shutdown.to_signal())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn a_failure_aborts_the_remaining_services() {
        let fx = fixture(&["kaspanet/kaspad:1.0.0", "example/indexer:2.0.0"]).await;
        let shutdown = Shutdown::new();
        fx.runtime.up(&["kaspa-node".to_string(), "indexer".to_string()]).await.unwrap();

        let request = UpdateRequest {
            updates: vec![
                ServiceUpdate {
                    service_id: "kaspa-node".to_string(),
                    target_version: "1.1.0".to_string(),
                },
                ServiceUpdate {
                    service_id: "indexer".to_string(),
                    target_version: "2.1.0".to_string(),
                },
            ],
            create_backup: false,
            breaking_acknowledged: false,
        };
        let err = fx.pipeline.apply(request, shutdown.to_signal()).await.unwrap_err();
        match err {
            UpdateError::Failed { report, .. } => {
                // The indexer (a dependent) went first and failed; the node was
                // never touched.
                assert_eq!(report.outcomes[0].service_id, "indexer");
                assert_eq!(report.outcomes[0].status, UpdateStatus::RolledBack);
                assert_eq!(report.outcomes[1].service_id, "kaspa-node");
                assert_eq!(report.outcomes[1].status, UpdateStatus::Skipped);
            },
            other => panic!("unexpected error {:?}", other),
        }
        let compose = fx.store.read_compose().await.unwrap();
        assert_eq!(compose.image_tag_of("kaspa-node"), Some("1.0.0"));
    }

    #[tokio::test]
    async fn breaking_updates_require_acknowledgment() {
        let fx = fixture(&["kaspanet/kaspad:1.0.0", "kaspanet/kaspad:2.0.0"]).await;
        let shutdown = Shutdown::new();
        fx.runtime.up(&["kaspa-node".to_string()]).await.unwrap();

        let err = fx
            .pipeline
            .apply(update_request("kaspa-node", "2.0.0"), shutdown.to_signal())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::BreakingNotAcknowledged(_)));

        let mut request = update_request("kaspa-node", "2.0.0");
        request.breaking_acknowledged = true;
        assert!(fx.pipeline.apply(request, shutdown.to_signal()).await.is_ok());
    }

    #[tokio::test]
    async fn available_compares_compose_tags_with_the_catalog() {
        let fx = fixture(&[]).await;
        // The catalog ships 1.0.0 for the node; deploy an older tag.
        seed_project(fx.store.root(), "0.9.0").await;

        let available = fx.pipeline.available().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].service_id, "kaspa-node");
        assert_eq!(available[0].current_version, "0.9.0");
        assert_eq!(available[0].target_version, "1.0.0");
        assert!(available[0].breaking);

        fx.pipeline.skip("kaspa-node", "1.0.0").await.unwrap();
        assert!(fx.pipeline.available().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconfigure_diffs_backs_up_and_restarts_affected() {
        let fx = fixture(&["kaspanet/kaspad:1.0.0", "example/indexer:2.0.0"]).await;
        let shutdown = Shutdown::new();
        fx.runtime.up(&["kaspa-node".to_string()]).await.unwrap();
        fx.monitor.observe_cycle().await.unwrap();

        let request = ReconfigureRequest {
            config: vec![("A", "1"), ("B", "3"), ("C", "4")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            profiles: None,
            create_backup: true,
        };
        let report = fx.pipeline.reconfigure(request, shutdown.to_signal()).await.unwrap();

        // Diff: B modified, C added; ordered by key.
        let kinds: Vec<_> = report.diff.changes.iter().map(|c| (c.key.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("B", crate::config_store::ChangeKind::Modified),
                ("C", crate::config_store::ChangeKind::Added)
            ]
        );
        assert!(report.backup_id.is_some());
        // B and C belong to the node profile; its running service restarted.
        assert!(report.affected_services.contains(&"kaspa-node".to_string()));
        assert_eq!(report.restarted, vec!["kaspa-node"]);

        // The file now contains exactly the requested keys, order preserved.
        let env = fx.store.read_env().await.unwrap();
        assert_eq!(env.to_string(), "A=1\nB=3\nC=4\n");
    }

    #[tokio::test]
    async fn reconfigure_with_no_changes_restarts_nothing() {
        let fx = fixture(&["kaspanet/kaspad:1.0.0"]).await;
        let shutdown = Shutdown::new();

        let request = ReconfigureRequest {
            config: vec![("A", "1"), ("B", "2")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            profiles: None,
            create_backup: false,
        };
        let report = fx.pipeline.reconfigure(request, shutdown.to_signal()).await.unwrap();
        assert!(report.diff.is_empty());
        assert!(report.restarted.is_empty());
        assert!(report.backup_id.is_none());
    }

    #[tokio::test]
    async fn idempotence_applying_the_same_config_twice() {
        let fx = fixture(&["kaspanet/kaspad:1.0.0"]).await;
        let shutdown = Shutdown::new();
        let config: BTreeMap<String, String> = vec![("A", "1"), ("B", "3"), ("C", "4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let first = fx
            .pipeline
            .reconfigure(
                ReconfigureRequest {
                    config: config.clone(),
                    profiles: None,
                    create_backup: false,
                },
                shutdown.to_signal(),
            )
            .await
            .unwrap();
        assert!(!first.diff.is_empty());
        let after_first = fx.store.read_env().await.unwrap().to_string();

        let second = fx
            .pipeline
            .reconfigure(
                ReconfigureRequest {
                    config,
                    profiles: None,
                    create_backup: false,
                },
                shutdown.to_signal(),
            )
            .await
            .unwrap();
        assert!(second.diff.is_empty());
        assert_eq!(fx.store.read_env().await.unwrap().to_string(), after_first);
    }

    #[test]
    fn breaking_detection_compares_majors() {
        assert!(is_breaking("1.0.0", "2.0.0"));
        assert!(is_breaking("v0.12.19", "v1.0.0"));
        assert!(!is_breaking("1.0.0", "1.1.0"));
        assert!(!is_breaking("latest", "1.0.0"));
    }
}
