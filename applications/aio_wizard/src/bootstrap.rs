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

//! Wires the core subsystems for the wizard controller, measures host
//! capacity, and restores persisted background tasks after a restart.

use kaspa_aio_core::{
    alerts::{AlertEngine, AlertThresholds},
    backup::BackupManager,
    catalog::ProfileCatalog,
    config_store::{ConfigStore, PersistedTask},
    events::{Broadcaster, BroadcasterConfig, EventBus},
    monitor::{MonitorConfig, MonitorService},
    resources::{ResourceSampler, DEFAULT_SAMPLE_INTERVAL},
    runtime::{ComposeRuntime, ContainerRuntime},
    sync::{NodeRpcConfig, SyncManager, SyncManagerConfig},
    tasks::{TaskFilter, TaskSupervisor},
    tokens::TokenStore,
    update::{UpdatePipeline, UpdatePipelineConfig},
    validator::HostCapacity,
};
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use sysinfo::{DiskExt, System, SystemExt};
use tokio::sync::mpsc;

const LOG_TARGET: &str = "aio::wizard::bootstrap";

pub struct WizardConfig {
    pub project_root: PathBuf,
    pub node_host: String,
    pub node_port: u16,
    pub version: String,
    /// Base URL token links point at, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
}

#[derive(Clone)]
pub struct Context {
    pub catalog: Arc<ProfileCatalog>,
    pub store: ConfigStore,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub monitor: MonitorService,
    pub sampler: ResourceSampler,
    pub alerts: AlertEngine,
    pub sync: SyncManager,
    pub tasks: TaskSupervisor,
    pub tokens: TokenStore,
    pub backup: BackupManager,
    pub update: UpdatePipeline,
    pub bus: EventBus,
    pub broadcaster: Broadcaster,
    pub host_capacity: HostCapacity,
    pub version: String,
    pub base_url: String,
    pub node_endpoint: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub shutdown: ShutdownSignal,
    /// Signals the main loop to exit when POST /api/wizard/shutdown arrives.
    pub shutdown_request: mpsc::Sender<()>,
}

pub async fn build(
    config: WizardConfig,
    shutdown: ShutdownSignal,
    shutdown_request: mpsc::Sender<()>,
) -> Context {
    let catalog = Arc::new(ProfileCatalog::bundled());
    let store = ConfigStore::new(&config.project_root);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(ComposeRuntime::new(&config.project_root));
    let bus = EventBus::new();
    let alerts = AlertEngine::new(AlertThresholds::default(), bus.clone());

    let monitor = MonitorService::new(
        catalog.clone(),
        runtime.clone(),
        bus.clone(),
        alerts.clone(),
        MonitorConfig::default(),
    );
    let sampler = ResourceSampler::new(runtime.clone(), config.project_root.clone());
    let broadcaster = Broadcaster::new(
        monitor.clone(),
        sampler.clone(),
        bus.clone(),
        BroadcasterConfig::default(),
    );

    let node_endpoint = format!("http://{}:{}", config.node_host, config.node_port);
    let sync = SyncManager::new(
        SyncManagerConfig {
            rpc: NodeRpcConfig {
                host: config.node_host.clone(),
                port: config.node_port,
                ..NodeRpcConfig::default()
            },
            ..SyncManagerConfig::default()
        },
        bus.clone(),
        alerts.clone(),
    );
    let tasks = TaskSupervisor::new(bus.clone(), shutdown.clone());
    let tokens = TokenStore::new();
    let backup = BackupManager::new(&config.project_root);
    let update = UpdatePipeline::new(
        catalog.clone(),
        runtime.clone(),
        monitor.clone(),
        store.clone(),
        backup.clone(),
        bus.clone(),
        UpdatePipelineConfig::default(),
    );

    let docker_memory_gb = runtime.runtime_info().await.ok().and_then(|i| i.memory_limit_gb);
    let host_capacity = measure_host(&config.project_root, docker_memory_gb);
    info!(
        target: LOG_TARGET,
        "host capacity: {:.1} GB RAM, {:.1} GB free disk, {} cpus",
        host_capacity.total_ram_gb,
        host_capacity.available_disk_gb,
        host_capacity.cpus
    );

    Context {
        catalog,
        store,
        runtime,
        monitor,
        sampler,
        alerts,
        sync,
        tasks,
        tokens,
        backup,
        update,
        bus,
        broadcaster,
        host_capacity,
        version: config.version,
        base_url: config.base_url,
        node_endpoint,
        started_at: chrono::Utc::now(),
        shutdown,
        shutdown_request,
    }
}

pub fn spawn_workers(ctx: &Context, shutdown: ShutdownSignal) {
    ctx.monitor.spawn(shutdown.clone());
    ctx.sampler
        .spawn(ctx.alerts.clone(), DEFAULT_SAMPLE_INTERVAL, shutdown.clone());
    ctx.broadcaster.spawn(shutdown.clone());
    ctx.tasks.spawn_cleanup_loop();
    ctx.tokens.spawn_sweeper(shutdown);
}

/// Re-registers monitoring for background tasks persisted before a restart.
/// Terminal entries stay in the state document as read-only records.
pub async fn restore_background_tasks(ctx: &Context) {
    let state = match ctx.store.read_wizard_state().await {
        Ok(state) => state,
        Err(err) => {
            warn!(target: LOG_TARGET, "could not read wizard state: {}", err);
            return;
        },
    };
    for task in &state.background_tasks {
        let resumable = matches!(task.status.as_str(), "pending" | "running" | "paused");
        if task.kind != "node-sync" || !resumable {
            continue;
        }
        match ctx
            .sync
            .start_background_sync(&ctx.tasks, &task.service_id, &task.service_id, None)
            .await
        {
            Ok(new_id) => info!(
                target: LOG_TARGET,
                "resumed background sync {} as {}",
                task.task_id,
                new_id
            ),
            Err(err) => warn!(target: LOG_TARGET, "could not resume {}: {}", task.task_id, err),
        }
    }
}

/// Writes the current task list into the wizard state document.
pub async fn persist_background_tasks(ctx: &Context) {
    let records = ctx.tasks.list(TaskFilter::default()).await;
    let mut state = match ctx.store.read_wizard_state().await {
        Ok(state) => state,
        Err(err) => {
            warn!(target: LOG_TARGET, "could not read wizard state: {}", err);
            return;
        },
    };
    state.background_tasks = records
        .into_iter()
        .map(|r| PersistedTask {
            task_id: r.task_id,
            kind: r.kind.to_string(),
            service_id: r.service_id,
            status: r.status.to_string(),
            progress_pct: r.progress_pct,
            metadata: r.metadata,
        })
        .collect();
    if let Err(err) = ctx.store.write_wizard_state(&state).await {
        warn!(target: LOG_TARGET, "could not persist wizard state: {}", err);
    }
}

fn measure_host(project_root: &Path, docker_memory_gb: Option<f64>) -> HostCapacity {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu();
    system.refresh_disks_list();
    system.refresh_disks();

    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let mut available_disk_gb = 0.0;
    let mut best_depth = 0;
    for disk in system.disks() {
        let mount = disk.mount_point();
        if project_root.starts_with(mount) || mount == Path::new("/") {
            let depth = mount.components().count();
            if depth >= best_depth {
                best_depth = depth;
                available_disk_gb = disk.available_space() as f64 / GIB;
            }
        }
    }

    HostCapacity {
        total_ram_gb: system.total_memory() as f64 / GIB,
        available_disk_gb,
        docker_memory_gb,
        cpus: system.cpus().len() as f64,
    }
}
