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

//! Wires the core subsystems together for the dashboard controller and spawns
//! the periodic workers.

use kaspa_aio_core::{
    alerts::{AlertEngine, AlertThresholds},
    backup::BackupManager,
    catalog::ProfileCatalog,
    config_store::ConfigStore,
    events::{Broadcaster, BroadcasterConfig, EventBus},
    monitor::{MonitorConfig, MonitorService},
    resources::{ResourceSampler, DEFAULT_SAMPLE_INTERVAL},
    runtime::{ComposeRuntime, ContainerRuntime},
    sync::{NodeRpcConfig, SyncManager, SyncManagerConfig},
    tasks::TaskSupervisor,
    update::{UpdatePipeline, UpdatePipelineConfig},
};
use kaspa_aio_shutdown::ShutdownSignal;
use std::{path::PathBuf, sync::Arc, time::Duration};

pub struct DashboardConfig {
    pub project_root: PathBuf,
    pub node_host: String,
    pub node_port: u16,
    pub update_interval: Option<Duration>,
    pub hidden_tab_interval: Option<Duration>,
    pub wallet_rpc_url: String,
    /// Services spared by an emergency stop. The core node and the reverse
    /// proxy stay up unless configured otherwise.
    pub emergency_allowlist: Vec<String>,
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
    pub backup: BackupManager,
    pub update: UpdatePipeline,
    pub bus: EventBus,
    pub broadcaster: Broadcaster,
    pub wallet_rpc_url: String,
    pub emergency_allowlist: Vec<String>,
    pub http: reqwest::Client,
    pub shutdown: ShutdownSignal,
}

pub fn build(config: DashboardConfig, shutdown: ShutdownSignal) -> Context {
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

    let mut broadcaster_config = BroadcasterConfig::default();
    if let Some(interval) = config.update_interval {
        broadcaster_config.services_interval = interval;
        broadcaster_config.resources_interval = interval;
    }
    if let Some(interval) = config.hidden_tab_interval {
        broadcaster_config.hidden_resources_interval = interval;
    }
    let broadcaster = Broadcaster::new(monitor.clone(), sampler.clone(), bus.clone(), broadcaster_config);

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

    Context {
        catalog,
        store,
        runtime,
        monitor,
        sampler,
        alerts,
        sync,
        tasks,
        backup,
        update,
        bus,
        broadcaster,
        wallet_rpc_url: config.wallet_rpc_url,
        emergency_allowlist: config.emergency_allowlist,
        http: reqwest::Client::new(),
        shutdown,
    }
}

pub fn spawn_workers(ctx: &Context, shutdown: ShutdownSignal) {
    ctx.monitor.spawn(shutdown.clone());
    ctx.sampler
        .spawn(ctx.alerts.clone(), DEFAULT_SAMPLE_INTERVAL, shutdown.clone());
    ctx.broadcaster.spawn(shutdown);
    ctx.tasks.spawn_cleanup_loop();
}
