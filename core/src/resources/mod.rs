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

//! # Resource sampler
//!
//! Periodic host samples (CPU, memory, disk, load average) plus optional
//! per-service usage from the container runtime, kept in a time-ordered ring.

use crate::{
    alerts::AlertEngine,
    runtime::{ContainerRuntime, ContainerUsage},
};
use chrono::{DateTime, Utc};
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use serde::Serialize;
use std::{
    collections::{BTreeMap, VecDeque},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tokio::sync::{Mutex, RwLock};

const LOG_TARGET: &str = "aio::resources";

/// One hour of history at the default 5 second cadence.
pub const HISTORY_CAPACITY: usize = 720;
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub load_avg: [f64; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_service: Option<BTreeMap<String, ContainerUsage>>,
    pub taken_at: DateTime<Utc>,
}

struct SamplerInner {
    system: Mutex<System>,
    history: RwLock<VecDeque<ResourceSample>>,
    runtime: Arc<dyn ContainerRuntime>,
    disk_path: PathBuf,
}

#[derive(Clone)]
pub struct ResourceSampler {
    inner: Arc<SamplerInner>,
}

impl ResourceSampler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, disk_path: PathBuf) -> Self {
        Self {
            inner: Arc::new(SamplerInner {
                system: Mutex::new(System::new()),
                history: RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
                runtime,
                disk_path,
            }),
        }
    }

    /// Takes one sample and appends it to the ring.
    pub async fn sample(&self) -> ResourceSample {
        let (cpu_pct, mem_pct, disk_pct, load_avg) = {
            let mut system = self.inner.system.lock().await;
            system.refresh_cpu();
            system.refresh_memory();
            system.refresh_disks_list();
            system.refresh_disks();

            let cpu_pct = system.global_cpu_info().cpu_usage() as f64;
            let mem_pct = if system.total_memory() > 0 {
                system.used_memory() as f64 / system.total_memory() as f64 * 100.0
            } else {
                0.0
            };
            let disk_pct = disk_usage_pct(&system, &self.inner.disk_path);
            let load = system.load_average();
            (cpu_pct, mem_pct, disk_pct, [load.one, load.five, load.fifteen])
        };

        let per_service = self.collect_per_service().await;
        let sample = ResourceSample {
            cpu_pct,
            mem_pct,
            disk_pct,
            load_avg,
            per_service,
            taken_at: Utc::now(),
        };

        let mut history = self.inner.history.write().await;
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(sample.clone());
        sample
    }

    async fn collect_per_service(&self) -> Option<BTreeMap<String, ContainerUsage>> {
        let containers = match self.inner.runtime.list_containers().await {
            Ok(containers) => containers,
            Err(err) => {
                debug!(target: LOG_TARGET, "per-service usage unavailable: {}", err);
                return None;
            },
        };
        let mut usage = BTreeMap::new();
        for container in containers.iter().filter(|c| c.state.is_running()) {
            match self.inner.runtime.usage(&container.service_id).await {
                Ok(u) => {
                    usage.insert(container.service_id.clone(), u);
                },
                Err(err) => {
                    debug!(target: LOG_TARGET, "usage for {} failed: {}", container.service_id, err);
                },
            }
        }
        Some(usage)
    }

    pub async fn latest(&self) -> Option<ResourceSample> {
        self.inner.history.read().await.back().cloned()
    }

    pub async fn history(&self, limit: usize) -> Vec<ResourceSample> {
        let history = self.inner.history.read().await;
        history.iter().rev().take(limit).rev().cloned().collect()
    }

    /// Periodic worker: sample, feed the alert engine.
    pub fn spawn(&self, alerts: AlertEngine, interval: Duration, mut shutdown: ShutdownSignal) {
        let sampler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sample = sampler.sample().await;
                        alerts.on_resource_sample(&sample).await;
                    },
                    _ = &mut shutdown => {
                        debug!(target: LOG_TARGET, "resource sampler shut down");
                        break;
                    },
                }
            }
        });
    }
}

/// Usage of the disk whose mount point is the longest prefix of `path`.
fn disk_usage_pct(system: &System, path: &std::path::Path) -> f64 {
    let mut best: Option<(usize, f64)> = None;
    for disk in system.disks() {
        let mount = disk.mount_point();
        if path.starts_with(mount) && disk.total_space() > 0 {
            let depth = mount.components().count();
            let pct = (disk.total_space() - disk.available_space()) as f64 / disk.total_space() as f64 * 100.0;
            if best.map(|(d, _)| depth > d).unwrap_or(true) {
                best = Some((depth, pct));
            }
        }
    }
    best.map(|(_, pct)| pct).unwrap_or(0.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::mock::MockRuntime;

    fn sampler() -> (ResourceSampler, MockRuntime) {
        let runtime = MockRuntime::new();
        let sampler = ResourceSampler::new(Arc::new(runtime.clone()), PathBuf::from("/"));
        (sampler, runtime)
    }

    #[tokio::test]
    async fn samples_append_to_history() {
        let (sampler, _runtime) = sampler();
        assert!(sampler.latest().await.is_none());
        let sample = sampler.sample().await;
        assert!(sample.mem_pct >= 0.0 && sample.mem_pct <= 100.0);
        assert_eq!(sampler.history(10).await.len(), 1);
        sampler.sample().await;
        assert_eq!(sampler.history(10).await.len(), 2);
    }

    #[tokio::test]
    async fn per_service_usage_covers_running_containers() {
        let (sampler, runtime) = sampler();
        runtime.up(&["kaspa-node".to_string(), "nginx".to_string()]).await.unwrap();
        runtime.stop(&["nginx".to_string()]).await.unwrap();

        let sample = sampler.sample().await;
        let per_service = sample.per_service.unwrap();
        assert!(per_service.contains_key("kaspa-node"));
        assert!(!per_service.contains_key("nginx"));
    }

    #[tokio::test]
    async fn runtime_outage_leaves_host_metrics_intact() {
        let (sampler, runtime) = sampler();
        runtime.set_unavailable(true);
        let sample = sampler.sample().await;
        assert!(sample.per_service.is_none());
    }
}
