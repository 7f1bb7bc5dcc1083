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

//! An in-memory `ContainerRuntime` for tests. Containers flip state on
//! `up`/`stop`/`restart`; per-service engine health is scriptable so failure
//! paths (startup deadlines, rollback) can be exercised.

use super::{ContainerInfo, ContainerRuntime, ContainerState, ContainerUsage, EngineHealth, RuntimeError, RuntimeInfo};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;

#[derive(Default)]
struct MockState {
    containers: HashMap<String, ContainerInfo>,
    health_overrides: HashMap<String, EngineHealth>,
    images: HashMap<String, String>,
    calls: Vec<String>,
    unavailable: bool,
}

#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails with `RuntimeError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Scripted engine health for a service; applied whenever it is running.
    pub fn set_engine_health(&self, service_id: &str, health: EngineHealth) {
        let mut state = self.state.lock().unwrap();
        state.health_overrides.insert(service_id.to_string(), health);
        if let Some(container) = state.containers.get_mut(service_id) {
            container.engine_health = Some(health);
        }
    }

    pub fn set_image(&self, service_id: &str, image: &str) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(service_id.to_string(), image.to_string());
        if let Some(container) = state.containers.get_mut(service_id) {
            container.image = image.to_string();
        }
    }

    /// The mutating calls made so far, e.g. `up kaspa-node`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn is_running(&self, service_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(service_id)
            .map(|c| c.state.is_running())
            .unwrap_or(false)
    }

    fn fail_if_unavailable(&self) -> Result<(), RuntimeError> {
        if self.state.lock().unwrap().unavailable {
            return Err(RuntimeError::Unavailable("mock runtime down".to_string()));
        }
        Ok(())
    }

    fn bring_up(state: &mut MockState, service_id: &str) {
        let health = state.health_overrides.get(service_id).copied().unwrap_or(EngineHealth::Healthy);
        let image = state
            .images
            .get(service_id)
            .cloned()
            .unwrap_or_else(|| format!("mock/{}:latest", service_id));
        state.containers.insert(
            service_id.to_string(),
            ContainerInfo {
                service_id: service_id.to_string(),
                container_name: service_id.to_string(),
                state: ContainerState::Running,
                started_at: Some(Utc::now()),
                image,
                engine_health: Some(health),
            },
        );
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.fail_if_unavailable()?;
        let state = self.state.lock().unwrap();
        let mut containers: Vec<_> = state.containers.values().cloned().collect();
        containers.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(containers)
    }

    async fn usage(&self, service_id: &str) -> Result<ContainerUsage, RuntimeError> {
        self.fail_if_unavailable()?;
        let state = self.state.lock().unwrap();
        if !state.containers.contains_key(service_id) {
            return Err(RuntimeError::UnknownService(service_id.to_string()));
        }
        Ok(ContainerUsage {
            cpu_pct: 1.0,
            mem_bytes: 64 * 1024 * 1024,
            mem_limit_bytes: Some(1024 * 1024 * 1024),
        })
    }

    async fn up(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
        self.fail_if_unavailable()?;
        let mut state = self.state.lock().unwrap();
        for id in service_ids {
            state.calls.push(format!("up {}", id));
            Self::bring_up(&mut state, id);
        }
        Ok(())
    }

    async fn stop(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
        self.fail_if_unavailable()?;
        let mut state = self.state.lock().unwrap();
        for id in service_ids {
            state.calls.push(format!("stop {}", id));
            if let Some(container) = state.containers.get_mut(id) {
                container.state = ContainerState::Exited;
                container.engine_health = None;
            }
        }
        Ok(())
    }

    async fn restart(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
        self.fail_if_unavailable()?;
        let mut state = self.state.lock().unwrap();
        for id in service_ids {
            state.calls.push(format!("restart {}", id));
            Self::bring_up(&mut state, id);
        }
        Ok(())
    }

    async fn logs(&self, service_id: &str, tail: usize) -> Result<String, RuntimeError> {
        self.fail_if_unavailable()?;
        Ok(format!("{} log tail {}", service_id, tail))
    }

    async fn logs_follow(&self, service_id: &str, _tail: usize) -> Result<mpsc::Receiver<String>, RuntimeError> {
        self.fail_if_unavailable()?;
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.send(format!("{} follow start", service_id)).await;
        Ok(rx)
    }

    async fn runtime_info(&self) -> Result<RuntimeInfo, RuntimeError> {
        self.fail_if_unavailable()?;
        let state = self.state.lock().unwrap();
        Ok(RuntimeInfo {
            engine_version: "24.0.0-mock".to_string(),
            compose_version: "2.24.0-mock".to_string(),
            running: true,
            container_count: state.containers.len() as u64,
            image_count: state.images.len() as u64,
            memory_limit_gb: Some(8.0),
        })
    }
}
