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

//! # Container runtime adapter
//!
//! The capability boundary between the controller and the container engine.
//! `ContainerRuntime` only translates intent into runtime calls; no business
//! logic lives behind it. The production implementation drives the
//! `docker` / `docker compose` CLI.

mod compose;
mod error;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mock;

pub use self::{compose::ComposeRuntime, error::RuntimeError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContainerState {
    Running,
    Restarting,
    Paused,
    Created,
    Exited,
    Dead,
}

impl ContainerState {
    pub fn is_running(self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Restarting)
    }
}

/// Health as reported by the engine's own healthcheck, when one is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineHealth {
    Healthy,
    Unhealthy,
    Starting,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    /// The compose service name, which is the catalog service id.
    pub service_id: String,
    pub container_name: String,
    pub state: ContainerState,
    pub started_at: Option<DateTime<Utc>>,
    pub image: String,
    pub engine_health: Option<EngineHealth>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUsage {
    pub cpu_pct: f64,
    pub mem_bytes: u64,
    pub mem_limit_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub engine_version: String,
    pub compose_version: String,
    pub running: bool,
    pub container_count: u64,
    pub image_count: u64,
    pub memory_limit_gb: Option<f64>,
}

/// Abstract surface over the container runtime. Mutating operations are
/// serialized per service by the implementation.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;

    async fn usage(&self, service_id: &str) -> Result<ContainerUsage, RuntimeError>;

    /// Creates and starts the given services. Startup ordering is the caller's
    /// responsibility.
    async fn up(&self, service_ids: &[String]) -> Result<(), RuntimeError>;

    async fn stop(&self, service_ids: &[String]) -> Result<(), RuntimeError>;

    async fn restart(&self, service_ids: &[String]) -> Result<(), RuntimeError>;

    async fn logs(&self, service_id: &str, tail: usize) -> Result<String, RuntimeError>;

    /// Follows a service's log stream. The receiver ends when the stream is
    /// closed on the runtime side or the handle is dropped.
    async fn logs_follow(&self, service_id: &str, tail: usize) -> Result<mpsc::Receiver<String>, RuntimeError>;

    async fn runtime_info(&self) -> Result<RuntimeInfo, RuntimeError>;
}

impl std::str::FromStr for ContainerState {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" | "up" => Ok(ContainerState::Running),
            "restarting" => Ok(ContainerState::Restarting),
            "paused" => Ok(ContainerState::Paused),
            "created" => Ok(ContainerState::Created),
            "exited" => Ok(ContainerState::Exited),
            "dead" => Ok(ContainerState::Dead),
            other => Err(RuntimeError::UnexpectedOutput(format!("unknown container state `{}`", other))),
        }
    }
}
