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

//! # Service monitor & controller
//!
//! Runs the periodic observation cycle over every catalog service and offers
//! dependency-aware start/stop/restart. Fleet mutations are serialized by a
//! fleet-wide lock; observation reads never wait on it.

mod config;
pub mod probes;
mod service;
mod state;

pub use self::{
    config::MonitorConfig,
    service::MonitorService,
    state::{HealthState, ServiceObservation, ServiceState},
};

use crate::{
    error::{BoundaryError, ErrorKind},
    graph,
    runtime::RuntimeError,
};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    CircularDependency(#[from] graph::CircularDependency),
    #[error("Service `{service}` requires `{prerequisite}` to be healthy first")]
    PrerequisiteNotReady { service: String, prerequisite: String },
    #[error("Service `{service}` did not become healthy within {deadline:?}")]
    StartupDeadlineExceeded { service: String, deadline: Duration },
    #[error("Partial start: `{failed}` did not come up; started {started:?}, not attempted {remaining:?}")]
    PartialStart {
        started: Vec<String>,
        failed: String,
        remaining: Vec<String>,
    },
    #[error("Dependent services are still running: {}", .0.join(", "))]
    DependentsRunning(Vec<String>),
    #[error("Unknown profile `{0}`")]
    UnknownProfile(String),
    #[error("Unknown service `{0}`")]
    UnknownService(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Operation cancelled")]
    Cancelled,
}

impl BoundaryError for MonitorError {
    fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::CircularDependency(_) => ErrorKind::Validation,
            MonitorError::PrerequisiteNotReady { .. } => ErrorKind::PrerequisiteNotMet,
            MonitorError::StartupDeadlineExceeded { .. } => ErrorKind::StartupDeadlineExceeded,
            MonitorError::PartialStart { .. } => ErrorKind::PartialStart,
            MonitorError::DependentsRunning(_) => ErrorKind::DependentsRunning,
            MonitorError::UnknownProfile(_) | MonitorError::UnknownService(_) => ErrorKind::Validation,
            MonitorError::Runtime(err) => err.kind(),
            MonitorError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
