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

use crate::runtime::ContainerState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    Exited,
}

impl From<ContainerState> for ServiceState {
    fn from(state: ContainerState) -> Self {
        match state {
            ContainerState::Running | ContainerState::Restarting => ServiceState::Running,
            ContainerState::Exited | ContainerState::Dead => ServiceState::Exited,
            ContainerState::Created | ContainerState::Paused => ServiceState::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

/// The monitor's view of one service. Only the monitor mutates these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceObservation {
    pub service_id: String,
    pub state: ServiceState,
    pub health: HealthState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_checked: DateTime<Utc>,
    pub last_error: Option<String>,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
}

#[derive(Default)]
pub(super) struct ObservationTable {
    observations: HashMap<String, ServiceObservation>,
    failure_counts: HashMap<String, usize>,
}

impl ObservationTable {
    /// Applies a raw observation, gating the Healthy → Unhealthy transition
    /// behind `retry_attempts` consecutive failures. Returns the previous
    /// observation, the effective one, and whether anything reportable
    /// changed.
    pub fn apply(
        &mut self,
        mut candidate: ServiceObservation,
        retry_attempts: usize,
    ) -> (Option<ServiceObservation>, ServiceObservation, bool) {
        let previous = self.observations.get(&candidate.service_id).cloned();

        if candidate.health == HealthState::Unhealthy {
            let count = self
                .failure_counts
                .entry(candidate.service_id.clone())
                .and_modify(|c| *c += 1)
                .or_insert(1);
            let was_healthy = previous.as_ref().map(|p| p.health == HealthState::Healthy).unwrap_or(false);
            if was_healthy && *count < retry_attempts {
                // Tolerate the blip; keep reporting Healthy until the budget
                // is spent. The error is still recorded.
                candidate.health = HealthState::Healthy;
            }
        } else {
            self.failure_counts.remove(&candidate.service_id);
        }

        let changed = previous
            .as_ref()
            .map(|p| p.state != candidate.state || p.health != candidate.health || p.version != candidate.version)
            .unwrap_or(true);
        self.observations.insert(candidate.service_id.clone(), candidate.clone());
        (previous, candidate, changed)
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceObservation> {
        self.observations.get(service_id)
    }

    pub fn all(&self) -> Vec<ServiceObservation> {
        let mut observations: Vec<_> = self.observations.values().cloned().collect();
        observations.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        observations
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn obs(service: &str, health: HealthState) -> ServiceObservation {
        ServiceObservation {
            service_id: service.to_string(),
            state: ServiceState::Running,
            health,
            started_at: None,
            last_checked: Utc::now(),
            last_error: None,
            version: None,
            uptime_secs: None,
        }
    }

    #[test]
    fn unhealthy_flips_only_after_the_retry_budget() {
        let mut table = ObservationTable::default();
        table.apply(obs("svc", HealthState::Healthy), 3);

        let (_, first, changed) = table.apply(obs("svc", HealthState::Unhealthy), 3);
        assert_eq!(first.health, HealthState::Healthy);
        assert!(!changed);
        let (_, second, _) = table.apply(obs("svc", HealthState::Unhealthy), 3);
        assert_eq!(second.health, HealthState::Healthy);
        let (_, third, changed) = table.apply(obs("svc", HealthState::Unhealthy), 3);
        assert_eq!(third.health, HealthState::Unhealthy);
        assert!(changed);
    }

    #[test]
    fn recovery_is_immediate_and_resets_the_budget() {
        let mut table = ObservationTable::default();
        table.apply(obs("svc", HealthState::Healthy), 3);
        table.apply(obs("svc", HealthState::Unhealthy), 3);
        table.apply(obs("svc", HealthState::Unhealthy), 3);

        let (_, recovered, _) = table.apply(obs("svc", HealthState::Healthy), 3);
        assert_eq!(recovered.health, HealthState::Healthy);

        // The budget starts over after a success.
        let (_, after, _) = table.apply(obs("svc", HealthState::Unhealthy), 3);
        assert_eq!(after.health, HealthState::Healthy);
    }

    #[test]
    fn a_service_first_seen_unhealthy_reports_unhealthy() {
        let mut table = ObservationTable::default();
        let (previous, first, changed) = table.apply(obs("svc", HealthState::Unhealthy), 3);
        assert!(previous.is_none());
        assert_eq!(first.health, HealthState::Unhealthy);
        assert!(changed);
    }
}
