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

//! Persisted installation and wizard state documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationState {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_profiles: Vec<String>,
    #[serde(default)]
    pub services: Vec<InstalledService>,
    /// `service id -> version` updates the operator chose to skip.
    #[serde(default)]
    pub skipped_updates: BTreeMap<String, String>,
}

impl InstallationState {
    pub fn service_version(&self, name: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.version.as_str())
    }

    pub fn record_service_version(&mut self, name: &str, version: &str, status: &str) {
        match self.services.iter_mut().find(|s| s.name == name) {
            Some(service) => {
                service.version = version.to_string();
                service.status = status.to_string();
            },
            None => self.services.push(InstalledService {
                name: name.to_string(),
                version: version.to_string(),
                status: status.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledService {
    pub name: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub phase: String,
    /// Background tasks re-registered on restart; terminal entries survive as
    /// read-only records.
    #[serde(default)]
    pub background_tasks: Vec<PersistedTask>,
    #[serde(default)]
    pub sync_operations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTask {
    pub task_id: String,
    pub kind: String,
    pub service_id: String,
    pub status: String,
    pub progress_pct: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn installation_state_round_trips_through_json() {
        let mut state = InstallationState::default();
        state.version = "0.4.1".to_string();
        state.active_profiles = vec!["kaspa-node".to_string()];
        state.record_service_version("kaspa-node", "v0.12.19", "running");

        let json = serde_json::to_string(&state).unwrap();
        let back: InstallationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.service_version("kaspa-node"), Some("v0.12.19"));
    }

    #[test]
    fn record_service_version_updates_in_place() {
        let mut state = InstallationState::default();
        state.record_service_version("nginx", "1.25", "running");
        state.record_service_version("nginx", "1.26", "running");
        assert_eq!(state.services.len(), 1);
        assert_eq!(state.service_version("nginx"), Some("1.26"));
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let state: InstallationState = serde_json::from_str("{}").unwrap();
        assert!(state.active_profiles.is_empty());
        let wizard: WizardState = serde_json::from_str("{}").unwrap();
        assert!(wizard.background_tasks.is_empty());
    }
}
