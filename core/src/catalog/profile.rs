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

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum_macros::{Display, EnumString};

/// A named bundle of services deployed together. Immutable once the catalog is
/// loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub profile_id: String,
    pub display_name: String,
    pub category: ProfileCategory,
    /// Declaration order is preserved; it is not a startup order.
    pub services: Vec<String>,
    /// Environment keys owned by this profile.
    pub config_keys: BTreeSet<String>,
    /// Any-of satisfaction: at least one of these profiles must be selected
    /// alongside this one.
    pub prerequisites: BTreeSet<String>,
    pub conflicts: BTreeSet<String>,
    /// Startup phase 1..=3 of this profile's services, unless a service
    /// declares its own phase.
    pub startup_order: u8,
    /// Services instantiated once even when referenced by several profiles.
    pub shared_services: BTreeSet<String>,
}

impl Profile {
    pub fn new(profile_id: &str, display_name: &str, category: ProfileCategory, startup_order: u8) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            display_name: display_name.to_string(),
            category,
            services: Vec::new(),
            config_keys: BTreeSet::new(),
            prerequisites: BTreeSet::new(),
            conflicts: BTreeSet::new(),
            startup_order,
            shared_services: BTreeSet::new(),
        }
    }

    pub fn with_services(mut self, services: &[&str]) -> Self {
        self.services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_config_keys(mut self, keys: &[&str]) -> Self {
        self.config_keys = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_prerequisites(mut self, any_of: &[&str]) -> Self {
        self.prerequisites = any_of.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_conflicts(mut self, conflicts: &[&str]) -> Self {
        self.conflicts = conflicts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_shared_services(mut self, shared: &[&str]) -> Self {
        self.shared_services = shared.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProfileCategory {
    Node,
    Application,
    Indexer,
    Mining,
    Storage,
}

/// How the monitor decides whether a running container is healthy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HealthProbe {
    Http { port: u16, path: String },
    JsonRpc { port: u16, method: String },
    Tcp { port: u16 },
    /// Fall back to the runtime's own health report, else Unknown.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFootprint {
    pub min_ram_gb: f64,
    pub rec_ram_gb: f64,
    pub min_disk_gb: f64,
    pub min_cpus: f64,
}

impl ResourceFootprint {
    pub const fn new(min_ram_gb: f64, rec_ram_gb: f64, min_disk_gb: f64, min_cpus: f64) -> Self {
        Self {
            min_ram_gb,
            rec_ram_gb,
            min_disk_gb,
            min_cpus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub service_id: String,
    /// The container name may differ from the service id.
    pub container_name: String,
    pub owning_profile_id: String,
    pub health_probe: HealthProbe,
    pub critical: bool,
    pub declared_dependencies: BTreeSet<String>,
    pub resource_footprint: ResourceFootprint,
    pub default_ports: BTreeMap<String, u16>,
    /// `repository:tag`
    pub image_ref: String,
    /// Overrides the owning profile's startup order for this service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_phase: Option<u8>,
}

impl ServiceDefinition {
    pub fn new(service_id: &str, owning_profile_id: &str, image_ref: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            container_name: service_id.to_string(),
            owning_profile_id: owning_profile_id.to_string(),
            health_probe: HealthProbe::None,
            critical: false,
            declared_dependencies: BTreeSet::new(),
            resource_footprint: ResourceFootprint::default(),
            default_ports: BTreeMap::new(),
            image_ref: image_ref.to_string(),
            startup_phase: None,
        }
    }

    pub fn with_container_name(mut self, name: &str) -> Self {
        self.container_name = name.to_string();
        self
    }

    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.health_probe = probe;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.declared_dependencies = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_footprint(mut self, footprint: ResourceFootprint) -> Self {
        self.resource_footprint = footprint;
        self
    }

    pub fn with_port(mut self, role: &str, port: u16) -> Self {
        self.default_ports.insert(role.to_string(), port);
        self
    }

    pub fn with_startup_phase(mut self, phase: u8) -> Self {
        self.startup_phase = Some(phase);
        self
    }

    /// The tag portion of `image_ref`, used as the service version. A colon
    /// inside a registry host:port is not a tag separator.
    pub fn image_tag(&self) -> Option<&str> {
        match self.image_ref.rsplit_once(':') {
            Some((_, tag)) if !tag.contains('/') => Some(tag),
            _ => None,
        }
    }

    /// The repository portion of `image_ref`.
    pub fn image_repository(&self) -> &str {
        match self.image_ref.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => repo,
            _ => &self.image_ref,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn image_tag_splits_on_the_last_colon() {
        let def = ServiceDefinition::new("node", "kaspa-node", "registry:5000/kaspad:v0.12.19");
        assert_eq!(def.image_tag(), Some("v0.12.19"));
        assert_eq!(def.image_repository(), "registry:5000/kaspad");
    }

    #[test]
    fn untagged_image_has_no_tag() {
        let def = ServiceDefinition::new("node", "kaspa-node", "kaspad");
        assert_eq!(def.image_tag(), None);
        assert_eq!(def.image_repository(), "kaspad");
    }
}
