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

//! # Profile catalog
//!
//! The static, loaded-once registry of deployable profiles and their services.
//! Declarations are validated on load; the catalog is immutable afterwards.
//! Legacy profile identifiers resolve through an alias map so that lookups made
//! with an old id transparently reach the current profile.

mod bundled;
mod profile;

pub use self::profile::{HealthProbe, Profile, ProfileCategory, ResourceFootprint, ServiceDefinition};

use crate::graph;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate profile id `{0}`")]
    DuplicateProfile(String),
    #[error("Duplicate service id `{0}`")]
    DuplicateService(String),
    #[error("Duplicate container name `{0}`")]
    DuplicateContainer(String),
    #[error("Profile `{profile}` references unknown service `{service}`")]
    UnknownServiceRef { profile: String, service: String },
    #[error("Profile `{profile}` declares shared service `{service}` it does not contain")]
    SharedServiceNotContained { profile: String, service: String },
    #[error("Service `{service}` depends on unknown service `{dependency}`")]
    UnknownDependency { service: String, dependency: String },
    #[error("Profile `{profile}` references unknown profile `{reference}`")]
    UnknownProfileRef { profile: String, reference: String },
    #[error("Conflict between `{a}` and `{b}` is not declared on both sides")]
    AsymmetricConflict { a: String, b: String },
    #[error("Profile `{profile}` has startup order {order}, expected 1..=3")]
    InvalidStartupOrder { profile: String, order: u8 },
    #[error("Alias `{alias}` points to unknown profile `{target}`")]
    UnknownAliasTarget { alias: String, target: String },
    #[error("Service dependency graph is cyclic: {0}")]
    DependencyCycle(#[from] graph::CircularDependency),
    #[error("Profile prerequisite graph is cyclic: {}", .0.join(", "))]
    PrerequisiteCycle(Vec<String>),
}

impl crate::error::BoundaryError for CatalogError {
    fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::Validation
    }
}

#[derive(Debug)]
pub struct ProfileCatalog {
    profiles: HashMap<String, Profile>,
    services: HashMap<String, ServiceDefinition>,
    aliases: HashMap<String, String>,
    containers: HashMap<String, String>,
    ordered_profile_ids: Vec<String>,
}

impl ProfileCatalog {
    /// The catalog shipped with this build.
    pub fn bundled() -> Self {
        bundled::catalog().expect("bundled catalog failed validation")
    }

    /// Validates and indexes a set of declarations.
    pub fn load(
        profiles: Vec<Profile>,
        services: Vec<ServiceDefinition>,
        aliases: Vec<(String, String)>,
    ) -> Result<Self, CatalogError> {
        let mut profile_map: HashMap<String, Profile> = HashMap::new();
        let mut ordered_profile_ids = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if profile.startup_order < 1 || profile.startup_order > 3 {
                return Err(CatalogError::InvalidStartupOrder {
                    profile: profile.profile_id.clone(),
                    order: profile.startup_order,
                });
            }
            ordered_profile_ids.push(profile.profile_id.clone());
            if profile_map.insert(profile.profile_id.clone(), profile).is_some() {
                let id = ordered_profile_ids.pop().unwrap();
                return Err(CatalogError::DuplicateProfile(id));
            }
        }

        let mut service_map: HashMap<String, ServiceDefinition> = HashMap::new();
        let mut containers: HashMap<String, String> = HashMap::new();
        for service in services {
            if service_map.contains_key(&service.service_id) {
                return Err(CatalogError::DuplicateService(service.service_id));
            }
            if containers.contains_key(&service.container_name) {
                return Err(CatalogError::DuplicateContainer(service.container_name));
            }
            containers.insert(service.container_name.clone(), service.service_id.clone());
            service_map.insert(service.service_id.clone(), service);
        }

        for profile in profile_map.values() {
            for service in &profile.services {
                if !service_map.contains_key(service) {
                    return Err(CatalogError::UnknownServiceRef {
                        profile: profile.profile_id.clone(),
                        service: service.clone(),
                    });
                }
            }
            for shared in &profile.shared_services {
                if !profile.services.contains(shared) {
                    return Err(CatalogError::SharedServiceNotContained {
                        profile: profile.profile_id.clone(),
                        service: shared.clone(),
                    });
                }
            }
            for reference in profile.prerequisites.iter().chain(profile.conflicts.iter()) {
                if !profile_map.contains_key(reference) {
                    return Err(CatalogError::UnknownProfileRef {
                        profile: profile.profile_id.clone(),
                        reference: reference.clone(),
                    });
                }
            }
            for conflict in &profile.conflicts {
                let peer = &profile_map[conflict];
                if !peer.conflicts.contains(&profile.profile_id) {
                    return Err(CatalogError::AsymmetricConflict {
                        a: profile.profile_id.clone(),
                        b: conflict.clone(),
                    });
                }
            }
        }

        for service in service_map.values() {
            for dependency in &service.declared_dependencies {
                if !service_map.contains_key(dependency) {
                    return Err(CatalogError::UnknownDependency {
                        service: service.service_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        // Both declared graphs must be acyclic.
        let all_services: BTreeSet<String> = service_map.keys().cloned().collect();
        let deps = service_map
            .values()
            .map(|s| (s.service_id.clone(), s.declared_dependencies.clone()))
            .collect();
        graph::topological_sort(&all_services, &deps)?;

        let all_profiles: BTreeSet<String> = profile_map.keys().cloned().collect();
        let prereqs = profile_map
            .values()
            .map(|p| (p.profile_id.clone(), p.prerequisites.clone()))
            .collect();
        graph::topological_sort(&all_profiles, &prereqs).map_err(|cycle| CatalogError::PrerequisiteCycle(cycle.0))?;

        let mut alias_map = HashMap::new();
        for (alias, target) in aliases {
            if !profile_map.contains_key(&target) {
                return Err(CatalogError::UnknownAliasTarget { alias, target });
            }
            alias_map.insert(alias, target);
        }

        Ok(Self {
            profiles: profile_map,
            services: service_map,
            aliases: alias_map,
            containers,
            ordered_profile_ids,
        })
    }

    /// Resolves a legacy identifier to its current one; unknown ids pass through.
    pub fn resolve_profile_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(|s| s.as_str()).unwrap_or(id)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.ordered_profile_ids.iter().map(move |id| &self.profiles[id])
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    pub fn get_profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.get(self.resolve_profile_id(id))
    }

    pub fn get_service(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.get(id)
    }

    pub fn find_by_container(&self, container_name: &str) -> Option<&ServiceDefinition> {
        self.containers.get(container_name).and_then(|id| self.services.get(id))
    }

    /// Dependency map over all declared services, for ordering operations.
    pub fn dependency_map(&self) -> HashMap<String, BTreeSet<String>> {
        self.services
            .values()
            .map(|s| (s.service_id.clone(), s.declared_dependencies.clone()))
            .collect()
    }

    /// Services that declare a dependency on `service_id`.
    pub fn dependents_of(&self, service_id: &str) -> Vec<&ServiceDefinition> {
        let mut dependents: Vec<_> = self
            .services
            .values()
            .filter(|s| s.declared_dependencies.contains(service_id))
            .collect();
        dependents.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        dependents
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn minimal_service(id: &str, profile: &str) -> ServiceDefinition {
        ServiceDefinition::new(id, profile, &format!("example/{}:1.0.0", id))
    }

    #[test]
    fn bundled_catalog_is_valid() {
        let catalog = ProfileCatalog::bundled();
        assert!(catalog.get_profile("kaspa-node").is_some());
        assert!(catalog.get_service("kaspa-node").is_some());
    }

    #[test]
    fn aliases_resolve_transparently() {
        let catalog = ProfileCatalog::bundled();
        let via_alias = catalog.get_profile("kaspa-fullnode").unwrap();
        assert_eq!(via_alias.profile_id, "kaspa-node");
    }

    #[test]
    fn find_by_container_maps_back_to_the_service() {
        let catalog = ProfileCatalog::bundled();
        let service = catalog.find_by_container("kaspad").unwrap();
        assert_eq!(service.service_id, "kaspa-node");
    }

    #[test]
    fn dangling_service_reference_is_rejected() {
        let profile = Profile::new("p", "P", ProfileCategory::Node, 1).with_services(&["missing"]);
        let err = ProfileCatalog::load(vec![profile], vec![], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownServiceRef { .. }));
    }

    #[test]
    fn asymmetric_conflicts_are_rejected() {
        let a = Profile::new("a", "A", ProfileCategory::Node, 1)
            .with_services(&["svc-a"])
            .with_conflicts(&["b"]);
        let b = Profile::new("b", "B", ProfileCategory::Node, 1).with_services(&["svc-b"]);
        let services = vec![minimal_service("svc-a", "a"), minimal_service("svc-b", "b")];
        let err = ProfileCatalog::load(vec![a, b], services, vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::AsymmetricConflict { .. }));
    }

    #[test]
    fn dependency_cycles_are_rejected() {
        let profile = Profile::new("p", "P", ProfileCategory::Node, 1).with_services(&["x", "y"]);
        let x = minimal_service("x", "p").with_dependencies(&["y"]);
        let y = minimal_service("y", "p").with_dependencies(&["x"]);
        let err = ProfileCatalog::load(vec![profile], vec![x, y], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::DependencyCycle(_)));
    }

    #[test]
    fn startup_order_outside_range_is_rejected() {
        let profile = Profile::new("p", "P", ProfileCategory::Node, 4);
        let err = ProfileCatalog::load(vec![profile], vec![], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidStartupOrder { .. }));
    }

    #[test]
    fn alias_to_unknown_profile_is_rejected() {
        let err = ProfileCatalog::load(vec![], vec![], vec![("old".to_string(), "new".to_string())]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownAliasTarget { .. }));
    }
}
