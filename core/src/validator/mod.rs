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

//! # Selection validator
//!
//! Pure functions over a profile selection: prerequisite/conflict checking,
//! combined resource accounting with shared-service deduplication, and startup
//! ordering. Nothing here touches the runtime.

mod recommendations;

use crate::{
    catalog::{ProfileCatalog, ResourceFootprint},
    graph,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What the host can offer, for resource warnings. All figures optional at the
/// call site; omit the whole struct to skip host checks.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCapacity {
    pub total_ram_gb: f64,
    pub available_disk_gb: f64,
    pub docker_memory_gb: Option<f64>,
    pub cpus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SelectionError {
    #[serde(rename_all = "camelCase")]
    MissingPrerequisite { subject: String, requires_any_of: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Conflict { subject: String, conflicts_with: String },
    #[serde(rename_all = "camelCase")]
    UnknownProfile { subject: String },
}

impl SelectionError {
    fn kind_name(&self) -> &'static str {
        match self {
            SelectionError::MissingPrerequisite { .. } => "MissingPrerequisite",
            SelectionError::Conflict { .. } => "Conflict",
            SelectionError::UnknownProfile { .. } => "UnknownProfile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SelectionWarning {
    #[serde(rename_all = "camelCase")]
    BelowRecommendedRam { recommended_gb: f64, available_gb: f64 },
    #[serde(rename_all = "camelCase")]
    BelowRecommendedDisk { required_gb: f64, available_gb: f64 },
    #[serde(rename_all = "camelCase")]
    DockerMemoryBelowRequired { required_gb: f64, docker_memory_gb: f64 },
    #[serde(rename_all = "camelCase")]
    SharedResourcesUsed { services: Vec<String> },
}

impl SelectionWarning {
    fn kind_name(&self) -> &'static str {
        match self {
            SelectionWarning::BelowRecommendedRam { .. } => "BelowRecommendedRam",
            SelectionWarning::BelowRecommendedDisk { .. } => "BelowRecommendedDisk",
            SelectionWarning::DockerMemoryBelowRequired { .. } => "DockerMemoryBelowRequired",
            SelectionWarning::SharedResourcesUsed { .. } => "SharedResourcesUsed",
        }
    }
}

/// One row of the per-service breakdown. Every service appears exactly once
/// regardless of how many selected profiles reference it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContribution {
    pub service_id: String,
    pub footprint: ResourceFootprint,
    pub shared: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResources {
    pub min_ram_gb: f64,
    pub rec_ram_gb: f64,
    pub min_disk_gb: f64,
    pub min_cpus: f64,
    pub breakdown: Vec<ServiceContribution>,
    pub shared_services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupPhase {
    pub phase: u8,
    /// Topologically sorted within the phase.
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub valid: bool,
    pub errors: Vec<SelectionError>,
    pub warnings: Vec<SelectionWarning>,
    pub combined: CombinedResources,
    pub startup_order: Vec<StartupPhase>,
    pub recommendations: Vec<String>,
}

/// Validates a selection against the catalog rules.
pub fn validate(catalog: &ProfileCatalog, selection: &[String], host: Option<&HostCapacity>) -> SelectionReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Resolve aliases first; unknown ids are reported and excluded from the
    // rest of the computation.
    let mut resolved: BTreeSet<String> = BTreeSet::new();
    for id in selection {
        match catalog.get_profile(id) {
            Some(profile) => {
                resolved.insert(profile.profile_id.clone());
            },
            None => errors.push(SelectionError::UnknownProfile { subject: id.clone() }),
        }
    }

    for id in &resolved {
        let profile = catalog.get_profile(id).unwrap();
        if !profile.prerequisites.is_empty() && profile.prerequisites.iter().all(|p| !resolved.contains(p)) {
            errors.push(SelectionError::MissingPrerequisite {
                subject: id.clone(),
                requires_any_of: profile.prerequisites.iter().cloned().collect(),
            });
        }
        for conflict in profile.conflicts.iter().filter(|c| resolved.contains(*c)) {
            // Report each conflicting pair once.
            if id < conflict {
                errors.push(SelectionError::Conflict {
                    subject: id.clone(),
                    conflicts_with: conflict.clone(),
                });
            }
        }
    }

    let combined = calculate_combined(catalog, &resolved);
    if !combined.shared_services.is_empty() {
        warnings.push(SelectionWarning::SharedResourcesUsed {
            services: combined.shared_services.clone(),
        });
    }

    if let Some(host) = host {
        if host.total_ram_gb < combined.rec_ram_gb {
            warnings.push(SelectionWarning::BelowRecommendedRam {
                recommended_gb: combined.rec_ram_gb,
                available_gb: host.total_ram_gb,
            });
        }
        if host.available_disk_gb < combined.min_disk_gb {
            warnings.push(SelectionWarning::BelowRecommendedDisk {
                required_gb: combined.min_disk_gb,
                available_gb: host.available_disk_gb,
            });
        }
        if let Some(docker_memory_gb) = host.docker_memory_gb {
            if docker_memory_gb < combined.min_ram_gb {
                warnings.push(SelectionWarning::DockerMemoryBelowRequired {
                    required_gb: combined.min_ram_gb,
                    docker_memory_gb,
                });
            }
        }
    }

    let startup_order = startup_phases(catalog, &resolved);

    let mut recommendations: Vec<String> = Vec::new();
    for kind in errors
        .iter()
        .map(|e| e.kind_name())
        .chain(warnings.iter().map(|w| w.kind_name()))
    {
        for text in recommendations::for_issue(kind) {
            if !recommendations.iter().any(|r| r == text) {
                recommendations.push(text.to_string());
            }
        }
    }

    SelectionReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        combined,
        startup_order,
        recommendations,
    }
}

/// Sums footprints over the deduplicated union of all services referenced by
/// the selection. Shared services contribute exactly once.
pub fn calculate_combined(catalog: &ProfileCatalog, selection: &BTreeSet<String>) -> CombinedResources {
    let mut union: BTreeSet<&str> = BTreeSet::new();
    let mut shared: BTreeSet<&str> = BTreeSet::new();
    for id in selection {
        if let Some(profile) = catalog.get_profile(id) {
            for service in &profile.services {
                union.insert(service.as_str());
            }
            for service in &profile.shared_services {
                shared.insert(service.as_str());
            }
        }
    }

    let mut combined = CombinedResources::default();
    for service_id in &union {
        let def = match catalog.get_service(service_id) {
            Some(def) => def,
            None => continue,
        };
        let fp = def.resource_footprint;
        combined.min_ram_gb += fp.min_ram_gb;
        combined.rec_ram_gb += fp.rec_ram_gb;
        combined.min_disk_gb += fp.min_disk_gb;
        combined.min_cpus += fp.min_cpus;
        combined.breakdown.push(ServiceContribution {
            service_id: service_id.to_string(),
            footprint: fp,
            shared: shared.contains(service_id),
        });
    }
    combined.shared_services = shared
        .iter()
        .filter(|s| union.contains(*s))
        .map(|s| s.to_string())
        .collect();
    combined
}

/// Partitions the selection's services into startup phases 1..=3 and sorts
/// each phase topologically. A service's phase is the earliest phase of any
/// selecting profile, lifted so that no service starts before a dependency.
pub fn startup_phases(catalog: &ProfileCatalog, selection: &BTreeSet<String>) -> Vec<StartupPhase> {
    let mut phase_of: BTreeMap<String, u8> = BTreeMap::new();
    for id in selection {
        if let Some(profile) = catalog.get_profile(id) {
            for service_id in &profile.services {
                let declared = catalog
                    .get_service(service_id)
                    .and_then(|s| s.startup_phase)
                    .unwrap_or(profile.startup_order);
                phase_of
                    .entry(service_id.clone())
                    .and_modify(|p| *p = (*p).min(declared))
                    .or_insert(declared);
            }
        }
    }

    // Lift dependents so no edge points at a later phase.
    let deps = catalog.dependency_map();
    loop {
        let mut changed = false;
        let services: Vec<String> = phase_of.keys().cloned().collect();
        for service in &services {
            if let Some(service_deps) = deps.get(service) {
                let floor = service_deps
                    .iter()
                    .filter_map(|d| phase_of.get(d))
                    .max()
                    .copied()
                    .unwrap_or(1);
                let current = phase_of[service];
                if current < floor {
                    phase_of.insert(service.clone(), floor);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut phases = Vec::new();
    for phase in 1..=3u8 {
        let members: BTreeSet<String> = phase_of
            .iter()
            .filter(|(_, p)| **p == phase)
            .map(|(s, _)| s.clone())
            .collect();
        if members.is_empty() {
            continue;
        }
        // A cycle is impossible here: the catalog rejected cyclic declarations
        // at load time.
        let services = graph::topological_sort(&members, &deps).unwrap_or_else(|_| members.into_iter().collect());
        phases.push(StartupPhase { phase, services });
    }
    phases
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::ProfileCatalog;

    fn selection(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn combined_resources_count_shared_services_once() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["kaspa-node", "kaspa-explorer-bundle"]), None);

        assert!(report.valid, "unexpected errors: {:?}", report.errors);
        // node 4 + indexer 4 + explorer 2 + dashboard 0.5 + nginx 0.1 + timescaledb 2
        assert!((report.combined.min_ram_gb - 12.6).abs() < 1e-9);
        assert!((report.combined.min_disk_gb - 301.1).abs() < 1e-9);

        // Shared services appear exactly once in the breakdown.
        for shared in &["aio-dashboard", "nginx", "timescaledb"] {
            let occurrences = report
                .combined
                .breakdown
                .iter()
                .filter(|c| c.service_id == *shared)
                .count();
            assert_eq!(occurrences, 1, "{} counted {} times", shared, occurrences);
        }
        // No resource warnings without host capacity.
        assert!(report
            .warnings
            .iter()
            .all(|w| matches!(w, SelectionWarning::SharedResourcesUsed { .. })));
    }

    #[test]
    fn startup_order_places_node_then_indexers_then_explorer() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["kaspa-node", "kaspa-explorer-bundle"]), None);

        let phase_of = |service: &str| {
            report
                .startup_order
                .iter()
                .find(|p| p.services.iter().any(|s| s == service))
                .map(|p| p.phase)
        };
        assert_eq!(phase_of("kaspa-node"), Some(1));
        assert_eq!(phase_of("timescaledb"), Some(2));
        assert_eq!(phase_of("simply-kaspa-indexer"), Some(2));
        assert_eq!(phase_of("kaspa-explorer"), Some(3));

        // Within phase 2 the database precedes the indexer.
        let phase2 = report.startup_order.iter().find(|p| p.phase == 2).unwrap();
        let pos = |s: &str| phase2.services.iter().position(|x| x == s).unwrap();
        assert!(pos("timescaledb") < pos("simply-kaspa-indexer"));
    }

    #[test]
    fn missing_prerequisite_is_reported_with_the_accepted_set() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["kaspa-mining"]), None);
        assert!(!report.valid);
        match &report.errors[0] {
            SelectionError::MissingPrerequisite { subject, requires_any_of } => {
                assert_eq!(subject, "kaspa-mining");
                assert_eq!(requires_any_of, &["kaspa-archive-node", "kaspa-node"]);
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn prerequisite_is_satisfied_by_any_of_the_set() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["kaspa-archive-node", "kaspa-mining"]), None);
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn conflicting_profiles_are_reported_once() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["kaspa-node", "kaspa-archive-node"]), None);
        let conflicts: Vec<_> = report
            .errors
            .iter()
            .filter(|e| matches!(e, SelectionError::Conflict { .. }))
            .collect();
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["no-such-profile"]), None);
        assert!(matches!(report.errors[0], SelectionError::UnknownProfile { .. }));
    }

    #[test]
    fn legacy_alias_selects_the_current_profile() {
        let catalog = ProfileCatalog::bundled();
        let report = validate(&catalog, &selection(&["kaspa-fullnode"]), None);
        assert!(report.valid);
        assert!(report.startup_order[0].services.iter().any(|s| s == "kaspa-node"));
    }

    #[test]
    fn host_capacity_below_recommendation_warns() {
        let catalog = ProfileCatalog::bundled();
        let host = HostCapacity {
            total_ram_gb: 4.0,
            available_disk_gb: 50.0,
            docker_memory_gb: Some(2.0),
            cpus: 2.0,
        };
        let report = validate(&catalog, &selection(&["kaspa-node"]), Some(&host));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, SelectionWarning::BelowRecommendedRam { .. })));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, SelectionWarning::BelowRecommendedDisk { .. })));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, SelectionWarning::DockerMemoryBelowRequired { .. })));
    }
}
