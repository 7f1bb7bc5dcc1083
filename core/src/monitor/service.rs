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

use super::{
    config::MonitorConfig,
    probes,
    state::{HealthState, ObservationTable, ServiceObservation, ServiceState},
    MonitorError,
};
use crate::{
    alerts::AlertEngine,
    catalog::{HealthProbe, ProfileCatalog, ServiceDefinition},
    events::{channels, EventBus},
    graph,
    runtime::{ContainerInfo, ContainerRuntime},
    validator,
};
use chrono::Utc;
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use serde_json::json;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};

const LOG_TARGET: &str = "aio::monitor";

struct Inner {
    catalog: Arc<ProfileCatalog>,
    runtime: Arc<dyn ContainerRuntime>,
    bus: EventBus,
    alerts: AlertEngine,
    config: MonitorConfig,
    table: RwLock<ObservationTable>,
    /// Serializes every fleet mutation. Observation reads never take it.
    fleet_lock: Arc<Mutex<()>>,
    http: reqwest::Client,
}

#[derive(Clone)]
pub struct MonitorService {
    inner: Arc<Inner>,
}

impl MonitorService {
    pub fn new(
        catalog: Arc<ProfileCatalog>,
        runtime: Arc<dyn ContainerRuntime>,
        bus: EventBus,
        alerts: AlertEngine,
        config: MonitorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                runtime,
                bus,
                alerts,
                config,
                table: RwLock::new(ObservationTable::default()),
                fleet_lock: Arc::new(Mutex::new(())),
                http: reqwest::Client::new(),
            }),
        }
    }

    /// Runs observation cycles until shutdown. Cycles never overlap: the next
    /// tick waits for the previous cycle to finish.
    pub fn spawn(&self, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.inner.config.check_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = monitor.observe_cycle().await {
                            warn!(target: LOG_TARGET, "observation cycle failed: {}", err);
                        }
                    },
                    _ = &mut shutdown => {
                        debug!(target: LOG_TARGET, "service monitor shut down");
                        break;
                    },
                }
            }
        })
    }

    /// One observation pass over every declared service.
    pub async fn observe_cycle(&self) -> Result<(), MonitorError> {
        let containers = self.inner.runtime.list_containers().await?;
        let mut by_service: HashMap<String, ContainerInfo> = HashMap::new();
        for container in containers {
            by_service.insert(container.service_id.clone(), container);
        }

        for def in self.inner.catalog.services() {
            let live = by_service
                .get(&def.service_id)
                .or_else(|| by_service.values().find(|c| c.container_name == def.container_name));
            let candidate = self.classify(def, live).await;
            let (previous, current, changed) = {
                let mut table = self.inner.table.write().await;
                table.apply(candidate, self.inner.config.retry_attempts)
            };
            if changed {
                debug!(
                    target: LOG_TARGET,
                    "{}: {} / {}",
                    current.service_id,
                    current.state,
                    current.health
                );
                self.inner
                    .alerts
                    .on_service_changed(previous.as_ref(), &current, def.critical)
                    .await;
                self.inner.bus.publish(
                    channels::SERVICES,
                    "service_changed",
                    json!({ "previous": previous, "current": current }),
                );
            }
        }
        Ok(())
    }

    /// The fleet-wide mutation lock, for callers (the update pipeline) that
    /// drive the runtime directly.
    pub async fn lock_fleet(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.inner.fleet_lock.clone().lock_owned().await
    }

    pub async fn observations(&self) -> Vec<ServiceObservation> {
        self.inner.table.read().await.all()
    }

    pub async fn observation(&self, service_id: &str) -> Option<ServiceObservation> {
        self.inner.table.read().await.get(service_id).cloned()
    }

    /// Starts the profiles' services in phase order, waiting for each service
    /// to become healthy before the next. Prerequisites outside the start set
    /// must already be healthy.
    pub async fn start_profiles(
        &self,
        profile_ids: &[String],
        shutdown: ShutdownSignal,
    ) -> Result<Vec<String>, MonitorError> {
        let _fleet = self.inner.fleet_lock.lock().await;

        let mut selection = BTreeSet::new();
        for id in profile_ids {
            let profile = self
                .inner
                .catalog
                .get_profile(id)
                .ok_or_else(|| MonitorError::UnknownProfile(id.clone()))?;
            selection.insert(profile.profile_id.clone());
        }

        let phases = validator::startup_phases(&self.inner.catalog, &selection);
        let ordered: Vec<String> = phases.into_iter().flat_map(|p| p.services).collect();

        for service in &ordered {
            let def = self
                .inner
                .catalog
                .get_service(service)
                .ok_or_else(|| MonitorError::UnknownService(service.clone()))?;
            for dependency in &def.declared_dependencies {
                if ordered.contains(dependency) {
                    continue;
                }
                let healthy = self
                    .observation(dependency)
                    .await
                    .map(|o| o.health == HealthState::Healthy)
                    .unwrap_or(false);
                if !healthy {
                    return Err(MonitorError::PrerequisiteNotReady {
                        service: service.clone(),
                        prerequisite: dependency.clone(),
                    });
                }
            }
        }

        self.start_ordered(&ordered, shutdown).await
    }

    /// Starts an explicit set of services in dependency order, with the same
    /// prerequisite and health-wait semantics as a profile start.
    pub async fn start_services(
        &self,
        services: &[String],
        shutdown: ShutdownSignal,
    ) -> Result<Vec<String>, MonitorError> {
        let _fleet = self.inner.fleet_lock.lock().await;
        let mut set = BTreeSet::new();
        for service in services {
            if self.inner.catalog.get_service(service).is_none() {
                return Err(MonitorError::UnknownService(service.clone()));
            }
            set.insert(service.clone());
        }
        let ordered = graph::topological_sort(&set, &self.inner.catalog.dependency_map())?;

        for service in &ordered {
            let def = self.inner.catalog.get_service(service).unwrap();
            for dependency in &def.declared_dependencies {
                if ordered.contains(dependency) {
                    continue;
                }
                let healthy = self
                    .observation(dependency)
                    .await
                    .map(|o| o.health == HealthState::Healthy)
                    .unwrap_or(false);
                if !healthy {
                    return Err(MonitorError::PrerequisiteNotReady {
                        service: service.clone(),
                        prerequisite: dependency.clone(),
                    });
                }
            }
        }
        self.start_ordered(&ordered, shutdown).await
    }

    /// Stops the profiles' services in reverse dependency order. Blocked with
    /// `DependentsRunning` when a healthy service outside the set depends on a
    /// member.
    pub async fn stop_profiles(&self, profile_ids: &[String]) -> Result<Vec<String>, MonitorError> {
        let mut set = BTreeSet::new();
        for id in profile_ids {
            let profile = self
                .inner
                .catalog
                .get_profile(id)
                .ok_or_else(|| MonitorError::UnknownProfile(id.clone()))?;
            set.extend(profile.services.iter().cloned());
        }
        let services: Vec<String> = set.into_iter().collect();
        self.stop_services(&services).await
    }

    pub async fn stop_services(&self, services: &[String]) -> Result<Vec<String>, MonitorError> {
        let _fleet = self.inner.fleet_lock.lock().await;
        self.stop_services_locked(services).await
    }

    /// Stop + start over the restricted set. Valid only when the stop half
    /// would succeed.
    pub async fn restart_services(
        &self,
        services: &[String],
        shutdown: ShutdownSignal,
    ) -> Result<Vec<String>, MonitorError> {
        let _fleet = self.inner.fleet_lock.lock().await;
        let stopped = self.stop_services_locked(services).await?;
        // The stop order is reverse-topological; starting replays it forward.
        let order: Vec<String> = stopped.into_iter().rev().collect();
        self.start_ordered(&order, shutdown).await
    }

    /// Stops everything currently running except the allowlist, dependents
    /// included, in reverse dependency order.
    pub async fn emergency_stop(&self, allowlist: &[String]) -> Result<Vec<String>, MonitorError> {
        let _fleet = self.inner.fleet_lock.lock().await;
        let set: BTreeSet<String> = {
            let table = self.inner.table.read().await;
            table
                .all()
                .into_iter()
                .filter(|o| o.state == ServiceState::Running && !allowlist.contains(&o.service_id))
                .map(|o| o.service_id)
                .collect()
        };
        warn!(target: LOG_TARGET, "emergency stop of {} service(s)", set.len());
        let order = graph::topological_sort(&set, &self.inner.catalog.dependency_map())?;
        let mut stopped = Vec::with_capacity(order.len());
        for service in order.iter().rev() {
            self.inner.runtime.stop(std::slice::from_ref(service)).await?;
            stopped.push(service.clone());
        }
        Ok(stopped)
    }

    /// Polls a single service until it reports healthy. A service without any
    /// probe (declared or engine-side) counts as ready once it is running.
    pub async fn wait_for_healthy(
        &self,
        service_id: &str,
        deadline: Duration,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), MonitorError> {
        let def = self
            .inner
            .catalog
            .get_service(service_id)
            .ok_or_else(|| MonitorError::UnknownService(service_id.to_string()))?;
        let started = tokio::time::Instant::now();
        loop {
            let containers = self.inner.runtime.list_containers().await?;
            let live = containers
                .into_iter()
                .find(|c| c.service_id == def.service_id || c.container_name == def.container_name);
            let observation = self.classify(def, live.as_ref()).await;

            let unobservable = matches!(def.health_probe, HealthProbe::None)
                && live.as_ref().map(|l| l.engine_health.is_none()).unwrap_or(false);
            if observation.health == HealthState::Healthy
                || (unobservable && observation.state == ServiceState::Running)
            {
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(MonitorError::StartupDeadlineExceeded {
                    service: service_id.to_string(),
                    deadline,
                });
            }
            tokio::select! {
                _ = tokio::time::sleep(self.inner.config.health_poll_interval) => {},
                _ = &mut shutdown => return Err(MonitorError::Cancelled),
            }
        }
    }

    async fn start_ordered(&self, ordered: &[String], shutdown: ShutdownSignal) -> Result<Vec<String>, MonitorError> {
        let mut started = Vec::with_capacity(ordered.len());
        for (index, service) in ordered.iter().enumerate() {
            info!(target: LOG_TARGET, "starting {}", service);
            self.inner.runtime.up(std::slice::from_ref(service)).await?;
            match self
                .wait_for_healthy(service, self.inner.config.startup_deadline, shutdown.clone())
                .await
            {
                Ok(()) => started.push(service.clone()),
                Err(MonitorError::Cancelled) => return Err(MonitorError::Cancelled),
                Err(err) => {
                    warn!(target: LOG_TARGET, "aborting start at {}: {}", service, err);
                    return Err(MonitorError::PartialStart {
                        started,
                        failed: service.clone(),
                        remaining: ordered[index + 1..].to_vec(),
                    });
                },
            }
        }
        Ok(started)
    }

    async fn stop_services_locked(&self, services: &[String]) -> Result<Vec<String>, MonitorError> {
        let mut set = BTreeSet::new();
        for service in services {
            if self.inner.catalog.get_service(service).is_none() {
                return Err(MonitorError::UnknownService(service.clone()));
            }
            set.insert(service.clone());
        }

        let mut offenders = Vec::new();
        {
            let table = self.inner.table.read().await;
            for def in self.inner.catalog.services() {
                if set.contains(&def.service_id) {
                    continue;
                }
                if def.declared_dependencies.iter().any(|d| set.contains(d)) {
                    let healthy = table
                        .get(&def.service_id)
                        .map(|o| o.health == HealthState::Healthy)
                        .unwrap_or(false);
                    if healthy {
                        offenders.push(def.service_id.clone());
                    }
                }
            }
        }
        if !offenders.is_empty() {
            offenders.sort();
            return Err(MonitorError::DependentsRunning(offenders));
        }

        let order = graph::topological_sort(&set, &self.inner.catalog.dependency_map())?;
        let mut stopped = Vec::with_capacity(order.len());
        for service in order.iter().rev() {
            info!(target: LOG_TARGET, "stopping {}", service);
            self.inner.runtime.stop(std::slice::from_ref(service)).await?;
            stopped.push(service.clone());
        }
        Ok(stopped)
    }

    async fn classify(&self, def: &ServiceDefinition, live: Option<&ContainerInfo>) -> ServiceObservation {
        use crate::runtime::EngineHealth;

        let now = Utc::now();
        let (state, started_at, image) = match live {
            Some(info) => (ServiceState::from(info.state), info.started_at, Some(info.image.clone())),
            None => (ServiceState::Stopped, None, None),
        };

        let mut last_error = None;
        let health = if state == ServiceState::Running {
            match &def.health_probe {
                HealthProbe::None => match live.and_then(|i| i.engine_health) {
                    Some(EngineHealth::Healthy) => HealthState::Healthy,
                    Some(EngineHealth::Unhealthy) => {
                        last_error = Some("engine healthcheck failing".to_string());
                        HealthState::Unhealthy
                    },
                    Some(EngineHealth::Starting) | None => HealthState::Unknown,
                },
                probe => {
                    match probes::execute(
                        &self.inner.http,
                        &self.inner.config.probe_host,
                        probe,
                        self.inner.config.probe_timeout,
                    )
                    .await
                    {
                        Ok(()) => HealthState::Healthy,
                        Err(err) => {
                            last_error = Some(err.to_string());
                            HealthState::Unhealthy
                        },
                    }
                },
            }
        } else {
            HealthState::Unknown
        };

        let version = image.as_deref().and_then(image_tag).map(|t| t.to_string());
        let uptime_secs = started_at.map(|s| (now - s).num_seconds().max(0) as u64);
        ServiceObservation {
            service_id: def.service_id.clone(),
            state,
            health,
            started_at,
            last_checked: now,
            last_error,
            version,
            uptime_secs,
        }
    }
}

fn image_tag(image: &str) -> Option<&str> {
    match image.rsplit_once(':') {
        Some((_, tag)) if !tag.contains('/') => Some(tag),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        alerts::AlertThresholds,
        catalog::{Profile, ProfileCategory, ResourceFootprint, ServiceDefinition},
        runtime::{mock::MockRuntime, EngineHealth},
    };
    use kaspa_aio_shutdown::Shutdown;

    fn test_catalog() -> Arc<ProfileCatalog> {
        let services = vec![
            ServiceDefinition::new("node", "node-profile", "example/node:1.0.0")
                .critical()
                .with_footprint(ResourceFootprint::new(1.0, 1.0, 1.0, 1.0)),
            ServiceDefinition::new("db", "indexer-profile", "example/db:2.0.0"),
            ServiceDefinition::new("indexer", "indexer-profile", "example/indexer:3.0.0")
                .with_dependencies(&["node", "db"]),
        ];
        let profiles = vec![
            Profile::new("node-profile", "Node", ProfileCategory::Node, 1).with_services(&["node"]),
            Profile::new("indexer-profile", "Indexer", ProfileCategory::Indexer, 2)
                .with_services(&["db", "indexer"])
                .with_prerequisites(&["node-profile"]),
        ];
        Arc::new(ProfileCatalog::load(profiles, services, vec![]).unwrap())
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            check_interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(200),
            retry_attempts: 3,
            startup_deadline: Duration::from_millis(300),
            health_poll_interval: Duration::from_millis(50),
            probe_host: "127.0.0.1".to_string(),
        }
    }

    fn setup() -> (MonitorService, MockRuntime, EventBus) {
        let runtime = MockRuntime::new();
        let bus = EventBus::new();
        let alerts = AlertEngine::new(AlertThresholds::default(), bus.clone());
        let monitor = MonitorService::new(
            test_catalog(),
            Arc::new(runtime.clone()),
            bus.clone(),
            alerts,
            fast_config(),
        );
        (monitor, runtime, bus)
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn observe_cycle_classifies_running_and_stopped_services() {
        let (monitor, runtime, bus) = setup();
        let mut rx = bus.subscribe();
        runtime.up(&strings(&["node"])).await.unwrap();

        monitor.observe_cycle().await.unwrap();

        let node = monitor.observation("node").await.unwrap();
        assert_eq!(node.state, ServiceState::Running);
        assert_eq!(node.health, HealthState::Healthy);
        assert_eq!(node.version.as_deref(), Some("latest"));
        let db = monitor.observation("db").await.unwrap();
        assert_eq!(db.state, ServiceState::Stopped);
        assert_eq!(db.health, HealthState::Unknown);

        // First classification of every service is a change event.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message_type, "service_changed");
    }

    #[tokio::test]
    async fn unhealthy_flips_only_after_three_cycles_and_recovers_immediately() {
        let (monitor, runtime, _bus) = setup();
        runtime.up(&strings(&["node"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();
        assert_eq!(monitor.observation("node").await.unwrap().health, HealthState::Healthy);

        runtime.set_engine_health("node", EngineHealth::Unhealthy);
        monitor.observe_cycle().await.unwrap();
        assert_eq!(monitor.observation("node").await.unwrap().health, HealthState::Healthy);
        monitor.observe_cycle().await.unwrap();
        assert_eq!(monitor.observation("node").await.unwrap().health, HealthState::Healthy);
        monitor.observe_cycle().await.unwrap();
        assert_eq!(monitor.observation("node").await.unwrap().health, HealthState::Unhealthy);

        runtime.set_engine_health("node", EngineHealth::Healthy);
        monitor.observe_cycle().await.unwrap();
        assert_eq!(monitor.observation("node").await.unwrap().health, HealthState::Healthy);
    }

    #[tokio::test]
    async fn start_profiles_orders_phases_and_dependencies() {
        let (monitor, runtime, _bus) = setup();
        let shutdown = Shutdown::new();

        monitor
            .start_profiles(&strings(&["node-profile", "indexer-profile"]), shutdown.to_signal())
            .await
            .unwrap();

        assert_eq!(runtime.calls(), vec!["up node", "up db", "up indexer"]);
    }

    #[tokio::test]
    async fn starting_dependents_without_their_prerequisite_fails() {
        let (monitor, _runtime, _bus) = setup();
        let shutdown = Shutdown::new();
        let err = monitor
            .start_profiles(&strings(&["indexer-profile"]), shutdown.to_signal())
            .await
            .unwrap_err();
        match err {
            MonitorError::PrerequisiteNotReady { service, prerequisite } => {
                assert_eq!(service, "indexer");
                assert_eq!(prerequisite, "node");
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn a_service_that_never_gets_healthy_aborts_the_start() {
        let (monitor, runtime, _bus) = setup();
        let shutdown = Shutdown::new();
        runtime.up(&strings(&["node"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();
        runtime.set_engine_health("db", EngineHealth::Unhealthy);

        let err = monitor
            .start_profiles(&strings(&["indexer-profile"]), shutdown.to_signal())
            .await
            .unwrap_err();
        match err {
            MonitorError::PartialStart { started, failed, remaining } => {
                assert!(started.is_empty());
                assert_eq!(failed, "db");
                assert_eq!(remaining, vec!["indexer"]);
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn stop_is_blocked_by_healthy_dependents() {
        let (monitor, runtime, _bus) = setup();
        runtime.up(&strings(&["node", "db", "indexer"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();

        let err = monitor.stop_profiles(&strings(&["node-profile"])).await.unwrap_err();
        match err {
            MonitorError::DependentsRunning(offenders) => assert_eq!(offenders, vec!["indexer"]),
            other => panic!("unexpected error {:?}", other),
        }
        // No container state changed.
        assert!(runtime.is_running("node"));
        assert!(runtime.is_running("indexer"));
    }

    #[tokio::test]
    async fn stop_runs_in_reverse_dependency_order() {
        let (monitor, runtime, _bus) = setup();
        runtime.up(&strings(&["node", "db", "indexer"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();

        monitor.stop_profiles(&strings(&["indexer-profile"])).await.unwrap();
        let calls = runtime.calls();
        let stops: Vec<&str> = calls.iter().filter(|c| c.starts_with("stop")).map(|c| c.as_str()).collect();
        assert_eq!(stops, vec!["stop indexer", "stop db"]);
    }

    #[tokio::test]
    async fn restart_is_stop_plus_start_on_the_restricted_set() {
        let (monitor, runtime, _bus) = setup();
        let shutdown = Shutdown::new();
        runtime.up(&strings(&["node", "db", "indexer"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();

        monitor
            .restart_services(&strings(&["db", "indexer"]), shutdown.to_signal())
            .await
            .unwrap();
        let calls = runtime.calls();
        let tail: Vec<&str> = calls[calls.len() - 4..].iter().map(|c| c.as_str()).collect();
        assert_eq!(tail, vec!["stop indexer", "stop db", "up db", "up indexer"]);
    }

    #[tokio::test]
    async fn restarting_a_depended_on_service_alone_is_blocked() {
        let (monitor, runtime, _bus) = setup();
        let shutdown = Shutdown::new();
        runtime.up(&strings(&["node", "db", "indexer"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();

        let err = monitor
            .restart_services(&strings(&["node"]), shutdown.to_signal())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::DependentsRunning(_)));
    }

    #[tokio::test]
    async fn emergency_stop_spares_the_allowlist() {
        let (monitor, runtime, _bus) = setup();
        runtime.up(&strings(&["node", "db", "indexer"])).await.unwrap();
        monitor.observe_cycle().await.unwrap();

        let stopped = monitor.emergency_stop(&strings(&["node"])).await.unwrap();
        assert_eq!(stopped, vec!["indexer", "db"]);
        assert!(runtime.is_running("node"));
        assert!(!runtime.is_running("indexer"));
    }
}
