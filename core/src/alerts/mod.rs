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

//! # Alert engine
//!
//! Threshold evaluation over service observations and resource samples, with
//! open-alert deduplication per `(kind, subject)`, acknowledgment, recovery
//! detection and a bounded history.

mod config;

pub use self::config::AlertThresholds;

use crate::{
    events::{channels, EventBus},
    monitor::{HealthState, ServiceObservation, ServiceState},
    resources::ResourceSample,
};
use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use strum_macros::Display;
use tokio::sync::Mutex;

const LOG_TARGET: &str = "aio::alerts";

pub const HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    ServiceFailure,
    ServiceRecovery,
    ResourceThreshold,
    ResourceRecovery,
    SyncLost,
    SyncRecovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub alert_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub subject: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.recovered_at.is_none() && self.acknowledged_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ResourceLevel {
    Normal,
    Warning,
    Critical,
}

#[derive(Default)]
struct AlertTable {
    history: VecDeque<Alert>,
    /// `(kind, subject) -> alert_id` for alerts still open.
    open: HashMap<(AlertKind, String), String>,
    resource_levels: HashMap<String, ResourceLevel>,
    sync_states: HashMap<String, bool>,
    next_id: u64,
}

impl AlertTable {
    fn push(&mut self, alert: Alert) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(alert);
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("alert-{}", self.next_id)
    }

    fn find_mut(&mut self, alert_id: &str) -> Option<&mut Alert> {
        self.history.iter_mut().find(|a| a.alert_id == alert_id)
    }
}

#[derive(Clone)]
pub struct AlertEngine {
    table: Arc<Mutex<AlertTable>>,
    thresholds: AlertThresholds,
    bus: EventBus,
}

impl AlertEngine {
    pub fn new(thresholds: AlertThresholds, bus: EventBus) -> Self {
        Self {
            table: Arc::new(Mutex::new(AlertTable::default())),
            thresholds,
            bus,
        }
    }

    /// Raises `ServiceFailure` on a transition into Unhealthy/Stopped and
    /// `ServiceRecovery` (closing the failure) on the way back.
    pub async fn on_service_changed(
        &self,
        previous: Option<&ServiceObservation>,
        current: &ServiceObservation,
        critical: bool,
    ) {
        let failed_now = is_failed(current);
        let failed_before = previous.map(is_failed).unwrap_or(false);

        let mut table = self.table.lock().await;
        if failed_now && !failed_before && previous.is_some() {
            let key = (AlertKind::ServiceFailure, current.service_id.clone());
            if table.open.contains_key(&key) {
                return;
            }
            let severity = if critical { AlertSeverity::Critical } else { AlertSeverity::Warning };
            let reason = match current.health {
                HealthState::Unhealthy => current.last_error.clone().unwrap_or_else(|| "health probe failing".to_string()),
                _ => format!("service is {}", current.state),
            };
            let alert = self.raise(
                &mut table,
                AlertKind::ServiceFailure,
                severity,
                &current.service_id,
                &format!("Service {} failed: {}", current.service_id, reason),
            );
            drop(table);
            self.publish(&alert);
        } else if !failed_now && failed_before && current.health == HealthState::Healthy {
            let closed = self.close_open(&mut table, AlertKind::ServiceFailure, &current.service_id);
            let recovery = self.event(
                &mut table,
                AlertKind::ServiceRecovery,
                &current.service_id,
                &format!("Service {} recovered", current.service_id),
            );
            drop(table);
            if let Some(closed) = closed {
                self.publish(&closed);
            }
            self.publish(&recovery);
        }
    }

    /// Raises `ResourceThreshold` on upward crossings (escalating an open
    /// alert when the level rises further) and `ResourceRecovery` when the
    /// value drops back under every threshold.
    pub async fn on_resource_sample(&self, sample: &ResourceSample) {
        let t = &self.thresholds;
        let readings = [
            ("cpu", sample.cpu_pct, t.cpu_warn_pct, t.cpu_crit_pct),
            ("memory", sample.mem_pct, t.mem_warn_pct, t.mem_crit_pct),
            ("disk", sample.disk_pct, t.disk_warn_pct, t.disk_crit_pct),
        ];

        for (subject, value, warn, crit) in readings {
            let level = if value >= crit {
                ResourceLevel::Critical
            } else if value >= warn {
                ResourceLevel::Warning
            } else {
                ResourceLevel::Normal
            };
            self.apply_resource_level(subject, value, level).await;
        }

        let load = sample.load_avg[0];
        let load_level = if load >= t.load_crit {
            ResourceLevel::Critical
        } else {
            ResourceLevel::Normal
        };
        self.apply_resource_level("load", load, load_level).await;
    }

    async fn apply_resource_level(&self, subject: &str, value: f64, level: ResourceLevel) {
        let mut table = self.table.lock().await;
        let previous = table
            .resource_levels
            .insert(subject.to_string(), level)
            .unwrap_or(ResourceLevel::Normal);
        if level == previous {
            return;
        }

        if level > previous {
            let severity = match level {
                ResourceLevel::Critical => AlertSeverity::Critical,
                _ => AlertSeverity::Warning,
            };
            let message = format!("{} usage at {:.1}", subject, value);
            let key = (AlertKind::ResourceThreshold, subject.to_string());
            if let Some(alert_id) = table.open.get(&key).cloned() {
                // Escalate the already-open alert instead of raising a second one.
                if let Some(alert) = table.find_mut(&alert_id) {
                    if alert.severity < severity {
                        alert.severity = severity;
                        alert.message = message;
                        let updated = alert.clone();
                        drop(table);
                        self.publish(&updated);
                    }
                }
                return;
            }
            let alert = self.raise(&mut table, AlertKind::ResourceThreshold, severity, subject, &message);
            drop(table);
            self.publish(&alert);
        } else if level == ResourceLevel::Normal {
            let closed = self.close_open(&mut table, AlertKind::ResourceThreshold, subject);
            let recovery = self.event(
                &mut table,
                AlertKind::ResourceRecovery,
                subject,
                &format!("{} usage back to normal ({:.1})", subject, value),
            );
            drop(table);
            if let Some(closed) = closed {
                self.publish(&closed);
            }
            self.publish(&recovery);
        }
    }

    /// `SyncLost` / `SyncRecovered` on transitions of a node's synced flag.
    pub async fn on_sync_state(&self, node_key: &str, synced: bool) {
        let mut table = self.table.lock().await;
        let previous = table.sync_states.insert(node_key.to_string(), synced).unwrap_or(true);
        if previous == synced {
            return;
        }
        if !synced {
            let key = (AlertKind::SyncLost, node_key.to_string());
            if table.open.contains_key(&key) {
                return;
            }
            let alert = self.raise(
                &mut table,
                AlertKind::SyncLost,
                AlertSeverity::Critical,
                node_key,
                &format!("Node {} lost sync with the network", node_key),
            );
            drop(table);
            self.publish(&alert);
        } else {
            let closed = self.close_open(&mut table, AlertKind::SyncLost, node_key);
            let recovery = self.event(
                &mut table,
                AlertKind::SyncRecovered,
                node_key,
                &format!("Node {} is synced", node_key),
            );
            drop(table);
            if let Some(closed) = closed {
                self.publish(&closed);
            }
            self.publish(&recovery);
        }
    }

    pub async fn acknowledge(&self, alert_id: &str) -> bool {
        let mut table = self.table.lock().await;
        let acknowledged = match table.find_mut(alert_id) {
            Some(alert) if alert.acknowledged_at.is_none() => {
                alert.acknowledged_at = Some(Utc::now());
                Some((alert.kind, alert.subject.clone(), alert.clone()))
            },
            _ => None,
        };
        match acknowledged {
            Some((kind, subject, alert)) => {
                table.open.remove(&(kind, subject));
                drop(table);
                self.publish(&alert);
                true
            },
            None => false,
        }
    }

    /// Alerts still open (not acknowledged, not recovered), newest first.
    pub async fn active(&self) -> Vec<Alert> {
        let table = self.table.lock().await;
        let mut open: Vec<Alert> = table.history.iter().filter(|a| a.is_open() && table.open.values().any(|id| id == &a.alert_id)).cloned().collect();
        open.reverse();
        open
    }

    pub async fn history(&self, limit: usize) -> Vec<Alert> {
        let table = self.table.lock().await;
        table.history.iter().rev().take(limit).cloned().collect()
    }

    fn raise(
        &self,
        table: &mut AlertTable,
        kind: AlertKind,
        severity: AlertSeverity,
        subject: &str,
        message: &str,
    ) -> Alert {
        let alert = Alert {
            alert_id: table.allocate_id(),
            kind,
            severity,
            subject: subject.to_string(),
            message: message.to_string(),
            raised_at: Utc::now(),
            acknowledged_at: None,
            recovered_at: None,
        };
        info!(target: LOG_TARGET, "raised {} [{}] {}", kind, severity, message);
        table.open.insert((kind, subject.to_string()), alert.alert_id.clone());
        table.push(alert.clone());
        alert
    }

    /// An informational alert that is born already recovered; it never opens.
    fn event(&self, table: &mut AlertTable, kind: AlertKind, subject: &str, message: &str) -> Alert {
        let now = Utc::now();
        let alert = Alert {
            alert_id: table.allocate_id(),
            kind,
            severity: AlertSeverity::Info,
            subject: subject.to_string(),
            message: message.to_string(),
            raised_at: now,
            acknowledged_at: None,
            recovered_at: Some(now),
        };
        table.push(alert.clone());
        alert
    }

    fn close_open(&self, table: &mut AlertTable, kind: AlertKind, subject: &str) -> Option<Alert> {
        let alert_id = table.open.remove(&(kind, subject.to_string()))?;
        let alert = table.find_mut(&alert_id)?;
        alert.recovered_at = Some(Utc::now());
        Some(alert.clone())
    }

    fn publish(&self, alert: &Alert) {
        self.bus.publish(
            channels::ALERTS,
            "alert",
            serde_json::to_value(alert).unwrap_or_default(),
        );
    }
}

fn is_failed(observation: &ServiceObservation) -> bool {
    observation.health == HealthState::Unhealthy
        || matches!(observation.state, ServiceState::Stopped | ServiceState::Exited)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::monitor::{HealthState, ServiceObservation, ServiceState};

    fn engine() -> AlertEngine {
        AlertEngine::new(AlertThresholds::default(), EventBus::new())
    }

    fn observation(service: &str, state: ServiceState, health: HealthState) -> ServiceObservation {
        ServiceObservation {
            service_id: service.to_string(),
            state,
            health,
            started_at: None,
            last_checked: Utc::now(),
            last_error: None,
            version: None,
            uptime_secs: None,
        }
    }

    fn sample(cpu: f64, mem: f64, disk: f64, load: f64) -> ResourceSample {
        ResourceSample {
            cpu_pct: cpu,
            mem_pct: mem,
            disk_pct: disk,
            load_avg: [load, 0.0, 0.0],
            per_service: None,
            taken_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn a_failure_is_raised_once_while_open() {
        let engine = engine();
        let healthy = observation("kaspa-node", ServiceState::Running, HealthState::Healthy);
        let unhealthy = observation("kaspa-node", ServiceState::Running, HealthState::Unhealthy);

        engine.on_service_changed(Some(&healthy), &unhealthy, true).await;
        engine.on_service_changed(Some(&unhealthy), &unhealthy, true).await;
        engine.on_service_changed(Some(&unhealthy), &unhealthy, true).await;

        let active = engine.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, AlertKind::ServiceFailure);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn non_critical_service_failures_are_warnings() {
        let engine = engine();
        let healthy = observation("aio-dashboard", ServiceState::Running, HealthState::Healthy);
        let stopped = observation("aio-dashboard", ServiceState::Stopped, HealthState::Unknown);
        engine.on_service_changed(Some(&healthy), &stopped, false).await;
        assert_eq!(engine.active().await[0].severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn recovery_closes_the_failure_and_records_an_info_alert() {
        let engine = engine();
        let healthy = observation("kaspa-node", ServiceState::Running, HealthState::Healthy);
        let unhealthy = observation("kaspa-node", ServiceState::Running, HealthState::Unhealthy);

        engine.on_service_changed(Some(&healthy), &unhealthy, true).await;
        engine.on_service_changed(Some(&unhealthy), &healthy, true).await;

        assert!(engine.active().await.is_empty());
        let history = engine.history(10).await;
        assert!(history.iter().any(|a| a.kind == AlertKind::ServiceRecovery));
        let failure = history.iter().find(|a| a.kind == AlertKind::ServiceFailure).unwrap();
        assert!(failure.recovered_at.is_some());
    }

    #[tokio::test]
    async fn resource_crossing_raises_then_escalates_then_recovers() {
        let engine = engine();
        engine.on_resource_sample(&sample(85.0, 10.0, 10.0, 0.1)).await;
        let active = engine.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Warning);

        // Escalation keeps a single open alert.
        engine.on_resource_sample(&sample(95.0, 10.0, 10.0, 0.1)).await;
        let active = engine.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Critical);

        engine.on_resource_sample(&sample(20.0, 10.0, 10.0, 0.1)).await;
        assert!(engine.active().await.is_empty());
        assert!(engine
            .history(10)
            .await
            .iter()
            .any(|a| a.kind == AlertKind::ResourceRecovery));
    }

    #[tokio::test]
    async fn load_average_only_has_a_critical_threshold() {
        let engine = engine();
        engine.on_resource_sample(&sample(10.0, 10.0, 10.0, 12.0)).await;
        let active = engine.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].subject, "load");
        assert_eq!(active[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn sync_transitions_raise_and_recover() {
        let engine = engine();
        engine.on_sync_state("kaspa-node", false).await;
        assert_eq!(engine.active().await[0].kind, AlertKind::SyncLost);
        // Repeated loss reports do not duplicate.
        engine.on_sync_state("kaspa-node", false).await;
        assert_eq!(engine.active().await.len(), 1);

        engine.on_sync_state("kaspa-node", true).await;
        assert!(engine.active().await.is_empty());
        assert!(engine
            .history(10)
            .await
            .iter()
            .any(|a| a.kind == AlertKind::SyncRecovered));
    }

    #[tokio::test]
    async fn acknowledgment_closes_the_alert() {
        let engine = engine();
        let healthy = observation("nginx", ServiceState::Running, HealthState::Healthy);
        let stopped = observation("nginx", ServiceState::Exited, HealthState::Unknown);
        engine.on_service_changed(Some(&healthy), &stopped, true).await;

        let id = engine.active().await[0].alert_id.clone();
        assert!(engine.acknowledge(&id).await);
        assert!(engine.active().await.is_empty());
        assert!(!engine.acknowledge(&id).await);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let engine = engine();
        for n in 0..(HISTORY_CAPACITY + 20) {
            // Alternate up/down so each iteration raises and recovers.
            engine.on_sync_state("node", n % 2 == 0).await;
        }
        assert!(engine.history(10_000).await.len() <= HISTORY_CAPACITY);
    }
}
