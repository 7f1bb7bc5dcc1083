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

//! The periodic broadcaster behind `updates:services` and `updates:resources`.
//! Services broadcast on change (periodic repeats of identical state are
//! suppressed); resources broadcast on a cadence that stretches when every
//! connected client reports a hidden tab.

use super::{bus::EventBus, channels, message::BusMessage};
use crate::{
    monitor::{HealthState, MonitorService, ServiceState},
    resources::{ResourceSample, ResourceSampler},
};
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

const LOG_TARGET: &str = "aio::events::broadcaster";

/// Absolute percentage-point delta that makes a resource sample "new".
const RESOURCE_DELTA_PCT: f64 = 5.0;
/// Crossing any of these boundaries also makes a sample "new".
const RESOURCE_BOUNDARIES: &[f64] = &[80.0, 85.0, 90.0, 95.0];

#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub services_interval: Duration,
    pub resources_interval: Duration,
    /// Used instead of `resources_interval` when every client is hidden.
    pub hidden_resources_interval: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            services_interval: Duration::from_secs(5),
            resources_interval: Duration::from_secs(5),
            hidden_resources_interval: Duration::from_secs(20),
        }
    }
}

/// Shared by the WebSocket sessions so the broadcaster can adapt its cadence.
#[derive(Default)]
pub struct ClientPresence {
    total: AtomicUsize,
    hidden: AtomicUsize,
}

impl ClientPresence {
    pub fn attach(&self) {
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn detach(&self, was_hidden: bool) {
        self.total.fetch_sub(1, Ordering::SeqCst);
        if was_hidden {
            self.hidden.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn set_hidden(&self, was_hidden: bool, hidden: bool) {
        match (was_hidden, hidden) {
            (false, true) => {
                self.hidden.fetch_add(1, Ordering::SeqCst);
            },
            (true, false) => {
                self.hidden.fetch_sub(1, Ordering::SeqCst);
            },
            _ => {},
        }
    }

    pub fn client_count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// True when there is at least one client and all of them are hidden.
    pub fn all_hidden(&self) -> bool {
        let total = self.total.load(Ordering::SeqCst);
        total > 0 && self.hidden.load(Ordering::SeqCst) >= total
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    monitor: MonitorService,
    sampler: ResourceSampler,
    bus: EventBus,
    presence: Arc<ClientPresence>,
    config: BroadcasterConfig,
}

impl Broadcaster {
    pub fn new(monitor: MonitorService, sampler: ResourceSampler, bus: EventBus, config: BroadcasterConfig) -> Self {
        Self {
            monitor,
            sampler,
            bus,
            presence: Arc::new(ClientPresence::default()),
            config,
        }
    }

    pub fn presence(&self) -> Arc<ClientPresence> {
        self.presence.clone()
    }

    /// The synthetic snapshot a fresh subscriber receives.
    pub async fn initial_message(&self) -> BusMessage {
        let services = self.monitor.observations().await;
        let resources = self.sampler.latest().await;
        BusMessage::unrouted(
            "initial_data",
            json!({ "services": services, "resources": resources }),
        )
    }

    pub fn spawn(&self, mut shutdown: ShutdownSignal) {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            let mut last_services: Option<BTreeMap<String, (ServiceState, HealthState)>> = None;
            let mut last_resources_sent = tokio::time::Instant::now();
            let mut first_resources = true;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = &mut shutdown => {
                        debug!(target: LOG_TARGET, "broadcaster shut down");
                        break;
                    },
                }

                // Services: broadcast on change; unchanged repeats are
                // suppressed, so a quiet fleet produces no traffic here.
                let observations = broadcaster.monitor.observations().await;
                let digest: BTreeMap<String, (ServiceState, HealthState)> = observations
                    .iter()
                    .map(|o| (o.service_id.clone(), (o.state, o.health)))
                    .collect();
                if last_services.as_ref() != Some(&digest) {
                    last_services = Some(digest);
                    broadcaster.bus.publish(
                        channels::SERVICES,
                        "services_update",
                        json!({ "services": observations }),
                    );
                }

                // Resources: periodic, stretched while every client is hidden.
                let interval = if broadcaster.presence.all_hidden() {
                    broadcaster.config.hidden_resources_interval
                } else {
                    broadcaster.config.resources_interval
                };
                if first_resources || last_resources_sent.elapsed() >= interval {
                    if let Some(sample) = broadcaster.sampler.latest().await {
                        first_resources = false;
                        last_resources_sent = tokio::time::Instant::now();
                        broadcaster.bus
                            .publish(channels::RESOURCES, "resources_update", json!(sample));
                    }
                }
            }
        });
    }
}

/// A resources update is "new" when any headline figure moved at least
/// `RESOURCE_DELTA_PCT` points or crossed a threshold boundary.
pub fn resources_is_new(previous: &ResourceSample, current: &ResourceSample) -> bool {
    let pairs = [
        (previous.cpu_pct, current.cpu_pct),
        (previous.mem_pct, current.mem_pct),
        (previous.disk_pct, current.disk_pct),
    ];
    pairs.iter().any(|(prev, curr)| {
        (curr - prev).abs() >= RESOURCE_DELTA_PCT
            || RESOURCE_BOUNDARIES
                .iter()
                .any(|b| (prev < b) != (curr < b))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn sample(cpu: f64, mem: f64, disk: f64) -> ResourceSample {
        ResourceSample {
            cpu_pct: cpu,
            mem_pct: mem,
            disk_pct: disk,
            load_avg: [0.0, 0.0, 0.0],
            per_service: None,
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn small_moves_are_not_new() {
        assert!(!resources_is_new(&sample(50.0, 50.0, 50.0), &sample(52.0, 48.0, 51.0)));
    }

    #[test]
    fn a_five_point_move_is_new() {
        assert!(resources_is_new(&sample(50.0, 50.0, 50.0), &sample(55.0, 50.0, 50.0)));
        assert!(resources_is_new(&sample(50.0, 50.0, 50.0), &sample(50.0, 50.0, 43.0)));
    }

    #[test]
    fn crossing_a_boundary_is_new_even_when_small() {
        assert!(resources_is_new(&sample(79.0, 50.0, 50.0), &sample(81.0, 50.0, 50.0)));
        assert!(resources_is_new(&sample(95.5, 50.0, 50.0), &sample(94.5, 50.0, 50.0)));
    }

    #[test]
    fn presence_tracks_the_all_hidden_state() {
        let presence = ClientPresence::default();
        assert!(!presence.all_hidden());

        presence.attach();
        presence.attach();
        assert_eq!(presence.client_count(), 2);
        assert!(!presence.all_hidden());

        presence.set_hidden(false, true);
        assert!(!presence.all_hidden());
        presence.set_hidden(false, true);
        assert!(presence.all_hidden());

        presence.set_hidden(true, false);
        assert!(!presence.all_hidden());

        // The visible client leaves; only the hidden one remains.
        presence.detach(false);
        assert!(presence.all_hidden());
        presence.detach(true);
        assert!(!presence.all_hidden());
    }
}
