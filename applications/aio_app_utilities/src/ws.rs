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

//! The WebSocket session shared by both controllers. One socket per client:
//! subscription-filtered fan-out from the event bus, a synthetic
//! `initial_data` message after each subscribe, tab-visibility reporting, and
//! task/sync control commands.

use futures::{SinkExt, StreamExt};
use kaspa_aio_core::{
    events::{channel_matches, Broadcaster, BusMessage, EventBus},
    sync::SyncManager,
    tasks::{TaskFilter, TaskKind, TaskStatus, TaskSupervisor},
};
use log::*;
use serde_json::json;
use std::collections::HashSet;
use warp::ws::{Message, WebSocket};

const LOG_TARGET: &str = "aio::ws";

#[derive(Clone)]
pub struct WsDeps {
    pub bus: EventBus,
    pub broadcaster: Broadcaster,
    pub tasks: TaskSupervisor,
    pub sync: SyncManager,
    /// The service a `task:register` of kind node-sync attaches to by default.
    pub node_service_id: String,
}

pub async fn handle_socket(socket: WebSocket, deps: WsDeps) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let presence = deps.broadcaster.presence();
    presence.attach();
    let mut hidden = false;
    let mut subscriptions: HashSet<String> = HashSet::new();
    let mut bus_rx = deps.bus.subscribe();

    debug!(target: LOG_TARGET, "client connected");
    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        debug!(target: LOG_TARGET, "socket error: {}", err);
                        break;
                    },
                    None => break,
                };
                if message.is_close() {
                    break;
                }
                let text = match message.to_str() {
                    Ok(text) => text,
                    Err(_) => continue,
                };
                let replies = handle_incoming(text, &deps, &mut subscriptions, &presence, &mut hidden).await;
                let mut failed = false;
                for reply in replies {
                    if send(&mut ws_tx, &reply).await.is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break;
                }
            },
            event = bus_rx.recv() => {
                match event {
                    Ok(message) => {
                        let channel = match &message.subscription {
                            Some(channel) => channel.as_str(),
                            None => continue,
                        };
                        if subscriptions.iter().any(|p| channel_matches(p, channel)) {
                            if send(&mut ws_tx, &message).await.is_err() {
                                break;
                            }
                        }
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // The client fell behind; it resynchronizes on the
                        // next periodic broadcast.
                        debug!(target: LOG_TARGET, "client lagged, dropped {} message(s)", missed);
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            },
        }
    }

    presence.detach(hidden);
    debug!(target: LOG_TARGET, "client disconnected");
}

async fn send(
    tx: &mut (impl SinkExt<Message> + Unpin),
    message: &BusMessage,
) -> Result<(), ()> {
    let text = serde_json::to_string(message).map_err(|_| ())?;
    tx.send(Message::text(text)).await.map_err(|_| ())
}

async fn handle_incoming(
    text: &str,
    deps: &WsDeps,
    subscriptions: &mut HashSet<String>,
    presence: &kaspa_aio_core::events::ClientPresence,
    hidden: &mut bool,
) -> Vec<BusMessage> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return vec![error_message("invalid JSON message")],
    };
    let message_type = value.get("type").and_then(|t| t.as_str()).unwrap_or_default();

    match message_type {
        "subscribe" => {
            let channel = match value.get("channel").and_then(|c| c.as_str()) {
                Some(channel) => channel.to_string(),
                None => return vec![error_message("subscribe requires a channel")],
            };
            subscriptions.insert(channel);
            // Every new subscription gets the current snapshot immediately.
            vec![deps.broadcaster.initial_message().await]
        },
        "unsubscribe" => {
            if let Some(channel) = value.get("channel").and_then(|c| c.as_str()) {
                subscriptions.remove(channel);
            }
            vec![]
        },
        "visibility" => {
            let now_hidden = value.get("hidden").and_then(|h| h.as_bool()).unwrap_or(false);
            presence.set_hidden(*hidden, now_hidden);
            *hidden = now_hidden;
            vec![]
        },
        "tasks:list" => {
            let records = deps.tasks.list(TaskFilter::default()).await;
            vec![BusMessage::unrouted("tasks:list", json!({ "tasks": records }))]
        },
        "task:status" => match value.get("taskId").and_then(|t| t.as_str()) {
            Some(task_id) => match deps.tasks.get(task_id).await {
                Some(record) => vec![BusMessage::unrouted("task:status", json!(record))],
                None => vec![error_message(&format!("unknown task `{}`", task_id))],
            },
            None => vec![error_message("task:status requires taskId")],
        },
        "task:cancel" => match value.get("taskId").and_then(|t| t.as_str()) {
            Some(task_id) => match deps.tasks.cancel(task_id).await {
                Ok(()) => vec![BusMessage::unrouted("task:cancelled", json!({ "taskId": task_id }))],
                Err(err) => vec![error_message(&err.to_string())],
            },
            None => vec![error_message("task:cancel requires taskId")],
        },
        "task:register" => {
            let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or("node-sync");
            if kind != "node-sync" {
                return vec![error_message("only node-sync tasks can be registered over the socket")];
            }
            let service_id = value
                .get("serviceId")
                .and_then(|s| s.as_str())
                .unwrap_or(&deps.node_service_id)
                .to_string();
            match deps.sync.start_background_sync(&deps.tasks, &service_id, &service_id, None).await {
                Ok(task_id) => vec![BusMessage::unrouted("task:registered", json!({ "taskId": task_id }))],
                Err(err) => vec![error_message(&err.to_string())],
            }
        },
        "sync:pause" | "sync:resume" => {
            let pausing = message_type == "sync:pause";
            let wanted_status = if pausing { TaskStatus::Running } else { TaskStatus::Paused };
            let targets = deps
                .tasks
                .list(TaskFilter {
                    kind: Some(TaskKind::NodeSync),
                    status: Some(wanted_status),
                    ..Default::default()
                })
                .await;
            let mut affected = Vec::new();
            for record in targets {
                let result = if pausing {
                    deps.tasks.pause(&record.task_id).await
                } else {
                    deps.tasks.resume(&record.task_id).await
                };
                if result.is_ok() {
                    affected.push(record.task_id);
                }
            }
            deps.bus.publish(
                "sync:status",
                message_type,
                json!({ "taskIds": affected }),
            );
            vec![BusMessage::unrouted(message_type, json!({ "taskIds": affected }))]
        },
        other => vec![error_message(&format!("unknown message type `{}`", other))],
    }
}

fn error_message(message: &str) -> BusMessage {
    BusMessage::unrouted("error", json!({ "message": message }))
}

#[cfg(test)]
mod test {
    use super::*;
    use kaspa_aio_core::{
        alerts::{AlertEngine, AlertThresholds},
        catalog::ProfileCatalog,
        events::BroadcasterConfig,
        monitor::{MonitorConfig, MonitorService},
        resources::ResourceSampler,
        runtime::mock::MockRuntime,
        sync::SyncManagerConfig,
    };
    use kaspa_aio_shutdown::Shutdown;
    use std::sync::Arc;

    fn deps() -> WsDeps {
        let bus = EventBus::new();
        let alerts = AlertEngine::new(AlertThresholds::default(), bus.clone());
        let runtime = Arc::new(MockRuntime::new());
        let catalog = Arc::new(ProfileCatalog::bundled());
        let monitor = MonitorService::new(
            catalog,
            runtime.clone(),
            bus.clone(),
            alerts.clone(),
            MonitorConfig::default(),
        );
        let sampler = ResourceSampler::new(runtime, std::path::PathBuf::from("/"));
        let broadcaster = Broadcaster::new(monitor, sampler, bus.clone(), BroadcasterConfig::default());
        let shutdown = Shutdown::new();
        let tasks = TaskSupervisor::new(bus.clone(), shutdown.to_signal());
        let sync = SyncManager::new(SyncManagerConfig::default(), bus.clone(), alerts);
        WsDeps {
            bus,
            broadcaster,
            tasks,
            sync,
            node_service_id: "kaspa-node".to_string(),
        }
    }

    #[tokio::test]
    async fn subscribe_returns_an_initial_snapshot() {
        let deps = deps();
        let mut subs = HashSet::new();
        let presence = deps.broadcaster.presence();
        let mut hidden = false;

        let replies = handle_incoming(
            r#"{"type":"subscribe","channel":"updates:services"}"#,
            &deps,
            &mut subs,
            &presence,
            &mut hidden,
        )
        .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_type, "initial_data");
        assert!(subs.contains("updates:services"));
    }

    #[tokio::test]
    async fn visibility_updates_presence() {
        let deps = deps();
        let mut subs = HashSet::new();
        let presence = deps.broadcaster.presence();
        presence.attach();
        let mut hidden = false;

        handle_incoming(r#"{"type":"visibility","hidden":true}"#, &deps, &mut subs, &presence, &mut hidden).await;
        assert!(hidden);
        assert!(presence.all_hidden());
        handle_incoming(r#"{"type":"visibility","hidden":false}"#, &deps, &mut subs, &presence, &mut hidden).await;
        assert!(!hidden);
        assert!(!presence.all_hidden());
    }

    #[tokio::test]
    async fn unknown_message_types_report_an_error() {
        let deps = deps();
        let mut subs = HashSet::new();
        let presence = deps.broadcaster.presence();
        let mut hidden = false;
        let replies = handle_incoming(r#"{"type":"frobnicate"}"#, &deps, &mut subs, &presence, &mut hidden).await;
        assert_eq!(replies[0].message_type, "error");
    }

    #[tokio::test]
    async fn tasks_list_round_trips() {
        let deps = deps();
        let mut subs = HashSet::new();
        let presence = deps.broadcaster.presence();
        let mut hidden = false;
        let replies = handle_incoming(r#"{"type":"tasks:list"}"#, &deps, &mut subs, &presence, &mut hidden).await;
        assert_eq!(replies[0].message_type, "tasks:list");
        assert!(replies[0].data["tasks"].as_array().unwrap().is_empty());
    }
}
