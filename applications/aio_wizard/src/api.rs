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

//! The wizard HTTP/WebSocket surface: profile validation, install and
//! reconfigure flows, backups and rollback, updates, sync strategy selection
//! and token handoff.

use crate::bootstrap::{persist_background_tasks, Context};
use kaspa_aio_app_utilities::{
    reply::{failure, failure_of, failure_with, ok},
    ws::{handle_socket, WsDeps},
};
use kaspa_aio_core::{
    config_store::masking,
    error::{BoundaryError, ErrorKind},
    sync::{EndpointSwitchHook, SyncStrategy},
    tokens::HandoffMode,
    update::{ReconfigureRequest, ServiceUpdate, UpdateError, UpdateRequest},
    validator,
};
use log::*;
use serde::Deserialize;
use serde_json::json;
use std::{collections::BTreeMap, convert::Infallible, sync::Arc};
use warp::{reply::Response, Filter, Rejection, Reply};

const LOG_TARGET: &str = "aio::wizard::api";

pub fn routes(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let profiles = warp::path!("api" / "profiles")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(list_profiles);
    let validate = warp::path!("api" / "profiles" / "validate-selection")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(validate_selection);
    let combined = warp::path!("api" / "resource-check" / "calculate-combined")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(calculate_combined);

    let current_config = warp::path!("api" / "wizard" / "current-config")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(current_config);
    let install = warp::path!("api" / "wizard" / "install")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(install);
    let reconfigure = warp::path!("api" / "wizard" / "reconfigure")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(reconfigure);
    let rollback = warp::path!("api" / "wizard" / "rollback")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(rollback);

    let backups_list = warp::path!("api" / "wizard" / "backups")
        .and(warp::get())
        .and(warp::query::<BackupsQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(list_backups);
    let backups_create = warp::path!("api" / "wizard" / "backups")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(create_backup);
    let backups_get = warp::path!("api" / "wizard" / "backups" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(get_backup);
    let backups_delete = warp::path!("api" / "wizard" / "backups" / String)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and_then(delete_backup);
    let backups_diff = warp::path!("api" / "wizard" / "backups" / String / "diff" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(diff_backups);

    let updates_apply = warp::path!("api" / "wizard" / "updates" / "apply")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(apply_updates);

    let reconfigure_link = warp::path!("api" / "wizard" / "reconfigure-link")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(reconfigure_link);
    let update_link = warp::path!("api" / "wizard" / "update-link")
        .and(warp::get())
        .and(warp::query::<UpdateLinkQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(update_link);
    let token_data = warp::path!("api" / "wizard" / "token-data")
        .and(warp::get())
        .and(warp::query::<TokenQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(token_data);
    let token_consume = warp::path!("api" / "wizard" / "token" / String / "consume")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(consume_token);
    let token_delete = warp::path!("api" / "wizard" / "token" / String)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and_then(delete_token);

    let health = warp::path!("api" / "wizard" / "health")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(health);
    let logs = warp::path!("api" / "wizard" / "logs" / String)
        .and(warp::get())
        .and(warp::query::<LogsQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(service_logs);
    let restart = warp::path!("api" / "wizard" / "services" / "restart")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(restart_services);
    let strategy = warp::path!("api" / "wizard" / "sync" / "strategy")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(choose_strategy);
    let shutdown = warp::path!("api" / "wizard" / "shutdown")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(request_shutdown);

    let ws_deps = WsDeps {
        bus: ctx.bus.clone(),
        broadcaster: ctx.broadcaster.clone(),
        tasks: ctx.tasks.clone(),
        sync: ctx.sync.clone(),
        node_service_id: "kaspa-node".to_string(),
    };
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(warp::any().map(move || ws_deps.clone()))
        .map(|upgrade: warp::ws::Ws, deps: WsDeps| {
            upgrade.on_upgrade(move |socket| handle_socket(socket, deps))
        });

    profiles
        .or(validate)
        .or(combined)
        .or(current_config)
        .or(install)
        .or(reconfigure)
        .or(rollback)
        .or(backups_diff)
        .or(backups_list)
        .or(backups_create)
        .or(backups_get)
        .or(backups_delete)
        .or(updates_apply)
        .or(reconfigure_link)
        .or(update_link)
        .or(token_data)
        .or(token_consume)
        .or(token_delete)
        .or(health)
        .or(logs)
        .or(restart)
        .or(strategy)
        .or(shutdown)
        .or(websocket)
        .with(warp::log("aio_wizard"))
}

fn with_ctx(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

#[derive(Debug, Deserialize)]
struct SelectionBody {
    profiles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallBody {
    profiles: Vec<String>,
    #[serde(default)]
    config: BTreeMap<String, String>,
    #[serde(default)]
    create_backup: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollbackBody {
    backup_id: String,
    #[serde(default)]
    create_backup_before_restore: bool,
}

#[derive(Debug, Deserialize)]
struct BackupsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateBackupBody {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateLinkQuery {
    /// `service:version` pairs, comma separated.
    updates: String,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    tail: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RestartBody {
    services: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrategyBody {
    strategy: SyncStrategy,
    #[serde(default)]
    auto_switch: bool,
    node: Option<String>,
}

async fn list_profiles(ctx: Context) -> Result<Response, Infallible> {
    let profiles: Vec<_> = ctx.catalog.profiles().collect();
    Ok(ok(&json!({ "profiles": profiles })))
}

async fn validate_selection(body: SelectionBody, ctx: Context) -> Result<Response, Infallible> {
    let report = validator::validate(&ctx.catalog, &body.profiles, Some(&ctx.host_capacity));
    Ok(ok(&report))
}

async fn calculate_combined(body: SelectionBody, ctx: Context) -> Result<Response, Infallible> {
    let resolved = body
        .profiles
        .iter()
        .map(|p| ctx.catalog.resolve_profile_id(p).to_string())
        .collect();
    let combined = validator::calculate_combined(&ctx.catalog, &resolved);
    Ok(ok(&json!({ "combined": combined, "host": ctx.host_capacity })))
}

async fn current_config(ctx: Context) -> Result<Response, Infallible> {
    let env = match ctx.store.read_env().await {
        Ok(env) => env,
        Err(err) => return Ok(failure_of(&err)),
    };
    let state = match ctx.store.read_installation_state().await {
        Ok(state) => state,
        Err(err) => return Ok(failure_of(&err)),
    };
    Ok(ok(&json!({
        "config": masking::mask_pairs(&env.to_map()),
        "activeProfiles": state.active_profiles,
        "installedAt": state.installed_at,
        "services": state.services,
        "version": ctx.version,
    })))
}

/// First install: validate the selection, write configuration and state, and
/// bring the fleet up in phase order. The response reports whether the node
/// still needs to synchronize.
async fn install(body: InstallBody, ctx: Context) -> Result<Response, Infallible> {
    let report = validator::validate(&ctx.catalog, &body.profiles, Some(&ctx.host_capacity));
    if !report.valid {
        return Ok(failure_with(
            ErrorKind::Validation,
            "profile selection is invalid",
            json!({ "errors": report.errors, "recommendations": report.recommendations }),
        ));
    }

    let mut env = match ctx.store.read_env().await {
        Ok(env) => env,
        Err(err) => return Ok(failure_of(&err)),
    };
    for (key, value) in &body.config {
        env.set(key, value);
    }
    if let Err(err) = ctx.store.write_env(&env).await {
        return Ok(failure_of(&err));
    }

    let resolved: Vec<String> = body
        .profiles
        .iter()
        .map(|p| ctx.catalog.resolve_profile_id(p).to_string())
        .collect();
    let mut state = match ctx.store.read_installation_state().await {
        Ok(state) => state,
        Err(err) => return Ok(failure_of(&err)),
    };
    state.version = ctx.version.clone();
    state.installed_at = Some(chrono::Utc::now());
    state.active_profiles = resolved.clone();
    for phase in &report.startup_order {
        for service in &phase.services {
            if let Some(def) = ctx.catalog.get_service(service) {
                state.record_service_version(service, def.image_tag().unwrap_or("latest"), "installed");
            }
        }
    }
    if let Err(err) = ctx.store.write_installation_state(&state).await {
        return Ok(failure_of(&err));
    }

    if body.create_backup {
        if let Err(err) = ctx.backup.create("post-install", json!({ "profiles": resolved })).await {
            warn!(target: LOG_TARGET, "post-install backup failed: {}", err);
        }
    }

    let started = match ctx.monitor.start_profiles(&resolved, ctx.shutdown.clone()).await {
        Ok(started) => started,
        Err(err) => return Ok(failure_of(&err)),
    };

    // Probe the node once so the caller can offer the strategy choice.
    let sync = ctx.sync.probe("kaspa-node").await.ok();
    let sync_required = sync.as_ref().map(|s| !s.is_synced).unwrap_or(false);
    Ok(ok(&json!({
        "success": true,
        "started": started,
        "activeProfiles": resolved,
        "sync": sync,
        "syncRequired": sync_required,
    })))
}

async fn reconfigure(request: ReconfigureRequest, ctx: Context) -> Result<Response, Infallible> {
    match ctx.update.reconfigure(request, ctx.shutdown.clone()).await {
        Ok(report) => Ok(ok(&json!({
            "success": true,
            "diff": report.diff.masked(),
            "affectedServices": report.affected_services,
            "restarted": report.restarted,
            "profilesStarted": report.profiles_started,
            "profilesStopped": report.profiles_stopped,
            "backup": report.backup_id,
        }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

/// Restores a snapshot and restarts the services affected by the resulting
/// environment change.
async fn rollback(body: RollbackBody, ctx: Context) -> Result<Response, Infallible> {
    let before = match ctx.store.read_env().await {
        Ok(env) => env,
        Err(err) => return Ok(failure_of(&err)),
    };
    let outcome = match ctx.backup.restore(&body.backup_id, body.create_backup_before_restore).await {
        Ok(outcome) => outcome,
        Err(err) => return Ok(failure_of(&err)),
    };
    let after = match ctx.store.read_env().await {
        Ok(env) => env,
        Err(err) => return Ok(failure_of(&err)),
    };
    let diff = before.diff(&after.to_map());

    // Bounce the services whose configuration changed and are running.
    let mut restarted = Vec::new();
    if !diff.is_empty() {
        let changed: Vec<&str> = diff.keys().collect();
        let mut affected: Vec<String> = Vec::new();
        for profile in ctx.catalog.profiles() {
            if profile.config_keys.iter().any(|k| changed.contains(&k.as_str())) {
                affected.extend(profile.services.iter().cloned());
            }
        }
        affected.sort();
        affected.dedup();
        let mut running = Vec::new();
        for service in affected {
            let up = ctx
                .monitor
                .observation(&service)
                .await
                .map(|o| o.state == kaspa_aio_core::monitor::ServiceState::Running)
                .unwrap_or(false);
            if up {
                running.push(service);
            }
        }
        if !running.is_empty() {
            match ctx.monitor.restart_services(&running, ctx.shutdown.clone()).await {
                Ok(list) => restarted = list,
                Err(err) => {
                    return Ok(failure_with(
                        err.kind(),
                        &err.to_string(),
                        json!({ "restored": outcome.restored_files }),
                    ))
                },
            }
        }
    }

    Ok(ok(&json!({
        "success": true,
        "restored": outcome.restored_files,
        "preRestoreBackup": outcome.pre_restore_snapshot_id,
        "diff": diff.masked(),
        "restarted": restarted,
    })))
}

async fn list_backups(query: BackupsQuery, ctx: Context) -> Result<Response, Infallible> {
    match ctx.backup.list(query.limit).await {
        Ok(backups) => Ok(ok(&json!({ "backups": backups }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn create_backup(body: CreateBackupBody, ctx: Context) -> Result<Response, Infallible> {
    let reason = body.reason.unwrap_or_else(|| "manual".to_string());
    match ctx.backup.create(&reason, json!({})).await {
        Ok(meta) => Ok(ok(&json!({ "success": true, "backup": meta }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn get_backup(backup_id: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx.backup.get(&backup_id).await {
        Ok(info) => Ok(ok(&info)),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn delete_backup(backup_id: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx.backup.delete(&backup_id).await {
        Ok(()) => Ok(ok(&json!({ "success": true, "deleted": backup_id }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn diff_backups(a: String, b: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx.backup.diff(&a, &b).await {
        Ok(diff) => Ok(ok(&json!({ "from": a, "to": b, "diff": diff.masked() }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn apply_updates(request: UpdateRequest, ctx: Context) -> Result<Response, Infallible> {
    match ctx.update.apply(request, ctx.shutdown.clone()).await {
        Ok(report) => Ok(ok(&json!({
            "success": true,
            "backup": report.backup_id,
            "outcomes": report.outcomes,
        }))),
        Err(err @ UpdateError::Failed { .. }) => {
            let details = match &err {
                UpdateError::Failed { report, .. } => serde_json::to_value(report).unwrap_or_default(),
                _ => serde_json::Value::Null,
            };
            Ok(failure_with(err.kind(), &err.to_string(), details))
        },
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn reconfigure_link(ctx: Context) -> Result<Response, Infallible> {
    let state = ctx.store.read_installation_state().await.unwrap_or_default();
    let token = ctx
        .tokens
        .issue(
            HandoffMode::Reconfigure,
            json!({ "activeProfiles": state.active_profiles }),
        )
        .await;
    Ok(ok(&json!({
        "url": format!("{}/?mode=reconfigure&token={}", ctx.base_url, token),
        "token": token,
    })))
}

async fn update_link(query: UpdateLinkQuery, ctx: Context) -> Result<Response, Infallible> {
    let mut updates = Vec::new();
    for pair in query.updates.split(',').filter(|p| !p.is_empty()) {
        match pair.split_once(':') {
            Some((service, version)) if !version.is_empty() => updates.push(ServiceUpdate {
                service_id: service.to_string(),
                target_version: version.to_string(),
            }),
            _ => {
                return Ok(failure(
                    ErrorKind::Validation,
                    &format!("malformed update spec `{}`, expected service:version", pair),
                ))
            },
        }
    }
    if updates.is_empty() {
        return Ok(failure(ErrorKind::Validation, "no updates given"));
    }
    let token = ctx
        .tokens
        .issue(HandoffMode::Update, json!({ "updates": updates }))
        .await;
    Ok(ok(&json!({
        "url": format!("{}/?mode=update&token={}", ctx.base_url, token),
        "token": token,
    })))
}

async fn token_data(query: TokenQuery, ctx: Context) -> Result<Response, Infallible> {
    match ctx.tokens.peek(&query.token).await {
        Ok(data) => Ok(ok(&data)),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn consume_token(token: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx.tokens.consume(&token).await {
        Ok(data) => Ok(ok(&json!({ "success": true, "mode": data.mode, "payload": data.payload }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn delete_token(token: String, ctx: Context) -> Result<Response, Infallible> {
    let removed = ctx.tokens.invalidate(&token).await;
    Ok(ok(&json!({ "success": true, "removed": removed })))
}

async fn health(ctx: Context) -> Result<Response, Infallible> {
    let runtime = ctx.runtime.runtime_info().await;
    let uptime_secs = (chrono::Utc::now() - ctx.started_at).num_seconds();
    Ok(ok(&json!({
        "status": "ok",
        "version": ctx.version,
        "uptimeSecs": uptime_secs,
        "runtime": match runtime {
            Ok(info) => json!(info),
            Err(err) => json!({ "running": false, "error": err.to_string() }),
        },
    })))
}

async fn service_logs(service_id: String, query: LogsQuery, ctx: Context) -> Result<Response, Infallible> {
    if ctx.catalog.get_service(&service_id).is_none() {
        return Ok(failure(ErrorKind::Validation, &format!("unknown service `{}`", service_id)));
    }
    let tail = query.tail.unwrap_or(100).min(5_000);
    match ctx.runtime.logs(&service_id, tail).await {
        Ok(logs) => Ok(ok(&json!({ "service": service_id, "tail": tail, "logs": logs }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn restart_services(body: RestartBody, ctx: Context) -> Result<Response, Infallible> {
    match ctx.monitor.restart_services(&body.services, ctx.shutdown.clone()).await {
        Ok(restarted) => Ok(ok(&json!({ "success": true, "restarted": restarted }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

/// Applies the chosen strategy for an unsynced node.
async fn choose_strategy(body: StrategyBody, ctx: Context) -> Result<Response, Infallible> {
    let node = body.node.unwrap_or_else(|| "kaspa-node".to_string());
    ctx.bus.publish(
        "sync:status",
        "sync:strategy-chosen",
        json!({ "node": node, "strategy": body.strategy }),
    );

    match body.strategy {
        SyncStrategy::Wait => {
            // Host the blocking observation server-side; progress streams over
            // the sync channels.
            let sync = ctx.sync.clone();
            let shutdown = ctx.shutdown.clone();
            let node_key = node.clone();
            tokio::spawn(async move {
                if let Err(err) = sync.wait_until_synced(&node_key, shutdown).await {
                    warn!(target: LOG_TARGET, "sync wait for {} ended: {}", node_key, err);
                }
            });
            Ok(ok(&json!({ "success": true, "strategy": "wait", "node": node })))
        },
        SyncStrategy::Background => {
            let hook = if body.auto_switch {
                Some(Arc::new(EndpointSwitchHook::new(
                    ctx.store.clone(),
                    "KASPA_NODE_ENDPOINT",
                    &ctx.node_endpoint,
                    ctx.bus.clone(),
                )) as Arc<dyn kaspa_aio_core::tasks::CompletionHook>)
            } else {
                None
            };
            // Dependents use the public endpoint while the local node catches
            // up.
            let mut env = match ctx.store.read_env().await {
                Ok(env) => env,
                Err(err) => return Ok(failure_of(&err)),
            };
            env.set("KASPA_NODE_ENDPOINT", ctx.sync.fallback_endpoint());
            if let Err(err) = ctx.store.write_env(&env).await {
                return Ok(failure_of(&err));
            }

            match ctx.sync.start_background_sync(&ctx.tasks, &node, &node, hook).await {
                Ok(task_id) => {
                    persist_background_tasks(&ctx).await;
                    Ok(ok(&json!({
                        "success": true,
                        "strategy": "background",
                        "taskId": task_id,
                        "fallbackEndpoint": ctx.sync.fallback_endpoint(),
                        "autoSwitch": body.auto_switch,
                    })))
                },
                Err(err) => Ok(failure_of(&err)),
            }
        },
        SyncStrategy::Skip => {
            let mut env = match ctx.store.read_env().await {
                Ok(env) => env,
                Err(err) => return Ok(failure_of(&err)),
            };
            env.set("KASPA_NODE_ENDPOINT", ctx.sync.fallback_endpoint());
            match ctx.store.write_env(&env).await {
                Ok(()) => Ok(ok(&json!({
                    "success": true,
                    "strategy": "skip",
                    "endpoint": ctx.sync.fallback_endpoint(),
                }))),
                Err(err) => Ok(failure_of(&err)),
            }
        },
    }
}

async fn request_shutdown(ctx: Context) -> Result<Response, Infallible> {
    info!(target: LOG_TARGET, "shutdown requested over the API");
    persist_background_tasks(&ctx).await;
    let _ = ctx.shutdown_request.send(()).await;
    Ok(ok(&json!({ "success": true, "stopping": true })))
}
