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

//! The dashboard HTTP/WebSocket surface.

use crate::bootstrap::Context;
use kaspa_aio_app_utilities::{
    reply::{failure, failure_of, failure_with, ok},
    ws::{handle_socket, WsDeps},
};
use kaspa_aio_core::{
    config_store::masking,
    error::{BoundaryError, ErrorKind},
    update::{ReconfigureRequest, ServiceUpdate, UpdateError, UpdateRequest},
};
use log::*;
use serde::Deserialize;
use serde_json::json;
use std::{collections::BTreeMap, convert::Infallible, time::Duration};
use warp::{reply::Response, Filter, Rejection, Reply};

const LOG_TARGET: &str = "aio::dashboard::api";

const WALLET_RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub fn routes(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let status = warp::path!("api" / "status")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(get_status);
    let resources = warp::path!("api" / "resources")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(get_resources);
    let alerts = warp::path!("api" / "alerts")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(get_alerts);
    let ack_alert = warp::path!("api" / "alerts" / String / "acknowledge")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(acknowledge_alert);

    let service_start = warp::path!("api" / "services" / String / "start")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(start_service);
    let service_stop = warp::path!("api" / "services" / String / "stop")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(stop_service);
    let service_restart = warp::path!("api" / "services" / String / "restart")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(restart_service);
    let service_logs = warp::path!("api" / "services" / String / "logs")
        .and(warp::get())
        .and(warp::query::<LogsQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(service_logs);

    let get_config = warp::path!("api" / "config")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(read_config);
    let post_config = warp::path!("api" / "config")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(write_config);

    let updates_available = warp::path!("api" / "updates" / "available")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(updates_available);
    let updates_apply = warp::path!("api" / "updates" / "apply")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(apply_updates);
    let updates_apply_all = warp::path!("api" / "updates" / "apply-all")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(apply_all_updates);
    let updates_skip = warp::path!("api" / "updates" / "skip" / String)
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(skip_update);

    let emergency = warp::path!("api" / "system" / "emergency-stop")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(emergency_stop);
    let wallet_rpc = warp::path!("api" / "wallet" / "rpc")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(wallet_rpc);

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

    status
        .or(resources)
        .or(alerts)
        .or(ack_alert)
        .or(service_start)
        .or(service_stop)
        .or(service_restart)
        .or(service_logs)
        .or(get_config)
        .or(post_config)
        .or(updates_available)
        .or(updates_apply)
        .or(updates_apply_all)
        .or(updates_skip)
        .or(emergency)
        .or(wallet_rpc)
        .or(websocket)
        .with(warp::log("aio_dashboard"))
}

fn with_ctx(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    tail: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigBody {
    config: BTreeMap<String, String>,
    #[serde(default)]
    create_backup: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyAllBody {
    #[serde(default)]
    create_backup: bool,
    #[serde(default)]
    breaking_acknowledged: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkipBody {
    version: Option<String>,
}

async fn get_status(ctx: Context) -> Result<Response, Infallible> {
    Ok(ok(&ctx.monitor.observations().await))
}

async fn get_resources(ctx: Context) -> Result<Response, Infallible> {
    let current = ctx.sampler.latest().await;
    let history = ctx.sampler.history(60).await;
    Ok(ok(&json!({ "current": current, "history": history })))
}

async fn get_alerts(ctx: Context) -> Result<Response, Infallible> {
    let active = ctx.alerts.active().await;
    let history = ctx.alerts.history(100).await;
    Ok(ok(&json!({ "active": active, "history": history })))
}

async fn acknowledge_alert(alert_id: String, ctx: Context) -> Result<Response, Infallible> {
    if ctx.alerts.acknowledge(&alert_id).await {
        Ok(ok(&json!({ "success": true, "alertId": alert_id })))
    } else {
        Ok(failure(ErrorKind::Validation, &format!("unknown or closed alert `{}`", alert_id)))
    }
}

async fn start_service(service_id: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx
        .monitor
        .start_services(&[service_id], ctx.shutdown.clone())
        .await
    {
        Ok(started) => Ok(ok(&json!({ "success": true, "started": started }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn stop_service(service_id: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx.monitor.stop_services(&[service_id]).await {
        Ok(stopped) => Ok(ok(&json!({ "success": true, "stopped": stopped }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn restart_service(service_id: String, ctx: Context) -> Result<Response, Infallible> {
    match ctx
        .monitor
        .restart_services(&[service_id], ctx.shutdown.clone())
        .await
    {
        Ok(restarted) => Ok(ok(&json!({ "success": true, "restarted": restarted }))),
        Err(err) => Ok(failure_of(&err)),
    }
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

async fn read_config(ctx: Context) -> Result<Response, Infallible> {
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
        "version": state.version,
    })))
}

async fn write_config(body: ConfigBody, ctx: Context) -> Result<Response, Infallible> {
    let request = ReconfigureRequest {
        config: body.config,
        profiles: None,
        create_backup: body.create_backup.unwrap_or(true),
    };
    match ctx.update.reconfigure(request, ctx.shutdown.clone()).await {
        Ok(report) => Ok(ok(&json!({
            "success": true,
            "diff": report.diff.masked(),
            "affectedServices": report.affected_services,
            "restarted": report.restarted,
            "backup": report.backup_id,
        }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn updates_available(ctx: Context) -> Result<Response, Infallible> {
    match ctx.update.available().await {
        Ok(updates) => Ok(ok(&json!({ "updates": updates }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn apply_updates(request: UpdateRequest, ctx: Context) -> Result<Response, Infallible> {
    Ok(run_update(&ctx, request).await)
}

async fn apply_all_updates(body: ApplyAllBody, ctx: Context) -> Result<Response, Infallible> {
    let available = match ctx.update.available().await {
        Ok(available) => available,
        Err(err) => return Ok(failure_of(&err)),
    };
    if available.is_empty() {
        return Ok(ok(&json!({ "success": true, "outcomes": [] })));
    }
    let request = UpdateRequest {
        updates: available
            .into_iter()
            .map(|u| ServiceUpdate {
                service_id: u.service_id,
                target_version: u.target_version,
            })
            .collect(),
        create_backup: body.create_backup,
        breaking_acknowledged: body.breaking_acknowledged,
    };
    Ok(run_update(&ctx, request).await)
}

async fn run_update(ctx: &Context, request: UpdateRequest) -> Response {
    match ctx.update.apply(request, ctx.shutdown.clone()).await {
        Ok(report) => ok(&json!({
            "success": true,
            "backup": report.backup_id,
            "outcomes": report.outcomes,
        })),
        Err(err @ UpdateError::Failed { .. }) => {
            warn!(target: LOG_TARGET, "update failed: {}", err);
            let details = match &err {
                UpdateError::Failed { report, .. } => serde_json::to_value(report).unwrap_or_default(),
                _ => serde_json::Value::Null,
            };
            failure_with(err.kind(), &err.to_string(), details)
        },
        Err(err) => failure_of(&err),
    }
}

async fn skip_update(service_id: String, body: SkipBody, ctx: Context) -> Result<Response, Infallible> {
    let version = match body.version {
        Some(version) => version,
        None => {
            // Default to the currently offered version.
            match ctx.update.available().await {
                Ok(available) => match available.into_iter().find(|u| u.service_id == service_id) {
                    Some(update) => update.target_version,
                    None => {
                        return Ok(failure(
                            ErrorKind::Validation,
                            &format!("no update pending for `{}`", service_id),
                        ))
                    },
                },
                Err(err) => return Ok(failure_of(&err)),
            }
        },
    };
    match ctx.update.skip(&service_id, &version).await {
        Ok(()) => Ok(ok(&json!({ "success": true, "service": service_id, "skipped": version }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

async fn emergency_stop(ctx: Context) -> Result<Response, Infallible> {
    match ctx.monitor.emergency_stop(&ctx.emergency_allowlist).await {
        Ok(stopped) => Ok(ok(&json!({ "success": true, "stopped": stopped, "spared": ctx.emergency_allowlist }))),
        Err(err) => Ok(failure_of(&err)),
    }
}

/// Forwards a JSON-RPC body to the wallet service verbatim and relays the
/// response.
async fn wallet_rpc(body: serde_json::Value, ctx: Context) -> Result<Response, Infallible> {
    let response = ctx
        .http
        .post(&ctx.wallet_rpc_url)
        .json(&body)
        .timeout(WALLET_RPC_TIMEOUT)
        .send()
        .await;
    match response {
        Ok(response) => match response.json::<serde_json::Value>().await {
            Ok(value) => Ok(ok(&value)),
            Err(err) => Ok(failure(ErrorKind::RpcError, &format!("invalid wallet response: {}", err))),
        },
        Err(err) if err.is_timeout() => Ok(failure(ErrorKind::RpcTimeout, "wallet RPC timed out")),
        Err(err) => Ok(failure(ErrorKind::RpcError, &err.to_string())),
    }
}
