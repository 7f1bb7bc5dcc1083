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

mod api;
mod bootstrap;

use log::*;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use structopt::StructOpt;

const LOG_TARGET: &str = "aio::dashboard";

#[derive(Debug, StructOpt)]
#[structopt(name = "aio_dashboard", about = "Kaspa AIO dashboard controller")]
struct Opt {
    #[structopt(long, env = "DASHBOARD_HOST", default_value = "0.0.0.0")]
    host: String,
    #[structopt(long, env = "DASHBOARD_PORT", default_value = "8080")]
    port: u16,
    /// Root directory containing the declarative artifacts and backups.
    #[structopt(long, env = "PROJECT_ROOT", default_value = ".")]
    project_root: PathBuf,
    #[structopt(long, env = "KASPA_NODE_HOST", default_value = "127.0.0.1")]
    kaspa_node_host: String,
    #[structopt(long, env = "KASPA_NODE_PORT", default_value = "16110")]
    kaspa_node_port: u16,
    /// Override for the broadcast cadence, in milliseconds.
    #[structopt(long, env = "UPDATE_INTERVAL_MS")]
    update_interval_ms: Option<u64>,
    /// Broadcast cadence while every client tab is hidden, in milliseconds.
    #[structopt(long, env = "HIDDEN_TAB_INTERVAL_MS")]
    hidden_tab_interval_ms: Option<u64>,
    #[structopt(long, env = "WALLET_RPC_URL", default_value = "http://127.0.0.1:8082/")]
    wallet_rpc_url: String,
    /// Services spared by POST /api/system/emergency-stop.
    #[structopt(long, use_delimiter = true, default_value = "kaspa-node,nginx")]
    emergency_allowlist: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let address: SocketAddr = format!("{}:{}", opt.host, opt.port).parse()?;
    let mut shutdown = kaspa_aio_shutdown::Shutdown::new();

    let ctx = bootstrap::build(
        bootstrap::DashboardConfig {
            project_root: opt.project_root,
            node_host: opt.kaspa_node_host,
            node_port: opt.kaspa_node_port,
            update_interval: opt.update_interval_ms.map(Duration::from_millis),
            hidden_tab_interval: opt.hidden_tab_interval_ms.map(Duration::from_millis),
            wallet_rpc_url: opt.wallet_rpc_url,
            emergency_allowlist: opt.emergency_allowlist,
        },
        shutdown.to_signal(),
    );
    bootstrap::spawn_workers(&ctx, shutdown.to_signal());

    let signal = shutdown.to_signal();
    let (bound, server) = warp::serve(api::routes(ctx)).bind_with_graceful_shutdown(address, signal);
    info!(target: LOG_TARGET, "dashboard controller listening on {}", bound);
    let server = tokio::spawn(server);

    tokio::signal::ctrl_c().await?;
    info!(target: LOG_TARGET, "shutting down");
    shutdown.trigger();
    server.await?;
    Ok(())
}
