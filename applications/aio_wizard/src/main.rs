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
mod client;

use log::*;
use std::{net::SocketAddr, path::PathBuf};
use structopt::{clap::ErrorKind as ClapErrorKind, StructOpt};

const LOG_TARGET: &str = "aio::wizard";

/// Exit codes: 0 success, 1 operational error, 2 misuse.
const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, StructOpt)]
#[structopt(name = "aio_wizard", about = "Kaspa AIO installation and reconfiguration wizard")]
struct Opt {
    #[structopt(long, env = "WIZARD_HOST", default_value = "127.0.0.1")]
    host: String,
    #[structopt(long, env = "WIZARD_PORT", default_value = "3000")]
    port: u16,
    /// Root directory containing the declarative artifacts and backups.
    #[structopt(long, env = "PROJECT_ROOT", default_value = ".")]
    project_root: PathBuf,
    #[structopt(long, env = "WIZARD_VERSION", default_value = "0.4.1")]
    version: String,
    #[structopt(long, env = "KASPA_NODE_HOST", default_value = "127.0.0.1")]
    kaspa_node_host: String,
    #[structopt(long, env = "KASPA_NODE_PORT", default_value = "16110")]
    kaspa_node_port: u16,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Run the wizard controller as a long-lived HTTP service.
    Start,
    /// Stop a running wizard controller.
    Stop,
    /// Print the controller's health document.
    Status,
    /// Tail a service's logs through the controller.
    Logs {
        service: String,
        #[structopt(long, default_value = "100")]
        tail: usize,
    },
    /// Print a one-shot reconfiguration link for the browser wizard.
    Reconfigure,
    /// Restart the given services, dependency aware.
    Restart { services: Vec<String> },
}

fn main() {
    let opt = match Opt::from_iter_safe(std::env::args()) {
        Ok(opt) => opt,
        Err(err) => {
            if matches!(err.kind, ClapErrorKind::HelpDisplayed | ClapErrorKind::VersionDisplayed) {
                println!("{}", err.message);
                std::process::exit(EXIT_OK);
            }
            eprintln!("{}", err.message);
            std::process::exit(EXIT_USAGE);
        },
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start the async runtime: {}", err);
            std::process::exit(EXIT_ERROR);
        },
    };
    let code = runtime.block_on(run(opt));
    std::process::exit(code);
}

async fn run(opt: Opt) -> i32 {
    match &opt.command {
        Command::Start => match serve(&opt).await {
            Ok(()) => EXIT_OK,
            Err(err) => {
                eprintln!("error: {:#}", err);
                EXIT_ERROR
            },
        },
        command => {
            let client = client::WizardClient::new(&opt.host, opt.port);
            let result = match command {
                Command::Stop => client.stop().await,
                Command::Status => client.status().await,
                Command::Logs { service, tail } => client.logs(service, *tail).await,
                Command::Reconfigure => client.reconfigure_link().await,
                Command::Restart { services } => client.restart(services).await,
                Command::Start => unreachable!("handled above"),
            };
            match result {
                Ok(value) => {
                    match serde_json::to_string_pretty(&value) {
                        Ok(text) => println!("{}", text),
                        Err(_) => println!("{}", value),
                    }
                    EXIT_OK
                },
                Err(err) => {
                    eprintln!("error: {:#}", err);
                    EXIT_ERROR
                },
            }
        },
    }
}

async fn serve(opt: &Opt) -> anyhow::Result<()> {
    let address: SocketAddr = format!("{}:{}", opt.host, opt.port).parse()?;
    let mut shutdown = kaspa_aio_shutdown::Shutdown::new();
    let (shutdown_request_tx, mut shutdown_request_rx) = tokio::sync::mpsc::channel(1);

    let ctx = bootstrap::build(
        bootstrap::WizardConfig {
            project_root: opt.project_root.clone(),
            node_host: opt.kaspa_node_host.clone(),
            node_port: opt.kaspa_node_port,
            version: opt.version.clone(),
            base_url: format!("http://{}:{}", opt.host, opt.port),
        },
        shutdown.to_signal(),
        shutdown_request_tx,
    )
    .await;
    bootstrap::spawn_workers(&ctx, shutdown.to_signal());
    bootstrap::restore_background_tasks(&ctx).await;

    let signal = shutdown.to_signal();
    let (bound, server) =
        warp::serve(api::routes(ctx.clone())).bind_with_graceful_shutdown(address, signal);
    info!(target: LOG_TARGET, "wizard controller v{} listening on {}", ctx.version, bound);
    let server = tokio::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(target: LOG_TARGET, "interrupt received, shutting down");
        },
        _ = shutdown_request_rx.recv() => {
            info!(target: LOG_TARGET, "shutdown requested, stopping");
        },
    }
    bootstrap::persist_background_tasks(&ctx).await;
    shutdown.trigger();
    server.await?;
    Ok(())
}
