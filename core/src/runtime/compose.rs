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

//! Production `ContainerRuntime` backed by the `docker` / `docker compose` CLI.

use super::{ContainerInfo, ContainerRuntime, ContainerState, ContainerUsage, EngineHealth, RuntimeError, RuntimeInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::{mpsc, Mutex, OwnedMutexGuard},
    time::timeout,
};

const LOG_TARGET: &str = "aio::runtime::compose";

const DAEMON_DOWN_MARKERS: &[&str] = &["Cannot connect to the Docker daemon", "Is the docker daemon running"];

pub struct ComposeRuntime {
    project_root: PathBuf,
    compose_files: Vec<String>,
    query_timeout: Duration,
    mutation_timeout: Duration,
    service_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ComposeRuntime {
    pub fn new<P: AsRef<Path>>(project_root: P) -> Self {
        let project_root = project_root.as_ref().to_path_buf();
        let mut compose_files = vec!["docker-compose.yml".to_string()];
        if project_root.join("docker-compose.override.yml").exists() {
            compose_files.push("docker-compose.override.yml".to_string());
        }
        Self {
            project_root,
            compose_files,
            query_timeout: Duration::from_secs(30),
            mutation_timeout: Duration::from_secs(300),
            service_locks: Mutex::new(HashMap::new()),
        }
    }

    fn compose_args(&self) -> Vec<String> {
        let mut args = vec!["compose".to_string()];
        for file in &self.compose_files {
            args.push("-f".to_string());
            args.push(file.clone());
        }
        args
    }

    async fn run_docker(&self, args: &[String], deadline: Duration) -> Result<String, RuntimeError> {
        trace!(target: LOG_TARGET, "docker {}", args.join(" "));
        let child = Command::new("docker")
            .args(args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .output();
        let output = match timeout(deadline, child).await {
            Ok(result) => result.map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::Unavailable("docker binary not found on PATH".to_string())
                } else {
                    RuntimeError::Io(err)
                }
            })?,
            Err(_) => return Err(RuntimeError::Timeout(deadline)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if DAEMON_DOWN_MARKERS.iter().any(|m| stderr.contains(m)) {
                return Err(RuntimeError::Unavailable(stderr));
            }
            return Err(RuntimeError::CommandFailed {
                command: format!("docker {}", args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Serializes mutating operations per service. Lock order is sorted to
    /// avoid deadlock between overlapping sets.
    async fn lock_services(&self, service_ids: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<String> = service_ids.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            let lock = {
                let mut locks = self.service_locks.lock().await;
                locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    async fn ps_entries(&self) -> Result<Vec<PsEntry>, RuntimeError> {
        let mut args = self.compose_args();
        args.extend(["ps", "--all", "--format", "json"].iter().map(|s| s.to_string()));
        let stdout = self.run_docker(&args, self.query_timeout).await?;
        parse_ps_output(&stdout)
    }

    async fn container_name_of(&self, service_id: &str) -> Result<String, RuntimeError> {
        self.ps_entries()
            .await?
            .into_iter()
            .find(|e| e.service == service_id)
            .map(|e| e.name)
            .ok_or_else(|| RuntimeError::UnknownService(service_id.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let entries = self.ps_entries().await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        // One inspect call for start times, images and engine health.
        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let mut args = vec!["inspect".to_string()];
        args.extend(names);
        let inspected: Vec<InspectEntry> = match self.run_docker(&args, self.query_timeout).await {
            Ok(stdout) => serde_json::from_str(&stdout)
                .map_err(|e| RuntimeError::UnexpectedOutput(format!("docker inspect: {}", e)))?,
            Err(err) => {
                // A container may disappear between ps and inspect.
                warn!(target: LOG_TARGET, "docker inspect failed, using ps data only: {}", err);
                Vec::new()
            },
        };
        let by_name: HashMap<String, &InspectEntry> = inspected
            .iter()
            .map(|i| (i.name.trim_start_matches('/').to_string(), i))
            .collect();

        let mut containers = Vec::with_capacity(entries.len());
        for entry in entries {
            let state: ContainerState = entry.state.parse()?;
            let detail = by_name.get(entry.name.as_str());
            let started_at = detail.and_then(|d| parse_started_at(&d.state.started_at));
            let engine_health = detail
                .and_then(|d| d.state.health.as_ref())
                .and_then(|h| match h.status.as_str() {
                    "healthy" => Some(EngineHealth::Healthy),
                    "unhealthy" => Some(EngineHealth::Unhealthy),
                    "starting" => Some(EngineHealth::Starting),
                    _ => None,
                });
            let image = detail
                .map(|d| d.config.image.clone())
                .unwrap_or_else(|| entry.image.clone().unwrap_or_default());
            containers.push(ContainerInfo {
                service_id: entry.service,
                container_name: entry.name,
                state,
                started_at,
                image,
                engine_health,
            });
        }
        Ok(containers)
    }

    async fn usage(&self, service_id: &str) -> Result<ContainerUsage, RuntimeError> {
        let name = self.container_name_of(service_id).await?;
        let args = vec![
            "stats".to_string(),
            "--no-stream".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
            name,
        ];
        let stdout = self.run_docker(&args, self.query_timeout).await?;
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| RuntimeError::UnexpectedOutput("empty docker stats output".to_string()))?;
        let stats: StatsEntry =
            serde_json::from_str(line).map_err(|e| RuntimeError::UnexpectedOutput(format!("docker stats: {}", e)))?;
        let (mem_bytes, mem_limit_bytes) = parse_mem_usage(&stats.mem_usage)?;
        Ok(ContainerUsage {
            cpu_pct: parse_percent(&stats.cpu_perc)?,
            mem_bytes,
            mem_limit_bytes,
        })
    }

    async fn up(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
        let _guards = self.lock_services(service_ids).await;
        let mut args = self.compose_args();
        args.extend(["up", "-d"].iter().map(|s| s.to_string()));
        args.extend(service_ids.iter().cloned());
        self.run_docker(&args, self.mutation_timeout).await?;
        Ok(())
    }

    async fn stop(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
        let _guards = self.lock_services(service_ids).await;
        let mut args = self.compose_args();
        args.push("stop".to_string());
        args.extend(service_ids.iter().cloned());
        self.run_docker(&args, self.mutation_timeout).await?;
        Ok(())
    }

    async fn restart(&self, service_ids: &[String]) -> Result<(), RuntimeError> {
        let _guards = self.lock_services(service_ids).await;
        let mut args = self.compose_args();
        args.push("restart".to_string());
        args.extend(service_ids.iter().cloned());
        self.run_docker(&args, self.mutation_timeout).await?;
        Ok(())
    }

    async fn logs(&self, service_id: &str, tail: usize) -> Result<String, RuntimeError> {
        let mut args = self.compose_args();
        args.extend(
            ["logs", "--no-color", "--tail", &tail.to_string(), service_id]
                .iter()
                .map(|s| s.to_string()),
        );
        self.run_docker(&args, self.query_timeout).await
    }

    async fn logs_follow(&self, service_id: &str, tail: usize) -> Result<mpsc::Receiver<String>, RuntimeError> {
        let mut args = self.compose_args();
        args.extend(
            ["logs", "--no-color", "--follow", "--tail", &tail.to_string(), service_id]
                .iter()
                .map(|s| s.to_string()),
        );
        let mut child = Command::new("docker")
            .args(&args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::Unavailable("docker binary not found on PATH".to_string())
                } else {
                    RuntimeError::Io(err)
                }
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::UnexpectedOutput("log stream has no stdout".to_string()))?;
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            // Dropping the child kills the follower process.
            drop(child);
        });
        Ok(rx)
    }

    async fn runtime_info(&self) -> Result<RuntimeInfo, RuntimeError> {
        let info_args = vec!["info".to_string(), "--format".to_string(), "{{json .}}".to_string()];
        let stdout = self.run_docker(&info_args, self.query_timeout).await?;
        let info: EngineInfo =
            serde_json::from_str(stdout.trim()).map_err(|e| RuntimeError::UnexpectedOutput(format!("docker info: {}", e)))?;

        let compose_version = self
            .run_docker(
                &["compose".to_string(), "version".to_string(), "--short".to_string()],
                self.query_timeout,
            )
            .await
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(RuntimeInfo {
            engine_version: info.server_version,
            compose_version,
            running: true,
            container_count: info.containers,
            image_count: info.images,
            memory_limit_gb: info.mem_total.map(|bytes| bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Image")]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "State")]
    state: InspectState,
    #[serde(rename = "Config")]
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "StartedAt")]
    started_at: String,
    #[serde(rename = "Health")]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
struct InspectHealth {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image")]
    image: String,
}

#[derive(Debug, Deserialize)]
struct StatsEntry {
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    #[serde(rename = "MemUsage")]
    mem_usage: String,
}

#[derive(Debug, Deserialize)]
struct EngineInfo {
    #[serde(rename = "ServerVersion")]
    server_version: String,
    #[serde(rename = "Containers", default)]
    containers: u64,
    #[serde(rename = "Images", default)]
    images: u64,
    #[serde(rename = "MemTotal")]
    mem_total: Option<u64>,
}

/// Compose emits either a JSON array or one JSON object per line depending on
/// its version; accept both.
fn parse_ps_output(stdout: &str) -> Result<Vec<PsEntry>, RuntimeError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| RuntimeError::UnexpectedOutput(format!("compose ps: {}", e)));
    }
    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| RuntimeError::UnexpectedOutput(format!("compose ps: {}", e))))
        .collect()
}

fn parse_started_at(raw: &str) -> Option<DateTime<Utc>> {
    // The engine reports the zero time for containers that never started.
    if raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

fn parse_percent(raw: &str) -> Result<f64, RuntimeError> {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| RuntimeError::UnexpectedOutput(format!("bad percentage `{}`", raw)))
}

fn parse_mem_usage(raw: &str) -> Result<(u64, Option<u64>), RuntimeError> {
    let mut parts = raw.splitn(2, '/');
    let used = parts
        .next()
        .ok_or_else(|| RuntimeError::UnexpectedOutput(format!("bad mem usage `{}`", raw)))?;
    let used_bytes = parse_size(used.trim())?;
    let limit_bytes = match parts.next() {
        Some(limit) => Some(parse_size(limit.trim())?),
        None => None,
    };
    Ok((used_bytes, limit_bytes))
}

fn parse_size(raw: &str) -> Result<u64, RuntimeError> {
    const UNITS: &[(&str, f64)] = &[
        ("TiB", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("TB", 1e12),
        ("GB", 1e9),
        ("MB", 1e6),
        ("kB", 1e3),
        ("B", 1.0),
    ];
    let raw = raw.trim();
    for (suffix, factor) in UNITS {
        if let Some(number) = raw.strip_suffix(suffix) {
            let value: f64 = number
                .trim()
                .parse()
                .map_err(|_| RuntimeError::UnexpectedOutput(format!("bad size `{}`", raw)))?;
            return Ok((value * factor) as u64);
        }
    }
    Err(RuntimeError::UnexpectedOutput(format!("bad size `{}`", raw)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ps_output_parses_both_array_and_line_formats() {
        let array = r#"[{"Service":"kaspa-node","Name":"kaspad","State":"running","Image":"kaspanet/kaspad:v0.12.19"}]"#;
        let lines = "{\"Service\":\"kaspa-node\",\"Name\":\"kaspad\",\"State\":\"running\"}\n{\"Service\":\"nginx\",\"Name\":\"aio-nginx\",\"State\":\"exited\"}";
        assert_eq!(parse_ps_output(array).unwrap().len(), 1);
        let parsed = parse_ps_output(lines).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].state, "exited");
        assert!(parse_ps_output("").unwrap().is_empty());
    }

    #[test]
    fn sizes_parse_in_binary_and_decimal_units() {
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("1KiB").unwrap(), 1024);
        assert_eq!(parse_size("24.5MiB").unwrap(), (24.5 * 1024.0 * 1024.0) as u64);
        assert_eq!(parse_size("2GB").unwrap(), 2_000_000_000);
        assert!(parse_size("banana").is_err());
    }

    #[test]
    fn mem_usage_splits_used_and_limit() {
        let (used, limit) = parse_mem_usage("24.5MiB / 7.668GiB").unwrap();
        assert_eq!(used, (24.5 * 1024.0 * 1024.0) as u64);
        assert_eq!(limit, Some((7.668 * 1024.0 * 1024.0 * 1024.0) as u64));
    }

    #[test]
    fn percentages_strip_the_sign() {
        assert!((parse_percent("1.25%").unwrap() - 1.25).abs() < f64::EPSILON);
        assert!(parse_percent("--").is_err());
    }

    #[test]
    fn zero_start_time_means_never_started() {
        assert!(parse_started_at("0001-01-01T00:00:00Z").is_none());
        assert!(parse_started_at("2024-05-01T10:00:00.123456789Z").is_some());
    }
}
