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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use strum_macros::Display;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskKind {
    NodeSync,
    IndexerSync,
    DbMigration,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Complete,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error | TaskStatus::Cancelled)
    }
}

/// What a poller reports back each cycle.
#[derive(Debug, Clone, Default)]
pub struct TaskProgress {
    pub completed: bool,
    /// 0..=100
    pub progress: f64,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl TaskProgress {
    pub fn running(progress: f64) -> Self {
        Self {
            progress,
            ..Default::default()
        }
    }

    pub fn complete() -> Self {
        Self {
            completed: true,
            progress: 100.0,
            ..Default::default()
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// The periodic check driving a task. Must not mutate task state itself; the
/// supervisor serializes all mutation per task.
#[async_trait]
pub trait ProgressChecker: Send + Sync {
    async fn check(&self, task: &TaskRecord) -> TaskProgress;
}

/// Runs once when a task completes successfully.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_complete(&self, task: &TaskRecord);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: String,
    pub kind: TaskKind,
    pub service_id: String,
    pub status: TaskStatus,
    pub progress_pct: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub poll_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub struct TaskSpec {
    pub kind: TaskKind,
    pub service_id: String,
    pub metadata: serde_json::Value,
    pub poll_interval: Duration,
    pub checker: Arc<dyn ProgressChecker>,
    pub on_complete: Option<Arc<dyn CompletionHook>>,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, service_id: &str, checker: Arc<dyn ProgressChecker>) -> Self {
        Self {
            kind,
            service_id: service_id.to_string(),
            metadata: serde_json::Value::Null,
            poll_interval: DEFAULT_POLL_INTERVAL,
            checker,
            on_complete: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_completion_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.on_complete = Some(hook);
        self
    }
}

/// Adapts a plain async closure into a `ProgressChecker`.
pub struct FnChecker<F>(pub F);

#[async_trait]
impl<F, Fut> ProgressChecker for FnChecker<F>
where
    F: Fn(TaskRecord) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = TaskProgress> + Send,
{
    async fn check(&self, task: &TaskRecord) -> TaskProgress {
        (self.0)(task.clone()).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn kinds_serialize_kebab_case() {
        assert_eq!(serde_json::to_string(&TaskKind::NodeSync).unwrap(), "\"node-sync\"");
        assert_eq!(TaskKind::NodeSync.to_string(), "node-sync");
    }
}
