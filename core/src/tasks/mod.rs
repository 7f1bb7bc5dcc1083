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

//! # Background task supervisor
//!
//! A registry of long-running operations, each driven by its own poller.
//! Pollers are mutually non-blocking; state mutation is serialized per task.
//! The event sequence of any task is `started, progress*, (paused, resumed)*`
//! followed by exactly one terminal event, after which the task only exists
//! as a read-only record until the cleanup sweep collects it.

mod task;

pub use self::task::{
    CompletionHook, FnChecker, ProgressChecker, TaskKind, TaskProgress, TaskRecord, TaskSpec, TaskStatus,
    DEFAULT_POLL_INTERVAL,
};

use crate::events::{channels, EventBus};
use chrono::Utc;
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{watch, Mutex, RwLock};

const LOG_TARGET: &str = "aio::tasks";

/// Terminal tasks are queryable for this long before the sweep removes them.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Unknown task `{0}`")]
    NotFound(String),
    #[error("Task `{task_id}` is {status}; cannot {action}")]
    InvalidState {
        task_id: String,
        status: TaskStatus,
        action: &'static str,
    },
}

impl crate::error::BoundaryError for TaskError {
    fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::Validation
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskControl {
    Run,
    Pause,
    Cancel,
}

struct TaskEntry {
    record: Mutex<TaskRecord>,
    checker: Arc<dyn ProgressChecker>,
    on_complete: Option<Arc<dyn CompletionHook>>,
    control: watch::Sender<TaskControl>,
    control_rx: watch::Receiver<TaskControl>,
    started: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub kind: Option<TaskKind>,
    pub service_id: Option<String>,
    pub status: Option<TaskStatus>,
}

struct Inner {
    tasks: RwLock<HashMap<String, Arc<TaskEntry>>>,
    bus: EventBus,
    retention: Duration,
    next_seq: AtomicU64,
    shutdown: ShutdownSignal,
}

#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

impl TaskSupervisor {
    pub fn new(bus: EventBus, shutdown: ShutdownSignal) -> Self {
        Self::with_retention(bus, shutdown, DEFAULT_RETENTION)
    }

    pub fn with_retention(bus: EventBus, shutdown: ShutdownSignal, retention: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: RwLock::new(HashMap::new()),
                bus,
                retention,
                next_seq: AtomicU64::new(0),
                shutdown,
            }),
        }
    }

    pub async fn register(&self, spec: TaskSpec) -> String {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = format!("task-{}-{}", spec.kind, seq);
        let now = Utc::now();
        let record = TaskRecord {
            task_id: task_id.clone(),
            kind: spec.kind,
            service_id: spec.service_id,
            status: TaskStatus::Pending,
            progress_pct: 0.0,
            created_at: now,
            started_at: None,
            last_update: now,
            metadata: spec.metadata,
            poll_interval_ms: spec.poll_interval.as_millis() as u64,
            error: None,
        };
        let (control, control_rx) = watch::channel(TaskControl::Run);
        let entry = Arc::new(TaskEntry {
            record: Mutex::new(record),
            checker: spec.checker,
            on_complete: spec.on_complete,
            control,
            control_rx,
            started: AtomicBool::new(false),
        });
        self.inner.tasks.write().await.insert(task_id.clone(), entry);
        debug!(target: LOG_TARGET, "registered {}", task_id);
        task_id
    }

    /// Spawns the task's poller. A task starts at most once.
    pub async fn start(&self, task_id: &str) -> Result<(), TaskError> {
        let entry = self.entry(task_id).await?;
        {
            let record = entry.record.lock().await;
            if record.status != TaskStatus::Pending {
                return Err(TaskError::InvalidState {
                    task_id: task_id.to_string(),
                    status: record.status,
                    action: "start",
                });
            }
        }
        if entry.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let supervisor = self.clone();
        let id = task_id.to_string();
        tokio::spawn(async move {
            supervisor.run_poller(&id, entry).await;
        });
        Ok(())
    }

    pub async fn pause(&self, task_id: &str) -> Result<(), TaskError> {
        let entry = self.entry(task_id).await?;
        let record = entry.record.lock().await;
        if record.status != TaskStatus::Running {
            return Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                status: record.status,
                action: "pause",
            });
        }
        let _ = entry.control.send(TaskControl::Pause);
        Ok(())
    }

    pub async fn resume(&self, task_id: &str) -> Result<(), TaskError> {
        let entry = self.entry(task_id).await?;
        let record = entry.record.lock().await;
        if record.status != TaskStatus::Paused && *entry.control_rx.borrow() != TaskControl::Pause {
            return Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                status: record.status,
                action: "resume",
            });
        }
        let _ = entry.control.send(TaskControl::Run);
        Ok(())
    }

    pub async fn cancel(&self, task_id: &str) -> Result<(), TaskError> {
        let entry = self.entry(task_id).await?;
        let mut record = entry.record.lock().await;
        if record.status.is_terminal() {
            return Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                status: record.status,
                action: "cancel",
            });
        }
        if record.status == TaskStatus::Pending {
            // Never started: finalize in place, there is no poller to signal.
            record.status = TaskStatus::Cancelled;
            record.last_update = Utc::now();
            let snapshot = record.clone();
            drop(record);
            self.emit("task:cancelled", &snapshot);
            return Ok(());
        }
        drop(record);
        let _ = entry.control.send(TaskControl::Cancel);
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        let entry = self.inner.tasks.read().await.get(task_id).cloned()?;
        let record = entry.record.lock().await.clone();
        Some(record)
    }

    pub async fn list(&self, filter: TaskFilter) -> Vec<TaskRecord> {
        let entries: Vec<Arc<TaskEntry>> = self.inner.tasks.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = entry.record.lock().await.clone();
            let keep = filter.kind.map(|k| record.kind == k).unwrap_or(true)
                && filter
                    .service_id
                    .as_ref()
                    .map(|s| &record.service_id == s)
                    .unwrap_or(true)
                && filter.status.map(|s| record.status == s).unwrap_or(true);
            if keep {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Removes terminal tasks whose last update is older than the threshold.
    pub async fn cleanup(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let mut removable = Vec::new();
        {
            let tasks = self.inner.tasks.read().await;
            for (id, entry) in tasks.iter() {
                let record = entry.record.lock().await;
                if record.status.is_terminal() && record.last_update < cutoff {
                    removable.push(id.clone());
                }
            }
        }
        let mut tasks = self.inner.tasks.write().await;
        for id in &removable {
            tasks.remove(id);
            debug!(target: LOG_TARGET, "cleaned up {}", id);
        }
        removable.len()
    }

    pub fn spawn_cleanup_loop(&self) {
        let supervisor = self.clone();
        let mut shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        supervisor.cleanup(supervisor.inner.retention).await;
                    },
                    _ = &mut shutdown => break,
                }
            }
        });
    }

    async fn entry(&self, task_id: &str) -> Result<Arc<TaskEntry>, TaskError> {
        self.inner
            .tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    async fn run_poller(&self, task_id: &str, entry: Arc<TaskEntry>) {
        let mut control_rx = entry.control_rx.clone();
        let mut shutdown = self.inner.shutdown.clone();
        let poll_interval = {
            let mut record = entry.record.lock().await;
            record.status = TaskStatus::Running;
            record.started_at = Some(Utc::now());
            record.last_update = Utc::now();
            let snapshot = record.clone();
            drop(record);
            self.emit("task:started", &snapshot);
            snapshot.poll_interval()
        };

        loop {
            // Copy the control state out; the watch guard must not live
            // across an await.
            let control = *control_rx.borrow();
            match control {
                TaskControl::Cancel => {
                    self.finalize(&entry, TaskStatus::Cancelled, None).await;
                    return;
                },
                TaskControl::Pause => {
                    {
                        let mut record = entry.record.lock().await;
                        record.status = TaskStatus::Paused;
                        record.last_update = Utc::now();
                        let snapshot = record.clone();
                        drop(record);
                        self.emit("task:paused", &snapshot);
                    }
                    // Sleep until the control changes; the poll timer stops.
                    loop {
                        tokio::select! {
                            changed = control_rx.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                                break;
                            },
                            _ = &mut shutdown => return,
                        }
                    }
                    let resumed_to = *control_rx.borrow();
                    match resumed_to {
                        TaskControl::Cancel => {
                            self.finalize(&entry, TaskStatus::Cancelled, None).await;
                            return;
                        },
                        _ => {
                            let mut record = entry.record.lock().await;
                            record.status = TaskStatus::Running;
                            record.last_update = Utc::now();
                            let snapshot = record.clone();
                            drop(record);
                            self.emit("task:resumed", &snapshot);
                        },
                    }
                    continue;
                },
                TaskControl::Run => {},
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {
                    let snapshot = entry.record.lock().await.clone();
                    let progress = entry.checker.check(&snapshot).await;

                    let mut record = entry.record.lock().await;
                    record.progress_pct = progress.progress.max(0.0).min(100.0);
                    record.last_update = Utc::now();
                    if let Some(metadata) = progress.metadata {
                        record.metadata = metadata;
                    }
                    if let Some(error) = progress.error {
                        record.status = TaskStatus::Error;
                        record.error = Some(error);
                        let snapshot = record.clone();
                        drop(record);
                        self.emit("task:error", &snapshot);
                        return;
                    }
                    if progress.completed {
                        record.status = TaskStatus::Complete;
                        record.progress_pct = 100.0;
                        let snapshot = record.clone();
                        drop(record);
                        self.emit("task:complete", &snapshot);
                        if let Some(hook) = &entry.on_complete {
                            hook.on_complete(&snapshot).await;
                        }
                        return;
                    }
                    let snapshot = record.clone();
                    drop(record);
                    self.emit("task:progress", &snapshot);
                },
                changed = control_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // Re-enter the loop head to act on the new control state.
                },
                _ = &mut shutdown => {
                    // Process shutdown: leave the record as-is, emit nothing.
                    return;
                },
            }
        }
    }

    async fn finalize(&self, entry: &TaskEntry, status: TaskStatus, error: Option<String>) {
        let mut record = entry.record.lock().await;
        if record.status.is_terminal() {
            return;
        }
        record.status = status;
        record.error = error;
        record.last_update = Utc::now();
        let snapshot = record.clone();
        drop(record);
        let event = match status {
            TaskStatus::Cancelled => "task:cancelled",
            TaskStatus::Error => "task:error",
            _ => "task:complete",
        };
        self.emit(event, &snapshot);
    }

    fn emit(&self, event: &str, record: &TaskRecord) {
        self.inner.bus.publish(
            channels::TASKS,
            event,
            serde_json::to_value(record).unwrap_or_default(),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kaspa_aio_shutdown::Shutdown;
    use std::sync::atomic::AtomicUsize;

    fn counter_checker(complete_after: usize) -> (Arc<dyn ProgressChecker>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let checker = FnChecker(move |_task: TaskRecord| {
            let calls = calls_in.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= complete_after {
                    TaskProgress::complete()
                } else {
                    TaskProgress::running(n as f64 * 10.0)
                }
            }
        });
        (Arc::new(checker), calls)
    }

    fn spec(checker: Arc<dyn ProgressChecker>) -> TaskSpec {
        TaskSpec::new(TaskKind::Generic, "kaspa-node", checker).with_poll_interval(Duration::from_millis(20))
    }

    async fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<crate::events::BusMessage>) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            events.push(msg.message_type);
        }
        events
    }

    #[tokio::test]
    async fn a_task_runs_to_completion_with_ordered_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let shutdown = Shutdown::new();
        let supervisor = TaskSupervisor::new(bus.clone(), shutdown.to_signal());

        let (checker, _calls) = counter_checker(3);
        let id = supervisor.register(spec(checker)).await;
        assert_eq!(supervisor.get(&id).await.unwrap().status, TaskStatus::Pending);

        supervisor.start(&id).await.unwrap();
        // Wait for the task to finish.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if supervisor.get(&id).await.unwrap().status.is_terminal() {
                break;
            }
        }
        let record = supervisor.get(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Complete);
        assert!((record.progress_pct - 100.0).abs() < f64::EPSILON);

        let events = drain_events(&mut rx).await;
        assert_eq!(events.first().map(|s| s.as_str()), Some("task:started"));
        assert_eq!(events.last().map(|s| s.as_str()), Some("task:complete"));
        // Nothing follows the terminal event.
        assert_eq!(events.iter().filter(|e| *e == "task:complete").count(), 1);
        let terminal_index = events.iter().position(|e| e == "task:complete").unwrap();
        assert_eq!(terminal_index, events.len() - 1);
    }

    #[tokio::test]
    async fn a_checker_error_stops_polling() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let supervisor = TaskSupervisor::new(bus.clone(), shutdown.to_signal());

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let checker = FnChecker(move |_task: TaskRecord| {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                TaskProgress::failed("indexer database unreachable")
            }
        });
        let id = supervisor.register(spec(Arc::new(checker))).await;
        supervisor.start(&id).await.unwrap();

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if supervisor.get(&id).await.unwrap().status.is_terminal() {
                break;
            }
        }
        let record = supervisor.get(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.error.as_deref(), Some("indexer database unreachable"));

        // The poller stopped: no further checks happen.
        let after = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn pause_suspends_polling_and_resume_continues() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let supervisor = TaskSupervisor::new(bus.clone(), shutdown.to_signal());

        let (checker, calls) = counter_checker(1_000);
        let id = supervisor.register(spec(checker)).await;
        supervisor.start(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        supervisor.pause(&id).await.unwrap();
        // Allow the poller to observe the pause.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if supervisor.get(&id).await.unwrap().status == TaskStatus::Paused {
                break;
            }
        }
        assert_eq!(supervisor.get(&id).await.unwrap().status, TaskStatus::Paused);
        let paused_at = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), paused_at);

        supervisor.resume(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(calls.load(Ordering::SeqCst) > paused_at);

        supervisor.cancel(&id).await.unwrap();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if supervisor.get(&id).await.unwrap().status.is_terminal() {
                break;
            }
        }
        assert_eq!(supervisor.get(&id).await.unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_a_pending_task_finalizes_it_directly() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let supervisor = TaskSupervisor::new(bus.clone(), shutdown.to_signal());
        let (checker, _) = counter_checker(10);
        let id = supervisor.register(spec(checker)).await;

        supervisor.cancel(&id).await.unwrap();
        assert_eq!(supervisor.get(&id).await.unwrap().status, TaskStatus::Cancelled);
        // A second cancel is an invalid state transition.
        assert!(matches!(
            supervisor.cancel(&id).await.unwrap_err(),
            TaskError::InvalidState { .. }
        ));
        // Starting a cancelled task is rejected too.
        assert!(matches!(
            supervisor.start(&id).await.unwrap_err(),
            TaskError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn list_filters_by_kind_service_and_status() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let supervisor = TaskSupervisor::new(bus.clone(), shutdown.to_signal());
        let (checker, _) = counter_checker(1_000);
        let a = supervisor
            .register(TaskSpec::new(TaskKind::NodeSync, "kaspa-node", checker.clone()))
            .await;
        let _b = supervisor
            .register(TaskSpec::new(TaskKind::IndexerSync, "simply-kaspa-indexer", checker.clone()))
            .await;

        let node_sync = supervisor
            .list(TaskFilter {
                kind: Some(TaskKind::NodeSync),
                ..Default::default()
            })
            .await;
        assert_eq!(node_sync.len(), 1);
        assert_eq!(node_sync[0].task_id, a);

        let by_service = supervisor
            .list(TaskFilter {
                service_id: Some("simply-kaspa-indexer".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_service.len(), 1);

        let pending = supervisor
            .list(TaskFilter {
                status: Some(TaskStatus::Pending),
                ..Default::default()
            })
            .await;
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_terminal_tasks() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let supervisor = TaskSupervisor::new(bus.clone(), shutdown.to_signal());
        let (checker, _) = counter_checker(1);
        let done = supervisor.register(spec(checker.clone())).await;
        supervisor.start(&done).await.unwrap();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if supervisor.get(&done).await.unwrap().status.is_terminal() {
                break;
            }
        }
        let live = supervisor.register(spec(checker)).await;

        // Nothing is old enough yet.
        assert_eq!(supervisor.cleanup(Duration::from_secs(60)).await, 0);
        // With a zero threshold the terminal task goes, the pending one stays.
        assert_eq!(supervisor.cleanup(Duration::from_secs(0)).await, 1);
        assert!(supervisor.get(&done).await.is_none());
        assert!(supervisor.get(&live).await.is_some());
    }
}
