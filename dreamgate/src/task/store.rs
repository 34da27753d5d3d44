//! In-memory task registry.
//!
//! Owns every task exclusively; workers and the HTTP surface only ever
//! see clones. All mutation goes through [`TaskStore::transition`], which
//! enforces the transition table, maintains timestamps, and releases the
//! armed timeout and cancellation token when a task goes terminal.

use super::types::{Task, TaskParams, TaskStatus, TaskType};
use super::TaskError;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the reaper scans for expired terminal tasks.
pub const TASK_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Optional fields applied together with a transition.
#[derive(Debug, Default)]
pub struct TransitionExtra {
    pub result: Option<Vec<String>>,
    pub error: Option<String>,
    pub progress: Option<u8>,
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Thread-safe task registry.
pub struct TaskStore {
    tasks: DashMap<String, Task>,
    cancel_tokens: DashMap<String, CancellationToken>,
    timeouts: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            cancel_tokens: DashMap::new(),
            timeouts: DashMap::new(),
        }
    }

    /// Creates a pending task and returns a clone of it.
    pub fn create(
        &self,
        task_type: TaskType,
        params: TaskParams,
        priority: i32,
        owner: Option<String>,
    ) -> Task {
        let id = Uuid::new_v4().to_string();
        let task = Task::new(id.clone(), task_type, params, priority, owner);
        self.tasks.insert(id.clone(), task.clone());
        debug!(task_id = %id, task_type = %task_type, priority = priority, "Task created");
        task
    }

    /// Reads one task.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|entry| entry.clone())
    }

    /// Lists tasks, optionally filtered, newest first.
    pub fn list(
        &self,
        owner: Option<&str>,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| owner.is_none_or(|o| entry.owner.as_deref() == Some(o)))
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    /// Applies a validated status transition.
    ///
    /// Timestamps are maintained here: `started_at` on entering running,
    /// `completed_at` on any terminal status. Completion forces progress
    /// to 100; the armed timeout and the cancellation token are released
    /// on terminal states.
    pub fn transition(
        &self,
        id: &str,
        next: TaskStatus,
        extra: TransitionExtra,
    ) -> Result<Task, TaskError> {
        let updated = {
            let mut entry = self
                .tasks
                .get_mut(id)
                .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

            if !entry.status.can_transition_to(next) {
                return Err(TaskError::InvalidTransition {
                    id: id.to_string(),
                    from: entry.status,
                    to: next,
                });
            }

            let now = Utc::now();
            entry.status = next;
            entry.updated_at = now;
            match next {
                TaskStatus::Running => entry.started_at = Some(now),
                status if status.is_terminal() => entry.completed_at = Some(now),
                _ => {}
            }

            if let Some(result) = extra.result {
                entry.result = Some(result);
            }
            if let Some(error) = extra.error {
                entry.error = Some(error);
            }
            if next == TaskStatus::Completed {
                entry.progress = 100;
            } else if let Some(progress) = extra.progress {
                entry.progress = entry.progress.max(progress.min(99));
            }

            entry.clone()
        };

        if next.is_terminal() {
            self.clear_timeout(id);
            // Any terminal transition stops an in-flight worker at its
            // next poll boundary, including timeout failures.
            if let Some((_, token)) = self.cancel_tokens.remove(id) {
                token.cancel();
            }
            info!(task_id = %id, status = %next, "Task finished");
        }
        Ok(updated)
    }

    /// Pushes worker progress into a running task.
    ///
    /// Progress stays monotone and below 100 until completion; updates to
    /// non-running tasks are dropped.
    pub fn update_progress(&self, id: &str, progress: u8) {
        if let Some(mut entry) = self.tasks.get_mut(id) {
            if entry.status == TaskStatus::Running {
                entry.progress = entry.progress.max(progress.min(99));
                entry.updated_at = Utc::now();
            }
        }
    }

    /// Returns the task's cancellation token, creating one if needed.
    ///
    /// The scheduler registers the token at admission; `cancel` triggers
    /// it so an in-flight worker returns at its next poll boundary.
    pub fn cancel_token(&self, id: &str) -> CancellationToken {
        self.cancel_tokens
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Cancels a pending or running task.
    ///
    /// Returns whether the call changed state: cancelling a terminal task
    /// is an idempotent no-op, an unknown id is an error.
    pub fn cancel(&self, id: &str) -> Result<bool, TaskError> {
        let status = self
            .get(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?
            .status;
        if status.is_terminal() {
            return Ok(false);
        }
        match self.transition(id, TaskStatus::Cancelled, TransitionExtra::default()) {
            Ok(_) => Ok(true),
            // Lost a race against another terminal transition.
            Err(TaskError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Arms a deadline that fails the task if it is still live on expiry.
    pub fn set_timeout(self: &Arc<Self>, id: &str, duration: Duration) {
        let store = Arc::clone(self);
        let task_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let still_live = store
                .get(&task_id)
                .is_some_and(|task| !task.status.is_terminal());
            if still_live {
                warn!(task_id = %task_id, after = ?duration, "Task timed out");
                let result = store.transition(
                    &task_id,
                    TaskStatus::Failed,
                    TransitionExtra {
                        error: Some("timeout".to_string()),
                        ..Default::default()
                    },
                );
                // Lost the race against a worker transition; nothing to do.
                if result.is_err() {
                    debug!(task_id = %task_id, "Timeout fired after terminal transition");
                }
            }
        });

        if let Some(previous) = self.timeouts.insert(id.to_string(), handle) {
            previous.abort();
        }
    }

    /// Deletes a terminal task.
    pub fn delete(&self, id: &str) -> Result<Task, TaskError> {
        let status = self
            .get(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?
            .status;
        if !status.is_terminal() {
            return Err(TaskError::DeleteFailed {
                id: id.to_string(),
                status,
            });
        }

        self.clear_timeout(id);
        self.cancel_tokens.remove(id);
        let (_, task) = self
            .tasks
            .remove(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        Ok(task)
    }

    /// Pending tasks in admission order: priority descending, creation
    /// time ascending on ties.
    pub fn pending(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| entry.status == TaskStatus::Pending)
            .map(|entry| entry.clone())
            .collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        tasks
    }

    /// Per-status counts.
    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats::default();
        for entry in self.tasks.iter() {
            match entry.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
            stats.total += 1;
        }
        stats
    }

    /// Removes terminal tasks older than `retention`. Returns the count.
    pub fn reap_terminal(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::hours(24));
        let expired: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| {
                entry.status.is_terminal()
                    && entry.completed_at.is_some_and(|at| at < cutoff)
            })
            .map(|entry| entry.id.clone())
            .collect();

        for id in &expired {
            self.tasks.remove(id);
            self.cancel_tokens.remove(id);
            self.clear_timeout(id);
        }
        if !expired.is_empty() {
            info!(reaped = expired.len(), "Expired terminal tasks removed");
        }
        expired.len()
    }

    /// Runs the reaper until shutdown.
    pub async fn run_reaper(self: Arc<Self>, retention: Duration, shutdown: CancellationToken) {
        info!(
            retention_secs = retention.as_secs(),
            interval_secs = TASK_REAPER_INTERVAL.as_secs(),
            "Task reaper starting"
        );
        let mut interval = tokio::time::interval(TASK_REAPER_INTERVAL);
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Task reaper shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.reap_terminal(retention);
                }
            }
        }
    }

    fn clear_timeout(&self, id: &str) {
        if let Some((_, handle)) = self.timeouts.remove(id) {
            handle.abort();
        }
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
