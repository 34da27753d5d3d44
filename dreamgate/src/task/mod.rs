//! Asynchronous task engine.
//!
//! Tasks wrap generation requests for the async API: clients create a
//! task, poll its status, and fetch the result later. The [`TaskStore`]
//! owns every task; the [`TaskScheduler`] admits pending tasks under the
//! concurrency cap; workers drive the generation controller and report
//! progress back into the store.

mod scheduler;
mod store;
mod types;
mod worker;

pub use scheduler::TaskScheduler;
pub use store::{TaskStats, TaskStore, TransitionExtra, TASK_REAPER_INTERVAL};
pub use types::{Task, TaskParams, TaskStatus, TaskType};
pub use worker::run_task;

use thiserror::Error;

/// Task registry errors.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Unknown task id.
    #[error("task '{0}' not found")]
    NotFound(String),

    /// Result requested before the task completed.
    #[error("task '{id}' is {status}, result not available")]
    NotCompleted { id: String, status: TaskStatus },

    /// The requested status change violates the transition table.
    #[error("task '{id}' cannot transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Delete requested on a non-terminal task.
    #[error("task '{id}' is {status}, only terminal tasks can be deleted")]
    DeleteFailed { id: String, status: TaskStatus },
}
