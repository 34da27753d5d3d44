//! Task worker.
//!
//! One worker drives one admitted task: it parses the stored params into
//! the typed request for the task's type, runs the matching controller
//! operation with progress wired into the store, and records the terminal
//! transition. The running-set entry is always released on exit.

use super::store::{TaskStore, TransitionExtra};
use super::types::{Task, TaskStatus, TaskType};
use crate::credential::Credential;
use crate::generation::{
    GenerateError, GenerationController, RawCompositionRequest, RawImageRequest, RawVideoRequest,
    RunControl,
};
use crate::upstream::Transport;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Executes `task` to a terminal state.
///
/// `running` is the scheduler's accounting set; the worker removes its id
/// on every exit path.
pub async fn run_task<T: Transport + Clone>(
    controller: Arc<GenerationController<T>>,
    store: Arc<TaskStore>,
    running: Arc<DashSet<String>>,
    task: Task,
) {
    let task_id = task.id.clone();
    debug!(task_id = %task_id, task_type = %task.task_type, "Worker starting");

    // A cancel or timeout can land between admission and this point; a
    // task that is no longer running must not reach the upstream.
    let still_running = store
        .get(&task_id)
        .is_some_and(|t| t.status == TaskStatus::Running);
    if !still_running {
        debug!(task_id = %task_id, "Task no longer running, worker exiting");
        running.remove(&task_id);
        return;
    }

    let outcome = execute(&controller, &store, &task).await;
    match outcome {
        Ok(urls) => {
            info!(task_id = %task_id, urls = urls.len(), "Task completed");
            let result = store.transition(
                &task_id,
                TaskStatus::Completed,
                TransitionExtra {
                    result: Some(urls),
                    ..Default::default()
                },
            );
            if result.is_err() {
                // Timed out or was cancelled while the final poll returned.
                debug!(task_id = %task_id, "Completion lost the race to a terminal transition");
            }
        }
        Err(GenerateError::Cancelled) => {
            // Cancellation already moved the task to cancelled; make sure
            // a bare token trigger is reflected too.
            let _ = store.cancel(&task_id);
            info!(task_id = %task_id, "Task cancelled");
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Task failed");
            let result = store.transition(
                &task_id,
                TaskStatus::Failed,
                TransitionExtra {
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            );
            if result.is_err() {
                debug!(task_id = %task_id, "Failure lost the race to a terminal transition");
            }
        }
    }

    running.remove(&task_id);
}

/// Parses the stored request and dispatches on the task type.
async fn execute<T: Transport + Clone>(
    controller: &GenerationController<T>,
    store: &Arc<TaskStore>,
    task: &Task,
) -> Result<Vec<String>, GenerateError> {
    let credential = Credential::parse(&task.params.credential);
    let control = RunControl {
        cancel: store.cancel_token(&task.id),
        progress: Some(progress_sink(store, &task.id)),
    };
    let request = task.params.request.clone();

    match task.task_type {
        TaskType::ImageGeneration => {
            let request: RawImageRequest = parse(request)?;
            let request = request.validate()?;
            controller.generate_image(&request, &credential, control).await
        }
        TaskType::ImageComposition => {
            let request: RawCompositionRequest = parse(request)?;
            let request = request.validate()?;
            controller
                .generate_image_composition(&request, &credential, control)
                .await
        }
        TaskType::VideoGeneration => {
            let request: RawVideoRequest = parse(request)?;
            let request = request.validate()?;
            controller.generate_video(&request, &credential, control).await
        }
    }
}

fn parse<R: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<R, GenerateError> {
    serde_json::from_value(value)
        .map_err(|e| GenerateError::InvalidRequest(format!("malformed task params: {}", e)))
}

/// Progress callback writing through to the store.
fn progress_sink(store: &Arc<TaskStore>, task_id: &str) -> crate::poll::ProgressFn {
    let store = Arc::clone(store);
    let task_id = task_id.to_string();
    Box::new(move |progress| store.update_progress(&task_id, progress))
}
