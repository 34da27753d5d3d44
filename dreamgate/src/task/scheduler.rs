//! Task admission scheduler.
//!
//! A single scheduling fiber ticks once a second: it reconciles its
//! running set against the store, computes free slots under the
//! concurrency cap, and admits pending tasks in priority order. Admission
//! transitions the task to running, arms the per-type timeout, registers
//! the cancellation token, and spawns a worker. The tick never blocks on
//! workers.

use super::store::{TaskStore, TransitionExtra};
use super::types::{TaskStatus, TaskType};
use super::worker;
use crate::config::TaskSettings;
use crate::generation::GenerationController;
use crate::upstream::Transport;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Admits pending tasks under the concurrency cap.
pub struct TaskScheduler<T: Transport + Clone> {
    store: Arc<TaskStore>,
    controller: Arc<GenerationController<T>>,
    settings: TaskSettings,
    /// Ids this scheduler started that have not been observed terminating.
    running: Arc<DashSet<String>>,
}

impl<T: Transport + Clone + Send + Sync + 'static> TaskScheduler<T> {
    pub fn new(
        store: Arc<TaskStore>,
        controller: Arc<GenerationController<T>>,
        settings: TaskSettings,
    ) -> Self {
        Self {
            store,
            controller,
            settings,
            running: Arc::new(DashSet::new()),
        }
    }

    /// Number of tasks this scheduler currently accounts as running.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Runs the admission loop until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            max_concurrent = self.settings.max_concurrent,
            tick_secs = self.settings.tick_secs,
            "Task scheduler starting"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.tick_secs.max(1)));

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Task scheduler shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }

    /// One admission pass. Public for tests; the run loop calls it on
    /// every tick.
    pub fn tick(&self) {
        self.reconcile_running();

        let free_slots = self
            .settings
            .max_concurrent
            .saturating_sub(self.running.len());
        if free_slots == 0 {
            return;
        }

        let pending = self.store.pending();
        let admissible = pending
            .into_iter()
            .filter(|task| !self.running.contains(&task.id))
            .take(free_slots);

        for task in admissible {
            self.admit(task);
        }
    }

    /// Drops running entries whose task terminated or vanished.
    ///
    /// Workers remove their own entry on exit; this sweep additionally
    /// covers workers that died without reporting, whose tasks the armed
    /// timeout eventually fails.
    fn reconcile_running(&self) {
        self.running.retain(|id| {
            self.store
                .get(id)
                .is_some_and(|task| !task.status.is_terminal())
        });
    }

    /// Admits one pending task: transition, timeout, token, worker.
    fn admit(&self, task: super::types::Task) {
        let transitioned =
            self.store
                .transition(&task.id, TaskStatus::Running, TransitionExtra::default());
        let task = match transitioned {
            Ok(task) => task,
            Err(e) => {
                // Cancelled (or timed out) since the pending snapshot.
                debug!(task_id = %task.id, error = %e, "Admission skipped");
                return;
            }
        };

        self.store.set_timeout(&task.id, self.task_timeout(task.task_type));
        // Register the token before the worker starts so a cancel arriving
        // mid-flight reaches the poller.
        let _ = self.store.cancel_token(&task.id);
        self.running.insert(task.id.clone());

        debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = task.priority,
            running = self.running.len(),
            "Task admitted"
        );

        tokio::spawn(worker::run_task(
            Arc::clone(&self.controller),
            Arc::clone(&self.store),
            Arc::clone(&self.running),
            task,
        ));
    }

    fn task_timeout(&self, task_type: TaskType) -> Duration {
        match task_type {
            TaskType::ImageGeneration | TaskType::ImageComposition => {
                Duration::from_secs(self.settings.image_timeout_secs)
            }
            TaskType::VideoGeneration => Duration::from_secs(self.settings.video_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationSettings, MirrorSettings};
    use crate::quota::{QuotaLedger, ServiceLimits};
    use crate::task::types::TaskParams;
    use crate::upstream::MockTransport;
    use serde_json::json;

    fn harness(
        max_concurrent: usize,
        mock: Arc<MockTransport>,
    ) -> (TaskScheduler<Arc<MockTransport>>, Arc<TaskStore>, tempfile::TempDir) {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = Arc::new(
            QuotaLedger::open(
                temp.path(),
                ServiceLimits {
                    image: 100,
                    video: 100,
                    avatar: 100,
                },
            )
            .unwrap(),
        );
        let controller = Arc::new(GenerationController::new(
            mock,
            MirrorSettings::default(),
            ledger,
            GenerationSettings::default(),
        ));
        let store = Arc::new(TaskStore::new());
        let scheduler = TaskScheduler::new(
            Arc::clone(&store),
            controller,
            TaskSettings {
                max_concurrent,
                ..Default::default()
            },
        );
        (scheduler, store, temp)
    }

    fn push_happy_generation(mock: &MockTransport, history_id: &str) {
        mock.push_json(json!({
            "ret": "0", "errmsg": "",
            "data": {"aigc_data": {"history_record_id": history_id}}
        }));
        mock.push_json(json!({
            "ret": "0", "errmsg": "",
            "data": {history_id: {
                "status": 50, "fail_code": 0,
                "item_list": [
                    {"image": {"large_images": [{"image_url": "https://cdn/1.webp"}]}},
                    {"image": {"large_images": [{"image_url": "https://cdn/2.webp"}]}},
                    {"image": {"large_images": [{"image_url": "https://cdn/3.webp"}]}},
                    {"image": {"large_images": [{"image_url": "https://cdn/4.webp"}]}}
                ],
                "task": {"finish_time": 1700000000}
            }}
        }));
    }

    fn create_image_task(store: &TaskStore, priority: i32) -> String {
        store
            .create(
                TaskType::ImageGeneration,
                TaskParams {
                    credential: "tok".into(),
                    request: json!({"prompt": "sunset"}),
                },
                priority,
                None,
            )
            .id
    }

    #[tokio::test]
    async fn test_tick_admits_up_to_cap() {
        let mock = Arc::new(MockTransport::new());
        let (scheduler, store, _temp) = harness(2, mock);

        for _ in 0..5 {
            create_image_task(&store, 0);
        }

        scheduler.tick();
        let stats = store.stats();
        assert_eq!(stats.running, 2);
        assert_eq!(stats.pending, 3);
        assert_eq!(scheduler.running_count(), 2);

        // No free slots: another tick admits nothing.
        scheduler.tick();
        assert_eq!(store.stats().running, 2);
    }

    #[tokio::test]
    async fn test_priority_order_admission() {
        let mock = Arc::new(MockTransport::new());
        let (scheduler, store, _temp) = harness(1, mock);

        let low = create_image_task(&store, 1);
        let high = create_image_task(&store, 9);

        scheduler.tick();
        assert_eq!(store.get(&high).unwrap().status, TaskStatus::Running);
        assert_eq!(store.get(&low).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancelled_pending_task_is_never_admitted() {
        let mock = Arc::new(MockTransport::new());
        let (scheduler, store, _temp) = harness(4, mock.clone());

        let id = create_image_task(&store, 0);
        store.cancel(&id).unwrap();

        scheduler.tick();
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(scheduler.running_count(), 0);
    }

    #[tokio::test]
    async fn test_slots_free_after_workers_finish() {
        let mock = Arc::new(MockTransport::new());
        push_happy_generation(&mock, "h1");
        push_happy_generation(&mock, "h2");
        let (scheduler, store, _temp) = harness(1, mock);

        let first = create_image_task(&store, 0);
        let second = create_image_task(&store, 0);

        scheduler.tick();
        assert_eq!(store.get(&first).unwrap().status, TaskStatus::Running);
        assert_eq!(store.get(&second).unwrap().status, TaskStatus::Pending);

        // Let the first worker run to completion.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if store.get(&first).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.get(&first).unwrap().status, TaskStatus::Completed);

        scheduler.tick();
        assert_eq!(store.get(&second).unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_total_completions_reach_all_tasks() {
        use std::sync::atomic::{AtomicU32, Ordering};

        // Concurrent workers interleave requests arbitrarily, so the mock
        // answers by inspecting each request instead of serving FIFO.
        let mock = Arc::new(MockTransport::new());
        let next_history = AtomicU32::new(0);
        mock.set_handler(move |request| {
            if request.url.contains("aigc_draft/generate") {
                let id = next_history.fetch_add(1, Ordering::SeqCst);
                return Ok(json!({
                    "ret": "0", "errmsg": "",
                    "data": {"aigc_data": {"history_record_id": format!("h{id}")}}
                })
                .to_string()
                .into_bytes());
            }

            // get_history_by_ids: echo the requested id back completed.
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let id = body["history_ids"][0].as_str().unwrap().to_string();
            Ok(json!({
                "ret": "0", "errmsg": "",
                "data": {id: {
                    "status": 50, "fail_code": 0,
                    "item_list": [
                        {"image": {"large_images": [{"image_url": "https://cdn/1.webp"}]}},
                        {"image": {"large_images": [{"image_url": "https://cdn/2.webp"}]}},
                        {"image": {"large_images": [{"image_url": "https://cdn/3.webp"}]}},
                        {"image": {"large_images": [{"image_url": "https://cdn/4.webp"}]}}
                    ],
                    "task": {"finish_time": 1700000000}
                }}
            })
            .to_string()
            .into_bytes())
        });
        let (scheduler, store, _temp) = harness(2, mock);

        let ids: Vec<String> = (0..5).map(|_| create_image_task(&store, 0)).collect();

        // Drive ticks until everything finishes.
        for _ in 0..200 {
            scheduler.tick();
            assert!(store.stats().running <= 2);
            if store.stats().completed == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(store.stats().completed, 5);
        for id in ids {
            assert_eq!(store.get(&id).unwrap().status, TaskStatus::Completed);
        }
    }
}
