//! Smart polling of upstream generation status.
//!
//! [`SmartPoller`] drives a status-fetch closure until the generation
//! reaches a terminal state. It owns the interval schedule (short for
//! images, longer for videos, exponential backoff after network errors),
//! the poll budget and hard deadline, monotone progress reporting, and
//! cancellation at poll boundaries.

use crate::upstream::UpstreamError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Base interval between image polls.
const IMAGE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Base interval between video polls.
const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for error backoff between polls.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Progress cap until the terminal state is observed.
const PROGRESS_CAP: u8 = 95;

/// Estimated wall time of an image generation, for progress estimation.
const IMAGE_ESTIMATED_DURATION: Duration = Duration::from_secs(45);

/// Estimated wall time of a video generation, for progress estimation.
const VIDEO_ESTIMATED_DURATION: Duration = Duration::from_secs(150);

/// Kind of generation being polled; selects the interval schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Image,
    Video,
}

impl PollKind {
    fn interval(&self) -> Duration {
        match self {
            Self::Image => IMAGE_POLL_INTERVAL,
            Self::Video => VIDEO_POLL_INTERVAL,
        }
    }

    fn estimated_duration(&self) -> Duration {
        match self {
            Self::Image => IMAGE_ESTIMATED_DURATION,
            Self::Video => VIDEO_ESTIMATED_DURATION,
        }
    }
}

/// Coarse state reported by one status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Still queued or generating.
    InProgress,
    /// Upstream reports success.
    Succeeded,
    /// Upstream reports failure.
    Failed,
}

/// One observation of the upstream generation status.
#[derive(Debug, Clone)]
pub struct PollSnapshot<D> {
    pub state: PollState,
    /// Non-zero when the upstream rejected or aborted the generation.
    pub fail_code: i64,
    /// Number of artifacts available so far.
    pub item_count: usize,
    /// Upstream finish timestamp; 0 while still generating.
    pub finish_time: i64,
    /// Correlation id (history record id) for logging.
    pub correlation_id: String,
    /// Opaque payload handed back to the caller on completion.
    pub data: D,
}

/// Poller configuration.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub kind: PollKind,
    /// Artifacts required before a success state counts as complete.
    pub expected_items: usize,
    /// Maximum poll iterations after the initial fetch.
    pub max_polls: u32,
    /// Hard wall-clock deadline for the whole poll loop.
    pub deadline: Duration,
}

/// Outcome summary of a completed poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSummary {
    pub elapsed: Duration,
    pub poll_count: u32,
}

/// Terminal data plus summary.
#[derive(Debug)]
pub struct PollOutput<D> {
    pub data: D,
    pub summary: PollSummary,
}

/// Poll loop failures.
#[derive(Debug, Error)]
pub enum PollError {
    /// Upstream reported a non-zero fail code.
    #[error("upstream generation failed (fail_code={fail_code})")]
    GenerationFailed { fail_code: i64 },

    /// Poll budget or hard deadline exceeded.
    #[error("poll budget exhausted after {poll_count} polls ({elapsed:?})")]
    Timeout { poll_count: u32, elapsed: Duration },

    /// Cancelled between poll boundaries.
    #[error("polling cancelled")]
    Cancelled,
}

/// Progress callback; receives 0-100.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Drives a status-fetch closure to a terminal state.
pub struct SmartPoller {
    config: PollConfig,
    progress: Option<ProgressFn>,
    last_progress: u8,
}

impl SmartPoller {
    /// Creates a poller with the given configuration.
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            progress: None,
            last_progress: 0,
        }
    }

    /// Installs an out-of-band progress callback.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the poll loop.
    ///
    /// `fetch` is called at most `max_polls + 1` times. Transient fetch
    /// errors consume budget and back off exponentially; the cancel token
    /// is honored at every poll boundary without issuing further requests.
    pub async fn run<D, F, Fut>(
        mut self,
        cancel: &CancellationToken,
        mut fetch: F,
    ) -> Result<PollOutput<D>, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollSnapshot<D>, UpstreamError>>,
    {
        let started = Instant::now();
        let mut poll_count: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            if poll_count > self.config.max_polls || started.elapsed() >= self.config.deadline {
                return Err(PollError::Timeout {
                    poll_count,
                    elapsed: started.elapsed(),
                });
            }

            poll_count += 1;
            match fetch().await {
                Ok(snapshot) => {
                    consecutive_errors = 0;

                    if snapshot.fail_code != 0 || snapshot.state == PollState::Failed {
                        warn!(
                            correlation_id = %snapshot.correlation_id,
                            fail_code = snapshot.fail_code,
                            "Upstream reported generation failure"
                        );
                        return Err(PollError::GenerationFailed {
                            fail_code: snapshot.fail_code,
                        });
                    }

                    let complete = (snapshot.item_count >= self.config.expected_items
                        && snapshot.state == PollState::Succeeded)
                        || snapshot.finish_time > 0;
                    if complete {
                        self.push_progress(100);
                        let summary = PollSummary {
                            elapsed: started.elapsed(),
                            poll_count,
                        };
                        debug!(
                            correlation_id = %snapshot.correlation_id,
                            polls = poll_count,
                            elapsed_ms = summary.elapsed.as_millis() as u64,
                            "Generation complete"
                        );
                        return Ok(PollOutput {
                            data: snapshot.data,
                            summary,
                        });
                    }

                    let progress = self.estimate_progress(started.elapsed(), snapshot.item_count);
                    self.push_progress(progress);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        error = %e,
                        consecutive = consecutive_errors,
                        poll = poll_count,
                        "Status fetch failed, will retry"
                    );
                }
            }

            let interval = self.next_interval(consecutive_errors);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Interval before the next poll: the kind's base interval, doubled
    /// per consecutive error up to [`MAX_BACKOFF`].
    fn next_interval(&self, consecutive_errors: u32) -> Duration {
        let base = self.config.kind.interval();
        if consecutive_errors == 0 {
            return base;
        }
        let factor = 2u32.saturating_pow(consecutive_errors.min(8));
        (base * factor).min(MAX_BACKOFF)
    }

    /// Combines elapsed-time and item-count fractions, capped below 100
    /// until terminal.
    fn estimate_progress(&self, elapsed: Duration, item_count: usize) -> u8 {
        let time_fraction =
            (elapsed.as_secs_f64() / self.config.kind.estimated_duration().as_secs_f64()).min(1.0);
        let item_fraction = if self.config.expected_items == 0 {
            0.0
        } else {
            (item_count as f64 / self.config.expected_items as f64).min(1.0)
        };
        let combined = 0.5 * time_fraction + 0.5 * item_fraction;
        ((combined * 100.0) as u8).min(PROGRESS_CAP)
    }

    /// Pushes progress, keeping it monotone within the run.
    fn push_progress(&mut self, value: u8) {
        if value <= self.last_progress {
            return;
        }
        self.last_progress = value;
        if let Some(progress) = &self.progress {
            progress(value);
        }
    }
}
