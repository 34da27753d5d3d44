//! Task data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of generation a task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ImageGeneration,
    ImageComposition,
    VideoGeneration,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageGeneration => "image_generation",
            Self::ImageComposition => "image_composition",
            Self::VideoGeneration => "video_generation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal tasks never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Transition table:
    ///
    /// ```text
    /// pending  -> running, cancelled, failed (timeout)
    /// running  -> completed, failed, cancelled
    /// terminal -> (none)
    /// ```
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                TaskStatus::Running | TaskStatus::Cancelled | TaskStatus::Failed
            ),
            Self::Running => matches!(
                next,
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
            ),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload stored with a task: the original request body plus the
/// credential it was submitted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParams {
    /// Raw credential string, region prefix included.
    pub credential: String,
    /// Original request body, parsed per task type at execution time.
    pub request: serde_json::Value,
}

/// One asynchronous generation task.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: i32,
    /// Original submission payload.
    #[serde(skip_serializing)]
    pub params: TaskParams,
    /// 0-100; monotone within a run; 100 iff completed.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Asset URLs, set on completion.
    pub result: Option<Vec<String>>,
    /// Failure description, set on failure.
    pub error: Option<String>,
    /// Owning session id.
    pub owner: Option<String>,
}

impl Task {
    /// Creates a fresh pending task.
    pub fn new(
        id: String,
        task_type: TaskType,
        params: TaskParams,
        priority: i32,
        owner: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            task_type,
            status: TaskStatus::Pending,
            priority,
            params,
            progress: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            owner,
        }
    }
}
