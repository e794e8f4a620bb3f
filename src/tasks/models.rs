use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// `pending -> running -> completed`, with `error` reachable from either
    /// live state. Terminal states only leave the active set by removal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (*self, next),
            (Pending, Running) | (Pending, Error) | (Running, Completed) | (Running, Error)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    pub id: String,
    pub project_id: String,
    pub session_id: String,
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Highest progress interval already announced for this task.
    #[serde(default)]
    pub last_progress_bucket: i64,
}

impl BackgroundTask {
    pub fn new(
        project_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("task_{}", Uuid::new_v4().simple()),
            project_id: project_id.into(),
            session_id: session_id.into(),
            message: message.into(),
            start_time,
            status: TaskStatus::Pending,
            project_name: None,
            last_progress_bucket: 0,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Short label for notifications.
    pub fn label(&self) -> String {
        const MAX_CHARS: usize = 40;
        let first_line = self.message.lines().next().unwrap_or_default();
        if first_line.chars().count() > MAX_CHARS {
            let cut: String = first_line.chars().take(MAX_CHARS).collect();
            format!("{}...", cut)
        } else {
            first_line.to_string()
        }
    }
}
