//! Notification capability consumed by the task tracker and turn driver.
//!
//! Presentation belongs to the host; this crate only asks it to show a title
//! and a body.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no host presenter is attached.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        info!(target: "notification", "{}: {}", title, body);
        Ok(())
    }
}

/// Formats the task lifecycle messages.
pub struct TaskNotice;

impl TaskNotice {
    pub fn started(task: &str, project: Option<&str>) -> (String, String) {
        let body = match project {
            Some(p) => format!("Working on {} in {}", task, p),
            None => format!("Working on {}", task),
        };
        ("Task Started".to_string(), body)
    }

    pub fn progress(progress: &str, project: Option<&str>) -> (String, String) {
        let body = match project {
            Some(p) => format!("{} - {}", progress, p),
            None => progress.to_string(),
        };
        ("Task in Progress".to_string(), body)
    }

    pub fn completed(task: &str, project: Option<&str>) -> (String, String) {
        let body = match project {
            Some(p) => format!("{} finished in {}", task, p),
            None => format!("{} is complete", task),
        };
        ("Task Complete".to_string(), body)
    }

    pub fn failed(task: &str, error: &str, project: Option<&str>) -> (String, String) {
        let body = match project {
            Some(_) => format!("Error in {}: {}", task, error),
            None => format!("Error: {}", error),
        };
        ("Task Error".to_string(), body)
    }
}
