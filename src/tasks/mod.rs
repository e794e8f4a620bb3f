pub mod clock;
pub mod models;
pub mod scheduler;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{BackgroundTask, TaskStatus};
pub use scheduler::{IntervalScheduler, WakeScheduler, MIN_WAKE_INTERVAL};
pub use tracker::TaskTracker;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("task {0} is already active")]
    Duplicate(String),
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("background scheduling unavailable: {0}")]
    Scheduler(String),
}

impl TaskError {
    fn storage(path: impl AsRef<Path>, source: io::Error) -> Self {
        TaskError::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
