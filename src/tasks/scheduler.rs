use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::tasks::tracker::TaskTracker;
use crate::tasks::{TaskError, TaskResult};

/// Shortest wake period a host will honor.
pub const MIN_WAKE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Host capability that calls `TaskTracker::on_wake` periodically, including
/// while the app is in the background.
pub trait WakeScheduler: Send + Sync {
    fn register(&self, tracker: Arc<TaskTracker>, interval: Duration) -> TaskResult<()>;

    fn unregister(&self);

    fn is_registered(&self) -> bool;
}

/// In-process scheduler driven by a tokio interval. Registration fails outside
/// a tokio runtime.
#[derive(Default)]
pub struct IntervalScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WakeScheduler for IntervalScheduler {
    fn register(&self, tracker: Arc<TaskTracker>, interval: Duration) -> TaskResult<()> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Wake scheduler already registered");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TaskError::Scheduler(e.to_string()))?;
        let interval = interval.max(MIN_WAKE_INTERVAL);

        *handle = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = tracker.on_wake().await {
                    warn!("Background task wake failed: {}", e);
                }
            }
        }));
        Ok(())
    }

    fn unregister(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            debug!("Wake scheduler unregistered");
        }
    }

    fn is_registered(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.unregister();
    }
}
