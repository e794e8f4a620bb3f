use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TaskConfig;
use crate::notify::{Notifier, TaskNotice};
use crate::store::json;
use crate::tasks::clock::{Clock, SystemClock};
use crate::tasks::models::{BackgroundTask, TaskStatus};
use crate::tasks::scheduler::WakeScheduler;
use crate::tasks::{TaskError, TaskResult};

const TASKS_FILE: &str = "active_tasks.json";

/// Persisted list of in-flight generation requests.
///
/// The list is small, so lookups are linear scans and every mutation rewrites
/// the whole file.
pub struct TaskTracker {
    path: PathBuf,
    lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    progress_interval_mins: i64,
}

impl TaskTracker {
    pub async fn open(
        base_dir: impl AsRef<Path>,
        config: &TaskConfig,
        notifier: Arc<dyn Notifier>,
    ) -> TaskResult<Self> {
        let base_dir = base_dir.as_ref();
        fs::create_dir_all(base_dir)
            .await
            .map_err(|e| TaskError::storage(base_dir, e))?;

        Ok(Self {
            path: base_dir.join(TASKS_FILE),
            lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
            notifier,
            progress_interval_mins: config.progress_interval_mins.max(1),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Registers the periodic wake. A refusal leaves the tracker usable in the
    /// foreground only and is reported as `false`.
    pub fn initialize(self: &Arc<Self>, scheduler: &dyn WakeScheduler, interval: Duration) -> bool {
        match scheduler.register(Arc::clone(self), interval) {
            Ok(()) => {
                info!("Background task wake registered");
                true
            }
            Err(e) => {
                warn!("Background notifications disabled: {}", e);
                false
            }
        }
    }

    pub async fn active_tasks(&self) -> TaskResult<Vec<BackgroundTask>> {
        self.load().await
    }

    pub async fn get_task(&self, id: &str) -> TaskResult<Option<BackgroundTask>> {
        Ok(self.load().await?.into_iter().find(|t| t.id == id))
    }

    pub async fn add_task(&self, task: BackgroundTask) -> TaskResult<()> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load().await?;
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(TaskError::Duplicate(task.id));
        }

        info!("Task {} added ({})", task.id, task.status);
        tasks.push(task);
        self.save(&tasks).await
    }

    /// Returns `Ok(false)` when no task has this id.
    pub async fn update_task_status(&self, id: &str, status: TaskStatus) -> TaskResult<bool> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load().await?;

        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            debug!("update_task_status: unknown task {}", id);
            return Ok(false);
        };

        if task.status == status {
            return Ok(true);
        }
        if !task.status.can_transition_to(status) {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        self.save(&tasks).await?;

        info!("Task {} status updated to {}", id, status);
        Ok(true)
    }

    pub async fn remove_task(&self, id: &str) -> TaskResult<bool> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load().await?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);

        if tasks.len() == before {
            return Ok(false);
        }
        self.save(&tasks).await?;

        info!("Task {} removed", id);
        Ok(true)
    }

    /// Drops every task in a terminal state, returning how many went.
    pub async fn clear_completed_tasks(&self) -> TaskResult<usize> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load().await?;
        let before = tasks.len();
        tasks.retain(|t| !t.status.is_terminal());

        let cleared = before - tasks.len();
        if cleared > 0 {
            self.save(&tasks).await?;
            info!("Cleared {} finished tasks", cleared);
        }
        Ok(cleared)
    }

    /// Periodic wake handler. Sends a "still working" notice for each running
    /// task whose elapsed time has entered a new progress interval, and
    /// returns how many notices went out.
    pub async fn on_wake(&self) -> TaskResult<usize> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load().await?;
        let now = self.clock.now();

        debug!("Task wake: {} active tasks", tasks.len());

        let mut sent = 0;
        let mut dirty = false;
        for task in tasks.iter_mut().filter(|t| t.status == TaskStatus::Running) {
            let elapsed_mins = (now - task.start_time).num_minutes();
            let bucket = elapsed_mins / self.progress_interval_mins;
            if bucket < 1 || bucket <= task.last_progress_bucket {
                continue;
            }

            let progress = format!("Still working... ({} min)", elapsed_mins);
            let (title, body) = TaskNotice::progress(&progress, task.project_name.as_deref());
            match self.notifier.show(&title, &body).await {
                Ok(()) => {
                    task.last_progress_bucket = bucket;
                    dirty = true;
                    sent += 1;
                }
                Err(e) => warn!("Progress notification for {} failed: {}", task.id, e),
            }
        }

        if dirty {
            self.save(&tasks).await?;
        }
        Ok(sent)
    }

    async fn load(&self) -> TaskResult<Vec<BackgroundTask>> {
        let tasks = json::read(&self.path)
            .await
            .map_err(|e| TaskError::storage(&self.path, e))?;
        Ok(tasks.unwrap_or_default())
    }

    async fn save(&self, tasks: &[BackgroundTask]) -> TaskResult<()> {
        json::write_atomic(&self.path, &tasks)
            .await
            .map_err(|e| TaskError::storage(&self.path, e))
    }
}
