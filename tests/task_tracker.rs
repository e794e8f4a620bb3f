#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use gempocket::config::TaskConfig;
    use gempocket::notify::{Notifier, NotifyError};
    use gempocket::tasks::{
        BackgroundTask, Clock, IntervalScheduler, ManualClock, TaskError, TaskResult, TaskStatus,
        TaskTracker, WakeScheduler,
    };
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn count(&self) -> usize {
            self.shown.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn show(&self, title: &str, body: &str) -> Result<(), NotifyError> {
            self.shown
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct RefusingScheduler;

    impl WakeScheduler for RefusingScheduler {
        fn register(&self, _tracker: Arc<TaskTracker>, _interval: Duration) -> TaskResult<()> {
            Err(TaskError::Scheduler("background fetch disabled".to_string()))
        }

        fn unregister(&self) {}

        fn is_registered(&self) -> bool {
            false
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ))
    }

    async fn open_tracker(
        dir: &Path,
        clock: Arc<ManualClock>,
    ) -> (Arc<TaskTracker>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = TaskTracker::open(dir, &TaskConfig::default(), notifier.clone())
            .await
            .unwrap()
            .with_clock(clock);
        (Arc::new(tracker), notifier)
    }

    #[tokio::test]
    async fn test_progress_notice_at_five_minutes() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let (tracker, notifier) = open_tracker(dir.path(), clock.clone()).await;

        let task = BackgroundTask::new("p", "s", "refactor", clock.now() - chrono::Duration::minutes(5))
            .with_status(TaskStatus::Running);
        tracker.add_task(task).await.unwrap();

        assert_eq!(tracker.on_wake().await.unwrap(), 1);
        assert_eq!(notifier.count(), 1);
        let (title, body) = notifier.shown.lock().unwrap()[0].clone();
        assert_eq!(title, "Task in Progress");
        assert_eq!(body, "Still working... (5 min)");
    }

    #[tokio::test]
    async fn test_progress_cadence_on_simulated_time() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let (tracker, notifier) = open_tracker(dir.path(), clock.clone()).await;

        let task = BackgroundTask::new("p", "s", "refactor", clock.now())
            .with_status(TaskStatus::Running)
            .with_project_name("demo");
        tracker.add_task(task).await.unwrap();

        clock.advance(chrono::Duration::minutes(4));
        assert_eq!(tracker.on_wake().await.unwrap(), 0);

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(tracker.on_wake().await.unwrap(), 1);
        // Same interval again: nothing new to say.
        assert_eq!(tracker.on_wake().await.unwrap(), 0);

        clock.advance(chrono::Duration::minutes(4));
        assert_eq!(tracker.on_wake().await.unwrap(), 0);

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(tracker.on_wake().await.unwrap(), 1);

        assert_eq!(notifier.count(), 2);
        assert_eq!(
            notifier.shown.lock().unwrap()[1].1,
            "Still working... (10 min) - demo"
        );
    }

    #[tokio::test]
    async fn test_only_running_tasks_get_progress() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let (tracker, notifier) = open_tracker(dir.path(), clock.clone()).await;

        let start = clock.now();
        tracker
            .add_task(BackgroundTask::new("p", "s", "queued", start))
            .await
            .unwrap();
        tracker
            .add_task(BackgroundTask::new("p", "s", "done", start).with_status(TaskStatus::Completed))
            .await
            .unwrap();

        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(tracker.on_wake().await.unwrap(), 0);
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let (tracker, _) = open_tracker(dir.path(), clock.clone()).await;

        let task = BackgroundTask::new("p", "s", "write tests", clock.now());
        let id = task.id.clone();
        tracker.add_task(task).await.unwrap();

        assert!(tracker
            .update_task_status(&id, TaskStatus::Running)
            .await
            .unwrap());
        assert_eq!(
            tracker.get_task(&id).await.unwrap().unwrap().status,
            TaskStatus::Running
        );
        assert!(!tracker
            .update_task_status("task_unknown", TaskStatus::Running)
            .await
            .unwrap());

        assert!(tracker
            .update_task_status(&id, TaskStatus::Completed)
            .await
            .unwrap());
        let err = tracker
            .update_task_status(&id, TaskStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Running,
                ..
            }
        ));

        assert!(tracker.remove_task(&id).await.unwrap());
        assert!(!tracker.remove_task(&id).await.unwrap());
        assert!(tracker.active_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let (tracker, _) = open_tracker(dir.path(), clock.clone()).await;

        let task = BackgroundTask::new("p", "s", "once", clock.now());
        tracker.add_task(task.clone()).await.unwrap();
        let err = tracker.add_task(task).await.unwrap_err();
        assert!(matches!(err, TaskError::Duplicate(_)));
        assert_eq!(tracker.active_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_completed_tasks() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let (tracker, _) = open_tracker(dir.path(), clock.clone()).await;

        let now = clock.now();
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Error,
        ] {
            tracker
                .add_task(BackgroundTask::new("p", "s", "t", now).with_status(status))
                .await
                .unwrap();
        }

        assert_eq!(tracker.clear_completed_tasks().await.unwrap(), 2);
        assert_eq!(tracker.clear_completed_tasks().await.unwrap(), 0);

        let remaining: Vec<_> = tracker
            .active_tasks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.status)
            .collect();
        assert_eq!(remaining, [TaskStatus::Pending, TaskStatus::Running]);
    }

    #[tokio::test]
    async fn test_tasks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let id = {
            let (tracker, _) = open_tracker(dir.path(), clock.clone()).await;
            let task = BackgroundTask::new("p", "s", "long job", clock.now())
                .with_status(TaskStatus::Running);
            let id = task.id.clone();
            tracker.add_task(task).await.unwrap();

            clock.advance(chrono::Duration::minutes(6));
            assert_eq!(tracker.on_wake().await.unwrap(), 1);
            id
        };

        let (tracker, notifier) = open_tracker(dir.path(), clock.clone()).await;
        let task = tracker.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.message, "long job");
        assert_eq!(task.last_progress_bucket, 1);

        // The announced interval is remembered across restarts.
        assert_eq!(tracker.on_wake().await.unwrap(), 0);
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_reports_refused_scheduler() {
        let dir = TempDir::new().unwrap();
        let (tracker, _) = open_tracker(dir.path(), clock()).await;

        assert!(!tracker.initialize(&RefusingScheduler, Duration::from_secs(300)));
        // Foreground operations keep working.
        tracker
            .add_task(BackgroundTask::new("p", "s", "t", Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_interval_scheduler_registration() {
        let dir = TempDir::new().unwrap();
        let (tracker, _) = open_tracker(dir.path(), clock()).await;
        let scheduler = IntervalScheduler::new();

        assert!(tracker.initialize(&scheduler, Duration::from_secs(1)));
        assert!(scheduler.is_registered());
        assert!(tracker.initialize(&scheduler, Duration::from_secs(1)));

        scheduler.unregister();
        assert!(!scheduler.is_registered());
    }

    #[test]
    fn test_interval_scheduler_needs_runtime() {
        let dir = TempDir::new().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tracker, _) = runtime.block_on(open_tracker(dir.path(), clock()));

        let scheduler = IntervalScheduler::new();
        assert!(!tracker.initialize(&scheduler, Duration::from_secs(300)));
        assert!(!scheduler.is_registered());
    }
}
