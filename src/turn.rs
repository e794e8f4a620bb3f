//! Caller side of one chat turn: track it as a background task, stream the
//! reply, commit it, and notify on completion or failure.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::warn;

use crate::llm::{command_prompt, ChatClient, LlmError};
use crate::notify::TaskNotice;
use crate::store::InlineImage;
use crate::tasks::{BackgroundTask, TaskStatus, TaskTracker};

pub struct TurnRunner {
    client: Arc<ChatClient>,
    tracker: Arc<TaskTracker>,
}

impl TurnRunner {
    pub fn new(client: Arc<ChatClient>, tracker: Arc<TaskTracker>) -> Self {
        Self { client, tracker }
    }

    pub fn client(&self) -> &Arc<ChatClient> {
        &self.client
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    /// Sends `text`, passing every delta to `on_delta` as it arrives, and
    /// returns the full reply once it has been saved. Task bookkeeping and
    /// notifications are best-effort and never fail the turn.
    pub async fn run<F>(
        &self,
        project_id: &str,
        session_id: &str,
        text: &str,
        images: Vec<InlineImage>,
        on_delta: F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        let project_name = match self.client.store().get_project(project_id).await {
            Ok(project) => project.map(|p| p.name),
            Err(e) => {
                warn!("Could not resolve project {}: {}", project_id, e);
                None
            }
        };

        let mut task = BackgroundTask::new(project_id, session_id, text, self.tracker.clock().now());
        if let Some(name) = &project_name {
            task = task.with_project_name(name.clone());
        }
        let task_id = task.id.clone();
        let label = task.label();

        if let Err(e) = self.tracker.add_task(task).await {
            warn!("Could not track turn: {}", e);
        }
        self.notify(TaskNotice::started(&label, project_name.as_deref()))
            .await;
        self.set_status(&task_id, TaskStatus::Running).await;

        let result = self
            .stream_and_save(project_id, session_id, text, images, on_delta)
            .await;

        match &result {
            Ok(_) => {
                self.set_status(&task_id, TaskStatus::Completed).await;
                self.notify(TaskNotice::completed(&label, project_name.as_deref()))
                    .await;
            }
            Err(e) => {
                self.set_status(&task_id, TaskStatus::Error).await;
                self.notify(TaskNotice::failed(
                    &label,
                    &e.to_string(),
                    project_name.as_deref(),
                ))
                .await;
            }
        }

        if let Err(e) = self.tracker.remove_task(&task_id).await {
            warn!("Could not remove task {}: {}", task_id, e);
        }
        result
    }

    /// Tracked counterpart of `ChatClient::execute_command`.
    pub async fn run_command<F>(
        &self,
        project_id: &str,
        session_id: &str,
        command: &str,
        on_delta: F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        self.run(project_id, session_id, &command_prompt(command), Vec::new(), on_delta)
            .await
    }

    async fn stream_and_save<F>(
        &self,
        project_id: &str,
        session_id: &str,
        text: &str,
        images: Vec<InlineImage>,
        mut on_delta: F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        let mut stream = self
            .client
            .send_message(project_id, session_id, text, images)
            .await?;

        let mut full = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            on_delta(&delta);
            full.push_str(&delta);
        }

        self.client
            .save_response(project_id, session_id, &full)
            .await?;
        Ok(full)
    }

    async fn set_status(&self, task_id: &str, status: TaskStatus) {
        if let Err(e) = self.tracker.update_task_status(task_id, status).await {
            warn!("Could not mark task {} {}: {}", task_id, status, e);
        }
    }

    async fn notify(&self, (title, body): (String, String)) {
        if let Err(e) = self.tracker.notifier().show(&title, &body).await {
            warn!("{}", e);
        }
    }
}
