use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, Sender};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::llm::sse::{SseDecoder, SseEvent};
use crate::llm::{ByteStream, LlmError, LlmProvider};
use crate::store::{InlineImage, Message, NewMessage, SessionStore, StoreError};

const DELTA_CHANNEL_CAPACITY: usize = 32;

/// Sends conversational turns to the generation endpoint and records them in
/// the session store.
///
/// The user turn is persisted by `send_message`; the assistant turn is only
/// persisted when the caller hands the concatenated deltas to `save_response`.
pub struct ChatClient {
    store: Arc<SessionStore>,
    provider: Arc<dyn LlmProvider>,
}

impl ChatClient {
    pub fn new(store: Arc<SessionStore>, provider: Arc<dyn LlmProvider>) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn send_message(
        &self,
        project_id: &str,
        session_id: &str,
        text: &str,
        images: Vec<InlineImage>,
    ) -> Result<DeltaStream, LlmError> {
        self.provider.ensure_credentials()?;

        // 1. Persist the user turn before anything touches the network
        self.store
            .append_message(
                project_id,
                session_id,
                NewMessage::user(text).with_images(images),
            )
            .await?;

        // 2. Rebuild the whole conversation
        let session = self
            .store
            .get_session(project_id, session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;

        // 3. Open the stream; status errors surface here
        let body = self.provider.stream_generate(&session.messages).await?;

        info!(
            "Opened {} stream for session {} ({} messages)",
            self.provider.name(),
            session_id,
            session.messages.len()
        );

        // 4. Decode in the background, hand deltas out on demand
        Ok(DeltaStream::spawn(body))
    }

    /// Wraps a shell-style command in an instruction prompt and sends it.
    pub async fn execute_command(
        &self,
        project_id: &str,
        session_id: &str,
        command: &str,
    ) -> Result<DeltaStream, LlmError> {
        self.send_message(project_id, session_id, &command_prompt(command), Vec::new())
            .await
    }

    /// Records the assistant turn once the caller has drained the stream.
    pub async fn save_response(
        &self,
        project_id: &str,
        session_id: &str,
        response: &str,
    ) -> Result<Message, LlmError> {
        let message = self
            .store
            .append_message(project_id, session_id, NewMessage::assistant(response))
            .await?;
        Ok(message)
    }
}

/// Instruction prompt sent in place of a raw command line.
pub fn command_prompt(command: &str) -> String {
    format!(
        "Execute the following command:\n```\n{}\n```\n\n\
         You have direct access to the project's files. \
         Please execute this command and provide the results.",
        command
    )
}

/// One-shot, ordered sequence of text deltas for a single request.
///
/// Ends after `[DONE]` or when the body ends. A failed read shows up as a final
/// `Err` item. Dropping the stream stops the decode task and closes the
/// connection; deltas not yet pulled are discarded.
pub struct DeltaStream {
    inner: ReceiverStream<Result<String, LlmError>>,
}

impl DeltaStream {
    fn spawn(body: ByteStream) -> Self {
        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        tokio::spawn(decode_loop(body, tx));
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Drains the stream, concatenating every delta.
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(delta) = self.next().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }
}

impl Stream for DeltaStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn decode_loop(mut body: ByteStream, tx: Sender<Result<String, LlmError>>) {
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Stream read failed: {}", e);
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for event in decoder.push(&bytes) {
            match event {
                SseEvent::Delta(text) => {
                    if tx.send(Ok(text)).await.is_err() {
                        debug!("Delta consumer went away, closing stream");
                        return;
                    }
                }
                SseEvent::Done => {
                    debug!("Stream finished with [DONE]");
                    return;
                }
            }
        }
    }

    if let Some(SseEvent::Delta(text)) = decoder.finish() {
        let _ = tx.send(Ok(text)).await;
    }
    debug!("Stream body ended");
}
