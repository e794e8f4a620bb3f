pub mod client;
pub mod gemini;
pub mod models;
pub mod sse;

pub use client::{command_prompt, ChatClient, DeltaStream};
pub use gemini::GeminiProvider;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

use crate::store::{Message, StoreError};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not set. Configure a Gemini API key first")]
    AuthRequired,
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error {status}: {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LlmError {
    /// Failures that originate at the generation endpoint rather than locally.
    pub fn is_provider_error(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Api { .. })
    }
}

/// Raw response body of a streaming generation request.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Returns `LlmError::AuthRequired` when no credential is configured.
    fn ensure_credentials(&self) -> Result<(), LlmError> {
        Ok(())
    }

    /// Issues one streaming request for the given conversation. Resolves once
    /// response headers arrive; a non-success status is an error here, before
    /// any body bytes are handed out.
    async fn stream_generate(&self, history: &[Message]) -> Result<ByteStream, LlmError>;
}
