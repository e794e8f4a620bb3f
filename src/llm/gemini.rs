use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::GeminiConfig;
use crate::llm::models::{GenerateRequest, GenerationConfig};
use crate::llm::{ByteStream, LlmError, LlmProvider};
use crate::store::Message;

pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl GeminiProvider {
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        model: String,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|key| !key.is_empty()),
            base_url,
            model,
            generation,
        }
    }

    pub fn from_config(config: &GeminiConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.api_base.clone(),
            config.model.clone(),
            GenerationConfig::from(config),
        )
    }

    fn stream_url(&self, api_key: &str) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            api_key
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn ensure_credentials(&self) -> Result<(), LlmError> {
        self.api_key.as_ref().map(|_| ()).ok_or(LlmError::AuthRequired)
    }

    async fn stream_generate(&self, history: &[Message]) -> Result<ByteStream, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::AuthRequired)?;
        let body = GenerateRequest::from_history(history, self.generation.clone());

        info!(
            "Streaming {} messages to Gemini model {}",
            body.contents.len(),
            self.model
        );

        let response = self
            .client
            .post(self.stream_url(api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("Gemini stream request failed with {}", status);
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Network(e.without_url().to_string())));

        Ok(Box::pin(stream))
    }
}
