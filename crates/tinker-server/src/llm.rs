//! Streaming chat client for the language model server.

use futures::Stream;
use serde::Serialize;
use tracing::debug;

use crate::config::{LlmApi, LlmConfig};
use crate::decoder::UpstreamDecoder;
use crate::error::{LlmErrorKind, Result, TinkerError};
use crate::explain::Prompt;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Request body accepted by both dialects.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

/// Client for one configured model endpoint.
///
/// Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Creates a client for `config`.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TinkerError::llm_api_error(LlmErrorKind::Other, e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Wire dialect of the endpoint.
    #[must_use]
    pub const fn api(&self) -> LlmApi {
        self.config.api
    }

    /// Full chat endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api.chat_path()
        )
    }

    /// A fresh decoder for one response body.
    #[must_use]
    pub fn decoder(&self) -> UpstreamDecoder {
        UpstreamDecoder::new(self.config.api)
    }

    /// Sends a streaming chat request and returns the raw body stream.
    ///
    /// Connection failures and non-success statuses are classified into
    /// `TinkerError::LlmApiError`.
    pub async fn stream_chat(
        &self,
        prompt: &Prompt,
    ) -> Result<impl Stream<Item = reqwest::Result<impl AsRef<[u8]>>>> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            stream: true,
        };

        let url = self.endpoint();
        debug!(%url, "Opening chat stream");

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TinkerError::llm_api_error(LlmErrorKind::Network, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TinkerError::llm_api_error(
                LlmErrorKind::from_status(status.as_u16()),
                format!("{status}: {}", detail.trim()),
            ));
        }

        Ok(response.bytes_stream())
    }
}
