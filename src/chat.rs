//! Chat-completion backend
//!
//! One stateless request per turn: the system prompt plus the user's
//! transcript, no history.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::{Error, Result};

/// Request/response chat service
pub trait ChatBackend {
    /// Ask one question and return the trimmed, non-empty answer
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendTimeout`] or [`Error::Backend`] on any failure,
    /// including an empty answer
    fn ask(&mut self, user_text: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Ollama `/api/chat` client
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    num_predict: u32,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client that enforces the configured request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;

        tracing::debug!(url = %config.url, model = %config.model, "chat client initialized");

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            num_predict: config.num_predict,
            timeout: config.timeout,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::BackendTimeout(self.timeout)
        } else {
            Error::Backend(e.to_string())
        }
    }
}

impl ChatBackend for OllamaClient {
    fn ask(&mut self, user_text: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        };

        tracing::debug!(model = %self.model, "sending chat request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "chat backend error");
            return Err(Error::Backend(format!("chat backend returned {status}")));
        }

        let body = response.text().map_err(|e| self.map_send_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Backend(format!("malformed chat response: {e}")))?;

        let content = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(Error::Backend("empty chat response".to_string()));
        }

        tracing::debug!(response_len = content.len(), "chat backend responded");
        Ok(content)
    }
}
