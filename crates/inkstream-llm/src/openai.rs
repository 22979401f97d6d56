//! OpenAI-compatible streaming chat generator.
//!
//! Works against OpenAI or any service speaking the same chat completions
//! protocol (Groq, Ollama, vLLM, ...). Content deltas become text increments;
//! `reasoning_content` / `reasoning` deltas become reasoning increments.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};

use inkstream_core::{Appender, GenerationError, Increment, TextGenerator};

use crate::error::{LlmError, Result};

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible generator.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication (optional for local services like Ollama).
    pub api_key: Option<String>,

    /// Base URL for the API.
    pub base_url: String,

    pub model: String,

    /// System prompt sent ahead of the stream input.
    pub system_prompt: Option<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for the initial request.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl OpenAiConfig {
    /// Config with the API key read from the named environment variable.
    pub fn from_env(api_key_env: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Config(format!("{} environment variable not set", api_key_env))
        })?;
        Ok(Self::default().with_api_key(api_key))
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generator
// ─────────────────────────────────────────────────────────────────────────────

/// Streams one chat completion for a single prompt.
pub struct OpenAiGenerator {
    client: Client,
    config: OpenAiConfig,
    prompt: String,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig, prompt: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            prompt: prompt.into(),
        })
    }

    fn request_body(&self) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &self.config.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: self.prompt.clone(),
        });

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: true,
        }
    }

    /// Add authentication headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");

        if let Some(ref api_key) = self.config.api_key {
            builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key))
        } else {
            builder
        }
    }

    /// Open the streaming response, retrying transient failures.
    ///
    /// Retries only happen before any output, so nothing is ever emitted twice.
    async fn open_stream(&self) -> Result<DeltaStream> {
        let body = self.request_body();
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;

        loop {
            let result = async {
                let response = self
                    .add_headers(self.client.post(self.config.completions_url()))
                    .json(&body)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(handle_error_response(response).await);
                }
                Ok(parse_sse_stream(response.bytes_stream()))
            }
            .await;

            match result {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Chat request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&mut self, appender: Appender) -> std::result::Result<(), GenerationError> {
        tracing::debug!(
            model = %self.config.model,
            base_url = %self.config.base_url,
            prompt_bytes = self.prompt.len(),
            "Starting chat completion stream"
        );

        let mut stream = self.open_stream().await?;
        while let Some(increment) = stream.next().await {
            appender.push(increment?)?;
        }
        Ok(())
    }
}

/// Map an unsuccessful response onto an error.
async fn handle_error_response(response: Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
        match status.as_u16() {
            401 | 403 => LlmError::Auth(error.error.message),
            429 => LlmError::RateLimit(error.error.message),
            500..=599 => LlmError::Backend(format!("Server error: {}", error.error.message)),
            _ => LlmError::Backend(error.error.message),
        }
    } else if status.as_u16() == 429 {
        LlmError::RateLimit(format!("HTTP {}: {}", status, body))
    } else {
        LlmError::Backend(format!("HTTP {}: {}", status, body))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Stream of increments decoded from a chat completions SSE body.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Increment>> + Send + 'static>>;

struct SseState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    /// Raw bytes not yet split into lines. Kept as bytes so multi-byte
    /// characters split across network reads decode correctly.
    buffer: Vec<u8>,
    pending: VecDeque<Increment>,
    done: bool,
}

/// Decode an OpenAI-style SSE byte stream into increments.
///
/// Ends at `data: [DONE]` or when the body ends.
pub fn parse_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> DeltaStream {
    Box::pin(futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(increment) = state.pending.pop_front() {
                    return Some((Ok(increment), state));
                }
                if state.done {
                    return None;
                }

                // Process complete lines in the buffer
                if let Some(line_end) = state.buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    match parse_sse_line(line.trim()) {
                        Ok(SseLine::Done) => state.done = true,
                        Ok(SseLine::Increments(increments)) => state.pending.extend(increments),
                        Ok(SseLine::Skip) => {}
                        Err(e) => {
                            state.done = true;
                            return Some((Err(e), state));
                        }
                    }
                    continue;
                }

                // Need more data
                match state.byte_stream.next().await {
                    Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(LlmError::Network(e.to_string())), state));
                    }
                    None => {
                        // Body ended; a last unterminated line may remain
                        state.done = true;
                        if !state.buffer.is_empty() {
                            let raw = std::mem::take(&mut state.buffer);
                            let line = String::from_utf8_lossy(&raw);
                            match parse_sse_line(line.trim()) {
                                Ok(SseLine::Increments(increments)) => {
                                    state.pending.extend(increments)
                                }
                                Ok(_) => {}
                                Err(e) => return Some((Err(e), state)),
                            }
                        }
                    }
                }
            }
        },
    ))
}

enum SseLine {
    Increments(Vec<Increment>),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, event names, ids and blank separators
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Err(LlmError::Backend(error.message));
    }

    let mut increments = Vec::new();
    for choice in chunk.choices {
        let Some(delta) = choice.delta else { continue };
        if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning)
            && !reasoning.is_empty()
        {
            increments.push(Increment::Reasoning(reasoning));
        }
        if let Some(content) = delta.content
            && !content.is_empty()
        {
            increments.push(Increment::Text(content));
        }
    }
    Ok(SseLine::Increments(increments))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
