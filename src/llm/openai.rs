//! `OpenAI`-compatible streaming chat-completions generator

use super::sse::{SseDecoder, StreamItem};
use super::types::ChatRequest;
use super::{LlmError, TextGenerator, TextStream};
use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

/// Streaming generator for any `/chat/completions` compatible endpoint
pub struct OpenAiGenerator {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    fn translate_request<'a>(&'a self, request: &'a ChatRequest) -> OpenAIRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenAIMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        OpenAIRequest {
            model: &self.model,
            messages,
            stream: true,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::configuration(
                "OPENAI_API_KEY is not configured. Set it to enable assistant replies.",
            ));
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.translate_request(request))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let error = classify_status(status.as_u16(), &body);
            return Err(match retry_after {
                Some(after) => error.with_retry_after(after),
                None => error,
            });
        }

        Ok(decode_body(response.bytes_stream()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn transport_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        LlmError::network(format!("Connection failed: {e}"))
    } else if e.is_body() || e.is_decode() {
        LlmError::network(format!("Stream interrupted: {e}"))
    } else {
        LlmError::unknown(format!("Request failed: {e}"))
    }
}

fn classify_status(status: u16, body: &str) -> LlmError {
    let Ok(error_resp) = serde_json::from_str::<OpenAIErrorResponse>(body) else {
        return match status {
            500..=599 => LlmError::server_error(format!("HTTP {status} error: {body}")),
            _ => LlmError::unknown(format!("HTTP {status} error: {body}")),
        };
    };
    let message = error_resp.error.message;
    match status {
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
        400 => LlmError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<StreamItem>,
    finished: bool,
}

/// Turn a raw byte stream into text fragments
fn decode_body<S, B>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                match item {
                    StreamItem::Delta(text) => return Some((Ok(text), st)),
                    StreamItem::Done => return None,
                    StreamItem::Error(e) => {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let items = st.decoder.push(chunk.as_ref());
                    st.pending.extend(items);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(transport_error(&e)), st));
                }
                None => {
                    st.finished = true;
                    let items = st.decoder.finish();
                    st.pending.extend(items);
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
