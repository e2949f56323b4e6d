//! Text generator abstraction
//!
//! The assistant's replies come from an opaque chat-completion service that
//! streams text fragments. The session runtime only sees [`TextGenerator`].

mod error;
mod openai;
mod sse;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiGenerator;
pub use types::*;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Instant;

/// Stream of reply fragments; ends after the last fragment or the first error
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Common interface for reply generators
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a streamed reply to the given conversation
    async fn generate(&self, request: &ChatRequest) -> Result<TextStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for generators
pub struct LoggingGenerator {
    inner: Arc<dyn TextGenerator>,
    model_id: String,
}

impl LoggingGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl TextGenerator for LoggingGenerator {
    async fn generate(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let start = Instant::now();
        match self.inner.generate(request).await {
            Ok(stream) => {
                tracing::debug!(
                    model = %self.model_id,
                    messages = request.messages.len(),
                    "LLM stream opened"
                );
                Ok(logged(stream, self.model_id.clone(), start))
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "LLM request failed"
                );
                Err(e)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

struct StreamProgress {
    inner: TextStream,
    model_id: String,
    start: Instant,
    chars: usize,
    done: bool,
}

/// Log completion or failure once the wrapped stream ends
fn logged(inner: TextStream, model_id: String, start: Instant) -> TextStream {
    let progress = StreamProgress {
        inner,
        model_id,
        start,
        chars: 0,
        done: false,
    };

    stream::unfold(progress, |mut p| async move {
        if p.done {
            return None;
        }
        match p.inner.next().await {
            Some(Ok(fragment)) => {
                p.chars += fragment.chars().count();
                Some((Ok(fragment), p))
            }
            Some(Err(e)) => {
                tracing::error!(
                    model = %p.model_id,
                    duration_ms = %p.start.elapsed().as_millis(),
                    chars = p.chars,
                    error = %e.message,
                    kind = ?e.kind,
                    "LLM stream failed"
                );
                p.done = true;
                Some((Err(e), p))
            }
            None => {
                tracing::info!(
                    model = %p.model_id,
                    duration_ms = %p.start.elapsed().as_millis(),
                    chars = p.chars,
                    "LLM reply completed"
                );
                None
            }
        }
    })
    .boxed()
}
