//! Why a reply could not be produced
//!
//! Every failure leaves the session on the step the user acted from, with a
//! retry control. The kind only decides how the failure is logged and worded.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    /// Detail from the provider or transport, kept for logs and the snapshot
    pub message: String,
    /// Wait the provider asked for on a 429
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Configuration, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Text for the retry control shown under the failed reply
    pub fn user_facing(&self) -> String {
        match (self.kind, self.retry_after) {
            (LlmErrorKind::RateLimit, Some(after)) => format!(
                "Gaia Assistant is busy right now. Try again in {} seconds.",
                after.as_secs().max(1)
            ),
            (LlmErrorKind::RateLimit, None) => {
                "Gaia Assistant is busy right now. Try again in a moment.".to_string()
            }
            (LlmErrorKind::Network | LlmErrorKind::ServerError, _) => {
                "Gaia Assistant could not be reached. Your answers are saved; try again."
                    .to_string()
            }
            (LlmErrorKind::Auth | LlmErrorKind::Configuration, _) => format!(
                "Gaia Assistant is not set up correctly ({}).",
                self.message
            ),
            (LlmErrorKind::InvalidRequest | LlmErrorKind::Unknown, _) => format!(
                "Gaia Assistant could not answer: {}",
                self.message
            ),
        }
    }
}

/// Source of a failed reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// Connection refused, dropped stream or reply timeout
    Network,
    /// 429 from the provider
    RateLimit,
    /// 5xx or an error object inside the stream
    ServerError,
    /// 401 or 403: the key was rejected
    Auth,
    /// 400: the provider refused the conversation as sent
    InvalidRequest,
    /// No API key, or the HTTP client could not be built
    Configuration,
    Unknown,
}

impl LlmErrorKind {
    /// Whether pressing retry right away can succeed without operator action
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}
