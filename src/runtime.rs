//! Runtime for guided onboarding sessions
//!
//! Each session owns its flow state, its message history and a single
//! in-flight reply slot. The manager maps session ids to sessions.

mod session;

#[cfg(test)]
pub mod testing;

pub use session::{FlowSession, ReplyHandle, ReplyOutcome, SessionError, Submission};

use crate::config::FlowConfig;
use crate::flow::{Affordance, FlowAnswers, Step};
use crate::llm::{LlmErrorKind, MessageRole, TextGenerator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Lifecycle of a message in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Complete,
    /// Assistant reply still receiving fragments
    Streaming,
    /// Partial assistant reply whose stream broke; shown, never sent back
    Failed,
}

/// One entry in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            status,
            created_at: Utc::now(),
        }
    }
}

/// Whether the session is waiting on the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplyStatus {
    Idle,
    Streaming { message_id: String },
    Failed { message: String, kind: LlmErrorKind },
}

/// Read-only view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub step: Step,
    pub affordance: Affordance,
    pub messages: Vec<ConversationMessage>,
    pub answers: FlowAnswers,
    pub reply: ReplyStatus,
}

/// Events broadcast to subscribers of a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A message was appended or finalised
    Message { message: ConversationMessage },
    /// A fragment was appended to a streaming reply
    Delta { message_id: String, text: String },
    StepChanged { from: Step, to: Step },
    AnswersChanged { answers: FlowAnswers },
    /// The reply finished; carries the input to show next
    ReplyDone {
        message_id: String,
        affordance: Affordance,
    },
    ReplyFailed {
        message: String,
        kind: LlmErrorKind,
        step: Step,
    },
    /// The session restarted from the first step
    Reset { snapshot: SessionSnapshot },
}

/// A session plus the last time a request reached it
struct SessionEntry {
    session: FlowSession,
    /// Milliseconds since the manager's epoch
    last_seen: AtomicU64,
}

/// Manager for all live sessions
pub struct SessionManager {
    generator: Arc<dyn TextGenerator>,
    config: Arc<FlowConfig>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    epoch: Instant,
}

impl SessionManager {
    pub fn new(generator: Arc<dyn TextGenerator>, config: FlowConfig) -> Self {
        Self {
            generator,
            config: Arc::new(config),
            sessions: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Create and start a new session
    pub async fn create(&self) -> FlowSession {
        let id = uuid::Uuid::new_v4().to_string();
        let session = FlowSession::new(id.clone(), self.generator.clone(), self.config.clone());
        session.start().await;
        let entry = SessionEntry {
            session: session.clone(),
            last_seen: AtomicU64::new(self.now_millis()),
        };
        self.sessions.write().await.insert(id.clone(), entry);
        tracing::info!(session_id = %id, "Session created");
        session
    }

    /// Look up a session and mark it as active
    pub async fn get(&self, id: &str) -> Option<FlowSession> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id)?;
        entry.last_seen.store(self.now_millis(), Ordering::Relaxed);
        Some(entry.session.clone())
    }

    /// Drop a session, cancelling any reply it has in flight
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(entry) => {
                entry.session.cancel().await;
                tracing::info!(session_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Drop sessions nobody has touched for `max_idle` and nobody is streaming
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.now_millis();
        let max_idle = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let evicted: Vec<(String, SessionEntry)> = {
            let mut sessions = self.sessions.write().await;
            let idle: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| {
                    now.saturating_sub(entry.last_seen.load(Ordering::Relaxed)) >= max_idle
                        && !entry.session.has_subscribers()
                })
                .map(|(id, _)| id.clone())
                .collect();
            idle.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &evicted {
            entry.session.cancel().await;
            tracing::info!(session_id = %id, "Idle session evicted");
        }
        evicted.len()
    }

    /// Periodically evict idle sessions until the manager is dropped
    pub fn spawn_idle_sweep(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let period = (max_idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let evicted = manager.evict_idle(max_idle).await;
                if evicted > 0 {
                    let remaining = manager.session_count().await;
                    tracing::debug!(evicted, remaining, "Idle sweep");
                }
            }
        })
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
