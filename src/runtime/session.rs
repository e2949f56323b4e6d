//! A single guided onboarding session
//!
//! All state sits behind one async mutex. User operations run the pure flow
//! transition, then execute its effects: append the echo message, broadcast
//! the step change and start a reply. Replies stream on a spawned task that
//! re-checks its sequence number and cancellation token before applying each
//! fragment, so a superseded reply can never write into the history.

use super::{
    ConversationMessage, MessageStatus, ReplyStatus, SessionEvent, SessionSnapshot,
};
use crate::config::FlowConfig;
use crate::flow::{
    transition, Action, Affordance, Effect, FileCategory, FlowState, Step, StepPosition,
    TransitionError, UploadedFileRef,
};
use crate::llm::{ChatMessage, ChatRequest, LlmError, MessageRole, TextGenerator};
use crate::system_prompt::build_system_prompt;
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Misuse of session operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no failed reply to retry")]
    NothingToRetry,
}

/// Outcome of submitting an action
#[derive(Debug)]
pub enum Submission {
    /// Applied; carries the reply it triggered, if any
    Accepted { reply: Option<ReplyHandle> },
    /// Stale or empty input; nothing changed
    Discarded { reason: TransitionError },
}

#[allow(dead_code)] // Used by tests; the HTTP layer matches directly
impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted { .. })
    }

    /// The reply started by this submission
    pub fn into_reply(self) -> Option<ReplyHandle> {
        match self {
            Submission::Accepted { reply } => reply,
            Submission::Discarded { .. } => None,
        }
    }
}

/// How a reply task ended
#[allow(dead_code)] // Read by callers that await the reply
#[derive(Debug)]
pub enum ReplyOutcome {
    Completed,
    Failed(LlmError),
    /// Cancelled, superseded by a newer reply or dropped by a restart
    Cancelled,
}

/// Handle to a spawned reply task
#[derive(Debug)]
pub struct ReplyHandle {
    message_id: String,
    task: JoinHandle<ReplyOutcome>,
}

impl ReplyHandle {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Wait for the reply task to end
    #[allow(dead_code)] // HTTP handlers let replies run detached
    pub async fn finished(self) -> ReplyOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Reply task aborted");
                ReplyOutcome::Cancelled
            }
        }
    }
}

/// The reply currently allowed to write into the history
struct InFlight {
    seq: u64,
    cancel: CancellationToken,
    message_id: String,
    /// Position before the action that requested the reply
    origin: StepPosition,
    /// Position the action moved to
    target: StepPosition,
}

/// A failed reply waiting for `retry`
struct PendingRetry {
    error: LlmError,
    origin: StepPosition,
    target: StepPosition,
}

struct SessionInner {
    flow: FlowState,
    messages: Vec<ConversationMessage>,
    next_seq: u64,
    in_flight: Option<InFlight>,
    failure: Option<PendingRetry>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            flow: FlowState::initial(),
            messages: Vec::new(),
            next_seq: 0,
            in_flight: None,
            failure: None,
        }
    }

    fn is_current(&self, seq: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.seq == seq && !f.cancel.is_cancelled())
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    /// History sent to the generator; broken partial replies are left out
    fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.status == MessageStatus::Complete && !m.content.is_empty())
            .map(|m| ChatMessage::new(m.role, m.content.clone()))
            .collect()
    }

    /// Stop the in-flight reply, keeping whatever text it produced
    fn stop_in_flight(&mut self) -> Option<ConversationMessage> {
        let in_flight = self.in_flight.take()?;
        in_flight.cancel.cancel();
        let pos = self
            .messages
            .iter()
            .rposition(|m| m.id == in_flight.message_id)?;
        if self.messages[pos].content.is_empty() {
            self.messages.remove(pos);
            None
        } else {
            self.messages[pos].status = MessageStatus::Complete;
            Some(self.messages[pos].clone())
        }
    }

    fn reply_status(&self) -> ReplyStatus {
        match (&self.in_flight, &self.failure) {
            (Some(f), _) => ReplyStatus::Streaming {
                message_id: f.message_id.clone(),
            },
            (None, Some(pending)) => ReplyStatus::Failed {
                message: pending.error.message.clone(),
                kind: pending.error.kind,
            },
            (None, None) => ReplyStatus::Idle,
        }
    }
}

struct SessionCore {
    id: String,
    generator: Arc<dyn TextGenerator>,
    config: Arc<FlowConfig>,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<SessionInner>,
}

/// Cheap handle to one session
#[derive(Clone)]
pub struct FlowSession {
    core: Arc<SessionCore>,
}

impl FlowSession {
    pub fn new(id: String, generator: Arc<dyn TextGenerator>, config: Arc<FlowConfig>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            core: Arc::new(SessionCore {
                id,
                generator,
                config,
                events,
                state: Mutex::new(SessionInner::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.events.subscribe()
    }

    /// Whether an event stream is attached
    pub fn has_subscribers(&self) -> bool {
        self.core.events.receiver_count() > 0
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Restart from the first step with only the welcome message
    pub async fn start(&self) {
        let mut inner = self.core.state.lock().await;
        if let Some(in_flight) = inner.in_flight.take() {
            in_flight.cancel.cancel();
        }
        // Sequence numbers keep counting so a reply from before the restart stays stale
        let next_seq = inner.next_seq;
        *inner = SessionInner::new();
        inner.next_seq = next_seq;
        inner.messages.push(ConversationMessage::new(
            MessageRole::Assistant,
            self.core.config.welcome_message.clone(),
            MessageStatus::Complete,
        ));
        let snapshot = self.core.snapshot_locked(&inner);
        drop(inner);

        tracing::info!(session_id = %self.core.id, "Session started");
        self.core.emit(SessionEvent::Reset { snapshot });
    }

    pub async fn submit_choice(&self, step: Step, choice: impl Into<String>) -> Submission {
        self.submit(Action::choice(step, choice)).await
    }

    pub async fn submit_free_text(&self, text: impl Into<String>) -> Submission {
        self.submit(Action::free_text(text)).await
    }

    pub async fn submit_files(&self, files: Vec<UploadedFileRef>) -> Submission {
        self.submit(Action::Files { files }).await
    }

    pub async fn toggle_file_category(&self, category: FileCategory) -> Submission {
        self.submit(Action::ToggleFileCategory { category }).await
    }

    pub async fn set_other_file_description(&self, text: impl Into<String>) -> Submission {
        self.submit(Action::DescribeOtherFiles { text: text.into() })
            .await
    }

    /// Run an action through the flow and execute its effects
    pub async fn submit(&self, action: Action) -> Submission {
        let mut inner = self.core.state.lock().await;
        let result = match transition(&inner.flow, &self.core.config.table, action) {
            Ok(result) => result,
            Err(reason) => {
                tracing::debug!(
                    session_id = %self.core.id,
                    step = %inner.flow.step,
                    reason = %reason,
                    "Action discarded"
                );
                return Submission::Discarded { reason };
            }
        };

        let origin = inner.flow.position();
        inner.flow = result.new_state;
        // A new message supersedes the failed one; card edits keep the retry
        if result.effects.contains(&Effect::RequestReply) {
            inner.failure = None;
        }

        let mut reply = None;
        for effect in result.effects {
            match effect {
                Effect::AppendUserMessage { text } => {
                    let message =
                        ConversationMessage::new(MessageRole::User, text, MessageStatus::Complete);
                    inner.messages.push(message.clone());
                    self.core.emit(SessionEvent::Message { message });
                }
                Effect::StepChanged { from, to } => {
                    tracing::info!(session_id = %self.core.id, from = %from, to = %to, "Step changed");
                    self.core.emit(SessionEvent::StepChanged { from, to });
                }
                Effect::AnswersChanged => {
                    self.core.emit(SessionEvent::AnswersChanged {
                        answers: inner.flow.answers.clone(),
                    });
                }
                Effect::RequestReply => {
                    let target = inner.flow.position();
                    reply = Some(self.core.start_reply(&mut inner, origin.clone(), target));
                }
            }
        }
        Submission::Accepted { reply }
    }

    /// Ask for a fresh reply to the current history without any user action
    ///
    /// A pending failure is resumed exactly like `retry`, and a reply that is
    /// replaced keeps its origin, so the step the user acted towards survives.
    pub async fn request_reply(&self) -> ReplyHandle {
        let mut inner = self.core.state.lock().await;
        if let Some(pending) = inner.failure.take() {
            return self.core.resume_locked(&mut inner, pending);
        }
        let (origin, target) = match &inner.in_flight {
            Some(in_flight) => (in_flight.origin.clone(), in_flight.target.clone()),
            None => {
                let position = inner.flow.position();
                (position.clone(), position)
            }
        };
        self.core.start_reply(&mut inner, origin, target)
    }

    /// Re-apply the step advance of the failed action and resend the history
    pub async fn retry(&self) -> Result<ReplyHandle, SessionError> {
        let mut inner = self.core.state.lock().await;
        let pending = inner.failure.take().ok_or(SessionError::NothingToRetry)?;
        Ok(self.core.resume_locked(&mut inner, pending))
    }

    /// Abort the in-flight reply; returns whether there was one
    pub async fn cancel(&self) -> bool {
        let mut inner = self.core.state.lock().await;
        let Some(message_id) = inner.in_flight.as_ref().map(|f| f.message_id.clone()) else {
            return false;
        };
        let kept = inner.stop_in_flight();
        let affordance = self.core.affordance_locked(&inner);
        drop(inner);

        tracing::info!(session_id = %self.core.id, "Reply cancelled");
        if let Some(message) = kept {
            self.core.emit(SessionEvent::Message { message });
        }
        self.core.emit(SessionEvent::ReplyDone {
            message_id,
            affordance,
        });
        true
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.core.state.lock().await;
        self.core.snapshot_locked(&inner)
    }
}

impl SessionCore {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn affordance_locked(&self, inner: &SessionInner) -> Affordance {
        match (&inner.in_flight, &inner.failure) {
            (Some(_), _) => Affordance::Waiting,
            (None, Some(pending)) => Affordance::Retry {
                message: pending.error.user_facing(),
            },
            (None, None) => self.config.table.affordance(&inner.flow),
        }
    }

    fn snapshot_locked(&self, inner: &SessionInner) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            step: inner.flow.step,
            affordance: self.affordance_locked(inner),
            messages: inner.messages.clone(),
            answers: inner.flow.answers.clone(),
            reply: inner.reply_status(),
        }
    }

    /// Move back to the failed action's target and request its reply again
    fn resume_locked(
        self: &Arc<Self>,
        inner: &mut SessionInner,
        pending: PendingRetry,
    ) -> ReplyHandle {
        let from = inner.flow.step;
        inner.flow.restore(pending.target.clone());
        let to = inner.flow.step;
        if from != to {
            self.emit(SessionEvent::StepChanged { from, to });
        }
        tracing::info!(session_id = %self.id, step = %to, "Retrying reply");
        self.start_reply(inner, pending.origin, pending.target)
    }

    /// Replace any in-flight reply with a new one and spawn its task
    fn start_reply(
        self: &Arc<Self>,
        inner: &mut SessionInner,
        origin: StepPosition,
        target: StepPosition,
    ) -> ReplyHandle {
        if let Some(message) = inner.stop_in_flight() {
            self.emit(SessionEvent::Message { message });
        }

        let request = ChatRequest {
            system: build_system_prompt(&self.config.system_prompt, inner.flow.step),
            messages: inner.chat_history(),
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let cancel = CancellationToken::new();
        let message =
            ConversationMessage::new(MessageRole::Assistant, String::new(), MessageStatus::Streaming);
        let message_id = message.id.clone();
        inner.messages.push(message.clone());
        inner.in_flight = Some(InFlight {
            seq,
            cancel: cancel.clone(),
            message_id: message_id.clone(),
            origin,
            target,
        });
        self.emit(SessionEvent::Message { message });

        tracing::debug!(session_id = %self.id, seq, step = %inner.flow.step, "Reply requested");
        let core = Arc::clone(self);
        let task_message_id = message_id.clone();
        let task = tokio::spawn(async move {
            core.run_reply(seq, &cancel, &request, &task_message_id)
                .await
        });

        ReplyHandle { message_id, task }
    }

    async fn run_reply(
        &self,
        seq: u64,
        cancel: &CancellationToken,
        request: &ChatRequest,
        message_id: &str,
    ) -> ReplyOutcome {
        let timeout = self.config.request_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        // Race the stream against cancellation
        let streamed = tokio::select! {
            biased;

            () = cancel.cancelled() => None,

            result = tokio::time::timeout_at(deadline, self.stream_into(seq, request, message_id)) => {
                Some(result.unwrap_or_else(|_| {
                    Err(LlmError::network(format!(
                        "No complete reply within {} seconds",
                        timeout.as_secs()
                    )))
                }))
            }
        };

        match streamed {
            None => ReplyOutcome::Cancelled,
            Some(Ok(())) => self.finish_reply(seq, message_id).await,
            Some(Err(error)) => self.fail_reply(seq, message_id, error).await,
        }
    }

    async fn stream_into(
        &self,
        seq: u64,
        request: &ChatRequest,
        message_id: &str,
    ) -> Result<(), LlmError> {
        let mut stream = self.generator.generate(request).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            let mut inner = self.state.lock().await;
            if !inner.is_current(seq) {
                return Ok(());
            }
            if let Some(message) = inner.message_mut(message_id) {
                message.content.push_str(&fragment);
            }
            drop(inner);
            self.emit(SessionEvent::Delta {
                message_id: message_id.to_string(),
                text: fragment,
            });
        }
        Ok(())
    }

    async fn finish_reply(&self, seq: u64, message_id: &str) -> ReplyOutcome {
        let mut inner = self.state.lock().await;
        if !inner.is_current(seq) {
            return ReplyOutcome::Cancelled;
        }
        inner.in_flight = None;
        inner.failure = None;
        let message = inner.message_mut(message_id).map(|m| {
            m.status = MessageStatus::Complete;
            m.clone()
        });
        let affordance = self.affordance_locked(&inner);
        let step = inner.flow.step;
        drop(inner);

        tracing::debug!(session_id = %self.id, seq, step = %step, "Reply completed");
        if let Some(message) = message {
            self.emit(SessionEvent::Message { message });
        }
        self.emit(SessionEvent::ReplyDone {
            message_id: message_id.to_string(),
            affordance,
        });
        ReplyOutcome::Completed
    }

    /// Drop or mark the broken reply, roll the step back and remember the target
    async fn fail_reply(&self, seq: u64, message_id: &str, error: LlmError) -> ReplyOutcome {
        let mut inner = self.state.lock().await;
        if !inner.is_current(seq) {
            return ReplyOutcome::Cancelled;
        }
        let Some(in_flight) = inner.in_flight.take() else {
            return ReplyOutcome::Cancelled;
        };

        let mut partial = None;
        if let Some(pos) = inner.messages.iter().rposition(|m| m.id == message_id) {
            if inner.messages[pos].content.is_empty() {
                inner.messages.remove(pos);
            } else {
                inner.messages[pos].status = MessageStatus::Failed;
                partial = Some(inner.messages[pos].clone());
            }
        }

        let from = inner.flow.step;
        inner.flow.restore(in_flight.origin.clone());
        let to = inner.flow.step;
        inner.failure = Some(PendingRetry {
            error: error.clone(),
            origin: in_flight.origin,
            target: in_flight.target,
        });
        drop(inner);

        tracing::warn!(
            session_id = %self.id,
            seq,
            error = %error.message,
            kind = ?error.kind,
            transient = error.kind.is_transient(),
            step = %to,
            "Reply failed"
        );
        if let Some(message) = partial {
            self.emit(SessionEvent::Message { message });
        }
        if from != to {
            self.emit(SessionEvent::StepChanged { from, to });
        }
        self.emit(SessionEvent::ReplyFailed {
            message: error.message.clone(),
            kind: error.kind,
            step: to,
        });
        ReplyOutcome::Failed(error)
    }
}
