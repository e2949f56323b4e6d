//! Mock generators and session-level tests
//!
//! These mocks drive sessions end to end without network I/O.

use crate::llm::{ChatRequest, LlmError, TextGenerator, TextStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Generator
// ============================================================================

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Fragments streamed in order; an `Err` ends the stream
    Stream(Vec<Result<String, LlmError>>),
    /// `generate` itself fails
    Fail(LlmError),
}

/// Generator that replays queued replies
pub struct MockGenerator {
    replies: Mutex<VecDeque<MockReply>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            model_id: "mock-model".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply made of the given fragments
    pub fn queue_reply(&self, fragments: &[&str]) {
        let items = fragments.iter().map(|f| Ok((*f).to_string())).collect();
        self.replies.lock().unwrap().push_back(MockReply::Stream(items));
    }

    /// Queue a reply that fails before streaming anything
    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(MockReply::Fail(error));
    }

    /// Queue a reply that streams some fragments and then breaks
    pub fn queue_broken_stream(&self, fragments: &[&str], error: LlmError) {
        let mut items: Vec<_> = fragments.iter().map(|f| Ok((*f).to_string())).collect();
        items.push(Err(error));
        self.replies.lock().unwrap().push_back(MockReply::Stream(items));
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> MockReply {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Fail(LlmError::network("No mock reply queued")))
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        match self.next_reply(request) {
            MockReply::Stream(items) => Ok(stream::iter(items).boxed()),
            MockReply::Fail(error) => Err(error),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Delayed Mock Generator (for cancellation testing)
// ============================================================================

/// Generator that waits before every fragment
pub struct DelayedMockGenerator {
    inner: MockGenerator,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockGenerator::new(),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_reply(&self, fragments: &[&str]) {
        self.inner.queue_reply(fragments);
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.inner.recorded_requests()
    }
}

#[async_trait]
impl TextGenerator for DelayedMockGenerator {
    async fn generate(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let reply = self.inner.next_reply(request);
        self.request_started.notify_one();
        let delay = self.delay;
        match reply {
            MockReply::Stream(items) => Ok(stream::iter(items)
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed()),
            MockReply::Fail(error) => Err(error),
        }
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Session Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::flow::{Affordance, Step, UploadedFileRef};
    use crate::llm::{LlmErrorKind, MessageRole};
    use crate::runtime::{
        FlowSession, MessageStatus, ReplyOutcome, ReplyStatus, SessionError, SessionEvent,
        SessionSnapshot,
    };

    async fn session_with(generator: Arc<dyn TextGenerator>) -> FlowSession {
        session_with_config(generator, FlowConfig::default()).await
    }

    async fn session_with_config(
        generator: Arc<dyn TextGenerator>,
        config: FlowConfig,
    ) -> FlowSession {
        let session = FlowSession::new("test-session".to_string(), generator, Arc::new(config));
        session.start().await;
        session
    }

    async fn choose(session: &FlowSession, step: Step, choice: &str) -> ReplyOutcome {
        session
            .submit_choice(step, choice)
            .await
            .into_reply()
            .expect("choice should start a reply")
            .finished()
            .await
    }

    fn roles(snapshot: &SessionSnapshot) -> Vec<MessageRole> {
        snapshot.messages.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn test_start_shows_welcome() {
        let session = session_with(Arc::new(MockGenerator::new())).await;
        let snapshot = session.snapshot().await;

        assert_eq!(snapshot.step, Step::ChooseFootprintType);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].role, MessageRole::Assistant);
        assert!(snapshot.messages[0]
            .content
            .starts_with("**Welcome to Gaia Assistant!**"));
        assert_eq!(snapshot.reply, ReplyStatus::Idle);
        assert_eq!(
            snapshot.affordance,
            Affordance::Buttons {
                options: vec![
                    "Scope 3.1".to_string(),
                    "Product Carbon Footprint".to_string(),
                    "Supplier Engagement".to_string()
                ]
            }
        );
    }

    #[tokio::test]
    async fn test_happy_path_to_file_recommendations() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_reply(&["**Choose Reporting Year**"]);
        generator.queue_reply(&["Great, computing ", "your footprint for 2025."]);
        generator.queue_reply(&["Why are you computing your footprint?"]);
        generator.queue_reply(&["**Recommended Files to Upload**"]);
        let session = session_with(generator.clone()).await;

        for (step, choice) in [
            (Step::ChooseFootprintType, "Scope 3.1"),
            (Step::ChooseYear, "2025"),
            (Step::AskPriorExperience, "No"),
            (Step::AskMotivation, "CSRD Compliance"),
        ] {
            assert!(matches!(
                choose(&session, step, choice).await,
                ReplyOutcome::Completed
            ));
        }

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::FileRecommendations);
        assert_eq!(
            roles(&snapshot),
            vec![
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
            ]
        );
        assert_eq!(
            snapshot.messages[4].content,
            "Great, computing your footprint for 2025."
        );
        assert!(snapshot
            .messages
            .iter()
            .all(|m| m.status == MessageStatus::Complete));
        assert!(matches!(snapshot.affordance, Affordance::FileCategories { .. }));
        assert_eq!(snapshot.answers.reporting_year, Some(2025));

        // Every request carries the full history so far plus the script
        let requests = generator.recorded_requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[3].messages.len(), 8);
        assert!(requests[3].system.contains("`file-recommendations`"));
    }

    #[tokio::test]
    async fn test_stale_choice_changes_nothing() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_reply(&["**Choose Reporting Year**"]);
        let session = session_with(generator.clone()).await;
        choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        let before = session.snapshot().await;

        let submission = session
            .submit_choice(Step::ChooseFootprintType, "Product Carbon Footprint")
            .await;
        assert!(!submission.is_accepted());

        let after = session.snapshot().await;
        assert_eq!(after.step, Step::ChooseYear);
        assert_eq!(after.messages, before.messages);
        assert_eq!(after.answers, before.answers);
        assert_eq!(generator.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_new_reply_supersedes_streaming_one() {
        let generator = Arc::new(DelayedMockGenerator::new(Duration::from_millis(100)));
        generator.queue_reply(&["first ", "reply ", "that ", "never ", "finishes"]);
        generator.queue_reply(&["second"]);
        let session = session_with(generator.clone()).await;

        let first = session
            .submit_free_text("hello")
            .await
            .into_reply()
            .unwrap();
        generator.request_started.notified().await;

        let second = session
            .submit_free_text("are you there?")
            .await
            .into_reply()
            .unwrap();

        assert!(matches!(first.finished().await, ReplyOutcome::Cancelled));
        assert!(matches!(second.finished().await, ReplyOutcome::Completed));

        let snapshot = session.snapshot().await;
        let streaming = snapshot
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Streaming)
            .count();
        assert_eq!(streaming, 0);
        assert_eq!(snapshot.messages.last().unwrap().content, "second");
        assert!(!snapshot
            .messages
            .iter()
            .any(|m| m.content.contains("finishes")));
        assert_eq!(generator.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_text() {
        let generator = Arc::new(DelayedMockGenerator::new(Duration::from_millis(50)));
        generator.queue_reply(&["Partial ", "answer ", "that ", "keeps ", "going"]);
        let session = session_with(generator.clone()).await;
        let mut events = session.subscribe();

        let reply = session
            .submit_choice(Step::ChooseFootprintType, "Scope 3.1")
            .await
            .into_reply()
            .unwrap();

        // Wait for the first fragment to land
        loop {
            if let Ok(SessionEvent::Delta { .. }) = events.recv().await {
                break;
            }
        }
        assert!(session.cancel().await);
        assert!(matches!(reply.finished().await, ReplyOutcome::Cancelled));
        assert!(!session.cancel().await);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::ChooseYear);
        assert_eq!(snapshot.reply, ReplyStatus::Idle);
        let last = snapshot.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.status, MessageStatus::Complete);
        assert!(last.content.starts_with("Partial "));
        assert!(!last.content.contains("going"));
    }

    #[tokio::test]
    async fn test_start_resets_everything() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_reply(&["year?"]);
        generator.queue_reply(&["experience?"]);
        let session = session_with(generator).await;
        choose(&session, Step::ChooseFootprintType, "Supplier Engagement").await;
        choose(&session, Step::ChooseYear, "2030").await;

        session.start().await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::ChooseFootprintType);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.answers, crate::flow::FlowAnswers::default());
    }

    #[tokio::test]
    async fn test_retry_after_failure_reapplies_step() {
        let generator = Arc::new(MockGenerator::new());
        let session = session_with(generator.clone()).await;
        // Walk to validate-clean-data without generator traffic mattering
        for _ in 0..9 {
            generator.queue_reply(&["ok"]);
        }
        choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        choose(&session, Step::ChooseYear, "2025").await;
        choose(&session, Step::AskPriorExperience, "No").await;
        choose(&session, Step::AskMotivation, "CDP Reporting").await;
        choose(&session, Step::FileRecommendations, "Continue").await;
        choose(&session, Step::AskCollaborators, "No, I'll upload everything").await;
        session
            .submit_files(vec![UploadedFileRef::new("spend.csv", 4096)])
            .await
            .into_reply()
            .unwrap()
            .finished()
            .await;
        choose(&session, Step::DataQualityReview, "Fix automatically").await;
        choose(&session, Step::OptionalExtraFiles, "No, continue").await;
        assert_eq!(session.snapshot().await.step, Step::ValidateCleanData);

        generator.queue_error(LlmError::server_error("Server error: upstream unavailable"));
        let outcome = choose(&session, Step::ValidateCleanData, "Yes, validate").await;
        assert!(matches!(outcome, ReplyOutcome::Failed(_)));

        let failed = session.snapshot().await;
        assert_eq!(failed.step, Step::ValidateCleanData);
        assert_eq!(
            failed.reply,
            ReplyStatus::Failed {
                message: "Server error: upstream unavailable".to_string(),
                kind: LlmErrorKind::ServerError
            }
        );
        assert!(matches!(failed.affordance, Affordance::Retry { .. }));
        assert_eq!(failed.messages.last().unwrap().content, "Yes, validate");

        generator.queue_reply(&["Your data is now validated as CLEAN DATA."]);
        let outcome = session.retry().await.unwrap().finished().await;
        assert!(matches!(outcome, ReplyOutcome::Completed));

        let recovered = session.snapshot().await;
        assert_eq!(recovered.step, Step::TransitionToStandardization);
        assert_eq!(recovered.reply, ReplyStatus::Idle);
        assert!(recovered.answers.clean_data_validated);
        let echoes = recovered
            .messages
            .iter()
            .filter(|m| m.content == "Yes, validate")
            .count();
        assert_eq!(echoes, 1);

        // The retried request carries the same history as the failed one
        let requests = generator.recorded_requests();
        let n = requests.len();
        assert_eq!(requests[n - 1].messages, requests[n - 2].messages);
    }

    #[tokio::test]
    async fn test_retry_without_failure() {
        let session = session_with(Arc::new(MockGenerator::new())).await;
        assert_eq!(session.retry().await.unwrap_err(), SessionError::NothingToRetry);
    }

    #[tokio::test]
    async fn test_regenerate_after_failure_resumes_target() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_error(LlmError::server_error("down"));
        let session = session_with(generator.clone()).await;

        let outcome = choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        assert!(matches!(outcome, ReplyOutcome::Failed(_)));
        let failed = session.snapshot().await;
        assert_eq!(failed.step, Step::ChooseFootprintType);
        assert_eq!(
            failed.affordance,
            Affordance::Retry {
                message: LlmError::server_error("down").user_facing()
            }
        );

        generator.queue_reply(&["**Choose Reporting Year**"]);
        let outcome = session.request_reply().await.finished().await;
        assert!(matches!(outcome, ReplyOutcome::Completed));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::ChooseYear);
        assert_eq!(snapshot.reply, ReplyStatus::Idle);
        assert!(matches!(snapshot.affordance, Affordance::Dropdown { .. }));
        assert_eq!(session.retry().await.unwrap_err(), SessionError::NothingToRetry);
    }

    #[tokio::test]
    async fn test_failed_regenerate_keeps_retry_target() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_error(LlmError::server_error("down"));
        generator.queue_error(LlmError::server_error("still down"));
        let session = session_with(generator.clone()).await;

        choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        let outcome = session.request_reply().await.finished().await;
        assert!(matches!(outcome, ReplyOutcome::Failed(_)));

        let failed = session.snapshot().await;
        assert_eq!(failed.step, Step::ChooseFootprintType);
        assert_eq!(
            failed.reply,
            ReplyStatus::Failed {
                message: "still down".to_string(),
                kind: LlmErrorKind::ServerError
            }
        );

        generator.queue_reply(&["**Choose Reporting Year**"]);
        let outcome = session.retry().await.unwrap().finished().await;
        assert!(matches!(outcome, ReplyOutcome::Completed));
        assert_eq!(session.snapshot().await.step, Step::ChooseYear);
    }

    #[tokio::test]
    async fn test_broken_stream_marks_partial_failed() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_broken_stream(&["Choose "], LlmError::network("Stream interrupted"));
        let session = session_with(generator.clone()).await;

        let outcome = choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        assert!(matches!(outcome, ReplyOutcome::Failed(_)));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::ChooseFootprintType);
        let last = snapshot.messages.last().unwrap();
        assert_eq!(last.status, MessageStatus::Failed);
        assert_eq!(last.content, "Choose ");

        // The broken partial is not sent back to the generator
        generator.queue_reply(&["**Choose Reporting Year**"]);
        session.retry().await.unwrap().finished().await;
        let requests = generator.recorded_requests();
        assert!(requests[1].messages.iter().all(|m| m.content != "Choose "));
        assert_eq!(session.snapshot().await.step, Step::ChooseYear);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_first_reply() {
        let config = crate::config::LlmConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(1),
        };
        let generator = crate::llm::OpenAiGenerator::new(&config).unwrap();
        let session = session_with(Arc::new(generator)).await;

        let outcome = choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        let ReplyOutcome::Failed(error) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(error.kind, LlmErrorKind::Configuration);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::ChooseFootprintType);
        assert!(matches!(snapshot.affordance, Affordance::Retry { .. }));
    }

    #[tokio::test]
    async fn test_slow_reply_times_out_as_network_error() {
        let generator = Arc::new(DelayedMockGenerator::new(Duration::from_millis(500)));
        generator.queue_reply(&["too late"]);
        let config = FlowConfig {
            request_timeout: Duration::from_millis(50),
            ..FlowConfig::default()
        };
        let session = session_with_config(generator, config).await;

        let outcome = choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        let ReplyOutcome::Failed(error) = outcome else {
            panic!("expected timeout, got {outcome:?}");
        };
        assert_eq!(error.kind, LlmErrorKind::Network);
        assert_eq!(session.snapshot().await.step, Step::ChooseFootprintType);
    }

    #[tokio::test]
    async fn test_free_text_does_not_advance() {
        let generator = Arc::new(MockGenerator::new());
        generator.queue_reply(&["Scope 3.1 covers purchased goods and services."]);
        let session = session_with(generator).await;

        let reply = session
            .submit_free_text("what is scope 3.1?")
            .await
            .into_reply()
            .unwrap();
        reply.finished().await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, Step::ChooseFootprintType);
        assert_eq!(snapshot.messages.len(), 3);
        assert!(!session.submit_free_text("   ").await.is_accepted());
    }

    #[tokio::test]
    async fn test_category_edits_broadcast_without_reply() {
        let generator = Arc::new(MockGenerator::new());
        for _ in 0..4 {
            generator.queue_reply(&["ok"]);
        }
        let session = session_with(generator.clone()).await;
        choose(&session, Step::ChooseFootprintType, "Scope 3.1").await;
        choose(&session, Step::ChooseYear, "2025").await;
        choose(&session, Step::AskPriorExperience, "No").await;
        choose(&session, Step::AskMotivation, "SBTi Targets").await;

        let mut events = session.subscribe();
        let submission = session
            .toggle_file_category(crate::flow::FileCategory::Other)
            .await;
        assert!(submission.is_accepted());
        assert!(submission.into_reply().is_none());
        session.set_other_file_description("Fleet fuel cards").await;

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::AnswersChanged { .. }
        ));
        let snapshot = session.snapshot().await;
        assert_eq!(
            snapshot.answers.selected_file_labels(),
            vec!["Procurement Data", "Suppliers List", "Other: Fleet fuel cards"]
        );
        assert_eq!(generator.recorded_requests().len(), 4);
    }
}
