//! Effects produced by flow transitions

use super::step::Step;

/// Effects to be executed by the session after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a user message to the conversation
    AppendUserMessage { text: String },

    /// The active step moved
    StepChanged { from: Step, to: Step },

    /// Answers changed without a message (file category card edits)
    AnswersChanged,

    /// Send the conversation to the text generator
    RequestReply,
}

impl Effect {
    pub fn user_message(text: impl Into<String>) -> Self {
        Effect::AppendUserMessage { text: text.into() }
    }
}
