//! Flow state types

use super::answers::FlowAnswers;
use super::step::Step;
use serde::{Deserialize, Serialize};

/// A free-text question asked after an option, answered before the step advances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub prompt: String,
    pub then: Step,
    pub accepts_files: bool,
}

/// State owned by the flow engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowState {
    pub step: Step,
    #[serde(default)]
    pub follow_up: Option<FollowUp>,
    #[serde(default)]
    pub answers: FlowAnswers,
}

impl Default for Step {
    fn default() -> Self {
        Step::initial()
    }
}

impl FlowState {
    pub fn initial() -> Self {
        Self::default()
    }

    /// The part of the state a failed reply rolls back
    pub fn position(&self) -> StepPosition {
        StepPosition {
            step: self.step,
            follow_up: self.follow_up.clone(),
        }
    }

    pub fn restore(&mut self, position: StepPosition) {
        self.step = position.step;
        self.follow_up = position.follow_up;
    }
}

/// Active step plus any pending follow-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPosition {
    pub step: Step,
    pub follow_up: Option<FollowUp>,
}
