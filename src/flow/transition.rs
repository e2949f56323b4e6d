//! Pure flow transition function
//!
//! Given the same state, table and action it always produces the same new
//! state and effects. Replies, history and broadcasting live in the runtime.

use super::state::FollowUp;
use super::table::{FlowTable, InputKind, Outcome};
use super::{Action, Effect, FlowState, Step, UploadedFileRef};
use thiserror::Error;

/// Result of a flow transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: FlowState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: FlowState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Reasons an action is discarded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("action for step {submitted} arrived while {active} is active")]
    StaleStep { submitted: Step, active: Step },
    #[error("empty input")]
    EmptyInput,
    #[error("{action} is not accepted at step {step}")]
    NotAccepted { action: &'static str, step: Step },
}

/// Pure transition function
pub fn transition(
    state: &FlowState,
    table: &FlowTable,
    action: Action,
) -> Result<TransitionResult, TransitionError> {
    match action {
        Action::Choice { step, choice } => {
            if step != state.step {
                return Err(TransitionError::StaleStep {
                    submitted: step,
                    active: state.step,
                });
            }
            let choice = non_empty(&choice)?;

            // While a follow-up is open, any input answers it
            if state.follow_up.is_some() {
                return Ok(free_text(state, choice));
            }

            match table.resolve_choice(step, choice) {
                Some(resolved) => {
                    let mut next = state.clone();
                    next.answers.record_choice(step, &resolved.label);
                    let message = echo(step, &resolved.label, &next);
                    match resolved.outcome {
                        Outcome::Advance { to } => next.step = to,
                        Outcome::Stay => {}
                        Outcome::FollowUp {
                            prompt,
                            then,
                            accepts_files,
                        } => {
                            next.follow_up = Some(FollowUp {
                                prompt,
                                then,
                                accepts_files,
                            });
                        }
                    }
                    Ok(advance(state.step, next, message))
                }
                // Anything off-script is chat, never a redirection
                None => Ok(free_text(state, choice)),
            }
        }

        Action::FreeText { text } => {
            let text = non_empty(&text)?;
            Ok(free_text(state, text))
        }

        Action::Files { files } => {
            if files.is_empty() {
                return Err(TransitionError::EmptyInput);
            }
            let message = upload_message(&files);
            let mut next = state.clone();
            next.answers.uploaded_files.extend(files);

            let successor = match &state.follow_up {
                Some(follow_up) if follow_up.accepts_files => Some(follow_up.then),
                Some(_) => None,
                None => table.spec(state.step).and_then(|spec| spec.on_files),
            };
            if let Some(to) = successor {
                next.follow_up = None;
                next.step = to;
            }
            Ok(advance(state.step, next, message))
        }

        Action::ToggleFileCategory { category } => {
            accepts_category_edits(state, table, "category selection")?;
            let mut next = state.clone();
            next.answers.toggle_file_category(category);
            Ok(TransitionResult::new(next).with_effect(Effect::AnswersChanged))
        }

        Action::DescribeOtherFiles { text } => {
            accepts_category_edits(state, table, "file description")?;
            let mut next = state.clone();
            let text = text.trim();
            next.answers.other_file_description = (!text.is_empty()).then(|| text.to_string());
            Ok(TransitionResult::new(next).with_effect(Effect::AnswersChanged))
        }
    }
}

/// Free text either answers the open follow-up or is appended as plain chat
fn free_text(state: &FlowState, text: &str) -> TransitionResult {
    let mut next = state.clone();
    if let Some(follow_up) = next.follow_up.take() {
        next.answers.record_follow_up(state.step, text);
        next.step = follow_up.then;
    }
    advance(state.step, next, text.to_string())
}

fn advance(from: Step, next: FlowState, message: String) -> TransitionResult {
    let to = next.step;
    let mut effects = vec![Effect::user_message(message)];
    if from != to {
        effects.push(Effect::StepChanged { from, to });
    }
    effects.push(Effect::RequestReply);
    TransitionResult::new(next).with_effects(effects)
}

fn accepts_category_edits(
    state: &FlowState,
    table: &FlowTable,
    action: &'static str,
) -> Result<(), TransitionError> {
    let editable = state.follow_up.is_none()
        && table
            .spec(state.step)
            .is_some_and(|spec| spec.input == InputKind::FileCategories);
    if editable {
        Ok(())
    } else {
        Err(TransitionError::NotAccepted {
            action,
            step: state.step,
        })
    }
}

fn non_empty(text: &str) -> Result<&str, TransitionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(TransitionError::EmptyInput)
    } else {
        Ok(trimmed)
    }
}

/// Natural-language echo of a picked option, as sent to the generator
fn echo(step: Step, label: &str, state: &FlowState) -> String {
    match step {
        Step::FileRecommendations => format!(
            "I plan to upload: {}",
            state.answers.selected_file_labels().join(", ")
        ),
        _ => label.to_string(),
    }
}

fn upload_message(files: &[UploadedFileRef]) -> String {
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    let noun = if files.len() == 1 { "file" } else { "files" };
    format!("Uploaded {} {noun}: {}", files.len(), names.join(", "))
}
