//! Guided onboarding flow
//!
//! Implements the Elm Architecture pattern: a data-driven step table and a
//! pure transition function. Replies and broadcasting live in the runtime.

mod action;
mod answers;
mod effect;
mod state;
mod step;
mod table;
pub(crate) mod transition;


pub use action::Action;
pub use answers::{FlowAnswers, UploadedFileRef};
pub use effect::Effect;
pub use state::FlowState;
#[allow(unused_imports)] // Public API re-exports
pub use state::{FollowUp, StepPosition};
pub use step::{Affordance, FileCategory, Step};
#[allow(unused_imports)] // Public API re-exports
pub use step::CategoryOption;
pub use table::{FlowTable, TableError};
#[allow(unused_imports)] // Public API re-exports
pub use table::{ChoiceOption, InputKind, Outcome, StepSpec};
pub use transition::{transition, TransitionError};
#[allow(unused_imports)] // Public API re-exports
pub use transition::TransitionResult;
