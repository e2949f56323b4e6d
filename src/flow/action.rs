//! User actions that drive the flow

use super::answers::UploadedFileRef;
use super::step::{FileCategory, Step};

/// Actions funnelled in from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A button or dropdown value picked for `step`
    Choice { step: Step, choice: String },
    /// Text typed into the message box
    FreeText { text: String },
    /// Files attached through a dropzone or the attach button
    Files { files: Vec<UploadedFileRef> },
    /// Flip a category on the file recommendation card
    ToggleFileCategory { category: FileCategory },
    /// Describe the "Other" document type on the file recommendation card
    DescribeOtherFiles { text: String },
}

impl Action {
    pub fn choice(step: Step, choice: impl Into<String>) -> Self {
        Action::Choice {
            step,
            choice: choice.into(),
        }
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Action::FreeText { text: text.into() }
    }
}
