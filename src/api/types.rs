//! API request and response types

use crate::flow::{FileCategory, Step, UploadedFileRef};
use crate::runtime::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Button or dropdown selection
#[derive(Debug, Deserialize)]
pub struct ChoiceRequest {
    /// Step the option was rendered for
    pub step: Step,
    pub choice: String,
}

/// Typed message
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// File picker submission; contents stay in the browser
#[derive(Debug, Deserialize)]
pub struct FilesRequest {
    pub files: Vec<UploadedFileRef>,
}

/// Edit on the file recommendation card: either toggle one category or
/// describe the "other" files
#[derive(Debug, Deserialize)]
pub struct FileCategoriesRequest {
    #[serde(default)]
    pub category: Option<FileCategory>,
    #[serde(default)]
    pub other_description: Option<String>,
}

/// Response for every session action
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub accepted: bool,
    /// Why the action was discarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Assistant message the action started streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    pub snapshot: SessionSnapshot,
}

/// Response for cancel requests
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub snapshot: SessionSnapshot,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
