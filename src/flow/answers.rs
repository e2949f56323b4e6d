//! Answers captured while walking the flow

use super::step::{FileCategory, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A file the user attached. Contents are never read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFileRef {
    pub name: String,
    pub size_bytes: u64,
}

impl UploadedFileRef {
    #[allow(dead_code)] // Used by tests; the API deserializes file refs
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// Everything the user has told the flow so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAnswers {
    pub footprint_type: Option<String>,
    pub reporting_year: Option<u16>,
    pub prior_experience: Option<bool>,
    pub prior_experience_notes: Option<String>,
    pub motivation: Option<String>,
    pub file_categories: Vec<FileCategory>,
    pub other_file_description: Option<String>,
    pub needs_collaborators: Option<bool>,
    /// One upload folder per selected category, created when collaborators help
    pub upload_folders: Vec<String>,
    pub uploaded_files: Vec<UploadedFileRef>,
    pub data_quality_action: Option<String>,
    pub wants_extra_files: Option<bool>,
    pub clean_data_validated: bool,
    pub adds_bu_brand: Option<bool>,
    pub bu_brand_notes: Option<String>,
    pub custom_rules: Vec<String>,
    pub ef_priority: Option<String>,
    pub ready_to_engage: Option<bool>,
    pub focus_area: Option<String>,
    /// Last accepted label per step
    pub choices: BTreeMap<Step, String>,
}

impl Default for FlowAnswers {
    fn default() -> Self {
        Self {
            footprint_type: None,
            reporting_year: None,
            prior_experience: None,
            prior_experience_notes: None,
            motivation: None,
            file_categories: FileCategory::defaults(),
            other_file_description: None,
            needs_collaborators: None,
            upload_folders: Vec::new(),
            uploaded_files: Vec::new(),
            data_quality_action: None,
            wants_extra_files: None,
            clean_data_validated: false,
            adds_bu_brand: None,
            bu_brand_notes: None,
            custom_rules: Vec::new(),
            ef_priority: None,
            ready_to_engage: None,
            focus_area: None,
            choices: BTreeMap::new(),
        }
    }
}

impl FlowAnswers {
    /// Record an option picked at `step`
    pub fn record_choice(&mut self, step: Step, label: &str) {
        let yes = is_affirmative(label);
        match step {
            Step::ChooseFootprintType => self.footprint_type = Some(label.to_string()),
            Step::ChooseYear => self.reporting_year = label.parse().ok(),
            Step::AskPriorExperience => self.prior_experience = Some(yes),
            Step::AskMotivation => self.motivation = Some(label.to_string()),
            Step::AskCollaborators => {
                self.needs_collaborators = Some(yes);
                self.upload_folders = if yes { self.folder_plan() } else { Vec::new() };
            }
            Step::DataQualityReview => self.data_quality_action = Some(label.to_string()),
            Step::OptionalExtraFiles => self.wants_extra_files = Some(yes),
            Step::ValidateCleanData => self.clean_data_validated = yes,
            Step::OptionalBuBrandCheck => self.adds_bu_brand = Some(yes),
            Step::SelectEfPriority => self.ef_priority = Some(label.to_string()),
            Step::AskReadyToEngage => self.ready_to_engage = Some(yes),
            Step::GaiaHotspots => self.focus_area = Some(label.to_string()),
            Step::FileRecommendations
            | Step::FileUploadWithDescription
            | Step::TransitionToStandardization
            | Step::TransformationInProgress
            | Step::StandardisedDataAvailable
            | Step::ActivityCreationSummary
            | Step::OptionalCustomRules
            | Step::ExplainEfMatching
            | Step::FootprintReady
            | Step::Completed => {}
        }
        self.choices.insert(step, label.to_string());
    }

    /// Record the free-text answer to a follow-up question asked at `step`
    pub fn record_follow_up(&mut self, step: Step, text: &str) {
        match step {
            Step::AskPriorExperience => self.prior_experience_notes = Some(text.to_string()),
            Step::OptionalBuBrandCheck => self.bu_brand_notes = Some(text.to_string()),
            Step::OptionalCustomRules => self.custom_rules.push(text.to_string()),
            _ => {}
        }
    }

    pub fn toggle_file_category(&mut self, category: FileCategory) {
        if let Some(pos) = self.file_categories.iter().position(|c| *c == category) {
            self.file_categories.remove(pos);
        } else {
            self.file_categories.push(category);
            self.file_categories.sort();
        }
    }

    /// Labels of the selected categories, with the custom description for "Other"
    pub fn selected_file_labels(&self) -> Vec<String> {
        self.file_categories
            .iter()
            .map(|category| match (category, &self.other_file_description) {
                (FileCategory::Other, Some(desc)) if !desc.trim().is_empty() => {
                    format!("Other: {}", desc.trim())
                }
                (c, _) => c.label().to_string(),
            })
            .collect()
    }

    fn folder_plan(&self) -> Vec<String> {
        self.selected_file_labels()
    }
}

fn is_affirmative(label: &str) -> bool {
    let lower = label.trim().to_lowercase();
    lower == "yes" || lower.starts_with("yes,") || lower.starts_with("yes ")
}
