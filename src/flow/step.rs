//! Step identifiers and the input affordances shown for them

use serde::{Deserialize, Serialize};
use std::fmt;

/// One point in the guided onboarding flow
///
/// Steps carry no ordinal; their order comes entirely from the
/// [`FlowTable`](super::FlowTable) the session is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    // Phase 1: data ingestion -> data cleaning
    ChooseFootprintType,
    ChooseYear,
    AskPriorExperience,
    AskMotivation,
    FileRecommendations,
    AskCollaborators,
    FileUploadWithDescription,
    DataQualityReview,
    OptionalExtraFiles,
    ValidateCleanData,
    TransitionToStandardization,

    // Phase 2: clean data -> standardised data -> activities
    OptionalBuBrandCheck,
    TransformationInProgress,
    StandardisedDataAvailable,
    ActivityCreationSummary,
    OptionalCustomRules,

    // Phase 3: activities -> footprint
    SelectEfPriority,
    ExplainEfMatching,
    FootprintReady,

    // Phase 4: footprint -> supplier engagement
    AskReadyToEngage,
    GaiaHotspots,
    Completed,
}

impl Step {
    #[allow(dead_code)] // Enumerated by table and property tests
    pub const ALL: [Step; 22] = [
        Step::ChooseFootprintType,
        Step::ChooseYear,
        Step::AskPriorExperience,
        Step::AskMotivation,
        Step::FileRecommendations,
        Step::AskCollaborators,
        Step::FileUploadWithDescription,
        Step::DataQualityReview,
        Step::OptionalExtraFiles,
        Step::ValidateCleanData,
        Step::TransitionToStandardization,
        Step::OptionalBuBrandCheck,
        Step::TransformationInProgress,
        Step::StandardisedDataAvailable,
        Step::ActivityCreationSummary,
        Step::OptionalCustomRules,
        Step::SelectEfPriority,
        Step::ExplainEfMatching,
        Step::FootprintReady,
        Step::AskReadyToEngage,
        Step::GaiaHotspots,
        Step::Completed,
    ];

    /// The step every new or restarted session begins at
    pub fn initial() -> Self {
        Step::ChooseFootprintType
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::ChooseFootprintType => "choose-footprint-type",
            Step::ChooseYear => "choose-year",
            Step::AskPriorExperience => "ask-prior-experience",
            Step::AskMotivation => "ask-motivation",
            Step::FileRecommendations => "file-recommendations",
            Step::AskCollaborators => "ask-collaborators",
            Step::FileUploadWithDescription => "file-upload-with-description",
            Step::DataQualityReview => "data-quality-review",
            Step::OptionalExtraFiles => "optional-extra-files",
            Step::ValidateCleanData => "validate-clean-data",
            Step::TransitionToStandardization => "transition-to-standardization",
            Step::OptionalBuBrandCheck => "optional-bu-brand-check",
            Step::TransformationInProgress => "transformation-in-progress",
            Step::StandardisedDataAvailable => "standardised-data-available",
            Step::ActivityCreationSummary => "activity-creation-summary",
            Step::OptionalCustomRules => "optional-custom-rules",
            Step::SelectEfPriority => "select-ef-priority",
            Step::ExplainEfMatching => "explain-ef-matching",
            Step::FootprintReady => "footprint-ready",
            Step::AskReadyToEngage => "ask-ready-to-engage",
            Step::GaiaHotspots => "gaia-hotspots",
            Step::Completed => "completed",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document categories offered on the file recommendation card
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileCategory {
    Procurement,
    Suppliers,
    Products,
    BusinessUnits,
    Sites,
    Spend,
    Other,
}

impl FileCategory {
    pub const ALL: [FileCategory; 7] = [
        FileCategory::Procurement,
        FileCategory::Suppliers,
        FileCategory::Products,
        FileCategory::BusinessUnits,
        FileCategory::Sites,
        FileCategory::Spend,
        FileCategory::Other,
    ];

    /// Categories pre-selected when the card is first shown
    pub fn defaults() -> Vec<FileCategory> {
        vec![FileCategory::Procurement, FileCategory::Suppliers]
    }

    pub fn label(self) -> &'static str {
        match self {
            FileCategory::Procurement => "Procurement Data",
            FileCategory::Suppliers => "Suppliers List",
            FileCategory::Products => "Products Catalog",
            FileCategory::BusinessUnits => "Business Units",
            FileCategory::Sites => "Sites / Locations",
            FileCategory::Spend => "Spend Data",
            FileCategory::Other => "Other",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FileCategory::Procurement => "Purchase orders, invoices, transaction records",
            FileCategory::Suppliers => "Supplier names, locations, contact info, spend data",
            FileCategory::Products => "Product names, categories, quantities, materials",
            FileCategory::BusinessUnits => "BU hierarchy, departments, cost centers",
            FileCategory::Sites => "Facility addresses, geographic data",
            FileCategory::Spend => "Financial records, budgets, cost allocations",
            FileCategory::Other => "Add custom document type",
        }
    }
}

/// A selectable entry on the file category card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOption {
    pub category: FileCategory,
    pub label: &'static str,
    pub description: &'static str,
    pub selected: bool,
}

/// Input control the presentation layer renders beneath the latest reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Affordance {
    /// One button per option; clicking submits the label as a choice
    Buttons { options: Vec<String> },
    /// Single-select dropdown; the selected value is submitted as a choice
    Dropdown { options: Vec<String> },
    /// Multi-select category card followed by a continue button
    FileCategories {
        categories: Vec<CategoryOption>,
        other_description: Option<String>,
        continue_label: String,
    },
    /// File dropzone, with the collaborator upload folders when they were requested
    Dropzone { folders: Vec<String> },
    /// Free text box
    FreeText { prompt: String, allow_files: bool },
    /// A reply is streaming; input is disabled
    Waiting,
    /// The last reply failed; offer a retry control
    Retry { message: String },
}
