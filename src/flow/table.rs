//! Step table: the options, outcomes and input kind of every step
//!
//! The table is plain data so alternative onboarding scripts can be loaded
//! from JSON instead of being written as code.

use super::answers::FlowAnswers;
use super::step::{Affordance, CategoryOption, FileCategory, Step};
use super::FlowState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// What happens when an option is picked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Move to another step
    Advance { to: Step },
    /// Acknowledge without moving (report views, terminal branches)
    Stay,
    /// Ask for a free-text answer tied to the same step, then move on
    FollowUp {
        prompt: String,
        then: Step,
        /// Whether an upload also answers the follow-up
        #[serde(default)]
        accepts_files: bool,
    },
}

/// A labelled option and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub outcome: Outcome,
}

impl ChoiceOption {
    pub fn advance(label: impl Into<String>, to: Step) -> Self {
        Self {
            label: label.into(),
            outcome: Outcome::Advance { to },
        }
    }

    pub fn stay(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            outcome: Outcome::Stay,
        }
    }

    pub fn follow_up(label: impl Into<String>, prompt: impl Into<String>, then: Step) -> Self {
        Self {
            label: label.into(),
            outcome: Outcome::FollowUp {
                prompt: prompt.into(),
                then,
                accepts_files: false,
            },
        }
    }

    #[must_use]
    pub fn accepting_files(mut self) -> Self {
        if let Outcome::FollowUp { accepts_files, .. } = &mut self.outcome {
            *accepts_files = true;
        }
        self
    }
}

/// How the step collects its answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputKind {
    Buttons,
    /// Year dropdown; any year in `from..=to` advances to `then`
    YearDropdown { from: u16, to: u16, then: Step },
    /// Category card; the options hold the continue button
    FileCategories,
    Dropzone,
    FreeText { prompt: String },
}

/// Table entry for a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub input: InputKind,
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    /// Successor when files are uploaded at this step
    #[serde(default)]
    pub on_files: Option<Step>,
}

impl StepSpec {
    fn buttons(options: Vec<ChoiceOption>) -> Self {
        Self {
            input: InputKind::Buttons,
            options,
            on_files: None,
        }
    }
}

/// An option resolved against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChoice {
    /// Canonical label as written in the table
    pub label: String,
    pub outcome: Outcome,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("flow table has no entry for step {0}")]
    MissingStep(Step),
    #[error("step {from} refers to {to}, which has no entry")]
    DanglingTarget { from: Step, to: Step },
    #[error("step {0} has an empty year range")]
    EmptyYearRange(Step),
}

/// The transition table driving a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowTable {
    steps: BTreeMap<Step, StepSpec>,
}

impl FlowTable {
    pub fn new(steps: BTreeMap<Step, StepSpec>) -> Result<Self, TableError> {
        let table = Self { steps };
        table.validate()?;
        Ok(table)
    }

    pub fn spec(&self, step: Step) -> Option<&StepSpec> {
        self.steps.get(&step)
    }

    pub fn steps(&self) -> impl Iterator<Item = (Step, &StepSpec)> {
        self.steps.iter().map(|(step, spec)| (*step, spec))
    }

    /// Check that the initial step exists and every outcome lands on a known step
    pub fn validate(&self) -> Result<(), TableError> {
        if !self.steps.contains_key(&Step::initial()) {
            return Err(TableError::MissingStep(Step::initial()));
        }
        for (from, spec) in self.steps() {
            let mut targets = Vec::new();
            match &spec.input {
                InputKind::YearDropdown { from: lo, to: hi, then } => {
                    if lo > hi {
                        return Err(TableError::EmptyYearRange(from));
                    }
                    targets.push(*then);
                }
                InputKind::Buttons
                | InputKind::FileCategories
                | InputKind::Dropzone
                | InputKind::FreeText { .. } => {}
            }
            for option in &spec.options {
                match &option.outcome {
                    Outcome::Advance { to } => targets.push(*to),
                    Outcome::FollowUp { then, .. } => targets.push(*then),
                    Outcome::Stay => {}
                }
            }
            targets.extend(spec.on_files);
            if let Some(to) = targets.into_iter().find(|t| !self.steps.contains_key(t)) {
                return Err(TableError::DanglingTarget { from, to });
            }
        }
        Ok(())
    }

    /// Match a submitted choice against the options of `step`
    ///
    /// Returns `None` when the choice is not one of the step's options; the
    /// caller then treats it as free text.
    pub fn resolve_choice(&self, step: Step, choice: &str) -> Option<ResolvedChoice> {
        let spec = self.steps.get(&step)?;
        if let InputKind::YearDropdown { from, to, then } = &spec.input {
            let year: u16 = choice.trim().parse().ok()?;
            return (*from..=*to).contains(&year).then(|| ResolvedChoice {
                label: year.to_string(),
                outcome: Outcome::Advance { to: *then },
            });
        }
        let wanted = normalize_label(choice);
        spec.options
            .iter()
            .find(|option| normalize_label(&option.label) == wanted)
            .map(|option| ResolvedChoice {
                label: option.label.clone(),
                outcome: option.outcome.clone(),
            })
    }

    /// Affordance for a state with no reply in flight and no failure pending
    pub fn affordance(&self, state: &FlowState) -> Affordance {
        if let Some(follow_up) = &state.follow_up {
            return Affordance::FreeText {
                prompt: follow_up.prompt.clone(),
                allow_files: follow_up.accepts_files,
            };
        }
        let Some(spec) = self.steps.get(&state.step) else {
            return Affordance::FreeText {
                prompt: String::new(),
                allow_files: false,
            };
        };
        match &spec.input {
            InputKind::Buttons => Affordance::Buttons {
                options: spec.options.iter().map(|o| o.label.clone()).collect(),
            },
            InputKind::YearDropdown { from, to, .. } => Affordance::Dropdown {
                options: (*from..=*to).map(|y| y.to_string()).collect(),
            },
            InputKind::FileCategories => category_card(spec, &state.answers),
            InputKind::Dropzone => Affordance::Dropzone {
                folders: state.answers.upload_folders.clone(),
            },
            InputKind::FreeText { prompt } => Affordance::FreeText {
                prompt: prompt.clone(),
                allow_files: spec.on_files.is_some(),
            },
        }
    }

    /// The reference onboarding table
    #[allow(clippy::too_many_lines)] // One entry per step
    pub fn standard() -> Self {
        use ChoiceOption as O;

        let yes_no = |yes: &str, no: &str, to: Step| vec![O::advance(yes, to), O::advance(no, to)];

        let mut steps = BTreeMap::new();
        steps.insert(
            Step::ChooseFootprintType,
            StepSpec::buttons(
                ["Scope 3.1", "Product Carbon Footprint", "Supplier Engagement"]
                    .into_iter()
                    .map(|label| O::advance(label, Step::ChooseYear))
                    .collect(),
            ),
        );
        steps.insert(
            Step::ChooseYear,
            StepSpec {
                input: InputKind::YearDropdown {
                    from: 2020,
                    to: 2035,
                    then: Step::AskPriorExperience,
                },
                options: vec![],
                on_files: None,
            },
        );
        steps.insert(
            Step::AskPriorExperience,
            StepSpec::buttons(vec![
                O::follow_up(
                    "Yes",
                    "Tell us briefly what you did before and what you would like to repeat or replicate.",
                    Step::FileRecommendations,
                ),
                O::advance("No", Step::AskMotivation),
            ]),
        );
        steps.insert(
            Step::AskMotivation,
            StepSpec::buttons(
                [
                    "CSRD Compliance",
                    "CDP Reporting",
                    "SBTi Targets",
                    "Internal Goals",
                    "Other Reasons",
                ]
                .into_iter()
                .map(|label| O::advance(label, Step::FileRecommendations))
                .collect(),
            ),
        );
        steps.insert(
            Step::FileRecommendations,
            StepSpec {
                input: InputKind::FileCategories,
                options: vec![O::advance("Continue", Step::AskCollaborators)],
                on_files: Some(Step::AskCollaborators),
            },
        );
        steps.insert(
            Step::AskCollaborators,
            StepSpec::buttons(yes_no(
                "Yes, create folders",
                "No, I'll upload everything",
                Step::FileUploadWithDescription,
            )),
        );
        steps.insert(
            Step::FileUploadWithDescription,
            StepSpec {
                input: InputKind::Dropzone,
                options: vec![],
                on_files: Some(Step::DataQualityReview),
            },
        );
        steps.insert(
            Step::DataQualityReview,
            StepSpec::buttons(yes_no(
                "Review issues",
                "Fix automatically",
                Step::OptionalExtraFiles,
            )),
        );
        steps.insert(
            Step::OptionalExtraFiles,
            StepSpec::buttons(yes_no(
                "Yes, add more files",
                "No, continue",
                Step::ValidateCleanData,
            )),
        );
        steps.insert(
            Step::ValidateCleanData,
            StepSpec::buttons(vec![
                O::advance("Yes, validate", Step::TransitionToStandardization),
                O::advance("No, correct more data", Step::ValidateCleanData),
            ]),
        );
        steps.insert(
            Step::TransitionToStandardization,
            StepSpec::buttons(vec![O::advance("Proceed", Step::OptionalBuBrandCheck)]),
        );
        steps.insert(
            Step::OptionalBuBrandCheck,
            StepSpec::buttons(vec![
                O::follow_up(
                    "Yes, add BU/Brand",
                    "Download the template, fill it in and upload it, or describe your Business Units and Brands.",
                    Step::TransformationInProgress,
                )
                .accepting_files(),
                O::advance("No, continue without", Step::TransformationInProgress),
            ]),
        );
        steps.insert(
            Step::TransformationInProgress,
            StepSpec::buttons(vec![O::advance("Proceed", Step::StandardisedDataAvailable)]),
        );
        steps.insert(
            Step::StandardisedDataAvailable,
            StepSpec::buttons(vec![
                O::stay("View standardised dataset"),
                O::stay("View mapping clean → standard"),
                O::stay("Show file list"),
                O::advance("Proceed to activities", Step::ActivityCreationSummary),
            ]),
        );
        steps.insert(
            Step::ActivityCreationSummary,
            StepSpec::buttons(vec![
                O::stay("View Details"),
                O::advance("Proceed to EF Matching", Step::OptionalCustomRules),
            ]),
        );
        steps.insert(
            Step::OptionalCustomRules,
            StepSpec::buttons(vec![
                O::follow_up(
                    "Yes",
                    "Please describe the rule briefly.",
                    Step::SelectEfPriority,
                ),
                O::advance("No", Step::SelectEfPriority),
            ]),
        );
        steps.insert(
            Step::SelectEfPriority,
            StepSpec::buttons(
                [
                    "EXIOBASE",
                    "GHG Protocol",
                    "ADEME Base Carbone",
                    "Ecoinvent",
                    "Use CO2 AI choices",
                ]
                .into_iter()
                .map(|label| O::advance(label, Step::ExplainEfMatching))
                .collect(),
            ),
        );
        steps.insert(
            Step::ExplainEfMatching,
            StepSpec::buttons(vec![O::advance("Proceed to EF Matching", Step::FootprintReady)]),
        );
        steps.insert(
            Step::FootprintReady,
            StepSpec::buttons(vec![
                O::advance("Engage suppliers", Step::AskReadyToEngage),
                O::stay("Export report"),
                O::stay("Deep dive analytics"),
            ]),
        );
        steps.insert(
            Step::AskReadyToEngage,
            StepSpec::buttons(vec![
                O::advance("Yes, let's start", Step::GaiaHotspots),
                O::stay("Not now"),
            ]),
        );
        steps.insert(
            Step::GaiaHotspots,
            StepSpec::buttons(
                [
                    "Supplier hotspots",
                    "Top emissive purchased products",
                    "Classify suppliers by maturity",
                    "Prioritise suppliers",
                ]
                .into_iter()
                .map(|label| O::advance(label, Step::Completed))
                .collect(),
            ),
        );
        steps.insert(
            Step::Completed,
            StepSpec {
                input: InputKind::FreeText {
                    prompt: "Ask a question about your footprint".to_string(),
                },
                options: vec![],
                on_files: None,
            },
        );

        Self { steps }
    }
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn category_card(spec: &StepSpec, answers: &FlowAnswers) -> Affordance {
    let categories = FileCategory::ALL
        .into_iter()
        .map(|category| CategoryOption {
            category,
            label: category.label(),
            description: category.description(),
            selected: answers.file_categories.contains(&category),
        })
        .collect();
    Affordance::FileCategories {
        categories,
        other_description: answers.other_file_description.clone(),
        continue_label: spec
            .options
            .first()
            .map_or_else(|| "Continue".to_string(), |o| o.label.clone()),
    }
}

/// Case-fold and drop typographic differences so button labels echoed back
/// by clients still match
fn normalize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}
