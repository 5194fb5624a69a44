//! Permit automation: intake → review → compliance → decision.
//!
//! Intake decides by keyword heuristic whether the application is complete.
//! An incomplete application stops the pipeline before review.

use serde::{Deserialize, Serialize};

use crate::context::{ContextData, ContextStore, Severity, STAGE_STOPPED};
use crate::core_state::CoreState;
use crate::pipeline::completion::GenerationOptions;
use crate::pipeline::parse::keywords::{contains_any, CONCERN_INDICATORS};
use crate::pipeline::parse::{CompletenessClassifier, KeywordCompletenessClassifier};
use crate::pipeline::prompt::PromptBuilder;
use crate::pipeline::{
    PipelineError, PipelineOutcome, RaisedFlag, Stage, StageEnv, StageOutput, StageRunner,
    ValidationError,
};

/// Item id prefix for permit applications.
pub const ID_PREFIX: &str = "PA";

/// Status recorded when intake finds the application incomplete.
pub const STOPPED_STATUS: &str = "INCOMPLETE - Additional information required";

pub const PERMIT_TYPES: &[&str] = &[
    "Environmental Permit - Air Quality",
    "Environmental Permit - Water Quality",
    "Environmental Permit - Land Use",
    "Storage Tank Permit",
    "Residual Waste Permit",
    "Pesticide Usage Permit",
    "Agricultural Permit - Hemp Cultivation",
    "Agricultural Permit - Hemp Processing",
];

/// Required fields and their prompt labels.
pub const REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("applicant_name", "Applicant"),
    ("permit_type", "Permit Type"),
    ("project_description", "Project Description"),
    ("location", "Location"),
    ("contact_email", "Contact Email"),
    ("project_name", "Project Name"),
];

const OPTIONAL_FIELDS: &[(&str, &str)] = &[
    ("estimated_cost", "Estimated Cost (USD)"),
    ("start_date", "Proposed Start Date"),
    ("duration_months", "Duration (months)"),
    ("environmental_impact", "Environmental Impact"),
];

pub const INTAKE_ROLE: &str = "Permit Intake Specialist";
pub const REVIEW_ROLE: &str = "Technical Review Officer";
pub const COMPLIANCE_ROLE: &str = "Compliance Verification Agent";
pub const DECISION_ROLE: &str = "Permit Decision Authority";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermitApplication {
    #[serde(default)]
    pub applicant_name: String,
    #[serde(default)]
    pub permit_type: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environmental_impact: Option<String>,
}

impl PermitApplication {
    /// Reject applications with blank required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let values = [
            ("applicant_name", &self.applicant_name),
            ("permit_type", &self.permit_type),
            ("project_description", &self.project_description),
            ("location", &self.location),
            ("contact_email", &self.contact_email),
            ("project_name", &self.project_name),
        ];
        let missing: Vec<String> = values
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        if let Some(cost) = self.estimated_cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(ValidationError::InvalidField {
                    field: "estimated_cost".into(),
                    reason: "must be a non-negative amount".into(),
                });
            }
        }
        Ok(())
    }

    /// Number of required fields with a non-blank value.
    pub fn filled_required_fields(&self) -> usize {
        [
            &self.applicant_name,
            &self.permit_type,
            &self.project_description,
            &self.location,
            &self.contact_email,
            &self.project_name,
        ]
        .iter()
        .filter(|v| !v.trim().is_empty())
        .count()
    }

    pub fn to_context(&self) -> ContextData {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => ContextData::new(),
        }
    }

    /// `PA-<type initials>-<short uuid>`, e.g. `PA-EPAQ-3f2a9c1d`.
    pub fn new_item_id(&self) -> String {
        let initials: String = self
            .permit_type
            .split(|c: char| !c.is_alphanumeric())
            .filter_map(|word| word.chars().next())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let slug = if initials.is_empty() {
            "UNKNOWN".to_string()
        } else {
            initials
        };
        super::short_id(ID_PREFIX, &slug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "COMPLIANT")]
    Compliant,
    #[serde(rename = "CONDITIONAL")]
    Conditional,
    #[serde(rename = "NON-COMPLIANT")]
    NonCompliant,
}

impl ComplianceStatus {
    /// "compliant" without any "non" wins, then "conditional", else non-compliant.
    pub fn classify(response: &str) -> Self {
        let lower = response.to_lowercase();
        if lower.contains("compliant") && !lower.contains("non") {
            Self::Compliant
        } else if lower.contains("conditional") {
            Self::Conditional
        } else {
            Self::NonCompliant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "COMPLIANT",
            Self::Conditional => "CONDITIONAL",
            Self::NonCompliant => "NON-COMPLIANT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermitDecision {
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "APPROVED WITH CONDITIONS")]
    ApprovedWithConditions,
    #[serde(rename = "DENIED")]
    Denied,
    #[serde(rename = "MORE INFORMATION NEEDED")]
    MoreInformationNeeded,
}

impl PermitDecision {
    pub fn classify(response: &str) -> Self {
        let lower = response.to_lowercase();
        if lower.contains("approved with conditions") {
            Self::ApprovedWithConditions
        } else if lower.contains("approved") {
            Self::Approved
        } else if lower.contains("denied") {
            Self::Denied
        } else {
            Self::MoreInformationNeeded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::ApprovedWithConditions => "APPROVED WITH CONDITIONS",
            Self::Denied => "DENIED",
            Self::MoreInformationNeeded => "MORE INFORMATION NEEDED",
        }
    }
}

pub struct IntakeStage {
    classifier: Box<dyn CompletenessClassifier>,
}

impl IntakeStage {
    pub fn new(classifier: Box<dyn CompletenessClassifier>) -> Self {
        Self { classifier }
    }
}

impl Default for IntakeStage {
    fn default() -> Self {
        Self::new(Box::new(KeywordCompletenessClassifier::default()))
    }
}

impl Stage for IntakeStage {
    fn name(&self) -> &str {
        "intake"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let prompt = PromptBuilder::role(INTAKE_ROLE)
            .line("Review this permit application for completeness.")
            .fields("Application", &env.context.data, REQUIRED_FIELDS)
            .steps(
                "Required information checklist",
                &[
                    "Applicant name and contact details",
                    "Permit type specified",
                    "Project location with address or coordinates",
                    "Detailed project description",
                    "Contact information",
                    "Project name",
                ],
            )
            .line(
                "If every required field is present with adequate detail, mark the \
                 application COMPLETE. If critical information is missing or vague, \
                 mark it INCOMPLETE. State your verdict clearly: COMPLETE or INCOMPLETE.",
            )
            .build();

        let response = env.complete(&prompt, &GenerationOptions::extraction())?;
        let verdict = self.classifier.classify(&response);

        let output = StageOutput::new(verdict.as_str(), response.clone())
            .with("intake_complete", verdict.is_complete())
            .with("intake_notes", response);

        Ok(if verdict.is_complete() {
            output
        } else {
            output.stop(STOPPED_STATUS)
        })
    }
}

pub struct ReviewStage;

impl Stage for ReviewStage {
    fn name(&self) -> &str {
        "review"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let mut fields = vec![
            ("permit_type", "Permit Type"),
            ("project_name", "Project"),
            ("project_description", "Description"),
            ("location", "Location"),
        ];
        fields.extend_from_slice(OPTIONAL_FIELDS);

        let prompt = PromptBuilder::role(REVIEW_ROLE)
            .line("Conduct a technical review of this permit application.")
            .fields("Application", &env.context.data, &fields)
            .steps(
                "Analyze",
                &[
                    "Technical feasibility",
                    "Environmental impact considerations",
                    "Safety measures",
                    "Potential risks or concerns",
                    "Alignment with state regulations",
                ],
            )
            .line("Provide a detailed technical assessment.")
            .build();

        let response = env.complete(&prompt, &GenerationOptions::default())?;
        let has_concerns = contains_any(&response.to_lowercase(), CONCERN_INDICATORS);

        let decision = if has_concerns {
            "CONCERNS NOTED"
        } else {
            "NO CONCERNS"
        };
        let mut output = StageOutput::new(decision, response.clone())
            .with("review_complete", true)
            .with("review_findings", response)
            .with("review_has_concerns", has_concerns);
        if has_concerns {
            output = output.flag(RaisedFlag::new(
                "technical",
                "Technical concerns identified",
                Severity::Medium,
            ));
        }
        Ok(output)
    }
}

pub struct ComplianceStage;

impl Stage for ComplianceStage {
    fn name(&self) -> &str {
        "compliance"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let permit_type = crate::pipeline::prompt::field_or_na(&env.context.data, "permit_type");
        let prompt = PromptBuilder::role(COMPLIANCE_ROLE)
            .line(&format!("Verify regulatory compliance for this {permit_type}."))
            .fields(
                "Application",
                &env.context.data,
                &[("project_description", "Project"), ("location", "Location")],
            )
            .steps(
                "Check compliance with",
                &[
                    "State environmental protection regulations",
                    "Federal EPA requirements (if applicable)",
                    "Local zoning and land use requirements",
                    "Industry-specific standards",
                    "Environmental protection laws",
                ],
            )
            .line(
                "Identify any compliance gaps or violations. \
                 Provide compliance status: COMPLIANT, CONDITIONAL, or NON-COMPLIANT.",
            )
            .build();

        let response = env.complete(&prompt, &GenerationOptions::default())?;
        let status = ComplianceStatus::classify(&response);

        let mut output = StageOutput::new(status.as_str(), response)
            .with("compliance_complete", true)
            .with("compliance_status", status.as_str());
        if status == ComplianceStatus::NonCompliant {
            output = output.flag(RaisedFlag::new(
                "compliance",
                "Compliance violations identified",
                Severity::High,
            ));
        }
        Ok(output)
    }
}

pub struct DecisionStage;

impl Stage for DecisionStage {
    fn name(&self) -> &str {
        "decision"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let prompt = PromptBuilder::role(DECISION_ROLE)
            .line("Make the final permit decision based on all reviews.")
            .fields(
                "Case file",
                &env.context.data,
                &[
                    ("permit_type", "Application Type"),
                    ("intake_complete", "Intake Complete"),
                    ("review_findings", "Review Findings"),
                    ("compliance_status", "Compliance Status"),
                ],
            )
            .line(&format!("Flags: {} identified", env.history.flags.len()))
            .steps(
                "Provide ONE of the following decisions",
                &[
                    "APPROVED: permit is approved",
                    "APPROVED WITH CONDITIONS: approved with specific conditions",
                    "DENIED: permit is denied",
                    "MORE INFORMATION NEEDED: requires additional information",
                ],
            )
            .line("Provide a clear rationale for your decision.")
            .build();

        let response = env.complete(&prompt, &GenerationOptions::default())?;
        let decision = PermitDecision::classify(&response);
        Ok(StageOutput::new(decision.as_str(), response))
    }
}

/// The four-stage permit pipeline.
pub fn permit_runner(model: &str) -> StageRunner {
    StageRunner::new("permit", model)
        .with_stage(IntakeStage::default())
        .with_stage(ReviewStage)
        .with_stage(ComplianceStage)
        .with_stage(DecisionStage)
}

/// Store and run an application without field validation.
pub fn process(
    core: &CoreState,
    application: &PermitApplication,
) -> Result<PipelineOutcome, PipelineError> {
    let item_id = application.new_item_id();
    core.store().create(&item_id, application.to_context())?;
    tracing::info!(
        item_id = %item_id,
        permit_type = %application.permit_type,
        filled = application.filled_required_fields(),
        "Permit application received"
    );
    permit_runner(&core.config().model).run(core.store(), core.completion(), &item_id)
}

/// Validate, then process. Invalid applications create no state.
pub fn submit(
    core: &CoreState,
    application: &PermitApplication,
) -> Result<PipelineOutcome, PipelineError> {
    application.validate()?;
    process(core, application)
}

/// One row of the permit status page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermitSummary {
    pub item_id: String,
    pub applicant_name: String,
    pub permit_type: String,
    pub stage: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PermitOverview {
    pub total: usize,
    pub approved: usize,
    pub denied: usize,
    pub other: usize,
    pub applications: Vec<PermitSummary>,
}

/// All stored permit applications with decision counts.
pub fn overview(store: &ContextStore) -> Result<PermitOverview, PipelineError> {
    let mut overview = PermitOverview::default();

    for item_id in store.item_ids()? {
        if !item_id.starts_with(&format!("{ID_PREFIX}-")) {
            continue;
        }
        let (Some(context), Some(state)) = (store.get_context(&item_id)?, store.get_state(&item_id)?)
        else {
            continue;
        };

        let text = |key: &str| {
            context
                .data
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let final_decision = store
            .get_history(&item_id)?
            .decision_for("decision")
            .map(|d| d.decision.clone());
        match final_decision.as_deref() {
            Some(d) if d.starts_with("APPROVED") => overview.approved += 1,
            Some("DENIED") => overview.denied += 1,
            _ => overview.other += 1,
        }

        overview.applications.push(PermitSummary {
            applicant_name: text("applicant_name"),
            permit_type: text("permit_type"),
            stage: state.stage,
            status: state.status,
            item_id,
        });
    }

    overview.total = overview.applications.len();
    Ok(overview)
}

/// True when the stored item stopped at intake.
pub fn is_stopped(store: &ContextStore, item_id: &str) -> Result<bool, PipelineError> {
    Ok(store
        .get_state(item_id)?
        .is_some_and(|state| state.stage == STAGE_STOPPED))
}
