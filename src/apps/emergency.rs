//! Emergency response: scout → planner → communicator.
//!
//! Every stage degrades when the completion service is unreachable: the
//! scout to a scene assessment built from the observed elements, the planner
//! to [`BASIC_RESPONSE_PLAN`], the communicator to a templated report. Each
//! fallback raises its own flag, so a field report is still produced.

use serde::{Deserialize, Serialize};

use crate::context::{ContextData, Severity};
use crate::core_state::CoreState;
use crate::pipeline::completion::{GenerationOptions, BASIC_RESPONSE_PLAN};
use crate::pipeline::parse::LabeledSections;
use crate::pipeline::prompt::{field_or_na, PromptBuilder, NOT_AVAILABLE};
use crate::pipeline::{
    PipelineError, RaisedFlag, Stage, StageEnv, StageOutput, StageRunner, ValidationError,
};

pub const ID_PREFIX: &str = "ER";

const REPORT_LABELS: &[&str] = &["RESPONSE_PLAN", "SAFETY_NOTES", "RECOMMENDED_ACTIONS"];

const BASIC_ANALYSIS_DECISION: &str = "BASIC ASSESSMENT";
const BASIC_REPORT_DECISION: &str = "BASIC REPORT";

const RESPONSE_PRIORITIES: &str = "1. Secure the area and establish a safe perimeter\n\
2. Assess immediate threats to personnel and victims\n\
3. Deploy rescue teams with appropriate equipment\n\
4. Monitor the situation and adjust the response as needed";

/// Something seen at the scene, grouped by category (people, vehicles, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedElement {
    pub category: String,
    pub label: String,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisasterReport {
    pub location: String,
    pub description: String,
    #[serde(default)]
    pub observed: Vec<ObservedElement>,
}

impl DisasterReport {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<String> = [("location", &self.location), ("description", &self.description)]
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }

    fn to_context(&self) -> ContextData {
        let mut data = ContextData::new();
        data.insert("location".into(), self.location.clone().into());
        data.insert("description".into(), self.description.clone().into());
        data.insert("observed".into(), format_observed(&self.observed).into());
        data
    }
}

/// Observed elements as `Category: label (0.90), ...` lines, categories in
/// first-seen order.
pub fn format_observed(elements: &[ObservedElement]) -> String {
    let mut categories: Vec<&str> = Vec::new();
    for element in elements {
        if !categories.contains(&element.category.as_str()) {
            categories.push(&element.category);
        }
    }

    categories
        .iter()
        .map(|category| {
            let items: Vec<String> = elements
                .iter()
                .filter(|e| e.category == *category)
                .map(|e| format!("{} ({:.2})", e.label, e.confidence))
                .collect();
            format!("{}: {}", title_case(category), items.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Scene assessment used when the scout cannot reach the model.
pub fn basic_scene_assessment(observed: &str) -> String {
    let elements = if observed.trim().is_empty() || observed == NOT_AVAILABLE {
        "No elements reported.".to_string()
    } else {
        observed.trim().to_string()
    };
    format!(
        "Emergency Response Scene Assessment:\n\n{elements}\n\n\
         Emergency Response Priorities:\n\
         1. Secure the area and establish a safe perimeter for rescue operations\n\
         2. Assess immediate threats to rescue personnel and victims\n\
         3. Identify and clear access routes for emergency teams\n\
         4. Deploy appropriate rescue resources based on scene assessment"
    )
}

/// Labelled report used when the communicator cannot reach the model.
pub fn basic_report_response(plan: &str) -> String {
    let plan = non_blank_or(plan, "No response plan available");
    format!(
        "RESPONSE_PLAN: {plan}\n\
         SAFETY_NOTES: Generated without the language model. Treat every \
         structure and waterway as hazardous until inspected.\n\
         RECOMMENDED_ACTIONS: {RESPONSE_PRIORITIES}"
    )
}

fn fallback_flag(kind: &str, description: &str) -> RaisedFlag {
    RaisedFlag::new(kind, description, Severity::Medium)
}

pub struct ScoutStage;

impl Stage for ScoutStage {
    fn name(&self) -> &str {
        "scout"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let data = &env.context.data;
        let prompt = PromptBuilder::role("emergency response analyst")
            .line("Assess this disaster scene, focusing on rescue operations and emergency response.")
            .fields(
                "Scene",
                data,
                &[("location", "Location"), ("description", "Description")],
            )
            .section("Detected Elements", &field_or_na(data, "observed"))
            .steps(
                "Cover",
                &[
                    "Critical scene elements: impact on rescue, access points, resource deployment",
                    "Immediate hazards: risks to personnel, threats to victims, environmental dangers",
                    "Priority actions: responder safety, victim rescue, resource allocation",
                ],
            )
            .build();

        match env.complete_raw(&prompt, &GenerationOptions::default()) {
            Ok(assessment) => Ok(StageOutput::new("SCENE ASSESSED", assessment.clone())
                .with("scene_assessment", assessment)
                .with("analysis_fallback", false)),
            Err(e) if e.is_unavailable() => {
                tracing::warn!(
                    item_id = %env.item_id,
                    error = %e,
                    "Scout unavailable, using basic scene assessment"
                );
                let assessment = basic_scene_assessment(&field_or_na(data, "observed"));
                Ok(StageOutput::new(BASIC_ANALYSIS_DECISION, assessment.clone())
                    .with("scene_assessment", assessment)
                    .with("analysis_fallback", true)
                    .flag(fallback_flag(
                        "scene_analysis",
                        "Scene assessment built from observed elements only",
                    )))
            }
            Err(e) => Err(PipelineError::from_completion(self.name(), e)),
        }
    }
}

pub struct PlannerStage;

impl Stage for PlannerStage {
    fn name(&self) -> &str {
        "planner"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let data = &env.context.data;
        let prompt = PromptBuilder::role("emergency response coordinator")
            .line("Create a specific action plan based on this disaster scene analysis.")
            .section("SCENE ANALYSIS", &field_or_na(data, "scene_assessment"))
            .section("Detected Elements", &field_or_na(data, "observed"))
            .steps(
                "The plan must include",
                &[
                    "Immediate actions for the next 6-8 hours",
                    "Required resources with exact equipment and personnel counts",
                    "Team assignments: rescue, medical, security, resource, communication",
                    "Priority actions in order, with locations and timeframes",
                ],
            )
            .line("Focus on concrete actions rather than general guidelines.")
            .build();

        match env.complete_raw(&prompt, &GenerationOptions::default()) {
            Ok(plan) => Ok(StageOutput::new("PLAN CREATED", plan.clone())
                .with("response_plan", plan)
                .with("plan_fallback", false)),
            Err(e) if e.is_unavailable() => {
                tracing::warn!(
                    item_id = %env.item_id,
                    error = %e,
                    "Planner unavailable, using basic response plan"
                );
                Ok(StageOutput::new("BASIC PLAN", BASIC_RESPONSE_PLAN)
                    .with("response_plan", BASIC_RESPONSE_PLAN)
                    .with("plan_fallback", true)
                    .flag(fallback_flag(
                        "planning",
                        "Response plan generated from the basic template",
                    )))
            }
            Err(e) => Err(PipelineError::from_completion(self.name(), e)),
        }
    }
}

pub struct CommunicatorStage;

impl Stage for CommunicatorStage {
    fn name(&self) -> &str {
        "communicator"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let data = &env.context.data;
        let prompt = PromptBuilder::role("disaster response communicator")
            .line("Create a clear and concise field report for responders.")
            .section("Terrain Analysis", &field_or_na(data, "scene_assessment"))
            .section("Response Plan", &field_or_na(data, "response_plan"))
            .response_format(&[
                ("RESPONSE_PLAN", "the plan rewritten for field teams"),
                ("SAFETY_NOTES", "hazards, safety protocols and risk assessments"),
                ("RECOMMENDED_ACTIONS", "numbered list of specific actions"),
            ])
            .build();

        let options = GenerationOptions::default().with_max_tokens(2000);
        match env.complete_raw(&prompt, &options) {
            Ok(report) => Ok(StageOutput::new("REPORT ISSUED", report)),
            Err(e) if e.is_unavailable() => {
                tracing::warn!(
                    item_id = %env.item_id,
                    error = %e,
                    "Communicator unavailable, using basic field report"
                );
                let report = basic_report_response(&field_or_na(data, "response_plan"));
                Ok(StageOutput::new(BASIC_REPORT_DECISION, report).flag(fallback_flag(
                    "reporting",
                    "Field report generated from the basic template",
                )))
            }
            Err(e) => Err(PipelineError::from_completion(self.name(), e)),
        }
    }
}

pub fn emergency_runner(model: &str) -> StageRunner {
    StageRunner::new("emergency", model)
        .with_stage(ScoutStage)
        .with_stage(PlannerStage)
        .with_stage(CommunicatorStage)
}

/// Sections of the rendered field report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReport {
    pub terrain_description: String,
    pub response_plan: String,
    pub safety_notes: String,
    pub recommended_actions: String,
}

impl FieldReport {
    /// Build from the scout assessment, the planner's plan and the
    /// communicator's labelled answer.
    pub fn assemble(terrain: &str, plan: &str, communicator_response: &str) -> Self {
        let sections = LabeledSections::parse(communicator_response, REPORT_LABELS);
        Self {
            terrain_description: non_blank_or(terrain, "No terrain analysis available"),
            response_plan: sections
                .text("RESPONSE_PLAN")
                .map(str::to_string)
                .unwrap_or_else(|| non_blank_or(plan, "No response plan available")),
            safety_notes: sections.text_or("SAFETY_NOTES", "No safety notes available"),
            recommended_actions: sections
                .text_or("RECOMMENDED_ACTIONS", "No recommended actions available"),
        }
    }

    pub fn render(&self) -> String {
        let section = |title: &str, body: &str| {
            format!("{title}:\n{}\n{body}\n", "-".repeat(title.len() + 1))
        };
        [
            format!(
                "DISASTER RESPONSE FIELD REPORT\n{}\n",
                "=".repeat("DISASTER RESPONSE FIELD REPORT".len() - 1)
            ),
            section("TERRAIN ANALYSIS", &self.terrain_description),
            section("PLANNED RESPONSE", &self.response_plan),
            section("SAFETY CONSIDERATIONS", &self.safety_notes),
            section("RECOMMENDED ACTIONS", &self.recommended_actions),
        ]
        .join("\n")
    }
}

fn non_blank_or(text: &str, default: &str) -> String {
    if text.trim().is_empty() {
        default.to_string()
    } else {
        text.trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmergencyOutcome {
    pub item_id: String,
    pub field_report: FieldReport,
    pub rendered: String,
    /// True when the scout fell back to the basic assessment.
    pub analysis_fallback: bool,
    /// True when the planner fell back to the basic plan.
    pub plan_fallback: bool,
    /// True when the communicator fell back to the basic report.
    pub report_fallback: bool,
}

/// Run the emergency pipeline for one disaster report.
pub fn respond(core: &CoreState, report: &DisasterReport) -> Result<EmergencyOutcome, PipelineError> {
    report.validate()?;

    let item_id = super::short_id(ID_PREFIX, &super::slug(&report.location));
    core.store().create(&item_id, report.to_context())?;
    tracing::info!(item_id = %item_id, location = %report.location, "Emergency analysis started");

    let outcome = emergency_runner(&core.config().model).run(
        core.store(),
        core.completion(),
        &item_id,
    )?;

    let context = core
        .store()
        .get_context(&item_id)?
        .map(|record| record.data)
        .unwrap_or_default();
    let text = |key: &str| {
        context
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let communicator = outcome
        .stage("communicator")
        .map(|s| s.rationale.as_str())
        .unwrap_or_default();

    let field_report = FieldReport::assemble(
        &text("scene_assessment"),
        &text("response_plan"),
        communicator,
    );
    let flag = |key: &str| context.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
    let report_fallback = outcome
        .stage("communicator")
        .is_some_and(|s| s.decision == BASIC_REPORT_DECISION);

    Ok(EmergencyOutcome {
        item_id,
        rendered: field_report.render(),
        field_report,
        analysis_fallback: flag("analysis_fallback"),
        plan_fallback: flag("plan_fallback"),
        report_fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::tests::core_with;
    use crate::pipeline::completion::{CompletionError, MockCompletion};
    use std::sync::Arc;

    fn flood() -> DisasterReport {
        DisasterReport {
            location: "Riverside district".into(),
            description: "Flooded streets after levee breach".into(),
            observed: vec![
                ObservedElement {
                    category: "people".into(),
                    label: "person".into(),
                    confidence: 0.92,
                },
                ObservedElement {
                    category: "vehicles".into(),
                    label: "car".into(),
                    confidence: 0.8,
                },
                ObservedElement {
                    category: "people".into(),
                    label: "person".into(),
                    confidence: 0.75,
                },
            ],
        }
    }

    const COMMUNICATOR_ANSWER: &str = "RESPONSE_PLAN: Deploy boats to the east bank\n\
        SAFETY_NOTES: Fast current, live wires\n\
        RECOMMENDED_ACTIONS: 1. Evacuate block 4\n2. Set up triage";

    #[test]
    fn observed_groups_by_category() {
        assert_eq!(
            format_observed(&flood().observed),
            "People: person (0.92), person (0.75)\nVehicles: car (0.80)"
        );
        assert_eq!(format_observed(&[]), "");
    }

    #[test]
    fn full_pipeline_renders_field_report() {
        let mock = Arc::new(
            MockCompletion::new("")
                .when("emergency response analyst", "Water 1m deep, two people on a roof")
                .when("emergency response coordinator", "Send two rescue boats")
                .when("disaster response communicator", COMMUNICATOR_ANSWER),
        );
        let core = core_with(mock.clone());

        let outcome = respond(&core, &flood()).unwrap();
        assert!(!outcome.plan_fallback);
        assert_eq!(
            outcome.field_report.terrain_description,
            "Water 1m deep, two people on a roof"
        );
        assert_eq!(outcome.field_report.response_plan, "Deploy boats to the east bank");
        assert_eq!(outcome.field_report.safety_notes, "Fast current, live wires");
        assert!(outcome.rendered.starts_with("DISASTER RESPONSE FIELD REPORT\n====="));
        assert!(outcome.rendered.contains("PLANNED RESPONSE:\n-----------------\nDeploy boats"));
        assert!(outcome.item_id.starts_with("ER-RIVERSID-"));

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].prompt.contains("Water 1m deep"));
        assert!(calls[2].prompt.contains("Send two rescue boats"));
    }

    #[test]
    fn planner_outage_uses_basic_plan() {
        let mock = Arc::new(
            MockCompletion::new("")
                .when("emergency response analyst", "Collapsed bridge")
                .when_fails(
                    "emergency response coordinator",
                    CompletionError::Unavailable {
                        attempts: 3,
                        last_error: "connection refused".into(),
                    },
                )
                .when("disaster response communicator", "SAFETY_NOTES: Unstable debris"),
        );
        let core = core_with(mock.clone());

        let outcome = respond(&core, &flood()).unwrap();
        assert!(outcome.plan_fallback);
        assert_eq!(outcome.field_report.response_plan, BASIC_RESPONSE_PLAN);
        assert_eq!(
            outcome.field_report.recommended_actions,
            "No recommended actions available"
        );
        assert!(mock.calls()[2].prompt.contains("Basic Response Plan"));

        let history = core.store().get_history(&outcome.item_id).unwrap();
        assert_eq!(history.decision_for("planner").unwrap().decision, "BASIC PLAN");
        assert_eq!(history.flags.len(), 1);
    }

    #[test]
    fn planner_hard_error_aborts() {
        let mock = Arc::new(
            MockCompletion::new("ok").when_fails(
                "emergency response coordinator",
                CompletionError::Status {
                    status: 400,
                    body: "bad model".into(),
                },
            ),
        );
        let core = core_with(mock);
        let err = respond(&core, &flood()).unwrap_err();
        assert_eq!(err.stage(), Some("planner"));
    }

    fn unavailable() -> CompletionError {
        CompletionError::Unavailable {
            attempts: 3,
            last_error: "timed out".into(),
        }
    }

    #[test]
    fn scout_outage_uses_basic_assessment() {
        let mock = Arc::new(
            MockCompletion::new("")
                .when_fails("emergency response analyst", unavailable())
                .when("emergency response coordinator", "Send two rescue boats")
                .when("disaster response communicator", COMMUNICATOR_ANSWER),
        );
        let core = core_with(mock.clone());

        let outcome = respond(&core, &flood()).unwrap();
        assert!(outcome.analysis_fallback);
        assert!(!outcome.plan_fallback);
        assert!(!outcome.report_fallback);
        assert!(outcome
            .field_report
            .terrain_description
            .starts_with("Emergency Response Scene Assessment:"));
        assert!(outcome
            .field_report
            .terrain_description
            .contains("People: person (0.92), person (0.75)"));
        assert!(mock.calls()[1].prompt.contains("Identify and clear access routes"));

        let history = core.store().get_history(&outcome.item_id).unwrap();
        assert_eq!(history.decision_for("scout").unwrap().decision, "BASIC ASSESSMENT");
        assert_eq!(history.flags.len(), 1);
        assert_eq!(history.flags[0].kind, "scene_analysis");
    }

    #[test]
    fn communicator_outage_keeps_the_plan() {
        let mock = Arc::new(
            MockCompletion::new("")
                .when("emergency response analyst", "Water 1m deep")
                .when("emergency response coordinator", "Send two rescue boats to the east bank")
                .when_fails("disaster response communicator", unavailable()),
        );
        let core = core_with(mock);

        let outcome = respond(&core, &flood()).unwrap();
        assert!(outcome.report_fallback);
        assert!(!outcome.analysis_fallback);
        assert_eq!(
            outcome.field_report.response_plan,
            "Send two rescue boats to the east bank"
        );
        assert!(outcome
            .field_report
            .safety_notes
            .starts_with("Generated without the language model"));
        assert!(outcome
            .field_report
            .recommended_actions
            .starts_with("1. Secure the area"));
        assert!(outcome.rendered.contains("Send two rescue boats to the east bank"));

        let history = core.store().get_history(&outcome.item_id).unwrap();
        assert_eq!(history.decision_for("communicator").unwrap().decision, "BASIC REPORT");
        assert_eq!(history.flags.len(), 1);
        assert_eq!(history.flags[0].kind, "reporting");
    }

    #[test]
    fn full_outage_still_renders_report() {
        let core = core_with(Arc::new(MockCompletion::failing(unavailable())));
        let outcome = respond(&core, &flood()).unwrap();
        assert!(outcome.analysis_fallback && outcome.plan_fallback && outcome.report_fallback);
        assert!(outcome.field_report.response_plan.starts_with("Basic Response Plan:"));

        let history = core.store().get_history(&outcome.item_id).unwrap();
        let kinds: Vec<_> = history.flags.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["scene_analysis", "planning", "reporting"]);
    }

    #[test]
    fn basic_assessment_without_elements() {
        let text = basic_scene_assessment("N/A");
        assert!(text.contains("No elements reported."));
        assert!(text.ends_with("based on scene assessment"));
    }

    #[test]
    fn missing_location_rejected() {
        let core = core_with(Arc::new(MockCompletion::new("")));
        let report = DisasterReport {
            location: " ".into(),
            ..flood()
        };
        assert!(matches!(
            respond(&core, &report),
            Err(PipelineError::Validation(ValidationError::MissingFields(_)))
        ));
    }

    #[test]
    fn blank_inputs_render_placeholders() {
        let report = FieldReport::assemble("", "", "");
        let text = report.render();
        assert!(text.contains("TERRAIN ANALYSIS:\n-----------------\nNo terrain analysis available"));
        assert!(text.contains("No response plan available"));
        assert!(text.contains("No safety notes available"));
    }
}
