//! K-12 tutoring: one grade-aware completion per lesson request.

use serde::{Deserialize, Serialize};

use crate::context::ContextData;
use crate::core_state::CoreState;
use crate::pipeline::completion::{canned_response, GenerationOptions};
use crate::pipeline::{PipelineError, Stage, StageEnv, StageOutput, StageRunner, ValidationError};

pub const ID_PREFIX: &str = "TU";

const ANSWERED: &str = "ANSWERED";
const FALLBACK: &str = "FALLBACK";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    #[default]
    ExplainConcept,
    StepByStep,
    Examples,
    Quiz,
    FunFacts,
    VisualDescription,
    RealWorld,
    CompareContrast,
}

impl PromptKind {
    pub const ALL: [PromptKind; 8] = [
        Self::ExplainConcept,
        Self::StepByStep,
        Self::Examples,
        Self::Quiz,
        Self::FunFacts,
        Self::VisualDescription,
        Self::RealWorld,
        Self::CompareContrast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplainConcept => "explain_concept",
            Self::StepByStep => "step_by_step",
            Self::Examples => "examples",
            Self::Quiz => "quiz",
            Self::FunFacts => "fun_facts",
            Self::VisualDescription => "visual_description",
            Self::RealWorld => "real_world",
            Self::CompareContrast => "compare_contrast",
        }
    }

    /// Opening request for `topic`.
    pub fn instruction(&self, topic: &str) -> String {
        match self {
            Self::ExplainConcept => {
                format!("Explain the concept of {topic} in a way that's easy to understand.")
            }
            Self::StepByStep => format!(
                "Provide a step-by-step explanation of how to solve problems related to {topic}."
            ),
            Self::Examples => format!(
                "Give examples of {topic} with explanations appropriate for this grade level."
            ),
            Self::Quiz => format!("Create a short quiz about {topic} with answers."),
            Self::FunFacts => format!("Share interesting and engaging facts about {topic}."),
            Self::VisualDescription => format!(
                "Describe {topic} using visual analogies and examples that are easy to picture."
            ),
            Self::RealWorld => format!(
                "Explain how {topic} applies to real-world situations and everyday life."
            ),
            Self::CompareContrast => format!(
                "Compare and contrast {topic} with related concepts to highlight similarities and differences."
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum GradeBand {
    #[serde(rename = "K-2")]
    EarlyElementary,
    #[serde(rename = "3-5")]
    UpperElementary,
    #[serde(rename = "6-8")]
    Middle,
    #[serde(rename = "9-12")]
    High,
    /// No recognised band in the label.
    #[default]
    #[serde(rename = "K-12")]
    General,
}

impl GradeBand {
    /// Band named in a free-form grade label ("K-2 (Elementary)", "9-12").
    pub fn parse(label: &str) -> Self {
        let label = label.to_uppercase();
        if label.contains("K-2") {
            Self::EarlyElementary
        } else if label.contains("3-5") {
            Self::UpperElementary
        } else if label.contains("6-8") {
            Self::Middle
        } else if label.contains("9-12") {
            Self::High
        } else {
            Self::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EarlyElementary => "K-2",
            Self::UpperElementary => "3-5",
            Self::Middle => "6-8",
            Self::High => "9-12",
            Self::General => "K-12",
        }
    }

    pub fn guidelines(&self) -> &'static [&'static str] {
        match self {
            Self::EarlyElementary => &[
                "Use very simple language appropriate for kindergarten to 2nd grade",
                "Explain concepts using familiar examples and concrete terms",
                "Keep sentences short and use basic vocabulary",
                "Use a friendly, encouraging tone",
                "Include visual descriptions where possible",
            ],
            Self::UpperElementary => &[
                "Use language appropriate for 3rd to 5th grade students",
                "Explain concepts clearly with some simple examples",
                "Use straightforward sentences and grade-appropriate vocabulary",
                "Be encouraging and supportive",
                "Include some interesting facts to maintain engagement",
            ],
            Self::Middle => &[
                "Use language appropriate for middle school students (6th to 8th grade)",
                "Provide more detailed explanations with relevant examples",
                "Introduce some subject-specific terminology with explanations",
                "Encourage critical thinking and connections between concepts",
                "Maintain an engaging and supportive tone",
            ],
            Self::High => &[
                "Use language appropriate for high school students (9th to 12th grade)",
                "Provide comprehensive explanations with specific examples",
                "Use appropriate academic language and subject-specific terminology",
                "Encourage deeper analysis and critical thinking",
                "Make connections to broader concepts and real-world applications",
            ],
            Self::General => &[
                "Use clear, straightforward language",
                "Provide helpful examples to illustrate concepts",
                "Maintain an encouraging and supportive tone",
            ],
        }
    }

    /// `request` followed by this band's guidelines.
    pub fn frame(&self, request: &str) -> String {
        let guidelines: Vec<String> = self
            .guidelines()
            .iter()
            .map(|line| format!("- {line}"))
            .collect();
        format!(
            "{request}\n\nPlease follow these guidelines for a {} student:\n{}",
            self.as_str(),
            guidelines.join("\n")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LessonRequest {
    pub topic: String,
    #[serde(default)]
    pub grade_level: String,
    #[serde(default)]
    pub kind: PromptKind,
}

impl LessonRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.trim().is_empty() {
            return Err(ValidationError::MissingFields(vec!["topic".into()]));
        }
        Ok(())
    }

    pub fn grade_band(&self) -> GradeBand {
        GradeBand::parse(&self.grade_level)
    }

    /// Full prompt: the kind's instruction followed by the band's guidelines.
    pub fn prompt(&self) -> String {
        self.grade_band()
            .frame(&self.kind.instruction(self.topic.trim()))
    }

    fn to_context(&self) -> ContextData {
        let mut data = ContextData::new();
        data.insert("topic".into(), self.topic.trim().into());
        data.insert("grade_band".into(), self.grade_band().as_str().into());
        data.insert("kind".into(), self.kind.as_str().into());
        data.insert("prompt".into(), self.prompt().into());
        data
    }
}

/// Answers the stored prompt; a canned answer stands in when the service is
/// unreachable.
pub struct TutorStage;

impl Stage for TutorStage {
    fn name(&self) -> &str {
        "tutor"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let prompt = env
            .field("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::Stage {
                stage: self.name().to_string(),
                message: "no prompt in context".into(),
            })?;

        match env.complete_raw(prompt, &GenerationOptions::long_form()) {
            Ok(answer) => Ok(StageOutput::new(ANSWERED, answer)),
            Err(e) if e.is_unavailable() => {
                tracing::warn!(item_id = %env.item_id, error = %e, "Tutor offline, using canned answer");
                Ok(StageOutput::new(FALLBACK, canned_response(prompt, env.model)))
            }
            Err(e) => Err(PipelineError::from_completion(self.name(), e)),
        }
    }
}

pub fn tutor_runner(model: &str) -> StageRunner {
    StageRunner::new("tutor", model).with_stage(TutorStage)
}

/// Answer of a stored tutor item.
pub(crate) struct TutorAnswer {
    pub text: String,
    pub used_fallback: bool,
}

/// Store `data` (which must carry a `prompt`) under `item_id` and run the
/// tutor stage over it.
pub(crate) fn run_tutor(
    core: &CoreState,
    item_id: &str,
    data: ContextData,
) -> Result<TutorAnswer, PipelineError> {
    core.store().create(item_id, data)?;
    let outcome = tutor_runner(&core.config().model).run(core.store(), core.completion(), item_id)?;
    let record = outcome.stage("tutor").ok_or_else(|| PipelineError::Stage {
        stage: "tutor".into(),
        message: "tutor stage did not run".into(),
    })?;
    Ok(TutorAnswer {
        text: record.rationale.clone(),
        used_fallback: record.decision == FALLBACK,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonResponse {
    pub item_id: String,
    pub topic: String,
    pub grade_band: GradeBand,
    pub kind: PromptKind,
    pub answer: String,
    pub used_fallback: bool,
}

pub fn answer(core: &CoreState, request: &LessonRequest) -> Result<LessonResponse, PipelineError> {
    request.validate()?;

    let item_id = super::short_id(ID_PREFIX, &super::slug(&request.topic));
    tracing::info!(
        item_id = %item_id,
        kind = request.kind.as_str(),
        grade = request.grade_band().as_str(),
        "Lesson requested"
    );
    let answer = run_tutor(core, &item_id, request.to_context())?;

    Ok(LessonResponse {
        item_id,
        topic: request.topic.trim().to_string(),
        grade_band: request.grade_band(),
        kind: request.kind,
        answer: answer.text,
        used_fallback: answer.used_fallback,
    })
}
