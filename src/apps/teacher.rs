//! Teacher tools: classroom material generated through the tutor stage.
//!
//! Each tool renders a prompt template framed by the grade band's
//! guidelines, then runs it like a lesson request (same canned answer when
//! the completion service is unreachable).

use serde::{Deserialize, Serialize};

use super::tutor::{run_tutor, GradeBand};
use crate::context::ContextData;
use crate::core_state::CoreState;
use crate::pipeline::{PipelineError, ValidationError};

pub const ID_PREFIX: &str = "TT";

fn five() -> u32 {
    5
}

fn ten() -> u32 {
    10
}

fn default_duration() -> String {
    "45 minutes".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningLevel {
    Basic,
    #[default]
    Standard,
    Advanced,
}

impl LearningLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Standard => "Standard",
            Self::Advanced => "Advanced",
        }
    }

    fn adjustments(&self) -> &'static [&'static str] {
        match self {
            Self::Basic => &[
                "Use simpler vocabulary and shorter sentences",
                "Focus on foundational concepts",
                "Provide more scaffolding and support",
                "Include more visual explanations",
                "Break down complex ideas into smaller steps",
            ],
            Self::Standard => &[
                "Use grade-appropriate vocabulary and sentence structures",
                "Cover the core curriculum concepts",
                "Balance concrete examples with abstract ideas",
                "Include a mix of question types",
                "Provide moderate scaffolding",
            ],
            Self::Advanced => &[
                "Use more sophisticated vocabulary and complex sentence structures",
                "Include more in-depth content and nuanced explanations",
                "Incorporate higher-order thinking questions",
                "Make connections to broader concepts and other subjects",
                "Include challenging extension activities",
            ],
        }
    }
}

/// Tool and its own parameters, tagged by `tool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum TeacherTool {
    Quiz {
        #[serde(default = "five")]
        num_questions: u32,
        #[serde(default)]
        difficulty: Difficulty,
    },
    LessonPlan {
        #[serde(default = "default_duration")]
        duration: String,
    },
    StudyGuide,
    WritingPrompt {
        writing_type: String,
        #[serde(default)]
        theme: Option<String>,
    },
    Feedback {
        assignment_type: String,
        #[serde(default)]
        strengths: Option<String>,
        #[serde(default)]
        improvements: Option<String>,
    },
    ConceptMap,
    VocabularyList {
        #[serde(default = "ten")]
        num_terms: u32,
    },
    DiscussionQuestions {
        #[serde(default = "five")]
        num_questions: u32,
    },
    ExperimentActivity,
    DifferentiatedContent {
        #[serde(default)]
        learning_level: LearningLevel,
    },
}

impl TeacherTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiz { .. } => "quiz",
            Self::LessonPlan { .. } => "lesson_plan",
            Self::StudyGuide => "study_guide",
            Self::WritingPrompt { .. } => "writing_prompt",
            Self::Feedback { .. } => "feedback",
            Self::ConceptMap => "concept_map",
            Self::VocabularyList { .. } => "vocabulary_list",
            Self::DiscussionQuestions { .. } => "discussion_questions",
            Self::ExperimentActivity => "experiment_activity",
            Self::DifferentiatedContent { .. } => "differentiated_content",
        }
    }

    /// Writing prompts and feedback are not tied to a subject topic.
    fn needs_topic(&self) -> bool {
        !matches!(self, Self::WritingPrompt { .. } | Self::Feedback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeacherToolRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub grade_level: String,
    #[serde(flatten)]
    pub tool: TeacherTool,
}

impl TeacherToolRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut required: Vec<(&str, &str)> = Vec::new();
        if self.tool.needs_topic() {
            required.push(("subject", self.subject.as_str()));
            required.push(("topic", self.topic.as_str()));
        }
        match &self.tool {
            TeacherTool::WritingPrompt { writing_type, .. } => {
                required.push(("writing_type", writing_type.as_str()))
            }
            TeacherTool::Feedback { assignment_type, .. } => {
                required.push(("assignment_type", assignment_type.as_str()))
            }
            _ => {}
        }

        let missing: Vec<String> = required
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

    pub fn grade_band(&self) -> GradeBand {
        GradeBand::parse(&self.grade_level)
    }

    /// Tool template framed by the grade band's guidelines.
    pub fn prompt(&self) -> String {
        let band = self.grade_band();
        band.frame(&self.template(band.as_str()))
    }

    fn template(&self, grade: &str) -> String {
        let topic = self.topic.trim();
        let subject = self.subject.trim();
        match &self.tool {
            TeacherTool::Quiz {
                num_questions,
                difficulty,
            } => format!(
                "Create an educational quiz on {topic} in {subject} for students in grades {grade}.\n\n\
                 Generate {num_questions} questions at {} difficulty level.\n\
                 Include a mix of question types (multiple choice, true/false, short answer).\n\n\
                 For each question:\n\
                 1. Provide the question\n\
                 2. For multiple choice, provide 4 options with one correct answer\n\
                 3. Include the correct answer\n\
                 4. Provide a brief explanation for the correct answer\n\n\
                 Format each question as:\n\
                 Q1: [Question text]\n\
                 Options:\nA. [Option A]\nB. [Option B]\nC. [Option C]\nD. [Option D]\n\
                 Correct Answer: [Letter]\n\
                 Explanation: [Brief explanation]",
                difficulty.as_str()
            ),
            TeacherTool::LessonPlan { duration } => format!(
                "Create a detailed lesson plan for teaching {topic} in {subject} to students in grades {grade}.\n\
                 The lesson should be designed for a {duration} class period.\n\n\
                 Include the following components:\n\
                 1. Learning Objectives\n\
                 2. Materials Needed\n\
                 3. Warm-up Activity (5-10 minutes)\n\
                 4. Main Instruction (15-20 minutes)\n\
                 5. Student Activity (15-20 minutes)\n\
                 6. Assessment Method\n\
                 7. Closure (5 minutes)\n\n\
                 Structure the lesson plan with clear headings and include timing guidelines for each section."
            ),
            TeacherTool::StudyGuide => format!(
                "Create a comprehensive study guide on {topic} in {subject} for students in grades {grade}.\n\n\
                 Include the following elements:\n\
                 1. Key Concepts (main ideas and principles)\n\
                 2. Vocabulary List (important terms with definitions)\n\
                 3. Examples and Illustrations\n\
                 4. Common Misconceptions\n\
                 5. Practice Questions (with answers)\n\
                 6. Memory Tips and Mnemonics"
            ),
            TeacherTool::WritingPrompt {
                writing_type,
                theme,
            } => {
                let theme = theme
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| format!(" on the theme of {t}"))
                    .unwrap_or_default();
                format!(
                    "Create an engaging {} writing prompt{theme} for students in grades {grade}.\n\n\
                     The prompt should:\n\
                     1. Be clear and specific\n\
                     2. Encourage creativity and critical thinking\n\
                     3. Include any necessary background information\n\
                     4. Provide guidance on length or structure if appropriate\n\n\
                     Also include:\n\
                     - A title for the prompt\n\
                     - A brief description of the purpose\n\
                     - 2-3 questions to help students brainstorm ideas\n\
                     - Success criteria (what makes a good response)",
                    writing_type.trim()
                )
            }
            TeacherTool::Feedback {
                assignment_type,
                strengths,
                improvements,
            } => {
                let mut notes = String::new();
                if let Some(s) = strengths.as_deref().filter(|s| !s.trim().is_empty()) {
                    notes.push_str(&format!("Specific strengths: {}\n", s.trim()));
                }
                if let Some(i) = improvements.as_deref().filter(|s| !s.trim().is_empty()) {
                    notes.push_str(&format!("Areas for improvement: {}\n", i.trim()));
                }
                format!(
                    "Generate constructive feedback for a student in grades {grade} who completed a {}.\n\n\
                     {notes}\n\
                     Include the following in your feedback:\n\
                     1. Positive comments on strengths\n\
                     2. Constructive criticism on areas for improvement\n\
                     3. Specific suggestions for how to improve\n\
                     4. Encouraging closing remarks",
                    assignment_type.trim()
                )
            }
            TeacherTool::ConceptMap => format!(
                "Create a concept map for {topic} in {subject} appropriate for students in grades {grade}.\n\n\
                 The concept map should:\n\
                 1. Identify the main concept ({topic}) at the center\n\
                 2. Include 5-8 key related concepts or subtopics\n\
                 3. Show connections between concepts with brief descriptions of relationships\n\
                 4. Be organized in a logical hierarchy or structure\n\
                 5. Include brief explanations of each concept\n\n\
                 Format the concept map as a markdown text description that could be drawn as a visual map."
            ),
            TeacherTool::VocabularyList { num_terms } => format!(
                "Create a vocabulary list of {num_terms} important terms related to {topic} in {subject} \
                 for students in grades {grade}.\n\n\
                 For each term, provide:\n\
                 1. The word or phrase\n\
                 2. A clear, grade-appropriate definition\n\
                 3. An example sentence using the term\n\
                 4. A memory tip or mnemonic device (where helpful)"
            ),
            TeacherTool::DiscussionQuestions { num_questions } => format!(
                "Create {num_questions} thought-provoking discussion questions about {topic} in {subject} \
                 for students in grades {grade}.\n\n\
                 Include a mix of factual recall, comprehension, application, analysis, evaluation \
                 and creative thinking questions.\n\n\
                 For each question:\n\
                 1. Provide the question\n\
                 2. Include a brief teacher note with possible discussion points or answers"
            ),
            TeacherTool::ExperimentActivity => format!(
                "Create a hands-on experiment or activity about {topic} in {subject} for students in grades {grade}.\n\n\
                 Include the following:\n\
                 1. Title of the experiment/activity\n\
                 2. Learning objectives\n\
                 3. Materials needed (common, easily available items)\n\
                 4. Step-by-step instructions\n\
                 5. Expected results or outcomes\n\
                 6. Discussion questions\n\
                 7. Extensions or variations\n\
                 8. Safety considerations (if applicable)\n\n\
                 The activity should be doable in a classroom or home setting with minimal specialized equipment."
            ),
            TeacherTool::DifferentiatedContent { learning_level } => {
                let adjustments: Vec<String> = learning_level
                    .adjustments()
                    .iter()
                    .map(|line| format!("- {line}"))
                    .collect();
                format!(
                    "Create differentiated educational content about {topic} in {subject} for grades {grade} \
                     students at a {level} learning level.\n\n\
                     The content should include:\n\
                     1. A brief introduction to the topic\n\
                     2. Key concepts explained at the appropriate level\n\
                     3. Examples and illustrations\n\
                     4. Practice activities or questions\n\
                     5. Extension resources (for advanced) or support resources (for basic)\n\n\
                     For {level} level:\n{}",
                    adjustments.join("\n"),
                    level = learning_level.as_str(),
                )
            }
        }
    }

    fn to_context(&self) -> ContextData {
        let mut data = ContextData::new();
        data.insert("tool".into(), self.tool.as_str().into());
        data.insert("subject".into(), self.subject.trim().into());
        data.insert("topic".into(), self.topic.trim().into());
        data.insert("grade_band".into(), self.grade_band().as_str().into());
        data.insert("prompt".into(), self.prompt().into());
        data
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherToolResponse {
    pub item_id: String,
    pub tool: &'static str,
    pub grade_band: GradeBand,
    pub content: String,
    pub used_fallback: bool,
}

/// Generate classroom material for one tool request.
pub fn generate(
    core: &CoreState,
    request: &TeacherToolRequest,
) -> Result<TeacherToolResponse, PipelineError> {
    request.validate()?;

    let label = if request.tool.needs_topic() {
        request.topic.as_str()
    } else {
        request.tool.as_str()
    };
    let item_id = super::short_id(ID_PREFIX, &super::slug(label));
    tracing::info!(
        item_id = %item_id,
        tool = request.tool.as_str(),
        grade = request.grade_band().as_str(),
        "Teacher tool requested"
    );
    let answer = run_tutor(core, &item_id, request.to_context())?;

    Ok(TeacherToolResponse {
        item_id,
        tool: request.tool.as_str(),
        grade_band: request.grade_band(),
        content: answer.text,
        used_fallback: answer.used_fallback,
    })
}
