//! StageRunner drives an ordered list of stages over one stored item.
//!
//! Stages run strictly in order, once each. After every non-final stage its
//! context delta is handed to the next stage through the `ContextStore`.
//! A stage may stop the pipeline; an error aborts it.

use serde::Serialize;

use super::completion::{CompletionError, GenerationOptions, TextCompletion};
use super::PipelineError;
use crate::context::{
    ContextData, ContextRecord, ContextStore, ItemHistory, Severity, STAGE_COMPLETED,
    STAGE_STOPPED,
};

/// What a stage sees while it runs.
pub struct StageEnv<'a> {
    pub item_id: &'a str,
    pub stage: &'a str,
    pub context: &'a ContextRecord,
    pub history: &'a ItemHistory,
    pub completion: &'a dyn TextCompletion,
    pub model: &'a str,
}

impl StageEnv<'_> {
    /// Completion call with failures mapped to `PipelineError`.
    pub fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, PipelineError> {
        self.complete_raw(prompt, options)
            .map_err(|e| PipelineError::from_completion(self.stage, e))
    }

    /// Completion call for stages that supply their own fallback.
    pub fn complete_raw(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, CompletionError> {
        self.completion.complete(prompt, self.model, options)
    }

    /// Item payload field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.context.data.get(key)
    }
}

/// Flag a stage wants raised.
#[derive(Debug, Clone, PartialEq)]
pub struct RaisedFlag {
    pub kind: String,
    pub description: String,
    pub severity: Severity,
}

impl RaisedFlag {
    pub fn new(kind: &str, description: &str, severity: Severity) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
            severity,
        }
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Status or decision string, e.g. "COMPLETE" or "APPROVED".
    pub decision: String,
    /// Free-text rationale (usually the model response).
    pub rationale: String,
    /// Keys merged into the context when handing off to the next stage.
    pub context_delta: ContextData,
    pub flags: Vec<RaisedFlag>,
    /// Stop after this stage with the given status line.
    pub stop: Option<String>,
}

impl StageOutput {
    pub fn new(decision: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            rationale: rationale.into(),
            ..Self::default()
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context_delta.insert(key.to_string(), value.into());
        self
    }

    pub fn flag(mut self, flag: RaisedFlag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn stop(mut self, status: impl Into<String>) -> Self {
        self.stop = Some(status.into());
        self
    }
}

/// One step of a pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped { at_stage: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub decision: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub item_id: String,
    pub status: RunStatus,
    /// Final status line: the last decision, or the stop status.
    pub final_status: String,
    /// Stages that ran, in order.
    pub stages: Vec<StageRecord>,
}

impl PipelineOutcome {
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn ran(&self, name: &str) -> bool {
        self.stage(name).is_some()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }
}

/// Ordered stage list bound to a model.
pub struct StageRunner {
    name: String,
    model: String,
    stages: Vec<Box<dyn Stage>>,
}

impl StageRunner {
    pub fn new(name: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage over `item_id`, which must already be in `store`.
    pub fn run(
        &self,
        store: &ContextStore,
        completion: &dyn TextCompletion,
        item_id: &str,
    ) -> Result<PipelineOutcome, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::Empty(self.name.clone()));
        }

        let mut records = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            let stage_name = stage.name();
            store.set_state(
                item_id,
                stage_name,
                &format!("{stage_name} in progress"),
                stage_name,
            )?;

            let context = store
                .get_context(item_id)?
                .ok_or_else(|| crate::context::StoreError::NotFound(item_id.to_string()))?;
            let history = store.get_history(item_id)?;

            tracing::info!(pipeline = %self.name, item_id, stage = stage_name, "Stage started");

            let env = StageEnv {
                item_id,
                stage: stage_name,
                context: &context,
                history: &history,
                completion,
                model: &self.model,
            };

            let output = match stage.run(&env) {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(
                        pipeline = %self.name,
                        item_id,
                        stage = stage_name,
                        error = %e,
                        "Stage failed, aborting pipeline"
                    );
                    store.set_state(
                        item_id,
                        stage_name,
                        &format!("ERROR - {stage_name} stage failed"),
                        stage_name,
                    )?;
                    return Err(e);
                }
            };

            store.add_decision(item_id, stage_name, &output.decision, &output.rationale)?;
            for flag in &output.flags {
                store.add_flag(item_id, &flag.kind, &flag.description, flag.severity)?;
                tracing::info!(
                    item_id,
                    stage = stage_name,
                    kind = %flag.kind,
                    severity = %flag.severity,
                    "Flag raised"
                );
            }

            tracing::info!(
                pipeline = %self.name,
                item_id,
                stage = stage_name,
                decision = %output.decision,
                "Stage finished"
            );

            records.push(StageRecord {
                stage: stage_name.to_string(),
                decision: output.decision.clone(),
                rationale: output.rationale.clone(),
            });

            if let Some(status) = output.stop {
                store.set_state(item_id, STAGE_STOPPED, &status, stage_name)?;
                tracing::info!(pipeline = %self.name, item_id, stage = stage_name, %status, "Pipeline stopped");
                return Ok(PipelineOutcome {
                    item_id: item_id.to_string(),
                    status: RunStatus::Stopped {
                        at_stage: stage_name.to_string(),
                    },
                    final_status: status,
                    stages: records,
                });
            }

            if let Some(next) = self.stages.get(index + 1) {
                store.handoff(item_id, stage_name, next.name(), output.context_delta)?;
            }
        }

        let final_status = records
            .last()
            .map(|r| r.decision.clone())
            .unwrap_or_default();
        let last_stage = records.last().map(|r| r.stage.as_str()).unwrap_or_default();
        store.set_state(item_id, STAGE_COMPLETED, &final_status, last_stage)?;
        tracing::info!(pipeline = %self.name, item_id, final_status = %final_status, "Pipeline completed");

        Ok(PipelineOutcome {
            item_id: item_id.to_string(),
            status: RunStatus::Completed,
            final_status,
            stages: records,
        })
    }
}
