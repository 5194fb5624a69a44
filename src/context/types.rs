use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form key/value payload carried between stages.
pub type ContextData = serde_json::Map<String, Value>;

/// Stage label assigned when an item is first stored.
pub const STAGE_CREATED: &str = "created";
/// Terminal label for a pipeline that ran every stage.
pub const STAGE_COMPLETED: &str = "completed";
/// Terminal label for a pipeline a stage asked to stop.
pub const STAGE_STOPPED: &str = "stopped";

/// Accumulated payload for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub item_id: String,
    pub data: ContextData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where an item is in its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    /// Pipeline stage label (`created`, a stage name, `completed`, `stopped`).
    pub stage: String,
    /// Human-readable status line.
    pub status: String,
    /// Stage that currently owns the item.
    pub current_stage: String,
    pub updated_at: DateTime<Utc>,
}

/// One stage verdict in the decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub decision: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue raised by a keyword heuristic. Never removed once raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: Severity,
    pub resolved: bool,
}

/// Transfer of context and control between two consecutive stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub timestamp: DateTime<Utc>,
    pub from_stage: String,
    pub to_stage: String,
    pub context_delta: ContextData,
}

/// Append-only logs for one item, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemHistory {
    pub decisions: Vec<Decision>,
    pub flags: Vec<Flag>,
    pub handoffs: Vec<HandoffRecord>,
}

impl ItemHistory {
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty() && self.flags.is_empty() && self.handoffs.is_empty()
    }

    /// Most recent decision recorded by `stage`, if any.
    pub fn decision_for(&self, stage: &str) -> Option<&Decision> {
        self.decisions.iter().rev().find(|d| d.stage == stage)
    }
}

/// Result of a handoff: merged payload, state and the full history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffOutcome {
    pub context: ContextRecord,
    pub state: ItemState,
    pub history: ItemHistory,
}
