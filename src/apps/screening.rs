//! AML transaction screening.
//!
//! Collaborative screening runs three stages over one transaction:
//! Level 1 (basic red flags), retrieval-augmented analysis, and Level 2
//! enhanced due diligence. The reported score is the maximum of the three.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ContextData, Severity};
use crate::core_state::CoreState;
use crate::pipeline::completion::GenerationOptions;
use crate::pipeline::parse::json::{extract_json_object, field_score, field_text};
use crate::pipeline::parse::{truncate_chars, LabeledSections, RAW_TEXT_LIMIT};
use crate::pipeline::prompt::{field_or_na, PromptBuilder};
use crate::pipeline::{
    PipelineError, RaisedFlag, Stage, StageEnv, StageOutput, StageRunner, ValidationError,
};
use crate::retrieval::format_context;

pub const ID_PREFIX: &str = "SC";

/// Related transactions considered for enhanced due diligence.
pub const MAX_RELATED: usize = 5;

/// Knowledge base chunks included in the retrieval prompt.
const CONTEXT_CHUNKS: usize = 3;

const LEVEL1_LABELS: &[&str] = &["SCORE", "EXPLANATION"];
const LEVEL2_LABELS: &[&str] = &[
    "SCORE",
    "RISK_LEVEL",
    "RISK_FACTORS",
    "RECOMMENDATIONS",
    "EXPLANATION",
];
const RAG_LABELS: &[&str] = &[
    "SCORE",
    "RISK_LEVEL",
    "REGULATIONS",
    "TYPOLOGIES",
    "RISK_FACTORS",
    "RECOMMENDATIONS",
    "EXPLANATION",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub sender_name: String,
    pub sender_account: String,
    pub receiver_name: String,
    pub receiver_account: String,
    pub transaction_type: String,
    pub country: String,
    #[serde(default)]
    pub purpose: String,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<String> = [
            ("transaction_id", &self.transaction_id),
            ("currency", &self.currency),
            ("sender_account", &self.sender_account),
            ("receiver_account", &self.receiver_account),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k.to_string())
        .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(ValidationError::InvalidField {
                field: "amount".into(),
                reason: "must be a non-negative amount".into(),
            });
        }
        Ok(())
    }

    fn to_context(&self) -> ContextData {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => ContextData::new(),
        }
    }

    fn from_context(data: &ContextData, stage: &str) -> Result<Self, PipelineError> {
        serde_json::from_value(serde_json::Value::Object(data.clone())).map_err(|e| {
            PipelineError::Stage {
                stage: stage.to_string(),
                message: format!("transaction missing from context: {e}"),
            }
        })
    }
}

pub fn format_transaction(tx: &Transaction) -> String {
    format!(
        "Transaction Details:\n\
         ID: {}\n\
         Amount: {} {}\n\
         Sender: {} ({})\n\
         Receiver: {} ({})\n\
         Type: {}\n\
         Country: {}\n\
         Purpose: {}",
        tx.transaction_id,
        tx.amount,
        tx.currency,
        tx.sender_name,
        tx.sender_account,
        tx.receiver_name,
        tx.receiver_account,
        tx.transaction_type,
        tx.country,
        tx.purpose
    )
}

/// Transactions sharing the sender or receiver account, newest first.
/// The transaction itself is excluded.
pub fn find_related_transactions<'a>(
    tx: &Transaction,
    all: &'a [Transaction],
) -> Vec<&'a Transaction> {
    let mut related: Vec<&Transaction> = all
        .iter()
        .filter(|other| other.transaction_id != tx.transaction_id)
        .filter(|other| {
            other.sender_account == tx.sender_account
                || other.receiver_account == tx.receiver_account
        })
        .collect();
    related.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    related.truncate(MAX_RELATED);
    related
}

/// Risk band for a 0–100 score.
pub fn risk_level(score: f64) -> &'static str {
    if score >= 70.0 {
        "High"
    } else if score >= 40.0 {
        "Medium"
    } else {
        "Low"
    }
}

fn score_flag(stage_label: &str, score: f64) -> Option<RaisedFlag> {
    let severity = if score >= 70.0 {
        Severity::High
    } else if score >= 40.0 {
        Severity::Medium
    } else {
        return None;
    };
    Some(RaisedFlag::new(
        "aml_risk",
        &format!("{stage_label} risk score {score:.0}"),
        severity,
    ))
}

/// How the model is asked to answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// `LABEL: value` sections.
    #[default]
    Labeled,
    /// JSON object (`"format": "json"`).
    Json,
}

impl ResponseFormat {
    fn options(&self) -> GenerationOptions {
        match self {
            Self::Labeled => GenerationOptions::extraction(),
            Self::Json => GenerationOptions::extraction().json(),
        }
    }

    /// The JSON object of a JSON-mode answer. Labeled answers never take the
    /// JSON path, even when a value quotes a `{...}` fragment.
    fn json_object(&self, response: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::Labeled => None,
            Self::Json => extract_json_object(response),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level1Result {
    pub score: f64,
    pub explanation: String,
}

/// Parse a Level 1 answer (`SCORE: n | EXPLANATION: text` or JSON).
///
/// A JSON-mode answer without a JSON object is read as labeled text.
pub fn parse_level1(response: &str, format: ResponseFormat) -> Level1Result {
    if let Some(obj) = format.json_object(response) {
        return Level1Result {
            score: field_score(&obj, "score").unwrap_or(0.0),
            explanation: field_text(&obj, "explanation")
                .unwrap_or_else(|| truncate_chars(response, RAW_TEXT_LIMIT)),
        };
    }
    let sections = LabeledSections::parse(response, LEVEL1_LABELS);
    Level1Result {
        score: sections.number_or("SCORE", 0.0).clamp(0.0, 100.0),
        explanation: sections.text_or_raw("EXPLANATION", RAW_TEXT_LIMIT),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub risk_level: String,
    pub risk_factors: String,
    pub recommendations: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typologies: Option<String>,
}

/// Parse a Level 2 answer.
pub fn parse_level2(response: &str, format: ResponseFormat) -> RiskAssessment {
    parse_assessment(response, format, LEVEL2_LABELS, false)
}

/// Parse a retrieval-augmented answer (adds regulations and typologies).
pub fn parse_rag(response: &str, format: ResponseFormat) -> RiskAssessment {
    parse_assessment(response, format, RAG_LABELS, true)
}

fn parse_assessment(
    response: &str,
    format: ResponseFormat,
    labels: &[&str],
    with_citations: bool,
) -> RiskAssessment {
    if let Some(obj) = format.json_object(response) {
        let text = |key: &str, default: &str| {
            field_text(&obj, key).unwrap_or_else(|| default.to_string())
        };
        return RiskAssessment {
            score: field_score(&obj, "score").unwrap_or(0.0),
            risk_level: text("risk_level", "Unknown"),
            risk_factors: text("risk_factors", "N/A"),
            recommendations: text("recommendations", "N/A"),
            explanation: field_text(&obj, "explanation")
                .unwrap_or_else(|| truncate_chars(response, RAW_TEXT_LIMIT)),
            regulations: with_citations.then(|| text("regulations", "N/A")),
            typologies: with_citations.then(|| text("typologies", "N/A")),
        };
    }

    let sections = LabeledSections::parse(response, labels);
    RiskAssessment {
        score: sections.number_or("SCORE", 0.0).clamp(0.0, 100.0),
        risk_level: sections.text_or("RISK_LEVEL", "Unknown"),
        risk_factors: sections.text_or("RISK_FACTORS", "N/A"),
        recommendations: sections.text_or("RECOMMENDATIONS", "N/A"),
        explanation: sections.text_or_raw("EXPLANATION", RAW_TEXT_LIMIT),
        regulations: with_citations.then(|| sections.text_or("REGULATIONS", "N/A")),
        typologies: with_citations.then(|| sections.text_or("TYPOLOGIES", "N/A")),
    }
}

/// Append answer-format instructions for `format`.
fn answer_in(prompt: PromptBuilder, format: ResponseFormat, labels: &[(&str, &str)]) -> PromptBuilder {
    match format {
        ResponseFormat::Labeled => prompt
            .response_format(labels)
            .line("Answer ONLY in the above format."),
        ResponseFormat::Json => {
            let keys: Vec<String> = labels
                .iter()
                .map(|(label, hint)| format!("\"{}\" ({hint})", label.to_lowercase()))
                .collect();
            prompt.line(&format!(
                "Respond in JSON with: {}. Lists must be strings joined with semicolons.",
                keys.join(", ")
            ))
        }
    }
}

pub struct Level1Stage {
    pub format: ResponseFormat,
}

impl Stage for Level1Stage {
    fn name(&self) -> &str {
        "level1"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let tx = Transaction::from_context(&env.context.data, self.name())?;
        let prompt = PromptBuilder::role("AML screening expert")
            .line("Analyze this transaction for potential money laundering risks.")
            .steps(
                "Focus on basic red flags",
                &[
                    "High-value transactions (over 100,000)",
                    "Transactions to high-risk countries",
                    "Suspicious transaction patterns",
                ],
            )
            .line(&format_transaction(&tx))
            .line("Provide a risk score (0-100) and a brief explanation of any concerns.");
        let prompt = match self.format {
            ResponseFormat::Labeled => {
                prompt.line("Format your response as: SCORE: [number] | EXPLANATION: [text]")
            }
            ResponseFormat::Json => answer_in(
                prompt,
                self.format,
                &[("SCORE", "number"), ("EXPLANATION", "string")],
            ),
        }
        .build();

        let response = env.complete(&prompt, &self.format.options())?;
        let result = parse_level1(&response, self.format);

        let mut output = StageOutput::new(risk_level(result.score), response)
            .with("l1_score", result.score)
            .with("l1_explanation", result.explanation);
        if let Some(flag) = score_flag("Level 1", result.score) {
            output = output.flag(flag);
        }
        Ok(output)
    }
}

pub struct RetrievalStage {
    pub format: ResponseFormat,
}

impl Stage for RetrievalStage {
    fn name(&self) -> &str {
        "rag"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let tx = Transaction::from_context(&env.context.data, self.name())?;
        let retrieved = field_or_na(&env.context.data, "retrieved_context");

        let prompt = PromptBuilder::role("AML expert")
            .line("Use the following retrieved context to inform your analysis.")
            .line(&retrieved)
            .line(&format_transaction(&tx))
            .steps(
                "Provide a detailed analysis with",
                &[
                    "Risk score (0-100)",
                    "Risk level (Low/Medium/High)",
                    "Applicable regulations, citing the context",
                    "Potential typologies, citing the context",
                    "Risk factors",
                    "Recommended actions",
                    "An explanation naming the context entries that contributed",
                ],
            );
        let prompt = answer_in(
            prompt,
            self.format,
            &[
                ("SCORE", "number"),
                ("RISK_LEVEL", "Low/Medium/High"),
                ("REGULATIONS", "list with citations"),
                ("TYPOLOGIES", "list with citations"),
                ("RISK_FACTORS", "list of factors"),
                ("RECOMMENDATIONS", "list of actions"),
                ("EXPLANATION", "explanation with citations"),
            ],
        )
        .build();

        let response = env.complete(&prompt, &self.format.options())?;
        let result = parse_rag(&response, self.format);

        let mut output = StageOutput::new(risk_level(result.score), response)
            .with("rag_score", result.score)
            .with("rag_risk_level", result.risk_level)
            .with("regulations", result.regulations.unwrap_or_default())
            .with("typologies", result.typologies.unwrap_or_default());
        if let Some(flag) = score_flag("Retrieval analysis", result.score) {
            output = output.flag(flag);
        }
        Ok(output)
    }
}

pub struct Level2Stage {
    pub format: ResponseFormat,
}

impl Stage for Level2Stage {
    fn name(&self) -> &str {
        "level2"
    }

    fn run(&self, env: &StageEnv<'_>) -> Result<StageOutput, PipelineError> {
        let tx = Transaction::from_context(&env.context.data, self.name())?;
        let data = &env.context.data;
        let related = field_or_na(data, "related_transactions");

        let prompt = PromptBuilder::role("AML expert performing enhanced due diligence")
            .line(
                "Analyze this transaction and its related transactions for complex \
                 money laundering patterns.",
            )
            .steps(
                "Consider",
                &[
                    "Transaction patterns and relationships",
                    "Customer behavior analysis",
                    "Geographic risk factors",
                    "Transaction purpose analysis",
                    "Structuring or layering indicators",
                ],
            )
            .section("Main transaction", &format_transaction(&tx))
            .section("Related transactions", &related)
            .fields(
                "Earlier screening",
                data,
                &[
                    ("l1_score", "Level 1 score"),
                    ("rag_score", "Retrieval score"),
                    ("typologies", "Candidate typologies"),
                ],
            );
        let prompt = answer_in(
            prompt,
            self.format,
            &[
                ("SCORE", "number"),
                ("RISK_LEVEL", "Low/Medium/High"),
                ("RISK_FACTORS", "list of factors"),
                ("RECOMMENDATIONS", "list of actions"),
                ("EXPLANATION", "detailed explanation and reasoning"),
            ],
        )
        .build();

        let response = env.complete(&prompt, &self.format.options())?;
        let result = parse_level2(&response, self.format);

        let mut output = StageOutput::new(risk_level(result.score), response)
            .with("l2_score", result.score);
        if let Some(flag) = score_flag("Level 2", result.score) {
            output = output.flag(flag);
        }
        Ok(output)
    }
}

pub fn screening_runner(model: &str, format: ResponseFormat) -> StageRunner {
    StageRunner::new("screening", model)
        .with_stage(Level1Stage { format })
        .with_stage(RetrievalStage { format })
        .with_stage(Level2Stage { format })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningRequest {
    pub transaction: Transaction,
    /// Transaction history searched for related activity.
    #[serde(default)]
    pub history: Vec<Transaction>,
    #[serde(default)]
    pub format: ResponseFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningReport {
    pub item_id: String,
    pub transaction_id: String,
    pub level1: Level1Result,
    pub rag: RiskAssessment,
    pub level2: RiskAssessment,
    /// Highest of the three stage scores.
    pub final_score: f64,
    pub risk_level: String,
    pub related_count: usize,
    pub context_source: String,
}

/// Run collaborative screening for one transaction.
pub fn screen(core: &CoreState, request: &ScreeningRequest) -> Result<ScreeningReport, PipelineError> {
    let tx = &request.transaction;
    tx.validate()?;

    let related = find_related_transactions(tx, &request.history);
    let related_text = related
        .iter()
        .map(|r| format_transaction(r))
        .collect::<Vec<_>>()
        .join("\n\n");

    let query = format!(
        "Transaction: {} Amount: {} Country: {} Type: {} Purpose: {}",
        tx.transaction_id, tx.amount, tx.country, tx.transaction_type, tx.purpose
    );
    let retrieved = core.retriever().retrieve(&query, "rag", CONTEXT_CHUNKS);

    let mut data = tx.to_context();
    data.insert("related_transactions".into(), related_text.into());
    data.insert("retrieved_context".into(), format_context(&retrieved).into());

    let item_id = super::short_id(ID_PREFIX, &super::slug(&tx.transaction_id));
    core.store().create(&item_id, data)?;
    tracing::info!(
        item_id = %item_id,
        transaction_id = %tx.transaction_id,
        related = related.len(),
        chunks = retrieved.chunks.len(),
        "Screening transaction"
    );

    let outcome = screening_runner(&core.config().screening_model, request.format).run(
        core.store(),
        core.completion(),
        &item_id,
    )?;

    let rationale = |stage: &str| {
        outcome
            .stage(stage)
            .map(|s| s.rationale.as_str())
            .unwrap_or_default()
    };
    let format = request.format;
    let level1 = parse_level1(rationale("level1"), format);
    let rag = parse_rag(rationale("rag"), format);
    let level2 = parse_level2(rationale("level2"), format);
    let final_score = level1.score.max(rag.score).max(level2.score);

    Ok(ScreeningReport {
        item_id,
        transaction_id: tx.transaction_id.clone(),
        risk_level: risk_level(final_score).to_string(),
        final_score,
        level1,
        rag,
        level2,
        related_count: related.len(),
        context_source: retrieved.external.source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::tests::core_with;
    use crate::pipeline::completion::MockCompletion;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn tx(id: &str, sender: &str, receiver: &str, day: u32) -> Transaction {
        Transaction {
            transaction_id: id.into(),
            amount: 9_500.0,
            currency: "USD".into(),
            sender_name: "Alice".into(),
            sender_account: sender.into(),
            receiver_name: "Bob".into(),
            receiver_account: receiver.into(),
            transaction_type: "wire".into(),
            country: "Freedonia".into(),
            purpose: "consulting".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn level1_pipe_format() {
        let result = parse_level1(
            "SCORE: 85 | EXPLANATION: High-value wire to a high-risk country.",
            ResponseFormat::Labeled,
        );
        assert_eq!(result.score, 85.0);
        assert_eq!(result.explanation, "High-value wire to a high-risk country.");
    }

    #[test]
    fn level1_unparseable_defaults() {
        let result = parse_level1("I cannot assess this.", ResponseFormat::Labeled);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.explanation, "I cannot assess this.");
    }

    #[test]
    fn level1_json_mode() {
        let result = parse_level1(
            r#"{"score": 140, "explanation": "round amounts"}"#,
            ResponseFormat::Json,
        );
        assert_eq!(result.score, 100.0);
        assert_eq!(result.explanation, "round amounts");
    }

    #[test]
    fn level2_labeled() {
        let text = "SCORE: 72\nRISK_LEVEL: High\nRISK_FACTORS: structuring; new account\nRECOMMENDATIONS: escalate\nEXPLANATION: repeated sub-threshold wires";
        let result = parse_level2(text, ResponseFormat::Labeled);
        assert_eq!(result.score, 72.0);
        assert_eq!(result.risk_level, "High");
        assert_eq!(result.risk_factors, "structuring; new account");
        assert!(result.regulations.is_none());
        assert_eq!(parse_level2(text, ResponseFormat::Labeled), result);
    }

    #[test]
    fn level2_defaults() {
        let raw = "x".repeat(700);
        let result = parse_level2(&raw, ResponseFormat::Labeled);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.risk_level, "Unknown");
        assert_eq!(result.risk_factors, "N/A");
        assert_eq!(result.recommendations, "N/A");
        assert_eq!(result.explanation.len(), 500);
    }

    #[test]
    fn level2_json_lists_join() {
        let result = parse_level2(
            r#"```json
{"score": 55, "risk_level": "Medium", "risk_factors": ["cash", "offshore"], "recommendations": "verify"}
```"#,
            ResponseFormat::Json,
        );
        assert_eq!(result.score, 55.0);
        assert_eq!(result.risk_factors, "cash; offshore");
        assert_eq!(result.recommendations, "verify");
    }

    #[test]
    fn labeled_answer_quoting_braces_keeps_labels() {
        let l1 = parse_level1(
            r#"SCORE: 85 | EXPLANATION: Memo field reads {"ref": "INV-9"} on a round amount."#,
            ResponseFormat::Labeled,
        );
        assert_eq!(l1.score, 85.0);
        assert!(l1.explanation.starts_with("Memo field reads"));

        let l2 = parse_level2(
            "SCORE: 72\nRISK_LEVEL: High\nRISK_FACTORS: memo {\"note\": \"x\"}\nEXPLANATION: layered",
            ResponseFormat::Labeled,
        );
        assert_eq!(l2.score, 72.0);
        assert_eq!(l2.risk_level, "High");
        assert_eq!(l2.risk_factors, r#"memo {"note": "x"}"#);
    }

    #[test]
    fn json_mode_without_object_reads_labels() {
        let result = parse_level1("SCORE: 50 | EXPLANATION: plain text", ResponseFormat::Json);
        assert_eq!(result.score, 50.0);
        assert_eq!(result.explanation, "plain text");
    }

    #[test]
    fn rag_includes_citations() {
        let result = parse_rag(
            "SCORE: 60\nREGULATIONS: BSA [regulations]\nTYPOLOGIES: Smurfing\nEXPLANATION: cited",
            ResponseFormat::Labeled,
        );
        assert_eq!(result.regulations.as_deref(), Some("BSA [regulations]"));
        assert_eq!(result.typologies.as_deref(), Some("Smurfing"));
        assert_eq!(result.risk_level, "Unknown");
    }

    #[test]
    fn related_by_account_newest_first() {
        let target = tx("T0", "S1", "R1", 10);
        let all = vec![
            target.clone(),
            tx("T1", "S1", "R9", 1),
            tx("T2", "S9", "R1", 5),
            tx("T3", "S9", "R9", 6),
            tx("T4", "S1", "R1", 3),
        ];
        let ids: Vec<_> = find_related_transactions(&target, &all)
            .iter()
            .map(|t| t.transaction_id.as_str())
            .collect();
        assert_eq!(ids, vec!["T2", "T4", "T1"]);
    }

    #[test]
    fn related_capped_at_five() {
        let target = tx("T0", "S1", "R1", 28);
        let all: Vec<_> = (1..=8).map(|d| tx(&format!("T{d}"), "S1", "RX", d)).collect();
        let related = find_related_transactions(&target, &all);
        assert_eq!(related.len(), MAX_RELATED);
        assert_eq!(related[0].transaction_id, "T8");
    }

    #[test]
    fn risk_bands() {
        assert_eq!(risk_level(70.0), "High");
        assert_eq!(risk_level(40.0), "Medium");
        assert_eq!(risk_level(39.9), "Low");
        assert!(score_flag("L1", 10.0).is_none());
        assert_eq!(score_flag("L1", 75.0).unwrap().severity, Severity::High);
    }

    #[test]
    fn format_transaction_layout() {
        let text = format_transaction(&tx("T0", "S1", "R1", 1));
        assert!(text.starts_with("Transaction Details:\nID: T0"));
        assert!(text.contains("Amount: 9500 USD"));
        assert!(text.contains("Sender: Alice (S1)"));
    }

    #[test]
    fn collaborative_screening_takes_max_score() {
        let mock = Arc::new(
            MockCompletion::new("")
                .when("AML screening expert", "SCORE: 30 | EXPLANATION: moderate amount")
                .when("retrieved context", "SCORE: 80\nRISK_LEVEL: High\nREGULATIONS: BSA\nTYPOLOGIES: Smurfing\nEXPLANATION: matches")
                .when("enhanced due diligence", "SCORE: 65\nRISK_LEVEL: Medium\nRISK_FACTORS: pattern\nRECOMMENDATIONS: monitor\nEXPLANATION: ok"),
        );
        let core = core_with(mock.clone());
        let target = tx("T0", "S1", "R1", 10);
        let request = ScreeningRequest {
            history: vec![tx("T1", "S1", "R2", 2)],
            transaction: target,
            format: ResponseFormat::Labeled,
        };

        let report = screen(&core, &request).unwrap();
        assert_eq!(report.level1.score, 30.0);
        assert_eq!(report.rag.score, 80.0);
        assert_eq!(report.level2.score, 65.0);
        assert_eq!(report.final_score, 80.0);
        assert_eq!(report.risk_level, "High");
        assert_eq!(report.related_count, 1);
        assert_eq!(report.context_source, "local");
        assert!(report.item_id.starts_with("SC-T0-"));

        let history = core.store().get_history(&report.item_id).unwrap();
        assert_eq!(history.handoffs.len(), 2);
        // rag (80, high) and level2 (65, medium) raise flags; level1 (30) does not
        assert_eq!(history.flags.len(), 2);

        let l2_prompt = &mock.calls()[2].prompt;
        assert!(l2_prompt.contains("Level 1 score: 30"));
        assert!(l2_prompt.contains("ID: T1"));
    }

    #[test]
    fn json_mode_prompts_ask_for_json() {
        let mock = Arc::new(MockCompletion::new(r#"{"score": 10, "explanation": "low"}"#));
        let core = core_with(mock.clone());
        let request = ScreeningRequest {
            transaction: tx("T0", "S1", "R1", 10),
            history: vec![],
            format: ResponseFormat::Json,
        };
        let report = screen(&core, &request).unwrap();
        assert_eq!(report.final_score, 10.0);
        assert!(mock.calls().iter().all(|c| c.prompt.contains("Respond in JSON")));
    }

    #[test]
    fn invalid_transaction_creates_nothing() {
        let core = core_with(Arc::new(MockCompletion::new("")));
        let mut bad = tx("", "S1", "R1", 1);
        bad.amount = -5.0;
        let err = screen(
            &core,
            &ScreeningRequest {
                transaction: bad,
                history: vec![],
                format: ResponseFormat::Labeled,
            },
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(core.store().is_empty().unwrap());
    }
}
