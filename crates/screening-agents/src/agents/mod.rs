//! Role adapters for the screening debate.
//!
//! [`Analyst`] and [`Reviewer`] are the seams between the runner and the
//! model: production uses the LLM-backed implementations in [`analyst`] and
//! [`reviewer`]; tests substitute scripted ones.

pub mod analyst;
pub mod reviewer;

use async_trait::async_trait;
use coordination::{AnalysisRecord, EvidenceSnippet, ReviewVerdict};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::batch::ScreenedDocument;
use crate::llm::CallError;
use crate::synthesis::{Synthesis, SynthesisReview};

pub use analyst::LlmAnalyst;
pub use reviewer::LlmReviewer;

/// A document to screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier; falls back to the title when empty.
    #[serde(default)]
    pub id: String,
    pub title: String,
    /// Already-extracted text (abstract or full text).
    #[serde(default, alias = "abstract", alias = "content")]
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// Identifier used in logs and sessions.
    pub fn label(&self) -> &str {
        if self.id.trim().is_empty() {
            &self.title
        } else {
            &self.id
        }
    }
}

/// Structured reading of the user's own research idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewpointAnalysis {
    #[serde(default)]
    pub core_contribution: String,
    #[serde(default)]
    pub key_viewpoint: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub english_keywords: Vec<String>,
    #[serde(default)]
    pub cot_reasoning: String,
}

impl ViewpointAnalysis {
    /// Degraded analysis built from the raw text alone.
    pub fn fallback(text: &str) -> Self {
        let head = |n: usize| text.chars().take(n).collect::<String>();
        Self {
            core_contribution: head(100),
            key_viewpoint: head(100),
            search_queries: vec![head(50)],
            english_keywords: Vec::new(),
            cot_reasoning: String::new(),
        }
    }
}

/// Produces and revises analysis records.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Initial analysis of `document` against `viewpoint`.
    async fn propose(
        &self,
        viewpoint: &str,
        document: &Document,
    ) -> Result<AnalysisRecord, CallError>;

    /// Full replacement record answering `critique`.
    async fn revise(
        &self,
        document: &Document,
        current: &AnalysisRecord,
        critique: &str,
        evidence: &[EvidenceSnippet],
    ) -> Result<AnalysisRecord, CallError>;

    /// Search queries (at most `max_queries`) answering reviewer questions.
    async fn follow_up_queries(
        &self,
        viewpoint: &str,
        questions: &[String],
        max_queries: usize,
    ) -> Result<Vec<String>, CallError>;

    async fn analyze_viewpoint(&self, text: &str) -> Result<ViewpointAnalysis, CallError>;

    /// Draft (or redraft against `previous`) a literature synthesis.
    async fn synthesize(
        &self,
        viewpoint: &str,
        papers: &[ScreenedDocument],
        previous: Option<(&Synthesis, &str)>,
    ) -> Result<Synthesis, CallError>;
}

/// Critiques analysis records and syntheses.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn critique(
        &self,
        viewpoint: &str,
        document: &Document,
        record: &AnalysisRecord,
        round: u32,
    ) -> Result<ReviewVerdict, CallError>;

    async fn review_synthesis(
        &self,
        synthesis: &Synthesis,
        titles: &[String],
    ) -> Result<SynthesisReview, CallError>;
}

/// Require a JSON object from a recovered value.
pub(crate) fn expect_object(value: Value) -> Result<Map<String, Value>, CallError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CallError::Unparseable {
            preview: format!("expected a JSON object, got {}", kind_of(&other)),
        }),
    }
}

/// Strings from a JSON array (non-strings stringified, blanks dropped).
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
