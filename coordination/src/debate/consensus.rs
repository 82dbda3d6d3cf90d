//! Reviewer verdicts and the rejection-by-consensus rule.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::score::{normalize_score, to_integer_score};

/// Output of one reviewer call. Produced and consumed within a single round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Terminal approval signal.
    pub is_approved: bool,
    /// Feedback for the analyst; always non-empty when not approved.
    pub critique: String,
    /// Normalized relevance override, if the reviewer gave one.
    pub score_correction: Option<f64>,
    /// Open doubts that must be investigated before a rejection.
    pub questions: Vec<String>,
}

/// Placeholder critique when a disapproving reviewer gave none.
pub const MISSING_CRITIQUE: &str = "Reviewer did not approve but gave no critique.";

impl ReviewVerdict {
    /// Approving verdict without correction.
    pub fn approve() -> Self {
        Self {
            is_approved: true,
            critique: String::new(),
            score_correction: None,
            questions: Vec::new(),
        }
    }

    /// Disapproving verdict with a critique.
    pub fn request_changes(critique: &str) -> Self {
        Self {
            is_approved: false,
            critique: critique.to_string(),
            score_correction: None,
            questions: Vec::new(),
        }
    }

    pub fn with_score_correction(mut self, score: f64) -> Self {
        self.score_correction = Some(integer_correction(score));
        self
    }

    pub fn with_questions<I, S>(mut self, questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.questions = questions.into_iter().map(Into::into).collect();
        self
    }

    /// Build a verdict from a parsed reviewer object.
    ///
    /// `is_approved` accepts booleans, `"true"`/`"yes"`/`"approved"` strings
    /// and non-zero numbers; anything else is a disapproval. A non-null
    /// `score_correction` is normalized (garbage becomes 0) and rounded to
    /// the integer the record will store.
    pub fn from_model_output(raw: &Map<String, Value>) -> Self {
        let is_approved = raw.get("is_approved").map(truthy).unwrap_or(false);

        let mut critique = match raw.get("critique") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        if !is_approved && critique.is_empty() {
            critique = MISSING_CRITIQUE.to_string();
        }

        let score_correction = raw
            .get("score_correction")
            .filter(|v| !v.is_null())
            .map(|v| integer_correction(normalize_score(v)));

        let questions = match raw.get("questions") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|q| match q {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|q| !q.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };

        Self {
            is_approved,
            critique,
            score_correction,
            questions,
        }
    }

    pub fn has_questions(&self) -> bool {
        !self.questions.is_empty()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "approved" | "approve"
        ),
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        _ => false,
    }
}

/// Corrections land in the record as integers; the consensus rule must see
/// the same number.
fn integer_correction(score: f64) -> f64 {
    f64::from(to_integer_score(score))
}

/// Rule for ending a debate early when both roles agree the document is
/// irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusPolicy {
    /// Scores strictly below this value count as "irrelevant" (0–10 scale).
    pub rejection_threshold: f64,
}

impl ConsensusPolicy {
    /// Whether the round ends in rejection.
    ///
    /// Requires a reviewer score, both scores below the threshold, and no
    /// outstanding questions: an open doubt is investigated before discard.
    pub fn is_consensus_rejection(
        &self,
        advisor_score: Option<f64>,
        analyst_score: f64,
        has_questions: bool,
    ) -> bool {
        match advisor_score {
            Some(advisor) => {
                advisor < self.rejection_threshold
                    && analyst_score < self.rejection_threshold
                    && !has_questions
            }
            None => false,
        }
    }
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            rejection_threshold: 5.0,
        }
    }
}
