//! Analysis record: the evolving verdict on one document for one viewpoint.
//!
//! Model output arrives as an untyped JSON object. [`AnalysisRecord`] pulls
//! the fields the pipeline depends on into typed slots and keeps every other
//! key in an explicit `extra` bag that is carried but never interpreted.
//!
//! Invariant: after construction and after every mutation through this
//! type's methods, `relevance_score == scores["relevance"]` and both
//! `relevance` and `total` exist in `scores`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::score::{normalize_score, to_integer_score};

/// Score dimension governing the debate.
pub const RELEVANCE: &str = "relevance";
/// Overall weighted score dimension.
pub const TOTAL: &str = "total";

/// Scores keyed by dimension name, each an integer in [0, 10].
pub type ScoreMap = BTreeMap<String, u8>;

/// Structured analysis of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub scores: ScoreMap,
    pub relevance_score: u8,
    #[serde(default)]
    pub match_reasoning: String,
    #[serde(default)]
    pub sub_field: String,
    #[serde(default)]
    pub problem_def: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub method_keywords: String,
    #[serde(default)]
    pub algorithm_summary: String,
    #[serde(default)]
    pub experiments: String,
    #[serde(default)]
    pub limitations: String,
    #[serde(default)]
    pub critique: String,
    #[serde(default)]
    pub datasets: String,
    #[serde(default)]
    pub others: String,
    #[serde(default)]
    pub evidence_quotes: Vec<String>,
    /// Analyst's rebuttal for the most recent round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<String>,
    /// Keys the model emitted that the pipeline does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const NARRATIVE_KEYS: [&str; 11] = [
    "match_reasoning",
    "sub_field",
    "problem_def",
    "methodology",
    "method_keywords",
    "algorithm_summary",
    "experiments",
    "limitations",
    "critique",
    "datasets",
    "others",
];

impl AnalysisRecord {
    /// Build a record from a parsed model object.
    ///
    /// A nested `scores` mapping wins; without one, the scalar
    /// `relevance_score` seeds both `relevance` and `total`.
    pub fn from_model_output(mut raw: Map<String, Value>) -> Self {
        let scores = match raw.remove("scores") {
            Some(Value::Object(map)) => {
                let relevance = to_integer_score(normalize_score(&Value::Object(map.clone())));
                let mut scores: ScoreMap = map
                    .iter()
                    .map(|(k, v)| (k.clone(), to_integer_score(normalize_score(v))))
                    .collect();
                scores.insert(RELEVANCE.to_string(), relevance);
                scores
            }
            _ => {
                let scalar = raw.get("relevance_score").cloned().unwrap_or(Value::Null);
                let relevance = to_integer_score(normalize_score(&scalar));
                ScoreMap::from([(RELEVANCE.to_string(), relevance), (TOTAL.to_string(), relevance)])
            }
        };
        raw.remove("relevance_score");

        let mut text = |key: &str| raw.remove(key).map(text_of).unwrap_or_default();
        let match_reasoning = text("match_reasoning");
        let sub_field = text("sub_field");
        let problem_def = text("problem_def");
        let methodology = text("methodology");
        let method_keywords = text("method_keywords");
        let algorithm_summary = text("algorithm_summary");
        let experiments = text("experiments");
        let limitations = text("limitations");
        let critique = text("critique");
        let datasets = text("datasets");
        let others = text("others");

        let evidence_quotes = raw.remove("evidence_quotes").map(list_of).unwrap_or_default();
        let defense = raw
            .remove("defense")
            .map(text_of)
            .filter(|d| !d.trim().is_empty());

        let mut record = Self {
            scores,
            relevance_score: 0,
            match_reasoning,
            sub_field,
            problem_def,
            methodology,
            method_keywords,
            algorithm_summary,
            experiments,
            limitations,
            critique,
            datasets,
            others,
            evidence_quotes,
            defense,
            extra: raw,
        };
        record.sync_scores();
        record
    }

    /// Synthetic record for paths that have no usable analysis.
    ///
    /// Scores are zeroed and every narrative field carries `reason`.
    pub fn error(reason: &str) -> Self {
        let mut raw = Map::new();
        for key in NARRATIVE_KEYS {
            raw.insert(key.to_string(), Value::String(reason.to_string()));
        }
        raw.insert("relevance_score".to_string(), Value::from(0));
        Self::from_model_output(raw)
    }

    /// Re-establish the score invariant.
    ///
    /// `relevance` falls back to `total` (then 0) when missing, `total`
    /// falls back to `relevance`, and the scalar mirrors `relevance`.
    pub fn sync_scores(&mut self) {
        let relevance = match self.scores.get(RELEVANCE) {
            Some(r) => *r,
            None => self.scores.get(TOTAL).copied().unwrap_or(0),
        };
        self.scores.insert(RELEVANCE.to_string(), relevance.min(10));
        self.scores.entry(TOTAL.to_string()).or_insert(relevance);
        for score in self.scores.values_mut() {
            *score = (*score).min(10);
        }
        self.relevance_score = self.scores[RELEVANCE];
    }

    /// Overwrite `relevance` and `total` with a reviewer's correction.
    pub fn apply_score_correction(&mut self, score: f64) {
        let corrected = to_integer_score(score);
        self.scores.insert(RELEVANCE.to_string(), corrected);
        self.scores.insert(TOTAL.to_string(), corrected);
        self.sync_scores();
    }

    /// Governing relevance as a float for threshold comparisons.
    pub fn relevance(&self) -> f64 {
        f64::from(self.relevance_score)
    }

    /// Whether the scalar and the nested relevance agree.
    pub fn scores_in_sync(&self) -> bool {
        self.scores.get(RELEVANCE) == Some(&self.relevance_score)
            && self.scores.contains_key(TOTAL)
    }

    /// One line per score dimension, for progress messages.
    pub fn scores_display(&self) -> String {
        self.scores
            .iter()
            .map(|(k, v)| format!("- {}: {}/10", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON view used in prompts and event payloads.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn text_of(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Array(items) => items
            .into_iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn list_of(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Null => Vec::new(),
        other => {
            let single = text_of(other);
            if single.is_empty() {
                Vec::new()
            } else {
                vec![single]
            }
        }
    }
}
