//! LLM-backed analyst.

use std::sync::Arc;

use async_trait::async_trait;
use coordination::{AnalysisRecord, EvidenceSnippet, RetryPolicy};

use super::{expect_object, string_list, Analyst, Document, ViewpointAnalysis};
use crate::batch::ScreenedDocument;
use crate::config::TextLimits;
use crate::llm::{call_structured, CallError, ChatMessage, ModelClient};
use crate::prompts::{self, truncate_chars};
use crate::synthesis::Synthesis;

/// Analyst that prompts a chat model and recovers structured replies.
pub struct LlmAnalyst {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    limits: TextLimits,
}

impl LlmAnalyst {
    pub fn new(client: Arc<dyn ModelClient>, retry: RetryPolicy, limits: TextLimits) -> Self {
        Self {
            client,
            retry,
            limits,
        }
    }

    async fn ask(&self, label: &str, prompt: String) -> Result<serde_json::Value, CallError> {
        let messages = [
            ChatMessage::system(prompts::ANALYST_PREAMBLE),
            ChatMessage::user(prompt),
        ];
        call_structured(self.client.as_ref(), &self.retry, label, &messages).await
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    async fn propose(
        &self,
        viewpoint: &str,
        document: &Document,
    ) -> Result<AnalysisRecord, CallError> {
        let text = truncate_chars(&document.text, self.limits.initial_chars);
        let prompt = prompts::initial_analysis(viewpoint, &document.title, text);
        let raw = expect_object(self.ask("analyst.propose", prompt).await?)?;
        Ok(AnalysisRecord::from_model_output(raw))
    }

    async fn revise(
        &self,
        document: &Document,
        current: &AnalysisRecord,
        critique: &str,
        evidence: &[EvidenceSnippet],
    ) -> Result<AnalysisRecord, CallError> {
        let text = truncate_chars(&document.text, self.limits.review_chars);
        let prompt = prompts::revision(current, critique, text, evidence);
        let raw = expect_object(self.ask("analyst.revise", prompt).await?)?;
        Ok(AnalysisRecord::from_model_output(raw))
    }

    async fn follow_up_queries(
        &self,
        viewpoint: &str,
        questions: &[String],
        max_queries: usize,
    ) -> Result<Vec<String>, CallError> {
        let prompt = prompts::follow_up_queries(viewpoint, questions, max_queries);
        let value = self.ask("analyst.follow_up", prompt).await?;
        let queries = match &value {
            serde_json::Value::Array(_) => string_list(Some(&value)),
            _ => string_list(value.get("queries")),
        };
        Ok(queries.into_iter().take(max_queries).collect())
    }

    async fn analyze_viewpoint(&self, text: &str) -> Result<ViewpointAnalysis, CallError> {
        let prompt = prompts::viewpoint_analysis(truncate_chars(text, self.limits.viewpoint_chars));
        let raw = expect_object(self.ask("analyst.viewpoint", prompt).await?)?;
        let text_field = |key: &str| {
            raw.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        Ok(ViewpointAnalysis {
            core_contribution: text_field("core_contribution"),
            key_viewpoint: text_field("key_viewpoint"),
            search_queries: string_list(raw.get("search_queries")),
            english_keywords: string_list(raw.get("english_keywords")),
            cot_reasoning: text_field("cot_reasoning"),
        })
    }

    async fn synthesize(
        &self,
        viewpoint: &str,
        papers: &[ScreenedDocument],
        previous: Option<(&Synthesis, &str)>,
    ) -> Result<Synthesis, CallError> {
        let summary = papers
            .iter()
            .map(|p| {
                format!(
                    "- {}: {} | Method: {}",
                    p.document.title,
                    or_na(&p.record.problem_def),
                    or_na(&p.record.methodology)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let previous_json = previous.map(|(draft, critique)| {
            (serde_json::to_string(draft).unwrap_or_default(), critique)
        });
        let prompt = prompts::synthesis(
            viewpoint,
            &summary,
            previous_json.as_ref().map(|(d, c)| (d.as_str(), *c)),
        );
        let raw = expect_object(self.ask("analyst.synthesize", prompt).await?)?;
        Ok(Synthesis::from_model_output(&raw))
    }
}

fn or_na(text: &str) -> &str {
    if text.trim().is_empty() {
        "N/A"
    } else {
        text
    }
}
