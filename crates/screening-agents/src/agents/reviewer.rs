//! LLM-backed reviewer.
//!
//! The reviewer never sees tools; it receives the record and a bounded text
//! fragment via prompt and answers with a verdict object.

use std::sync::Arc;

use async_trait::async_trait;
use coordination::{AnalysisRecord, RetryPolicy, ReviewVerdict};

use super::{expect_object, Document, Reviewer};
use crate::config::TextLimits;
use crate::llm::{call_structured, CallError, ChatMessage, ModelClient};
use crate::prompts::{self, truncate_chars};
use crate::synthesis::{Synthesis, SynthesisReview};

/// Reviewer that prompts a chat model and recovers structured verdicts.
pub struct LlmReviewer {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    limits: TextLimits,
}

impl LlmReviewer {
    pub fn new(client: Arc<dyn ModelClient>, retry: RetryPolicy, limits: TextLimits) -> Self {
        Self {
            client,
            retry,
            limits,
        }
    }

    async fn ask(&self, label: &str, prompt: String) -> Result<serde_json::Value, CallError> {
        let messages = [
            ChatMessage::system(prompts::REVIEWER_PREAMBLE),
            ChatMessage::user(prompt),
        ];
        call_structured(self.client.as_ref(), &self.retry, label, &messages).await
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn critique(
        &self,
        viewpoint: &str,
        document: &Document,
        record: &AnalysisRecord,
        round: u32,
    ) -> Result<ReviewVerdict, CallError> {
        let text = truncate_chars(&document.text, self.limits.review_chars);
        let prompt = prompts::review(viewpoint, record, text, round);
        let raw = expect_object(self.ask("reviewer.critique", prompt).await?)?;
        Ok(ReviewVerdict::from_model_output(&raw))
    }

    async fn review_synthesis(
        &self,
        synthesis: &Synthesis,
        titles: &[String],
    ) -> Result<SynthesisReview, CallError> {
        let draft = serde_json::to_string(synthesis).unwrap_or_default();
        let prompt = prompts::synthesis_review(&draft, titles);
        let raw = expect_object(self.ask("reviewer.synthesis", prompt).await?)?;
        let verdict = ReviewVerdict::from_model_output(&raw);
        Ok(SynthesisReview {
            is_approved: verdict.is_approved,
            critique: verdict.critique,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl ModelClient for Canned {
        async fn chat(&self, _: &[ChatMessage], _: bool) -> Result<String, CallError> {
            Ok(self.0.to_string())
        }
    }

    fn reviewer(reply: &'static str) -> LlmReviewer {
        LlmReviewer::new(
            Arc::new(Canned(reply)),
            RetryPolicy::none(),
            TextLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_critique_parses_verdict() {
        let doc = Document::new("d1", "T", "text");
        let record = AnalysisRecord::error("n/a");
        let verdict = reviewer(
            "Sure! {\"is_approved\": false, \"critique\": \"No quotes.\", \"score_correction\": \"2\", \"questions\": [\"Is code public?\"]}",
        )
        .critique("v", &doc, &record, 0)
        .await
        .unwrap();

        assert!(!verdict.is_approved);
        assert_eq!(verdict.critique, "No quotes.");
        assert_eq!(verdict.score_correction, Some(2.0));
        assert_eq!(verdict.questions, vec!["Is code public?".to_string()]);
    }

    #[tokio::test]
    async fn test_critique_unparseable_is_error() {
        let doc = Document::new("d1", "T", "text");
        let record = AnalysisRecord::error("n/a");
        let err = reviewer("I refuse.")
            .critique("v", &doc, &record, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unparseable { .. }));
    }

    #[tokio::test]
    async fn test_review_synthesis_defaults_critique() {
        let synthesis = Synthesis::fallback();
        let review = reviewer("{'is_approved': False}")
            .review_synthesis(&synthesis, &["Paper A".into()])
            .await
            .unwrap();
        assert!(!review.is_approved);
        assert!(!review.critique.is_empty());
    }
}
