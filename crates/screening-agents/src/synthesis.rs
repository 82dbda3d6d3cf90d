//! Literature synthesis over accepted documents.
//!
//! The analyst drafts, then each round the reviewer critiques and the
//! analyst redrafts, until approval or the round budget runs out. Failures
//! degrade: an unparseable draft becomes the fallback synthesis, an
//! unparseable review counts as not approved.

use coordination::debate::{DebateEvent, EventKind, EventLog, Role};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::agents::{Analyst, Reviewer};
use crate::batch::ScreenedDocument;

/// Critique recorded when the reviewer's synthesis review could not be parsed.
pub const SYNTHESIS_REVIEW_FAILURE: &str =
    "System error: synthesis review could not be parsed; treating the draft as not approved.";

/// A literature synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    pub state_of_art_summary: String,
    pub gap_analysis: String,
    pub strategic_recommendations: String,
}

impl Synthesis {
    /// Placeholder used when drafting fails.
    pub fn fallback() -> Self {
        Self {
            state_of_art_summary: "Failed to synthesize.".into(),
            gap_analysis: "N/A".into(),
            strategic_recommendations: "N/A".into(),
        }
    }

    /// Build from a parsed model object; missing fields become "N/A".
    pub fn from_model_output(raw: &Map<String, Value>) -> Self {
        let field = |key: &str| match raw.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => "N/A".to_string(),
        };
        Self {
            state_of_art_summary: field("state_of_art_summary"),
            gap_analysis: field("gap_analysis"),
            strategic_recommendations: field("strategic_recommendations"),
        }
    }
}

/// Reviewer's verdict on a synthesis draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReview {
    pub is_approved: bool,
    pub critique: String,
}

/// Draft and review a synthesis of `accepted` for up to `rounds` reviews.
/// With `rounds == 0` the first draft is returned unreviewed.
///
/// Every rejected review is followed by a redraft, so the returned draft may
/// be one the reviewer has not seen.
///
/// Returns `None` for empty input. Events go to `log`.
pub async fn synthesize(
    analyst: &dyn Analyst,
    reviewer: &dyn Reviewer,
    viewpoint: &str,
    accepted: &[ScreenedDocument],
    rounds: u32,
    log: &mut EventLog,
) -> Option<Synthesis> {
    if accepted.is_empty() {
        return None;
    }
    info!(papers = accepted.len(), rounds, "synthesizing literature");
    log.emit(DebateEvent::info(format!(
        "[System] Synthesizing {} accepted paper(s).",
        accepted.len()
    )));

    let titles: Vec<String> = accepted.iter().map(|p| p.document.title.clone()).collect();
    let mut draft = draft_or_fallback(analyst, viewpoint, accepted, None).await;
    emit_draft(log, &draft, 0);

    for round in 0..rounds {
        let review = match reviewer.review_synthesis(&draft, &titles).await {
            Ok(review) => review,
            Err(e) => {
                warn!(error = %e, round, "synthesis review unparseable");
                SynthesisReview {
                    is_approved: false,
                    critique: SYNTHESIS_REVIEW_FAILURE.to_string(),
                }
            }
        };

        if review.is_approved {
            log.emit(DebateEvent::new(
                Role::Reviewer,
                EventKind::Approval,
                "[Reviewer Decision] Synthesis approved.",
            ));
            break;
        }

        log.emit(DebateEvent::new(
            Role::Reviewer,
            EventKind::Critique,
            format!(
                "[Reviewer Synthesis Critique (Round {})]\n\n{}",
                round + 1,
                review.critique
            ),
        ));

        draft = draft_or_fallback(analyst, viewpoint, accepted, Some((&draft, &review.critique)))
            .await;
        emit_draft(log, &draft, round + 1);
    }

    Some(draft)
}

async fn draft_or_fallback(
    analyst: &dyn Analyst,
    viewpoint: &str,
    accepted: &[ScreenedDocument],
    previous: Option<(&Synthesis, &str)>,
) -> Synthesis {
    match analyst.synthesize(viewpoint, accepted, previous).await {
        Ok(draft) => draft,
        Err(e) => {
            warn!(error = %e, "synthesis unparseable, using fallback");
            Synthesis::fallback()
        }
    }
}

fn emit_draft(log: &mut EventLog, draft: &Synthesis, revision: u32) {
    let (kind, heading) = if revision == 0 {
        (EventKind::Synthesis, "[Analyst Synthesis]".to_string())
    } else {
        (
            EventKind::Revision,
            format!("[Analyst Synthesis Revision (Round {})]", revision),
        )
    };
    log.emit(
        DebateEvent::new(
            Role::Analyst,
            kind,
            format!("{}\n\nGap analysis: {}", heading, draft.gap_analysis),
        )
        .with_data(serde_json::to_value(draft).unwrap_or(Value::Null)),
    );
}
