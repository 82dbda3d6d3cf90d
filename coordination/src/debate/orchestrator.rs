//! Debate orchestrator: drives the analyst→reviewer loop for one document.
//!
//! The orchestrator is a synchronous state machine: it never calls a model
//! itself. A driver asks [`DebateOrchestrator::next_action`] what is needed,
//! performs the call, and feeds the parsed result back through one of the
//! `submit_*` methods. `None` submissions mean the model output could not be
//! parsed and select the failure paths.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::consensus::{ConsensusPolicy, ReviewVerdict};
use super::events::{DebateEvent, EventKind, EventLog, Role, SharedEventSink};
use super::evidence::EvidenceSnippet;
use super::state::{DebatePhase, DebateSession, RoundRecord, TerminalState, TransitionError};
use crate::analysis::AnalysisRecord;

/// Critique recorded when the reviewer's output could not be parsed.
pub const REVIEW_FAILURE_CRITIQUE: &str =
    "System error: reviewer output could not be parsed; rejecting to stay safe.";

/// Reason carried by the error record when the initial analysis failed.
pub const INITIAL_FAILURE_REASON: &str = "Analysis failed: model output could not be parsed.";

/// Configuration for the debate orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Maximum reviewer rounds (clamped to at least 1).
    pub max_rounds: u32,
    /// Consensus rejection rule.
    pub consensus: ConsensusPolicy,
    /// Cap on follow-up search queries per round.
    pub max_followup_queries: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 6,
            consensus: ConsensusPolicy::default(),
            max_followup_queries: 3,
        }
    }
}

/// What the orchestrator expects next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Waiting for the analyst's first record.
    AwaitInitialAnalysis,
    /// Waiting for the reviewer to evaluate the current record.
    AwaitReview,
    /// Reviewer raised questions; run a follow-up search.
    AwaitEvidence {
        questions: Vec<String>,
        max_queries: usize,
    },
    /// Waiting for the analyst to revise against a critique.
    AwaitRevision {
        critique: String,
        new_evidence: Vec<EvidenceSnippet>,
    },
    /// Debate is complete: call `outcome()`.
    Complete,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitInitialAnalysis => write!(f, "await_initial_analysis"),
            Self::AwaitReview => write!(f, "await_review"),
            Self::AwaitEvidence { .. } => write!(f, "await_evidence"),
            Self::AwaitRevision { .. } => write!(f, "await_revision"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Error from the debate orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebateError {
    #[error("transition failed: {0}")]
    Transition(#[from] TransitionError),

    #[error("debate already complete")]
    AlreadyComplete,

    #[error("debate already started")]
    AlreadyStarted,

    #[error("debate not complete (next action: {0})")]
    NotComplete(String),

    #[error("unexpected submission: expected {expected}, got {actual}")]
    UnexpectedSubmission { expected: String, actual: String },
}

/// Outcome of a completed debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub terminal: TerminalState,
    /// Record current when the terminal state was reached.
    pub record: AnalysisRecord,
    /// Reviewer rounds recorded.
    pub rounds_completed: u32,
    pub review_calls: u32,
    pub revision_calls: u32,
    /// Events in emission order.
    pub events: Vec<DebateEvent>,
    pub session: DebateSession,
}

impl DebateOutcome {
    pub fn is_approved(&self) -> bool {
        self.terminal == TerminalState::Approved
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} rounds | relevance={} | document={}",
            self.terminal,
            self.rounds_completed,
            self.record.relevance_score,
            self.session.document_id
        )
    }
}

/// The debate orchestrator.
///
/// Usage:
/// 1. Create with `new()` and optionally attach a sink / enable evidence
/// 2. Call `start()`
/// 3. Call `submit_initial()` with the analyst's first record
/// 4. Loop on `next_action()`: `submit_review()`, `submit_evidence()`,
///    `submit_revision()` until it returns `Complete`
/// 5. Call `outcome()` or `into_outcome()`
pub struct DebateOrchestrator {
    session: DebateSession,
    config: DebateConfig,
    evidence_enabled: bool,
    started: bool,
    record: Option<AnalysisRecord>,
    log: EventLog,
    pending_critique: String,
    pending_questions: Vec<String>,
    pending_evidence: Vec<EvidenceSnippet>,
    awaiting_evidence: bool,
    review_calls: u32,
    revision_calls: u32,
}

impl DebateOrchestrator {
    pub fn new(document_id: &str, config: DebateConfig) -> Self {
        let session = DebateSession::new(document_id, config.max_rounds);
        Self {
            session,
            config,
            evidence_enabled: false,
            started: false,
            record: None,
            log: EventLog::new(),
            pending_critique: String::new(),
            pending_questions: Vec::new(),
            pending_evidence: Vec::new(),
            awaiting_evidence: false,
            review_calls: 0,
            revision_calls: 0,
        }
    }

    /// Forward every event to `sink` as it is emitted.
    pub fn with_sink(mut self, sink: Option<SharedEventSink>) -> Self {
        self.log = EventLog::with_sink(sink);
        self
    }

    /// Whether reviewer questions trigger an evidence round.
    pub fn enable_evidence_search(mut self, enabled: bool) -> Self {
        self.evidence_enabled = enabled;
        self
    }

    /// Begin the debate; announces the document.
    pub fn start(&mut self, label: &str) -> Result<(), DebateError> {
        if self.started {
            return Err(DebateError::AlreadyStarted);
        }
        self.started = true;
        info!(
            session = %self.session.id,
            document = %self.session.document_id,
            max_rounds = self.session.max_rounds,
            "debate started"
        );
        self.log
            .emit(DebateEvent::info(format!("Starting analysis for: {}", label)));
        Ok(())
    }

    /// What action is expected next.
    pub fn next_action(&self) -> NextAction {
        match self.session.phase {
            DebatePhase::Init => NextAction::AwaitInitialAnalysis,
            DebatePhase::Analyzed => NextAction::AwaitReview,
            DebatePhase::Reviewing if self.awaiting_evidence => NextAction::AwaitEvidence {
                questions: self.pending_questions.clone(),
                max_queries: self.config.max_followup_queries,
            },
            DebatePhase::Reviewing => NextAction::AwaitReview,
            DebatePhase::Revising => NextAction::AwaitRevision {
                critique: self.pending_critique.clone(),
                new_evidence: self.pending_evidence.clone(),
            },
            DebatePhase::Approved | DebatePhase::Rejected | DebatePhase::Exhausted => {
                NextAction::Complete
            }
        }
    }

    /// Submit the analyst's first record (`None` when unparseable).
    pub fn submit_initial(
        &mut self,
        record: Option<AnalysisRecord>,
    ) -> Result<NextAction, DebateError> {
        self.expect(
            matches!(self.next_action(), NextAction::AwaitInitialAnalysis),
            "initial analysis",
        )?;

        match record {
            Some(mut record) => {
                record.sync_scores();
                self.log.emit(
                    DebateEvent::new(
                        Role::Analyst,
                        EventKind::Analysis,
                        format!(
                            "[Analyst] Initial analysis\n\nScores (0-10):\n{}\n\nWhy it matches: {}",
                            record.scores_display(),
                            record.match_reasoning
                        ),
                    )
                    .with_record(&record),
                );
                self.record = Some(record);
                self.session.transition(DebatePhase::Analyzed, "initial analysis")?;
                self.session.transition(DebatePhase::Reviewing, "first review")?;
            }
            None => {
                warn!(document = %self.session.document_id, "initial analysis unparseable");
                let record = AnalysisRecord::error(INITIAL_FAILURE_REASON);
                self.log.emit(
                    DebateEvent::info("[System] Initial analysis could not be parsed. Ending debate.")
                        .with_record(&record),
                );
                self.record = Some(record);
                self.session
                    .transition(DebatePhase::Exhausted, "initial analysis unparseable")?;
                self.log_termination();
            }
        }
        Ok(self.next_action())
    }

    /// Submit the reviewer's verdict for the current round (`None` when
    /// unparseable).
    ///
    /// Decision order: approval, score correction, consensus rejection,
    /// evidence request, round exhaustion, revision.
    pub fn submit_review(
        &mut self,
        verdict: Option<ReviewVerdict>,
    ) -> Result<NextAction, DebateError> {
        self.expect(matches!(self.next_action(), NextAction::AwaitReview), "review")?;
        self.review_calls += 1;

        let round = self.session.current_round;
        let analyst_relevance = self.current_relevance();

        let Some(verdict) = verdict else {
            warn!(
                document = %self.session.document_id,
                round,
                "reviewer output unparseable, failing closed"
            );
            let verdict = ReviewVerdict::request_changes(REVIEW_FAILURE_CRITIQUE);
            self.log.emit(DebateEvent::new(
                Role::Reviewer,
                EventKind::Rejection,
                format!("[Reviewer Decision] Rejected. {}", REVIEW_FAILURE_CRITIQUE),
            ));
            self.push_round(round, analyst_relevance, verdict);
            self.session
                .transition(DebatePhase::Rejected, "reviewer output unparseable")?;
            self.log_termination();
            return Ok(NextAction::Complete);
        };

        // 1. Approval
        if verdict.is_approved {
            self.log.emit(DebateEvent::new(
                Role::Reviewer,
                EventKind::Approval,
                "[Reviewer Decision] Analysis approved.",
            ));
            self.push_round(round, analyst_relevance, verdict);
            self.session.transition(DebatePhase::Approved, "reviewer approved")?;
            self.log_termination();
            return Ok(NextAction::Complete);
        }

        // 2. Score correction overrides the record immediately
        if let (Some(score), Some(record)) = (verdict.score_correction, self.record.as_mut()) {
            debug!(round, correction = score, "applying reviewer score correction");
            record.apply_score_correction(score);
        }

        // 3. Rejection by consensus
        if self.config.consensus.is_consensus_rejection(
            verdict.score_correction,
            self.current_relevance_f64(),
            verdict.has_questions(),
        ) {
            self.log.emit(DebateEvent::new(
                Role::Reviewer,
                EventKind::Rejection,
                "[Reviewer Decision] Analysis rejected (consensus: irrelevant).",
            ));
            self.push_round(round, analyst_relevance, verdict);
            self.session
                .transition(DebatePhase::Rejected, "consensus rejection")?;
            self.log_termination();
            return Ok(NextAction::Complete);
        }

        self.log.emit(DebateEvent::new(
            Role::Reviewer,
            EventKind::Critique,
            format!("[Reviewer Critique (Round {})]\n\n{}", round + 1, verdict.critique),
        ));

        let last_round = self.session.is_last_round();
        let wants_evidence = verdict.has_questions() && self.evidence_enabled && !last_round;
        self.pending_critique = verdict.critique.clone();
        self.pending_questions = verdict.questions.clone();
        self.pending_evidence.clear();
        self.push_round(round, analyst_relevance, verdict);

        // 4. Open questions are investigated before the revision
        if wants_evidence {
            self.awaiting_evidence = true;
            self.log.emit(DebateEvent::info(format!(
                "[System] Reviewer raised {} question(s); searching for evidence.",
                self.pending_questions.len()
            )));
            return Ok(self.next_action());
        }

        // 5. Round budget spent
        if last_round {
            self.log.emit(DebateEvent::info(
                "[System] Max debate rounds reached. Ending debate.",
            ));
            self.session
                .transition(DebatePhase::Exhausted, "max rounds reached")?;
            self.log_termination();
            return Ok(NextAction::Complete);
        }

        // 6. Revision
        self.session
            .transition(DebatePhase::Revising, "reviewer requested changes")?;
        Ok(self.next_action())
    }

    /// Submit evidence gathered for the reviewer's questions.
    pub fn submit_evidence(
        &mut self,
        snippets: Vec<EvidenceSnippet>,
    ) -> Result<NextAction, DebateError> {
        self.expect(
            matches!(self.next_action(), NextAction::AwaitEvidence { .. }),
            "evidence",
        )?;
        self.awaiting_evidence = false;

        self.log.emit(DebateEvent::info(format!(
            "[System] Found {} evidence snippet(s) for the revision.",
            snippets.len()
        )));
        if let Some(last) = self.session.rounds.last_mut() {
            last.evidence_snippets = snippets.len();
        }
        self.pending_evidence = snippets;

        self.session
            .transition(DebatePhase::Revising, "evidence gathered")?;
        Ok(self.next_action())
    }

    /// Submit the analyst's revision (`None` when unparseable).
    ///
    /// A revision replaces the record wholesale.
    pub fn submit_revision(
        &mut self,
        revision: Option<AnalysisRecord>,
    ) -> Result<NextAction, DebateError> {
        self.expect(
            matches!(self.next_action(), NextAction::AwaitRevision { .. }),
            "revision",
        )?;
        self.revision_calls += 1;
        let round = self.session.current_round;

        let Some(mut record) = revision else {
            warn!(
                document = %self.session.document_id,
                round,
                "revision unparseable, keeping prior record"
            );
            self.log.emit(DebateEvent::info(
                "[System] Revision could not be parsed. Keeping the previous analysis.",
            ));
            self.session
                .transition(DebatePhase::Exhausted, "revision unparseable")?;
            self.log_termination();
            return Ok(NextAction::Complete);
        };

        record.sync_scores();
        let defense = record
            .defense
            .clone()
            .unwrap_or_else(|| "I have updated the analysis.".to_string());
        self.log.emit(
            DebateEvent::new(
                Role::Analyst,
                EventKind::Revision,
                format!(
                    "[Analyst Revision (Round {})]\n\nDefense: {}\n\nNew scores:\n{}",
                    round + 1,
                    defense,
                    record.scores_display()
                ),
            )
            .with_record(&record),
        );
        self.record = Some(record);
        if let Some(last) = self.session.rounds.last_mut() {
            last.revised = true;
        }
        self.pending_critique.clear();
        self.pending_questions.clear();
        self.pending_evidence.clear();

        self.session.transition(DebatePhase::Reviewing, "revised")?;
        Ok(self.next_action())
    }

    /// Whether the debate has completed.
    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    /// Record currently held, if the analyst has produced one.
    pub fn current_record(&self) -> Option<&AnalysisRecord> {
        self.record.as_ref()
    }

    pub fn session(&self) -> &DebateSession {
        &self.session
    }

    pub fn events(&self) -> &[DebateEvent] {
        self.log.events()
    }

    pub fn current_round(&self) -> u32 {
        self.session.current_round
    }

    /// Outcome snapshot (only valid after completion).
    pub fn outcome(&self) -> Option<DebateOutcome> {
        let terminal = self.session.phase.terminal_state()?;
        let record = self.record.clone()?;
        Some(DebateOutcome {
            terminal,
            record,
            rounds_completed: self.session.rounds.len() as u32,
            review_calls: self.review_calls,
            revision_calls: self.revision_calls,
            events: self.log.events().to_vec(),
            session: self.session.clone(),
        })
    }

    /// Consume the orchestrator and return its outcome.
    pub fn into_outcome(self) -> Result<DebateOutcome, DebateError> {
        let Some(terminal) = self.session.phase.terminal_state() else {
            return Err(DebateError::NotComplete(self.next_action().to_string()));
        };
        let Some(record) = self.record else {
            return Err(DebateError::NotComplete(NextAction::AwaitInitialAnalysis.to_string()));
        };
        Ok(DebateOutcome {
            terminal,
            record,
            rounds_completed: self.session.rounds.len() as u32,
            review_calls: self.review_calls,
            revision_calls: self.revision_calls,
            events: self.log.into_events(),
            session: self.session,
        })
    }

    fn expect(&self, ok: bool, submission: &str) -> Result<(), DebateError> {
        if ok {
            return Ok(());
        }
        if self.session.is_complete() {
            return Err(DebateError::AlreadyComplete);
        }
        Err(DebateError::UnexpectedSubmission {
            expected: self.next_action().to_string(),
            actual: submission.to_string(),
        })
    }

    fn current_relevance(&self) -> u8 {
        self.record.as_ref().map(|r| r.relevance_score).unwrap_or(0)
    }

    fn current_relevance_f64(&self) -> f64 {
        f64::from(self.current_relevance())
    }

    fn push_round(&mut self, round: u32, analyst_relevance: u8, verdict: ReviewVerdict) {
        self.session.record_round(RoundRecord {
            round,
            analyst_relevance,
            verdict,
            evidence_snippets: 0,
            revised: false,
            reviewed_at: chrono::Utc::now(),
        });
    }

    fn log_termination(&self) {
        info!(
            session = %self.session.id,
            document = %self.session.document_id,
            phase = %self.session.phase,
            rounds = self.session.rounds.len(),
            relevance = self.current_relevance(),
            "debate finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::debate::events::FnSink;

    fn record(relevance: u64) -> AnalysisRecord {
        let raw = json!({
            "scores": {"relevance": relevance, "total": relevance, "novelty": 6},
            "match_reasoning": "overlaps with the viewpoint",
            "methodology": "transformer"
        });
        AnalysisRecord::from_model_output(raw.as_object().unwrap().clone())
    }

    fn started(config: DebateConfig) -> DebateOrchestrator {
        let mut orch = DebateOrchestrator::new("doc-1", config);
        orch.start("A Paper").unwrap();
        orch
    }

    fn config(max_rounds: u32) -> DebateConfig {
        DebateConfig {
            max_rounds,
            ..Default::default()
        }
    }

    #[test]
    fn test_approval_on_first_round() {
        let mut orch = started(DebateConfig::default());
        assert_eq!(orch.next_action(), NextAction::AwaitInitialAnalysis);

        let initial = record(8);
        let action = orch.submit_initial(Some(initial.clone())).unwrap();
        assert_eq!(action, NextAction::AwaitReview);

        let action = orch.submit_review(Some(ReviewVerdict::approve())).unwrap();
        assert_eq!(action, NextAction::Complete);

        let outcome = orch.into_outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Approved);
        assert_eq!(outcome.record, initial);
        assert_eq!(outcome.review_calls, 1);
        assert_eq!(outcome.revision_calls, 0);
        let approvals = outcome
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Approval)
            .count();
        assert_eq!(approvals, 1);
        assert!(outcome.summary_line().contains("APPROVED"));
    }

    #[test]
    fn test_consensus_rejection_skips_revision() {
        let mut orch = started(DebateConfig::default());
        orch.submit_initial(Some(record(2))).unwrap();

        let verdict = ReviewVerdict::request_changes("off topic").with_score_correction(3.0);
        let action = orch.submit_review(Some(verdict)).unwrap();
        assert_eq!(action, NextAction::Complete);

        let outcome = orch.into_outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Rejected);
        assert_eq!(outcome.revision_calls, 0);
        assert_eq!(outcome.record.relevance_score, 3);
        assert_eq!(outcome.record.scores["total"], 3);
        assert!(outcome.events.iter().any(|e| e.kind == EventKind::Rejection));
    }

    #[test]
    fn test_questions_block_consensus_rejection() {
        let mut orch = started(DebateConfig::default());
        orch.submit_initial(Some(record(2))).unwrap();

        let verdict = ReviewVerdict::request_changes("unclear")
            .with_score_correction(1.0)
            .with_questions(["Does it use graph data?"]);
        let action = orch.submit_review(Some(verdict)).unwrap();
        assert!(matches!(action, NextAction::AwaitRevision { .. }));
        assert!(!orch.is_complete());
    }

    #[test]
    fn test_correction_drives_consensus_rejection() {
        // Correction lowers the record too, so both sides end below threshold.
        let mut orch = started(DebateConfig::default());
        orch.submit_initial(Some(record(9))).unwrap();
        let verdict = ReviewVerdict::request_changes("overrated").with_score_correction(4.0);
        orch.submit_review(Some(verdict)).unwrap();
        let outcome = orch.outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Rejected);
        assert_eq!(outcome.session.rounds[0].analyst_relevance, 9);
    }

    #[test]
    fn test_fractional_correction_below_half_rejects() {
        let mut orch = started(DebateConfig::default());
        orch.submit_initial(Some(record(2))).unwrap();
        let verdict = ReviewVerdict::request_changes("irrelevant").with_score_correction(4.4);
        assert_eq!(orch.submit_review(Some(verdict)).unwrap(), NextAction::Complete);
        let outcome = orch.outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Rejected);
        assert_eq!(outcome.record.relevance_score, 4);
    }

    #[test]
    fn test_fractional_correction_decided_on_stored_score() {
        // 4.6 is stored as 5, which is not below the threshold.
        let mut orch = started(DebateConfig::default());
        orch.submit_initial(Some(record(2))).unwrap();
        let verdict = ReviewVerdict::request_changes("irrelevant").with_score_correction(4.6);
        let action = orch.submit_review(Some(verdict)).unwrap();
        assert!(matches!(action, NextAction::AwaitRevision { .. }));
        assert_eq!(orch.current_record().unwrap().relevance_score, 5);
        assert_eq!(orch.session().rounds[0].verdict.score_correction, Some(5.0));
    }

    #[test]
    fn test_exhaustion_after_max_rounds() {
        let mut orch = started(config(2));
        orch.submit_initial(Some(record(7))).unwrap();

        let action = orch
            .submit_review(Some(ReviewVerdict::request_changes("be specific")))
            .unwrap();
        assert_eq!(
            action,
            NextAction::AwaitRevision {
                critique: "be specific".to_string(),
                new_evidence: vec![],
            }
        );
        let action = orch.submit_revision(Some(record(6))).unwrap();
        assert_eq!(action, NextAction::AwaitReview);
        assert_eq!(orch.current_round(), 1);

        let action = orch
            .submit_review(Some(ReviewVerdict::request_changes("still vague")))
            .unwrap();
        assert_eq!(action, NextAction::Complete);

        let outcome = orch.into_outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Exhausted);
        assert_eq!(outcome.review_calls, 2);
        assert_eq!(outcome.revision_calls, 1);
        assert_eq!(outcome.record.relevance_score, 6);
        assert!(outcome.session.rounds[0].revised);
        assert!(!outcome.session.rounds[1].revised);
    }

    #[test]
    fn test_termination_for_any_verdict_sequence() {
        // Cycle through verdict shapes; the debate must end within max_rounds reviews.
        let verdicts = [
            Some(ReviewVerdict::request_changes("a")),
            Some(ReviewVerdict::request_changes("b").with_score_correction(8.0)),
            None,
            Some(ReviewVerdict::request_changes("c").with_questions(["q"])),
            Some(ReviewVerdict::approve()),
            Some(ReviewVerdict::request_changes("d").with_score_correction(2.0)),
        ];
        for max_rounds in 1..=5u32 {
            for offset in 0..verdicts.len() {
                let mut orch = started(config(max_rounds)).enable_evidence_search(true);
                orch.submit_initial(Some(record(7))).unwrap();
                let mut reviews = 0;
                let mut step = offset;
                loop {
                    match orch.next_action() {
                        NextAction::AwaitReview => {
                            reviews += 1;
                            let v = verdicts[step % verdicts.len()].clone();
                            step += 1;
                            orch.submit_review(v).unwrap();
                        }
                        NextAction::AwaitEvidence { .. } => {
                            orch.submit_evidence(vec![]).unwrap();
                        }
                        NextAction::AwaitRevision { .. } => {
                            orch.submit_revision(Some(record(7))).unwrap();
                        }
                        NextAction::Complete => break,
                        NextAction::AwaitInitialAnalysis => unreachable!(),
                    }
                }
                assert!(reviews <= max_rounds, "{} > {}", reviews, max_rounds);
                let outcome = orch.outcome().unwrap();
                assert!(outcome.record.scores_in_sync());
            }
        }
    }

    #[test]
    fn test_unparseable_review_fails_closed() {
        let mut orch = started(DebateConfig::default());
        orch.submit_initial(Some(record(8))).unwrap();
        orch.submit_review(None).unwrap();

        let outcome = orch.into_outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Rejected);
        assert_eq!(
            outcome.session.rounds[0].verdict.critique,
            REVIEW_FAILURE_CRITIQUE
        );
    }

    #[test]
    fn test_unparseable_revision_keeps_prior_record() {
        let mut orch = started(DebateConfig::default());
        let initial = record(7);
        orch.submit_initial(Some(initial.clone())).unwrap();
        orch.submit_review(Some(ReviewVerdict::request_changes("x")))
            .unwrap();
        orch.submit_revision(None).unwrap();

        let outcome = orch.into_outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Exhausted);
        assert_eq!(outcome.record, initial);
        assert_eq!(outcome.revision_calls, 1);
    }

    #[test]
    fn test_unparseable_initial_yields_error_record() {
        let mut orch = started(DebateConfig::default());
        let action = orch.submit_initial(None).unwrap();
        assert_eq!(action, NextAction::Complete);

        let outcome = orch.into_outcome().unwrap();
        assert_eq!(outcome.terminal, TerminalState::Exhausted);
        assert_eq!(outcome.record.relevance_score, 0);
        assert_eq!(outcome.record.match_reasoning, INITIAL_FAILURE_REASON);
        assert_eq!(outcome.review_calls, 0);
    }

    #[test]
    fn test_evidence_round() {
        let mut orch = started(DebateConfig::default()).enable_evidence_search(true);
        orch.submit_initial(Some(record(5))).unwrap();

        let verdict = ReviewVerdict::request_changes("check datasets")
            .with_questions(["Which datasets?", "Is code released?"]);
        let action = orch.submit_review(Some(verdict)).unwrap();
        assert_eq!(
            action,
            NextAction::AwaitEvidence {
                questions: vec!["Which datasets?".into(), "Is code released?".into()],
                max_queries: 3,
            }
        );

        let snippet = EvidenceSnippet::new("Repo", "code on GitHub");
        let action = orch.submit_evidence(vec![snippet.clone()]).unwrap();
        assert_eq!(
            action,
            NextAction::AwaitRevision {
                critique: "check datasets".into(),
                new_evidence: vec![snippet],
            }
        );
        orch.submit_revision(Some(record(6))).unwrap();
        assert_eq!(orch.session().rounds[0].evidence_snippets, 1);
        assert_eq!(orch.next_action(), NextAction::AwaitReview);
    }

    #[test]
    fn test_no_evidence_on_last_round() {
        let mut orch = started(config(1)).enable_evidence_search(true);
        orch.submit_initial(Some(record(5))).unwrap();
        let verdict = ReviewVerdict::request_changes("?").with_questions(["q"]);
        let action = orch.submit_review(Some(verdict)).unwrap();
        assert_eq!(action, NextAction::Complete);
        assert_eq!(
            orch.outcome().unwrap().terminal,
            TerminalState::Exhausted
        );
    }

    #[test]
    fn test_out_of_order_submissions() {
        let mut orch = started(DebateConfig::default());
        let err = orch
            .submit_review(Some(ReviewVerdict::approve()))
            .unwrap_err();
        assert!(matches!(err, DebateError::UnexpectedSubmission { .. }));

        orch.submit_initial(Some(record(8))).unwrap();
        orch.submit_review(Some(ReviewVerdict::approve())).unwrap();
        let err = orch.submit_revision(Some(record(1))).unwrap_err();
        assert_eq!(err, DebateError::AlreadyComplete);
        assert_eq!(orch.start("again").unwrap_err(), DebateError::AlreadyStarted);
    }

    #[test]
    fn test_incomplete_outcome() {
        let mut orch = started(DebateConfig::default());
        assert!(orch.outcome().is_none());
        orch.submit_initial(Some(record(8))).unwrap();
        assert!(matches!(
            orch.into_outcome(),
            Err(DebateError::NotComplete(_))
        ));
    }

    #[test]
    fn test_events_forwarded_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: SharedEventSink = Arc::new(FnSink(move |e: &DebateEvent| {
            sink_seen.lock().unwrap().push(e.kind);
        }));
        let mut orch = DebateOrchestrator::new("doc-1", config(3)).with_sink(Some(sink));
        orch.start("A Paper").unwrap();
        orch.submit_initial(Some(record(7))).unwrap();
        orch.submit_review(Some(ReviewVerdict::request_changes("x")))
            .unwrap();
        orch.submit_revision(Some(record(8))).unwrap();
        orch.submit_review(Some(ReviewVerdict::approve())).unwrap();

        let kinds = seen.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec![
                EventKind::Info,
                EventKind::Analysis,
                EventKind::Critique,
                EventKind::Revision,
                EventKind::Approval,
            ]
        );
        let logged: Vec<_> = orch.events().iter().map(|e| e.kind).collect();
        assert_eq!(logged, kinds);
    }
}
