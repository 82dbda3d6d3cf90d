//! Debate state machine: phases, transitions, and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::consensus::ReviewVerdict;

/// Phase of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Waiting for the analyst's initial record.
    Init,
    /// Initial record received and normalized.
    Analyzed,
    /// Reviewer is evaluating the current record.
    Reviewing,
    /// Analyst is revising after a critique.
    Revising,
    /// Reviewer approved the record.
    Approved,
    /// Both roles agree the document is irrelevant, or the reviewer failed.
    Rejected,
    /// Round budget spent or the analyst failed.
    Exhausted,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Exhausted)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Init => &[Self::Analyzed, Self::Exhausted],
            Self::Analyzed => &[Self::Reviewing],
            Self::Reviewing => &[
                Self::Revising,
                Self::Approved,
                Self::Rejected,
                Self::Exhausted,
            ],
            Self::Revising => &[Self::Reviewing, Self::Exhausted],
            Self::Approved | Self::Rejected | Self::Exhausted => &[],
        }
    }

    /// Terminal state for terminal phases.
    pub fn terminal_state(self) -> Option<TerminalState> {
        match self {
            Self::Approved => Some(TerminalState::Approved),
            Self::Rejected => Some(TerminalState::Rejected),
            Self::Exhausted => Some(TerminalState::Exhausted),
            _ => None,
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Revising => write!(f, "revising"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// How a debate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalState {
    Approved,
    Rejected,
    Exhausted,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Record of a single debate round (review, optional evidence, optional revision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number (0-indexed).
    pub round: u32,
    /// Analyst relevance before any reviewer correction.
    pub analyst_relevance: u8,
    /// Reviewer's verdict for this round.
    pub verdict: ReviewVerdict,
    /// Evidence snippets folded into the revision.
    pub evidence_snippets: usize,
    /// Whether the analyst produced a revision this round.
    pub revised: bool,
    /// When the review was received.
    pub reviewed_at: DateTime<Utc>,
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for TransitionError {}

/// A debate session for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    /// Unique session identifier.
    pub id: String,
    /// Document under review.
    pub document_id: String,
    pub phase: DebatePhase,
    /// Current round (0-indexed).
    pub current_round: u32,
    /// Maximum rounds allowed (at least 1).
    pub max_rounds: u32,
    pub rounds: Vec<RoundRecord>,
    pub transitions: Vec<DebateTransition>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(document_id: &str, max_rounds: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            phase: DebatePhase::Init,
            current_round: 0,
            max_rounds: max_rounds.max(1),
            rounds: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });

        // A revision feeding back into review opens the next round.
        if self.phase == DebatePhase::Revising && to == DebatePhase::Reviewing {
            self.current_round += 1;
        }
        self.phase = to;

        Ok(())
    }

    pub fn record_round(&mut self, record: RoundRecord) {
        self.rounds.push(record);
    }

    /// Whether the debate has ended.
    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the current round is the last one allowed.
    pub fn is_last_round(&self) -> bool {
        self.current_round + 1 >= self.max_rounds
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | {} rounds recorded | document={}",
            self.phase,
            self.current_round + 1,
            self.max_rounds,
            self.rounds.len(),
            self.document_id
        )
    }
}
