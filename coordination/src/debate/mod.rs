//! Debate Orchestration: Analyst-Reviewer Screening Loop
//!
//! State machine for a bounded debate between an analyst that scores a
//! document against a viewpoint and a reviewer that critiques the score.
//!
//! # Debate Flow
//!
//! ```text
//! Init → Analyzed → Reviewing ──approve──────────────→ Approved
//!   │                 │  ▲    ──consensus reject────→ Rejected
//!   │                 │  │    ──last round──────────→ Exhausted
//!   │                 ▼  │
//!   │               Revising (optional evidence first)
//!   │                 └─ revision unparseable ──────→ Exhausted
//!   └─ initial analysis unparseable ────────────────→ Exhausted
//! ```

pub mod consensus;
pub mod events;
pub mod evidence;
pub mod orchestrator;
pub mod state;

pub use consensus::{ConsensusPolicy, ReviewVerdict};
pub use events::{
    BroadcastSink, DebateEvent, EventKind, EventLog, EventSink, FnSink, Role, SharedEventSink,
};
pub use evidence::{format_evidence, EvidenceSnippet};
pub use orchestrator::{DebateConfig, DebateError, DebateOrchestrator, DebateOutcome, NextAction};
pub use state::{
    DebatePhase, DebateSession, DebateTransition, RoundRecord, TerminalState, TransitionError,
};
