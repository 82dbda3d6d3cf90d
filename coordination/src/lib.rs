//! Document Screening Coordination Library
//!
//! Deterministic core of the screening pipeline. Nothing here performs
//! network I/O; model calls are made by the agent crate, which feeds parsed
//! results into the state machine defined here.
//!
//! # Components
//!
//! - [`recovery`]: turns unreliable model text into JSON (reasoning blocks,
//!   code fences, trailing commas, unescaped quotes, Python literals)
//! - [`score`]: clamps arbitrary score values onto the 0–10 scale
//! - [`analysis`]: typed analysis record with synchronized scores
//! - [`debate`]: analyst/reviewer state machine, verdicts, events
//! - [`cache`]: terminal records keyed by (viewpoint, document)
//! - [`resilience`]: bounded fixed-delay retry for model calls

#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod cache;
pub mod debate;
pub mod recovery;
pub mod resilience;
pub mod score;

pub use analysis::{AnalysisRecord, ScoreMap};
pub use cache::{AnalysisCache, CacheEntry, CacheError, CacheStore, JsonFileStore, MemoryStore};
pub use debate::{
    ConsensusPolicy, DebateConfig, DebateError, DebateEvent, DebateOrchestrator, DebateOutcome,
    DebatePhase, EventKind, EventLog, EventSink, EvidenceSnippet, NextAction, ReviewVerdict, Role,
    SharedEventSink, TerminalState,
};
pub use recovery::{recover, Recovery, RecoveryStage};
pub use resilience::{Retriable, RetryPolicy};
pub use score::normalize_score;
