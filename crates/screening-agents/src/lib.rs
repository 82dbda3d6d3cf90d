//! Screening agents: the async side of the analyst/reviewer debate.
//!
//! `coordination` owns the deterministic pieces (recovery parser, score
//! normalization, debate state machine, cache). This crate talks to the
//! model endpoint, adapts it into the two debate roles and drives sessions
//! over single documents and whole batches.

pub mod agents;
pub mod batch;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod runner;
pub mod search;
pub mod synthesis;

pub use agents::{Analyst, Document, LlmAnalyst, LlmReviewer, Reviewer, ViewpointAnalysis};
pub use batch::{partition, BatchReport, ScreenedDocument, ScreeningStatus};
pub use config::{check_endpoint, ConfigError, ScreeningConfig};
pub use llm::{call_structured, CallError, ChatMessage, ModelClient, OpenAiCompatClient};
pub use runner::{DebateReport, DebateRunner, SynthesisReport};
pub use search::{EvidenceSearch, NoEvidenceSearch, StaticEvidenceSearch};
pub use synthesis::{Synthesis, SynthesisReview};
