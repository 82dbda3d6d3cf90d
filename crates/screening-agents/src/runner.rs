//! Async driver for the debate state machine.
//!
//! [`DebateRunner::run`] owns the cache lookup, every model call and the
//! cache write; the orchestrator in `coordination` decides what happens
//! next. No error escapes `run`: every path ends in a well-formed record.

use std::path::Path;
use std::sync::Arc;

use coordination::debate::{DebateEvent, EventLog};
use coordination::{
    AnalysisCache, AnalysisRecord, DebateConfig, DebateOrchestrator, NextAction, SharedEventSink,
    TerminalState,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::agents::{Analyst, Document, LlmAnalyst, LlmReviewer, Reviewer, ViewpointAnalysis};
use crate::batch::ScreenedDocument;
use crate::config::ScreeningConfig;
use crate::llm::{CallError, ModelClient};
use crate::prompts::PROMPT_VERSION;
use crate::search::{EvidenceSearch, NoEvidenceSearch};
use crate::synthesis::{self, Synthesis};

/// Reason carried by the record of a document with no text.
pub const NO_CONTENT_REASON: &str = "No content available";

/// Result of screening one document.
#[derive(Debug, Clone, Serialize)]
pub struct DebateReport {
    pub record: AnalysisRecord,
    /// `None` when no debate ran (cache hit or empty document).
    pub terminal: Option<TerminalState>,
    pub from_cache: bool,
    /// Events in emission order.
    pub events: Vec<DebateEvent>,
}

/// File-backed cache tied to the current prompt templates.
pub fn open_cache(path: impl AsRef<Path>) -> AnalysisCache {
    AnalysisCache::open(path).with_prompt_version(PROMPT_VERSION)
}

/// Synthesis of a batch's accepted documents.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    /// `None` when there was nothing to synthesize.
    pub synthesis: Option<Synthesis>,
    pub events: Vec<DebateEvent>,
}

/// Drives analyst/reviewer debates for documents.
///
/// Cheap to clone: every collaborator is behind an `Arc`.
#[derive(Clone)]
pub struct DebateRunner {
    analyst: Arc<dyn Analyst>,
    reviewer: Arc<dyn Reviewer>,
    search: Arc<dyn EvidenceSearch>,
    cache: Option<Arc<AnalysisCache>>,
    sink: Option<SharedEventSink>,
    config: DebateConfig,
}

impl DebateRunner {
    pub fn new(analyst: Arc<dyn Analyst>, reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            analyst,
            reviewer,
            search: Arc::new(NoEvidenceSearch),
            cache: None,
            sink: None,
            config: DebateConfig::default(),
        }
    }

    /// Runner with LLM-backed roles sharing one client.
    pub fn from_config(config: &ScreeningConfig, client: Arc<dyn ModelClient>) -> Self {
        let analyst = LlmAnalyst::new(client.clone(), config.retry, config.limits);
        let reviewer = LlmReviewer::new(client, config.retry, config.limits);
        Self::new(Arc::new(analyst), Arc::new(reviewer))
            .with_config(config.debate.to_debate_config())
    }

    pub fn with_search(mut self, search: Arc<dyn EvidenceSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<AnalysisCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_sink(mut self, sink: Option<SharedEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: DebateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    /// Screen one document against `viewpoint`.
    pub async fn run(&self, viewpoint: &str, document: &Document) -> DebateReport {
        if document.text.trim().is_empty() {
            warn!(document = %document.label(), "document has no text, skipping debate");
            let mut log = EventLog::with_sink(self.sink.clone());
            log.emit(DebateEvent::info(format!(
                "[System] No content available for {}.",
                document.title
            )));
            return DebateReport {
                record: AnalysisRecord::error(NO_CONTENT_REASON),
                terminal: None,
                from_cache: false,
                events: log.into_events(),
            };
        }

        if let Some(record) = self.cache.as_ref().and_then(|c| c.get(viewpoint, &document.text)) {
            info!(document = %document.label(), "loaded cached analysis");
            let mut log = EventLog::with_sink(self.sink.clone());
            log.emit(DebateEvent::info(format!(
                "[System] Loaded cached analysis for {}...",
                document.title.chars().take(30).collect::<String>()
            )));
            return DebateReport {
                record,
                terminal: None,
                from_cache: true,
                events: log.into_events(),
            };
        }

        let mut orch = DebateOrchestrator::new(document.label(), self.config.clone())
            .with_sink(self.sink.clone())
            .enable_evidence_search(self.search.is_enabled());
        if let Err(e) = orch.start(&document.title) {
            error!(error = %e, "debate failed to start");
        }

        loop {
            let step = match orch.next_action() {
                NextAction::AwaitInitialAnalysis => {
                    let record = ok_or_warn(
                        "analyst.propose",
                        self.analyst.propose(viewpoint, document).await,
                    );
                    orch.submit_initial(record)
                }
                NextAction::AwaitReview => {
                    let verdict = match orch.current_record().cloned() {
                        Some(record) => ok_or_warn(
                            "reviewer.critique",
                            self.reviewer
                                .critique(viewpoint, document, &record, orch.current_round())
                                .await,
                        ),
                        None => None,
                    };
                    orch.submit_review(verdict)
                }
                NextAction::AwaitEvidence {
                    questions,
                    max_queries,
                } => {
                    let snippets = self.gather_evidence(viewpoint, &questions, max_queries).await;
                    orch.submit_evidence(snippets)
                }
                NextAction::AwaitRevision {
                    critique,
                    new_evidence,
                } => {
                    let revision = match orch.current_record().cloned() {
                        Some(current) => ok_or_warn(
                            "analyst.revise",
                            self.analyst
                                .revise(document, &current, &critique, &new_evidence)
                                .await,
                        ),
                        None => None,
                    };
                    orch.submit_revision(revision)
                }
                NextAction::Complete => break,
            };
            if let Err(e) = step {
                error!(document = %document.label(), error = %e, "debate protocol error");
                break;
            }
        }

        match orch.into_outcome() {
            Ok(outcome) => {
                // An analyst that never produced a record is not worth remembering.
                if outcome.review_calls > 0 {
                    if let Some(cache) = &self.cache {
                        cache.set(viewpoint, &document.text, &outcome.record);
                    }
                }
                DebateReport {
                    record: outcome.record,
                    terminal: Some(outcome.terminal),
                    from_cache: false,
                    events: outcome.events,
                }
            }
            Err(e) => {
                error!(document = %document.label(), error = %e, "debate ended without outcome");
                DebateReport {
                    record: AnalysisRecord::error(&format!("Debate aborted: {e}")),
                    terminal: None,
                    from_cache: false,
                    events: Vec::new(),
                }
            }
        }
    }

    /// Queries from the analyst (or the raw questions), then search.
    async fn gather_evidence(
        &self,
        viewpoint: &str,
        questions: &[String],
        max_queries: usize,
    ) -> Vec<coordination::EvidenceSnippet> {
        let queries = match self
            .analyst
            .follow_up_queries(viewpoint, questions, max_queries)
            .await
        {
            Ok(queries) if !queries.is_empty() => queries,
            Ok(_) => questions.iter().take(max_queries).cloned().collect(),
            Err(e) => {
                warn!(error = %e, "follow-up query generation failed, searching raw questions");
                questions.iter().take(max_queries).cloned().collect()
            }
        };
        let queries: Vec<String> = queries.into_iter().take(max_queries).collect();
        info!(queries = queries.len(), "running evidence search");
        self.search.search(&queries).await
    }

    /// Structured reading of the user's research idea, with a text-only
    /// fallback when the model output is unusable.
    pub async fn analyze_viewpoint(&self, text: &str) -> ViewpointAnalysis {
        match self.analyst.analyze_viewpoint(text).await {
            Ok(analysis) if !analysis.key_viewpoint.trim().is_empty() => analysis,
            Ok(_) => {
                warn!("viewpoint analysis missing key viewpoint, using fallback");
                ViewpointAnalysis::fallback(text)
            }
            Err(e) => {
                warn!(error = %e, "viewpoint analysis failed, using fallback");
                ViewpointAnalysis::fallback(text)
            }
        }
    }

    /// Draft and review a literature synthesis of `accepted`.
    pub async fn synthesize(
        &self,
        viewpoint: &str,
        accepted: &[ScreenedDocument],
        rounds: u32,
    ) -> SynthesisReport {
        let mut log = EventLog::with_sink(self.sink.clone());
        let synthesis = synthesis::synthesize(
            self.analyst.as_ref(),
            self.reviewer.as_ref(),
            viewpoint,
            accepted,
            rounds,
            &mut log,
        )
        .await;
        SynthesisReport {
            synthesis,
            events: log.into_events(),
        }
    }
}

fn ok_or_warn<T>(call: &str, result: Result<T, CallError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(call, error = %e, "model call failed");
            None
        }
    }
}
