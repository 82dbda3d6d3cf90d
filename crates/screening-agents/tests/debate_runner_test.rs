//! Debate runner scenarios with scripted roles.
//!
//! The analyst and reviewer are hand-written mocks that record every call
//! behind a `Mutex`; evidence search is a mockall mock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coordination::debate::{EventKind, FnSink};
use coordination::{
    AnalysisCache, AnalysisRecord, DebateConfig, DebateEvent, EvidenceSnippet, ReviewVerdict,
    SharedEventSink, TerminalState,
};
use mockall::mock;
use screening_agents::prompts::PROMPT_VERSION;
use screening_agents::runner::{open_cache, NO_CONTENT_REASON};
use screening_agents::{
    Analyst, CallError, DebateRunner, Document, EvidenceSearch, Reviewer, ScreenedDocument,
    Synthesis, SynthesisReview, ViewpointAnalysis,
};
use serde_json::json;

mock! {
    Search {}

    #[async_trait]
    impl EvidenceSearch for Search {
        async fn search(&self, queries: &[String]) -> Vec<EvidenceSnippet>;
        fn is_enabled(&self) -> bool;
    }
}

const VIEWPOINT: &str = "Retrieval-augmented code generation improves repository-level completion.";

fn record(relevance: u8, reasoning: &str) -> AnalysisRecord {
    let raw = json!({
        "relevance_score": relevance,
        "match_reasoning": reasoning,
        "methodology": "retrieval over repository graph",
    });
    AnalysisRecord::from_model_output(raw.as_object().unwrap().clone())
}

fn unparseable() -> CallError {
    CallError::Unparseable {
        preview: "I think the paper is".into(),
    }
}

fn paper() -> Document {
    Document::new(
        "doc-1",
        "RepoCoder: Repository-Level Code Completion",
        "We propose an iterative retrieval-generation framework for repository-level completion.",
    )
}

/// Analyst that replays scripted records and records every call.
#[derive(Default)]
struct ScriptedAnalyst {
    proposals: Mutex<VecDeque<Option<AnalysisRecord>>>,
    revisions: Mutex<VecDeque<Option<AnalysisRecord>>>,
    queries: Mutex<Option<Vec<String>>>,
    viewpoint: Mutex<Option<ViewpointAnalysis>>,
    calls: Mutex<Vec<String>>,
    revision_evidence: Mutex<Vec<usize>>,
    synthesis_drafts: Mutex<u32>,
}

impl ScriptedAnalyst {
    fn proposing(record: Option<AnalysisRecord>) -> Self {
        let analyst = Self::default();
        analyst.proposals.lock().unwrap().push_back(record);
        analyst
    }

    fn then_revising(self, revisions: Vec<Option<AnalysisRecord>>) -> Self {
        self.revisions.lock().unwrap().extend(revisions);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record_call(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

fn next_or_unparseable(
    queue: &Mutex<VecDeque<Option<AnalysisRecord>>>,
) -> Result<AnalysisRecord, CallError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .flatten()
        .ok_or_else(unparseable)
}

#[async_trait]
impl Analyst for ScriptedAnalyst {
    async fn propose(&self, _: &str, _: &Document) -> Result<AnalysisRecord, CallError> {
        self.record_call("propose");
        next_or_unparseable(&self.proposals)
    }

    async fn revise(
        &self,
        _: &Document,
        _: &AnalysisRecord,
        _: &str,
        evidence: &[EvidenceSnippet],
    ) -> Result<AnalysisRecord, CallError> {
        self.record_call("revise");
        self.revision_evidence.lock().unwrap().push(evidence.len());
        next_or_unparseable(&self.revisions)
    }

    async fn follow_up_queries(
        &self,
        _: &str,
        _: &[String],
        _: usize,
    ) -> Result<Vec<String>, CallError> {
        self.record_call("follow_up_queries");
        self.queries.lock().unwrap().clone().ok_or_else(unparseable)
    }

    async fn analyze_viewpoint(&self, _: &str) -> Result<ViewpointAnalysis, CallError> {
        self.record_call("analyze_viewpoint");
        self.viewpoint.lock().unwrap().clone().ok_or_else(unparseable)
    }

    async fn synthesize(
        &self,
        _: &str,
        papers: &[ScreenedDocument],
        previous: Option<(&Synthesis, &str)>,
    ) -> Result<Synthesis, CallError> {
        self.record_call("synthesize");
        let mut drafts = self.synthesis_drafts.lock().unwrap();
        *drafts += 1;
        Ok(Synthesis {
            state_of_art_summary: format!("draft {} over {} paper(s)", drafts, papers.len()),
            gap_analysis: previous
                .map(|(_, critique)| format!("addresses: {critique}"))
                .unwrap_or_else(|| "initial gaps".into()),
            strategic_recommendations: "combine retrieval with planning".into(),
        })
    }
}

/// Reviewer that replays scripted verdicts (`None` = unparseable).
#[derive(Default)]
struct ScriptedReviewer {
    verdicts: Mutex<VecDeque<Option<ReviewVerdict>>>,
    synthesis_reviews: Mutex<VecDeque<SynthesisReview>>,
    rounds: Mutex<Vec<u32>>,
}

impl ScriptedReviewer {
    fn with_verdicts(verdicts: Vec<Option<ReviewVerdict>>) -> Self {
        let reviewer = Self::default();
        reviewer.verdicts.lock().unwrap().extend(verdicts);
        reviewer
    }

    fn rounds(&self) -> Vec<u32> {
        self.rounds.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn critique(
        &self,
        _: &str,
        _: &Document,
        _: &AnalysisRecord,
        round: u32,
    ) -> Result<ReviewVerdict, CallError> {
        self.rounds.lock().unwrap().push(round);
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(unparseable)
    }

    async fn review_synthesis(
        &self,
        _: &Synthesis,
        _: &[String],
    ) -> Result<SynthesisReview, CallError> {
        self.synthesis_reviews
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(unparseable)
    }
}

fn runner(analyst: &Arc<ScriptedAnalyst>, reviewer: &Arc<ScriptedReviewer>) -> DebateRunner {
    DebateRunner::new(analyst.clone(), reviewer.clone())
}

fn kinds(events: &[DebateEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test]
async fn test_approval_on_first_round_keeps_initial_record() {
    let initial = record(8, "Directly studies retrieval for repo-level completion.");
    let analyst = Arc::new(ScriptedAnalyst::proposing(Some(initial.clone())));
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![Some(
        ReviewVerdict::approve(),
    )]));

    let report = runner(&analyst, &reviewer).run(VIEWPOINT, &paper()).await;

    assert_eq!(report.terminal, Some(TerminalState::Approved));
    assert_eq!(report.record, initial);
    assert!(!report.from_cache);
    assert_eq!(kinds(&report.events, EventKind::Approval), 1);
    assert_eq!(kinds(&report.events, EventKind::Revision), 0);
    assert_eq!(analyst.calls(), vec!["propose"]);
    assert_eq!(reviewer.rounds(), vec![0]);
}

#[tokio::test]
async fn test_consensus_rejection_skips_revision() {
    let analyst = Arc::new(ScriptedAnalyst::proposing(Some(record(2, "Tangential."))));
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![Some(
        ReviewVerdict::request_changes("Not about code generation at all.").with_score_correction(3.0),
    )]));

    let report = runner(&analyst, &reviewer).run(VIEWPOINT, &paper()).await;

    assert_eq!(report.terminal, Some(TerminalState::Rejected));
    assert_eq!(report.record.relevance_score, 3);
    assert_eq!(analyst.count("revise"), 0);
    assert_eq!(reviewer.rounds().len(), 1);
    assert_eq!(kinds(&report.events, EventKind::Rejection), 1);
}

#[tokio::test]
async fn test_exhaustion_after_max_rounds() {
    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(6, "Partially relevant.")))
            .then_revising(vec![Some(record(7, "Revised with quotes."))]),
    );
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![
        Some(ReviewVerdict::request_changes("Add evidence quotes.")),
        Some(ReviewVerdict::request_changes("Still vague on datasets.")),
    ]));
    let config = DebateConfig {
        max_rounds: 2,
        ..DebateConfig::default()
    };

    let report = runner(&analyst, &reviewer)
        .with_config(config)
        .run(VIEWPOINT, &paper())
        .await;

    assert_eq!(report.terminal, Some(TerminalState::Exhausted));
    assert_eq!(reviewer.rounds(), vec![0, 1]);
    assert_eq!(analyst.count("revise"), 1);
    assert_eq!(report.record.relevance_score, 7);
    assert_eq!(report.record.match_reasoning, "Revised with quotes.");
}

#[tokio::test]
async fn test_questions_trigger_evidence_before_rejection() {
    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(2, "Seems off-topic.")))
            .then_revising(vec![Some(record(6, "Section 4 evaluates repo-level retrieval."))]),
    );
    *analyst.queries.lock().unwrap() = Some(vec!["RepoCoder repository retrieval".into()]);
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![
        Some(
            ReviewVerdict::request_changes("Check whether retrieval is evaluated.")
                .with_score_correction(2.0)
                .with_questions(["Does it evaluate cross-file retrieval?"]),
        ),
        Some(ReviewVerdict::approve()),
    ]));

    let mut search = MockSearch::new();
    search.expect_is_enabled().return_const(true);
    search
        .expect_search()
        .withf(|queries| queries.len() == 1 && queries[0] == "RepoCoder repository retrieval")
        .times(1)
        .returning(|_| {
            vec![EvidenceSnippet::new(
                "RepoCoder",
                "We evaluate cross-file retrieval on RepoEval.",
            )]
        });

    let report = runner(&analyst, &reviewer)
        .with_search(Arc::new(search))
        .run(VIEWPOINT, &paper())
        .await;

    assert_eq!(report.terminal, Some(TerminalState::Approved));
    assert_eq!(report.record.relevance_score, 6);
    assert_eq!(
        analyst.calls(),
        vec!["propose", "follow_up_queries", "revise"]
    );
    assert_eq!(*analyst.revision_evidence.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_failed_query_generation_searches_raw_questions() {
    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(4, "Unclear.")))
            .then_revising(vec![Some(record(5, "Clarified."))]),
    );
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![
        Some(
            ReviewVerdict::request_changes("Unclear scope.")
                .with_questions(["Which benchmarks?", "Which languages?"]),
        ),
        Some(ReviewVerdict::approve()),
    ]));

    let mut search = MockSearch::new();
    search.expect_is_enabled().return_const(true);
    search
        .expect_search()
        .withf(|queries| queries.len() == 2 && queries[1] == "Which languages?")
        .times(1)
        .returning(|_| Vec::new());

    let report = runner(&analyst, &reviewer)
        .with_search(Arc::new(search))
        .run(VIEWPOINT, &paper())
        .await;

    assert_eq!(report.terminal, Some(TerminalState::Approved));
    assert_eq!(*analyst.revision_evidence.lock().unwrap(), vec![0]);
}

#[tokio::test]
async fn test_disabled_search_goes_straight_to_revision() {
    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(3, "Weak match.")))
            .then_revising(vec![Some(record(6, "Stronger match."))]),
    );
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![
        Some(
            ReviewVerdict::request_changes("Prove relevance.")
                .with_score_correction(2.0)
                .with_questions(["Is there a repo-level benchmark?"]),
        ),
        Some(ReviewVerdict::approve()),
    ]));

    let report = runner(&analyst, &reviewer).run(VIEWPOINT, &paper()).await;

    assert_eq!(report.terminal, Some(TerminalState::Approved));
    assert_eq!(analyst.calls(), vec!["propose", "revise"]);
}

#[tokio::test]
async fn test_unparseable_review_fails_closed() {
    let analyst = Arc::new(ScriptedAnalyst::proposing(Some(record(9, "Core paper."))));
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![None]));

    let report = runner(&analyst, &reviewer).run(VIEWPOINT, &paper()).await;

    assert_eq!(report.terminal, Some(TerminalState::Rejected));
    assert_eq!(report.record.relevance_score, 9);
    assert_eq!(analyst.count("revise"), 0);
}

#[tokio::test]
async fn test_unparseable_revision_keeps_prior_record() {
    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(6, "Original reasoning."))).then_revising(vec![None]),
    );
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![Some(
        ReviewVerdict::request_changes("Needs quotes."),
    )]));

    let report = runner(&analyst, &reviewer).run(VIEWPOINT, &paper()).await;

    assert_eq!(report.terminal, Some(TerminalState::Exhausted));
    assert_eq!(report.record.match_reasoning, "Original reasoning.");
    assert_eq!(reviewer.rounds().len(), 1);
}

#[tokio::test]
async fn test_unparseable_initial_analysis_is_not_cached() {
    let analyst = Arc::new(ScriptedAnalyst::proposing(None));
    let reviewer = Arc::new(ScriptedReviewer::default());
    let cache = Arc::new(AnalysisCache::in_memory());

    let report = runner(&analyst, &reviewer)
        .with_cache(Some(cache.clone()))
        .run(VIEWPOINT, &paper())
        .await;

    assert_eq!(report.terminal, Some(TerminalState::Exhausted));
    assert_eq!(report.record.relevance_score, 0);
    assert!(reviewer.rounds().is_empty());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_empty_document_makes_no_model_calls() {
    let analyst = Arc::new(ScriptedAnalyst::default());
    let reviewer = Arc::new(ScriptedReviewer::default());
    let cache = Arc::new(AnalysisCache::in_memory());
    let doc = Document::new("doc-empty", "Scanned PDF", "   ");

    let report = runner(&analyst, &reviewer)
        .with_cache(Some(cache.clone()))
        .run(VIEWPOINT, &doc)
        .await;

    assert_eq!(report.terminal, None);
    assert_eq!(report.record.relevance_score, 0);
    assert_eq!(report.record.match_reasoning, NO_CONTENT_REASON);
    assert!(analyst.calls().is_empty());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(5, "Borderline.")))
            .then_revising(vec![Some(record(7, "Relevant after all."))]),
    );
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![
        Some(ReviewVerdict::request_changes("Justify the score.")),
        Some(ReviewVerdict::approve()),
    ]));
    let cache = Arc::new(AnalysisCache::in_memory());
    let runner = runner(&analyst, &reviewer).with_cache(Some(cache.clone()));

    let first = runner.run(VIEWPOINT, &paper()).await;
    let calls_after_first = analyst.calls().len();
    let rounds_after_first = reviewer.rounds().len();
    let second = runner.run(VIEWPOINT, &paper()).await;

    assert_eq!(first.terminal, Some(TerminalState::Approved));
    assert!(second.from_cache);
    assert_eq!(second.terminal, None);
    assert_eq!(second.record, first.record);
    assert_eq!(analyst.calls().len(), calls_after_first);
    assert_eq!(reviewer.rounds().len(), rounds_after_first);
    assert_eq!(cache.len(), 1);
    assert!(second.events[0].content.contains("Loaded cached analysis"));
}

#[tokio::test]
async fn test_cache_entries_from_other_prompt_versions_are_rescreened() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis_cache.json");
    let doc = paper();
    AnalysisCache::open(&path)
        .with_prompt_version("0.0.1")
        .set(VIEWPOINT, &doc.text, &record(9, "Screened by an older prompt."));

    let analyst = Arc::new(ScriptedAnalyst::proposing(Some(record(4, "Fresh analysis."))));
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![Some(
        ReviewVerdict::approve(),
    )]));
    let report = runner(&analyst, &reviewer)
        .with_cache(Some(Arc::new(open_cache(&path))))
        .run(VIEWPOINT, &doc)
        .await;

    assert!(!report.from_cache);
    assert_eq!(report.record.match_reasoning, "Fresh analysis.");
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let key = AnalysisCache::key(VIEWPOINT, &doc.text);
    assert_eq!(raw[&key]["prompt_version"], PROMPT_VERSION);
    assert_eq!(open_cache(&path).get(VIEWPOINT, &doc.text), Some(report.record));
}

#[tokio::test]
async fn test_sink_sees_events_in_order() {
    let seen: Arc<Mutex<Vec<EventKind>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    let sink: SharedEventSink = Arc::new(FnSink(move |event: &DebateEvent| {
        captured.lock().unwrap().push(event.kind);
    }));

    let analyst = Arc::new(
        ScriptedAnalyst::proposing(Some(record(6, "Ok.")))
            .then_revising(vec![Some(record(7, "Better."))]),
    );
    let reviewer = Arc::new(ScriptedReviewer::with_verdicts(vec![
        Some(ReviewVerdict::request_changes("More detail.")),
        Some(ReviewVerdict::approve()),
    ]));

    let report = runner(&analyst, &reviewer)
        .with_sink(Some(sink))
        .run(VIEWPOINT, &paper())
        .await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        report.events.iter().map(|e| e.kind).collect::<Vec<_>>()
    );
    let debate: Vec<EventKind> = seen
        .into_iter()
        .filter(|k| *k != EventKind::Info)
        .collect();
    assert_eq!(
        debate,
        vec![
            EventKind::Analysis,
            EventKind::Critique,
            EventKind::Revision,
            EventKind::Approval
        ]
    );
}

#[tokio::test]
async fn test_viewpoint_analysis_falls_back_on_failure() {
    let analyst = Arc::new(ScriptedAnalyst::default());
    let reviewer = Arc::new(ScriptedReviewer::default());
    let text = "x".repeat(120);

    let analysis = runner(&analyst, &reviewer).analyze_viewpoint(&text).await;

    assert_eq!(analysis.key_viewpoint.chars().count(), 100);
    assert_eq!(analysis.search_queries, vec!["x".repeat(50)]);
    assert!(analysis.english_keywords.is_empty());
}

#[tokio::test]
async fn test_viewpoint_analysis_passes_through() {
    let analyst = Arc::new(ScriptedAnalyst::default());
    *analyst.viewpoint.lock().unwrap() = Some(ViewpointAnalysis {
        core_contribution: "Retrieval for completion".into(),
        key_viewpoint: "Repository context matters".into(),
        search_queries: vec!["repository-level code completion".into()],
        english_keywords: vec!["RAG".into()],
        cot_reasoning: String::new(),
    });
    let reviewer = Arc::new(ScriptedReviewer::default());

    let analysis = runner(&analyst, &reviewer).analyze_viewpoint(VIEWPOINT).await;

    assert_eq!(analysis.key_viewpoint, "Repository context matters");
    assert_eq!(analyst.calls(), vec!["analyze_viewpoint"]);
}
