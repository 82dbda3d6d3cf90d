//! Batch screening with backfill.
//!
//! Documents are debated through a bounded worker pool, ranked by
//! relevance and split into accepted and rejected sets. When too few clear
//! the acceptance threshold, the best rejects are promoted.

use std::sync::Arc;

use coordination::{AnalysisRecord, TerminalState};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::agents::Document;
use crate::config::BatchSettings;
use crate::runner::DebateRunner;

/// Why a document ended up where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Accepted,
    /// Below the threshold but promoted to reach the minimum.
    Backfilled,
    Rejected,
}

impl std::fmt::Display for ScreeningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Backfilled => write!(f, "backfilled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A document with its final record.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenedDocument {
    pub document: Document,
    pub record: AnalysisRecord,
    pub terminal: Option<TerminalState>,
    pub from_cache: bool,
    pub status: ScreeningStatus,
}

impl ScreenedDocument {
    pub fn relevance(&self) -> u8 {
        self.record.relevance_score
    }

    pub fn is_backfilled(&self) -> bool {
        self.status == ScreeningStatus::Backfilled
    }
}

/// Ranked outcome of a batch. Both lists are sorted by relevance, highest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub accepted: Vec<ScreenedDocument>,
    pub rejected: Vec<ScreenedDocument>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty()
    }

    pub fn backfilled(&self) -> usize {
        self.accepted.iter().filter(|d| d.is_backfilled()).count()
    }
}

/// Rank `results` and split them at `accept_threshold`, promoting the best
/// rejects until `min_accepted` is met or none remain.
///
/// Ties keep their input order.
pub fn partition(
    mut results: Vec<ScreenedDocument>,
    accept_threshold: u8,
    min_accepted: usize,
) -> BatchReport {
    results.sort_by(|a, b| b.relevance().cmp(&a.relevance()));

    let (mut accepted, mut rejected): (Vec<_>, Vec<_>) = results
        .into_iter()
        .partition(|d| d.relevance() >= accept_threshold);
    for doc in &mut accepted {
        doc.status = ScreeningStatus::Accepted;
    }
    for doc in &mut rejected {
        doc.status = ScreeningStatus::Rejected;
    }

    let shortfall = min_accepted.saturating_sub(accepted.len()).min(rejected.len());
    if shortfall > 0 {
        info!(shortfall, "backfilling accepted set from top rejects");
        for mut doc in rejected.drain(..shortfall) {
            doc.status = ScreeningStatus::Backfilled;
            accepted.push(doc);
        }
    }

    BatchReport { accepted, rejected }
}

impl DebateRunner {
    /// Screen `documents` against `viewpoint` and partition the results.
    ///
    /// At most `settings.screening_concurrency` debates run at once. A
    /// panicked worker yields an error record for its document.
    pub async fn screen_batch(
        &self,
        viewpoint: &str,
        documents: &[Document],
        settings: &BatchSettings,
    ) -> BatchReport {
        let width = settings.screening_concurrency.max(1);
        info!(documents = documents.len(), width, "screening batch");

        let semaphore = Arc::new(Semaphore::new(width));
        let viewpoint: Arc<str> = Arc::from(viewpoint);
        let mut join_set = JoinSet::new();

        for (idx, document) in documents.iter().cloned().enumerate() {
            let sem = semaphore.clone();
            let runner = self.clone();
            let viewpoint = viewpoint.clone();
            join_set.spawn(async move {
                // The semaphore is never closed, so acquire only fails if it is.
                let _permit = sem.acquire().await.ok();
                let report = runner.run(&viewpoint, &document).await;
                (idx, report)
            });
        }

        let mut reports = vec![None; documents.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, report)) => reports[idx] = Some(report),
                Err(e) => warn!(error = %e, "screening task panicked"),
            }
        }

        let results: Vec<ScreenedDocument> = documents
            .iter()
            .cloned()
            .zip(reports)
            .map(|(document, report)| match report {
                Some(report) => ScreenedDocument {
                    document,
                    record: report.record,
                    terminal: report.terminal,
                    from_cache: report.from_cache,
                    status: ScreeningStatus::Rejected,
                },
                None => ScreenedDocument {
                    document,
                    record: AnalysisRecord::error("Screening task failed"),
                    terminal: None,
                    from_cache: false,
                    status: ScreeningStatus::Rejected,
                },
            })
            .collect();

        let report = partition(results, settings.accept_threshold, settings.min_accepted);
        info!(
            accepted = report.accepted.len(),
            backfilled = report.backfilled(),
            rejected = report.rejected.len(),
            "batch screened"
        );
        report
    }
}
