//! Evidence search used when a reviewer raises open questions.
//!
//! Search is best-effort: implementations return an empty list on failure
//! and never surface errors to the debate.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::EvidenceSnippet;

/// A source of evidence snippets.
#[async_trait]
pub trait EvidenceSearch: Send + Sync {
    /// Run `queries` and return matching snippets (possibly empty).
    async fn search(&self, queries: &[String]) -> Vec<EvidenceSnippet>;

    /// Whether this source can return anything at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Search that finds nothing; disables evidence rounds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvidenceSearch;

#[async_trait]
impl EvidenceSearch for NoEvidenceSearch {
    async fn search(&self, _queries: &[String]) -> Vec<EvidenceSnippet> {
        Vec::new()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Keyword search over a fixed, in-memory snippet corpus.
#[derive(Debug, Clone, Default)]
pub struct StaticEvidenceSearch {
    corpus: Vec<EvidenceSnippet>,
    max_results: usize,
}

impl StaticEvidenceSearch {
    pub fn new(corpus: Vec<EvidenceSnippet>) -> Self {
        Self {
            corpus,
            max_results: 5,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Load a JSON array of `{title, snippet}` objects.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read evidence corpus {}", path.display()))?;
        let corpus: Vec<EvidenceSnippet> =
            serde_json::from_str(&content).context("Failed to parse evidence corpus JSON")?;
        Ok(Self::new(corpus))
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

/// Lowercased query terms long enough to be meaningful.
fn terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl EvidenceSearch for StaticEvidenceSearch {
    async fn search(&self, queries: &[String]) -> Vec<EvidenceSnippet> {
        let query_terms: Vec<String> = queries.iter().flat_map(|q| terms(q)).collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .corpus
            .iter()
            .enumerate()
            .filter_map(|(idx, snippet)| {
                let haystack = format!("{} {}", snippet.title, snippet.snippet).to_lowercase();
                let hits = query_terms
                    .iter()
                    .filter(|t| haystack.contains(t.as_str()))
                    .count();
                (hits > 0).then_some((idx, hits))
            })
            .collect();
        // Most hits first; corpus order breaks ties.
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(self.max_results)
            .map(|(idx, _)| self.corpus[idx].clone())
            .collect()
    }

    fn is_enabled(&self) -> bool {
        !self.corpus.is_empty()
    }
}
