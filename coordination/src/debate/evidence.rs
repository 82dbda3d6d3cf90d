//! Evidence snippets gathered when a reviewer raises open questions.

use serde::{Deserialize, Serialize};

/// One search hit handed to the analyst's revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub title: String,
    pub snippet: String,
}

impl EvidenceSnippet {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
        }
    }
}

/// Render snippets as a bullet list for prompts. Empty input renders empty.
pub fn format_evidence(snippets: &[EvidenceSnippet]) -> String {
    snippets
        .iter()
        .map(|s| {
            let title = s.title.trim();
            let body = s.snippet.trim();
            if title.is_empty() {
                format!("- {}", body)
            } else {
                format!("- {}: {}", title, body)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
