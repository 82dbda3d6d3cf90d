//! Structured output recovery: turns unreliable model text into JSON.
//!
//! Local models wrap JSON in prose, reasoning blocks and code fences, forget
//! to escape quotes inside string values, emit trailing commas, or answer
//! with Python-style literals. Recovery runs a staged pipeline where each
//! stage is attempted only when the previous one failed:
//!
//! ```text
//! raw text
//!   ├─ direct parse ─────────────────────────────→ Direct
//!   │ strip leading <think> blocks + code fences
//!   ├─ direct parse ─────────────────────────────→ Direct
//!   ├─ candidates (stack scan, outermost span)
//!   │    ├─ parse as-is ─────────────────────────→ StackCandidate | SpanCandidate
//!   │    └─ repair (commas, newlines, quotes) ───→ Repaired
//!   ├─ loose literal evaluation ─────────────────→ Loose
//!   └─ give up ──────────────────────────────────→ Unparseable { preview }
//! ```
//!
//! The destructive quote repair only runs after every non-destructive attempt
//! failed. Nothing in this module panics or returns an error: total failure
//! is the `Unparseable` variant.

pub mod extract;
pub mod loose;
pub mod repair;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use extract::{span_candidate, stack_candidate};
pub use loose::parse_loose;
pub use repair::repair_candidate;

/// Maximum number of characters kept in an unparseable preview.
pub const PREVIEW_CHARS: usize = 200;

static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:think|thinking|reasoning)>.*?</(?:think|thinking|reasoning)>")
        .expect("REASONING_BLOCK regex should compile")
});

static REASONING_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:think|thinking|reasoning)>")
        .expect("REASONING_OPEN regex should compile")
});

static REASONING_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:think|thinking|reasoning)>")
        .expect("REASONING_CLOSE regex should compile")
});

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*$").expect("FENCE_LINE regex should compile")
});

static FENCE_EDGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A```[A-Za-z0-9_+-]*|```\z").expect("FENCE_EDGE regex should compile")
});

/// Pipeline stage that produced a parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStage {
    /// The stripped text was already valid JSON.
    Direct,
    /// Stack-scanned candidate parsed without repair.
    StackCandidate,
    /// Outermost-span candidate parsed without repair.
    SpanCandidate,
    /// A candidate parsed after the repair pass.
    Repaired,
    /// Permissive literal evaluation.
    Loose,
}

impl std::fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::StackCandidate => write!(f, "stack_candidate"),
            Self::SpanCandidate => write!(f, "span_candidate"),
            Self::Repaired => write!(f, "repaired"),
            Self::Loose => write!(f, "loose"),
        }
    }
}

/// Result of running the recovery pipeline over raw model text.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// A JSON object or array was recovered.
    Parsed { value: Value, stage: RecoveryStage },
    /// Every stage failed. `preview` is a bounded prefix of the raw text.
    Unparseable { preview: String },
}

impl Recovery {
    /// Whether a value was recovered.
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed { .. })
    }

    /// The recovered value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Parsed { value, .. } => Some(value),
            Self::Unparseable { .. } => None,
        }
    }

    /// The recovered value if it is a JSON object.
    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self.into_value() {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Stage that succeeded, if any.
    pub fn stage(&self) -> Option<RecoveryStage> {
        match self {
            Self::Parsed { stage, .. } => Some(*stage),
            Self::Unparseable { .. } => None,
        }
    }
}

/// Run the full recovery pipeline over `raw`.
pub fn recover(raw: &str) -> Recovery {
    if let Some(value) = parse_structured(raw.trim()) {
        return parsed(value, RecoveryStage::Direct);
    }

    let stripped = strip_framing(raw);

    if let Some(value) = parse_structured(&stripped) {
        return parsed(value, RecoveryStage::Direct);
    }

    let stack = stack_candidate(&stripped);
    let span = span_candidate(&stripped).filter(|s| Some(*s) != stack);

    let candidates: Vec<(&str, RecoveryStage)> = [
        stack.map(|c| (c, RecoveryStage::StackCandidate)),
        span.map(|c| (c, RecoveryStage::SpanCandidate)),
    ]
    .into_iter()
    .flatten()
    .collect();

    for (candidate, stage) in &candidates {
        if let Some(value) = parse_structured(candidate) {
            return parsed(value, *stage);
        }
    }

    for (candidate, _) in &candidates {
        let repaired = repair_candidate(candidate);
        if let Some(value) = parse_structured(&repaired) {
            return parsed(value, RecoveryStage::Repaired);
        }
    }

    let loose_inputs = candidates
        .iter()
        .map(|(c, _)| *c)
        .chain(std::iter::once(stripped.as_str()));
    for input in loose_inputs {
        if let Some(value) = parse_loose(input).filter(is_structure) {
            return parsed(value, RecoveryStage::Loose);
        }
    }

    let preview = preview(raw);
    debug!(preview = %preview, "structured output unparseable");
    Recovery::Unparseable { preview }
}

/// Remove reasoning blocks and code-fence markers, then trim.
///
/// Only framing ahead of the payload is touched, so tags and fences quoted
/// inside string values survive. A reasoning tag counts as framing when it
/// sits before the first `{`/`[`; a closing tag also counts when the
/// payload starts right after it. An unclosed opening tag keeps the text
/// before it (or just drops the tag when nothing precedes it). A stray
/// closing tag drops everything before it. Fences are removed only when
/// they stand alone on a line or open/close the whole text.
pub fn strip_framing(raw: &str) -> String {
    let mut text = raw.to_string();

    while let Some(range) = REASONING_BLOCK
        .find(&text)
        .filter(|m| precedes_payload(&text, m.start()))
        .map(|m| m.range())
    {
        text.replace_range(range, "");
    }

    let open = REASONING_OPEN
        .find(&text)
        .filter(|m| precedes_payload(&text, m.start()))
        .map(|m| m.range());
    if let Some(open) = open {
        let before = text[..open.start].trim();
        text = if before.is_empty() {
            text[open.end..].to_string()
        } else {
            before.to_string()
        };
    }

    while let Some(end) = REASONING_CLOSE
        .find(&text)
        .filter(|m| precedes_payload(&text, m.start()) || opens_payload(&text[m.end()..]))
        .map(|m| m.end())
    {
        text = text[end..].to_string();
    }

    let text = FENCE_LINE.replace_all(&text, "");
    FENCE_EDGE.replace_all(text.trim(), "").trim().to_string()
}

/// Whether `pos` lies before the first structural opener.
fn precedes_payload(text: &str, pos: usize) -> bool {
    text.find(['{', '[']).map_or(true, |start| pos < start)
}

fn opens_payload(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.starts_with('{') || rest.starts_with('[') || rest.starts_with("```")
}

/// Bounded preview of raw text for diagnostics.
pub fn preview(raw: &str) -> String {
    let mut out: String = raw.chars().take(PREVIEW_CHARS).collect();
    if raw.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(is_structure)
}

fn is_structure(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn parsed(value: Value, stage: RecoveryStage) -> Recovery {
    debug!(%stage, "structured output recovered");
    Recovery::Parsed { value, stage }
}
