//! Repair pass for near-JSON candidates.

use std::sync::LazyLock;

use regex::Regex;

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*([}\]])").expect("TRAILING_COMMA regex should compile")
});

/// Apply every repair heuristic to a candidate, in order:
/// trailing commas, raw line breaks, unescaped content quotes.
pub fn repair_candidate(candidate: &str) -> String {
    let no_commas = strip_trailing_commas(candidate);
    let flat = flatten_newlines(&no_commas);
    escape_content_quotes(&flat)
}

/// Drop commas that directly precede a closing brace or bracket.
pub fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Replace raw line breaks and tabs with spaces.
///
/// JSON forbids control characters inside strings; outside strings they are
/// plain whitespace, so a space is correct in both places.
pub fn flatten_newlines(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .collect()
}

/// Escape double quotes that do not sit next to a structural token.
///
/// A quote is structural when the next non-space character is one of
/// `: , { [ } ]` (or the text ends), or the previous non-space character is
/// one of `: , { [` (or the text starts). Every other unescaped quote is
/// content and gets a backslash.
pub fn escape_content_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if c == '"' && !is_escaped(&chars, i) && !is_structural_quote(&chars, i) {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

fn is_escaped(chars: &[char], idx: usize) -> bool {
    let backslashes = chars[..idx]
        .iter()
        .rev()
        .take_while(|&&c| c == '\\')
        .count();
    backslashes % 2 == 1
}

fn is_structural_quote(chars: &[char], idx: usize) -> bool {
    let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
    let next_structural = match next {
        None => true,
        Some(c) => matches!(c, ':' | ',' | '{' | '[' | '}' | ']'),
    };
    if next_structural {
        return true;
    }

    let prev = chars[..idx].iter().rev().find(|c| !c.is_whitespace());
    match prev {
        None => true,
        Some(c) => matches!(c, ':' | ',' | '{' | '['),
    }
}
