//! Candidate extraction: locate a JSON structure inside surrounding text.

/// Scan from the first opening brace/bracket and return the substring where
/// nesting depth returns to zero.
///
/// Characters inside double-quoted strings are skipped (backslash escapes
/// respected), so braces embedded in string values do not confuse the scan.
/// Returns `None` when no opener exists or the structure never closes.
pub fn stack_candidate(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Take everything from the first `{`/`[` to the last matching `}`/`]`.
///
/// Survives broken internal quoting that derails [`stack_candidate`], but
/// spans several objects when the text holds more than one.
pub fn span_candidate(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}
