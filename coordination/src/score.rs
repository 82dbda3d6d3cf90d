//! Score normalization: coerce heterogeneous score shapes into [0, 10].

use serde_json::Value;

/// Lower bound of every score dimension.
pub const SCORE_MIN: f64 = 0.0;
/// Upper bound of every score dimension.
pub const SCORE_MAX: f64 = 10.0;

/// Normalize a model-provided score into the closed interval [0, 10].
///
/// - A mapping yields its `relevance` entry, else its `total` entry, else 0.
/// - Numbers and numeric strings are coerced; anything else is 0.
/// - Out-of-range values saturate at the bounds.
pub fn normalize_score(value: &Value) -> f64 {
    let scalar = match value {
        Value::Object(map) => match map.get("relevance").or_else(|| map.get("total")) {
            Some(inner) => inner,
            None => return SCORE_MIN,
        },
        other => other,
    };
    coerce(scalar).map(clamp_score).unwrap_or(SCORE_MIN)
}

/// Saturate a raw number into [0, 10]. NaN maps to 0.
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        return SCORE_MIN;
    }
    raw.clamp(SCORE_MIN, SCORE_MAX)
}

/// Round a normalized score to the integer stored in a record.
pub fn to_integer_score(score: f64) -> u8 {
    clamp_score(score).round() as u8
}

fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
