use crate::date::from_iso;
use serde_json::Value;

/// Extract lowercased author from a JSON value.
pub fn author_lower(v: &Value) -> Option<String> {
    v.get("author")
        .and_then(|x| x.as_str())
        .map(|s| s.to_lowercase())
}

/// Extract lowercased subreddit from a JSON value.
pub fn subreddit_lower(v: &Value) -> Option<String> {
    v.get("subreddit")
        .and_then(|x| x.as_str())
        .map(|s| s.to_lowercase())
}

/// Integer view of a scalar: numbers (floats truncated) and numeric strings.
pub fn lenient_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Epoch seconds of a timestamp field holding either a number or an ISO-8601 string.
pub fn epoch_field(v: &Value, key: &str) -> Option<i64> {
    let raw = v.get(key)?;
    lenient_i64(raw).or_else(|| raw.as_str().and_then(|s| from_iso(s).ok()))
}

/// `created_utc` as epoch seconds.
#[inline]
pub fn created_utc(v: &Value) -> Option<i64> {
    epoch_field(v, "created_utc")
}
