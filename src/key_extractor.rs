use crate::json_utils::{author_lower, created_utc, lenient_i64};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Orderable key pulled from a record. Numbers sort before text.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortKey {
    Int(i64),
    Text(String),
}

/// A reusable key extractor with fast paths for the fields backups are sorted on,
/// plus JSON-pointer and custom extractors.
///
/// Two calling styles:
///  - `key_from_value(&Value)`
///  - `key_from_line(&str)`
#[derive(Clone)]
pub enum KeyExtractor {
    AuthorLower,
    Id,
    CreatedUtc,
    AccountId,
    JsonPointer(String),
    ByValue(Arc<dyn Fn(&Value) -> Option<SortKey> + Send + Sync>),
}

impl KeyExtractor {
    pub fn author_lowercase() -> Self { Self::AuthorLower }
    pub fn id() -> Self { Self::Id }
    pub fn created_utc() -> Self { Self::CreatedUtc }
    pub fn account_id() -> Self { Self::AccountId }
    pub fn json_pointer(ptr: impl Into<String>) -> Self { Self::JsonPointer(ptr.into()) }
    pub fn by_value(f: impl Fn(&Value) -> Option<SortKey> + Send + Sync + 'static) -> Self {
        Self::ByValue(Arc::new(f))
    }

    /// Parse a CLI-style name: `author`, `id`, `created_utc`, `acc_id`, or a `/json/pointer`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "author" => Some(Self::AuthorLower),
            "id" => Some(Self::Id),
            "created_utc" | "created" => Some(Self::CreatedUtc),
            "acc_id" => Some(Self::AccountId),
            p if p.starts_with('/') => Some(Self::JsonPointer(p.to_string())),
            _ => None,
        }
    }

    /// Extract the key from a full `serde_json::Value`.
    pub fn key_from_value(&self, v: &Value) -> Option<SortKey> {
        match self {
            KeyExtractor::AuthorLower => author_lower(v).map(SortKey::Text),
            KeyExtractor::Id => v.get("id").and_then(scalar_key),
            KeyExtractor::CreatedUtc => created_utc(v).map(SortKey::Int),
            KeyExtractor::AccountId => v.get("acc_id").and_then(lenient_i64).map(SortKey::Int),
            KeyExtractor::JsonPointer(ptr) => v.pointer(ptr).and_then(scalar_key),
            KeyExtractor::ByValue(f) => f(v),
        }
    }

    pub fn key_from_line(&self, line: &str) -> Option<SortKey> {
        let v: Value = serde_json::from_str(line).ok()?;
        self.key_from_value(&v)
    }

    /// Compare two records by key; records without a key sort last.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (self.key_from_value(a), self.key_from_value(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

fn scalar_key(v: &Value) -> Option<SortKey> {
    match v {
        Value::Number(_) => lenient_i64(v).map(SortKey::Int),
        Value::String(s) => Some(SortKey::Text(s.clone())),
        Value::Bool(b) => Some(SortKey::Int(i64::from(*b))),
        _ => None,
    }
}
