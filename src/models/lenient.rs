//! Serde helpers for backend records. Text fields may arrive as numbers,
//! booleans or null; none of that rejects the record.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Text form of a JSON value. Null is `None`, strings are taken as is,
/// anything else is its JSON text (`3`, `true`).
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Leading decimal digits of `raw`, so `"48 years"` reads as 48.
pub fn leading_integer(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub(crate) fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(value_text))
}

/// Like [`opt_string`], null reading as `""`.
pub(crate) fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string(deserializer).map(Option::unwrap_or_default)
}

/// Any non-null value, kept verbatim.
pub(crate) fn opt_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer)
}

/// Keeps only the `YYYY-MM-DD` part of a timestamp.
pub(crate) fn date_part<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string(deserializer)?.map(|s| match s.split_once('T') {
        Some((date, _)) => date.to_string(),
        None => s,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_become_text() {
        assert_eq!(value_text(&json!(3)).as_deref(), Some("3"));
        assert_eq!(value_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(value_text(&json!("x")).as_deref(), Some("x"));
        assert_eq!(value_text(&Value::Null), None);
    }

    #[test]
    fn leading_integer_stops_at_first_non_digit() {
        assert_eq!(leading_integer("48"), Some(48));
        assert_eq!(leading_integer(" 61 years"), Some(61));
        assert_eq!(leading_integer("-4"), None);
        assert_eq!(leading_integer("unknown"), None);
        assert_eq!(leading_integer(""), None);
    }
}
