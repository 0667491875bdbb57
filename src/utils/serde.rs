//! Serde helpers for configuration values that may arrive as numbers or strings.
//!
//! Environment-variable overrides reach the deserializer as strings, while the
//! same field in a TOML file is a number. These helpers accept either, and treat
//! an empty string or `"none"` as an unset optional.

use serde::{Deserialize, Deserializer};

fn parse_optional<'de, D, T>(deserializer: D, field_kind: &str) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + TryFrom<i64>,
{
    use serde::de::Error;

    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => {
            let raw = n
                .as_i64()
                .ok_or_else(|| D::Error::custom(format!("Invalid {field_kind} value: {n}")))?;
            T::try_from(raw)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("{field_kind} value out of range: {raw}")))
        }
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                return Ok(None);
            }
            trimmed
                .parse::<T>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("Cannot parse '{s}' as {field_kind}")))
        }
        Some(other) => Err(D::Error::custom(format!(
            "Expected {field_kind} value, found: {other}"
        ))),
    }
}

/// Deserialize an optional non-negative count (`worker_pool.size`).
pub fn deserialize_optional_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_optional(deserializer, "count")
}

/// Deserialize an optional calendar year (`control_year.fixed`).
pub fn deserialize_optional_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_optional(deserializer, "year")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct PoolSection {
        #[serde(default, deserialize_with = "deserialize_optional_count")]
        size: Option<usize>,
        #[serde(default, deserialize_with = "deserialize_optional_year")]
        fixed: Option<i32>,
    }

    #[test]
    fn test_numbers_and_numeric_strings() {
        let parsed: PoolSection = serde_json::from_str(r#"{"size": 8, "fixed": "2024"}"#).unwrap();
        assert_eq!(parsed.size, Some(8));
        assert_eq!(parsed.fixed, Some(2024));
    }

    #[test]
    fn test_missing_null_and_none_are_unset() {
        let parsed: PoolSection = serde_json::from_str(r#"{"size": null, "fixed": "none"}"#).unwrap();
        assert_eq!(parsed, PoolSection { size: None, fixed: None });

        let parsed: PoolSection = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.size, None);
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let result: Result<PoolSection, _> = serde_json::from_str(r#"{"size": -4}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_string_is_rejected() {
        let result: Result<PoolSection, _> = serde_json::from_str(r#"{"size": "lots"}"#);
        assert!(result.is_err());
    }
}
