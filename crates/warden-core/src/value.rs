//! Scalar configuration values as captured in snapshots and used as
//! thresholds.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

/// The declared type of a monitored parameter.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ValueType {
  Integer,
  Text,
  Boolean,
}

impl ValueType {
  /// Whether MAX/MIN make sense for values of this type.
  pub fn is_ordered(self) -> bool { matches!(self, Self::Integer) }

  /// Parse a threshold typed on the command line or in a config file.
  pub fn parse_value(self, input: &str) -> Result<ConfigValue> {
    let input = input.trim();
    match self {
      Self::Integer => input.parse::<i64>().map(ConfigValue::Integer).map_err(|e| {
        Error::UnsupportedValue { name: input.to_owned(), reason: e.to_string() }
      }),
      Self::Boolean => match input.to_ascii_lowercase().as_str() {
        "true" => Ok(ConfigValue::Boolean(true)),
        "false" => Ok(ConfigValue::Boolean(false)),
        _ => Err(Error::UnsupportedValue {
          name:   input.to_owned(),
          reason: "expected TRUE or FALSE".into(),
        }),
      },
      Self::Text => Ok(ConfigValue::Text(input.to_owned())),
    }
  }
}

/// A single configuration value.
///
/// Equality is structural with no coercion: `Text("TRUE")` is not equal to
/// `Boolean(true)`. Callers normalise both sides beforehand if they want
/// that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
  Boolean(bool),
  Integer(i64),
  Text(String),
}

impl ConfigValue {
  pub fn value_type(&self) -> ValueType {
    match self {
      Self::Boolean(_) => ValueType::Boolean,
      Self::Integer(_) => ValueType::Integer,
      Self::Text(_) => ValueType::Text,
    }
  }

  /// Convert a scalar from a JSON export. `null` means "not captured".
  pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Option<Self>> {
    use serde_json::Value;

    match value {
      Value::Null => Ok(None),
      Value::Bool(b) => Ok(Some(Self::Boolean(*b))),
      Value::String(s) => Ok(Some(Self::Text(s.clone()))),
      Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          return Ok(Some(Self::Integer(i)));
        }
        // Exports sometimes render integral columns as `300.0`.
        match n.as_f64() {
          Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Ok(Some(Self::Integer(f as i64)))
          }
          _ => Err(Error::UnsupportedValue {
            name:   name.to_owned(),
            reason: format!("{n} is not an integer"),
          }),
        }
      }
      Value::Array(_) | Value::Object(_) => Err(Error::UnsupportedValue {
        name:   name.to_owned(),
        reason: "only scalar values can be compared".into(),
      }),
    }
  }

  /// Render as a SQL literal: integers bare, booleans as `TRUE`/`FALSE`,
  /// text single-quoted.
  pub fn sql_literal(&self) -> String {
    match self {
      Self::Boolean(true) => "TRUE".into(),
      Self::Boolean(false) => "FALSE".into(),
      Self::Integer(i) => i.to_string(),
      Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
  }
}

/// Only two integers or two texts are ordered; any other pair is
/// incomparable.
impl PartialOrd for ConfigValue {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    match (self, other) {
      (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
      (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
      (Self::Boolean(a), Self::Boolean(b)) if a == b => Some(Ordering::Equal),
      _ => None,
    }
  }
}

impl fmt::Display for ConfigValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Boolean(b) => f.pad(if *b { "TRUE" } else { "FALSE" }),
      Self::Integer(i) => f.pad(&i.to_string()),
      Self::Text(s) => f.pad(s),
    }
  }
}

impl From<i64> for ConfigValue {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<i32> for ConfigValue {
  fn from(v: i32) -> Self { Self::Integer(v.into()) }
}

impl From<bool> for ConfigValue {
  fn from(v: bool) -> Self { Self::Boolean(v) }
}

impl From<&str> for ConfigValue {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<String> for ConfigValue {
  fn from(v: String) -> Self { Self::Text(v) }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn no_coercion_between_types() {
    assert_ne!(ConfigValue::from("TRUE"), ConfigValue::from(true));
    assert_ne!(ConfigValue::from("30"), ConfigValue::from(30));
    assert_eq!(ConfigValue::from(30).partial_cmp(&ConfigValue::from("30")), None);
  }

  #[test]
  fn integers_are_ordered() {
    assert!(ConfigValue::from(20) < ConfigValue::from(30));
    assert!(ConfigValue::from(300) > ConfigValue::from(30));
  }

  #[test]
  fn from_json_scalars() {
    assert_eq!(ConfigValue::from_json("x", &json!(null)).unwrap(), None);
    assert_eq!(
      ConfigValue::from_json("x", &json!(300)).unwrap(),
      Some(ConfigValue::Integer(300))
    );
    assert_eq!(
      ConfigValue::from_json("x", &json!(300.0)).unwrap(),
      Some(ConfigValue::Integer(300))
    );
    assert_eq!(
      ConfigValue::from_json("x", &json!("STANDARD")).unwrap(),
      Some(ConfigValue::Text("STANDARD".into()))
    );
    assert_eq!(
      ConfigValue::from_json("x", &json!(false)).unwrap(),
      Some(ConfigValue::Boolean(false))
    );
  }

  #[test]
  fn from_json_rejects_fractions_and_structures() {
    assert!(ConfigValue::from_json("x", &json!(1.5)).is_err());
    assert!(ConfigValue::from_json("x", &json!([1])).is_err());
    assert!(ConfigValue::from_json("x", &json!({ "a": 1 })).is_err());
  }

  #[test]
  fn sql_literals() {
    assert_eq!(ConfigValue::from(30).sql_literal(), "30");
    assert_eq!(ConfigValue::from(true).sql_literal(), "TRUE");
    assert_eq!(ConfigValue::from("it's").sql_literal(), "'it''s'");
  }

  #[test]
  fn untagged_serde_roundtrip_keeps_types() {
    let values = vec![
      ConfigValue::from(7),
      ConfigValue::from("ECONOMY"),
      ConfigValue::from(false),
    ];
    let json = serde_json::to_string(&values).unwrap();
    assert_eq!(json, r#"[7,"ECONOMY",false]"#);
    let back: Vec<ConfigValue> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, values);
  }

  #[test]
  fn parse_value_by_type() {
    assert_eq!(ValueType::Integer.parse_value(" 30 ").unwrap(), ConfigValue::from(30));
    assert_eq!(ValueType::Boolean.parse_value("True").unwrap(), ConfigValue::from(true));
    assert_eq!(
      ValueType::Text.parse_value("STANDARD").unwrap(),
      ConfigValue::from("STANDARD")
    );
    assert!(ValueType::Integer.parse_value("thirty").is_err());
  }

  #[test]
  fn display_honours_width() {
    assert_eq!(format!("[{:<6}]", ConfigValue::from(30)), "[30    ]");
    assert_eq!(format!("[{:>8}]", ConfigValue::from("STANDARD")), "[STANDARD]");
    assert_eq!(format!("[{:<6}]", ConfigValue::from(true)), "[TRUE  ]");
    assert_eq!(ConfigValue::from(-5).to_string(), "-5");
  }
}
