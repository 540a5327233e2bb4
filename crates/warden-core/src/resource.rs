//! Monitored resources and their fully-qualified identities.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{Error, Result};

/// The kind of configuration-bearing object a rule or snapshot refers to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ResourceKind {
  Warehouse,
  Database,
  Schema,
  Table,
}

impl ResourceKind {
  /// Number of dot-separated name parts in a qualified identity of this kind.
  pub fn name_parts(self) -> usize {
    match self {
      Self::Warehouse | Self::Database => 1,
      Self::Schema => 2,
      Self::Table => 3,
    }
  }
}

/// A resource's fully-qualified identity. The shape differs by kind: a
/// warehouse is addressed by name alone, a table by its
/// database/schema/table triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceIdentity {
  Warehouse {
    name: String,
  },
  Database {
    database: String,
  },
  Schema {
    database: String,
    schema:   String,
  },
  Table {
    database: String,
    schema:   String,
    table:    String,
  },
}

impl ResourceIdentity {
  pub fn warehouse(name: impl Into<String>) -> Self {
    Self::Warehouse { name: name.into() }
  }

  pub fn database(database: impl Into<String>) -> Self {
    Self::Database { database: database.into() }
  }

  pub fn schema(database: impl Into<String>, schema: impl Into<String>) -> Self {
    Self::Schema { database: database.into(), schema: schema.into() }
  }

  pub fn table(
    database: impl Into<String>,
    schema: impl Into<String>,
    table: impl Into<String>,
  ) -> Self {
    Self::Table {
      database: database.into(),
      schema:   schema.into(),
      table:    table.into(),
    }
  }

  /// Parse a dot-separated qualified name (e.g. `DB.SCH.T1`) for `kind`.
  ///
  /// Exactly [`ResourceKind::name_parts`] non-empty parts are required.
  pub fn parse(kind: ResourceKind, input: &str) -> Result<Self> {
    let parts: Vec<&str> = input.trim().split('.').map(str::trim).collect();

    if parts.len() != kind.name_parts() {
      return Err(Error::InvalidIdentity {
        kind,
        input: input.to_owned(),
        reason: "wrong number of name parts",
      });
    }
    if parts.iter().any(|p| p.is_empty()) {
      return Err(Error::InvalidIdentity {
        kind,
        input: input.to_owned(),
        reason: "empty name part",
      });
    }

    Ok(match (kind, parts.as_slice()) {
      (ResourceKind::Warehouse, [name]) => Self::warehouse(*name),
      (ResourceKind::Database, [db]) => Self::database(*db),
      (ResourceKind::Schema, [db, sch]) => Self::schema(*db, *sch),
      (ResourceKind::Table, [db, sch, t]) => Self::table(*db, *sch, *t),
      _ => unreachable!("part count checked above"),
    })
  }

  pub fn kind(&self) -> ResourceKind {
    match self {
      Self::Warehouse { .. } => ResourceKind::Warehouse,
      Self::Database { .. } => ResourceKind::Database,
      Self::Schema { .. } => ResourceKind::Schema,
      Self::Table { .. } => ResourceKind::Table,
    }
  }

  /// Name parts, outermost first.
  pub fn parts(&self) -> Vec<&str> {
    match self {
      Self::Warehouse { name } => vec![name.as_str()],
      Self::Database { database } => vec![database.as_str()],
      Self::Schema { database, schema } => vec![database.as_str(), schema.as_str()],
      Self::Table { database, schema, table } => {
        vec![database.as_str(), schema.as_str(), table.as_str()]
      }
    }
  }

  /// Parts joined with `.`, unquoted. Used for display, search and keys.
  pub fn qualified_name(&self) -> String { self.parts().join(".") }

  /// Parts joined with `.`, each quoted when it is not a plain identifier.
  pub fn sql_name(&self) -> String {
    self
      .parts()
      .into_iter()
      .map(quote_ident)
      .collect::<Vec<_>>()
      .join(".")
  }

  /// Same kind and same parts, ignoring ASCII case.
  pub fn matches(&self, other: &Self) -> bool {
    self.kind() == other.kind()
      && self
        .parts()
        .iter()
        .zip(other.parts())
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
  }

  /// Case-insensitive key suitable for grouping snapshots by resource.
  pub fn key(&self) -> (ResourceKind, String) {
    (self.kind(), self.qualified_name().to_ascii_uppercase())
  }
}

impl fmt::Display for ResourceIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.kind(), self.qualified_name())
  }
}

/// Quote `part` unless it is a plain identifier (`[A-Za-z_][A-Za-z0-9_$]*`).
pub fn quote_ident(part: &str) -> String {
  let mut chars = part.chars();
  let plain = match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {
      chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    }
    _ => false,
  };

  if plain {
    part.to_owned()
  } else {
    format!("\"{}\"", part.replace('"', "\"\""))
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn kind_parses_case_insensitively() {
    assert_eq!(ResourceKind::from_str("warehouse").unwrap(), ResourceKind::Warehouse);
    assert_eq!(ResourceKind::from_str("Table").unwrap(), ResourceKind::Table);
    assert_eq!(ResourceKind::Schema.to_string(), "SCHEMA");
    assert!(ResourceKind::from_str("stage").is_err());
  }

  #[test]
  fn parse_table_identity() {
    let id = ResourceIdentity::parse(ResourceKind::Table, "DB.SCH.T1").unwrap();
    assert_eq!(id, ResourceIdentity::table("DB", "SCH", "T1"));
    assert_eq!(id.qualified_name(), "DB.SCH.T1");
    assert_eq!(id.kind(), ResourceKind::Table);
  }

  #[test]
  fn parse_rejects_wrong_part_count() {
    let err = ResourceIdentity::parse(ResourceKind::Table, "DB.SCH").unwrap_err();
    assert!(matches!(err, Error::InvalidIdentity { .. }));

    let err = ResourceIdentity::parse(ResourceKind::Warehouse, "A.B").unwrap_err();
    assert!(matches!(err, Error::InvalidIdentity { .. }));
  }

  #[test]
  fn parse_rejects_empty_parts() {
    let err = ResourceIdentity::parse(ResourceKind::Schema, "DB.").unwrap_err();
    assert!(matches!(err, Error::InvalidIdentity { reason: "empty name part", .. }));
  }

  #[test]
  fn plain_identifiers_are_not_quoted() {
    assert_eq!(quote_ident("WH_1"), "WH_1");
    assert_eq!(quote_ident("_x$"), "_x$");
  }

  #[test]
  fn unusual_identifiers_are_quoted() {
    assert_eq!(quote_ident("my wh"), "\"my wh\"");
    assert_eq!(quote_ident("1ST"), "\"1ST\"");
    assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
  }

  #[test]
  fn sql_name_quotes_each_part() {
    let id = ResourceIdentity::table("DB", "my schema", "T1");
    assert_eq!(id.sql_name(), "DB.\"my schema\".T1");
  }

  #[test]
  fn matches_ignores_case_but_not_kind() {
    let a = ResourceIdentity::schema("db", "sch");
    let b = ResourceIdentity::schema("DB", "SCH");
    assert!(a.matches(&b));
    assert!(!ResourceIdentity::database("X").matches(&ResourceIdentity::warehouse("X")));
  }

  #[test]
  fn identity_json_shape() {
    let id = ResourceIdentity::warehouse("WH1");
    let json = serde_json::to_value(&id).unwrap();
    assert_eq!(json, serde_json::json!({ "kind": "warehouse", "name": "WH1" }));
  }
}
