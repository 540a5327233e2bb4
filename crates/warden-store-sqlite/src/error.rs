//! Error type for `warden-store-sqlite`.

use thiserror::Error;
use warden_core::resource::ResourceKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] warden_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value no variant matches.
  #[error("unrecognised {column} value {value:?}")]
  Decode { column: &'static str, value: String },

  #[error("rule not found: {0}")]
  RuleNotFound(String),

  #[error("rule {0} is already defined")]
  DuplicateRule(String),

  #[error("rule {0} is retired")]
  RuleRetired(String),

  #[error("applied rule not found: {0}")]
  AppliedRuleNotFound(uuid::Uuid),

  #[error("applied rule {0} is already superseded")]
  AlreadySuperseded(uuid::Uuid),

  #[error("applied rule {0} is already deactivated")]
  AlreadyDeactivated(uuid::Uuid),

  #[error("tag {tag_name} is already required for {kind} resources")]
  DuplicateTagRequirement { kind: ResourceKind, tag_name: String },

  #[error("snapshot of {resource} cannot be loaded as {expected}")]
  SnapshotKindMismatch {
    expected: ResourceKind,
    resource: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
