//! Error types for `warden-core`.

use thiserror::Error;

use crate::{resource::ResourceKind, rule::Operator, value::ValueType};

#[derive(Debug, Error)]
pub enum Error {
  /// The rule names a parameter the snapshot store does not capture for its
  /// resource kind.
  #[error("rule {rule_id}: no {kind} parameter named {parameter:?} is captured")]
  UnknownParameter {
    rule_id:   String,
    kind:      ResourceKind,
    parameter: String,
  },

  /// No statement template is registered for the parameter.
  #[error("no remediation template registered for {kind} parameter {parameter:?}")]
  UnsupportedParameter {
    kind:      ResourceKind,
    parameter: String,
  },

  #[error(
    "rule {rule_id}: operator {operator} cannot be used with {value_type} \
     parameter {parameter:?}"
  )]
  OperatorNotSupported {
    rule_id:    String,
    operator:   Operator,
    parameter:  String,
    value_type: ValueType,
  },

  #[error("rule {rule_id}: {role} {value} is not a {expected} value")]
  ThresholdTypeMismatch {
    rule_id:  String,
    /// `"threshold"` or `"remediation value"`.
    role:     &'static str,
    value:    String,
    expected: ValueType,
  },

  #[error(
    "rule {rule_id} on {resource}: captured {parameter} = {actual} is not a \
     {expected} value"
  )]
  ValueTypeMismatch {
    rule_id:   String,
    resource:  String,
    parameter: String,
    actual:    String,
    expected:  ValueType,
  },

  #[error("rule {rule_id} targets {expected} resources, but {resource} is a {actual}")]
  ResourceKindMismatch {
    rule_id:  String,
    resource: String,
    expected: ResourceKind,
    actual:   ResourceKind,
  },

  #[error("rule {0} has more than one active applied threshold")]
  ConflictingAppliedRules(String),

  #[error("rule not found: {0}")]
  RuleNotFound(String),

  #[error("rule {0} has no remediation value; NOT_EQUALS rules need one to be fixed")]
  NoRemediationValue(String),

  #[error("invalid {kind} identity {input:?}: {reason}")]
  InvalidIdentity {
    kind:   ResourceKind,
    input:  String,
    reason: &'static str,
  },

  #[error("unsupported value for {name:?}: {reason}")]
  UnsupportedValue { name: String, reason: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
