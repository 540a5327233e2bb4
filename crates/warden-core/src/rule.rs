//! Rule definitions and applied thresholds.
//!
//! A [`Rule`] is a named check of the form "<parameter> <operator>
//! <threshold>" without the threshold. An [`AppliedRule`] instantiates a rule
//! with a concrete threshold. Applied rules are immutable; changing a
//! threshold records a new applied rule and supersedes the previous one (see
//! [`crate::lifecycle`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{resource::ResourceKind, snapshot::ResourceSnapshot, value::ConfigValue};

// ─── Operator ────────────────────────────────────────────────────────────────

/// How the captured value is compared against the threshold.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Operator {
  /// Compliant iff `actual <= threshold`.
  Max,
  /// Compliant iff `actual >= threshold`.
  Min,
  /// Compliant iff `actual == threshold`.
  Equals,
  /// Compliant iff `actual != threshold`.
  NotEquals,
}

impl Operator {
  /// MAX and MIN need a total order on the parameter's domain.
  pub fn requires_ordering(self) -> bool { matches!(self, Self::Max | Self::Min) }

  /// Whether `actual` satisfies this operator against `threshold`.
  ///
  /// Returns `None` when the operator needs an ordering and the two values
  /// are not comparable.
  pub fn holds(self, actual: &ConfigValue, threshold: &ConfigValue) -> Option<bool> {
    match self {
      Self::Max => actual.partial_cmp(threshold).map(|o| o.is_le()),
      Self::Min => actual.partial_cmp(threshold).map(|o| o.is_ge()),
      Self::Equals => Some(actual == threshold),
      Self::NotEquals => Some(actual != threshold),
    }
  }

  /// Requirement phrase used in violation messages, followed by the
  /// threshold.
  pub fn requirement(self) -> &'static str {
    match self {
      Self::Max => "must be at most",
      Self::Min => "must be at least",
      Self::Equals => "must equal",
      Self::NotEquals => "must not equal",
    }
  }
}

// ─── Remediation mode ────────────────────────────────────────────────────────

/// Which remediation affordances a rule offers for its violations.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Remediation {
  /// Violations are reported only.
  None,
  /// A fix statement is generated for display.
  #[default]
  Sql,
  /// A fix statement is generated and may be submitted for execution by the
  /// dispatching layer.
  SqlAndExecute,
}

impl Remediation {
  pub fn generates_sql(self) -> bool { !matches!(self, Self::None) }

  pub fn allows_execute(self) -> bool { matches!(self, Self::SqlAndExecute) }
}

// ─── Rule ────────────────────────────────────────────────────────────────────

/// A rule definition from the catalog.
///
/// Immutable except for retirement (`is_active` flips to `false`); never
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
  pub rule_id:       String,
  pub rule_name:     String,
  pub description:   Option<String>,
  pub resource_kind: ResourceKind,
  /// Lower-case name of the monitored attribute, e.g. `auto_suspend`.
  pub parameter:     String,
  pub operator:      Operator,
  /// Display-only, e.g. "seconds".
  pub unit:          Option<String>,
  pub remediation:   Remediation,
  pub is_active:     bool,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::ComplianceStore::define_rule`].
#[derive(Debug, Clone)]
pub struct NewRule {
  pub rule_id:       String,
  pub rule_name:     String,
  pub description:   Option<String>,
  pub resource_kind: ResourceKind,
  pub parameter:     String,
  pub operator:      Operator,
  pub unit:          Option<String>,
  pub remediation:   Remediation,
}

impl NewRule {
  /// Convenience constructor. The rule id is upper-cased, the parameter
  /// lower-cased, and the rule name defaults to the id.
  pub fn new(
    rule_id: &str,
    resource_kind: ResourceKind,
    parameter: &str,
    operator: Operator,
  ) -> Self {
    let rule_id = rule_id.trim().to_ascii_uppercase();
    Self {
      rule_name: rule_id.clone(),
      rule_id,
      description: None,
      resource_kind,
      parameter: parameter.trim().to_ascii_lowercase(),
      operator,
      unit: None,
      remediation: Remediation::default(),
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.rule_name = name.into();
    self
  }

  pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
    self.unit = Some(unit.into());
    self
  }

  pub fn with_remediation(mut self, remediation: Remediation) -> Self {
    self.remediation = remediation;
    self
  }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Which resources of the rule's kind an applied rule covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RuleScope {
  #[default]
  All,
  /// Only resources carrying `tag_name` (and, if given, with `tag_value`).
  Tagged {
    tag_name:  String,
    tag_value: Option<String>,
  },
}

impl RuleScope {
  pub fn matches(&self, snapshot: &ResourceSnapshot) -> bool {
    match self {
      Self::All => true,
      Self::Tagged { tag_name, tag_value } => match (snapshot.tag(tag_name), tag_value) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(actual), Some(wanted)) => actual.eq_ignore_ascii_case(wanted),
      },
    }
  }
}

// ─── AppliedRule ─────────────────────────────────────────────────────────────

/// A rule instantiated with a concrete threshold. Once written, no field is
/// ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
  pub applied_rule_id:   Uuid,
  pub rule_id:           String,
  pub threshold:         ConfigValue,
  /// The value a fix sets instead of the threshold. Required to remediate a
  /// NOT_EQUALS rule, where the threshold is the value to move away from.
  pub remediation_value: Option<ConfigValue>,
  pub scope:             RuleScope,
  /// Store-assigned timestamp.
  pub applied_at:        DateTime<Utc>,
  pub applied_by:        Option<String>,
}

/// Input to [`crate::store::ComplianceStore::apply_rule`].
/// `applied_at` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewAppliedRule {
  pub rule_id:           String,
  pub threshold:         ConfigValue,
  pub remediation_value: Option<ConfigValue>,
  pub scope:             RuleScope,
  pub applied_by:        Option<String>,
}

impl NewAppliedRule {
  pub fn new(rule_id: &str, threshold: impl Into<ConfigValue>) -> Self {
    Self {
      rule_id:           rule_id.trim().to_ascii_uppercase(),
      threshold:         threshold.into(),
      remediation_value: None,
      scope:             RuleScope::All,
      applied_by:        None,
    }
  }
}
