//! Lifecycle events for applied rules, and binding of active thresholds to
//! their rules.
//!
//! Applied rules are immutable. Their lifecycle (supersession and
//! deactivation) is tracked in two separate append-only tables. An applied
//! rule's current status is computed at query time by joining against those
//! tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  rule::{AppliedRule, Rule},
};

// ─── Lifecycle event records ─────────────────────────────────────────────────

/// Records that an applied rule has been replaced by a newer threshold for
/// the same rule. An applied rule can be superseded at most once (enforced by
/// a UNIQUE constraint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supersession {
  pub supersession_id:     Uuid,
  pub old_applied_rule_id: Uuid,
  pub new_applied_rule_id: Uuid,
  pub recorded_at:         DateTime<Utc>,
}

/// Records that an applied rule was switched off with no replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deactivation {
  pub deactivation_id: Uuid,
  pub applied_rule_id: Uuid,
  pub reason:          Option<String>,
  pub recorded_at:     DateTime<Utc>,
}

// ─── Computed status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AppliedRuleStatus {
  Active,
  Superseded {
    /// The applied rule that replaced this one.
    by: Uuid,
    at: DateTime<Utc>,
  },
  Deactivated {
    reason: Option<String>,
    at:     DateTime<Utc>,
  },
}

impl AppliedRuleStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// An applied rule bundled with its current lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAppliedRule {
  pub applied: AppliedRule,
  pub status:  AppliedRuleStatus,
}

// ─── Binding ─────────────────────────────────────────────────────────────────

/// A rule together with its single active threshold. This is the unit the
/// evaluator and the fix generator work on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundRule {
  pub rule:    Rule,
  pub applied: AppliedRule,
}

impl BoundRule {
  pub fn rule_id(&self) -> &str { &self.rule.rule_id }
}

/// Join active applied rules to their active rule definitions.
///
/// Retired rules and inactive applied rules are dropped. Two active applied
/// rules for the same rule id are a [`Error::ConflictingAppliedRules`]; an
/// active applied rule whose definition is missing is a
/// [`Error::RuleNotFound`]. Output is ordered by rule id.
pub fn bind_active_rules(
  rules: &[Rule],
  applied: &[ResolvedAppliedRule],
) -> Result<Vec<BoundRule>> {
  let by_id: HashMap<&str, &Rule> =
    rules.iter().map(|r| (r.rule_id.as_str(), r)).collect();

  let mut bound: HashMap<&str, BoundRule> = HashMap::new();

  for resolved in applied.iter().filter(|a| a.status.is_active()) {
    let rule_id = resolved.applied.rule_id.as_str();
    let rule = by_id
      .get(rule_id)
      .ok_or_else(|| Error::RuleNotFound(rule_id.to_owned()))?;
    if !rule.is_active {
      continue;
    }
    if bound.contains_key(rule_id) {
      return Err(Error::ConflictingAppliedRules(rule_id.to_owned()));
    }
    bound.insert(rule_id, BoundRule {
      rule:    (*rule).clone(),
      applied: resolved.applied.clone(),
    });
  }

  let mut out: Vec<BoundRule> = bound.into_values().collect();
  out.sort_by(|a, b| a.rule.rule_id.cmp(&b.rule.rule_id));
  Ok(out)
}
