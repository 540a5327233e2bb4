//! Remediation statements for violations.
//!
//! Statements are returned as text. Submitting them to the warehouse is the
//! caller's business; nothing here executes anything.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  evaluate::ComplianceResult,
  lifecycle::BoundRule,
  registry::ParameterRegistry,
  report::ComplianceReport,
  resource::{ResourceIdentity, ResourceKind, quote_ident},
  rule::{Operator, Rule},
  snapshot::ResourceSnapshot,
  tag::{MISSING_TAG_RULE_ID, TagViolation},
  value::ConfigValue,
};

/// A single SQL statement, terminated with `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementText(String);

impl StatementText {
  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for StatementText {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Single statements ───────────────────────────────────────────────────────

fn fix_value_of<'a>(
  rule_id: &str,
  operator: Operator,
  threshold: &'a ConfigValue,
  remediation_value: Option<&'a ConfigValue>,
) -> Result<&'a ConfigValue> {
  match (remediation_value, operator) {
    (Some(value), _) => Ok(value),
    (None, Operator::NotEquals) => Err(Error::NoRemediationValue(rule_id.to_owned())),
    (None, _) => Ok(threshold),
  }
}

/// The value a fix for `bound` should set: its remediation value if one was
/// applied, otherwise the threshold.
///
/// A NOT_EQUALS threshold is the one value that is *not* allowed, so such
/// rules need an explicit remediation value.
pub fn fix_value(bound: &BoundRule) -> Result<&ConfigValue> {
  fix_value_of(
    &bound.rule.rule_id,
    bound.rule.operator,
    &bound.applied.threshold,
    bound.applied.remediation_value.as_ref(),
  )
}

fn render(
  registry: &ParameterRegistry,
  resource: &ResourceIdentity,
  rule_id: &str,
  rule_kind: ResourceKind,
  parameter: &str,
  value: &ConfigValue,
) -> Result<StatementText> {
  if resource.kind() != rule_kind {
    return Err(Error::ResourceKindMismatch {
      rule_id:  rule_id.to_owned(),
      resource: resource.qualified_name(),
      expected: rule_kind,
      actual:   resource.kind(),
    });
  }

  let template = registry
    .get(rule_kind, parameter)
    .and_then(|d| d.fix)
    .ok_or_else(|| Error::UnsupportedParameter {
      kind:      rule_kind,
      parameter: parameter.to_owned(),
    })?;

  Ok(StatementText(template.render(resource, value)))
}

/// The statement that sets `rule`'s parameter on `resource` to
/// `required_value`.
///
/// Fails with [`Error::UnsupportedParameter`] when no template is registered
/// for the parameter; no statement is guessed.
pub fn generate_fix_statement(
  registry: &ParameterRegistry,
  resource: &ResourceIdentity,
  rule: &Rule,
  required_value: &ConfigValue,
) -> Result<StatementText> {
  render(
    registry,
    resource,
    &rule.rule_id,
    rule.resource_kind,
    &rule.parameter,
    required_value,
  )
}

/// `ALTER <KIND> <name> SET TAG <tag> = '<value>';`
pub fn tag_fix_statement(
  resource: &ResourceIdentity,
  tag_name: &str,
  value: &str,
) -> StatementText {
  StatementText(format!(
    "ALTER {} {} SET TAG {} = {};",
    resource.kind(),
    resource.sql_name(),
    quote_ident(tag_name),
    ConfigValue::from(value).sql_literal()
  ))
}

// ─── Fix plans ───────────────────────────────────────────────────────────────

/// What a planned fix changes, so the snapshot store can be brought up to
/// date after the statement runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Correction {
  Parameter { name: String, value: ConfigValue },
  Tag { name: String, value: String },
}

impl Correction {
  /// A newer capture of `snapshot` with this correction applied.
  pub fn apply(&self, snapshot: &ResourceSnapshot, captured_at: DateTime<Utc>) -> ResourceSnapshot {
    match self {
      Self::Parameter { name, value } => snapshot.corrected(name, value.clone(), captured_at),
      Self::Tag { name, value } => {
        let mut next = snapshot.clone().with_tag(name, value.clone());
        next.captured_at = captured_at;
        next
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedFix {
  pub resource:   ResourceIdentity,
  pub rule_id:    String,
  pub statement:  StatementText,
  /// The rule allows the statement to be submitted, not just displayed.
  pub executable: bool,
  pub correction: Correction,
}

/// A violation that needs a person: no template, or no value to set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualFix {
  pub resource: ResourceIdentity,
  pub rule_id:  String,
  pub reason:   String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixPlan {
  pub fixes:  Vec<PlannedFix>,
  pub manual: Vec<ManualFix>,
}

impl FixPlan {
  pub fn is_empty(&self) -> bool { self.fixes.is_empty() && self.manual.is_empty() }

  /// Keep only entries for `rule_id` (case-insensitive).
  pub fn only_rule(mut self, rule_id: &str) -> Self {
    self.fixes.retain(|f| f.rule_id.eq_ignore_ascii_case(rule_id));
    self.manual.retain(|m| m.rule_id.eq_ignore_ascii_case(rule_id));
    self
  }

  /// Statements separated by blank lines, followed by one comment per manual
  /// fix.
  pub fn script(&self) -> String {
    self
      .fixes
      .iter()
      .map(|f| f.statement.to_string())
      .chain(self.manual.iter().map(|m| {
        format!("-- manual fix required: {} ({}): {}", m.resource, m.rule_id, m.reason)
      }))
      .collect::<Vec<_>>()
      .join("\n\n")
  }
}

fn plan_rule_fix(registry: &ParameterRegistry, result: &ComplianceResult) -> Result<PlannedFix> {
  let value = fix_value_of(
    &result.rule_id,
    result.operator,
    &result.required_value,
    result.remediation_value.as_ref(),
  )?;
  let statement = render(
    registry,
    &result.resource,
    &result.rule_id,
    result.resource.kind(),
    &result.parameter,
    value,
  )?;

  Ok(PlannedFix {
    resource: result.resource.clone(),
    rule_id: result.rule_id.clone(),
    statement,
    executable: result.remediation.allows_execute(),
    correction: Correction::Parameter { name: result.parameter.clone(), value: value.clone() },
  })
}

fn plan_tag_fix(violation: &TagViolation) -> std::result::Result<PlannedFix, ManualFix> {
  match &violation.default_value {
    Some(value) => Ok(PlannedFix {
      resource:   violation.resource.clone(),
      rule_id:    MISSING_TAG_RULE_ID.to_owned(),
      statement:  tag_fix_statement(&violation.resource, &violation.tag_name, value),
      executable: false,
      correction: Correction::Tag { name: violation.tag_name.clone(), value: value.clone() },
    }),
    None => Err(ManualFix {
      resource: violation.resource.clone(),
      rule_id:  MISSING_TAG_RULE_ID.to_owned(),
      reason:   format!("tag {} has no default value", violation.tag_name),
    }),
  }
}

/// Fixes for every non-exempted violation in `report`.
///
/// Rules with remediation `none` are skipped. Violations whose statement
/// cannot be produced become [`ManualFix`] entries instead of failing the
/// whole plan.
pub fn plan_fixes(report: &ComplianceReport, registry: &ParameterRegistry) -> FixPlan {
  let mut plan = FixPlan::default();

  for resource in &report.resources {
    for result in resource.results.iter().filter(|r| r.is_violation()) {
      if !result.remediation.generates_sql() {
        continue;
      }
      match plan_rule_fix(registry, result) {
        Ok(fix) => plan.fixes.push(fix),
        Err(e) => plan.manual.push(ManualFix {
          resource: result.resource.clone(),
          rule_id:  result.rule_id.clone(),
          reason:   e.to_string(),
        }),
      }
    }

    for violation in resource.tag_violations.iter().filter(|t| !t.exempted) {
      match plan_tag_fix(violation) {
        Ok(fix) => plan.fixes.push(fix),
        Err(manual) => plan.manual.push(manual),
      }
    }
  }

  plan
}
