//! Compliance evaluation: snapshot × bound rule → result.
//!
//! Evaluation is pure. It reads the parameter registry and its two inputs
//! and nothing else, so the same inputs always produce the same result.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  exemption::{Exemption, is_exempted},
  lifecycle::BoundRule,
  registry::ParameterRegistry,
  report::{ComplianceReport, EvaluationError, ResourceCompliance},
  resource::ResourceIdentity,
  rule::{Operator, Remediation},
  snapshot::{ResourceSnapshot, latest_per_resource},
  tag::{TagRequirement, check_tags},
  value::ConfigValue,
};

/// The outcome of checking one resource against one applied rule.
/// Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
  pub rule_id:           String,
  pub applied_rule_id:   Uuid,
  pub rule_name:         String,
  pub resource:          ResourceIdentity,
  pub parameter:         String,
  pub operator:          Operator,
  pub unit:              Option<String>,
  /// `None` when the snapshot did not capture the parameter.
  pub actual_value:      Option<ConfigValue>,
  /// The applied threshold.
  pub required_value:    ConfigValue,
  pub is_compliant:      bool,
  pub violation_reason:  Option<String>,
  /// Covered by an exemption. Only set by [`Evaluator::evaluate_all`].
  pub exempted:          bool,
  pub remediation:       Remediation,
  pub remediation_value: Option<ConfigValue>,
}

impl ComplianceResult {
  /// Non-compliant and not exempted.
  pub fn is_violation(&self) -> bool { !self.is_compliant && !self.exempted }
}

pub struct Evaluator<'r> {
  registry: &'r ParameterRegistry,
}

impl<'r> Evaluator<'r> {
  pub fn new(registry: &'r ParameterRegistry) -> Self { Self { registry } }

  /// Whether `rule` covers `snapshot`: same resource kind and the applied
  /// rule's scope matches the snapshot's tags.
  pub fn applies(&self, snapshot: &ResourceSnapshot, rule: &BoundRule) -> bool {
    snapshot.kind() == rule.rule.resource_kind && rule.applied.scope.matches(snapshot)
  }

  /// Check one snapshot against one bound rule.
  ///
  /// A parameter absent from the snapshot is not an error: MAX, MIN and
  /// EQUALS treat it as non-compliant, NOT_EQUALS as compliant.
  pub fn evaluate(
    &self,
    snapshot: &ResourceSnapshot,
    bound: &BoundRule,
  ) -> Result<ComplianceResult> {
    let rule = &bound.rule;
    let applied = &bound.applied;
    let descriptor = self.registry.descriptor_for(rule)?;

    if snapshot.kind() != rule.resource_kind {
      return Err(Error::ResourceKindMismatch {
        rule_id:  rule.rule_id.clone(),
        resource: snapshot.resource.qualified_name(),
        expected: rule.resource_kind,
        actual:   snapshot.kind(),
      });
    }

    if applied.threshold.value_type() != descriptor.value_type {
      return Err(Error::ThresholdTypeMismatch {
        rule_id:  rule.rule_id.clone(),
        role:     "threshold",
        value:    applied.threshold.to_string(),
        expected: descriptor.value_type,
      });
    }

    let actual = snapshot.value(&descriptor.name);
    if let Some(value) = actual.filter(|v| v.value_type() != descriptor.value_type) {
      return Err(Error::ValueTypeMismatch {
        rule_id:   rule.rule_id.clone(),
        resource:  snapshot.resource.qualified_name(),
        parameter: descriptor.name.clone(),
        actual:    value.to_string(),
        expected:  descriptor.value_type,
      });
    }

    let is_compliant = match actual {
      Some(value) => rule.operator.holds(value, &applied.threshold).unwrap_or(false),
      None => rule.operator == Operator::NotEquals,
    };

    let unit = rule.unit.clone().or_else(|| descriptor.unit.clone());
    let with_unit = |v: &ConfigValue| match &unit {
      Some(u) => format!("{v} {u}"),
      None => v.to_string(),
    };

    let violation_reason = (!is_compliant).then(|| {
      let observed = match actual {
        Some(value) => format!("is {}", with_unit(value)),
        None => "is not set".to_owned(),
      };
      format!(
        "{} {observed}; {} {}",
        descriptor.name,
        rule.operator.requirement(),
        with_unit(&applied.threshold)
      )
    });

    Ok(ComplianceResult {
      rule_id: rule.rule_id.clone(),
      applied_rule_id: applied.applied_rule_id,
      rule_name: rule.rule_name.clone(),
      resource: snapshot.resource.clone(),
      parameter: descriptor.name.clone(),
      operator: rule.operator,
      unit,
      actual_value: actual.cloned(),
      required_value: applied.threshold.clone(),
      is_compliant,
      violation_reason,
      exempted: false,
      remediation: rule.remediation,
      remediation_value: applied.remediation_value.clone(),
    })
  }

  /// Evaluate the latest snapshot of every resource against every bound rule
  /// that applies to it, check tag requirements, and mark exemptions.
  ///
  /// A rule that fails to evaluate against one resource is recorded as an
  /// [`EvaluationError`] on that resource; the rest of the report is
  /// unaffected.
  pub fn evaluate_all(
    &self,
    snapshots: impl IntoIterator<Item = ResourceSnapshot>,
    rules: &[BoundRule],
    tag_requirements: &[TagRequirement],
    exemptions: &[Exemption],
  ) -> ComplianceReport {
    let mut resources = Vec::new();

    for snapshot in latest_per_resource(snapshots) {
      let mut results = Vec::new();
      let mut errors = Vec::new();
      for bound in rules.iter().filter(|r| self.applies(&snapshot, r)) {
        match self.evaluate(&snapshot, bound) {
          Ok(mut result) => {
            result.exempted = !result.is_compliant
              && is_exempted(exemptions, &result.rule_id, None, &snapshot.resource);
            results.push(result);
          }
          Err(e) => errors.push(EvaluationError {
            rule_id: bound.rule_id().to_owned(),
            message: e.to_string(),
          }),
        }
      }

      let tag_violations = check_tags(&snapshot, tag_requirements, exemptions);

      resources.push(ResourceCompliance {
        resource: snapshot.resource,
        owner: snapshot.owner,
        results,
        tag_violations,
        errors,
      });
    }

    ComplianceReport::new(resources)
  }
}
