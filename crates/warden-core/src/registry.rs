//! The table of monitored parameters.
//!
//! Every `(resource kind, parameter)` pair a rule may name is described by a
//! [`ParameterDescriptor`]: its value type, display unit, and (optionally) how
//! to render a statement that sets it. Supporting a new parameter means
//! registering a descriptor; neither the evaluator nor the fix generator
//! branch on parameter names.

use std::collections::HashMap;

use crate::{
  Error, Result,
  resource::{ResourceIdentity, ResourceKind},
  rule::{NewAppliedRule, Operator, Rule},
  value::{ConfigValue, ValueType},
};

/// How to render the statement that sets a parameter.
#[derive(Debug, Clone, Copy)]
pub enum FixTemplate {
  /// `ALTER <KIND> <name> SET <keyword> = <literal>;`
  Set { keyword: &'static str },
  /// Anything that does not fit the `SET` shape.
  Custom(fn(&ResourceIdentity, &ConfigValue) -> String),
}

impl FixTemplate {
  pub fn render(&self, resource: &ResourceIdentity, value: &ConfigValue) -> String {
    match self {
      Self::Set { keyword } => format!(
        "ALTER {} {} SET {} = {};",
        resource.kind(),
        resource.sql_name(),
        keyword,
        value.sql_literal()
      ),
      Self::Custom(render) => render(resource, value),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
  pub kind:       ResourceKind,
  /// Lower-case parameter name as captured in snapshots.
  pub name:       String,
  pub value_type: ValueType,
  pub unit:       Option<String>,
  /// `None` for evaluation-only parameters.
  pub fix:        Option<FixTemplate>,
}

impl ParameterDescriptor {
  pub fn new(kind: ResourceKind, name: &str, value_type: ValueType) -> Self {
    Self {
      kind,
      name: name.to_ascii_lowercase(),
      value_type,
      unit: None,
      fix: None,
    }
  }

  pub fn with_unit(mut self, unit: &str) -> Self {
    self.unit = Some(unit.to_owned());
    self
  }

  pub fn with_fix(mut self, fix: FixTemplate) -> Self {
    self.fix = Some(fix);
    self
  }

  /// A `SET` fix whose keyword is the upper-cased parameter name.
  fn settable(kind: ResourceKind, keyword: &'static str, value_type: ValueType) -> Self {
    Self::new(kind, keyword, value_type).with_fix(FixTemplate::Set { keyword })
  }
}

/// Lookup table of [`ParameterDescriptor`]s keyed by `(kind, name)`.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
  descriptors: HashMap<(ResourceKind, String), ParameterDescriptor>,
}

impl Default for ParameterRegistry {
  fn default() -> Self { Self::new() }
}

impl ParameterRegistry {
  /// A registry with no parameters.
  pub fn empty() -> Self { Self { descriptors: HashMap::new() } }

  /// The built-in parameters captured by the snapshot collectors.
  pub fn new() -> Self {
    use ResourceKind::*;
    use ValueType::*;

    let mut registry = Self::empty();

    for (keyword, unit) in [
      ("AUTO_SUSPEND", Some("seconds")),
      ("STATEMENT_TIMEOUT_IN_SECONDS", Some("seconds")),
      ("STATEMENT_QUEUED_TIMEOUT_IN_SECONDS", Some("seconds")),
      ("MIN_CLUSTER_COUNT", None),
      ("MAX_CLUSTER_COUNT", None),
      ("MAX_CONCURRENCY_LEVEL", None),
    ] {
      let mut d = ParameterDescriptor::settable(Warehouse, keyword, Integer);
      d.unit = unit.map(str::to_owned);
      registry.register(d);
    }
    registry.register(ParameterDescriptor::settable(Warehouse, "SCALING_POLICY", Text));

    registry.register(ParameterDescriptor::new(Warehouse, "size", Text));
    registry.register(ParameterDescriptor::new(Warehouse, "type", Text));
    registry.register(ParameterDescriptor::new(Warehouse, "enable_query_acceleration", Boolean));

    for kind in [Database, Schema, Table] {
      registry.register(
        ParameterDescriptor::settable(kind, "DATA_RETENTION_TIME_IN_DAYS", Integer)
          .with_unit("days"),
      );
    }

    registry
  }

  /// Add or replace a descriptor. Returns the one it replaced, if any.
  pub fn register(&mut self, descriptor: ParameterDescriptor) -> Option<ParameterDescriptor> {
    self
      .descriptors
      .insert((descriptor.kind, descriptor.name.clone()), descriptor)
  }

  pub fn get(&self, kind: ResourceKind, name: &str) -> Option<&ParameterDescriptor> {
    self.descriptors.get(&(kind, name.to_ascii_lowercase()))
  }

  /// All descriptors for `kind`, ordered by name.
  pub fn parameters(&self, kind: ResourceKind) -> Vec<&ParameterDescriptor> {
    let mut out: Vec<_> = self.descriptors.values().filter(|d| d.kind == kind).collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
  }

  fn check(
    &self,
    rule_id: &str,
    kind: ResourceKind,
    parameter: &str,
    operator: Operator,
  ) -> Result<&ParameterDescriptor> {
    let descriptor = self.get(kind, parameter).ok_or_else(|| Error::UnknownParameter {
      rule_id: rule_id.to_owned(),
      kind,
      parameter: parameter.to_owned(),
    })?;

    if operator.requires_ordering() && !descriptor.value_type.is_ordered() {
      return Err(Error::OperatorNotSupported {
        rule_id: rule_id.to_owned(),
        operator,
        parameter: descriptor.name.clone(),
        value_type: descriptor.value_type,
      });
    }
    Ok(descriptor)
  }

  /// The descriptor for a rule's parameter, rejecting unknown parameters and
  /// MAX/MIN on unordered types.
  pub fn descriptor_for(&self, rule: &Rule) -> Result<&ParameterDescriptor> {
    self.check(&rule.rule_id, rule.resource_kind, &rule.parameter, rule.operator)
  }

  /// Registration-time validation of a new rule definition.
  pub fn validate_rule(
    &self,
    rule_id: &str,
    kind: ResourceKind,
    parameter: &str,
    operator: Operator,
  ) -> Result<()> {
    self.check(rule_id, kind, parameter, operator).map(|_| ())
  }

  /// Apply-time validation: the threshold and any remediation value must
  /// have the parameter's declared type.
  pub fn validate_applied(&self, rule: &Rule, input: &NewAppliedRule) -> Result<()> {
    let descriptor = self.descriptor_for(rule)?;

    let typed = |role: &'static str, value: &ConfigValue| {
      if value.value_type() == descriptor.value_type {
        Ok(())
      } else {
        Err(Error::ThresholdTypeMismatch {
          rule_id: rule.rule_id.clone(),
          role,
          value: value.to_string(),
          expected: descriptor.value_type,
        })
      }
    };

    typed("threshold", &input.threshold)?;
    if let Some(value) = &input.remediation_value {
      typed("remediation value", value)?;
    }
    Ok(())
  }
}
