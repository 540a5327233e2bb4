//! Batch compliance reports and their dashboard-style views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  evaluate::ComplianceResult,
  resource::{ResourceIdentity, ResourceKind},
  tag::TagViolation,
};

/// A rule that could not be evaluated against one resource, e.g. because
/// the capture holds a value of the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationError {
  pub rule_id: String,
  pub message: String,
}

/// Every result for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCompliance {
  pub resource:       ResourceIdentity,
  pub owner:          Option<String>,
  pub results:        Vec<ComplianceResult>,
  pub tag_violations: Vec<TagViolation>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub errors:         Vec<EvaluationError>,
}

impl ResourceCompliance {
  /// No violation that is not covered by an exemption, and no rule that
  /// failed to evaluate.
  pub fn is_compliant(&self) -> bool {
    self.errors.is_empty()
      && self.results.iter().all(|r| !r.is_violation())
      && self.tag_violations.iter().all(|t| t.exempted)
  }

  /// Violations covered by an exemption.
  pub fn exempted_violations(&self) -> usize {
    self.results.iter().filter(|r| !r.is_compliant && r.exempted).count()
      + self.tag_violations.iter().filter(|t| t.exempted).count()
  }

  /// Case-insensitive substring match over the resource name, rule ids and
  /// names, and violated tag names.
  pub fn matches_search(&self, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
      return true;
    }
    let hit = |s: &str| s.to_lowercase().contains(&needle);

    hit(&self.resource.qualified_name())
      || self.results.iter().any(|r| hit(&r.rule_id) || hit(&r.rule_name))
      || self.tag_violations.iter().any(|t| hit(&t.tag_name))
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum StatusFilter {
  #[default]
  All,
  Compliant,
  NonCompliant,
  /// Everything, non-compliant resources first.
  NonCompliantFirst,
  /// Resources with at least one exempted violation.
  Exempted,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
  pub total:         usize,
  pub compliant:     usize,
  pub non_compliant: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
  pub total:               usize,
  pub compliant:           usize,
  pub non_compliant:       usize,
  pub exempted_violations: usize,
  /// Percentage of compliant resources; `0.0` for an empty report.
  pub compliance_rate:     f64,
  pub by_kind:             BTreeMap<ResourceKind, KindSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
  /// Ordered by resource kind, then qualified name.
  pub resources: Vec<ResourceCompliance>,
}

impl ComplianceReport {
  pub fn new(resources: Vec<ResourceCompliance>) -> Self { Self { resources } }

  pub fn resource(&self, identity: &ResourceIdentity) -> Option<&ResourceCompliance> {
    self.resources.iter().find(|r| r.resource.matches(identity))
  }

  /// Every non-exempted, non-compliant rule result.
  pub fn violations(&self) -> impl Iterator<Item = &ComplianceResult> {
    self
      .resources
      .iter()
      .flat_map(|r| r.results.iter())
      .filter(|r| r.is_violation())
  }

  pub fn summary(&self) -> ReportSummary {
    let mut by_kind: BTreeMap<ResourceKind, KindSummary> = BTreeMap::new();
    let mut compliant = 0;
    let mut exempted_violations = 0;

    for resource in &self.resources {
      let entry = by_kind.entry(resource.resource.kind()).or_default();
      entry.total += 1;
      if resource.is_compliant() {
        entry.compliant += 1;
        compliant += 1;
      } else {
        entry.non_compliant += 1;
      }
      exempted_violations += resource.exempted_violations();
    }

    let total = self.resources.len();
    let compliance_rate = if total == 0 {
      0.0
    } else {
      compliant as f64 * 100.0 / total as f64
    };

    ReportSummary {
      total,
      compliant,
      non_compliant: total - compliant,
      exempted_violations,
      compliance_rate,
      by_kind,
    }
  }

  /// Filter and search the resources. An empty `search` matches everything.
  pub fn view(&self, filter: StatusFilter, search: &str) -> Vec<&ResourceCompliance> {
    let mut out: Vec<&ResourceCompliance> = self
      .resources
      .iter()
      .filter(|r| r.matches_search(search))
      .filter(|r| match filter {
        StatusFilter::All | StatusFilter::NonCompliantFirst => true,
        StatusFilter::Compliant => r.is_compliant(),
        StatusFilter::NonCompliant => !r.is_compliant(),
        StatusFilter::Exempted => r.exempted_violations() > 0,
      })
      .collect();

    if filter == StatusFilter::NonCompliantFirst {
      // Stable, so name order holds within each group.
      out.sort_by_key(|r| r.is_compliant());
    }
    out
  }
}
