//! Per-resource exemptions from a rule or a tag requirement.
//!
//! An exempted violation is still reported, but it does not make its
//! resource non-compliant and is never remediated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resource::ResourceIdentity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemption {
  pub exemption_id: Uuid,
  /// The rule id, or [`crate::tag::MISSING_TAG_RULE_ID`] for a tag
  /// requirement.
  pub rule_id:      String,
  /// Set only for tag-requirement exemptions.
  pub tag_name:     Option<String>,
  pub resource:     ResourceIdentity,
  pub reason:       Option<String>,
  pub created_by:   Option<String>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::ComplianceStore::add_exemption`].
#[derive(Debug, Clone)]
pub struct NewExemption {
  pub rule_id:    String,
  pub tag_name:   Option<String>,
  pub resource:   ResourceIdentity,
  pub reason:     Option<String>,
  pub created_by: Option<String>,
}

impl NewExemption {
  pub fn for_rule(rule_id: &str, resource: ResourceIdentity) -> Self {
    Self {
      rule_id: rule_id.trim().to_ascii_uppercase(),
      tag_name: None,
      resource,
      reason: None,
      created_by: None,
    }
  }

  pub fn for_tag(tag_name: &str, resource: ResourceIdentity) -> Self {
    Self {
      rule_id: crate::tag::MISSING_TAG_RULE_ID.to_owned(),
      tag_name: Some(tag_name.trim().to_ascii_uppercase()),
      ..Self::for_rule("", resource)
    }
  }

  pub fn because(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }
}

impl Exemption {
  /// Whether this exemption covers `rule_id` (and `tag_name`, for tag
  /// requirements) on `resource`. Names compare case-insensitively.
  pub fn covers(
    &self,
    rule_id: &str,
    tag_name: Option<&str>,
    resource: &ResourceIdentity,
  ) -> bool {
    let tag_matches = match (&self.tag_name, tag_name) {
      (None, None) => true,
      (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
      _ => false,
    };
    self.rule_id.eq_ignore_ascii_case(rule_id) && tag_matches && self.resource.matches(resource)
  }
}

/// Whether any of `exemptions` covers the given violation.
pub fn is_exempted(
  exemptions: &[Exemption],
  rule_id: &str,
  tag_name: Option<&str>,
  resource: &ResourceIdentity,
) -> bool {
  exemptions.iter().any(|e| e.covers(rule_id, tag_name, resource))
}
