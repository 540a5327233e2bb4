//! Required tags per resource kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  exemption::{Exemption, is_exempted},
  resource::{ResourceIdentity, ResourceKind},
  snapshot::ResourceSnapshot,
};

/// Pseudo rule id under which tag-requirement violations are reported and
/// exempted.
pub const MISSING_TAG_RULE_ID: &str = "MISSING_TAG";

/// Every resource of `resource_kind` must carry `tag_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRequirement {
  pub requirement_id: Uuid,
  pub resource_kind:  ResourceKind,
  /// Upper-case tag name.
  pub tag_name:       String,
  /// Value a fix assigns. Without one the violation needs a manual fix.
  pub default_value:  Option<String>,
  pub created_at:     DateTime<Utc>,
}

/// Input to [`crate::store::ComplianceStore::require_tag`].
#[derive(Debug, Clone)]
pub struct NewTagRequirement {
  pub resource_kind: ResourceKind,
  pub tag_name:      String,
  pub default_value: Option<String>,
}

impl NewTagRequirement {
  pub fn new(resource_kind: ResourceKind, tag_name: &str) -> Self {
    Self {
      resource_kind,
      tag_name: tag_name.trim().to_ascii_uppercase(),
      default_value: None,
    }
  }

  pub fn with_default(mut self, value: impl Into<String>) -> Self {
    self.default_value = Some(value.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagViolation {
  pub requirement_id: Uuid,
  pub resource:       ResourceIdentity,
  pub tag_name:       String,
  pub default_value:  Option<String>,
  pub exempted:       bool,
}

/// Requirements for the snapshot's kind whose tag the snapshot lacks.
pub fn check_tags(
  snapshot: &ResourceSnapshot,
  requirements: &[TagRequirement],
  exemptions: &[Exemption],
) -> Vec<TagViolation> {
  requirements
    .iter()
    .filter(|r| r.resource_kind == snapshot.kind() && snapshot.tag(&r.tag_name).is_none())
    .map(|r| TagViolation {
      requirement_id: r.requirement_id,
      resource:       snapshot.resource.clone(),
      tag_name:       r.tag_name.clone(),
      default_value:  r.default_value.clone(),
      exempted:       is_exempted(
        exemptions,
        MISSING_TAG_RULE_ID,
        Some(&r.tag_name),
        &snapshot.resource,
      ),
    })
    .collect()
}
