//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enums are stored by their
//! display name. Structured fields (thresholds, scopes, identities, value and
//! tag maps) are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;
use warden_core::{
  exemption::Exemption,
  lifecycle::{AppliedRuleStatus, ResolvedAppliedRule},
  rule::{AppliedRule, Rule},
  snapshot::ResourceSnapshot,
  tag::TagRequirement,
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Parse a column written with the enum's `Display` impl.
pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { column, value: s.to_owned() })
}

// ─── JSON ────────────────────────────────────────────────────────────────────

pub fn encode_json<T: Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const RULE_COLUMNS: &str = "rule_id, rule_name, description, resource_kind, parameter, \
                                operator, unit, remediation, is_active, created_at";

/// Raw values read directly from a `rules` row.
pub struct RawRule {
  pub rule_id:       String,
  pub rule_name:     String,
  pub description:   Option<String>,
  pub resource_kind: String,
  pub parameter:     String,
  pub operator:      String,
  pub unit:          Option<String>,
  pub remediation:   String,
  pub is_active:     bool,
  pub created_at:    String,
}

impl RawRule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rule_id:       row.get(0)?,
      rule_name:     row.get(1)?,
      description:   row.get(2)?,
      resource_kind: row.get(3)?,
      parameter:     row.get(4)?,
      operator:      row.get(5)?,
      unit:          row.get(6)?,
      remediation:   row.get(7)?,
      is_active:     row.get(8)?,
      created_at:    row.get(9)?,
    })
  }

  pub fn into_rule(self) -> Result<Rule> {
    Ok(Rule {
      rule_id:       self.rule_id,
      rule_name:     self.rule_name,
      description:   self.description,
      resource_kind: decode_enum("resource_kind", &self.resource_kind)?,
      parameter:     self.parameter,
      operator:      decode_enum("operator", &self.operator)?,
      unit:          self.unit,
      remediation:   decode_enum("remediation", &self.remediation)?,
      is_active:     self.is_active,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read from an `applied_rules` row joined with lifecycle tables.
pub struct RawResolvedAppliedRule {
  // applied_rules columns
  pub applied_rule_id:     String,
  pub rule_id:             String,
  pub threshold:           String,
  pub remediation_value:   Option<String>,
  pub scope:               String,
  pub applied_at:          String,
  pub applied_by:          Option<String>,
  // supersessions join
  pub superseded_by:       Option<String>,
  pub superseded_at:       Option<String>,
  // deactivations join
  pub deactivation_reason: Option<String>,
  pub deactivated_at:      Option<String>,
}

impl RawResolvedAppliedRule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      applied_rule_id:     row.get(0)?,
      rule_id:             row.get(1)?,
      threshold:           row.get(2)?,
      remediation_value:   row.get(3)?,
      scope:               row.get(4)?,
      applied_at:          row.get(5)?,
      applied_by:          row.get(6)?,
      superseded_by:       row.get(7)?,
      superseded_at:       row.get(8)?,
      deactivation_reason: row.get(9)?,
      deactivated_at:      row.get(10)?,
    })
  }

  pub fn into_resolved(self) -> Result<ResolvedAppliedRule> {
    let applied = AppliedRule {
      applied_rule_id:   decode_uuid(&self.applied_rule_id)?,
      rule_id:           self.rule_id,
      threshold:         decode_json(&self.threshold)?,
      remediation_value: self.remediation_value.as_deref().map(decode_json).transpose()?,
      scope:             decode_json(&self.scope)?,
      applied_at:        decode_dt(&self.applied_at)?,
      applied_by:        self.applied_by,
    };

    let status = if let (Some(by_str), Some(at_str)) = (self.superseded_by, self.superseded_at) {
      AppliedRuleStatus::Superseded {
        by: decode_uuid(&by_str)?,
        at: decode_dt(&at_str)?,
      }
    } else if let Some(at_str) = self.deactivated_at {
      AppliedRuleStatus::Deactivated {
        reason: self.deactivation_reason,
        at:     decode_dt(&at_str)?,
      }
    } else {
      AppliedRuleStatus::Active
    };

    Ok(ResolvedAppliedRule { applied, status })
  }
}

/// Raw strings read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub resource:      String,
  pub captured_at:   String,
  pub owner:         Option<String>,
  pub config_values: String,
  pub tags:          String,
}

impl RawSnapshot {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      resource:      row.get(0)?,
      captured_at:   row.get(1)?,
      owner:         row.get(2)?,
      config_values: row.get(3)?,
      tags:          row.get(4)?,
    })
  }

  pub fn into_snapshot(self) -> Result<ResourceSnapshot> {
    Ok(ResourceSnapshot {
      resource:    decode_json(&self.resource)?,
      captured_at: decode_dt(&self.captured_at)?,
      owner:       self.owner,
      values:      decode_json(&self.config_values)?,
      tags:        decode_json(&self.tags)?,
    })
  }
}

/// Raw strings read directly from an `exemptions` row.
pub struct RawExemption {
  pub exemption_id: String,
  pub rule_id:      String,
  pub tag_name:     Option<String>,
  pub resource:     String,
  pub reason:       Option<String>,
  pub created_by:   Option<String>,
  pub created_at:   String,
}

impl RawExemption {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      exemption_id: row.get(0)?,
      rule_id:      row.get(1)?,
      tag_name:     row.get(2)?,
      resource:     row.get(3)?,
      reason:       row.get(4)?,
      created_by:   row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_exemption(self) -> Result<Exemption> {
    Ok(Exemption {
      exemption_id: decode_uuid(&self.exemption_id)?,
      rule_id:      self.rule_id,
      tag_name:     self.tag_name,
      resource:     decode_json(&self.resource)?,
      reason:       self.reason,
      created_by:   self.created_by,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `tag_requirements` row.
pub struct RawTagRequirement {
  pub requirement_id: String,
  pub resource_kind:  String,
  pub tag_name:       String,
  pub default_value:  Option<String>,
  pub created_at:     String,
}

impl RawTagRequirement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      requirement_id: row.get(0)?,
      resource_kind:  row.get(1)?,
      tag_name:       row.get(2)?,
      default_value:  row.get(3)?,
      created_at:     row.get(4)?,
    })
  }

  pub fn into_requirement(self) -> Result<TagRequirement> {
    Ok(TagRequirement {
      requirement_id: decode_uuid(&self.requirement_id)?,
      resource_kind:  decode_enum("resource_kind", &self.resource_kind)?,
      tag_name:       self.tag_name,
      default_value:  self.default_value,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}
