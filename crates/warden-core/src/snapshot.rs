//! Point-in-time captures of a resource's configuration.
//!
//! The snapshot store is refreshed on a schedule outside this crate's
//! control, normally by truncate-and-reload. Only the most recent capture of a
//! resource is "current"; older rows are historical artifacts and are
//! filtered out by [`latest_per_resource`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  resource::{ResourceIdentity, ResourceKind},
  value::ConfigValue,
};

/// A captured configuration bag for one resource.
///
/// Parameter names are stored lower-case and tag names upper-case. An absent
/// parameter is the snapshot's representation of SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
  pub resource:    ResourceIdentity,
  pub captured_at: DateTime<Utc>,
  pub owner:       Option<String>,
  #[serde(default)]
  pub values:      BTreeMap<String, ConfigValue>,
  #[serde(default)]
  pub tags:        BTreeMap<String, String>,
}

impl ResourceSnapshot {
  /// An empty snapshot of `resource` captured at `captured_at`.
  pub fn new(resource: ResourceIdentity, captured_at: DateTime<Utc>) -> Self {
    Self {
      resource,
      captured_at,
      owner: None,
      values: BTreeMap::new(),
      tags: BTreeMap::new(),
    }
  }

  pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
    self.owner = Some(owner.into());
    self
  }

  pub fn with_value(mut self, name: &str, value: impl Into<ConfigValue>) -> Self {
    self.values.insert(name.to_ascii_lowercase(), value.into());
    self
  }

  pub fn with_tag(mut self, name: &str, value: impl Into<String>) -> Self {
    self.tags.insert(name.to_ascii_uppercase(), value.into());
    self
  }

  pub fn kind(&self) -> ResourceKind { self.resource.kind() }

  /// The captured value of `name`, or `None` when it was not captured.
  pub fn value(&self, name: &str) -> Option<&ConfigValue> {
    self.values.get(&name.to_ascii_lowercase())
  }

  pub fn tag(&self, name: &str) -> Option<&str> {
    self.tags.get(&name.to_ascii_uppercase()).map(String::as_str)
  }

  /// A newer capture of the same resource with `parameter` set to `value`.
  ///
  /// Recorded after a fix so that the snapshot store reflects the corrected
  /// configuration before the next scheduled refresh.
  pub fn corrected(
    &self,
    parameter: &str,
    value: ConfigValue,
    captured_at: DateTime<Utc>,
  ) -> Self {
    let mut next = self.clone().with_value(parameter, value);
    next.captured_at = captured_at;
    next
  }
}

/// Keep only the most recent capture of each resource, ordered by kind and
/// then qualified name.
///
/// Resource identity is compared case-insensitively. Ties on `captured_at`
/// keep the later element of the input.
pub fn latest_per_resource(
  snapshots: impl IntoIterator<Item = ResourceSnapshot>,
) -> Vec<ResourceSnapshot> {
  let mut latest: HashMap<(ResourceKind, String), ResourceSnapshot> = HashMap::new();

  for snapshot in snapshots {
    let key = snapshot.resource.key();
    match latest.get(&key) {
      Some(existing) if existing.captured_at > snapshot.captured_at => {}
      _ => {
        latest.insert(key, snapshot);
      }
    }
  }

  let mut out: Vec<ResourceSnapshot> = latest.into_values().collect();
  out.sort_by(|a, b| a.resource.key().cmp(&b.resource.key()));
  out
}

// ─── Export format ───────────────────────────────────────────────────────────

/// One element of a JSON snapshot export.
#[derive(Debug, Deserialize)]
struct SnapshotRecord {
  resource:    ResourceIdentity,
  captured_at: Option<DateTime<Utc>>,
  owner:       Option<String>,
  #[serde(default)]
  values:      BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  tags:        BTreeMap<String, String>,
}

/// Parse a JSON array of snapshot records.
///
/// Records without `captured_at` are stamped with `default_captured_at`.
/// `null` values are dropped, so they read back as "not captured".
pub fn parse_snapshot_export(
  input: &str,
  default_captured_at: DateTime<Utc>,
) -> Result<Vec<ResourceSnapshot>> {
  let records: Vec<SnapshotRecord> = serde_json::from_str(input)?;

  records
    .into_iter()
    .map(|record| -> Result<ResourceSnapshot> {
      let mut snapshot = ResourceSnapshot::new(
        record.resource,
        record.captured_at.unwrap_or(default_captured_at),
      );
      snapshot.owner = record.owner;

      for (name, raw) in &record.values {
        if let Some(value) = ConfigValue::from_json(name, raw)? {
          snapshot = snapshot.with_value(name, value);
        }
      }
      for (name, value) in record.tags {
        snapshot = snapshot.with_tag(&name, value);
      }
      Ok(snapshot)
    })
    .collect()
}
