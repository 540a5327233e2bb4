//! The SQLite implementation of [`ComplianceStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use warden_core::{
  exemption::{Exemption, NewExemption},
  lifecycle::{Deactivation, ResolvedAppliedRule, Supersession},
  registry::ParameterRegistry,
  resource::ResourceKind,
  rule::{AppliedRule, NewAppliedRule, NewRule, Rule},
  snapshot::{ResourceSnapshot, latest_per_resource},
  store::ComplianceStore,
  tag::{NewTagRequirement, TagRequirement},
};

use crate::{
  Error, Result,
  encode::{
    RULE_COLUMNS, RawExemption, RawResolvedAppliedRule, RawRule, RawSnapshot,
    RawTagRequirement, decode_uuid, encode_dt, encode_json, encode_uuid,
  },
  schema::SCHEMA,
};

const APPLIED_RULE_QUERY: &str = "
  SELECT
    a.applied_rule_id, a.rule_id, a.threshold, a.remediation_value,
    a.scope, a.applied_at, a.applied_by,
    s.new_applied_rule_id AS superseded_by,
    s.recorded_at         AS superseded_at,
    d.reason              AS deactivation_reason,
    d.recorded_at         AS deactivated_at
  FROM applied_rules a
  LEFT JOIN supersessions s ON s.old_applied_rule_id = a.applied_rule_id
  LEFT JOIN deactivations d ON d.applied_rule_id     = a.applied_rule_id";

/// One encoded `snapshots` row, ready to bind.
struct SnapshotRow {
  kind:          String,
  key:           String,
  resource:      String,
  captured_at:   String,
  owner:         Option<String>,
  config_values: String,
  tags:          String,
}

impl SnapshotRow {
  fn encode(snapshot: &ResourceSnapshot) -> Result<Self> {
    let (kind, key) = snapshot.resource.key();
    Ok(Self {
      kind: kind.to_string(),
      key,
      resource: encode_json(&snapshot.resource)?,
      captured_at: encode_dt(snapshot.captured_at),
      owner: snapshot.owner.clone(),
      config_values: encode_json(&snapshot.values)?,
      tags: encode_json(&snapshot.tags)?,
    })
  }

  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    conn.execute(
      "INSERT OR REPLACE INTO snapshots (
         resource_kind, resource_key, resource, captured_at,
         owner, config_values, tags
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        self.kind,
        self.key,
        self.resource,
        self.captured_at,
        self.owner,
        self.config_values,
        self.tags,
      ],
    )
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Warden store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection and the registry are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  registry: Arc<ParameterRegistry>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, registry: Arc::new(ParameterRegistry::new()) })
  }

  /// Validate rules and thresholds against `registry` instead of the
  /// built-in one.
  pub fn with_registry(mut self, registry: ParameterRegistry) -> Self {
    self.registry = Arc::new(registry);
    self
  }

  pub fn registry(&self) -> &ParameterRegistry { &self.registry }

  /// Check that an applied rule exists and is not already in a lifecycle
  /// event table.
  ///
  /// Returns `(exists, superseded_by, deactivation_id)`.
  async fn applied_lifecycle_check(
    &self,
    applied_rule_id: Uuid,
  ) -> Result<(bool, Option<Uuid>, Option<Uuid>)> {
    let id_str = encode_uuid(applied_rule_id);

    let (exists, sup_str, deact_str): (bool, Option<String>, Option<String>) = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM applied_rules WHERE applied_rule_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !exists {
          return Ok((false, None, None));
        }

        let sup: Option<String> = conn
          .query_row(
            "SELECT new_applied_rule_id FROM supersessions WHERE old_applied_rule_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        let deact: Option<String> = conn
          .query_row(
            "SELECT deactivation_id FROM deactivations WHERE applied_rule_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        Ok((true, sup, deact))
      })
      .await?;

    let superseded_by = sup_str.as_deref().map(decode_uuid).transpose()?;
    let deactivation_id = deact_str.as_deref().map(decode_uuid).transpose()?;

    Ok((exists, superseded_by, deactivation_id))
  }
}

// ─── ComplianceStore impl ────────────────────────────────────────────────────

impl ComplianceStore for SqliteStore {
  type Error = Error;

  // ── Rules ─────────────────────────────────────────────────────────────────

  async fn define_rule(&self, input: NewRule) -> Result<Rule> {
    let rule = Rule {
      rule_id:       input.rule_id.trim().to_ascii_uppercase(),
      rule_name:     input.rule_name,
      description:   input.description,
      resource_kind: input.resource_kind,
      parameter:     input.parameter.trim().to_ascii_lowercase(),
      operator:      input.operator,
      unit:          input.unit,
      remediation:   input.remediation,
      is_active:     true,
      created_at:    Utc::now(),
    };

    self
      .registry
      .validate_rule(&rule.rule_id, rule.resource_kind, &rule.parameter, rule.operator)?;

    let row = rule.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO rules (
             rule_id, rule_name, description, resource_kind, parameter,
             operator, unit, remediation, is_active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
          rusqlite::params![
            row.rule_id,
            row.rule_name,
            row.description,
            row.resource_kind.to_string(),
            row.parameter,
            row.operator.to_string(),
            row.unit,
            row.remediation.to_string(),
            encode_dt(row.created_at),
          ],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateRule(rule.rule_id));
    }

    tracing::info!(rule_id = %rule.rule_id, parameter = %rule.parameter, "defined rule");
    Ok(rule)
  }

  async fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>> {
    let id = rule_id.trim().to_ascii_uppercase();

    let raw: Option<RawRule> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RULE_COLUMNS} FROM rules WHERE rule_id = ?1"),
              rusqlite::params![id],
              RawRule::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRule::into_rule).transpose()
  }

  async fn list_rules(&self, kind: Option<ResourceKind>) -> Result<Vec<Rule>> {
    let kind_str = kind.map(|k| k.to_string());

    let raws: Vec<RawRule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RULE_COLUMNS} FROM rules
           WHERE (?1 IS NULL OR resource_kind = ?1)
           ORDER BY rule_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str], RawRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRule::into_rule).collect()
  }

  async fn retire_rule(&self, rule_id: &str) -> Result<Rule> {
    let id = rule_id.trim().to_ascii_uppercase();
    let id_for_update = id.clone();

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE rules SET is_active = 0 WHERE rule_id = ?1",
          rusqlite::params![id_for_update],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::RuleNotFound(id));
    }
    tracing::info!(rule_id = %id, "retired rule");

    self.get_rule(&id).await?.ok_or(Error::RuleNotFound(id))
  }

  // ── Applied rules ─────────────────────────────────────────────────────────

  async fn apply_rule(&self, input: NewAppliedRule) -> Result<(Option<Supersession>, AppliedRule)> {
    let rule_id = input.rule_id.trim().to_ascii_uppercase();
    let rule = self
      .get_rule(&rule_id)
      .await?
      .ok_or_else(|| Error::RuleNotFound(rule_id.clone()))?;
    if !rule.is_active {
      return Err(Error::RuleRetired(rule.rule_id));
    }
    self.registry.validate_applied(&rule, &input)?;

    let applied = AppliedRule {
      applied_rule_id:   Uuid::new_v4(),
      rule_id:           rule.rule_id,
      threshold:         input.threshold,
      remediation_value: input.remediation_value,
      scope:             input.scope,
      applied_at:        Utc::now(),
      applied_by:        input.applied_by,
    };
    let supersession_id = Uuid::new_v4();

    let new_id_str = encode_uuid(applied.applied_rule_id);
    let rule_id_str = applied.rule_id.clone();
    let threshold_str = encode_json(&applied.threshold)?;
    let remediation_str = applied.remediation_value.as_ref().map(encode_json).transpose()?;
    let scope_str = encode_json(&applied.scope)?;
    let at_str = encode_dt(applied.applied_at);
    let applied_by = applied.applied_by.clone();
    let sup_id_str = encode_uuid(supersession_id);

    // One transaction: at most one active threshold per rule.
    let old_id: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let old: Option<String> = tx
          .query_row(
            "SELECT a.applied_rule_id
             FROM applied_rules a
             LEFT JOIN supersessions s ON s.old_applied_rule_id = a.applied_rule_id
             LEFT JOIN deactivations d ON d.applied_rule_id     = a.applied_rule_id
             WHERE a.rule_id = ?1
               AND s.supersession_id IS NULL
               AND d.deactivation_id IS NULL
             ORDER BY a.rowid DESC
             LIMIT 1",
            rusqlite::params![rule_id_str],
            |r| r.get(0),
          )
          .optional()?;

        tx.execute(
          "INSERT INTO applied_rules (
             applied_rule_id, rule_id, threshold, remediation_value,
             scope, applied_at, applied_by
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            new_id_str,
            rule_id_str,
            threshold_str,
            remediation_str,
            scope_str,
            at_str,
            applied_by,
          ],
        )?;

        if let Some(old_id) = &old {
          tx.execute(
            "INSERT INTO supersessions (
               supersession_id, old_applied_rule_id, new_applied_rule_id, recorded_at
             ) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![sup_id_str, old_id, new_id_str, at_str],
          )?;
        }

        tx.commit()?;
        Ok(old)
      })
      .await?;

    let supersession = old_id
      .as_deref()
      .map(decode_uuid)
      .transpose()?
      .map(|old_applied_rule_id| Supersession {
        supersession_id,
        old_applied_rule_id,
        new_applied_rule_id: applied.applied_rule_id,
        recorded_at: applied.applied_at,
      });

    tracing::info!(
      rule_id = %applied.rule_id,
      threshold = %applied.threshold,
      superseded = supersession.is_some(),
      "applied rule"
    );
    Ok((supersession, applied))
  }

  async fn deactivate_applied_rule(
    &self,
    applied_rule_id: Uuid,
    reason: Option<String>,
  ) -> Result<Deactivation> {
    let (exists, superseded_by, deactivation_id) =
      self.applied_lifecycle_check(applied_rule_id).await?;

    if !exists {
      return Err(Error::AppliedRuleNotFound(applied_rule_id));
    }
    if superseded_by.is_some() {
      return Err(Error::AlreadySuperseded(applied_rule_id));
    }
    if deactivation_id.is_some() {
      return Err(Error::AlreadyDeactivated(applied_rule_id));
    }

    let deactivation = Deactivation {
      deactivation_id: Uuid::new_v4(),
      applied_rule_id,
      reason: reason.clone(),
      recorded_at: Utc::now(),
    };

    let deact_id_str = encode_uuid(deactivation.deactivation_id);
    let applied_id_str = encode_uuid(applied_rule_id);
    let at_str = encode_dt(deactivation.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO deactivations (deactivation_id, applied_rule_id, reason, recorded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![deact_id_str, applied_id_str, reason, at_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(%applied_rule_id, "deactivated applied rule");
    Ok(deactivation)
  }

  async fn list_applied_rules(&self, include_inactive: bool) -> Result<Vec<ResolvedAppliedRule>> {
    let raws: Vec<RawResolvedAppliedRule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("{APPLIED_RULE_QUERY} ORDER BY a.rowid"))?;
        let rows = stmt
          .query_map([], RawResolvedAppliedRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut applied: Vec<ResolvedAppliedRule> = raws
      .into_iter()
      .map(RawResolvedAppliedRule::into_resolved)
      .collect::<Result<_>>()?;

    if !include_inactive {
      applied.retain(|a| a.status.is_active());
    }

    Ok(applied)
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn replace_snapshots(
    &self,
    kind: ResourceKind,
    snapshots: Vec<ResourceSnapshot>,
  ) -> Result<usize> {
    if let Some(stray) = snapshots.iter().find(|s| s.kind() != kind) {
      return Err(Error::SnapshotKindMismatch {
        expected: kind,
        resource: stray.resource.to_string(),
      });
    }

    let rows = snapshots
      .iter()
      .map(SnapshotRow::encode)
      .collect::<Result<Vec<_>>>()?;
    let kind_str = kind.to_string();

    let (removed, inserted) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let removed = tx.execute(
          "DELETE FROM snapshots WHERE resource_kind = ?1",
          rusqlite::params![kind_str],
        )?;
        for row in &rows {
          row.insert(&tx)?;
        }
        tx.commit()?;
        Ok((removed, rows.len()))
      })
      .await?;

    tracing::info!(%kind, removed, inserted, "reloaded snapshots");
    Ok(inserted)
  }

  async fn record_snapshot(&self, snapshot: ResourceSnapshot) -> Result<()> {
    let row = SnapshotRow::encode(&snapshot)?;

    self
      .conn
      .call(move |conn| {
        row.insert(conn)?;
        Ok(())
      })
      .await?;

    tracing::debug!(resource = %snapshot.resource, "recorded snapshot");
    Ok(())
  }

  async fn latest_snapshots(&self, kind: Option<ResourceKind>) -> Result<Vec<ResourceSnapshot>> {
    let kind_str = kind.map(|k| k.to_string());

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT resource, captured_at, owner, config_values, tags
           FROM snapshots
           WHERE (?1 IS NULL OR resource_kind = ?1)",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let snapshots = raws
      .into_iter()
      .map(RawSnapshot::into_snapshot)
      .collect::<Result<Vec<_>>>()?;

    Ok(latest_per_resource(snapshots))
  }

  // ── Exemptions ────────────────────────────────────────────────────────────

  async fn add_exemption(&self, input: NewExemption) -> Result<Exemption> {
    let exemption = Exemption {
      exemption_id: Uuid::new_v4(),
      rule_id:      input.rule_id.trim().to_ascii_uppercase(),
      tag_name:     input.tag_name.map(|t| t.trim().to_ascii_uppercase()),
      resource:     input.resource,
      reason:       input.reason,
      created_by:   input.created_by,
      created_at:   Utc::now(),
    };

    let id_str = encode_uuid(exemption.exemption_id);
    let rule_id = exemption.rule_id.clone();
    let tag_name = exemption.tag_name.clone();
    let kind_str = exemption.resource.kind().to_string();
    let resource_str = encode_json(&exemption.resource)?;
    let reason = exemption.reason.clone();
    let created_by = exemption.created_by.clone();
    let at_str = encode_dt(exemption.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO exemptions (
             exemption_id, rule_id, tag_name, resource_kind, resource,
             reason, created_by, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            rule_id,
            tag_name,
            kind_str,
            resource_str,
            reason,
            created_by,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(rule_id = %exemption.rule_id, resource = %exemption.resource, "added exemption");
    Ok(exemption)
  }

  async fn remove_exemptions(&self, ids: Vec<Uuid>) -> Result<usize> {
    let id_strs: Vec<String> = ids.into_iter().map(encode_uuid).collect();

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in &id_strs {
          removed += tx.execute(
            "DELETE FROM exemptions WHERE exemption_id = ?1",
            rusqlite::params![id],
          )?;
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;

    tracing::info!(removed, "removed exemptions");
    Ok(removed)
  }

  async fn list_exemptions(&self) -> Result<Vec<Exemption>> {
    let raws: Vec<RawExemption> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT exemption_id, rule_id, tag_name, resource, reason, created_by, created_at
           FROM exemptions
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map([], RawExemption::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawExemption::into_exemption).collect()
  }

  // ── Tag requirements ──────────────────────────────────────────────────────

  async fn require_tag(&self, input: NewTagRequirement) -> Result<TagRequirement> {
    let requirement = TagRequirement {
      requirement_id: Uuid::new_v4(),
      resource_kind:  input.resource_kind,
      tag_name:       input.tag_name.trim().to_ascii_uppercase(),
      default_value:  input.default_value,
      created_at:     Utc::now(),
    };

    let id_str = encode_uuid(requirement.requirement_id);
    let kind_str = requirement.resource_kind.to_string();
    let tag_name = requirement.tag_name.clone();
    let default_value = requirement.default_value.clone();
    let at_str = encode_dt(requirement.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO tag_requirements (
             requirement_id, resource_kind, tag_name, default_value, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, kind_str, tag_name, default_value, at_str],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateTagRequirement {
        kind:     requirement.resource_kind,
        tag_name: requirement.tag_name,
      });
    }

    tracing::info!(kind = %requirement.resource_kind, tag = %requirement.tag_name, "required tag");
    Ok(requirement)
  }

  async fn list_tag_requirements(&self, kind: Option<ResourceKind>) -> Result<Vec<TagRequirement>> {
    let kind_str = kind.map(|k| k.to_string());

    let raws: Vec<RawTagRequirement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT requirement_id, resource_kind, tag_name, default_value, created_at
           FROM tag_requirements
           WHERE (?1 IS NULL OR resource_kind = ?1)
           ORDER BY resource_kind, tag_name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str], RawTagRequirement::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTagRequirement::into_requirement).collect()
  }
}
