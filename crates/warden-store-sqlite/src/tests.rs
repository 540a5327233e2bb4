//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;
use warden_core::{
  evaluate::Evaluator,
  exemption::NewExemption,
  lifecycle::{AppliedRuleStatus, bind_active_rules},
  remediation::plan_fixes,
  resource::{ResourceIdentity, ResourceKind},
  rule::{NewAppliedRule, NewRule, Operator, Remediation, RuleScope},
  snapshot::ResourceSnapshot,
  store::ComplianceStore,
  tag::NewTagRequirement,
  value::ConfigValue,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap() }

fn max_auto_suspend() -> NewRule {
  NewRule::new("MAX_AUTO_SUSPEND", ResourceKind::Warehouse, "auto_suspend", Operator::Max)
    .named("Warehouse auto-suspend")
    .with_remediation(Remediation::SqlAndExecute)
}

fn warehouse(name: &str, auto_suspend: i64, captured_at: DateTime<Utc>) -> ResourceSnapshot {
  ResourceSnapshot::new(ResourceIdentity::warehouse(name), captured_at)
    .with_value("auto_suspend", auto_suspend)
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn define_and_get_rule() {
  let s = store().await;

  let rule = s.define_rule(max_auto_suspend()).await.unwrap();
  assert!(rule.is_active);
  assert_eq!(rule.operator, Operator::Max);

  let fetched = s.get_rule("max_auto_suspend").await.unwrap().unwrap();
  assert_eq!(fetched, rule);
}

#[tokio::test]
async fn get_rule_missing_returns_none() {
  let s = store().await;
  assert!(s.get_rule("NOPE").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_rule_is_rejected() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();
  let err = s.define_rule(max_auto_suspend()).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateRule(id) if id == "MAX_AUTO_SUSPEND"));
}

#[tokio::test]
async fn concurrent_duplicate_defines_report_duplicate_rule() {
  let s = store().await;
  let (a, b) = tokio::join!(s.define_rule(max_auto_suspend()), s.define_rule(max_auto_suspend()));

  let results = [a, b];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(
    results
      .iter()
      .any(|r| matches!(r, Err(Error::DuplicateRule(id)) if id == "MAX_AUTO_SUSPEND"))
  );
  assert_eq!(s.list_rules(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rule_with_unknown_parameter_is_rejected() {
  let s = store().await;
  let err = s
    .define_rule(NewRule::new("R", ResourceKind::Table, "auto_suspend", Operator::Max))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(warden_core::Error::UnknownParameter { .. })));
  assert!(s.list_rules(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_rules_filtered_by_kind() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();
  s.define_rule(NewRule::new(
    "MAX_TABLE_RETENTION",
    ResourceKind::Table,
    "data_retention_time_in_days",
    Operator::Max,
  ))
  .await
  .unwrap();

  assert_eq!(s.list_rules(None).await.unwrap().len(), 2);
  let tables = s.list_rules(Some(ResourceKind::Table)).await.unwrap();
  assert_eq!(tables.len(), 1);
  assert_eq!(tables[0].rule_id, "MAX_TABLE_RETENTION");
}

#[tokio::test]
async fn retired_rule_cannot_be_applied() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();

  let retired = s.retire_rule("MAX_AUTO_SUSPEND").await.unwrap();
  assert!(!retired.is_active);

  let err = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 30)).await.unwrap_err();
  assert!(matches!(err, Error::RuleRetired(_)));
}

#[tokio::test]
async fn retire_missing_rule_fails() {
  let s = store().await;
  let err = s.retire_rule("NOPE").await.unwrap_err();
  assert!(matches!(err, Error::RuleNotFound(_)));
}

// ─── Applied rules ───────────────────────────────────────────────────────────

#[tokio::test]
async fn first_apply_supersedes_nothing() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();

  let (sup, applied) = s.apply_rule(NewAppliedRule::new("max_auto_suspend", 30)).await.unwrap();
  assert!(sup.is_none());
  assert_eq!(applied.rule_id, "MAX_AUTO_SUSPEND");
  assert_eq!(applied.threshold, ConfigValue::Integer(30));
  assert_eq!(applied.scope, RuleScope::All);
}

#[tokio::test]
async fn reapply_supersedes_previous_threshold() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();

  let (_, first) = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 60)).await.unwrap();
  let (sup, second) = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 30)).await.unwrap();

  let sup = sup.expect("supersession");
  assert_eq!(sup.old_applied_rule_id, first.applied_rule_id);
  assert_eq!(sup.new_applied_rule_id, second.applied_rule_id);

  let active = s.list_applied_rules(false).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].applied.applied_rule_id, second.applied_rule_id);

  let all = s.list_applied_rules(true).await.unwrap();
  assert_eq!(all.len(), 2);
  assert!(matches!(
    all[0].status,
    AppliedRuleStatus::Superseded { by, .. } if by == second.applied_rule_id
  ));
  assert!(all[1].status.is_active());
}

#[tokio::test]
async fn apply_rejects_mistyped_threshold() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();

  let err = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", "thirty")).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(warden_core::Error::ThresholdTypeMismatch { role: "threshold", .. })
  ));
  assert!(s.list_applied_rules(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn apply_unknown_rule_fails() {
  let s = store().await;
  let err = s.apply_rule(NewAppliedRule::new("GHOST", 1)).await.unwrap_err();
  assert!(matches!(err, Error::RuleNotFound(id) if id == "GHOST"));
}

#[tokio::test]
async fn applied_rule_roundtrips_scope_and_remediation_value() {
  let s = store().await;
  s.define_rule(NewRule::new(
    "NO_ZERO_TIMEOUT",
    ResourceKind::Warehouse,
    "statement_timeout_in_seconds",
    Operator::NotEquals,
  ))
  .await
  .unwrap();

  let mut input = NewAppliedRule::new("NO_ZERO_TIMEOUT", 0);
  input.remediation_value = Some(ConfigValue::Integer(172_800));
  input.scope = RuleScope::Tagged { tag_name: "ENV".into(), tag_value: Some("prod".into()) };
  input.applied_by = Some("alice".into());
  let (_, applied) = s.apply_rule(input).await.unwrap();

  let listed = s.list_applied_rules(false).await.unwrap();
  assert_eq!(listed[0].applied, applied);
}

#[tokio::test]
async fn deactivate_applied_rule() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();
  let (_, applied) = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 30)).await.unwrap();

  let d = s
    .deactivate_applied_rule(applied.applied_rule_id, Some("migrating".into()))
    .await
    .unwrap();
  assert_eq!(d.applied_rule_id, applied.applied_rule_id);

  assert!(s.list_applied_rules(false).await.unwrap().is_empty());
  let all = s.list_applied_rules(true).await.unwrap();
  assert!(matches!(
    &all[0].status,
    AppliedRuleStatus::Deactivated { reason: Some(r), .. } if r == "migrating"
  ));

  // A later apply starts a fresh chain rather than superseding the
  // deactivated row.
  let (sup, _) = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 45)).await.unwrap();
  assert!(sup.is_none());
}

#[tokio::test]
async fn deactivate_twice_fails() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();
  let (_, applied) = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 30)).await.unwrap();

  s.deactivate_applied_rule(applied.applied_rule_id, None).await.unwrap();
  let err = s.deactivate_applied_rule(applied.applied_rule_id, None).await.unwrap_err();
  assert!(matches!(err, Error::AlreadyDeactivated(_)));
}

#[tokio::test]
async fn deactivate_superseded_fails() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();
  let (_, first) = s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 60)).await.unwrap();
  s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 30)).await.unwrap();

  let err = s.deactivate_applied_rule(first.applied_rule_id, None).await.unwrap_err();
  assert!(matches!(err, Error::AlreadySuperseded(_)));
}

#[tokio::test]
async fn deactivate_missing_fails() {
  let s = store().await;
  let err = s.deactivate_applied_rule(Uuid::new_v4(), None).await.unwrap_err();
  assert!(matches!(err, Error::AppliedRuleNotFound(_)));
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_snapshots_only_touches_one_kind() {
  let s = store().await;

  s.replace_snapshots(ResourceKind::Warehouse, vec![
    warehouse("WH1", 300, at(0)),
    warehouse("WH2", 20, at(0)),
  ])
  .await
  .unwrap();
  s.replace_snapshots(ResourceKind::Database, vec![
    ResourceSnapshot::new(ResourceIdentity::database("DB"), at(0))
      .with_value("data_retention_time_in_days", 7),
  ])
  .await
  .unwrap();

  let n = s
    .replace_snapshots(ResourceKind::Warehouse, vec![warehouse("WH3", 60, at(10))])
    .await
    .unwrap();
  assert_eq!(n, 1);

  let warehouses = s.latest_snapshots(Some(ResourceKind::Warehouse)).await.unwrap();
  assert_eq!(warehouses.len(), 1);
  assert_eq!(warehouses[0].resource, ResourceIdentity::warehouse("WH3"));

  assert_eq!(s.latest_snapshots(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn replace_snapshots_rejects_other_kinds() {
  let s = store().await;
  let err = s
    .replace_snapshots(ResourceKind::Warehouse, vec![ResourceSnapshot::new(
      ResourceIdentity::table("DB", "SCH", "T1"),
      at(0),
    )])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SnapshotKindMismatch { expected: ResourceKind::Warehouse, .. }));
}

#[tokio::test]
async fn recorded_snapshot_becomes_latest() {
  let s = store().await;
  let original = warehouse("WH1", 300, at(0)).with_tag("cost_center", "eng").with_owner("SYSADMIN");
  s.replace_snapshots(ResourceKind::Warehouse, vec![original.clone()]).await.unwrap();

  let fixed = original.corrected("auto_suspend", ConfigValue::Integer(30), at(0) + Duration::minutes(5));
  s.record_snapshot(fixed.clone()).await.unwrap();

  let latest = s.latest_snapshots(Some(ResourceKind::Warehouse)).await.unwrap();
  assert_eq!(latest, vec![fixed]);
}

// ─── Exemptions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_list_and_remove_exemptions() {
  let s = store().await;

  let a = s
    .add_exemption(
      NewExemption::for_rule("max_auto_suspend", ResourceIdentity::warehouse("LOADER_WH"))
        .because("nightly batch"),
    )
    .await
    .unwrap();
  let b = s
    .add_exemption(NewExemption::for_tag("cost_center", ResourceIdentity::database("SCRATCH")))
    .await
    .unwrap();
  assert_eq!(a.rule_id, "MAX_AUTO_SUSPEND");
  assert_eq!(b.tag_name.as_deref(), Some("COST_CENTER"));

  let listed = s.list_exemptions().await.unwrap();
  assert_eq!(listed, vec![a.clone(), b.clone()]);

  let removed = s.remove_exemptions(vec![a.exemption_id, Uuid::new_v4()]).await.unwrap();
  assert_eq!(removed, 1);
  assert_eq!(s.list_exemptions().await.unwrap(), vec![b]);
}

// ─── Tag requirements ────────────────────────────────────────────────────────

#[tokio::test]
async fn require_tag_once_per_kind() {
  let s = store().await;

  s.require_tag(NewTagRequirement::new(ResourceKind::Warehouse, "cost_center").with_default("unassigned"))
    .await
    .unwrap();
  s.require_tag(NewTagRequirement::new(ResourceKind::Database, "cost_center"))
    .await
    .unwrap();

  let err = s
    .require_tag(NewTagRequirement::new(ResourceKind::Warehouse, "COST_CENTER"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateTagRequirement { .. }));

  let warehouse_reqs = s.list_tag_requirements(Some(ResourceKind::Warehouse)).await.unwrap();
  assert_eq!(warehouse_reqs.len(), 1);
  assert_eq!(warehouse_reqs[0].default_value.as_deref(), Some("unassigned"));
  assert_eq!(s.list_tag_requirements(None).await.unwrap().len(), 2);
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn check_fix_and_resync() {
  let s = store().await;
  s.define_rule(max_auto_suspend()).await.unwrap();
  s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 60)).await.unwrap();
  s.apply_rule(NewAppliedRule::new("MAX_AUTO_SUSPEND", 30)).await.unwrap();
  s.replace_snapshots(ResourceKind::Warehouse, vec![
    warehouse("WH1", 300, at(0)),
    warehouse("WH2", 20, at(0)),
    warehouse("LOADER_WH", 900, at(0)),
  ])
  .await
  .unwrap();
  s.add_exemption(NewExemption::for_rule("MAX_AUTO_SUSPEND", ResourceIdentity::warehouse("loader_wh")))
    .await
    .unwrap();

  let rules = s.list_rules(None).await.unwrap();
  let applied = s.list_applied_rules(false).await.unwrap();
  let bound = bind_active_rules(&rules, &applied).unwrap();
  assert_eq!(bound.len(), 1);
  assert_eq!(bound[0].applied.threshold, ConfigValue::Integer(30));

  let evaluator = Evaluator::new(s.registry());
  let exemptions = s.list_exemptions().await.unwrap();
  let report = evaluator
    .evaluate_all(s.latest_snapshots(None).await.unwrap(), &bound, &[], &exemptions);
  let summary = report.summary();
  assert_eq!(summary.total, 3);
  assert_eq!(summary.non_compliant, 1);
  assert_eq!(summary.exempted_violations, 1);

  let plan = plan_fixes(&report, s.registry());
  assert_eq!(plan.fixes.len(), 1);
  assert_eq!(plan.fixes[0].statement.as_str(), "ALTER WAREHOUSE WH1 SET AUTO_SUSPEND = 30;");

  let snapshots = s.latest_snapshots(Some(ResourceKind::Warehouse)).await.unwrap();
  for fix in &plan.fixes {
    let current = snapshots
      .iter()
      .find(|snap| snap.resource.matches(&fix.resource))
      .unwrap();
    s.record_snapshot(fix.correction.apply(current, current.captured_at + Duration::seconds(1)))
      .await
      .unwrap();
  }

  let report = evaluator
    .evaluate_all(s.latest_snapshots(None).await.unwrap(), &bound, &[], &exemptions);
  assert_eq!(report.summary().non_compliant, 0);
}
