//! Subcommands and their handlers.
//!
//! Handlers are generic over [`ComplianceStore`]; the registry is passed
//! separately so rule validation and evaluation share one table.

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use strum::IntoEnumIterator;
use uuid::Uuid;
use warden_core::{
  evaluate::Evaluator,
  exemption::NewExemption,
  lifecycle::{AppliedRuleStatus, bind_active_rules},
  registry::ParameterRegistry,
  remediation::{FixPlan, plan_fixes},
  report::{ComplianceReport, ReportSummary, ResourceCompliance, StatusFilter},
  resource::{ResourceIdentity, ResourceKind},
  rule::{NewAppliedRule, NewRule, Operator, Remediation, RuleScope},
  snapshot::{ResourceSnapshot, parse_snapshot_export},
  store::ComplianceStore,
  tag::NewTagRequirement,
};

use crate::config::WardenConfig;

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Manage rule definitions.
  Rules {
    #[command(subcommand)]
    action: RulesCommand,
  },

  /// Set the threshold for a rule, superseding the current one.
  Apply {
    rule_id:           String,
    /// Parsed according to the parameter's type.
    threshold:         String,
    /// Value fixes set instead of the threshold. Needed for NOT_EQUALS.
    #[arg(long)]
    remediation_value: Option<String>,
    /// Only cover resources with this tag, as `NAME` or `NAME=VALUE`.
    #[arg(long, value_name = "TAG")]
    scope:             Option<String>,
  },

  /// List applied thresholds.
  Applied {
    /// Include superseded and deactivated thresholds.
    #[arg(long)]
    all: bool,
  },

  /// Switch an applied threshold off without replacing it.
  Deactivate {
    applied_rule_id: Uuid,
    #[arg(long)]
    reason:          Option<String>,
  },

  /// Load or inspect captured configuration.
  Snapshots {
    #[command(subcommand)]
    action: SnapshotsCommand,
  },

  /// Evaluate every resource against the active rules.
  Check {
    #[arg(long)]
    kind:   Option<ResourceKind>,
    /// all, compliant, non-compliant, non-compliant-first or exempted.
    #[arg(long, default_value = "non-compliant-first")]
    filter: StatusFilter,
    /// Case-insensitive match on resource, rule or tag names.
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long)]
    json:   bool,
  },

  /// Print remediation statements for current violations.
  Fixes {
    #[arg(long)]
    kind:   Option<ResourceKind>,
    /// Only fixes for this rule id.
    #[arg(long)]
    rule:   Option<String>,
    /// Record the corrected configuration as new snapshots, for use after
    /// the statements have been run.
    #[arg(long)]
    record: bool,
    #[arg(long)]
    json:   bool,
  },

  /// Manage exemptions.
  Exempt {
    #[command(subcommand)]
    action: ExemptCommand,
  },

  /// Manage required tags.
  Tags {
    #[command(subcommand)]
    action: TagsCommand,
  },

  /// List the parameters rules can refer to.
  Parameters {
    #[arg(long)]
    kind: Option<ResourceKind>,
  },
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
  /// Register a new rule.
  Define {
    rule_id:     String,
    #[arg(long)]
    kind:        ResourceKind,
    #[arg(long)]
    parameter:   String,
    /// MAX, MIN, EQUALS or NOT_EQUALS.
    #[arg(long)]
    operator:    Operator,
    #[arg(long)]
    name:        Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    unit:        Option<String>,
    /// none, sql or sql_and_execute.
    #[arg(long, default_value = "sql")]
    remediation: Remediation,
  },
  List {
    #[arg(long)]
    kind: Option<ResourceKind>,
  },
  Retire {
    rule_id: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotsCommand {
  /// Replace every stored snapshot of KIND with the contents of FILE.
  Load {
    kind: ResourceKind,
    file: PathBuf,
  },
  /// Show the latest capture of each resource.
  List {
    #[arg(long)]
    kind: Option<ResourceKind>,
    #[arg(long)]
    json: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum ExemptCommand {
  /// Exempt a resource from a rule (`--rule`) or a required tag (`--tag`).
  Add {
    #[arg(long)]
    kind:     ResourceKind,
    /// Qualified name, e.g. `DB.SCH.T1`.
    resource: String,
    #[arg(long, conflicts_with = "tag", required_unless_present = "tag")]
    rule:     Option<String>,
    #[arg(long)]
    tag:      Option<String>,
    #[arg(long)]
    reason:   Option<String>,
  },
  List,
  Remove {
    #[arg(required = true)]
    ids: Vec<Uuid>,
  },
}

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
  /// Require TAG on every resource of KIND.
  Require {
    kind:    ResourceKind,
    tag:     String,
    /// Value fixes assign when the tag is missing.
    #[arg(long)]
    default: Option<String>,
  },
  List {
    #[arg(long)]
    kind: Option<ResourceKind>,
  },
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

pub async fn run<S: ComplianceStore>(
  command: Command,
  store: &S,
  registry: &ParameterRegistry,
  config: &WardenConfig,
) -> Result<()> {
  match command {
    Command::Rules { action } => rules(action, store).await,
    Command::Apply { rule_id, threshold, remediation_value, scope } => {
      apply(store, registry, config, &rule_id, &threshold, remediation_value, scope).await
    }
    Command::Applied { all } => applied(store, all).await,
    Command::Deactivate { applied_rule_id, reason } => {
      let d = store.deactivate_applied_rule(applied_rule_id, reason).await?;
      println!("deactivated {} at {}", d.applied_rule_id, d.recorded_at);
      Ok(())
    }
    Command::Snapshots { action } => snapshots(action, store).await,
    Command::Check { kind, filter, search, json } => {
      let report = build_report(store, registry, kind).await?;
      print_report(&report, filter, &search, json)
    }
    Command::Fixes { kind, rule, record, json } => {
      fixes(store, registry, kind, rule, record, json).await
    }
    Command::Exempt { action } => exempt(action, store, config).await,
    Command::Tags { action } => tags(action, store).await,
    Command::Parameters { kind } => {
      for kind in kind.map_or_else(|| ResourceKind::iter().collect(), |k| vec![k]) {
        for p in registry.parameters(kind) {
          println!(
            "{:<10} {:<38} {:<8} {:<8} {}",
            kind,
            p.name,
            p.value_type,
            p.unit.as_deref().unwrap_or("-"),
            if p.fix.is_some() { "fixable" } else { "evaluate-only" }
          );
        }
      }
      Ok(())
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

async fn rules<S: ComplianceStore>(action: RulesCommand, store: &S) -> Result<()> {
  match action {
    RulesCommand::Define {
      rule_id,
      kind,
      parameter,
      operator,
      name,
      description,
      unit,
      remediation,
    } => {
      let mut input = NewRule::new(&rule_id, kind, &parameter, operator).with_remediation(remediation);
      if let Some(name) = name {
        input = input.named(name);
      }
      if let Some(unit) = unit {
        input = input.with_unit(unit);
      }
      input.description = description;

      let rule = store.define_rule(input).await?;
      println!("defined {} ({} {} on {})", rule.rule_id, rule.parameter, rule.operator, rule.resource_kind);
    }
    RulesCommand::List { kind } => {
      for rule in store.list_rules(kind).await? {
        println!(
          "{:<28} {:<10} {:<36} {:<10} {:<16} {}",
          rule.rule_id,
          rule.resource_kind,
          rule.parameter,
          rule.operator,
          rule.remediation,
          if rule.is_active { "active" } else { "retired" }
        );
      }
    }
    RulesCommand::Retire { rule_id } => {
      let rule = store.retire_rule(&rule_id).await?;
      println!("retired {}", rule.rule_id);
    }
  }
  Ok(())
}

/// `NAME` or `NAME=VALUE`.
fn parse_scope(input: &str) -> RuleScope {
  match input.split_once('=') {
    Some((name, value)) => RuleScope::Tagged {
      tag_name:  name.trim().to_ascii_uppercase(),
      tag_value: Some(value.trim().to_owned()),
    },
    None => RuleScope::Tagged { tag_name: input.trim().to_ascii_uppercase(), tag_value: None },
  }
}

async fn apply<S: ComplianceStore>(
  store: &S,
  registry: &ParameterRegistry,
  config: &WardenConfig,
  rule_id: &str,
  threshold: &str,
  remediation_value: Option<String>,
  scope: Option<String>,
) -> Result<()> {
  let rule = store
    .get_rule(rule_id)
    .await?
    .with_context(|| format!("rule {rule_id} is not defined"))?;
  let value_type = registry.descriptor_for(&rule)?.value_type;

  let mut input = NewAppliedRule::new(&rule.rule_id, value_type.parse_value(threshold)?);
  input.remediation_value = remediation_value
    .as_deref()
    .map(|v| value_type.parse_value(v))
    .transpose()?;
  input.scope = scope.as_deref().map(parse_scope).unwrap_or_default();
  input.applied_by = Some(config.applied_by.clone());

  let (supersession, applied) = store.apply_rule(input).await?;
  println!("applied {} {} {}", applied.rule_id, rule.operator, applied.threshold);
  if let Some(s) = supersession {
    println!("superseded {}", s.old_applied_rule_id);
  }
  Ok(())
}

async fn applied<S: ComplianceStore>(store: &S, include_inactive: bool) -> Result<()> {
  for resolved in store.list_applied_rules(include_inactive).await? {
    let a = &resolved.applied;
    let status = match &resolved.status {
      AppliedRuleStatus::Active => "active".to_owned(),
      AppliedRuleStatus::Superseded { by, .. } => format!("superseded by {by}"),
      AppliedRuleStatus::Deactivated { reason, .. } => match reason {
        Some(r) => format!("deactivated ({r})"),
        None => "deactivated".to_owned(),
      },
    };
    let scope = match &a.scope {
      RuleScope::All => "all".to_owned(),
      RuleScope::Tagged { tag_name, tag_value: None } => format!("tag {tag_name}"),
      RuleScope::Tagged { tag_name, tag_value: Some(v) } => format!("tag {tag_name}={v}"),
    };
    println!(
      "{}  {:<28} {:<12} {:<16} {}  {}",
      a.applied_rule_id,
      a.rule_id,
      a.threshold,
      scope,
      a.applied_at.format("%Y-%m-%d %H:%M"),
      status
    );
  }
  Ok(())
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

async fn snapshots<S: ComplianceStore>(action: SnapshotsCommand, store: &S) -> Result<()> {
  match action {
    SnapshotsCommand::Load { kind, file } => {
      let raw = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading snapshot export {}", file.display()))?;
      let snapshots = parse_snapshot_export(&raw, Utc::now())
        .with_context(|| format!("parsing snapshot export {}", file.display()))?;
      let n = store.replace_snapshots(kind, snapshots).await?;
      println!("loaded {n} {kind} snapshot(s)");
    }
    SnapshotsCommand::List { kind, json } => {
      let snapshots = store.latest_snapshots(kind).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
      }
      for s in snapshots {
        let values = s
          .values
          .iter()
          .map(|(k, v)| format!("{k}={v}"))
          .collect::<Vec<_>>()
          .join(" ");
        println!("{}  {}  {}", s.resource, s.captured_at.format("%Y-%m-%d %H:%M"), values);
      }
    }
  }
  Ok(())
}

// ─── Check ───────────────────────────────────────────────────────────────────

async fn build_report<S: ComplianceStore>(
  store: &S,
  registry: &ParameterRegistry,
  kind: Option<ResourceKind>,
) -> Result<ComplianceReport> {
  let rules = store.list_rules(kind).await?;
  let applied = store.list_applied_rules(false).await?;
  // Thresholds for rules filtered out by kind are not bound.
  let applied: Vec<_> = applied
    .into_iter()
    .filter(|a| rules.iter().any(|r| r.rule_id == a.applied.rule_id))
    .collect();
  let bound = bind_active_rules(&rules, &applied)?;

  let snapshots = store.latest_snapshots(kind).await?;
  let tag_requirements = store.list_tag_requirements(kind).await?;
  let exemptions = store.list_exemptions().await?;
  tracing::debug!(
    rules = bound.len(),
    snapshots = snapshots.len(),
    tag_requirements = tag_requirements.len(),
    "evaluating"
  );

  Ok(Evaluator::new(registry).evaluate_all(snapshots, &bound, &tag_requirements, &exemptions))
}

#[derive(Serialize)]
struct JsonReport<'a> {
  summary:   ReportSummary,
  resources: Vec<&'a ResourceCompliance>,
}

fn print_report(
  report: &ComplianceReport,
  filter: StatusFilter,
  search: &str,
  json: bool,
) -> Result<()> {
  let summary = report.summary();
  let resources = report.view(filter, search);

  if json {
    let out = JsonReport { summary, resources };
    println!("{}", serde_json::to_string_pretty(&out)?);
    return Ok(());
  }

  println!(
    "{}/{} resources compliant ({:.1}%), {} non-compliant, {} exempted violation(s)",
    summary.compliant,
    summary.total,
    summary.compliance_rate,
    summary.non_compliant,
    summary.exempted_violations
  );
  for (kind, k) in &summary.by_kind {
    println!("  {kind:<10} {}/{}", k.compliant, k.total);
  }

  for resource in resources {
    println!();
    let owner = resource.owner.as_deref().map(|o| format!(" (owner {o})")).unwrap_or_default();
    let status = if resource.is_compliant() { "compliant" } else { "NON-COMPLIANT" };
    println!("{}{owner}: {status}", resource.resource);

    for r in &resource.results {
      let mark = match (r.is_compliant, r.exempted) {
        (true, _) => "ok    ",
        (false, true) => "exempt",
        (false, false) => "FAIL  ",
      };
      match &r.violation_reason {
        Some(reason) => println!("  {mark} {:<28} {reason}", r.rule_id),
        None => println!("  {mark} {}", r.rule_id),
      }
    }
    for t in &resource.tag_violations {
      let mark = if t.exempted { "exempt" } else { "FAIL  " };
      println!("  {mark} missing tag {}", t.tag_name);
    }
    for e in &resource.errors {
      println!("  ERROR  {:<28} {}", e.rule_id, e.message);
    }
  }
  Ok(())
}

// ─── Fixes ───────────────────────────────────────────────────────────────────

async fn fixes<S: ComplianceStore>(
  store: &S,
  registry: &ParameterRegistry,
  kind: Option<ResourceKind>,
  rule: Option<String>,
  record: bool,
  json: bool,
) -> Result<()> {
  let report = build_report(store, registry, kind).await?;
  let mut plan: FixPlan = plan_fixes(&report, registry);
  if let Some(rule_id) = &rule {
    plan = plan.only_rule(rule_id);
  }

  if json {
    println!("{}", serde_json::to_string_pretty(&plan)?);
  } else if plan.is_empty() {
    println!("-- no fixes needed");
  } else {
    println!("{}", plan.script());
  }

  if record {
    let recorded = record_corrections(store, &plan, kind).await?;
    tracing::info!(recorded, "recorded corrected snapshots");
  }
  Ok(())
}

/// Append one corrected capture per resource, with every planned correction
/// for that resource applied.
async fn record_corrections<S: ComplianceStore>(
  store: &S,
  plan: &FixPlan,
  kind: Option<ResourceKind>,
) -> Result<usize> {
  let snapshots = store.latest_snapshots(kind).await?;
  let now = Utc::now();

  let mut corrected: BTreeMap<(ResourceKind, String), ResourceSnapshot> = BTreeMap::new();
  for fix in &plan.fixes {
    let key = fix.resource.key();
    let base = match corrected.remove(&key) {
      Some(pending) => pending,
      None => match snapshots.iter().find(|s| s.resource.matches(&fix.resource)) {
        Some(current) => current.clone(),
        None => {
          tracing::warn!(resource = %fix.resource, "no snapshot to correct");
          continue;
        }
      },
    };
    corrected.insert(key, fix.correction.apply(&base, now));
  }

  let recorded = corrected.len();
  for snapshot in corrected.into_values() {
    store.record_snapshot(snapshot).await?;
  }
  Ok(recorded)
}

// ─── Exemptions ──────────────────────────────────────────────────────────────

async fn exempt<S: ComplianceStore>(
  action: ExemptCommand,
  store: &S,
  config: &WardenConfig,
) -> Result<()> {
  match action {
    ExemptCommand::Add { kind, resource, rule, tag, reason } => {
      let identity = ResourceIdentity::parse(kind, &resource)?;
      let mut input = match (rule, tag) {
        (Some(rule_id), None) => {
          if store.get_rule(&rule_id).await?.is_none() {
            bail!("rule {rule_id} is not defined");
          }
          NewExemption::for_rule(&rule_id, identity)
        }
        (None, Some(tag)) => NewExemption::for_tag(&tag, identity),
        _ => bail!("exactly one of --rule or --tag is required"),
      };
      input.reason = reason;
      input.created_by = Some(config.applied_by.clone());

      let e = store.add_exemption(input).await?;
      println!("added exemption {}", e.exemption_id);
    }
    ExemptCommand::List => {
      for e in store.list_exemptions().await? {
        let target = match &e.tag_name {
          Some(tag) => format!("tag {tag}"),
          None => e.rule_id.clone(),
        };
        println!(
          "{}  {:<32} {:<28} {}",
          e.exemption_id,
          e.resource.to_string(),
          target,
          e.reason.as_deref().unwrap_or("")
        );
      }
    }
    ExemptCommand::Remove { ids } => {
      let requested = ids.len();
      let removed = store.remove_exemptions(ids).await?;
      println!("removed {removed} of {requested} exemption(s)");
    }
  }
  Ok(())
}

// ─── Tags ────────────────────────────────────────────────────────────────────

async fn tags<S: ComplianceStore>(action: TagsCommand, store: &S) -> Result<()> {
  match action {
    TagsCommand::Require { kind, tag, default } => {
      let mut input = NewTagRequirement::new(kind, &tag);
      input.default_value = default;
      let r = store.require_tag(input).await?;
      println!("{} resources now require tag {}", r.resource_kind, r.tag_name);
    }
    TagsCommand::List { kind } => {
      for r in store.list_tag_requirements(kind).await? {
        println!(
          "{:<10} {:<28} {}",
          r.resource_kind,
          r.tag_name,
          r.default_value.as_deref().unwrap_or("-")
        );
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone};
  use clap::Parser;
  use warden_core::value::ConfigValue;
  use warden_store_sqlite::SqliteStore;

  use super::*;

  #[derive(Parser)]
  struct TestCli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    TestCli::try_parse_from(std::iter::once("warden").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn scope_parsing() {
    assert_eq!(parse_scope("env"), RuleScope::Tagged { tag_name: "ENV".into(), tag_value: None });
    assert_eq!(
      parse_scope("env = prod"),
      RuleScope::Tagged { tag_name: "ENV".into(), tag_value: Some("prod".into()) }
    );
  }

  #[test]
  fn define_parses_enums() {
    let cmd = parse(&[
      "rules", "define", "MAX_AUTO_SUSPEND",
      "--kind", "warehouse",
      "--parameter", "auto_suspend",
      "--operator", "max",
      "--remediation", "sql_and_execute",
    ]);
    match cmd {
      Command::Rules { action: RulesCommand::Define { rule_id, kind, operator, remediation, .. } } => {
        assert_eq!(rule_id, "MAX_AUTO_SUSPEND");
        assert_eq!(kind, ResourceKind::Warehouse);
        assert_eq!(operator, Operator::Max);
        assert_eq!(remediation, Remediation::SqlAndExecute);
      }
      other => panic!("unexpected command: {other:?}"),
    }
  }

  #[test]
  fn check_defaults() {
    let Command::Check { kind, filter, search, json } = parse(&["check"]) else {
      panic!("expected check");
    };
    assert_eq!(kind, None);
    assert_eq!(filter, StatusFilter::NonCompliantFirst);
    assert!(search.is_empty());
    assert!(!json);
  }

  #[test]
  fn exempt_requires_rule_or_tag() {
    let args = ["warden", "exempt", "add", "--kind", "warehouse", "WH1"];
    assert!(TestCli::try_parse_from(args).is_err());

    let args = ["warden", "exempt", "add", "--kind", "warehouse", "WH1", "--rule", "R", "--tag", "T"];
    assert!(TestCli::try_parse_from(args).is_err());
  }

  // ─── Handlers ──────────────────────────────────────────────────────────────

  fn config() -> WardenConfig {
    WardenConfig { store_path: PathBuf::from(":memory:"), applied_by: "tester".into() }
  }

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap() }

  /// A store with WH1 breaking both an auto-suspend maximum and a scaling
  /// policy rule, and a table breaking a retention maximum.
  async fn seeded() -> SqliteStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let registry = store.registry().clone();
    let cfg = config();

    for rule in [
      NewRule::new("MAX_AUTO_SUSPEND", ResourceKind::Warehouse, "auto_suspend", Operator::Max),
      NewRule::new("STD_SCALING", ResourceKind::Warehouse, "scaling_policy", Operator::Equals),
      NewRule::new(
        "MAX_TABLE_RETENTION",
        ResourceKind::Table,
        "data_retention_time_in_days",
        Operator::Max,
      ),
    ] {
      store.define_rule(rule).await.unwrap();
    }
    apply(&store, &registry, &cfg, "MAX_AUTO_SUSPEND", "30", None, None).await.unwrap();
    apply(&store, &registry, &cfg, "std_scaling", "STANDARD", None, None).await.unwrap();
    apply(&store, &registry, &cfg, "MAX_TABLE_RETENTION", "1", None, None).await.unwrap();

    store
      .replace_snapshots(ResourceKind::Warehouse, vec![
        ResourceSnapshot::new(ResourceIdentity::warehouse("WH1"), at(0))
          .with_value("auto_suspend", 300)
          .with_value("scaling_policy", "ECONOMY"),
        ResourceSnapshot::new(ResourceIdentity::warehouse("WH2"), at(0))
          .with_value("auto_suspend", 20)
          .with_value("scaling_policy", "STANDARD"),
      ])
      .await
      .unwrap();
    store
      .replace_snapshots(ResourceKind::Table, vec![
        ResourceSnapshot::new(ResourceIdentity::table("DB", "SCH", "T1"), at(0))
          .with_value("data_retention_time_in_days", 7),
      ])
      .await
      .unwrap();
    store
  }

  async fn violations(store: &SqliteStore) -> Vec<(String, String)> {
    build_report(store, store.registry(), None)
      .await
      .unwrap()
      .violations()
      .map(|v| (v.resource.qualified_name(), v.rule_id.clone()))
      .collect()
  }

  #[tokio::test]
  async fn apply_parses_threshold_by_parameter_type() {
    let store = seeded().await;
    let active = store.list_applied_rules(false).await.unwrap();
    let scaling = active.iter().find(|a| a.applied.rule_id == "STD_SCALING").unwrap();
    assert_eq!(scaling.applied.threshold, ConfigValue::Text("STANDARD".into()));
    assert_eq!(scaling.applied.applied_by.as_deref(), Some("tester"));

    let registry = store.registry().clone();
    let err = apply(&store, &registry, &config(), "MAX_AUTO_SUSPEND", "soon", None, None).await;
    assert!(err.is_err());
  }

  #[tokio::test]
  async fn check_kind_filter_limits_rules_and_resources() {
    let store = seeded().await;

    let report = build_report(&store, store.registry(), Some(ResourceKind::Table)).await.unwrap();
    assert_eq!(report.resources.len(), 1);
    let table = &report.resources[0];
    assert_eq!(table.resource.qualified_name(), "DB.SCH.T1");
    assert_eq!(table.results.len(), 1);
    assert_eq!(table.results[0].rule_id, "MAX_TABLE_RETENTION");
    assert!(!table.is_compliant());

    let all = build_report(&store, store.registry(), None).await.unwrap();
    assert_eq!(all.summary().total, 3);
    assert_eq!(all.summary().non_compliant, 2);
  }

  #[tokio::test]
  async fn fixes_record_keeps_every_correction_for_a_resource() {
    let store = seeded().await;
    let registry = store.registry().clone();

    fixes(&store, &registry, Some(ResourceKind::Warehouse), None, true, false).await.unwrap();

    assert_eq!(violations(&store).await, [("DB.SCH.T1".to_owned(), "MAX_TABLE_RETENTION".to_owned())]);

    let latest = store.latest_snapshots(Some(ResourceKind::Warehouse)).await.unwrap();
    let wh1 = latest.iter().find(|s| s.resource == ResourceIdentity::warehouse("WH1")).unwrap();
    assert_eq!(wh1.value("auto_suspend"), Some(&ConfigValue::Integer(30)));
    assert_eq!(wh1.value("scaling_policy"), Some(&ConfigValue::Text("STANDARD".into())));
    assert!(wh1.captured_at > at(0));
  }

  #[tokio::test]
  async fn fixes_rule_filter_records_only_that_rule() {
    let store = seeded().await;
    let registry = store.registry().clone();

    fixes(&store, &registry, None, Some("std_scaling".into()), true, false).await.unwrap();

    assert_eq!(violations(&store).await, [
      ("WH1".to_owned(), "MAX_AUTO_SUSPEND".to_owned()),
      ("DB.SCH.T1".to_owned(), "MAX_TABLE_RETENTION".to_owned()),
    ]);
  }

  #[tokio::test]
  async fn fixes_without_record_leave_snapshots_alone() {
    let store = seeded().await;
    let registry = store.registry().clone();
    let before = store.latest_snapshots(None).await.unwrap();

    fixes(&store, &registry, None, None, false, true).await.unwrap();

    assert_eq!(store.latest_snapshots(None).await.unwrap(), before);
  }
}
