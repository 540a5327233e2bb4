//! The `ComplianceStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `warden-store-sqlite`). The CLI depends on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  exemption::{Exemption, NewExemption},
  lifecycle::{Deactivation, ResolvedAppliedRule, Supersession},
  resource::ResourceKind,
  rule::{AppliedRule, NewAppliedRule, NewRule, Rule},
  snapshot::ResourceSnapshot,
  tag::{NewTagRequirement, TagRequirement},
};

/// Abstraction over a Warden store backend.
///
/// Applied rules are append-only. Threshold changes and switch-offs are
/// expressed as lifecycle events (supersession, deactivation), which are
/// themselves append-only.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ComplianceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Rules ─────────────────────────────────────────────────────────────

  /// Register a rule definition. Returns an error if the id is taken.
  /// Implementations validate the parameter and operator against their
  /// parameter registry.
  fn define_rule(
    &self,
    input: NewRule,
  ) -> impl Future<Output = Result<Rule, Self::Error>> + Send + '_;

  fn get_rule<'a>(
    &'a self,
    rule_id: &'a str,
  ) -> impl Future<Output = Result<Option<Rule>, Self::Error>> + Send + 'a;

  /// List rules (retired ones included), optionally filtered by kind.
  fn list_rules(
    &self,
    kind: Option<ResourceKind>,
  ) -> impl Future<Output = Result<Vec<Rule>, Self::Error>> + Send + '_;

  /// Mark a rule inactive. Its applied rules stay as they are but are no
  /// longer bound for evaluation.
  fn retire_rule<'a>(
    &'a self,
    rule_id: &'a str,
  ) -> impl Future<Output = Result<Rule, Self::Error>> + Send + 'a;

  // ── Applied rules ─────────────────────────────────────────────────────

  /// Record a threshold for an active rule, superseding the currently active
  /// applied rule for the same rule id in the same transaction.
  ///
  /// The `applied_at` timestamp is set by the store.
  fn apply_rule(
    &self,
    input: NewAppliedRule,
  ) -> impl Future<Output = Result<(Option<Supersession>, AppliedRule), Self::Error>> + Send + '_;

  /// Switch an applied rule off with no replacement.
  ///
  /// Returns an error if it is already superseded or deactivated.
  fn deactivate_applied_rule(
    &self,
    applied_rule_id: Uuid,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Deactivation, Self::Error>> + Send + '_;

  /// All applied rules with their lifecycle status resolved, ordered by
  /// `applied_at`. With `include_inactive == false` only active ones.
  fn list_applied_rules(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<ResolvedAppliedRule>, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Truncate-and-reload: drop every stored snapshot of `kind` and insert
  /// `snapshots` in one transaction. Returns the number inserted.
  ///
  /// Every snapshot must be of `kind`.
  fn replace_snapshots(
    &self,
    kind: ResourceKind,
    snapshots: Vec<ResourceSnapshot>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Append a single capture, e.g. the corrected state after a fix.
  fn record_snapshot(
    &self,
    snapshot: ResourceSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most recent capture of each resource, optionally for one kind.
  fn latest_snapshots(
    &self,
    kind: Option<ResourceKind>,
  ) -> impl Future<Output = Result<Vec<ResourceSnapshot>, Self::Error>> + Send + '_;

  // ── Exemptions ────────────────────────────────────────────────────────

  fn add_exemption(
    &self,
    input: NewExemption,
  ) -> impl Future<Output = Result<Exemption, Self::Error>> + Send + '_;

  /// Delete the given exemptions. Returns how many existed.
  fn remove_exemptions(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn list_exemptions(
    &self,
  ) -> impl Future<Output = Result<Vec<Exemption>, Self::Error>> + Send + '_;

  // ── Tag requirements ──────────────────────────────────────────────────

  /// Require a tag on every resource of a kind. Returns an error if the same
  /// tag is already required for that kind.
  fn require_tag(
    &self,
    input: NewTagRequirement,
  ) -> impl Future<Output = Result<TagRequirement, Self::Error>> + Send + '_;

  fn list_tag_requirements(
    &self,
    kind: Option<ResourceKind>,
  ) -> impl Future<Output = Result<Vec<TagRequirement>, Self::Error>> + Send + '_;
}
