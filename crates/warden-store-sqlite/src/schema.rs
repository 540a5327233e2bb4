//! SQL schema for the Warden SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Rule definitions. Only is_active is ever updated (retirement).
CREATE TABLE IF NOT EXISTS rules (
    rule_id       TEXT PRIMARY KEY,
    rule_name     TEXT NOT NULL,
    description   TEXT,
    resource_kind TEXT NOT NULL,   -- 'WAREHOUSE' | 'DATABASE' | 'SCHEMA' | 'TABLE'
    parameter     TEXT NOT NULL,
    operator      TEXT NOT NULL,   -- 'MAX' | 'MIN' | 'EQUALS' | 'NOT_EQUALS'
    unit          TEXT,
    remediation   TEXT NOT NULL DEFAULT 'sql',
    is_active     INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    created_at    TEXT NOT NULL
);

-- Applied thresholds are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS applied_rules (
    applied_rule_id   TEXT PRIMARY KEY,
    rule_id           TEXT NOT NULL REFERENCES rules(rule_id),
    threshold         TEXT NOT NULL,   -- JSON scalar
    remediation_value TEXT,            -- JSON scalar or NULL
    scope             TEXT NOT NULL DEFAULT '{\"scope\":\"all\"}',
    applied_at        TEXT NOT NULL,   -- RFC 3339 UTC; store-assigned
    applied_by        TEXT
);

-- A threshold replaced by a newer one for the same rule.
CREATE TABLE IF NOT EXISTS supersessions (
    supersession_id     TEXT PRIMARY KEY,
    old_applied_rule_id TEXT NOT NULL REFERENCES applied_rules(applied_rule_id),
    new_applied_rule_id TEXT NOT NULL REFERENCES applied_rules(applied_rule_id),
    recorded_at         TEXT NOT NULL,
    UNIQUE (old_applied_rule_id),
    CHECK  (old_applied_rule_id != new_applied_rule_id)
);

-- A threshold switched off with no replacement.
CREATE TABLE IF NOT EXISTS deactivations (
    deactivation_id TEXT PRIMARY KEY,
    applied_rule_id TEXT NOT NULL REFERENCES applied_rules(applied_rule_id),
    reason          TEXT,
    recorded_at     TEXT NOT NULL,
    UNIQUE (applied_rule_id)
);

-- Captured configuration; truncated and reloaded per kind.
CREATE TABLE IF NOT EXISTS snapshots (
    resource_kind TEXT NOT NULL,
    resource_key  TEXT NOT NULL,   -- upper-cased qualified name
    resource      TEXT NOT NULL,   -- JSON ResourceIdentity
    captured_at   TEXT NOT NULL,
    owner         TEXT,
    config_values TEXT NOT NULL DEFAULT '{}',
    tags          TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (resource_kind, resource_key, captured_at)
);

CREATE TABLE IF NOT EXISTS exemptions (
    exemption_id  TEXT PRIMARY KEY,
    rule_id       TEXT NOT NULL,
    tag_name      TEXT,
    resource_kind TEXT NOT NULL,
    resource      TEXT NOT NULL,   -- JSON ResourceIdentity
    reason        TEXT,
    created_by    TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tag_requirements (
    requirement_id TEXT PRIMARY KEY,
    resource_kind  TEXT NOT NULL,
    tag_name       TEXT NOT NULL,
    default_value  TEXT,
    created_at     TEXT NOT NULL,
    UNIQUE (resource_kind, tag_name)
);

CREATE INDEX IF NOT EXISTS applied_rules_rule_idx ON applied_rules(rule_id);
CREATE INDEX IF NOT EXISTS exemptions_rule_idx    ON exemptions(rule_id);

PRAGMA user_version = 1;
";
