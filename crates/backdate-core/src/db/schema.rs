//! Canonical SQLite schema for backdate.
//!
//! - `tags`, `columns`, `items`, `item_parents` and `events` hold the
//!   ingested source log; the engine only reads them
//! - `day_edges` is the per-scope, per-day denormalization of tag
//!   associations used to enumerate active items
//! - `rules`, `snapshots`, `category_edges` and `categorized_snapshots` are
//!   owned by the engine and keyed by scope
//! - `store_meta` tracks the schema version

/// Migration v1: source log tables, engine tables and store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    external_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS columns (
    external_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    board_external_id TEXT NOT NULL REFERENCES tags(external_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS items (
    item_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    story_points TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS item_parents (
    parent_id INTEGER NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    child_id INTEGER NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id),
    CHECK (parent_id <> child_id)
);

CREATE TABLE IF NOT EXISTS events (
    event_id INTEGER PRIMARY KEY,
    item_id INTEGER NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    attribute TEXT NOT NULL
        CHECK (attribute IN ('status', 'priority', 'points', 'title', 'tags', 'columns')),
    value TEXT NOT NULL DEFAULT '',
    ts_us INTEGER NOT NULL,
    tags_json TEXT,
    CHECK (attribute <> 'tags' OR tags_json IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS day_edges (
    scope TEXT NOT NULL,
    day TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (scope, day, item_id, tag_id)
);

CREATE TABLE IF NOT EXISTS rules (
    scope TEXT NOT NULL CHECK (length(trim(scope)) > 0),
    sort_order INTEGER NOT NULL CHECK (sort_order >= 0),
    kind TEXT NOT NULL
        CHECK (kind IN ('ProjectByID', 'Intersection', 'ProjectColumn', 'ParentTask')),
    tag_ids TEXT NOT NULL,
    tag_names TEXT NOT NULL,
    match_string TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    display INTEGER NOT NULL DEFAULT 1 CHECK (display IN (0, 1)),
    PRIMARY KEY (scope, sort_order),
    UNIQUE (scope, kind, tag_ids, match_string)
);

CREATE TABLE IF NOT EXISTS snapshots (
    scope TEXT NOT NULL,
    day TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT '',
    tag_id INTEGER NOT NULL,
    tag_name TEXT NOT NULL,
    column_name TEXT NOT NULL DEFAULT '',
    points INTEGER,
    maint_type TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT '',
    category TEXT,
    PRIMARY KEY (scope, day, item_id)
);

CREATE TABLE IF NOT EXISTS category_edges (
    scope TEXT NOT NULL,
    day TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    category_title TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (scope, day, item_id, category_id)
);

CREATE TABLE IF NOT EXISTS categorized_snapshots (
    scope TEXT NOT NULL,
    day TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT '',
    tag_id INTEGER NOT NULL,
    tag_name TEXT NOT NULL,
    column_name TEXT NOT NULL DEFAULT '',
    points INTEGER,
    maint_type TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL,
    PRIMARY KEY (scope, day, item_id)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for as-of lookups and scope scans.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_item_attribute_ts
    ON events(item_id, attribute, ts_us DESC, event_id DESC);

CREATE INDEX IF NOT EXISTS idx_events_attribute_ts
    ON events(attribute, ts_us);

CREATE INDEX IF NOT EXISTS idx_tags_name
    ON tags(name);

CREATE INDEX IF NOT EXISTS idx_item_parents_child
    ON item_parents(child_id, parent_id);

CREATE INDEX IF NOT EXISTS idx_day_edges_tag
    ON day_edges(scope, day, tag_id, item_id);

CREATE INDEX IF NOT EXISTS idx_snapshots_item_day
    ON snapshots(scope, item_id, day);

CREATE INDEX IF NOT EXISTS idx_categorized_item_day
    ON categorized_snapshots(scope, item_id, day);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by the as-of and scope query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_events_item_attribute_ts",
    "idx_events_attribute_ts",
    "idx_tags_name",
    "idx_item_parents_child",
    "idx_day_edges_tag",
    "idx_snapshots_item_day",
    "idx_categorized_item_day",
];
