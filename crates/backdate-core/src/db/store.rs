//! [`EventStore`] implementation over a single SQLite connection.
//!
//! Days are stored as ISO `YYYY-MM-DD` text so that string order matches
//! calendar order. Tag id lists are stored as JSON arrays.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::model::event::{Attribute, ColumnChange, Event, end_of_day_us};
use crate::model::item::{Item, ItemId};
use crate::model::rule::{Rule, RuleKind};
use crate::model::snapshot::{MaintType, Snapshot};
use crate::model::tag::{Column, Tag, TagId};
use crate::store::{CategoryEdge, EventStore};

use super::migrations;

// ---------------------------------------------------------------------------
// SQL conversions
// ---------------------------------------------------------------------------

impl ToSql for ItemId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for ItemId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}

impl ToSql for TagId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for TagId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn day_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

const SNAPSHOT_COLUMNS: &str = "scope, day, item_id, status, tag_id, tag_name, column_name, \
                                points, maint_type, priority, category";

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        scope: row.get(0)?,
        day: day_at(row, 1)?,
        item_id: row.get(2)?,
        status: row.get(3)?,
        tag_id: row.get(4)?,
        tag_name: row.get(5)?,
        column: row.get(6)?,
        points: row.get(7)?,
        maint_type: MaintType::from_label(&row.get::<_, String>(8)?),
        priority: row.get(9)?,
        category: row.get(10)?,
    })
}

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let kind: String = row.get(2)?;
    Ok(Rule {
        scope: row.get(0)?,
        sort_order: row.get(1)?,
        kind: kind
            .parse::<RuleKind>()
            .map_err(|e| conversion_error(2, Type::Text, e))?,
        tag_ids: json_at(row, 3)?,
        tag_names: json_at(row, 4)?,
        match_string: row.get(5)?,
        title: row.get(6)?,
        display: row.get::<_, i64>(7)? != 0,
    })
}

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        external_id: row.get(2)?,
    })
}

fn row_to_category_edge(row: &Row<'_>) -> rusqlite::Result<CategoryEdge> {
    Ok(CategoryEdge {
        day: day_at(row, 0)?,
        item_id: row.get(1)?,
        category_id: row.get(2)?,
        category_title: row.get(3)?,
    })
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite implementation of [`EventStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wrap an already configured and migrated connection.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Fresh, fully migrated in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open or migrate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self::new(conn))
    }

    /// Underlying connection, for ad-hoc queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Source log writers
    // -----------------------------------------------------------------------

    /// Record a tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. duplicate id).
    pub fn insert_tag(&self, tag: &Tag) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tags (tag_id, name, external_id) VALUES (?1, ?2, ?3)",
                params![tag.id, tag.name, tag.external_id],
            )
            .with_context(|| format!("insert tag {}", tag.id))?;
        Ok(())
    }

    /// Record a board column.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails or the board tag is unknown.
    pub fn insert_column(&self, column: &Column) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO columns (external_id, name, board_external_id) VALUES (?1, ?2, ?3)",
                params![column.external_id, column.name, column.board_external_id],
            )
            .with_context(|| format!("insert column {}", column.external_id))?;
        Ok(())
    }

    /// Record an item's as-is fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_item(&self, item: &Item) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO items (item_id, title, story_points, status) VALUES (?1, ?2, ?3, ?4)",
                params![item.id, item.title, item.story_points, item.status],
            )
            .with_context(|| format!("insert item {}", item.id))?;
        Ok(())
    }

    /// Record that `child` is a subtask of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if either item is unknown or the link is a self-loop.
    pub fn insert_parent(&self, parent: ItemId, child: ItemId) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO item_parents (parent_id, child_id) VALUES (?1, ?2)",
                params![parent, child],
            )
            .with_context(|| format!("link {child} under {parent}"))?;
        Ok(())
    }

    /// Append an event to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is unknown or the insert fails.
    pub fn insert_event(&self, event: &Event) -> Result<()> {
        let tags_json = if event.attribute == Attribute::Tags {
            Some(serde_json::to_string(&event.tags).context("encode event tags")?)
        } else {
            None
        };
        self.conn
            .execute(
                "INSERT INTO events (event_id, item_id, attribute, value, ts_us, tags_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.event_id,
                    event.item_id,
                    event.attribute.as_str(),
                    event.value,
                    event.ts_us,
                    tags_json,
                ],
            )
            .with_context(|| format!("insert event {} for {}", event.event_id, event.item_id))?;
        Ok(())
    }

    fn query_tags(&self, sql: &str, param: &str) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("prepare tag query: {sql}"))?;
        let rows = stmt
            .query_map(params![param], row_to_tag)
            .context("execute tag query")?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row.context("read tag row")?);
        }
        Ok(tags)
    }

    fn query_snapshots(&self, table: &str, scope: &str) -> Result<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM {table} WHERE scope = ?1 ORDER BY day, item_id"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare {table} query"))?;
        let rows = stmt
            .query_map(params![scope], row_to_snapshot)
            .with_context(|| format!("execute {table} query"))?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row.with_context(|| format!("read {table} row"))?);
        }
        Ok(snapshots)
    }
}

fn insert_snapshot_row(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    snapshot: &Snapshot,
    category: Option<&str>,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} ({SNAPSHOT_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    );
    tx.execute(
        &sql,
        params![
            snapshot.scope,
            day_key(snapshot.day),
            snapshot.item_id,
            snapshot.status,
            snapshot.tag_id,
            snapshot.tag_name,
            snapshot.column,
            snapshot.points,
            snapshot.maint_type.label(),
            snapshot.priority,
            category,
        ],
    )
    .with_context(|| {
        format!(
            "insert {table} row for {} on {} in scope '{}'",
            snapshot.item_id, snapshot.day, snapshot.scope
        )
    })?;
    Ok(())
}

impl EventStore for SqliteStore {
    fn item(&self, item: ItemId) -> Result<Option<Item>> {
        self.conn
            .query_row(
                "SELECT item_id, title, story_points, status FROM items WHERE item_id = ?1",
                params![item],
                |row| {
                    Ok(Item {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        story_points: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("read item {item}"))
    }

    fn attribute_value_as_of(
        &self,
        item: ItemId,
        attribute: Attribute,
        day: NaiveDate,
    ) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM events
                 WHERE item_id = ?1 AND attribute = ?2 AND ts_us < ?3
                 ORDER BY ts_us DESC, event_id DESC
                 LIMIT 1",
                params![item, attribute.as_str(), end_of_day_us(day)],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read {attribute} of {item} as of {day}"))
    }

    fn tag_associations_as_of(&self, item: ItemId, day: NaiveDate) -> Result<BTreeSet<TagId>> {
        let tags: Option<Vec<TagId>> = self
            .conn
            .query_row(
                "SELECT tags_json FROM events
                 WHERE item_id = ?1 AND attribute = 'tags' AND ts_us < ?2
                 ORDER BY ts_us DESC, event_id DESC
                 LIMIT 1",
                params![item, end_of_day_us(day)],
                |row| json_at(row, 0),
            )
            .optional()
            .with_context(|| format!("read tags of {item} as of {day}"))?;
        Ok(tags.unwrap_or_default().into_iter().collect())
    }

    fn column_changes_as_of(&self, item: ItemId, day: NaiveDate) -> Result<Vec<ColumnChange>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT event_id, value FROM events
                 WHERE item_id = ?1 AND attribute = 'columns' AND ts_us < ?2
                 ORDER BY ts_us DESC, event_id DESC",
            )
            .context("prepare column change query")?;
        let rows = stmt
            .query_map(params![item, end_of_day_us(day)], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .context("execute column change query")?;

        let mut changes = Vec::new();
        for row in rows {
            let (event_id, raw) = row.context("read column change row")?;
            let decoded = ColumnChange::decode_list(&raw)
                .with_context(|| format!("decode column payload of event {event_id}"))?;
            changes.extend(decoded);
        }
        Ok(changes)
    }

    fn tag_sets_as_of(&self, day: NaiveDate) -> Result<Vec<(ItemId, BTreeSet<TagId>)>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT e.item_id, e.tags_json
                 FROM events e
                 WHERE e.attribute = 'tags' AND e.ts_us < ?1
                   AND e.event_id = (
                       SELECT latest.event_id FROM events latest
                       WHERE latest.item_id = e.item_id
                         AND latest.attribute = 'tags'
                         AND latest.ts_us < ?1
                       ORDER BY latest.ts_us DESC, latest.event_id DESC
                       LIMIT 1
                   )
                 ORDER BY e.item_id",
            )
            .context("prepare tag set query")?;
        let rows = stmt
            .query_map(params![end_of_day_us(day)], |row| {
                let tags: Vec<TagId> = json_at(row, 1)?;
                let set: BTreeSet<TagId> = tags.into_iter().collect();
                Ok((row.get::<_, ItemId>(0)?, set))
            })
            .context("execute tag set query")?;

        let mut sets = Vec::new();
        for row in rows {
            sets.push(row.context("read tag set row")?);
        }
        Ok(sets)
    }

    fn earliest_event_day(&self) -> Result<Option<NaiveDate>> {
        let min_ts: Option<i64> = self
            .conn
            .query_row("SELECT MIN(ts_us) FROM events", [], |row| row.get(0))
            .context("read earliest event timestamp")?;
        Ok(min_ts.and_then(crate::model::event::day_of_us))
    }

    fn parent_links(&self) -> Result<Vec<(ItemId, ItemId)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT parent_id, child_id FROM item_parents ORDER BY parent_id, child_id")
            .context("prepare parent link query")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("execute parent link query")?;
        let mut links: Vec<(ItemId, ItemId)> = Vec::new();
        for row in rows {
            links.push(row.context("read parent link row")?);
        }
        Ok(links)
    }

    fn tags_by_id(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT tag_id, name, external_id FROM tags WHERE tag_id IN ({}) ORDER BY tag_id",
            placeholders.join(", ")
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare tags_by_id query: {sql}"))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), row_to_tag)
            .context("execute tags_by_id query")?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row.context("read tag row")?);
        }
        Ok(tags)
    }

    fn tags_named(&self, name: &str) -> Result<Vec<Tag>> {
        self.query_tags(
            "SELECT tag_id, name, external_id FROM tags WHERE name = ?1 ORDER BY tag_id",
            name,
        )
    }

    fn tags_containing(&self, fragment: &str) -> Result<Vec<Tag>> {
        self.query_tags(
            "SELECT tag_id, name, external_id FROM tags
             WHERE instr(name, ?1) > 0
             ORDER BY tag_id",
            fragment,
        )
    }

    fn column_name(&self, column_external_id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT name FROM columns WHERE external_id = ?1",
                params![column_external_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read column {column_external_id}"))
    }

    fn replace_day_edges(
        &mut self,
        scope: &str,
        day: NaiveDate,
        edges: &[(ItemId, TagId)],
    ) -> Result<()> {
        let key = day_key(day);
        let tx = self.conn.transaction().context("begin day edge transaction")?;
        tx.execute(
            "DELETE FROM day_edges WHERE scope = ?1 AND day = ?2",
            params![scope, key],
        )
        .context("clear day edges")?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO day_edges (scope, day, item_id, tag_id)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .context("prepare day edge insert")?;
            for (item, tag) in edges {
                stmt.execute(params![scope, key, item, tag])
                    .with_context(|| format!("insert day edge {item}->{tag} on {day}"))?;
            }
        }
        tx.commit().context("commit day edges")?;
        Ok(())
    }

    fn day_edges(&self, scope: &str, day: NaiveDate) -> Result<Vec<(ItemId, TagId)>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT item_id, tag_id FROM day_edges
                 WHERE scope = ?1 AND day = ?2
                 ORDER BY item_id, tag_id",
            )
            .context("prepare day edge query")?;
        let rows = stmt
            .query_map(params![scope, day_key(day)], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .context("execute day edge query")?;
        let mut edges: Vec<(ItemId, TagId)> = Vec::new();
        for row in rows {
            edges.push(row.context("read day edge row")?);
        }
        Ok(edges)
    }

    fn active_items(
        &self,
        scope: &str,
        day: NaiveDate,
        relevant: &[TagId],
    ) -> Result<Vec<ItemId>> {
        if relevant.is_empty() {
            return Ok(Vec::new());
        }

        let mut param_values: Vec<Box<dyn ToSql>> =
            vec![Box::new(scope.to_string()), Box::new(day_key(day))];
        let mut placeholders = Vec::with_capacity(relevant.len());
        for tag in relevant {
            param_values.push(Box::new(*tag));
            placeholders.push(format!("?{}", param_values.len()));
        }

        let sql = format!(
            "SELECT DISTINCT item_id FROM day_edges
             WHERE scope = ?1 AND day = ?2 AND tag_id IN ({})
             ORDER BY item_id",
            placeholders.join(", ")
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare active_items query: {sql}"))?;
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(AsRef::as_ref).collect();
        let rows = stmt
            .query_map(params_from_iter(params_ref), |row| row.get(0))
            .context("execute active_items query")?;

        let mut items: Vec<ItemId> = Vec::new();
        for row in rows {
            items.push(row.context("read active item row")?);
        }
        Ok(items)
    }

    fn replace_rules(&mut self, scope: &str, rules: &[Rule]) -> Result<usize> {
        let tx = self.conn.transaction().context("begin rule transaction")?;
        tx.execute("DELETE FROM rules WHERE scope = ?1", params![scope])
            .with_context(|| format!("clear rules for scope '{scope}'"))?;

        let mut stored = 0;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO rules (
                        scope, sort_order, kind, tag_ids, tag_names,
                        match_string, title, display
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .context("prepare rule insert")?;
            for rule in rules {
                if rule.scope != scope {
                    bail!(
                        "rule {} belongs to scope '{}', not '{scope}'",
                        rule.sort_order,
                        rule.scope
                    );
                }
                let changed = stmt
                    .execute(params![
                        scope,
                        rule.sort_order,
                        rule.kind.as_str(),
                        serde_json::to_string(&rule.tag_ids).context("encode rule tag ids")?,
                        serde_json::to_string(&rule.tag_names).context("encode rule tag names")?,
                        rule.match_string,
                        rule.title,
                        rule.display,
                    ])
                    .with_context(|| format!("insert rule {} for scope '{scope}'", rule.sort_order))?;
                if changed == 0 {
                    tracing::warn!(
                        scope,
                        sort_order = rule.sort_order,
                        kind = %rule.kind,
                        title = %rule.title,
                        "skipping duplicate rule"
                    );
                } else {
                    stored += 1;
                }
            }
        }
        tx.commit().context("commit rule set")?;
        Ok(stored)
    }

    fn rules(&self, scope: &str) -> Result<Vec<Rule>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT scope, sort_order, kind, tag_ids, tag_names, match_string, title, display
                 FROM rules WHERE scope = ?1 ORDER BY sort_order",
            )
            .context("prepare rule query")?;
        let rows = stmt
            .query_map(params![scope], row_to_rule)
            .context("execute rule query")?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row.context("read rule row")?);
        }
        Ok(rules)
    }

    fn latest_snapshot_day(&self, scope: &str) -> Result<Option<NaiveDate>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(day) FROM snapshots WHERE scope = ?1",
                params![scope],
                |row| row.get(0),
            )
            .with_context(|| format!("read latest snapshot day for scope '{scope}'"))?;
        raw.map(|day| {
            day.parse()
                .with_context(|| format!("parse stored snapshot day '{day}'"))
        })
        .transpose()
    }

    fn delete_snapshots_from(&mut self, scope: &str, from: Option<NaiveDate>) -> Result<usize> {
        let from_key = from.map_or_else(String::new, day_key);
        let tx = self.conn.transaction().context("begin snapshot wipe")?;
        let removed = tx
            .execute(
                "DELETE FROM snapshots WHERE scope = ?1 AND day >= ?2",
                params![scope, from_key],
            )
            .context("delete snapshots")?;
        tx.execute(
            "DELETE FROM category_edges WHERE scope = ?1 AND day >= ?2",
            params![scope, from_key],
        )
        .context("delete category edges")?;
        tx.execute(
            "DELETE FROM day_edges WHERE scope = ?1 AND day >= ?2",
            params![scope, from_key],
        )
        .context("delete day edges")?;
        tx.commit().context("commit snapshot wipe")?;
        Ok(removed)
    }

    fn insert_snapshots(&mut self, snapshots: &[Snapshot]) -> Result<()> {
        let tx = self.conn.transaction().context("begin snapshot insert")?;
        for snapshot in snapshots {
            insert_snapshot_row(&tx, "snapshots", snapshot, snapshot.category.as_deref())?;
        }
        tx.commit().context("commit snapshots")?;
        Ok(())
    }

    fn snapshots(&self, scope: &str) -> Result<Vec<Snapshot>> {
        self.query_snapshots("snapshots", scope)
    }

    fn update_statuses(
        &mut self,
        scope: &str,
        updates: &[(NaiveDate, ItemId, String)],
    ) -> Result<()> {
        let tx = self.conn.transaction().context("begin status update")?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "UPDATE snapshots SET status = ?1
                     WHERE scope = ?2 AND day = ?3 AND item_id = ?4",
                )
                .context("prepare status update")?;
            for (day, item, status) in updates {
                stmt.execute(params![status, scope, day_key(*day), item])
                    .with_context(|| format!("update status of {item} on {day}"))?;
            }
        }
        tx.commit().context("commit status update")?;
        Ok(())
    }

    fn replace_category_edges(
        &mut self,
        scope: &str,
        day: NaiveDate,
        edges: &[(ItemId, ItemId)],
    ) -> Result<()> {
        let key = day_key(day);
        let tx = self.conn.transaction().context("begin category edge transaction")?;
        tx.execute(
            "DELETE FROM category_edges WHERE scope = ?1 AND day = ?2",
            params![scope, key],
        )
        .context("clear category edges")?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO category_edges (scope, day, item_id, category_id)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .context("prepare category edge insert")?;
            for (item, category) in edges {
                stmt.execute(params![scope, key, item, category])
                    .with_context(|| format!("link {item} to category {category} on {day}"))?;
            }
        }
        tx.commit().context("commit category edges")?;
        Ok(())
    }

    fn add_category_edges(&mut self, scope: &str, edges: &[CategoryEdge]) -> Result<()> {
        let tx = self.conn.transaction().context("begin category edge insert")?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO category_edges
                        (scope, day, item_id, category_id, category_title)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .context("prepare category edge insert")?;
            for edge in edges {
                stmt.execute(params![
                    scope,
                    day_key(edge.day),
                    edge.item_id,
                    edge.category_id,
                    edge.category_title,
                ])
                .with_context(|| {
                    format!(
                        "link {} to category {} on {}",
                        edge.item_id, edge.category_id, edge.day
                    )
                })?;
            }
        }
        tx.commit().context("commit category edges")?;
        Ok(())
    }

    fn category_edges(&self, scope: &str) -> Result<Vec<CategoryEdge>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT day, item_id, category_id, category_title FROM category_edges
                 WHERE scope = ?1
                 ORDER BY day, item_id, category_id",
            )
            .context("prepare category edge query")?;
        let rows = stmt
            .query_map(params![scope], row_to_category_edge)
            .context("execute category edge query")?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row.context("read category edge row")?);
        }
        Ok(edges)
    }

    fn refresh_category_titles(&mut self, scope: &str, from: NaiveDate) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE category_edges
                 SET category_title = COALESCE(
                     (SELECT title FROM items WHERE items.item_id = category_edges.category_id),
                     ''
                 )
                 WHERE scope = ?1 AND day >= ?2",
                params![scope, day_key(from)],
            )
            .with_context(|| format!("refresh category titles for scope '{scope}'"))
    }

    fn replace_categorized(&mut self, scope: &str, rows: &[Snapshot]) -> Result<()> {
        let tx = self.conn.transaction().context("begin categorized replace")?;
        tx.execute(
            "DELETE FROM categorized_snapshots WHERE scope = ?1",
            params![scope],
        )
        .with_context(|| format!("clear categorized rows for scope '{scope}'"))?;
        for row in rows {
            let Some(category) = row.category.as_deref() else {
                bail!(
                    "uncategorized row for {} on {} cannot be published",
                    row.item_id,
                    row.day
                );
            };
            insert_snapshot_row(&tx, "categorized_snapshots", row, Some(category))?;
        }
        tx.commit().context("commit categorized rows")?;
        Ok(())
    }

    fn categorized(&self, scope: &str) -> Result<Vec<Snapshot>> {
        self.query_snapshots("categorized_snapshots", scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 3, d).expect("valid date")
    }

    fn at(d: u32, hour: i64) -> i64 {
        crate::model::event::start_of_day_us(day(d)) + hour * 3_600_000_000
    }

    fn store_with_item() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open store");
        store
            .insert_item(&Item {
                id: ItemId(1),
                title: "Sync".into(),
                story_points: String::new(),
                status: "open".into(),
            })
            .expect("insert item");
        store
    }

    fn event(id: i64, attribute: Attribute, value: &str, ts_us: i64) -> Event {
        Event {
            event_id: id,
            item_id: ItemId(1),
            attribute,
            value: value.into(),
            ts_us,
            tags: Vec::new(),
        }
    }

    fn tag_event(id: i64, tags: &[i64], ts_us: i64) -> Event {
        Event {
            tags: tags.iter().copied().map(TagId).collect(),
            ..event(id, Attribute::Tags, "", ts_us)
        }
    }

    #[test]
    fn attribute_as_of_ignores_later_events() {
        let store = store_with_item();
        store
            .insert_event(&event(1, Attribute::Status, "open", at(1, 9)))
            .expect("insert");
        store
            .insert_event(&event(2, Attribute::Status, "stalled", at(2, 23)))
            .expect("insert");
        store
            .insert_event(&event(3, Attribute::Status, "resolved", at(3, 0)))
            .expect("insert");

        let value = |d| {
            store
                .attribute_value_as_of(ItemId(1), Attribute::Status, day(d))
                .expect("query")
        };
        assert_eq!(value(1).as_deref(), Some("open"));
        assert_eq!(value(2).as_deref(), Some("stalled"));
        assert_eq!(value(3).as_deref(), Some("resolved"));
        assert_eq!(
            store
                .attribute_value_as_of(ItemId(1), Attribute::Priority, day(3))
                .expect("query"),
            None
        );
    }

    #[test]
    fn same_timestamp_ties_break_by_event_id() {
        let store = store_with_item();
        store
            .insert_event(&event(11, Attribute::Priority, "High", at(1, 5)))
            .expect("insert");
        store
            .insert_event(&event(10, Attribute::Priority, "Low", at(1, 5)))
            .expect("insert");

        let value = store
            .attribute_value_as_of(ItemId(1), Attribute::Priority, day(1))
            .expect("query");
        assert_eq!(value.as_deref(), Some("High"));
    }

    #[test]
    fn tag_set_is_latest_payload() {
        let store = store_with_item();
        store.insert_event(&tag_event(1, &[3, 7], at(1, 1))).expect("insert");
        store.insert_event(&tag_event(2, &[7], at(2, 1))).expect("insert");

        let tags = |d| store.tag_associations_as_of(ItemId(1), day(d)).expect("query");
        assert_eq!(tags(1), BTreeSet::from([TagId(3), TagId(7)]));
        assert_eq!(tags(2), BTreeSet::from([TagId(7)]));

        let sets = store.tag_sets_as_of(day(1)).expect("query");
        assert_eq!(sets, vec![(ItemId(1), BTreeSet::from([TagId(3), TagId(7)]))]);
        let before = day(1).pred_opt().expect("previous day");
        assert!(store.tag_sets_as_of(before).expect("query").is_empty());
    }

    #[test]
    fn column_changes_are_most_recent_first() {
        let store = store_with_item();
        store
            .insert_event(&event(
                1,
                Attribute::Columns,
                r#"[{"boardPHID":"B1","columnPHID":"C-old"}]"#,
                at(1, 1),
            ))
            .expect("insert");
        store
            .insert_event(&event(
                2,
                Attribute::Columns,
                r#"[{"boardPHID":"B1","columnPHID":"C-new"}]"#,
                at(1, 2),
            ))
            .expect("insert");

        let changes = store.column_changes_as_of(ItemId(1), day(1)).expect("query");
        let columns: Vec<_> = changes.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(columns, vec!["C-new", "C-old"]);
    }

    #[test]
    fn tag_lookups_by_name_and_fragment() {
        let store = SqliteStore::open_in_memory().expect("open store");
        for (id, name) in [(1, "Analytics"), (2, "Analytics-Backlog"), (3, "analytics-old")] {
            store
                .insert_tag(&Tag {
                    id: TagId(id),
                    name: name.into(),
                    external_id: format!("PHID-PROJ-{id}"),
                })
                .expect("insert tag");
        }

        assert_eq!(store.tags_named("Analytics").expect("query").len(), 1);
        let ids: Vec<_> = store
            .tags_containing("Analytics")
            .expect("query")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![TagId(1), TagId(2)]);
        assert_eq!(
            store.tags_by_id(&[TagId(3), TagId(99)]).expect("query").len(),
            1
        );
    }

    #[test]
    fn replace_rules_skips_duplicates() {
        let mut store = SqliteStore::open_in_memory().expect("open store");
        let rule = |sort_order| Rule {
            scope: "alpha".into(),
            sort_order,
            kind: RuleKind::ProjectById,
            tag_ids: vec![TagId(5)],
            tag_names: vec!["Five".into()],
            match_string: String::new(),
            title: "Five".into(),
            display: true,
        };

        let stored = store
            .replace_rules("alpha", &[rule(0), rule(1)])
            .expect("replace");
        assert_eq!(stored, 1);
        assert_eq!(store.rules("alpha").expect("query"), vec![rule(0)]);

        let stored = store.replace_rules("alpha", &[]).expect("replace");
        assert_eq!(stored, 0);
        assert!(store.rules("alpha").expect("query").is_empty());
    }

    #[test]
    fn categorized_rows_require_a_category() {
        let mut store = SqliteStore::open_in_memory().expect("open store");
        let row = Snapshot {
            scope: "alpha".into(),
            day: day(1),
            item_id: ItemId(1),
            status: "open".into(),
            tag_id: TagId(5),
            tag_name: "Five".into(),
            column: String::new(),
            points: None,
            maint_type: MaintType::Unset,
            priority: String::new(),
            category: None,
        };
        assert!(store.replace_categorized("alpha", &[row.clone()]).is_err());

        let row = Snapshot {
            category: Some("Five".into()),
            ..row
        };
        store
            .replace_categorized("alpha", &[row.clone()])
            .expect("replace");
        assert_eq!(store.categorized("alpha").expect("query"), vec![row]);
    }
}
