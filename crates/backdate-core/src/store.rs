//! The Event Store Accessor contract.
//!
//! The engine never touches SQL directly; everything it needs from storage
//! goes through [`EventStore`]. Reads take `&self`. Writes take `&mut self`
//! and each call is all-or-nothing.
//!
//! "As of `day`" always means: the state after every event with a timestamp
//! strictly before `day + 1` at 00:00 UTC, ties broken by event id.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::NaiveDate;

use crate::model::event::{Attribute, ColumnChange};
use crate::model::item::{Item, ItemId};
use crate::model::rule::Rule;
use crate::model::snapshot::Snapshot;
use crate::model::tag::{Tag, TagId};

/// A derived link from an item to a parent category item on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEdge {
    pub day: NaiveDate,
    pub item_id: ItemId,
    pub category_id: ItemId,
    /// Title of the category item; empty until titles are refreshed.
    pub category_title: String,
}

/// Storage operations required by the reconstruction and recategorization
/// engines.
pub trait EventStore {
    // -- event log ----------------------------------------------------------

    /// Static item record, if the item was ingested.
    fn item(&self, item: ItemId) -> Result<Option<Item>>;

    /// Value of the latest `attribute` event for `item` as of `day`.
    fn attribute_value_as_of(
        &self,
        item: ItemId,
        attribute: Attribute,
        day: NaiveDate,
    ) -> Result<Option<String>>;

    /// Tags associated with `item` as of `day`; empty if none were ever set.
    fn tag_associations_as_of(&self, item: ItemId, day: NaiveDate) -> Result<BTreeSet<TagId>>;

    /// Column changes for `item` as of `day`, most recent first.
    fn column_changes_as_of(&self, item: ItemId, day: NaiveDate) -> Result<Vec<ColumnChange>>;

    /// As-of tag set of every item that has any tag event by `day`.
    fn tag_sets_as_of(&self, day: NaiveDate) -> Result<Vec<(ItemId, BTreeSet<TagId>)>>;

    /// Day of the oldest event in the whole log.
    fn earliest_event_day(&self) -> Result<Option<NaiveDate>>;

    /// Direct `(parent, child)` task links.
    fn parent_links(&self) -> Result<Vec<(ItemId, ItemId)>>;

    // -- tags and columns ---------------------------------------------------

    /// Tags with the given ids, in id order; unknown ids are absent.
    fn tags_by_id(&self, ids: &[TagId]) -> Result<Vec<Tag>>;

    /// Tags whose name equals `name` exactly.
    fn tags_named(&self, name: &str) -> Result<Vec<Tag>>;

    /// Tags whose name contains `fragment` (case-sensitive), in id order.
    fn tags_containing(&self, fragment: &str) -> Result<Vec<Tag>>;

    /// Display name of a board column.
    fn column_name(&self, column_external_id: &str) -> Result<Option<String>>;

    // -- denormalized tag associations ----------------------------------------

    /// Replace the scope's denormalized `(item, tag)` rows for `day`.
    fn replace_day_edges(
        &mut self,
        scope: &str,
        day: NaiveDate,
        edges: &[(ItemId, TagId)],
    ) -> Result<()>;

    /// Denormalized `(item, tag)` rows for `day`, ordered.
    fn day_edges(&self, scope: &str, day: NaiveDate) -> Result<Vec<(ItemId, TagId)>>;

    /// Items with a denormalized association to any of `relevant` on `day`.
    fn active_items(&self, scope: &str, day: NaiveDate, relevant: &[TagId])
    -> Result<Vec<ItemId>>;

    // -- rules --------------------------------------------------------------

    /// Atomically replace the scope's rule set. Rules colliding with an
    /// earlier rule's content are skipped; returns how many were stored.
    fn replace_rules(&mut self, scope: &str, rules: &[Rule]) -> Result<usize>;

    /// The scope's rules in ascending sort order.
    fn rules(&self, scope: &str) -> Result<Vec<Rule>>;

    // -- snapshots ----------------------------------------------------------

    /// Most recent snapshot day for the scope.
    fn latest_snapshot_day(&self, scope: &str) -> Result<Option<NaiveDate>>;

    /// Delete the scope's snapshots and category edges on or after `from`
    /// (everything when `None`). Returns the number of snapshots removed.
    fn delete_snapshots_from(&mut self, scope: &str, from: Option<NaiveDate>) -> Result<usize>;

    /// Insert one day's snapshots together.
    fn insert_snapshots(&mut self, snapshots: &[Snapshot]) -> Result<()>;

    /// All of the scope's snapshots ordered by `(day, item_id)`.
    fn snapshots(&self, scope: &str) -> Result<Vec<Snapshot>>;

    /// Rewrite snapshot statuses, keyed by `(day, item)`.
    fn update_statuses(&mut self, scope: &str, updates: &[(NaiveDate, ItemId, String)])
    -> Result<()>;

    // -- parent categories ----------------------------------------------------

    /// Replace the scope's category edges for `day`.
    fn replace_category_edges(
        &mut self,
        scope: &str,
        day: NaiveDate,
        edges: &[(ItemId, ItemId)],
    ) -> Result<()>;

    /// Add category edges without removing existing ones.
    fn add_category_edges(&mut self, scope: &str, edges: &[CategoryEdge]) -> Result<()>;

    /// The scope's category edges, ordered by `(day, item_id, category_id)`.
    fn category_edges(&self, scope: &str) -> Result<Vec<CategoryEdge>>;

    /// Copy category item titles onto edges dated on or after `from`.
    fn refresh_category_titles(&mut self, scope: &str, from: NaiveDate) -> Result<usize>;

    // -- reporting table ------------------------------------------------------

    /// Atomically replace the scope's categorized (reporting-facing) rows.
    fn replace_categorized(&mut self, scope: &str, rows: &[Snapshot]) -> Result<()>;

    /// The scope's categorized rows ordered by `(day, item_id)`.
    fn categorized(&self, scope: &str) -> Result<Vec<Snapshot>>;
}
