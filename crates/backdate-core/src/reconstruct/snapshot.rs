//! Reconstruct one item's state on one day.

use chrono::NaiveDate;
use tracing::warn;

use crate::error::EngineError;
use crate::model::event::Attribute;
use crate::model::item::{ItemId, parse_points};
use crate::model::snapshot::{MaintType, Snapshot};
use crate::model::tag::{ReservedTags, Tag, TagId};
use crate::rules::candidate_tags;
use crate::store::EventStore;

/// Everything about a scope that per-item reconstruction needs.
#[derive(Debug, Clone)]
pub struct ScopeContext {
    pub scope: String,
    /// Candidate tags, highest priority first.
    pub candidates: Vec<Tag>,
    pub reserved: ReservedTags,
    pub default_points: Option<i64>,
}

impl ScopeContext {
    /// Build the context from the scope's stored rules.
    ///
    /// Candidate ids missing from the tag catalogue are dropped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if rules or tags cannot be read.
    pub fn load<S: EventStore>(
        store: &S,
        scope: &str,
        reserved: ReservedTags,
        default_points: Option<i64>,
    ) -> Result<Self, EngineError> {
        let ids = candidate_tags(&store.rules(scope)?);
        let known = store.tags_by_id(&ids)?;

        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            match known.iter().find(|tag| tag.id == id) {
                Some(tag) => candidates.push(tag.clone()),
                None => warn!(scope, tag_id = id.0, "rule tag missing from tag catalogue"),
            }
        }

        Ok(Self {
            scope: scope.to_string(),
            candidates,
            reserved,
            default_points,
        })
    }

    /// Candidate ids in priority order.
    #[must_use]
    pub fn candidate_ids(&self) -> Vec<TagId> {
        self.candidates.iter().map(|tag| tag.id).collect()
    }

    /// Candidate ids plus the reserved work-type ids, deduplicated.
    #[must_use]
    pub fn relevant_ids(&self) -> Vec<TagId> {
        let mut ids = self.candidate_ids();
        for id in self.reserved.ids() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Reconstruct `item` as of the end of `day`.
///
/// Returns `Ok(None)` when none of the scope's candidate tags is on the item
/// that day; the item is simply not part of the scope then.
///
/// # Errors
///
/// - [`EngineError::MissingEdgeData`] if the item has no tags at all
/// - [`EngineError::Decode`] / [`EngineError::Store`] on storage problems
pub fn reconstruct_item_on_day<S: EventStore>(
    store: &S,
    ctx: &ScopeContext,
    item: ItemId,
    day: NaiveDate,
) -> Result<Option<Snapshot>, EngineError> {
    let tags = store.tag_associations_as_of(item, day)?;
    if tags.is_empty() {
        return Err(EngineError::MissingEdgeData { item, day });
    }

    let Some(matched) = ctx.candidates.iter().find(|tag| tags.contains(&tag.id)) else {
        return Ok(None);
    };

    let status = store
        .attribute_value_as_of(item, Attribute::Status, day)?
        .unwrap_or_default();
    let priority = store
        .attribute_value_as_of(item, Attribute::Priority, day)?
        .unwrap_or_default();

    let mut points = store
        .attribute_value_as_of(item, Attribute::Points, day)?
        .as_deref()
        .and_then(parse_points);
    if points.is_none() {
        points = store.item(item)?.and_then(|record| record.static_points());
    }
    let points = points.or(ctx.default_points);

    let maint_type = if tags.contains(&ctx.reserved.new) {
        MaintType::NewFunctionality
    } else if tags.contains(&ctx.reserved.maint) {
        MaintType::Maintenance
    } else {
        MaintType::Unset
    };

    let column = match store
        .column_changes_as_of(item, day)?
        .into_iter()
        .find(|change| change.board == matched.external_id)
    {
        Some(change) => store.column_name(&change.column)?.unwrap_or_default(),
        None => String::new(),
    };

    Ok(Some(Snapshot {
        scope: ctx.scope.clone(),
        day,
        item_id: item,
        status,
        tag_id: matched.id,
        tag_name: matched.name.clone(),
        column,
        points,
        maint_type,
        priority,
        category: None,
    }))
}
