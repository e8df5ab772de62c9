//! Per-day denormalization of tag associations.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::error::EngineError;
use crate::model::item::ItemId;
use crate::model::tag::TagId;
use crate::store::EventStore;

/// Rebuild the scope's `(item, tag)` rows for `day` from the event log.
///
/// Only tags in `relevant` are kept. The result depends on nothing but the
/// log up to the end of `day`, so rerunning a day rewrites identical rows.
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`EngineError::Decode`] for an undecodable tag payload and
/// [`EngineError::Store`] for other storage failures.
pub fn denormalize_day<S: EventStore>(
    store: &mut S,
    scope: &str,
    day: NaiveDate,
    relevant: &[TagId],
) -> Result<usize, EngineError> {
    let relevant: BTreeSet<TagId> = relevant.iter().copied().collect();
    let edges: Vec<(ItemId, TagId)> = store
        .tag_sets_as_of(day)?
        .into_iter()
        .flat_map(|(item, tags)| {
            tags.into_iter()
                .filter(|tag| relevant.contains(tag))
                .map(move |tag| (item, tag))
                .collect::<Vec<_>>()
        })
        .collect();

    store.replace_day_edges(scope, day, &edges)?;
    Ok(edges.len())
}
