//! Tall backlog: the categorized table summarized per day.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EngineError;
use crate::store::EventStore;

/// One `(day, category, status, maintenance type)` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacklogRow {
    pub day: NaiveDate,
    pub category: String,
    pub status: String,
    pub maint_type: String,
    /// Sum of known points; rows without points add nothing.
    pub points: i64,
    pub count: usize,
    /// False when every rule producing this category is marked hidden.
    pub display: bool,
}

/// Aggregate the scope's categorized rows, ordered by day, category,
/// status and maintenance type.
///
/// # Errors
///
/// Returns [`EngineError::Store`] if the categorized table or rules cannot
/// be read.
pub fn tall_backlog<S: EventStore>(store: &S, scope: &str) -> Result<Vec<BacklogRow>, EngineError> {
    let rules = store.rules(scope)?;
    let shown: HashSet<&str> = rules
        .iter()
        .filter(|rule| rule.display)
        .map(|rule| rule.title.as_str())
        .collect();
    let hidden: HashSet<&str> = rules
        .iter()
        .filter(|rule| !rule.display)
        .map(|rule| rule.title.as_str())
        .collect();

    let mut buckets: BTreeMap<(NaiveDate, String, String, String), (i64, usize)> = BTreeMap::new();
    for row in store.categorized(scope)? {
        let key = (
            row.day,
            row.category.unwrap_or_default(),
            row.status,
            row.maint_type.label().to_string(),
        );
        let bucket = buckets.entry(key).or_default();
        bucket.0 += row.points.unwrap_or(0);
        bucket.1 += 1;
    }

    Ok(buckets
        .into_iter()
        .map(|((day, category, status, maint_type), (points, count))| {
            let display =
                shown.contains(category.as_str()) || !hidden.contains(category.as_str());
            BacklogRow {
                day,
                category,
                status,
                maint_type,
                points,
                count,
                display,
            }
        })
        .collect())
}
