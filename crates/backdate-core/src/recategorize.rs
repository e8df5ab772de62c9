//! Recategorization: label every snapshot of a scope with a category.
//!
//! Rules are applied in ascending sort order and the first match wins.
//! Snapshots no rule claims are left out of the published table. The
//! optional retroactive passes run after that purge, so they only ever copy
//! values between rows that survived it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::ScopeConfig;
use crate::error::EngineError;
use crate::model::item::ItemId;
use crate::model::rule::{Rule, RuleKind};
use crate::model::snapshot::Snapshot;
use crate::model::tag::TagId;
use crate::store::{CategoryEdge, EventStore};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecategorizeOptions {
    /// Copy each item's latest category onto all of its rows.
    pub retroactive_categories: bool,
    /// Copy each item's latest points onto all of its rows.
    pub retroactive_points: bool,
    /// Drop items that were already closed on this day.
    pub backlog_resolved_cutoff: Option<NaiveDate>,
    pub closed_statuses: Vec<String>,
}

impl RecategorizeOptions {
    #[must_use]
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self {
            retroactive_categories: config.retroactive_categories,
            retroactive_points: config.retroactive_points,
            backlog_resolved_cutoff: config.backlog_resolved_cutoff,
            closed_statuses: config.status.closed.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecategorizeReport {
    pub scope: String,
    /// Snapshots read from the store.
    pub snapshots: usize,
    /// Rows dropped by the resolved cutoff before rule application.
    pub cutoff_dropped: usize,
    /// Rows claimed by a rule and published.
    pub categorized: usize,
    /// Rows no rule claimed.
    pub purged: usize,
    /// Matches per rule, indexed by sort order.
    pub matches_per_rule: Vec<usize>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Apply the scope's rules to its snapshots and publish the result.
///
/// # Errors
///
/// Returns [`EngineError::Decode`] / [`EngineError::Store`] if snapshots,
/// rules or tag sets cannot be read, or the categorized table cannot be
/// replaced.
pub fn recategorize<S: EventStore>(
    store: &mut S,
    scope: &str,
    options: &RecategorizeOptions,
) -> Result<RecategorizeReport, EngineError> {
    let started = Instant::now();
    let rules = store.rules(scope)?;
    let snapshots = store.snapshots(scope)?;
    let total = snapshots.len();

    let snapshots = match options.backlog_resolved_cutoff {
        Some(cutoff) => drop_closed_before(snapshots, cutoff, &options.closed_statuses),
        None => snapshots,
    };
    let cutoff_dropped = total - snapshots.len();

    let parents = parent_index(store.category_edges(scope)?);
    let mut matches_per_rule = vec![0; rules.len()];
    let mut categorized = Vec::with_capacity(snapshots.len());
    let mut purged = 0;

    for mut snapshot in snapshots {
        match first_match(&*store, &rules, &parents, &snapshot)? {
            Some((index, label)) => {
                matches_per_rule[index] += 1;
                snapshot.category = Some(label);
                categorized.push(snapshot);
            }
            None => {
                debug!(scope, day = %snapshot.day, item_id = %snapshot.item_id, "no rule matched");
                purged += 1;
            }
        }
    }

    if options.retroactive_categories {
        backfill_latest(&mut categorized, |row| row.category.clone(), |row, value| {
            row.category = value;
        });
    }
    if options.retroactive_points {
        backfill_latest(&mut categorized, |row| row.points, |row, value| {
            row.points = value;
        });
    }

    store.replace_categorized(scope, &categorized)?;

    let report = RecategorizeReport {
        scope: scope.to_string(),
        snapshots: total,
        cutoff_dropped,
        categorized: categorized.len(),
        purged,
        matches_per_rule,
        elapsed: started.elapsed(),
    };
    info!(
        scope,
        snapshots = report.snapshots,
        categorized = report.categorized,
        purged = report.purged,
        cutoff_dropped = report.cutoff_dropped,
        "recategorization complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Rule matching
// ---------------------------------------------------------------------------

type ParentIndex = HashMap<(NaiveDate, ItemId), Vec<CategoryEdge>>;

fn parent_index(edges: Vec<CategoryEdge>) -> ParentIndex {
    let mut index: ParentIndex = HashMap::new();
    for edge in edges {
        index.entry((edge.day, edge.item_id)).or_default().push(edge);
    }
    index
}

/// Index (by position in `rules`) and label of the first rule claiming
/// `snapshot`.
fn first_match<S: EventStore>(
    store: &S,
    rules: &[Rule],
    parents: &ParentIndex,
    snapshot: &Snapshot,
) -> Result<Option<(usize, String)>, EngineError> {
    let mut item_tags: Option<BTreeSet<TagId>> = None;

    for (index, rule) in rules.iter().enumerate() {
        let on_matched_tag = rule.tag_ids.contains(&snapshot.tag_id);
        let label = match rule.kind {
            RuleKind::ProjectById => on_matched_tag.then(|| rule.title.clone()),
            RuleKind::Intersection => {
                if item_tags.is_none() {
                    item_tags = Some(store.tag_associations_as_of(snapshot.item_id, snapshot.day)?);
                }
                let tags = item_tags.as_ref();
                rule.tag_ids
                    .iter()
                    .all(|id| tags.is_some_and(|tags| tags.contains(id)))
                    .then(|| rule.title.clone())
            }
            RuleKind::ProjectColumn => (on_matched_tag && snapshot.column == rule.match_string)
                .then(|| rule.title.clone()),
            RuleKind::ParentTask => {
                if on_matched_tag {
                    parents
                        .get(&(snapshot.day, snapshot.item_id))
                        .and_then(|edges| {
                            edges
                                .iter()
                                .find(|edge| edge.category_title.contains(&rule.match_string))
                        })
                        .map(|edge| {
                            if rule.title.trim().is_empty() {
                                edge.category_title.clone()
                            } else {
                                rule.title.clone()
                            }
                        })
                } else {
                    None
                }
            }
            // resolved into ProjectById at load time
            RuleKind::ProjectByName | RuleKind::ProjectsByWildcard => None,
        };
        if let Some(label) = label {
            return Ok(Some((index, label)));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Pre- and post-passes
// ---------------------------------------------------------------------------

/// Drop every row of items whose status, as of their latest snapshot on or
/// before `cutoff`, is closed.
fn drop_closed_before(
    snapshots: Vec<Snapshot>,
    cutoff: NaiveDate,
    closed: &[String],
) -> Vec<Snapshot> {
    let mut status_at_cutoff: HashMap<ItemId, (NaiveDate, &str)> = HashMap::new();
    for snapshot in snapshots.iter().filter(|s| s.day <= cutoff) {
        let entry = status_at_cutoff
            .entry(snapshot.item_id)
            .or_insert((snapshot.day, snapshot.status.as_str()));
        if snapshot.day >= entry.0 {
            *entry = (snapshot.day, snapshot.status.as_str());
        }
    }
    let dropped: HashSet<ItemId> = status_at_cutoff
        .into_iter()
        .filter(|(_, (_, status))| closed.iter().any(|c| c == status))
        .map(|(item, _)| item)
        .collect();

    snapshots
        .into_iter()
        .filter(|s| !dropped.contains(&s.item_id))
        .collect()
}

/// Overwrite a field on every row of an item with the value from that
/// item's latest row.
fn backfill_latest<T: Clone>(
    rows: &mut [Snapshot],
    get: impl Fn(&Snapshot) -> T,
    set: impl Fn(&mut Snapshot, T),
) {
    let mut latest: HashMap<ItemId, (NaiveDate, T)> = HashMap::new();
    for row in rows.iter() {
        let newer = latest
            .get(&row.item_id)
            .is_none_or(|(day, _)| row.day >= *day);
        if newer {
            latest.insert(row.item_id, (row.day, get(row)));
        }
    }
    for row in rows.iter_mut() {
        if let Some((_, value)) = latest.get(&row.item_id) {
            set(row, value.clone());
        }
    }
}
