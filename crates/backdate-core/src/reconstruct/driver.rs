//! Day-by-day reconstruction over a window.
//!
//! # Modes
//!
//! - **Full** wipes every snapshot of the scope, then walks the window from
//!   the explicit start date, or from the day of the oldest event.
//! - **Incremental** restarts at the scope's latest snapshot day. That day
//!   and everything after it are deleted and recomputed; earlier days are
//!   left untouched. Denormalization is idempotent, so the overlap day comes
//!   out exactly as a full rebuild would produce it.
//!
//! Days are processed strictly in ascending order. Each day's snapshots are
//! written together; an aborted run leaves earlier days intact.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::ScopeConfig;
use crate::error::EngineError;
use crate::store::EventStore;

use super::categories::{self, TaskTree};
use super::edges::denormalize_day;
use super::repair::repair_statuses;
use super::snapshot::{ScopeContext, reconstruct_item_on_day};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Full,
    Incremental,
}

/// Window and mode for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructOptions {
    pub mode: Mode,
    /// Full mode only; incremental mode always starts at the latest
    /// snapshot day.
    pub start_date: Option<NaiveDate>,
    /// Last day reconstructed, inclusive.
    pub end_date: NaiveDate,
}

/// Report from a reconstruction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructReport {
    pub scope: String,
    pub mode: Mode,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Days walked.
    pub days: usize,
    /// Snapshots deleted before the walk.
    pub removed: usize,
    pub written: usize,
    /// Active items skipped because no candidate tag matched.
    pub skipped: usize,
    pub category_edges: usize,
    pub status_repairs: usize,
    pub elapsed: Duration,
}

/// Drives reconstruction of one scope against a store.
pub struct Reconstructor<'a, S: EventStore> {
    store: &'a mut S,
    ctx: ScopeContext,
    status_aliases: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl<'a, S: EventStore> Reconstructor<'a, S> {
    #[must_use]
    pub const fn new(store: &'a mut S, ctx: ScopeContext) -> Self {
        Self {
            store,
            ctx,
            status_aliases: BTreeMap::new(),
        }
    }

    /// Build a reconstructor from a scope config and the scope's stored
    /// rules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the rules or tags cannot be read.
    pub fn from_config(store: &'a mut S, config: &ScopeConfig) -> Result<Self, EngineError> {
        let ctx = ScopeContext::load(
            &*store,
            &config.scope,
            config.reserved_tags,
            config.default_points,
        )?;
        Ok(Self::new(store, ctx).with_status_aliases(config.status.aliases.clone()))
    }

    #[must_use]
    pub fn with_status_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.status_aliases = aliases;
        self
    }

    /// Reconstruct the window described by `options`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoIncrementalBase`] in incremental mode without
    ///   prior snapshots
    /// - [`EngineError::EmptyEventLog`] in full mode without a start date
    ///   over an empty log
    /// - [`EngineError::MissingEdgeData`] if an active item lost its tags
    /// - [`EngineError::Decode`] / [`EngineError::Store`] on storage problems
    pub fn run(&mut self, options: &ReconstructOptions) -> Result<ReconstructReport, EngineError> {
        let started = Instant::now();
        let scope = self.ctx.scope.clone();

        let (start, removed) = match options.mode {
            Mode::Full => {
                let start = match options.start_date {
                    Some(day) => day,
                    None => self
                        .store
                        .earliest_event_day()?
                        .ok_or(EngineError::EmptyEventLog)?,
                };
                let removed = self.store.delete_snapshots_from(&scope, None)?;
                (start, removed)
            }
            Mode::Incremental => {
                let start = self.store.latest_snapshot_day(&scope)?.ok_or_else(|| {
                    EngineError::NoIncrementalBase {
                        scope: scope.clone(),
                    }
                })?;
                if let Some(requested) = options.start_date {
                    debug!(%requested, %start, "incremental mode ignores the requested start date");
                }
                let removed = self.store.delete_snapshots_from(&scope, Some(start))?;
                (start, removed)
            }
        };

        info!(
            scope = %scope,
            mode = ?options.mode,
            %start,
            end = %options.end_date,
            removed,
            candidates = self.ctx.candidates.len(),
            "reconstruction starting"
        );

        let mut report = ReconstructReport {
            scope: scope.clone(),
            mode: options.mode,
            start,
            end: options.end_date,
            days: 0,
            removed,
            written: 0,
            skipped: 0,
            category_edges: 0,
            status_repairs: 0,
            elapsed: Duration::ZERO,
        };

        let tree = TaskTree::load(&*self.store)?;
        let relevant = self.ctx.relevant_ids();
        let candidates = self.ctx.candidate_ids();

        for day in start.iter_days().take_while(|day| *day <= options.end_date) {
            denormalize_day(&mut *self.store, &scope, day, &relevant)?;

            let mut snapshots = Vec::new();
            for item in self.store.active_items(&scope, day, &candidates)? {
                match reconstruct_item_on_day(&*self.store, &self.ctx, item, day)? {
                    Some(snapshot) => snapshots.push(snapshot),
                    None => report.skipped += 1,
                }
            }
            self.store.insert_snapshots(&snapshots)?;

            report.category_edges += categories::materialize_day(
                &mut *self.store,
                &scope,
                day,
                self.ctx.reserved.category,
                &tree,
                &snapshots,
            )?;

            debug!(scope = %scope, %day, snapshots = snapshots.len(), "day reconstructed");
            report.days += 1;
            report.written += snapshots.len();
        }

        if report.days > 0 {
            categories::finalize(&mut *self.store, &scope, start, self.ctx.reserved.category)?;
            report.status_repairs =
                repair_statuses(&mut *self.store, &scope, start, &self.status_aliases)?;
        }

        report.elapsed = started.elapsed();
        info!(
            scope = %scope,
            days = report.days,
            written = report.written,
            skipped = report.skipped,
            status_repairs = report.status_repairs,
            elapsed_ms = report.elapsed.as_millis(),
            "reconstruction complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::event::{Attribute, Event, start_of_day_us};
    use crate::model::item::{Item, ItemId};
    use crate::model::tag::{ReservedTags, Tag, TagId};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 8, d).expect("valid date")
    }

    fn ctx() -> ScopeContext {
        ScopeContext {
            scope: "alpha".into(),
            candidates: vec![Tag {
                id: TagId(100),
                name: "Search".into(),
                external_id: "PHID-PROJ-100".into(),
            }],
            reserved: ReservedTags {
                new: TagId(900),
                maint: TagId(901),
                category: TagId(902),
                epic: None,
            },
            default_points: None,
        }
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open store");
        for (id, title) in [(1, "Epic: search"), (2, "Index docs"), (3, "Unrelated")] {
            store
                .insert_item(&Item {
                    id: ItemId(id),
                    title: title.into(),
                    story_points: String::new(),
                    status: String::new(),
                })
                .expect("insert item");
        }
        store.insert_parent(ItemId(1), ItemId(2)).expect("link");

        let events = [
            (1, 1, Attribute::Tags, "", vec![100, 902], 2),
            (2, 2, Attribute::Tags, "", vec![100], 2),
            (3, 2, Attribute::Status, "\"open\"", vec![], 2),
            (4, 3, Attribute::Tags, "", vec![555], 2),
            (5, 2, Attribute::Status, "resolved", vec![], 4),
        ];
        for (event_id, item, attribute, value, tags, d) in events {
            store
                .insert_event(&Event {
                    event_id,
                    item_id: ItemId(item),
                    attribute,
                    value: value.into(),
                    ts_us: start_of_day_us(day(d)) + 60_000_000,
                    tags: tags.into_iter().map(TagId).collect(),
                })
                .expect("insert event");
        }
        store
    }

    fn full(end: u32) -> ReconstructOptions {
        ReconstructOptions {
            mode: Mode::Full,
            start_date: None,
            end_date: day(end),
        }
    }

    #[test]
    fn full_run_starts_at_earliest_event() {
        let mut store = seeded();
        let report = Reconstructor::new(&mut store, ctx())
            .run(&full(4))
            .expect("run");

        assert_eq!(report.start, day(2));
        assert_eq!(report.days, 3);
        assert_eq!(report.written, 6);

        let snaps = store.snapshots("alpha").expect("snapshots");
        let item2: Vec<_> = snaps
            .iter()
            .filter(|s| s.item_id == ItemId(2))
            .map(|s| (s.day, s.status.as_str()))
            .collect();
        assert_eq!(
            item2,
            vec![(day(2), "open"), (day(3), "open"), (day(4), "resolved")]
        );
        assert!(snaps.iter().all(|s| s.item_id != ItemId(3)));
        assert_eq!(report.status_repairs, 2);
    }

    #[test]
    fn category_edges_link_subtasks_and_self() {
        let mut store = seeded();
        Reconstructor::new(&mut store, ctx())
            .run(&full(2))
            .expect("run");

        let edges: Vec<_> = store
            .category_edges("alpha")
            .expect("edges")
            .into_iter()
            .map(|e| (e.item_id, e.category_id, e.category_title))
            .collect();
        assert_eq!(
            edges,
            vec![
                (ItemId(1), ItemId(1), "Epic: search".to_string()),
                (ItemId(2), ItemId(1), "Epic: search".to_string()),
            ]
        );
    }

    #[test]
    fn incremental_requires_a_base() {
        let mut store = seeded();
        let err = Reconstructor::new(&mut store, ctx())
            .run(&ReconstructOptions {
                mode: Mode::Incremental,
                start_date: None,
                end_date: day(4),
            })
            .expect_err("no base");
        assert!(matches!(err, EngineError::NoIncrementalBase { .. }));
    }

    #[test]
    fn full_run_on_empty_log_needs_a_start_date() {
        let mut store = SqliteStore::open_in_memory().expect("open store");
        let err = Reconstructor::new(&mut store, ctx())
            .run(&full(4))
            .expect_err("empty log");
        assert!(matches!(err, EngineError::EmptyEventLog));

        let report = Reconstructor::new(&mut store, ctx())
            .run(&ReconstructOptions {
                start_date: Some(day(1)),
                ..full(2)
            })
            .expect("explicit start");
        assert_eq!(report.days, 2);
        assert_eq!(report.written, 0);
    }

    #[test]
    fn incremental_rewrites_boundary_day_only() {
        let mut store = seeded();
        Reconstructor::new(&mut store, ctx())
            .run(&full(3))
            .expect("full");
        let report = Reconstructor::new(&mut store, ctx())
            .run(&ReconstructOptions {
                mode: Mode::Incremental,
                start_date: Some(day(1)),
                end_date: day(4),
            })
            .expect("incremental");

        assert_eq!(report.start, day(3));
        assert_eq!(report.removed, 2);
        assert_eq!(report.days, 2);

        let days: Vec<_> = store
            .snapshots("alpha")
            .expect("snapshots")
            .into_iter()
            .map(|s| (s.day, s.item_id))
            .collect();
        assert_eq!(days.len(), 6);
        assert_eq!(days.first(), Some(&(day(2), ItemId(1))));
        assert_eq!(days.last(), Some(&(day(4), ItemId(2))));
    }
}
