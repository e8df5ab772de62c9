use anyhow::Result;
use backdate_core::config::ScopeConfig;
use backdate_core::db::SqliteStore;
use backdate_core::reconstruct::{Mode, ReconstructOptions, Reconstructor};
use chrono::{NaiveDate, Utc};
use serde_json::json;

use super::reload_rules;
use crate::output::{OutputMode, kv, render};

/// Run `backdate reconstruct`.
///
/// Without `--end-date` the window ends today (UTC). Without `--start-date`
/// a full run starts at the config's `start_date`, or at the oldest event.
/// The rule set is reloaded from the table first.
///
/// # Errors
///
/// Returns an error if the table does not load or reconstruction fails.
pub fn run_reconstruct(
    store: &mut SqliteStore,
    config: &ScopeConfig,
    incremental: bool,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    output: OutputMode,
) -> Result<()> {
    let options = ReconstructOptions {
        mode: if incremental {
            Mode::Incremental
        } else {
            Mode::Full
        },
        start_date: start_date.or(config.start_date),
        end_date: end_date.unwrap_or_else(|| Utc::now().date_naive()),
    };

    reload_rules(store, config)?;
    let report = Reconstructor::from_config(store, config)?.run(&options)?;

    let value = json!({
        "scope": report.scope,
        "mode": if incremental { "incremental" } else { "full" },
        "start": report.start,
        "end": report.end,
        "days": report.days,
        "removed": report.removed,
        "written": report.written,
        "skipped": report.skipped,
        "category_edges": report.category_edges,
        "status_repairs": report.status_repairs,
        "elapsed_ms": report.elapsed.as_millis(),
    });
    render(output, &value, |_, w| {
        kv(w, "scope", &report.scope)?;
        kv(w, "window", format!("{} .. {}", report.start, report.end))?;
        kv(w, "days", report.days)?;
        kv(w, "removed", report.removed)?;
        kv(w, "written", report.written)?;
        kv(w, "status repairs", report.status_repairs)?;
        kv(w, "elapsed", format!("{:.2?}", report.elapsed))
    })
}
