use anyhow::Result;
use backdate_core::config::ScopeConfig;
use backdate_core::db::SqliteStore;
use backdate_core::recategorize::{RecategorizeOptions, recategorize};
use serde_json::json;

use super::reload_rules;
use crate::output::{OutputMode, kv, render};

/// Run `backdate recategorize` against a freshly reloaded rule set.
///
/// # Errors
///
/// Returns an error if the table does not load, or the snapshots cannot be
/// categorized and published.
pub fn run_recategorize(
    store: &mut SqliteStore,
    config: &ScopeConfig,
    output: OutputMode,
) -> Result<()> {
    reload_rules(store, config)?;
    let options = RecategorizeOptions::from_config(config);
    let report = recategorize(store, &config.scope, &options)?;

    let value = json!({
        "scope": report.scope,
        "snapshots": report.snapshots,
        "cutoff_dropped": report.cutoff_dropped,
        "categorized": report.categorized,
        "purged": report.purged,
        "matches_per_rule": report.matches_per_rule,
        "elapsed_ms": report.elapsed.as_millis(),
    });
    render(output, &value, |_, w| {
        kv(w, "scope", &report.scope)?;
        kv(w, "snapshots", report.snapshots)?;
        if options.backlog_resolved_cutoff.is_some() {
            kv(w, "cutoff dropped", report.cutoff_dropped)?;
        }
        kv(w, "categorized", report.categorized)?;
        kv(w, "purged", report.purged)
    })
}
