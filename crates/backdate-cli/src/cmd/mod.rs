pub mod backlog;
pub mod recategorize;
pub mod reconstruct;
pub mod rules;

use anyhow::Result;
use backdate_core::config::ScopeConfig;
use backdate_core::db::SqliteStore;
use backdate_core::rules::{LoadedRules, load_rules_from_path};
use tracing::debug;

/// Replace the scope's stored rules with the current recategorization table.
///
/// Every run that reads rules goes through here first, so edits to the table
/// take effect without a separate `backdate rules`.
pub fn reload_rules(store: &mut SqliteStore, config: &ScopeConfig) -> Result<LoadedRules> {
    let path = config.rules_path();
    let loaded = load_rules_from_path(store, &config.scope, &path)?;
    debug!(
        scope = %config.scope,
        table = %path.display(),
        rules = loaded.rules.len(),
        "reloaded rule set"
    );
    Ok(loaded)
}
