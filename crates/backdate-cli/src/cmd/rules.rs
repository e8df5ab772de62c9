use anyhow::Result;
use backdate_core::config::ScopeConfig;
use backdate_core::db::SqliteStore;
use backdate_core::rules::candidate_tag_names;
use serde_json::json;

use super::reload_rules;
use crate::output::{OutputMode, kv, render};

/// Run `backdate rules`: load the scope's recategorization table and show
/// the stored rules with the candidate tags they yield.
///
/// # Errors
///
/// Returns an error if the table is invalid, does not resolve, or the store
/// cannot be written.
pub fn run_rules(store: &mut SqliteStore, config: &ScopeConfig, output: OutputMode) -> Result<()> {
    let path = config.rules_path();
    let loaded = reload_rules(store, config)?;
    let candidates = candidate_tag_names(&loaded.rules);

    let value = json!({
        "scope": config.scope,
        "title": config.title,
        "table": path.display().to_string(),
        "duplicates": loaded.duplicates,
        "rules": loaded.rules,
        "candidates": candidates
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name }))
            .collect::<Vec<_>>(),
    });
    render(output, &value, |_, w| {
        kv(w, "scope", &config.scope)?;
        if !config.title.is_empty() {
            kv(w, "title", &config.title)?;
        }
        kv(w, "table", path.display())?;
        kv(w, "rules", loaded.rules.len())?;
        kv(w, "duplicates", loaded.duplicates)?;
        let names: Vec<String> = candidates
            .iter()
            .map(|(id, name)| format!("{id} {name}"))
            .collect();
        kv(w, "candidates", names.join(", "))?;
        for rule in &loaded.rules {
            let ids: Vec<String> = rule.tag_ids.iter().map(ToString::to_string).collect();
            writeln!(
                w,
                "{:>4}  {:<14} {:<16} {:<12} {}{}",
                rule.sort_order,
                rule.kind,
                ids.join(" "),
                rule.match_string,
                rule.title,
                if rule.display { "" } else { "  (hidden)" }
            )?;
        }
        Ok(())
    })
}
