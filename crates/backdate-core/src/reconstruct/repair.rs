//! Status repair pass.
//!
//! Some source statuses arrive JSON-quoted or padded, and some legacy
//! spellings need mapping onto current ones.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::EngineError;
use crate::store::EventStore;

/// Canonical form of a stored status, or `None` if it is already clean.
#[must_use]
pub fn repaired_status(raw: &str, aliases: &BTreeMap<String, String>) -> Option<String> {
    let cleaned = raw.trim().trim_matches('"').trim();
    let repaired = aliases.get(cleaned).map_or(cleaned, String::as_str);
    (repaired != raw).then(|| repaired.to_string())
}

/// Repair statuses of the scope's snapshots dated on or after `from`.
/// Returns the number of snapshots changed.
///
/// # Errors
///
/// Returns [`EngineError::Store`] if snapshots cannot be read or updated.
pub fn repair_statuses<S: EventStore>(
    store: &mut S,
    scope: &str,
    from: NaiveDate,
    aliases: &BTreeMap<String, String>,
) -> Result<usize, EngineError> {
    let mut updates = Vec::new();
    for snapshot in store.snapshots(scope)? {
        if snapshot.day < from {
            continue;
        }
        if let Some(fixed) = repaired_status(&snapshot.status, aliases) {
            warn!(
                scope,
                day = %snapshot.day,
                item_id = %snapshot.item_id,
                from = %snapshot.status,
                to = %fixed,
                "repairing snapshot status"
            );
            updates.push((snapshot.day, snapshot.item_id, fixed));
        }
    }
    store.update_statuses(scope, &updates)?;
    Ok(updates.len())
}
