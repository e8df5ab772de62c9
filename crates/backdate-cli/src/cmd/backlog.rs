use anyhow::Result;
use backdate_core::backlog::tall_backlog;
use backdate_core::config::ScopeConfig;
use backdate_core::db::SqliteStore;

use crate::output::{OutputMode, render};

/// Run `backdate backlog`: print the tall backlog of the scope.
///
/// # Errors
///
/// Returns an error if the categorized table cannot be read.
pub fn run_backlog(
    store: &SqliteStore,
    config: &ScopeConfig,
    include_hidden: bool,
    output: OutputMode,
) -> Result<()> {
    let rows: Vec<_> = tall_backlog(store, &config.scope)?
        .into_iter()
        .filter(|row| include_hidden || row.display)
        .collect();

    render(output, &rows, |rows, w| {
        writeln!(w, "day\tcategory\tstatus\tmaint_type\tpoints\tcount")?;
        for row in rows {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}",
                row.day, row.category, row.status, row.maint_type, row.points, row.count
            )?;
        }
        Ok(())
    })
}
