#![forbid(unsafe_code)]

mod cmd;
mod output;

use backdate_core::config::load_scope_config;
use backdate_core::db::open_store;
use backdate_core::EngineError;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "backdate",
    author,
    version,
    about = "backdate: day-by-day history and categories for tracked work items",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Store database path.
    #[arg(long, global = true, default_value = "backdate.sqlite3")]
    db: PathBuf,

    /// Scope config file.
    #[arg(short, long, global = true, default_value = "backdate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the scope's recategorization table into the store.
    Rules,

    /// Rebuild daily snapshots for the scope.
    Reconstruct {
        /// Extend from the latest existing snapshot day instead of
        /// rebuilding everything.
        #[arg(long)]
        incremental: bool,

        /// First day of a full rebuild (YYYY-MM-DD).
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Last day to reconstruct, inclusive (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },

    /// Apply the scope's rules and publish categorized snapshots.
    Recategorize,

    /// Print the tall backlog summary of categorized snapshots.
    Backlog {
        /// Include categories whose rules are marked hidden.
        #[arg(long)]
        all: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("BACKDATE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "backdate=debug,backdate_core=debug,info"
        } else {
            "backdate=info,backdate_core=info,warn"
        })
    });

    let format = env::var("BACKDATE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output = cli.output_mode();
    let config = load_scope_config(&cli.config)?;
    debug!(config = %cli.config.display(), scope = %config.scope, "loaded scope config");

    let mut store = open_store(&cli.db)?;
    info!(db = %cli.db.display(), "opened store");

    match cli.command {
        Commands::Rules => cmd::rules::run_rules(&mut store, &config, output),
        Commands::Reconstruct {
            incremental,
            start_date,
            end_date,
        } => cmd::reconstruct::run_reconstruct(
            &mut store,
            &config,
            incremental,
            start_date,
            end_date,
            output,
        ),
        Commands::Recategorize => cmd::recategorize::run_recategorize(&mut store, &config, output),
        Commands::Backlog { all } => cmd::backlog::run_backlog(&store, &config, all, output),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(engine) = err.downcast_ref::<EngineError>() {
                let code = engine.code();
                eprintln!("error[{code}]: {engine}");
                if let Some(hint) = code.hint() {
                    eprintln!("hint: {hint}");
                }
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_apply_without_flags() {
        let cli = Cli::parse_from(["backdate", "rules"]);
        assert_eq!(cli.db, PathBuf::from("backdate.sqlite3"));
        assert_eq!(cli.config, PathBuf::from("backdate.toml"));
        assert!(!cli.verbose);
        assert_eq!(cli.output_mode(), OutputMode::Human);
        assert!(matches!(cli.command, Commands::Rules));
    }

    #[test]
    fn reconstruct_parses_window_and_mode() {
        let cli = Cli::parse_from([
            "backdate",
            "reconstruct",
            "--incremental",
            "--start-date",
            "2016-03-01",
            "--end-date",
            "2016-03-31",
        ]);
        match cli.command {
            Commands::Reconstruct {
                incremental,
                start_date,
                end_date,
            } => {
                assert!(incremental);
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2016, 3, 1));
                assert_eq!(end_date, NaiveDate::from_ymd_opt(2016, 3, 31));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bad_date_is_rejected() {
        let result = Cli::try_parse_from(["backdate", "reconstruct", "--end-date", "March"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from([
            "backdate",
            "backlog",
            "--json",
            "--db",
            "/tmp/alpha.sqlite3",
            "-c",
            "alpha.toml",
            "--all",
        ]);
        assert!(cli.output_mode().is_json());
        assert_eq!(cli.db, PathBuf::from("/tmp/alpha.sqlite3"));
        assert_eq!(cli.config, PathBuf::from("alpha.toml"));
        assert!(matches!(cli.command, Commands::Backlog { all: true }));
    }

    #[test]
    fn commands_run_end_to_end_against_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("alpha.toml");
        std::fs::write(
            &config_path,
            "scope = \"alpha\"\nrules = \"alpha.csv\"\n",
        )
        .expect("write config");
        std::fs::write(
            dir.path().join("alpha.csv"),
            "rule,matchstring,id,title,display\n",
        )
        .expect("write table");
        let db = dir.path().join("alpha.sqlite3");

        let args = |command: &str| {
            Cli::parse_from([
                "backdate",
                command,
                "--json",
                "--db",
                db.to_str().expect("utf8 path"),
                "--config",
                config_path.to_str().expect("utf8 path"),
            ])
        };
        run(args("rules")).expect("rules");
        run(args("recategorize")).expect("recategorize");
        run(args("backlog")).expect("backlog");

        let err = run(args("reconstruct")).expect_err("empty log");
        let engine = err.downcast_ref::<EngineError>().expect("engine error");
        assert!(matches!(engine, EngineError::EmptyEventLog));
    }

    #[test]
    fn missing_config_reports_config_code() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = dir.path().join("absent.toml");
        let cli = Cli::parse_from([
            "backdate",
            "--config",
            config.to_str().expect("utf8 path"),
            "rules",
        ]);

        let err = run(cli).expect_err("config is missing");
        let engine = err.downcast_ref::<EngineError>().expect("engine error");
        assert_eq!(engine.code().code(), "E1001");
        assert!(engine.to_string().contains("absent.toml"));
    }

    #[test]
    fn runs_pick_up_the_current_rule_table() {
        use backdate_core::model::event::{Attribute, Event, start_of_day_us};
        use backdate_core::model::item::{Item, ItemId};
        use backdate_core::model::tag::{Tag, TagId};
        use backdate_core::store::EventStore;

        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("alpha.toml");
        let table = dir.path().join("alpha_recategorization.csv");
        let db = dir.path().join("alpha.sqlite3");
        std::fs::write(&config_path, "scope = \"alpha\"\n").expect("write config");
        std::fs::write(
            &table,
            "rule,matchstring,id,title,display\nProjectByID,,100,Alpha,true\n",
        )
        .expect("write table");

        let first = NaiveDate::from_ymd_opt(2016, 1, 1).expect("valid date");
        {
            let store = open_store(&db).expect("open store");
            store
                .insert_tag(&Tag {
                    id: TagId(100),
                    name: "Alpha".into(),
                    external_id: "PHID-PROJ-100".into(),
                })
                .expect("insert tag");
            store
                .insert_item(&Item {
                    id: ItemId(1),
                    title: "Index rebuild".into(),
                    story_points: String::new(),
                    status: String::new(),
                })
                .expect("insert item");
            for (event_id, attribute, value, tags) in [
                (1, Attribute::Tags, "", vec![TagId(100)]),
                (2, Attribute::Status, "open", Vec::new()),
            ] {
                store
                    .insert_event(&Event {
                        event_id,
                        item_id: ItemId(1),
                        attribute,
                        value: value.into(),
                        ts_us: start_of_day_us(first) + event_id,
                        tags,
                    })
                    .expect("insert event");
            }
        }

        let args = |command: &[&str]| {
            let mut argv = vec![
                "backdate",
                "--db",
                db.to_str().expect("utf8 path"),
                "--config",
                config_path.to_str().expect("utf8 path"),
                "--json",
            ];
            argv.extend_from_slice(command);
            Cli::parse_from(argv)
        };

        // No `rules` run beforehand: reconstruct loads the table itself.
        run(args(&[
            "reconstruct",
            "--start-date",
            "2016-01-01",
            "--end-date",
            "2016-01-03",
        ]))
        .expect("reconstruct");
        let store = open_store(&db).expect("reopen store");
        assert_eq!(store.snapshots("alpha").expect("snapshots").len(), 3);
        drop(store);

        std::fs::write(
            &table,
            "rule,matchstring,id,title,display\nProjectByID,,100,Search,true\n",
        )
        .expect("edit table");
        run(args(&["recategorize"])).expect("recategorize");

        let store = open_store(&db).expect("reopen store");
        let categories: Vec<Option<String>> = store
            .categorized("alpha")
            .expect("categorized")
            .into_iter()
            .map(|row| row.category)
            .collect();
        assert_eq!(categories, vec![Some("Search".to_string()); 3]);
        assert_eq!(store.rules("alpha").expect("rules")[0].title, "Search");
    }
}
