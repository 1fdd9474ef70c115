//! dispatch-engine CLI: operator access to matching, capacity and change history.

use clap::{Parser, Subcommand};
use serde::Serialize;

use dispatch_engine::db::HistoryFilter;
use dispatch_engine::domain::dispatch::parse_date;
use dispatch_engine::scheduler::{AssignFilters, AssignOptions};
use dispatch_engine::{DispatchEngine, EngineConfig, Result};

#[derive(Parser)]
#[command(name = "dispatch-engine", about = "Match dispatches to field technicians")]
struct Cli {
    /// SQLite database path (overrides DISPATCH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and indexes
    Init,
    /// Show a technician's availability for a day
    Availability {
        technician_id: String,
        /// YYYY-MM-DD
        date: String,
    },
    /// Rank technicians for a dispatch
    Candidates {
        dispatch_id: String,
        /// Stay inside the primary search area
        #[arg(long)]
        no_expansion: bool,
    },
    /// Match every unassigned dispatch of a day
    AutoAssign {
        /// YYYY-MM-DD
        date: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        /// Persist the assignments (default is a dry run)
        #[arg(long)]
        commit: bool,
        /// Pick the closest technician instead of the best score
        #[arg(long)]
        distance: bool,
        #[arg(long)]
        no_expansion: bool,
    },
    /// List change records, newest first
    History {
        #[arg(long)]
        table: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Change counts by table and operation
    Stats,
    /// Undo a change record
    Rollback { change_id: i64 },
    /// Delete a row with an audit record
    Delete {
        table: String,
        record_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Restore capacity for assignments that changed outside a commit
    Reconcile,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = EngineConfig::from_env()?;
    if let Some(path) = cli.db {
        config.database_path = path;
    }
    let engine = DispatchEngine::open(config)?;

    match cli.command {
        Command::Init => {
            println!("database ready at {}", engine.database().path());
            Ok(())
        }
        Command::Availability {
            technician_id,
            date,
        } => print_json(&engine.check_availability(&technician_id, parse_date(&date)?)?),
        Command::Candidates {
            dispatch_id,
            no_expansion,
        } => print_json(&engine.find_candidates(&dispatch_id, !no_expansion)?),
        Command::AutoAssign {
            date,
            city,
            state,
            commit,
            distance,
            no_expansion,
        } => {
            let filters = AssignFilters { city, state };
            let options = AssignOptions {
                dry_run: !commit,
                use_scoring: !distance,
                enable_range_expansion: !no_expansion,
            };
            let mut result = engine.auto_assign(parse_date(&date)?, &filters, options)?;
            result.stats = result.stats.rounded();
            print_json(&result)
        }
        Command::History { table, limit } => {
            let filter = HistoryFilter {
                table,
                limit: Some(limit),
                ..HistoryFilter::default()
            };
            print_json(&engine.get_history(&filter)?)
        }
        Command::Stats => print_json(&engine.get_stats()?),
        Command::Rollback { change_id } => {
            let rollback_id = engine.rollback(change_id)?;
            println!("change #{change_id} rolled back as #{rollback_id}");
            Ok(())
        }
        Command::Delete {
            table,
            record_id,
            reason,
        } => {
            let change_id = engine.delete_record(&table, &record_id, reason.as_deref())?;
            println!("deleted {table} {record_id} (change #{change_id})");
            Ok(())
        }
        Command::Reconcile => print_json(&engine.reconcile()?),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
