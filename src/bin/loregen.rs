//! Loregen CLI: ingest, infer, generate and export.
//!
//! Usage:
//!   loregen run --input <dir> --known <file> [--config <file>] [--db path] [--out dir] [--force]
//!   loregen ingest --input <dir> --known <file> [--config <file>] [--db path]
//!   loregen stats [--db path]
//!   loregen export --out <dir> [--db path]

use clap::{Parser, Subcommand};
use loregen::orchestrator::last_run_stats;
use loregen::{
    CommandClient, DirectorySource, InferenceClient, KnownEntityIndex, OpenStore, Orchestrator,
    PipelineConfig, PipelineError, RunStats, SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(
    name = "loregen",
    version,
    about = "Schema inference and model generation for world-building exports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest, route and run all phases
    Run {
        /// Directory of exported fragments
        #[arg(long)]
        input: PathBuf,
        /// Known-entity file (YAML or JSON map of name -> category)
        #[arg(long)]
        known: PathBuf,
        /// Pipeline configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Export artifacts here after a successful run
        #[arg(long)]
        out: Option<PathBuf>,
        /// Regenerate inventories and rebuild every phase
        #[arg(long)]
        force: bool,
    },
    /// Stage fragments without running any phase
    Ingest {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        known: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print statistics of the last run
    Stats,
    /// Write generated models and container indexes to a directory
    Export {
        #[arg(long)]
        out: PathBuf,
    },
}

/// Get the default database path (~/.local/share/loregen/loregen.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("loregen").join("loregen.db")
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    SqliteStore::open(&db_path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, String> {
    match path {
        Some(path) => PipelineConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_known(path: &Path) -> Result<Arc<KnownEntityIndex>, String> {
    let known = KnownEntityIndex::load(path).map_err(|e| e.to_string())?;
    info!(entries = known.len(), "known-entity index loaded");
    Ok(Arc::new(known))
}

fn command_client(config: &PipelineConfig) -> Result<CommandClient, String> {
    CommandClient::from_command_line(
        &config.inference.command,
        Duration::from_secs(config.inference.timeout_secs),
    )
    .ok_or_else(|| "inference.command is not set in the configuration".to_string())
}

fn print_stats(stats: &RunStats) {
    println!("Run {} ({:?})", stats.run_id, stats.state);
    println!("  started:   {}", stats.started_at.to_rfc3339());
    if let Some(finished) = stats.finished_at {
        println!("  finished:  {}", finished.to_rfc3339());
    }
    println!("  ingested:  {}", stats.total_ingested);
    println!("  unrouted:  {} ({} ties)", stats.unrouted, stats.unrouted_ties);
    println!("  inference: {} calls, {} cached", stats.inference_calls, stats.cache_hits);
    println!("  containers: {} sub, {} dangling members", stats.sub_containers, stats.dangling_members);
    println!();
    println!("{:<24}  {:>8}  {:<8}", "CATEGORY", "RECORDS", "STATUS");
    println!("{}", "-".repeat(44));
    for (category, count) in &stats.per_category {
        let status = if stats.failed_categories.contains_key(category) {
            "failed"
        } else if stats.succeeded_categories.contains(category) {
            "ok"
        } else {
            "-"
        };
        println!("{:<24}  {:>8}  {:<8}", category, count, status);
    }
    if !stats.no_silent_drops() {
        println!();
        println!(
            "Warning: {} records accounted for, {} ingested",
            stats.accounted(),
            stats.total_ingested
        );
    }
}

fn print_warnings(stats: &RunStats) {
    let warnings = stats.warning_summary();
    if warnings.is_empty() {
        return;
    }
    eprintln!("Warning: {} partial failure(s):", warnings.len());
    for line in warnings {
        eprintln!("  {}", line);
    }
}

async fn cmd_run(
    db: Option<PathBuf>,
    input: &Path,
    known: &Path,
    config: Option<&Path>,
    out: Option<&Path>,
    force: bool,
) -> i32 {
    let setup = (|| {
        let config = load_config(config)?;
        let client = command_client(&config)?;
        Ok::<_, String>((open_store(db)?, load_known(known)?, config, client))
    })();
    let (store, known, config, client) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if !client.is_available().await {
        warn!("inference command not found; only cached inventories can succeed");
    }

    let orchestrator = Orchestrator::new(store.clone(), known, Arc::new(client), config).with_force(force);
    let stats = match orchestrator.run(Arc::new(DirectorySource::new(input))).await {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let PipelineError::NoSuccessfulCategories(_) = e {
                if let Ok(Some(stats)) = last_run_stats(store.as_ref()) {
                    print_warnings(&stats);
                }
            }
            return 1;
        }
    };
    print_stats(&stats);
    print_warnings(&stats);

    if let Some(out) = out {
        match loregen::export::write_all(store.as_ref(), out) {
            Ok(summary) => println!("\nExported {} files to {}", summary.files.len(), out.display()),
            Err(e) => {
                eprintln!("Error: export failed: {}", e);
                return 1;
            }
        }
    }
    0
}

async fn cmd_ingest(db: Option<PathBuf>, input: &Path, known: &Path, config: Option<&Path>) -> i32 {
    let setup = (|| Ok::<_, String>((open_store(db)?, load_known(known)?, load_config(config)?)))();
    let (store, known, config) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    // Staging never calls the inference capability
    let client: Arc<dyn InferenceClient> = Arc::new(loregen::MockClient::unavailable());
    let orchestrator = Orchestrator::new(store, known, client, config);
    match orchestrator.ingest(Arc::new(DirectorySource::new(input))).await {
        Ok(report) => {
            println!(
                "Staged {} records ({} duplicates, {} failures)",
                report.records.len(),
                report.duplicates,
                report.failures.len()
            );
            for failure in &report.failures {
                eprintln!("  {}: {}", failure.source_id, failure.reason);
            }
            if report.records.is_empty() {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_stats(db: Option<PathBuf>) -> i32 {
    let store = match open_store(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match last_run_stats(store.as_ref()) {
        Ok(Some(stats)) => {
            print_stats(&stats);
            print_warnings(&stats);
            0
        }
        Ok(None) => {
            println!("No runs recorded.");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_export(db: Option<PathBuf>, out: &Path) -> i32 {
    let store = match open_store(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match loregen::export::write_all(store.as_ref(), out) {
        Ok(summary) => {
            println!(
                "Exported {} models, {} connections, {} sub-containers ({} files) to {}",
                summary.models,
                summary.connections,
                summary.sub_containers,
                summary.files.len(),
                out.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let code = match cli.command {
        Commands::Run {
            input,
            known,
            config,
            out,
            force,
        } => cmd_run(cli.db, &input, &known, config.as_deref(), out.as_deref(), force).await,
        Commands::Ingest { input, known, config } => {
            cmd_ingest(cli.db, &input, &known, config.as_deref()).await
        }
        Commands::Stats => cmd_stats(cli.db),
        Commands::Export { out } => cmd_export(cli.db, &out),
    };
    std::process::exit(code);
}
