/*!
 * GeoSync CLI - Command Line Interface
 *
 * Version: 0.3.0
 */

use clap::{Parser, Subcommand};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use geosync::{
    config::GeoSyncConfig,
    core::{
        inspect_derived, EngineSettings, RetentionPolicy, Scheduler, SourceOutcome, SyncEngine,
        SyncLock,
    },
    error::{GeoSyncError, Result, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging,
    sources::local_collaborators,
    CycleStats, Materialized,
};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "geosync")]
#[command(version, about = "Incremental sync and retention for geophysical sensor products", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, value_name = "FILE", default_value = "geosync.toml", global = true)]
    config: PathBuf,

    /// Verbose output (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Write JSON logs to this file instead of stdout
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle for one or every configured source
    Sync {
        /// Only this source
        #[arg(short, long)]
        source: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sync every source now and then on a fixed interval
    Run {
        /// Seconds between rounds
        #[arg(long, default_value = "120")]
        interval_secs: u64,

        /// Stop after this many rounds (default: run until killed)
        #[arg(long)]
        cycles: Option<usize>,
    },

    /// List the servable artifacts of a source (read-only, safe beside `run`)
    List {
        /// Source name
        #[arg(short, long)]
        source: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a starter configuration file
    InitConfig {
        /// Where to write it (default: the --config path)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-source result printed by `sync`
#[derive(Debug, Serialize)]
struct SourceReport {
    source: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<CycleStats>,
    artifacts: Vec<Materialized>,
}

impl SourceReport {
    fn exit_code(&self) -> i32 {
        match self.stats {
            _ if !self.ok => EXIT_FATAL,
            Some(ref stats) if !stats.is_clean() => EXIT_PARTIAL,
            _ => EXIT_SUCCESS,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Commands::InitConfig { ref path, force } = cli.command {
        let path = path.as_deref().unwrap_or(&cli.config);
        init_config(path, force)?;
        return Ok(EXIT_SUCCESS);
    }

    let config = GeoSyncConfig::from_file(&cli.config).map_err(|e| {
        GeoSyncError::Config(format!("failed to load {}: {}", cli.config.display(), e))
    })?;

    let mut log_config = config.logging.clone();
    log_config.verbose |= cli.verbose;
    if cli.log.is_some() {
        log_config.log_file = cli.log.clone();
    }
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Sync { source, json } => sync_once(&config, source.as_deref(), json),
        Commands::Run {
            interval_secs,
            cycles,
        } => run_forever(&config, interval_secs, cycles),
        Commands::List { source, json } => list(&config, &source, json),
        Commands::InitConfig { .. } => Ok(EXIT_SUCCESS),
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(GeoSyncError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    GeoSyncConfig::example().to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Build and register an engine for every selected source
fn build_scheduler(config: &GeoSyncConfig, only: Option<&str>) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new(SyncLock::new());

    let selected: Vec<_> = match only {
        Some(name) => vec![config
            .source(name)
            .ok_or_else(|| GeoSyncError::UnknownSource(name.to_string()))?],
        None => config.sources.iter().collect(),
    };
    if selected.is_empty() {
        return Err(GeoSyncError::Config("no sources configured".to_string()));
    }

    for source in selected {
        let engine = SyncEngine::new(EngineSettings::from(source), local_collaborators(source)?)?;
        scheduler.register(engine)?;
    }
    Ok(scheduler)
}

fn report(scheduler: &Scheduler, outcome: SourceOutcome) -> SourceReport {
    match outcome.result {
        Ok(artifacts) => SourceReport {
            stats: scheduler
                .with_engine(&outcome.source, |engine| engine.last_cycle().cloned())
                .ok()
                .flatten(),
            source: outcome.source,
            ok: true,
            error: None,
            artifacts,
        },
        Err(e) => SourceReport {
            source: outcome.source,
            ok: false,
            error: Some(e.to_string()),
            stats: None,
            artifacts: Vec::new(),
        },
    }
}

fn sync_once(config: &GeoSyncConfig, only: Option<&str>, json: bool) -> Result<i32> {
    let scheduler = build_scheduler(config, only)?;

    let reports: Vec<_> = scheduler
        .run_all()
        .into_iter()
        .map(|outcome| report(&scheduler, outcome))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{}", summary_table(&reports));
        for report in reports.iter().filter(|r| !r.ok) {
            if let Some(ref error) = report.error {
                eprintln!("{}: {}", report.source, error);
            }
        }
    }

    Ok(reports
        .iter()
        .map(SourceReport::exit_code)
        .max()
        .unwrap_or(EXIT_SUCCESS))
}

fn run_forever(config: &GeoSyncConfig, interval_secs: u64, cycles: Option<usize>) -> Result<i32> {
    if interval_secs == 0 {
        return Err(GeoSyncError::Config(
            "interval must be at least one second".to_string(),
        ));
    }
    let scheduler = build_scheduler(config, None)?;
    let (stop, shutdown) = crossbeam_channel::bounded(1);
    let mut completed = 0usize;

    info!(
        sources = ?scheduler.sources(),
        interval_secs,
        "scheduler started"
    );
    scheduler.run_every(Duration::from_secs(interval_secs), shutdown, |outcomes| {
        completed += 1;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(round = completed, sources = outcomes.len(), failed, "round finished");

        if cycles.is_some_and(|limit| completed >= limit) {
            let _ = stop.try_send(());
        }
    });

    Ok(EXIT_SUCCESS)
}

/// Reads the derived root directly; building an engine would clear staging
/// and evict, racing any `run` process on the same roots.
fn list(config: &GeoSyncConfig, name: &str, json: bool) -> Result<i32> {
    let source = config
        .source(name)
        .ok_or_else(|| GeoSyncError::UnknownSource(name.to_string()))?;
    let policy = RetentionPolicy::new(source.sync.time_window())?;
    let artifacts = inspect_derived(
        &source.name,
        &source.derived_root,
        &source.naming,
        &policy,
        Utc::now(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
    } else {
        println!("{}", artifact_table(&artifacts));
        println!("{} artifact(s)", artifacts.len());
    }
    Ok(EXIT_SUCCESS)
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).fg(Color::Cyan).add_attribute(Attribute::Bold))
        .collect()
}

fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn summary_table(reports: &[SourceReport]) -> Table {
    let mut table = create_table();
    table.set_header(header(&[
        "Source", "Status", "Artifacts", "New", "Evicted", "Failures", "Duration",
    ]));

    for report in reports {
        let status = match report.exit_code() {
            EXIT_SUCCESS => Cell::new("ok").fg(Color::Green),
            EXIT_PARTIAL => Cell::new("partial").fg(Color::Yellow),
            _ => Cell::new("failed").fg(Color::Red),
        };
        let (new, evicted, failures, duration) = match report.stats {
            Some(ref s) => (
                (s.materialized + s.adopted).to_string(),
                s.evicted.to_string(),
                (s.transfer_failures + s.transform_failures).to_string(),
                format!("{} ms", s.duration_ms),
            ),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };
        table.add_row(vec![
            Cell::new(&report.source),
            status,
            Cell::new(report.artifacts.len()),
            Cell::new(new),
            Cell::new(evicted),
            Cell::new(failures),
            Cell::new(duration),
        ]);
    }
    table
}

fn artifact_table(artifacts: &[Materialized]) -> Table {
    let mut table = create_table();
    table.set_header(header(&["Observation time (UTC)", "Location"]));
    for artifact in artifacts {
        table.add_row(vec![
            Cell::new(artifact.observation_time.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(artifact.derived_location.display()),
        ]);
    }
    table
}
