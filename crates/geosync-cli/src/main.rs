//! Command-line interface for `geosync`, the county GIS batch pipeline runner.
//!
//! The binary parses arguments, configures logging and delegates to
//! [`geosync_core`]. Library code logs through the `log` facade; this binary
//! bridges it into [`tracing`] so `-v` and `-d` control what reaches stderr.
//! Pipeline progress always goes to the run log named in the pipeline file.
//!
//! # Available Commands
//!
//! - `run` - Execute every stage of a pipeline file
//! - `validate` - Check a pipeline file without touching any workspace
//! - `info` - Display the schema and row count of a dataset
//! - `drivers` - List storage drivers and their capabilities
//! - `tables` - List the lookup tables a pipeline can use
//! - `translate` - Translate a value through a lookup table
//! - `geocode` - Match addresses against a built locator

mod display;

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geosync_core::config::PipelineConfig;
use geosync_core::geocode::{
    AddressNormalizer, MATCH_ADDR_FIELD, SCORE_FIELD, STATUS_FIELD, X_FIELD, Y_FIELD,
    address_table, geocode,
};
use geosync_core::locator::LocatorStore;
use geosync_core::runlog::RUN_TARGET;
use geosync_core::tables::shipped_tables;
use geosync_core::translate::LookupTables;
use geosync_core::types::describe_dataset;
use geosync_core_common::storage_drivers;
use geosync_geojson::GeoJsonWorkspace;

use display::MatchRow;

#[derive(Parser)]
#[command(
    name = "geosync",
    version,
    about = "Batch replication and derivation pipelines for county GIS workspaces"
)]
/// Command-line arguments and options for the `geosync` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs every stage of a pipeline file.
    ///
    /// Exits non-zero when a stage aborts the run or when any stage failed.
    Run {
        /// Path to the pipeline YAML file.
        #[arg(value_name = "PIPELINE")]
        pipeline: PathBuf,
    },

    /// Checks a pipeline file without opening workspaces or the run log.
    Validate {
        #[arg(value_name = "PIPELINE")]
        pipeline: PathBuf,
    },

    /// Displays the schema and row count of a dataset in a `GeoJSON` workspace.
    Info {
        /// Workspace directory.
        #[arg(value_name = "WORKSPACE_DIR")]
        workspace: PathBuf,

        /// Dataset name inside the workspace.
        #[arg(value_name = "DATASET")]
        dataset: String,
    },

    /// Lists all storage drivers and their capabilities.
    Drivers,

    /// Lists lookup tables, including those defined in a pipeline file.
    Tables {
        /// Also load tables from this pipeline file.
        #[arg(short, long, value_name = "PIPELINE")]
        pipeline: Option<PathBuf>,
    },

    /// Translates one value through a lookup table.
    Translate {
        /// Lookup table name.
        #[arg(value_name = "TABLE")]
        table: String,

        /// Code to translate; omit to translate a null value.
        #[arg(value_name = "VALUE")]
        value: Option<String>,

        /// Print every code and label instead.
        #[arg(short, long)]
        list: bool,

        /// Also load tables from this pipeline file.
        #[arg(short, long, value_name = "PIPELINE")]
        pipeline: Option<PathBuf>,
    },

    /// Matches addresses against a built locator.
    Geocode {
        /// Directory holding built locators.
        #[arg(long, value_name = "DIR")]
        locator_dir: PathBuf,

        /// Locator name.
        #[arg(short, long)]
        locator: String,

        /// Addresses to match.
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,
    },
}

/// Entry point for the `geosync` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(console_directives(log_level)))
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { pipeline } => handle_run(&pipeline).await?,
        Commands::Validate { pipeline } => handle_validate(&pipeline)?,
        Commands::Info { workspace, dataset } => handle_info(&workspace, &dataset).await?,
        Commands::Drivers => display::display_drivers(storage_drivers()),
        Commands::Tables { pipeline } => {
            let tables = load_tables(pipeline.as_deref())?;
            display::display_lookup_tables(tables.iter());
        },
        Commands::Translate {
            table,
            value,
            list,
            pipeline,
        } => handle_translate(&table, value.as_deref(), list, pipeline.as_deref())?,
        Commands::Geocode {
            locator_dir,
            locator,
            addresses,
        } => handle_geocode(&locator_dir, &locator, &addresses)?,
    }

    Ok(())
}

/// Filter directives: `log_level` everywhere, and at least INFO for run log
/// lines so stage progress reaches the console.
fn console_directives(log_level: Level) -> String {
    let run_level = log_level.max(Level::INFO);
    format!(
        "{},{RUN_TARGET}={}",
        log_level.as_str().to_ascii_lowercase(),
        run_level.as_str().to_ascii_lowercase()
    )
}

fn load_pipeline(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load(path).map_err(|e| anyhow!(e.user_message()))
}

async fn handle_run(path: &Path) -> Result<()> {
    let config = load_pipeline(path)?;
    info!("Running pipeline '{}' from {}", config.name, path.display());
    let pipeline = config.build().map_err(|e| {
        if let Some(hint) = e.recovery_suggestion() {
            error!("{hint}");
        }
        anyhow!(e.user_message())
    })?;

    match pipeline.run().await {
        Ok(summary) => {
            display::display_summary(&summary);
            let failed = summary.failed_stages();
            if failed.is_empty() {
                Ok(())
            } else {
                Err(anyhow!(
                    "{} stage(s) failed; see {}",
                    failed.len(),
                    pipeline.context.log.path().display()
                ))
            }
        },
        Err(aborted) => {
            display::display_summary(&aborted.summary);
            if let Some(hint) = aborted.source.recovery_suggestion() {
                eprintln!("Suggestion: {hint}");
            }
            Err(anyhow!(
                "Stage '{}' aborted at '{}': {}",
                aborted.stage,
                aborted.step,
                aborted.source.user_message()
            ))
        },
    }
}

fn handle_validate(path: &Path) -> Result<()> {
    let config = load_pipeline(path)?;
    config.validate().map_err(|e| anyhow!(e.user_message()))?;
    let steps: usize = config.stages.iter().map(|s| s.steps.len()).sum();
    println!(
        "Pipeline '{}' is valid: {} stage(s), {steps} step(s)",
        config.name,
        config.stages.len()
    );
    Ok(())
}

async fn handle_info(dir: &Path, dataset: &str) -> Result<()> {
    let name = dir
        .file_name()
        .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());
    let workspace = GeoJsonWorkspace::open(name, dir)?;
    let info = describe_dataset(&workspace, dataset)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    display::display_dataset_info(&info);
    Ok(())
}

fn load_tables(pipeline: Option<&Path>) -> Result<LookupTables> {
    match pipeline {
        Some(path) => load_pipeline(path)?
            .lookup_tables()
            .map_err(|e| anyhow!(e.user_message())),
        None => Ok(shipped_tables()?),
    }
}

fn handle_translate(
    table: &str,
    value: Option<&str>,
    list: bool,
    pipeline: Option<&Path>,
) -> Result<()> {
    let tables = load_tables(pipeline)?;
    let table = tables.get(table)?;
    if list {
        display::display_code_table(table);
    } else {
        println!("{}", table.translate_str(value).unwrap_or_default());
    }
    Ok(())
}

fn handle_geocode(dir: &Path, locator: &str, addresses: &[String]) -> Result<()> {
    const ADDRESS_FIELD: &str = "ADDRESS";

    let store = LocatorStore::new(dir);
    let locator = store.load(locator).map_err(|e| anyhow!(e.user_message()))?;
    let normalizer = AddressNormalizer::standard()?;
    let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let input = address_table(ADDRESS_FIELD, &refs)?;
    let result = geocode(&input, &locator, &[ADDRESS_FIELD.to_string()], &normalizer)?;

    let rows = result
        .features
        .iter()
        .map(|f| MatchRow {
            address: display::cell(f.get(ADDRESS_FIELD)),
            status: display::cell(f.get(STATUS_FIELD)),
            score: display::cell(f.get(SCORE_FIELD)),
            matched: display::cell(f.get(MATCH_ADDR_FIELD)),
            x: display::cell(f.get(X_FIELD)),
            y: display::cell(f.get(Y_FIELD)),
        })
        .collect();
    display::display_matches(rows);
    Ok(())
}
