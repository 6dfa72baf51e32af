//! Story-Harvest main entry point
//!
//! This is the command-line interface for the customer-story ingestion pipeline.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use story_harvest::classify::{Classifier, GeminiClassifier};
use story_harvest::config::{load_config_with_hash, Config};
use story_harvest::output::{print_statistics, print_summary_table};
use story_harvest::pipeline::{select_phases, Collaborators, Phase, PipelineRunner};
use tracing_subscriber::EnvFilter;

/// Exit code after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Story-Harvest: vendor customer-story ingestion
///
/// Discovers customer reference pages on vendor websites, scrapes them,
/// loads them into the graph store and classifies them with an LLM. Every
/// phase is idempotent and can be re-run after an interruption.
#[derive(Parser, Debug)]
#[command(name = "story-harvest")]
#[command(version)]
#[command(about = "Vendor customer-story ingestion pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, value_name = "PATH", default_value = "harvest.toml")]
    config: PathBuf,

    /// Vendors to process (comma-separated keys; all enabled vendors by default)
    #[arg(long, value_delimiter = ',')]
    vendors: Option<Vec<String>>,

    /// Phases to run (comma-separated, 1-4)
    #[arg(long, value_delimiter = ',')]
    phases: Option<Vec<Phase>>,

    /// Phases to skip (comma-separated, 1-4)
    #[arg(long, value_delimiter = ',')]
    skip_phases: Option<Vec<Phase>>,

    /// Report what would be done without writing files or graph rows
    #[arg(long, conflicts_with_all = ["stats", "reclassify"])]
    dry_run: bool,

    /// Re-process items already done
    #[arg(long)]
    force: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show graph statistics and exit
    #[arg(long, conflicts_with_all = ["reclassify", "cleanup_duplicates"])]
    stats: bool,

    /// Reset classification of stored references and exit
    #[arg(long, conflicts_with = "cleanup_duplicates")]
    reclassify: bool,

    /// Only reset references whose URL contains this substring
    #[arg(long, requires = "reclassify")]
    url_pattern: Option<String>,

    /// Delete duplicate reference nodes and exit (honors --dry-run)
    #[arg(long)]
    cleanup_duplicates: bool,
}

impl Cli {
    fn is_maintenance(&self) -> bool {
        self.stats || self.reclassify || self.cleanup_duplicates
    }

    /// Whether this invocation may call the classifier
    fn needs_classifier(&self) -> bool {
        !self.dry_run
            && !self.is_maintenance()
            && select_phases(self.phases.as_deref(), self.skip_phases.as_deref())
                .contains(&Phase::Classification)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("story_harvest=info,warn"),
            1 => EnvFilter::new("story_harvest=debug,info"),
            2 => EnvFilter::new("story_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let classifier = if cli.needs_classifier() {
        Some(build_classifier(&config)?)
    } else {
        None
    };

    let collaborators = Collaborators::from_config(&config, classifier)
        .context("failed to initialise the pipeline")?;
    let mut runner = PipelineRunner::new(config, collaborators);

    if cli.is_maintenance() {
        let outcome = handle_maintenance(&mut runner, &cli);
        runner.close()?;
        outcome?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.dry_run {
        tracing::info!("Dry run: nothing will be written");
    }

    let interrupted = tokio::select! {
        _ = runner.run_all_vendors(
            cli.vendors.as_deref(),
            cli.phases.as_deref(),
            cli.skip_phases.as_deref(),
            cli.force,
            cli.dry_run,
        ) => false,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, saving partial report");
            true
        }
    };

    let summary = runner.finish(&config_hash, cli.dry_run, interrupted)?;
    print_summary_table(&summary);
    runner.close()?;

    if interrupted {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    } else if summary.errors > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn build_classifier(config: &Config) -> anyhow::Result<Box<dyn Classifier>> {
    let api_key = GeminiClassifier::api_key_from_env(&config.classifier)?;
    let classifier = GeminiClassifier::new(&config.classifier, &api_key)?;
    tracing::info!("Classifier model: {}", config.classifier.model);
    Ok(Box::new(classifier))
}

/// Handles --stats, --reclassify and --cleanup-duplicates
fn handle_maintenance(runner: &mut PipelineRunner, cli: &Cli) -> anyhow::Result<()> {
    if cli.stats {
        let stats = runner.stats()?;
        print_statistics(&stats);
    } else if cli.reclassify {
        let reset = match cli.vendors.as_deref() {
            Some(keys) => {
                let mut total = 0;
                for key in keys {
                    total += runner.reset_classification(Some(key), cli.url_pattern.as_deref())?;
                }
                total
            }
            None => runner.reset_classification(None, cli.url_pattern.as_deref())?,
        };
        println!("✓ Reset classification of {} references", reset);
    } else if cli.cleanup_duplicates {
        let report = runner.cleanup_duplicates(cli.dry_run)?;
        println!("Duplicated URLs: {}", report.duplicate_urls);
        println!("Redundant nodes: {}", report.redundant_nodes);
        if report.dry_run {
            println!("✓ Dry run, nothing deleted");
        } else {
            println!("✓ Deleted {} nodes", report.deleted);
        }
    }
    Ok(())
}
