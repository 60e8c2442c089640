//! Leadify CLI - Command-line interface for the research engine
//!
//! Runs single assignments, watches a drop directory for unattended
//! overnight operation, and manages configuration.

mod report;
mod watch;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use leadify_core::{
    init_logging, log_operation_start, log_operation_success, Assignment, LeadifyConfig,
    LoggingConfig,
};
use leadify_engine::{
    control_channel, CheckpointStore, ControlHandle, OrchestratorOptions, ResearchOrchestrator,
    ResearchStatus,
};
use leadify_llm::LeadifyLlmClient;
use leadify_web::{BraveSearchClient, HttpPageFetcher};
use report::ReportStyle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "leadify")]
#[command(about = "Unattended web research: assignments in, categorized lead reports out")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single research assignment to completion
    Run {
        /// Assignment file (TOML with an [assignment] table)
        assignment: PathBuf,

        /// Report style
        #[arg(long, value_enum, default_value_t = ReportStyle::Bullets)]
        style: ReportStyle,

        /// Discard any existing checkpoint and start over
        #[arg(long)]
        fresh: bool,
    },

    /// Watch a directory for dropped assignment files
    Watch {
        /// Override the configured input directory
        #[arg(long)]
        input: Option<PathBuf>,

        /// Override the configured output directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Poll interval in seconds
        #[arg(long, default_value = "30")]
        interval: u64,

        /// Report style
        #[arg(long, value_enum, default_value_t = ReportStyle::Bullets)]
        style: ReportStyle,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::default();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Leadify v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            assignment,
            style,
            fresh,
        } => handle_run(assignment, style, fresh, &config).await,
        Commands::Watch {
            input,
            output,
            interval,
            style,
        } => handle_watch(input, output, interval, style, config).await,
        Commands::Config {
            show,
            init,
            validate,
        } => handle_config(show, init, validate, cli.config.as_deref(), &config),
    }
}

/// Locate and load configuration: explicit flag, ./leadify.toml, then the
/// user config directory, then built-in defaults.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<LeadifyConfig> {
    if let Some(path) = explicit {
        return LeadifyConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }

    let local = Path::new("leadify.toml");
    if local.exists() {
        return LeadifyConfig::from_file(local).context("failed to load ./leadify.toml");
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("leadify/config.toml");
        if user.exists() {
            return LeadifyConfig::from_file(&user)
                .with_context(|| format!("failed to load {}", user.display()));
        }
    }

    info!("No configuration file found, using defaults");
    Ok(LeadifyConfig::default())
}

/// Build the engine over the production collaborators
async fn build_orchestrator(
    config: &LeadifyConfig,
) -> anyhow::Result<(ResearchOrchestrator, ControlHandle)> {
    let mut llm_config = config.llm.clone();
    if llm_config.api_key.is_none() {
        llm_config.api_key = std::env::var("LEADIFY_LLM_API_KEY").ok();
    }
    let llm = Arc::new(
        LeadifyLlmClient::new(llm_config)
            .await
            .context("failed to create LLM client")?,
    );

    let mut search_config = config.search.clone();
    if search_config.api_key.is_none() {
        search_config.api_key = std::env::var("BRAVE_API_KEY").ok();
    }
    let search = Arc::new(
        BraveSearchClient::new(search_config).context("failed to create search client")?,
    );

    let fetcher =
        Arc::new(HttpPageFetcher::new(&config.fetch).context("failed to create page fetcher")?);

    let checkpoints = CheckpointStore::new(&config.storage.checkpoint_dir)
        .context("failed to open checkpoint store")?;

    let (handle, control) = control_channel();
    let orchestrator = ResearchOrchestrator::new(
        llm,
        search,
        fetcher,
        OrchestratorOptions::from_config(config),
        checkpoints,
        control,
    )?;

    Ok((orchestrator, handle))
}

/// Run one assignment, render its report, and print where it landed
async fn run_assignment(
    assignment: Assignment,
    config: &LeadifyConfig,
    output_dir: &Path,
    style: ReportStyle,
) -> anyhow::Result<PathBuf> {
    let (mut orchestrator, handle) = build_orchestrator(config).await?;

    // Ctrl-C aborts at the next safe boundary; the checkpoint survives.
    let abort_handle = handle.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, aborting at next safe boundary");
            abort_handle.abort();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static spinner template"),
    );
    spinner.set_message(format!("Researching: {}", assignment.objective));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = orchestrator.run(assignment).await;
    ctrl_c.abort();
    spinner.finish_and_clear();

    let outcome = outcome?;
    info!(
        status = %outcome.status,
        cycles = outcome.cycles_run,
        entities = outcome.snapshot.total_entities(),
        "Run finished"
    );

    if outcome.status == ResearchStatus::Aborted {
        println!(
            "Run aborted after {} cycle(s); progress is checkpointed and will resume next run.",
            outcome.cycles_run
        );
    }

    watch::deliver_report(&outcome.snapshot, output_dir, style)
}

async fn handle_run(
    assignment_path: PathBuf,
    style: ReportStyle,
    fresh: bool,
    config: &LeadifyConfig,
) -> anyhow::Result<()> {
    let assignment = Assignment::from_file(&assignment_path)
        .with_context(|| format!("failed to load {}", assignment_path.display()))?;
    log_operation_start!("run_assignment", objective = %assignment.objective);

    if fresh {
        let checkpoints = CheckpointStore::new(&config.storage.checkpoint_dir)?;
        checkpoints.remove(&assignment.signature()).await?;
        info!("Discarded existing checkpoint");
    }

    let output_dir = PathBuf::from(&config.storage.output_dir);
    let report_path = run_assignment(assignment, config, &output_dir, style).await?;

    log_operation_success!("run_assignment", report = %report_path.display());
    println!("Report written to {}", report_path.display());
    Ok(())
}

async fn handle_watch(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    interval: u64,
    style: ReportStyle,
    config: LeadifyConfig,
) -> anyhow::Result<()> {
    let settings = watch::WatchSettings {
        input_dir: input.unwrap_or_else(|| PathBuf::from(&config.storage.input_dir)),
        output_dir: output.unwrap_or_else(|| PathBuf::from(&config.storage.output_dir)),
        poll_interval: Duration::from_secs(interval.max(1)),
        style,
    };

    let run_style = settings.style;
    watch::watch_loop(settings, |assignment, output_dir| {
        let config = config.clone();
        async move { run_assignment(assignment, &config, &output_dir, run_style).await }
    })
    .await
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    explicit_path: Option<&Path>,
    config: &LeadifyConfig,
) -> anyhow::Result<()> {
    if init {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("leadify.toml"));
        if path.exists() {
            anyhow::bail!("{} already exists, refusing to overwrite", path.display());
        }
        LeadifyConfig::default().save_to_file(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    if validate {
        config.validate()?;
        println!("Configuration is valid.");
        return Ok(());
    }

    if show {
        println!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Use --show, --init or --validate.");
    Ok(())
}
