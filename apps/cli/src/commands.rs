//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use newsmirror_core::{
    Pipeline, ProgressReporter, RunOutcome, RunReport, SilentProgress, Stage, load_snapshot,
};
use newsmirror_shared::{AppConfig, Dataset, init_config, load_config, load_config_from};
use newsmirror_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// newsmirror: mirror Hacker News rankings into a local document store.
#[derive(Parser)]
#[command(
    name = "newsmirror",
    version,
    about = "Reconcile a local mirror of Hacker News top and job stories against the live rankings.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.newsmirror/newsmirror.toml).
    #[arg(long, global = true, env = "NEWSMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one reconciliation per dataset, in the order given.
    Run {
        /// Dataset names: jobs, stories.
        #[arg(required = true)]
        datasets: Vec<String>,
    },

    /// Reconcile datasets on a fixed interval until interrupted.
    Watch {
        /// Seconds between rounds (defaults to schedule.interval_secs).
        #[arg(long)]
        interval: Option<u64>,

        /// Dataset names (defaults to all).
        datasets: Vec<String>,
    },

    /// Print stored items of a dataset in ranking order.
    List {
        /// Dataset name: jobs or stories.
        dataset: String,

        /// Maximum number of items to print.
        #[arg(short, long, default_value = "30")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "newsmirror=info",
        1 => "newsmirror=debug",
        _ => "newsmirror=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { datasets } => cmd_run(config_path, &datasets).await,
        Command::Watch { interval, datasets } => {
            cmd_watch(config_path, interval, &datasets).await
        }
        Command::List { dataset, limit } => cmd_list(config_path, &dataset, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = config.storage.resolved_db_path()?;
    info!(path = %db_path.display(), "opening document store");
    Ok(Storage::open(&db_path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Parse dataset names up front so a typo fails before any file is touched.
fn parse_datasets(names: &[String]) -> Result<Vec<Dataset>> {
    let datasets = names
        .iter()
        .map(|name| name.parse::<Dataset>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(datasets)
}

async fn cmd_run(config_path: Option<&Path>, datasets: &[String]) -> Result<()> {
    let datasets = parse_datasets(datasets)?;
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let pipeline = Pipeline::from_config(&config, storage)?;

    for dataset in datasets {
        let reporter = CliProgress::new();
        let report = pipeline.run(dataset.name(), &reporter).await;
        print_report(&report);
    }

    Ok(())
}

async fn cmd_watch(
    config_path: Option<&Path>,
    interval: Option<u64>,
    datasets: &[String],
) -> Result<()> {
    let datasets = if datasets.is_empty() {
        Dataset::ALL.to_vec()
    } else {
        parse_datasets(datasets)?
    };
    let config = resolve_config(config_path)?;

    let interval_secs = interval.unwrap_or(config.schedule.interval_secs);
    if interval_secs == 0 {
        return Err(eyre!("--interval must be > 0"));
    }

    let storage = open_storage(&config).await?;
    let pipeline = Pipeline::from_config(&config, storage)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let names: Vec<&str> = datasets.iter().map(|d| d.name()).collect();
    info!(interval_secs, datasets = names.join(","), "watching rankings");

    loop {
        if unless_interrupted(ticker.tick(), tokio::signal::ctrl_c())
            .await
            .is_none()
        {
            info!("interrupted, stopping watch");
            return Ok(());
        }

        // Datasets run one after another so rounds never overlap themselves.
        let round = async {
            for dataset in &datasets {
                let report = pipeline.run(dataset.name(), &SilentProgress).await;
                if let RunOutcome::Failed { stage, error } = &report.outcome {
                    warn!(%dataset, %stage, error = %error, "scheduled run failed");
                }
            }
        };
        if unless_interrupted(round, tokio::signal::ctrl_c())
            .await
            .is_none()
        {
            info!("interrupted mid-round, stopping watch");
            return Ok(());
        }
    }
}

/// Drive `work` to completion unless `shutdown` resolves first.
async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    shutdown: impl Future,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        _ = shutdown => None,
    }
}

async fn cmd_list(config_path: Option<&Path>, dataset: &str, limit: usize) -> Result<()> {
    let dataset: Dataset = dataset.parse()?;
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let snapshot = load_snapshot(&storage, dataset).await?;
    let mut items = snapshot.items;
    items.sort_by_key(|item| item.index);

    if items.is_empty() {
        println!("No {dataset} stored yet. Run `newsmirror run {dataset}` first.");
        return Ok(());
    }

    println!();
    for item in items.iter().take(limit) {
        let title = item.title.as_deref().unwrap_or("(untitled)");
        let points = item
            .points
            .map(|p| format!("{p} points, "))
            .unwrap_or_default();
        println!("  {:>3}. {title}  [{}]", item.index + 1, item.id);
        println!(
            "       {points}{} comments, by {}",
            item.comment_count,
            item.author.as_deref().unwrap_or("unknown")
        );
        println!("       {}", item.url);
    }
    println!();
    println!("  {} of {} items", items.len().min(limit), items.len());
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &RunReport) {
    println!();
    match &report.outcome {
        RunOutcome::Done => println!("  {}: done", report.dataset),
        RunOutcome::Failed { stage, error } => {
            println!("  {}: failed at {stage}: {error}", report.dataset);
            println!();
            return;
        }
    }

    let counts = &report.counts;
    println!("  Stored:   {}", counts.stored);
    println!("  Ranked:   {}", counts.fresh);
    for batch in &report.batches {
        let label = match batch.stage {
            Stage::Delete => "Deleted: ",
            Stage::Update => "Updated: ",
            Stage::Insert => "Inserted:",
            _ => "Batch:   ",
        };
        match &batch.result {
            Ok(applied) => println!("  {label} {applied}"),
            Err(e) => println!("  {label} 0 of {} (failed: {e})", batch.attempted),
        }
    }
    if !report.skipped.is_empty() {
        let ids: Vec<String> = report.skipped.iter().map(|s| s.id.to_string()).collect();
        println!("  Skipped:  {} ({})", ids.len(), ids.join(", "));
    }
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// Progress reporter
// ---------------------------------------------------------------------------

struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, dataset: &str, stage: Stage) {
        self.spinner.set_message(format!("{dataset}: {stage}"));
    }

    fn item_fetched(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching items [{current}/{total}]"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
