//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use sitequery_core::pipeline::{AnswerEngine, AnswerRequest, AnswerResponse, ProgressReporter};
use sitequery_shared::{AppConfig, config_file_path, init_config, load_config, load_config_from};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteQuery: answer questions about a website by crawling just enough of it.
#[derive(Parser)]
#[command(
    name = "sitequery",
    version,
    about = "Answer questions about a website from a small, question-driven crawl.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.sitequery/sitequery.toml.
    #[arg(long, global = true, env = "SITEQUERY_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Crawl from a URL and answer a question about it.
    Ask {
        /// Seed URL.
        url: String,

        /// The question to answer.
        question: String,

        /// Maximum link distance from the seed (0-10).
        #[arg(long)]
        max_depth: Option<u32>,

        /// Maximum pages to fetch (1-100).
        #[arg(long)]
        page_budget: Option<usize>,

        /// Maximum characters of assembled content (1000-100000).
        #[arg(long)]
        char_budget: Option<usize>,

        /// Overall deadline in seconds (10-300).
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Cap on relevance-ranked blocks before coverage repair.
        #[arg(long)]
        max_blocks: Option<usize>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show how a question would be planned, as JSON.
    Plan {
        /// The question to plan.
        question: String,
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
    /// Print the config file location.
    Path,
}

/// Limits given on the command line; each overrides the config file.
struct AskOverrides {
    max_depth: Option<u32>,
    page_budget: Option<usize>,
    char_budget: Option<usize>,
    timeout: Option<u64>,
    max_blocks: Option<usize>,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitequery=info",
        1 => "sitequery=debug",
        _ => "sitequery=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ask {
            url,
            question,
            max_depth,
            page_budget,
            char_budget,
            timeout,
            max_blocks,
            json,
        } => {
            let overrides = AskOverrides {
                max_depth,
                page_budget,
                char_budget,
                timeout,
                max_blocks,
            };
            cmd_ask(config_path, &url, &question, overrides, json).await
        }
        Command::Plan { question } => cmd_plan(&question),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
            ConfigAction::Path => cmd_config_path(config_path),
        },
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config_path: Option<PathBuf>,
    url: &str,
    question: &str,
    overrides: AskOverrides,
    json: bool,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if overrides.max_blocks.is_some() {
        config.assembly.max_blocks = overrides.max_blocks;
    }

    let parsed_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let mut request = AnswerRequest::from_config(parsed_url, question, &config.crawl);
    if let Some(depth) = overrides.max_depth {
        request.max_depth = depth;
    }
    if let Some(pages) = overrides.page_budget {
        request.page_budget = pages;
    }
    if let Some(chars) = overrides.char_budget {
        request.char_budget = chars;
    }
    if let Some(secs) = overrides.timeout {
        request.timeout = Duration::from_secs(secs);
    }

    info!(
        url,
        max_depth = request.max_depth,
        page_budget = request.page_budget,
        char_budget = request.char_budget,
        "answering question"
    );

    let reporter = CliProgress::new();
    let response = AnswerEngine::new(config).answer(&request, &reporter).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    if !response.success {
        let reason = response.error_message.as_deref().unwrap_or("unknown error");
        return Err(eyre!("could not answer the question: {reason}"));
    }
    Ok(())
}

fn print_response(response: &AnswerResponse) {
    let d = &response.diagnostics;
    println!();
    if !response.answer.is_empty() {
        println!("{}", response.answer);
        println!();
    }
    println!("  Pages:        {}", d.pages_visited);
    println!("  Blocks:       {} used of {} extracted", d.blocks_used, d.blocks_extracted);
    println!("  Bytes:        {}", d.bytes_fetched);
    if let Some(adapter) = &d.adapter_used {
        println!("  Adapter:      {adapter}");
    }
    let met: Vec<&str> = d.capabilities_met.iter().map(|c| c.as_str()).collect();
    if !met.is_empty() {
        println!("  Capabilities: {}", met.join(", "));
    }
    let capped: Vec<&str> = d
        .capped
        .iter()
        .filter(|(_, hit)| **hit)
        .map(|(name, _)| name.as_str())
        .collect();
    if !capped.is_empty() {
        println!("  Limits hit:   {}", capped.join(", "));
    }
    println!("  Time:         {:.1}s", d.latency_ms as f64 / 1000.0);
    println!();
}

fn cmd_plan(question: &str) -> Result<()> {
    let plan = sitequery_core::planner::plan(question);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn cmd_config_path(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => config_file_path()?,
    };
    println!("{}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, url: &str, current: usize, budget: usize) {
        self.spinner
            .set_message(format!("Fetched [{current}/{budget}] {url}"));
    }

    fn done(&self, _response: &AnswerResponse) {
        self.spinner.finish_and_clear();
    }
}
