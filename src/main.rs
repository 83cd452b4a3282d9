use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use textpipe::builder;
use textpipe::config::Config;
use textpipe::output;
use textpipe::pipeline::Extractor;
use textpipe::util::require_scheme_and_host;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Get the config file path (~/.config/textpipe/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("textpipe")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "textpipe",
    about = "Turns feed articles into clean text with a reliable two-phase fetch"
)]
struct Args {
    /// Config file (default: ~/.config/textpipe/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Retries per request on transient errors
    #[arg(long, global = true, value_name = "N")]
    max_retries: Option<u32>,

    /// Debug logging and article previews
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed and extract the text of every article it links to
    Scrape {
        /// Feed URL (RSS/Atom/JSON Feed)
        #[arg(short, long)]
        url: Option<String>,

        /// Maximum simultaneous extractions
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Print the run as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract the main text of a single page
    Extract {
        /// Page URL
        #[arg(short, long)]
        url: String,

        /// Write text here instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output_file: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }

    Ok(config)
}

async fn run_scrape(
    mut config: Config,
    url: Option<String>,
    concurrency: Option<usize>,
    json: bool,
    verbose: bool,
) -> Result<()> {
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }
    let feed_url = url.unwrap_or_else(|| config.feed_url.clone());

    let runner = builder::build_runner(&config).context("Failed to set up scraper")?;
    let runner_config = config.runner_config(&feed_url);

    let result = runner
        .scrape_and_run(&CancellationToken::new(), &runner_config)
        .await
        .context("Scrape run failed")?;

    let mut stdout = std::io::stdout().lock();
    if json {
        output::print_json(&mut stdout, &result).context("Failed to write JSON")?;
    } else {
        let summary = output::print_scrape_report(&mut stdout, &result, verbose)
            .context("Failed to write results")?;
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Scrape complete"
        );
    }

    Ok(())
}

async fn run_extract(config: Config, url: String, output_file: Option<PathBuf>) -> Result<()> {
    require_scheme_and_host(&url)
        .with_context(|| format!("Invalid URL '{}': a scheme and host are required", url))?;

    let client = builder::http_client(config.client_timeout())?;
    let extractor =
        builder::build_extractor(client, &config).context("Failed to set up extractor")?;

    // A single extraction gets the client timeout as its whole budget
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let deadline = cancel.clone();
    let timeout = config.client_timeout();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        deadline.cancel();
    });

    tracing::info!(url = %url, timeout_secs = timeout.as_secs(), "Starting extraction");

    let extraction = extractor
        .fetch_and_extract_text(&cancel, &url)
        .await
        .with_context(|| format!("Content extraction failed for {}", url))?;

    if !extraction.body_found {
        if extraction.text.trim().is_empty() {
            tracing::warn!(url = %url, "No body, title or metadata could be extracted");
        } else {
            tracing::warn!(
                url = %url,
                metadata = %extraction.text,
                "No article body found, only metadata was extracted"
            );
        }
        return Ok(());
    }

    output::write_extraction(output_file.as_deref(), &extraction.text)
        .context("Failed to write extracted text")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(&args)?;
    tracing::debug!(?config, "Effective configuration");

    match args.command {
        Command::Scrape {
            url,
            concurrency,
            json,
        } => run_scrape(config, url, concurrency, json, args.verbose).await,
        Command::Extract { url, output_file } => run_extract(config, url, output_file).await,
    }
}
