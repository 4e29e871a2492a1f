use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobscout_client::{ReqwestTransport, SiteFactory};
use jobscout_core::{JobRecord, Pipeline, RunSummary, ScrapeConfig};

#[derive(Parser)]
#[command(name = "jobscout", version, about = "Job listing scraper for Indeed and LinkedIn")]
struct Cli {
    /// Log level for jobscout crates (overrides RUST_LOG)
    #[arg(long, global = true, env = "JOBSCOUT_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every query in a config file and export the records
    Scrape {
        /// Path to the JSON config file
        #[arg(short = 'i', long, env = "JOBSCOUT_CONFIG")]
        config: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long, env = "JOBSCOUT_OUTPUT")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Proxy URLs, replacing the ones in the config file
        #[arg(long, env = "JOBSCOUT_PROXIES", value_delimiter = ',')]
        proxy: Vec<String>,
    },

    /// Validate a config file and list the crawl runs it expands to
    Targets {
        /// Path to the JSON config file
        #[arg(short = 'i', long, env = "JOBSCOUT_CONFIG")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(format!("jobscout={level}"))
            .with_context(|| format!("Invalid log level: {level}"))?,
        None => EnvFilter::from_default_env().add_directive("jobscout=info".parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scrape {
            config,
            output,
            format,
            proxy,
        } => {
            let mut config = load_config(&config)?;
            if !proxy.is_empty() {
                config.proxies = proxy;
            }
            cmd_scrape(&config, output.as_deref(), format).await?;
        }
        Commands::Targets { config } => {
            let config = load_config(&config)?;
            cmd_targets(&config)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<ScrapeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    ScrapeConfig::from_json(&raw)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

async fn cmd_scrape(config: &ScrapeConfig, output: Option<&Path>, format: Format) -> Result<()> {
    let transport = ReqwestTransport::new(config.user_agent(), config.timeout())
        .with_endpoints(&config.proxy_endpoints())
        .context("Failed to create HTTP clients")?;
    let factory = SiteFactory::new().context("Failed to build site adapters")?;
    let pipeline = Pipeline::from_config(transport, factory, config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping crawl");
            ctrl_c.cancel();
        }
    });

    let mut run = pipeline.run(config, cancel)?;
    let mut records = Vec::new();
    while let Some(record) = run.next().await {
        tracing::debug!(title = %record.title, company = %record.company, source = %record.source, "Record");
        records.push(record);
    }
    let summary = run.finish().await;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_records(&records, format, BufWriter::new(file))?;
            tracing::info!(records = records.len(), path = %path.display(), "Records written");
        }
        None => write_records(&records, format, io::stdout().lock())?,
    }

    print_summary(&summary)?;

    if let Some(err) = summary.fatal {
        anyhow::bail!("Scrape aborted: {err}");
    }
    Ok(())
}

fn cmd_targets(config: &ScrapeConfig) -> Result<()> {
    let targets = config.targets()?;
    for target in &targets {
        println!(
            "{:<8} {} @ {} (max {})",
            target.source.as_str(),
            target.query.keywords,
            target.query.location,
            target.query.max_results
        );
    }
    println!("\nTotal: {} crawl runs", targets.len());
    Ok(())
}

/// Write `records` as a pretty JSON array or as CSV with a header row.
fn write_records<W: Write>(records: &[JobRecord], format: Format, mut writer: W) -> Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut writer, records)?;
            writeln!(writer)?;
        }
        Format::Csv => {
            let mut csv = csv::Writer::from_writer(&mut writer);
            for record in records {
                csv.serialize(record)?;
            }
            csv.flush()?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    Ok(())
}
