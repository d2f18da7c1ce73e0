//! # pagekeep CLI
//!
//! Command-line front end for the crawl-and-cache pipeline.
//!
//! - `obtain`: Fetch one or more URLs, serving fresh copies from the store
//! - `list`: Show stored pages with optional URL and title filters
//! - `export`: Write clean JSON for stored pages by id
//! - `serve`: Run the HTTP API
//!
//! Settings come from a JSON config file (`--config`, default
//! `pagekeep.json`, optional) and can be overridden by flags.

mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagekeep::crawler::{
    CrawlOrchestrator, CrawlerConfig, CrawlerConfigBuilder, HttpRenderer, Obtained,
};
use pagekeep::store::{PageFilter, PageStore};
use tracing::{info, instrument, warn};

type Orchestrator = CrawlOrchestrator<HttpRenderer>;

#[derive(Parser)]
#[command(author, version, about = "Fetch, clean and cache web pages", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "pagekeep.json")]
    config: PathBuf,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Days a stored page stays fresh (overrides the config file)
    #[arg(long, global = true)]
    threshold_days: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Obtain pages, acquiring them only when missing or stale
    Obtain(ObtainArgs),

    /// List stored pages
    List(ListArgs),

    /// Export stored pages as clean JSON
    Export(ExportArgs),

    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ObtainArgs {
    /// URLs to obtain
    #[arg(required = true)]
    urls: Vec<String>,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Only pages whose URL contains this text
    #[arg(short, long)]
    url: Option<String>,

    /// Only pages whose title contains this text
    #[arg(short, long)]
    title: Option<String>,

    /// Page number, starting at 1
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Results per page
    #[arg(long, default_value = "10")]
    per_page: u32,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Page ids to export
    #[arg(required = true)]
    ids: Vec<i64>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(short, long, default_value = "5000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder =
        CrawlerConfigBuilder::from_config(CrawlerConfig::read_or_default(&cli.config).await?);
    if let Some(database) = &cli.database {
        builder = builder.database_path(database.clone());
    }
    if let Some(threshold_days) = cli.threshold_days {
        builder = builder.threshold_days(threshold_days);
    }
    let config = builder.build();
    config.validate()?;

    let _logging = telemetry::init_logging(&config.log_dir)?;

    let store = PageStore::open(&config.database_path).await?;
    let renderer = HttpRenderer::new(config.user_agent.clone());
    let orchestrator = Arc::new(CrawlOrchestrator::new(store, renderer, config));

    let result = match cli.command {
        Commands::Serve(args) => serve_command(orchestrator.clone(), cli.config, args).await,
        command => {
            tokio::select! {
                result = run_command(&orchestrator, command) => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted");
                    Err(anyhow!("interrupted"))
                }
            }
        }
    };

    orchestrator.shutdown().await;
    result
}

async fn run_command(orchestrator: &Orchestrator, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Obtain(args) => obtain_command(orchestrator, args).await,
        Commands::List(args) => list_command(orchestrator, args).await,
        Commands::Export(args) => export_command(orchestrator, args).await,
        Commands::Serve(_) => Err(anyhow!("serve is handled separately")),
    }
}

#[instrument(skip(orchestrator))]
async fn obtain_command(orchestrator: &Orchestrator, args: ObtainArgs) -> anyhow::Result<()> {
    let progress_bar = if args.urls.len() > 1 {
        let progress_bar = ProgressBar::new(args.urls.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("##-"),
        );
        progress_bar
    } else {
        ProgressBar::hidden()
    };

    let mut obtained: Vec<Obtained> = Vec::new();
    let mut failures = 0;

    for url in &args.urls {
        progress_bar.set_message(url.clone());
        match orchestrator.obtain(url).await {
            Ok(page) => {
                if args.format == "text" {
                    progress_bar.println(format!(
                        "{} - {} ({})",
                        page.record.url,
                        page.record.title,
                        if page.served_from_cache { "cached" } else { "fetched" }
                    ));
                }
                obtained.push(page);
            }
            Err(e) => {
                failures += 1;
                progress_bar.println(format!("{} - failed: {}", url, e));
            }
        }
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    if args.format == "json" {
        let records: Vec<_> = obtained
            .iter()
            .map(|page| {
                serde_json::json!({
                    "id": page.record.id,
                    "url": page.record.url,
                    "title": page.record.title,
                    "description": page.record.description,
                    "content": page.record.content,
                    "last_refreshed_at": page.record.last_refreshed_at,
                    "cached": page.served_from_cache,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    }

    if failures > 0 {
        return Err(anyhow!(
            "{} of {} pages could not be obtained",
            failures,
            args.urls.len()
        ));
    }
    Ok(())
}

#[instrument(skip(orchestrator))]
async fn list_command(orchestrator: &Orchestrator, args: ListArgs) -> anyhow::Result<()> {
    let filter = PageFilter {
        url_contains: args.url,
        title_contains: args.title,
    };
    let listing = orchestrator
        .store()
        .list(&filter, args.page, args.per_page)
        .await?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            println!(
                "Stored pages: {} (page {} of {})",
                listing.total_count,
                listing.page,
                listing.total_pages.max(1)
            );
            for record in &listing.records {
                println!(
                    "{:>6}  {}  {} - {}",
                    record.id,
                    record.last_refreshed_at.format("%Y-%m-%d %H:%M:%S"),
                    record.url,
                    record.title
                );
            }
        }
    }

    Ok(())
}

#[instrument(skip(orchestrator))]
async fn export_command(orchestrator: &Orchestrator, args: ExportArgs) -> anyhow::Result<()> {
    let pages = orchestrator.store().export_clean(&args.ids).await?;
    if pages.len() < args.ids.len() {
        warn!(
            "{} of {} requested ids were not found",
            args.ids.len() - pages.len(),
            args.ids.len()
        );
    }

    let json = serde_json::to_string_pretty(&pages)?;
    match args.output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            println!("Exported {} pages to {}", pages.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

#[instrument(skip(orchestrator))]
async fn serve_command(
    orchestrator: Arc<Orchestrator>,
    config_path: PathBuf,
    args: ServeArgs,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        // SIGHUP re-reads the config file without restarting
        let mut hangup = signal(SignalKind::hangup())?;
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                match orchestrator.reload_config(&config_path).await {
                    Ok(()) => info!("Configuration reloaded"),
                    Err(e) => warn!("Failed to reload configuration: {}", e),
                }
            }
        });
    }
    #[cfg(not(unix))]
    let _ = config_path;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown requested");
    };

    pagekeep::api::serve(orchestrator, addr, shutdown).await?;
    Ok(())
}
