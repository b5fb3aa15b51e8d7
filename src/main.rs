use anyhow::Result;
use backoff::ExponentialBackoff;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mangapipe::error::ErrorKind;
use mangapipe::{BinaryResult, Config, HttpFetcher, Page, Priority, Scraper, Series, SiteRegistry};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mangapipe")]
#[command(about = "Composable manga catalog extraction with a bounded image pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List configured sites and their composed capabilities
    Sites,
    /// Fetch a series by URL
    Series { url: String },
    /// Fetch the series list of a site
    List { site: String },
    /// Fetch the chapters of a series
    Chapters { series_url: String },
    /// List the pages of one chapter
    Pages { series_url: String, chapter_id: String },
    /// Download every page image of a chapter and report what came back
    Download {
        series_url: String,
        chapter_id: String,
        /// Pool priority for the downloads
        #[arg(short, long, default_value = "5")]
        priority: i32,
        /// Retries per image on network failures
        #[arg(short, long, default_value = "2")]
        retries: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Init { force } => run_init(&cli.config, force)?,
        Commands::Sites => show_sites(&load_registry(&cli.config)?, cli.json)?,
        Commands::Series { url } => {
            let registry = load_registry(&cli.config)?;
            let (_, series) = resolve_series(&registry, &url).await?;
            print_rows(cli.json, &[series], |s| vec![s.id.clone(), s.title.clone()])?;
        }
        Commands::List { site } => {
            let registry = load_registry(&cli.config)?;
            let scraper = registry.require(&site)?;
            info!("Fetching series list of {}", scraper.info().label);
            let list = scraper.fetch_series_list(&scraper.catalog()).await?;
            print_rows(cli.json, &list, |s| vec![s.id.clone(), s.title.clone()])?;
        }
        Commands::Chapters { series_url } => {
            let registry = load_registry(&cli.config)?;
            let (scraper, series) = resolve_series(&registry, &series_url).await?;
            let chapters = scraper.fetch_chapters(&series).await?;
            print_rows(cli.json, &chapters, |c| vec![c.id.clone(), c.title.clone()])?;
        }
        Commands::Pages { series_url, chapter_id } => {
            let registry = load_registry(&cli.config)?;
            let (scraper, pages) = resolve_pages(&registry, &series_url, &chapter_id).await?;
            info!("{} pages on {}", pages.len(), scraper.info().label);
            print_rows(cli.json, &pages, |p| vec![p.url.to_string(), p.parameters.referer.clone()])?;
        }
        Commands::Download { series_url, chapter_id, priority, retries } => {
            let registry = load_registry(&cli.config)?;
            run_download(&registry, &series_url, &chapter_id, Priority(priority), retries, cli.json).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("mangapipe={}", level))
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();

    Ok(())
}

fn load_registry(path: &str) -> Result<SiteRegistry> {
    let config = Config::load(path)?;
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    Ok(SiteRegistry::from_config(&config, fetcher)?)
}

fn run_init(path: &str, force: bool) -> Result<()> {
    if Path::new(path).exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite it", path);
    }
    Config::default().save(path)?;
    info!("Wrote default configuration to {}", path);
    Ok(())
}

fn show_sites(registry: &SiteRegistry, json: bool) -> Result<()> {
    let infos: Vec<_> = registry.sites().map(|s| s.info().clone()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("{:<12} {:<20} {:<32} {}", "Site", "Label", "Base URL", "Capabilities");
    println!("{}", "-".repeat(100));
    for scraper in registry.sites() {
        let trail: Vec<_> = scraper.capabilities().iter().map(|a| a.name).collect();
        let info = scraper.info();
        println!("{:<12} {:<20} {:<32} {}", info.id, info.label, info.base_url.as_str(), trail.join(", "));
    }
    Ok(())
}

fn print_rows<T: Serialize>(json: bool, rows: &[T], columns: impl Fn(&T) -> Vec<String>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }
    for row in rows {
        let cols = columns(row);
        match cols.as_slice() {
            [first, rest @ ..] => println!("{:<48} {}", first, rest.join("  ")),
            [] => {}
        }
    }
    println!("{} rows", rows.len());
    Ok(())
}

async fn resolve_series<'a>(registry: &'a SiteRegistry, url: &str) -> Result<(&'a Scraper, Series)> {
    let scraper = registry
        .find_by_url(url)
        .ok_or_else(|| anyhow::anyhow!("No configured site accepts {}", url))?;
    let series = scraper.fetch_series(&scraper.catalog(), url).await?;
    Ok((scraper, series))
}

async fn resolve_pages<'a>(
    registry: &'a SiteRegistry,
    series_url: &str,
    chapter_id: &str,
) -> Result<(&'a Scraper, Vec<Page>)> {
    let (scraper, series) = resolve_series(registry, series_url).await?;
    let chapters = scraper.fetch_chapters(&series).await?;
    let chapter = chapters
        .into_iter()
        .find(|c| c.id == chapter_id)
        .ok_or_else(|| anyhow::anyhow!("Chapter '{}' not found in '{}'", chapter_id, series.title))?;
    let pages = scraper.fetch_pages(&chapter).await?;
    Ok((scraper, pages))
}

#[derive(Serialize)]
struct ImageRow {
    index: usize,
    url: String,
    content_type: Option<String>,
    bytes: Option<usize>,
    error: Option<String>,
}

async fn run_download(
    registry: &SiteRegistry,
    series_url: &str,
    chapter_id: &str,
    priority: Priority,
    retries: u32,
    json: bool,
) -> Result<()> {
    let (scraper, pages) = resolve_pages(registry, series_url, chapter_id).await?;
    let stats = registry.pool().stats();
    info!("Downloading {} pages (pool {}/{} running, {} queued)", pages.len(), stats.running, stats.concurrency, stats.queued);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling outstanding images");
                cancel.cancel();
            }
        }
    });

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"));

    let progress = &pb;
    let token = &cancel;
    let downloads = pages.iter().enumerate().map(move |(index, page)| {
        async move {
            let result = fetch_with_retry(scraper, page, priority, token, retries).await;
            progress.inc(1);
            (index, page, result)
        }
    });
    let results = futures::future::join_all(downloads).await;
    pb.finish_with_message(if cancel.is_cancelled() { "cancelled" } else { "done" });

    let rows: Vec<ImageRow> = results
        .into_iter()
        .map(|(index, page, result)| match result {
            Ok(image) => ImageRow {
                index: index + 1,
                url: page.url.to_string(),
                bytes: Some(image.len()),
                content_type: Some(image.content_type),
                error: None,
            },
            Err(e) => ImageRow {
                index: index + 1,
                url: page.url.to_string(),
                content_type: None,
                bytes: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<6} {:<26} {:<10} {}", "Page", "Content-Type", "Bytes", "URL");
    println!("{}", "-".repeat(90));
    for row in &rows {
        match &row.error {
            None => println!(
                "{:<6} {:<26} {:<10} {}",
                row.index,
                row.content_type.as_deref().unwrap_or("-"),
                row.bytes.unwrap_or(0),
                row.url
            ),
            Some(e) => println!("{:<6} {:<26} {:<10} {}", row.index, "ERROR", "-", e),
        }
    }
    Ok(())
}

/// Retries network failures with exponential backoff. Cancellation and every
/// other error kind are final.
async fn fetch_with_retry(
    scraper: &Scraper,
    page: &Page,
    priority: Priority,
    cancel: &CancellationToken,
    retries: u32,
) -> mangapipe::Result<BinaryResult> {
    let attempts = &AtomicU32::new(0);
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    backoff::future::retry(policy, move || async move {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        match scraper.fetch_image(page, priority, cancel.clone()).await {
            Ok(image) => Ok(image),
            Err(e) if e.kind() == ErrorKind::NetworkFailure && attempt < retries && !cancel.is_cancelled() => {
                warn!("Retrying {} after attempt {}: {}", page.url, attempt + 1, e);
                Err(backoff::Error::transient(e))
            }
            Err(e) => Err(backoff::Error::permanent(e)),
        }
    })
    .await
}
