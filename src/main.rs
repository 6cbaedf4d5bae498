use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use listing_scout::config::Config;
use listing_scout::fetch::{ChromeLauncher, Driver, HttpClient};
use listing_scout::models::{RunContext, Source};
use listing_scout::pipeline;
use listing_scout::scrapers::{
    FundaSource, KamernetSource, ParariusSource, RoomSource, SourceAdapter,
};
use listing_scout::store::{schema, Store, LISTINGS};

#[derive(Debug, Parser)]
#[command(name = "listing-scout")]
#[command(about = "Collect rental listings and store them in SQLite")]
struct Cli {
    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// Only scrape these sources (repeatable); all of them by default
    #[arg(long = "source", value_enum)]
    sources: Vec<SourceArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Room,
    Kamernet,
    Pararius,
    Funda,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Room => Source::Room,
            SourceArg::Kamernet => Source::Kamernet,
            SourceArg::Pararius => Source::Pararius,
            SourceArg::Funda => Source::Funda,
        }
    }
}

async fn build_adapter(
    source: Source,
    config: &Config,
    headless: bool,
) -> Result<Box<dyn SourceAdapter>> {
    let mapping = config.mapping_path(source.name());
    let adapter: Box<dyn SourceAdapter> = match source {
        Source::Room => Box::new(RoomSource::new(HttpClient::new()?, &mapping)?),
        Source::Kamernet => Box::new(
            KamernetSource::new(HttpClient::new()?, config.search(), &mapping)?
                .with_page_delay(config.kamernet_page_delay()),
        ),
        Source::Pararius => {
            let driver = start_driver(config, headless).await?;
            Box::new(ParariusSource::new(driver, config.search()))
        }
        Source::Funda => {
            let driver = start_driver(config, headless).await?;
            Box::new(FundaSource::new(driver, config.search()))
        }
    };
    Ok(adapter)
}

async fn start_driver(config: &Config, headless: bool) -> Result<Driver> {
    let proxies = config.proxy_pool()?;
    let driver = Driver::start(ChromeLauncher, config.driver_options(headless), proxies)
        .await
        .context("Failed to start browser session")?;
    Ok(driver)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    info!("🏠 Listing Scout");
    info!("==========================================");

    let store = Store::new(&config.database_url);
    schema::ensure_schema(&store)
        .await
        .with_context(|| format!("Failed to prepare database {}", config.database_url))?;

    let sources: Vec<Source> = if cli.sources.is_empty() {
        Source::ALL.to_vec()
    } else {
        cli.sources.iter().copied().map(Source::from).collect()
    };

    let mut adapters = Vec::new();
    for source in sources {
        match build_adapter(source, &config, cli.headless).await {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => error!("❌ Could not set up {}: {:#}", source.name(), e),
        }
    }

    let ctx = RunContext::new(Local::now().naive_local());
    let rows = pipeline::collect(adapters, &ctx).await;
    info!("Collected {} rows in total", rows.len());

    let summary = store.upsert(&rows, &LISTINGS).await?;
    info!(
        "✅ Done: {} new listings, {} refreshed",
        summary.inserted, summary.updated
    );

    Ok(())
}
