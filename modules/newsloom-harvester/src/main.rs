use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newsloom_common::Config;
use newsloom_harvester::browser_pool::{BrowserPool, BrowserPoolConfig, RenderedFetcher};
use newsloom_harvester::cascade::{CascadeConfig, ExtractorCascade};
use newsloom_harvester::fetch::HttpFetcher;
use newsloom_harvester::orchestrator::Orchestrator;
use newsloom_harvester::proxy_pool::ProxyPool;
use newsloom_harvester::rate_limiter::RateLimiter;
use newsloom_harvester::report::RunReport;
use newsloom_harvester::seed_loader::load_seed_file;
use newsloom_store::StateStore;

#[derive(Parser, Debug)]
#[command(name = "newsloom-harvester", about = "News article corpus acquisition")]
struct Args {
    /// Path to the SQLite state store.
    #[arg(long, default_value = "newsloom.db")]
    db: PathBuf,

    /// Candidate URL CSV from the discovery stage. Omit to resume a run.
    #[arg(long)]
    seed_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("newsloom=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    config.log_summary();

    let store = StateStore::open(&args.db).await?;

    if let Some(path) = &args.seed_file {
        let records = load_seed_file(path)?;
        let inserted = store.seed(records).await?;
        info!(inserted, "Seeded candidate urls");
    }

    let proxies = match &config.proxy_source {
        Some(source) => Some(
            ProxyPool::load(
                store.clone(),
                std::path::Path::new(source),
                &config.proxy_validation_url,
                config.proxy_low_water,
            )
            .await?,
        ),
        None => None,
    };

    let browser = match &config.browserless_url {
        Some(base_url) => Some(Arc::new(BrowserPool::start(
            BrowserPoolConfig {
                size: config.browser_pool_size,
                base_url: base_url.clone(),
                token: config.browserless_token.clone(),
                timeout: Duration::from_secs(config.browser_timeout_seconds),
            },
            proxies.clone(),
        )?)),
        None => {
            info!("No rendering service configured; browser fallback disabled");
            None
        }
    };

    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let cascade = Arc::new(ExtractorCascade::new(
        fetcher,
        browser
            .clone()
            .map(|pool| pool as Arc<dyn RenderedFetcher>),
        CascadeConfig::from_config(&config),
    ));
    let limiter = Arc::new(RateLimiter::new(config.domain_delays()));
    let orchestrator = Orchestrator::new(store.clone(), limiter, cascade, &config);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = stop_tx.send(true);
        }
    });

    orchestrator.run(stop_rx).await?;

    if let Some(pool) = browser {
        pool.close();
    }

    let report = RunReport::build(&store).await?;
    info!("{report}");

    store.close().await;
    Ok(())
}
