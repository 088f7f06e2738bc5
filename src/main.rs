use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use swap_aggr::config::AppConfig;
use swap_aggr::control::VenueBreakers;
use swap_aggr::router::{create_api_router, Router};
use swap_aggr::venues::adapter::{HttpVenueAdapter, VenueAdapter, VenueRegistry};
use swap_aggr::venues::fetcher::QuoteFetcher;
use swap_aggr::venues::pricing::PriceFeed;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal router error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let app_config = AppConfig::load().context("load configuration from environment")?;
    let config = Arc::new(
        app_config
            .router_config()
            .context("build router configuration")?,
    );

    let http = reqwest::Client::builder()
        .timeout(config.venue_timeout + Duration::from_millis(500))
        .build()
        .context("build HTTP client")?;

    let baseline: Arc<dyn VenueAdapter> = Arc::new(HttpVenueAdapter::new(
        config.baseline.clone(),
        http.clone(),
    ));
    let venues: Vec<Arc<dyn VenueAdapter>> = config
        .venues
        .iter()
        .map(|def| {
            Arc::new(HttpVenueAdapter::new(def.clone(), http.clone())) as Arc<dyn VenueAdapter>
        })
        .collect();
    let registry = Arc::new(VenueRegistry::new(baseline, venues));

    let prices = Arc::new(PriceFeed::new(
        http,
        config.price_feed_endpoint.clone(),
        config.price_timeout,
    ));

    let fetcher = QuoteFetcher::new(
        Arc::clone(&registry),
        prices,
        VenueBreakers::new(),
        Arc::clone(&config),
    );
    let router = Arc::new(Router::new(fetcher, Arc::clone(&config)));

    let listen_addr: std::net::SocketAddr = app_config
        .listen_addr
        .as_deref()
        .unwrap_or("0.0.0.0:8080")
        .parse()
        .context("parse listen address")?;

    info!(
        address = %listen_addr,
        baseline = %config.baseline.name,
        venues = registry.venues.len(),
        "swap router online"
    );

    let api_router = create_api_router(Arc::clone(&router));
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("bind API server address {listen_addr}"))?;
    let _api_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, api_router).await {
            warn!(error = %err, "API server error");
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!(
                    max_inflight = config.max_inflight,
                    venues = registry.venues.len(),
                    "router heartbeat"
                );
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = %err, "ctrl_c listener error");
                }
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
