// Multi-venue quote fetcher
// Scatter-gather across the venue registry: one bounded-time request per
// venue, isolated failures, synthetic fallback quotes when no venue answers
// directly, and a stable integer-keyed sort of the surviving quotes.

use crate::config::RouterConfig;
use crate::control::VenueBreakers;
use crate::errors::RouterError;
use crate::metrics::{VENUE_ERRORS, VENUE_LATENCY};
use crate::venues::adapter::{QuoteRequest, VenueAdapter, VenueQuote, VenueRegistry};
use crate::venues::pricing::{synthesize_quote, UnitPriceSource};
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fan-in result of one fetch round. Quotes exclude the baseline and are
/// sorted by output amount descending.
#[derive(Debug, Clone)]
pub struct FetchedQuotes {
    pub baseline: Option<VenueQuote>,
    pub quotes: Vec<VenueQuote>,
    pub failed_venues: Vec<String>,
    pub total_latency_ms: u64,
}

impl FetchedQuotes {
    /// Highest-output quote across the baseline and all venues.
    pub fn best_quote(&self) -> Option<&VenueQuote> {
        let best_venue = self.quotes.first();
        match (&self.baseline, best_venue) {
            (Some(b), Some(v)) => Some(if v.output_amount > b.output_amount { v } else { b }),
            (Some(b), None) => Some(b),
            (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }
}

/// Total fetch failure: no direct or fallback quote from any venue.
#[derive(Debug)]
pub struct FetchFailure {
    pub error: RouterError,
    pub failed_venues: Vec<String>,
    pub total_latency_ms: u64,
}

pub struct QuoteFetcher {
    registry: Arc<VenueRegistry>,
    prices: Arc<dyn UnitPriceSource>,
    breakers: VenueBreakers,
    config: Arc<RouterConfig>,
}

impl QuoteFetcher {
    pub fn new(
        registry: Arc<VenueRegistry>,
        prices: Arc<dyn UnitPriceSource>,
        breakers: VenueBreakers,
        config: Arc<RouterConfig>,
    ) -> Self {
        Self {
            registry,
            prices,
            breakers,
            config,
        }
    }

    /// Fetch quotes from the baseline and every configured venue
    /// concurrently. The fan-in waits for every sibling (success or timeout);
    /// a failing venue never cancels the others.
    pub async fn fetch(&self, req: &QuoteRequest) -> Result<FetchedQuotes, FetchFailure> {
        let started = Instant::now();

        let baseline_fut = self.fetch_baseline(req);
        let venues_fut = self.fetch_venues(req);
        let (baseline, (mut quotes, mut failed_venues)) =
            tokio::join!(baseline_fut, venues_fut);

        let baseline = match baseline {
            Ok(q) => Some(q),
            Err(err) => {
                warn!(error = %err, "baseline quote unavailable");
                failed_venues.push(self.registry.baseline.name().to_string());
                None
            }
        };

        // Fallback synthesis only when zero venues answered directly.
        if quotes.is_empty() {
            quotes = self.synthesize_fallbacks(req, started).await;
        }

        if baseline.is_none() && quotes.is_empty() {
            return Err(FetchFailure {
                error: RouterError::AllVenuesFailed(
                    "no direct or fallback quote from any venue".to_string(),
                ),
                failed_venues,
                total_latency_ms: started.elapsed().as_millis() as u64,
            });
        }

        // Integer comparison on the smallest-unit amounts; stable sort keeps
        // venue-iteration order on ties.
        quotes.sort_by(|a, b| b.output_amount.cmp(&a.output_amount));

        Ok(FetchedQuotes {
            baseline,
            quotes,
            failed_venues,
            total_latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Baseline gets a short retry-with-backoff; it is the reference route
    /// the rest of the pipeline anchors on. Only timeouts and transport
    /// failures are retried; a rejection is final and fails over immediately.
    async fn fetch_baseline(&self, req: &QuoteRequest) -> Result<VenueQuote, RouterError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(300),
            max_elapsed_time: Some(Duration::from_secs(2)),
            ..ExponentialBackoff::default()
        };
        let adapter = Arc::clone(&self.registry.baseline);
        let timeout = self.config.venue_timeout;
        backoff::future::retry(policy, || {
            let adapter = Arc::clone(&adapter);
            let req = req.clone();
            async move {
                Self::bounded_fetch(adapter.as_ref(), &req, timeout)
                    .await
                    .map_err(|err| {
                        if err.is_retryable() {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
            }
        })
        .await
    }

    async fn fetch_venues(&self, req: &QuoteRequest) -> (Vec<VenueQuote>, Vec<String>) {
        let mut futures = Vec::with_capacity(self.registry.venues.len());
        for adapter in &self.registry.venues {
            let adapter = Arc::clone(adapter);
            let req = req.clone();
            let timeout = self.config.venue_timeout;
            let breakers = self.breakers.clone();
            futures.push(async move {
                let name = adapter.name().to_string();
                if breakers.is_open(&name).await {
                    debug!(venue = %name, "venue breaker open, skipping");
                    return (
                        name.clone(),
                        Err(RouterError::VenueUnavailable {
                            venue: name,
                            reason: "circuit open".to_string(),
                        }),
                    );
                }
                let started = Instant::now();
                let result = Self::bounded_fetch(adapter.as_ref(), &req, timeout).await;
                let elapsed = started.elapsed().as_secs_f64();
                match &result {
                    Ok(_) => {
                        VENUE_LATENCY
                            .with_label_values(&[&name, "ok"])
                            .observe(elapsed);
                        breakers.record_success(&name).await;
                    }
                    Err(err) => {
                        VENUE_LATENCY
                            .with_label_values(&[&name, "error"])
                            .observe(elapsed);
                        let kind = match err {
                            RouterError::VenueTimeout { .. } => "timeout",
                            RouterError::VenueRejected { .. } => "rejected",
                            _ => "unavailable",
                        };
                        VENUE_ERRORS.with_label_values(&[&name, kind]).inc();
                        breakers.record_failure(&name).await;
                    }
                }
                (name, result)
            });
        }

        let mut quotes = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in futures::future::join_all(futures).await {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(err) => {
                    debug!(venue = %name, error = %err, "venue quote failed");
                    failed.push(name);
                }
            }
        }
        (quotes, failed)
    }

    async fn bounded_fetch(
        adapter: &dyn VenueAdapter,
        req: &QuoteRequest,
        timeout: Duration,
    ) -> Result<VenueQuote, RouterError> {
        match tokio::time::timeout(timeout, adapter.fetch_quote(req)).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::VenueTimeout {
                venue: adapter.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Estimated quotes from unit prices, one per configured venue. A venue
    /// whose price data is unavailable simply stays absent.
    async fn synthesize_fallbacks(&self, req: &QuoteRequest, started: Instant) -> Vec<VenueQuote> {
        let (input_price, output_price) = tokio::join!(
            self.prices.unit_price(&req.input_mint),
            self.prices.unit_price(&req.output_mint)
        );
        let (input_price, output_price) = match (input_price, output_price) {
            (Ok(i), Ok(o)) => (i, o),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "fallback synthesis skipped");
                return Vec::new();
            }
        };

        let input_decimals = self.config.tokens.decimals(&req.input_mint);
        let output_decimals = self.config.tokens.decimals(&req.output_mint);
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut quotes = Vec::new();
        for def in &self.config.venues {
            let spread_bps = def.fallback_spread_bps(&self.config);
            match synthesize_quote(
                def,
                req,
                input_price.price,
                output_price.price,
                input_decimals,
                output_decimals,
                spread_bps,
                latency_ms,
            ) {
                Ok(quote) => {
                    debug!(
                        venue = %def.name,
                        output = quote.output_amount,
                        spread_bps = spread_bps,
                        "synthesized fallback quote"
                    );
                    quotes.push(quote);
                }
                Err(err) => warn!(venue = %def.name, error = %err, "fallback skipped"),
            }
        }
        quotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, VenueDefinition};
    use crate::venues::adapter::QuoteSourceKind;
    use crate::venues::pricing::UnitPrice;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticAdapter {
        def: VenueDefinition,
        output_amount: Option<u64>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl VenueAdapter for StaticAdapter {
        fn definition(&self) -> &VenueDefinition {
            &self.def
        }

        async fn fetch_quote(&self, req: &QuoteRequest) -> Result<VenueQuote, RouterError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.output_amount {
                Some(output_amount) => Ok(VenueQuote {
                    venue: self.def.name.clone(),
                    input_amount: req.amount,
                    output_amount,
                    price_impact_bps: 50,
                    latency_ms: 1,
                    is_fallback: false,
                    source: QuoteSourceKind::Direct,
                }),
                None => Err(RouterError::VenueUnavailable {
                    venue: self.def.name.clone(),
                    reason: "down".to_string(),
                }),
            }
        }
    }

    struct CountingAdapter {
        def: VenueDefinition,
        attempts: Arc<AtomicU32>,
        rejected: bool,
        // attempts that fail before one succeeds; u32::MAX never succeeds
        succeed_after: u32,
    }

    #[async_trait]
    impl VenueAdapter for CountingAdapter {
        fn definition(&self) -> &VenueDefinition {
            &self.def
        }

        async fn fetch_quote(&self, req: &QuoteRequest) -> Result<VenueQuote, RouterError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.succeed_after {
                return Ok(VenueQuote {
                    venue: self.def.name.clone(),
                    input_amount: req.amount,
                    output_amount: 150_000_000,
                    price_impact_bps: 50,
                    latency_ms: 1,
                    is_fallback: false,
                    source: QuoteSourceKind::Direct,
                });
            }
            if self.rejected {
                Err(RouterError::VenueRejected {
                    venue: self.def.name.clone(),
                    reason: "http 400".to_string(),
                })
            } else {
                Err(RouterError::VenueUnavailable {
                    venue: self.def.name.clone(),
                    reason: "connect".to_string(),
                })
            }
        }
    }

    struct StaticPrices {
        prices: HashMap<String, f64>,
    }

    #[async_trait]
    impl UnitPriceSource for StaticPrices {
        async fn unit_price(&self, mint: &str) -> Result<UnitPrice, RouterError> {
            match self.prices.get(mint) {
                Some(p) => Ok(UnitPrice {
                    price: *p,
                    source: "static".to_string(),
                }),
                None => Err(RouterError::MissingPriceData(mint.to_string())),
            }
        }
    }

    fn base_config() -> Arc<RouterConfig> {
        let app = AppConfig {
            listen_addr: None,
            baseline_endpoint: None,
            dex_api_base: None,
            price_feed_endpoint: None,
            venue_timeout_ms: Some(100),
            price_timeout_ms: Some(100),
            max_inflight: None,
            disabled_venues: Some("meteora,phoenix,lifinity,saber".to_string()),
        };
        Arc::new(app.router_config().unwrap())
    }

    fn fetcher_with(
        config: Arc<RouterConfig>,
        baseline_out: Option<u64>,
        venue_outs: Vec<(usize, Option<u64>, Option<Duration>)>,
        prices: HashMap<String, f64>,
    ) -> QuoteFetcher {
        let baseline = Arc::new(StaticAdapter {
            def: config.baseline.clone(),
            output_amount: baseline_out,
            delay: None,
        });
        let venues: Vec<Arc<dyn VenueAdapter>> = venue_outs
            .into_iter()
            .map(|(idx, output_amount, delay)| {
                Arc::new(StaticAdapter {
                    def: config.venues[idx].clone(),
                    output_amount,
                    delay,
                }) as Arc<dyn VenueAdapter>
            })
            .collect();
        QuoteFetcher::new(
            Arc::new(VenueRegistry::new(baseline, venues)),
            Arc::new(StaticPrices { prices }),
            VenueBreakers::new(),
            config,
        )
    }

    fn request() -> QuoteRequest {
        QuoteRequest {
            input_mint: crate::config::SOL_MINT.to_string(),
            output_mint: crate::config::USDC_MINT.to_string(),
            amount: 1_000_000_000,
            slippage_bps: 50,
        }
    }

    #[tokio::test]
    async fn partial_failure_is_isolated() {
        let cfg = base_config();
        let fetcher = fetcher_with(
            cfg,
            Some(150_000_000),
            vec![(0, Some(151_000_000), None), (1, None, None)],
            HashMap::new(),
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(fetched.quotes.len(), 1);
        assert_eq!(fetched.quotes[0].venue, "raydium");
        assert_eq!(fetched.failed_venues, vec!["orca".to_string()]);
        assert_eq!(fetched.best_quote().unwrap().output_amount, 151_000_000);
    }

    #[tokio::test]
    async fn timed_out_venue_does_not_abort_siblings() {
        let cfg = base_config();
        let fetcher = fetcher_with(
            cfg,
            Some(150_000_000),
            vec![
                (0, Some(149_000_000), Some(Duration::from_millis(500))),
                (1, Some(151_000_000), None),
            ],
            HashMap::new(),
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(fetched.quotes.len(), 1);
        assert_eq!(fetched.quotes[0].venue, "orca");
        assert_eq!(fetched.failed_venues, vec!["raydium".to_string()]);
    }

    #[tokio::test]
    async fn quotes_sorted_by_output_descending() {
        let cfg = base_config();
        let fetcher = fetcher_with(
            cfg,
            Some(150_000_000),
            vec![(0, Some(149_000_000), None), (1, Some(151_000_000), None)],
            HashMap::new(),
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        let outputs: Vec<u64> = fetched.quotes.iter().map(|q| q.output_amount).collect();
        assert_eq!(outputs, vec![151_000_000, 149_000_000]);
    }

    #[tokio::test]
    async fn tie_keeps_venue_iteration_order() {
        let cfg = base_config();
        let fetcher = fetcher_with(
            cfg,
            Some(150_000_000),
            vec![(0, Some(150_000_000), None), (1, Some(150_000_000), None)],
            HashMap::new(),
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        let names: Vec<&str> = fetched.quotes.iter().map(|q| q.venue.as_str()).collect();
        assert_eq!(names, vec!["raydium", "orca"]);
    }

    #[tokio::test]
    async fn all_venues_down_synthesizes_fallbacks() {
        let cfg = base_config();
        let prices = HashMap::from([
            (crate::config::SOL_MINT.to_string(), 150.0),
            (crate::config::USDC_MINT.to_string(), 1.0),
        ]);
        let fetcher = fetcher_with(
            cfg,
            Some(150_000_000),
            vec![(0, None, None), (1, None, None)],
            prices,
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(fetched.quotes.len(), 2);
        assert!(fetched.quotes.iter().all(|q| q.is_fallback));
        assert!(fetched
            .quotes
            .iter()
            .all(|q| q.source == QuoteSourceKind::Estimated));
        // 1 SOL * $150 / $1 * (1 - 30bps) at 6 decimals
        assert_eq!(fetched.quotes[0].output_amount, 149_550_000);
        assert_eq!(fetched.failed_venues.len(), 2);
    }

    #[tokio::test]
    async fn everything_down_is_all_venues_failed() {
        // Scenario D: venues and baseline fail, price lookup missing for the
        // output mint.
        let cfg = base_config();
        let prices = HashMap::from([(crate::config::SOL_MINT.to_string(), 150.0)]);
        let fetcher = fetcher_with(cfg, None, vec![(0, None, None), (1, None, None)], prices);
        let failure = fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(failure.error, RouterError::AllVenuesFailed(_)));
        assert_eq!(failure.failed_venues.len(), 3); // both venues + baseline
    }

    #[tokio::test]
    async fn baseline_rejection_fails_over_without_retrying() {
        let cfg = base_config();
        let attempts = Arc::new(AtomicU32::new(0));
        let baseline = Arc::new(CountingAdapter {
            def: cfg.baseline.clone(),
            attempts: Arc::clone(&attempts),
            rejected: true,
            succeed_after: u32::MAX,
        });
        let venues: Vec<Arc<dyn VenueAdapter>> = vec![Arc::new(StaticAdapter {
            def: cfg.venues[0].clone(),
            output_amount: Some(151_000_000),
            delay: None,
        })];
        let fetcher = QuoteFetcher::new(
            Arc::new(VenueRegistry::new(baseline, venues)),
            Arc::new(StaticPrices {
                prices: HashMap::new(),
            }),
            VenueBreakers::new(),
            cfg,
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        assert!(fetched.baseline.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(fetched.failed_venues.iter().any(|name| name == "jupiter"));
    }

    #[tokio::test]
    async fn baseline_transport_failure_is_retried_until_it_succeeds() {
        let cfg = base_config();
        let attempts = Arc::new(AtomicU32::new(0));
        let baseline = Arc::new(CountingAdapter {
            def: cfg.baseline.clone(),
            attempts: Arc::clone(&attempts),
            rejected: false,
            succeed_after: 2,
        });
        let venues: Vec<Arc<dyn VenueAdapter>> = vec![Arc::new(StaticAdapter {
            def: cfg.venues[0].clone(),
            output_amount: Some(151_000_000),
            delay: None,
        })];
        let fetcher = QuoteFetcher::new(
            Arc::new(VenueRegistry::new(baseline, venues)),
            Arc::new(StaticPrices {
                prices: HashMap::new(),
            }),
            VenueBreakers::new(),
            cfg,
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        assert!(fetched.baseline.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn baseline_failure_alone_is_not_fatal() {
        let cfg = base_config();
        let fetcher = fetcher_with(
            cfg,
            None,
            vec![(0, Some(151_000_000), None), (1, None, None)],
            HashMap::new(),
        );
        let fetched = fetcher.fetch(&request()).await.unwrap();
        assert!(fetched.baseline.is_none());
        assert_eq!(fetched.quotes.len(), 1);
        assert!(fetched
            .failed_venues
            .iter()
            .any(|name| name == "jupiter"));
    }
}
