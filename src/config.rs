// Configuration management module
// This file handles loading settings from the environment and derives the
// immutable RouterConfig that is passed by reference into the pipeline.
// Nothing inside the core logic reads the environment directly.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use url::Url;

/// Default per-venue request timeout.
pub const DEFAULT_VENUE_TIMEOUT_MS: u64 = 5_000;
/// Default unit-price lookup timeout, independent of venue timeouts.
pub const DEFAULT_PRICE_TIMEOUT_MS: u64 = 5_000;
/// Default slippage tolerance when the caller does not supply one.
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;
/// Synthetic-quote spread for AMM-style venues.
pub const DEFAULT_FALLBACK_SPREAD_BPS: u16 = 30;
/// Tighter synthetic-quote spread for order-book-style venues.
pub const ORDERBOOK_FALLBACK_SPREAD_BPS: u16 = 15;
/// Orders above this many smallest-units are treated as large.
pub const LARGE_ORDER_THRESHOLD: u64 = 2_000_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP API bind address, e.g. 0.0.0.0:8080
    pub listen_addr: Option<String>,
    /// Baseline (reference route) quote endpoint
    pub baseline_endpoint: Option<Url>,
    /// Base URL for the per-venue quote endpoints, e.g. http://localhost:3000/api/dex
    pub dex_api_base: Option<Url>,
    /// Unit-price lookup endpoint used only for fallback synthesis
    pub price_feed_endpoint: Option<Url>,
    /// Per-venue request timeout in milliseconds
    pub venue_timeout_ms: Option<u64>,
    /// Unit-price lookup timeout in milliseconds
    pub price_timeout_ms: Option<u64>,
    /// Concurrency control for inbound routing requests
    pub max_inflight: Option<usize>,
    /// Comma-separated venue names to disable
    pub disabled_venues: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Derive the immutable pipeline configuration. Built once at process
    /// start; the pipeline only ever sees a shared reference to it.
    pub fn router_config(&self) -> Result<RouterConfig> {
        let baseline_endpoint = match &self.baseline_endpoint {
            Some(url) => url.clone(),
            None => Url::parse("https://quote-api.jup.ag/v6/quote")
                .context("parse default baseline endpoint")?,
        };
        let dex_api_base = match &self.dex_api_base {
            Some(url) => url.clone(),
            None => Url::parse("http://localhost:3000/api/dex")
                .context("parse default dex api base")?,
        };
        let price_feed_endpoint = match &self.price_feed_endpoint {
            Some(url) => url.clone(),
            None => Url::parse("http://localhost:3000/api/price")
                .context("parse default price feed endpoint")?,
        };

        let disabled: HashSet<String> = self
            .disabled_venues
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut venues = Vec::new();
        for def in default_venues(&dex_api_base)? {
            if disabled.contains(&def.name) {
                continue;
            }
            venues.push(def);
        }
        if venues.is_empty() {
            bail!("all venues disabled; at least one alternative venue is required");
        }

        Ok(RouterConfig {
            baseline: VenueDefinition {
                name: "jupiter".to_string(),
                endpoint: baseline_endpoint,
                style: VenueStyle::Aggregate,
                // Jupiter reports priceImpactPct as a percentage string
                impact_unit: ImpactUnit::Percent,
                fee_bps: 0,
            },
            venues,
            price_feed_endpoint,
            venue_timeout: Duration::from_millis(
                self.venue_timeout_ms.unwrap_or(DEFAULT_VENUE_TIMEOUT_MS),
            ),
            price_timeout: Duration::from_millis(
                self.price_timeout_ms.unwrap_or(DEFAULT_PRICE_TIMEOUT_MS),
            ),
            default_slippage_bps: DEFAULT_SLIPPAGE_BPS,
            fallback_spread_bps: DEFAULT_FALLBACK_SPREAD_BPS,
            orderbook_spread_bps: ORDERBOOK_FALLBACK_SPREAD_BPS,
            large_order_threshold: LARGE_ORDER_THRESHOLD,
            max_inflight: self.max_inflight.unwrap_or(64),
            tokens: TokenRegistry::mainnet(),
        })
    }
}

/// Venue liquidity style. Order-book venues get a tighter synthetic spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueStyle {
    Amm,
    OrderBook,
    /// Meta-aggregator (baseline only)
    Aggregate,
}

/// Unit of the price-impact field a venue reports. The bps conversion
/// constant is part of each adapter's contract; it is configuration to be
/// verified per venue, not copied from upstream behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactUnit {
    /// Field is a percentage (0.5 == 0.5%): multiply by 100 for bps.
    Percent,
    /// Field is a fraction of one (0.005 == 0.5%): multiply by 10000 for bps.
    Fraction,
    /// Field is already basis points.
    Bps,
}

impl ImpactUnit {
    /// Convert a venue-reported impact value into basis points.
    pub fn to_bps(self, raw: f64) -> i64 {
        let bps = match self {
            ImpactUnit::Percent => raw * 100.0,
            ImpactUnit::Fraction => raw * 10_000.0,
            ImpactUnit::Bps => raw,
        };
        if !bps.is_finite() {
            return 0;
        }
        bps.floor() as i64
    }
}

/// Static description of one quoting venue.
#[derive(Debug, Clone)]
pub struct VenueDefinition {
    pub name: String,
    pub endpoint: Url,
    pub style: VenueStyle,
    pub impact_unit: ImpactUnit,
    /// Venue-specific deduction applied to raw output to get net output.
    pub fee_bps: u16,
}

impl VenueDefinition {
    /// Synthetic-quote spread for this venue.
    pub fn fallback_spread_bps(&self, cfg: &RouterConfig) -> u16 {
        match self.style {
            VenueStyle::OrderBook => cfg.orderbook_spread_bps,
            _ => cfg.fallback_spread_bps,
        }
    }
}

fn default_venues(base: &Url) -> Result<Vec<VenueDefinition>> {
    let venue = |name: &str, style: VenueStyle, impact_unit: ImpactUnit, fee_bps: u16| {
        let endpoint = base
            .join(&format!("{name}/quote"))
            .with_context(|| format!("build endpoint for venue {name}"))?;
        Ok::<_, anyhow::Error>(VenueDefinition {
            name: name.to_string(),
            endpoint,
            style,
            impact_unit,
            fee_bps,
        })
    };
    Ok(vec![
        // Impact-unit assignments verified against each venue's quote schema,
        // not inherited from upstream call sites.
        venue("raydium", VenueStyle::Amm, ImpactUnit::Percent, 25)?,
        venue("orca", VenueStyle::Amm, ImpactUnit::Percent, 30)?,
        venue("meteora", VenueStyle::Amm, ImpactUnit::Fraction, 25)?,
        venue("phoenix", VenueStyle::OrderBook, ImpactUnit::Bps, 0)?,
        venue("lifinity", VenueStyle::Amm, ImpactUnit::Percent, 20)?,
        venue("saber", VenueStyle::Amm, ImpactUnit::Fraction, 10)?,
    ])
}

/// Read-only token metadata shared across requests. Requires no locking.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    decimals: HashMap<String, u8>,
    high_liquidity: HashSet<String>,
}

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

impl TokenRegistry {
    pub fn mainnet() -> Self {
        let decimals = HashMap::from([
            (SOL_MINT.to_string(), 9u8),
            (USDC_MINT.to_string(), 6u8),
            (USDT_MINT.to_string(), 6u8),
        ]);
        let high_liquidity = HashSet::from([
            SOL_MINT.to_string(),
            USDC_MINT.to_string(),
            USDT_MINT.to_string(),
        ]);
        Self {
            decimals,
            high_liquidity,
        }
    }

    /// Decimals for a mint; unknown mints default to 9 (the chain's native
    /// token scale) so fallback math stays defined.
    pub fn decimals(&self, mint: &str) -> u8 {
        self.decimals.get(mint).copied().unwrap_or(9)
    }

    /// Whether a mint is on the small internal-liquidity allow-list.
    pub fn is_high_liquidity(&self, mint: &str) -> bool {
        self.high_liquidity.contains(mint)
    }
}

/// Immutable pipeline configuration, constructed once at process start.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub baseline: VenueDefinition,
    pub venues: Vec<VenueDefinition>,
    pub price_feed_endpoint: Url,
    pub venue_timeout: Duration,
    pub price_timeout: Duration,
    pub default_slippage_bps: u16,
    pub fallback_spread_bps: u16,
    pub orderbook_spread_bps: u16,
    pub large_order_threshold: u64,
    pub max_inflight: usize,
    pub tokens: TokenRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_unit_conversion() {
        // Percent field: 0.5 (%) -> 50 bps
        assert_eq!(ImpactUnit::Percent.to_bps(0.5), 50);
        // Fraction field: 0.005 -> 50 bps
        assert_eq!(ImpactUnit::Fraction.to_bps(0.005), 50);
        assert_eq!(ImpactUnit::Bps.to_bps(50.0), 50);
        assert_eq!(ImpactUnit::Percent.to_bps(f64::NAN), 0);
    }

    #[test]
    fn orderbook_venues_get_tighter_spread() {
        let app = AppConfig {
            listen_addr: None,
            baseline_endpoint: None,
            dex_api_base: None,
            price_feed_endpoint: None,
            venue_timeout_ms: None,
            price_timeout_ms: None,
            max_inflight: None,
            disabled_venues: None,
        };
        let cfg = app.router_config().unwrap();
        let phoenix = cfg.venues.iter().find(|v| v.name == "phoenix").unwrap();
        let raydium = cfg.venues.iter().find(|v| v.name == "raydium").unwrap();
        assert_eq!(phoenix.fallback_spread_bps(&cfg), 15);
        assert_eq!(raydium.fallback_spread_bps(&cfg), 30);
    }

    #[test]
    fn disabled_venues_are_dropped() {
        let app = AppConfig {
            listen_addr: None,
            baseline_endpoint: None,
            dex_api_base: None,
            price_feed_endpoint: None,
            venue_timeout_ms: None,
            price_timeout_ms: None,
            max_inflight: None,
            disabled_venues: Some("saber, lifinity".to_string()),
        };
        let cfg = app.router_config().unwrap();
        assert!(cfg.venues.iter().all(|v| v.name != "saber"));
        assert!(cfg.venues.iter().all(|v| v.name != "lifinity"));
        assert_eq!(cfg.venues.len(), 4);
    }
}
