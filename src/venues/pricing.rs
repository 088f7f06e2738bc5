// Unit-price feed and synthetic-quote pricing
// This file implements the reference price lookup used only for fallback
// synthesis, and the estimation math that turns two unit prices into an
// Estimated VenueQuote.

use crate::config::VenueDefinition;
use crate::errors::RouterError;
use crate::venues::adapter::{QuoteRequest, QuoteSourceKind, VenueQuote};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Unit-price lookup seam. The fetcher only depends on this trait so tests
/// can inject canned prices.
#[async_trait]
pub trait UnitPriceSource: Send + Sync {
    async fn unit_price(&self, mint: &str) -> Result<UnitPrice, RouterError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitPrice {
    pub price: f64,
    #[serde(default)]
    pub source: String,
}

/// External unit-price lookup by mint. Queried with its own timeout,
/// independent of venue timeouts.
#[derive(Clone)]
pub struct PriceFeed {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl PriceFeed {
    pub fn new(http: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl UnitPriceSource for PriceFeed {
    /// USD unit price for a mint. A non-positive or missing price is
    /// reported as MissingPriceData so the caller can skip that fallback.
    async fn unit_price(&self, mint: &str) -> Result<UnitPrice, RouterError> {
        let started = Instant::now();
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("mint", mint);

        let fut = async {
            let resp = self
                .http
                .get(url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| RouterError::MissingPriceData(format!("{mint}: send: {e}")))?;
            if !resp.status().is_success() {
                return Err(RouterError::MissingPriceData(format!(
                    "{mint}: http {}",
                    resp.status()
                )));
            }
            resp.json::<UnitPrice>()
                .await
                .map_err(|e| RouterError::MissingPriceData(format!("{mint}: parse: {e}")))
        };

        let unit = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RouterError::MissingPriceData(format!("{mint}: timeout")))??;

        if !unit.price.is_finite() || unit.price <= 0.0 {
            return Err(RouterError::MissingPriceData(mint.to_string()));
        }
        debug!(
            mint = %mint,
            price = unit.price,
            source = %unit.source,
            latency_ms = started.elapsed().as_millis() as u64,
            "unit price resolved"
        );
        Ok(unit)
    }
}

/// Synthesize an Estimated quote for a venue from independently-obtained
/// unit prices:
///   out = floor(in_tokens * in_price / out_price * (10000 - spread) / 10000 * 10^out_decimals)
/// Returns MissingPriceData when either price is unusable.
pub fn synthesize_quote(
    def: &VenueDefinition,
    req: &QuoteRequest,
    input_price: f64,
    output_price: f64,
    input_decimals: u8,
    output_decimals: u8,
    spread_bps: u16,
    latency_ms: u64,
) -> Result<VenueQuote, RouterError> {
    if !input_price.is_finite() || input_price <= 0.0 {
        return Err(RouterError::MissingPriceData(req.input_mint.clone()));
    }
    if !output_price.is_finite() || output_price <= 0.0 {
        return Err(RouterError::MissingPriceData(req.output_mint.clone()));
    }

    let input_tokens = req.amount as f64 / 10f64.powi(input_decimals as i32);
    let output_tokens =
        input_tokens * input_price / output_price * (10_000 - spread_bps as u64) as f64 / 10_000.0;
    let output_amount = (output_tokens * 10f64.powi(output_decimals as i32)).floor();

    if !output_amount.is_finite() || output_amount < 1.0 {
        return Err(RouterError::MissingPriceData(format!(
            "synthetic output for {} rounds to zero",
            def.name
        )));
    }

    Ok(VenueQuote {
        venue: def.name.clone(),
        input_amount: req.amount,
        output_amount: output_amount as u64,
        // The spread is the only impact signal an estimated quote carries.
        price_impact_bps: spread_bps as i64,
        latency_ms,
        is_fallback: true,
        source: QuoteSourceKind::Estimated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImpactUnit, VenueStyle};

    fn def(name: &str) -> VenueDefinition {
        VenueDefinition {
            name: name.to_string(),
            endpoint: Url::parse("http://localhost/quote").unwrap(),
            style: VenueStyle::Amm,
            impact_unit: ImpactUnit::Percent,
            fee_bps: 0,
        }
    }

    fn req(amount: u64) -> QuoteRequest {
        QuoteRequest {
            input_mint: "So11111111111111111111111111111111111111112".to_string(),
            output_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            amount,
            slippage_bps: 50,
        }
    }

    #[test]
    fn synthesizes_with_spread_deduction() {
        // 1 SOL at $150 -> USDC at $1, 30 bps spread:
        // 1 * 150 / 1 * 0.997 = 149.55 USDC -> 149_550_000 at 6 decimals
        let q = synthesize_quote(&def("raydium"), &req(1_000_000_000), 150.0, 1.0, 9, 6, 30, 7)
            .unwrap();
        assert_eq!(q.output_amount, 149_550_000);
        assert!(q.is_fallback);
        assert_eq!(q.source, QuoteSourceKind::Estimated);
        assert_eq!(q.price_impact_bps, 30);
        assert_eq!(q.latency_ms, 7);
    }

    #[test]
    fn orderbook_spread_yields_more_output() {
        let amm =
            synthesize_quote(&def("raydium"), &req(1_000_000_000), 150.0, 1.0, 9, 6, 30, 0)
                .unwrap();
        let book =
            synthesize_quote(&def("phoenix"), &req(1_000_000_000), 150.0, 1.0, 9, 6, 15, 0)
                .unwrap();
        assert!(book.output_amount > amm.output_amount);
    }

    #[test]
    fn unusable_price_is_missing_price_data() {
        let err =
            synthesize_quote(&def("orca"), &req(1_000_000_000), 0.0, 1.0, 9, 6, 30, 0).unwrap_err();
        assert!(matches!(err, RouterError::MissingPriceData(_)));
        let err = synthesize_quote(&def("orca"), &req(1_000_000_000), 150.0, -2.0, 9, 6, 30, 0)
            .unwrap_err();
        assert!(matches!(err, RouterError::MissingPriceData(_)));
    }

    #[test]
    fn dust_input_rounds_to_zero_and_is_skipped() {
        let err = synthesize_quote(&def("orca"), &req(1), 0.000001, 1000.0, 9, 6, 30, 0)
            .unwrap_err();
        assert!(matches!(err, RouterError::MissingPriceData(_)));
    }
}
