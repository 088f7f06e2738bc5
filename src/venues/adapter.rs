// Venue adapter module
// This file implements the adapter seam for quoting venues: one adapter per
// venue behind a common trait, each normalizing its response into the shared
// VenueQuote shape.

use crate::config::VenueDefinition;
use crate::errors::RouterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// How a quote was obtained: directly from the venue or synthesized from
/// unit-price data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSourceKind {
    Direct,
    Estimated,
}

/// Validated swap parameters handed to every adapter in a request.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Amount in the input token's smallest unit.
    pub amount: u64,
    pub slippage_bps: u16,
}

/// One venue's normalized quote. Immutable once produced; created per
/// request and discarded after use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueQuote {
    pub venue: String,
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_bps: i64,
    pub latency_ms: u64,
    pub is_fallback: bool,
    pub source: QuoteSourceKind,
}

impl VenueQuote {
    /// Output after the venue-specific deduction, used for improvement math.
    pub fn net_output(&self, fee_bps: u16) -> u64 {
        let net = (self.output_amount as u128) * (10_000 - fee_bps as u128) / 10_000;
        net as u64
    }
}

/// Common interface for venue quoting. The tagged success/failure shape is
/// `Result<VenueQuote, RouterError>`; failures stay isolated to the venue.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn definition(&self) -> &VenueDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<VenueQuote, RouterError>;
}

/// HTTP adapter querying a venue's quote endpoint with
/// `inputMint, outputMint, amount, slippageBps` query parameters.
pub struct HttpVenueAdapter {
    def: VenueDefinition,
    http: reqwest::Client,
}

impl HttpVenueAdapter {
    pub fn new(def: VenueDefinition, http: reqwest::Client) -> Self {
        Self { def, http }
    }
}

#[async_trait]
impl VenueAdapter for HttpVenueAdapter {
    fn definition(&self) -> &VenueDefinition {
        &self.def
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<VenueQuote, RouterError> {
        let started = Instant::now();
        let mut url = self.def.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("inputMint", &req.input_mint)
            .append_pair("outputMint", &req.output_mint)
            .append_pair("amount", &req.amount.to_string())
            .append_pair("slippageBps", &req.slippage_bps.to_string());

        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| RouterError::VenueUnavailable {
                venue: self.def.name.clone(),
                reason: format!("send: {e}"),
            })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RouterError::VenueUnavailable {
                venue: self.def.name.clone(),
                reason: format!("http {status}"),
            });
        }
        if !status.is_success() {
            return Err(RouterError::VenueRejected {
                venue: self.def.name.clone(),
                reason: format!("http {status}"),
            });
        }

        let body: serde_json::Value =
            resp.json().await.map_err(|e| RouterError::VenueRejected {
                venue: self.def.name.clone(),
                reason: format!("json parse: {e}"),
            })?;

        let latency_ms = started.elapsed().as_millis() as u64;
        let quote = normalize_payload(&self.def, &body, req.amount, latency_ms)?;
        debug!(
            venue = %self.def.name,
            output = quote.output_amount,
            impact_bps = quote.price_impact_bps,
            latency_ms = latency_ms,
            "venue quote normalized"
        );
        Ok(quote)
    }
}

/// Map a venue's raw JSON payload into a VenueQuote. A payload without an
/// output-amount field counts as a venue failure.
pub fn normalize_payload(
    def: &VenueDefinition,
    body: &serde_json::Value,
    input_amount: u64,
    latency_ms: u64,
) -> Result<VenueQuote, RouterError> {
    if let Some(err) = body.get("error") {
        return Err(RouterError::VenueRejected {
            venue: def.name.clone(),
            reason: err.to_string(),
        });
    }

    let output_amount = ["outputAmount", "outAmount"]
        .iter()
        .find_map(|key| body.get(key).and_then(amount_field))
        .filter(|amount| *amount > 0)
        .ok_or_else(|| RouterError::VenueRejected {
            venue: def.name.clone(),
            reason: "missing output amount".to_string(),
        })?;

    // priceImpactBps is taken as-is when present; otherwise the venue's own
    // impact field is converted with the per-adapter ImpactUnit constant
    // (Percent = x100, Fraction = x10000) declared in its definition.
    let price_impact_bps = body
        .get("priceImpactBps")
        .and_then(|v| v.as_i64())
        .or_else(|| {
            ["priceImpactPct", "priceImpact"]
                .iter()
                .find_map(|key| body.get(key).and_then(float_field))
                .map(|raw| def.impact_unit.to_bps(raw))
        })
        .unwrap_or(0);

    Ok(VenueQuote {
        venue: def.name.clone(),
        input_amount,
        output_amount,
        price_impact_bps,
        latency_ms,
        is_fallback: false,
        source: QuoteSourceKind::Direct,
    })
}

fn amount_field(v: &serde_json::Value) -> Option<u64> {
    match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

fn float_field(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// All configured adapters for one process: the baseline (reference route)
/// plus the alternative venues. Read-only after startup.
pub struct VenueRegistry {
    pub baseline: Arc<dyn VenueAdapter>,
    pub venues: Vec<Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    pub fn new(baseline: Arc<dyn VenueAdapter>, venues: Vec<Arc<dyn VenueAdapter>>) -> Self {
        Self { baseline, venues }
    }

    pub fn venue_names(&self) -> Vec<String> {
        self.venues.iter().map(|v| v.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImpactUnit;
    use serde_json::json;
    use url::Url;

    fn def(impact_unit: ImpactUnit) -> VenueDefinition {
        VenueDefinition {
            name: "testvenue".to_string(),
            endpoint: Url::parse("http://localhost/quote").unwrap(),
            style: crate::config::VenueStyle::Amm,
            impact_unit,
            fee_bps: 0,
        }
    }

    #[test]
    fn normalizes_string_and_numeric_output_amounts() {
        let body = json!({ "outAmount": "150000000", "priceImpactPct": "0.5" });
        let q = normalize_payload(&def(ImpactUnit::Percent), &body, 1_000_000_000, 42).unwrap();
        assert_eq!(q.output_amount, 150_000_000);
        assert_eq!(q.price_impact_bps, 50);
        assert_eq!(q.latency_ms, 42);
        assert!(!q.is_fallback);

        let body = json!({ "outputAmount": 99, "priceImpact": 0.005 });
        let q = normalize_payload(&def(ImpactUnit::Fraction), &body, 100, 1).unwrap();
        assert_eq!(q.output_amount, 99);
        assert_eq!(q.price_impact_bps, 50);
    }

    #[test]
    fn prefers_explicit_bps_field() {
        let body = json!({ "outAmount": "5", "priceImpactBps": 120, "priceImpactPct": "9.0" });
        let q = normalize_payload(&def(ImpactUnit::Percent), &body, 10, 0).unwrap();
        assert_eq!(q.price_impact_bps, 120);
    }

    #[test]
    fn missing_output_amount_is_a_venue_failure() {
        let body = json!({ "priceImpactPct": "0.5" });
        let err = normalize_payload(&def(ImpactUnit::Percent), &body, 10, 0).unwrap_err();
        assert!(err.is_per_venue());
        // a rejection is final; the baseline retry must not spin on it
        assert!(!err.is_retryable());

        let body = json!({ "outAmount": "0" });
        assert!(normalize_payload(&def(ImpactUnit::Percent), &body, 10, 0).is_err());
    }

    #[test]
    fn error_payload_is_a_venue_failure() {
        let body = json!({ "error": "pool not found", "outAmount": "5" });
        assert!(normalize_payload(&def(ImpactUnit::Percent), &body, 10, 0).is_err());
    }

    #[test]
    fn net_output_applies_fee_deduction() {
        let q = VenueQuote {
            venue: "testvenue".to_string(),
            input_amount: 1,
            output_amount: 10_000,
            price_impact_bps: 0,
            latency_ms: 0,
            is_fallback: false,
            source: QuoteSourceKind::Direct,
        };
        assert_eq!(q.net_output(25), 9_975);
        assert_eq!(q.net_output(0), 10_000);
    }
}
