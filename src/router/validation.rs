// Pre-I/O request validation
// Malformed parameters are rejected here, before any venue or price call is
// issued. Mints are format-checked only, never existence-checked.

use crate::config::RouterConfig;
use crate::errors::RouterError;
use crate::router::intents::RoutingStrategy;
use crate::venues::adapter::QuoteRequest;
use serde::Deserialize;

/// Inbound routing request as received on the wire. Amounts may arrive as a
/// JSON string or integer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRouteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: serde_json::Value,
    pub slippage_bps: Option<u16>,
    pub strategy: Option<String>,
}

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn into_result(self) -> Result<(), RouterError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(RouterError::InvalidParameters(self.errors.join("; ")))
        }
    }
}

/// Validate and normalize a raw request into pipeline parameters.
pub fn validate_request(
    raw: &RawRouteRequest,
    config: &RouterConfig,
) -> Result<(QuoteRequest, RoutingStrategy), RouterError> {
    let mut result = ValidationResult::default();

    if !is_valid_mint(&raw.input_mint) {
        result.add_error(format!("invalid input mint: {}", raw.input_mint));
    }
    if !is_valid_mint(&raw.output_mint) {
        result.add_error(format!("invalid output mint: {}", raw.output_mint));
    }
    if raw.input_mint == raw.output_mint {
        result.add_error("input and output mints are identical".to_string());
    }

    let amount = match parse_amount(&raw.amount) {
        Some(amount) if amount > 0 => amount,
        _ => {
            result.add_error(format!("invalid amount: {}", raw.amount));
            0
        }
    };

    let slippage_bps = raw.slippage_bps.unwrap_or(config.default_slippage_bps);
    if slippage_bps > 10_000 {
        result.add_error(format!("slippage {slippage_bps} bps above 100%"));
    }

    let strategy = match &raw.strategy {
        Some(s) => match s.parse::<RoutingStrategy>() {
            Ok(strategy) => strategy,
            Err(err) => {
                result.add_error(err.to_string());
                RoutingStrategy::default()
            }
        },
        None => RoutingStrategy::default(),
    };

    result.into_result()?;

    Ok((
        QuoteRequest {
            input_mint: raw.input_mint.clone(),
            output_mint: raw.output_mint.clone(),
            amount,
            slippage_bps,
        },
        strategy,
    ))
}

/// Base58 token identifier, 32-44 characters. Format check only.
fn is_valid_mint(mint: &str) -> bool {
    let len_ok = (32..=44).contains(&mint.len());
    len_ok
        && mint.chars().all(|c| {
            c.is_ascii_alphanumeric() && c != '0' && c != 'O' && c != 'I' && c != 'l'
        })
}

fn parse_amount(v: &serde_json::Value) -> Option<u64> {
    match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, SOL_MINT, USDC_MINT};
    use serde_json::json;

    fn config() -> RouterConfig {
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
        app.router_config().unwrap()
    }

    fn raw(amount: serde_json::Value) -> RawRouteRequest {
        RawRouteRequest {
            input_mint: SOL_MINT.to_string(),
            output_mint: USDC_MINT.to_string(),
            amount,
            slippage_bps: None,
            strategy: None,
        }
    }

    #[test]
    fn accepts_string_and_integer_amounts() {
        let cfg = config();
        let (req, strategy) = validate_request(&raw(json!("1000000000")), &cfg).unwrap();
        assert_eq!(req.amount, 1_000_000_000);
        assert_eq!(req.slippage_bps, 50);
        assert_eq!(strategy, RoutingStrategy::Smart);

        let (req, _) = validate_request(&raw(json!(250)), &cfg).unwrap();
        assert_eq!(req.amount, 250);
    }

    #[test]
    fn rejects_zero_negative_and_garbage_amounts() {
        let cfg = config();
        for bad in [json!("0"), json!(0), json!(-5), json!("1.5"), json!(null)] {
            let err = validate_request(&raw(bad), &cfg).unwrap_err();
            assert!(matches!(err, RouterError::InvalidParameters(_)));
        }
    }

    #[test]
    fn rejects_malformed_mints() {
        let cfg = config();
        let mut bad = raw(json!(100));
        bad.input_mint = "short".to_string();
        assert!(validate_request(&bad, &cfg).is_err());

        let mut bad = raw(json!(100));
        bad.output_mint = "0OIl".repeat(10); // excluded base58 characters
        assert!(validate_request(&bad, &cfg).is_err());

        let mut bad = raw(json!(100));
        bad.output_mint = bad.input_mint.clone();
        assert!(validate_request(&bad, &cfg).is_err());
    }

    #[test]
    fn strategy_parsing_defaults_to_smart() {
        let cfg = config();
        let mut r = raw(json!(100));
        r.strategy = Some("defensive".to_string());
        let (_, strategy) = validate_request(&r, &cfg).unwrap();
        assert_eq!(strategy, RoutingStrategy::Defensive);

        let mut r = raw(json!(100));
        r.strategy = Some("yolo".to_string());
        assert!(validate_request(&r, &cfg).is_err());
    }

    #[test]
    fn slippage_bounds_checked() {
        let cfg = config();
        let mut r = raw(json!(100));
        r.slippage_bps = Some(10_001);
        assert!(validate_request(&r, &cfg).is_err());
        let mut r = raw(json!(100));
        r.slippage_bps = Some(100);
        let (req, _) = validate_request(&r, &cfg).unwrap();
        assert_eq!(req.slippage_bps, 100);
    }
}
