// Quote aggregation against the baseline reference route
// Pure computation: relative improvement in basis points for each candidate,
// ranking, and the promotion threshold used by the allocation stages.

use crate::config::RouterConfig;
use crate::errors::RouterError;
use crate::venues::adapter::VenueQuote;
use serde::Serialize;

/// A candidate is only routed separately when it beats the baseline by more
/// than this many basis points. Promotion is a threshold, not a discount.
pub const PROMOTION_THRESHOLD_BPS: i64 = 5;

/// A venue quote scored against the baseline of the same request.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteResult {
    pub quote: VenueQuote,
    pub latency_ms: u64,
    /// Signed improvement relative to the baseline output; negative means
    /// worse than baseline.
    pub improvement_bps: i64,
    /// Output after the venue-specific deduction.
    pub net_out_amount: u64,
}

impl QuoteResult {
    pub fn is_promoted(&self) -> bool {
        self.improvement_bps > PROMOTION_THRESHOLD_BPS
    }
}

/// `(net_out - baseline_out) * 10000 / baseline_out` in integer arithmetic.
/// i128 intermediates keep the multiply exact at large magnitudes.
pub fn improvement_bps(net_out: u64, baseline_out: u64) -> i64 {
    debug_assert!(baseline_out > 0);
    ((net_out as i128 - baseline_out as i128) * 10_000 / baseline_out as i128) as i64
}

/// Baseline plus ranked candidates for one request.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedQuotes {
    pub baseline: VenueQuote,
    /// Candidates ordered by improvement descending.
    pub candidates: Vec<QuoteResult>,
}

impl AggregatedQuotes {
    pub fn promoted(&self) -> impl Iterator<Item = &QuoteResult> {
        self.candidates.iter().filter(|c| c.is_promoted())
    }
}

/// Score every candidate against the one baseline of this request. Pure over
/// its inputs; performs no I/O.
pub fn aggregate(
    baseline: VenueQuote,
    quotes: &[VenueQuote],
    config: &RouterConfig,
) -> Result<AggregatedQuotes, RouterError> {
    if baseline.output_amount == 0 {
        return Err(RouterError::InvalidBaseline(
            "baseline output amount is zero".to_string(),
        ));
    }

    let baseline_out = baseline.output_amount;
    let mut candidates: Vec<QuoteResult> = quotes
        .iter()
        .map(|quote| {
            let fee_bps = config
                .venues
                .iter()
                .find(|def| def.name == quote.venue)
                .map(|def| def.fee_bps)
                .unwrap_or(0);
            let net_out_amount = quote.net_output(fee_bps);
            QuoteResult {
                latency_ms: quote.latency_ms,
                improvement_bps: improvement_bps(net_out_amount, baseline_out),
                net_out_amount,
                quote: quote.clone(),
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.improvement_bps.cmp(&a.improvement_bps));

    Ok(AggregatedQuotes {
        baseline,
        candidates,
    })
}
