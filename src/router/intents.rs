// Route intent builder
// Turns (baseline quote, weights, strategy, order parameters) into the final
// ordered list of execution intents. Percentages are integer basis points
// rounded to 2-decimal resolution, with the rounding residual folded into the
// leading Primary intent so the list always sums to exactly 1.00.

use crate::config::RouterConfig;
use crate::errors::RouterError;
use crate::router::aggregator::AggregatedQuotes;
use crate::router::weights::DynamicWeights;
use crate::venues::adapter::QuoteRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk/latency policy selected by the caller; immutable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    #[default]
    Smart,
    Aggressive,
    Defensive,
}

impl std::str::FromStr for RoutingStrategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(RoutingStrategy::Smart),
            "aggressive" => Ok(RoutingStrategy::Aggressive),
            "defensive" => Ok(RoutingStrategy::Defensive),
            other => Err(RouterError::InvalidParameters(format!(
                "unknown strategy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Primary,
    TimeSliced,
    InternalLiquidity,
    DirectVenue,
}

/// Submission channel for one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Public,
    PriorityRelay,
    PrivateRelay,
}

/// One weighted, timed, channel-tagged slice of the execution plan.
#[derive(Debug, Clone, Serialize)]
pub struct HybridRouteIntent {
    pub id: String,
    pub kind: IntentKind,
    pub label: String,
    /// Allocation in basis points; multiples of 100 after normalization.
    pub percentage_bps: u32,
    pub eta_seconds: u32,
    pub channel: Channel,
    pub description: String,
    pub slice_count: Option<u32>,
    pub venue_source: Option<String>,
    pub improvement_bps: Option<i64>,
}

impl HybridRouteIntent {
    pub fn percentage(&self) -> f64 {
        self.percentage_bps as f64 / 10_000.0
    }
}

/// Smart primary share for large orders when no calculator output exists.
const LARGE_ORDER_PRIMARY_BPS: u32 = 5_500;
/// Smart primary share for regular orders when no calculator output exists.
const DEFAULT_PRIMARY_BPS: u32 = 8_000;
/// DirectVenue intents below this calculator weight are not worth a leg.
const MIN_DIRECT_VENUE_BPS: u32 = 100;

/// Build the ordered intent list. Fails fast with InvalidBaseline when the
/// reference quote is unusable; never builds a plan from fallbacks alone.
pub fn build_intents(
    agg: &AggregatedQuotes,
    weights: &DynamicWeights,
    strategy: RoutingStrategy,
    req: &QuoteRequest,
    config: &RouterConfig,
) -> Result<Vec<HybridRouteIntent>, RouterError> {
    if agg.baseline.output_amount == 0 {
        return Err(RouterError::InvalidBaseline(
            "baseline output amount is zero".to_string(),
        ));
    }

    let mut intents = Vec::new();

    if strategy == RoutingStrategy::Aggressive {
        // Single concentrated leg; no slicing, no side routes.
        intents.push(intent(
            IntentKind::Primary,
            "Reference Route",
            10_000,
            5,
            Channel::Public,
            "Full allocation through the reference route".to_string(),
        ));
        return Ok(normalize(intents));
    }

    let primary_bps = if agg.candidates.is_empty() {
        if req.amount > config.large_order_threshold {
            LARGE_ORDER_PRIMARY_BPS
        } else {
            DEFAULT_PRIMARY_BPS
        }
    } else {
        weights.baseline_bps()
    };
    intents.push(intent(
        IntentKind::Primary,
        "Reference Route",
        primary_bps,
        5,
        Channel::Public,
        "Baseline allocation through the reference route".to_string(),
    ));

    // One direct leg per promoted candidate carrying real calculator weight.
    for candidate in agg.promoted() {
        let venue = &candidate.quote.venue;
        let Some(bps) = weights.venue_bps(venue) else {
            continue;
        };
        if bps <= MIN_DIRECT_VENUE_BPS {
            continue;
        }
        let mut leg = intent(
            IntentKind::DirectVenue,
            &format!("{venue} direct"),
            bps,
            4,
            Channel::Public,
            format!(
                "Direct {venue} route (+{} bps vs reference)",
                candidate.improvement_bps
            ),
        );
        leg.venue_source = Some(venue.clone());
        leg.improvement_bps = Some(candidate.improvement_bps);
        intents.push(leg);
    }

    // Time-slice large or high-impact orders.
    let high_impact = agg.baseline.price_impact_bps > 100;
    if req.amount > config.large_order_threshold || high_impact {
        let (slices, bps) = match strategy {
            RoutingStrategy::Defensive => (6u32, 3_500),
            _ => (4u32, 2_000),
        };
        let mut leg = intent(
            IntentKind::TimeSliced,
            "Time-sliced execution",
            bps,
            slices * 15,
            Channel::PriorityRelay,
            format!("{slices} slices through the priority relay to limit impact"),
        );
        leg.slice_count = Some(slices);
        intents.push(leg);
    }

    // High-liquidity pairs can take a slice through internal liquidity.
    if config.tokens.is_high_liquidity(&req.input_mint)
        || config.tokens.is_high_liquidity(&req.output_mint)
    {
        intents.push(intent(
            IntentKind::InternalLiquidity,
            "Internal liquidity",
            1_500,
            12,
            Channel::PrivateRelay,
            "Internal pool fill over the private relay".to_string(),
        ));
    }

    Ok(normalize(intents))
}

fn intent(
    kind: IntentKind,
    label: &str,
    percentage_bps: u32,
    eta_seconds: u32,
    channel: Channel,
    description: String,
) -> HybridRouteIntent {
    HybridRouteIntent {
        id: Uuid::new_v4().to_string(),
        kind,
        label: label.to_string(),
        percentage_bps,
        eta_seconds,
        channel,
        description,
        slice_count: None,
        venue_source: None,
        improvement_bps: None,
    }
}

/// Floor share kept by the Primary leg even when the calculator pushes its
/// weight below rounding resolution.
const PRIMARY_FLOOR_BPS: u32 = 100;

/// Rescale percentages so they sum to exactly 10_000 in multiples of 100
/// (2-decimal display resolution). The Primary leg is floored at 1%, side
/// legs whose share rounds to zero are dropped, and the rounding residual
/// lands on the largest leg, which always dwarfs the worst-case residual.
fn normalize(mut intents: Vec<HybridRouteIntent>) -> Vec<HybridRouteIntent> {
    let sum: u64 = intents.iter().map(|i| i.percentage_bps as u64).sum();
    if sum == 0 {
        return intents;
    }

    for leg in &mut intents {
        let scaled = leg.percentage_bps as u64 * 10_000 / sum;
        // round to the nearest multiple of 100 (= 0.01)
        leg.percentage_bps = ((scaled + 50) / 100 * 100) as u32;
    }
    if intents[0].percentage_bps < PRIMARY_FLOOR_BPS {
        intents[0].percentage_bps = PRIMARY_FLOOR_BPS;
    }
    let mut intents: Vec<HybridRouteIntent> = intents
        .into_iter()
        .filter(|leg| leg.percentage_bps > 0)
        .collect();

    let rounded_sum: i64 = intents.iter().map(|i| i.percentage_bps as i64).sum();
    let residual = 10_000 - rounded_sum;
    if residual != 0 {
        if let Some(leg) = intents.iter_mut().max_by_key(|i| i.percentage_bps) {
            let adjusted = leg.percentage_bps as i64 + residual;
            leg.percentage_bps = adjusted.clamp(PRIMARY_FLOOR_BPS as i64, 10_000) as u32;
        }
    }
    debug_assert_eq!(
        intents.iter().map(|i| i.percentage_bps as i64).sum::<i64>(),
        10_000
    );
    debug_assert!(intents.iter().all(|i| i.percentage_bps > 0));
    intents
}
