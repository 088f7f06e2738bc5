// Dynamic weight calculator
// Converts the baseline + scored candidate set into a normalized per-source
// allocation. The whole pipeline runs in integer weight basis points
// (1 weight-bp = 1e-4); floats only appear at the serialization boundary, so
// the sum invariant holds exactly and the function is bit-deterministic.

use crate::router::aggregator::AggregatedQuotes;
use serde::Serialize;
use std::collections::BTreeMap;

/// Full allocation: 10_000 weight-bps.
pub const WEIGHT_SCALE: u32 = 10_000;
/// Hard cap for a promoted non-baseline source (0.30).
pub const PROMOTED_CAP_BPS: u32 = 3_000;
/// Hard cap for any other non-baseline source (0.15).
pub const DEFAULT_CAP_BPS: u32 = 1_500;

/// Normalized allocation per source. The baseline always carries the
/// normalization remainder, so `baseline_bps + sum(venue bps) == 10_000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicWeights {
    baseline_bps: u32,
    /// Candidate weights in rank order (improvement descending).
    venues: Vec<(String, u32)>,
}

impl DynamicWeights {
    pub fn baseline_only() -> Self {
        Self {
            baseline_bps: WEIGHT_SCALE,
            venues: Vec::new(),
        }
    }

    pub fn baseline_bps(&self) -> u32 {
        self.baseline_bps
    }

    pub fn baseline(&self) -> f64 {
        self.baseline_bps as f64 / WEIGHT_SCALE as f64
    }

    pub fn venue_bps(&self, venue: &str) -> Option<u32> {
        self.venues
            .iter()
            .find(|(name, _)| name == venue)
            .map(|(_, bps)| *bps)
    }

    pub fn venues(&self) -> &[(String, u32)] {
        &self.venues
    }

    pub fn sum_bps(&self) -> u32 {
        self.baseline_bps + self.venues.iter().map(|(_, bps)| bps).sum::<u32>()
    }

    /// Display-float view for API responses.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert(
            "baseline".to_string(),
            self.baseline_bps as f64 / WEIGHT_SCALE as f64,
        );
        for (name, bps) in &self.venues {
            map.insert(name.clone(), *bps as f64 / WEIGHT_SCALE as f64);
        }
        map
    }
}

/// Raw score for one source, scaled x10 so the impact multiplier stays in
/// integer arithmetic (x1.2 -> *12, x0.7 -> *7, x1.0 -> *10).
fn scaled_score(improvement_bps: i64, price_impact_bps: i64) -> i64 {
    let base = if improvement_bps > 5 {
        100 + improvement_bps * 2
    } else if improvement_bps >= 0 {
        50 + improvement_bps
    } else {
        (50 + improvement_bps).max(10)
    };
    let multiplier = if price_impact_bps < 10 {
        12
    } else if price_impact_bps > 100 {
        7
    } else {
        10
    };
    base * multiplier
}

/// Compute the normalized allocation. Deterministic given identical inputs.
pub fn calculate_weights(agg: &AggregatedQuotes) -> DynamicWeights {
    if agg.candidates.is_empty() {
        return DynamicWeights::baseline_only();
    }

    // Baseline scores as a zero-improvement source with its own impact.
    let baseline_score = scaled_score(0, agg.baseline.price_impact_bps);
    let candidate_scores: Vec<i64> = agg
        .candidates
        .iter()
        .map(|c| scaled_score(c.improvement_bps, c.quote.price_impact_bps))
        .collect();
    let total: i64 = baseline_score + candidate_scores.iter().sum::<i64>();

    // Normalize to weight-bps (floor division = rounding toward the
    // remainder, which the baseline absorbs below), then apply caps.
    let mut venues = Vec::with_capacity(agg.candidates.len());
    let mut allocated: u32 = 0;
    for (candidate, score) in agg.candidates.iter().zip(&candidate_scores) {
        let raw_bps = (score * WEIGHT_SCALE as i64 / total) as u32;
        let cap = if candidate.is_promoted() {
            PROMOTED_CAP_BPS
        } else {
            DEFAULT_CAP_BPS
        };
        let bps = raw_bps.min(cap);
        allocated += bps;
        venues.push((candidate.quote.venue.clone(), bps));
    }

    // The baseline takes the exact remainder so the sum is 10_000 without a
    // float correction pass.
    DynamicWeights {
        baseline_bps: WEIGHT_SCALE - allocated,
        venues,
    }
}
