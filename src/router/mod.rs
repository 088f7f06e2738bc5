// Router module - quote aggregation and allocation plane
// Scores venue quotes against the baseline, derives the dynamic allocation,
// and compiles it into an executable intent list.

pub mod aggregator;
pub mod intents;
pub mod validation;
pub mod weights;

#[allow(clippy::module_inception)]
pub mod router;

pub use aggregator::{aggregate, AggregatedQuotes, QuoteResult, PROMOTION_THRESHOLD_BPS};
pub use intents::{build_intents, Channel, HybridRouteIntent, IntentKind, RoutingStrategy};
pub use router::{create_api_router, Router};
pub use validation::{validate_request, RawRouteRequest};
pub use weights::{calculate_weights, DynamicWeights, WEIGHT_SCALE};
