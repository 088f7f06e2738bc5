// Routing pipeline and HTTP API
// Ties fetch -> aggregate -> weigh -> build-intents together for one request
// and exposes the result over axum endpoints. All stages after the fetch are
// synchronous pure computation over request-local data.

use crate::config::RouterConfig;
use crate::control::AdmissionControl;
use crate::errors::RouterError;
use crate::metrics::{self, ROUTE_REQUESTS};
use crate::router::aggregator::{aggregate, AggregatedQuotes};
use crate::router::intents::{build_intents, HybridRouteIntent, RoutingStrategy};
use crate::router::validation::{validate_request, RawRouteRequest};
use crate::router::weights::calculate_weights;
use crate::venues::adapter::VenueQuote;
use crate::venues::fetcher::QuoteFetcher;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router as AxumRouter,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Aggregated quote response as served on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub success: bool,
    pub quotes: Vec<VenueQuote>,
    pub best_quote: Option<VenueQuote>,
    pub total_latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_venues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub id: String,
    pub kind: crate::router::intents::IntentKind,
    pub label: String,
    pub percentage: f64,
    pub eta_seconds: u32,
    pub channel: crate::router::intents::Channel,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_bps: Option<i64>,
}

impl From<HybridRouteIntent> for IntentResponse {
    fn from(leg: HybridRouteIntent) -> Self {
        Self {
            percentage: leg.percentage(),
            id: leg.id,
            kind: leg.kind,
            label: leg.label,
            eta_seconds: leg.eta_seconds,
            channel: leg.channel,
            description: leg.description,
            slice_count: leg.slice_count,
            venue_source: leg.venue_source,
            improvement_bps: leg.improvement_bps,
        }
    }
}

/// Full execution plan handed to the external transaction constructor.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanResponse {
    pub success: bool,
    pub strategy: RoutingStrategy,
    pub intents: Vec<IntentResponse>,
    pub weights: BTreeMap<String, f64>,
    pub best_quote: Option<VenueQuote>,
    pub total_latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_venues: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct VenueInfo {
    pub name: String,
    pub style: crate::config::VenueStyle,
    pub fee_bps: u16,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// One routing pipeline instance; all state it touches is request-local or
/// read-only configuration.
pub struct Router {
    fetcher: QuoteFetcher,
    config: Arc<RouterConfig>,
    admission: AdmissionControl,
}

impl Router {
    pub fn new(fetcher: QuoteFetcher, config: Arc<RouterConfig>) -> Self {
        let admission = AdmissionControl::new(config.max_inflight, None);
        Self {
            fetcher,
            config,
            admission,
        }
    }

    /// Fetch-and-rank only, without plan construction.
    pub async fn quotes(&self, raw: &RawRouteRequest) -> Result<QuoteResponse, RouterError> {
        let (req, _strategy) = validate_request(raw, &self.config)?;
        let _permit = self.admission.acquire().await;

        match self.fetcher.fetch(&req).await {
            Ok(fetched) => Ok(QuoteResponse {
                success: true,
                best_quote: fetched.best_quote().cloned(),
                quotes: fetched.quotes,
                total_latency_ms: fetched.total_latency_ms,
                failed_venues: fetched.failed_venues,
                error: None,
            }),
            Err(failure) => Ok(QuoteResponse {
                success: false,
                quotes: Vec::new(),
                best_quote: None,
                total_latency_ms: failure.total_latency_ms,
                failed_venues: failure.failed_venues,
                error: Some(failure.error.to_string()),
            }),
        }
    }

    /// Full pipeline: fetch, aggregate against the baseline, weigh, and emit
    /// the normalized intent list.
    pub async fn route(&self, raw: &RawRouteRequest) -> Result<RoutePlanResponse, RouterError> {
        let (req, strategy) = validate_request(raw, &self.config)?;
        let _permit = self.admission.acquire().await;

        let fetched = self
            .fetcher
            .fetch(&req)
            .await
            .map_err(|failure| failure.error)?;

        let baseline = fetched.baseline.clone().ok_or_else(|| {
            RouterError::InvalidBaseline("reference venue produced no quote".to_string())
        })?;

        let aggregated: AggregatedQuotes =
            aggregate(baseline, &fetched.quotes, &self.config)?;
        let weights = calculate_weights(&aggregated);
        let intents = build_intents(&aggregated, &weights, strategy, &req, &self.config)?;

        info!(
            strategy = ?strategy,
            intents = intents.len(),
            candidates = aggregated.candidates.len(),
            baseline_weight_bps = weights.baseline_bps(),
            "route plan built"
        );

        Ok(RoutePlanResponse {
            success: true,
            strategy,
            intents: intents.into_iter().map(IntentResponse::from).collect(),
            weights: weights.to_map(),
            best_quote: fetched.best_quote().cloned(),
            total_latency_ms: fetched.total_latency_ms,
            failed_venues: fetched.failed_venues,
        })
    }

    pub fn venues(&self) -> Vec<VenueInfo> {
        self.config
            .venues
            .iter()
            .map(|def| VenueInfo {
                name: def.name.clone(),
                style: def.style,
                fee_bps: def.fee_bps,
            })
            .collect()
    }
}

/// Create the HTTP router with API endpoints.
pub fn create_api_router(router: Arc<Router>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/api/v1/quote", post(quote_handler))
        .route("/api/v1/route", post(route_handler))
        .route("/api/v1/venues", get(venues_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(router)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

fn error_status(err: &RouterError) -> StatusCode {
    match err {
        RouterError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
        RouterError::InvalidBaseline(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RouterError::AllVenuesFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn quote_handler(
    State(router): State<Arc<Router>>,
    Json(raw): Json<RawRouteRequest>,
) -> Result<Json<QuoteResponse>, (StatusCode, Json<ErrorResponse>)> {
    match router.quotes(&raw).await {
        Ok(resp) => {
            let outcome = if resp.success { "ok" } else { "failed" };
            ROUTE_REQUESTS.with_label_values(&["quote", outcome]).inc();
            Ok(Json(resp))
        }
        Err(err) => {
            ROUTE_REQUESTS.with_label_values(&["quote", "rejected"]).inc();
            Err((
                error_status(&err),
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

async fn route_handler(
    State(router): State<Arc<Router>>,
    Json(raw): Json<RawRouteRequest>,
) -> Result<Json<RoutePlanResponse>, (StatusCode, Json<ErrorResponse>)> {
    match router.route(&raw).await {
        Ok(resp) => {
            ROUTE_REQUESTS.with_label_values(&["route", "ok"]).inc();
            Ok(Json(resp))
        }
        Err(err) => {
            ROUTE_REQUESTS.with_label_values(&["route", "failed"]).inc();
            Err((
                error_status(&err),
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

async fn venues_handler(State(router): State<Arc<Router>>) -> Json<Vec<VenueInfo>> {
    Json(router.venues())
}

async fn metrics_handler() -> String {
    metrics::render()
}
