// Error types and error handling module
// This file defines the error taxonomy for the swap-aggr routing pipeline.
// Per-venue failures are recovered locally and reported via the failed-venue
// list; only total failure of the data source set surfaces to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// A single venue did not answer within its timeout. Never fatal on its own.
    #[error("venue {venue} timed out after {timeout_ms}ms")]
    VenueTimeout { venue: String, timeout_ms: u64 },
    /// A single venue could not be reached (transport failure or 5xx).
    #[error("venue {venue} unavailable: {reason}")]
    VenueUnavailable { venue: String, reason: String },
    /// A single venue answered, but the answer is unusable (client error,
    /// unparseable or error payload). Retrying will not change it.
    #[error("venue {venue} rejected the request: {reason}")]
    VenueRejected { venue: String, reason: String },
    /// Neither direct nor fallback quotes exist for any configured venue.
    #[error("all venues failed: {0}")]
    AllVenuesFailed(String),
    /// No usable reference quote to anchor a plan on.
    #[error("invalid baseline quote: {0}")]
    InvalidBaseline(String),
    /// Unit-price lookup failed for a mint; the affected fallback is skipped.
    #[error("missing price data for mint {0}")]
    MissingPriceData(String),
    /// Malformed request, rejected before any I/O is issued.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

impl RouterError {
    /// Whether the error is isolated to one venue and must not abort siblings.
    pub fn is_per_venue(&self) -> bool {
        matches!(
            self,
            RouterError::VenueTimeout { .. }
                | RouterError::VenueUnavailable { .. }
                | RouterError::VenueRejected { .. }
        )
    }

    /// Whether another attempt can plausibly succeed. Rejections are final;
    /// timeouts and transport failures are worth a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::VenueTimeout { .. } | RouterError::VenueUnavailable { .. }
        )
    }
}
