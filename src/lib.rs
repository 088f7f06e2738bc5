// Library root module for swap-aggr
// This file defines the public API and module structure for the swap-aggr
// library. It exports the quote-fetch, aggregation, and routing planes.

pub mod config;
pub mod control;
pub mod errors;
pub mod metrics;
pub mod router;
pub mod venues;
