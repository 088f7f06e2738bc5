// Venue layer - per-venue quote adapters, scatter-gather fetching, and
// synthetic fallback pricing

pub mod adapter;
pub mod fetcher;
pub mod pricing;

pub use adapter::{HttpVenueAdapter, QuoteRequest, QuoteSourceKind, VenueAdapter, VenueQuote, VenueRegistry};
pub use fetcher::{FetchFailure, FetchedQuotes, QuoteFetcher};
pub use pricing::{PriceFeed, UnitPrice, UnitPriceSource};
