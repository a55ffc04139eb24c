#![deny(unreachable_pub)]

// Core modules
mod consts;
mod errors;
mod helpers;
mod prelude;
mod req;

// Shared utilities
pub mod serde_utils;
pub mod types;

// Feature modules
pub mod config;
pub mod logging;
pub mod quotes;
pub mod storage;
pub mod ws;

// Re-exports
pub use config::AppConfig;
pub use consts::{
    GET_LIVE_QUOTES_EVENT, LOCAL_API_URL, PRODUCTION_API_URL, QUICK_QUOTE_EVENT, STAGING_API_URL,
    TRIP_STORAGE_KEY,
};
pub use errors::{Error, HttpErrorKind, ParseError, ShapeError, WsError};
pub use helpers::{parse_digits, BaseUrl};
pub use quotes::{
    compose, normalize, reduce, try_normalize, CoverageBand, DedupPolicy, InsurerFilter,
    PipelineConfig, PriceSort, QuoteAccumulatorState, QuoteClient, QuoteFilters, QuotePipeline,
    QuoteView, ViewStatus,
};
pub use storage::{FileTripStore, InMemoryTripStore, TripStore};
pub use types::*;
pub use ws::{ConnectionConfig, ConnectionManager, ConnectionStats, ConnectionStatus, TransportKind};
