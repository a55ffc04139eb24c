pub mod accumulator;
pub mod composer;
pub mod filter;
pub mod normalizer;
mod pipeline;
mod quote_client;

pub use accumulator::{reduce, DedupPolicy, QuoteAccumulatorState, RawEventLog, RawEventRecord};
pub use composer::compose;
pub use filter::{CoverageBand, InsurerFilter, PriceSort, QuoteFilters};
pub use normalizer::{normalize, try_normalize};
pub use pipeline::{PipelineConfig, QuotePipeline, QuoteView, ViewStatus};
pub use quote_client::QuoteClient;
