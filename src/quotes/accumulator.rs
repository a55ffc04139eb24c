//! Running, deduplicated collection of quotes received on one pipeline.

use std::collections::{HashSet, VecDeque};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NormalizedQuote;

/// How a quote whose `id` is already present is merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// The first arrival is authoritative; later copies are discarded.
    #[default]
    FirstWins,
    /// A later copy replaces the stored quote, keeping its original position.
    LatestWins,
}

/// A raw stream event kept for diagnostics.
#[derive(Debug, Clone)]
pub struct RawEventRecord {
    pub received_at: SystemTime,
    pub payload: Value,
}

/// Fixed-capacity log of the most recent raw events. Capacity `0` disables it.
#[derive(Debug, Clone, Default)]
pub struct RawEventLog {
    capacity: usize,
    records: VecDeque<RawEventRecord>,
    dropped: u64,
}

impl RawEventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.min(64)),
            dropped: 0,
        }
    }

    pub fn push(&mut self, payload: &Value) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.dropped += 1;
        }
        self.records.push_back(RawEventRecord {
            received_at: SystemTime::now(),
            payload: payload.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records evicted to stay within capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawEventRecord> {
        self.records.iter()
    }
}

#[derive(Debug, Clone)]
pub struct QuoteAccumulatorState {
    /// Unique by `id`, in order of first arrival.
    pub quotes: Vec<NormalizedQuote>,
    pub is_loading: bool,
    pub received_first_batch: bool,
    pub is_connected: bool,
    /// Most recent event-handling failure.
    pub error: Option<String>,
    pub raw_event_log: RawEventLog,
}

impl QuoteAccumulatorState {
    /// State at pipeline activation: loading, nothing received.
    pub fn new(raw_log_capacity: usize) -> Self {
        Self {
            quotes: Vec::new(),
            is_loading: true,
            received_first_batch: false,
            is_connected: false,
            error: None,
            raw_event_log: RawEventLog::with_capacity(raw_log_capacity),
        }
    }

    /// Marks the stream settled without data: the loading timeout elapsed.
    pub fn settle_on_timeout(&mut self) {
        self.is_loading = false;
        self.received_first_batch = true;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

impl Default for QuoteAccumulatorState {
    fn default() -> Self {
        Self::new(crate::consts::DEFAULT_RAW_LOG_CAPACITY)
    }
}

/// Merges a normalized batch into `state`.
///
/// New ids are appended in batch order. Duplicates, whether against the state
/// or within the batch, follow `policy`. Any processed batch, including an
/// empty one, marks the first batch as received and ends loading.
pub fn reduce(
    mut state: QuoteAccumulatorState,
    batch: Vec<NormalizedQuote>,
    policy: DedupPolicy,
) -> QuoteAccumulatorState {
    let mut seen: HashSet<String> = state.quotes.iter().map(|q| q.id.clone()).collect();

    for quote in batch {
        if seen.insert(quote.id.clone()) {
            state.quotes.push(quote);
            continue;
        }
        if policy == DedupPolicy::LatestWins {
            if let Some(existing) = state.quotes.iter_mut().find(|q| q.id == quote.id) {
                *existing = quote;
            }
        }
    }

    state.received_first_batch = true;
    state.is_loading = false;
    state
}
