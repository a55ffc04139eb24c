//! Live quote pipeline: one activation of the quotation step.
//!
//! A pipeline registers a `QuickQuote` listener on the shared connection,
//! emits the composed request and runs a single task that owns the
//! accumulator. Consumers read [`QuoteView`] snapshots from a watch channel
//! and change filters through the pipeline handle.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    spawn,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver},
        watch,
    },
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    consts::{
        DEFAULT_LOADING_TIMEOUT_SECS, DEFAULT_RAW_LOG_CAPACITY, GET_LIVE_QUOTES_EVENT,
        QUICK_QUOTE_EVENT,
    },
    prelude::*,
    quotes::{
        accumulator::{reduce, DedupPolicy, QuoteAccumulatorState},
        composer::compose,
        filter::{self, QuoteFilters},
        normalizer::try_normalize,
    },
    types::{NormalizedQuote, QuoteRequest, TripContext},
    ws::{ConnectionManager, ConnectionStatus, ServerEvent},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Loading ends at the latest this long after activation (default: 20s)
    pub loading_timeout: Duration,
    /// Raw events kept for diagnostics; `0` disables the log (default: 32)
    pub raw_log_capacity: usize,
    pub dedup_policy: DedupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            loading_timeout: Duration::from_secs(DEFAULT_LOADING_TIMEOUT_SECS),
            raw_log_capacity: DEFAULT_RAW_LOG_CAPACITY,
            dedup_policy: DedupPolicy::FirstWins,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    Loading,
    ConnectingWarning,
    Populated,
    Empty,
}

/// Snapshot of what the quotation step displays.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteView {
    pub status: ViewStatus,
    /// Accumulated quotes after filtering and sorting.
    pub quotes: Vec<NormalizedQuote>,
    /// Quotes received so far, before filtering.
    pub total_received: usize,
    pub purchasable_count: usize,
    /// Insurers present in the accumulated quotes, for the insurer picker.
    pub providers: Vec<String>,
    pub filters: QuoteFilters,
    pub any_filter_active: bool,
    pub is_loading: bool,
    pub received_first_batch: bool,
    pub is_connected: bool,
    pub connectivity_warning: Option<String>,
    /// Last event-handling failure.
    pub error: Option<String>,
}

impl QuoteView {
    fn initial(filters: QuoteFilters) -> Self {
        Self {
            status: ViewStatus::Loading,
            quotes: Vec::new(),
            total_received: 0,
            purchasable_count: 0,
            providers: Vec::new(),
            any_filter_active: filters.any_active(),
            filters,
            is_loading: true,
            received_first_batch: false,
            is_connected: false,
            connectivity_warning: None,
            error: None,
        }
    }
}

type ConnectivityProbe = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// The pipeline task. Exclusively owns the accumulator state.
pub(crate) struct PipelineDriver {
    config: PipelineConfig,
    travellers_count: u32,
    state: QuoteAccumulatorState,
    deadline: Instant,
    events: UnboundedReceiver<Arc<ServerEvent>>,
    filters: watch::Receiver<QuoteFilters>,
    status: watch::Receiver<ConnectionStatus>,
    connectivity: ConnectivityProbe,
    view: watch::Sender<QuoteView>,
}

impl PipelineDriver {
    pub(crate) fn new(
        config: PipelineConfig,
        travellers_count: u32,
        events: UnboundedReceiver<Arc<ServerEvent>>,
        filters: watch::Receiver<QuoteFilters>,
        status: watch::Receiver<ConnectionStatus>,
        connectivity: ConnectivityProbe,
    ) -> (Self, watch::Receiver<QuoteView>) {
        let (view, view_rx) = watch::channel(QuoteView::initial(filters.borrow().clone()));
        let driver = Self {
            deadline: Instant::now() + config.loading_timeout,
            state: QuoteAccumulatorState::new(config.raw_log_capacity),
            config,
            travellers_count,
            events,
            filters,
            status,
            connectivity,
            view,
        };
        (driver, view_rx)
    }

    /// Runs until the event stream ends or the pipeline handle is dropped.
    pub(crate) async fn run(mut self) {
        let loading_timeout = time::sleep_until(self.deadline);
        tokio::pin!(loading_timeout);
        let mut status_open = true;

        self.state.is_connected = *self.status.borrow_and_update() == ConnectionStatus::Connected;
        self.publish();

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        debug!("Quote event stream closed");
                        break;
                    }
                },
                _ = &mut loading_timeout, if self.state.is_loading => {
                    info!(
                        timeout_secs = self.config.loading_timeout.as_secs(),
                        "No quotes before loading timeout, settling"
                    );
                    self.state.settle_on_timeout();
                }
                changed = self.filters.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!(filters = ?*self.filters.borrow(), "Filters changed");
                }
                changed = self.status.changed(), if status_open => {
                    if changed.is_err() {
                        status_open = false;
                        self.state.is_connected = false;
                    } else {
                        let status = *self.status.borrow_and_update();
                        self.state.is_connected = status == ConnectionStatus::Connected;
                        debug!(?status, "Connection status changed");
                    }
                }
            }
            self.publish();
        }
    }

    fn handle_event(&mut self, event: &ServerEvent) {
        self.state.raw_event_log.push(&event.payload);
        let batch = match try_normalize(&event.payload, self.travellers_count) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "Unrecognized quote event");
                self.state.record_error(err.to_string());
                Vec::new()
            }
        };
        let received = batch.len();
        let state = std::mem::replace(&mut self.state, QuoteAccumulatorState::new(0));
        self.state = reduce(state, batch, self.config.dedup_policy);
        debug!(
            received,
            total = self.state.quotes.len(),
            "Merged quote batch"
        );
    }

    fn publish(&self) {
        let filters = self.filters.borrow().clone();
        let warning = if self.state.is_connected {
            None
        } else {
            (self.connectivity)()
        };
        self.view
            .send_replace(derive_view(&self.state, filters, warning));
    }
}

/// Derives the displayed snapshot from accumulator state and filters.
pub(crate) fn derive_view(
    state: &QuoteAccumulatorState,
    filters: QuoteFilters,
    connectivity_warning: Option<String>,
) -> QuoteView {
    let quotes = filter::apply(&state.quotes, &filters);
    // Unpurchasable plans are listed as unavailable but never populate the view.
    let status = if quotes.iter().any(NormalizedQuote::is_purchasable) {
        ViewStatus::Populated
    } else if connectivity_warning.is_some() {
        ViewStatus::ConnectingWarning
    } else if state.is_loading {
        ViewStatus::Loading
    } else {
        ViewStatus::Empty
    };
    QuoteView {
        status,
        quotes,
        total_received: state.quotes.len(),
        purchasable_count: filter::purchasable(&state.quotes).len(),
        providers: filter::providers(&state.quotes),
        any_filter_active: filters.any_active(),
        filters,
        is_loading: state.is_loading,
        received_first_batch: state.received_first_batch,
        is_connected: state.is_connected,
        connectivity_warning,
        error: state.error.clone(),
    }
}

/// Handle to an active pipeline. Dropping it stops the task; the shared
/// connection stays open.
#[derive(Debug)]
pub struct QuotePipeline {
    manager: ConnectionManager,
    listener_id: u32,
    request: QuoteRequest,
    filters: watch::Sender<QuoteFilters>,
    view: watch::Receiver<QuoteView>,
    task: JoinHandle<()>,
}

impl QuotePipeline {
    /// Registers the quote listener, connects and emits the request composed
    /// from `trip`. The request is queued if the connection is not up yet.
    pub async fn activate(
        manager: &ConnectionManager,
        trip: &TripContext,
        config: PipelineConfig,
        filters: QuoteFilters,
    ) -> Result<QuotePipeline> {
        let request = compose(trip);
        let (events_tx, events) = unbounded_channel();
        let listener_id = manager.on(QUICK_QUOTE_EVENT, events_tx).await;

        let (filters_tx, filters_rx) = watch::channel(filters);
        let health = manager.clone();
        let (driver, view) = PipelineDriver::new(
            config,
            request.travellers_count,
            events,
            filters_rx,
            manager.status_receiver(),
            Box::new(move || health.connectivity_warning()),
        );
        let task = spawn(driver.run());

        let pipeline = QuotePipeline {
            manager: manager.clone(),
            listener_id,
            request,
            filters: filters_tx,
            view,
            task,
        };

        manager.connect().await;
        manager
            .emit(GET_LIVE_QUOTES_EVENT, &pipeline.request)
            .await?;
        info!(
            destination = %pipeline.request.destination_id,
            travellers = pipeline.request.travellers_count,
            "Requested live quotes"
        );
        Ok(pipeline)
    }

    pub fn request(&self) -> &QuoteRequest {
        &self.request
    }

    pub fn listener_id(&self) -> u32 {
        self.listener_id
    }

    pub fn view(&self) -> QuoteView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QuoteView> {
        self.view.clone()
    }

    pub fn filters(&self) -> QuoteFilters {
        self.filters.borrow().clone()
    }

    pub fn set_filters(&self, filters: QuoteFilters) {
        self.filters.send_replace(filters);
    }

    pub fn update_filters(&self, update: impl FnOnce(&mut QuoteFilters)) {
        self.filters.send_modify(update);
    }

    pub fn reset_filters(&self) {
        self.filters.send_modify(QuoteFilters::reset);
    }

    /// Removes the listener and stops the task. The connection stays open.
    pub async fn close(self) {
        if let Err(err) = self.manager.off(self.listener_id).await {
            debug!(error = %err, "Quote listener already removed");
        }
        self.task.abort();
    }
}

impl Drop for QuotePipeline {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::filter::{CoverageBand, InsurerFilter, PriceSort};
    use crate::ws::ConnectionConfig;
    use serde_json::{json, Value};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };
    use tokio::sync::mpsc::UnboundedSender;

    struct Harness {
        events: UnboundedSender<Arc<ServerEvent>>,
        filters: watch::Sender<QuoteFilters>,
        status: watch::Sender<ConnectionStatus>,
        view: watch::Receiver<QuoteView>,
        offline: Arc<AtomicBool>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(filters: QuoteFilters) -> Self {
            let (events, events_rx) = unbounded_channel();
            let (filters, filters_rx) = watch::channel(filters);
            let (status, status_rx) = watch::channel(ConnectionStatus::Connected);
            let offline = Arc::new(AtomicBool::new(false));
            let is_offline = Arc::clone(&offline);
            let (driver, view) = PipelineDriver::new(
                PipelineConfig::default(),
                1,
                events_rx,
                filters_rx,
                status_rx,
                Box::new(move || {
                    is_offline
                        .load(Ordering::Relaxed)
                        .then(|| "Max reconnection attempts exceeded (5)".to_string())
                }),
            );
            Harness {
                events,
                filters,
                status,
                view,
                offline,
                task: spawn(driver.run()),
            }
        }

        fn push(&self, payload: Value) {
            self.events
                .send(Arc::new(ServerEvent {
                    name: QUICK_QUOTE_EVENT.to_string(),
                    payload,
                }))
                .unwrap();
        }

        async fn wait_for(&mut self, check: impl FnMut(&QuoteView) -> bool) -> QuoteView {
            time::timeout(Duration::from_secs(5), self.view.wait_for(check))
                .await
                .expect("view never matched")
                .unwrap()
                .clone()
        }
    }

    fn quote_batch(entries: &[(&str, f64, f64)]) -> Value {
        let data: serde_json::Map<String, Value> = entries
            .iter()
            .map(|(key, premium, si)| {
                (
                    key.to_string(),
                    json!({"planName": key, "netPremium": premium, "SI": si}),
                )
            })
            .collect();
        json!({ "data": data })
    }

    fn show_all() -> QuoteFilters {
        QuoteFilters {
            coverage_band: CoverageBand::ShowAll,
            ..QuoteFilters::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_settles_without_quotes() {
        let mut harness = Harness::start(QuoteFilters::default());
        let initial = harness.wait_for(|_| true).await;
        assert!(initial.is_loading);
        assert_eq!(initial.status, ViewStatus::Loading);

        time::sleep(Duration::from_secs(19)).await;
        assert!(harness.view.borrow().is_loading);

        time::sleep(Duration::from_secs(2)).await;
        let settled = harness.wait_for(|v| !v.is_loading).await;
        assert!(settled.received_first_batch);
        assert!(settled.quotes.is_empty());
        assert_eq!(settled.status, ViewStatus::Empty);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_merge_and_dedup() {
        let mut harness = Harness::start(show_all());
        harness.push(quote_batch(&[("reliance_a", 40.0, 50_000.0), ("care_b", 25.0, 100_000.0)]));
        let first = harness.wait_for(|v| v.total_received == 2).await;
        assert_eq!(first.status, ViewStatus::Populated);
        assert!(!first.is_loading);
        let ids: Vec<_> = first.quotes.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["care_b", "reliance_a"]);

        harness.push(quote_batch(&[("care_b", 99.0, 100_000.0), ("tata_c", 0.0, 50_000.0)]));
        let second = harness.wait_for(|v| v.total_received == 3).await;
        let care = second.quotes.iter().find(|q| q.id == "care_b").unwrap();
        assert_eq!(care.net_premium, 25.0);
        assert_eq!(second.purchasable_count, 2);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpurchasable_plans_settle_as_empty() {
        let mut harness = Harness::start(show_all());
        harness.push(json!({
            "reliance_a": {"netPremium": 0, "SI": "100000"},
            "godigit_b": {"SI": "100000"}
        }));
        let view = harness.wait_for(|v| v.total_received == 2).await;
        assert!(!view.is_loading);
        assert_eq!(view.purchasable_count, 0);
        assert_eq!(view.quotes.len(), 2);
        assert_eq!(view.status, ViewStatus::Empty);

        harness.push(quote_batch(&[("care_c", 30.0, 100_000.0)]));
        let view = harness.wait_for(|v| v.total_received == 3).await;
        assert_eq!(view.status, ViewStatus::Populated);
        harness.task.abort();
    }

    #[tokio::test]
    async fn test_events_merge_into_owned_state() {
        let (_events, events_rx) = unbounded_channel();
        let (_filters, filters_rx) = watch::channel(show_all());
        let (_status, status_rx) = watch::channel(ConnectionStatus::Connected);
        let config = PipelineConfig {
            raw_log_capacity: 2,
            ..PipelineConfig::default()
        };
        let (mut driver, _view) =
            PipelineDriver::new(config, 1, events_rx, filters_rx, status_rx, Box::new(|| None));

        for n in 0..3 {
            let key = format!("plan_{n}");
            driver.handle_event(&ServerEvent {
                name: QUICK_QUOTE_EVENT.to_string(),
                payload: quote_batch(&[(key.as_str(), 10.0, 50_000.0)]),
            });
        }
        assert_eq!(driver.state.quotes.len(), 3);
        assert_eq!(driver.state.raw_event_log.len(), 2);
        assert_eq!(driver.state.raw_event_log.dropped(), 1);
    }

    #[test]
    fn test_unpurchasable_plans_while_loading() {
        let mut state = QuoteAccumulatorState::new(0);
        state.quotes = crate::quotes::normalizer::normalize(
            &json!({"reliance_a": {"netPremium": 0, "SI": "100000"}}),
            1,
        );
        let view = derive_view(&state, show_all(), None);
        assert_eq!(view.status, ViewStatus::Loading);

        state.settle_on_timeout();
        assert_eq!(derive_view(&state, show_all(), None).status, ViewStatus::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_rederives_view() {
        let mut harness = Harness::start(show_all());
        harness.push(quote_batch(&[
            ("reliance_a", 40.0, 50_000.0),
            ("care_b", 25.0, 100_000.0),
            ("godigit_c", 60.0, 250_000.0),
        ]));
        harness.wait_for(|v| v.total_received == 3).await;

        harness.filters.send_modify(|f| {
            f.insurer = InsurerFilter::Named("Care Health".to_string());
        });
        let narrowed = harness.wait_for(|v| v.any_filter_active && v.quotes.len() == 1).await;
        assert_eq!(narrowed.quotes[0].id, "care_b");
        assert_eq!(narrowed.total_received, 3);

        harness.filters.send_replace(QuoteFilters {
            coverage_band: CoverageBand::ShowAll,
            price_sort: PriceSort::HighToLow,
            ..QuoteFilters::default()
        });
        let sorted = harness.wait_for(|v| v.quotes.len() == 3).await;
        let premiums: Vec<f64> = sorted.quotes.iter().map(|q| q.net_premium).collect();
        assert_eq!(premiums, vec![60.0, 40.0, 25.0]);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_event_records_error_and_settles() {
        let mut harness = Harness::start(show_all());
        harness.push(json!("not a quote"));
        let view = harness.wait_for(|v| v.error.is_some()).await;
        assert!(view.received_first_batch);
        assert!(!view.is_loading);
        assert_eq!(view.status, ViewStatus::Empty);

        harness.push(json!({"data": {"planA": false, "planB": {}}}));
        harness.push(quote_batch(&[("reliance_a", 40.0, 50_000.0)]));
        let view = harness.wait_for(|v| v.total_received == 1).await;
        assert_eq!(view.status, ViewStatus::Populated);
        assert!(view.error.is_some());
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_warning_while_offline() {
        let mut harness = Harness::start(QuoteFilters::default());
        harness.wait_for(|v| v.is_connected).await;

        harness.offline.store(true, Ordering::Relaxed);
        harness.status.send_replace(ConnectionStatus::Disconnected);
        let view = harness.wait_for(|v| !v.is_connected).await;
        assert_eq!(view.status, ViewStatus::ConnectingWarning);
        assert!(view.connectivity_warning.is_some());

        harness.offline.store(false, Ordering::Relaxed);
        harness.status.send_replace(ConnectionStatus::Connected);
        let view = harness.wait_for(|v| v.is_connected).await;
        assert_eq!(view.status, ViewStatus::Loading);
        assert_eq!(view.connectivity_warning, None);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_when_handle_side_dropped() {
        let harness = Harness::start(QuoteFilters::default());
        let Harness { filters, task, .. } = harness;
        drop(filters);
        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("pipeline task kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_removes_listener_and_keeps_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let manager = ConnectionManager::new(ConnectionConfig {
            base_url: format!("http://{addr}"),
            max_reconnect_attempts: 0,
            connect_timeout: Duration::from_millis(200),
            ..ConnectionConfig::default()
        });
        let trip = TripContext::new("12").with_dates("2025-03-01", "2025-03-10");
        let pipeline =
            QuotePipeline::activate(&manager, &trip, PipelineConfig::default(), show_all())
                .await
                .unwrap();
        assert_eq!(pipeline.request().destination_id, "12");
        assert_eq!(pipeline.request().start_date, "01/03/2025");

        let id = pipeline.listener_id();
        pipeline.close().await;
        assert!(manager.off(id).await.is_err());
        manager.shutdown().await;
    }
}
