use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    spawn,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        watch, Mutex,
    },
    task::JoinHandle,
    time,
};

use crate::{
    consts::{
        DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_STEP_MS, PRODUCTION_API_URL, SOCKET_PATH,
    },
    errors::WsError,
    prelude::*,
    ws::{
        message_types::{EnginePacket, OpenHandshake, ServerEvent, SocketPacket},
        transport::{Transport, TransportKind},
    },
    Error,
};

/// How long `disconnect` waits for the driver to close the session before aborting it.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection settings for the quoting service.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service origin, e.g. `https://quotes.travelcover.in`
    pub base_url: String,
    /// Socket.IO mount path (default: `/socket.io`)
    pub socket_path: String,
    /// Sent as `{"token": ...}` with the namespace connect
    pub auth_token: Option<String>,
    /// Transports tried in order on every (re)connect
    pub transports: Vec<TransportKind>,
    /// Reconnect attempts after a lost session before giving up (default: 5)
    pub max_reconnect_attempts: u32,
    /// Linear backoff step; attempt `n` waits `n * step` (default: 1s)
    pub reconnect_step: Duration,
    /// Bound on the Engine.IO handshake of a single transport (default: 10s)
    pub connect_timeout: Duration,
    /// Maximum number of emits held while disconnected (default: 64)
    pub emit_queue_limit: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: PRODUCTION_API_URL.to_string(),
            socket_path: SOCKET_PATH.to_string(),
            auth_token: None,
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_step: Duration::from_millis(DEFAULT_RECONNECT_STEP_MS),
            connect_timeout: Duration::from_secs(10),
            emit_queue_limit: 64,
        }
    }
}

/// Statistics about connection health.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub status: ConnectionStatus,
    /// Transport of the current or last session
    pub transport: Option<TransportKind>,
    /// Total number of reconnection attempts since the last explicit connect
    pub reconnection_count: u64,
    /// Failed sessions since the last acknowledged namespace connect
    pub consecutive_failures: u64,
    /// Retries ran out; cleared by the next explicit `connect`
    pub reconnect_exhausted: bool,
    pub last_error: Option<String>,
    /// Time since the server's last Engine.IO ping
    pub time_since_last_ping: Option<Duration>,
    pub is_healthy: bool,
}

#[derive(Debug, Default)]
struct Diagnostics {
    last_error: Option<String>,
    transport: Option<TransportKind>,
}

/// Internal health state tracking.
#[derive(Debug)]
struct HealthState {
    start_time: Instant,
    /// Last ping received (nanos since start, 0 = never)
    last_ping_nanos: AtomicU64,
    reconnection_count: AtomicU64,
    consecutive_failures: AtomicU64,
    reconnect_exhausted: AtomicBool,
    diagnostics: std::sync::Mutex<Diagnostics>,
}

impl HealthState {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            last_ping_nanos: AtomicU64::new(0),
            reconnection_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            reconnect_exhausted: AtomicBool::new(false),
            diagnostics: std::sync::Mutex::new(Diagnostics::default()),
        }
    }

    fn record_ping(&self) {
        let nanos = (self.start_time.elapsed().as_nanos() as u64).max(1);
        self.last_ping_nanos.store(nanos, Ordering::Relaxed);
    }

    fn time_since_last_ping(&self) -> Option<Duration> {
        match self.last_ping_nanos.load(Ordering::Relaxed) {
            0 => None,
            last => {
                let now = self.start_time.elapsed().as_nanos() as u64;
                Some(Duration::from_nanos(now.saturating_sub(last)))
            }
        }
    }

    fn record_connected(&self, transport: TransportKind) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.last_error = None;
            diagnostics.transport = Some(transport);
        }
    }

    fn record_failure(&self, reason: &str) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.last_error = Some(reason.to_string());
        }
    }

    fn record_reconnection(&self) {
        self.reconnection_count.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.reconnection_count.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.reconnect_exhausted.store(false, Ordering::Relaxed);
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.last_error = None;
        }
    }
}

#[derive(Debug)]
struct ListenerData {
    sending_channel: UnboundedSender<Arc<ServerEvent>>,
    listener_id: u32,
}

#[derive(Debug, Default)]
struct Listeners {
    by_event: HashMap<String, Vec<ListenerData>>,
    event_of: HashMap<u32, String>,
}

/// Emits waiting for a connected session. `live` is set exactly while a
/// session has acknowledged the namespace connect.
#[derive(Debug, Default)]
struct Outbound {
    queue: VecDeque<EnginePacket>,
    live: Option<UnboundedSender<EnginePacket>>,
}

impl Outbound {
    fn enqueue(&mut self, packet: EnginePacket, limit: usize) {
        if limit == 0 {
            warn!("Emit queue disabled, dropping {packet:?}");
            return;
        }
        while self.queue.len() >= limit {
            if let Some(dropped) = self.queue.pop_front() {
                warn!("Emit queue full ({limit}), dropping oldest {dropped:?}");
            }
        }
        self.queue.push_back(packet);
    }
}

/// State shared with the driver task.
#[derive(Debug)]
struct Shared {
    config: ConnectionConfig,
    http: reqwest::Client,
    status: watch::Sender<ConnectionStatus>,
    listeners: Mutex<Listeners>,
    next_listener_id: AtomicU32,
    outbound: Mutex<Outbound>,
    health: HealthState,
}

#[derive(Debug)]
struct Driver {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

#[derive(Debug)]
struct Inner {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            let _ = driver.stop.send(true);
            driver.handle.abort();
        }
    }
}

/// Handle to the single persistent connection to the quoting service.
///
/// Clones share one connection. Create it once at the composition root and
/// hand it to consumers; the connection is torn down by [`shutdown`] or when
/// the last clone is dropped.
///
/// [`shutdown`]: ConnectionManager::shutdown
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
enum SessionEnd {
    /// Stop requested; no reconnect.
    Stopped,
    /// Session could not be established or was lost.
    Lost { reason: String, established: bool },
    /// Server refused the namespace connect.
    Rejected(WsError),
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Uses `http` for the long-polling transport.
    pub fn with_client(config: ConnectionConfig, http: reqwest::Client) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let shared = Arc::new(Shared {
            config,
            http,
            status,
            listeners: Mutex::new(Listeners::default()),
            next_listener_id: AtomicU32::new(0),
            outbound: Mutex::new(Outbound::default()),
            health: HealthState::new(),
        });
        Self {
            inner: Arc::new(Inner {
                shared,
                driver: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.shared.config
    }

    /// Starts the connection driver. No-op while a driver is alive, whether
    /// it is connecting, connected or backing off between attempts.
    pub async fn connect(&self) {
        let mut driver = self.inner.driver.lock().await;
        if driver.as_ref().is_some_and(|d| !d.handle.is_finished()) {
            debug!("Connect requested while connection driver is active");
            return;
        }
        let shared = &self.inner.shared;
        shared.health.reset();
        shared.set_status(ConnectionStatus::Connecting);

        let (stop, stop_rx) = watch::channel(false);
        let handle = spawn(Shared::drive(Arc::clone(shared), stop_rx));
        *driver = Some(Driver { handle, stop });
    }

    /// Closes the session gracefully. Queued emits are kept for the next `connect`.
    pub async fn disconnect(&self) {
        let driver = self.inner.driver.lock().await.take();
        if let Some(mut driver) = driver {
            let _ = driver.stop.send(true);
            if time::timeout(DISCONNECT_GRACE, &mut driver.handle)
                .await
                .is_err()
            {
                warn!("Connection driver did not stop within {DISCONNECT_GRACE:?}, aborting");
                driver.handle.abort();
            }
        }
        self.inner.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Disconnects and drops every listener and queued emit.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        let shared = &self.inner.shared;
        {
            let mut listeners = shared.listeners.lock().await;
            listeners.by_event.clear();
            listeners.event_of.clear();
        }
        shared.outbound.lock().await.queue.clear();
        info!("Connection manager shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status() == ConnectionStatus::Connected
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.inner.shared.status.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.shared.status.subscribe()
    }

    pub fn health_stats(&self) -> ConnectionStats {
        let health = &self.inner.shared.health;
        let status = self.connection_status();
        let consecutive_failures = health.consecutive_failures.load(Ordering::Relaxed);
        let (last_error, transport) = match health.diagnostics.lock() {
            Ok(diagnostics) => (diagnostics.last_error.clone(), diagnostics.transport),
            Err(_) => (None, None),
        };
        ConnectionStats {
            status,
            transport,
            reconnection_count: health.reconnection_count.load(Ordering::Relaxed),
            consecutive_failures,
            reconnect_exhausted: health.reconnect_exhausted.load(Ordering::Relaxed),
            last_error,
            time_since_last_ping: health.time_since_last_ping(),
            is_healthy: status == ConnectionStatus::Connected && consecutive_failures == 0,
        }
    }

    /// User-facing connectivity problem, if any: retries exhausted, or the
    /// last attempt failed and no session is up.
    pub fn connectivity_warning(&self) -> Option<String> {
        let stats = self.health_stats();
        if stats.reconnect_exhausted || stats.status != ConnectionStatus::Connected {
            stats.last_error
        } else {
            None
        }
    }

    /// Registers a listener for server event `event` and returns its id.
    pub async fn on(&self, event: &str, sending_channel: UnboundedSender<Arc<ServerEvent>>) -> u32 {
        let shared = &self.inner.shared;
        let listener_id = shared.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = shared.listeners.lock().await;
        listeners
            .by_event
            .entry(event.to_string())
            .or_default()
            .push(ListenerData {
                sending_channel,
                listener_id,
            });
        listeners.event_of.insert(listener_id, event.to_string());
        listener_id
    }

    /// Removes the listener registered under `listener_id`.
    pub async fn off(&self, listener_id: u32) -> Result<()> {
        let mut listeners = self.inner.shared.listeners.lock().await;
        let event = listeners
            .event_of
            .remove(&listener_id)
            .ok_or(WsError::ListenerNotFound)?;
        let registered = listeners
            .by_event
            .get_mut(&event)
            .ok_or(WsError::ListenerNotFound)?;
        let index = registered
            .iter()
            .position(|listener| listener.listener_id == listener_id)
            .ok_or(WsError::ListenerNotFound)?;
        registered.remove(index);
        if registered.is_empty() {
            listeners.by_event.remove(&event);
        }
        Ok(())
    }

    /// Sends `event` with `payload`, or queues it until the namespace connect
    /// is acknowledged. Queuing also starts the connection.
    pub async fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload).map_err(|e| Error::json_parse(e.to_string()))?;
        let packet = EnginePacket::event(event, payload);
        let queued = {
            let mut outbound = self.inner.shared.outbound.lock().await;
            let packet = match outbound.live.as_ref() {
                Some(live) => match live.send(packet) {
                    Ok(()) => None,
                    Err(unsent) => Some(unsent.0),
                },
                None => Some(packet),
            };
            match packet {
                Some(packet) => {
                    outbound.enqueue(packet, self.inner.shared.config.emit_queue_limit);
                    true
                }
                None => false,
            }
        };
        if queued {
            debug!("Queued {event} until connected");
            self.connect().await;
        }
        Ok(())
    }
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    /// Connection driver: runs sessions and reconnects with linear backoff
    /// until stopped or out of attempts.
    async fn drive(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
        let max_attempts = shared.config.max_reconnect_attempts;
        let mut attempt = 0u32;
        loop {
            shared.set_status(ConnectionStatus::Connecting);
            let reason = match shared.run_session(&mut stop).await {
                SessionEnd::Stopped => break,
                SessionEnd::Lost {
                    reason,
                    established,
                } => {
                    if established {
                        attempt = 0;
                    }
                    reason
                }
                SessionEnd::Rejected(err) => err.to_string(),
            };
            shared.health.record_failure(&reason);

            // Exhaustion is recorded before the status change so status
            // watchers observe it.
            attempt += 1;
            if attempt > max_attempts {
                error!("Giving up after {max_attempts} reconnection attempts: {reason}");
                shared.health.reconnect_exhausted.store(true, Ordering::Relaxed);
                let exhausted = Error::from(WsError::ReconnectExhausted(max_attempts));
                shared.health.record_failure(&exhausted.to_string());
                break;
            }
            shared.set_status(ConnectionStatus::Disconnected);

            let delay = shared.config.reconnect_step * attempt;
            info!(
                "Reconnecting attempt={attempt}/{max_attempts} delay_ms={} reason={reason}",
                delay.as_millis()
            );
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = stop.changed() => break,
            }
            shared.health.record_reconnection();
        }
        shared.set_status(ConnectionStatus::Disconnected);
    }

    async fn open_transport(&self) -> Result<(Transport, OpenHandshake)> {
        let mut last_err = Error::ws_connection("no transports configured");
        for kind in &self.config.transports {
            match Transport::open(
                *kind,
                &self.config.base_url,
                &self.config.socket_path,
                &self.http,
                self.config.connect_timeout,
            )
            .await
            {
                Ok(opened) => return Ok(opened),
                Err(err) => {
                    warn!("Could not open {kind} transport: {err}");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn run_session(&self, stop: &mut watch::Receiver<bool>) -> SessionEnd {
        let opened = tokio::select! {
            opened = self.open_transport() => opened,
            _ = stop.changed() => return SessionEnd::Stopped,
        };
        let (mut transport, handshake) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                return SessionEnd::Lost {
                    reason: err.to_string(),
                    established: false,
                }
            }
        };
        debug!(
            "Engine.IO session {} open over {}",
            handshake.sid,
            transport.kind()
        );

        let auth = self
            .config
            .auth_token
            .as_ref()
            .map(|token| json!({ "token": token }));
        if let Err(err) = transport
            .send(&EnginePacket::Message(SocketPacket::Connect(auth)))
            .await
        {
            return SessionEnd::Lost {
                reason: err.to_string(),
                established: false,
            };
        }

        let ping_window =
            Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        let ping_deadline = time::sleep(ping_window);
        tokio::pin!(ping_deadline);

        let (live, mut live_rx) = unbounded_channel::<EnginePacket>();
        let mut established = false;

        let end = loop {
            tokio::select! {
                _ = stop.changed() => {
                    if established {
                        let _ = transport.send(&EnginePacket::Message(SocketPacket::Disconnect)).await;
                    }
                    transport.close().await;
                    break SessionEnd::Stopped;
                }
                _ = &mut ping_deadline => {
                    break SessionEnd::Lost {
                        reason: format!("no ping from server within {}ms", ping_window.as_millis()),
                        established,
                    };
                }
                Some(packet) = live_rx.recv() => {
                    if let Err(err) = transport.send(&packet).await {
                        self.outbound.lock().await.queue.push_front(packet);
                        break SessionEnd::Lost { reason: err.to_string(), established };
                    }
                }
                received = transport.recv() => match received {
                    None => break SessionEnd::Lost {
                        reason: "transport closed".to_string(),
                        established,
                    },
                    Some(Err(Error::Ws(err))) => break SessionEnd::Lost {
                        reason: err.to_string(),
                        established,
                    },
                    Some(Err(err)) => warn!("Dropping undecodable packet: {err}"),
                    Some(Ok(packet)) => match packet {
                        EnginePacket::Ping(data) => {
                            self.health.record_ping();
                            ping_deadline
                                .as_mut()
                                .reset(time::Instant::now() + ping_window);
                            if let Err(err) = transport.send(&EnginePacket::Pong(data)).await {
                                break SessionEnd::Lost { reason: err.to_string(), established };
                            }
                        }
                        EnginePacket::Close => break SessionEnd::Lost {
                            reason: "server closed the session".to_string(),
                            established,
                        },
                        EnginePacket::Message(SocketPacket::Connect(ack)) => {
                            established = true;
                            debug!("Namespace connect acknowledged: {ack:?}");
                            self.health.record_connected(transport.kind());
                            self.go_live(&live).await;
                            self.set_status(ConnectionStatus::Connected);
                            info!("Connected to {} over {}", self.config.base_url, transport.kind());
                        }
                        EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                            let reason = data
                                .get("message")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| data.to_string());
                            transport.close().await;
                            break SessionEnd::Rejected(WsError::HandshakeRejected(reason));
                        }
                        EnginePacket::Message(SocketPacket::Disconnect) => break SessionEnd::Lost {
                            reason: "server disconnect".to_string(),
                            established,
                        },
                        EnginePacket::Message(SocketPacket::Event { name, payload, .. }) => {
                            self.dispatch(name, payload).await;
                        }
                        EnginePacket::Message(SocketPacket::Ack { ack_id, .. }) => {
                            debug!("Ignoring ack {ack_id}");
                        }
                        other => debug!("Ignoring {other:?}"),
                    },
                },
            }
        };

        self.go_offline(&mut live_rx).await;
        end
    }

    /// Flushes queued emits in order and routes later emits straight to the session.
    async fn go_live(&self, live: &UnboundedSender<EnginePacket>) {
        let mut outbound = self.outbound.lock().await;
        let flushed = outbound.queue.len();
        for packet in outbound.queue.drain(..) {
            let _ = live.send(packet);
        }
        outbound.live = Some(live.clone());
        if flushed > 0 {
            debug!("Flushing {flushed} queued emits");
        }
    }

    /// Detaches the session; emits it did not write go back to the queue.
    async fn go_offline(&self, live_rx: &mut UnboundedReceiver<EnginePacket>) {
        let mut outbound = self.outbound.lock().await;
        outbound.live = None;
        while let Ok(packet) = live_rx.try_recv() {
            outbound.enqueue(packet, self.config.emit_queue_limit);
        }
    }

    async fn dispatch(&self, name: String, payload: Value) {
        let event = Arc::new(ServerEvent { name, payload });
        let mut listeners = self.listeners.lock().await;
        let Listeners { by_event, event_of } = &mut *listeners;
        let Some(registered) = by_event.get_mut(&event.name) else {
            debug!("No listener for event {}", event.name);
            return;
        };
        registered.retain(|listener| {
            let alive = listener
                .sending_channel
                .send(Arc::clone(&event))
                .is_ok();
            if !alive {
                debug!("Pruning closed listener {}", listener.listener_id);
                event_of.remove(&listener.listener_id);
            }
            alive
        });
        if registered.is_empty() {
            by_event.remove(&event.name);
        }
    }
}
