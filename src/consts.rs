pub const PRODUCTION_API_URL: &str = "https://quotes.travelcover.in";
pub const STAGING_API_URL: &str = "https://staging-quotes.travelcover.in";
pub const LOCAL_API_URL: &str = "http://localhost:4000";

/// Socket.IO mount path on the quoting service.
pub(crate) const SOCKET_PATH: &str = "/socket.io";

/// Engine.IO protocol revision spoken by the quoting service.
pub(crate) const ENGINE_IO_VERSION: u8 = 4;

/// Client -> server event carrying a `QuoteRequest`.
pub const GET_LIVE_QUOTES_EVENT: &str = "getLiveQuotes";
/// Server -> client event carrying a raw quote batch.
pub const QUICK_QUOTE_EVENT: &str = "QuickQuote";

/// Storage key of the persisted wizard document.
pub const TRIP_STORAGE_KEY: &str = "travelInsuranceData";

pub(crate) const DEFAULT_LOADING_TIMEOUT_SECS: u64 = 20;
pub(crate) const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_RECONNECT_STEP_MS: u64 = 1000;
pub(crate) const DEFAULT_RAW_LOG_CAPACITY: usize = 32;

pub(crate) const DEFAULT_SUM_INSURED: f64 = 50_000.0;
