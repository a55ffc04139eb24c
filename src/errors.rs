use thiserror::Error;

/// HTTP error classification
#[derive(Error, Debug, Clone)]
pub enum HttpErrorKind {
    #[error("Client error: {message}")]
    Client { message: String },
    #[error("Server error: {message}")]
    Server { message: String },
}

/// Connection-level errors
#[derive(Error, Debug, Clone)]
pub enum WsError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Send error: {0}")]
    Send(String),
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("Listener not found")]
    ListenerNotFound,
    #[error("Max reconnection attempts exceeded ({0})")]
    ReconnectExhausted(u32),
}

/// Parsing and serialization errors
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("JSON error: {0}")]
    Json(String),
    #[error("TOML error: {0}")]
    Toml(String),
    #[error("Invalid packet: {0}")]
    Packet(String),
}

/// A raw quote event did not match any known payload shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("expected an object or array payload, got {0}")]
    UnexpectedType(&'static str),
    #[error("array payload has no leading object with a `data` property")]
    EmptyEnvelope,
    #[error("`{0}` property is not an object")]
    NotAMap(&'static str),
}

/// Main SDK error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// HTTP error with status code and classification
    #[error("HTTP error (status {status}): {kind}")]
    Http { status: u16, kind: HttpErrorKind },

    /// Generic request error
    #[error("Generic request error: {0}")]
    GenericRequest(String),

    #[error("Websocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unrecognized quote payload: {0}")]
    Shape(#[from] ShapeError),

    /// Trip document could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

// Convenience constructors for common error patterns
impl Error {
    pub fn client_error(status: u16, message: String) -> Self {
        Error::Http {
            status,
            kind: HttpErrorKind::Client { message },
        }
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Error::Http {
            status,
            kind: HttpErrorKind::Server { message },
        }
    }

    pub fn json_parse(msg: impl Into<String>) -> Self {
        Error::Parse(ParseError::Json(msg.into()))
    }

    pub fn ws_connection(msg: impl Into<String>) -> Self {
        Error::Ws(WsError::Connection(msg.into()))
    }

    pub fn ws_send(msg: impl Into<String>) -> Self {
        Error::Ws(WsError::Send(msg.into()))
    }

    pub fn packet(msg: impl Into<String>) -> Self {
        Error::Parse(ParseError::Packet(msg.into()))
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}
