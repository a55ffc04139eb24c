use serde::{Deserialize, Serialize};

use crate::consts::{ENGINE_IO_VERSION, LOCAL_API_URL, PRODUCTION_API_URL, STAGING_API_URL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseUrl {
    Production,
    Staging,
    Localhost,
    Custom(String),
}

impl BaseUrl {
    pub fn get_url(&self) -> String {
        match self {
            BaseUrl::Production => PRODUCTION_API_URL.to_string(),
            BaseUrl::Staging => STAGING_API_URL.to_string(),
            BaseUrl::Localhost => LOCAL_API_URL.to_string(),
            BaseUrl::Custom(url) => url.trim_end_matches('/').to_string(),
        }
    }

    /// Accepts a network name (`production`, `staging`, `localhost`) or a full URL.
    pub fn parse(s: &str) -> Option<BaseUrl> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Some(BaseUrl::Production),
            "staging" => Some(BaseUrl::Staging),
            "localhost" | "local" => Some(BaseUrl::Localhost),
            other
                if other.starts_with("http://")
                    || other.starts_with("https://")
                    || other.starts_with("ws://")
                    || other.starts_with("wss://") =>
            {
                Some(BaseUrl::Custom(s.to_string()))
            }
            _ => None,
        }
    }
}

/// Scheme and host of `base`, with the scheme switched to `ws`/`wss` or
/// `http`/`https` as requested. A bare host is treated as secure.
pub(crate) fn origin(base: &str, websocket: bool) -> String {
    let base = base.trim_end_matches('/');
    let (secure, host) = if let Some(rest) = base.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = base.strip_prefix("wss://") {
        (true, rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        (false, rest)
    } else if let Some(rest) = base.strip_prefix("ws://") {
        (false, rest)
    } else {
        (true, base)
    };
    let scheme = match (websocket, secure) {
        (true, true) => "wss",
        (true, false) => "ws",
        (false, true) => "https",
        (false, false) => "http",
    };
    format!("{scheme}://{host}")
}

/// Path and query of the Engine.IO endpoint for `transport` (`websocket` or `polling`).
pub(crate) fn engine_io_path(path: &str, transport: &str, sid: Option<&str>) -> String {
    let path = path.trim_end_matches('/');
    let mut url = format!("{path}/?EIO={ENGINE_IO_VERSION}&transport={transport}");
    if let Some(sid) = sid {
        url.push_str("&sid=");
        url.push_str(sid);
    }
    url
}

pub(crate) fn engine_io_url(base: &str, path: &str, transport: &str, sid: Option<&str>) -> String {
    format!(
        "{}{}",
        origin(base, transport == "websocket"),
        engine_io_path(path, transport, sid)
    )
}

/// Parses the digits of `s` as a number, ignoring every other character.
///
/// `"$1,00,000"` and `"USD 100000"` both read as `100000`. A fractional part
/// is dropped. Returns `None` when no digit is present.
pub fn parse_digits(s: &str) -> Option<f64> {
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == '.' && !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}
