use reqwest::{Client, Response};
use std::time::Duration;
use tracing::warn;

use crate::{prelude::*, Error};

/// HTTP status codes that indicate transient server errors (retryable)
const RETRYABLE_STATUS_CODES: &[u16] = &[502, 503, 504];

/// Maximum number of retry attempts for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds (doubles with each retry)
const INITIAL_BACKOFF_MS: u64 = 100;

/// Engine.IO polling bodies are plain text, one or more packets separated by `\x1e`.
const POLLING_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
}

async fn parse_response(response: Response) -> Result<String> {
    let status_code = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| Error::GenericRequest(e.to_string()))?;

    if status_code < 400 {
        return Ok(text);
    }
    if (400..500).contains(&status_code) {
        return Err(Error::client_error(status_code, text));
    }
    Err(Error::server_error(status_code, text))
}

impl HttpClient {
    pub(crate) fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Long-poll GET of `url_path`, retried on transient server errors.
    pub(crate) async fn get(&self, url_path: &str) -> Result<String> {
        self.send_with_retry(url_path, None).await
    }

    /// POST of a text body to `url_path`, retried on transient server errors.
    pub(crate) async fn post(&self, url_path: &str, data: String) -> Result<String> {
        self.send_with_retry(url_path, Some(data)).await
    }

    /// Uses exponential backoff: 100ms, 200ms, 400ms between retries.
    async fn send_with_retry(&self, url_path: &str, body: Option<String>) -> Result<String> {
        let full_url = format!("{}{url_path}", self.base_url);

        for attempt in 0..=MAX_RETRIES {
            let builder = match &body {
                Some(data) => self
                    .client
                    .post(&full_url)
                    .header("Content-Type", POLLING_CONTENT_TYPE)
                    .body(data.clone()),
                None => self.client.get(&full_url),
            };
            let request = builder
                .build()
                .map_err(|e| Error::GenericRequest(e.to_string()))?;

            let result = self
                .client
                .execute(request)
                .await
                .map_err(|e| Error::GenericRequest(e.to_string()))?;

            let status = result.status().as_u16();

            if RETRYABLE_STATUS_CODES.contains(&status) && attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    status = status,
                    attempt = attempt + 1,
                    max_attempts = MAX_RETRIES + 1,
                    backoff_ms = backoff.as_millis(),
                    url = %url_path,
                    "Retryable HTTP error, backing off"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            return parse_response(result).await;
        }

        Err(Error::GenericRequest(format!(
            "Max retries ({MAX_RETRIES}) exceeded for {url_path}"
        )))
    }
}
