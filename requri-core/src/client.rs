use std::time::Duration;

use serde::Serialize;

use crate::config::RequestConfig;
use crate::error::TransportError;

/// One redirect hop, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub status_code: u16,
    pub url: String,
}

/// What the transport hands back after a completed exchange.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    /// Final URL after redirects.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub encoding: Option<String>,
    pub elapsed: Duration,
    pub history: Vec<HistoryEntry>,
}

impl RawResponse {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A generic interface to execute an HTTP request.
/// Your application can implement this trait and pass it to `mapper::execute`
/// to decouple the task from any specific HTTP library.
pub trait HttpClient {
    fn send(&self, request: &RequestConfig) -> Result<RawResponse, TransportError>;
}
