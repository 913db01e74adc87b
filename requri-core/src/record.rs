//! The flat result record returned to the host for every completed call.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::client::HistoryEntry;
use crate::config::{HttpMethod, Verify};
use crate::links::Link;

/// Normalized description of one HTTP response.
///
/// Optional fields are skipped when absent rather than serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub changed: bool,
    #[serde(serialize_with = "lossy_text")]
    pub content: Vec<u8>,
    pub cookies: BTreeMap<String, String>,
    /// Microseconds.
    pub elapsed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub history: Vec<HistoryEntry>,
    pub is_permanent_redirect: bool,
    pub is_redirect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    pub links: BTreeMap<String, Link>,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub ok: bool,
    pub reason: String,
    pub status_code: u16,
    pub text: String,
    pub url: String,
    pub verify: Verify,
}

fn lossy_text<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(content))
}
