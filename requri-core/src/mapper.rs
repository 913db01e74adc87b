//! Response Mapper: executes a descriptor and flattens the response.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::client::{HttpClient, RawResponse};
use crate::config::{HttpMethod, RequestConfig};
use crate::encoding::{decode_text, encoding_from_content_type};
use crate::error::TransportError;
use crate::links::links_by_key;
use crate::record::ResponseRecord;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];
const PERMANENT_REDIRECT_STATUSES: [u16; 2] = [301, 308];

/// Perform the single HTTP call for `config` and map the result.
pub fn execute<C: HttpClient>(
    client: &C,
    config: &RequestConfig,
) -> Result<ResponseRecord, TransportError> {
    debug!(
        method = %config.method,
        url = %config.url,
        allow_redirects = config.allow_redirects,
        stream = config.stream,
        "sending request"
    );

    let raw = client.send(config)?;

    info!(
        method = %config.method,
        url = %raw.url,
        status = raw.status,
        elapsed_us = raw.elapsed.as_micros() as u64,
        redirects = raw.history.len(),
        "request completed"
    );

    Ok(map_response(config, raw))
}

/// Whether a call with `method` is reported as having changed remote state.
/// Decided by method alone, never by status code.
pub fn is_changed(method: HttpMethod) -> bool {
    !method.is_idempotent_read()
}

/// Status codes in `[200, 400)` are ok.
pub fn is_ok(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Flatten a transport response into the result record.
pub fn map_response(config: &RequestConfig, raw: RawResponse) -> ResponseRecord {
    let has_location = raw.header("location").is_some();
    let is_redirect = has_location && REDIRECT_STATUSES.contains(&raw.status);
    let is_permanent_redirect = has_location && PERMANENT_REDIRECT_STATUSES.contains(&raw.status);

    let encoding = raw
        .encoding
        .clone()
        .or_else(|| encoding_from_content_type(raw.header("content-type")));
    let text = decode_text(&raw.body, encoding.as_deref());

    // Parsed from the decoded text so UTF-16 and BOM-prefixed bodies work.
    let json_source = text.trim_start_matches('\u{feff}');
    let json = if json_source.is_empty() {
        None
    } else {
        match serde_json::from_str::<serde_json::Value>(json_source) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "response body is not JSON");
                None
            }
        }
    };

    let links = raw.header("link").map(links_by_key).unwrap_or_default();
    let next = links.get("next").and_then(|l| l.get("url")).cloned();

    ResponseRecord {
        changed: is_changed(config.method),
        cookies: raw.cookies.into_iter().collect(),
        elapsed: raw.elapsed.as_micros() as u64,
        encoding,
        headers: merge_headers(raw.headers),
        history: raw.history,
        is_permanent_redirect,
        is_redirect,
        json,
        links,
        method: config.method,
        next,
        ok: is_ok(raw.status),
        reason: raw.reason,
        status_code: raw.status,
        text,
        url: raw.url,
        verify: config.verify.clone(),
        content: raw.body,
    }
}

/// Repeated header names are joined with `", "`, in order of appearance.
fn merge_headers(headers: Vec<(String, String)>) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        merged
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HistoryEntry;
    use crate::config::Verify;
    use serde_json::json;
    use std::time::Duration;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            reason: "OK".to_string(),
            url: "https://example.com/".to_string(),
            body: body.as_bytes().to_vec(),
            ..RawResponse::default()
        }
    }

    fn config(method: HttpMethod) -> RequestConfig {
        RequestConfig {
            method,
            ..RequestConfig::new("https://example.com/")
        }
    }

    #[test]
    fn test_json_body_decoded() {
        let record = map_response(&config(HttpMethod::Get), raw(200, r#"{"a":1}"#));
        assert_eq!(record.json, Some(json!({"a": 1})));
        assert_eq!(record.text, r#"{"a":1}"#);
        assert_eq!(record.content, br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn test_non_json_body_leaves_json_absent() {
        let record = map_response(&config(HttpMethod::Get), raw(200, "hello"));
        assert_eq!(record.json, None);
        assert_eq!(record.text, "hello");

        let empty = map_response(&config(HttpMethod::Head), raw(200, ""));
        assert_eq!(empty.json, None);
        assert_eq!(empty.text, "");
    }

    #[test]
    fn test_changed_depends_on_method_only() {
        for (method, changed) in [
            (HttpMethod::Get, false),
            (HttpMethod::Head, false),
            (HttpMethod::Options, false),
            (HttpMethod::Post, true),
            (HttpMethod::Put, true),
            (HttpMethod::Patch, true),
            (HttpMethod::Delete, true),
        ] {
            for status in [200, 201, 304, 404, 500] {
                let record = map_response(&config(method), raw(status, ""));
                assert_eq!(record.changed, changed, "{method} {status}");
            }
        }
    }

    #[test]
    fn test_ok_range() {
        assert!(!is_ok(199));
        assert!(is_ok(200));
        assert!(is_ok(302));
        assert!(is_ok(399));
        assert!(!is_ok(400));
        assert!(!is_ok(503));
    }

    #[test]
    fn test_links_and_next() {
        let mut response = raw(200, "[]");
        response.headers = vec![(
            "link".to_string(),
            r#"<https://x/p2>; rel="next", <https://x/p9>; rel="last""#.to_string(),
        )];
        let record = map_response(&config(HttpMethod::Get), response);
        assert_eq!(record.next.as_deref(), Some("https://x/p2"));
        assert_eq!(record.links["last"]["url"], "https://x/p9");

        let plain = map_response(&config(HttpMethod::Get), raw(200, "[]"));
        assert_eq!(plain.next, None);
        assert!(plain.links.is_empty());
    }

    #[test]
    fn test_redirect_flags() {
        let mut moved = raw(301, "");
        moved.headers = vec![("Location".to_string(), "/new".to_string())];
        let record = map_response(&config(HttpMethod::Get), moved);
        assert!(record.is_redirect);
        assert!(record.is_permanent_redirect);

        let mut found = raw(302, "");
        found.headers = vec![("location".to_string(), "/tmp".to_string())];
        let record = map_response(&config(HttpMethod::Get), found);
        assert!(record.is_redirect);
        assert!(!record.is_permanent_redirect);

        let no_location = map_response(&config(HttpMethod::Get), raw(301, ""));
        assert!(!no_location.is_redirect);
        assert!(!no_location.is_permanent_redirect);
    }

    #[test]
    fn test_history_elapsed_and_verify_echo() {
        let mut response = raw(200, "");
        response.elapsed = Duration::from_micros(1_234_567);
        response.history = vec![
            HistoryEntry {
                status_code: 301,
                url: "http://example.com/".to_string(),
            },
            HistoryEntry {
                status_code: 302,
                url: "https://example.com/old".to_string(),
            },
        ];
        let mut cfg = config(HttpMethod::Get);
        cfg.verify = Verify::CaBundle("/etc/ssl/ca.pem".to_string());

        let record = map_response(&cfg, response);
        assert_eq!(record.elapsed, 1_234_567);
        assert_eq!(record.history.len(), 2);
        assert_eq!(record.history[0].status_code, 301);
        assert_eq!(record.verify, Verify::CaBundle("/etc/ssl/ca.pem".to_string()));
    }

    #[test]
    fn test_headers_merged_and_encoding_detected() {
        let mut response = raw(200, "caf\u{e9}");
        response.headers = vec![
            ("content-type".to_string(), "text/plain; charset=utf-8".to_string()),
            ("set-cookie".to_string(), "a=1".to_string()),
            ("set-cookie".to_string(), "b=2".to_string()),
        ];
        response.cookies = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())];

        let record = map_response(&config(HttpMethod::Get), response);
        assert_eq!(record.headers["set-cookie"], "a=1, b=2");
        assert_eq!(record.encoding.as_deref(), Some("utf-8"));
        assert_eq!(record.text, "café");
        assert_eq!(record.cookies["b"], "2");
    }

    #[test]
    fn test_transport_encoding_takes_priority() {
        let mut response = raw(200, "x");
        response.encoding = Some("utf-16le".to_string());
        response.headers = vec![("content-type".to_string(), "text/plain".to_string())];
        let record = map_response(&config(HttpMethod::Get), response);
        assert_eq!(record.encoding.as_deref(), Some("utf-16le"));
    }

    #[test]
    fn test_json_decoded_through_charset() {
        let mut response = raw(200, "");
        response.body = r#"{"a":"é"}"#
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        response.headers = vec![(
            "content-type".to_string(),
            "application/json; charset=utf-16le".to_string(),
        )];
        let record = map_response(&config(HttpMethod::Get), response);
        assert_eq!(record.text, r#"{"a":"é"}"#);
        assert_eq!(record.json, Some(json!({"a": "é"})));
    }

    #[test]
    fn test_json_with_byte_order_mark() {
        let mut response = raw(200, "");
        response.body = b"\xEF\xBB\xBF{\"a\":1}".to_vec();
        let record = map_response(&config(HttpMethod::Get), response);
        assert_eq!(record.json, Some(json!({"a": 1})));

        let bom_only = raw(200, "\u{feff}");
        assert_eq!(map_response(&config(HttpMethod::Get), bom_only).json, None);
    }
}
