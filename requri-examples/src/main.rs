use requri_core::client::{HistoryEntry, HttpClient, RawResponse};
use requri_core::config::RequestConfig;
use requri_core::error::TransportError;
use requri_core::outcome;
use serde_json::json;
use std::process;
use std::time::Duration;

/// A simple Mock Client for demonstration.
/// It doesn't actually make HTTP requests, but returns canned responses.
pub struct ExampleMockClient;

impl HttpClient for ExampleMockClient {
    fn send(&self, request: &RequestConfig) -> Result<RawResponse, TransportError> {
        println!(
            ">>> [MOCK] Intercepted a {} request to '{}'",
            request.method, request.url
        );

        Ok(RawResponse {
            status: 200,
            reason: "OK".to_string(),
            url: format!("{}?page=1", request.url),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                (
                    "link".to_string(),
                    format!(r#"<{}?page=2>; rel="next""#, request.url),
                ),
            ],
            cookies: Vec::new(),
            body: br#"{"message": "Hello from ExampleMockClient!"}"#.to_vec(),
            encoding: None,
            elapsed: Duration::from_micros(1_500),
            history: vec![HistoryEntry {
                status_code: 301,
                url: request.url.replace("https://", "http://"),
            }],
        })
    }
}

fn main() {
    let params = json!({
        "method": "get",
        "url": "https://api.example.com/items",
        "headers": {"Accept": "application/json"},
        "timeout": [2, 10]
    });

    println!("Running task with parameters:\n{:#}\n", params);

    // We instantiate our custom mock client instead of reqwest
    let client = ExampleMockClient;
    let result = outcome::run(&client, &params);

    match result.to_json() {
        Ok(value) => println!("\n{:#}", value),
        Err(e) => {
            eprintln!("Failed to serialize result: {}", e);
            process::exit(1);
        }
    }

    if result.failed {
        process::exit(1);
    }
}
