use std::sync::{Arc, Mutex};
use std::time::Instant;

use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Identity, Method, Proxy, Url};
use tracing::debug;

use requri_core::client::{HistoryEntry, HttpClient, RawResponse};
use requri_core::config::{Body, ClientCert, FileField, HttpMethod, ProxyRule, RequestConfig, Verify};
use requri_core::encoding::encoding_from_content_type;
use requri_core::error::TransportError;

const MAX_REDIRECTS: usize = 30;

type Hops = Arc<Mutex<Vec<HistoryEntry>>>;

/// The default transport, backed by the `reqwest` blocking client.
///
/// A fresh client is built for every call, so nothing (connections, cookies,
/// proxy settings) carries over between task invocations.
pub struct ReqwestClient;

impl ReqwestClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, config: &RequestConfig) -> Result<RawResponse, TransportError> {
        let hops: Hops = Arc::default();
        let client = build_client(config, Arc::clone(&hops))?;
        let request = build_request(&client, config)?;

        let started = Instant::now();
        let response = request.send().map_err(classify)?;
        let elapsed = started.elapsed();

        let status = response.status();
        let url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let encoding = encoding_from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        debug!(status = status.as_u16(), stream = config.stream, "reading response body");
        let body = response
            .bytes()
            .map_err(|e| TransportError::Body {
                status_code: status.as_u16(),
                message: error_chain(&e),
            })?
            .to_vec();

        let history = hops
            .lock()
            .map(|mut h| std::mem::take(&mut *h))
            .unwrap_or_default();

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            url,
            headers,
            cookies,
            body,
            encoding,
            elapsed,
            history,
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Follow up to `MAX_REDIRECTS` hops, recording each one in `hops`.
fn redirect_policy(allow_redirects: bool, hops: Hops) -> Policy {
    if !allow_redirects {
        return Policy::none();
    }
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error(format!("exceeded {MAX_REDIRECTS} redirects"));
        }
        if let Some(from) = attempt.previous().last() {
            if let Ok(mut hops) = hops.lock() {
                hops.push(HistoryEntry {
                    status_code: attempt.status().as_u16(),
                    url: from.to_string(),
                });
            }
        }
        attempt.follow()
    })
}

fn build_client(config: &RequestConfig, hops: Hops) -> Result<Client, TransportError> {
    // Proxies come only from the descriptor, never from the environment.
    let mut builder = Client::builder()
        .no_proxy()
        .redirect(redirect_policy(config.allow_redirects, hops));

    builder = match config.timeout {
        Some(timeout) => builder
            .connect_timeout(timeout.connect())
            .timeout(timeout.total()),
        None => builder.timeout(None),
    };

    match &config.verify {
        Verify::Enabled(true) => {}
        Verify::Enabled(false) => builder = builder.danger_accept_invalid_certs(true),
        Verify::CaBundle(path) => {
            let pem = read_file(path, "CA bundle")?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
                TransportError::InvalidRequest(format!("invalid CA bundle {path}: {e}"))
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
    }

    if let Some(cert) = &config.cert {
        let pem = match cert {
            ClientCert::Pair { cert, key } => {
                let mut pem = read_file(cert, "client certificate")?;
                pem.push(b'\n');
                pem.extend(read_file(key, "client key")?);
                pem
            }
            ClientCert::Combined(path) => read_file(path, "client certificate")?,
        };
        let identity = Identity::from_pem(&pem).map_err(|e| {
            TransportError::InvalidRequest(format!("invalid client certificate: {e}"))
        })?;
        builder = builder.identity(identity);
    }

    for rule in &config.proxies {
        builder = builder.proxy(build_proxy(rule)?);
    }

    builder.build().map_err(classify)
}

fn build_proxy(rule: &ProxyRule) -> Result<Proxy, TransportError> {
    let invalid = |e: &dyn std::fmt::Display| {
        TransportError::InvalidRequest(format!("invalid proxy {} for {}: {e}", rule.url, rule.target))
    };

    match rule.target.as_str() {
        "http" => Proxy::http(&rule.url).map_err(|e| invalid(&e)),
        "https" => Proxy::https(&rule.url).map_err(|e| invalid(&e)),
        "all" => Proxy::all(&rule.url).map_err(|e| invalid(&e)),
        origin => {
            let origin = origin.trim_end_matches('/').to_ascii_lowercase();
            let proxy_url = Url::parse(&rule.url).map_err(|e| invalid(&e))?;
            Ok(Proxy::custom(move |url| {
                let target = format!("{}://{}", url.scheme(), url.host_str()?);
                (target == origin).then(|| proxy_url.clone())
            }))
        }
    }
}

fn build_request(client: &Client, config: &RequestConfig) -> Result<RequestBuilder, TransportError> {
    let mut request = client.request(to_reqwest_method(config.method), &config.url);

    if !config.params.is_empty() {
        request = request.query(&config.params);
    }
    for (k, v) in &config.headers {
        request = request.header(k.as_str(), v.as_str());
    }
    if let Some(cookie) = config
        .cookies
        .as_ref()
        .and_then(|c| c.header_value(&config.url))
    {
        request = request.header(COOKIE, cookie);
    }
    if let Some(creds) = &config.credentials {
        request = request.basic_auth(&creds.username, Some(&creds.password));
    }

    request = match &config.body {
        None => request,
        Some(Body::Json(value)) => request.json(value),
        Some(Body::Form(pairs)) => request.form(pairs),
        Some(Body::Raw(bytes)) => request.body(bytes.clone()),
        Some(Body::Multipart { fields, files }) => request.multipart(multipart_form(fields, files)?),
    };

    Ok(request)
}

fn multipart_form(
    fields: &[(String, String)],
    files: &[FileField],
) -> Result<multipart::Form, TransportError> {
    let mut form = multipart::Form::new();
    for (k, v) in fields {
        form = form.text(k.clone(), v.clone());
    }
    for file in files {
        let mut part = multipart::Part::bytes(file.content.clone()).file_name(file.filename.clone());
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type).map_err(|e| {
                TransportError::InvalidRequest(format!("invalid content type for {}: {e}", file.field))
            })?;
        }
        if !file.headers.is_empty() {
            part = part.headers(header_map(&file.headers)?);
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("invalid header name {k}: {e}")))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid value for header {k}: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn read_file(path: &str, what: &str) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path)
        .map_err(|e| TransportError::InvalidRequest(format!("cannot read {what} {path}: {e}")))
}

/// The error and all of its sources, joined with `": "`.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn classify(error: reqwest::Error) -> TransportError {
    let message = error_chain(&error);
    let lowered = message.to_ascii_lowercase();
    let tls = ["certificate", "tls", "handshake", "unknownissuer"]
        .iter()
        .any(|needle| lowered.contains(needle));

    if error.is_timeout() {
        TransportError::Timeout(message)
    } else if error.is_redirect() {
        TransportError::TooManyRedirects(message)
    } else if tls {
        TransportError::Tls(message)
    } else if error.is_connect() {
        TransportError::Connect(message)
    } else if error.is_builder() {
        TransportError::InvalidRequest(message)
    } else if error.is_decode() || error.is_body() {
        TransportError::MalformedResponse(message)
    } else {
        TransportError::Connect(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use requri_core::config::{Cookies, Credentials, Timeout};
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    /// Serve one canned response per connection, returning the raw requests.
    fn serve(responses: Vec<&'static str>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                stream.write_all(response.as_bytes()).unwrap();
            }
            requests
        });
        (base, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_get_maps_status_headers_cookies_and_body() {
        let (base, server) = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nSet-Cookie: sid=abc; Path=/\r\nContent-Length: 7\r\nConnection: close\r\n\r\n{\"a\":1}",
        ]);

        let config = RequestConfig::new(format!("{base}/data"));
        let raw = ReqwestClient::new().send(&config).unwrap();

        assert_eq!(raw.status, 200);
        assert_eq!(raw.reason, "OK");
        assert_eq!(raw.url, format!("{base}/data"));
        assert_eq!(raw.body, b"{\"a\":1}");
        assert_eq!(raw.encoding.as_deref(), Some("utf-8"));
        assert_eq!(raw.header("content-type"), Some("application/json"));
        assert!(raw.cookies.contains(&("sid".to_string(), "abc".to_string())));
        assert!(raw.history.is_empty());

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /data HTTP/1.1"));
    }

    #[test]
    fn test_redirects_recorded_in_history() {
        let (base, server) = serve(vec![
            "HTTP/1.1 302 Found\r\nLocation: /final\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndone",
        ]);

        let config = RequestConfig::new(format!("{base}/start"));
        let raw = ReqwestClient::new().send(&config).unwrap();

        assert_eq!(raw.status, 200);
        assert_eq!(raw.url, format!("{base}/final"));
        assert_eq!(
            raw.history,
            vec![HistoryEntry {
                status_code: 302,
                url: format!("{base}/start"),
            }]
        );
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_redirects_disabled() {
        let (base, server) = serve(vec![
            "HTTP/1.1 301 Moved Permanently\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ]);

        let config = RequestConfig {
            allow_redirects: false,
            ..RequestConfig::new(format!("{base}/old"))
        };
        let raw = ReqwestClient::new().send(&config).unwrap();

        assert_eq!(raw.status, 301);
        assert_eq!(raw.header("location"), Some("/elsewhere"));
        assert!(raw.history.is_empty());
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn test_request_carries_query_auth_cookies_and_json() {
        let (base, server) = serve(vec![
            "HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ]);

        let config = RequestConfig {
            method: HttpMethod::Post,
            params: vec![
                ("q".to_string(), "1".to_string()),
                ("tag".to_string(), "a".to_string()),
            ],
            headers: vec![("X-Trace".to_string(), "t-1".to_string())],
            cookies: Some(Cookies::Mapping(vec![("a".to_string(), "1".to_string())])),
            credentials: Some(Credentials {
                username: "user".to_string(),
                password: "pass".to_string(),
            }),
            body: Some(Body::Json(json!({"x": 1}))),
            timeout: Some(Timeout::Pair(5.0, 5.0)),
            ..RequestConfig::new(format!("{base}/submit"))
        };
        let raw = ReqwestClient::new().send(&config).unwrap();
        assert_eq!(raw.status, 201);
        assert_eq!(raw.reason, "Created");

        let requests = server.join().unwrap();
        let request = requests[0].to_ascii_lowercase();
        assert!(request.starts_with("post /submit?q=1&tag=a http/1.1"));
        assert!(request.contains("authorization: basic dxnlcjpwyxnz"));
        assert!(request.contains("cookie: a=1"));
        assert!(request.contains("x-trace: t-1"));
        assert!(request.contains("content-type: application/json"));
        assert!(request.ends_with("{\"x\":1}"));
    }

    #[test]
    fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = RequestConfig::new(format!("http://{addr}/"));
        let err = ReqwestClient::new().send(&config).unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "{err:?}");
    }

    #[test]
    fn test_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
        });

        let config = RequestConfig {
            timeout: Some(Timeout::Single(0.2)),
            ..RequestConfig::new(format!("http://{addr}/slow"))
        };
        let err = ReqwestClient::new().send(&config).unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "{err:?}");
    }

    #[test]
    fn test_unreadable_ca_bundle() {
        let config = RequestConfig {
            verify: Verify::CaBundle("/definitely/not/here/ca.pem".to_string()),
            ..RequestConfig::new("https://example.invalid/")
        };
        let err = ReqwestClient::new().send(&config).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)), "{err:?}");
    }

    #[test]
    fn test_multipart_form_parts() {
        let files = vec![FileField {
            field: "upload".to_string(),
            filename: "a.txt".to_string(),
            content: b"hello".to_vec(),
            content_type: Some("text/plain".to_string()),
            headers: vec![("X-Part".to_string(), "1".to_string())],
        }];
        assert!(multipart_form(&[("note".to_string(), "hi".to_string())], &files).is_ok());

        let bad = vec![FileField {
            content_type: Some("not a mime".to_string()),
            ..files[0].clone()
        }];
        assert!(matches!(
            multipart_form(&[], &bad),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
