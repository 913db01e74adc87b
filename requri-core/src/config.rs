//! Request descriptor types.
//!
//! A `RequestConfig` is produced once by `builder::build` and never mutated
//! afterwards. Every polymorphic input shape (timeout, cookies, body, verify,
//! client certificate) is already resolved into one of the variants below.

use serde::{Serialize, Serializer};
use std::time::Duration;
use url::Url;

/// Supported HTTP methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Options,
    Head,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Methods that are reported as not changing remote state.
    pub fn is_idempotent_read(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "OPTIONS" => Ok(HttpMethod::Options),
            "HEAD" => Ok(HttpMethod::Head),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(()),
        }
    }
}

/// Request timeout, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Timeout {
    Single(f64),
    /// `(connect, read)`
    Pair(f64, f64),
}

impl Timeout {
    pub fn connect(&self) -> Duration {
        match self {
            Timeout::Single(secs) => seconds(*secs),
            Timeout::Pair(connect, _) => seconds(*connect),
        }
    }

    /// Upper bound for the whole exchange.
    pub fn total(&self) -> Duration {
        match self {
            Timeout::Single(secs) => seconds(*secs),
            Timeout::Pair(connect, read) => seconds(connect + read),
        }
    }
}

/// Saturates instead of panicking; `build` already rejects unrepresentable values.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Username/password pair for basic auth. Both halves are always present.
#[derive(Clone, PartialEq, Serialize)]
pub struct Credentials {
    pub username: String,
    #[serde(serialize_with = "redact")]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

fn redact<S: Serializer>(_: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("********")
}

/// One uploaded file in a multipart body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileField {
    pub field: String,
    pub filename: String,
    #[serde(serialize_with = "byte_len")]
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
}

fn byte_len<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("<{} bytes>", content.len()))
}

/// Request body. `Json` wins whenever a JSON value was supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Body {
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    #[serde(serialize_with = "byte_len")]
    Raw(Vec<u8>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FileField>,
    },
}

/// A cookie from a jar-like input, scoped to a domain and path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JarCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

impl JarCookie {
    fn matches(&self, host: &str, path: &str) -> bool {
        let domain_ok = match &self.domain {
            Some(domain) => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                host == domain || host.ends_with(&format!(".{domain}"))
            }
            None => true,
        };
        let path_ok = match &self.path {
            Some(prefix) => {
                path == prefix
                    || (path.starts_with(prefix.as_str())
                        && (prefix.ends_with('/') || path[prefix.len()..].starts_with('/')))
            }
            None => true,
        };
        domain_ok && path_ok
    }
}

/// Cookies to send with the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Cookies {
    Mapping(Vec<(String, String)>),
    Jar(Vec<JarCookie>),
}

impl Cookies {
    /// Name/value pairs that apply to `url`.
    pub fn for_url(&self, url: &str) -> Vec<(String, String)> {
        match self {
            Cookies::Mapping(pairs) => pairs.clone(),
            Cookies::Jar(jar) => {
                let Some((host, path)) = host_and_path(url) else {
                    return Vec::new();
                };
                jar.iter()
                    .filter(|c| c.matches(&host, &path))
                    .map(|c| (c.name.clone(), c.value.clone()))
                    .collect()
            }
        }
    }

    /// Value for a `Cookie` request header, if any cookie applies to `url`.
    pub fn header_value(&self, url: &str) -> Option<String> {
        let pairs = self.for_url(url);
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Lowercased host and path of an absolute URL, parsed the same way the
/// transport resolves it. `None` when the URL has no host or does not parse.
fn host_and_path(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some((host, parsed.path().to_string()))
}

/// TLS verification setting, echoed back in the result record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Verify {
    Enabled(bool),
    /// Path to a CA bundle. Not checked for existence here.
    CaBundle(String),
}

impl Default for Verify {
    fn default() -> Self {
        Verify::Enabled(true)
    }
}

/// Client certificate for mutual TLS.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientCert {
    Pair { cert: String, key: String },
    /// A single PEM file holding both certificate and key.
    Combined(String),
}

/// Proxy for one protocol (`http`, `https`, `all`) or `scheme://host`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyRule {
    pub target: String,
    pub url: String,
}

/// A validated request descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestConfig {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Body>,
    pub headers: Vec<(String, String)>,
    pub cookies: Option<Cookies>,
    pub credentials: Option<Credentials>,
    pub timeout: Option<Timeout>,
    pub allow_redirects: bool,
    pub proxies: Vec<ProxyRule>,
    pub verify: Verify,
    pub stream: bool,
    pub cert: Option<ClientCert>,
}

impl RequestConfig {
    /// A GET request to `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
            cookies: None,
            credentials: None,
            timeout: None,
            allow_redirects: true,
            proxies: Vec::new(),
            verify: Verify::default(),
            stream: true,
            cert: None,
        }
    }
}
