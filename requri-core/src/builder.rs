//! Request Builder: turns the host's parameter bag into a `RequestConfig`.
//!
//! Everything is validated here, before any network access. Nothing in this
//! module performs I/O; paths (CA bundle, client certificate) are carried
//! through untouched for the transport to open.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{
    Body, ClientCert, Cookies, Credentials, FileField, HttpMethod, JarCookie, ProxyRule,
    RequestConfig, Timeout, Verify,
};
use crate::error::ValidationError;
use crate::params::{as_flag, scalar_to_string, type_name, RawParams};

/// Validate and normalize a raw parameter bag.
pub fn build(raw: &Value) -> Result<RequestConfig, ValidationError> {
    let params = RawParams::new(raw)?;

    let method = parse_method(&params)?;
    let url = parse_url(&params)?;
    let credentials = parse_credentials(&params)?;
    let timeout = params.get("timeout").map(parse_timeout).transpose()?;
    let body = parse_body(&params)?;

    let config = RequestConfig {
        method,
        url,
        params: params
            .get("params")
            .map(|v| parse_pairs("params", v))
            .transpose()?
            .unwrap_or_default(),
        body,
        headers: params
            .get("headers")
            .map(|v| parse_mapping("headers", v))
            .transpose()?
            .unwrap_or_default(),
        cookies: params.get("cookies").map(parse_cookies).transpose()?,
        credentials,
        timeout,
        allow_redirects: params.flag("allow_redirects", true)?,
        proxies: params
            .get("proxies")
            .map(parse_proxies)
            .transpose()?
            .unwrap_or_default(),
        verify: params.get("verify").map(parse_verify).transpose()?.unwrap_or_default(),
        stream: params.flag("stream", true)?,
        cert: parse_cert(&params)?,
    };

    debug!(method = %config.method, url = %config.url, "built request descriptor");
    Ok(config)
}

fn parse_method(params: &RawParams<'_>) -> Result<HttpMethod, ValidationError> {
    match params.get("method") {
        None => Ok(HttpMethod::default()),
        Some(Value::String(m)) => m
            .trim()
            .parse::<HttpMethod>()
            .map_err(|_| ValidationError::InvalidMethod(m.clone())),
        Some(other) => Err(ValidationError::InvalidMethod(other.to_string())),
    }
}

fn parse_url(params: &RawParams<'_>) -> Result<String, ValidationError> {
    let url = params
        .string("url")?
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ValidationError::MissingRequiredField("url"))?;
    Ok(url.to_string())
}

fn parse_credentials(params: &RawParams<'_>) -> Result<Option<Credentials>, ValidationError> {
    let username = params.string("username")?;
    let password = params.string("password")?;
    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ValidationError::IncompleteCredentials { missing: "password" }),
        (None, Some(_)) => Err(ValidationError::IncompleteCredentials { missing: "username" }),
    }
}

/// A number, or a `[connect, read]` pair of numbers. Every value, and the sum
/// of a pair, must be a positive number of seconds that fits in a `Duration`.
pub fn parse_timeout(value: &Value) -> Result<Timeout, ValidationError> {
    let representable = |secs: f64| -> Result<f64, ValidationError> {
        if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
            return Err(ValidationError::InvalidTimeout(format!(
                "{secs} is not a positive number of seconds"
            )));
        }
        Ok(secs)
    };
    let seconds = |v: &Value| -> Result<f64, ValidationError> {
        let secs = v.as_f64().ok_or_else(|| {
            ValidationError::InvalidTimeout(format!("expected a number, got {}", type_name(v)))
        })?;
        representable(secs)
    };

    match value {
        Value::Number(_) => Ok(Timeout::Single(seconds(value)?)),
        Value::Array(items) if items.len() == 2 => {
            let (connect, read) = (seconds(&items[0])?, seconds(&items[1])?);
            representable(connect + read)?;
            Ok(Timeout::Pair(connect, read))
        }
        Value::Array(items) => Err(ValidationError::InvalidTimeout(format!(
            "expected a (connect, read) pair, got {} elements",
            items.len()
        ))),
        other => Err(ValidationError::InvalidTimeout(format!(
            "expected a number or a (connect, read) pair, got {}",
            type_name(other)
        ))),
    }
}

/// A mapping, or a list of `[key, value]` pairs. List values in a mapping
/// repeat the key once per element.
fn parse_pairs(field: &'static str, value: &Value) -> Result<Vec<(String, String)>, ValidationError> {
    let scalar = |v: &Value| {
        scalar_to_string(v).ok_or_else(|| {
            ValidationError::invalid(field, format!("expected a scalar value, got {}", type_name(v)))
        })
    };

    let mut pairs = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match v {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items {
                            pairs.push((key.clone(), scalar(item)?));
                        }
                    }
                    other => pairs.push((key.clone(), scalar(other)?)),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item.as_array().map(Vec::as_slice) {
                    Some([k, v]) => pairs.push((scalar(k)?, scalar(v)?)),
                    _ => {
                        return Err(ValidationError::invalid(
                            field,
                            "expected a list of [key, value] pairs",
                        ))
                    }
                }
            }
        }
        other => {
            return Err(ValidationError::invalid(
                field,
                format!("expected a mapping or a list of pairs, got {}", type_name(other)),
            ))
        }
    }
    Ok(pairs)
}

fn parse_mapping(field: &'static str, value: &Value) -> Result<Vec<(String, String)>, ValidationError> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                scalar_to_string(v).map(|v| (k.clone(), v)).ok_or_else(|| {
                    ValidationError::invalid(field, format!("value for {k} must be a scalar"))
                })
            })
            .collect(),
        other => Err(ValidationError::invalid(
            field,
            format!("expected a mapping, got {}", type_name(other)),
        )),
    }
}

/// Resolve `data`, `files` and `json` into at most one body. A supplied JSON
/// value always wins; the other sources are dropped with a warning.
fn parse_body(params: &RawParams<'_>) -> Result<Option<Body>, ValidationError> {
    let data = params.get("data");
    let files = params.get("files");

    if let Some(json) = params.get("json") {
        if data.is_some_and(|d| !is_empty(d)) || files.is_some_and(|f| !is_empty(f)) {
            warn!("both json and data/files were supplied; sending json and ignoring data/files");
        }
        return Ok(Some(Body::Json(json.clone())));
    }

    let files = files.map(parse_files).transpose()?;
    match (data, files) {
        (None, None) => Ok(None),
        (Some(Value::String(raw)), None) => Ok(Some(Body::Raw(raw.clone().into_bytes()))),
        (Some(data), None) => Ok(Some(Body::Form(parse_pairs("data", data)?))),
        (Some(Value::String(_)), Some(_)) => Err(ValidationError::invalid(
            "data",
            "a raw payload cannot be combined with files; use a mapping",
        )),
        (data, Some(files)) => Ok(Some(Body::Multipart {
            fields: data
                .map(|d| parse_pairs("data", d))
                .transpose()?
                .unwrap_or_default(),
            files,
        })),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// `field -> [filename, content, content_type?, {headers}?]`
fn parse_files(value: &Value) -> Result<Vec<FileField>, ValidationError> {
    let map = value.as_object().ok_or_else(|| {
        ValidationError::invalid("files", format!("expected a mapping, got {}", type_name(value)))
    })?;

    map.iter()
        .map(|(field, descriptor)| -> Result<FileField, ValidationError> {
            let bad = |reason: &str| ValidationError::invalid("files", format!("{field}: {reason}"));
            let parts = descriptor
                .as_array()
                .filter(|p| (2..=4).contains(&p.len()))
                .ok_or_else(|| bad("expected [filename, content, content_type?, headers?]"))?;

            let filename = parts[0].as_str().ok_or_else(|| bad("filename must be a string"))?;
            let content = parts[1].as_str().ok_or_else(|| bad("content must be a string"))?;
            let content_type = match parts.get(2) {
                None | Some(Value::Null) => None,
                Some(Value::String(ct)) => Some(ct.clone()),
                Some(_) => return Err(bad("content_type must be a string")),
            };
            let headers = match parts.get(3) {
                None | Some(Value::Null) => Vec::new(),
                Some(h) => parse_mapping("files", h)?,
            };

            Ok(FileField {
                field: field.clone(),
                filename: filename.to_string(),
                content: content.as_bytes().to_vec(),
                content_type,
                headers,
            })
        })
        .collect()
}

/// A mapping of name to value, or a jar: a list of cookie objects.
fn parse_cookies(value: &Value) -> Result<Cookies, ValidationError> {
    match value {
        Value::Object(_) => Ok(Cookies::Mapping(parse_mapping("cookies", value)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| -> Result<JarCookie, ValidationError> {
                let cookie = item.as_object().ok_or_else(|| {
                    ValidationError::invalid("cookies", "jar entries must be mappings")
                })?;
                let text = |key: &str| cookie.get(key).and_then(Value::as_str).map(str::to_string);
                Ok(JarCookie {
                    name: text("name").ok_or_else(|| {
                        ValidationError::invalid("cookies", "jar entry without a name")
                    })?,
                    value: cookie.get("value").and_then(scalar_to_string).unwrap_or_default(),
                    domain: text("domain"),
                    path: text("path"),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Cookies::Jar),
        other => Err(ValidationError::invalid(
            "cookies",
            format!("expected a mapping or a cookie jar, got {}", type_name(other)),
        )),
    }
}

fn parse_proxies(value: &Value) -> Result<Vec<ProxyRule>, ValidationError> {
    parse_mapping("proxies", value)?
        .into_iter()
        .map(|(target, url)| {
            let known = matches!(target.as_str(), "http" | "https" | "all") || target.contains("://");
            if !known {
                return Err(ValidationError::invalid(
                    "proxies",
                    format!("unknown proxy target {target}; use http, https, all or scheme://host"),
                ));
            }
            if url.trim().is_empty() {
                return Err(ValidationError::invalid("proxies", format!("empty proxy URL for {target}")));
            }
            Ok(ProxyRule { target, url })
        })
        .collect()
}

fn parse_verify(value: &Value) -> Result<Verify, ValidationError> {
    // Boolean spellings ("false", "no", ...) toggle verification rather than name a file.
    if let (Value::String(_), Some(enabled)) = (value, as_flag(value)) {
        return Ok(Verify::Enabled(enabled));
    }
    match value {
        Value::Bool(b) => Ok(Verify::Enabled(*b)),
        Value::String(path) if !path.trim().is_empty() => Ok(Verify::CaBundle(path.clone())),
        other => Err(ValidationError::invalid(
            "verify",
            format!("expected a boolean or a CA bundle path, got {}", type_name(other)),
        )),
    }
}

fn parse_cert(params: &RawParams<'_>) -> Result<Option<ClientCert>, ValidationError> {
    let pair = match params.get("cert_key") {
        None => None,
        Some(Value::Array(items)) => match items.as_slice() {
            [Value::String(cert), Value::String(key)] => Some(ClientCert::Pair {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ => {
                return Err(ValidationError::invalid(
                    "cert_key",
                    "expected a [cert_path, key_path] pair",
                ))
            }
        },
        Some(other) => {
            return Err(ValidationError::invalid(
                "cert_key",
                format!("expected a [cert_path, key_path] pair, got {}", type_name(other)),
            ))
        }
    };
    let file = params.string("cert_file")?.map(|p| ClientCert::Combined(p.to_string()));

    if pair.is_some() && file.is_some() {
        warn!("both cert_key and cert_file were supplied; using cert_key");
    }
    Ok(pair.or(file))
}
