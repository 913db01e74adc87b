//! Response charset detection and text decoding.

use encoding_rs::{Encoding, UTF_8};

/// Charset declared by a `Content-Type` value.
///
/// Falls back to `ISO-8859-1` for `text/*` and `utf-8` for JSON when no
/// charset parameter is given.
pub fn encoding_from_content_type(content_type: Option<&str>) -> Option<String> {
    let content_type = content_type?;
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

    for param in parts {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("charset") {
                let charset = value.trim().trim_matches(&['"', '\''][..]);
                if !charset.is_empty() {
                    return Some(charset.to_string());
                }
            }
        }
    }

    if mime.starts_with("text/") {
        Some("ISO-8859-1".to_string())
    } else if mime == "application/json" {
        Some("utf-8".to_string())
    } else {
        None
    }
}

/// Decode `body` with the named encoding, UTF-8 when absent or unknown.
/// Invalid sequences become U+FFFD.
pub fn decode_text(body: &[u8], encoding: Option<&str>) -> String {
    let encoding = encoding
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}
