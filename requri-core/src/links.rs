//! `Link` header parsing (RFC 8288), used for the `links` and `next` fields.

use std::collections::BTreeMap;

/// Parameters of one link, always including `url`.
pub type Link = BTreeMap<String, String>;

/// Parse a `Link` header value into its individual links, in header order.
pub fn parse_link_header(value: &str) -> Vec<Link> {
    let strip: &[char] = &[' ', '\'', '"'];
    let value = value.trim_matches(strip);
    if value.is_empty() {
        return Vec::new();
    }

    split_links(value)
        .into_iter()
        .filter_map(|entry| {
            let mut pieces = entry.split(';');
            let target = pieces.next()?.trim().trim_matches(&['<', '>', ' ', '\''][..]);
            if target.is_empty() {
                return None;
            }

            let mut link = Link::new();
            link.insert("url".to_string(), target.to_string());
            for param in pieces {
                let Some((key, val)) = param.split_once('=') else {
                    continue;
                };
                link.insert(
                    key.trim_matches(strip).to_ascii_lowercase(),
                    val.trim_matches(strip).to_string(),
                );
            }
            Some(link)
        })
        .collect()
}

/// Split on the commas that separate links, not those inside `<...>` or quotes.
fn split_links(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_angle = false;
    let mut in_quote = false;

    for (i, ch) in value.char_indices() {
        match ch {
            '<' if !in_quote => in_angle = true,
            '>' if !in_quote => in_angle = false,
            '"' if !in_angle => in_quote = !in_quote,
            ',' if !in_angle && !in_quote => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Links keyed by their `rel`, or by URL when there is no `rel`.
pub fn links_by_key(value: &str) -> BTreeMap<String, Link> {
    parse_link_header(value)
        .into_iter()
        .filter_map(|link| {
            let key = link.get("rel").or_else(|| link.get("url"))?.clone();
            Some((key, link))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_next_link() {
        let links = links_by_key(r#"<https://x/p2>; rel="next""#);
        assert_eq!(links.len(), 1);
        assert_eq!(links["next"]["url"], "https://x/p2");
        assert_eq!(links["next"]["rel"], "next");
    }

    #[test]
    fn test_github_style_pagination() {
        let header = r#"<https://api.github.com/repos?page=3&per_page=100>; rel="next", <https://api.github.com/repos?page=50&per_page=100>; rel="last""#;
        let links = links_by_key(header);
        assert_eq!(links["next"]["url"], "https://api.github.com/repos?page=3&per_page=100");
        assert_eq!(links["last"]["url"], "https://api.github.com/repos?page=50&per_page=100");
    }

    #[test]
    fn test_comma_inside_url_and_extra_params() {
        let header = r#"<https://x/a,b>; rel="alternate"; type="text/html", <https://x/c>"#;
        let parsed = parse_link_header(header);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["url"], "https://x/a,b");
        assert_eq!(parsed[0]["type"], "text/html");

        let links = links_by_key(header);
        assert!(links.contains_key("alternate"));
        assert!(links.contains_key("https://x/c"));
    }

    #[test]
    fn test_empty_header() {
        assert!(parse_link_header("").is_empty());
        assert!(links_by_key("  ").is_empty());
    }
}
