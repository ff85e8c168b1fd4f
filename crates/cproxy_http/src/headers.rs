//! =======================================================
//! HEADER HANDLING (forward-proxy semantics)
//! =======================================================
//!
//! Outbound (client -> origin):
//! - drop hop-by-hop headers (Connection, Proxy-*, TE, ...)
//! - drop headers named by `Connection` tokens
//! - drop body framing (Content-Length, Transfer-Encoding): no body is forwarded
//!
//! Everything else goes to the origin verbatim, `Host` included.

use std::collections::HashSet;

use http::{HeaderMap, HeaderName, HeaderValue};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Copy of `headers` that is safe to send to the origin.
pub fn outbound_request_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_tokens = connection_tokens(headers);

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower) || connection_tokens.contains(lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn connection_tokens(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| {
            let trimmed = token.trim().trim_matches(|c| c == '"' || c == '\'');
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_ascii_lowercase())
            }
        })
        .collect()
}

/// Flattens a header map into ordered `(name, value)` pairs.
/// Repeated headers stay as separate pairs, in arrival order.
pub fn to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Rebuilds a header map from pairs produced by [`to_pairs`].
pub fn from_pairs(pairs: &[(String, String)]) -> Result<HeaderMap, http::Error> {
    let mut out = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_bytes(value.as_bytes())?;
        out.append(name, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};

    use super::{from_pairs, outbound_request_headers, to_pairs};

    #[test]
    fn outbound_drops_hop_by_hop_and_connection_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));
        headers.insert("connection", HeaderValue::from_static("\"Foo\", keep-alive"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-length", HeaderValue::from_static("10"));
        headers.insert("foo", HeaderValue::from_static("bar"));
        headers.insert("x-client", HeaderValue::from_static("test"));

        let out = outbound_request_headers(&headers);
        assert_eq!(out.get("host").map(|v| v.as_bytes()), Some(&b"example.com"[..]));
        assert_eq!(out.get("x-client").map(|v| v.as_bytes()), Some(&b"test"[..]));
        assert!(out.get("connection").is_none());
        assert!(out.get("proxy-connection").is_none());
        assert!(out.get("content-length").is_none());
        assert!(out.get("foo").is_none());
    }

    #[test]
    fn pairs_keep_repeated_headers_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("x-counter", HeaderValue::from_static("1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let pairs = to_pairs(&headers);
        let cookies: Vec<&str> = pairs
            .iter()
            .filter(|(n, _)| n == "set-cookie")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);

        let rebuilt = from_pairs(&pairs).expect("valid pairs");
        assert_eq!(rebuilt, headers);
    }

    #[test]
    fn from_pairs_rejects_invalid_names() {
        let pairs = vec![("bad name".to_string(), "v".to_string())];
        assert!(from_pairs(&pairs).is_err());
    }
}
