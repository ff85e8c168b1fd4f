//! Outbound side: one buffered round-trip to the origin server.

use bytes::{Bytes, BytesMut};
use cproxy_config::ProxyConfig;
use cproxy_http::headers::outbound_request_headers;
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::{debug, instrument};

use crate::ProxyError;

/// Fully buffered origin response.
#[derive(Debug)]
pub(crate) struct OriginResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

#[derive(Debug, Clone)]
pub(crate) struct OriginClient {
    client: reqwest::Client,
    max_body: Option<u64>,
}

impl OriginClient {
    pub(crate) fn new(cfg: &ProxyConfig) -> Result<Self, ProxyError> {
        // No system proxy (we are the proxy) and no redirect following:
        // the client sees exactly what the origin answered.
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = cfg.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(ProxyError::Client)?;
        Ok(Self {
            client,
            max_body: cfg.max_response_body_bytes(),
        })
    }

    /// Sends `method uri` with the client's headers (no body) and waits for
    /// the whole response.
    #[instrument(level = "debug", skip(self, headers), fields(%method, %uri))]
    pub(crate) async fn fetch(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<OriginResponse, ProxyError> {
        let url = absolute_url(uri)?;

        let mut resp = self
            .client
            .request(method.clone(), url.as_str())
            .headers(outbound_request_headers(headers))
            .send()
            .await
            .map_err(|source| ProxyError::OriginUnreachable {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        let headers = resp.headers().clone();

        if let (Some(limit), Some(len)) = (self.max_body, resp.content_length()) {
            if len > limit {
                return Err(ProxyError::ResponseTooLarge { url, limit });
            }
        }

        let mut body = BytesMut::new();
        loop {
            let chunk = resp
                .chunk()
                .await
                .map_err(|source| ProxyError::OriginUnreachable {
                    url: url.clone(),
                    source,
                })?;
            let Some(chunk) = chunk else {
                break;
            };

            if let Some(limit) = self.max_body {
                if (body.len() + chunk.len()) as u64 > limit {
                    return Err(ProxyError::ResponseTooLarge { url, limit });
                }
            }
            body.extend_from_slice(&chunk);
        }

        debug!(
            target: "cproxy::origin",
            %status,
            body_len = body.len(),
            "Origin response buffered"
        );

        Ok(OriginResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}

/// Proxied requests carry the absolute URL in the request line.
fn absolute_url(uri: &Uri) -> Result<String, ProxyError> {
    let scheme_ok = matches!(uri.scheme_str(), Some("http") | Some("https"));
    if !scheme_ok || uri.authority().is_none() {
        return Err(ProxyError::InvalidTarget(uri.to_string()));
    }
    Ok(uri.to_string())
}
