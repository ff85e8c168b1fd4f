//! Per-request decision pipeline: cache lookup, then origin + store on miss.

use std::{convert::Infallible, sync::Arc};

use cproxy_cache::{CacheError, CacheStore, Entry};
use cproxy_http::{
    headers::{from_pairs, to_pairs},
    responses::{self, ProxyResponse},
};
use http::{request::Parts, Method, Request, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{metrics::CacheMetrics, origin::OriginClient, ProxyError};

/// Status and headers stored next to each cached body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    /// Ordered, repeated names kept as separate pairs.
    pub headers: Vec<(String, String)>,
}

/// A cached origin response as read back from the store.
pub type CachedResponse = Entry<ResponseMeta>;

/// `"<METHOD> <URL>"`. The URL is the parsed request target re-rendered, so
/// the scheme comes out lowercase and an empty path becomes `/`; everything
/// else (host case, query order, percent-encoding) is kept as received.
pub fn cache_key(method: &Method, uri: &Uri) -> String {
    format!("{method} {uri}")
}

pub(crate) struct Pipeline {
    cache: CacheStore,
    origin: OriginClient,
    metrics: Arc<CacheMetrics>,
}

impl Pipeline {
    pub(crate) fn new(cache: CacheStore, origin: OriginClient, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            cache,
            origin,
            metrics,
        }
    }

    /// Service entry point. Never fails: every error becomes an empty 500.
    ///
    /// The request body is not read; it is never forwarded.
    pub(crate) async fn handle<B>(
        self: Arc<Self>,
        req: Request<B>,
    ) -> Result<ProxyResponse, Infallible> {
        let (parts, _) = req.into_parts();

        if parts.method == Method::CONNECT {
            self.metrics.record_tunnel_rejected();
            info!(
                target: "cproxy::pipeline",
                uri = %parts.uri,
                "Rejecting CONNECT on an open connection"
            );
            return Ok(responses::tunnel_rejected());
        }

        let method = parts.method.clone();
        let uri = parts.uri.clone();

        // Own task so a panic is contained to this request.
        let pipeline = self.clone();
        let result = match tokio::spawn(async move { pipeline.process(parts).await }).await {
            Ok(result) => result,
            Err(join_err) => Err(ProxyError::HandlerPanic(join_err.to_string())),
        };

        match result {
            Ok(resp) => Ok(resp),
            Err(e) => {
                self.metrics.record_failure();
                error!(
                    target: "cproxy::pipeline",
                    %method,
                    %uri,
                    error = %e,
                    "Cannot proxy request"
                );
                Ok(responses::empty(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }

    #[instrument(skip(self, parts), fields(method = %parts.method, uri = %parts.uri))]
    async fn process(&self, parts: Parts) -> Result<ProxyResponse, ProxyError> {
        debug!(
            target: "cproxy::pipeline",
            headers = ?parts.headers,
            "Incoming request"
        );

        let key = cache_key(&parts.method, &parts.uri);

        match self.cache.get::<ResponseMeta>(&key).await {
            Ok(entry) => match replay(&entry) {
                Ok(resp) => {
                    self.metrics.record_hit(entry.size());
                    debug!(
                        target: "cproxy::pipeline",
                        cache_key = %key,
                        "Sending cached response"
                    );
                    return Ok(resp);
                }
                Err(e) => {
                    self.metrics.record_cache_read_error();
                    warn!(
                        target: "cproxy::pipeline",
                        cache_key = %key,
                        error = %e,
                        "Cached entry cannot be replayed"
                    );
                }
            },
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                self.metrics.record_cache_read_error();
                warn!(
                    target: "cproxy::pipeline",
                    cache_key = %key,
                    error = %e,
                    "Cannot load cached entry"
                );
            }
        }

        self.metrics.record_miss();
        debug!(target: "cproxy::pipeline", cache_key = %key, "Cache miss");

        let fetched = self
            .origin
            .fetch(&parts.method, &parts.uri, &parts.headers)
            .await?;

        info!(
            target: "cproxy::pipeline",
            status = %fetched.status,
            headers = ?fetched.headers,
            "Got origin response"
        );

        // Store first, then answer: a follow-up request from the same client
        // is guaranteed to hit.
        let meta = ResponseMeta {
            status: fetched.status.as_u16(),
            headers: to_pairs(&fetched.headers),
        };
        self.cache
            .put(&key, &fetched.body, &meta)
            .await
            .map_err(ProxyError::CacheWrite)?;

        Ok(responses::replay(
            fetched.status,
            fetched.headers,
            fetched.body,
        ))
    }
}

/// Rebuilds the stored response; failures are treated like a read error.
fn replay(entry: &CachedResponse) -> Result<ProxyResponse, CacheError> {
    let invalid = |detail: String| CacheError::Integrity {
        key: entry.key.clone(),
        expected: "replayable status and headers".to_string(),
        actual: detail,
    };

    let status = StatusCode::from_u16(entry.metadata.status)
        .map_err(|_| invalid(format!("status {}", entry.metadata.status)))?;
    let headers = from_pairs(&entry.metadata.headers).map_err(|e| invalid(e.to_string()))?;

    Ok(responses::replay(status, headers, entry.data.clone()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use cproxy_cache::CacheStore;
    use cproxy_config::ProxyConfig;
    use http::{Method, Request, StatusCode, Uri};
    use http_body_util::BodyExt;

    use super::{cache_key, Pipeline, ResponseMeta};
    use crate::{metrics::CacheMetrics, origin::OriginClient};

    fn pipeline(dir: &tempfile::TempDir) -> Arc<Pipeline> {
        let origin = OriginClient::new(&ProxyConfig::default()).expect("client");
        Arc::new(Pipeline::new(
            CacheStore::new(dir.path(), None),
            origin,
            Arc::new(CacheMetrics::default()),
        ))
    }

    async fn body_of(resp: super::ProxyResponse) -> Bytes {
        resp.into_body().collect().await.expect("body").to_bytes()
    }

    /// Nothing listens there; any origin call fails fast.
    const DEAD_ORIGIN: &str = "http://127.0.0.1:1/";

    #[test]
    fn cache_key_is_method_space_url() {
        let uri: Uri = "http://example.com/a?x=1&y=2".parse().expect("uri");
        assert_eq!(
            cache_key(&Method::GET, &uri),
            "GET http://example.com/a?x=1&y=2"
        );
    }

    #[test]
    fn cache_key_does_not_normalize_query_order() {
        let a: Uri = "http://example.com/?x=1&y=2".parse().expect("uri");
        let b: Uri = "http://example.com/?y=2&x=1".parse().expect("uri");
        assert_ne!(cache_key(&Method::GET, &a), cache_key(&Method::GET, &b));
    }

    #[test]
    fn cache_key_renders_scheme_lowercase_and_empty_path_as_slash() {
        let upper: Uri = "HTTP://example.com/a".parse().expect("uri");
        assert_eq!(cache_key(&Method::GET, &upper), "GET http://example.com/a");

        let bare: Uri = "http://example.com".parse().expect("uri");
        assert_eq!(cache_key(&Method::GET, &bare), "GET http://example.com/");

        let host_case: Uri = "http://Example.COM/A%2f".parse().expect("uri");
        assert_eq!(
            cache_key(&Method::GET, &host_case),
            "GET http://Example.COM/A%2f"
        );
    }

    #[tokio::test]
    async fn connect_is_answered_with_501() {
        let dir = tempfile::tempdir().expect("temp dir");
        let p = pipeline(&dir);
        let req = Request::builder()
            .method(Method::CONNECT)
            .uri("example.com:443")
            .body(())
            .expect("request");

        let resp = p.clone().handle(req).await.expect("infallible");
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(p.metrics.snapshot().tunnels_rejected, 1);
    }

    #[tokio::test]
    async fn hit_is_served_without_contacting_origin() {
        let dir = tempfile::tempdir().expect("temp dir");
        let p = pipeline(&dir);

        let meta = ResponseMeta {
            status: 201,
            headers: vec![("x-counter".to_string(), "1".to_string())],
        };
        p.cache
            .put(&format!("GET {DEAD_ORIGIN}"), b"{\"counter\":2}", &meta)
            .await
            .expect("put");

        let req = Request::get(DEAD_ORIGIN).body(()).expect("request");
        let resp = p.clone().handle(req).await.expect("infallible");

        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["x-counter"], "1");
        assert_eq!(body_of(resp).await.as_ref(), b"{\"counter\":2}");
        assert_eq!(p.metrics.snapshot().hits, 1);
    }

    #[tokio::test]
    async fn unreachable_origin_is_an_empty_500() {
        let dir = tempfile::tempdir().expect("temp dir");
        let p = pipeline(&dir);

        let req = Request::get(DEAD_ORIGIN).body(()).expect("request");
        let resp = p.clone().handle(req).await.expect("infallible");

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(resp).await.is_empty());
        let snap = p.metrics.snapshot();
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.failures, 1);
    }

    #[tokio::test]
    async fn origin_form_target_is_an_empty_500() {
        let dir = tempfile::tempdir().expect("temp dir");
        let p = pipeline(&dir);

        let req = Request::get("/").body(()).expect("request");
        let resp = p.clone().handle(req).await.expect("infallible");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unreplayable_entry_is_demoted_to_a_miss() {
        let dir = tempfile::tempdir().expect("temp dir");
        let p = pipeline(&dir);

        let meta = ResponseMeta {
            status: 42,
            headers: Vec::new(),
        };
        p.cache
            .put(&format!("GET {DEAD_ORIGIN}"), b"", &meta)
            .await
            .expect("put");

        let req = Request::get(DEAD_ORIGIN).body(()).expect("request");
        let resp = p.clone().handle(req).await.expect("infallible");

        // Fell through to the (dead) origin.
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let snap = p.metrics.snapshot();
        assert_eq!(snap.cache_read_errors, 1);
        assert_eq!(snap.misses, 1);
    }
}
