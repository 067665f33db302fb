//! Builds ready-to-use shop API clients from a [`ClientConfig`].
//!
//! # Design
//! [`build`] wires the pieces together once: a ureq transport with the
//! configured timeouts, the on-disk response cache and the HTTP logger. The
//! resulting [`ShopClient`] is a cheap `Arc` handle; whoever needs the API
//! holds one, there is no process-wide client.
//!
//! Every request then runs the same pipeline: authorize, log, consult the
//! cache, execute with a single retry on connection failure, revalidate or
//! store, log.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheControl, CacheLookup, HttpCache};
use crate::client::ShopApi;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::logging::HttpLogger;
use crate::transport::{execute_with_retry, Transport, UreqTransport};
use crate::types::{Article, ArticlePage, Product, ProductList};

/// Build a client that talks to the network through ureq.
pub fn build(config: ClientConfig) -> Result<ShopClient, ApiError> {
    let transport = UreqTransport::new(config.timeout());
    build_with_transport(config, Arc::new(transport))
}

/// Build a client on top of a caller-supplied transport.
pub fn build_with_transport(
    config: ClientConfig,
    transport: Arc<dyn Transport>,
) -> Result<ShopClient, ApiError> {
    let cache = HttpCache::open(config.cache_dir(), config.cache_size_bytes())?;
    info!(
        base_url = %config.base_url(),
        cache_dir = %config.cache_dir().display(),
        cache_bytes = config.cache_size_bytes(),
        timeout_secs = config.timeout().as_secs(),
        "Built shop API client"
    );
    Ok(ShopClient {
        inner: Arc::new(Inner {
            api: ShopApi::new(config.base_url()),
            logger: HttpLogger::new(config.http_log_level()),
            cache,
            transport,
            config,
        }),
    })
}

/// Handle to a configured shop API client. Clones share everything.
#[derive(Clone)]
pub struct ShopClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    api: ShopApi,
    logger: HttpLogger,
    cache: HttpCache,
    transport: Arc<dyn Transport>,
}

impl ShopClient {
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn api(&self) -> &ShopApi {
        &self.inner.api
    }

    pub fn cache(&self) -> &HttpCache {
        &self.inner.cache
    }

    /// Send `request` on tokio's blocking pool and await the response.
    ///
    /// Dropping the returned future stops waiting but does not abort a
    /// transfer that is already in flight.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.send(&request))
            .await
            .map_err(|e| ApiError::TaskFailed(e.to_string()))?
    }

    /// Send `request` on the current thread.
    pub fn send_blocking(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.inner.send(request)
    }

    pub async fn list_articles(&self, per_page: u32) -> Result<ArticlePage, ApiError> {
        let response = self.send(self.api().build_list_articles(per_page)).await?;
        self.api().parse_list_articles(response, per_page)
    }

    pub async fn get_article(&self, id: Uuid) -> Result<Article, ApiError> {
        let response = self.send(self.api().build_get_article(id)).await?;
        self.api().parse_get_article(response)
    }

    pub async fn list_products(&self, page_size: u32, current_page: u32) -> Result<ProductList, ApiError> {
        let response = self
            .send(self.api().build_list_products(page_size, current_page))
            .await?;
        self.api().parse_list_products(response)
    }

    pub async fn get_product(&self, sku: &str) -> Result<Product, ApiError> {
        let response = self.send(self.api().build_get_product(sku)).await?;
        self.api().parse_get_product(response)
    }
}

impl Inner {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let started = Instant::now();
        let outgoing = self.authorize(request);
        self.logger.log_request(&outgoing);

        match self.exchange(&outgoing) {
            Ok((response, from_cache)) => {
                self.logger
                    .log_response(&outgoing, &response, started.elapsed(), from_cache);
                Ok(response)
            }
            Err(e) => {
                self.logger.log_failure(&outgoing, &e, started.elapsed());
                Err(e)
            }
        }
    }

    /// Copy of `request` carrying exactly one bearer `Authorization` header
    /// for the key as of now.
    fn authorize(&self, request: &HttpRequest) -> HttpRequest {
        let mut outgoing = request.clone();
        let key = self.config.api_key().current();
        outgoing.set_header("Authorization", format!("Bearer {key}"));
        outgoing
    }

    /// Returns the response and whether it came from the cache.
    fn exchange(&self, request: &HttpRequest) -> Result<(HttpResponse, bool), ApiError> {
        let transport = self.transport.as_ref();
        if request.method != HttpMethod::Get {
            let response = execute_with_retry(transport, request)?;
            // A successful unsafe request invalidates the cached GET.
            if response.status < 400 {
                self.cache.remove(request);
            }
            return Ok((response, false));
        }

        let request_cc = CacheControl::parse(request.header("cache-control"));
        if request_cc.no_store {
            return Ok((execute_with_retry(transport, request)?, false));
        }

        let conditional = match self.cache.lookup(request) {
            Some(CacheLookup::Fresh(response)) if !request_cc.no_cache => {
                return Ok((response, true));
            }
            Some(CacheLookup::Stale {
                etag, last_modified, ..
            }) => {
                let mut conditional = request.clone();
                if let Some(etag) = etag {
                    conditional.set_header("If-None-Match", etag);
                }
                if let Some(last_modified) = last_modified {
                    conditional.set_header("If-Modified-Since", last_modified);
                }
                Some(conditional)
            }
            _ => None,
        };

        let response = execute_with_retry(transport, conditional.as_ref().unwrap_or(request))?;
        if response.status == 304 && conditional.is_some() {
            if let Some(cached) = self.cache.refresh(request, &response) {
                return Ok((cached, true));
            }
            let response = execute_with_retry(transport, request)?;
            self.store(request, &response);
            return Ok((response, false));
        }

        self.store(request, &response);
        Ok((response, false))
    }

    fn store(&self, request: &HttpRequest, response: &HttpResponse) {
        if let Err(e) = self.cache.store(request, response) {
            warn!(url = %request.path, error = %e, "Failed to cache response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::tests::{ok, ScriptedTransport};

    fn config(dir: &std::path::Path) -> ClientConfig {
        ClientConfig::builder("http://shop.test", "key-1")
            .cache_dir(dir)
            .build()
            .unwrap()
    }

    fn cacheable(body: &str, cache_control: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            headers: vec![("Cache-Control".into(), cache_control.into())],
            body: body.into(),
        })
    }

    fn auth_values(req: &HttpRequest) -> Vec<&str> {
        req.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn bearer_header_is_added_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![ok("[]")]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();

        let request = HttpRequest::get("http://shop.test/blog/articles")
            .with_header("authorization", "Basic dXNlcjpwdw==")
            .with_header("X-Trace", "abc");
        client.send_blocking(&request).unwrap();

        let seen = transport.seen.lock();
        assert_eq!(auth_values(&seen[0]), vec!["Bearer key-1"]);
        assert_eq!(seen[0].header("x-trace"), Some("abc"));
        assert_eq!(auth_values(&request), vec!["Basic dXNlcjpwdw=="]);
    }

    #[test]
    fn rotated_key_is_used_by_next_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![ok("a"), ok("b")]));
        let cfg = config(dir.path());
        let key = cfg.api_key().clone();
        let client = build_with_transport(cfg, transport.clone()).unwrap();

        client.send_blocking(&HttpRequest::get("http://shop.test/a")).unwrap();
        key.rotate("key-2");
        client.send_blocking(&HttpRequest::get("http://shop.test/b")).unwrap();

        let seen = transport.seen.lock();
        assert_eq!(auth_values(&seen[0]), vec!["Bearer key-1"]);
        assert_eq!(auth_values(&seen[1]), vec!["Bearer key-2"]);
    }

    #[test]
    fn connection_failure_then_success_is_transparent() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Connect("reset".into())),
            ok("recovered"),
        ]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let resp = client.send_blocking(&HttpRequest::get("http://shop.test/x")).unwrap();
        assert_eq!(resp.body, "recovered");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn repeated_failure_surfaces_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Timeout("connect".into())),
            Err(TransportError::Timeout("connect".into())),
        ]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let err = client.send_blocking(&HttpRequest::get("http://shop.test/x")).unwrap_err();
        assert!(matches!(err, ApiError::Network(TransportError::Timeout(_))));
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn fresh_cached_response_skips_transport() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![cacheable("[1]", "max-age=60")]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let req = HttpRequest::get("http://shop.test/products");

        assert_eq!(client.send_blocking(&req).unwrap().body, "[1]");
        assert_eq!(client.send_blocking(&req).unwrap().body, "[1]");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn request_no_cache_goes_to_network() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![
            cacheable("old", "max-age=60"),
            cacheable("new", "max-age=60"),
        ]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let req = HttpRequest::get("http://shop.test/products");
        client.send_blocking(&req).unwrap();

        let forced = req.clone().with_header("Cache-Control", "no-cache");
        assert_eq!(client.send_blocking(&forced).unwrap().body, "new");
        assert_eq!(client.send_blocking(&req).unwrap().body, "new");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn stale_entry_is_revalidated_with_etag() {
        let dir = tempfile::tempdir().unwrap();
        let first = Ok(HttpResponse {
            status: 200,
            headers: vec![
                ("Cache-Control".into(), "max-age=0".into()),
                ("ETag".into(), "\"v1\"".into()),
            ],
            body: "cached body".into(),
        });
        let not_modified = Ok(HttpResponse {
            status: 304,
            headers: Vec::new(),
            body: String::new(),
        });
        let transport = Arc::new(ScriptedTransport::new(vec![first, not_modified]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let req = HttpRequest::get("http://shop.test/products/MJ01");

        client.send_blocking(&req).unwrap();
        let resp = client.send_blocking(&req).unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "cached body");
        let seen = transport.seen.lock();
        assert_eq!(seen[0].header("if-none-match"), None);
        assert_eq!(seen[1].header("if-none-match"), Some("\"v1\""));
    }

    #[test]
    fn successful_put_invalidates_cached_get() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![
            cacheable("v1", "max-age=60"),
            ok(""),
            cacheable("v2", "max-age=60"),
        ]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let get = HttpRequest::get("http://shop.test/products/MJ01");
        let put = HttpRequest {
            method: HttpMethod::Put,
            body: Some(r#"{"name":"Renamed"}"#.into()),
            ..HttpRequest::get("http://shop.test/products/MJ01")
        };

        assert_eq!(client.send_blocking(&get).unwrap().body, "v1");
        client.send_blocking(&put).unwrap();
        assert_eq!(client.send_blocking(&get).unwrap().body, "v2");
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn failed_put_keeps_cached_get() {
        let dir = tempfile::tempdir().unwrap();
        let rejected = Ok(HttpResponse {
            status: 409,
            headers: Vec::new(),
            body: String::new(),
        });
        let transport = Arc::new(ScriptedTransport::new(vec![cacheable("v1", "max-age=60"), rejected]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let get = HttpRequest::get("http://shop.test/products/MJ01");
        let put = HttpRequest {
            method: HttpMethod::Put,
            ..HttpRequest::get("http://shop.test/products/MJ01")
        };

        client.send_blocking(&get).unwrap();
        assert_eq!(client.send_blocking(&put).unwrap().status, 409);
        assert_eq!(client.send_blocking(&get).unwrap().body, "v1");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn request_no_store_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![cacheable("x", "max-age=60")]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();
        let req = HttpRequest::get("http://shop.test/p").with_header("Cache-Control", "no-store");
        client.send_blocking(&req).unwrap();
        assert_eq!(client.cache().entry_count(), 0);
    }

    #[test]
    fn cache_stays_within_budget_across_requests() {
        let dir = tempfile::tempdir().unwrap();
        let budget = 4_096;
        let script = (0..40)
            .map(|i| cacheable(&"b".repeat(200 + i * 13), "max-age=60"))
            .collect();
        let transport = Arc::new(ScriptedTransport::new(script));
        let cfg = ClientConfig::builder("http://shop.test", "k")
            .cache_dir(dir.path())
            .cache_size_bytes(budget)
            .build()
            .unwrap();
        let client = build_with_transport(cfg, transport).unwrap();
        for i in 0..40 {
            client
                .send_blocking(&HttpRequest::get(format!("http://shop.test/p/{i}")))
                .unwrap();
            assert!(client.cache().size_bytes() <= budget);
        }
    }

    #[tokio::test]
    async fn async_send_delivers_parsed_page() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"[{"id":"00000000-0000-0000-0000-000000000001","title":"Hi","content":"","published_at":"2020-01-01"}]"#;
        let transport = Arc::new(ScriptedTransport::new(vec![ok(body)]));
        let client = build_with_transport(config(dir.path()), transport.clone()).unwrap();

        let page = client.list_articles(1).await.unwrap();
        assert_eq!(page.articles[0].title, "Hi");
        assert!(page.has_more);
        assert_eq!(
            transport.seen.lock()[0].path,
            "http://shop.test/blog/articles?per_page=1"
        );
    }

    #[test]
    fn build_creates_cache_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("nested").join("http");
        let cfg = ClientConfig::builder("http://shop.test", "k")
            .cache_dir(&cache_dir)
            .build()
            .unwrap();
        let client = build(cfg).unwrap();
        assert!(cache_dir.is_dir());
        assert_eq!(client.cache().max_bytes(), 10 * 1024 * 1024);
    }
}
