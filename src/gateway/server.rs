//! Gateway HTTP Server
//!
//! Every request runs linearly through method check, classification,
//! admission, and then either the listing aggregator or the range resolver
//! before the response builder renders it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, Method},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::listing::ListingAggregator;
use super::path::{display_path, DenyList, Route, Target, View};
use super::range::{parse_range_header, RangeResolution};
use super::response::{self, Outcome, ResponseOptions};
use crate::assets::{AssetHost, BuiltinAssets, DirAssets};
use crate::config::{FilesConfig, ListingConfig, WolfBrowseConfig};
use crate::error::{Error, Result};
use crate::gate::{AdmissionGate, FixedWindowLimiter};
use crate::store::{DiskStore, ObjectStore};

/// Path of the directory-browser page on the asset host
const INDEX_PAGE: &str = "/index.html";

/// Shared, read-only state for request handlers
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub gate: Arc<dyn AdmissionGate>,
    pub assets: Arc<dyn AssetHost>,
    pub deny: DenyList,
    pub listing: ListingConfig,
    pub files: FilesConfig,
    pub api_prefix: Option<String>,
    pub response: ResponseOptions,
}

impl AppState {
    /// Listing aggregator over this state's store, gate and deny list
    pub fn lister(&self) -> ListingAggregator<'_> {
        ListingAggregator::new(
            self.store.as_ref(),
            self.gate.as_ref(),
            &self.deny,
            &self.listing.rate_bucket,
            self.listing.max_pages,
        )
    }
}

/// HTTP gateway over an object store
pub struct GatewayServer {
    bind_address: String,
    state: Arc<AppState>,
}

impl GatewayServer {
    /// Create a gateway with explicit collaborators
    pub fn new(
        config: &WolfBrowseConfig,
        store: Arc<dyn ObjectStore>,
        gate: Arc<dyn AdmissionGate>,
        assets: Arc<dyn AssetHost>,
    ) -> Self {
        let state = Arc::new(AppState {
            store,
            gate,
            assets,
            deny: DenyList::new(config.access.deny_prefixes.iter().cloned()),
            listing: config.listing.clone(),
            files: config.files.clone(),
            api_prefix: config.api_prefix().map(str::to_string),
            response: ResponseOptions {
                cors: config.server.cors_enabled,
            },
        });

        Self {
            bind_address: config.server.bind_address.clone(),
            state,
        }
    }

    /// Create a gateway over the configured directory, limits and assets
    pub fn from_config(config: &WolfBrowseConfig) -> Self {
        let store = DiskStore::new(config.store.root.clone())
            .with_cache_control(config.files.cache_control.clone());
        let gate = FixedWindowLimiter::from_config(&config.rate_limits);
        let assets: Arc<dyn AssetHost> = match &config.assets.dir {
            Some(dir) => Arc::new(DirAssets::new(dir.clone())),
            None => Arc::new(BuiltinAssets),
        };

        Self::new(config, Arc::new(store), Arc::new(gate), assets)
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(handle_root))
            .route("/*path", any(handle_path))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Start the HTTP server and run until Ctrl-C
    pub async fn start(&self) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(&self.bind_address).await?;
        info!("WolfBrowse gateway listening on {}", self.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Upstream(format!("HTTP server error: {}", e)))?;

        info!("WolfBrowse gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ============ Handlers ============

async fn handle_root(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    query: std::result::Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response {
    dispatch(&state, method, Some(""), &headers, &query_params(query)).await
}

async fn handle_path(
    State(state): State<Arc<AppState>>,
    method: Method,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    query: std::result::Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response {
    let path = match path {
        Ok(Path(path)) => Some(path),
        Err(e) => {
            debug!("Undecodable request path: {}", e);
            None
        }
    };
    dispatch(&state, method, path.as_deref(), &headers, &query_params(query)).await
}

/// A query string that fails to parse selects no options
fn query_params(
    query: std::result::Result<Query<HashMap<String, String>>, QueryRejection>,
) -> HashMap<String, String> {
    match query {
        Ok(Query(params)) => params,
        Err(e) => {
            debug!("Ignoring malformed query string: {}", e);
            HashMap::new()
        }
    }
}

/// `path` is `None` when the request path did not percent-decode to UTF-8
async fn dispatch(
    state: &AppState,
    method: Method,
    path: Option<&str>,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Response {
    let outcome = match path {
        _ if method != Method::GET => {
            Outcome::Failed(Error::MethodNotAllowed(method.to_string()))
        }
        None => Outcome::Failed(Error::NotFound("undecodable path".into())),
        Some(path) => {
            let route = Route::resolve(path, query.contains_key("api"), state.api_prefix.as_deref());
            let result = match (route.target, route.view) {
                (Target::Directory, View::Html) => serve_directory_page(state, &route.key).await,
                (Target::Directory, View::Api) => serve_directory_listing(state, &route.key).await,
                (Target::File, View::Html | View::Api) => {
                    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
                    serve_file(state, &route.key, range).await
                }
            };
            result.unwrap_or_else(Outcome::Failed)
        }
    };

    if let Outcome::Failed(e) = &outcome {
        let path = path.unwrap_or("?");
        if e.is_upstream() {
            error!("Request for /{} failed: {}", path, e);
        } else {
            debug!("Request for /{} rejected: {}", path, e);
        }
    }

    response::build(outcome, state.response)
}

/// Confirm the directory exists, then hand back the browser page
async fn serve_directory_page(state: &AppState, prefix: &str) -> Result<Outcome> {
    if !state.lister().exists(prefix, state.listing.page_limit).await? {
        return Err(Error::NotFound(display_path(prefix)));
    }

    match state.assets.fetch(INDEX_PAGE).await? {
        Some(asset) => Ok(Outcome::DirectoryPage(asset)),
        None => Err(Error::NotFound(INDEX_PAGE.to_string())),
    }
}

async fn serve_directory_listing(state: &AppState, prefix: &str) -> Result<Outcome> {
    let snapshot = state
        .lister()
        .list_directory(prefix, state.listing.page_limit)
        .await?;
    debug!("Listed {} with {} items", snapshot.path, snapshot.items.len());
    Ok(Outcome::DirectoryListing(snapshot))
}

async fn serve_file(state: &AppState, key: &str, range_header: Option<&str>) -> Result<Outcome> {
    if state.deny.is_denied(key) {
        return Err(Error::NotFound(display_path(key)));
    }

    if !state.gate.check(&state.files.rate_bucket).await {
        return Err(Error::RateLimited(state.files.rate_bucket.clone()));
    }

    // Only a parseable header needs the object size up front
    let range = match range_header.and_then(parse_range_header) {
        None => None,
        Some(request) => {
            let meta = state
                .store
                .head(key)
                .await?
                .ok_or_else(|| Error::NotFound(display_path(key)))?;
            match request.resolve(meta.size) {
                RangeResolution::Full => None,
                RangeResolution::Partial(range) => Some(range),
                RangeResolution::Unsatisfiable => {
                    return Err(Error::RangeUnsatisfiable { size: meta.size });
                }
            }
        }
    };

    let object = state
        .store
        .get(key, range.map(|r| r.span()))
        .await?
        .ok_or_else(|| Error::NotFound(display_path(key)))?;

    debug!("Serving {} ({} bytes, range {:?})", key, object.meta.size, range);
    Ok(Outcome::File { object, range })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AllowAll;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Gate admitting a fixed number of checks per bucket before denying
    struct BudgetGate {
        list: usize,
        get: usize,
        list_seen: AtomicUsize,
        get_seen: AtomicUsize,
    }

    impl BudgetGate {
        fn new(list: usize, get: usize) -> Self {
            Self { list, get, list_seen: AtomicUsize::new(0), get_seen: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl AdmissionGate for BudgetGate {
        async fn check(&self, bucket_key: &str) -> bool {
            match bucket_key {
                "list" => self.list_seen.fetch_add(1, Ordering::SeqCst) < self.list,
                "get" => self.get_seen.fetch_add(1, Ordering::SeqCst) < self.get,
                _ => true,
            }
        }
    }

    async fn sample_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.put("readme.txt", "hello world").await;
        let hundred: Vec<u8> = (0..100u8).collect();
        store.put("data/hundred.bin", hundred).await;
        for i in 0..5 {
            store.put(format!("data/logs/{}.log", i), "log").await;
        }
        store.put("private/secret.txt", "nope").await;
        Arc::new(store)
    }

    fn config() -> WolfBrowseConfig {
        let mut config = WolfBrowseConfig::with_root("/unused");
        config.listing.page_limit = 2;
        config.server.api_prefix = Some("api".into());
        config.access.deny_prefixes = vec!["private/".into()];
        config
    }

    async fn app_with_gate(gate: Arc<dyn AdmissionGate>) -> Router {
        let store = sample_store().await;
        GatewayServer::new(&config(), store, gate, Arc::new(BuiltinAssets)).router()
    }

    async fn app() -> Router {
        app_with_gate(Arc::new(AllowAll)).await
    }

    async fn send(app: Router, method: Method, uri: &str, range: Option<&str>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn get(app: Router, uri: &str) -> Response {
        send(app, Method::GET, uri, None).await
    }

    async fn body(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_root_listing_json() {
        let response = get(app().await, "/?api").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let listing = json(response).await;
        assert_eq!(listing["path"], "/");
        assert!(listing["parent"].is_null());
        let keys: Vec<_> = listing["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["data/", "readme.txt"]);
    }

    #[tokio::test]
    async fn test_nested_listing_merges_pages() {
        let listing = json(get(app().await, "/data/logs/?api").await).await;
        assert_eq!(listing["path"], "/data/logs/");
        assert_eq!(listing["parent"], "/data/");
        assert_eq!(listing["items"].as_array().unwrap().len(), 5);
        assert_eq!(listing["items"][0]["name"], "0.log");
    }

    #[tokio::test]
    async fn test_api_prefix_selects_json() {
        let response = get(app().await, "/api/data/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let listing = json(response).await;
        assert_eq!(listing["path"], "/data/");
        assert_eq!(listing["parent"], "/");
    }

    #[tokio::test]
    async fn test_html_view_checks_existence() {
        let response = get(app().await, "/data/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(String::from_utf8(body(response).await).unwrap().contains("<html"));

        assert_eq!(get(app().await, "/missing/").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(app().await, "/missing/?api").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deny_list_hides_keys() {
        let listing = json(get(app().await, "/?api").await).await;
        assert!(!listing.to_string().contains("private"));

        assert_eq!(get(app().await, "/private/?api").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(app().await, "/private/secret.txt").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_file() {
        let response = get(app().await, "/readme.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert!(response.headers().contains_key(header::ETAG));
        assert_eq!(body(response).await, b"hello world");
    }

    #[tokio::test]
    async fn test_range_requests() {
        let response = send(app().await, Method::GET, "/data/hundred.bin", Some("bytes=0-49")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-49/100");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "50");
        assert_eq!(body(response).await, (0..50u8).collect::<Vec<_>>());

        let response = send(app().await, Method::GET, "/data/hundred.bin", Some("bytes=-50")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 50-99/100");

        let response = send(app().await, Method::GET, "/data/hundred.bin", Some("bytes=90-200")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */100");
        assert!(body(response).await.is_empty());

        let response = send(app().await, Method::GET, "/data/hundred.bin", Some("bytes=abc")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert_eq!(get(app().await, "/nope.txt").await.status(), StatusCode::NOT_FOUND);
        let response = send(app().await, Method::GET, "/nope.txt", Some("bytes=0-1")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let response = send(app().await, method.clone(), "/readme.txt", None).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
            assert_eq!(response.headers()[header::ALLOW], "GET");
        }
        let response = send(app().await, Method::POST, "/", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_undecodable_path() {
        let response = send(app().await, Method::POST, "/%FF", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET");

        let response = send(app().await, Method::DELETE, "/docs/%FF/?api", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = get(app().await, "/%FF").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(response).await, b"Not Found");
    }

    #[tokio::test]
    async fn test_rate_limited_listing_never_returns_partial_json() {
        // Two of the three pages for data/logs/ are admitted
        let app = app_with_gate(Arc::new(BudgetGate::new(2, 10))).await;
        let response = get(app, "/data/logs/?api").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body(response).await, b"Too Many Requests");
    }

    #[tokio::test]
    async fn test_rate_limited_file() {
        let app = app_with_gate(Arc::new(BudgetGate::new(10, 0))).await;
        let response = get(app, "/readme.txt").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rate_limited_html_view() {
        let app = app_with_gate(Arc::new(BudgetGate::new(0, 10))).await;
        assert_eq!(get(app, "/").await.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_percent_encoded_path() {
        let store = MemoryStore::new();
        store.put("my docs/hello world.txt", "hi").await;
        let app = GatewayServer::new(&config(), Arc::new(store), Arc::new(AllowAll), Arc::new(BuiltinAssets))
            .router();

        let response = get(app.clone(), "/my%20docs/hello%20world.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, b"hi");

        let listing = json(get(app, "/my%20docs/?api").await).await;
        assert_eq!(listing["items"][0]["name"], "hello world.txt");
    }

    #[tokio::test]
    async fn test_directory_page_from_asset_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>custom</html>").unwrap();
        let store = sample_store().await;
        let app = GatewayServer::new(&config(), store, Arc::new(AllowAll), Arc::new(DirAssets::new(dir.path())))
            .router();

        let response = get(app, "/data/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body(response).await, b"<html>custom</html>");
    }

    #[tokio::test]
    async fn test_from_config_serves_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/a.txt"), "a").unwrap();

        let config = WolfBrowseConfig::with_root(dir.path());
        let app = GatewayServer::from_config(&config).router();

        let listing = json(get(app.clone(), "/docs/?api").await).await;
        assert_eq!(listing["items"][0]["key"], "docs/a.txt");

        let response = get(app, "/docs/a.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }
}
