//! # Trellis Net
//!
//! Resource loading for the Trellis DOM engine.
//!
//! ## Design Goals
//!
//! 1. **Cancellable downloads**: every fetch is an in-flight handle that can be
//!    cancelled cooperatively and awaited for its result
//! 2. **Loader seam**: the tree only sees the [`Loader`] trait, so hosts can
//!    plug in HTTP, an in-memory table, or nothing at all
//! 3. **Loader policy**: resource loading can be switched off and requests
//!    can be filtered before they leave the engine

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use url::Url;

pub mod download;

pub use download::{DownloadCompleter, DownloadHandle, DownloadId, DownloadState, PendingDownload};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request blocked")]
    Blocked,

    #[error("Resource loading is disabled")]
    Disabled,

    #[error("Navigation is disabled")]
    NavigationDisabled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
    pub referrer: Option<Url>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            timeout: None,
            referrer: None,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set referrer.
    pub fn referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }
}

/// A fully received response.
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: RequestId,
    /// Final URL after redirects; relative references in the body resolve
    /// against it.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: Option<Mime>,
    body: Bytes,
}

impl Response {
    /// Build a successful response without a transport, e.g. from a cache.
    pub fn new(request_id: RequestId, url: Url, content_type: Option<Mime>, body: Bytes) -> Self {
        Self {
            request_id,
            url,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content_type,
            body,
        }
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// The body bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Declared content type, or one guessed from the URL path.
    pub fn content_type_or_guess(&self) -> Option<Mime> {
        self.content_type
            .clone()
            .or_else(|| mime_guess::from_path(self.url.path()).first())
    }
}

/// Host veto consulted before a request leaves the engine.
pub type RequestFilter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// A source of cancellable downloads.
pub trait Loader {
    /// Start fetching `request`. The returned download is already in flight.
    fn download(&self, request: Request) -> PendingDownload;
}

/// Loader policy and HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Default timeout.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Enable cookies.
    pub cookies_enabled: bool,
    /// Whether documents may be navigated to.
    pub navigation_enabled: bool,
    /// Whether sub-resources (style sheets, media) may be fetched.
    pub resource_loading_enabled: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("Trellis/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
            cookies_enabled: true,
            navigation_enabled: true,
            resource_loading_enabled: false,
        }
    }
}

impl LoaderSettings {
    /// Enable or disable sub-resource loading.
    pub fn with_resource_loading(mut self, enabled: bool) -> Self {
        self.resource_loading_enabled = enabled;
        self
    }

    /// Enable or disable document navigation.
    pub fn with_navigation(mut self, enabled: bool) -> Self {
        self.navigation_enabled = enabled;
        self
    }
}

/// HTTP loader backed by reqwest.
pub struct ResourceLoader {
    client: Client,
    settings: LoaderSettings,
    filter: Option<RequestFilter>,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(settings: LoaderSettings) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .cookie_store(settings.cookies_enabled)
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(
            resources = settings.resource_loading_enabled,
            "ResourceLoader initialized"
        );

        Ok(Self {
            client,
            settings,
            filter: None,
        })
    }

    /// Refuse requests for which `filter` returns `false`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Loader settings.
    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Check policy for a sub-resource request.
    fn admit(&self, request: &Request) -> Result<(), NetError> {
        if !self.settings.resource_loading_enabled {
            debug!(url = %request.url, "Resource loading disabled");
            return Err(NetError::Disabled);
        }
        self.check_filter(request)
    }

    fn check_filter(&self, request: &Request) -> Result<(), NetError> {
        if self.filter.as_ref().is_some_and(|allows| !allows(request)) {
            warn!(url = %request.url, "Request blocked by filter");
            return Err(NetError::Blocked);
        }
        Ok(())
    }

    /// Fetch a sub-resource to completion.
    pub async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.admit(&request)?;
        fetch_with(
            self.client.clone(),
            self.settings.accept_language.clone(),
            request,
        )
        .await
    }

    /// Fetch a document to navigate to. Governed by
    /// `navigation_enabled` rather than the sub-resource switch.
    pub async fn navigate(&self, request: Request) -> Result<Response, NetError> {
        if !self.settings.navigation_enabled {
            debug!(url = %request.url, "Navigation disabled");
            return Err(NetError::NavigationDisabled);
        }
        self.check_filter(&request)?;
        info!(url = %request.url, "Navigating");
        fetch_with(
            self.client.clone(),
            self.settings.accept_language.clone(),
            request,
        )
        .await
    }
}

impl Loader for ResourceLoader {
    fn download(&self, request: Request) -> PendingDownload {
        if let Err(e) = self.admit(&request) {
            return PendingDownload::ready(&request, Err(e));
        }

        let (pending, completer) = PendingDownload::new(&request);
        let handle = pending.handle();
        let client = self.client.clone();
        let accept_language = self.settings.accept_language.clone();

        debug!(id = handle.id().raw(), url = %request.url, "Starting download");

        tokio::spawn(async move {
            let result = tokio::select! {
                result = fetch_with(client, accept_language, request) => result,
                _ = handle.cancelled() => Err(NetError::Cancelled),
            };
            completer.complete(result);
        });

        pending
    }
}

async fn fetch_with(
    client: Client,
    accept_language: String,
    request: Request,
) -> Result<Response, NetError> {
    debug!(url = %request.url, method = %request.method, "Fetching resource");

    let mut req_builder = client.request(request.method.clone(), request.url.clone());
    for (name, value) in request.headers.iter() {
        req_builder = req_builder.header(name, value);
    }
    req_builder = req_builder.header("Accept-Language", accept_language);
    if let Some(ref referrer) = request.referrer {
        req_builder = req_builder.header("Referer", referrer.as_str());
    }
    if let Some(timeout) = request.timeout {
        req_builder = req_builder.timeout(timeout);
    }

    let response = req_builder.send().await?;

    let status = response.status();
    let headers = response.headers().clone();
    let url = response.url().clone();
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Mime>().ok());

    let body = response.bytes().await?;

    trace!(
        url = %url,
        status = %status,
        content_type = ?content_type,
        body_len = body.len(),
        "Response received"
    );

    Ok(Response {
        request_id: request.id,
        url,
        status,
        headers,
        content_type,
        body,
    })
}

/// Loader answering from an in-memory table of URL to body.
///
/// Unknown URLs fail with `RequestFailed`. Useful for offline processing of
/// pre-fetched pages and for tests.
#[derive(Debug, Default)]
pub struct StaticLoader {
    entries: HashMap<String, (Option<Mime>, Bytes)>,
    requested: std::sync::Mutex<Vec<Url>>,
}

impl StaticLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn insert(&mut self, url: &str, content_type: Option<Mime>, body: impl Into<Bytes>) {
        self.entries
            .insert(url.to_string(), (content_type, body.into()));
    }

    /// Builder form of [`StaticLoader::insert`].
    pub fn with(mut self, url: &str, content_type: Option<Mime>, body: impl Into<Bytes>) -> Self {
        self.insert(url, content_type, body);
        self
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<Url> {
        self.requested
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

impl Loader for StaticLoader {
    fn download(&self, request: Request) -> PendingDownload {
        if let Ok(mut urls) = self.requested.lock() {
            urls.push(request.url.clone());
        }
        let result = match self.entries.get(request.url.as_str()) {
            Some((content_type, body)) => Ok(Response::new(
                request.id,
                request.url.clone(),
                content_type.clone(),
                body.clone(),
            )),
            None => Err(NetError::RequestFailed(format!("no entry for {}", request.url))),
        };
        PendingDownload::ready(&request, result)
    }
}

impl<L: Loader + ?Sized> Loader for Arc<L> {
    fn download(&self, request: Request) -> PendingDownload {
        (**self).download(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com").unwrap();
        let request = Request::get(url.clone())
            .header(
                HeaderName::from_static("accept"),
                HeaderValue::from_static("text/css"),
            )
            .timeout(Duration::from_secs(10));

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert!(request.headers.contains_key("accept"));
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_loader_settings_default() {
        let settings = LoaderSettings::default();
        assert!(settings.navigation_enabled);
        assert!(!settings.resource_loading_enabled);
        assert!(settings.user_agent.starts_with("Trellis/"));
    }

    #[test]
    fn test_loader_settings_serde() {
        let settings = LoaderSettings::default().with_resource_loading(true);
        let json = serde_json::to_string(&settings).unwrap();
        let back: LoaderSettings = serde_json::from_str(&json).unwrap();
        assert!(back.resource_loading_enabled);
        assert_eq!(back.max_redirects, 10);
    }

    #[test]
    fn test_response_guesses_content_type() {
        let url = Url::parse("https://example.com/clip.mp3").unwrap();
        let response = Response::new(RequestId::new(), url, None, Bytes::from_static(b"ID3"));
        assert_eq!(
            response.content_type_or_guess().map(|m| m.type_().to_string()),
            Some("audio".to_string())
        );
        assert!(response.ok());
        assert_eq!(response.text(), "ID3");
    }

    #[tokio::test]
    async fn test_static_loader_serves_entries() {
        let loader = StaticLoader::new().with(
            "https://example.com/a.css",
            Some(mime::TEXT_CSS),
            "p { color: red }",
        );

        let url = Url::parse("https://example.com/a.css").unwrap();
        let download = loader.download(Request::get(url.clone()));
        assert!(download.handle().is_completed());
        let response = download.result().await.unwrap();
        assert_eq!(response.text(), "p { color: red }");
        assert_eq!(loader.requested(), vec![url]);

        let missing = Url::parse("https://example.com/b.css").unwrap();
        let result = loader.download(Request::get(missing)).result().await;
        assert!(matches!(result, Err(NetError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn test_disabled_loader_refuses() {
        let loader = ResourceLoader::new(LoaderSettings::default()).unwrap();
        let url = Url::parse("https://example.com/").unwrap();
        let result = loader.download(Request::get(url)).result().await;
        assert!(matches!(result, Err(NetError::Disabled)));
    }
}
