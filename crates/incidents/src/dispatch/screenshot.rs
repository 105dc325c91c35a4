use crate::{Error, Store, StoreError};
use anyhow::Context;
use bytes::Bytes;
use models::{Id, ResourceKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default upper bound on a single render.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub timeout: Duration,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub full_page: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            viewport_width: 1280,
            viewport_height: 800,
            full_page: true,
        }
    }
}

/// CaptureError is returned by `PageRenderer` implementations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The render capability itself isn't available.
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
    /// The renderer is up, but couldn't load the target page.
    #[error("target unreachable: {0}")]
    Unreachable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// PageRenderer captures a rendered image of a web page.
#[async_trait::async_trait]
pub trait PageRenderer: std::fmt::Debug + Send + Sync + 'static {
    async fn capture(&self, url: &str, options: &CaptureOptions) -> Result<Bytes, CaptureError>;
}

/// ObjectStore persists captured images and returns a durable reference.
#[async_trait::async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync + 'static {
    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> anyhow::Result<String>;
}

/// Renders pages using a headless browser service reachable over HTTP.
#[derive(Debug)]
pub struct HttpRenderer {
    endpoint: url::Url,
    client: reqwest::Client,
}

#[derive(Debug)]
pub enum Renderer {
    /// No renderer is configured. Every capture is Unavailable.
    Disabled,
    Http(HttpRenderer),
}

impl Renderer {
    pub fn http(endpoint: url::Url, client: reqwest::Client) -> Renderer {
        Renderer::Http(HttpRenderer { endpoint, client })
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    full_page: bool,
    viewport: Viewport,
    timeout_ms: u64,
}

#[derive(serde::Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

impl HttpRenderer {
    async fn capture(&self, url: &str, options: &CaptureOptions) -> Result<Bytes, CaptureError> {
        let request = RenderRequest {
            url,
            full_page: options.full_page,
            viewport: Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
            },
            timeout_ms: options.timeout.as_millis() as u64,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    CaptureError::Unavailable(err.to_string())
                } else {
                    CaptureError::Other(anyhow::Error::from(err).context("calling renderer"))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            || status == reqwest::StatusCode::NOT_IMPLEMENTED
        {
            return Err(CaptureError::Unavailable(format!("renderer returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptureError::Unreachable(format!("{status}: {body}")));
        }

        response
            .bytes()
            .await
            .context("reading rendered image")
            .map_err(CaptureError::Other)
    }
}

#[async_trait::async_trait]
impl PageRenderer for Renderer {
    async fn capture(&self, url: &str, options: &CaptureOptions) -> Result<Bytes, CaptureError> {
        match self {
            Renderer::Disabled => Err(CaptureError::Unavailable(
                "no renderer is configured".to_string(),
            )),
            Renderer::Http(http) => http.capture(url, options).await,
        }
    }
}

/// Stores objects by PUT to a base URL, and references them by a public URL.
#[derive(Debug)]
pub struct HttpObjectStore {
    upload_base: url::Url,
    public_base: url::Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(
        upload_base: url::Url,
        public_base: Option<url::Url>,
        token: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        let upload_base = as_directory(upload_base);
        let public_base = public_base.map(as_directory).unwrap_or_else(|| upload_base.clone());
        Self {
            upload_base,
            public_base,
            token,
            client,
        }
    }
}

// Object paths are joined onto base URLs, which must end in a slash to
// keep their final path segment.
fn as_directory(mut url: url::Url) -> url::Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> anyhow::Result<String> {
        let target = self
            .upload_base
            .join(path)
            .with_context(|| format!("joining object path {path}"))?;

        let mut request = self
            .client
            .put(target)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .context("uploading object")?
            .error_for_status()
            .context("object store rejected the upload")?;

        let reference = self.public_base.join(path)?;
        Ok(reference.to_string())
    }
}

#[derive(Debug)]
pub enum Storage {
    /// No object store is configured. Every upload fails.
    Disabled,
    Http(HttpObjectStore),
}

#[async_trait::async_trait]
impl ObjectStore for Storage {
    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> anyhow::Result<String> {
        match self {
            Storage::Disabled => anyhow::bail!("no object store is configured"),
            Storage::Http(http) => http.put(path, body, content_type).await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("incident not found")]
    NotFound,
    #[error("screenshots are captured only for monitor incidents")]
    NotMonitor,
    #[error("screenshot capability is unavailable: {0}")]
    Unavailable(String),
    #[error("screenshot target is unreachable: {0}")]
    Unreachable(String),
    #[error("screenshot timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to upload screenshot")]
    Upload(#[source] anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScreenshotError {
    /// Coarse classification of the failure, for logs.
    pub fn failure(&self) -> &'static str {
        match self {
            ScreenshotError::NotFound | ScreenshotError::NotMonitor => "not_applicable",
            ScreenshotError::Unavailable(_) => "capability_unavailable",
            ScreenshotError::Unreachable(_) => "target_unreachable",
            ScreenshotError::Timeout(_) => "timeout",
            ScreenshotError::Upload(_) => "upload_failed",
            ScreenshotError::Other(_) => "internal",
        }
    }
}

impl From<StoreError> for ScreenshotError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Other(err) => ScreenshotError::Other(err),
            StoreError::UniqueViolation(msg) => ScreenshotError::Other(anyhow::anyhow!(msg)),
        }
    }
}

impl From<ScreenshotError> for Error {
    fn from(err: ScreenshotError) -> Self {
        match err {
            ScreenshotError::NotFound => Error::NotFound("incident"),
            ScreenshotError::NotMonitor => Error::InvalidState(err.to_string()),
            ScreenshotError::Unavailable(_)
            | ScreenshotError::Unreachable(_)
            | ScreenshotError::Timeout(_) => Error::Unavailable(err.to_string()),
            ScreenshotError::Upload(_) => Error::Internal(anyhow::Error::from(err)),
            ScreenshotError::Other(err) => Error::Internal(err),
        }
    }
}

/// Screenshots captures and attaches a rendering of the failing resource
/// to an incident, at most once per incident.
#[derive(Debug, Clone)]
pub struct Screenshots {
    store: Arc<dyn Store>,
    renderer: Arc<dyn PageRenderer>,
    objects: Arc<dyn ObjectStore>,
    options: CaptureOptions,
    // Captures in progress, so that each incident is rendered by one caller at a time.
    inflight: Arc<Mutex<HashMap<Id, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Screenshots {
    pub fn new(
        store: Arc<dyn Store>,
        renderer: Arc<dyn PageRenderer>,
        objects: Arc<dyn ObjectStore>,
        options: CaptureOptions,
    ) -> Self {
        Self {
            store,
            renderer,
            objects,
            options,
            inflight: Default::default(),
        }
    }

    /// Returns the object path of the incident's screenshot.
    pub fn object_path(incident_id: Id) -> String {
        format!("incidents/{incident_id}.png")
    }

    /// Captures the incident's screenshot, or returns the existing reference
    /// if one was already attached.
    #[tracing::instrument(skip(self))]
    pub async fn capture(&self, incident_id: Id) -> Result<String, ScreenshotError> {
        let lock = self
            .inflight
            .lock()
            .unwrap()
            .entry(incident_id)
            .or_default()
            .clone();

        let guard = lock.lock().await;
        let result = self.capture_exclusive(incident_id).await;
        drop(guard);

        let mut inflight = self.inflight.lock().unwrap();
        // Held by the map and by us alone: no other caller is waiting.
        if Arc::strong_count(&lock) == 2 {
            inflight.remove(&incident_id);
        }
        result
    }

    async fn capture_exclusive(&self, incident_id: Id) -> Result<String, ScreenshotError> {
        let Some(incident) = self.store.fetch_incident(incident_id).await? else {
            return Err(ScreenshotError::NotFound);
        };
        if let Some(reference) = incident.screenshot_ref {
            tracing::debug!(%reference, "incident already has a screenshot");
            return Ok(reference);
        }
        if incident.kind != ResourceKind::Monitor {
            return Err(ScreenshotError::NotMonitor);
        }
        let Some(monitor) = self
            .store
            .fetch_resource(ResourceKind::Monitor, incident.resource_id)
            .await?
        else {
            return Err(ScreenshotError::NotFound);
        };

        let image = match tokio::time::timeout(
            self.options.timeout,
            self.renderer.capture(&monitor.url, &self.options),
        )
        .await
        {
            Err(_elapsed) => return Err(ScreenshotError::Timeout(self.options.timeout)),
            Ok(Err(CaptureError::Unavailable(msg))) => {
                return Err(ScreenshotError::Unavailable(msg))
            }
            Ok(Err(CaptureError::Unreachable(msg))) => {
                return Err(ScreenshotError::Unreachable(msg))
            }
            Ok(Err(CaptureError::Other(err))) => return Err(ScreenshotError::Other(err)),
            Ok(Ok(image)) => image,
        };

        let path = Self::object_path(incident_id);
        let reference = self
            .objects
            .put(&path, image, "image/png")
            .await
            .map_err(ScreenshotError::Upload)?;

        if self.store.set_screenshot_ref(incident_id, &reference).await? {
            tracing::info!(%reference, "attached incident screenshot");
            return Ok(reference);
        }

        // A concurrent capture attached first. Prefer its reference.
        match self.store.fetch_incident(incident_id).await? {
            Some(incident) => Ok(incident.screenshot_ref.unwrap_or(reference)),
            None => Err(ScreenshotError::NotFound),
        }
    }
}
