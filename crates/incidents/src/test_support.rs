use crate::dispatch::{
    CaptureError, CaptureOptions, Dispatcher, EmailSender, ObjectStore, PageRenderer, Screenshots,
};
use crate::{Ids, Lifecycle, MemoryStore, OpenIncident, Reconciler, Timeline};
use bytes::Bytes;
use models::{AccountId, Resource, ResourceKind};
use notifications::NotificationEmail;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ALICE: AccountId = uuid::Uuid::from_u128(0xa11ce);
pub const BOB: AccountId = uuid::Uuid::from_u128(0xb0b);

#[derive(Debug, Clone, Default)]
pub struct TestSender {
    sent: Arc<Mutex<Vec<NotificationEmail>>>,
    failing: Arc<AtomicBool>,
}

impl TestSender {
    pub fn take_sent(&self) -> Vec<NotificationEmail> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl EmailSender for TestSender {
    async fn send(&self, email: NotificationEmail) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mock error sending email '{}'", email.idempotency_key);
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBehavior {
    Image,
    Unavailable,
    Unreachable,
    Hang,
    /// Renders an image after a short delay.
    Slow,
}

#[derive(Debug)]
pub struct TestRenderer {
    calls: AtomicUsize,
    behavior: Mutex<RenderBehavior>,
}

impl TestRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_behavior(&self, behavior: RenderBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

#[async_trait::async_trait]
impl PageRenderer for TestRenderer {
    async fn capture(&self, url: &str, _options: &CaptureOptions) -> Result<Bytes, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();

        match behavior {
            RenderBehavior::Image => Ok(Bytes::from(format!("png of {url}"))),
            RenderBehavior::Unavailable => {
                Err(CaptureError::Unavailable("browser pool is down".to_string()))
            }
            RenderBehavior::Unreachable => {
                Err(CaptureError::Unreachable("502 Bad Gateway".to_string()))
            }
            RenderBehavior::Hang => std::future::pending().await,
            RenderBehavior::Slow => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Bytes::from(format!("png of {url}")))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TestObjectStore {
    paths: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl TestObjectStore {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ObjectStore for TestObjectStore {
    async fn put(&self, path: &str, _body: Bytes, content_type: &str) -> anyhow::Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mock error uploading {path}");
        }
        assert_eq!(content_type, "image/png");
        self.paths.lock().unwrap().push(path.to_string());
        Ok(format!("memory://{path}"))
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub ids: Ids,
    pub lifecycle: Lifecycle,
    pub timeline: Timeline,
    pub reconciler: Reconciler,
    pub screenshots: Screenshots,
    pub dispatcher: Dispatcher,
    pub emails: TestSender,
    pub renderer: Arc<TestRenderer>,
    pub objects: Arc<TestObjectStore>,
}

pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let ids = Ids::new(1);
    let emails = TestSender::default();
    let renderer = Arc::new(TestRenderer {
        calls: AtomicUsize::new(0),
        behavior: Mutex::new(RenderBehavior::Image),
    });
    let objects = Arc::new(TestObjectStore::default());

    let screenshots = Screenshots::new(
        store.clone(),
        renderer.clone(),
        objects.clone(),
        CaptureOptions {
            timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let templates = notifications::Renderer::try_new("https://dash.example.test").unwrap();
    let dispatcher = Dispatcher::new(templates, Arc::new(emails.clone()), screenshots.clone());

    Fixture {
        lifecycle: Lifecycle::new(store.clone(), dispatcher.clone(), ids.clone()),
        timeline: Timeline::new(store.clone(), ids.clone()),
        reconciler: Reconciler::new(store.clone(), crate::staleness::DEFAULT_STALE_RUN_THRESHOLD),
        store,
        ids,
        screenshots,
        dispatcher,
        emails,
        renderer,
        objects,
    }
}

impl Fixture {
    fn resource(&self, kind: ResourceKind, owner_id: AccountId, name: &str) -> Resource {
        let resource = Resource {
            kind,
            id: self.ids.next(),
            owner_id,
            name: name.to_string(),
            url: format!("https://{name}.example.test"),
        };
        self.store.insert_resource(resource.clone());
        resource
    }

    pub fn monitor(&self, owner_id: AccountId, name: &str) -> Resource {
        self.resource(ResourceKind::Monitor, owner_id, name)
    }

    pub fn cron(&self, owner_id: AccountId, name: &str) -> Resource {
        self.resource(ResourceKind::Cron, owner_id, name)
    }

    pub fn open_request(&self, resource: &Resource) -> OpenIncident {
        OpenIncident {
            kind: resource.kind,
            resource_id: resource.id,
            cause: None,
            http_status: None,
            owner_id: None,
        }
    }

    /// Waits for scheduled side-effects to complete.
    pub async fn settle(&self) {
        self.dispatcher.wait_idle().await;
    }
}
