use axum::body::Body;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use incidents::dispatch::{self, CaptureOptions, Dispatcher, Screenshots};
use incidents::{Ids, Lifecycle, MemoryStore, Reconciler, Timeline};
use models::{Id, Resource, ResourceKind, RunKind, RunStatus, TestRun};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &[u8] = b"test-secret";
const ALICE: uuid::Uuid = uuid::Uuid::from_u128(0xa11ce);
const BOB: uuid::Uuid = uuid::Uuid::from_u128(0xb0b);

struct Harness {
    store: Arc<MemoryStore>,
    ids: Ids,
    dispatcher: Dispatcher,
    router: axum::Router,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ids = Ids::new(2);

    let screenshots = Screenshots::new(
        store.clone(),
        Arc::new(dispatch::Renderer::Disabled),
        Arc::new(dispatch::Storage::Disabled),
        CaptureOptions::default(),
    );
    let templates = notifications::Renderer::try_new("https://dash.example.test").unwrap();
    let dispatcher = Dispatcher::new(templates, Arc::new(dispatch::Sender::Disabled), screenshots);

    let app = Arc::new(incident_api::App::new(
        Lifecycle::new(store.clone(), dispatcher.clone(), ids.clone()),
        Timeline::new(store.clone(), ids.clone()),
        Reconciler::new(store.clone(), std::time::Duration::from_secs(15 * 60)),
        SECRET,
    ));
    let router =
        incident_api::build_router(app, &["https://dash.example.test".to_string()]).unwrap();

    Harness {
        store,
        ids,
        dispatcher,
        router,
    }
}

fn token(sub: Option<uuid::Uuid>, role: &str) -> String {
    let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({"sub": sub, "role": role, "exp": exp, "aud": "authenticated"}),
        &jsonwebtoken::EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

fn user(account: uuid::Uuid) -> String {
    token(Some(account), "authenticated")
}

fn service() -> String {
    token(None, incident_api::SERVICE_ROLE)
}

impl Harness {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, body)
    }

    fn monitor(&self, owner_id: uuid::Uuid) -> Resource {
        let resource = Resource {
            kind: ResourceKind::Monitor,
            id: self.ids.next(),
            owner_id,
            name: "api-health".to_string(),
            url: "https://api.example.test/health".to_string(),
        };
        self.store.insert_resource(resource.clone());
        resource
    }

    async fn open(&self, resource: &Resource) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/internal/v1/incidents",
                Some(&service()),
                Some(json!({
                    "kind": resource.kind,
                    "resource_id": resource.id,
                    "cause": "timeout",
                    "http_status": 504,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn requests_require_a_valid_token() {
    let h = harness();

    let (status, body) = h.call(Method::GET, "/healthz", None, None).await;
    assert_eq!((status, body), (StatusCode::OK, json!("ok")));

    let (status, body) = h.call(Method::GET, "/api/v1/incidents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], json!(401));

    let (status, _) = h
        .call(Method::GET, "/api/v1/incidents", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // User tokens can't reach internal routes.
    let (status, body) = h
        .call(
            Method::POST,
            "/internal/v1/incidents",
            Some(&user(ALICE)),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(
        body,
        json!({"status": 403, "error": "internal routes require a service token"})
    );
}

#[tokio::test]
async fn incident_lifecycle_over_http() {
    let h = harness();
    let monitor = h.monitor(ALICE);
    let id = h.open(&monitor).await;
    let alice = user(ALICE);

    let (status, body) = h
        .call(Method::GET, &format!("/api/v1/incidents/{id}"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["cause"], json!("timeout"));
    assert_eq!(body["http_status"], json!(504));
    assert_eq!(body["resolved_at"], Value::Null);
    assert_eq!(body["events"][0]["event_type"], json!("started"));
    assert_eq!(body["events"][0]["content"], json!("timeout"));

    // Opening again while open conflicts.
    let (status, _) = h
        .call(
            Method::POST,
            "/api/v1/incidents",
            Some(&alice),
            Some(json!({"kind": "monitor", "resource_id": monitor.id})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/resolve"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["resolved_at"].is_string());

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/resolve"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body,
        json!({"status": 409, "error": format!("incident {id} is already resolved")})
    );

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/reopen"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["resolved_at"], Value::Null);

    let (status, body) = h
        .call(Method::GET, "/api/v1/incidents?state=open", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], json!(id));

    let (status, _) = h
        .call(
            Method::DELETE,
            &format!("/api/v1/incidents/{id}"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h
        .call(Method::GET, &format!("/api/v1/incidents/{id}"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.dispatcher.wait_idle().await;
}

#[tokio::test]
async fn other_accounts_get_not_found() {
    let h = harness();
    let monitor = h.monitor(ALICE);
    let id = h.open(&monitor).await;
    let bob = user(BOB);

    for (method, uri) in [
        (Method::GET, format!("/api/v1/incidents/{id}")),
        (Method::DELETE, format!("/api/v1/incidents/{id}")),
        (Method::POST, format!("/api/v1/incidents/{id}/resolve")),
        (Method::POST, format!("/api/v1/incidents/{id}/reopen")),
        (Method::GET, format!("/api/v1/incidents/{id}/events")),
    ] {
        let (status, body) = h.call(method, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({"status": 404, "error": "incident not found"}));
    }

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/incidents",
            Some(&bob),
            Some(json!({"kind": "monitor", "resource_id": monitor.id})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"status": 404, "error": "resource not found"}));

    let (status, body) = h
        .call(Method::GET, "/api/v1/incidents", Some(&bob), None)
        .await;
    assert_eq!((status, body), (StatusCode::OK, json!([])));
}

#[tokio::test]
async fn comments_over_http() {
    let h = harness();
    let monitor = h.monitor(ALICE);
    let id = h.open(&monitor).await;
    let alice = user(ALICE);

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/events"),
            Some(&alice),
            Some(json!({"content": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    // Whitespace passes the body's length check, but not the timeline's.
    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/events"),
            Some(&alice),
            Some(json!({"content": "  \n "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, comment) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/events"),
            Some(&alice),
            Some(json!({"content": "looking into it"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{comment}");
    assert_eq!(comment["event_type"], json!("comment"));
    assert_eq!(comment["actor_id"], json!(ALICE));
    let comment_id = comment["id"].as_str().unwrap();

    let (status, body) = h
        .call(
            Method::PATCH,
            &format!("/api/v1/events/{comment_id}"),
            Some(&alice),
            Some(json!({"content": "certificate expired"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["content"], json!("certificate expired"));

    let (status, events) = h
        .call(
            Method::GET,
            &format!("/api/v1/incidents/{id}/events"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<_> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["comment", "started"]);

    // System events are immutable.
    let started_id = events[1]["id"].as_str().unwrap();
    let (status, _) = h
        .call(
            Method::DELETE,
            &format!("/api/v1/events/{started_id}"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = h
        .call(
            Method::DELETE,
            &format!("/api/v1/events/{comment_id}"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn probing_engine_recovers_resources() {
    let h = harness();
    let monitor = h.monitor(ALICE);
    let id = h.open(&monitor).await;

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/internal/v1/resources/monitor/{}/recover", monitor.id),
            Some(&service()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["id"], json!(id));
    assert!(body["resolved_at"].is_string());

    let (status, events) = h
        .call(
            Method::GET,
            &format!("/api/v1/incidents/{id}/events"),
            Some(&user(ALICE)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events[0]["event_type"], json!("auto_resolved"));

    // There's nothing left to recover.
    let (status, _) = h
        .call(
            Method::POST,
            &format!("/internal/v1/resources/monitor/{}/recover", monitor.id),
            Some(&service()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn screenshots_without_a_renderer_are_unavailable() {
    let h = harness();
    let monitor = h.monitor(ALICE);
    let id = h.open(&monitor).await;

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/v1/incidents/{id}/screenshot"),
            Some(&user(ALICE)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    assert_eq!(body["status"], json!(503));
}

#[tokio::test]
async fn invalid_open_requests_are_rejected() {
    let h = harness();
    let monitor = h.monitor(ALICE);

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/incidents",
            Some(&user(ALICE)),
            Some(json!({"kind": "monitor", "resource_id": monitor.id, "http_status": 42})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = h
        .call(
            Method::POST,
            "/api/v1/incidents",
            Some(&user(ALICE)),
            Some(json!({"kind": "load_test", "resource_id": monitor.id})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let cause = "x".repeat(incidents::lifecycle::MAX_CAUSE_LENGTH + 1);
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/incidents",
            Some(&user(ALICE)),
            Some(json!({"kind": "monitor", "resource_id": monitor.id, "cause": cause})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["error"].as_str().unwrap().contains("cause"), "{body}");
}

#[tokio::test]
async fn stale_test_runs_read_as_abandoned() {
    let h = harness();
    let run_id: Id = h.ids.next();
    h.store.insert_test_run(TestRun {
        id: run_id,
        owner_id: ALICE,
        kind: RunKind::Browser,
        status: RunStatus::Running,
        target_url: "https://shop.example.test".to_string(),
        started_at: Utc::now() - chrono::Duration::hours(2),
        finished_at: None,
    });

    let (status, body) = h
        .call(
            Method::GET,
            &format!("/api/v1/test-runs/{run_id}"),
            Some(&user(BOB)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, body) = h
        .call(
            Method::GET,
            &format!("/api/v1/test-runs/{run_id}"),
            Some(&user(ALICE)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], json!("abandoned"));
    assert!(body["finished_at"].is_string());
}
