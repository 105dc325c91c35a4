use axum::http::StatusCode;
use incidents::{Caller, Lifecycle, Reconciler, Timeline};
use std::sync::Arc;

mod error;
mod events;
mod incidents_api;
mod internal;
mod runs;

pub use error::ApiError;

/// Request wraps a JSON-deserialized request type T which
/// also implements the validator::Validate trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct Request<T>(pub T);

/// Role of tokens issued to internal services, such as the probing engine.
pub const SERVICE_ROLE: &str = "service_role";

/// Claims are the JWT claims attached to API access tokens.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Authenticated account. Service tokens may omit it.
    #[serde(default)]
    pub sub: Option<uuid::Uuid>,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: usize,
}

fn default_role() -> String {
    "authenticated".to_string()
}

impl Claims {
    /// Returns the principal on whose behalf a request runs.
    pub fn caller(&self) -> Result<Caller, ApiError> {
        if self.role == SERVICE_ROLE {
            return Ok(Caller::System);
        }
        match self.sub {
            Some(account) => Ok(Caller::User(account)),
            None => Err(ApiError::unauthorized("authorization token has no subject")),
        }
    }

    /// Returns the authenticated account, failing for service tokens.
    pub fn account(&self) -> Result<models::AccountId, ApiError> {
        match self.caller()? {
            Caller::User(account) => Ok(account),
            Caller::System => Err(ApiError::new(
                StatusCode::FORBIDDEN,
                anyhow::anyhow!("this operation requires a user token"),
            )),
        }
    }
}

/// Rejection is an error type of reasons why an API request may fail.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    JsonError(#[from] axum::extract::rejection::JsonRejection),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::ValidationError(_) => StatusCode::BAD_REQUEST,
            Rejection::JsonError(inner) => inner.status(),
        }
    }
}

pub struct App {
    lifecycle: Lifecycle,
    timeline: Timeline,
    reconciler: Reconciler,
    jwt_secret: jsonwebtoken::DecodingKey,
    jwt_validation: jsonwebtoken::Validation,
}

impl App {
    pub fn new(
        lifecycle: Lifecycle,
        timeline: Timeline,
        reconciler: Reconciler,
        jwt_secret: &[u8],
    ) -> Self {
        let jwt_secret = jsonwebtoken::DecodingKey::from_secret(jwt_secret);

        let mut jwt_validation = jsonwebtoken::Validation::default();
        jwt_validation.set_audience(&["authenticated"]);

        Self {
            lifecycle,
            timeline,
            reconciler,
            jwt_secret,
            jwt_validation,
        }
    }
}

/// Build the incident API router.
pub fn build_router(app: Arc<App>, allow_origin: &[String]) -> anyhow::Result<axum::Router<()>> {
    use axum::routing::{get, post};

    let public = axum::Router::new()
        .route(
            "/api/v1/incidents",
            get(incidents_api::list_incidents).post(incidents_api::create_incident),
        )
        .route(
            "/api/v1/incidents/:id",
            get(incidents_api::get_incident).delete(incidents_api::delete_incident),
        )
        .route(
            "/api/v1/incidents/:id/resolve",
            post(incidents_api::resolve_incident),
        )
        .route(
            "/api/v1/incidents/:id/reopen",
            post(incidents_api::reopen_incident),
        )
        .route(
            "/api/v1/incidents/:id/screenshot",
            post(incidents_api::capture_screenshot),
        )
        .route(
            "/api/v1/incidents/:id/events",
            get(events::list_events).post(events::add_comment),
        )
        .route(
            "/api/v1/events/:id",
            axum::routing::patch(events::edit_comment).delete(events::delete_comment),
        )
        .route("/api/v1/test-runs/:id", get(runs::get_test_run));

    let internal = axum::Router::new()
        .route("/internal/v1/incidents", post(internal::open_incident))
        .route(
            "/internal/v1/incidents/:id/resolve",
            post(internal::resolve_incident),
        )
        .route(
            "/internal/v1/resources/:kind/:resource_id/recover",
            post(internal::recover_resource),
        )
        .route_layer(axum::middleware::from_fn(require_service_role));

    let cors = cors_layer(allow_origin)?;

    let router = public
        .merge(internal)
        .route_layer(axum::middleware::from_fn_with_state(app.clone(), authorize))
        .route("/healthz", get(|| async { "ok" }))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app);

    Ok(router)
}

fn cors_layer(allow_origin: &[String]) -> anyhow::Result<tower_http::cors::CorsLayer> {
    use axum::http::{header, HeaderValue, Method};

    let origins = allow_origin
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tower_http::cors::CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

#[axum::async_trait]
impl<T, S> axum::extract::FromRequest<S> for Request<T>
where
    T: serde::de::DeserializeOwned + validator::Validate,
    S: Send + Sync,
    axum::extract::Json<T>:
        axum::extract::FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
{
    type Rejection = Rejection;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Json(value) = axum::extract::Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Request(value))
    }
}

impl axum::response::IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        ApiError::from(self).into_response()
    }
}

// Middleware which validates JWT tokens before proceeding, and attaches verified Claims.
async fn authorize(
    axum::extract::State(app): axum::extract::State<Arc<App>>,
    bearer: Option<
        axum_extra::TypedHeader<
            axum_extra::headers::Authorization<axum_extra::headers::authorization::Bearer>,
        >,
    >,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    let Some(axum_extra::TypedHeader(bearer)) = bearer else {
        return ApiError::unauthorized("missing bearer authorization token").into_response();
    };
    let token = match jsonwebtoken::decode::<Claims>(
        bearer.token(),
        &app.jwt_secret,
        &app.jwt_validation,
    ) {
        Ok(token) => token,
        Err(err) => {
            return ApiError::unauthorized(format!("failed to parse authorization token: {err}"))
                .into_response();
        }
    };

    req.extensions_mut().insert(token.claims);
    next.run(req).await
}

// Middleware which restricts internal routes to service tokens.
async fn require_service_role(
    axum::Extension(claims): axum::Extension<Claims>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    if claims.role != SERVICE_ROLE {
        return ApiError::new(
            StatusCode::FORBIDDEN,
            anyhow::anyhow!("internal routes require a service token"),
        )
        .into_response();
    }
    next.run(req).await
}
