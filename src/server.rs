//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Route functions here only extract HTTP
//! inputs (headers, path, query, JSON body) and hand them to
//! [`crate::handlers`].

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::TOKEN_HEADER;
use crate::errors::{generate_request_id, ApiError};
use crate::handlers::files::{ListQuery, UploadRequest};
use crate::handlers::users::NewUserRequest;
use crate::handlers::{app as app_handlers, auth, files, users};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Response header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Value of the `server` response header.
pub const SERVER_NAME: &str = "files-manager";

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the files-manager API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "files-manager API",
        version = "0.1.0",
        description = "Token-authenticated file and folder storage"
    ),
    paths(
        app_handlers::get_status,
        app_handlers::get_stats,
        app_handlers::health_check,
        auth::connect,
        auth::disconnect,
        users::create_user,
        users::get_me,
        files::post_upload,
        files::get_show,
        files::get_index,
        files::get_file_data,
    ),
    components(schemas(
        app_handlers::StatusResponse,
        app_handlers::StatsResponse,
        auth::TokenResponse,
        users::NewUserRequest,
        users::UserResponse,
        files::UploadRequest,
        files::FileResponse,
    )),
    tags(
        (name = "App", description = "Service status"),
        (name = "Auth", description = "Session tokens"),
        (name = "Users", description = "User registration"),
        (name = "Files", description = "Folders, files and images"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// `/metrics` and the docs routes are mounted only when enabled in
/// `observability`.
pub fn app(state: Arc<AppState>) -> Router {
    let observability = state.config.observability.clone();
    let body_limit = state.config.server.max_body_size;

    let mut router = Router::new()
        .route("/status", get(handle_status))
        .route("/stats", get(handle_stats))
        .route("/health", get(app_handlers::health_check))
        .route("/connect", get(handle_connect))
        .route("/disconnect", get(handle_disconnect))
        .route("/users", post(handle_create_user))
        .route("/users/me", get(handle_get_me))
        .route("/files", post(handle_upload).get(handle_index))
        .route("/files/:id", get(handle_show))
        .route("/files/:id/data", get(handle_file_data));

    if observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }
    if observability.api_docs {
        router = router.merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));
    }

    let mut router = router
        .with_state(state)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http());

    // Outermost so it sees the full request lifecycle.
    if observability.metrics {
        router = router.layer(middleware::from_fn(metrics_middleware));
    }

    router.layer(DefaultBodyLimit::max(body_limit))
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id` (unless already set), `date` and `server` to every
/// response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static(SERVER_NAME));

    response
}

// -- Extraction helpers ------------------------------------------------------

/// Value of a header as a string, ignoring non-visible-ASCII values.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Unwrap a JSON body, turning extractor rejections into a 400.
///
/// A body sent without a JSON content type is read as `{}`, so the
/// handler reports the first missing field.
fn json_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => {
            debug!("Rejected request body: {}", rejection.body_text());
            Err(ApiError::bad_request(rejection.body_text()))
        }
    }
}

// -- Routes ------------------------------------------------------------------

async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    app_handlers::get_status(state).await
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    app_handlers::get_stats(state).await
}

async fn handle_connect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::connect(state, header_str(&headers, "authorization")).await
}

async fn handle_disconnect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::disconnect(state, header_str(&headers, TOKEN_HEADER)).await
}

async fn handle_create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    users::create_user(state, json_body(payload)?).await
}

async fn handle_get_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    users::get_me(state, header_str(&headers, TOKEN_HEADER)).await
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let token = header_str(&headers, TOKEN_HEADER);
    let request = json_body(payload);
    // Authenticate before judging the body.
    if request.is_err() {
        auth::require_session(&state, token).await?;
    }
    files::post_upload(state, token, request?).await
}

async fn handle_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    files::get_show(state, header_str(&headers, TOKEN_HEADER), &id).await
}

async fn handle_index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let token = header_str(&headers, TOKEN_HEADER);
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            // Authenticate before judging the query string.
            auth::require_user(&state, token).await?;
            debug!("Rejected query string: {}", rejection.body_text());
            return Err(ApiError::bad_request(rejection.body_text()));
        }
    };
    files::get_index(state, token, query).await
}

async fn handle_file_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    files::get_file_data(state, header_str(&headers, TOKEN_HEADER), &id).await
}
