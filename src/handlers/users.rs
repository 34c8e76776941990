//! User handlers: registration and identity.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::hash_password;
use crate::errors::ApiError;
use crate::handlers::auth::require_user;
use crate::metadata::store::UserRecord;
use crate::metrics::USERS_REGISTERED_TOTAL;
use crate::AppState;

/// Body of `POST /users`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NewUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Public view of a user. The password digest is never included.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// `POST /users` -- register a new user.
#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    operation_id = "CreateUser",
    request_body = NewUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing email, missing password, or already exists")
    )
)]
pub async fn create_user(
    state: Arc<AppState>,
    request: NewUserRequest,
) -> Result<Response, ApiError> {
    let Some(email) = request.email.filter(|e| !e.is_empty()) else {
        return Err(ApiError::bad_request("Missing email"));
    };
    let Some(password) = request.password.filter(|p| !p.is_empty()) else {
        return Err(ApiError::bad_request("Missing password"));
    };

    if state.metadata.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("Already exists"));
    }

    // The store's unique index settles a race between two registrations.
    let user = state
        .metadata
        .create_user(&email, &hash_password(&password))
        .await?
        .ok_or_else(|| ApiError::bad_request("Already exists"))?;

    counter!(USERS_REGISTERED_TOTAL).increment(1);
    info!("Registered user {}", user.id);

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))).into_response())
}

/// `GET /users/me` -- identity of the session's user.
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    operation_id = "GetMe",
    params(("X-Token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing, unknown or orphaned session")
    )
)]
pub async fn get_me(state: Arc<AppState>, token: Option<&str>) -> Result<Response, ApiError> {
    let user = require_user(&state, token).await?;
    Ok((StatusCode::OK, Json(UserResponse::from(user))).into_response())
}
