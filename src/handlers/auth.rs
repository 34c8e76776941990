//! Session handlers: connect, disconnect, and the session checks every
//! protected endpoint runs first.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::auth::{generate_token, parse_basic_auth, session_key, verify_password};
use crate::errors::ApiError;
use crate::metadata::store::UserRecord;
use crate::metrics::LOGINS_TOTAL;
use crate::AppState;

/// Body of a successful connect.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

// -- Session resolution -------------------------------------------------------

/// Look up the user id a session token belongs to.
///
/// A missing, empty, unknown or expired token yields `Ok(None)`; only a
/// store failure is an error.
pub async fn resolve_session(
    state: &AppState,
    token: Option<&str>,
) -> Result<Option<String>, ApiError> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    Ok(state.sessions.get(&session_key(token)).await?)
}

/// Resolve a session or fail with `Unauthorized`.
pub async fn require_session(state: &AppState, token: Option<&str>) -> Result<String, ApiError> {
    resolve_session(state, token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// Resolve a session and check its user still exists.
pub async fn require_user(state: &AppState, token: Option<&str>) -> Result<UserRecord, ApiError> {
    let user_id = require_session(state, token).await?;
    match state.metadata.get_user(&user_id).await? {
        Some(user) => Ok(user),
        None => {
            debug!("Session outlived user {}", user_id);
            Err(ApiError::Unauthorized)
        }
    }
}

// -- Endpoints ----------------------------------------------------------------

/// `GET /connect` -- exchange Basic credentials for a session token.
#[utoipa::path(
    get,
    path = "/connect",
    tag = "Auth",
    operation_id = "Connect",
    params(("Authorization" = String, Header, description = "Basic base64(email:password)")),
    responses(
        (status = 200, description = "Session token issued", body = TokenResponse),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn connect(
    state: Arc<AppState>,
    authorization: Option<&str>,
) -> Result<Response, ApiError> {
    let Some(credentials) = authorization.and_then(parse_basic_auth) else {
        counter!(LOGINS_TOTAL, "outcome" => "rejected").increment(1);
        return Err(ApiError::Unauthorized);
    };

    let user = state.metadata.get_user_by_email(&credentials.email).await?;
    let Some(user) = user.filter(|u| verify_password(&credentials.password, &u.password)) else {
        debug!("Credential mismatch for {}", credentials.email);
        counter!(LOGINS_TOTAL, "outcome" => "rejected").increment(1);
        return Err(ApiError::Unauthorized);
    };

    let token = generate_token();
    state
        .sessions
        .set(&session_key(&token), &user.id, state.session_ttl())
        .await?;
    counter!(LOGINS_TOTAL, "outcome" => "accepted").increment(1);
    debug!("Session opened for user {}", user.id);

    Ok((StatusCode::OK, Json(TokenResponse { token })).into_response())
}

/// `GET /disconnect` -- revoke the presented session token.
#[utoipa::path(
    get,
    path = "/disconnect",
    tag = "Auth",
    operation_id = "Disconnect",
    params(("X-Token" = String, Header, description = "Session token")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn disconnect(state: Arc<AppState>, token: Option<&str>) -> Result<Response, ApiError> {
    let user_id = require_session(&state, token).await?;
    if let Some(token) = token {
        state.sessions.del(&session_key(token)).await?;
    }
    debug!("Session closed for user {}", user_id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::config::Config;
    use crate::handlers::test_support::{json_body, memory_state, memory_state_with};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::time::Duration;

    fn basic(email: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{email}:{password}")))
    }

    async fn login(state: &Arc<AppState>, email: &str, password: &str) -> String {
        let header = basic(email, password);
        let response = connect(state.clone(), Some(header.as_str()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_connect_issues_resolvable_token() {
        let state = memory_state();
        let user = state
            .metadata
            .create_user("u@x.com", &hash_password("pw1"))
            .await
            .unwrap()
            .unwrap();

        let token = login(&state, "u@x.com", "pw1").await;
        for _ in 0..3 {
            let resolved = resolve_session(&state, Some(token.as_str())).await.unwrap();
            assert_eq!(resolved.as_deref(), Some(user.id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_credentials() {
        let state = memory_state();
        state
            .metadata
            .create_user("u@x.com", &hash_password("pw1"))
            .await
            .unwrap();

        for header in [
            None,
            Some("Bearer abc".to_string()),
            Some(basic("u@x.com", "wrong")),
            Some(basic("nobody@x.com", "pw1")),
        ] {
            let result = connect(state.clone(), header.as_deref()).await;
            assert!(matches!(result, Err(ApiError::Unauthorized)));
        }
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let state = memory_state();
        state
            .metadata
            .create_user("u@x.com", &hash_password("pw1"))
            .await
            .unwrap();
        let token = login(&state, "u@x.com", "pw1").await;

        let first = disconnect(state.clone(), Some(token.as_str())).await.unwrap();
        assert_eq!(first.status(), StatusCode::NO_CONTENT);
        let second = disconnect(state.clone(), Some(token.as_str())).await;
        assert!(matches!(second, Err(ApiError::Unauthorized)));
        assert!(resolve_session(&state, Some(token.as_str())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_without_token() {
        let state = memory_state();
        assert!(matches!(
            disconnect(state.clone(), None).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            disconnect(state, Some("")).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_resolves_to_absent() {
        let state = memory_state();
        state
            .sessions
            .set(&session_key("t"), "user-1", Duration::ZERO)
            .await
            .unwrap();
        assert!(resolve_session(&state, Some("t")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_applies_configured_ttl() {
        let mut config = Config::default();
        config.auth.session_ttl_seconds = 0;
        let state = memory_state_with(config);
        state
            .metadata
            .create_user("u@x.com", &hash_password("pw1"))
            .await
            .unwrap();

        let token = login(&state, "u@x.com", "pw1").await;
        assert!(resolve_session(&state, Some(token.as_str())).await.unwrap().is_none());
        assert!(matches!(
            require_user(&state, Some(token.as_str())).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_connect_with_unbounded_ttl() {
        let mut config = Config::default();
        config.auth.session_ttl_seconds = u64::MAX;
        let state = memory_state_with(config);
        let user = state
            .metadata
            .create_user("u@x.com", &hash_password("pw1"))
            .await
            .unwrap()
            .unwrap();

        let token = login(&state, "u@x.com", "pw1").await;
        let resolved = resolve_session(&state, Some(token.as_str())).await.unwrap();
        assert_eq!(resolved.as_deref(), Some(user.id.as_str()));
    }

    #[tokio::test]
    async fn test_require_user_rejects_orphaned_session() {
        let state = memory_state();
        state
            .sessions
            .set(&session_key("t"), "deleted-user", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(require_session(&state, Some("t")).await.is_ok());
        assert!(matches!(
            require_user(&state, Some("t")).await,
            Err(ApiError::Unauthorized)
        ));
    }
}
