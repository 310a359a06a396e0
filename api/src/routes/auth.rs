use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use croprec_core::session::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, RequestSession};
use crate::error::AppError;
use crate::extract::Submission;
use crate::state::AppState;

const MAX_USERNAME_LEN: usize = 64;

pub fn login_router() -> Router<AppState> {
    Router::new().route("/v1/auth/login", post(login))
}

pub fn session_router() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/logout", post(logout))
        .route("/v1/auth/session", get(current_session))
}

// ──────────────────────────────────────────────
// POST /v1/auth/login
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// Send as `Authorization: Bearer <token>`. Shown once.
    pub token: String,
    pub token_type: String,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn validate_login(req: &LoginRequest) -> Result<(), AppError> {
    let username = req.username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AppError::Validation {
            message: format!("username must be 1 to {MAX_USERNAME_LEN} characters"),
            field: Some("username".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    if req.password.is_empty() {
        return Err(AppError::Validation {
            message: "password must not be empty".to_string(),
            field: Some("password".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(())
}

/// Sign in with username and password
///
/// Accepts JSON or a form post. Returns an opaque session token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Validation error", body = croprec_core::error::ApiError),
        (status = 401, description = "Invalid credentials", body = croprec_core::error::ApiError),
        (status = 429, description = "Too many attempts", body = croprec_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Submission(req): Submission<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login(&req)?;
    let username = req.username.trim();

    let Some(user) = auth::verify_credentials(&state.db, username, &req.password).await? else {
        tracing::info!(username = %username, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    let issued = auth::issue_session(&state.db, user.user_id, state.session_ttl).await?;
    tracing::info!(
        user_id = %user.user_id,
        session_id = %issued.session_id,
        role = user.role.as_str(),
        "session issued"
    );

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        session_id: issued.session_id,
        user_id: user.user_id,
        username: user.username,
        role: user.role,
        issued_at: issued.issued_at,
        expires_at: issued.expires_at,
    }))
}

// ──────────────────────────────────────────────
// POST /v1/auth/logout
// ──────────────────────────────────────────────

/// Revoke the current session
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No active session", body = croprec_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    session: RequestSession,
) -> Result<StatusCode, AppError> {
    let identity = session.require_identity()?;
    auth::revoke_session(&state.db, identity.session_id).await?;
    tracing::info!(
        user_id = %identity.user_id,
        session_id = %identity.session_id,
        "session revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}

// ──────────────────────────────────────────────
// GET /v1/auth/session
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub issued_at: Option<DateTime<Utc>>,
}

/// Who the bearer token belongs to
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 401, description = "No active session", body = croprec_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn current_session(session: RequestSession) -> Result<Json<SessionResponse>, AppError> {
    let identity = session.require_identity()?;
    Ok(Json(SessionResponse {
        session_id: identity.session_id,
        user_id: identity.user_id,
        username: identity.username,
        role: identity.role,
        issued_at: session.context.issued_at,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::routes::test_support::{
        MemoryAudit, RICE_DOCUMENT, StubEngine, send, session, state, with_session,
    };

    fn test_state() -> AppState {
        state(
            StubEngine::replying(RICE_DOCUMENT),
            Arc::new(MemoryAudit::default()),
        )
    }

    fn app(session: RequestSession) -> axum::Router {
        with_session(
            login_router().merge(session_router()),
            test_state(),
            session,
        )
    }

    #[tokio::test]
    async fn session_endpoint_returns_identity() {
        let current = session(Role::Admin);
        let (status, body) = send(
            app(current.clone()),
            Request::get("/v1/auth/session").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "grower");
        assert_eq!(body["role"], "admin");
        assert_eq!(
            body["session_id"],
            current.session_id.unwrap().to_string()
        );
    }

    #[tokio::test]
    async fn session_endpoint_without_token_is_unauthorized() {
        let (status, body) = send(
            app(RequestSession::anonymous()),
            Request::get("/v1/auth/session").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["next_action_url"], "/v1/auth/login");
    }

    #[tokio::test]
    async fn logout_without_session_is_unauthorized() {
        let (status, _) = send(
            app(RequestSession::anonymous()),
            Request::post("/v1/auth/logout").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_with_blank_username_is_rejected_before_lookup() {
        let (status, body) = send(
            app(RequestSession::anonymous()),
            Request::post("/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"  ","password":"pw"}"#))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "username");
    }

    async fn db_pool_if_available() -> Option<sqlx::PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .ok()
    }

    #[tokio::test]
    async fn login_issues_session_that_resolves_and_revokes() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };

        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .expect("migrations should run");

        let username = format!("grower-{}", Uuid::now_v7());
        let hash = croprec_core::auth::hash_password("correct horse").unwrap();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, role) VALUES ($1, $2, $3, 'user')",
        )
        .bind(Uuid::now_v7())
        .bind(&username)
        .bind(&hash)
        .execute(&pool)
        .await
        .expect("insert user");

        assert!(
            auth::verify_credentials(&pool, &username, "wrong horse")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            auth::verify_credentials(&pool, &format!("{username}-missing"), "correct horse")
                .await
                .unwrap()
                .is_none()
        );
        let user = auth::verify_credentials(&pool, &username, "correct horse")
            .await
            .unwrap()
            .expect("credentials should verify");

        let issued = auth::issue_session(&pool, user.user_id, chrono::Duration::hours(1))
            .await
            .unwrap();
        let resolved = auth::current_session(&issued.token, &pool)
            .await
            .expect("fresh session should resolve");
        assert_eq!(resolved.context.user_id, Some(user.user_id));
        assert_eq!(resolved.session_id, Some(issued.session_id));

        auth::revoke_session(&pool, issued.session_id).await.unwrap();
        assert!(auth::current_session(&issued.token, &pool).await.is_none());
    }
}
