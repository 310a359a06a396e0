use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use croprec_core::auth::{self as core_auth, SESSION_TOKEN_PREFIX};
use croprec_core::session::{Role, SessionContext};
use tower::{Layer, Service, ServiceExt};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Session attached to the current request.
///
/// Two-phase resolution:
/// 1. `InjectSessionLayer` resolves the bearer token once and stores the result in extensions
/// 2. The extractor reads from extensions (no DB hit), or resolves the token itself
///
/// A missing or invalid token yields an anonymous context rather than a rejection:
/// whether that is acceptable is decided by the caller (the prediction gate, or
/// `require_identity`).
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    pub session_id: Option<Uuid>,
    pub context: SessionContext,
}

impl RequestSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The signed-in identity, or a login-pointing 401.
    pub fn require_identity(&self) -> Result<Identity, AppError> {
        match (&self.context, self.session_id) {
            (
                SessionContext {
                    authenticated: true,
                    user_id: Some(user_id),
                    username: Some(username),
                    role: Some(role),
                    ..
                },
                Some(session_id),
            ) => Ok(Identity {
                session_id,
                user_id: *user_id,
                username: username.clone(),
                role: *role,
            }),
            _ => Err(AppError::unauthenticated()),
        }
    }
}

/// Fully populated identity of a signed-in caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

// --- Tower Layer/Service for session injection ---

/// Tower Layer that injects `RequestSession` into request extensions.
/// Never rejects: unauthenticated endpoints (health, login) pass straight through.
#[derive(Clone)]
pub struct InjectSessionLayer {
    pool: sqlx::PgPool,
}

impl InjectSessionLayer {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl<S> Layer<S> for InjectSessionLayer {
    type Service = InjectSessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectSessionService {
            inner,
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InjectSessionService<S> {
    inner: S,
    pool: sqlx::PgPool,
}

impl<S> Service<Request> for InjectSessionService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pool = self.pool.clone();

        // Extract token synchronously (headers are Send-safe, Body is not)
        let token = bearer_token(req.headers());

        Box::pin(async move {
            if let Some(token) = token {
                if let Some(session) = current_session(&token, &pool).await {
                    req.extensions_mut().insert(session);
                }
            }
            Ok(ready.oneshot(req).await.into_response())
        })
    }
}

/// Extract a session token from the `Authorization: Bearer` header.
fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    token
        .starts_with(SESSION_TOKEN_PREFIX)
        .then(|| token.to_owned())
}

// --- Extractor (used by handlers) ---

impl FromRequestParts<AppState> for RequestSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Fast path: the layer already resolved the token
        if let Some(session) = parts.extensions.get::<RequestSession>() {
            return Ok(session.clone());
        }

        // Slow path: no layer ran (router used on its own)
        match bearer_token(&parts.headers) {
            Some(token) => Ok(current_session(&token, &state.db)
                .await
                .unwrap_or_else(RequestSession::anonymous)),
            None => Ok(RequestSession::anonymous()),
        }
    }
}

// --- Session store ---

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    username: String,
    role: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    role: String,
}

/// A user whose password has just been verified.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

/// Look up the live session for a token. Returns None on any failure.
pub async fn current_session(token: &str, pool: &sqlx::PgPool) -> Option<RequestSession> {
    let token_hash = core_auth::hash_token(token);

    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT s.id, s.user_id, s.issued_at, u.username, u.role \
         FROM sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token_hash = $1 \
           AND s.revoked_at IS NULL \
           AND s.expires_at > NOW() \
           AND u.is_active = TRUE",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await;

    match row {
        Ok(Some(row)) => Some(RequestSession {
            session_id: Some(row.id),
            context: SessionContext::for_identity(
                row.user_id,
                row.username,
                Role::parse(&row.role),
                row.issued_at,
            ),
        }),
        Ok(None) => {
            tracing::debug!(
                token_prefix = %core_auth::token_prefix(token),
                "session token not recognised"
            );
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            None
        }
    }
}

/// Check a username/password pair. `Ok(None)` means the credentials are wrong.
pub async fn verify_credentials(
    pool: &sqlx::PgPool,
    username: &str,
    secret: &str,
) -> Result<Option<VerifiedUser>, AppError> {
    let Some(user) = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, password_hash, role FROM users \
         WHERE username = $1 AND is_active = TRUE",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .map_err(AppError::Database)?
    else {
        core_auth::verify_against_dummy_hash(secret);
        return Ok(None);
    };

    let valid =
        core_auth::verify_password(secret, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        return Ok(None);
    }

    Ok(Some(VerifiedUser {
        user_id: user.id,
        username: user.username,
        role: Role::parse(&user.role),
    }))
}

/// A freshly issued session token. The plain token is only ever returned here.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn issue_session(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    ttl: chrono::Duration,
) -> Result<IssuedSession, AppError> {
    let session_id = Uuid::now_v7();
    let (token, token_hash) = core_auth::generate_session_token();
    let issued_at = Utc::now();
    let expires_at = issued_at + ttl;

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, issued_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(issued_at)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(AppError::Database)?;

    Ok(IssuedSession {
        session_id,
        token,
        issued_at,
        expires_at,
    })
}

pub async fn revoke_session(pool: &sqlx::PgPool, session_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
        .bind(session_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn bearer_token_requires_session_prefix() {
        let (token, _) = core_auth::generate_session_token();
        assert_eq!(
            bearer_token(&headers(&format!("Bearer {token}"))),
            Some(token)
        );
        assert_eq!(bearer_token(&headers("Bearer sk_live_abc")), None);
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn anonymous_session_has_no_identity() {
        assert!(RequestSession::anonymous().require_identity().is_err());
    }

    #[test]
    fn populated_session_yields_identity() {
        let user_id = Uuid::now_v7();
        let session_id = Uuid::now_v7();
        let session = RequestSession {
            session_id: Some(session_id),
            context: SessionContext::for_identity(user_id, "ana", Role::Admin, Utc::now()),
        };
        let identity = session.require_identity().unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.session_id, session_id);
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn session_without_user_id_is_not_an_identity() {
        let session = RequestSession {
            session_id: Some(Uuid::now_v7()),
            context: SessionContext {
                authenticated: true,
                ..SessionContext::default()
            },
        };
        assert!(session.require_identity().is_err());
    }
}
