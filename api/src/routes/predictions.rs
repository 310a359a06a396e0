use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use croprec_core::gate::{self, GateDecision};
use croprec_core::pipeline::{PipelineError, PredictionReport};
use croprec_core::prediction::{PredictionForm, PredictionInput, PreviewParameters};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::RequestSession;
use crate::error::AppError;
use crate::extract::{AppQuery, Submission};
use crate::state::AppState;

const HISTORY_DEFAULT_LIMIT: i64 = 20;
const HISTORY_MAX_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/predictions", post(submit_prediction).get(list_predictions))
        .route("/v1/predictions/preview", get(preview_prediction))
}

/// The gate runs before the request body is looked at: a caller without a
/// session gets the login hint even when the body is also broken.
fn gate_rejection(session: &RequestSession, preview: bool) -> Option<PipelineError> {
    match gate::authorize(&session.context, preview) {
        GateDecision::Unauthenticated => Some(PipelineError::Unauthenticated),
        GateDecision::PreviewDenied => Some(PipelineError::PreviewDenied),
        GateDecision::PreviewAuthorized(_) | GateDecision::Authenticated(_) => None,
    }
}

// ──────────────────────────────────────────────
// POST /v1/predictions
// ──────────────────────────────────────────────

/// Request a crop recommendation for the caller's own conditions
///
/// Accepts `application/json` or `application/x-www-form-urlencoded`.
/// An unknown `npk_option` falls back to the default composition and adds
/// an `invalid_composition` warning.
#[utoipa::path(
    post,
    path = "/v1/predictions",
    request_body = PredictionForm,
    responses(
        (status = 200, description = "Prediction produced", body = PredictionReport),
        (status = 400, description = "Invalid input", body = croprec_core::error::ApiError),
        (status = 401, description = "Sign in required", body = croprec_core::error::ApiError),
        (status = 502, description = "Engine failed or returned unusable output", body = croprec_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "predictions"
)]
pub async fn submit_prediction(
    State(state): State<AppState>,
    session: RequestSession,
    submission: Result<Submission<PredictionForm>, AppError>,
) -> Result<Json<PredictionReport>, AppError> {
    if let Some(rejection) = gate_rejection(&session, false) {
        return Err(rejection.into());
    }
    let Submission(form) = submission?;

    let report = state
        .pipeline
        .run(&session.context, PredictionInput::Interactive(form))
        .await?;
    Ok(Json(report))
}

// ──────────────────────────────────────────────
// GET /v1/predictions/preview
// ──────────────────────────────────────────────

/// Run the engine on raw query values without storing anything (admin only)
///
/// Requires `admin_view=true`. Absent nutrient values come from the resolved
/// composition, absent pH defaults to 7.
#[utoipa::path(
    get,
    path = "/v1/predictions/preview",
    params(PreviewParameters),
    responses(
        (status = 200, description = "Preview produced, not persisted", body = PredictionReport),
        (status = 400, description = "Invalid input or admin_view missing", body = croprec_core::error::ApiError),
        (status = 401, description = "Sign in required", body = croprec_core::error::ApiError),
        (status = 403, description = "Caller is not an admin", body = croprec_core::error::ApiError),
        (status = 502, description = "Engine failed or returned unusable output", body = croprec_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "predictions"
)]
pub async fn preview_prediction(
    State(state): State<AppState>,
    session: RequestSession,
    query: Result<AppQuery<PreviewParameters>, AppError>,
) -> Result<Json<PredictionReport>, AppError> {
    let flagged = query
        .as_ref()
        .map(|AppQuery(params)| gate::preview_flag(params.admin_view.as_deref()))
        .unwrap_or(true);
    if let Some(rejection) = gate_rejection(&session, flagged) {
        return Err(rejection.into());
    }
    let AppQuery(params) = query?;

    if !flagged {
        return Err(AppError::Validation {
            message: "preview requests must set admin_view=true".to_string(),
            field: Some("admin_view".to_string()),
            received: params.admin_view.clone().map(serde_json::Value::String),
            docs_hint: Some(
                "Use POST /v1/predictions for a regular prediction.".to_string(),
            ),
        });
    }

    let report = state
        .pipeline
        .run(&session.context, PredictionInput::Preview(params))
        .await?;
    Ok(Json(report))
}

// ──────────────────────────────────────────────
// GET /v1/predictions
// ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Number of records, 1 to 100 (default 20)
    #[serde(default)]
    pub limit: Option<i64>,
}

impl HistoryQuery {
    fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(HISTORY_DEFAULT_LIMIT)
            .clamp(1, HISTORY_MAX_LIMIT)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema, sqlx::FromRow)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub composition_key: String,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub climate: String,
    pub humidity: f64,
    pub ph: f64,
    pub rainfall: f64,
    pub soil_type: String,
    pub topography: String,
    pub water_availability: String,
    /// The engine document as it was stored
    #[schema(value_type = Object)]
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PredictionHistoryResponse {
    pub predictions: Vec<PredictionRecord>,
}

/// The caller's stored predictions, newest first
#[utoipa::path(
    get,
    path = "/v1/predictions",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Stored predictions", body = PredictionHistoryResponse),
        (status = 401, description = "Sign in required", body = croprec_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "predictions"
)]
pub async fn list_predictions(
    State(state): State<AppState>,
    session: RequestSession,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Json<PredictionHistoryResponse>, AppError> {
    let identity = session.require_identity()?;

    let predictions = sqlx::query_as::<_, PredictionRecord>(
        r#"
        SELECT id, composition_key, nitrogen, phosphorus, potassium, climate,
               humidity, ph, rainfall, soil_type, topography, water_availability,
               response, created_at
        FROM predictions
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(identity.user_id)
    .bind(query.effective_limit())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(PredictionHistoryResponse { predictions }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use croprec_core::session::Role;

    use super::*;
    use crate::routes::test_support::{
        MemoryAudit, RICE_DOCUMENT, StubEngine, send, session, state, with_session,
    };

    const FORM: &str = "npk_option=balanced-40-20-10&climate=Tropical&humidity=80&ph=6.5\
                        &rainfall=1200&soil_type=Loamy&topography=Flat&water_availability=High";

    fn form_post(body: &str) -> Request<Body> {
        Request::post("/v1/predictions")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn signed_in_form_submission_returns_report_and_audits() {
        let engine = StubEngine::replying(RICE_DOCUMENT);
        let audit = Arc::new(MemoryAudit::default());
        let app = with_session(
            router(),
            state(engine.clone(), audit.clone()),
            session(Role::User),
        );

        let (status, body) = send(app, form_post(FORM)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["compatible_crops"][0]["crop"], "Rice");
        assert_eq!(body["compatible_crops"][0]["compatibility_display"], "92.50%");
        assert_eq!(body["audit"]["status"], "written");
        assert_eq!(engine.calls().len(), 1);
        assert_eq!(audit.records().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_submission_points_to_login_without_engine_call() {
        let engine = StubEngine::replying(RICE_DOCUMENT);
        let app = with_session(
            router(),
            state(engine.clone(), Arc::new(MemoryAudit::default())),
            RequestSession::anonymous(),
        );

        let (status, body) = send(app, form_post(FORM)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["next_action_url"], "/v1/auth/login");
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn anonymous_broken_body_still_gets_login_hint() {
        let app = with_session(
            router(),
            state(
                StubEngine::replying(RICE_DOCUMENT),
                Arc::new(MemoryAudit::default()),
            ),
            RequestSession::anonymous(),
        );

        let (status, body) = send(app, form_post("humidity=wet")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["next_action"], "login");
    }

    #[tokio::test]
    async fn unknown_composition_warns_and_uses_default() {
        let engine = StubEngine::replying(RICE_DOCUMENT);
        let app = with_session(
            router(),
            state(engine.clone(), Arc::new(MemoryAudit::default())),
            session(Role::User),
        );
        let body = FORM.replace("balanced-40-20-10", "made-up-99");

        let (status, body) = send(app, form_post(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["warnings"][0]["kind"], "invalid_composition");
        assert_eq!(body["conditions"]["composition_key"], "balanced-40-20-10");
        assert_eq!(engine.calls()[0].as_slice()[..3], ["40", "20", "10"]);
    }

    #[tokio::test]
    async fn engine_garbage_is_bad_gateway_with_raw_text() {
        let app = with_session(
            router(),
            state(
                StubEngine::replying("Traceback (most recent call last)"),
                Arc::new(MemoryAudit::default()),
            ),
            session(Role::User),
        );

        let (status, body) = send(app, form_post(FORM)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "malformed_engine_output");
        assert_eq!(body["received"], "Traceback (most recent call last)");
    }

    #[tokio::test]
    async fn admin_preview_is_not_audited() {
        let engine = StubEngine::replying(RICE_DOCUMENT);
        let audit = Arc::new(MemoryAudit::default());
        let app = with_session(
            router(),
            state(engine.clone(), audit.clone()),
            session(Role::Admin),
        );

        let (status, body) = send(
            app,
            get("/v1/predictions/preview?admin_view=true&nitrogen=5&climate=Arid\
                 &humidity=20&rainfall=100&soil_type=Sandy&topography=Hilly&water_availability=Low"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["preview"], true);
        assert_eq!(body["audit"]["status"], "skipped_preview");
        assert_eq!(engine.calls()[0].as_slice()[..3], ["5", "20", "10"]);
        assert!(audit.records().is_empty());
    }

    #[tokio::test]
    async fn non_admin_preview_is_forbidden() {
        let engine = StubEngine::replying(RICE_DOCUMENT);
        let app = with_session(
            router(),
            state(engine.clone(), Arc::new(MemoryAudit::default())),
            session(Role::User),
        );

        let (status, body) = send(
            app,
            get("/v1/predictions/preview?admin_view=true&humidity=20&rainfall=100"),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "preview_forbidden");
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn preview_without_flag_is_rejected() {
        let app = with_session(
            router(),
            state(
                StubEngine::replying(RICE_DOCUMENT),
                Arc::new(MemoryAudit::default()),
            ),
            session(Role::Admin),
        );

        let (status, body) = send(app, get("/v1/predictions/preview?humidity=20")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "admin_view");
    }

    #[tokio::test]
    async fn history_requires_identity() {
        let app = with_session(
            router(),
            state(
                StubEngine::replying(RICE_DOCUMENT),
                Arc::new(MemoryAudit::default()),
            ),
            RequestSession::anonymous(),
        );

        let (status, body) = send(app, get("/v1/predictions")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["next_action"], "login");
    }

    #[test]
    fn history_limit_is_clamped() {
        let limit = |limit| HistoryQuery { limit }.effective_limit();
        assert_eq!(limit(None), 20);
        assert_eq!(limit(Some(0)), 1);
        assert_eq!(limit(Some(500)), 100);
        assert_eq!(limit(Some(42)), 42);
    }
}
