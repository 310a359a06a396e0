use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use croprec_core::error::{self, ApiError};
use croprec_core::pipeline::PipelineError;

pub const LOGIN_PATH: &str = "/v1/auth/login";

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// No usable session (401). Carries a login hint as the redirect equivalent.
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Wrong username or password (401)
    InvalidCredentials,
    /// Typed failure from the prediction pipeline
    Pipeline(PipelineError),
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn unauthenticated() -> Self {
        AppError::Unauthorized {
            message: "Sign in to continue".to_string(),
            docs_hint: Some(
                "POST /v1/auth/login with your username and password, then send \
                 'Authorization: Bearer <token>'."
                    .to_string(),
            ),
        }
    }
}

fn api_error(code: &str, message: String, request_id: String) -> ApiError {
    ApiError {
        error: code.to_string(),
        message,
        field: None,
        received: None,
        request_id,
        docs_hint: None,
        next_action: None,
        next_action_url: None,
    }
}

fn login_redirect(mut body: ApiError, docs_hint: Option<String>) -> ApiError {
    body.docs_hint = docs_hint;
    body.next_action = Some("login".to_string());
    body.next_action_url = Some(LOGIN_PATH.to_string());
    body
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    field,
                    received,
                    docs_hint,
                    ..api_error(error::codes::VALIDATION_FAILED, message, request_id)
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                login_redirect(
                    api_error(error::codes::UNAUTHENTICATED, message, request_id),
                    docs_hint,
                ),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                api_error(
                    error::codes::INVALID_CREDENTIALS,
                    "Invalid username or password.".to_string(),
                    request_id,
                ),
            ),
            AppError::Pipeline(err) => pipeline_response(err, request_id),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    api_error(
                        error::codes::INTERNAL_ERROR,
                        "An internal error occurred".to_string(),
                        request_id,
                    ),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    api_error(
                        error::codes::INTERNAL_ERROR,
                        "An internal error occurred".to_string(),
                        request_id,
                    ),
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

fn pipeline_response(err: PipelineError, request_id: String) -> (StatusCode, ApiError) {
    let message = err.to_string();
    match err {
        PipelineError::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            login_redirect(
                api_error(error::codes::UNAUTHENTICATED, message, request_id),
                Some("Sign in, then resubmit the prediction request.".to_string()),
            ),
        ),
        PipelineError::PreviewDenied => (
            StatusCode::FORBIDDEN,
            ApiError {
                field: Some("admin_view".to_string()),
                docs_hint: Some(
                    "Preview mode is reserved for admin sessions. \
                     Use POST /v1/predictions to submit your own conditions."
                        .to_string(),
                ),
                ..api_error(error::codes::PREVIEW_FORBIDDEN, message, request_id)
            },
        ),
        PipelineError::InvalidParameter(field_error) => (
            StatusCode::BAD_REQUEST,
            ApiError {
                field: Some(field_error.field.to_string()),
                received: field_error.received,
                ..api_error(
                    error::codes::VALIDATION_FAILED,
                    field_error.message,
                    request_id,
                )
            },
        ),
        PipelineError::InvocationFailed(_) => (
            StatusCode::BAD_GATEWAY,
            ApiError {
                docs_hint: Some(
                    "The prediction engine could not be run. Check the engine \
                     installation and its dependencies."
                        .to_string(),
                ),
                ..api_error(error::codes::INVOCATION_FAILED, message, request_id)
            },
        ),
        PipelineError::Malformed { raw, .. } => (
            StatusCode::BAD_GATEWAY,
            ApiError {
                received: Some(serde_json::Value::String(raw)),
                docs_hint: Some(
                    "The engine ran but did not return a crop compatibility document. \
                     The raw output is included for diagnosis."
                        .to_string(),
                ),
                ..api_error(error::codes::MALFORMED_ENGINE_OUTPUT, message, request_id)
            },
        ),
        PipelineError::IdentityRequired => (
            StatusCode::UNAUTHORIZED,
            login_redirect(
                api_error(error::codes::IDENTITY_REQUIRED, message, request_id),
                Some("The session has no user identity. Sign in again.".to_string()),
            ),
        ),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use croprec_core::engine::InvocationFailure;
    use croprec_core::prediction::FieldError;

    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (status, serde_json::from_slice(&bytes).expect("body should be JSON"))
    }

    #[tokio::test]
    async fn unauthenticated_points_to_login() {
        let (status, body) = render(AppError::Pipeline(PipelineError::Unauthenticated)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");
        assert_eq!(body["next_action"], "login");
        assert_eq!(body["next_action_url"], LOGIN_PATH);
    }

    #[tokio::test]
    async fn preview_denied_is_forbidden() {
        let (status, body) = render(AppError::Pipeline(PipelineError::PreviewDenied)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "preview_forbidden");
    }

    #[tokio::test]
    async fn malformed_output_surfaces_raw_text() {
        let (status, body) = render(AppError::Pipeline(PipelineError::Malformed {
            raw: "Traceback (most recent call last)".to_string(),
            reason: "expected value at line 1 column 1".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "malformed_engine_output");
        assert_eq!(body["received"], "Traceback (most recent call last)");
    }

    #[tokio::test]
    async fn invocation_failure_is_bad_gateway_without_partial_result() {
        let (status, body) = render(AppError::Pipeline(PipelineError::InvocationFailed(
            InvocationFailure::TimedOut {
                timeout: std::time::Duration::from_secs(30),
            },
        )))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "invocation_failed");
        assert!(body.get("compatible_crops").is_none());
    }

    #[tokio::test]
    async fn invalid_parameter_names_the_field() {
        let (status, body) = render(AppError::Pipeline(PipelineError::InvalidParameter(
            FieldError {
                field: "ph",
                message: "ph must be a number between 0 and 14".to_string(),
                received: Some(serde_json::json!(15.0)),
            },
        )))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "ph");
        assert_eq!(body["received"], 15.0);
    }

    #[tokio::test]
    async fn database_errors_do_not_leak_details() {
        let (status, body) = render(AppError::Database(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "An internal error occurred");
    }
}
