//! Custom extractors that convert axum rejections to structured AppError responses.
//!
//! `Submission<T>` accepts either a JSON body or an HTML-style form post, and
//! `AppQuery<T>` replaces `axum::extract::Query<T>`.

use axum::{
    Form, Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{FormRejection, JsonRejection, QueryRejection},
    },
    http::{header::CONTENT_TYPE, request::Parts},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Body extractor for submissions that may arrive as JSON or as
/// `application/x-www-form-urlencoded`. Anything that is not JSON is read as a form.
pub struct Submission<T>(pub T);

impl<S, T> FromRequest<S> for Submission<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start().to_lowercase().starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            return match Json::<T>::from_request(req, state).await {
                Ok(Json(value)) => Ok(Submission(value)),
                Err(rejection) => Err(map_json_rejection(rejection)),
            };
        }

        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(Submission(value)),
            Err(rejection) => Err(map_form_rejection(rejection)),
        }
    }
}

/// Query-string extractor with structured errors.
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(AppQuery(value)),
            Err(rejection) => Err(map_query_rejection(rejection)),
        }
    }
}

/// Convert a `JsonRejection` to a structured `AppError::Validation`.
fn map_json_rejection(rejection: JsonRejection) -> AppError {
    body_error(rejection.body_text())
}

fn map_form_rejection(rejection: FormRejection) -> AppError {
    body_error(rejection.body_text())
}

fn map_query_rejection(rejection: QueryRejection) -> AppError {
    let body_text = rejection.body_text();
    AppError::Validation {
        field: Some(extract_field_from_serde_message(&body_text).unwrap_or("query".to_string())),
        message: format!("Invalid query string: {body_text}"),
        received: None,
        docs_hint: Some("Check the query parameters against GET /api-doc/openapi.json.".to_string()),
    }
}

fn body_error(body_text: String) -> AppError {
    // "missing field `climate`" → field = "climate"
    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or("body".to_string())),
        received: None,
        docs_hint: Some(
            "Check the request body against the endpoint's schema (GET /api-doc/openapi.json)."
                .to_string(),
        ),
    }
}

/// Try to extract a field name from serde's error messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    for pattern in ["missing field `", "unknown field `"] {
        if let Some(start) = msg.find(pattern) {
            let after = &msg[start + pattern.len()..];
            if let Some(end) = after.find('`') {
                return Some(after[..end].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        climate: String,
        humidity: f64,
    }

    async fn echo(Submission(sample): Submission<Sample>) -> String {
        format!("{}:{}", sample.climate, sample.humidity)
    }

    fn app() -> Router {
        Router::new().route("/submit", post(echo))
    }

    async fn send(content_type: &str, body: &str) -> (StatusCode, String) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/submit")
                    .header("content-type", content_type)
                    .body(Body::from(body.to_string()))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[test]
    fn extracts_missing_field_name() {
        let msg = "Failed to deserialize: missing field `climate` at line 1 column 72";
        assert_eq!(
            extract_field_from_serde_message(msg),
            Some("climate".to_string())
        );
    }

    #[test]
    fn extracts_unknown_field_name() {
        let msg = "unknown field `foo`, expected one of `bar`, `baz`";
        assert_eq!(
            extract_field_from_serde_message(msg),
            Some("foo".to_string())
        );
    }

    #[test]
    fn returns_none_for_generic_error() {
        let msg = "invalid type: string, expected u64";
        assert_eq!(extract_field_from_serde_message(msg), None);
    }

    #[tokio::test]
    async fn submission_accepts_form_posts() {
        let (status, body) = send(
            "application/x-www-form-urlencoded",
            "climate=Arid&humidity=12.5",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Arid:12.5");
    }

    #[tokio::test]
    async fn submission_accepts_json() {
        let (status, body) = send(
            "application/json",
            r#"{"climate":"Temperate","humidity":40}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Temperate:40");
    }

    #[tokio::test]
    async fn submission_rejects_non_numeric_humidity_as_validation_error() {
        let (status, body) = send(
            "application/x-www-form-urlencoded",
            "climate=Arid&humidity=wet",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "validation_failed");
    }

    #[tokio::test]
    async fn submission_reports_missing_field() {
        let (status, body) = send("application/json", r#"{"humidity":40}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["field"], "climate");
    }
}
