use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

const BASELINE: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("x-frame-options", "DENY"),
    ("content-security-policy", "frame-ancestors 'none'"),
];

/// Security-header baseline for every response. API responses under `/v1/`
/// carry session tokens and field conditions, so they are also marked
/// `no-store`.
pub async fn apply(req: Request, next: Next) -> Response {
    let api_path = req.uri().path().starts_with("/v1/");
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in BASELINE {
        headers.insert(*name, HeaderValue::from_static(value));
    }
    if api_path {
        headers.insert("cache-control", HeaderValue::from_static("no-store"));
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    async fn get_headers(uri: &str) -> axum::http::HeaderMap {
        let app = Router::new()
            .route("/health", get(ok))
            .route("/v1/auth/session", get(ok))
            .layer(middleware::from_fn(super::apply));
        app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .headers()
            .clone()
    }

    #[tokio::test]
    async fn baseline_headers_on_every_response() {
        let headers = get_headers("/health").await;
        for (name, value) in super::BASELINE {
            assert_eq!(headers[*name], *value, "header {name}");
        }
        assert!(!headers.contains_key("cache-control"));
    }

    #[tokio::test]
    async fn api_responses_are_not_cached() {
        let headers = get_headers("/v1/auth/session").await;
        assert_eq!(headers["cache-control"], "no-store");
    }
}
