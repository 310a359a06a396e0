use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const HSTS: &str = "max-age=63072000; includeSubDomains";

/// Redirect plain-HTTP requests (as reported by the TLS-terminating proxy in
/// `X-Forwarded-Proto`) to HTTPS and stamp HSTS on every response.
/// Enabled with `CROPREC_REQUIRE_HTTPS=true`.
pub async fn require_https(req: Request, next: Next) -> Response {
    if forwarded_proto(req.headers()).as_deref() == Some("http") {
        if let Some(uri) = https_location(&req) {
            tracing::debug!(location = %uri, "redirecting to https");
            let mut response =
                (StatusCode::MOVED_PERMANENTLY, [("location", uri.to_string())]).into_response();
            add_hsts_header(&mut response);
            return response;
        }
    }

    let mut response = next.run(req).await;
    add_hsts_header(&mut response);
    response
}

/// First hop of `X-Forwarded-Proto`, lowercased. Absent means "trust it is https".
fn forwarded_proto(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-proto")?.to_str().ok()?;
    value
        .split(',')
        .next()
        .map(|proto| proto.trim().to_ascii_lowercase())
}

fn https_location(req: &Request) -> Option<Uri> {
    let host = req
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("https://{host}{path_and_query}").parse().ok()
}

fn add_hsts_header(response: &mut Response) {
    response
        .headers_mut()
        .insert("strict-transport-security", HeaderValue::from_static(HSTS));
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

    fn app() -> Router {
        Router::new()
            .route("/v1/compositions", get(ok))
            .layer(middleware::from_fn(super::require_https))
    }

    #[tokio::test]
    async fn plain_http_is_redirected() {
        let response = app()
            .oneshot(
                Request::get("/v1/compositions?x=1")
                    .header("host", "crops.example")
                    .header("x-forwarded-proto", "HTTP, https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()["location"],
            "https://crops.example/v1/compositions?x=1"
        );
        assert!(response.headers().contains_key("strict-transport-security"));
    }

    #[tokio::test]
    async fn https_passes_through_with_hsts() {
        let response = app()
            .oneshot(
                Request::get("/v1/compositions")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["strict-transport-security"],
            super::HSTS
        );
    }
}
