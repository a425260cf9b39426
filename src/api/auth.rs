//! Authentication middleware for the REST API
//!
//! When `ApiConfig::api_key` is set, every request must carry the key, either
//! in the `X-Api-Key` header or, for browser `EventSource` and `WebSocket`
//! clients that cannot set headers, in the `api_key` query parameter.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_PARAM: &str = "api_key";

/// Reject requests without the configured API key with 401
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use slice_dl::api::auth::require_api_key;
///
/// let api_key = Some("secret-key-123".to_string());
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(api_key, require_api_key));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    match provided_key(&request) {
        Some(provided) if constant_time_eq(provided.as_bytes(), expected_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing X-Api-Key header"),
    }
}

fn provided_key(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        return Some(header.to_string());
    }

    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == API_KEY_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Compares every byte regardless of where the first mismatch is
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    fn app(api_key: Option<&str>) -> Router {
        Router::new()
            .route("/jobs", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                api_key.map(str::to_string),
                require_api_key,
            ))
    }

    async fn status(app: Router, request: Request<Body>) -> StatusCode {
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn open_when_no_key_configured() {
        let request = Request::builder().uri("/jobs").body(Body::empty()).unwrap();

        assert_eq!(status(app(None), request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn header_key_must_match_exactly() {
        let ok = Request::builder()
            .uri("/jobs")
            .header("X-Api-Key", "Secret")
            .body(Body::empty())
            .unwrap();
        let wrong_case = Request::builder()
            .uri("/jobs")
            .header("x-api-key", "secret")
            .body(Body::empty())
            .unwrap();

        assert_eq!(status(app(Some("Secret")), ok).await, StatusCode::OK);
        assert_eq!(
            status(app(Some("Secret")), wrong_case).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn query_parameter_is_accepted_for_browser_clients() {
        let request = Request::builder()
            .uri("/jobs?api_key=s%20cret")
            .body(Body::empty())
            .unwrap();

        assert_eq!(status(app(Some("s cret")), request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_key_is_rejected_with_json_error() {
        let request = Request::builder().uri("/jobs").body(Body::empty()).unwrap();

        let response = app(Some("secret")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ApiError = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error.code, "unauthorized");
        assert_eq!(error.error.message, "Missing X-Api-Key header");
    }
}
