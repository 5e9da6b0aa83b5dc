//! Axum router: secure-transport middleware in front of a static file service

use std::path::Path;

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::services::ServeDir;

use super::policy::{self, Decision};

/// Build the application router serving `root`
///
/// Every request passes through [`enforce_secure_transport`] before it can
/// reach the file service, whatever its method.
pub fn app(root: impl AsRef<Path>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root.as_ref()))
        .layer(middleware::from_fn(enforce_secure_transport))
}

/// Read a header as text, treating absent or non-visible-ASCII values as empty
fn header_str<'a, K>(headers: &'a HeaderMap, name: K) -> &'a str
where
    K: header::AsHeaderName,
{
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Middleware applying the secure-transport policy
pub async fn enforce_secure_transport(request: Request, next: Next) -> Response {
    let decision = {
        let headers = request.headers();
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        policy::decide(
            header_str(headers, header::HOST),
            header_str(headers, policy::FORWARDED_PROTO),
            target,
        )
    };

    match decision {
        Decision::RedirectToHttps { location } => {
            tracing::debug!(method = %request.method(), %location, "Redirecting to https");
            redirect(&location)
        }
        Decision::ServeSecure => {
            let mut response = next.run(request).await;
            apply_hardening_headers(response.headers_mut());
            response
        }
    }
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::warn!("Unrepresentable redirect location '{}': {}", location, e);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Attach HSTS, nosniff and frame-deny headers
pub fn apply_hardening_headers(headers: &mut HeaderMap) {
    let hardening: [(HeaderName, &'static str); 3] = [
        (header::STRICT_TRANSPORT_SECURITY, policy::HSTS_VALUE),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
    ];
    for (name, value) in hardening {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardening_headers_replace_existing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        apply_hardening_headers(&mut headers);

        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(
            headers.get(header::STRICT_TRANSPORT_SECURITY).unwrap(),
            policy::HSTS_VALUE
        );
        assert_eq!(headers.get_all(header::X_FRAME_OPTIONS).iter().count(), 1);
    }

    #[test]
    fn test_header_str_tolerates_opaque_bytes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_bytes(b"caf\xe9").unwrap());
        assert_eq!(header_str(&headers, header::HOST), "");
        assert_eq!(header_str(&headers, policy::FORWARDED_PROTO), "");
    }

    #[test]
    fn test_redirect_response() {
        let response = redirect("https://example.com/a?b=c");
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://example.com/a?b=c"
        );
    }
}
