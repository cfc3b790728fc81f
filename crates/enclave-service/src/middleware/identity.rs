//! Caller identity middleware.
//!
//! Identity is asserted by an upstream gateway through the `X-User-ID`
//! header. This layer only parses it; handlers decide whether an identity is
//! required by calling [`RequestContext::user_id`].

use crate::context::{RequestContext, USER_ID_HEADER};
use axum::{extract::Request, middleware::Next, response::Response};

/// Insert a [`RequestContext`] into the request extensions.
///
/// A missing or malformed header yields an anonymous context rather than an
/// immediate rejection, so the 401 comes from the handler with the same
/// error body as every other failure.
pub async fn identify_caller(mut req: Request, next: Next) -> Response {
    let header = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let context = RequestContext::from_header_value(header);

    if context.user_id().is_err() && header.is_some() {
        tracing::debug!(target: "enclave.middleware.identity", "Ignoring malformed X-User-ID header");
    }

    req.extensions_mut().insert(context);
    next.run(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::EnclaveError;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn whoami(Extension(ctx): Extension<RequestContext>) -> Result<String, EnclaveError> {
        Ok(ctx.user_id()?.to_string())
    }

    fn app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn(identify_caller))
    }

    #[tokio::test]
    async fn test_valid_header_identifies_caller() {
        let request = HttpRequest::builder()
            .uri("/whoami")
            .header("X-User-ID", "17")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"17");
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let request = HttpRequest::builder()
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        let request = HttpRequest::builder()
            .uri("/whoami")
            .header("X-User-ID", "not-a-number")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
