//! Middleware for the proxy router

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::ProxyError;
use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Ensure every request carries a request ID and echo it on the response.
pub async fn request_id_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let request_id = match request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        Some(existing) => existing,
        None => Uuid::now_v7(),
    };
    let header_value = HeaderValue::from_str(&request_id.to_string())
        .map_err(|_| ProxyError::InvalidHeader("x-request-id"))?;

    request
        .headers_mut()
        .insert(X_REQUEST_ID, header_value.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(X_REQUEST_ID, header_value);

    Ok(response)
}

/// Access log: one line in, one line out, with timing.
pub async fn access_log_middleware(request: Request, next: Next) -> Result<Response, ProxyError> {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    info!(
        request_id = %request_id,
        method = %method,
        path = %uri.path(),
        "incoming request"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        request_id = %request_id,
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        "request completed"
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use tower::ServiceExt;

    macro_rules! ok_service {
        () => {
            tower::service_fn(|_req: Request| async move {
                Ok::<_, std::convert::Infallible>(
                    axum::http::Response::builder()
                        .status(StatusCode::OK)
                        .body(Body::empty())
                        .unwrap(),
                )
            })
        };
    }

    #[tokio::test]
    async fn generates_request_id_when_absent() {
        let service = tower::ServiceBuilder::new()
            .layer(from_fn(request_id_middleware))
            .service(ok_service!());

        let request = Request::builder()
            .uri("/test")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        let id = response.headers().get(X_REQUEST_ID).expect("request id");
        let uuid = Uuid::parse_str(id.to_str().unwrap()).unwrap();
        assert_eq!(uuid.get_version_num(), 7);
    }

    #[tokio::test]
    async fn propagates_existing_request_id() {
        let service = tower::ServiceBuilder::new()
            .layer(from_fn(request_id_middleware))
            .service(ok_service!());

        let existing = Uuid::now_v7().to_string();
        let request = Request::builder()
            .uri("/test")
            .header(X_REQUEST_ID, &existing)
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(X_REQUEST_ID).unwrap(),
            existing.as_str()
        );
    }

    #[tokio::test]
    async fn replaces_malformed_request_id() {
        let service = tower::ServiceBuilder::new()
            .layer(from_fn(request_id_middleware))
            .service(ok_service!());

        let request = Request::builder()
            .uri("/test")
            .header(X_REQUEST_ID, "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        let id = response.headers().get(X_REQUEST_ID).unwrap();
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }
}
