use crate::error::{ErrorBody, INTERNAL_SERVER_ERROR_MESSAGE};
use axum::{
    Json,
    body::Body,
    extract::{MatchedPath, Request},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tokio::time::Instant;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runs the handler, then records one event for the request once the response exists.
///
/// Requests that end in a 5xx are logged at `error` with the full request context: method,
/// path, matched route, query and, for anything but `GET`, the body.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(ToString::to_string);
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string());

    let (request, body) = if method == Method::GET {
        (request, None)
    } else {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%method, %path, ?e, "Unable to read request body");
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(ErrorBody {
                        message: "Request body too large".to_string(),
                        errors: None,
                    }),
                )
                    .into_response();
            }
        };
        let logged = String::from_utf8_lossy(&bytes).into_owned();
        (
            Request::from_parts(parts, Body::from(bytes)),
            Some(logged),
        )
    };

    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    if status.is_server_error() {
        error!(
            %method,
            %path,
            ?route,
            ?query,
            ?body,
            status = status.as_u16(),
            duration_ms,
            "Request failed"
        );
    } else {
        info!(
            %method,
            %path,
            ?route,
            ?query,
            ?body,
            status = status.as_u16(),
            duration_ms,
            "Request handled"
        );
    }

    response
}

/// Turns a handler panic into the same body as any other internal error.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: INTERNAL_SERVER_ERROR_MESSAGE.to_string(),
            errors: None,
        }),
    )
        .into_response()
}
