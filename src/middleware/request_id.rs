use axum::{
    body::Body,
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

/// Extension type for request ID
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Middleware that generates a unique request ID for each request,
/// echoes it as `X-Request-ID`, and stamps it into the `request_id`
/// field of any `{"error": {...}}` envelope the request produced.
pub async fn request_id_middleware(
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();

    // Add to request extensions for handlers to access
    request.extensions_mut().insert(RequestId(request_id.clone()));

    // Add span field for correlation in logs
    tracing::Span::current().record("request_id", &request_id.as_str());

    let mut response = next.run(request).await;

    response.headers_mut().insert(
        "X-Request-ID",
        request_id.parse().unwrap(),
    );

    if response.status().is_client_error() || response.status().is_server_error() {
        response = stamp_error_body(response, &request_id).await;
    }

    response
}

/// Rewrites an error response's JSON body to add `error.request_id`.
/// Falls back to returning the response unchanged (body intact) if it
/// isn't the `{"error": {...}}` envelope `AppError` builds.
async fn stamp_error_body(response: Response, request_id: &str) -> Response {
    let status = response.status();
    let mut headers = response.headers().clone();
    headers.remove(axum::http::header::CONTENT_LENGTH);

    let bytes = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return (status, headers, Body::empty()).into_response(),
    };

    let mut value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return (status, headers, bytes).into_response(),
    };

    if let Some(error) = value.get_mut("error").and_then(|e| e.as_object_mut()) {
        error.insert("request_id".to_string(), serde_json::Value::String(request_id.to_string()));
    }

    let mut rebuilt = (status, Json(value)).into_response();
    copy_headers(&headers, rebuilt.headers_mut());
    rebuilt
}

fn copy_headers(from: &HeaderMap, into: &mut HeaderMap) {
    for (name, value) in from.iter() {
        into.insert(name.clone(), value.clone());
    }
}
