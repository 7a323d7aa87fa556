use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::classify::{Decision, classify};
use crate::forward::Forwarder;

#[derive(Clone)]
pub struct EdgeState {
    pub forwarder: Arc<Forwarder>,
}

// Every method and path lands in the same handler; the backend owns the
// route space.
pub fn router(state: EdgeState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

async fn handle(State(state): State<EdgeState>, req: Request) -> Response {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());

    // Only probe fetches are intercepted; anything else a client does with
    // these paths belongs to the backend.
    if (method == Method::GET || method == Method::HEAD)
        && classify(&path_and_query) == Decision::Intercept
    {
        tracing::debug!(%method, path = %path_and_query, "captive portal probe intercepted");
        return intercept_response();
    }

    let headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // Client went away mid-upload; nothing useful can be answered.
            tracing::debug!(error = %err, "request body read aborted");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let body = (!body.is_empty()).then_some(body);

    match state
        .forwarder
        .forward(method.clone(), &path_and_query, &headers, body)
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%method, path = %path_and_query, error = %err, "forwarding failed");
            (err.status(), err.client_message()).into_response()
        }
    }
}

fn intercept_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, HeaderValue::from_static("/"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}
