use std::io::Cursor;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::action::RequestDescriptor;
use crate::dispatch::Dispatcher;
use crate::response::BufferedResponse;

const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Put into request extensions by whatever authenticates the caller.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub String);

/// Every path goes to the dispatcher; it alone knows which datasets exist.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .fallback(move |request: Request| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { serve(dispatcher, request).await }
        })
        .layer(cors)
}

async fn serve(dispatcher: Arc<Dispatcher>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error=%e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Failed to read request body\n").into_response();
        }
    };
    let user = parts
        .extensions
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone());
    let descriptor = RequestDescriptor::new(parts.method, parts.uri.path())
        .with_query(parts.uri.query())
        .with_headers(parts.headers)
        .with_user(user.as_deref())
        .with_body(Cursor::new(bytes));

    // The dispatcher is synchronous; it runs on the blocking pool.
    let served = tokio::task::spawn_blocking(move || {
        let mut response = BufferedResponse::new();
        let handled = dispatcher.dispatch(descriptor, &mut response);
        (handled, response)
    })
    .await;
    match served {
        Ok((true, response)) => {
            let (status, headers, body) = response.into_parts();
            (status, headers, Body::from(body)).into_response()
        }
        Ok((false, _)) => {
            debug!("no dataset for request");
            (StatusCode::NOT_FOUND, "Not found\n").into_response()
        }
        Err(e) => {
            warn!(error=%e, "Join error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Join error\n").into_response()
        }
    }
}
