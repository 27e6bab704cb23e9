//! Request deadline.
//!
//! The handler runs on its own task. Past the deadline the client gets a
//! `504` and the task still runs to completion: a slow assignment commits or
//! rolls back as a whole, never half-way.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::error::AppError;

/// Answer `504` if the handler has not responded within `limit`.
pub async fn request_timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let handler = tokio::spawn(next.run(request).in_current_span());

    match tokio::time::timeout(limit, handler).await {
        Ok(Ok(response)) => response,
        Ok(Err(join_error)) => {
            AppError::Internal(format!("request handler failed: {join_error}")).into_response()
        }
        Err(_) => {
            tracing::warn!(
                path,
                limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                "Request timed out; handler left running"
            );
            AppError::Timeout.into_response()
        }
    }
}
