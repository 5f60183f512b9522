use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::bustrack_web::handlers::WebError;
use crate::bustrack_web::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Lets a request through only if it carries the operator api key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let Some(expected) = state.operator_key.as_deref() else {
        return Err(WebError::new(StatusCode::INTERNAL_SERVER_ERROR, "Server missing OPERATOR_API_KEY"));
    };

    let provided = request.headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(expected) {
        warn!("Rejected {} {} with invalid api key", request.method(), request.uri().path());
        return Err(WebError::new(StatusCode::UNAUTHORIZED, "Unauthorized: invalid API key"));
    }

    Ok(next.run(request).await)
}
