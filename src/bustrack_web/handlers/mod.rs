use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

pub mod buses;
pub mod geocode;
pub mod routes;

#[derive(Serialize)]
struct MessageView {
    message: &'static str,
}

/// An error answered with a status and a json `{"message": ...}` body. The
/// source of an internal error is logged but never sent to the client.
#[derive(Debug)]
pub struct WebError {
    status: StatusCode,
    message: &'static str,
    source: Option<anyhow::Error>,
}

impl WebError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message, source: None }
    }

    pub fn bad_request(message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            source: Some(err.into()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.source {
            error!("{}: {:?}", self.message, err);
        }

        let body = MessageView { message: self.message };
        (self.status, Json(body)).into_response()
    }
}

impl<T: Into<anyhow::Error>> From<T> for WebError {
    fn from(err: T) -> Self {
        WebError::internal("Server Error", err)
    }
}

/// The json body of a request. A request without a json content type has a
/// null body, a body that does not parse is a bad request.
pub(crate) fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, WebError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(Value::Null),
        Err(err) => {
            debug!("Reject request body: {}", err);
            Err(WebError::bad_request("Invalid JSON body"))
        }
    }
}
