pub mod datasets;
pub mod evaluations;
pub mod health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::Error;

/// Map the error taxonomy onto HTTP statuses. Client-facing rejections
/// carry their explanation; internal conditions are logged and masked.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Capacity => StatusCode::TOO_MANY_REQUESTS,
            Error::InvalidState(_) | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "internal error while handling request");
            return (status, "internal server error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}
