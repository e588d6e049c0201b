//! Error-to-response mapping
//!
//! Every failure leaves the server as `{"error": <kind>, "reason": <text>}`
//! with the status code of its kind.

use crate::core::error::Error;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{debug, error};

/// Result type returned by request handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Core error on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    /// HTTP status for the wrapped error
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) | Error::DatabaseMissing(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::MalformedRevision(_)
            | Error::InvalidArgument(_)
            | Error::MalformedMultipart(_)
            | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::DatabaseExists(_) => StatusCode::PRECONDITION_FAILED,
            Error::Config(_) | Error::Io(_) | Error::Metrics(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        let body = json!({
            "error": self.0.kind(),
            "reason": self.0.reason(),
        });
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections use the protocol error body
pub struct JsonRequest<T>(pub T);

impl<T, S> FromRequest<S> for JsonRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonRequest(value)),
            Err(rejection) => {
                let reason = match rejection {
                    JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err.body_text()),
                    JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON".to_string(),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing or invalid Content-Type header. Expected 'application/json'".to_string()
                    }
                    JsonRejection::BytesRejection(_) => "Failed to read request body".to_string(),
                    _ => "Invalid JSON request".to_string(),
                };
                Err(ApiError(Error::invalid_argument(reason)))
            }
        }
    }
}
