use crate::services::error::MediaError;
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Transport-facing error; the last point where internal errors are
/// translated into an HTTP status and body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Gateway Timeout: {0}")]
    Timeout(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotFound(msg) => AppError::NotFound(msg),
            MediaError::InvalidAction(msg) | MediaError::InvalidFormat(msg) => {
                AppError::BadRequest(msg)
            }
            MediaError::InvalidType(msg) => AppError::UnsupportedMediaType(msg),
            MediaError::Timeout(_, msg) => AppError::Timeout(msg),
            MediaError::Identification(msg) | MediaError::Storage(msg) => {
                AppError::Internal(msg)
            }
            MediaError::Database(e) => AppError::Internal(e.to_string()),
            MediaError::Other(e) => AppError::Internal(format!("{e:#}")),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Renders the error as JSON or HTML, per the caller's preference.
    pub fn render(self, as_json: bool) -> Response {
        let status = self.status();
        let message = self.message();
        if as_json {
            return (
                status,
                Json(json!({
                    "error": format!("{} - {}", status.as_u16(), status.canonical_reason().unwrap_or("")),
                    "message": message,
                })),
            )
                .into_response();
        }
        let body = format!(
            "<html>\n<head><title>{status}</title></head>\n<body><h1>{status}</h1><h2>{message}</h2></body>\n</html>\n",
        );
        (status, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.render(true)
    }
}

/// Whether the caller asked for a JSON error body.
pub fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: AppError = MediaError::not_found("collection web").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err: AppError = MediaError::InvalidFormat("invalid format bmp".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("bmp"));
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err: AppError = MediaError::Storage("s3 exploded".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Internal Server Error");
    }

    #[test]
    fn test_wants_json() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(wants_json(&headers));
    }
}
