use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::{ProcessError, RecognitionFailure};

/// Transport mapping for `ProcessError`. Internal details are logged, never returned.
pub struct ApiError(pub ProcessError);

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match &self.0 {
            ProcessError::Input(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ProcessError::UnknownUser(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
            ProcessError::Recognition(RecognitionFailure::NoFaces) => {
                (StatusCode::BAD_REQUEST, "No faces detected".to_string())
            }
            ProcessError::Recognition(RecognitionFailure::NoQualifyingFaces) => {
                (StatusCode::BAD_REQUEST, "No valid faces detected".to_string())
            }
            ProcessError::Recognition(RecognitionFailure::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, "Face recognition timed out".to_string())
            }
            ProcessError::Recognition(RecognitionFailure::Inference(_)) => {
                (StatusCode::BAD_GATEWAY, "Face recognition service failed".to_string())
            }
            ProcessError::Store(_) | ProcessError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = ?self.0, "request failed");
        }
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_text_is_not_exposed() {
        let err = ApiError(ProcessError::Store(anyhow::anyhow!("disk I/O error at /secret/path")));
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("secret"));
    }

    #[test]
    fn test_recognition_mapping() {
        let (s, m) = ApiError(RecognitionFailure::NoFaces.into()).status_and_message();
        assert_eq!((s, m.as_str()), (StatusCode::BAD_REQUEST, "No faces detected"));
        let (s, _) = ApiError(RecognitionFailure::Timeout.into()).status_and_message();
        assert_eq!(s, StatusCode::GATEWAY_TIMEOUT);
        let (s, _) = ApiError(ProcessError::UnknownUser("x".into())).status_and_message();
        assert_eq!(s, StatusCode::NOT_FOUND);
    }
}
