//! Request-level errors and their HTTP representation.
//!
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;
use thiserror::Error;

use crate::{decoder::DecodeError, nn::ModelError};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request body is too large")]
    BodyTooLarge,

    #[error("missing \"image\" field")]
    MissingImage,

    #[error("invalid image: {0}")]
    Decode(#[from] DecodeError),

    #[error("inference failed")]
    Inference(#[from] ModelError),

    #[error("failed to encode frame")]
    Encode(#[from] image::ImageError),

    #[error("image processing failed")]
    Internal(String),

    #[error("no camera configured")]
    NoCamera,
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::InvalidBody(_) | PredictError::MissingImage => StatusCode::BAD_REQUEST,
            PredictError::Decode(DecodeError::SizeLimit(_)) | PredictError::BodyTooLarge => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            PredictError::Decode(_) => StatusCode::BAD_REQUEST,
            PredictError::Inference(_) | PredictError::Encode(_) | PredictError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PredictError::NoCamera => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}: {:?}", status, self);
        } else {
            log::warn!("{}: {}", status, self);
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::SizeLimitError;

    #[test]
    fn test_status_codes() {
        assert_eq!(PredictError::MissingImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            PredictError::from(DecodeError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PredictError::from(DecodeError::from(SizeLimitError { size: 2, max: 1 })).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            PredictError::from(ModelError::Forward("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(PredictError::NoCamera.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = PredictError::from(ModelError::Forward("tensor at /secret/path".into()));
        assert_eq!(err.to_string(), "inference failed");
    }
}
