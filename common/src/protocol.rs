//! Protocol definition for the prediction API.
//!
use serde::{Deserialize, Serialize};

/// Body of `POST /api/predict`.
///
/// `image` is optional so that a missing field is reported as a request error
/// instead of a body rejection.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub image: Option<String>,
}

impl PredictRequest {
    pub fn new(image: String) -> Self {
        Self { image: Some(image) }
    }
}

/// Successful prediction.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PredictResponse {
    pub class: String,
    pub confidence: f32,
    /// Seconds spent between decoding and decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// Error body returned with any 4xx/5xx status.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
