//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    body::StreamBody,
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Extension, Json, Router,
};
use common::protocol::{PredictRequest, PredictResponse};

use crate::{error::PredictError, responder::annotated_frames, AppContext};

/// Room for the JSON envelope around the base64 payload.
const BODY_OVERHEAD: usize = 64 * 1024;

/// Build the HTTP router around a shared context.
pub fn router(context: Arc<AppContext>) -> Router {
    let body_limit = body_limit(context.pipeline.max_image_bytes());

    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/api/predict", post(predict))
        .route("/video_feed", get(video_feed))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(context))
}

/// Largest JSON body that can carry an image of `max_image_bytes` as base64.
fn body_limit(max_image_bytes: usize) -> usize {
    (max_image_bytes + 2) / 3 * 4 + BODY_OVERHEAD
}

/// Landing page with the live preview and an upload form.
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Classify one image posted as a data URL.
pub async fn predict(
    Extension(context): Extension<Arc<AppContext>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    let Json(request) = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => PredictError::BodyTooLarge,
        _ => PredictError::InvalidBody(rejection.body_text()),
    })?;
    let image = request.image.ok_or(PredictError::MissingImage)?;
    log::debug!("Prediction requested ({} bytes)", image.len());

    // Decoding and the forward pass are CPU bound
    let response = tokio::task::spawn_blocking(move || context.pipeline.predict_data_url(&image))
        .await
        .map_err(|e| PredictError::Internal(e.to_string()))??;

    Ok(Json(response))
}

/// Stream of annotated camera frames.
pub async fn video_feed(
    Extension(context): Extension<Arc<AppContext>>,
) -> Result<impl IntoResponse, PredictError> {
    let camera = context.camera.clone().ok_or(PredictError::NoCamera)?;
    log::info!("Video feed from {} requested", camera.name());

    // Set body and headers for multipart streaming
    let body = StreamBody::new(annotated_frames(context, camera));
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    Ok((headers, body))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_body_limit_fits_max_image() {
        let max = 10 * 1024 * 1024;
        let encoded = common::data_url::encode("image/png", &vec![0_u8; max]);
        let body = serde_json::to_string(&PredictRequest::new(encoded)).unwrap();

        assert!(body.len() <= body_limit(max));
    }
}
