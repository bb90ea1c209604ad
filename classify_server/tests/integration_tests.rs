use std::{io::Cursor, sync::Arc};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use classify_server::{
    decision::LabelSet,
    endpoints::router,
    inferer::Pipeline,
    nn::{Classify, InputSpec, ModelError},
    sensors::{CameraHandle, CaptureFn},
    AppContext,
};
use common::{
    data_url,
    protocol::{ErrorResponse, PredictResponse},
    UNIDENTIFIED_LABEL,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::Array4;
use tower::ServiceExt; // for `oneshot`

type Error = Box<dyn std::error::Error>;

/// Scores the image by its mean red value so the outcome depends on the input.
struct RedDetector;

impl Classify for RedDetector {
    fn input_spec(&self) -> InputSpec {
        InputSpec::default()
    }

    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let red = input.slice(ndarray::s![0, .., .., 0]).mean().unwrap_or(0.0);
        let rest = (1.0 - red) / 4.0;
        Ok(vec![red, rest, rest, rest, rest])
    }
}

struct Failing;

impl Classify for Failing {
    fn input_spec(&self) -> InputSpec {
        InputSpec::default()
    }

    fn forward(&self, _input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::Forward("device lost".into()))
    }
}

fn app_with(classifier: Arc<dyn Classify>, camera: Option<CameraHandle>) -> Router {
    let pipeline = Pipeline::new(classifier, LabelSet::default(), 0.7, 1024 * 1024);
    router(Arc::new(AppContext::new(pipeline, camera)))
}

fn app() -> Router {
    app_with(Arc::new(RedDetector), None)
}

fn encoded(image: RgbImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, format)
        .unwrap();
    buf.into_inner()
}

fn red_pixel_data_url() -> String {
    let png = encoded(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])), ImageOutputFormat::Png);
    data_url::encode("image/png", &png)
}

fn predict_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    hyper::body::to_bytes(response.into_body())
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_predict_red_pixel() -> Result<(), Error> {
    let body = serde_json::json!({ "image": red_pixel_data_url() }).to_string();

    let response = app().oneshot(predict_request(body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let prediction: PredictResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert!(LabelSet::default().contains(&prediction.class) || prediction.class == UNIDENTIFIED_LABEL);
    assert_eq!(prediction.class, "dog");
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!(prediction.processing_time.is_some());

    Ok(())
}

#[tokio::test]
async fn test_predict_below_threshold_is_unidentified() -> Result<(), Error> {
    let png = encoded(RgbImage::from_pixel(4, 4, Rgb([0, 0, 255])), ImageOutputFormat::Png);
    let body = serde_json::json!({ "image": data_url::encode("image/png", &png) }).to_string();

    let response = app().oneshot(predict_request(body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let prediction: PredictResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(prediction.class, UNIDENTIFIED_LABEL);
    assert_eq!(prediction.confidence, 0.25);

    Ok(())
}

#[tokio::test]
async fn test_predict_without_image_field() -> Result<(), Error> {
    let response = app().oneshot(predict_request("{}")).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert!(!error.error.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_predict_with_malformed_json() -> Result<(), Error> {
    let response = app().oneshot(predict_request("{\"image\": ")).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert!(!error.error.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_predict_with_non_image_payload() -> Result<(), Error> {
    let body = serde_json::json!({ "image": data_url::encode("image/png", b"plain text") })
        .to_string();

    let response = app().oneshot(predict_request(body)).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert!(error.error.starts_with("invalid image"));

    Ok(())
}

#[tokio::test]
async fn test_predict_with_oversized_image() -> Result<(), Error> {
    // Xorshift noise does not compress, so the PNG stays close to 3 MiB
    let mut state: u32 = 0x9E37_79B9;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as u8
    };
    let noise = RgbImage::from_fn(1024, 1024, |_, _| Rgb([next(), next(), next()]));
    let png = encoded(noise, ImageOutputFormat::Png);
    assert!(png.len() > 1024 * 1024);
    let body = serde_json::json!({ "image": data_url::encode("image/png", &png) }).to_string();

    let response = app().oneshot(predict_request(body)).await?;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    Ok(())
}

#[tokio::test]
async fn test_predict_with_payload_over_image_limit() -> Result<(), Error> {
    // Fits the body limit as base64 but decodes to one byte over 1 MiB
    let payload = vec![0_u8; 1024 * 1024 + 1];
    let body = serde_json::json!({ "image": data_url::encode("image/png", &payload) }).to_string();

    let response = app().oneshot(predict_request(body)).await?;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert!(error.error.contains("larger than the limit of 1048576 bytes"));

    Ok(())
}

#[tokio::test]
async fn test_inference_failure_is_hidden() -> Result<(), Error> {
    let body = serde_json::json!({ "image": red_pixel_data_url() }).to_string();

    let response = app_with(Arc::new(Failing), None)
        .oneshot(predict_request(body))
        .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(error.error, "inference failed");

    Ok(())
}

#[tokio::test]
async fn test_video_feed_without_camera() -> Result<(), Error> {
    let request = Request::builder().uri("/video_feed").body(Body::empty())?;

    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    Ok(())
}

#[tokio::test]
async fn test_video_feed_streams_annotated_frames() -> Result<(), Error> {
    let frames = vec![
        encoded(RgbImage::from_pixel(160, 120, Rgb([250, 10, 10])), ImageOutputFormat::Jpeg(90)),
        encoded(RgbImage::from_pixel(160, 120, Rgb([10, 10, 250])), ImageOutputFormat::Jpeg(90)),
    ];
    let camera = CameraHandle::spawn("fake", move || {
        let mut frames = frames.into_iter();
        let capture: CaptureFn = Box::new(move || frames.next());
        Ok(capture)
    })?;
    let request = Request::builder().uri("/video_feed").body(Body::empty())?;

    let response = app_with(Arc::new(RedDetector), Some(camera))
        .oneshot(request)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    // The fake camera fails after two frames, which terminates the body
    let body = body_bytes(response).await;
    let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let parts = body
        .windows(header.len())
        .filter(|window| *window == &header[..])
        .count();
    assert_eq!(parts, 2);

    let first = &body[header.len()..];
    let end = first
        .windows(header.len())
        .position(|window| window == &header[..])
        .unwrap();
    let jpeg = &first[..end - 4];
    let frame = image::load_from_memory(jpeg)?;
    assert_eq!((frame.width(), frame.height()), (160, 120));

    Ok(())
}

#[tokio::test]
async fn test_index_and_healthcheck() -> Result<(), Error> {
    let response = app()
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let page = String::from_utf8(body_bytes(response).await)?;
    assert!(page.contains("/api/predict"));

    let response = app()
        .oneshot(Request::builder().uri("/healthcheck").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"healthy");

    Ok(())
}
