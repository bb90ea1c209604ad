//! Classify webcam frames and uploaded images with a pretrained ONNX model.
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;

pub mod config;
pub mod decision;
pub mod decoder;
pub mod endpoints;
pub mod error;
pub mod inferer;
pub mod nn;
pub mod responder;
pub mod sensors;

use config::Config;
use inferer::Pipeline;
use nn::{Classify, OnnxClassifier};
use sensors::CameraHandle;

/// Everything a request handler needs, built once at startup.
pub struct AppContext {
    pub pipeline: Pipeline,
    pub camera: Option<CameraHandle>,
}

impl AppContext {
    pub fn new(pipeline: Pipeline, camera: Option<CameraHandle>) -> Self {
        Self { pipeline, camera }
    }

    /// Load the model and open the camera. Any failure here is fatal.
    pub fn from_config(config: &Config) -> Result<Self> {
        let classifier = OnnxClassifier::load(&config.model_path, config.input_spec())
            .context("failed to load classifier")?;
        let num_classes = classifier.num_classes();

        Self::with_classifier(config, Arc::new(classifier), num_classes)
    }

    /// Check `classifier` against the configured labels and open the camera.
    pub fn with_classifier(
        config: &Config,
        classifier: Arc<dyn Classify>,
        num_classes: usize,
    ) -> Result<Self> {
        if num_classes != config.labels.len() {
            bail!(
                "model predicts {} classes but {} labels are configured ({})",
                num_classes,
                config.labels.len(),
                config.labels
            );
        }

        let camera = config
            .camera_index
            .map(sensors::open_camera)
            .transpose()
            .context("failed to open camera")?;

        let pipeline = Pipeline::new(
            classifier,
            config.labels.clone(),
            config.confidence_threshold,
            config.max_image_bytes,
        );

        Ok(Self::new(pipeline, camera))
    }
}

/// Wrap an encoded JPEG into one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
