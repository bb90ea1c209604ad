//! The per-request pipeline: decode, preprocess, classify, decide, respond.
//!
use std::{io::Cursor, sync::Arc, time::Instant};

use bytes::Bytes;
use common::protocol::PredictResponse;
use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use lazy_static::lazy_static;

use crate::{
    as_jpeg_stream_item,
    decision::{decide, Decision, LabelSet},
    decoder::{decode_data_url, decode_frame},
    error::PredictError,
    nn::{preprocess, Classify, ModelError},
};

/// JPEG quality of re-encoded stream frames.
const STREAM_JPEG_QUALITY: u8 = 80;

const TEXT_SCALE: f32 = 24.0;

pub struct Pipeline {
    classifier: Arc<dyn Classify>,
    labels: LabelSet,
    threshold: f32,
    max_image_bytes: usize,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn Classify>,
        labels: LabelSet,
        threshold: f32,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            classifier,
            labels,
            threshold,
            max_image_bytes,
        }
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// Run one image through preprocessing, the forward pass and the decision layer.
    pub fn classify(&self, image: &DynamicImage) -> Result<Decision, ModelError> {
        let input = preprocess(image, self.classifier.input_spec());
        let probabilities = self.classifier.forward(input)?;
        decide(&probabilities, &self.labels, self.threshold)
    }

    /// Classify a data URL image and build the JSON reply.
    pub fn predict_data_url(&self, data_url: &str) -> Result<PredictResponse, PredictError> {
        let start = Instant::now();

        let image = decode_data_url(data_url, self.max_image_bytes)?;
        log::debug!("Decoded {}x{} image", image.width(), image.height());

        let decision = self.classify(&image)?;
        let processing_time = start.elapsed().as_secs_f64();
        log::info!(
            "Predicted {} ({:.3}) in {:.3}s",
            decision.label,
            decision.confidence,
            processing_time
        );

        Ok(PredictResponse {
            class: decision.label,
            confidence: decision.confidence,
            processing_time: Some(processing_time),
        })
    }

    /// Classify a camera frame, burn the label into it and encode it as one
    /// multipart stream item.
    pub fn annotate_frame(&self, frame: &[u8]) -> Result<Bytes, PredictError> {
        let image = DynamicImage::ImageRgb8(decode_frame(frame, self.max_image_bytes)?);
        log::debug!("Image read");

        let decision = self.classify(&image)?;
        log::debug!("Inference done: {} ({:.3})", decision.label, decision.confidence);

        let mut image = image.into_rgb8();
        draw_decision_on_image(&mut image, &decision);

        let jpeg = encode_jpeg(&image)?;
        log::debug!("Image encoded ({} bytes)", jpeg.len());

        Ok(as_jpeg_stream_item(&jpeg))
    }
}

/// Draw the predicted label with its confidence in the top-left corner.
fn draw_decision_on_image(frame: &mut RgbImage, decision: &Decision) {
    let color = match decision.is_identified() {
        true => Rgb::from([0, 255, 0]),
        false => Rgb::from([255, 200, 0]),
    };

    draw_text_mut(
        frame,
        color,
        10,
        10,
        rusttype::Scale::uniform(TEXT_SCALE),
        &DEJAVU_MONO,
        &format!(
            "Prediction: {} ({:.0}%)",
            decision.label,
            decision.confidence * 100.0
        ),
    );
}

fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, STREAM_JPEG_QUALITY).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;

    Ok(buf.into_inner())
}

lazy_static! {
    static ref DEJAVU_MONO: rusttype::Font<'static> = {
        let font_data: &[u8] = include_bytes!("../../resources/DejaVuSansMono.ttf");
        let font: rusttype::Font<'static> =
            rusttype::Font::try_from_bytes(font_data).expect("failed to load font");
        font
    };
}
