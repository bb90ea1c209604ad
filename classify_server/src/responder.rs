//! Annotated camera frames as a lazy multipart stream.
//!
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;

use crate::{sensors::CameraHandle, AppContext};

/// Capture, classify, annotate and encode frames until the camera fails.
///
/// Per frame the stream goes through capturing, predicting and encoding
/// before the part is emitted. A failed capture or a frame that cannot be
/// processed closes the stream. Dropping the stream (the client went away)
/// cancels it between frames.
pub fn annotated_frames(
    context: Arc<AppContext>,
    camera: CameraHandle,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    stream! {
        loop {
            let frame = match camera.capture().await {
                Some(frame) => frame,
                None => {
                    log::info!("Capture from {} ended, closing video feed", camera.name());
                    break;
                }
            };

            let context_ = Arc::clone(&context);
            match tokio::task::spawn_blocking(move || context_.pipeline.annotate_frame(&frame)).await {
                Ok(Ok(part)) => yield Ok(part),
                Ok(Err(err)) => {
                    log::warn!("Closing video feed: {err:?}");
                    break;
                }
                Err(err) => {
                    log::warn!("Closing video feed, frame task failed: {err}");
                    break;
                }
            }
        }
    }
}
