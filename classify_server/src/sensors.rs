//! Sensors module.
//!
//! The camera is owned by a dedicated capture thread. Handles request frames
//! over a channel; the device is released once the last handle is dropped.
use std::{sync::Arc, thread};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Capture one encoded frame, `None` once the device fails.
pub type CaptureFn = Box<dyn FnMut() -> Option<Vec<u8>>>;

type FrameRequest = oneshot::Sender<Option<Vec<u8>>>;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera support is not compiled in, rebuild with the `v4l` feature")]
    Unsupported,

    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("no resolution found for camera {0}")]
    NoResolution(String),

    #[error("no frame rate found for camera {0}")]
    NoFrameRate(String),

    #[error("capture thread for camera {0} stopped")]
    Closed(String),
}

/// Shared handle to a camera running on its own capture thread.
#[derive(Clone, Debug)]
pub struct CameraHandle {
    name: Arc<str>,
    tx: mpsc::Sender<FrameRequest>,
}

impl CameraHandle {
    /// Spawn the capture thread and open the device on it.
    ///
    /// `open` runs on the capture thread, so the device itself never has to
    /// cross threads. Blocks until the device is open or failed to open.
    pub fn spawn<F>(name: impl Into<String>, open: F) -> Result<Self, CameraError>
    where
        F: FnOnce() -> Result<CaptureFn, CameraError> + Send + 'static,
    {
        let name: Arc<str> = name.into().into();
        let (tx, mut rx) = mpsc::channel::<FrameRequest>(1);
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let thread_name = Arc::clone(&name);
        thread::Builder::new()
            .name(format!("capture {name}"))
            .spawn(move || {
                let mut capture = match open() {
                    Ok(capture) => {
                        ready_tx.send(Ok(())).ok();
                        capture
                    }
                    Err(err) => {
                        ready_tx.send(Err(err)).ok();
                        return;
                    }
                };

                while let Some(reply) = rx.blocking_recv() {
                    let frame = capture();
                    if frame.is_none() {
                        log::warn!("Error capturing frame from {}", &thread_name);
                    }
                    reply.send(frame).ok();
                }

                log::info!("Releasing camera {}", &thread_name);
            })
            .map_err(|e| CameraError::Open {
                device: name.to_string(),
                reason: e.to_string(),
            })?;

        ready_rx
            .recv()
            .map_err(|_| CameraError::Closed(name.to_string()))??;
        log::info!("Using camera {}", &name);

        Ok(Self { name, tx })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capture one frame. `None` if the device failed or the thread is gone.
    ///
    /// Requests from concurrent callers are served in arrival order, one frame
    /// each.
    pub async fn capture(&self) -> Option<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(reply_tx).await.ok()?;
        reply_rx.await.ok().flatten()
    }
}

/// Open `/dev/video<index>` with MJPEG at its highest resolution and frame rate.
#[cfg(feature = "v4l")]
pub fn open_camera(index: u32) -> Result<CameraHandle, CameraError> {
    let device = format!("/dev/video{index}");
    let device_ = device.clone();
    CameraHandle::spawn(device, move || {
        linux::get_capture_fn_linux(&device_, "MJPG", None, None)
    })
}

#[cfg(not(feature = "v4l"))]
pub fn open_camera(index: u32) -> Result<CameraHandle, CameraError> {
    log::error!("Cannot open /dev/video{index}");
    Err(CameraError::Unsupported)
}

#[cfg(feature = "v4l")]
mod linux {
    use rscam::{Camera, Config};

    use super::{CameraError, CaptureFn};

    /// Get a capture function to a video device on a Linux machine.
    pub fn get_capture_fn_linux(
        device_name: &str,
        format: &str,
        resolution: Option<(u32, u32)>,
        frame_rate: Option<(u32, u32)>,
    ) -> Result<CaptureFn, CameraError> {
        let open_err = |reason: String| CameraError::Open {
            device: device_name.to_owned(),
            reason,
        };

        let mut cam = Camera::new(device_name).map_err(|e| open_err(e.to_string()))?;
        log_supported_formats(&cam, format);
        let format = format.as_bytes();

        let resolution = match resolution {
            Some(resolution) => resolution,
            None => get_max_resolution(&cam, format)
                .ok_or_else(|| CameraError::NoResolution(device_name.to_owned()))?,
        };

        let frame_rate = match frame_rate {
            Some(frame_rate) => frame_rate,
            None => get_max_frame_rate(&cam, format, resolution)
                .ok_or_else(|| CameraError::NoFrameRate(device_name.to_owned()))?,
        };

        log::debug!(
            "Starting {} at {:?} with interval {:?}",
            device_name,
            resolution,
            frame_rate
        );
        cam.start(&Config {
            interval: frame_rate,
            resolution,
            format,
            ..Default::default()
        })
        .map_err(|e| open_err(e.to_string()))?;

        let callback = move || cam.capture().ok().map(|frame| frame[..].to_vec());
        Ok(Box::new(callback))
    }

    /// Get the maximum supported resolution for the given format.
    fn get_max_resolution(cam: &Camera, format: &[u8]) -> Option<(u32, u32)> {
        let resolution_info = cam.resolutions(format).ok()?;
        log::debug!("Found resolutions: {:?}", &resolution_info);
        match resolution_info {
            rscam::ResolutionInfo::Discretes(resolutions) => resolutions
                .into_iter()
                // Highest resolution in terms of number of pixels
                .max_by_key(|(width, height)| width * height),
            rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
        }
    }

    /// Get the shortest frame interval for the given format and resolution.
    fn get_max_frame_rate(
        cam: &Camera,
        format: &[u8],
        resolution: (u32, u32),
    ) -> Option<(u32, u32)> {
        let interval_info = cam.intervals(format, resolution).ok()?;
        log::debug!("Found frame intervals: {:?}", &interval_info);
        match interval_info {
            // Intervals are seconds per frame as (numerator, denominator)
            rscam::IntervalInfo::Discretes(intervals) => intervals
                .into_iter()
                .filter(|(numerator, _)| *numerator > 0)
                .max_by(|a, b| {
                    let fps_a = a.1 as f64 / a.0 as f64;
                    let fps_b = b.1 as f64 / b.0 as f64;
                    fps_a.total_cmp(&fps_b)
                }),
            rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
        }
    }

    fn log_supported_formats(cam: &Camera, format: &str) {
        let formats: Vec<_> = cam.formats().filter_map(Result::ok).collect();
        log::debug!(
            "Supported formats: {:?}, using format {:?}",
            formats,
            format
        );
    }
}
