//! Command line and environment configuration.
//!
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use clap::{builder::BoolishValueParser, ArgAction, Parser};

use crate::{
    decision::{LabelSet, DEFAULT_CONFIDENCE_THRESHOLD},
    decoder::DEFAULT_MAX_IMAGE_BYTES,
    nn::{InputSpec, TensorLayout},
};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Classify camera frames and uploaded images")]
pub struct Config {
    /// Path to the ONNX classifier weights
    #[clap(long, env = "MODEL_PATH")]
    pub model_path: PathBuf,

    /// Index of the capture device to stream from (`/dev/video<index>`)
    #[clap(long, env = "CAMERA_INDEX")]
    pub camera_index: Option<u32>,

    /// Address to bind to
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port on which to serve
    #[clap(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Verbose logging, `FLASK_DEBUG=1` works as well
    #[clap(long, env = "FLASK_DEBUG", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Comma-separated labels, in the order of the model output
    #[clap(long, env = "LABELS", default_value_t = LabelSet::default())]
    pub labels: LabelSet,

    /// Minimum probability to accept a label
    #[clap(long, env = "CONFIDENCE_THRESHOLD", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_parser = parse_threshold)]
    pub confidence_threshold: f32,

    /// Maximum size of a decoded image in bytes
    #[clap(long, env = "MAX_IMAGE_BYTES", default_value_t = DEFAULT_MAX_IMAGE_BYTES)]
    pub max_image_bytes: usize,

    /// Memory layout of the model input tensor
    #[clap(long, env = "INPUT_LAYOUT", value_enum, default_value_t = TensorLayout::Nhwc)]
    pub input_layout: TensorLayout,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn input_spec(&self) -> InputSpec {
        InputSpec::new(self.input_layout)
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match self.debug {
            true => "debug",
            false => "info",
        }
    }
}

fn parse_threshold(s: &str) -> Result<f32, String> {
    let threshold: f32 = s.parse().map_err(|e| format!("{e}"))?;
    match (0.0..=1.0).contains(&threshold) {
        true => Ok(threshold),
        false => Err(format!("{threshold} is not within [0, 1]")),
    }
}
