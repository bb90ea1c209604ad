//! Image classifier: preprocessing and the ONNX forward pass.
//!
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;
use thiserror::Error;
use tract_onnx::prelude::*;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Side length of the square input the classifier was trained on.
pub const INPUT_SIZE: u32 = 224;

/// Number of color channels of the classifier input.
pub const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file {0} not found")]
    NotFound(PathBuf),

    #[error("failed to load model {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("input tensor has shape {actual:?}, model expects {expected:?}")]
    InputShape {
        expected: [usize; 4],
        actual: Vec<usize>,
    },

    #[error("forward pass failed: {0}")]
    Forward(String),

    #[error("model produced {actual} scores for {expected} labels")]
    OutputLength { expected: usize, actual: usize },
}

/// Memory layout of the batched input tensor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum TensorLayout {
    /// Batch, height, width, channels (Keras/TensorFlow exports).
    #[default]
    Nhwc,
    /// Batch, channels, height, width (PyTorch exports).
    Nchw,
}

/// Shape of the input the classifier accepts.
///
/// The preprocessor and the model input fact are both derived from this, so
/// they cannot disagree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub layout: TensorLayout,
}

impl InputSpec {
    pub const fn new(layout: TensorLayout) -> Self {
        Self {
            width: INPUT_SIZE,
            height: INPUT_SIZE,
            layout,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        let (width, height) = (self.width as usize, self.height as usize);
        match self.layout {
            TensorLayout::Nhwc => [1, height, width, CHANNELS],
            TensorLayout::Nchw => [1, CHANNELS, height, width],
        }
    }
}

impl Default for InputSpec {
    fn default() -> Self {
        Self::new(TensorLayout::default())
    }
}

/// Resize, convert to RGB and scale to [0, 1] with a leading batch dimension.
pub fn preprocess(image: &DynamicImage, spec: InputSpec) -> Array4<f32> {
    let resized: RgbImage = image::imageops::resize(
        &image.to_rgb8(),
        spec.width,
        spec.height,
        FilterType::Triangle,
    );

    let (width, height) = (spec.width as usize, spec.height as usize);
    match spec.layout {
        TensorLayout::Nhwc => {
            Array4::from_shape_fn((1, height, width, CHANNELS), |(_, y, x, c)| {
                resized[(x as _, y as _)][c] as f32 / 255.0
            })
        }
        TensorLayout::Nchw => {
            Array4::from_shape_fn((1, CHANNELS, height, width), |(_, c, y, x)| {
                resized[(x as _, y as _)][c] as f32 / 255.0
            })
        }
    }
}

/// A model with a single forward pass from one preprocessed image to one
/// probability per label.
pub trait Classify: Send + Sync {
    fn input_spec(&self) -> InputSpec;

    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError>;
}

/// Classifier backed by an ONNX model run with tract.
pub struct OnnxClassifier {
    model: NnModel,
    spec: InputSpec,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Load and optimize the model, then run one warm-up pass to learn the
    /// number of classes.
    pub fn load(path: impl AsRef<Path>, spec: InputSpec) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelError::NotFound(path.to_owned()));
        }

        let model = load_model(path, spec).map_err(|e| ModelError::Load {
            path: path.to_owned(),
            reason: format!("{e:#}"),
        })?;

        let mut classifier = Self {
            model,
            spec,
            num_classes: 0,
        };
        let warmup = classifier.forward(Array4::zeros(spec.shape()))?;
        classifier.num_classes = warmup.len();
        log::info!(
            "Loaded model {} with input {:?} and {} classes",
            path.display(),
            spec.shape(),
            classifier.num_classes
        );

        Ok(classifier)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Classify for OnnxClassifier {
    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let expected = self.spec.shape();
        if input.shape() != &expected[..] {
            return Err(ModelError::InputShape {
                expected,
                actual: input.shape().to_vec(),
            });
        }

        let raw_nn_out = self
            .model
            .run(tvec!(Tensor::from(input).into()))
            .map_err(|e| ModelError::Forward(format!("{e:#}")))?;

        let scores: Vec<f32> = raw_nn_out[0]
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Forward(format!("{e:#}")))?
            .iter()
            .copied()
            .collect();

        Ok(to_probabilities(scores))
    }
}

fn load_model(path: &Path, spec: InputSpec) -> TractResult<NnModel> {
    let [batch, d1, d2, d3] = spec.shape();
    let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(batch, d1, d2, d3));
    tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(0, input_fact)?
        .into_optimized()?
        .into_runnable()
}

/// Models exported without a final softmax produce logits; normalize those.
/// Outputs that already form a distribution are passed through untouched.
/// NaN scores stay NaN and are left out of the normalization.
fn to_probabilities(scores: Vec<f32>) -> Vec<f32> {
    let finite = || scores.iter().copied().filter(|s| !s.is_nan());
    if finite().all(|s| (0.0..=1.0).contains(&s)) {
        return scores;
    }

    let max = finite().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = finite().map(|s| (s - max).exp()).sum();
    scores.iter().map(|s| (s - max).exp() / sum).collect()
}
