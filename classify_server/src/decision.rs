//! Reduce a probability vector to a label and a confidence.
//!
use std::{fmt, str::FromStr};

use common::UNIDENTIFIED_LABEL;
use thiserror::Error;

use crate::nn::ModelError;

/// Default minimum probability to accept a label.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

const DEFAULT_LABELS: [&str; 5] = ["dog", "cat", "rabbit", "bird", "hamster"];

#[derive(Debug, Error, Eq, PartialEq)]
pub enum LabelSetError {
    #[error("label set is empty")]
    Empty,

    #[error("label at index {0} is blank")]
    Blank(usize),

    #[error("label {0:?} appears more than once")]
    Duplicate(String),

    #[error("label \"unidentified\" is reserved")]
    Reserved,
}

/// Ordered category names, indexed like the classifier output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelSetError> {
        if labels.is_empty() {
            return Err(LabelSetError::Empty);
        }
        for (index, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(LabelSetError::Blank(index));
            }
            if label == UNIDENTIFIED_LABEL {
                return Err(LabelSetError::Reserved);
            }
            if labels[..index].contains(label) {
                return Err(LabelSetError::Duplicate(label.clone()));
            }
        }

        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl FromStr for LabelSet {
    type Err = LabelSetError;

    /// Parse a comma-separated list, e.g. `dog,cat,rabbit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(',').map(|l| l.trim().to_owned()).collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels.join(","))
    }
}

/// Outcome of the decision layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// Accepted label, or [`UNIDENTIFIED_LABEL`] below the threshold.
    pub label: String,
    /// Index of the most probable class, whether accepted or not.
    pub index: usize,
    pub confidence: f32,
}

impl Decision {
    pub fn is_identified(&self) -> bool {
        self.label != UNIDENTIFIED_LABEL
    }
}

/// Pick the most probable label.
///
/// Ties go to the lowest index. NaN scores never win. A best probability
/// strictly below `threshold` is reported as [`UNIDENTIFIED_LABEL`] with its
/// confidence kept.
pub fn decide(
    probabilities: &[f32],
    labels: &LabelSet,
    threshold: f32,
) -> Result<Decision, ModelError> {
    if probabilities.len() != labels.len() {
        return Err(ModelError::OutputLength {
            expected: labels.len(),
            actual: probabilities.len(),
        });
    }

    let (index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (index, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((index, p)),
        })
        .ok_or_else(|| ModelError::Forward("model produced no comparable scores".into()))?;

    let label = match labels.get(index) {
        Some(label) if confidence >= threshold => label.to_owned(),
        _ => UNIDENTIFIED_LABEL.to_owned(),
    };

    Ok(Decision {
        label,
        index,
        confidence,
    })
}
