//! Core type definitions: dataset splits, labels and in-memory image sets

use crate::core::{Result, XRayError};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side length every image is resized to
pub const IMAGE_SIZE: usize = 150;

/// Subdirectory holding normal scans
pub const NORMAL_DIR: &str = "NORMAL";

/// Subdirectory holding pneumonia scans
pub const PNEUMONIA_DIR: &str = "PNEUMONIA";

/// Dataset partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    /// Lookup name, as accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }

    /// Directory name under the dataset root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "val",
            Split::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = XRayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "validation" => Ok(Split::Validation),
            "test" => Ok(Split::Test),
            other => Err(XRayError::UnknownSplit(other.to_string())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary class label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Pneumonia,
}

impl Label {
    /// Class names in index order, used for reports and plots
    pub const CLASS_NAMES: [&'static str; 2] = ["healthy", "pneumonia"];

    /// Numeric value: 1 = pneumonia, 0 = normal
    pub fn value(&self) -> u8 {
        match self {
            Label::Normal => 0,
            Label::Pneumonia => 1,
        }
    }

    pub fn index(&self) -> usize {
        self.value() as usize
    }

    pub fn is_pneumonia(&self) -> bool {
        matches!(self, Label::Pneumonia)
    }

    pub fn display_name(&self) -> &'static str {
        Self::CLASS_NAMES[self.index()]
    }

    /// Threshold a pneumonia probability at 0.5
    pub fn from_probability(p: f32) -> Self {
        Label::from(p > 0.5)
    }
}

impl From<bool> for Label {
    fn from(pneumonia: bool) -> Self {
        if pneumonia {
            Label::Pneumonia
        } else {
            Label::Normal
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Positionally aligned images and labels
///
/// Images are stored as an `(n, height, width)` array of 8-bit intensities.
/// Sets built by the split loader are label-grouped (pneumonia first), not
/// shuffled.
#[derive(Debug, Clone)]
pub struct ImageSet {
    images: Array3<u8>,
    labels: Vec<Label>,
}

impl ImageSet {
    /// Create a set, checking that every image has a label
    pub fn new(images: Array3<u8>, labels: Vec<Label>) -> Result<Self> {
        let n = images.len_of(Axis(0));
        if n != labels.len() {
            return Err(XRayError::DimensionMismatch {
                expected: n,
                actual: labels.len(),
            });
        }
        Ok(Self { images, labels })
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(n, height, width)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.images.dim()
    }

    pub fn images(&self) -> &Array3<u8> {
        &self.images
    }

    pub fn image(&self, i: usize) -> ArrayView2<'_, u8> {
        self.images.index_axis(Axis(0), i)
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Labels as 1 (pneumonia) / 0 (normal)
    pub fn label_values(&self) -> Vec<u8> {
        self.labels.iter().map(Label::value).collect()
    }

    /// Number of images carrying `label`
    pub fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// One row of raw intensities per image, `(n, height * width)`
    pub fn flatten(&self) -> Array2<f64> {
        let (n, h, w) = self.shape();
        let mut flat = Array2::<f64>::zeros((n, h * w));
        for (mut row, image) in flat.outer_iter_mut().zip(self.images.outer_iter()) {
            for (dst, &src) in row.iter_mut().zip(image.iter()) {
                *dst = src as f64;
            }
        }
        flat
    }
}
