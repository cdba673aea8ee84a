//! Pixel-vector SVM classifier
//!
//! Each image is flattened into one row of raw intensities and fed to an
//! RBF-kernel SVM. Solving is delegated to `linfa-svm`; this module only picks
//! the hyperparameters and adapts image sets to and from its matrices.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pneumonia_detect::data::SplitLoader;
//! use pneumonia_detect::svm::PixelSvm;
//! use pneumonia_detect::BinaryClassifier;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = SplitLoader::new("chest_xray");
//! let train = loader.load_by_name("train")?;
//! let test = loader.load_by_name("test")?;
//!
//! let model = PixelSvm::new().with_c(1.0).train(&train)?;
//! let matrix = model.evaluate(&test)?;
//! println!("SVM score: {:.4}", matrix.accuracy());
//! # Ok(())
//! # }
//! ```

use crate::core::{BinaryClassifier, ImageSet, Label, Result, XRayError};
use linfa::prelude::*;
use linfa_svm::Svm;
use log::{debug, info};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Per-class penalty weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// Both classes use C as-is
    Uniform,
    /// Class c uses C * n_samples / (2 * n_c)
    Balanced,
}

/// RBF kernel coefficient in `exp(-gamma * ||x - y||^2)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamma {
    /// `1 / (n_features * var(X))`
    Scale,
    Value(f64),
}

/// SVM hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmConfig {
    /// Regularization parameter C
    pub c: f64,
    pub class_weight: ClassWeight,
    pub gamma: Gamma,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            class_weight: ClassWeight::Balanced,
            gamma: Gamma::Scale,
        }
    }
}

/// SVM builder over flattened images
#[derive(Debug, Clone, Default)]
pub struct PixelSvm {
    config: SvmConfig,
}

impl PixelSvm {
    /// Balanced RBF SVM with C = 1
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: SvmConfig) -> Self {
        Self { config }
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.config.class_weight = class_weight;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.config.gamma = gamma;
        self
    }

    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    /// Fit on every image of `train`
    pub fn train(&self, train: &ImageSet) -> Result<TrainedSvm> {
        if self.config.c <= 0.0 {
            return Err(XRayError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.config.c
            )));
        }
        if train.is_empty() {
            return Err(XRayError::EmptyDataset("SVM training set".to_string()));
        }
        let (w_neg, w_pos) = match self.config.class_weight {
            ClassWeight::Balanced => balanced_weights(train.labels())?,
            ClassWeight::Uniform => (1.0, 1.0),
        };

        let records = train.flatten();
        let n_features = records.ncols();
        let gamma = match self.config.gamma {
            Gamma::Scale => scale_gamma(&records),
            Gamma::Value(g) if g > 0.0 => g,
            Gamma::Value(g) => {
                return Err(XRayError::InvalidParameter(format!(
                    "gamma must be positive, got {g}"
                )))
            }
        };

        let c_pos = self.config.c * w_pos;
        let c_neg = self.config.c * w_neg;
        info!(
            "Training SVM on {} samples x {} features (C+={c_pos:.4}, C-={c_neg:.4}, gamma={gamma:.3e})",
            records.nrows(),
            n_features
        );

        let targets: Array1<bool> = train.labels().iter().map(Label::is_pneumonia).collect();
        let dataset = Dataset::new(records, targets);

        let model = Svm::<f64, bool>::params()
            .pos_neg_weights(c_pos, c_neg)
            .gaussian_kernel(1.0 / gamma)
            .fit(&dataset)?;

        let info = ModelInfo {
            n_support_vectors: model.nsupport(),
            n_features,
            gamma,
            c_pos,
            c_neg,
        };
        debug!("SVM fitted with {} support vectors", info.n_support_vectors);

        Ok(TrainedSvm { model, info })
    }
}

/// Balanced class weights `(normal, pneumonia)`: n_samples / (2 * n_class)
pub fn balanced_weights(labels: &[Label]) -> Result<(f64, f64)> {
    let n = labels.len() as f64;
    let n_pos = labels.iter().filter(|l| l.is_pneumonia()).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(XRayError::InvalidDataset(format!(
            "SVM training needs both classes, got {n_pos} pneumonia and {n_neg} normal"
        )));
    }
    Ok((n / (2.0 * n_neg as f64), n / (2.0 * n_pos as f64)))
}

/// `1 / (n_features * var(X))`, or `1 / n_features` for constant input
pub fn scale_gamma(records: &Array2<f64>) -> f64 {
    let n_features = records.ncols().max(1) as f64;
    let var = records.var(0.0);
    if var.is_finite() && var > 0.0 {
        1.0 / (n_features * var)
    } else {
        1.0 / n_features
    }
}

/// Summary of a fitted SVM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub n_support_vectors: usize,
    pub n_features: usize,
    pub gamma: f64,
    pub c_pos: f64,
    pub c_neg: f64,
}

/// Fitted pixel SVM
pub struct TrainedSvm {
    model: Svm<f64, bool>,
    info: ModelInfo,
}

impl TrainedSvm {
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

impl BinaryClassifier for TrainedSvm {
    fn name(&self) -> &str {
        "SVM"
    }

    fn predict(&self, images: &ImageSet) -> Result<Vec<Label>> {
        let records = images.flatten();
        if records.ncols() != self.info.n_features {
            return Err(XRayError::DimensionMismatch {
                expected: self.info.n_features,
                actual: records.ncols(),
            });
        }
        let predicted: Array1<bool> = self.model.predict(&records);
        Ok(predicted.iter().map(|&p| Label::from(p)).collect())
    }
}
