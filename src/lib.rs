//! Chest X-ray pneumonia classification
//!
//! Trains and scores two binary classifiers on the `chest_xray` dataset
//! layout: an RBF SVM over raw pixel vectors and a small convolutional network.

pub mod cnn;
pub mod core;
pub mod data;
pub mod experiment;
pub mod metrics;
pub mod plot;
pub mod report;
pub mod svm;

// Re-export main types for convenience
pub use crate::cnn::{CnnConfig, TrainedCnn, TrainingHistory};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{Result, XRayError};
pub use crate::data::{SplitLoader, DEFAULT_DATA_DIR};
pub use crate::experiment::{Experiment, ExperimentConfig, Stages};
pub use crate::metrics::{ClassificationReport, ConfusionMatrix, Evaluation};
pub use crate::report::RunReport;
pub use crate::svm::{PixelSvm, SvmConfig, TrainedSvm};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load one split of the dataset rooted at `root` by name
///
/// Returns pneumonia images first, then normal images, all resized to 150x150.
pub fn load_split<P: AsRef<std::path::Path>>(root: P, split: &str) -> Result<ImageSet> {
    SplitLoader::new(root).load_by_name(split)
}
