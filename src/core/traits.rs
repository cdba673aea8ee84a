//! Core traits shared by the SVM and CNN paths

use crate::core::{ImageSet, Label, Result};
use crate::metrics::ConfusionMatrix;

/// A trained binary classifier over grayscale image sets
pub trait BinaryClassifier {
    /// Short name used in logs, plot titles and reports
    fn name(&self) -> &str;

    /// Predict one label per image
    fn predict(&self, images: &ImageSet) -> Result<Vec<Label>>;

    /// Predict and tabulate against the true labels
    fn evaluate(&self, images: &ImageSet) -> Result<ConfusionMatrix> {
        let predictions = self.predict(images)?;
        ConfusionMatrix::from_labels(images.labels(), &predictions)
    }
}
