//! Evaluation metrics for binary classifiers
//!
//! Rows of the confusion matrix are actual classes, columns are predicted
//! classes, both in [`Label::index`] order (healthy, pneumonia).

use crate::core::{Label, Result, XRayError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 2x2 table of actual vs. predicted class counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    /// Build from aligned actual and predicted labels
    pub fn from_labels(actual: &[Label], predicted: &[Label]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(XRayError::DimensionMismatch {
                expected: actual.len(),
                actual: predicted.len(),
            });
        }

        let mut counts = [[0usize; 2]; 2];
        for (a, p) in actual.iter().zip(predicted.iter()) {
            counts[a.index()][p.index()] += 1;
        }
        Ok(Self { counts })
    }

    pub fn true_positives(&self) -> usize {
        self.counts[1][1]
    }

    pub fn true_negatives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Number of samples whose actual class is `label`
    pub fn support(&self, label: Label) -> usize {
        self.counts[label.index()].iter().sum()
    }

    /// Number of samples predicted as `label`
    fn predicted(&self, label: Label) -> usize {
        self.counts[0][label.index()] + self.counts[1][label.index()]
    }

    /// Accuracy: (TP + TN) / total
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives() + self.true_negatives(), self.total())
    }

    /// Precision of one class: correct predictions of it / all predictions of it
    pub fn precision(&self, label: Label) -> f64 {
        ratio(self.counts[label.index()][label.index()], self.predicted(label))
    }

    /// Recall of one class: correct predictions of it / its support
    pub fn recall(&self, label: Label) -> f64 {
        ratio(self.counts[label.index()][label.index()], self.support(label))
    }

    /// Harmonic mean of precision and recall for one class
    pub fn f1_score(&self, label: Label) -> f64 {
        let p = self.precision(label);
        let r = self.recall(label);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * (p * r) / (p + r)
        }
    }

    /// Recall of the normal class: TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        self.recall(Label::Normal)
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport::from_confusion(self)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [normal, pneumonia] = Label::CLASS_NAMES;
        writeln!(f, "{:>12} {:>10} {:>10}", "actual\\pred", normal, pneumonia)?;
        for (name, row) in Label::CLASS_NAMES.iter().zip(self.counts.iter()) {
            writeln!(f, "{:>12} {:>10} {:>10}", name, row[0], row[1])?;
        }
        Ok(())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Precision, recall, F1 and support of one class or average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy and averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let classes: Vec<ClassMetrics> = [Label::Normal, Label::Pneumonia]
            .iter()
            .map(|&label| ClassMetrics {
                name: label.display_name().to_string(),
                precision: cm.precision(label),
                recall: cm.recall(label),
                f1_score: cm.f1_score(label),
                support: cm.support(label),
            })
            .collect();

        let total = cm.total();
        let n_classes = classes.len() as f64;
        let macro_avg = ClassMetrics {
            name: "macro avg".to_string(),
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n_classes,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n_classes,
            f1_score: classes.iter().map(|c| c.f1_score).sum::<f64>() / n_classes,
            support: total,
        };

        let weighted = |metric: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes
                    .iter()
                    .map(|c| metric(c) * c.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            name: "weighted avg".to_string(),
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1_score: weighted(|c| c.f1_score),
            support: total,
        };

        Self {
            classes,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |f: &mut fmt::Formatter<'_>, m: &ClassMetrics| {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.name, m.precision, m.recall, m.f1_score, m.support
            )
        };

        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            row(f, class)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        row(f, &self.macro_avg)?;
        row(f, &self.weighted_avg)
    }
}

/// Summary of one classifier's performance on a labelled set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub model: String,
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
}

impl Evaluation {
    pub fn new(model: impl Into<String>, confusion_matrix: ConfusionMatrix) -> Self {
        Self {
            model: model.into(),
            accuracy: confusion_matrix.accuracy(),
            report: confusion_matrix.report(),
            confusion_matrix,
        }
    }
}
