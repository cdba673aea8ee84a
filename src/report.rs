//! JSON run report
//!
//! Captures the configuration and the metrics of one experiment run so results
//! can be compared across runs. Trained models themselves are not persisted.

use crate::cnn::TrainingHistory;
use crate::core::{Result, XRayError};
use crate::experiment::ExperimentConfig;
use crate::metrics::Evaluation;
use crate::svm::ModelInfo;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// SVM section of a run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmReport {
    pub model: ModelInfo,
    pub evaluation: Evaluation,
}

/// CNN section of a run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnnReport {
    pub history: TrainingHistory,
    pub evaluation: Evaluation,
}

/// Everything measured during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Crate version that produced the report
    pub library_version: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    pub config: ExperimentConfig,
    pub svm: Option<SvmReport>,
    pub cnn: Option<CnnReport>,
}

impl RunReport {
    /// Empty report stamped with the current time
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            config,
            svm: None,
            cnn: None,
        }
    }

    /// Save report to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| XRayError::io(path, e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| XRayError::SerializationError(e.to_string()))?;
        Ok(())
    }

    /// Load report from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| XRayError::io(path, e))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| XRayError::SerializationError(e.to_string()))
    }

    /// Print a short summary to stdout
    pub fn print_summary(&self) {
        println!("=== Run Summary ===");
        println!("Version: {}", self.library_version);
        println!("Created: {}", self.created_at);
        if let Some(svm) = &self.svm {
            println!(
                "SVM: accuracy {:.4} ({} support vectors)",
                svm.evaluation.accuracy, svm.model.n_support_vectors
            );
        }
        if let Some(cnn) = &self.cnn {
            println!(
                "CNN: accuracy {:.4} after {} epochs",
                cnn.evaluation.accuracy,
                cnn.history.len()
            );
        }
    }
}
