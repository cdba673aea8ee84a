//! End-to-end experiment: load splits, train and score both classifiers
//!
//! ```rust,no_run
//! use pneumonia_detect::experiment::{Experiment, ExperimentConfig, Stages};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = Experiment::new(ExperimentConfig::default()).run(Stages::All)?;
//! report.print_summary();
//! # Ok(())
//! # }
//! ```

use crate::cnn::{CnnConfig, TrainedCnn};
use crate::core::{BinaryClassifier, ImageSet, Result, Split, XRayError, IMAGE_SIZE};
use crate::data::{from_directory, SplitLoader, DEFAULT_DATA_DIR};
use crate::metrics::Evaluation;
use crate::plot::{plot_confusion_matrix, plot_training_curves};
use crate::report::{CnnReport, RunReport, SvmReport};
use crate::svm::{PixelSvm, SvmConfig};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which classifiers to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stages {
    All,
    Svm,
    Cnn,
}

impl Stages {
    fn svm(&self) -> bool {
        matches!(self, Stages::All | Stages::Svm)
    }

    fn cnn(&self) -> bool {
        matches!(self, Stages::All | Stages::Cnn)
    }
}

/// Settings for one experiment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Root of the `{train,val,test}/{NORMAL,PNEUMONIA}` tree
    pub data_dir: PathBuf,
    /// Where charts are written
    pub output_dir: PathBuf,
    pub plots: bool,
    pub svm: SvmConfig,
    pub cnn: CnnConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            output_dir: PathBuf::from("plots"),
            plots: true,
            svm: SvmConfig::default(),
            cnn: CnnConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Square resolution shared by the split loader and the network
    pub fn image_size(&self) -> u32 {
        self.cnn.pipeline.image_size
    }

    pub fn with_image_size(mut self, size: u32) -> Self {
        self.cnn.pipeline.image_size = size;
        self
    }
}

/// A configured run over one dataset root
pub struct Experiment {
    config: ExperimentConfig,
    loader: SplitLoader,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        let loader = SplitLoader::new(&config.data_dir).with_image_size(config.image_size());
        Self { config, loader }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn loader(&self) -> &SplitLoader {
        &self.loader
    }

    /// Run the selected stages in order and collect their results
    pub fn run(&self, stages: Stages) -> Result<RunReport> {
        if self.config.image_size() as usize != IMAGE_SIZE {
            info!(
                "Using {0}x{0} images instead of the default {1}x{1}",
                self.config.image_size(),
                IMAGE_SIZE
            );
        }
        if stages.cnn() {
            self.config.cnn.validate()?;
        }
        let mut report = RunReport::new(self.config.clone());

        let train = if stages.svm() {
            Some(self.loader.load(Split::Train)?)
        } else {
            None
        };
        let test = self.loader.load(Split::Test)?;

        if let Some(train) = &train {
            report.svm = Some(self.run_svm(train, &test)?);
        }
        if stages.cnn() {
            report.cnn = Some(self.run_cnn(&test)?);
        }
        Ok(report)
    }

    /// Fit the pixel SVM on `train` and score it on `test`
    pub fn run_svm(&self, train: &ImageSet, test: &ImageSet) -> Result<SvmReport> {
        println!("Training SVM classifier...");
        let model = PixelSvm::from_config(self.config.svm.clone()).train(train)?;

        println!("Estimating classifier performance...");
        let evaluation = Evaluation::new(model.name(), model.evaluate(test)?);
        println!("SVM score: {:.4}", evaluation.accuracy);
        println!("{}", evaluation.confusion_matrix);

        self.plot(|dir| {
            plot_confusion_matrix(
                &evaluation.confusion_matrix,
                "Confusion matrix (SVM)",
                &dir.join("svm_confusion_matrix.svg"),
            )
        })?;

        Ok(SvmReport {
            model: model.info().clone(),
            evaluation,
        })
    }

    /// Train the CNN from the training directory and score it on `test`
    pub fn run_cnn(&self, test: &ImageSet) -> Result<CnnReport> {
        let train_dir = self.loader.root().join(Split::Train.dir_name());
        let split = from_directory(&train_dir, &self.config.cnn.pipeline)?;

        let model = TrainedCnn::fit(&split, &self.config.cnn)?;
        let history = model.history().clone();
        self.plot(|dir| plot_training_curves(&history, &dir.join("cnn_training_curves.svg")))?;

        let evaluation = Evaluation::new(model.name(), model.evaluate(test)?);
        println!("Classifier score: {:.4}", evaluation.accuracy);
        println!("Classification report:\n{}", evaluation.report);
        println!("{}", evaluation.confusion_matrix);

        self.plot(|dir| {
            plot_confusion_matrix(
                &evaluation.confusion_matrix,
                "Confusion matrix (CNN)",
                &dir.join("cnn_confusion_matrix.svg"),
            )
        })?;

        Ok(CnnReport {
            history,
            evaluation,
        })
    }

    fn plot<F>(&self, draw: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        if !self.config.plots {
            return Ok(());
        }
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|e| XRayError::io(dir, e))?;
        draw(dir)
    }
}
