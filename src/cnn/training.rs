//! Training loop and inference for [`XRayCnn`]
//!
//! Training runs on the autodiff-wrapped ndarray backend. Every epoch reshuffles
//! the cached training subset, augments each training image on the fly, steps
//! Adam on binary cross-entropy, then scores the validation subset without
//! augmentation or dropout.

use crate::cnn::model::{XRayCnn, XRayCnnConfig, MIN_IMAGE_SIZE};
use crate::core::{BinaryClassifier, ImageSet, Label, Result, XRayError};
use crate::data::augment::Augmentation;
use crate::data::pipeline::{sequential_batches, shuffled_batches, DirectorySplit, PipelineConfig};
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub type CnnBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<CnnBackend>;

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnnConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub pipeline: PipelineConfig,
    pub augmentation: Augmentation,
}

impl Default for CnnConfig {
    fn default() -> Self {
        Self {
            epochs: 16,
            batch_size: 32,
            learning_rate: 1e-3,
            pipeline: PipelineConfig::default(),
            augmentation: Augmentation::default(),
        }
    }
}

impl CnnConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.pipeline.seed = seed;
        self
    }

    pub fn with_validation_split(mut self, fraction: f64) -> Self {
        self.pipeline.validation_split = fraction;
        self
    }

    pub fn with_image_size(mut self, size: u32) -> Self {
        self.pipeline.image_size = size;
        self
    }

    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = augmentation;
        self
    }

    /// Reject settings the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if (self.pipeline.image_size as usize) < MIN_IMAGE_SIZE {
            return Err(XRayError::InvalidParameter(format!(
                "CNN image size must be at least {MIN_IMAGE_SIZE}, got {}",
                self.pipeline.image_size
            )));
        }
        if self.epochs == 0 {
            return Err(XRayError::InvalidParameter("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(XRayError::InvalidParameter("batch size must be at least 1".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(XRayError::InvalidParameter(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Metrics of one training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    /// `None` when the validation subset is empty
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Per-epoch metrics in training order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn accuracy(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.accuracy).collect()
    }

    pub fn loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.loss).collect()
    }

    pub fn val_accuracy(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|e| e.val_accuracy).collect()
    }

    pub fn val_loss(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|e| e.val_loss).collect()
    }
}

/// Train on the training subset, scoring the validation subset every epoch
pub fn train<B: AutodiffBackend>(
    split: &DirectorySplit,
    config: &CnnConfig,
    device: &B::Device,
) -> Result<(XRayCnn<B>, TrainingHistory)> {
    config.validate()?;
    let training = &split.training;
    if training.is_empty() {
        return Err(XRayError::EmptyDataset("CNN training subset".into()));
    }

    B::seed(config.pipeline.seed);
    let model_config = XRayCnnConfig::new().with_image_size(config.pipeline.image_size as usize);
    let mut model: XRayCnn<B> = model_config.init(device);
    info!(
        "CNN: {} trainable parameters, {} training / {} validation images",
        model.num_params(),
        training.len(),
        split.validation.len()
    );

    let mut optimizer = AdamConfig::new().init::<B, XRayCnn<B>>();
    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init::<B>(device);
    let mut rng = StdRng::seed_from_u64(config.pipeline.seed);
    let mut history = TrainingHistory::default();

    for epoch in 1..=config.epochs {
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;

        for batch in shuffled_batches(training.len(), config.batch_size, &mut rng) {
            let images = images_tensor::<B>(
                training,
                &batch,
                Some((&config.augmentation, &mut rng)),
                device,
            );
            let targets = targets_tensor::<B>(training, &batch, device);

            let logits = model.forward(images);
            correct += count_correct(logits.clone(), training, &batch)?;

            let loss = loss_fn.forward(logits, targets);
            let batch_loss: f32 = loss.clone().into_scalar().elem();
            loss_sum += batch_loss as f64 * batch.len() as f64;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }

        let n = training.len() as f64;
        let (val_loss, val_accuracy) =
            score(&model.valid(), &split.validation, config.batch_size, device)?;
        let metrics = EpochMetrics {
            epoch,
            loss: loss_sum / n,
            accuracy: correct as f64 / n,
            val_loss,
            val_accuracy,
        };
        info!(
            "Epoch {}/{}: loss = {:.4}, accuracy = {:.4}, val_loss = {}, val_accuracy = {}",
            epoch,
            config.epochs,
            metrics.loss,
            metrics.accuracy,
            format_optional(metrics.val_loss),
            format_optional(metrics.val_accuracy)
        );
        history.epochs.push(metrics);
    }

    Ok((model, history))
}

/// Mean loss and accuracy over `set`, or `(None, None)` when it is empty
fn score<B: Backend>(
    model: &XRayCnn<B>,
    set: &ImageSet,
    batch_size: usize,
    device: &B::Device,
) -> Result<(Option<f64>, Option<f64>)> {
    if set.is_empty() {
        return Ok((None, None));
    }

    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init::<B>(device);
    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;

    for batch in sequential_batches(set.len(), batch_size) {
        let logits = model.forward(images_tensor::<B>(set, &batch, None, device));
        correct += count_correct(logits.clone(), set, &batch)?;
        let loss = loss_fn.forward(logits, targets_tensor::<B>(set, &batch, device));
        let batch_loss: f32 = loss.into_scalar().elem();
        loss_sum += batch_loss as f64 * batch.len() as f64;
    }

    let n = set.len() as f64;
    Ok((Some(loss_sum / n), Some(correct as f64 / n)))
}

/// Pneumonia probability for every image of `set`
pub fn predict_probabilities<B: Backend>(
    model: &XRayCnn<B>,
    set: &ImageSet,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let mut probabilities = Vec::with_capacity(set.len());
    for batch in sequential_batches(set.len(), batch_size) {
        let output = model.forward_probabilities(images_tensor::<B>(set, &batch, None, device));
        probabilities.extend(read_floats(output)?);
    }
    Ok(probabilities)
}

/// `[batch, 1, h, w]` tensor of raw intensities, optionally augmented
fn images_tensor<B: Backend>(
    set: &ImageSet,
    indices: &[usize],
    mut augment: Option<(&Augmentation, &mut StdRng)>,
    device: &B::Device,
) -> Tensor<B, 4> {
    let (_, h, w) = set.shape();
    let mut values = Vec::with_capacity(indices.len() * h * w);

    for &i in indices {
        let image = set.image(i);
        match augment.as_mut() {
            Some((augmentation, rng)) => {
                let transformed = augmentation.sample(&mut **rng).apply(image);
                values.extend(transformed.iter());
            }
            None => values.extend(image.iter().map(|&v| v as f32)),
        }
    }

    Tensor::from_data(TensorData::new(values, [indices.len(), 1, h, w]), device)
}

/// `[batch, 1]` integer targets, 1 = pneumonia
fn targets_tensor<B: Backend>(set: &ImageSet, indices: &[usize], device: &B::Device) -> Tensor<B, 2, Int> {
    let labels = set.labels();
    let values: Vec<i64> = indices.iter().map(|&i| labels[i].value() as i64).collect();
    Tensor::from_data(TensorData::new(values, [indices.len(), 1]), device)
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, set: &ImageSet, indices: &[usize]) -> Result<usize> {
    let labels = set.labels();
    let logits = read_floats(logits)?;
    Ok(logits
        .iter()
        .zip(indices)
        .filter(|&(&logit, &i)| Label::from(logit > 0.0) == labels[i])
        .count())
}

fn read_floats<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| XRayError::Training(format!("cannot read tensor data: {e:?}")))
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

/// Trained network ready for inference on the plain ndarray backend
pub struct TrainedCnn {
    model: XRayCnn<CnnBackend>,
    device: <CnnBackend as Backend>::Device,
    batch_size: usize,
    image_size: usize,
    history: TrainingHistory,
}

impl TrainedCnn {
    /// Train on `split` with the autodiff ndarray backend
    pub fn fit(split: &DirectorySplit, config: &CnnConfig) -> Result<Self> {
        let device = <TrainBackend as Backend>::Device::default();
        let (model, history) = train::<TrainBackend>(split, config, &device)?;
        debug!("CNN training finished after {} epochs", history.len());

        Ok(Self {
            model: model.valid(),
            device,
            batch_size: config.batch_size,
            image_size: config.pipeline.image_size as usize,
            history,
        })
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn model(&self) -> &XRayCnn<CnnBackend> {
        &self.model
    }

    /// Pneumonia probability per image
    pub fn predict_probabilities(&self, images: &ImageSet) -> Result<Vec<f32>> {
        let (_, h, w) = images.shape();
        if h != self.image_size || w != self.image_size {
            return Err(XRayError::DimensionMismatch {
                expected: self.image_size,
                actual: if h != self.image_size { h } else { w },
            });
        }
        predict_probabilities(&self.model, images, self.batch_size, &self.device)
    }
}

impl BinaryClassifier for TrainedCnn {
    fn name(&self) -> &str {
        "CNN"
    }

    fn predict(&self, images: &ImageSet) -> Result<Vec<Label>> {
        Ok(self
            .predict_probabilities(images)?
            .into_iter()
            .map(Label::from_probability)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Axis};

    fn toy_set(n_pos: usize, n_neg: usize, size: usize) -> ImageSet {
        let n = n_pos + n_neg;
        let mut images = Array3::<u8>::zeros((n, size, size));
        let mut labels = Vec::new();
        for i in 0..n {
            let pneumonia = i < n_pos;
            images
                .index_axis_mut(Axis(0), i)
                .fill(if pneumonia { 220 } else { 30 });
            labels.push(Label::from(pneumonia));
        }
        ImageSet::new(images, labels).unwrap()
    }

    fn toy_split() -> DirectorySplit {
        DirectorySplit {
            class_names: vec!["NORMAL".into(), "PNEUMONIA".into()],
            training: toy_set(4, 4, 16),
            validation: toy_set(1, 1, 16),
        }
    }

    fn quick_config() -> CnnConfig {
        CnnConfig::default()
            .with_epochs(2)
            .with_batch_size(4)
            .with_image_size(16)
    }

    #[test]
    fn test_default_config() {
        let config = CnnConfig::default();
        assert_eq!(config.epochs, 16);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.pipeline.seed, 123);
        assert_eq!(config.pipeline.validation_split, 0.2);
        assert_eq!(config.pipeline.image_size, 150);
    }

    #[test]
    fn test_rejects_zero_epochs() {
        let config = quick_config().with_epochs(0);
        assert!(matches!(
            TrainedCnn::fit(&toy_split(), &config),
            Err(XRayError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_image_size_below_pooling_depth() {
        let config = quick_config().with_image_size(4);
        assert!(matches!(config.validate(), Err(XRayError::InvalidParameter(_))));
        assert!(quick_config().with_image_size(8).validate().is_ok());

        let split = DirectorySplit {
            class_names: vec!["NORMAL".into(), "PNEUMONIA".into()],
            training: toy_set(2, 2, 4),
            validation: toy_set(1, 1, 4),
        };
        assert!(matches!(
            TrainedCnn::fit(&split, &config),
            Err(XRayError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_training_records_every_epoch() {
        let cnn = TrainedCnn::fit(&toy_split(), &quick_config()).expect("Training should succeed");

        let history = cnn.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.epochs[1].epoch, 2);
        assert!(history.loss().iter().all(|l| l.is_finite() && *l >= 0.0));
        assert!(history.accuracy().iter().all(|a| (0.0..=1.0).contains(a)));
        assert_eq!(history.val_accuracy().len(), 2);
    }

    #[test]
    fn test_predictions_cover_every_image() {
        let cnn = TrainedCnn::fit(&toy_split(), &quick_config()).unwrap();
        let test = toy_set(3, 2, 16);

        let probabilities = cnn.predict_probabilities(&test).unwrap();
        assert_eq!(probabilities.len(), 5);
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));

        let matrix = cnn.evaluate(&test).unwrap();
        assert_eq!(matrix.total(), 5);
        assert_eq!(matrix.support(Label::Pneumonia), 3);
    }

    #[test]
    fn test_empty_validation_is_reported_as_missing() {
        let split = DirectorySplit {
            validation: toy_set(0, 0, 16),
            ..toy_split()
        };
        let cnn = TrainedCnn::fit(&split, &quick_config().with_epochs(1)).unwrap();
        assert_eq!(cnn.history().epochs[0].val_loss, None);
    }

    #[test]
    fn test_rejects_other_resolution() {
        let cnn = TrainedCnn::fit(&toy_split(), &quick_config().with_epochs(1)).unwrap();
        assert!(matches!(
            cnn.predict(&toy_set(1, 1, 20)),
            Err(XRayError::DimensionMismatch { .. })
        ));
    }
}
