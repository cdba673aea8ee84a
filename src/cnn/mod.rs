//! Convolutional network path

pub mod model;
pub mod training;

pub use self::model::{XRayCnn, XRayCnnConfig, MIN_IMAGE_SIZE};
pub use self::training::{
    predict_probabilities, train, CnnBackend, CnnConfig, EpochMetrics, TrainBackend, TrainedCnn,
    TrainingHistory,
};
