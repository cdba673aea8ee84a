//! Data loading
//!
//! [`loader`] reads whole splits of the `chest_xray` layout in label-grouped
//! order. [`pipeline`] builds the shuffled training/validation subsets used by
//! the CNN, and [`augment`] provides its training-time transforms.

pub mod augment;
pub mod loader;
pub mod pipeline;

pub use self::augment::{Augmentation, Transform};
pub use self::loader::{list_files, load_grayscale, SplitLoader, DEFAULT_DATA_DIR};
pub use self::pipeline::{from_directory, DirectorySplit, FileIndex, PipelineConfig};
