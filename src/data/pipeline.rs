//! Directory-based training pipeline
//!
//! Builds seeded training/validation subsets straight from a directory whose
//! subdirectories are the classes, independent of the split loader. Class
//! directories are sorted alphabetically and the second one is the positive
//! class, so `NORMAL` maps to 0 and `PNEUMONIA` to 1. Decoded images are kept
//! in memory for the lifetime of the subsets.

use crate::core::{ImageSet, Label, Result, XRayError, IMAGE_SIZE};
use crate::data::loader::{list_files, load_grayscale};
use log::{debug, info};
use ndarray::{Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions picked up by the pipeline (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["bmp", "gif", "jpeg", "jpg", "png"];

/// How a class directory is split and decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fraction of files held out for validation
    pub validation_split: f64,
    /// Seed for the file shuffle that precedes the split
    pub seed: u64,
    /// Square side length after resizing
    pub image_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validation_split: 0.2,
            seed: 123,
            image_size: IMAGE_SIZE as u32,
        }
    }
}

/// Training and validation subsets of one directory
#[derive(Debug, Clone)]
pub struct DirectorySplit {
    pub class_names: Vec<String>,
    pub training: ImageSet,
    pub validation: ImageSet,
}

/// Labelled file listing of a class-per-subdirectory tree
#[derive(Debug, Clone)]
pub struct FileIndex {
    pub class_names: Vec<String>,
    pub files: Vec<(PathBuf, Label)>,
}

impl FileIndex {
    /// Index a directory with exactly two class subdirectories
    pub fn scan(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| XRayError::io(dir, e))?;

        let mut class_dirs = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| XRayError::io(dir, e))?.path();
            if path.is_dir() {
                class_dirs.push(path);
            }
        }
        class_dirs.sort();

        if class_dirs.len() != 2 {
            return Err(XRayError::InvalidDataset(format!(
                "binary labels need exactly 2 class directories in {}, found {}",
                dir.display(),
                class_dirs.len()
            )));
        }

        let mut class_names = Vec::with_capacity(2);
        let mut files = Vec::new();
        for (index, class_dir) in class_dirs.iter().enumerate() {
            let label = Label::from(index == 1);
            class_names.push(
                class_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            files.extend(
                list_files(class_dir)?
                    .into_iter()
                    .filter(|p| has_image_extension(p))
                    .map(|p| (p, label)),
            );
        }

        Ok(Self { class_names, files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Shuffle with `seed`, then hold out the last `fraction` of the files
    ///
    /// Returns `(training, validation)` listings.
    pub fn split(
        mut self,
        fraction: f64,
        seed: u64,
    ) -> Result<(Vec<(PathBuf, Label)>, Vec<(PathBuf, Label)>)> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(XRayError::InvalidParameter(format!(
                "validation split must be in [0, 1), got {fraction}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        self.files.shuffle(&mut rng);

        let n_val = (fraction * self.files.len() as f64) as usize;
        let validation = self.files.split_off(self.files.len() - n_val);
        Ok((self.files, validation))
    }
}

/// Index `dir`, split it and decode both subsets
pub fn from_directory(dir: &Path, config: &PipelineConfig) -> Result<DirectorySplit> {
    let index = FileIndex::scan(dir)?;
    if index.is_empty() {
        return Err(XRayError::EmptyDataset(format!(
            "no image files under {}",
            dir.display()
        )));
    }
    let class_names = index.class_names.clone();
    info!(
        "Found {} files belonging to {} classes ({})",
        index.len(),
        class_names.len(),
        class_names.join(", ")
    );

    let (train_files, val_files) = index.split(config.validation_split, config.seed)?;
    info!("Using {} files for training", train_files.len());
    info!("Using {} files for validation", val_files.len());

    let training = decode_all(&train_files, config.image_size)?;
    let validation = decode_all(&val_files, config.image_size)?;

    Ok(DirectorySplit {
        class_names,
        training,
        validation,
    })
}

fn decode_all(files: &[(PathBuf, Label)], size: u32) -> Result<ImageSet> {
    let side = size as usize;
    let mut images = Array3::<u8>::zeros((files.len(), side, side));
    let mut labels = Vec::with_capacity(files.len());

    for (i, (path, label)) in files.iter().enumerate() {
        debug!("decoding {}", path.display());
        let image = load_grayscale(path, size)?;
        let mut dst = images.index_axis_mut(Axis(0), i);
        for (d, &s) in dst.iter_mut().zip(image.as_raw().iter()) {
            *d = s;
        }
        labels.push(*label);
    }

    ImageSet::new(images, labels)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Index batches over `n` samples in order
pub fn sequential_batches(n: usize, batch_size: usize) -> Vec<Vec<usize>> {
    let indices: Vec<usize> = (0..n).collect();
    indices
        .chunks(batch_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

/// Index batches over `n` samples in a fresh random order
pub fn shuffled_batches(n: usize, batch_size: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices
        .chunks(batch_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    fn make_tree(normal: usize, pneumonia: usize) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (class, count) in [("NORMAL", normal), ("PNEUMONIA", pneumonia)] {
            let dir = tmp.path().join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..count {
                GrayImage::from_pixel(12, 9, Luma([i as u8]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
        tmp
    }

    #[test]
    fn test_scan_assigns_alphabetical_labels() {
        let tmp = make_tree(3, 2);
        fs::write(tmp.path().join("NORMAL").join("notes.txt"), "x").unwrap();

        let index = FileIndex::scan(tmp.path()).unwrap();
        assert_eq!(index.class_names, vec!["NORMAL", "PNEUMONIA"]);
        assert_eq!(index.len(), 5);
        let positives = index
            .files
            .iter()
            .filter(|(_, l)| *l == Label::Pneumonia)
            .count();
        assert_eq!(positives, 2);
    }

    #[test]
    fn test_scan_rejects_non_binary_tree() {
        let tmp = make_tree(1, 1);
        fs::create_dir(tmp.path().join("COVID")).unwrap();
        assert!(matches!(
            FileIndex::scan(tmp.path()),
            Err(XRayError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let tmp = make_tree(6, 4);

        let (train_a, val_a) = FileIndex::scan(tmp.path()).unwrap().split(0.2, 123).unwrap();
        let (train_b, val_b) = FileIndex::scan(tmp.path()).unwrap().split(0.2, 123).unwrap();

        assert_eq!(train_a.len(), 8);
        assert_eq!(val_a.len(), 2);
        assert_eq!(train_a, train_b);
        assert_eq!(val_a, val_b);
        assert!(val_a.iter().all(|f| !train_a.contains(f)));
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let tmp = make_tree(1, 1);
        let index = FileIndex::scan(tmp.path()).unwrap();
        assert!(index.split(1.0, 0).is_err());
    }

    #[test]
    fn test_from_directory_decodes_subsets() {
        let tmp = make_tree(3, 2);
        let config = PipelineConfig {
            image_size: 16,
            ..PipelineConfig::default()
        };

        let split = from_directory(tmp.path(), &config).unwrap();
        assert_eq!(split.training.shape(), (4, 16, 16));
        assert_eq!(split.validation.shape(), (1, 16, 16));
    }

    #[test]
    fn test_batches_cover_every_index() {
        let batches = sequential_batches(70, 32);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 6);

        let mut rng = StdRng::seed_from_u64(1);
        let mut seen: Vec<usize> = shuffled_batches(70, 32, &mut rng).concat();
        seen.sort_unstable();
        assert_eq!(seen, (0..70).collect::<Vec<_>>());
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_image_extension(Path::new("a/b.JPEG")));
        assert!(has_image_extension(Path::new("scan.png")));
        assert!(!has_image_extension(Path::new("scan.dcm")));
        assert!(!has_image_extension(Path::new("README")));
    }
}
