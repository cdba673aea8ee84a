//! Split loader for the `chest_xray` directory layout
//!
//! Expects `<root>/{train,val,test}/{NORMAL,PNEUMONIA}/` and returns every
//! regular file of a split as a resized grayscale image, pneumonia first.

use crate::core::{
    ImageSet, Label, Result, Split, XRayError, IMAGE_SIZE, NORMAL_DIR, PNEUMONIA_DIR,
};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageReader};
use log::{debug, info};
use ndarray::{Array3, Axis};
use std::fs;
use std::path::{Path, PathBuf};

/// Default dataset root, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "chest_xray";

/// Loads whole splits into memory
#[derive(Debug, Clone)]
pub struct SplitLoader {
    root: PathBuf,
    image_size: u32,
}

impl SplitLoader {
    /// Create a loader rooted at `root` that resizes to 150x150
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            image_size: IMAGE_SIZE as u32,
        }
    }

    /// Override the square output size
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Directory holding the images of one class in one split
    pub fn class_dir(&self, split: Split, label: Label) -> PathBuf {
        let class = match label {
            Label::Normal => NORMAL_DIR,
            Label::Pneumonia => PNEUMONIA_DIR,
        };
        self.root.join(split.dir_name()).join(class)
    }

    /// Load a split by its lookup name (`train`, `validation` or `test`)
    pub fn load_by_name(&self, name: &str) -> Result<ImageSet> {
        self.load(name.parse()?)
    }

    /// Load every image of `split`, pneumonia images first
    pub fn load(&self, split: Split) -> Result<ImageSet> {
        if self.image_size == 0 {
            return Err(XRayError::InvalidParameter(
                "image size must be at least 1".to_string(),
            ));
        }
        info!("Loading data, subset = {split}");

        let pos_files = list_files(&self.class_dir(split, Label::Pneumonia))?;
        let neg_files = list_files(&self.class_dir(split, Label::Normal))?;
        debug!(
            "{split}: {} pneumonia files, {} normal files",
            pos_files.len(),
            neg_files.len()
        );

        let size = self.image_size as usize;
        let total = pos_files.len() + neg_files.len();
        let mut images = Array3::<u8>::zeros((total, size, size));
        let mut labels = Vec::with_capacity(total);

        let files = pos_files
            .iter()
            .map(|p| (p, Label::Pneumonia))
            .chain(neg_files.iter().map(|p| (p, Label::Normal)));

        for (i, (path, label)) in files.enumerate() {
            let image = load_grayscale(path, self.image_size)?;
            copy_into(&image, images.index_axis_mut(Axis(0), i))?;
            labels.push(label);
        }

        ImageSet::new(images, labels)
    }
}

/// Regular files directly inside `dir`, sorted by file name
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| XRayError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| XRayError::io(dir, e))?.path();
        // is_file follows symlinks, matching a plain "is this a file" check
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decode any supported image as 8-bit grayscale and resize to `size`x`size`
///
/// The format is sniffed from the file contents, so extensions do not matter.
pub fn load_grayscale(path: &Path, size: u32) -> Result<GrayImage> {
    let decode_err = |source| XRayError::ImageDecode {
        path: path.to_path_buf(),
        source,
    };

    let image = ImageReader::open(path)
        .map_err(|e| XRayError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| XRayError::io(path, e))?
        .decode()
        .map_err(decode_err)?
        .to_luma8();

    if image.dimensions() == (size, size) {
        return Ok(image);
    }
    Ok(imageops::resize(&image, size, size, FilterType::Triangle))
}

fn copy_into(image: &GrayImage, mut dst: ndarray::ArrayViewMut2<'_, u8>) -> Result<()> {
    let expected = dst.len();
    let raw = image.as_raw();
    if raw.len() != expected {
        return Err(XRayError::DimensionMismatch {
            expected,
            actual: raw.len(),
        });
    }
    for (d, &s) in dst.iter_mut().zip(raw.iter()) {
        *d = s;
    }
    Ok(())
}
