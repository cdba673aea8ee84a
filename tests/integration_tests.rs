//! Integration tests for the pneumonia-detect library
//!
//! These tests build small `chest_xray`-style trees in temporary directories
//! and exercise loading, training and reporting end to end.

use image::{GrayImage, Luma, Rgb, RgbImage};
use pneumonia_detect::cnn::CnnConfig;
use pneumonia_detect::data::{from_directory, PipelineConfig};
use pneumonia_detect::experiment::{Experiment, ExperimentConfig, Stages};
use pneumonia_detect::{load_split, Label, PixelSvm, RunReport, SplitLoader, XRayError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write `count` grayscale PNGs of the given size and brightness into `dir`
fn write_images(dir: &Path, count: usize, (width, height): (u32, u32), base: u8) {
    fs::create_dir_all(dir).expect("Failed to create class dir");
    for i in 0..count {
        let img = GrayImage::from_fn(width, height, |x, y| {
            let noise = ((x * 7 + y * 13 + i as u32 * 31) % 24) as u8;
            Luma([base.saturating_add(noise)])
        });
        img.save(dir.join(format!("img_{i:03}.png")))
            .expect("Failed to write image");
    }
}

/// Dataset root with bright pneumonia images and dark normal images
fn build_dataset(per_split: &[(&str, usize, usize)], size: (u32, u32)) -> TempDir {
    let root = TempDir::new().expect("Failed to create temp dir");
    for &(split, pneumonia, normal) in per_split {
        write_images(&root.path().join(split).join("PNEUMONIA"), pneumonia, size, 200);
        write_images(&root.path().join(split).join("NORMAL"), normal, size, 20);
    }
    root
}

#[test]
fn test_load_split_orders_pneumonia_first() {
    let root = build_dataset(&[("train", 2, 3)], (64, 64));

    let images = load_split(root.path(), "train").expect("Loading should succeed");

    assert_eq!(images.shape(), (5, 150, 150));
    assert_eq!(images.label_values(), vec![1, 1, 0, 0, 0]);
    assert_eq!(images.count(Label::Pneumonia), 2);
    assert_eq!(images.count(Label::Normal), 3);
}

#[test]
fn test_validation_split_reads_val_directory() {
    let root = build_dataset(&[("val", 1, 1)], (32, 32));

    let images = load_split(root.path(), "validation").expect("Loading should succeed");
    assert_eq!(images.label_values(), vec![1, 0]);
}

#[test]
fn test_unknown_split_is_rejected() {
    let root = build_dataset(&[("train", 1, 1)], (32, 32));

    match load_split(root.path(), "holdout") {
        Err(XRayError::UnknownSplit(name)) => assert_eq!(name, "holdout"),
        other => panic!("Expected UnknownSplit, got {other:?}"),
    }
    // The directory name is not a lookup name
    assert!(matches!(
        load_split(root.path(), "val"),
        Err(XRayError::UnknownSplit(_))
    ));
}

#[test]
fn test_missing_class_directory_fails() {
    let root = TempDir::new().expect("Failed to create temp dir");
    write_images(&root.path().join("test").join("PNEUMONIA"), 1, (32, 32), 200);

    let result = load_split(root.path(), "test");
    assert!(matches!(result, Err(XRayError::Io { .. })));
}

#[test]
fn test_mixed_resolutions_and_color_are_normalized() {
    let root = TempDir::new().expect("Failed to create temp dir");
    let pneumonia = root.path().join("test").join("PNEUMONIA");
    let normal = root.path().join("test").join("NORMAL");
    write_images(&pneumonia, 1, (300, 200), 180);
    write_images(&normal, 1, (40, 90), 30);

    RgbImage::from_pixel(120, 80, Rgb([90, 90, 90]))
        .save(normal.join("color.png"))
        .expect("Failed to write color image");

    let images = SplitLoader::new(root.path())
        .load_by_name("test")
        .expect("Loading should succeed");

    assert_eq!(images.shape(), (3, 150, 150));
    // color.png sorts before img_000.png; neutral gray keeps its intensity
    let pixel = images.image(1)[[75, 75]];
    assert!((pixel as i32 - 90).abs() <= 1, "got {pixel}");
}

#[test]
fn test_undecodable_file_reports_path() {
    let root = build_dataset(&[("test", 1, 1)], (32, 32));
    let bad = root.path().join("test").join("NORMAL").join("notes.png");
    fs::write(&bad, b"not an image").unwrap();

    match load_split(root.path(), "test") {
        Err(XRayError::ImageDecode { path, .. }) => assert_eq!(path, bad),
        other => panic!("Expected ImageDecode, got {other:?}"),
    }
}

#[test]
fn test_svm_separates_bright_and_dark_images() {
    let root = build_dataset(&[("train", 6, 6), ("test", 3, 3)], (24, 24));
    let loader = SplitLoader::new(root.path()).with_image_size(12);

    let train = loader.load_by_name("train").expect("train split");
    let test = loader.load_by_name("test").expect("test split");

    let model = PixelSvm::new().train(&train).expect("Training should succeed");
    let matrix = pneumonia_detect::BinaryClassifier::evaluate(&model, &test)
        .expect("Evaluation should succeed");

    assert_eq!(matrix.total(), 6);
    assert!(
        matrix.accuracy() >= 0.8,
        "Accuracy should be high for separable images, got {}",
        matrix.accuracy()
    );
    assert!(model.info().n_support_vectors > 0);
    assert_eq!(model.info().n_features, 144);
}

#[test]
fn test_directory_pipeline_holds_out_validation() {
    let root = build_dataset(&[("train", 5, 5)], (24, 24));
    let config = PipelineConfig {
        image_size: 16,
        ..PipelineConfig::default()
    };

    let split = from_directory(&root.path().join("train"), &config).expect("pipeline");

    assert_eq!(split.class_names, vec!["NORMAL", "PNEUMONIA"]);
    assert_eq!(split.training.len(), 8);
    assert_eq!(split.validation.len(), 2);
    assert_eq!(split.training.shape(), (8, 16, 16));

    // Same seed, same partition
    let again = from_directory(&root.path().join("train"), &config).expect("pipeline");
    assert_eq!(again.validation.labels(), split.validation.labels());
}

#[test]
fn test_experiment_end_to_end_without_plots() {
    let root = build_dataset(&[("train", 5, 5), ("test", 2, 2)], (24, 24));
    let config = ExperimentConfig {
        data_dir: root.path().to_path_buf(),
        plots: false,
        cnn: CnnConfig::default().with_epochs(2).with_batch_size(4),
        ..ExperimentConfig::default()
    }
    .with_image_size(16);

    let report = Experiment::new(config)
        .run(Stages::All)
        .expect("Experiment should succeed");

    let svm = report.svm.as_ref().expect("SVM section");
    assert_eq!(svm.evaluation.confusion_matrix.total(), 4);

    let cnn = report.cnn.as_ref().expect("CNN section");
    assert_eq!(cnn.history.len(), 2);
    assert_eq!(cnn.evaluation.confusion_matrix.total(), 4);
    assert!(cnn.history.epochs.iter().all(|e| e.loss.is_finite()));
    assert!(cnn.history.epochs.iter().all(|e| e.val_accuracy.is_some()));
}

#[test]
fn test_experiment_writes_charts_and_report() {
    let root = build_dataset(&[("train", 4, 4), ("test", 2, 2)], (20, 20));
    let out = TempDir::new().expect("Failed to create temp dir");
    let config = ExperimentConfig {
        data_dir: root.path().to_path_buf(),
        output_dir: out.path().join("plots"),
        cnn: CnnConfig::default().with_epochs(1).with_batch_size(4),
        ..ExperimentConfig::default()
    }
    .with_image_size(16);

    let report = Experiment::new(config)
        .run(Stages::All)
        .expect("Experiment should succeed");

    for chart in [
        "svm_confusion_matrix.svg",
        "cnn_training_curves.svg",
        "cnn_confusion_matrix.svg",
    ] {
        let path = out.path().join("plots").join(chart);
        let svg = fs::read_to_string(&path).expect("Chart should exist");
        assert!(svg.contains("<svg"), "{chart} is not an SVG");
    }

    let report_path = out.path().join("report.json");
    report.save_to_file(&report_path).expect("save report");
    let loaded = RunReport::load_from_file(&report_path).expect("load report");
    assert_eq!(loaded.config.image_size(), 16);
    assert_eq!(
        loaded.svm.map(|s| s.evaluation.confusion_matrix),
        report.svm.map(|s| s.evaluation.confusion_matrix)
    );
}

#[test]
fn test_cnn_only_run_skips_svm() {
    let root = build_dataset(&[("train", 4, 4), ("test", 1, 1)], (20, 20));
    let config = ExperimentConfig {
        data_dir: root.path().to_path_buf(),
        plots: false,
        cnn: CnnConfig::default().with_epochs(1).with_batch_size(8),
        ..ExperimentConfig::default()
    }
    .with_image_size(16);

    let report = Experiment::new(config)
        .run(Stages::Cnn)
        .expect("Experiment should succeed");
    assert!(report.svm.is_none());
    assert!(report.cnn.is_some());
}
