//! pneumonia-detect command line interface
//!
//! Runs the full experiment when invoked without a subcommand.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use pneumonia_detect::core::{Label, Result, Split};
use pneumonia_detect::experiment::{Experiment, ExperimentConfig, Stages};
use pneumonia_detect::{SplitLoader, DEFAULT_DATA_DIR};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "pneumonia-detect")]
#[command(about = "Train and evaluate SVM and CNN pneumonia classifiers on chest X-rays")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Dataset root containing train/, val/ and test/
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Directory for the SVG charts
    #[arg(long, global = true, default_value = "plots")]
    output_dir: PathBuf,

    /// Skip writing charts
    #[arg(long, global = true)]
    no_plots: bool,

    /// Write a JSON run report to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Side length images are resized to
    #[arg(long, global = true, default_value = "150")]
    image_size: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train and evaluate both classifiers (default)
    Run {
        #[command(flatten)]
        svm: SvmArgs,
        #[command(flatten)]
        cnn: CnnArgs,
    },
    /// Train and evaluate the pixel SVM only
    Svm(SvmArgs),
    /// Train and evaluate the CNN only
    Cnn(CnnArgs),
    /// Load a split and print its class counts
    Inspect(InspectArgs),
}

#[derive(Args, Clone)]
struct SvmArgs {
    /// Regularization parameter C
    #[arg(short = 'C', long, default_value = "1.0")]
    c: f64,
}

#[derive(Args, Clone)]
struct CnnArgs {
    /// Training epochs
    #[arg(long, default_value = "16")]
    epochs: usize,

    /// Images per batch
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Adam learning rate
    #[arg(long, default_value = "0.001")]
    learning_rate: f64,

    /// Seed for the train/validation shuffle and epoch order
    #[arg(long, default_value = "123")]
    seed: u64,

    /// Fraction of the training directory held out for validation
    #[arg(long, default_value = "0.2")]
    validation_split: f64,
}

impl Default for SvmArgs {
    fn default() -> Self {
        Self { c: 1.0 }
    }
}

impl Default for CnnArgs {
    fn default() -> Self {
        Self {
            epochs: 16,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 123,
            validation_split: 0.2,
        }
    }
}

#[derive(Args)]
struct InspectArgs {
    /// Split name: train, validation or test
    #[arg(long, default_value = "train")]
    split: String,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match &cli.command {
        None => run_command(&cli, Stages::All, SvmArgs::default(), CnnArgs::default()),
        Some(Commands::Run { svm, cnn }) => run_command(&cli, Stages::All, svm.clone(), cnn.clone()),
        Some(Commands::Svm(svm)) => run_command(&cli, Stages::Svm, svm.clone(), CnnArgs::default()),
        Some(Commands::Cnn(cnn)) => run_command(&cli, Stages::Cnn, SvmArgs::default(), cnn.clone()),
        Some(Commands::Inspect(args)) => inspect_command(&cli, args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn build_config(cli: &Cli, svm: SvmArgs, cnn: CnnArgs) -> ExperimentConfig {
    let mut config = ExperimentConfig {
        data_dir: cli.data_dir.clone(),
        output_dir: cli.output_dir.clone(),
        plots: !cli.no_plots,
        ..ExperimentConfig::default()
    }
    .with_image_size(cli.image_size);

    config.svm.c = svm.c;
    config.cnn = config
        .cnn
        .with_epochs(cnn.epochs)
        .with_batch_size(cnn.batch_size)
        .with_learning_rate(cnn.learning_rate)
        .with_seed(cnn.seed)
        .with_validation_split(cnn.validation_split);
    config
}

fn run_command(cli: &Cli, stages: Stages, svm: SvmArgs, cnn: CnnArgs) -> Result<()> {
    let config = build_config(cli, svm, cnn);
    info!("Dataset root: {:?}", config.data_dir);
    info!("Stages: {stages:?}");

    let report = Experiment::new(config).run(stages)?;

    if let Some(path) = &cli.report {
        report.save_to_file(path)?;
        info!("Report saved to: {path:?}");
    }
    report.print_summary();
    Ok(())
}

fn inspect_command(cli: &Cli, args: &InspectArgs) -> Result<()> {
    let split: Split = args.split.parse()?;
    let loader = SplitLoader::new(&cli.data_dir).with_image_size(cli.image_size);
    let images = loader.load(split)?;
    let (n, h, w) = images.shape();

    println!("Split: {split}");
    println!("Images: {n}");
    println!("Shape: ({n}, {h}, {w})");
    println!("Pneumonia: {}", images.count(Label::Pneumonia));
    println!("Normal: {}", images.count(Label::Normal));
    Ok(())
}
