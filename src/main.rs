use clap::Parser;
use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};
use log::{error, info};
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;

mod artifacts;
mod batch;
mod coloc;
mod image_input;
mod output;
mod roi_input;
mod schemas;

use artifacts::DirectorySink;
use batch::{Batch, BatchConfig, BatchError};
use coloc::channels::ChannelSelection;
use coloc::threshold::ThresholdSpec;
use image_input::{list_inputs, FileImageReader};
use output::write_results;
use roi_input::GeoJsonRoiSource;
use schemas::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mcoloc")]
#[command(author, version)]
#[command(
    about = "Manders colocalization within hand-drawn cell regions of multi-channel image stacks."
)]
struct Args {
    /// Image file, or a directory of image files and stack directories
    input: PathBuf,

    /// Where per-cell images and the results table are written
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Directory holding `<image>.geojson` ROI files (default: next to each image)
    #[arg(long, default_value = None)]
    roi_dir: Option<PathBuf>,

    /// Channels to analyze, 1-based
    #[arg(long, value_delimiter = ',', default_value = "1,2")]
    channels: Vec<usize>,

    /// Threshold method per channel, or one for all. `None` excludes a
    /// channel from the thresholded coefficients.
    #[arg(long, value_delimiter = ',', default_value = "Mean,Otsu")]
    methods: Vec<ThresholdSpec>,

    /// Results table file name, within the output directory
    #[arg(long, default_value = "colocalization-results.csv")]
    output: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Infer)]
    output_fmt: OutputFormat,

    /// Only process directory entries whose name matches this pattern
    #[arg(long, default_value = None)]
    file_pattern: Option<Regex>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Hide the progress bar
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

fn setup_logging(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(level)?.log_to_stderr().start()
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let selection = ChannelSelection::new(&args.channels, &args.methods)?;
    for (channel, method) in selection.methods() {
        info!("channel {}: {}", channel, method);
    }

    let config = BatchConfig {
        selection,
        show_progress: !args.quiet,
    };

    let files = list_inputs(&args.input, args.file_pattern.as_ref())?;
    info!("{} images to process", files.len());

    let mut reader = FileImageReader;
    let mut rois = GeoJsonRoiSource::new(args.roi_dir.clone());
    let mut sink = DirectorySink::new(args.output_dir.clone()).map_err(BatchError::from)?;

    let (results, summary) = Batch::new(&config).run(&files, &mut reader, &mut rois, &mut sink)?;

    write_results(&args.output_dir.join(&args.output), args.output_fmt, &results)
        .map_err(BatchError::from)?;
    info!(
        "{} rows from {} of {} images",
        results.len(),
        summary.files,
        summary.files + summary.skipped_files
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let _logger = match setup_logging(&args.log_level) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("Logger initialization failed with {}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
