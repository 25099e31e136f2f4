// Runs every image of a batch through ROI collection and per-cell
// colocalization, one image at a time.

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, trace, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifacts::{artifact_name, cell_artifacts, ArtifactError, ArtifactSink};
use crate::coloc::channels::ChannelSelection;
use crate::coloc::region::CellStatus;
use crate::coloc::{analyze_cell, CellAnalysis};
use crate::image_input::{ImageReader, InputError, OpenImage};
use crate::output::{OutputError, ResultsTable};
use crate::roi_input::{RoiError, RoiSource};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch cancelled while waiting for the ROIs of {0}")]
    Cancelled(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Inputs fixed for the whole batch.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub selection: ChannelSelection,
    pub show_progress: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub files: usize,
    pub skipped_files: usize,
    pub cells: usize,
    pub skipped_cells: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageStage {
    NotOpened,
    AwaitingRois,
    RoisFinalized,
    PerCellComputing,
    Saved,
    Closed,
}

impl ImageStage {
    fn next(self) -> Option<ImageStage> {
        match self {
            ImageStage::NotOpened => Some(ImageStage::AwaitingRois),
            ImageStage::AwaitingRois => Some(ImageStage::RoisFinalized),
            ImageStage::RoisFinalized => Some(ImageStage::PerCellComputing),
            ImageStage::PerCellComputing => Some(ImageStage::Saved),
            ImageStage::Saved => Some(ImageStage::Closed),
            ImageStage::Closed => None,
        }
    }
}

// Progress of one image through its stages. Stages only move forward, one at
// a time, except that an image may be closed from any stage.
struct ImageRun {
    path: PathBuf,
    stage: ImageStage,
}

impl ImageRun {
    fn new(path: &Path) -> Self {
        ImageRun {
            path: path.to_path_buf(),
            stage: ImageStage::NotOpened,
        }
    }

    fn advance(&mut self, to: ImageStage) {
        assert!(
            to == ImageStage::Closed || self.stage.next() == Some(to),
            "{}: cannot go from {:?} to {:?}",
            self.path.display(),
            self.stage,
            to
        );
        trace!("{}: {:?} -> {:?}", self.path.display(), self.stage, to);
        self.stage = to;
    }
}

pub struct Batch<'a> {
    config: &'a BatchConfig,
    results: ResultsTable,
    summary: BatchSummary,
}

impl<'a> Batch<'a> {
    pub fn new(config: &'a BatchConfig) -> Self {
        Batch {
            config,
            results: ResultsTable::new(&config.selection),
            summary: BatchSummary::default(),
        }
    }

    /// Process `files` in order. Unreadable images, and images whose ROIs
    /// cannot be read, are skipped; cancellation of the ROI wait and artifact
    /// write failures end the batch.
    pub fn run(
        mut self,
        files: &[PathBuf],
        reader: &mut dyn ImageReader,
        rois: &mut dyn RoiSource,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(ResultsTable, BatchSummary), BatchError> {
        let progress = if self.config.show_progress {
            let bar = ProgressBar::new(files.len() as u64);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        for path in files {
            progress.set_message(path.display().to_string());
            let mut run = ImageRun::new(path);
            let outcome = self.process_image(&mut run, reader, rois, sink);
            run.advance(ImageStage::Closed);
            progress.inc(1);

            match outcome {
                Ok(true) => self.summary.files += 1,
                Ok(false) => self.summary.skipped_files += 1,
                Err(err) => {
                    progress.abandon();
                    return Err(err);
                }
            }
        }
        progress.finish_and_clear();

        info!(
            "processed {} files ({} skipped), {} cells ({} skipped)",
            self.summary.files,
            self.summary.skipped_files,
            self.summary.cells,
            self.summary.skipped_cells
        );

        Ok((self.results, self.summary))
    }

    // Ok(false) if the image was skipped.
    fn process_image(
        &mut self,
        run: &mut ImageRun,
        reader: &mut dyn ImageReader,
        rois: &mut dyn RoiSource,
        sink: &mut dyn ArtifactSink,
    ) -> Result<bool, BatchError> {
        let image = match reader.open(&run.path) {
            Ok(image) => image,
            Err(err) => {
                warn!("skipping {}: {}", run.path.display(), err);
                return Ok(false);
            }
        };

        let max_channel = self.config.selection.max_channel();
        if max_channel > image.volume.nchannels() {
            let err = InputError::MissingChannel {
                path: image.path.clone(),
                nchannels: image.volume.nchannels(),
                channel: max_channel,
            };
            warn!("skipping {}: {}", run.path.display(), err);
            return Ok(false);
        }
        run.advance(ImageStage::AwaitingRois);

        let cells = match rois.finalize_rois(&image) {
            Ok(cells) => cells.finalize(),
            Err(RoiError::Cancelled) => return Err(BatchError::Cancelled(image.base_name)),
            Err(err) => {
                warn!("skipping {}: {}", run.path.display(), err);
                return Ok(false);
            }
        };
        run.advance(ImageStage::RoisFinalized);

        run.advance(ImageStage::PerCellComputing);
        for cell in &cells {
            match cell.status() {
                CellStatus::Defined => {}
                status => {
                    warn!(
                        "{}: skipping cell {} ({:?} regions)",
                        image.base_name,
                        cell.index(),
                        status
                    );
                    self.summary.skipped_cells += 1;
                    continue;
                }
            }

            let analysis = match analyze_cell(&image.volume, cell, &self.config.selection) {
                Ok(Some(analysis)) => analysis,
                Ok(None) => {
                    warn!("{}: cell {} lies outside the image", image.base_name, cell.index());
                    self.summary.skipped_cells += 1;
                    continue;
                }
                Err(err) => {
                    warn!("{}: skipping cell {}: {}", image.base_name, cell.index(), err);
                    self.summary.skipped_cells += 1;
                    continue;
                }
            };

            save_artifacts(&image, &analysis, sink)?;
            self.results.push(&image.base_name, &analysis);
            self.summary.cells += 1;
        }
        run.advance(ImageStage::Saved);

        debug!("{}: {} cells", image.base_name, cells.len());
        Ok(true)
    }
}

fn save_artifacts(
    image: &OpenImage,
    analysis: &CellAnalysis,
    sink: &mut dyn ArtifactSink,
) -> Result<(), ArtifactError> {
    let (raw, thresholded) = cell_artifacts(analysis);
    sink.save(&artifact_name(analysis.cell, &image.base_name, false), &raw)?;
    sink.save(&artifact_name(analysis.cell, &image.base_name, true), &thresholded)
}
