pub mod autothreshold;
pub mod channels;
pub mod cropper;
pub mod manders;
pub mod pairs;
pub mod region;
pub mod threshold;
pub mod volume;

use log::{debug, info};

use channels::{ChannelPair, ChannelSelection};
use cropper::{crop_cell, CellCrop};
use manders::{colocalize, MandersResult};
use region::Cell;
use threshold::{threshold, Threshold, ThresholdError};
use volume::MultiChannelVolume;

/// Everything computed for one cell: the crop, a threshold per analyzed
/// channel and the coefficients of every channel pair.
#[derive(Debug)]
pub struct CellAnalysis {
    pub cell: usize,
    pub crop: CellCrop,
    pub thresholds: Vec<(usize, Option<Threshold>)>,
    pub pairs: Vec<(ChannelPair, MandersResult)>,
}

impl CellAnalysis {
    pub fn cutoff(&self, channel: usize) -> Option<f32> {
        self.thresholds
            .iter()
            .find(|(c, _)| *c == channel)
            .and_then(|(_, t)| t.as_ref().map(|t| t.cutoff))
    }
}

/// Crop, threshold and colocalize one cell. `Ok(None)` when the cell has no
/// region data inside the image. Every selected channel must exist in
/// `volume`.
pub fn analyze_cell(
    volume: &MultiChannelVolume,
    cell: &Cell,
    selection: &ChannelSelection,
) -> Result<Option<CellAnalysis>, ThresholdError> {
    assert!(selection.max_channel() <= volume.nchannels());

    let Some(crop) = crop_cell(volume, cell) else {
        return Ok(None);
    };

    let mut thresholds = Vec::new();
    for &(channel, spec) in selection.methods() {
        thresholds.push((channel, threshold(crop.channel(channel), spec)?));
    }

    let mut analysis = CellAnalysis {
        cell: cell.index(),
        crop,
        thresholds,
        pairs: Vec::new(),
    };

    for pair in selection.pairs() {
        let result = colocalize(
            analysis.crop.channel(pair.x).view(),
            analysis.crop.channel(pair.y).view(),
            analysis.crop.mask.view(),
            (analysis.cutoff(pair.x), analysis.cutoff(pair.y)),
        );
        debug!("cell {} pair {}: {:?}", analysis.cell, pair, result);
        analysis.pairs.push((pair, result));
    }

    info!(
        "cell {}: {} slices, {} pairs",
        analysis.cell,
        analysis.crop.depth(),
        analysis.pairs.len()
    );

    Ok(Some(analysis))
}
