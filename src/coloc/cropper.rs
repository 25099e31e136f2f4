// Cut the bounding box of a cell out of every channel and blank whatever
// falls outside the cell's region on each slice.

use log::trace;
use ndarray::{s, Array2, Array3, Axis};

use super::region::{translate, Cell, CellRegions, CropBounds, Region};
use super::volume::{ChannelVolume, MultiChannelVolume};

/// Value given to voxels outside a slice's region.
pub const OUTSIDE: f32 = 0.0;

/// The cropped, masked channels of one cell.
///
/// Slices whose region is missing are left out, so `depth` counts the
/// defined slices rather than the slices of the source stack.
#[derive(Debug)]
pub struct CellCrop {
    pub bounds: CropBounds,
    pub slices: Vec<usize>,
    pub mask: Array3<bool>,
    pub channels: Vec<ChannelVolume>,
}

impl CellCrop {
    pub fn depth(&self) -> usize {
        self.slices.len()
    }

    pub fn channel(&self, channel: usize) -> &ChannelVolume {
        &self.channels[channel - 1]
    }
}

/// Crop every channel of `volume` to `cell`. Returns `None` when the cell has
/// no region at all, or when its regions lie entirely off the image.
pub fn crop_cell(volume: &MultiChannelVolume, cell: &Cell) -> Option<CellCrop> {
    let bounds = cell
        .union_bounds()?
        .clamp(volume.width(), volume.height())?;

    let crop_region = |region: &Region| {
        translate(region, -bounds.x as f64, -bounds.y as f64).mask(bounds.width, bounds.height)
    };

    // (z, mask) for each slice that has a region
    let slice_masks: Vec<(usize, Array2<bool>)> = match cell.regions() {
        CellRegions::PerSlice(slices) => slices
            .iter()
            .enumerate()
            .take(volume.depth())
            .filter_map(|(z, region)| region.as_ref().map(|region| (z, crop_region(region))))
            .collect(),
        CellRegions::SinglePlane(region) => {
            let Some(region) = region else {
                return None;
            };
            let mask = crop_region(region);
            (0..volume.depth()).map(|z| (z, mask.clone())).collect()
        }
    };

    let depth = slice_masks.len();
    let mut mask = Array3::from_elem((depth, bounds.height, bounds.width), false);
    for (k, (_, slice_mask)) in slice_masks.iter().enumerate() {
        mask.index_axis_mut(Axis(0), k).assign(slice_mask);
    }

    let (x0, y0) = (bounds.x as usize, bounds.y as usize);
    let (x1, y1) = (x0 + bounds.width, y0 + bounds.height);

    let channels = (1..=volume.nchannels())
        .map(|c| {
            let mut data = Array3::from_elem((depth, bounds.height, bounds.width), OUTSIDE);
            for (k, (z, slice_mask)) in slice_masks.iter().enumerate() {
                let plane = volume.plane(c, *z);
                let cropped = plane.slice(s![y0..y1, x0..x1]);
                let mut out = data.index_axis_mut(Axis(0), k);
                ndarray::Zip::from(&mut out)
                    .and(&cropped)
                    .and(slice_mask)
                    .for_each(|o, &v, &inside| {
                        if inside {
                            *o = v;
                        }
                    });
            }
            ChannelVolume::new(c, data)
        })
        .collect();

    trace!(
        "cropped cell {} to {:?} with {} of {} slices",
        cell.index(),
        bounds,
        depth,
        volume.depth()
    );

    Some(CellCrop {
        bounds,
        slices: slice_masks.into_iter().map(|(z, _)| z).collect(),
        mask,
        channels,
    })
}
