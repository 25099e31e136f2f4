// Per-cell crop images, saved as ImageJ-style TIFF hyperstacks: one 32-bit
// float page per channel per slice, channels varying fastest.

use log::trace;
use ndarray::{Array2, Array3, ArrayView3, Axis};
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::path::PathBuf;
use thiserror::Error;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::TiffError;

use crate::coloc::CellAnalysis;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot encode {path}: {source}")]
    Encode { path: PathBuf, source: TiffError },
}

pub fn artifact_name(cell: usize, base_name: &str, thresholded: bool) -> String {
    let tag = if thresholded { "_thrd" } else { "" };
    format!("Cell_{}{}-{}.tif", cell, tag, base_name)
}

/// Channel planes of a cropped cell in page order.
#[derive(Clone, Debug, PartialEq)]
pub struct Hyperstack {
    nchannels: usize,
    nslices: usize,
    height: usize,
    width: usize,
    pages: Vec<Array2<f32>>,
}

impl Hyperstack {
    /// Panics if the channels differ in shape.
    pub fn from_channels(channels: &[ArrayView3<f32>]) -> Self {
        let (nslices, height, width) = channels.first().map(|c| c.dim()).unwrap_or((0, 0, 0));
        for channel in channels {
            assert_eq!(channel.dim(), (nslices, height, width), "channels differ in shape");
        }

        let pages = (0..nslices)
            .flat_map(|z| {
                channels
                    .iter()
                    .map(move |channel| channel.index_axis(Axis(0), z).to_owned())
            })
            .collect();

        Hyperstack {
            nchannels: channels.len(),
            nslices,
            height,
            width,
            pages,
        }
    }

    pub fn nchannels(&self) -> usize {
        self.nchannels
    }

    pub fn nslices(&self) -> usize {
        self.nslices
    }

    /// Plane of 0-based `channel` on slice `z`.
    pub fn page(&self, channel: usize, z: usize) -> &Array2<f32> {
        &self.pages[z * self.nchannels + channel]
    }

    fn description(&self) -> String {
        format!(
            concat!(
                "ImageJ=1.11a\nimages={}\nchannels={}\nslices={}\n",
                "frames=1\nhyperstack=true\nmode=composite\n"
            ),
            self.pages.len(),
            self.nchannels,
            self.nslices
        )
    }

    pub fn write<W: Write + Seek>(&self, writer: W) -> Result<(), TiffError> {
        let mut encoder = TiffEncoder::new(writer)?;
        for (i, page) in self.pages.iter().enumerate() {
            let mut image =
                encoder.new_image::<colortype::Gray32Float>(self.width as u32, self.height as u32)?;
            if i == 0 {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, self.description().as_str())?;
            }
            let data: Vec<f32> = page.iter().copied().collect();
            image.write_data(&data)?;
        }
        Ok(())
    }
}

/// Raw crop of every channel, and the binarized analyzed channels. A channel
/// without a cutoff is written as an empty (all background) channel.
pub fn cell_artifacts(analysis: &CellAnalysis) -> (Hyperstack, Hyperstack) {
    let raw: Vec<ArrayView3<f32>> = analysis.crop.channels.iter().map(|v| v.view()).collect();

    let background = Array3::<f32>::zeros(analysis.crop.mask.dim());
    let thresholded: Vec<ArrayView3<f32>> = analysis
        .thresholds
        .iter()
        .map(|(_, t)| match t {
            Some(t) => t.binarized.view(),
            None => background.view(),
        })
        .collect();

    (
        Hyperstack::from_channels(&raw),
        Hyperstack::from_channels(&thresholded),
    )
}

pub trait ArtifactSink {
    fn save(&mut self, name: &str, stack: &Hyperstack) -> Result<(), ArtifactError>;
}

/// Writes artifacts as files in one directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: PathBuf) -> Result<Self, ArtifactError> {
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(DirectorySink { dir })
    }
}

impl ArtifactSink for DirectorySink {
    fn save(&mut self, name: &str, stack: &Hyperstack) -> Result<(), ArtifactError> {
        let path = self.dir.join(name);
        trace!("writing {}", path.display());
        let file = File::create(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        stack
            .write(&mut writer)
            .map_err(|source| ArtifactError::Encode {
                path: path.clone(),
                source,
            })?;
        writer
            .flush()
            .map_err(|source| ArtifactError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_input::{FileImageReader, ImageReader};
    use tempfile::TempDir;

    fn ramp(offset: f32) -> Array3<f32> {
        Array3::from_shape_fn((2, 3, 4), |(z, y, x)| offset + (z * 100 + y * 10 + x) as f32)
    }

    #[test]
    fn test_names() {
        assert_eq!(artifact_name(3, "sample", false), "Cell_3-sample.tif");
        assert_eq!(artifact_name(12, "a.b", true), "Cell_12_thrd-a.b.tif");
    }

    #[test]
    fn test_pages_interleave_channels() {
        let a = ramp(0.0);
        let b = ramp(0.5);
        let stack = Hyperstack::from_channels(&[a.view(), b.view()]);

        assert_eq!(stack.nchannels(), 2);
        assert_eq!(stack.nslices(), 2);
        assert_eq!(stack.pages.len(), 4);
        assert_eq!(stack.pages[1][[0, 0]], 0.5);
        assert_eq!(stack.pages[2][[0, 0]], 100.0);
        assert_eq!(stack.page(1, 1)[[2, 3]], 123.5);
    }

    #[test]
    #[should_panic]
    fn test_mismatched_channels_panic() {
        let a = ramp(0.0);
        let b = Array3::<f32>::zeros((1, 3, 4));
        Hyperstack::from_channels(&[a.view(), b.view()]);
    }

    #[test]
    fn test_directory_sink_keeps_raw_intensities() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("artifacts");
        let mut sink = DirectorySink::new(out.clone()).unwrap();

        let a = ramp(4000.25);
        let b = ramp(0.0);
        let c = ramp(7.0);
        let stack = Hyperstack::from_channels(&[a.view(), b.view(), c.view()]);
        sink.save("Cell_1-x.tif", &stack).unwrap();

        let back = FileImageReader.open(&out.join("Cell_1-x.tif")).unwrap();
        assert_eq!(back.volume.nchannels(), 3);
        assert_eq!(back.volume.depth(), 2);
        assert_eq!(back.volume.width(), 4);
        assert_eq!(back.volume.height(), 3);
        assert_eq!(back.volume.channel(1), a.view());
        assert_eq!(back.volume.channel(3), c.view());
    }
}
