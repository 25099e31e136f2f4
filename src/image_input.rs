// Decoding source images into multi-channel volumes.

use image::{DynamicImage, ImageBuffer, Pixel};
use itertools::Itertools;
use log::{debug, trace};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use num_traits::AsPrimitive;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::{ColorType, TiffError};

use crate::coloc::volume::MultiChannelVolume;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("cannot decode {path}: {source}")]
    Tiff { path: PathBuf, source: TiffError },
    #[error("unsupported pixel format in {0}")]
    UnsupportedPixels(PathBuf),
    #[error("{path} has {nchannels} channel(s), at least 2 are required")]
    TooFewChannels { path: PathBuf, nchannels: usize },
    #[error("{path} has {nchannels} channel(s) but channel {channel} is selected")]
    MissingChannel {
        path: PathBuf,
        nchannels: usize,
        channel: usize,
    },
    #[error("stack {0} contains no images")]
    EmptyStack(PathBuf),
    #[error("slices of stack {0} differ in size or channel count")]
    InconsistentStack(PathBuf),
}

/// An image opened for analysis.
#[derive(Debug)]
pub struct OpenImage {
    pub path: PathBuf,
    pub base_name: String,
    pub volume: MultiChannelVolume,
}

pub trait ImageReader {
    fn open(&mut self, path: &Path) -> Result<OpenImage, InputError>;
}

/// Reads a single image file, or a directory of image files as a z-stack with
/// the slices of each file in name order. TIFF files may hold several slices,
/// one per page.
#[derive(Debug, Default)]
pub struct FileImageReader;

impl ImageReader for FileImageReader {
    fn open(&mut self, path: &Path) -> Result<OpenImage, InputError> {
        let channels = if path.is_dir() {
            read_stack(path)?
        } else {
            stack_slices(path, read_file(path)?)?
        };

        if channels.len() < 2 {
            return Err(InputError::TooFewChannels {
                path: path.to_path_buf(),
                nchannels: channels.len(),
            });
        }

        let volume = MultiChannelVolume::from_channels(&channels);
        debug!(
            "opened {}: {} channels, {} slices, {}x{}",
            path.display(),
            volume.nchannels(),
            volume.depth(),
            volume.width(),
            volume.height()
        );

        Ok(OpenImage {
            path: path.to_path_buf(),
            base_name: base_name(path),
            volume,
        })
    }
}

/// File name with its last extension stripped.
pub fn base_name(path: &Path) -> String {
    let name = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Inputs of a batch in processing order. A file is processed on its own; a
/// directory contributes its image files and sub-directories (as stacks),
/// sorted by name and filtered on file name by `pattern`.
pub fn list_inputs(input: &Path, pattern: Option<&Regex>) -> io::Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let inputs = sorted_entries(input)?
        .into_iter()
        .filter(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            !name.starts_with('.')
                && (path.is_dir() || is_image_file(path))
                && pattern.map(|re| re.is_match(&name)).unwrap_or(true)
        })
        .collect();

    Ok(inputs)
}

fn read_stack(dir: &Path) -> Result<Vec<Array3<f32>>, InputError> {
    let files: Vec<PathBuf> = sorted_entries(dir)
        .map_err(|source| InputError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .into_iter()
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();

    let mut slices = Vec::new();
    for file in &files {
        slices.extend(read_file(file)?);
    }
    trace!("stack {} has {} slices", dir.display(), slices.len());

    stack_slices(dir, slices)
}

// One plane per channel of a single z-slice.
type Slice = Vec<Array2<f32>>;

/// Stack slices into one `[z, y, x]` volume per channel.
fn stack_slices(path: &Path, slices: Vec<Slice>) -> Result<Vec<Array3<f32>>, InputError> {
    let Some(first) = slices.first() else {
        return Err(InputError::EmptyStack(path.to_path_buf()));
    };
    let nchannels = first.len();
    let shape = first.first().map(|plane| plane.dim());
    let consistent = slices.iter().all(|planes| {
        planes.len() == nchannels && planes.iter().all(|p| Some(p.dim()) == shape)
    });
    if !consistent {
        return Err(InputError::InconsistentStack(path.to_path_buf()));
    }

    (0..nchannels)
        .map(|c| {
            let views: Vec<ArrayView2<f32>> =
                slices.iter().map(|planes| planes[c].view()).collect();
            ndarray::stack(Axis(0), &views)
                .map_err(|_| InputError::InconsistentStack(path.to_path_buf()))
        })
        .collect()
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Decode every slice stored in one file.
fn read_file(path: &Path) -> Result<Vec<Slice>, InputError> {
    if is_tiff(path) {
        read_tiff(path)
    } else {
        Ok(vec![read_plane(path)?])
    }
}

/// Channel count of an ImageJ hyperstack, from its image description.
fn imagej_channels(description: &str) -> Option<usize> {
    if !description.starts_with("ImageJ=") {
        return None;
    }
    description
        .lines()
        .find_map(|line| line.strip_prefix("channels="))
        .and_then(|n| n.trim().parse().ok())
}

/// Every page of a TIFF file. Pages are z-slices with their samples as
/// channels, except in ImageJ hyperstacks of grayscale pages, where
/// consecutive pages are the channels of one slice.
fn read_tiff(path: &Path) -> Result<Vec<Slice>, InputError> {
    let tiff_error = |source: TiffError| InputError::Tiff {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_error)?;
    let hyperstack_channels = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .and_then(|description| imagej_channels(&description));

    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        let shape = (height as usize, width as usize);
        let (samples, keep) = match decoder.colortype().map_err(tiff_error)? {
            ColorType::Gray(_) => (1, 1),
            ColorType::GrayA(_) => (2, 1),
            ColorType::RGB(_) => (3, 3),
            ColorType::RGBA(_) => (4, 3),
            _ => return Err(InputError::UnsupportedPixels(path.to_path_buf())),
        };

        let page = match decoder.read_image().map_err(tiff_error)? {
            DecodingResult::U8(data) => deinterleave(&data, shape, samples, keep),
            DecodingResult::U16(data) => deinterleave(&data, shape, samples, keep),
            DecodingResult::U32(data) => deinterleave(&data, shape, samples, keep),
            DecodingResult::F32(data) => deinterleave(&data, shape, samples, keep),
            DecodingResult::F64(data) => deinterleave(&data, shape, samples, keep),
            _ => None,
        }
        .ok_or_else(|| InputError::UnsupportedPixels(path.to_path_buf()))?;
        pages.push(page);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(tiff_error)?;
    }
    trace!("{}: {} pages", path.display(), pages.len());

    match hyperstack_channels {
        Some(nchannels)
            if nchannels > 1
                && pages.len() % nchannels == 0
                && pages.iter().all(|page| page.len() == 1) =>
        {
            let grouped = pages.into_iter().chunks(nchannels);
            let slices: Vec<Slice> = grouped
                .into_iter()
                .map(|channels| channels.flatten().collect::<Slice>())
                .collect();
            Ok(slices)
        }
        _ => Ok(pages),
    }
}

// Split interleaved samples into one plane per kept sample. `None` if the
// buffer does not hold `samples` values per pixel.
fn deinterleave<T>(
    data: &[T],
    shape: (usize, usize),
    samples: usize,
    keep: usize,
) -> Option<Slice>
where
    T: Copy + AsPrimitive<f32>,
{
    let (height, width) = shape;
    if data.len() != height * width * samples {
        return None;
    }
    let planes = (0..keep)
        .map(|c| {
            Array2::from_shape_fn(shape, |(y, x)| data[(y * width + x) * samples + c].as_())
        })
        .collect();
    Some(planes)
}

/// Decode one file into one plane per colour channel. Alpha is dropped.
fn read_plane(path: &Path) -> Result<Slice, InputError> {
    let img = image::open(path).map_err(|source| InputError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let planes = match img {
        DynamicImage::ImageLuma8(buf) => split_channels(&buf, 1),
        DynamicImage::ImageLumaA8(buf) => split_channels(&buf, 1),
        DynamicImage::ImageRgb8(buf) => split_channels(&buf, 3),
        DynamicImage::ImageRgba8(buf) => split_channels(&buf, 3),
        DynamicImage::ImageLuma16(buf) => split_channels(&buf, 1),
        DynamicImage::ImageLumaA16(buf) => split_channels(&buf, 1),
        DynamicImage::ImageRgb16(buf) => split_channels(&buf, 3),
        DynamicImage::ImageRgba16(buf) => split_channels(&buf, 3),
        DynamicImage::ImageRgb32F(buf) => split_channels(&buf, 3),
        DynamicImage::ImageRgba32F(buf) => split_channels(&buf, 3),
        _ => return Err(InputError::UnsupportedPixels(path.to_path_buf())),
    };

    Ok(planes)
}

fn split_channels<P>(buf: &ImageBuffer<P, Vec<P::Subpixel>>, nchannels: usize) -> Slice
where
    P: Pixel,
    P::Subpixel: Into<f32>,
{
    let (width, height) = buf.dimensions();
    (0..nchannels)
        .map(|c| {
            Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
                buf.get_pixel(x as u32, y as u32).channels()[c].into()
            })
        })
        .collect()
}
