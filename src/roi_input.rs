// Cell regions drawn for an image, read from a GeoJSON sidecar file.

use flate2::read::GzDecoder;
use geo::geometry::{Coord, LineString, MultiPolygon, Polygon};
use json::JsonValue;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::coloc::region::{Cell, CellSet, Region, RegionError};
use crate::image_input::OpenImage;

#[derive(Debug, Error)]
pub enum RoiError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot parse {path}: {source}")]
    Parse { path: PathBuf, source: json::Error },
    #[error("{path}, feature {feature}: {reason}")]
    Malformed {
        path: PathBuf,
        feature: usize,
        reason: String,
    },
    #[error("{path}: {source}")]
    Region { path: PathBuf, source: RegionError },
    #[error("ROI entry was cancelled")]
    Cancelled,
}

/// Supplies the finalized cells of an image. Blocks until the regions are
/// complete; `RoiError::Cancelled` aborts the whole batch.
pub trait RoiSource {
    fn finalize_rois(&mut self, image: &OpenImage) -> Result<CellSet, RoiError>;
}

/// Reads `<base>.geojson` (or `<base>.geojson.gz`) from `roi_dir`, or from
/// the image's own directory when `roi_dir` is unset.
///
/// Each feature is a `Polygon` or `MultiPolygon` in pixel coordinates with an
/// integer `cell` property (1-based) and an optional `slice` property
/// (1-based). Cells without `slice` have one region for the whole stack.
/// Features repeating a cell and slice are merged. A missing file means no
/// cells were drawn.
#[derive(Debug, Default)]
pub struct GeoJsonRoiSource {
    roi_dir: Option<PathBuf>,
}

impl GeoJsonRoiSource {
    pub fn new(roi_dir: Option<PathBuf>) -> Self {
        GeoJsonRoiSource { roi_dir }
    }

    fn sidecar(&self, image: &OpenImage) -> Option<PathBuf> {
        let dir = match &self.roi_dir {
            Some(dir) => dir.clone(),
            None => image
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        [".geojson", ".geojson.gz"]
            .iter()
            .map(|ext| dir.join(format!("{}{}", image.base_name, ext)))
            .find(|path| path.is_file())
    }
}

impl RoiSource for GeoJsonRoiSource {
    fn finalize_rois(&mut self, image: &OpenImage) -> Result<CellSet, RoiError> {
        let nslices = image.volume.depth();
        let Some(path) = self.sidecar(image) else {
            info!("no ROIs for {}", image.base_name);
            return Ok(CellSet::new(nslices));
        };

        let data = read_geojson(&path)?;
        let cells = parse_cells(&data, nslices).map_err(|err| err.at(&path))?;
        debug!("read {} cells from {}", cells.len(), path.display());
        Ok(cells)
    }
}

fn read_geojson(path: &Path) -> Result<JsonValue, RoiError> {
    let io_err = |source| RoiError::Io {
        path: path.to_path_buf(),
        source,
    };

    let input = File::open(path).map_err(io_err)?;
    let mut content = String::new();
    if path.extension().map(|ext| ext == "gz").unwrap_or(false) {
        GzDecoder::new(input)
            .read_to_string(&mut content)
            .map_err(io_err)?;
    } else {
        let mut input = input;
        input.read_to_string(&mut content).map_err(io_err)?;
    }

    json::parse(&content).map_err(|source| RoiError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// Parse failure not yet tied to a file.
#[derive(Debug)]
enum FeatureError {
    Malformed { feature: usize, reason: String },
    Region(RegionError),
}

impl FeatureError {
    fn at(self, path: &Path) -> RoiError {
        let path = path.to_path_buf();
        match self {
            FeatureError::Malformed { feature, reason } => RoiError::Malformed {
                path,
                feature,
                reason,
            },
            FeatureError::Region(source) => RoiError::Region { path, source },
        }
    }
}

fn malformed(feature: usize, reason: impl Into<String>) -> FeatureError {
    FeatureError::Malformed {
        feature,
        reason: reason.into(),
    }
}

fn parse_cells(data: &JsonValue, nslices: usize) -> Result<CellSet, FeatureError> {
    let features = &data["features"];
    if !features.is_array() {
        return Err(malformed(0, "expected a FeatureCollection"));
    }

    // (cell, slice) -> merged region, slice None for single-plane cells
    let mut regions: BTreeMap<(usize, Option<usize>), Region> = BTreeMap::new();
    for (i, feature) in features.members().enumerate() {
        let properties = &feature["properties"];
        let cell = properties["cell"]
            .as_usize()
            .filter(|&c| c > 0)
            .ok_or_else(|| malformed(i, "missing or invalid cell property"))?;
        let slice = if properties["slice"].is_null() {
            None
        } else {
            let slice = properties["slice"]
                .as_usize()
                .filter(|&s| s > 0)
                .ok_or_else(|| malformed(i, "invalid slice property"))?;
            Some(slice - 1)
        };

        let region = parse_geometry(&feature["geometry"]).map_err(|reason| malformed(i, reason))?;
        let merged = match regions.remove(&(cell, slice)) {
            Some(previous) => previous.union(&region),
            None => region,
        };
        regions.insert((cell, slice), merged);
    }

    let mut cells = CellSet::new(nslices);
    let mut current: Option<Cell> = None;
    for ((index, slice), region) in regions {
        if current.as_ref().map(|cell| cell.index()) != Some(index) {
            if let Some(cell) = current.take() {
                cells.push(cell).map_err(FeatureError::Region)?;
            }
            current = Some(match slice {
                Some(_) => Cell::per_slice(index, nslices),
                None => Cell::single_plane(index),
            });
        }

        if let Some(cell) = current.as_mut() {
            match slice {
                Some(z) => cell.set_slice_region(z, region),
                None => cell.set_plane_region(region),
            }
            .map_err(FeatureError::Region)?;
        }
    }
    if let Some(cell) = current {
        cells.push(cell).map_err(FeatureError::Region)?;
    }

    Ok(cells)
}

fn parse_ring(ring: &JsonValue) -> Result<LineString<f64>, String> {
    let coords = ring
        .members()
        .map(|xy| match (xy[0].as_f64(), xy[1].as_f64()) {
            (Some(x), Some(y)) => Ok(Coord { x, y }),
            _ => Err("invalid coordinate".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if coords.len() < 3 {
        return Err("ring has fewer than three points".to_string());
    }
    Ok(LineString::new(coords))
}

fn parse_polygon(rings: &JsonValue) -> Result<Polygon<f64>, String> {
    let mut rings = rings.members();
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon without rings".to_string())
        .and_then(parse_ring)?;
    let interiors = rings.map(parse_ring).collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_geometry(geometry: &JsonValue) -> Result<Region, String> {
    let coordinates = &geometry["coordinates"];
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(Region::from_polygon(parse_polygon(coordinates)?)),
        Some("MultiPolygon") => {
            let polygons = coordinates
                .members()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Region::new(MultiPolygon::new(polygons)))
        }
        Some(other) => Err(format!("unsupported geometry type {}", other)),
        None => Err("missing geometry".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coloc::region::{CellRegions, CellStatus, CropBounds};
    use crate::coloc::volume::MultiChannelVolume;
    use ndarray::Array4;
    use std::fs;
    use tempfile::TempDir;

    fn square(x: f64, y: f64, size: f64) -> JsonValue {
        json::array![json::array![
            json::array![x, y],
            json::array![x + size, y],
            json::array![x + size, y + size],
            json::array![x, y + size],
            json::array![x, y]
        ]]
    }

    fn feature(cell: usize, slice: Option<usize>, coordinates: JsonValue) -> JsonValue {
        let mut properties = json::object! { cell: cell };
        if let Some(slice) = slice {
            properties["slice"] = slice.into();
        }
        json::object! {
            "type": "Feature",
            properties: properties,
            geometry: json::object! { "type": "Polygon", coordinates: coordinates },
        }
    }

    fn collection(features: Vec<JsonValue>) -> JsonValue {
        json::object! { "type": "FeatureCollection", features: features }
    }

    fn open_image(dir: &Path, base_name: &str, nslices: usize) -> OpenImage {
        OpenImage {
            path: dir.join(format!("{}.tif", base_name)),
            base_name: base_name.to_string(),
            volume: MultiChannelVolume::new(Array4::zeros((2, nslices, 16, 16))),
        }
    }

    #[test]
    fn test_per_slice_and_single_plane_cells() {
        let data = collection(vec![
            feature(2, None, square(1.0, 1.0, 4.0)),
            feature(1, Some(1), square(0.0, 0.0, 2.0)),
            feature(1, Some(2), square(3.0, 3.0, 2.0)),
        ]);
        let cells = parse_cells(&data, 2).unwrap().finalize();

        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].index(), 1);
        assert_eq!(cells[0].status(), CellStatus::Defined);
        assert!(matches!(cells[0].regions(), CellRegions::PerSlice(_)));
        assert_eq!(
            cells[0].union_bounds(),
            Some(CropBounds {
                x: 0,
                y: 0,
                width: 5,
                height: 5
            })
        );
        assert!(matches!(cells[1].regions(), CellRegions::SinglePlane(Some(_))));
    }

    #[test]
    fn test_partial_cell_keeps_ordinal() {
        let data = collection(vec![
            feature(3, Some(1), square(0.0, 0.0, 2.0)),
            feature(1, None, square(0.0, 0.0, 2.0)),
        ]);
        let cells = parse_cells(&data, 3).unwrap().finalize();
        assert_eq!(cells[1].index(), 3);
        assert_eq!(cells[1].status(), CellStatus::Incomplete);
    }

    #[test]
    fn test_repeated_features_are_merged() {
        let data = collection(vec![
            feature(1, None, square(0.0, 0.0, 2.0)),
            feature(1, None, square(6.0, 6.0, 2.0)),
        ]);
        let cells = parse_cells(&data, 1).unwrap().finalize();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].union_bounds().map(|b| b.width), Some(8));
    }

    #[test]
    fn test_malformed_input() {
        let mixed = collection(vec![
            feature(1, None, square(0.0, 0.0, 2.0)),
            feature(1, Some(1), square(0.0, 0.0, 2.0)),
        ]);
        assert!(matches!(
            parse_cells(&mixed, 2),
            Err(FeatureError::Region(RegionError::SinglePlaneCell(1)))
        ));

        let deep = collection(vec![feature(1, Some(4), square(0.0, 0.0, 2.0))]);
        assert!(matches!(
            parse_cells(&deep, 2),
            Err(FeatureError::Region(RegionError::SliceOutOfRange { .. }))
        ));

        let no_cell = collection(vec![json::object! {
            "type": "Feature",
            properties: json::object! {},
            geometry: json::object! { "type": "Polygon", coordinates: square(0.0, 0.0, 1.0) },
        }]);
        assert!(matches!(
            parse_cells(&no_cell, 1),
            Err(FeatureError::Malformed { feature: 0, .. })
        ));

        let point = collection(vec![json::object! {
            "type": "Feature",
            properties: json::object! { cell: 1 },
            geometry: json::object! { "type": "Point", coordinates: json::array![1.0, 1.0] },
        }]);
        assert!(parse_cells(&point, 1).is_err());
    }

    #[test]
    fn test_sidecar_lookup() {
        let dir = TempDir::new().unwrap();
        let image = open_image(dir.path(), "sample", 1);

        let mut source = GeoJsonRoiSource::default();
        assert!(source.finalize_rois(&image).unwrap().is_empty());

        let data = collection(vec![feature(1, None, square(2.0, 2.0, 3.0))]);
        fs::write(dir.path().join("sample.geojson"), data.dump()).unwrap();
        let cells = source.finalize_rois(&image).unwrap();
        assert_eq!(cells.len(), 1);

        let roi_dir = TempDir::new().unwrap();
        fs::write(roi_dir.path().join("sample.geojson"), "{ not json").unwrap();
        let mut source = GeoJsonRoiSource::new(Some(roi_dir.path().to_path_buf()));
        assert!(matches!(
            source.finalize_rois(&image),
            Err(RoiError::Parse { .. })
        ));
    }
}
