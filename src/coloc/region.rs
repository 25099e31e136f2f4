// Cells and the regions that delimit them, one region per z-slice or a single
// region shared by every slice of the stack.

use geo::geometry::{LineString, MultiPolygon, Point, Polygon, Rect};
use geo::{BooleanOps, BoundingRect, Contains, Translate};
use ndarray::Array2;
use thiserror::Error;

/// A closed 2D shape in the pixel frame of an image.
///
/// A pixel `(x, y)` belongs to the region when its centre `(x + 0.5, y + 0.5)`
/// lies inside the shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Region(MultiPolygon<f64>);

impl Region {
    pub fn new(shape: MultiPolygon<f64>) -> Region {
        Region(shape)
    }

    pub fn from_polygon(polygon: Polygon<f64>) -> Region {
        Region(MultiPolygon::new(vec![polygon]))
    }

    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Region {
        Region::from_polygon(Polygon::new(
            LineString::from(vec![
                (x, y),
                (x + width, y),
                (x + width, y + height),
                (x, y + height),
                (x, y),
            ]),
            Vec::new(),
        ))
    }

    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.0
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.0.bounding_rect()
    }

    pub fn union(&self, other: &Region) -> Region {
        Region(self.0.union(&other.0))
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Region {
        Region(self.0.translate(dx, dy))
    }

    pub fn contains_pixel(&self, x: usize, y: usize) -> bool {
        self.0
            .contains(&Point::new(x as f64 + 0.5, y as f64 + 0.5))
    }

    // Rasterize into a `[height, width]` mask whose origin is the origin of
    // the region's coordinate frame.
    pub fn mask(&self, width: usize, height: usize) -> Array2<bool> {
        let mut mask = Array2::from_elem((height, width), false);
        let Some(bounds) = self.bounds() else {
            return mask;
        };

        // only pixels whose centre can fall inside the bounding box
        let x0 = (bounds.min().x - 0.5).ceil().max(0.0) as usize;
        let y0 = (bounds.min().y - 0.5).ceil().max(0.0) as usize;
        let x1 = ((bounds.max().x - 0.5).floor() + 1.0).clamp(0.0, width as f64) as usize;
        let y1 = ((bounds.max().y - 0.5).floor() + 1.0).clamp(0.0, height as f64) as usize;

        for y in y0..y1 {
            for x in x0..x1 {
                mask[[y, x]] = self.contains_pixel(x, y);
            }
        }

        mask
    }
}

/// Shift a region by `(dx, dy)`. Used to move a region from the full image
/// frame into the frame of a crop with `dx = -crop.x, dy = -crop.y`.
pub fn translate(region: &Region, dx: f64, dy: f64) -> Region {
    region.translate(dx, dy)
}

/// Axis-aligned integer rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropBounds {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl CropBounds {
    // Expand real valued bounds outward to whole pixels.
    pub fn from_rect(rect: Rect<f64>) -> CropBounds {
        let x0 = rect.min().x.floor() as i64;
        let y0 = rect.min().y.floor() as i64;
        let x1 = rect.max().x.ceil() as i64;
        let y1 = rect.max().y.ceil() as i64;

        CropBounds {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as usize,
            height: (y1 - y0).max(0) as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersect with the `[0, width) x [0, height)` image frame. Returns
    /// `None` when nothing is left.
    pub fn clamp(&self, width: usize, height: usize) -> Option<CropBounds> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(width as i64);
        let y1 = (self.y + self.height as i64).min(height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(CropBounds {
            x: x0,
            y: y0,
            width: (x1 - x0) as usize,
            height: (y1 - y0) as usize,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CellRegions {
    PerSlice(Vec<Option<Region>>),
    SinglePlane(Option<Region>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CellStatus {
    // no region anywhere
    Empty,
    // some but not all slots set
    Incomplete,
    Defined,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegionError {
    #[error("slice {z} is out of range for a cell with {nslices} slices")]
    SliceOutOfRange { z: usize, nslices: usize },
    #[error("cell {0} has a single region for the whole stack")]
    SinglePlaneCell(usize),
    #[error("cell {0} has one region per slice")]
    PerSliceCell(usize),
    #[error("no cell with index {0}")]
    NoSuchCell(usize),
    #[error("cell index {index} does not follow {last}")]
    OutOfOrder { index: usize, last: usize },
}

/// One biological object of interest.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    index: usize,
    regions: CellRegions,
}

impl Cell {
    pub fn per_slice(index: usize, nslices: usize) -> Cell {
        Cell {
            index,
            regions: CellRegions::PerSlice(vec![None; nslices]),
        }
    }

    pub fn single_plane(index: usize) -> Cell {
        Cell {
            index,
            regions: CellRegions::SinglePlane(None),
        }
    }

    /// 1-based ordinal of the cell within its image.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn regions(&self) -> &CellRegions {
        &self.regions
    }

    /// Set the region of slice `z` (0-based) of a per-slice cell, returning
    /// the region it replaces.
    pub fn set_slice_region(
        &mut self,
        z: usize,
        region: Region,
    ) -> Result<Option<Region>, RegionError> {
        match &mut self.regions {
            CellRegions::PerSlice(slices) => {
                let nslices = slices.len();
                let slot = slices
                    .get_mut(z)
                    .ok_or(RegionError::SliceOutOfRange { z, nslices })?;
                Ok(slot.replace(region))
            }
            CellRegions::SinglePlane(_) => Err(RegionError::SinglePlaneCell(self.index)),
        }
    }

    /// Set the region of a single-plane cell, returning the region it replaces.
    pub fn set_plane_region(&mut self, region: Region) -> Result<Option<Region>, RegionError> {
        match &mut self.regions {
            CellRegions::SinglePlane(slot) => Ok(slot.replace(region)),
            CellRegions::PerSlice(_) => Err(RegionError::PerSliceCell(self.index)),
        }
    }

    /// Region that applies to slice `z` (0-based).
    pub fn region_for_slice(&self, z: usize) -> Option<&Region> {
        match &self.regions {
            CellRegions::PerSlice(slices) => slices.get(z).and_then(|r| r.as_ref()),
            CellRegions::SinglePlane(region) => region.as_ref(),
        }
    }

    pub fn status(&self) -> CellStatus {
        let (present, required) = match &self.regions {
            CellRegions::PerSlice(slices) => {
                (slices.iter().filter(|r| r.is_some()).count(), slices.len())
            }
            CellRegions::SinglePlane(region) => (region.is_some() as usize, 1),
        };

        if present == 0 {
            CellStatus::Empty
        } else if present < required {
            CellStatus::Incomplete
        } else {
            CellStatus::Defined
        }
    }

    pub fn is_defined(&self) -> bool {
        self.status() == CellStatus::Defined
    }

    /// Union of every region present in the cell.
    pub fn crop_region(&self) -> Option<Region> {
        match &self.regions {
            CellRegions::PerSlice(slices) => {
                slices.iter().flatten().fold(None, |crop: Option<Region>, region| {
                    Some(match crop {
                        None => region.clone(),
                        Some(crop) => crop.union(region),
                    })
                })
            }
            CellRegions::SinglePlane(region) => region.clone(),
        }
    }

    /// Bounding rectangle of the union of the present regions, or `None` if
    /// the cell has no region at all.
    pub fn union_bounds(&self) -> Option<CropBounds> {
        self.crop_region()
            .and_then(|region| region.bounds())
            .map(CropBounds::from_rect)
    }
}

pub fn union_bounds(cell: &Cell) -> Option<CropBounds> {
    cell.union_bounds()
}

pub fn is_defined(cell: &Cell) -> bool {
    cell.is_defined()
}

/// The cells of one image, in creation order, while their regions are being
/// drawn.
#[derive(Clone, Debug)]
pub struct CellSet {
    nslices: usize,
    cells: Vec<Cell>,
}

impl CellSet {
    pub fn new(nslices: usize) -> CellSet {
        CellSet {
            nslices,
            cells: Vec::new(),
        }
    }

    pub fn nslices(&self) -> usize {
        self.nslices
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn next_index(&self) -> usize {
        self.cells.last().map(|cell| cell.index + 1).unwrap_or(1)
    }

    /// Add an empty cell and return its ordinal, one past the last cell's.
    pub fn add_cell(&mut self, single_plane: bool) -> usize {
        let index = self.next_index();
        let cell = if single_plane {
            Cell::single_plane(index)
        } else {
            Cell::per_slice(index, self.nslices)
        };
        self.cells.push(cell);
        index
    }

    /// Append an already built cell. Ordinals must increase.
    pub fn push(&mut self, cell: Cell) -> Result<(), RegionError> {
        if let Some(last) = self.cells.last() {
            if cell.index <= last.index {
                return Err(RegionError::OutOfOrder {
                    index: cell.index,
                    last: last.index,
                });
            }
        }
        self.cells.push(cell);
        Ok(())
    }

    pub fn remove_cell(&mut self, index: usize) -> Result<Cell, RegionError> {
        let pos = self.position(index)?;
        Ok(self.cells.remove(pos))
    }

    pub fn set_slice_region(
        &mut self,
        index: usize,
        z: usize,
        region: Region,
    ) -> Result<Option<Region>, RegionError> {
        let pos = self.position(index)?;
        let cell = &mut self.cells[pos];
        match cell.regions {
            CellRegions::PerSlice(_) => cell.set_slice_region(z, region),
            CellRegions::SinglePlane(_) => cell.set_plane_region(region),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.index == index)
    }

    fn position(&self, index: usize) -> Result<usize, RegionError> {
        self.cells
            .iter()
            .position(|cell| cell.index == index)
            .ok_or(RegionError::NoSuchCell(index))
    }

    /// Stop editing and hand the cells over in creation order.
    pub fn finalize(self) -> Vec<Cell> {
        self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_bounds() {
        let region = Region::rect(10.0, 12.0, 10.0, 5.0);
        let bounds = CropBounds::from_rect(region.bounds().unwrap());
        assert_eq!(
            bounds,
            CropBounds {
                x: 10,
                y: 12,
                width: 10,
                height: 5
            }
        );
    }

    #[test]
    fn test_fractional_bounds_expand_outward() {
        let region = Region::rect(2.5, 3.25, 4.0, 1.5);
        let bounds = CropBounds::from_rect(region.bounds().unwrap());
        assert_eq!((bounds.x, bounds.y, bounds.width, bounds.height), (2, 3, 5, 2));
    }

    #[test]
    fn test_identical_slices_bounds_equal_region_bounds() {
        let region = Region::rect(4.0, 6.0, 8.0, 8.0);
        let mut cell = Cell::per_slice(1, 5);
        for z in 0..5 {
            cell.set_slice_region(z, region.clone()).unwrap();
        }

        assert!(cell.is_defined());
        assert_eq!(
            cell.union_bounds(),
            Some(CropBounds::from_rect(region.bounds().unwrap()))
        );
    }

    #[test]
    fn test_union_bounds_covers_all_slices() {
        let mut cell = Cell::per_slice(1, 3);
        cell.set_slice_region(0, Region::rect(0.0, 0.0, 4.0, 4.0)).unwrap();
        cell.set_slice_region(2, Region::rect(10.0, 20.0, 5.0, 5.0)).unwrap();

        assert_eq!(cell.status(), CellStatus::Incomplete);
        assert!(!is_defined(&cell));
        assert_eq!(
            union_bounds(&cell),
            Some(CropBounds {
                x: 0,
                y: 0,
                width: 15,
                height: 25
            })
        );
    }

    #[test]
    fn test_empty_cell_has_no_bounds() {
        let cell = Cell::per_slice(1, 4);
        assert_eq!(cell.status(), CellStatus::Empty);
        assert_eq!(cell.union_bounds(), None);

        let cell = Cell::single_plane(2);
        assert_eq!(cell.union_bounds(), None);
        assert!(!cell.is_defined());
    }

    #[test]
    fn test_single_plane_applies_to_every_slice() {
        let mut cell = Cell::single_plane(1);
        let region = Region::rect(1.0, 1.0, 2.0, 2.0);
        assert_eq!(cell.set_plane_region(region.clone()), Ok(None));
        assert!(cell.is_defined());
        assert_eq!(cell.region_for_slice(0), Some(&region));
        assert_eq!(cell.region_for_slice(41), Some(&region));
        assert_eq!(
            cell.set_slice_region(0, region),
            Err(RegionError::SinglePlaneCell(1))
        );
    }

    #[test]
    fn test_replacing_region_returns_previous() {
        let mut cell = Cell::per_slice(3, 2);
        let a = Region::rect(0.0, 0.0, 1.0, 1.0);
        let b = Region::rect(5.0, 5.0, 1.0, 1.0);
        assert_eq!(cell.set_slice_region(1, a.clone()), Ok(None));
        assert_eq!(cell.set_slice_region(1, b.clone()), Ok(Some(a)));
        assert_eq!(cell.region_for_slice(1), Some(&b));
        assert_eq!(
            cell.set_slice_region(2, b),
            Err(RegionError::SliceOutOfRange { z: 2, nslices: 2 })
        );
    }

    #[test]
    fn test_translate() {
        let region = Region::rect(10.0, 20.0, 3.0, 3.0);
        let moved = translate(&region, -10.0, -20.0);
        let bounds = moved.bounds().unwrap();
        assert_eq!((bounds.min().x, bounds.min().y), (0.0, 0.0));
        assert_eq!((bounds.max().x, bounds.max().y), (3.0, 3.0));
    }

    #[test]
    fn test_mask_uses_pixel_centres() {
        // triangle covering the lower-left half of a 4x4 square
        let triangle = Region::from_polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (0.0, 0.0)]),
            Vec::new(),
        ));
        let mask = triangle.mask(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(mask[[y, x]], x < y, "pixel ({}, {})", x, y);
            }
        }

        let square = Region::rect(1.0, 1.0, 2.0, 2.0);
        assert_eq!(square.mask(4, 4).iter().filter(|&&m| m).count(), 4);
    }

    #[test]
    fn test_clamp() {
        let bounds = CropBounds {
            x: -3,
            y: 2,
            width: 10,
            height: 10,
        };
        assert_eq!(
            bounds.clamp(5, 8),
            Some(CropBounds {
                x: 0,
                y: 2,
                width: 5,
                height: 6
            })
        );
        let outside = CropBounds {
            x: 20,
            y: 0,
            width: 4,
            height: 4,
        };
        assert_eq!(outside.clamp(5, 8), None);
    }

    #[test]
    fn test_cell_set_ordinals() {
        let mut cells = CellSet::new(3);
        assert_eq!(cells.add_cell(false), 1);
        assert_eq!(cells.add_cell(false), 2);
        assert_eq!(cells.add_cell(true), 3);

        cells.remove_cell(2).unwrap();
        assert_eq!(cells.add_cell(false), 4);
        assert_eq!(cells.remove_cell(2), Err(RegionError::NoSuchCell(2)));

        cells
            .set_slice_region(3, 0, Region::rect(0.0, 0.0, 2.0, 2.0))
            .unwrap();
        assert!(cells.get(3).unwrap().is_defined());

        let indices: Vec<usize> = cells.finalize().iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec![1, 3, 4]);
    }

    #[test]
    fn test_push_requires_increasing_index() {
        let mut cells = CellSet::new(1);
        cells.push(Cell::single_plane(2)).unwrap();
        assert_eq!(
            cells.push(Cell::single_plane(2)),
            Err(RegionError::OutOfOrder { index: 2, last: 2 })
        );
        cells.push(Cell::single_plane(7)).unwrap();
        assert_eq!(cells.len(), 2);
    }
}
