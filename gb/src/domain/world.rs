//! World grid
//!
//! A fixed-size toroidal grid of cells stored row-major as bytes. A byte of
//! 255 is ALIVE, anything else is DEAD, matching the image format consumed by
//! the grid I/O collaborator.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::band::{Band, BandSlice};

/// Byte value of a live cell
pub const ALIVE: u8 = 255;

/// Byte value of a dead cell
pub const DEAD: u8 = 0;

/// Errors from constructing or combining grids
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("Grid dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions { width: usize, height: usize },

    #[error("Expected {expected} cells for a {width}x{height} grid, got {actual}")]
    CellCount {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Ragged pattern: row {row} has {actual} columns, expected {expected}")]
    RaggedPattern { row: usize, expected: usize, actual: usize },
}

/// State of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Dead,
    Alive,
}

impl Cell {
    /// Decode an image byte; only 255 is alive
    pub fn from_byte(byte: u8) -> Self {
        if byte == ALIVE { Cell::Alive } else { Cell::Dead }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Cell::Alive => ALIVE,
            Cell::Dead => DEAD,
        }
    }

    pub fn is_alive(self) -> bool {
        self == Cell::Alive
    }
}

impl From<bool> for Cell {
    fn from(alive: bool) -> Self {
        if alive { Cell::Alive } else { Cell::Dead }
    }
}

/// Grid coordinate (x = column, y = row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Wrap a possibly negative index onto `[0, modulus)`
pub fn wrap(index: isize, modulus: usize) -> usize {
    index.rem_euclid(modulus as isize) as usize
}

/// Serialized shape of a [`World`], validated on the way in
#[derive(Deserialize)]
struct WorldRepr {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl TryFrom<WorldRepr> for World {
    type Error = GridError;

    fn try_from(repr: WorldRepr) -> Result<Self, Self::Error> {
        if repr.width == 0 && repr.height == 0 && repr.cells.is_empty() {
            return Ok(World::default());
        }
        World::from_cells(repr.width, repr.height, repr.cells)
    }
}

/// Immutable `height x width` toroidal grid
///
/// A turn never edits a world in place: the next generation is assembled as a
/// new `World` and swapped in, so readers holding an `Arc<World>` always see a
/// complete generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorldRepr")]
pub struct World {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl World {
    /// Create an all-dead world
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        debug!(width, height, "World::new: called");
        if width == 0 || height == 0 {
            return Err(GridError::EmptyDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            cells: vec![DEAD; width * height],
        })
    }

    /// Build a world from row-major image bytes
    ///
    /// Bytes are normalized so the stored grid only ever holds 0 or 255.
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Result<Self, GridError> {
        debug!(width, height, len = cells.len(), "World::from_cells: called");
        if width == 0 || height == 0 {
            return Err(GridError::EmptyDimensions { width, height });
        }
        let expected = width * height;
        if cells.len() != expected {
            return Err(GridError::CellCount {
                width,
                height,
                expected,
                actual: cells.len(),
            });
        }
        let cells = cells.into_iter().map(|b| Cell::from_byte(b).to_byte()).collect();
        Ok(Self { width, height, cells })
    }

    /// Build a world with the given cells alive, coordinates wrapping toroidally
    pub fn with_alive(width: usize, height: usize, alive: &[Coord]) -> Result<Self, GridError> {
        let mut world = Self::new(width, height)?;
        for coord in alive {
            let idx = (coord.y % height) * width + coord.x % width;
            world.cells[idx] = ALIVE;
        }
        Ok(world)
    }

    /// Parse an ASCII pattern where `#` or `O` marks a live cell
    pub fn from_pattern(rows: &[&str]) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        let mut cells = Vec::with_capacity(width * height);
        for (row, line) in rows.iter().enumerate() {
            let actual = line.chars().count();
            if actual != width {
                return Err(GridError::RaggedPattern {
                    row,
                    expected: width,
                    actual,
                });
            }
            cells.extend(line.chars().map(|c| if c == '#' || c == 'O' { ALIVE } else { DEAD }));
        }
        Self::from_cells(width, height, cells)
    }

    /// Reassemble a world from band outputs given in band order
    pub fn from_bands<I>(width: usize, height: usize, bands: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut cells = Vec::with_capacity(width * height);
        for band in bands {
            cells.extend(band);
        }
        Self::from_cells(width, height, cells)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Raw row-major bytes (0 or 255)
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.cells[start..start + self.width]
    }

    pub fn get(&self, x: usize, y: usize) -> Cell {
        Cell::from_byte(self.cells[y * self.width + x])
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_alive()
    }

    /// Coordinates of every live cell, row by row
    pub fn alive_cells(&self) -> Vec<Coord> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == ALIVE)
            .map(|(i, _)| Coord::new(i % self.width, i / self.width))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|b| **b == ALIVE).count()
    }

    /// Fail unless this world is `width x height`
    pub fn ensure_dimensions(&self, width: usize, height: usize) -> Result<(), GridError> {
        if self.width != width || self.height != height {
            return Err(GridError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Copy out the rows a band needs: its own rows plus one wrapped row above and below
    pub fn halo_slice(&self, band: Band) -> BandSlice {
        debug!(start = band.start, end = band.end, "World::halo_slice: called");
        let mut rows = Vec::with_capacity((band.len() + 2) * self.width);
        let above = wrap(band.start as isize - 1, self.height);
        rows.extend_from_slice(self.row(above));
        for y in band.rows() {
            rows.extend_from_slice(self.row(y));
        }
        let below = wrap(band.end as isize, self.height);
        rows.extend_from_slice(self.row(below));
        BandSlice {
            band,
            width: self.width,
            height: self.height,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_dimensions() {
        assert_eq!(
            World::new(0, 4),
            Err(GridError::EmptyDimensions { width: 0, height: 4 })
        );
    }

    #[test]
    fn test_from_cells_normalizes_bytes() {
        let world = World::from_cells(2, 2, vec![255, 1, 0, 128]).unwrap();
        assert_eq!(world.cells(), &[ALIVE, DEAD, DEAD, DEAD]);
    }

    #[test]
    fn test_from_cells_rejects_wrong_length() {
        let err = World::from_cells(3, 3, vec![0; 8]).unwrap_err();
        assert!(matches!(err, GridError::CellCount { expected: 9, actual: 8, .. }));
    }

    #[test]
    fn test_from_pattern_and_alive_cells() {
        let world = World::from_pattern(&[".#.", "..#", "###"]).unwrap();
        assert_eq!(world.width(), 3);
        assert_eq!(world.height(), 3);
        assert_eq!(world.alive_count(), 5);
        assert_eq!(
            world.alive_cells(),
            vec![
                Coord::new(1, 0),
                Coord::new(2, 1),
                Coord::new(0, 2),
                Coord::new(1, 2),
                Coord::new(2, 2)
            ]
        );
    }

    #[test]
    fn test_from_pattern_rejects_ragged_rows() {
        let err = World::from_pattern(&["..", "..."]).unwrap_err();
        assert_eq!(
            err,
            GridError::RaggedPattern {
                row: 1,
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_wrap_each_axis() {
        assert_eq!(wrap(-1, 5), 4);
        assert_eq!(wrap(5, 5), 0);
        assert_eq!(wrap(-1, 3), 2);
        assert_eq!(wrap(2, 3), 2);
    }

    #[test]
    fn test_halo_slice_wraps_at_edges() {
        let world = World::from_pattern(&["#...", ".#..", "..#.", "...#"]).unwrap();
        let slice = world.halo_slice(Band::new(0, 2));
        assert_eq!(slice.rows.len(), 4 * 4);
        // row above band start 0 is the last row
        assert_eq!(&slice.rows[0..4], world.row(3));
        assert_eq!(&slice.rows[4..8], world.row(0));
        assert_eq!(&slice.rows[8..12], world.row(1));
        assert_eq!(&slice.rows[12..16], world.row(2));
    }

    #[test]
    fn test_halo_slice_single_row_world() {
        let world = World::from_pattern(&["#.#"]).unwrap();
        let slice = world.halo_slice(Band::new(0, 1));
        assert_eq!(slice.rows, [world.row(0), world.row(0), world.row(0)].concat());
    }

    #[test]
    fn test_from_bands_concatenates_in_order() {
        let world = World::from_bands(2, 3, vec![vec![255, 0], vec![0, 0, 0, 255]]).unwrap();
        assert!(world.is_alive(0, 0));
        assert!(world.is_alive(1, 2));
        assert_eq!(world.alive_count(), 2);
    }

    #[test]
    fn test_from_bands_detects_missing_rows() {
        let err = World::from_bands(2, 3, vec![vec![0, 0]]).unwrap_err();
        assert!(matches!(err, GridError::CellCount { .. }));
    }

    #[test]
    fn test_serde_roundtrip_validates_shape() {
        let world = World::from_pattern(&["#.", ".#"]).unwrap();
        let json = serde_json::to_string(&world).unwrap();
        assert_eq!(json, r#"{"width":2,"height":2,"cells":[255,0,0,255]}"#);
        let parsed: World = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, world);

        let bad = r#"{"width":2,"height":2,"cells":[255,0,0]}"#;
        assert!(serde_json::from_str::<World>(bad).is_err());
    }

    #[test]
    fn test_ensure_dimensions() {
        let world = World::new(4, 2).unwrap();
        assert!(world.ensure_dimensions(4, 2).is_ok());
        assert!(matches!(
            world.ensure_dimensions(2, 4),
            Err(GridError::DimensionMismatch { .. })
        ));
    }
}
