//! Grid snapshots on disk
//!
//! Worlds are stored as binary PGM (P5) images, one byte per cell, 255 for
//! alive and 0 for dead. Input images are named `{W}x{H}.pgm` and outputs
//! `{W}x{H}x{turn}.pgm`.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{GridError, World};

/// Errors at the image boundary
#[derive(Debug, Error)]
pub enum GridIoError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("{} is not a binary PGM image: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },

    #[error("{} is {actual_width}x{actual_height}, expected {width}x{height}", .path.display())]
    Dimensions {
        path: PathBuf,
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Where worlds are read from and written to
pub trait GridStore: Send + Sync {
    /// Read the image called `name`, which must be `width x height`
    fn read_grid(&self, name: &str, width: usize, height: usize) -> Result<World, GridIoError>;

    /// Write `world` as the image called `name`, returning where it went
    fn write_grid(&self, name: &str, world: &World) -> Result<PathBuf, GridIoError>;
}

impl<S: GridStore + ?Sized> GridStore for std::sync::Arc<S> {
    fn read_grid(&self, name: &str, width: usize, height: usize) -> Result<World, GridIoError> {
        (**self).read_grid(name, width, height)
    }

    fn write_grid(&self, name: &str, world: &World) -> Result<PathBuf, GridIoError> {
        (**self).write_grid(name, world)
    }
}

/// PGM files in an input and an output directory
#[derive(Debug, Clone)]
pub struct PgmStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn input_path(&self, name: &str) -> PathBuf {
        self.input_dir.join(format!("{}.pgm", name))
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pgm", name))
    }
}

impl GridStore for PgmStore {
    fn read_grid(&self, name: &str, width: usize, height: usize) -> Result<World, GridIoError> {
        let path = self.input_path(name);
        debug!(?path, width, height, "PgmStore::read_grid: called");
        let bytes = fs::read(&path).map_err(|source| GridIoError::Io {
            path: path.clone(),
            source,
        })?;
        let (actual_width, actual_height, pixels) = decode_pgm(&bytes).map_err(|reason| GridIoError::Format {
            path: path.clone(),
            reason,
        })?;
        if actual_width != width || actual_height != height {
            return Err(GridIoError::Dimensions {
                path,
                width,
                height,
                actual_width,
                actual_height,
            });
        }
        Ok(World::from_cells(width, height, pixels.to_vec())?)
    }

    fn write_grid(&self, name: &str, world: &World) -> Result<PathBuf, GridIoError> {
        let path = self.output_path(name);
        debug!(?path, "PgmStore::write_grid: called");
        let io_error = |source| GridIoError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.output_dir).map_err(io_error)?;
        fs::write(&path, encode_pgm(world)).map_err(io_error)?;
        info!(?path, "image written");
        Ok(path)
    }
}

/// Encode a world as a P5 image
pub fn encode_pgm(world: &World) -> Vec<u8> {
    let mut bytes = format!("P5\n{} {}\n255\n", world.width(), world.height()).into_bytes();
    bytes.extend_from_slice(world.cells());
    bytes
}

/// Decode a P5 image into `(width, height, pixels)`
///
/// Header fields may be separated by any whitespace and `#` comments.
pub fn decode_pgm(bytes: &[u8]) -> Result<(usize, usize, &[u8]), String> {
    let mut pos = 0;
    let mut fields = Vec::with_capacity(4);
    while fields.len() < 4 {
        // Skip whitespace and comments
        loop {
            match bytes.get(pos) {
                Some(b) if b.is_ascii_whitespace() => pos += 1,
                Some(b'#') => {
                    while bytes.get(pos).is_some_and(|b| *b != b'\n') {
                        pos += 1;
                    }
                }
                Some(_) => break,
                None => return Err("truncated header".to_string()),
            }
        }
        let start = pos;
        while bytes.get(pos).is_some_and(|b| !b.is_ascii_whitespace()) {
            pos += 1;
        }
        fields.push(String::from_utf8_lossy(&bytes[start..pos]).into_owned());
    }
    // Exactly one whitespace byte separates the header from the raster
    pos += 1;

    if fields[0] != "P5" {
        return Err(format!("magic number {:?}", fields[0]));
    }
    let parse = |field: &str, what: &str| {
        field
            .parse::<usize>()
            .map_err(|_| format!("invalid {} {:?}", what, field))
    };
    let width = parse(&fields[1], "width")?;
    let height = parse(&fields[2], "height")?;
    let max_value = parse(&fields[3], "max value")?;
    if max_value != 255 {
        return Err(format!("max value {} is not 255", max_value));
    }
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| format!("dimensions {}x{} overflow", width, height))?;
    let raster = bytes.get(pos..).unwrap_or_default();
    if raster.len() < expected {
        return Err(format!("raster holds {} bytes, expected {}", raster.len(), expected));
    }
    Ok((width, height, &raster[..expected]))
}

#[cfg(test)]
pub mod mock {
    //! In-memory store for distributor tests

    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::{GridIoError, GridStore};
    use crate::domain::World;

    #[derive(Default)]
    pub struct MemoryStore {
        inputs: HashMap<String, World>,
        pub written: Mutex<Vec<(String, World)>>,
    }

    impl MemoryStore {
        pub fn with_input(name: &str, world: World) -> Self {
            let mut store = Self::default();
            store.inputs.insert(name.to_string(), world);
            store
        }

        pub fn written_names(&self) -> Vec<String> {
            self.written.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl GridStore for MemoryStore {
        fn read_grid(&self, name: &str, width: usize, height: usize) -> Result<World, GridIoError> {
            let world = self.inputs.get(name).cloned().ok_or_else(|| GridIoError::Io {
                path: PathBuf::from(name),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such image"),
            })?;
            world.ensure_dimensions(width, height)?;
            Ok(world)
        }

        fn write_grid(&self, name: &str, world: &World) -> Result<PathBuf, GridIoError> {
            self.written.lock().unwrap().push((name.to_string(), world.clone()));
            Ok(PathBuf::from(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coord;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let store = PgmStore::new(temp.path().join("out"), temp.path().join("out"));
        let world = World::with_alive(5, 3, &[Coord::new(0, 0), Coord::new(4, 2)]).unwrap();

        let path = store.write_grid("5x3", &world).unwrap();
        assert!(path.ends_with("5x3.pgm"));
        assert_eq!(store.read_grid("5x3", 5, 3).unwrap(), world);
    }

    #[test]
    fn test_decode_with_comments() {
        let mut bytes = b"P5\n# made by hand\n2 2\n# max\n255\n".to_vec();
        bytes.extend_from_slice(&[255, 0, 0, 255]);
        let (width, height, pixels) = decode_pgm(&bytes).unwrap();
        assert_eq!((width, height), (2, 2));
        assert_eq!(pixels, &[255, 0, 0, 255]);
    }

    #[test]
    fn test_decode_rejects_ascii_pgm() {
        let err = decode_pgm(b"P2\n1 1\n255\n0\n").unwrap_err();
        assert!(err.contains("magic"));
    }

    #[test]
    fn test_decode_rejects_short_raster() {
        let err = decode_pgm(b"P5\n2 2\n255\n\x00\x00").unwrap_err();
        assert!(err.contains("expected 4"));
    }

    #[test]
    fn test_decode_rejects_overflowing_dimensions() {
        let err = decode_pgm(b"P5 99999999999 99999999999 255\n").unwrap_err();
        assert!(err.contains("overflow"));
    }

    #[test]
    fn test_read_missing_image() {
        let temp = TempDir::new().unwrap();
        let store = PgmStore::new(temp.path(), temp.path());
        assert!(matches!(store.read_grid("16x16", 16, 16), Err(GridIoError::Io { .. })));
    }

    #[test]
    fn test_read_wrong_dimensions() {
        let temp = TempDir::new().unwrap();
        let store = PgmStore::new(temp.path(), temp.path());
        store.write_grid("16x16", &World::new(8, 8).unwrap()).unwrap();
        assert!(matches!(
            store.read_grid("16x16", 16, 16),
            Err(GridIoError::Dimensions { actual_width: 8, .. })
        ));
    }

    #[test]
    fn test_grey_pixels_read_as_dead() {
        let temp = TempDir::new().unwrap();
        let store = PgmStore::new(temp.path(), temp.path());
        let mut bytes = b"P5\n3 1\n255\n".to_vec();
        bytes.extend_from_slice(&[255, 128, 1]);
        fs::write(store.input_path("3x1"), bytes).unwrap();

        let world = store.read_grid("3x1", 3, 1).unwrap();
        assert_eq!(world.alive_count(), 1);
    }
}
