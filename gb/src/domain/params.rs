//! Run parameters shared by the distributor, the broker and the turn loop

use serde::{Deserialize, Serialize};

use super::world::{GridError, World};

/// Parameters of one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Number of turns to run
    pub turns: u64,
    /// In-process lanes used when running locally
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
}

impl Params {
    pub fn new(turns: u64, threads: usize, image_width: usize, image_height: usize) -> Self {
        Self {
            turns,
            threads,
            image_width,
            image_height,
        }
    }

    /// Base name of the input image, e.g. `512x512`
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.image_width, self.image_height)
    }

    /// Base name of an output image at `turn`, e.g. `512x512x100`
    pub fn output_name(&self, turn: u64) -> String {
        format!("{}x{}x{}", self.image_width, self.image_height, turn)
    }

    /// Fail unless `world` has the dimensions these params describe
    pub fn check_world(&self, world: &World) -> Result<(), GridError> {
        world.ensure_dimensions(self.image_width, self.image_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_names() {
        let params = Params::new(100, 4, 512, 256);
        assert_eq!(params.input_name(), "512x256");
        assert_eq!(params.output_name(100), "512x256x100");
    }

    #[test]
    fn test_check_world() {
        let params = Params::new(1, 1, 4, 4);
        assert!(params.check_world(&World::new(4, 4).unwrap()).is_ok());
        assert!(params.check_world(&World::new(4, 5).unwrap()).is_err());
    }
}
