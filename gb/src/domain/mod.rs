//! Domain types for golbroker
//!
//! The world grid, row bands and run parameters. Everything here is plain
//! data: no I/O and no async.

mod band;
mod params;
mod world;

pub use band::{Band, BandOutput, BandSlice, PartitionError, partition};
pub use params::Params;
pub use world::{ALIVE, Cell, Coord, DEAD, GridError, World, wrap};
