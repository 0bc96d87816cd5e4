//! Band computation
//!
//! Computes the next generation of one band from its halo slice. Rows need no
//! wrapping here (the halo rows already are the wrapped neighbours); columns
//! wrap against the world width.

use tracing::debug;

use super::rule::next_state;
use crate::domain::{ALIVE, Band, BandOutput, BandSlice, Coord, DEAD, GridError, World, wrap};
use crate::events::EventEmitter;

/// Count live neighbours of column `x` in slice row `row` (1-based within the band)
fn alive_neighbours(slice: &BandSlice, row: usize, x: usize) -> u8 {
    let mut alive = 0;
    for dy in [-1isize, 0, 1] {
        let r = (row as isize + dy) as usize;
        for dx in [-1isize, 0, 1] {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = wrap(x as isize + dx, slice.width);
            if slice.byte_at(r, nx) == ALIVE {
                alive += 1;
            }
        }
    }
    alive
}

/// Compute the band's next rows
///
/// Every cell that changes state is reported as `CellFlipped(turn, cell)` on
/// `emitter`, where `turn` is the turn this computation completes.
pub fn compute_band(slice: &BandSlice, turn: u64, emitter: &EventEmitter) -> BandOutput {
    debug!(
        start = slice.band.start,
        end = slice.band.end,
        width = slice.width,
        turn,
        "compute_band: called"
    );
    let report = emitter.is_enabled();
    let mut cells = Vec::with_capacity(slice.band.len() * slice.width);
    for (offset, y) in slice.band.rows().enumerate() {
        let row = offset + 1;
        for x in 0..slice.width {
            let alive = slice.byte_at(row, x) == ALIVE;
            let next = next_state(alive, alive_neighbours(slice, row, x));
            if report && next != alive {
                emitter.cell_flipped(turn, Coord::new(x, y));
            }
            cells.push(if next { ALIVE } else { DEAD });
        }
    }
    BandOutput {
        band: slice.band,
        cells,
    }
}

/// Advance a whole world by one turn on the calling thread
pub fn step_world(world: &World) -> Result<World, GridError> {
    let band = Band::new(0, world.height());
    let output = compute_band(&world.halo_slice(band), 0, &EventEmitter::disabled());
    World::from_cells(world.width(), world.height(), output.cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coord;
    use crate::events::{GolEvent, create_event_channel};

    fn run(world: &World, turns: usize) -> World {
        (0..turns).fold(world.clone(), |w, _| step_world(&w).unwrap())
    }

    #[test]
    fn test_all_dead_stays_dead() {
        let world = World::new(4, 4).unwrap();
        assert_eq!(step_world(&world).unwrap(), world);
    }

    #[test]
    fn test_isolated_cell_dies() {
        let world = World::from_pattern(&["...", ".#.", "..."]).unwrap();
        assert_eq!(step_world(&world).unwrap().alive_count(), 0);
    }

    #[test]
    fn test_blinker_oscillates() {
        let horizontal = World::from_pattern(&[".....", ".....", ".###.", ".....", "....."]).unwrap();
        let vertical = World::from_pattern(&[".....", "..#..", "..#..", "..#..", "....."]).unwrap();
        assert_eq!(step_world(&horizontal).unwrap(), vertical);
        assert_eq!(step_world(&vertical).unwrap(), horizontal);
    }

    #[test]
    fn test_block_is_still_life() {
        let block = World::from_pattern(&["....", ".##.", ".##.", "...."]).unwrap();
        assert_eq!(step_world(&block).unwrap(), block);
    }

    #[test]
    fn test_row_wraparound() {
        // Vertical blinker through the top edge: rows 5, 0, 1
        let world = World::with_alive(6, 6, &[Coord::new(2, 5), Coord::new(2, 0), Coord::new(2, 1)]).unwrap();
        let next = step_world(&world).unwrap();
        assert_eq!(next.alive_cells(), vec![Coord::new(1, 0), Coord::new(2, 0), Coord::new(3, 0)]);
    }

    #[test]
    fn test_column_wraparound_uses_width() {
        // Non-square world: horizontal blinker across the left edge at row 1
        let world = World::with_alive(7, 3, &[Coord::new(6, 1), Coord::new(0, 1), Coord::new(1, 1)]).unwrap();
        let next = step_world(&world).unwrap();
        assert_eq!(next.alive_cells(), vec![Coord::new(0, 0), Coord::new(0, 1), Coord::new(0, 2)]);
    }

    #[test]
    fn test_glider_returns_after_full_lap() {
        let glider = World::from_pattern(&[
            ".#......", "..#.....", "###.....", "........", "........", "........", "........", "........",
        ])
        .unwrap();
        // A glider moves one cell diagonally every 4 turns; 32 turns is a full lap of an 8x8 torus
        assert_eq!(run(&glider, 32), glider);
        assert_ne!(run(&glider, 4), glider);
        assert_eq!(run(&glider, 4).alive_count(), 5);
    }

    #[test]
    fn test_band_matches_whole_world_rows() {
        let world = World::from_pattern(&["#..#.", ".##..", "#...#", "..#.#", ".#.#."]).unwrap();
        let whole = step_world(&world).unwrap();
        let band = Band::new(1, 4);
        let output = compute_band(&world.halo_slice(band), 1, &EventEmitter::disabled());
        assert_eq!(output.band, band);
        assert_eq!(output.cells, whole.cells()[5..20].to_vec());
    }

    #[test]
    fn test_flips_are_reported_with_global_rows() {
        let world = World::from_pattern(&[".....", ".....", ".###.", ".....", "....."]).unwrap();
        let (emitter, mut rx) = create_event_channel();
        let band = Band::new(1, 4);
        compute_band(&world.halo_slice(band), 9, &emitter);

        let mut flipped = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                GolEvent::CellFlipped { completed_turns, cell } => {
                    assert_eq!(completed_turns, 9);
                    flipped.push(cell);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        flipped.sort();
        assert_eq!(
            flipped,
            vec![Coord::new(1, 2), Coord::new(2, 1), Coord::new(2, 3), Coord::new(3, 2)]
        );
    }
}
