//! The Game of Life cell rule

/// Next state of one cell given its state and its count of live neighbours
///
/// A live cell survives with 2 or 3 live neighbours. A dead cell is born with
/// exactly 3. Everything else is dead next turn.
pub fn next_state(alive: bool, alive_neighbours: u8) -> bool {
    matches!((alive, alive_neighbours), (true, 2) | (true, 3) | (false, 3))
}
