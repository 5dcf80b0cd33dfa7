pub mod board;
pub mod clock;
pub mod error;
pub mod grid;

pub use board::{Blast, Board, Device, Player, PlayerId, TickOutcome, BLAST_DECAY, DEVICE_FUSE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ArenaError;
pub use grid::{Direction, Grid, GridConfig, GridPos, Terrain, Tile, MAX_DIMENSION};
