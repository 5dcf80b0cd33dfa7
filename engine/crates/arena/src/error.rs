use crate::board::PlayerId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArenaError {
    #[error("board is full")]
    BoardFull,

    #[error("cell ({x}, {y}) is blocked")]
    Blocked { x: i32, y: i32 },

    #[error("a device is already planted at ({x}, {y})")]
    DeviceAlreadyPlanted { x: i32, y: i32 },

    #[error("player {0} is not on the board")]
    UnknownPlayer(PlayerId),

    #[error("player {0} is already on the board")]
    DuplicatePlayer(PlayerId),

    #[error("grid {width}x{height} is outside 3x3..={max}x{max}", max = crate::grid::MAX_DIMENSION)]
    InvalidDimensions { width: u32, height: u32 },

    #[error("rubble probability {0} is outside [0, 1]")]
    InvalidRubbleProbability(f64),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}
