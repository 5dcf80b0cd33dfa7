pub mod registry;
pub mod room;
pub mod service;
pub mod tick;

pub use registry::{RoomRegistry, RoomSettings};
pub use room::{Broadcast, Room, TickReport};
pub use service::ArenaService;
pub use tick::{run_room_ticker, TickConfig};
