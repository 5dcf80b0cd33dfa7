pub mod channels;
pub mod server;
pub mod telnet;

pub use channels::{session_channel, SessionWriteRx, SessionWriteTx};
pub use server::{serve, wait_for_shutdown, SessionHandler};
pub use telnet::LineBuffer;
