use session::SessionOutput;
use tokio::sync::mpsc;

/// Per-session write channel (rooms and service -> connection writer task).
///
/// Unbounded so that a broadcast never waits on a slow socket.
pub type SessionWriteTx = mpsc::UnboundedSender<SessionOutput>;
pub type SessionWriteRx = mpsc::UnboundedReceiver<SessionOutput>;

pub fn session_channel() -> (SessionWriteTx, SessionWriteRx) {
    mpsc::unbounded_channel()
}
