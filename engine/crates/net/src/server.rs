use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use session::SessionId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::channels::{session_channel, SessionWriteTx};
use crate::telnet::{to_wire, LineBuffer};

/// How long a closing session waits for queued output to reach the socket.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Game-side callbacks for one connection's lifecycle.
///
/// Every method runs on the connection's own task. Output goes through the
/// `SessionWriteTx` handed to `open`; a message built with
/// `SessionOutput::with_disconnect` closes the connection after delivery.
pub trait SessionHandler: Send + Sync + 'static {
    type Session: Send + 'static;

    fn open(&self, session_id: SessionId, peer: SocketAddr, write_tx: SessionWriteTx) -> Self::Session;

    fn handle_line(&self, session: &mut Self::Session, line: &str);

    /// Called exactly once, after the last `handle_line`.
    fn close(&self, session: Self::Session);
}

/// Accept connections on an already-bound listener, one task per connection.
/// Returns after shutdown once every session task has run its cleanup.
pub async fn serve<H: SessionHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    max_line_len: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let mut next_id = 0u64;
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let session_id = SessionId(next_id);
                next_id += 1;
                tracing::info!(%session_id, %peer, "New connection");
                sessions.spawn(handle_session(
                    stream,
                    peer,
                    session_id,
                    handler.clone(),
                    max_line_len,
                    shutdown.clone(),
                ));
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    tracing::info!(open = sessions.len(), "TCP server: accept loop stopped, draining sessions");
    while sessions.join_next().await.is_some() {}
    tracing::info!("TCP server stopped");
    Ok(())
}

/// Resolves once `true` has been published or the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn handle_session<H: SessionHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    session_id: SessionId,
    handler: Arc<H>,
    max_line_len: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (write_tx, mut write_rx) = session_channel();
    let mut session = handler.open(session_id, peer, write_tx);

    let mut writer_task = tokio::spawn(async move {
        while let Some(output) = write_rx.recv().await {
            if writer.write_all(to_wire(&output.text).as_bytes()).await.is_err() {
                break;
            }
            if output.disconnect {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });
    let mut writer_done = false;

    let mut lines = LineBuffer::with_max_len(max_line_len);
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for line in lines.feed(&buf[..n]) {
                        handler.handle_line(&mut session, &line);
                    }
                }
                Err(e) => {
                    tracing::debug!(%session_id, error = %e, "read failed");
                    break;
                }
            },
            _ = &mut writer_task => {
                writer_done = true;
                break;
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    handler.close(session);

    // Once the handler has dropped its senders the writer drains and exits.
    if !writer_done && tokio::time::timeout(FLUSH_TIMEOUT, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
    tracing::info!(%session_id, "Session ended");
}
