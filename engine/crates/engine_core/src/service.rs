use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arena::Clock;
use net::{SessionHandler, SessionWriteTx};
use session::{reply, Action, PlayerSession, SessionId, SessionOutput};

use crate::registry::RoomRegistry;

/// Executes session actions against the room registry. One instance serves
/// every connection.
pub struct ArenaService {
    registry: Arc<RoomRegistry>,
    clients: Mutex<BTreeMap<SessionId, SessionWriteTx>>,
}

impl ArenaService {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    fn clients(&self) -> MutexGuard<'_, BTreeMap<SessionId, SessionWriteTx>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn client_count(&self) -> usize {
        self.clients().len()
    }

    /// Welcome text plus the current room listing.
    pub fn help_text(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Welcome to Bomberman ===\n");
        out.push_str("Commands:\n");
        out.push_str("  JOIN            - Join any available room\n");
        out.push_str("  JOIN <room>     - Join or create a specific room\n");
        out.push_str("  ROOMS           - List rooms and player counts\n");
        out.push_str("  Use arrow keys  - Move around\n");
        out.push_str("  Press 'b'       - Plant a bomb\n");
        out.push_str("----------------------------------------\n");
        out.push_str("Current Rooms:\n");
        for (name, count) in self.registry.listing() {
            let _ = writeln!(out, "  {}: {} players", name, count);
        }
        out
    }

    /// Tell every connected session the server is going away and close it.
    pub fn shutdown_all(&self) {
        let clients = self.clients();
        tracing::info!(sessions = clients.len(), "notifying sessions of shutdown");
        for (session_id, tx) in clients.iter() {
            let _ = tx.send(SessionOutput::with_disconnect(*session_id, reply::SHUTTING_DOWN));
        }
    }

    fn send(&self, session_id: SessionId, text: impl Into<String>) {
        if let Some(tx) = self.clients().get(&session_id) {
            let _ = tx.send(SessionOutput::new(session_id, text));
        }
    }

    fn send_final(&self, session_id: SessionId, text: impl Into<String>) {
        if let Some(tx) = self.clients().get(&session_id) {
            let _ = tx.send(SessionOutput::with_disconnect(session_id, text));
        }
    }

    fn write_tx(&self, session_id: SessionId) -> Option<SessionWriteTx> {
        self.clients().get(&session_id).cloned()
    }

    fn join(&self, session: &mut PlayerSession, room: Option<&str>) {
        let session_id = session.session_id;
        let Some(write_tx) = self.write_tx(session_id) else {
            return;
        };

        let joined = self
            .registry
            .resolve(room)
            .and_then(|room| {
                let (pos, broadcast) = room.join(session_id, session.player.clone(), write_tx)?;
                Ok((room, pos, broadcast))
            });

        match joined {
            Ok((room, pos, broadcast)) => {
                tracing::info!(%session_id, room = %room.name(), x = pos.x, y = pos.y, "player joined");
                session.mark_joined(room.name());
                broadcast.deliver();
            }
            Err(e) => {
                tracing::info!(%session_id, room = ?room, error = %e, "join refused");
                self.send_final(session_id, reply::ROOM_FULL);
                session.mark_closing();
            }
        }
    }

    fn execute(&self, session: &mut PlayerSession, action: Action) {
        let session_id = session.session_id;
        match action {
            Action::ListRooms => self.send(session_id, self.help_text()),
            Action::Join { room } => self.join(session, room.as_deref()),
            Action::Move { room, direction } => {
                let Some(room) = self.registry.get(&room) else {
                    return;
                };
                match room.move_player(&session.player, direction) {
                    Ok(broadcast) => broadcast.deliver(),
                    Err(e) => {
                        tracing::trace!(%session_id, error = %e, "move rejected");
                        self.send(session_id, reply::CANT_MOVE);
                    }
                }
            }
            Action::PlantDevice { room } => {
                if let Some(room) = self.registry.get(&room) {
                    room.plant_device(&session.player, self.registry.clock().now()).deliver();
                }
            }
            Action::Reject(err) => self.send(session_id, err.to_string()),
            Action::Ignore => {}
        }
    }
}

impl SessionHandler for ArenaService {
    type Session = PlayerSession;

    fn open(&self, session_id: SessionId, peer: SocketAddr, write_tx: SessionWriteTx) -> PlayerSession {
        tracing::debug!(%session_id, %peer, "session opened");
        self.clients().insert(session_id, write_tx);
        self.send(session_id, self.help_text());
        PlayerSession::new(session_id)
    }

    fn handle_line(&self, session: &mut PlayerSession, line: &str) {
        if let Some(action) = session.handle_line(line) {
            self.execute(session, action);
        }
    }

    fn close(&self, session: PlayerSession) {
        if let Some(room) = session.room().and_then(|name| self.registry.get(name)) {
            if let Some(broadcast) = room.leave(session.session_id) {
                tracing::info!(session_id = %session.session_id, room = %room.name(), "player left");
                broadcast.deliver();
            }
        }
        self.clients().remove(&session.session_id);
    }
}
