use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use arena::{ArenaError, Board, Direction, GridPos, PlayerId, TickOutcome};
use net::SessionWriteTx;
use session::{reply, SessionId, SessionOutput};

#[derive(Debug)]
struct ClientHandle {
    player: PlayerId,
    write_tx: SessionWriteTx,
}

#[derive(Debug)]
struct RoomState {
    board: Board,
    clients: BTreeMap<SessionId, ClientHandle>,
}

impl RoomState {
    fn targets(&self) -> Vec<(SessionId, SessionWriteTx)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.write_tx.clone()))
            .collect()
    }

    fn broadcast(&self) -> Broadcast {
        Broadcast {
            text: self.board.render(),
            targets: self.targets(),
        }
    }
}

/// A snapshot rendered under the room lock, to be delivered after it is released.
#[derive(Debug)]
#[must_use = "a broadcast does nothing until delivered"]
pub struct Broadcast {
    text: String,
    targets: Vec<(SessionId, SessionWriteTx)>,
}

impl Broadcast {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn recipients(&self) -> usize {
        self.targets.len()
    }

    /// Queue the snapshot on every target's writer. Closed channels are skipped.
    pub fn deliver(self) {
        for (session_id, tx) in self.targets {
            let _ = tx.send(SessionOutput::new(session_id, self.text.clone()));
        }
    }
}

/// What one room tick produced.
#[derive(Debug)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub players: usize,
    /// Present only when the rendering changed.
    pub broadcast: Option<Broadcast>,
    /// Eliminated sessions, already detached from the room.
    farewells: Vec<(SessionId, SessionWriteTx)>,
}

impl TickReport {
    /// Send the snapshot, then tell eliminated players they are out and close them.
    pub fn deliver(self) {
        if let Some(broadcast) = self.broadcast {
            broadcast.deliver();
        }
        for (session_id, tx) in self.farewells {
            let _ = tx.send(SessionOutput::with_disconnect(session_id, reply::DESTROYED));
        }
    }
}

/// One arena: a board, the sessions watching it and the lock guarding both.
#[derive(Debug)]
pub struct Room {
    name: String,
    max_players: usize,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(name: impl Into<String>, board: Board, max_players: usize) -> Self {
        Self {
            name: name.into(),
            max_players,
            state: Mutex::new(RoomState {
                board,
                clients: BTreeMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn player_position(&self, player: &PlayerId) -> Option<GridPos> {
        self.lock().board.player(player).map(|p| p.pos)
    }

    /// Place the player and attach the session. The session is only attached
    /// when placement succeeded; its join reply is queued before the lock is
    /// released, so no room update can overtake it.
    pub fn join(
        &self,
        session_id: SessionId,
        player: PlayerId,
        write_tx: SessionWriteTx,
    ) -> Result<(GridPos, Broadcast), ArenaError> {
        let mut state = self.lock();
        if state.clients.len() >= self.max_players {
            return Err(ArenaError::BoardFull);
        }
        let pos = state.board.add_player(player.clone())?;
        let _ = write_tx.send(SessionOutput::new(session_id, reply::joined(&self.name)));
        state.clients.insert(session_id, ClientHandle { player, write_tx });
        Ok((pos, state.broadcast()))
    }

    pub fn move_player(&self, player: &PlayerId, direction: Direction) -> Result<Broadcast, ArenaError> {
        let mut state = self.lock();
        state.board.move_player(player, direction)?;
        Ok(state.broadcast())
    }

    /// Arm a device under the player. The room is re-broadcast either way.
    pub fn plant_device(&self, player: &PlayerId, now: Instant) -> Broadcast {
        let mut state = self.lock();
        if let Err(e) = state.board.plant_device(player, now) {
            tracing::debug!(room = %self.name, %player, error = %e, "plant ignored");
        }
        state.broadcast()
    }

    /// Detach the session and take its player off the board. Returns the
    /// snapshot for whoever is left, or `None` if the session was not here.
    pub fn leave(&self, session_id: SessionId) -> Option<Broadcast> {
        let mut state = self.lock();
        let client = state.clients.remove(&session_id)?;
        state.board.remove_player(&client.player);
        Some(state.broadcast())
    }

    pub fn tick(&self, now: Instant) -> TickReport {
        let mut state = self.lock();
        let outcome = state.board.tick(now);

        // Eliminated players see the final board before being detached.
        let broadcast = outcome.changed().then(|| state.broadcast());

        let mut farewells = Vec::new();
        if !outcome.eliminated.is_empty() {
            state.clients.retain(|session_id, client| {
                if outcome.eliminated.contains(&client.player) {
                    farewells.push((*session_id, client.write_tx.clone()));
                    false
                } else {
                    true
                }
            });
        }
        for player in &outcome.eliminated {
            tracing::info!(room = %self.name, %player, "player eliminated");
        }

        TickReport {
            players: state.board.player_count(),
            outcome,
            broadcast,
            farewells,
        }
    }
}
