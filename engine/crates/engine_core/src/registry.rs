use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arena::{ArenaError, Board, Clock, GridConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::room::Room;
use crate::tick::{run_room_ticker, TickConfig};

/// Parameters shared by every room the registry creates.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub grid: GridConfig,
    pub tick: TickConfig,
    pub max_players: usize,
    /// Seeds the per-room layouts. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            tick: TickConfig::default(),
            max_players: 16,
            seed: None,
        }
    }
}

/// Name to room map. Creating a room also spawns its ticker.
///
/// Lock order: the registry lock is taken before any room lock, never after.
pub struct RoomRegistry {
    rooms: Mutex<BTreeMap<String, Arc<Room>>>,
    settings: RoomSettings,
    seeds: Mutex<ChaCha8Rng>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
}

impl RoomRegistry {
    pub fn new(
        settings: RoomSettings,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, ArenaError> {
        settings.grid.validate()?;
        let seeds = match settings.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            rooms: Mutex::new(BTreeMap::new()),
            settings,
            seeds: Mutex::new(seeds),
            clock,
            shutdown,
            tickers: Mutex::new(Vec::new()),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn rooms(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms().get(name).cloned()
    }

    pub fn get_or_create(&self, name: &str) -> Result<Arc<Room>, ArenaError> {
        let mut rooms = self.rooms();
        self.get_or_create_locked(&mut rooms, name)
    }

    /// Pick the room for a JOIN. A name selects (or creates) that room. No
    /// name picks the least populated room with space, ties going to the
    /// first by name, and creates `room-N` when none has space.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<Room>, ArenaError> {
        let mut rooms = self.rooms();
        if let Some(name) = name {
            return self.get_or_create_locked(&mut rooms, name);
        }

        let mut best: Option<(&Arc<Room>, usize)> = None;
        for room in rooms.values() {
            let count = room.client_count();
            if count >= self.settings.max_players {
                continue;
            }
            if best.map_or(true, |(_, fewest)| count < fewest) {
                best = Some((room, count));
            }
        }
        if let Some((room, _)) = best {
            return Ok(room.clone());
        }

        let name = (1..)
            .map(|n| format!("room-{}", n))
            .find(|candidate| !rooms.contains_key(candidate))
            .unwrap_or_else(|| "room-0".to_string());
        self.get_or_create_locked(&mut rooms, &name)
    }

    fn get_or_create_locked(
        &self,
        rooms: &mut BTreeMap<String, Arc<Room>>,
        name: &str,
    ) -> Result<Arc<Room>, ArenaError> {
        if let Some(room) = rooms.get(name) {
            return Ok(room.clone());
        }

        let seed = self.seeds.lock().unwrap_or_else(PoisonError::into_inner).gen::<u64>();
        let board = Board::new(&self.settings.grid, seed)?;
        let room = Arc::new(Room::new(name, board, self.settings.max_players));
        rooms.insert(name.to_string(), room.clone());

        let handle = tokio::spawn(run_room_ticker(
            room.clone(),
            self.clock.clone(),
            self.settings.tick.clone(),
            self.shutdown.clone(),
        ));
        self.tickers.lock().unwrap_or_else(PoisonError::into_inner).push(handle);

        tracing::info!(room = %name, seed, "room created");
        Ok(room)
    }

    /// `(name, connected clients)` for every room, ordered by name.
    pub fn listing(&self) -> Vec<(String, usize)> {
        self.rooms()
            .iter()
            .map(|(name, room)| (name.clone(), room.client_count()))
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    /// Wait for every room ticker to finish. Tickers stop on the shutdown signal.
    pub async fn join_tickers(&self) {
        let handles = std::mem::take(&mut *self.tickers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "room ticker ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena::SystemClock;
    use net::session_channel;
    use session::SessionId;

    use arena::PlayerId;

    fn registry(max_players: usize) -> (RoomRegistry, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let settings = RoomSettings {
            max_players,
            seed: Some(7),
            ..RoomSettings::default()
        };
        (RoomRegistry::new(settings, Arc::new(SystemClock), rx).unwrap(), tx)
    }

    fn occupy(room: &Room, session: u64) {
        let (tx, _rx) = session_channel();
        let player = PlayerId::new(format!("p{}", session));
        room.join(SessionId(session), player, tx).unwrap().1.deliver();
    }

    #[tokio::test]
    async fn empty_registry_creates_room_1() {
        let (reg, _tx) = registry(16);
        let room = reg.resolve(None).unwrap();
        assert_eq!(room.name(), "room-1");
        assert_eq!(reg.room_count(), 1);
    }

    #[tokio::test]
    async fn two_auto_joins_share_one_room_with_distinct_cells() {
        let (reg, _tx) = registry(16);

        let first = reg.resolve(None).unwrap();
        let (tx_a, _rx_a) = session_channel();
        let (pos_a, b) = first.join(SessionId(1), PlayerId::from("a"), tx_a).unwrap();
        b.deliver();

        let second = reg.resolve(None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let (tx_b, _rx_b) = session_channel();
        let (pos_b, b) = second.join(SessionId(2), PlayerId::from("b"), tx_b).unwrap();
        b.deliver();

        assert_ne!(pos_a, pos_b);
        assert_eq!(reg.room_count(), 1);
        assert_eq!(reg.listing(), vec![("room-1".to_string(), 2)]);
    }

    #[tokio::test]
    async fn auto_join_prefers_least_populated_then_name() {
        let (reg, _tx) = registry(16);
        let alpha = reg.get_or_create("alpha").unwrap();
        let beta = reg.get_or_create("beta").unwrap();

        // Tie: first by name.
        assert_eq!(reg.resolve(None).unwrap().name(), "alpha");

        occupy(&alpha, 1);
        assert_eq!(reg.resolve(None).unwrap().name(), "beta");

        occupy(&beta, 2);
        occupy(&beta, 3);
        assert_eq!(reg.resolve(None).unwrap().name(), "alpha");
    }

    #[tokio::test]
    async fn auto_join_creates_lowest_free_room_when_all_full() {
        let (reg, _tx) = registry(1);
        let r1 = reg.resolve(None).unwrap();
        occupy(&r1, 1);
        reg.get_or_create("room-3").unwrap();
        let r3 = reg.get("room-3").unwrap();
        occupy(&r3, 2);

        let fresh = reg.resolve(None).unwrap();
        assert_eq!(fresh.name(), "room-2");
    }

    #[tokio::test]
    async fn named_join_gets_or_creates() {
        let (reg, _tx) = registry(16);
        let a = reg.resolve(Some("arena")).unwrap();
        let b = reg.resolve(Some("arena")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.listing(), vec![("arena".to_string(), 0)]);
    }

    #[tokio::test]
    async fn tickers_stop_on_shutdown() {
        let (reg, tx) = registry(16);
        reg.get_or_create("a").unwrap();
        reg.get_or_create("b").unwrap();
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), reg.join_tickers())
            .await
            .unwrap();
    }

    #[test]
    fn invalid_grid_settings_are_rejected() {
        let (_tx, rx) = watch::channel(false);
        let settings = RoomSettings {
            grid: GridConfig {
                width: 2,
                ..GridConfig::default()
            },
            ..RoomSettings::default()
        };
        assert!(matches!(
            RoomRegistry::new(settings, Arc::new(SystemClock), rx),
            Err(ArenaError::InvalidDimensions { .. })
        ));
    }
}
