use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::ArenaError;
use crate::grid::{Direction, Grid, GridConfig, GridPos, Terrain, Tile};

/// Time from planting to detonation.
pub const DEVICE_FUSE: Duration = Duration::from_secs(3);
/// Time a blast mark stays on the board.
pub const BLAST_DECAY: Duration = Duration::from_secs(1);

/// Plus-shaped blast, radius 1. Walls inside the shape are skipped, they
/// neither block nor extend it.
const BLAST_OFFSETS: [(i32, i32); 5] = [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub pos: GridPos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub pos: GridPos,
    pub owner: PlayerId,
    pub armed_at: Instant,
    pub fuse: Duration,
}

impl Device {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.armed_at) >= self.fuse
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blast {
    pub pos: GridPos,
    pub created_at: Instant,
    pub duration: Duration,
}

impl Blast {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.duration
    }
}

/// Result of one `Board::tick`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub eliminated: Vec<PlayerId>,
    pub detonated: usize,
    pub blasts_cleared: usize,
}

impl TickOutcome {
    /// Whether the rendering may differ from before the tick.
    pub fn changed(&self) -> bool {
        self.detonated > 0 || self.blasts_cleared > 0
    }
}

/// Authoritative state of one arena: terrain plus the player, device and
/// blast registries.
///
/// `tiles` is a cached projection of those registries over the terrain and is
/// re-derived after every mutation; it is never written to directly.
#[derive(Debug)]
pub struct Board {
    grid: Grid,
    players: BTreeMap<PlayerId, Player>,
    devices: Vec<Device>,
    blasts: Vec<Blast>,
    tiles: Vec<Tile>,
    rng: ChaCha8Rng,
}

impl Board {
    /// Generate a fresh layout. The same seed yields the same layout and the
    /// same sequence of first-player placements.
    pub fn new(config: &GridConfig, seed: u64) -> Result<Self, ArenaError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let grid = Grid::generate(config, &mut rng)?;
        Ok(Self::with_rng(grid, rng))
    }

    /// Wrap an existing layout (e.g. one built with `Grid::from_rows`).
    pub fn from_grid(grid: Grid, seed: u64) -> Self {
        Self::with_rng(grid, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(grid: Grid, rng: ChaCha8Rng) -> Self {
        let mut board = Self {
            tiles: Vec::new(),
            grid,
            players: BTreeMap::new(),
            devices: Vec::new(),
            blasts: Vec::new(),
            rng,
        };
        board.reproject();
        board
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tile(&self, pos: GridPos) -> Option<Tile> {
        self.grid.index(pos).map(|i| self.tiles[i])
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn blasts(&self) -> &[Blast] {
        &self.blasts
    }

    /// Interior cells currently rendered as Floor, row-major.
    pub fn floor_cells(&self) -> Vec<GridPos> {
        self.grid
            .positions()
            .filter(|&pos| self.tile(pos) == Some(Tile::Floor))
            .collect()
    }

    /// Place a new player: uniformly at random on an empty board, otherwise on
    /// the floor cell farthest (by minimum Manhattan distance) from everyone.
    pub fn add_player(&mut self, id: PlayerId) -> Result<GridPos, ArenaError> {
        if self.players.contains_key(&id) {
            return Err(ArenaError::DuplicatePlayer(id));
        }
        let candidates = self.floor_cells();
        if candidates.is_empty() {
            return Err(ArenaError::BoardFull);
        }

        let pos = if self.players.is_empty() {
            candidates[self.rng.gen_range(0..candidates.len())]
        } else {
            self.farthest_from_players(&candidates)
        };

        self.players.insert(id.clone(), Player { id, pos });
        self.reproject();
        Ok(pos)
    }

    fn farthest_from_players(&self, candidates: &[GridPos]) -> GridPos {
        let mut best = candidates[0];
        let mut best_distance = None;
        for &candidate in candidates {
            let nearest = self
                .players
                .values()
                .map(|p| candidate.manhattan(p.pos))
                .min()
                .unwrap_or(u32::MAX);
            // Strict comparison keeps the first candidate on ties.
            if best_distance.map_or(true, |d| nearest > d) {
                best = candidate;
                best_distance = Some(nearest);
            }
        }
        best
    }

    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Player> {
        let removed = self.players.remove(id);
        if removed.is_some() {
            self.reproject();
        }
        removed
    }

    /// Step one cell. Only a Floor cell is a valid destination.
    pub fn move_player(&mut self, id: &PlayerId, direction: Direction) -> Result<GridPos, ArenaError> {
        let current = self
            .players
            .get(id)
            .map(|p| p.pos)
            .ok_or_else(|| ArenaError::UnknownPlayer(id.clone()))?;
        let target = current.step(direction);
        if self.tile(target) != Some(Tile::Floor) {
            return Err(ArenaError::Blocked {
                x: target.x,
                y: target.y,
            });
        }
        if let Some(player) = self.players.get_mut(id) {
            player.pos = target;
        }
        self.reproject();
        Ok(target)
    }

    /// Arm a device under the player. At most one device per cell.
    pub fn plant_device(&mut self, id: &PlayerId, now: Instant) -> Result<GridPos, ArenaError> {
        let pos = self
            .players
            .get(id)
            .map(|p| p.pos)
            .ok_or_else(|| ArenaError::UnknownPlayer(id.clone()))?;
        if self.tile(pos) == Some(Tile::Device) {
            return Err(ArenaError::DeviceAlreadyPlanted { x: pos.x, y: pos.y });
        }
        self.devices.push(Device {
            pos,
            owner: id.clone(),
            armed_at: now,
            fuse: DEVICE_FUSE,
        });
        self.reproject();
        Ok(pos)
    }

    /// Advance simulated time: detonate expired devices, then decay expired
    /// blast marks.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let (expired, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.devices).into_iter().partition(|d| d.is_expired(now));
        self.devices = pending;
        for device in expired {
            self.detonate(&device, now, &mut outcome.eliminated);
            outcome.detonated += 1;
        }

        let before = self.blasts.len();
        self.blasts.retain(|b| !b.is_expired(now));
        outcome.blasts_cleared = before - self.blasts.len();

        if outcome.changed() {
            self.reproject();
        }
        outcome
    }

    fn detonate(&mut self, device: &Device, now: Instant, eliminated: &mut Vec<PlayerId>) {
        tracing::debug!(owner = %device.owner, x = device.pos.x, y = device.pos.y, "device detonated");
        for (dx, dy) in BLAST_OFFSETS {
            let pos = device.pos.offset(dx, dy);
            match self.grid.terrain(pos) {
                None | Some(Terrain::Wall) => continue,
                Some(_) => {}
            }

            let caught: Vec<PlayerId> = self
                .players
                .values()
                .filter(|p| p.pos == pos)
                .map(|p| p.id.clone())
                .collect();
            for id in caught {
                self.players.remove(&id);
                eliminated.push(id);
            }

            self.grid.clear_rubble(pos);
            self.blasts.push(Blast {
                pos,
                created_at: now,
                duration: BLAST_DECAY,
            });
        }
    }

    /// Rebuild the tile projection. Later layers win: player < blast < device.
    fn reproject(&mut self) {
        self.tiles = self
            .grid
            .positions()
            .map(|pos| self.grid.terrain(pos).map(Tile::from).unwrap_or(Tile::Wall))
            .collect();

        let grid = &self.grid;
        let tiles = &mut self.tiles;
        let mut paint = |pos: GridPos, tile: Tile| {
            if let Some(i) = grid.index(pos) {
                if tiles[i] != Tile::Wall {
                    tiles[i] = tile;
                }
            }
        };
        for player in self.players.values() {
            paint(player.pos, Tile::Player);
        }
        for blast in &self.blasts {
            paint(blast.pos, Tile::Blast);
        }
        for device in &self.devices {
            paint(device.pos, Tile::Device);
        }
    }

    /// Row-major text snapshot, one symbol per tile, newline after each row.
    pub fn render(&self) -> String {
        let width = self.grid.width() as usize;
        let mut out = String::with_capacity(self.tiles.len() + self.grid.height() as usize);
        for row in self.tiles.chunks(width) {
            out.extend(row.iter().map(|t| t.symbol()));
            out.push('\n');
        }
        out
    }
}
