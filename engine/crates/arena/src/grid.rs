use rand::Rng;

use crate::error::ArenaError;

/// 2D integer coordinate. `y` grows downwards, row 0 is the top border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }

    pub fn manhattan(self, other: GridPos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit vector for this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Structural layer of a cell. This is the only per-cell state the grid owns;
/// players, devices and blasts live in the board registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terrain {
    Wall,
    Rubble,
    Floor,
}

/// What a cell looks like once occupants are layered over the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Wall,
    Rubble,
    Floor,
    Player,
    Device,
    Blast,
}

impl Tile {
    pub fn symbol(self) -> char {
        match self {
            Tile::Wall => '#',
            Tile::Rubble => '*',
            Tile::Floor => ' ',
            Tile::Player => 'P',
            Tile::Device => 'B',
            Tile::Blast => 'X',
        }
    }
}

impl From<Terrain> for Tile {
    fn from(terrain: Terrain) -> Self {
        match terrain {
            Terrain::Wall => Tile::Wall,
            Terrain::Rubble => Tile::Rubble,
            Terrain::Floor => Tile::Floor,
        }
    }
}

/// Largest accepted width or height. Keeps cell counts and `i32`
/// coordinates far from overflow.
pub const MAX_DIMENSION: u32 = 1024;

fn dimensions_ok(width: u32, height: u32) -> bool {
    (3..=MAX_DIMENSION).contains(&width) && (3..=MAX_DIMENSION).contains(&height)
}

/// Layout parameters for a generated grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
    /// Chance that a free interior cell starts as rubble.
    pub rubble_probability: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 13,
            height: 11,
            rubble_probability: 0.2,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ArenaError> {
        if !dimensions_ok(self.width, self.height) {
            return Err(ArenaError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !(0.0..=1.0).contains(&self.rubble_probability) {
            return Err(ArenaError::InvalidRubbleProbability(self.rubble_probability));
        }
        Ok(())
    }
}

/// Fixed-size terrain array, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Terrain>,
}

impl Grid {
    /// Build the maze layout: border ring and even/even pillars are walls, the
    /// rest is rubble with `rubble_probability`, otherwise floor.
    pub fn generate<R: Rng + ?Sized>(config: &GridConfig, rng: &mut R) -> Result<Self, ArenaError> {
        config.validate()?;
        let (width, height) = (config.width, config.height);
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let terrain = if is_structural_wall(width, height, x, y) {
                    Terrain::Wall
                } else if rng.gen::<f64>() < config.rubble_probability {
                    Terrain::Rubble
                } else {
                    Terrain::Floor
                };
                cells.push(terrain);
            }
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Parse a fixed layout: `#` wall, `*` rubble, ` ` or `.` floor.
    /// Every row must have the same length and the outer ring must be wall.
    pub fn from_rows(rows: &[&str]) -> Result<Self, ArenaError> {
        let height = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let width = u32::try_from(rows.first().map(|r| r.chars().count()).unwrap_or(0)).unwrap_or(u32::MAX);
        if !dimensions_ok(width, height) {
            return Err(ArenaError::InvalidDimensions { width, height });
        }

        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() as u32 != width {
                return Err(ArenaError::InvalidLayout(format!(
                    "row {} has {} cells, expected {}",
                    y,
                    row.chars().count(),
                    width
                )));
            }
            for (x, ch) in row.chars().enumerate() {
                let terrain = match ch {
                    '#' => Terrain::Wall,
                    '*' => Terrain::Rubble,
                    ' ' | '.' => Terrain::Floor,
                    other => {
                        return Err(ArenaError::InvalidLayout(format!(
                            "unexpected '{}' at ({}, {})",
                            other, x, y
                        )))
                    }
                };
                let on_border = x == 0 || y == 0 || x as u32 == width - 1 || y as u32 == height - 1;
                if on_border && terrain != Terrain::Wall {
                    return Err(ArenaError::InvalidLayout(format!(
                        "border cell ({}, {}) must be a wall",
                        x, y
                    )));
                }
                cells.push(terrain);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn terrain(&self, pos: GridPos) -> Option<Terrain> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Blast damage: rubble becomes floor, walls and floor are untouched.
    pub(crate) fn clear_rubble(&mut self, pos: GridPos) -> bool {
        match self.index(pos) {
            Some(i) if self.cells[i] == Terrain::Rubble => {
                self.cells[i] = Terrain::Floor;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn index(&self, pos: GridPos) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    /// All cells in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        (0..self.height as i32).flat_map(move |y| (0..self.width as i32).map(move |x| GridPos::new(x, y)))
    }
}

/// Border ring and pillars (both coordinates even).
pub fn is_structural_wall(width: u32, height: u32, x: u32, y: u32) -> bool {
    let on_border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
    on_border || (x % 2 == 0 && y % 2 == 0)
}
