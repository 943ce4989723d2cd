use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path as FsPath;
use thiserror::Error;

use crate::point::Point;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("map encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("map claims {width}x{height} tiles but holds {actual}")]
    Dimensions {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("map is {width}x{height} tiles, at most {max} per side fit the wire format")]
    TooLarge { width: u32, height: u32, max: u32 },
}

/// One map cell. Wall values are style indices; zero means no wall.
///
/// A vertical wall on `(x, y)` stands between columns `x - 1` and `x`. A
/// horizontal wall on `(x, y)` stands between rows `y` and `y + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub elevation: u8,
    pub texture: u8,
    pub overlay: u8,
    pub h_wall: u8,
    pub v_wall: u8,
    pub walkable: bool,
}

impl Tile {
    pub fn open() -> Self {
        Self {
            walkable: true,
            ..Self::default()
        }
    }

    pub fn has_h_wall(&self) -> bool {
        self.h_wall > 0
    }

    pub fn has_v_wall(&self) -> bool {
        self.v_wall > 0
    }

    pub fn is_blocked_horizontally(&self) -> bool {
        self.has_h_wall() || !self.walkable
    }

    pub fn is_blocked_vertically(&self) -> bool {
        self.has_v_wall() || !self.walkable
    }
}

/// Read access to map topology.
pub trait TileMap {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    /// Side length of a storage sector, also the default search radius.
    fn sector_size(&self) -> i32;
    fn tile(&self, x: i32, y: i32) -> Option<&Tile>;

    fn tile_at(&self, p: Point) -> Option<&Tile> {
        self.tile(p.x, p.y)
    }

    /// Whether a single step between adjacent tiles (diagonals included) is
    /// legal. Used both while searching and when applying a step.
    fn is_valid_step(&self, from: Point, to: Point) -> bool {
        let dx = to.x - from.x;
        let dy = to.y - from.y;

        if dx.abs() > 1 || dy.abs() > 1 || (dx == 0 && dy == 0) {
            return false;
        }

        if self.tile_at(from).is_none() {
            return false;
        }

        match self.tile_at(to) {
            Some(tile) if tile.walkable => {}
            _ => return false,
        }

        let blocked_v = |x: i32, y: i32| self.tile(x, y).map_or(true, Tile::is_blocked_vertically);
        let blocked_h = |x: i32, y: i32| self.tile(x, y).map_or(true, Tile::is_blocked_horizontally);

        if dx != 0 {
            let bx = from.x.max(to.x);
            if blocked_v(bx, from.y) || (dy != 0 && blocked_v(bx, to.y)) {
                return false;
            }
        }

        if dy != 0 {
            let by = from.y.min(to.y);
            if blocked_h(from.x, by) || (dx != 0 && blocked_h(to.x, by)) {
                return false;
            }
        }

        if dx != 0 && dy != 0 {
            let corners = [Point::new(to.x, from.y), Point::new(from.x, to.y)];
            if corners
                .iter()
                .any(|&c| !self.tile_at(c).map_or(false, |t| t.walkable))
            {
                return false;
            }
        }

        true
    }
}

/// Dense in-memory map, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMap {
    width: u32,
    height: u32,
    sector_size: u32,
    tiles: Vec<Tile>,
}

impl GridMap {
    /// Coordinates travel as signed 16-bit values, so no side may exceed this.
    pub const MAX_DIMENSION: u32 = 1 << 15;

    /// Sides larger than [`GridMap::MAX_DIMENSION`] are clamped.
    pub fn new(width: u32, height: u32, sector_size: u32, fill: Tile) -> Self {
        if width > Self::MAX_DIMENSION || height > Self::MAX_DIMENSION {
            warn!(
                "Clamping {}x{} map to at most {} tiles per side",
                width,
                height,
                Self::MAX_DIMENSION
            );
        }
        let width = width.min(Self::MAX_DIMENSION);
        let height = height.min(Self::MAX_DIMENSION);

        Self {
            width,
            height,
            sector_size: sector_size.max(1),
            tiles: vec![fill; width as usize * height as usize],
        }
    }

    /// Every tile walkable and free of walls.
    pub fn open(width: u32, height: u32, sector_size: u32) -> Self {
        Self::new(width, height, sector_size, Tile::open())
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_mut(&mut self, x: i32, y: i32) -> Option<&mut Tile> {
        let index = self.index(x, y)?;
        self.tiles.get_mut(index)
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) -> bool {
        match self.tile_mut(x, y) {
            Some(slot) => {
                *slot = tile;
                true
            }
            None => false,
        }
    }

    pub fn set_walkable(&mut self, x: i32, y: i32, walkable: bool) -> bool {
        self.tile_mut(x, y).map(|t| t.walkable = walkable).is_some()
    }

    pub fn set_h_wall(&mut self, x: i32, y: i32, style: u8) -> bool {
        self.tile_mut(x, y).map(|t| t.h_wall = style).is_some()
    }

    pub fn set_v_wall(&mut self, x: i32, y: i32, style: u8) -> bool {
        self.tile_mut(x, y).map(|t| t.v_wall = style).is_some()
    }

    pub fn load(path: impl AsRef<FsPath>) -> Result<Self, MapError> {
        let file = File::open(path.as_ref())?;
        let map: GridMap = bincode::deserialize_from(BufReader::new(file))?;

        if map.width > Self::MAX_DIMENSION || map.height > Self::MAX_DIMENSION {
            return Err(MapError::TooLarge {
                width: map.width,
                height: map.height,
                max: Self::MAX_DIMENSION,
            });
        }

        let expected = map.width as usize * map.height as usize;
        if map.tiles.len() != expected {
            return Err(MapError::Dimensions {
                width: map.width,
                height: map.height,
                actual: map.tiles.len(),
            });
        }

        info!("Loaded {} from {}", map, path.as_ref().display());
        Ok(map)
    }

    pub fn save(&self, path: impl AsRef<FsPath>) -> Result<(), MapError> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl TileMap for GridMap {
    fn width(&self) -> i32 {
        self.width as i32
    }

    fn height(&self) -> i32 {
        self.height as i32
    }

    fn sector_size(&self) -> i32 {
        self.sector_size as i32
    }

    fn tile(&self, x: i32, y: i32) -> Option<&Tile> {
        self.index(x, y).and_then(|i| self.tiles.get(i))
    }
}

impl fmt::Display for GridMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "map[width = {}, height = {}, sectorSize = {}]",
            self.width, self.height, self.sector_size
        )
    }
}
