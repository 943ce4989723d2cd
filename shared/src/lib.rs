pub mod codec;
pub mod entity;
pub mod error;
pub mod handshake;
pub mod hash;
pub mod isaac;
pub mod map;
pub mod model;
pub mod packet;
pub mod pathfinder;
pub mod point;

pub use codec::{PacketDecoder, PacketEncoder};
pub use entity::{Entity, EntityList};
pub use error::{LoginError, ProtocolError};
pub use handshake::{Handshake, LoginRequest, LoginResponse, Role, SessionProfile, SessionState};
pub use hash::Hash;
pub use isaac::Isaac;
pub use map::{GridMap, Tile, TileMap};
pub use packet::{Direction, Packet, PacketBuilder, PacketType};
pub use pathfinder::PathFinder;
pub use point::{Path, Point};

pub const DEFAULT_PORT: u16 = 36954;

/// Players farther apart than this many tiles do not see each other.
pub const VIEW_DISTANCE: f64 = 64.0;
pub const CHAT_RADIUS: f64 = 32.0;

pub const TICK_INTERVAL_MS: u64 = 200;
pub const PING_INTERVAL_SECS: u64 = 30;
