//! # Game Server Library
//!
//! Authoritative server for the tile world. Clients connect over TCP, log in
//! with an RSA-encrypted request and then exchange length-framed messages
//! whose type tags are obfuscated with per-direction ISAAC keystreams.
//!
//! ## Architecture
//!
//! ### Connection tasks
//! Each connection runs a reader and a writer task. The reader decodes frames,
//! checks them against the connection's handshake state and queues them for
//! the tick. It never touches the world. A protocol violation closes the
//! connection at once.
//!
//! ### Tick loop
//! A single task wakes every tick (200 ms by default), drains the queue and
//! then runs the world synchronization pass:
//! - players take one step along their current path
//! - every player's interest set is pruned and grown against view distance
//! - add/remove/update lists are sent to each player
//! - friends are told about logins and logouts
//!
//! Since every world mutation happens here, world state needs no locking.
//!
//! ### Persistence
//! Profiles are loaded from a [`persistence::ProfileStore`] at login and saved
//! back at logout. The server binary flushes the store to disk on shutdown.
//!
//! ## Module Organization
//!
//! - `client_manager`: open connections, handshake gates and idle timeouts
//! - `config`: runtime settings
//! - `handlers`: dispatch of authenticated client messages
//! - `network`: the listener, connection tasks and the tick loop
//! - `persistence`: profile storage
//! - `player`: per-player state and outbound message helpers
//! - `world`: the authoritative player set and the synchronization pass
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rand::rngs::OsRng;
//! use rsa::RsaPrivateKey;
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::persistence::MemoryStore;
//! use server::world::WorldManager;
//! use shared::{GridMap, Point};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut store = MemoryStore::new();
//!     store.register("alice", "secret", Point::new(16, 16))?;
//!
//!     let world = WorldManager::new(GridMap::open(256, 256, 32), store);
//!     let key = RsaPrivateKey::new(&mut OsRng, 1024)?;
//!
//!     let mut server = Server::new(ServerConfig::default(), world, key).await?;
//!     server.run().await
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod handlers;
pub mod network;
pub mod persistence;
pub mod player;
pub mod world;
