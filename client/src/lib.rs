//! # Game Client Library
//!
//! Client side of the tile world protocol. The client owns no game logic of
//! its own: it logs in, applies whatever the server sends to a local view and
//! turns user intents into requests.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - TCP connection and the RSA-encrypted login request
//! - reader task that checks every inbound kind against the handshake state
//! - writer task with type tag obfuscation and a keep-alive ping every
//!   30 seconds
//!
//! ### Game Module (`game`)
//! - local profile, inventory, stats and friend list
//! - other players in view, with a per-frame diff for renderers
//! - chat and notice log
//! - walk requests, planned with the same A* search the server validates
//!   against
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientWorld;
//! use client::network::Connection;
//! use rsa::pkcs8::DecodePublicKey;
//! use rsa::RsaPublicKey;
//! use shared::{GridMap, Point};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = RsaPublicKey::from_public_key_pem(&std::fs::read_to_string("public.pem")?)?;
//!     let (mut connection, profile) =
//!         Connection::connect("127.0.0.1:36954", "alice", "secret", &key).await?;
//!
//!     let mut world = ClientWorld::new(profile, GridMap::open(256, 256, 32));
//!     if let Some(path) = world.walk_to(Point::new(130, 128)) {
//!         connection.walk(&path);
//!     }
//!
//!     while let Some(packet) = connection.recv().await {
//!         world.apply(packet)?;
//!         world.reset();
//!     }
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
