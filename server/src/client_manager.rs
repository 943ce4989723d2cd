//! Connection bookkeeping for the game server
//!
//! Every accepted TCP connection gets an entry here until its reader task
//! exits. The manager owns:
//! - the per-connection handshake gate that decides which messages are legal
//! - the outbound queue handle used to reach the connection
//! - activity timestamps for idle timeouts
//!
//! Connection ids are local to this process and unrelated to player ids.

use log::{debug, info};
use shared::{Handshake, Hash, PacketType, ProtocolError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::network::Outbox;

/// One open connection
#[derive(Debug)]
pub struct Client {
    /// Connection id assigned by the server
    pub id: u32,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Last time any frame arrived on this connection
    pub last_seen: Instant,
    /// Login state machine gating inbound message kinds
    pub handshake: Handshake,
    /// Player bound to the connection once the login succeeded
    pub player: Option<Hash>,
    outbox: Outbox,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, outbox: Outbox) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            handshake: Handshake::server(),
            player: None,
            outbox,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Checks if the client has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All open connections, capped at `max_clients`
///
/// Shared between the acceptor, the per-connection reader tasks, the
/// timeout checker and the tick loop behind a `tokio::sync::RwLock`.
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
    pre_auth_timeout: Duration,
    post_auth_timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, pre_auth_timeout: Duration, post_auth_timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            pre_auth_timeout,
            post_auth_timeout,
        }
    }

    /// Registers a connection
    ///
    /// Returns None when the server is at capacity; the caller should drop
    /// the socket without reading from it.
    pub fn add_client(&mut self, addr: SocketAddr, outbox: Outbox) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbox));

        Some(client_id)
    }

    /// Removes a connection, returning its final state
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: &u32) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Runs an inbound message kind through the connection's handshake gate
    ///
    /// Also refreshes the idle timer. An error means the connection has
    /// violated the protocol and must be closed forcefully.
    pub fn admit(&mut self, client_id: u32, kind: PacketType) -> Result<(), ProtocolError> {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return Err(ProtocolError::Unexpected {
                kind,
                state: "closed",
            });
        };

        client.last_seen = Instant::now();
        client.handshake.admit(kind)
    }

    /// Binds a player to a connection whose login was accepted
    pub fn authenticate(&mut self, client_id: u32, player: Hash) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.handshake.authenticate();
                client.player = Some(player);
                debug!("Client {} authenticated as {}", client_id, player);
                true
            }
            None => false,
        }
    }

    /// Marks a connection whose login was refused
    pub fn reject(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.handshake.close();
        }
    }

    pub fn player_of(&self, client_id: u32) -> Option<Hash> {
        self.clients.get(&client_id).and_then(|c| c.player)
    }

    pub fn outbox(&self, client_id: u32) -> Option<Outbox> {
        self.clients.get(&client_id).map(|c| c.outbox.clone())
    }

    /// Force-closes idle connections
    ///
    /// Connections that have not logged in get the shorter timeout. The
    /// entries stay until their reader task notices the close and removes
    /// them, so a slow reader may be reported more than once.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .values()
            .filter(|client| {
                let timeout = if client.handshake.is_authenticated() {
                    self.post_auth_timeout
                } else {
                    self.pre_auth_timeout
                };
                client.is_timed_out(timeout)
            })
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            if let Some(client) = self.clients.get(client_id) {
                info!("Client {} timed out", client_id);
                client.outbox.force_close();
            }
        }

        timed_out
    }

    /// Outboxes of every connection, for shutdown
    pub fn outboxes(&self) -> Vec<Outbox> {
        self.clients.values().map(|c| c.outbox.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
