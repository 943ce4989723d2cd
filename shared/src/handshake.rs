//! Login handshake: the per-connection gate on which message kinds may arrive,
//! and the login request/response payloads.

use rand::{CryptoRng, Rng, RngCore};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

use crate::error::{ProtocolError, Result};
use crate::hash::Hash;
use crate::model::{FriendList, Inventory, PlayerProfile, StatKind, StatList};
use crate::packet::{Direction, Packet, PacketBuilder, PacketType};
use crate::point::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Pending,
    Authenticated,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Pending => "pending",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Session state machine for one end of a connection.
///
/// `admit` is called for every inbound message before it is queued. A
/// rejected message is a protocol violation and the connection must be
/// closed forcefully.
#[derive(Debug, Clone)]
pub struct Handshake {
    role: Role,
    state: SessionState,
    answered: bool,
}

impl Handshake {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Unauthenticated,
            answered: false,
        }
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn admit(&mut self, kind: PacketType) -> Result<()> {
        let allowed = match (self.role, self.state) {
            (Role::Server, SessionState::Unauthenticated) => {
                if kind == PacketType::LoginSend {
                    self.state = SessionState::Pending;
                    true
                } else {
                    false
                }
            }
            (Role::Server, SessionState::Authenticated) => {
                kind.direction() == Direction::ClientToServer && kind != PacketType::LoginSend
            }
            (Role::Client, SessionState::Pending) => {
                if kind == PacketType::LoginResponse && !self.answered {
                    self.answered = true;
                    true
                } else {
                    false
                }
            }
            (Role::Client, SessionState::Authenticated) => {
                kind.direction() == Direction::ServerToClient && kind != PacketType::LoginResponse
            }
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(ProtocolError::Unexpected {
                kind,
                state: self.state.name(),
            })
        }
    }

    /// Client side: the login request has been written.
    pub fn login_sent(&mut self) {
        if self.role == Role::Client && self.state == SessionState::Unauthenticated {
            self.state = SessionState::Pending;
        }
    }

    pub fn authenticate(&mut self) {
        if self.state == SessionState::Pending {
            self.state = SessionState::Authenticated;
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Decrypted login request.
///
/// `client_seed` drives the client→server keystream and `server_seed` the
/// server→client one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRequest {
    pub account: Hash,
    pub credential: Hash,
    pub client_seed: u64,
    pub server_seed: u64,
}

impl LoginRequest {
    pub fn new<R: Rng>(username: &str, password: &str, rng: &mut R) -> Self {
        let account = Hash::account(username);
        Self {
            account,
            credential: Hash::credential(&account, password),
            client_seed: rng.gen(),
            server_seed: rng.gen(),
        }
    }

    pub fn to_packet(&self) -> PacketBuilder {
        let mut builder = PacketBuilder::new(PacketType::LoginSend);
        builder
            .put_hash(&self.account)
            .put_hash(&self.credential)
            .put_u64(self.client_seed)
            .put_u64(self.server_seed);
        builder
    }

    pub fn encrypt<R: CryptoRng + RngCore>(
        &self,
        key: &RsaPublicKey,
        rng: &mut R,
    ) -> Result<PacketBuilder> {
        self.to_packet().encrypt(key, rng)
    }

    pub fn read(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            account: packet.get_hash()?,
            credential: packet.get_hash()?,
            client_seed: packet.get_u64()?,
            server_seed: packet.get_u64()?,
        })
    }

    pub fn decrypt(packet: &Packet, key: &RsaPrivateKey) -> Result<Self> {
        Self::read(&mut packet.decrypt(key)?)
    }
}

/// What a client learns about its own account on a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub id: Hash,
    pub username: String,
    pub location: Point,
    pub inventory: Inventory,
    pub stats: StatList,
    pub friends: FriendList,
    pub registered: u64,
    pub last_session: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResponse {
    Accepted(Box<SessionProfile>),
    Rejected(String),
}

impl LoginResponse {
    pub fn accepted(profile: &PlayerProfile) -> PacketBuilder {
        let mut builder = PacketBuilder::new(PacketType::LoginResponse);
        builder
            .put_bool(true)
            .put_hash(&profile.id)
            .put_string(&profile.username)
            .put_point(profile.location);

        builder.put_u8(profile.inventory.len() as u8);
        for item in profile.inventory.iter() {
            builder.put_item(item);
        }

        for stat in profile.stats.iter() {
            builder.put_stat(stat);
        }

        builder.put_u16(profile.friends.len() as u16);
        for friend in profile.friends.iter() {
            builder.put_friend(friend);
        }

        builder
            .put_date(profile.registered)
            .put_date(profile.last_session);
        builder
    }

    pub fn rejected(reason: &str) -> PacketBuilder {
        let mut builder = PacketBuilder::new(PacketType::LoginResponse);
        builder.put_bool(false).put_string(reason);
        builder
    }

    pub fn read(packet: &mut Packet) -> Result<Self> {
        if !packet.get_bool()? {
            return Ok(LoginResponse::Rejected(packet.get_string()?));
        }

        let id = packet.get_hash()?;
        let username = packet.get_string()?;
        let location = packet.get_point()?;

        let mut inventory = Inventory::new();
        for _ in 0..packet.get_u8()? {
            inventory.add(packet.get_item()?);
        }

        let mut stats = Vec::with_capacity(StatKind::ALL.len());
        for _ in StatKind::ALL {
            stats.push(packet.get_stat()?);
        }

        let mut friends = FriendList::new();
        for _ in 0..packet.get_u16()? {
            friends.add(packet.get_friend()?);
        }

        Ok(LoginResponse::Accepted(Box::new(SessionProfile {
            id,
            username,
            location,
            inventory,
            stats: StatList::new(stats),
            friends,
            registered: packet.get_date()?,
            last_session: packet.get_date()?,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Friend, Item};

    #[test]
    fn test_server_rejects_non_login_first() {
        let mut handshake = Handshake::server();
        assert!(handshake.admit(PacketType::ChatSend).is_err());
        assert_eq!(handshake.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_server_pending_rejects_everything() {
        let mut handshake = Handshake::server();
        handshake.admit(PacketType::LoginSend).unwrap();
        assert_eq!(handshake.state(), SessionState::Pending);

        assert!(handshake.admit(PacketType::LoginSend).is_err());
        assert!(handshake.admit(PacketType::PingSend).is_err());
    }

    #[test]
    fn test_server_authenticated_accepts_client_kinds() {
        let mut handshake = Handshake::server();
        handshake.admit(PacketType::LoginSend).unwrap();
        handshake.authenticate();
        assert!(handshake.is_authenticated());

        for kind in PacketType::ALL {
            let expected = kind.direction() == Direction::ClientToServer
                && kind != PacketType::LoginSend;
            assert_eq!(handshake.admit(kind).is_ok(), expected, "{:?}", kind);
        }
    }

    #[test]
    fn test_client_accepts_single_login_response() {
        let mut handshake = Handshake::client();
        assert!(handshake.admit(PacketType::LoginResponse).is_err());

        handshake.login_sent();
        assert!(handshake.admit(PacketType::PlayersAddResponse).is_err());
        handshake.admit(PacketType::LoginResponse).unwrap();
        assert!(handshake.admit(PacketType::LoginResponse).is_err());

        handshake.authenticate();
        handshake.admit(PacketType::PlayersAddResponse).unwrap();
        assert!(handshake.admit(PacketType::ChatSend).is_err());
    }

    #[test]
    fn test_closed_admits_nothing() {
        let mut handshake = Handshake::server();
        handshake.close();
        assert!(handshake.admit(PacketType::LoginSend).is_err());
    }

    #[test]
    fn test_login_request_encryption() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);

        let request = LoginRequest::new("Alice", "hunter2", &mut rng);
        let wire = request.encrypt(&public, &mut rng).unwrap();
        assert_eq!(wire.kind(), PacketType::LoginSend);

        let decoded = LoginRequest::decrypt(&wire.into_packet(), &private).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.account, Hash::account("alice"));
    }

    #[test]
    fn test_login_response_carries_profile() {
        let mut profile = PlayerProfile::new("alice", "pw", Point::new(12, 34));
        profile.inventory.add(Item::new(1));
        profile.friends.add(Friend::new(Hash::account("bob"), "bob"));

        let mut packet = LoginResponse::accepted(&profile).into_packet();
        let response = LoginResponse::read(&mut packet).unwrap();
        assert!(packet.is_exhausted());

        match response {
            LoginResponse::Accepted(session) => {
                assert_eq!(session.id, profile.id);
                assert_eq!(session.username, "alice");
                assert_eq!(session.location, Point::new(12, 34));
                assert_eq!(session.inventory, profile.inventory);
                assert_eq!(session.stats, profile.stats);
                assert!(session.friends.contains(&Hash::account("bob")));
                assert_eq!(session.registered, profile.registered);
            }
            LoginResponse::Rejected(reason) => panic!("unexpected rejection: {}", reason),
        }
    }

    #[test]
    fn test_login_rejection_reason() {
        let reason = crate::error::LoginError::AlreadyLoggedIn.to_string();
        let mut packet = LoginResponse::rejected(&reason).into_packet();

        assert_eq!(
            LoginResponse::read(&mut packet).unwrap(),
            LoginResponse::Rejected("Account already in use.".to_string())
        );
    }
}
