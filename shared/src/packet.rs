use rand::{CryptoRng, RngCore};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{ProtocolError, Result};
use crate::hash::Hash;
use crate::model::{Friend, Item, Stat, StatKind};
use crate::point::{Path, Point};

/// Which peer originates a message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Closed set of message kinds. The wire tag is the declaration ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    LoginSend,
    LoginResponse,
    PingSend,
    ChatSend,
    ChatResponse,
    MessageResponse,
    UseItemSend,
    FriendLoginResponse,
    FriendAddSend,
    FriendAddResponse,
    FriendMessageSend,
    FriendMessageResponse,
    FriendRemoveSend,
    FriendRemoveResponse,
    PlayersAddResponse,
    PlayersRemoveResponse,
    PlayersUpdateResponse,
    InventoryAddResponse,
    InventoryRemoveResponse,
    InventoryUpdateResponse,
    WalkToSend,
    StatUpdateResponse,
}

impl PacketType {
    pub const ALL: [PacketType; 22] = [
        PacketType::LoginSend,
        PacketType::LoginResponse,
        PacketType::PingSend,
        PacketType::ChatSend,
        PacketType::ChatResponse,
        PacketType::MessageResponse,
        PacketType::UseItemSend,
        PacketType::FriendLoginResponse,
        PacketType::FriendAddSend,
        PacketType::FriendAddResponse,
        PacketType::FriendMessageSend,
        PacketType::FriendMessageResponse,
        PacketType::FriendRemoveSend,
        PacketType::FriendRemoveResponse,
        PacketType::PlayersAddResponse,
        PacketType::PlayersRemoveResponse,
        PacketType::PlayersUpdateResponse,
        PacketType::InventoryAddResponse,
        PacketType::InventoryRemoveResponse,
        PacketType::InventoryUpdateResponse,
        PacketType::WalkToSend,
        PacketType::StatUpdateResponse,
    ];

    pub fn from_tag(tag: u32) -> Result<Self> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(ProtocolError::UnknownPacketType(tag))
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn direction(self) -> Direction {
        match self {
            PacketType::LoginSend
            | PacketType::PingSend
            | PacketType::ChatSend
            | PacketType::UseItemSend
            | PacketType::FriendAddSend
            | PacketType::FriendMessageSend
            | PacketType::FriendRemoveSend
            | PacketType::WalkToSend => Direction::ClientToServer,
            _ => Direction::ServerToClient,
        }
    }
}

/// A received message: its kind plus a sequential read cursor over the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: PacketType,
    payload: Vec<u8>,
    position: usize,
}

impl Packet {
    pub fn new(kind: PacketType, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            position: 0,
        }
    }

    pub fn kind(&self) -> PacketType {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Decrypts the whole payload with the server's private key.
    pub fn decrypt(&self, key: &RsaPrivateKey) -> Result<Packet> {
        let plain = key
            .decrypt(Pkcs1v15Encrypt, &self.payload)
            .map_err(|_| ProtocolError::Decryption)?;

        Ok(Packet::new(self.kind, plain))
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        if self.remaining() < count {
            return Err(ProtocolError::PayloadUnderflow {
                needed: count,
                remaining: self.remaining(),
            });
        }

        let start = self.position;
        self.position += count;
        Ok(&self.payload[start..self.position])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Milliseconds since the Unix epoch.
    pub fn get_date(&mut self) -> Result<u64> {
        self.get_u64()
    }

    pub fn get_string(&mut self) -> Result<String> {
        let rest = &self.payload[self.position..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedString)?;

        let text = std::str::from_utf8(&rest[..end])
            .map_err(|_| ProtocolError::InvalidString)?
            .to_string();

        self.position += end + 1;
        Ok(text)
    }

    pub fn get_hash(&mut self) -> Result<Hash> {
        Ok(Hash::from_bytes(self.take_array()?))
    }

    pub fn get_point(&mut self) -> Result<Point> {
        let x = self.get_i16()? as i32;
        let y = self.get_i16()? as i32;
        Ok(Point::new(x, y))
    }

    pub fn get_path(&mut self) -> Result<Path> {
        let count = self.get_u16()?;
        let mut path = Path::new();
        for _ in 0..count {
            path.append(self.get_point()?);
        }
        Ok(path)
    }

    pub fn get_item(&mut self) -> Result<Item> {
        Ok(Item {
            id: self.get_u16()?,
            amount: self.get_u64()?,
            equipped: self.get_bool()?,
        })
    }

    pub fn get_stat(&mut self) -> Result<Stat> {
        let value = self.get_u8()?;
        let kind = StatKind::from_u8(value).ok_or(ProtocolError::InvalidEnum {
            name: "StatKind",
            value,
        })?;

        Ok(Stat {
            kind,
            experience: self.get_u64()?,
            current: self.get_i16()?,
        })
    }

    pub fn get_friend(&mut self) -> Result<Friend> {
        Ok(Friend {
            id: self.get_hash()?,
            username: self.get_string()?,
            online: self.get_bool()?,
        })
    }
}

/// An outbound message under construction. The payload grows as fields are put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuilder {
    kind: PacketType,
    payload: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(kind: PacketType) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }

    pub fn kind(&self) -> PacketType {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encrypts the whole payload with the server's public key.
    pub fn encrypt<R: CryptoRng + RngCore>(
        &self,
        key: &RsaPublicKey,
        rng: &mut R,
    ) -> Result<PacketBuilder> {
        let cipher = key
            .encrypt(rng, Pkcs1v15Encrypt, &self.payload)
            .map_err(|e| ProtocolError::Encryption(e.to_string()))?;

        Ok(PacketBuilder {
            kind: self.kind,
            payload: cipher,
        })
    }

    /// Reinterprets the built payload as a received packet.
    pub fn into_packet(self) -> Packet {
        Packet::new(self.kind, self.payload)
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u8(value as u8)
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.payload.push(value);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.payload.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.payload.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.payload.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.payload.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_date(&mut self, millis: u64) -> &mut Self {
        self.put_u64(millis)
    }

    /// Writes UTF-8 followed by a NUL terminator. Interior NULs are dropped.
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.payload.extend(value.bytes().filter(|&b| b != 0));
        self.payload.push(0);
        self
    }

    pub fn put_hash(&mut self, hash: &Hash) -> &mut Self {
        self.payload.extend_from_slice(hash.as_bytes());
        self
    }

    pub fn put_point(&mut self, point: Point) -> &mut Self {
        self.put_i16(point.x as i16).put_i16(point.y as i16)
    }

    pub fn put_path(&mut self, path: &Path) -> &mut Self {
        self.put_u16(path.len() as u16);
        for &step in path {
            self.put_point(step);
        }
        self
    }

    pub fn put_item(&mut self, item: &Item) -> &mut Self {
        self.put_u16(item.id)
            .put_u64(item.amount)
            .put_bool(item.equipped)
    }

    pub fn put_stat(&mut self, stat: &Stat) -> &mut Self {
        self.put_u8(stat.kind.as_u8())
            .put_u64(stat.experience)
            .put_i16(stat.current)
    }

    pub fn put_friend(&mut self, friend: &Friend) -> &mut Self {
        self.put_hash(&friend.id)
            .put_string(&friend.username)
            .put_bool(friend.online)
    }
}
