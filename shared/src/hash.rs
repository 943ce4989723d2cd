use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque fixed-length identity, used as the key for every entity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; Hash::LENGTH]);

impl Hash {
    pub const LENGTH: usize = 32;

    /// Digests UTF-8 text.
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    /// Parses the 64 character lowercase or uppercase hex form.
    pub fn from_hex(text: &str) -> Option<Self> {
        let bytes: [u8; Self::LENGTH] = hex::decode(text).ok()?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Account identity derived from a username; usernames are case-insensitive.
    pub fn account(username: &str) -> Self {
        Self::of(&username.to_lowercase())
    }

    /// Credential salted with the account identity.
    pub fn credential(account: &Hash, password: &str) -> Self {
        Self::of(&format!("{}{}", account.to_hex(), password))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
