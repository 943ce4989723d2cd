use thiserror::Error;

use crate::packet::PacketType;

/// Failures that desynchronise a connection.
///
/// The protocol has no way to resynchronise, so every variant is fatal to the
/// connection that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown packet type tag {0}")]
    UnknownPacketType(u32),

    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("payload underflow: needed {needed} bytes, {remaining} remaining")]
    PayloadUnderflow { needed: usize, remaining: usize },

    #[error("unterminated string in payload")]
    UnterminatedString,

    #[error("string is not valid UTF-8")]
    InvalidString,

    #[error("invalid enum value {value} for {name}")]
    InvalidEnum { name: &'static str, value: u8 },

    #[error("{kind:?} is not allowed while the session is {state}")]
    Unexpected { kind: PacketType, state: &'static str },

    #[error("login payload could not be decrypted")]
    Decryption,

    #[error("login payload could not be encrypted: {0}")]
    Encryption(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Reasons a login is refused. The display text is sent to the client verbatim.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoginError {
    #[error("Invalid username and/or password.")]
    InvalidCredentials,

    #[error("Account already in use.")]
    AlreadyLoggedIn,

    #[error("Profile corrupt! Please contact support.")]
    CorruptProfile,
}
