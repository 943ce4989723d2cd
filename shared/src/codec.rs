//! Frame codec: `[u32 tag][u32 payload length][payload]`, big-endian.
//!
//! Decoding is resumable. Bytes are only removed from the input buffer once a
//! whole frame is available, so a short read simply leaves everything in place
//! for the next attempt.

use log::trace;

use crate::error::{ProtocolError, Result};
use crate::isaac::Isaac;
use crate::packet::{Packet, PacketBuilder, PacketType};

pub const HEADER_SIZE: usize = 8;
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct PacketDecoder {
    keystream: Option<Isaac>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts de-obfuscating tags with the peer's outgoing seed.
    pub fn enable_obfuscation(&mut self, seed: u64) {
        self.keystream = Some(Isaac::new(seed));
    }

    pub fn is_obfuscated(&self) -> bool {
        self.keystream.is_some()
    }

    /// Takes one frame off the front of `buffer`, or returns `Ok(None)` and
    /// leaves the buffer untouched if the frame is not complete yet.
    pub fn decode(&mut self, buffer: &mut Vec<u8>) -> Result<Option<Packet>> {
        if buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let raw_tag = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;

        if size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if buffer.len() < HEADER_SIZE + size {
            return Ok(None);
        }

        let tag = match self.keystream.as_mut() {
            Some(keystream) => raw_tag.wrapping_sub(keystream.next_u32()),
            None => raw_tag,
        };
        let kind = PacketType::from_tag(tag)?;

        let payload = buffer[HEADER_SIZE..HEADER_SIZE + size].to_vec();
        buffer.drain(..HEADER_SIZE + size);

        trace!("Decoded {:?} with {} byte payload", kind, size);
        Ok(Some(Packet::new(kind, payload)))
    }
}

#[derive(Debug, Default)]
pub struct PacketEncoder {
    keystream: Option<Isaac>,
}

impl PacketEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts obfuscating tags with this side's outgoing seed.
    pub fn enable_obfuscation(&mut self, seed: u64) {
        self.keystream = Some(Isaac::new(seed));
    }

    pub fn is_obfuscated(&self) -> bool {
        self.keystream.is_some()
    }

    /// Appends one frame to `out`.
    pub fn encode(&mut self, packet: &PacketBuilder, out: &mut Vec<u8>) -> Result<()> {
        let size = packet.size();
        if size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let tag = match self.keystream.as_mut() {
            Some(keystream) => packet.kind().tag().wrapping_add(keystream.next_u32()),
            None => packet.kind().tag(),
        };

        out.reserve(HEADER_SIZE + size);
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&(size as u32).to_be_bytes());
        out.extend_from_slice(packet.payload());
        Ok(())
    }

    pub fn encode_to_vec(&mut self, packet: &PacketBuilder) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_SIZE + packet.size());
        self.encode(packet, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(text: &str) -> PacketBuilder {
        let mut builder = PacketBuilder::new(PacketType::ChatSend);
        builder.put_string(text);
        builder
    }

    #[test]
    fn test_header_split_is_resumable() {
        let mut encoder = PacketEncoder::new();
        let frame = encoder.encode_to_vec(&chat("hi")).unwrap();

        let mut decoder = PacketDecoder::new();
        let mut buffer = frame[..4].to_vec();
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), 4);

        buffer.extend_from_slice(&frame[4..]);
        let mut packet = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(packet.kind(), PacketType::ChatSend);
        assert_eq!(packet.get_string().unwrap(), "hi");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_payload_rolls_back() {
        let mut encoder = PacketEncoder::new();
        let frame = encoder.encode_to_vec(&chat("hello there")).unwrap();

        let mut decoder = PacketDecoder::new();
        let mut buffer = frame[..HEADER_SIZE + 3].to_vec();
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), HEADER_SIZE + 3);

        buffer.extend_from_slice(&frame[HEADER_SIZE + 3..]);
        assert!(decoder.decode(&mut buffer).unwrap().is_some());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut encoder = PacketEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&chat("one"), &mut buffer).unwrap();
        encoder
            .encode(&PacketBuilder::new(PacketType::PingSend), &mut buffer)
            .unwrap();

        let mut decoder = PacketDecoder::new();
        let mut first = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(first.get_string().unwrap(), "one");
        let second = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(second.kind(), PacketType::PingSend);
        assert_eq!(second.size(), 0);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&99u32.to_be_bytes());
        buffer.extend_from_slice(&0u32.to_be_bytes());

        let mut decoder = PacketDecoder::new();
        assert_eq!(
            decoder.decode(&mut buffer),
            Err(ProtocolError::UnknownPacketType(99))
        );
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&0u32.to_be_bytes());
        buffer.extend_from_slice(&((MAX_PAYLOAD_SIZE + 1) as u32).to_be_bytes());

        let mut decoder = PacketDecoder::new();
        assert!(matches!(
            decoder.decode(&mut buffer),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_obfuscated_frames_with_mirrored_seed() {
        let mut encoder = PacketEncoder::new();
        encoder.enable_obfuscation(0xfeed);
        let mut decoder = PacketDecoder::new();
        decoder.enable_obfuscation(0xfeed);

        let mut buffer = Vec::new();
        for kind in PacketType::ALL {
            encoder
                .encode(&PacketBuilder::new(kind), &mut buffer)
                .unwrap();
        }

        for kind in PacketType::ALL {
            let packet = decoder.decode(&mut buffer).unwrap().unwrap();
            assert_eq!(packet.kind(), kind);
        }
    }

    #[test]
    fn test_obfuscation_hides_tag() {
        let mut plain = PacketEncoder::new();
        let mut masked = PacketEncoder::new();
        masked.enable_obfuscation(7);

        let builder = PacketBuilder::new(PacketType::PingSend);
        let clear = plain.encode_to_vec(&builder).unwrap();
        let hidden: Vec<Vec<u8>> = (0..8)
            .map(|_| masked.encode_to_vec(&builder).unwrap())
            .collect();

        assert!(hidden.iter().any(|frame| frame[..4] != clear[..4]));
    }

    #[test]
    fn test_mismatched_seed_desyncs() {
        let mut encoder = PacketEncoder::new();
        encoder.enable_obfuscation(1);
        let mut decoder = PacketDecoder::new();
        decoder.enable_obfuscation(2);

        let mut buffer = Vec::new();
        for _ in 0..16 {
            encoder
                .encode(&PacketBuilder::new(PacketType::PingSend), &mut buffer)
                .unwrap();
        }

        let mut all_ping = true;
        for _ in 0..16 {
            match decoder.decode(&mut buffer) {
                Ok(Some(packet)) if packet.kind() == PacketType::PingSend => {}
                _ => {
                    all_ping = false;
                    break;
                }
            }
        }
        assert!(!all_ping);
    }

    #[test]
    fn test_keystream_only_advances_on_complete_frames() {
        let mut encoder = PacketEncoder::new();
        encoder.enable_obfuscation(3);
        let frame = encoder.encode_to_vec(&chat("resumed")).unwrap();

        let mut decoder = PacketDecoder::new();
        decoder.enable_obfuscation(3);

        let mut buffer = Vec::new();
        for byte in frame {
            buffer.push(byte);
            if let Some(mut packet) = decoder.decode(&mut buffer).unwrap() {
                assert_eq!(packet.kind(), PacketType::ChatSend);
                assert_eq!(packet.get_string().unwrap(), "resumed");
            }
        }
        assert!(buffer.is_empty());
    }
}
