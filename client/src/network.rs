//! Client side of the connection: login handshake, reader and writer tasks.

use log::{debug, info, warn};
use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use shared::{
    Handshake, Hash, LoginRequest, LoginResponse, Packet, PacketBuilder, PacketDecoder,
    PacketEncoder, PacketType, Path, ProtocolError, SessionProfile, PING_INTERVAL_SECS,
};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("server did not answer the login in time")]
    Timeout,

    #[error("server closed the connection")]
    Closed,
}

/// An authenticated connection.
///
/// Inbound messages are queued by a reader task and handed out by `recv`.
/// Dropping the connection stops the writer, which closes the socket.
pub struct Connection {
    outbound: mpsc::UnboundedSender<PacketBuilder>,
    inbound: mpsc::UnboundedReceiver<Packet>,
    closed: watch::Receiver<bool>,
}

impl Connection {
    /// Connects and logs in over TCP.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        username: &str,
        password: &str,
        public_key: &RsaPublicKey,
    ) -> Result<(Self, SessionProfile), ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);
        Self::login(stream, username, password, public_key).await
    }

    /// Runs the login handshake over an established stream.
    ///
    /// Both keystreams start right after the request is written, so the
    /// response is already obfuscated.
    pub async fn login<S>(
        stream: S,
        username: &str,
        password: &str,
        public_key: &RsaPublicKey,
    ) -> Result<(Self, SessionProfile), ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        let mut rng = OsRng;
        let request = LoginRequest::new(username, password, &mut rng);
        let packet = request.encrypt(public_key, &mut rng)?;

        let mut encoder = PacketEncoder::new();
        let mut decoder = PacketDecoder::new();
        let mut handshake = Handshake::client();

        writer.write_all(&encoder.encode_to_vec(&packet)?).await?;
        handshake.login_sent();
        encoder.enable_obfuscation(request.client_seed);
        decoder.enable_obfuscation(request.server_seed);
        debug!("Login request sent for {}", username);

        let mut buffer = Vec::with_capacity(4096);
        let mut response = timeout(
            LOGIN_TIMEOUT,
            read_packet(&mut reader, &mut decoder, &mut buffer),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;

        handshake.admit(response.kind())?;
        let profile = match LoginResponse::read(&mut response)? {
            LoginResponse::Accepted(profile) => *profile,
            LoginResponse::Rejected(reason) => return Err(ClientError::Rejected(reason)),
        };
        handshake.authenticate();
        info!("Logged in as {} at {}", profile.username, profile.location);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (closer, closed) = watch::channel(false);

        tokio::spawn(write_loop(writer, encoder, outbound_rx, closer.subscribe()));
        tokio::spawn(async move {
            if let Err(e) = read_loop(reader, decoder, buffer, handshake, inbound_tx).await {
                warn!("Connection closed: {}", e);
            }
            closer.send_replace(true);
        });

        Ok((
            Self {
                outbound: outbound_tx,
                inbound: inbound_rx,
                closed,
            },
            profile,
        ))
    }

    /// Queues a message. Returns false once the connection is gone.
    pub fn send(&self, packet: PacketBuilder) -> bool {
        !self.is_closed() && self.outbound.send(packet).is_ok()
    }

    /// Next inbound message, or None once the connection has closed.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Packet> {
        self.inbound.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn chat(&self, text: &str) -> bool {
        let mut builder = PacketBuilder::new(PacketType::ChatSend);
        builder.put_string(text);
        self.send(builder)
    }

    pub fn walk(&self, path: &Path) -> bool {
        let mut builder = PacketBuilder::new(PacketType::WalkToSend);
        builder.put_path(path);
        self.send(builder)
    }

    pub fn use_item(&self, slot: u8) -> bool {
        let mut builder = PacketBuilder::new(PacketType::UseItemSend);
        builder.put_u8(slot);
        self.send(builder)
    }

    pub fn add_friend(&self, username: &str) -> bool {
        let mut builder = PacketBuilder::new(PacketType::FriendAddSend);
        builder.put_string(username);
        self.send(builder)
    }

    pub fn remove_friend(&self, friend: &Hash) -> bool {
        let mut builder = PacketBuilder::new(PacketType::FriendRemoveSend);
        builder.put_hash(friend);
        self.send(builder)
    }

    pub fn message_friend(&self, friend: &Hash, text: &str) -> bool {
        let mut builder = PacketBuilder::new(PacketType::FriendMessageSend);
        builder.put_hash(friend).put_string(text);
        self.send(builder)
    }
}

/// Reads until one whole frame has been decoded.
async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut PacketDecoder,
    buffer: &mut Vec<u8>,
) -> Result<Packet, ClientError> {
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(packet) = decoder.decode(buffer)? {
            return Ok(packet);
        }

        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Err(ClientError::Closed);
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Decodes and gates inbound frames until the stream ends or misbehaves.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    mut decoder: PacketDecoder,
    mut buffer: Vec<u8>,
    mut handshake: Handshake,
    inbound: mpsc::UnboundedSender<Packet>,
) -> Result<(), ClientError> {
    loop {
        let packet = match read_packet(&mut reader, &mut decoder, &mut buffer).await {
            Ok(packet) => packet,
            Err(ClientError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };

        handshake.admit(packet.kind())?;
        if inbound.send(packet).is_err() {
            return Ok(());
        }
    }
}

/// Writes queued messages, plus a ping whenever the keep-alive interval passes.
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut encoder: PacketEncoder,
    mut outbound: mpsc::UnboundedReceiver<PacketBuilder>,
    mut closed: watch::Receiver<bool>,
) {
    let period = Duration::from_secs(PING_INTERVAL_SECS);
    let mut keep_alive = interval_at(Instant::now() + period, period);

    loop {
        let packet = tokio::select! {
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
            _ = keep_alive.tick() => PacketBuilder::new(PacketType::PingSend),
            _ = closed.changed() => break,
        };

        let bytes = match encoder.encode_to_vec(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", packet.kind(), e);
                break;
            }
        };

        if let Err(e) = writer.write_all(&bytes).await {
            debug!("Write failed: {}", e);
            break;
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use shared::model::PlayerProfile;
    use shared::Point;
    use tokio_test::io::Builder;

    fn authenticated() -> Handshake {
        let mut handshake = Handshake::client();
        handshake.login_sent();
        handshake.admit(PacketType::LoginResponse).unwrap();
        handshake.authenticate();
        handshake
    }

    fn obfuscated_frames(seed: u64, packets: &[PacketBuilder]) -> Vec<u8> {
        let mut encoder = PacketEncoder::new();
        encoder.enable_obfuscation(seed);
        let mut bytes = Vec::new();
        for packet in packets {
            encoder.encode(packet, &mut bytes).unwrap();
        }
        bytes
    }

    fn message(text: &str) -> PacketBuilder {
        let mut builder = PacketBuilder::new(PacketType::MessageResponse);
        builder.put_string(text);
        builder
    }

    #[tokio::test]
    async fn test_read_loop_queues_split_frames() {
        let bytes = obfuscated_frames(99, &[message("one"), message("two")]);
        let (first, rest) = bytes.split_at(5);
        let reader = Builder::new().read(first).read(rest).build();

        let mut decoder = PacketDecoder::new();
        decoder.enable_obfuscation(99);
        let (tx, mut rx) = mpsc::unbounded_channel();

        read_loop(reader, decoder, Vec::new(), authenticated(), tx)
            .await
            .unwrap();

        let mut one = rx.recv().await.unwrap();
        let mut two = rx.recv().await.unwrap();
        assert_eq!(one.get_string().unwrap(), "one");
        assert_eq!(two.get_string().unwrap(), "two");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_read_loop_rejects_client_kinds() {
        let bytes = obfuscated_frames(5, &[PacketBuilder::new(PacketType::ChatSend)]);
        let reader = Builder::new().read(&bytes).build();

        let mut decoder = PacketDecoder::new();
        decoder.enable_obfuscation(5);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = read_loop(reader, decoder, Vec::new(), authenticated(), tx).await;
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::Unexpected { .. }))
        ));
    }

    #[tokio::test]
    async fn test_write_loop_obfuscates() {
        let mut builder = PacketBuilder::new(PacketType::ChatSend);
        builder.put_string("hi");
        let expected = obfuscated_frames(42, &[builder.clone()]);

        let writer = Builder::new().write(&expected).build();
        let mut encoder = PacketEncoder::new();
        encoder.enable_obfuscation(42);

        let (tx, rx) = mpsc::unbounded_channel();
        let (_closer, closed) = watch::channel(false);
        tx.send(builder).unwrap();
        drop(tx);

        write_loop(writer, encoder, rx, closed).await;
    }

    /// Plays the server end of a login on an in-memory pipe.
    async fn serve_login(
        stream: tokio::io::DuplexStream,
        key: RsaPrivateKey,
        accept: bool,
    ) -> LoginRequest {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut decoder = PacketDecoder::new();
        let mut buffer = Vec::new();

        let packet = read_packet(&mut reader, &mut decoder, &mut buffer).await.unwrap();
        assert_eq!(packet.kind(), PacketType::LoginSend);
        let request = LoginRequest::decrypt(&packet, &key).unwrap();

        let response = if accept {
            let profile = PlayerProfile::new("alice", "secret", Point::new(3, 4));
            LoginResponse::accepted(&profile)
        } else {
            LoginResponse::rejected("Invalid username and/or password.")
        };

        let mut encoder = PacketEncoder::new();
        encoder.enable_obfuscation(request.server_seed);
        writer
            .write_all(&encoder.encode_to_vec(&response).unwrap())
            .await
            .unwrap();
        request
    }

    #[tokio::test]
    async fn test_login_accepted() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&key);
        let (client_end, server_end) = tokio::io::duplex(4096);

        let server = tokio::spawn(serve_login(server_end, key, true));
        let (connection, profile) = Connection::login(client_end, "Alice", "secret", &public_key)
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(request.account, Hash::account("alice"));
        assert_eq!(request.credential, Hash::credential(&request.account, "secret"));
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.location, Point::new(3, 4));
        assert_eq!(profile.stats.len(), 6);
        drop(connection);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&key);
        let (client_end, server_end) = tokio::io::duplex(4096);

        let server = tokio::spawn(serve_login(server_end, key, false));
        let result = Connection::login(client_end, "alice", "wrong", &public_key).await;
        server.await.unwrap();

        match result {
            Err(ClientError::Rejected(reason)) => {
                assert_eq!(reason, "Invalid username and/or password.")
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("login should have been rejected"),
        }
    }
}
