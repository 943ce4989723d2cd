//! Server network layer: TCP connections, per-connection tasks and the tick loop

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::handlers;
use crate::player::Player;
use crate::world::WorldManager;
use log::{debug, error, info, warn};
use rsa::RsaPrivateKey;
use shared::{
    Hash, LoginRequest, LoginResponse, Packet, PacketBuilder, PacketDecoder, PacketEncoder,
    PacketType,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::interval;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Instructions for a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    Packet(PacketBuilder),
    /// Start obfuscating type tags of every later frame.
    EnableObfuscation(u64),
    /// Flush what is queued, then close.
    Close,
}

/// Handle for queuing outbound frames on one connection
///
/// Sends never block. Anything queued after the connection closed is
/// silently dropped.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
    closer: Arc<watch::Sender<bool>>,
}

impl Outbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>, watch::Receiver<bool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (closer, closed) = watch::channel(false);
        (
            Self {
                tx,
                closer: Arc::new(closer),
            },
            rx,
            closed,
        )
    }

    pub fn send(&self, packet: PacketBuilder) {
        if self.tx.send(Outbound::Packet(packet)).is_err() {
            debug!("Dropped outbound packet for closed connection");
        }
    }

    pub fn enable_obfuscation(&self, seed: u64) {
        let _ = self.tx.send(Outbound::EnableObfuscation(seed));
    }

    /// Closes after everything already queued has been written.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Closes immediately, discarding anything still queued.
    pub fn force_close(&self) {
        self.closer.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closer.borrow() || self.tx.is_closed()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.closer.subscribe()
    }
}

/// Messages sent from connection tasks to the tick loop
#[derive(Debug)]
pub enum ServerMessage {
    LoginReceived {
        client_id: u32,
        request: LoginRequest,
    },
    PacketReceived {
        client_id: u32,
        packet: Packet,
    },
    Disconnected {
        client_id: u32,
        player: Option<Hash>,
    },
}

/// Authoritative game server
///
/// Connection tasks only decode, gate and queue. Every change to the world
/// happens on the tick, which drains the queue first.
pub struct Server {
    listener: Arc<TcpListener>,
    clients: Arc<RwLock<ClientManager>>,
    world: WorldManager,
    private_key: Arc<RsaPrivateKey>,
    tick_duration: Duration,
    tick: u64,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        world: WorldManager,
        private_key: RsaPrivateKey,
    ) -> Result<Self, BoxError> {
        let listener = Arc::new(TcpListener::bind(config.bind_addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.pre_auth_timeout,
                config.post_auth_timeout,
            ))),
            world,
            private_key: Arc::new(private_key),
            tick_duration: config.tick_interval,
            tick: 0,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn world(&self) -> &WorldManager {
        &self.world
    }

    /// Spawns task that accepts connections and starts their reader and writer
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let clients = Arc::clone(&self.clients);
        let private_key = Arc::clone(&self.private_key);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };

                Self::start_connection(
                    stream,
                    addr,
                    Arc::clone(&clients),
                    Arc::clone(&private_key),
                    server_tx.clone(),
                )
                .await;
            }
        });
    }

    async fn start_connection(
        stream: TcpStream,
        addr: SocketAddr,
        clients: Arc<RwLock<ClientManager>>,
        private_key: Arc<RsaPrivateKey>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let (outbox, outbound_rx, closed) = Outbox::new();

        let client_id = {
            let mut clients_guard = clients.write().await;
            clients_guard.add_client(addr, outbox.clone())
        };

        let Some(client_id) = client_id else {
            warn!("Refusing connection from {}: server full", addr);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let (read_half, write_half) = stream.into_split();

        tokio::spawn(Self::write_loop(
            client_id,
            write_half,
            outbound_rx,
            outbox.clone(),
        ));

        tokio::spawn(async move {
            let result = Self::read_loop(
                client_id,
                read_half,
                &clients,
                &outbox,
                &private_key,
                &server_tx,
                closed,
            )
            .await;

            if let Err(e) = result {
                warn!("Closing client {}: {}", client_id, e);
            }
            outbox.force_close();

            let player = {
                let mut clients_guard = clients.write().await;
                clients_guard
                    .remove_client(&client_id)
                    .and_then(|client| client.player)
            };

            let _ = server_tx.send(ServerMessage::Disconnected { client_id, player });
        });
    }

    /// Decodes frames, gates them through the handshake and queues them for
    /// the tick. Returns on end of stream, on close, or on the first
    /// protocol violation.
    async fn read_loop(
        client_id: u32,
        mut reader: OwnedReadHalf,
        clients: &RwLock<ClientManager>,
        outbox: &Outbox,
        private_key: &RsaPrivateKey,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
        mut closed: watch::Receiver<bool>,
    ) -> Result<(), BoxError> {
        let mut decoder = PacketDecoder::new();
        let mut buffer = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];

        loop {
            let read = tokio::select! {
                result = reader.read(&mut chunk) => result?,
                _ = closed.changed() => return Ok(()),
            };

            if read == 0 {
                return Ok(());
            }
            buffer.extend_from_slice(&chunk[..read]);

            while let Some(packet) = decoder.decode(&mut buffer)? {
                {
                    let mut clients_guard = clients.write().await;
                    clients_guard.admit(client_id, packet.kind())?;
                }

                let message = if packet.kind() == PacketType::LoginSend {
                    let request = LoginRequest::decrypt(&packet, private_key)?;
                    decoder.enable_obfuscation(request.client_seed);
                    outbox.enable_obfuscation(request.server_seed);
                    ServerMessage::LoginReceived { client_id, request }
                } else {
                    ServerMessage::PacketReceived { client_id, packet }
                };

                if server_tx.send(message).is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Encodes and writes queued frames until the connection closes
    async fn write_loop(
        client_id: u32,
        mut writer: OwnedWriteHalf,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        outbox: Outbox,
    ) {
        let mut closed = outbox.subscribe();
        let mut encoder = PacketEncoder::new();
        let mut buffer = Vec::with_capacity(4096);

        loop {
            let message = tokio::select! {
                message = outbound_rx.recv() => message,
                _ = closed.changed() => break,
            };

            match message {
                Some(Outbound::Packet(packet)) => {
                    buffer.clear();
                    if let Err(e) = encoder.encode(&packet, &mut buffer) {
                        error!("Failed to encode {:?} for client {}: {}", packet.kind(), client_id, e);
                        break;
                    }
                    if let Err(e) = writer.write_all(&buffer).await {
                        debug!("Write to client {} failed: {}", client_id, e);
                        break;
                    }
                }
                Some(Outbound::EnableObfuscation(seed)) => encoder.enable_obfuscation(seed),
                Some(Outbound::Close) | None => break,
            }
        }

        let _ = writer.shutdown().await;
        outbox.force_close();
    }

    /// Spawns task that closes idle connections
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                if !timed_out.is_empty() {
                    debug!("Closed {} idle connections", timed_out.len());
                }
            }
        });
    }

    /// Drains everything the connection tasks queued since the last tick
    async fn process_messages(&mut self) {
        while let Ok(message) = self.server_rx.try_recv() {
            match message {
                ServerMessage::LoginReceived { client_id, request } => {
                    self.handle_login(client_id, request).await;
                }
                ServerMessage::PacketReceived { client_id, packet } => {
                    self.handle_packet(client_id, packet).await;
                }
                ServerMessage::Disconnected {
                    client_id,
                    player: Some(player),
                } => {
                    debug!("Client {} left, logging out {}", client_id, player);
                    self.world.remove_player(&player);
                }
                ServerMessage::Disconnected { player: None, .. } => {}
            }
        }
    }

    async fn handle_login(&mut self, client_id: u32, request: LoginRequest) {
        let mut clients = self.clients.write().await;

        let Some(outbox) = clients.outbox(client_id) else {
            debug!("Client {} left before its login was processed", client_id);
            return;
        };

        match self.world.login(&request) {
            Ok(profile) => {
                outbox.send(LoginResponse::accepted(&profile));
                clients.authenticate(client_id, profile.id);
                info!("Client {} logged in as {}", client_id, profile);
                self.world.add_player(Player::new(profile, outbox));
            }
            Err(reason) => {
                info!("Client {} login refused: {}", client_id, reason);
                outbox.send(LoginResponse::rejected(&reason.to_string()));
                outbox.close();
                clients.reject(client_id);
            }
        }
    }

    async fn handle_packet(&mut self, client_id: u32, packet: Packet) {
        let (player, outbox) = {
            let clients = self.clients.read().await;
            (clients.player_of(client_id), clients.outbox(client_id))
        };

        let Some(player) = player else {
            debug!("Dropping {:?} from unbound client {}", packet.kind(), client_id);
            return;
        };

        if let Err(e) = handlers::handle_packet(&mut self.world, &player, packet) {
            warn!("Protocol violation from client {}: {}", client_id, e);
            if let Some(outbox) = outbox {
                outbox.force_close();
            }
        }
    }

    /// One pass of the tick: apply queued messages, then synchronize the world
    pub async fn tick(&mut self) {
        self.process_messages().await;
        self.world.update();
        self.tick += 1;

        if self.tick % 300 == 0 && !self.world.is_empty() {
            debug!("Tick {}: {} players online", self.tick, self.world.len());
        }
    }

    /// Saves every online player and closes all connections
    pub async fn shutdown(&mut self) {
        info!("Server shutting down");

        for outbox in self.clients.read().await.outboxes() {
            outbox.force_close();
        }

        self.world.logout_all();
        if let Err(e) = self.world.flush() {
            error!("Failed to save profiles: {}", e);
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_acceptor();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        info!("Server started successfully");

        loop {
            tick_interval.tick().await;
            self.tick().await;
        }
    }
}
