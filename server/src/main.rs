use clap::Parser;
use log::{error, info, warn};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use server::config::ServerConfig;
use server::network::{BoxError, Server};
use server::persistence::{MemoryStore, StoreError};
use server::world::WorldManager;
use shared::{GridMap, Point, DEFAULT_PORT, TICK_INTERVAL_MS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Milliseconds between world updates
    #[arg(short, long, default_value_t = TICK_INTERVAL_MS)]
    tick_ms: u64,

    /// Maximum simultaneous connections
    #[arg(short, long, default_value_t = 256)]
    max_clients: usize,

    /// RSA private key (PKCS#8 PEM) used to decrypt login requests
    #[arg(short = 'k', long, default_value = "private.pem")]
    private_key: PathBuf,

    /// Profile store, created on shutdown if missing
    #[arg(long, default_value = "profiles.bin")]
    profiles: PathBuf,

    /// Tile map; an open 256x256 map is used when omitted
    #[arg(long)]
    map: Option<PathBuf>,

    /// Register an account before starting, as username:password
    #[arg(long)]
    register: Vec<String>,

    /// Spawn tile for registered accounts, as x,y
    #[arg(long, default_value = "128,128")]
    spawn: String,
}

fn parse_point(text: &str) -> Result<Point, BoxError> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", text))?;
    Ok(Point::new(x.trim().parse()?, y.trim().parse()?))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let pem = std::fs::read_to_string(&args.private_key)
        .map_err(|e| format!("cannot read {}: {}", args.private_key.display(), e))?;
    let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)?;
    info!("Loaded private key from {}", args.private_key.display());

    let map = match &args.map {
        Some(path) => GridMap::load(path)?,
        None => {
            warn!("No map given, using an open 256x256 map");
            GridMap::open(256, 256, 32)
        }
    };

    let mut store = MemoryStore::open(&args.profiles)?;
    let spawn = parse_point(&args.spawn)?;
    for account in &args.register {
        let Some((username, password)) = account.split_once(':') else {
            return Err(format!("expected username:password but got '{}'", account).into());
        };
        match store.register(username, password, spawn) {
            Ok(id) => info!("Registered {} as {}", username, id),
            Err(StoreError::Taken(name)) => info!("{} is already registered", name),
            Err(e) => return Err(e.into()),
        }
    }

    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = ServerConfig {
        tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        max_clients: args.max_clients,
        ..ServerConfig::with_addr(bind_addr)
    };

    let world = WorldManager::new(map, store);
    let mut server = Server::new(config, world, private_key).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    server.shutdown().await;
    Ok(())
}
