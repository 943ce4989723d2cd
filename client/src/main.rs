use clap::Parser;
use client::game::ClientWorld;
use client::network::Connection;
use log::{info, warn};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use shared::{GridMap, Point, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long)]
    username: String,

    #[arg(short = 'P', long)]
    password: String,

    /// Server public key (SPKI PEM)
    #[arg(short = 'k', long, default_value = "public.pem")]
    public_key: PathBuf,

    /// Tile map matching the server's; an open 256x256 map when omitted
    #[arg(long)]
    map: Option<PathBuf>,

    /// Walk to this tile after logging in, as x,y
    #[arg(short, long)]
    walk_to: Option<String>,

    /// Say this in public chat after logging in
    #[arg(short, long)]
    chat: Option<String>,

    /// Seconds to stay connected
    #[arg(short, long, default_value_t = 30)]
    duration: u64,
}

fn parse_point(text: &str) -> Result<Point, Box<dyn std::error::Error>> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", text))?;
    Ok(Point::new(x.trim().parse()?, y.trim().parse()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let pem = std::fs::read_to_string(&args.public_key)
        .map_err(|e| format!("cannot read {}: {}", args.public_key.display(), e))?;
    let public_key = RsaPublicKey::from_public_key_pem(&pem)?;

    let map = match &args.map {
        Some(path) => GridMap::load(path)?,
        None => GridMap::open(256, 256, 32),
    };

    let address = format!("{}:{}", args.server, args.port);
    info!("Connecting to: {}", address);
    let (mut connection, profile) =
        Connection::connect(address.as_str(), &args.username, &args.password, &public_key).await?;

    let mut world = ClientWorld::new(profile, map);
    info!(
        "Welcome {}, you are at {}",
        world.profile().username,
        world.location()
    );

    if let Some(text) = &args.chat {
        connection.chat(text);
    }

    if let Some(target) = &args.walk_to {
        let target = parse_point(target)?;
        match world.walk_to(target) {
            Some(path) => {
                info!("Walking to {} in {} steps", target, path.len());
                connection.walk(&path);
            }
            None => warn!("Cannot walk to {}", target),
        }
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            packet = connection.recv() => {
                let Some(packet) = packet else {
                    warn!("Disconnected from server");
                    break;
                };
                world.apply(packet)?;

                if world.players().has_new_entities() {
                    for player in world.players().new_entities() {
                        info!("{} is nearby at {}", player.username, player.location);
                    }
                }
                world.reset();
            }
            _ = &mut deadline => {
                info!("Done, logging out at {}", world.location());
                break;
            }
        }
    }

    Ok(())
}
