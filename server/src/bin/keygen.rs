//! Writes a fresh RSA key pair for the login handshake.

use clap::Parser;
use log::info;
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Key size in bits
    #[arg(short, long, default_value_t = 2048)]
    bits: usize,

    /// Private key output (PKCS#8 PEM), kept by the server
    #[arg(long, default_value = "private.pem")]
    private_key: PathBuf,

    /// Public key output (SPKI PEM), handed to clients
    #[arg(long, default_value = "public.pem")]
    public_key: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    info!("Generating {}-bit RSA key", args.bits);
    let private_key = RsaPrivateKey::new(&mut OsRng, args.bits)?;
    let public_key = RsaPublicKey::from(&private_key);

    private_key.write_pkcs8_pem_file(&args.private_key, LineEnding::LF)?;
    public_key.write_public_key_pem_file(&args.public_key, LineEnding::LF)?;

    println!("Wrote {}", args.private_key.display());
    println!("Wrote {}", args.public_key.display());
    Ok(())
}
