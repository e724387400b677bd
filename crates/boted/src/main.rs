//! boted - Bote mail storage node

use anyhow::{Context, Result};
use boted::{logging, Config, IdentityFile, Node};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "boted")]
#[command(about = "Storage node and mail store for Bote", version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "BOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, env = "BOTE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Write a default configuration and a new email identity
    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node until interrupted
    Run,
    /// Generate a new email identity
    Keygen {
        /// Public name of the identity
        name: String,
        /// Crypto implementation id (1-4); defaults to mail.crypto_id
        #[arg(long)]
        crypto_id: Option<u8>,
    },
    /// Run one expiration sweep and exit
    Sweep,
    /// Decode a packet and print its fields
    Decode {
        /// File holding the raw packet
        #[arg(conflicts_with = "hex", required_unless_present = "hex")]
        file: Option<PathBuf>,
        /// Packet as a hex string
        #[arg(long)]
        hex: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(Command::Decode { file, hex }) = &args.command {
        return decode(file.as_ref(), hex.as_deref());
    }

    let registry = bote_core::init();

    let config = if args.init {
        let config = Config::create_default(args.config, args.data_dir)?;
        logging::init(&config.logging)?;
        info!("Created configuration at {}", config.config_path().display());

        let mut identities = IdentityFile::open(config.identities_path())?;
        let name = config.node.name.clone();
        let identity = identities.generate(&registry, config.crypto_id()?, &name)?;
        println!("Email destination for {}:", identity.public_name());
        println!("{}", identity.destination().to_base64());

        if args.command.is_none() {
            return Ok(());
        }
        config
    } else {
        let config = Config::load(args.config, args.data_dir)?;
        logging::init(&config.logging)?;
        config
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("Starting Bote node");
            info!("Config: {}", config.config_path().display());
            let mut node = Node::open(config, registry)?;
            node.run().await?;
        }
        Command::Keygen { name, crypto_id } => {
            let crypto_id = match crypto_id {
                Some(id) => bote_crypto::CryptoId::from_u8(id).context("Invalid --crypto-id")?,
                None => config.crypto_id()?,
            };
            let mut identities = IdentityFile::open(config.identities_path())?;
            let identity = identities.generate(&registry, crypto_id, &name)?;
            println!("{}", identity.destination().to_base64());
        }
        Command::Sweep => {
            let node = Node::open(config, registry)?;
            let removed = node.sweep().await?;
            println!("Removed {} expired entries", removed);
        }
        Command::Decode { file, hex } => decode(file.as_ref(), hex.as_deref())?,
    }

    Ok(())
}

fn decode(file: Option<&PathBuf>, hex: Option<&str>) -> Result<()> {
    let bytes = match (file, hex) {
        (_, Some(hex)) => hex::decode(hex.trim()).context("Invalid hex input")?,
        (Some(file), None) => {
            fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?
        }
        (None, None) => anyhow::bail!("Give a packet file or --hex"),
    };
    let packet = bote_protocol::decode_packet(&bytes).context("Failed to decode packet")?;
    println!("{:#?}", packet);
    Ok(())
}
