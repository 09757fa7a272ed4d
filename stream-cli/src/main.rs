//! # flashstream
//!
//! Command-line peer for FlashStream.
//!
//! ## Commands
//!
//! - `id`: Show this peer's identity
//! - `send`: Send a file to a peer
//! - `receive`: Wait for files and save them
//! - `clip`: Share clipboard text with peers
//! - `evict`: Drop abandoned staged chunks
//!
//! ## Example
//!
//! ```bash
//! # On the receiving machine
//! flashstream receive --out ~/Downloads
//!
//! # On the sending machine
//! flashstream send photo.jpg --to K7Q2ZD --addr 192.168.1.20:7878
//!
//! # Within 30 minutes the same peer is used again
//! flashstream send notes.txt
//!
//! # Shared clipboard
//! flashstream clip --mode host
//! flashstream clip --mode client --connect K7Q2ZD --addr 192.168.1.20:7878
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod identity;
mod recent;

use commands::{clip, evict, id, receive, send, Context};

/// Peer-to-peer file transfer and shared clipboard.
#[derive(Parser, Debug)]
#[command(name = "flashstream")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the identity and staged chunks
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to config.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show this peer's identity
    Id,

    /// Send a file to a peer
    Send {
        /// File to send
        file: PathBuf,

        /// Identity of the receiving peer (defaults to the last one, for 30 minutes)
        #[arg(long)]
        to: Option<String>,

        /// Address of the receiving peer, if not in the configured directory
        #[arg(long, requires = "to")]
        addr: Option<String>,
    },

    /// Wait for incoming files
    Receive {
        /// Directory to save received files into
        #[arg(long, short, default_value = ".")]
        out: PathBuf,
    },

    /// Share clipboard text; each stdin line replaces it
    Clip {
        /// Role in the session
        #[arg(long, value_enum, default_value = "bidirectional")]
        mode: clip::Mode,

        /// Identity of the peer to connect to (a client defaults to the last one)
        #[arg(long)]
        connect: Option<String>,

        /// Address of that peer, if not in the configured directory
        #[arg(long, requires = "connect")]
        addr: Option<String>,
    },

    /// Drop staged chunks older than the retention period
    Evict {
        /// Drop every staged chunk
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Id => id::run(&data_dir).await?,
        command => {
            let ctx = Context::load(data_dir, cli.config.as_deref())?;
            run(&ctx, command).await?;
        }
    }

    Ok(())
}

/// Run a command that needs the loaded configuration.
async fn run(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Id => {}
        Commands::Send { file, to, addr } => {
            send::run(ctx, to.as_deref(), addr.as_deref(), &file).await?;
        }
        Commands::Receive { out } => {
            receive::run(ctx, &out).await?;
        }
        Commands::Clip {
            mode,
            connect,
            addr,
        } => {
            clip::run(ctx, mode, connect.as_deref(), addr.as_deref()).await?;
        }
        Commands::Evict { all } => {
            evict::run(ctx, all).await?;
        }
    }
    Ok(())
}

/// Get the default data directory for flashstream.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "flashstream", "flashstream")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
