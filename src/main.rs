//! `compio-cli` — a thin shell-facing veneer over the storage engine
//! (§A.5). Grounded on `sixcy::main`'s clap-derive subcommand shape.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use compio::archive::Archive;
use compio::config::CompioConfig;
use compio::{CodecKind, CompioError};

#[derive(Parser)]
#[command(name = "compio-cli", about = "Inspect and manipulate compio archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty archive.
    Create {
        archive: PathBuf,
        #[arg(long, default_value = "identity")]
        codec: String,
        #[arg(long, default_value_t = 16)]
        degree: usize,
        #[arg(long, default_value_t = 4096)]
        block_size: usize,
    },
    /// Write a local file's contents into the archive under `name`.
    Put {
        archive: PathBuf,
        name: String,
        source: PathBuf,
    },
    /// Read a file's contents out of the archive, to stdout or a path.
    Get {
        archive: PathBuf,
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the files table.
    Ls { archive: PathBuf },
    /// Remove a file from the archive.
    Rm { archive: PathBuf, name: String },
    /// Report one file's size.
    Stat { archive: PathBuf, name: String },
    /// Dump header fields.
    Info { archive: PathBuf },
}

fn parse_codec(name: &str) -> Result<CodecKind, CompioError> {
    CodecKind::from_name(name).ok_or_else(|| CompioError::InvalidArgument(format!("unknown codec {name:?}")))
}

fn open_archive(path: &PathBuf, mode: &str, config: CompioConfig) -> Result<Archive, CompioError> {
    Archive::open(path, mode, config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber_init();

    match Cli::parse().command {
        // ── Create ───────────────────────────────────────────────────────────
        Command::Create { archive, codec, degree, block_size } => {
            let config = CompioConfig {
                codec: parse_codec(&codec)?,
                btree_degree: degree,
                block_size,
                ..Default::default()
            };
            let handle = open_archive(&archive, "w+", config)?;
            handle.close()?;
            tracing::info!(path = %archive.display(), "archive created");
        }
        // ── Put ──────────────────────────────────────────────────────────────
        Command::Put { archive, name, source } => {
            let mut handle = open_archive(&archive, "r+", CompioConfig::default())?;
            let data = fs::read(&source)?;
            let mut file = handle.open_file(&name)?;
            handle.write(&mut file, &data)?;
            handle.close()?;
            tracing::info!(name, bytes = data.len(), "wrote file");
        }
        // ── Get ──────────────────────────────────────────────────────────────
        Command::Get { archive, name, out } => {
            let mut handle = open_archive(&archive, "r", CompioConfig::default())?;
            let mut file = handle.open_file(&name)?;
            let size = handle.stat(&name)?;
            let data = handle.read(&mut file, size)?;
            match out {
                Some(path) => fs::write(path, data)?,
                None => io::stdout().write_all(&data)?,
            }
        }
        // ── List ─────────────────────────────────────────────────────────────
        Command::Ls { archive } => {
            let handle = open_archive(&archive, "r", CompioConfig::default())?;
            for name in handle.list() {
                println!("{name}");
            }
        }
        // ── Remove ───────────────────────────────────────────────────────────
        Command::Rm { archive, name } => {
            let mut handle = open_archive(&archive, "r+", CompioConfig::default())?;
            handle.remove_file(&name)?;
            handle.close()?;
        }
        // ── Stat ─────────────────────────────────────────────────────────────
        Command::Stat { archive, name } => {
            let handle = open_archive(&archive, "r", CompioConfig::default())?;
            let size = handle.stat(&name)?;
            println!("{name}: {size} bytes");
        }
        // ── Info ─────────────────────────────────────────────────────────────
        Command::Info { archive } => {
            let handle = open_archive(&archive, "r", CompioConfig::default())?;
            println!("path: {}", handle.path().display());
            println!("files: {}", handle.list().len());
        }
    }

    Ok(())
}

fn tracing_subscriber_init() {
    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    );
}
