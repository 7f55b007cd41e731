//! `silt` — command-line front end for the silt blob store.
//!
//! # Usage
//!
//! ```text
//! silt -d ./data put big-file.bin          # store a file, print its ref
//! silt -d ./data put --commit file.bin     # store and advance the root
//! silt -d ./data get sha1-<hex> > out.bin  # stream a blob to stdout
//! silt -d ./data get > out.bin             # stream the root blob
//! silt -d ./data root                      # print the current root
//! silt -d ./data set-root sha1-<hex> --expected sha1-<hex>
//! ```

mod config;
mod telemetry;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use silt_blob::{BlobReader, BlobWriter};
use silt_chunks::{ChunkStore, FileStore};
use silt_types::Ref;
use tokio::io::AsyncWriteExt;
use tracing::info;

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "silt", version, about = "Content-addressed blob store")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (overrides `[store].dir` from the config file).
    #[arg(short = 'd', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file (or stdin) as a blob and print its ref.
    Put {
        /// File to store; reads stdin when omitted.
        file: Option<PathBuf>,
        /// Advance the root to the new blob after storing it.
        #[arg(long)]
        commit: bool,
    },
    /// Stream a blob to stdout.
    Get {
        /// Ref to read; defaults to the current root.
        r#ref: Option<String>,
    },
    /// Print the current root ref.
    Root,
    /// Atomically advance the root from `--expected` to NEW.
    SetRoot {
        /// The new root ref.
        new: String,
        /// The root value this update is conditional on (defaults to the
        /// zero ref, i.e. "no root yet").
        #[arg(long)]
        expected: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(dir) = cli.dir {
        config.store.dir = Some(dir);
    }
    telemetry::init(&config.log.level);

    let Some(store) = config.store.open()? else {
        bail!("no store directory configured; pass --dir or set [store].dir");
    };

    match cli.command {
        Commands::Put { file, commit } => put(&config, &store, file, commit).await,
        Commands::Get { r#ref } => get(&config, store, r#ref).await,
        Commands::Root => {
            println!("{}", store.root().await?);
            Ok(())
        }
        Commands::SetRoot { new, expected } => set_root(&store, &new, expected.as_deref()).await,
    }
}

// -----------------------------------------------------------------------
// Subcommands
// -----------------------------------------------------------------------

async fn put(
    config: &CliConfig,
    store: &FileStore,
    file: Option<PathBuf>,
    commit: bool,
) -> Result<()> {
    let data = match &file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let writer = BlobWriter::new()
        .leaf_size(config.leaf_size())
        .fan_out(config.fan_out());
    let r = writer.write(store, &data).await?;
    info!(blob = %r, bytes = data.len(), "stored blob");

    if commit {
        let current = store.root().await?;
        if !store.update_root(r, current).await? {
            bail!("root moved concurrently; rerun to commit against the new root");
        }
        info!(root = %r, "root advanced");
    }

    println!("{r}");
    Ok(())
}

async fn get(config: &CliConfig, store: FileStore, r: Option<String>) -> Result<()> {
    let r = match r {
        Some(s) => Ref::parse(&s)?,
        None => {
            let root = store.root().await?;
            if root.is_zero() {
                bail!("store has no root; pass a ref to read");
            }
            root
        }
    };

    let mut reader =
        BlobReader::open_with_options(std::sync::Arc::new(store), r, config.reader_options())
            .await?;

    let mut stdout = tokio::io::stdout();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).await?;
    }
    stdout.flush().await?;
    reader.close().await;
    Ok(())
}

async fn set_root(store: &FileStore, new: &str, expected: Option<&str>) -> Result<()> {
    let new = Ref::parse(new)?;
    let expected = match expected {
        Some(s) => Ref::parse(s)?,
        None => Ref::zero(),
    };

    if !store.update_root(new, expected).await? {
        bail!("root CAS missed: current root is {}", store.root().await?);
    }
    println!("{new}");
    Ok(())
}
