//! tristore
//!
//! Striped, XOR-parity file store over three directories.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            tristore                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP / CLI  │───▶│    Store     │───▶│   Striping   │       │
//! │  │              │    │  (claims,    │    │   engine     │       │
//! │  │              │    │   metrics)   │    │              │       │
//! │  └──────────────┘    └──────────────┘    └──────┬───────┘       │
//! │                                     ┌───────────┼───────────┐   │
//! │                                     ▼           ▼           ▼   │
//! │                                  data-a      data-b      parity │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tristore::server::run_server;
use tristore::store::{StoreConfig, StripeStore};
use tristore::stripe::StripeLocations;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tristore - striped file store with XOR parity
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the first data stripe
    #[arg(long, env = "TRISTORE_DATA_A", default_value = "data/a", global = true)]
    data_a_dir: PathBuf,

    /// Directory holding the second data stripe
    #[arg(long, env = "TRISTORE_DATA_B", default_value = "data/b", global = true)]
    data_b_dir: PathBuf,

    /// Directory holding the parity stripe
    #[arg(long, env = "TRISTORE_PARITY", default_value = "data/parity", global = true)]
    parity_dir: PathBuf,

    /// HTTP server bind address
    #[arg(long, env = "TRISTORE_LISTEN_ADDR", default_value = "0.0.0.0:8080", global = true)]
    listen_addr: String,

    /// Skip content digest verification on reads
    #[arg(long, env = "TRISTORE_NO_VERIFY_DIGEST", global = true)]
    no_verify_digest: bool,

    /// Create missing stripe directories at startup
    #[arg(long, env = "TRISTORE_PROVISION", global = true)]
    provision: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the store over HTTP (default)
    Serve,

    /// Store a local file under NAME
    Put { name: String, file: PathBuf },

    /// Read NAME back
    Get {
        name: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Describe NAME as JSON
    Stat { name: String },

    /// Finish interrupted publishes and rebuild lost stripes
    Repair,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            locations: StripeLocations::new(&self.data_a_dir, &self.data_b_dir, &self.parity_dir),
            verify_digest: !self.no_verify_digest,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let store = StripeStore::new(args.store_config()).context("invalid store configuration")?;
    if args.provision {
        store.provision().context("failed to create stripe directories")?;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(store, &args.listen_addr).await?,
        Command::Put { name, file } => {
            let payload =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let published = store.put(&name, &payload)?;
            println!("{}", published.content_name);
        }
        Command::Get { name, output } => {
            let data = store.get(&name)?;
            match output {
                Some(path) => std::fs::write(&path, &data)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().lock().write_all(&data)?,
            }
        }
        Command::Stat { name } => {
            let info = store.stat(&name)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Repair => {
            let report = store.repair()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn serve(store: StripeStore, listen_addr: &str) -> anyhow::Result<()> {
    let locations = store.locations();
    info!("Starting tristore");
    for (role, dir) in locations.iter() {
        info!("  {}: {}", role, dir.display());
    }
    info!("  Verify digest: {}", store.config().verify_digest);

    let store = Arc::new(store);
    tokio::select! {
        result = run_server(listen_addr, store) => {
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // logs go to stderr so `get` can stream the object on stdout
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
