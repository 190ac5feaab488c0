//! synclog CLI
//!
//! Runs the sync server and inspects mutation journals.
//!
//! # Commands
//!
//! - `serve` - Run the HTTP sync server
//! - `issue-token` - Create a bearer token for an account
//! - `dump-log` - Dump journal frames for debugging
//! - `verify` - Check journal integrity without modifying it

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// synclog server and journal tools.
#[derive(Parser)]
#[command(name = "synclog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long, env = "SYNCLOG_DATA_DIR")]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "SYNCLOG_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Token signing secret
        #[arg(short, long, env = "SYNCLOG_SECRET", hide_env_values = true)]
        secret: String,

        /// Records per pull page
        #[arg(long, default_value_t = synclog_core::DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Maximum mutations per push
        #[arg(long, default_value = "500")]
        max_batch: usize,

        /// Token lifetime in hours
        #[arg(long, default_value = "24")]
        token_hours: u64,

        /// Skip fsync on every commit
        #[arg(long)]
        no_sync: bool,
    },

    /// Create a bearer token for an account
    IssueToken {
        /// Token signing secret
        #[arg(short, long, env = "SYNCLOG_SECRET", hide_env_values = true)]
        secret: String,

        /// Account id (a new one is generated if omitted)
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Dump journal frames for debugging
    DumpLog {
        /// Maximum number of frames to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this frame offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check journal integrity
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            secret,
            page_size,
            max_batch,
            token_hours,
            no_sync,
        } => {
            let path = cli.path.ok_or("Store path required for serve")?;
            commands::serve::run(commands::serve::ServeOptions {
                path,
                bind,
                secret: secret.into_bytes(),
                page_size,
                max_batch,
                token_hours,
                sync_on_commit: !no_sync,
            })?;
        }
        Commands::IssueToken { secret, account } => {
            commands::issue_token::run(secret.as_bytes(), account.as_deref())?;
        }
        Commands::DumpLog {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for dump-log")?;
            commands::dump_log::run(&path, limit, offset, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("synclog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("synclog core v{}", synclog_core::VERSION);
        }
    }

    Ok(())
}
