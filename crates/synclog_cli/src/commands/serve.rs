//! Serve command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use synclog_core::{IngressLimits, JournalStore, StoreConfig};
use synclog_server::{ServerConfig, SyncServer};

/// Options for `serve`.
pub struct ServeOptions {
    pub path: PathBuf,
    pub bind: SocketAddr,
    pub secret: Vec<u8>,
    pub page_size: usize,
    pub max_batch: usize,
    pub token_hours: u64,
    pub sync_on_commit: bool,
}

/// Runs the server until Ctrl+C or SIGTERM.
pub fn run(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    if options.secret.is_empty() {
        return Err("Token secret must not be empty".into());
    }

    let store = JournalStore::open(
        &options.path,
        StoreConfig::new().sync_on_commit(options.sync_on_commit),
    )?;

    let config = ServerConfig::new(options.bind, options.secret)
        .with_page_size(options.page_size)
        .with_limits(IngressLimits::default().max_batch(options.max_batch))
        .with_token_expiry(token_expiry(options.token_hours));
    let server = SyncServer::new(config, Arc::new(store));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve(shutdown_signal()))?;
    Ok(())
}

/// Token lifetime for `--token-hours`; huge values saturate instead of wrapping.
fn token_expiry(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hours_convert_to_seconds() {
        assert_eq!(token_expiry(24), Duration::from_secs(86_400));
        assert_eq!(token_expiry(0), Duration::ZERO);
    }

    #[test]
    fn huge_token_hours_saturate() {
        assert_eq!(token_expiry(u64::MAX), Duration::from_secs(u64::MAX));
        assert_eq!(
            token_expiry(u64::MAX / 3600 + 1),
            Duration::from_secs(u64::MAX)
        );
    }
}
