//! BlokFS mount daemon

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use blokfs::cli::Cli;
use blokfs::session::{self, MountSession, SessionConfig};
use blokfs::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug;
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => match e.downcast::<clap::Error>() {
            Ok(usage) => usage.exit(),
            Err(e) => return Err(e),
        },
    };

    telemetry::init(&config.log_file, debug)?;
    info!("BlokFS starting...");

    let session = MountSession::new(&config.root)
        .with_context(|| format!("invalid root directory {}", config.root.display()))?
        .with_xattr(config.xattr);
    info!("Root directory: {}", session.root().display());

    let session_config = SessionConfig {
        mountpoint: config.mountpoint.clone(),
        session,
        mount_options: config.parsed_mount_options()?,
    };
    let handle = session::mount(session_config)?;
    info!("Mount point: {}", handle.mountpoint().display());

    handle.run_until(shutdown_signal()).await;
    info!("BlokFS stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
