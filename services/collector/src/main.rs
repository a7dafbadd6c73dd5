//! `tkmcollector`: entry point wiring config, logging and the shutdown
//! signal race around [`collector::run`].
//!
//! Grounded on `services/server/src/main.rs` (tracing-subscriber setup,
//! `tokio::select!` shutdown signal race between Ctrl-C and SIGTERM) and
//! `source/Main.cpp`/`source/Application.cpp` for the overall startup
//! order this crate's `lib.rs::run` implements.

use tokio::sync::watch;

use collector::error::exit_code;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => collector::config::load_config_from_path(std::path::Path::new(&path)),
        None => collector::config::load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            std::process::exit(exit_code::STARTUP_FAILURE);
        }
    };

    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let signal_shutdown = shutdown_tx.clone();

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = signal_shutdown.send(true);
    });

    if let Err(err) = collector::run(config, shutdown_tx).await {
        tracing::error!(error = %err, "collector exited with an error");
        std::process::exit(exit_code::STARTUP_FAILURE);
    }

    std::process::exit(exit_code::OK);
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
