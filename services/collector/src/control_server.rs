//! Unix domain socket listener accepting control connections from
//! `tkmctl` (or any other client speaking the control protocol).
//!
//! Grounded on `source/UDSServer.cpp`: remove a stale socket file left
//! behind by an unclean shutdown before binding, then accept connections
//! in a loop, handing each off to its own task.

use std::path::Path;

use tokio::net::UnixListener;
use tokio::sync::watch;

use crate::control_client;
use crate::dispatcher::DispatcherHandle;
use crate::error::CollectorError;

pub async fn run(
    socket_path: &Path,
    dispatcher: DispatcherHandle,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), CollectorError> {
    if socket_path.exists() {
        tracing::warn!(path = %socket_path.display(), "removing stale control socket from a prior run");
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "control server listening");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let dispatcher = dispatcher.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(err) = control_client::handle(stream, dispatcher, shutdown).await {
                                tracing::debug!(error = %err, "control connection ended with error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept control connection");
                    }
                }
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}
