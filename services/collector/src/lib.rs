//! Library surface for the collector binary, split out so integration
//! tests can drive the dispatcher and database without going through a
//! process boundary — the same split `services/server`'s `lib.rs` uses.

pub mod config;
pub mod control_client;
pub mod control_server;
pub mod database;
pub mod device_worker;
pub mod dispatcher;
pub mod error;
pub mod time;
pub mod watchdog;

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use config::{CollectorConfig, DatabaseConfig};
use database::Database;
use dispatcher::DispatcherHandle;
use error::CollectorError;

/// Open the database backend named by `config`, grounded on
/// `source/Application.cpp`'s startup sequence: construct the driver for
/// whichever backend was compiled in, matching the Rust runtime choice
/// between `DatabaseConfig::Sqlite3`/`Postgresql`.
pub async fn open_database(config: &CollectorConfig) -> Result<Database, CollectorError> {
    let db = match &config.database {
        DatabaseConfig::Sqlite3 { path } => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Database::open_sqlite(path, config.hash_collision_policy)?
        }
        DatabaseConfig::Postgresql { url } => {
            Database::open_postgres(url, config.hash_collision_policy).await?
        }
    };
    Ok(db)
}

/// Bring up every long-running collector task and block until `shutdown`
/// is signalled. Mirrors `source/Application.cpp::run`'s startup order:
/// init the database, clean stale sessions, load devices, start the
/// control server and (optionally) the watchdog.
pub async fn run(config: CollectorConfig, shutdown_tx: watch::Sender<bool>) -> Result<(), CollectorError> {
    let db = open_database(&config).await?;
    db.init_database().await?;
    let db = Arc::new(Mutex::new(db));

    dispatcher::clean_sessions_at_startup(&db).await;
    let dispatcher: DispatcherHandle = dispatcher::spawn(db, shutdown_tx.clone());

    if let Some(interval_sec) = config.watchdog_interval_sec {
        watchdog::spawn(interval_sec, shutdown_tx.subscribe());
    }

    control_server::run(&config.control_socket, dispatcher, shutdown_tx.subscribe()).await
}
