//! Single database worker: one connection (sqlite3 or postgresql, chosen
//! once at startup), serialized through a `tokio::sync::Mutex` the way
//! `services/receiver/src/db.rs`'s `Db` is shared via `Arc<Mutex<Db>>` —
//! every caller already goes through one lock, which gives the same
//! single-writer guarantee the original's dedicated database actor thread
//! gave, without a redundant channel indirection in front of state that
//! already lives in this process.

mod postgres;
mod schema;
mod sqlite;

use thiserror::Error;
use tkm_core::{Device, DeviceState, HashCollisionPolicy, Session};

pub use schema::Dialect;

/// One data sample tagged with its fixed-table kind, the unit the database
/// worker's `AddData` action consumes. Reuses `tkm_protocol::DataPayload`
/// directly rather than a parallel enum — the wire type and the storage
/// type are the same shape here, so keeping two would just be one of them
/// copied.
pub type DataRow = tkm_protocol::DataPayload;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session hash collision on '{0}' rejected by configured policy")]
    SessionHashCollision(String),
    #[error("no such device '{0}'")]
    NoSuchDevice(String),
    #[error("Device already exists")]
    DeviceAlreadyExists(String),
    #[error("no such session '{0}'")]
    NoSuchSession(String),
}

enum Backend {
    Sqlite(rusqlite::Connection),
    Postgres(sqlx::PgPool),
}

pub struct Database {
    backend: Backend,
    collision_policy: HashCollisionPolicy,
}

impl Database {
    pub fn open_sqlite(
        path: &std::path::Path,
        collision_policy: HashCollisionPolicy,
    ) -> Result<Self, DbError> {
        let conn = rusqlite::Connection::open(path)?;
        sqlite::apply_pragmas(&conn)?;
        Ok(Self { backend: Backend::Sqlite(conn), collision_policy })
    }

    pub fn open_sqlite_in_memory(collision_policy: HashCollisionPolicy) -> Result<Self, DbError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        sqlite::apply_pragmas(&conn)?;
        Ok(Self { backend: Backend::Sqlite(conn), collision_policy })
    }

    pub async fn open_postgres(
        url: &str,
        collision_policy: HashCollisionPolicy,
    ) -> Result<Self, DbError> {
        let pool = sqlx::postgres::PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self { backend: Backend::Postgres(pool), collision_policy })
    }

    /// `InitDatabase`: create every fixed table if it doesn't already exist.
    pub async fn init_database(&self) -> Result<(), DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::init_database(conn),
            Backend::Postgres(pool) => postgres::init_database(pool).await,
        }
    }

    /// `CheckDatabase`: confirm the connection is live.
    pub async fn check_database(&self) -> Result<(), DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::check_database(conn),
            Backend::Postgres(pool) => postgres::check_database(pool).await,
        }
    }

    /// `LoadDevices` / `GetDevices`: both read the full device table; the
    /// original distinguishes them only by who issued the request
    /// (device manager at startup vs. a control client), not by query.
    pub async fn get_devices(&self) -> Result<Vec<Device>, DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::get_devices(conn),
            Backend::Postgres(pool) => postgres::get_devices(pool).await,
        }
    }

    /// `AddDevice`: rejects a re-add of an existing hash unless `forced`,
    /// in which case the prior row is removed first and replaced
    /// (`source/SQLiteDatabase.cpp`'s `doAddDevice`).
    pub async fn add_device(&self, name: &str, address: &str, port: u16, forced: bool) -> Result<Device, DbError> {
        let hash = tkm_core::hash_for_device(address, port);
        let exists = match &self.backend {
            Backend::Sqlite(conn) => sqlite::get_device(conn, &hash)?,
            Backend::Postgres(pool) => postgres::get_device(pool, &hash).await?,
        }
        .is_some();
        if exists {
            if !forced {
                return Err(DbError::DeviceAlreadyExists(hash));
            }
            match &self.backend {
                Backend::Sqlite(conn) => sqlite::remove_device(conn, &hash)?,
                Backend::Postgres(pool) => postgres::remove_device(pool, &hash).await?,
            }
        }
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::add_device(conn, &hash, name, address, port),
            Backend::Postgres(pool) => postgres::add_device(pool, &hash, name, address, port).await,
        }
    }

    pub async fn remove_device(&self, hash: &str) -> Result<(), DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::remove_device(conn, hash),
            Backend::Postgres(pool) => postgres::remove_device(pool, hash).await,
        }
    }

    pub async fn update_device_state(&self, hash: &str, state: DeviceState) -> Result<(), DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::update_device_state(conn, hash, state),
            Backend::Postgres(pool) => postgres::update_device_state(pool, hash, state).await,
        }
    }

    pub async fn get_sessions(&self, device_hash: Option<&str>) -> Result<Vec<Session>, DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::get_sessions(conn, device_hash),
            Backend::Postgres(pool) => postgres::get_sessions(pool, device_hash).await,
        }
    }

    /// `AddSession`: honors the configured hash-collision policy before
    /// inserting — see `DESIGN.md` Open Question 1.
    pub async fn add_session(
        &self,
        hash: &str,
        name: &str,
        device_hash: &str,
        started_at: u64,
    ) -> Result<(), DbError> {
        let existing = self.get_sessions(None).await?;
        if let Some(prior) = existing.iter().find(|s| s.hash == hash) {
            match self.collision_policy {
                HashCollisionPolicy::Reject => {
                    tracing::warn!(
                        hash,
                        prior_session = %prior.name,
                        "session hash collision rejected by configured policy"
                    );
                    return Err(DbError::SessionHashCollision(hash.to_owned()));
                }
                HashCollisionPolicy::Cascade => {
                    tracing::warn!(
                        hash,
                        prior_session = %prior.name,
                        "session hash collision: cascading delete of prior session and its data, \
                         reproducing the original's behaviour"
                    );
                    self.rem_session(hash).await?;
                }
            }
        }
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::add_session(conn, hash, name, device_hash, started_at),
            Backend::Postgres(pool) => {
                postgres::add_session(pool, hash, name, device_hash, started_at).await
            }
        }
    }

    /// `RemSession`: deletes the session row and every data row referencing
    /// it (cascade delete, used both standalone and by the `Cascade`
    /// collision policy).
    pub async fn rem_session(&self, hash: &str) -> Result<(), DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::rem_session(conn, hash),
            Backend::Postgres(pool) => postgres::rem_session(pool, hash).await,
        }
    }

    /// `EndSession`: stamps `ended_at` without deleting data, fired when a
    /// device holding an open session transitions to `Disconnected`.
    pub async fn end_session(&self, hash: &str, ended_at: u64) -> Result<(), DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::end_session(conn, hash, ended_at),
            Backend::Postgres(pool) => postgres::end_session(pool, hash, ended_at).await,
        }
    }

    /// `CleanSessions`: close out any session left open from a prior run.
    /// Returns the number of sessions closed, mirroring the startup
    /// stale-row cleanup in `services/server/src/main.rs`.
    pub async fn clean_sessions(&self, now: u64) -> Result<u64, DbError> {
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::clean_sessions(conn, now),
            Backend::Postgres(pool) => postgres::clean_sessions(pool, now).await,
        }
    }

    /// `AddData`: route one sample to its fixed table by kind.
    pub async fn add_data(&self, session_hash: &str, row: &DataRow) -> Result<(), DbError> {
        let session_id = match &self.backend {
            Backend::Sqlite(conn) => sqlite::session_id_for_hash(conn, session_hash)?,
            Backend::Postgres(pool) => postgres::session_id_for_hash(pool, session_hash).await?,
        };
        match &self.backend {
            Backend::Sqlite(conn) => sqlite::add_data(conn, session_id, row),
            Backend::Postgres(pool) => postgres::add_data(pool, session_id, row).await,
        }
    }
}
