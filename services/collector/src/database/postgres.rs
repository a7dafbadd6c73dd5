use sqlx::{PgPool, Row};
use tkm_core::{Device, DeviceState, Session};
use tkm_protocol::ProcEventKind;

use super::schema::{self, Dialect};
use super::{DataRow, DbError};

pub async fn init_database(pool: &PgPool) -> Result<(), DbError> {
    for stmt in schema::create_table_statements(Dialect::PostgreSql) {
        sqlx::query(&stmt).execute(pool).await?;
    }
    Ok(())
}

pub async fn check_database(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

fn state_to_str(state: DeviceState) -> &'static str {
    match state {
        DeviceState::Unknown => "unknown",
        DeviceState::Loaded => "loaded",
        DeviceState::Connected => "connected",
        DeviceState::SessionSet => "session_set",
        DeviceState::Collecting => "collecting",
        DeviceState::Idle => "idle",
        DeviceState::Disconnected => "disconnected",
        DeviceState::Reconnecting => "reconnecting",
    }
}

fn state_from_str(s: &str) -> DeviceState {
    match s {
        "loaded" => DeviceState::Loaded,
        "connected" => DeviceState::Connected,
        "session_set" => DeviceState::SessionSet,
        "collecting" => DeviceState::Collecting,
        "idle" => DeviceState::Idle,
        "disconnected" => DeviceState::Disconnected,
        "reconnecting" => DeviceState::Reconnecting,
        _ => DeviceState::Unknown,
    }
}

fn row_to_device(row: &sqlx::postgres::PgRow) -> Device {
    Device {
        id: row.get::<i64, _>("id"),
        hash: row.get("hash"),
        name: row.get("name"),
        address: row.get("address"),
        port: row.get::<i32, _>("port") as u16,
        state: state_from_str(row.get::<&str, _>("state")),
    }
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Session {
    Session {
        id: row.get::<i64, _>("id"),
        hash: row.get("hash"),
        name: row.get("name"),
        device_hash: row.get("device_hash"),
        started_at: row.get::<i64, _>("started_at") as u64,
        ended_at: row.get::<Option<i64>, _>("ended_at").map(|v| v as u64),
    }
}

pub async fn get_devices(pool: &PgPool) -> Result<Vec<Device>, DbError> {
    let rows = sqlx::query(&format!(
        "SELECT id, hash, name, address, port, state FROM {}",
        schema::DEVICES_TABLE
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_device).collect())
}

pub async fn get_device(pool: &PgPool, hash: &str) -> Result<Option<Device>, DbError> {
    let row = sqlx::query(&format!(
        "SELECT id, hash, name, address, port, state FROM {} WHERE hash = $1",
        schema::DEVICES_TABLE
    ))
    .bind(hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_device))
}

/// Caller (`Database::add_device`) has already rejected or cleared a
/// colliding hash, so this is a plain insert.
pub async fn add_device(pool: &PgPool, hash: &str, name: &str, address: &str, port: u16) -> Result<Device, DbError> {
    sqlx::query(&format!(
        "INSERT INTO {} (hash, name, address, port, state) VALUES ($1, $2, $3, $4, $5)",
        schema::DEVICES_TABLE
    ))
    .bind(hash)
    .bind(name)
    .bind(address)
    .bind(i32::from(port))
    .bind(state_to_str(DeviceState::Loaded))
    .execute(pool)
    .await?;

    let row = sqlx::query(&format!("SELECT id FROM {} WHERE hash = $1", schema::DEVICES_TABLE))
        .bind(hash)
        .fetch_one(pool)
        .await?;
    Ok(Device {
        id: row.get::<i64, _>("id"),
        hash: hash.to_owned(),
        name: name.to_owned(),
        address: address.to_owned(),
        port,
        state: DeviceState::Loaded,
    })
}

pub async fn remove_device(pool: &PgPool, hash: &str) -> Result<(), DbError> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE hash = $1", schema::DEVICES_TABLE))
        .bind(hash)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NoSuchDevice(hash.to_owned()));
    }
    Ok(())
}

pub async fn update_device_state(pool: &PgPool, hash: &str, state: DeviceState) -> Result<(), DbError> {
    sqlx::query(&format!("UPDATE {} SET state = $1 WHERE hash = $2", schema::DEVICES_TABLE))
        .bind(state_to_str(state))
        .bind(hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_sessions(pool: &PgPool, device_hash: Option<&str>) -> Result<Vec<Session>, DbError> {
    let rows = match device_hash {
        Some(h) => {
            sqlx::query(&format!(
                "SELECT id, hash, name, device_hash, started_at, ended_at FROM {} WHERE device_hash = $1",
                schema::SESSIONS_TABLE
            ))
            .bind(h)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT id, hash, name, device_hash, started_at, ended_at FROM {}",
                schema::SESSIONS_TABLE
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.iter().map(row_to_session).collect())
}

pub async fn add_session(
    pool: &PgPool,
    hash: &str,
    name: &str,
    device_hash: &str,
    started_at: u64,
) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO {} (hash, name, device_hash, started_at, ended_at) VALUES ($1, $2, $3, $4, NULL)",
        schema::SESSIONS_TABLE
    ))
    .bind(hash)
    .bind(name)
    .bind(device_hash)
    .bind(started_at as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn rem_session(pool: &PgPool, hash: &str) -> Result<(), DbError> {
    let row = sqlx::query(&format!("SELECT id FROM {} WHERE hash = $1", schema::SESSIONS_TABLE))
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Err(DbError::NoSuchSession(hash.to_owned()));
    };
    let session_id: i64 = row.get("id");

    let mut tx = pool.begin().await?;
    for table in [
        schema::SYS_PROC_STAT_TABLE,
        schema::SYS_PROC_MEMINFO_TABLE,
        schema::SYS_PROC_PRESSURE_TABLE,
        schema::PROC_ACCT_TABLE,
        schema::PROC_EVENT_TABLE,
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE session_id = $1"))
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(&format!("DELETE FROM {} WHERE id = $1", schema::SESSIONS_TABLE))
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn end_session(pool: &PgPool, hash: &str, ended_at: u64) -> Result<(), DbError> {
    let result = sqlx::query(&format!(
        "UPDATE {} SET ended_at = $1 WHERE hash = $2 AND ended_at IS NULL",
        schema::SESSIONS_TABLE
    ))
    .bind(ended_at as i64)
    .bind(hash)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NoSuchSession(hash.to_owned()));
    }
    Ok(())
}

pub async fn clean_sessions(pool: &PgPool, now: u64) -> Result<u64, DbError> {
    let result = sqlx::query(&format!(
        "UPDATE {} SET ended_at = $1 WHERE ended_at IS NULL",
        schema::SESSIONS_TABLE
    ))
    .bind(now as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn session_id_for_hash(pool: &PgPool, hash: &str) -> Result<i64, DbError> {
    let row = sqlx::query(&format!("SELECT id FROM {} WHERE hash = $1", schema::SESSIONS_TABLE))
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    row.map(|r| r.get::<i64, _>("id")).ok_or_else(|| DbError::NoSuchSession(hash.to_owned()))
}

pub async fn add_data(pool: &PgPool, session_id: i64, row: &DataRow) -> Result<(), DbError> {
    match row {
        DataRow::SysProcStat(s) => {
            for cpu in &s.cpus {
                sqlx::query(&format!(
                    "INSERT INTO {} (session_id, receive_time_sec, cpu_name, cpu_all, cpu_usr, cpu_sys) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                    schema::SYS_PROC_STAT_TABLE
                ))
                .bind(session_id)
                .bind(s.receive_time_sec as i64)
                .bind(&cpu.name)
                .bind(cpu.all as i64)
                .bind(cpu.usr as i64)
                .bind(cpu.sys as i64)
                .execute(pool)
                .await?;
            }
        }
        DataRow::SysProcMeminfo(m) => {
            sqlx::query(&format!(
                "INSERT INTO {} (session_id, receive_time_sec, mem_total, mem_free, mem_available, \
                 buffers, cached, swap_total, swap_free) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
                schema::SYS_PROC_MEMINFO_TABLE
            ))
            .bind(session_id)
            .bind(m.receive_time_sec as i64)
            .bind(m.mem_total as i64)
            .bind(m.mem_free as i64)
            .bind(m.mem_available as i64)
            .bind(m.buffers as i64)
            .bind(m.cached as i64)
            .bind(m.swap_total as i64)
            .bind(m.swap_free as i64)
            .execute(pool)
            .await?;
        }
        DataRow::SysProcPressure(p) => {
            sqlx::query(&format!(
                "INSERT INTO {} (session_id, receive_time_sec, \
                 cpu_some_avg10, cpu_some_avg60, cpu_some_avg300, cpu_some_total, \
                 cpu_full_avg10, cpu_full_avg60, cpu_full_avg300, cpu_full_total, \
                 mem_some_avg10, mem_some_avg60, mem_some_avg300, mem_some_total, \
                 mem_full_avg10, mem_full_avg60, mem_full_avg300, mem_full_total, \
                 io_some_avg10, io_some_avg60, io_some_avg300, io_some_total, \
                 io_full_avg10, io_full_avg60, io_full_avg300, io_full_total) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26)",
                schema::SYS_PROC_PRESSURE_TABLE
            ))
            .bind(session_id)
            .bind(p.receive_time_sec as i64)
            .bind(p.cpu_some_avg10)
            .bind(p.cpu_some_avg60)
            .bind(p.cpu_some_avg300)
            .bind(p.cpu_some_total as i64)
            .bind(p.cpu_full_avg10)
            .bind(p.cpu_full_avg60)
            .bind(p.cpu_full_avg300)
            .bind(p.cpu_full_total as i64)
            .bind(p.mem_some_avg10)
            .bind(p.mem_some_avg60)
            .bind(p.mem_some_avg300)
            .bind(p.mem_some_total as i64)
            .bind(p.mem_full_avg10)
            .bind(p.mem_full_avg60)
            .bind(p.mem_full_avg300)
            .bind(p.mem_full_total as i64)
            .bind(p.io_some_avg10)
            .bind(p.io_some_avg60)
            .bind(p.io_some_avg300)
            .bind(p.io_some_total as i64)
            .bind(p.io_full_avg10)
            .bind(p.io_full_avg60)
            .bind(p.io_full_avg300)
            .bind(p.io_full_total as i64)
            .execute(pool)
            .await?;
        }
        DataRow::ProcAcct(a) => {
            sqlx::query(&format!(
                "INSERT INTO {} (session_id, receive_time_sec, ac_comm, ac_uid, ac_gid, ac_pid, ac_ppid, \
                 ac_utime, ac_stime, cpu_count, cpu_run_real_total, cpu_run_virtual_total, cpu_delay_total, \
                 cpu_delay_average, coremem, virtmem, hiwater_rss, hiwater_vm, blkio_count, blkio_delay_total, \
                 blkio_delay_average, swapin_count, swapin_delay_total, swapin_delay_average, freepages_count, \
                 freepages_delay_total, freepages_delay_average, thrashing_count, thrashing_delay_total, \
                 thrashing_delay_average) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,$27,$28,$29)",
                schema::PROC_ACCT_TABLE
            ))
            .bind(session_id)
            .bind(a.receive_time_sec as i64)
            .bind(&a.ac_comm)
            .bind(a.ac_uid as i64)
            .bind(a.ac_gid as i64)
            .bind(a.ac_pid as i64)
            .bind(a.ac_ppid as i64)
            .bind(a.ac_utime as i64)
            .bind(a.ac_stime as i64)
            .bind(a.cpu_count as i64)
            .bind(a.cpu_run_real_total as i64)
            .bind(a.cpu_run_virtual_total as i64)
            .bind(a.cpu_delay_total as i64)
            .bind(a.cpu_delay_average)
            .bind(a.coremem as i64)
            .bind(a.virtmem as i64)
            .bind(a.hiwater_rss as i64)
            .bind(a.hiwater_vm as i64)
            .bind(a.blkio_count as i64)
            .bind(a.blkio_delay_total as i64)
            .bind(a.blkio_delay_average)
            .bind(a.swapin_count as i64)
            .bind(a.swapin_delay_total as i64)
            .bind(a.swapin_delay_average)
            .bind(a.freepages_count as i64)
            .bind(a.freepages_delay_total as i64)
            .bind(a.freepages_delay_average)
            .bind(a.thrashing_count as i64)
            .bind(a.thrashing_delay_total as i64)
            .bind(a.thrashing_delay_average)
            .execute(pool)
            .await?;
        }
        DataRow::ProcEvent(e) => {
            let kind = match e.kind {
                ProcEventKind::Fork => "fork",
                ProcEventKind::Exec => "exec",
                ProcEventKind::Exit => "exit",
                ProcEventKind::Uid => "uid",
                ProcEventKind::Gid => "gid",
            };
            sqlx::query(&format!(
                "INSERT INTO {} (session_id, receive_time_sec, kind, process_pid, process_tgid, \
                 parent_pid, parent_tgid, child_pid, child_tgid, exit_code, process_rid, process_eid) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
                schema::PROC_EVENT_TABLE
            ))
            .bind(session_id)
            .bind(e.receive_time_sec as i64)
            .bind(kind)
            .bind(e.process_pid as i64)
            .bind(e.process_tgid as i64)
            .bind(e.parent_pid as i64)
            .bind(e.parent_tgid as i64)
            .bind(e.child_pid as i64)
            .bind(e.child_tgid as i64)
            .bind(e.exit_code)
            .bind(e.process_rid as i64)
            .bind(e.process_eid as i64)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
