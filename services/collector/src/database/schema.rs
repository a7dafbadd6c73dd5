//! Fixed table names and per-backend `CREATE TABLE` statements.
//!
//! One logical schema, two SQL dialects — the Rust expression of the
//! original's `Query::Type{SQLite3, PostgreSQL}` parameterized SQL
//! generator (`shared/Query.h`). Table and column names are fixed exactly
//! as named there; `tkmSysProcMeminfo`'s columns are an inference (see
//! `DESIGN.md`) since no column enum for it survived in the retrieved
//! original source.

pub const DEVICES_TABLE: &str = "tkmDevices";
pub const SESSIONS_TABLE: &str = "tkmSessions";
pub const SYS_PROC_STAT_TABLE: &str = "tkmSysProcStat";
pub const SYS_PROC_MEMINFO_TABLE: &str = "tkmSysProcMeminfo";
pub const SYS_PROC_PRESSURE_TABLE: &str = "tkmSysProcPressure";
pub const PROC_ACCT_TABLE: &str = "tkmProcAcct";
pub const PROC_EVENT_TABLE: &str = "tkmProcEvent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite3,
    PostgreSql,
}

impl Dialect {
    fn pk(self) -> &'static str {
        match self {
            Dialect::Sqlite3 => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::PostgreSql => "BIGSERIAL PRIMARY KEY",
        }
    }
}

/// All `CREATE TABLE IF NOT EXISTS` statements for the given dialect, in
/// dependency order (devices/sessions before the data tables that
/// reference them).
pub fn create_table_statements(dialect: Dialect) -> Vec<String> {
    let pk = dialect.pk();
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {DEVICES_TABLE} (\
                id {pk}, \
                hash TEXT NOT NULL UNIQUE, \
                name TEXT NOT NULL, \
                address TEXT NOT NULL, \
                port INTEGER NOT NULL, \
                state TEXT NOT NULL)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SESSIONS_TABLE} (\
                id {pk}, \
                hash TEXT NOT NULL UNIQUE, \
                name TEXT NOT NULL, \
                device_hash TEXT NOT NULL, \
                started_at BIGINT NOT NULL, \
                ended_at BIGINT)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SYS_PROC_STAT_TABLE} (\
                id {pk}, \
                session_id BIGINT NOT NULL, \
                receive_time_sec BIGINT NOT NULL, \
                cpu_name TEXT NOT NULL, \
                cpu_all BIGINT NOT NULL, \
                cpu_usr BIGINT NOT NULL, \
                cpu_sys BIGINT NOT NULL)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SYS_PROC_MEMINFO_TABLE} (\
                id {pk}, \
                session_id BIGINT NOT NULL, \
                receive_time_sec BIGINT NOT NULL, \
                mem_total BIGINT NOT NULL, \
                mem_free BIGINT NOT NULL, \
                mem_available BIGINT NOT NULL, \
                buffers BIGINT NOT NULL, \
                cached BIGINT NOT NULL, \
                swap_total BIGINT NOT NULL, \
                swap_free BIGINT NOT NULL)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {SYS_PROC_PRESSURE_TABLE} (\
                id {pk}, \
                session_id BIGINT NOT NULL, \
                receive_time_sec BIGINT NOT NULL, \
                cpu_some_avg10 DOUBLE PRECISION NOT NULL, \
                cpu_some_avg60 DOUBLE PRECISION NOT NULL, \
                cpu_some_avg300 DOUBLE PRECISION NOT NULL, \
                cpu_some_total BIGINT NOT NULL, \
                cpu_full_avg10 DOUBLE PRECISION NOT NULL, \
                cpu_full_avg60 DOUBLE PRECISION NOT NULL, \
                cpu_full_avg300 DOUBLE PRECISION NOT NULL, \
                cpu_full_total BIGINT NOT NULL, \
                mem_some_avg10 DOUBLE PRECISION NOT NULL, \
                mem_some_avg60 DOUBLE PRECISION NOT NULL, \
                mem_some_avg300 DOUBLE PRECISION NOT NULL, \
                mem_some_total BIGINT NOT NULL, \
                mem_full_avg10 DOUBLE PRECISION NOT NULL, \
                mem_full_avg60 DOUBLE PRECISION NOT NULL, \
                mem_full_avg300 DOUBLE PRECISION NOT NULL, \
                mem_full_total BIGINT NOT NULL, \
                io_some_avg10 DOUBLE PRECISION NOT NULL, \
                io_some_avg60 DOUBLE PRECISION NOT NULL, \
                io_some_avg300 DOUBLE PRECISION NOT NULL, \
                io_some_total BIGINT NOT NULL, \
                io_full_avg10 DOUBLE PRECISION NOT NULL, \
                io_full_avg60 DOUBLE PRECISION NOT NULL, \
                io_full_avg300 DOUBLE PRECISION NOT NULL, \
                io_full_total BIGINT NOT NULL)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {PROC_ACCT_TABLE} (\
                id {pk}, \
                session_id BIGINT NOT NULL, \
                receive_time_sec BIGINT NOT NULL, \
                ac_comm TEXT NOT NULL, \
                ac_uid BIGINT NOT NULL, \
                ac_gid BIGINT NOT NULL, \
                ac_pid BIGINT NOT NULL, \
                ac_ppid BIGINT NOT NULL, \
                ac_utime BIGINT NOT NULL, \
                ac_stime BIGINT NOT NULL, \
                cpu_count BIGINT NOT NULL, \
                cpu_run_real_total BIGINT NOT NULL, \
                cpu_run_virtual_total BIGINT NOT NULL, \
                cpu_delay_total BIGINT NOT NULL, \
                cpu_delay_average DOUBLE PRECISION NOT NULL, \
                coremem BIGINT NOT NULL, \
                virtmem BIGINT NOT NULL, \
                hiwater_rss BIGINT NOT NULL, \
                hiwater_vm BIGINT NOT NULL, \
                blkio_count BIGINT NOT NULL, \
                blkio_delay_total BIGINT NOT NULL, \
                blkio_delay_average DOUBLE PRECISION NOT NULL, \
                swapin_count BIGINT NOT NULL, \
                swapin_delay_total BIGINT NOT NULL, \
                swapin_delay_average DOUBLE PRECISION NOT NULL, \
                freepages_count BIGINT NOT NULL, \
                freepages_delay_total BIGINT NOT NULL, \
                freepages_delay_average DOUBLE PRECISION NOT NULL, \
                thrashing_count BIGINT NOT NULL, \
                thrashing_delay_total BIGINT NOT NULL, \
                thrashing_delay_average DOUBLE PRECISION NOT NULL)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {PROC_EVENT_TABLE} (\
                id {pk}, \
                session_id BIGINT NOT NULL, \
                receive_time_sec BIGINT NOT NULL, \
                kind TEXT NOT NULL, \
                process_pid BIGINT NOT NULL, \
                process_tgid BIGINT NOT NULL, \
                parent_pid BIGINT NOT NULL, \
                parent_tgid BIGINT NOT NULL, \
                child_pid BIGINT NOT NULL, \
                child_tgid BIGINT NOT NULL, \
                exit_code INTEGER NOT NULL, \
                process_rid BIGINT NOT NULL, \
                process_eid BIGINT NOT NULL)"
        ),
    ]
}
