use serde::{Deserialize, Serialize};

/// One data sample reported by a device, tagged by kind so the database
/// worker can route it to the matching fixed table without a dynamic
/// dispatch layer — the enum stands in for the original's
/// `std::any`-typed `bulkData` field plus a runtime type switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum DataPayload {
    SysProcStat(SysProcStat),
    SysProcMeminfo(SysProcMeminfo),
    SysProcPressure(SysProcPressure),
    ProcAcct(ProcAcct),
    ProcEvent(ProcEvent),
}

/// One CPU line from `/proc/stat`: `name` is `"all"` for the aggregate row
/// and `"cpu<N>"` for each per-core row, matching `SysProcStatColumn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStat {
    pub name: String,
    pub all: u64,
    pub usr: u64,
    pub sys: u64,
}

/// One `tkmSysProcStat` sample: the aggregate line plus one line per core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysProcStat {
    pub receive_time_sec: u64,
    pub cpus: Vec<CpuStat>,
}

/// One `tkmSysProcMeminfo` sample. Columns inferred from `/proc/meminfo`
/// (no surviving column enum in the retrieved original source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysProcMeminfo {
    pub receive_time_sec: u64,
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// One `tkmSysProcPressure` sample, columns matching `SysProcPressureColumn`
/// (CPU/memory/IO pressure, `some`/`full`, 10s/60s/300s averages + total).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysProcPressure {
    pub receive_time_sec: u64,
    pub cpu_some_avg10: f64,
    pub cpu_some_avg60: f64,
    pub cpu_some_avg300: f64,
    pub cpu_some_total: u64,
    pub cpu_full_avg10: f64,
    pub cpu_full_avg60: f64,
    pub cpu_full_avg300: f64,
    pub cpu_full_total: u64,
    pub mem_some_avg10: f64,
    pub mem_some_avg60: f64,
    pub mem_some_avg300: f64,
    pub mem_some_total: u64,
    pub mem_full_avg10: f64,
    pub mem_full_avg60: f64,
    pub mem_full_avg300: f64,
    pub mem_full_total: u64,
    pub io_some_avg10: f64,
    pub io_some_avg60: f64,
    pub io_some_avg300: f64,
    pub io_some_total: u64,
    pub io_full_avg10: f64,
    pub io_full_avg60: f64,
    pub io_full_avg300: f64,
    pub io_full_total: u64,
}

/// One `tkmProcAcct` sample, columns matching `ProcAcctColumn`
/// (BSD process accounting data: identity, CPU/memory/swap/IO stats,
/// delay accounting fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcAcct {
    pub receive_time_sec: u64,
    pub ac_comm: String,
    pub ac_uid: u32,
    pub ac_gid: u32,
    pub ac_pid: u32,
    pub ac_ppid: u32,
    pub ac_utime: u64,
    pub ac_stime: u64,
    pub cpu_count: u64,
    pub cpu_run_real_total: u64,
    pub cpu_run_virtual_total: u64,
    pub cpu_delay_total: u64,
    pub cpu_delay_average: f64,
    pub coremem: u64,
    pub virtmem: u64,
    pub hiwater_rss: u64,
    pub hiwater_vm: u64,
    pub blkio_count: u64,
    pub blkio_delay_total: u64,
    pub blkio_delay_average: f64,
    pub swapin_count: u64,
    pub swapin_delay_total: u64,
    pub swapin_delay_average: f64,
    pub freepages_count: u64,
    pub freepages_delay_total: u64,
    pub freepages_delay_average: f64,
    pub thrashing_count: u64,
    pub thrashing_delay_total: u64,
    pub thrashing_delay_average: f64,
}

/// The process lifecycle event kind carried by a `tkmProcEvent` sample,
/// matching the netlink process-event-connector event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcEventKind {
    Fork,
    Exec,
    Exit,
    Uid,
    Gid,
}

/// One `tkmProcEvent` sample, columns matching `ProcEventColumn`
/// (process/parent/child pid+tgid, exit code, fork event correlation ids).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcEvent {
    pub receive_time_sec: u64,
    pub kind: ProcEventKind,
    pub process_pid: u32,
    pub process_tgid: u32,
    pub parent_pid: u32,
    pub parent_tgid: u32,
    pub child_pid: u32,
    pub child_tgid: u32,
    pub exit_code: i32,
    pub process_rid: u32,
    pub process_eid: u32,
}
