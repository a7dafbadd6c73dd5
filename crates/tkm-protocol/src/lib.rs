//! Wire protocol for tkmcollector: envelopes, framing, and data payloads
//! exchanged between the collector, its control clients, and monitored
//! devices.

mod data;
mod envelope;
mod frame;

pub use data::{
    CpuStat, DataPayload, ProcAcct, ProcEvent, ProcEventKind, SysProcMeminfo, SysProcPressure, SysProcStat,
};
pub use envelope::{
    ControlRequest, DeviceInfo, Envelope, Message, Recipient, SessionInfo, StatusWhat,
};
pub use frame::{FrameCodec, FrameError, FrameKind};
