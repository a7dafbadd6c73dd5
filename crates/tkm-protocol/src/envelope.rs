use serde::{Deserialize, Serialize};

use crate::data::DataPayload;

/// Who an [`Envelope`] is from or addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Any,
    Collector,
    Control,
    Monitor,
    Server,
    Client,
}

/// Result reported by a `Status` message, mirroring `collector::Status::What`
/// (`OK`, `Busy`, `Error`) from the original protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusWhat {
    Ok,
    Busy,
    Error,
}

/// A device as reported back over the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub hash: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub state: tkm_core::DeviceState,
}

/// A session as reported back over the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub hash: String,
    pub name: String,
    pub device_hash: String,
    pub started_at: u64,
    pub ended_at: Option<u64>,
}

/// One request sent over the control socket, tagged by action name.
///
/// Every variant carries the `request_id` the reply's `Status` echoes back,
/// matching `collector::Request` in the original protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    InitDatabase { request_id: String, forced: bool },
    QuitCollector { request_id: String },
    GetDevices { request_id: String },
    GetSessions { request_id: String, device_hash: Option<String> },
    AddDevice { request_id: String, name: String, address: String, port: u16, forced: bool },
    RemoveDevice { request_id: String, hash: String },
    ConnectDevice { request_id: String, hash: String },
    DisconnectDevice { request_id: String, hash: String },
    StartCollecting { request_id: String, hash: String },
    StopCollecting { request_id: String, hash: String },
}

impl ControlRequest {
    pub fn request_id(&self) -> &str {
        match self {
            ControlRequest::InitDatabase { request_id, .. }
            | ControlRequest::QuitCollector { request_id }
            | ControlRequest::GetDevices { request_id }
            | ControlRequest::GetSessions { request_id, .. }
            | ControlRequest::AddDevice { request_id, .. }
            | ControlRequest::RemoveDevice { request_id, .. }
            | ControlRequest::ConnectDevice { request_id, .. }
            | ControlRequest::DisconnectDevice { request_id, .. }
            | ControlRequest::StartCollecting { request_id, .. }
            | ControlRequest::StopCollecting { request_id, .. } => request_id,
        }
    }
}

/// The body of an [`Envelope`]: either a control-plane message or a
/// monitor-plane message exchanged with a connected device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Handshake identifying one side of a fresh connection.
    Descriptor { id: String },

    /// A control-plane request, forwarded collector-side to the dispatcher.
    Request(ControlRequest),

    /// A status reply, `request_id` echoing the originating request.
    Status { request_id: String, what: StatusWhat, reason: String },

    GetDevicesResult { request_id: String, devices: Vec<DeviceInfo> },
    GetSessionsResult { request_id: String, sessions: Vec<SessionInfo> },

    /// Sent collector -> device asking the agent to open a session.
    CreateSession { request_id: String },

    /// Sent device -> collector once a session has been opened agent-side,
    /// carrying the agent's session hash. The collector assigns the
    /// session's name itself (`"Collector.<pid>.<epoch>"`).
    SessionInfo { hash: String },

    /// Sent collector -> device to toggle data streaming.
    StreamState { enabled: bool },

    /// Sent device -> collector carrying one sample of telemetry data.
    Data { payload: DataPayload, monotonic_time: u64 },

    /// Sent device -> collector reporting agent-side status.
    AgentStatus { request_id: String, what: StatusWhat, reason: String },
}

/// A full message frame: who it's from, who it's for, and the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: Recipient,
    pub target: Recipient,
    pub message: Message,
}

impl Envelope {
    pub fn new(origin: Recipient, target: Recipient, message: Message) -> Self {
        Self { origin, target, message }
    }
}
