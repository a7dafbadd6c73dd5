//! Single task holding the device registry and routing every control
//! request either to the database worker or to one device's worker task.
//!
//! Grounded on `source/Dispatcher.cpp`'s `requestHandler` switch and
//! `source/DeviceManager.cpp` (embedded here as plain state rather than a
//! separate actor — every call site in the original already runs on the
//! dispatcher's own thread of control, so a `HashMap` behind this task's
//! single consumer loop gives the same serialization without another
//! channel hop).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};

use tkm_core::Device;
use tkm_protocol::{ControlRequest, DeviceInfo, Message, SessionInfo, StatusWhat};

use crate::database::Database;
use crate::device_worker::{self, ControlAction, DeviceWorkerHandle};
use crate::time::now_secs;

pub struct DispatcherRequest {
    pub request: ControlRequest,
    pub reply: oneshot::Sender<Message>,
}

#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatcherRequest>,
}

impl DispatcherHandle {
    pub async fn dispatch(&self, request: ControlRequest) -> Message {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(DispatcherRequest { request, reply: reply_tx }).await.is_err() {
            return Message::Status {
                request_id: String::new(),
                what: StatusWhat::Error,
                reason: "dispatcher not running".to_owned(),
            };
        }
        reply_rx.await.unwrap_or(Message::Status {
            request_id: String::new(),
            what: StatusWhat::Error,
            reason: "dispatcher dropped reply".to_owned(),
        })
    }
}

struct DispatcherState {
    db: Arc<Mutex<Database>>,
    devices: HashMap<String, DeviceWorkerHandle>,
    shutdown: watch::Sender<bool>,
}

pub fn spawn(db: Arc<Mutex<Database>>, shutdown: watch::Sender<bool>) -> DispatcherHandle {
    let (tx, rx) = mpsc::channel(64);
    let state = DispatcherState { db, devices: HashMap::new(), shutdown };
    tokio::spawn(run(rx, state));
    DispatcherHandle { tx }
}

async fn run(mut rx: mpsc::Receiver<DispatcherRequest>, mut state: DispatcherState) {
    load_devices(&mut state).await;
    while let Some(DispatcherRequest { request, reply }) = rx.recv().await {
        let response = handle(&mut state, request).await;
        let _ = reply.send(response);
    }
}

/// `LoadDevices`, issued once at startup (`DeviceManager::loadDevices`).
async fn load_devices(state: &mut DispatcherState) {
    let devices = match state.db.lock().await.get_devices().await {
        Ok(devices) => devices,
        Err(err) => {
            tracing::error!(error = %err, "failed to load devices at startup");
            return;
        }
    };
    for device in devices {
        register_device(state, device);
    }
}

fn register_device(state: &mut DispatcherState, device: Device) {
    if state.devices.contains_key(&device.hash) {
        return;
    }
    let handle = device_worker::spawn(device, state.db.clone(), state.shutdown.subscribe());
    state.devices.insert(handle.hash.clone(), handle);
}

fn device_info(device: &Device) -> DeviceInfo {
    DeviceInfo {
        hash: device.hash.clone(),
        name: device.name.clone(),
        address: device.address.clone(),
        port: device.port,
        state: device.state,
    }
}

fn session_info(session: &tkm_core::Session) -> SessionInfo {
    SessionInfo {
        hash: session.hash.clone(),
        name: session.name.clone(),
        device_hash: session.device_hash.clone(),
        started_at: session.started_at,
        ended_at: session.ended_at,
    }
}

fn status(request_id: &str, what: StatusWhat, reason: impl Into<String>) -> Message {
    Message::Status { request_id: request_id.to_owned(), what, reason: reason.into() }
}

async fn handle(state: &mut DispatcherState, request: ControlRequest) -> Message {
    let request_id = request.request_id().to_owned();
    match request {
        ControlRequest::InitDatabase { forced, .. } => {
            if forced {
                tracing::warn!("forced database initialization requested");
            }
            match state.db.lock().await.init_database().await {
                Ok(()) => status(&request_id, StatusWhat::Ok, "Database initialized"),
                Err(err) => status(&request_id, StatusWhat::Error, err.to_string()),
            }
        }
        ControlRequest::QuitCollector { .. } => {
            let _ = state.shutdown.send(true);
            status(&request_id, StatusWhat::Ok, "Collector shutting down")
        }
        ControlRequest::GetDevices { .. } => match state.db.lock().await.get_devices().await {
            Ok(devices) => Message::GetDevicesResult {
                request_id,
                devices: devices.iter().map(device_info).collect(),
            },
            Err(err) => status(&request_id, StatusWhat::Error, err.to_string()),
        },
        ControlRequest::GetSessions { device_hash, .. } => {
            match state.db.lock().await.get_sessions(device_hash.as_deref()).await {
                Ok(sessions) => Message::GetSessionsResult {
                    request_id,
                    sessions: sessions.iter().map(session_info).collect(),
                },
                Err(err) => status(&request_id, StatusWhat::Error, err.to_string()),
            }
        }
        ControlRequest::AddDevice { name, address, port, forced, .. } => {
            match state.db.lock().await.add_device(&name, &address, port, forced).await {
                Ok(device) => {
                    if forced {
                        if let Some(handle) = state.devices.remove(&device.hash) {
                            handle.send(ControlAction::Disconnect).await;
                        }
                    }
                    register_device(state, device);
                    status(&request_id, StatusWhat::Ok, "Device added")
                }
                Err(err) => status(&request_id, StatusWhat::Error, err.to_string()),
            }
        }
        ControlRequest::RemoveDevice { hash, .. } => {
            if let Some(handle) = state.devices.get(&hash) {
                handle.send(ControlAction::Disconnect).await;
            }
            match state.db.lock().await.remove_device(&hash).await {
                Ok(()) => {
                    state.devices.remove(&hash);
                    status(&request_id, StatusWhat::Ok, "Device removed")
                }
                Err(err) => status(&request_id, StatusWhat::Error, err.to_string()),
            }
        }
        ControlRequest::ConnectDevice { hash, .. } => forward_to_device(state, &hash, &request_id, ControlAction::Connect).await,
        ControlRequest::DisconnectDevice { hash, .. } => {
            forward_to_device(state, &hash, &request_id, ControlAction::Disconnect).await
        }
        ControlRequest::StartCollecting { hash, .. } => {
            forward_to_device(state, &hash, &request_id, ControlAction::StartCollecting).await
        }
        ControlRequest::StopCollecting { hash, .. } => {
            forward_to_device(state, &hash, &request_id, ControlAction::StopCollecting).await
        }
    }
}

async fn forward_to_device(
    state: &mut DispatcherState,
    hash: &str,
    request_id: &str,
    action: ControlAction,
) -> Message {
    let Some(handle) = state.devices.get(hash) else {
        return status(request_id, StatusWhat::Error, "No such device");
    };
    let (what, reason) = handle.send(action).await;
    status(request_id, what, reason)
}

/// `CleanSessions`, issued once at startup alongside `LoadDevices`.
pub async fn clean_sessions_at_startup(db: &Arc<Mutex<Database>>) {
    match db.lock().await.clean_sessions(now_secs()).await {
        Ok(closed) if closed > 0 => tracing::info!(closed, "closed stale sessions left open from a prior run"),
        Ok(_) => {}
        Err(err) => tracing::error!(error = %err, "failed to clean stale sessions at startup"),
    }
}
