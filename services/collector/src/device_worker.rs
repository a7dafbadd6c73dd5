//! One task per monitored device: owns the outbound TCP connection to the
//! monitor agent and the device's state machine.
//!
//! Grounded action-by-action on `source/MonitorDevice.cpp`: `doConnect`,
//! `doSendDescriptor`, `doRequestSession`, `doSetSession`, `doDisconnect`,
//! `doStartStream`/`doStopStream`, `doStartCollecting`, `doStopCollecting`,
//! `doProcessData`, `doStatus`. Actions the original self-enqueues onto its
//! own queue (`SendDescriptor` after a successful connect, `StartStream`
//! after `SetSession`) are instead called directly within the same handler
//! — one task already processes one request to completion before the next,
//! so the extra round trip through the channel would be observationally
//! identical but slower.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::codec::Framed;

use tkm_core::{Device, DeviceEvent, DeviceState};
use tkm_protocol::{Envelope, FrameCodec, FrameKind, Message, Recipient, StatusWhat};

use crate::database::Database;
use crate::time::now_secs;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A request the dispatcher routes to one device's worker task.
#[derive(Debug)]
pub enum ControlAction {
    Connect,
    Disconnect,
    StartCollecting,
    StopCollecting,
}

#[derive(Debug)]
pub struct ControlMessage {
    pub action: ControlAction,
    pub reply: oneshot::Sender<(StatusWhat, String)>,
}

/// A handle the dispatcher holds to talk to one running device worker.
#[derive(Clone)]
pub struct DeviceWorkerHandle {
    pub hash: String,
    tx: mpsc::Sender<ControlMessage>,
}

impl DeviceWorkerHandle {
    pub async fn send(&self, action: ControlAction) -> (StatusWhat, String) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(ControlMessage { action, reply: reply_tx }).await.is_err() {
            return (StatusWhat::Error, "device worker not running".to_owned());
        }
        reply_rx.await.unwrap_or((StatusWhat::Error, "device worker dropped reply".to_owned()))
    }
}

struct WorkerState {
    device: Device,
    session_hash: Option<String>,
    connection: Option<Framed<TcpStream, FrameCodec>>,
}

pub fn spawn(device: Device, db: Arc<Mutex<Database>>, shutdown: watch::Receiver<bool>) -> DeviceWorkerHandle {
    let (tx, rx) = mpsc::channel(32);
    let hash = device.hash.clone();
    let state = WorkerState { device, session_hash: None, connection: None };
    tokio::spawn(run(rx, state, db, shutdown));
    DeviceWorkerHandle { hash, tx }
}

/// What the next event on the worker's loop turned out to be. Resolved
/// entirely inside `select!` without touching `state` so that the borrow
/// `next_frame` holds on `state.connection` is released before any handler
/// below needs `&mut state` — folding the dispatch into the `select!` arms
/// directly would hold that borrow live across them.
enum WorkerEvent {
    ShuttingDown,
    ControlChannelClosed,
    Control(ControlMessage),
    Frame(Option<Result<Envelope, tkm_protocol::FrameError>>),
}

async fn run(
    mut rx: mpsc::Receiver<ControlMessage>,
    mut state: WorkerState,
    db: Arc<Mutex<Database>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = {
            let next_frame = async {
                match state.connection.as_mut() {
                    Some(conn) => conn.next().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.changed() => WorkerEvent::ShuttingDown,
                msg = rx.recv() => match msg {
                    Some(msg) => WorkerEvent::Control(msg),
                    None => WorkerEvent::ControlChannelClosed,
                },
                frame = next_frame => WorkerEvent::Frame(frame),
            }
        };

        match event {
            WorkerEvent::ShuttingDown => {
                if *shutdown.borrow() {
                    break;
                }
            }
            WorkerEvent::ControlChannelClosed => break,
            WorkerEvent::Control(ControlMessage { action, reply }) => {
                let (what, reason) = handle_control_action(&mut state, &db, action).await;
                let _ = reply.send((what, reason));
            }
            WorkerEvent::Frame(Some(Ok(envelope))) => handle_monitor_message(&mut state, &db, envelope).await,
            WorkerEvent::Frame(Some(Err(err))) => {
                tracing::warn!(hash = %state.device.hash, error = %err, "device connection error");
                disconnect(&mut state, &db).await;
            }
            WorkerEvent::Frame(None) => {
                tracing::info!(hash = %state.device.hash, "device connection closed by peer");
                disconnect(&mut state, &db).await;
            }
        }
    }
}

async fn persist_state(state: &WorkerState, db: &Arc<Mutex<Database>>) {
    if let Err(err) = db.lock().await.update_device_state(&state.device.hash, state.device.state).await {
        tracing::warn!(hash = %state.device.hash, error = %err, "failed to persist device state");
    }
}

async fn disconnect(state: &mut WorkerState, db: &Arc<Mutex<Database>>) {
    if state.device.state == DeviceState::Disconnected {
        return;
    }
    if let Some(session_hash) = state.session_hash.take() {
        if let Err(err) = db.lock().await.end_session(&session_hash, now_secs()).await {
            tracing::warn!(hash = %state.device.hash, error = %err, "failed to end session on disconnect");
        }
    }
    state.connection = None;
    if let Ok(next) = state.device.state.apply(DeviceEvent::Disconnect) {
        state.device.state = next;
    }
    persist_state(state, db).await;
}

async fn handle_control_action(
    state: &mut WorkerState,
    db: &Arc<Mutex<Database>>,
    action: ControlAction,
) -> (StatusWhat, String) {
    match action {
        ControlAction::Connect => do_connect(state, db).await,
        ControlAction::Disconnect => do_disconnect(state, db).await,
        ControlAction::StartCollecting => do_start_collecting(state, db).await,
        ControlAction::StopCollecting => do_stop_collecting(state, db).await,
    }
}

async fn do_connect(state: &mut WorkerState, db: &Arc<Mutex<Database>>) -> (StatusWhat, String) {
    if state.device.state == DeviceState::Disconnected {
        if let Ok(next) = state.device.state.apply(DeviceEvent::Reconnect) {
            state.device.state = next;
        }
    }
    let addr = format!("{}:{}", state.device.address, state.device.port);
    let connect = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await;
    let stream = match connect {
        Ok(Ok(stream)) => stream,
        _ => {
            if let Ok(next) = state.device.state.apply(DeviceEvent::ConnectFailed) {
                state.device.state = next;
            }
            persist_state(state, db).await;
            return (StatusWhat::Error, "Connection Failed".to_owned());
        }
    };

    let mut framed = Framed::new(stream, FrameCodec::new(FrameKind::DescriptorPadded));
    let descriptor =
        Envelope::new(Recipient::Collector, Recipient::Monitor, Message::Descriptor { id: "Collector".to_owned() });
    if framed.send(descriptor).await.is_err() {
        if let Ok(next) = state.device.state.apply(DeviceEvent::ConnectFailed) {
            state.device.state = next;
        }
        persist_state(state, db).await;
        return (StatusWhat::Error, "Connection Failed".to_owned());
    }
    // Regular envelope traffic after the handshake uses the plain varint
    // framing, not the 8-byte-padded descriptor framing.
    let framed = framed.map_codec(|_| FrameCodec::new(FrameKind::Varint));
    state.connection = Some(framed);
    if let Ok(next) = state.device.state.apply(DeviceEvent::DescriptorSent) {
        state.device.state = next;
    }
    persist_state(state, db).await;
    (StatusWhat::Ok, "Connected".to_owned())
}

async fn do_disconnect(state: &mut WorkerState, db: &Arc<Mutex<Database>>) -> (StatusWhat, String) {
    if state.device.state == DeviceState::Disconnected {
        return (StatusWhat::Error, "Device not connected".to_owned());
    }
    disconnect(state, db).await;
    (StatusWhat::Ok, "Device disconnected".to_owned())
}

async fn do_start_collecting(state: &mut WorkerState, db: &Arc<Mutex<Database>>) -> (StatusWhat, String) {
    match state.device.state {
        DeviceState::Connected | DeviceState::Idle => {
            let req = Envelope::new(
                Recipient::Collector,
                Recipient::Monitor,
                Message::CreateSession { request_id: "StartCollecting".to_owned() },
            );
            send_to_device(state, req).await;
            if let Ok(next) = state.device.state.apply(DeviceEvent::RequestSession) {
                state.device.state = next;
            }
            persist_state(state, db).await;
            (StatusWhat::Ok, "Requesting session".to_owned())
        }
        DeviceState::SessionSet => {
            start_stream(state, db).await;
            (StatusWhat::Ok, "Collecting".to_owned())
        }
        _ => (StatusWhat::Error, "Device not connected".to_owned()),
    }
}

async fn do_stop_collecting(state: &mut WorkerState, db: &Arc<Mutex<Database>>) -> (StatusWhat, String) {
    match state.device.state {
        DeviceState::Collecting => {
            let req = Envelope::new(Recipient::Collector, Recipient::Monitor, Message::StreamState { enabled: false });
            send_to_device(state, req).await;
            if let Ok(next) = state.device.state.apply(DeviceEvent::StopStream) {
                state.device.state = next;
            }
            persist_state(state, db).await;
            (StatusWhat::Ok, "Stopped collecting".to_owned())
        }
        _ => (StatusWhat::Error, "Device not streaming".to_owned()),
    }
}

async fn start_stream(state: &mut WorkerState, db: &Arc<Mutex<Database>>) {
    let req = Envelope::new(Recipient::Collector, Recipient::Monitor, Message::StreamState { enabled: true });
    send_to_device(state, req).await;
    if let Ok(next) = state.device.state.apply(DeviceEvent::StartStream) {
        state.device.state = next;
    }
    persist_state(state, db).await;
}

async fn send_to_device(state: &mut WorkerState, envelope: Envelope) {
    if let Some(conn) = state.connection.as_mut() {
        if let Err(err) = conn.send(envelope).await {
            tracing::warn!(hash = %state.device.hash, error = %err, "failed to write to device connection");
        }
    }
}

async fn handle_monitor_message(state: &mut WorkerState, db: &Arc<Mutex<Database>>, envelope: Envelope) {
    if envelope.origin != Recipient::Monitor {
        tracing::debug!(hash = %state.device.hash, "ignoring envelope not originating from monitor");
        return;
    }
    match envelope.message {
        Message::SessionInfo { hash: session_hash } => {
            if state.device.state != DeviceState::Connected {
                tracing::warn!(hash = %state.device.hash, "received SessionInfo outside Connected state");
                return;
            }
            let started_at = now_secs();
            let name = tkm_core::Session::name_for(std::process::id(), started_at);
            let result = db.lock().await.add_session(&session_hash, &name, &state.device.hash, started_at).await;
            match result {
                Ok(()) => {
                    state.session_hash = Some(session_hash);
                    if let Ok(next) = state.device.state.apply(DeviceEvent::SetSession) {
                        state.device.state = next;
                    }
                    persist_state(state, db).await;
                    start_stream(state, db).await;
                }
                Err(err) => {
                    tracing::warn!(hash = %state.device.hash, error = %err, "failed to record session");
                }
            }
        }
        Message::Data { payload, monotonic_time: _ } => {
            if state.device.state != DeviceState::Collecting {
                tracing::debug!(hash = %state.device.hash, "dropping data received outside Collecting state");
                return;
            }
            let Some(session_hash) = state.session_hash.clone() else {
                tracing::warn!(hash = %state.device.hash, "dropping data with no active session");
                return;
            };
            if let Err(err) = db.lock().await.add_data(&session_hash, &payload).await {
                tracing::warn!(hash = %state.device.hash, error = %err, "failed to store data sample");
            }
        }
        Message::AgentStatus { what, reason, .. } => {
            tracing::debug!(hash = %state.device.hash, ?what, %reason, "agent status");
        }
        other => {
            tracing::debug!(hash = %state.device.hash, ?other, "unexpected monitor message");
        }
    }
}
