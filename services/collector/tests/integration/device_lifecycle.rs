//! Drives one device worker through its full happy-path lifecycle against
//! a fake TCP monitor agent, exercising the handshake, session creation,
//! streaming and disconnect handling end to end (spec.md scenarios
//! E1/E2/E3/E6).

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_util::codec::Framed;

use collector::database::Database;
use collector::device_worker::{self, ControlAction};
use tkm_core::HashCollisionPolicy;
use tkm_protocol::{Envelope, FrameCodec, FrameKind, Message, Recipient, StatusWhat};

async fn fake_monitor_handshake(stream: TcpStream) -> Framed<TcpStream, FrameCodec> {
    let mut framed = Framed::new(stream, FrameCodec::new(FrameKind::DescriptorPadded));
    let first = framed.next().await.unwrap().unwrap();
    assert!(matches!(first.message, Message::Descriptor { .. }));
    framed.map_codec(|_| FrameCodec::new(FrameKind::Varint))
}

#[tokio::test]
async fn device_connects_collects_and_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let db = Arc::new(Mutex::new(Database::open_sqlite_in_memory(HashCollisionPolicy::Reject).unwrap()));
    db.lock().await.init_database().await.unwrap();
    let device = db.lock().await.add_device("unit-under-test", &addr.ip().to_string(), addr.port(), false).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = device_worker::spawn(device, db.clone(), shutdown_rx);

    let agent = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = fake_monitor_handshake(stream).await;

        // Collector asks us to open a session.
        let create_session = framed.next().await.unwrap().unwrap();
        assert!(matches!(create_session.message, Message::CreateSession { .. }));

        let session_info =
            Envelope::new(Recipient::Monitor, Recipient::Collector, Message::SessionInfo { hash: "S1".to_owned() });
        framed.send(session_info).await.unwrap();

        // Collector turns streaming on once the session is set.
        let start_stream = framed.next().await.unwrap().unwrap();
        assert!(matches!(start_stream.message, Message::StreamState { enabled: true }));

        let data = Envelope::new(
            Recipient::Monitor,
            Recipient::Collector,
            Message::Data {
                payload: tkm_protocol::DataPayload::SysProcMeminfo(tkm_protocol::SysProcMeminfo {
                    receive_time_sec: 1,
                    mem_total: 100,
                    mem_free: 50,
                    mem_available: 60,
                    buffers: 1,
                    cached: 2,
                    swap_total: 0,
                    swap_free: 0,
                }),
                monotonic_time: 1,
            },
        );
        framed.send(data).await.unwrap();

        let stop_stream = framed.next().await.unwrap().unwrap();
        assert!(matches!(stop_stream.message, Message::StreamState { enabled: false }));
    });

    let (what, _) = handle.send(ControlAction::Connect).await;
    assert_eq!(what, StatusWhat::Ok);

    let (what, _) = handle.send(ControlAction::StartCollecting).await;
    assert_eq!(what, StatusWhat::Ok);

    // Give the worker's event loop a turn to process the fake agent's
    // replies before asserting on persisted state.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (what, _) = handle.send(ControlAction::StopCollecting).await;
    assert_eq!(what, StatusWhat::Ok);

    agent.await.unwrap();

    let sessions = db.lock().await.get_sessions(None).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].hash, "S1");
    let pid = std::process::id();
    assert!(
        sessions[0].name.starts_with(&format!("Collector.{pid}.")),
        "expected a collector-assigned name, got {:?}",
        sessions[0].name
    );

    let (what, _) = handle.send(ControlAction::Disconnect).await;
    assert_eq!(what, StatusWhat::Ok);

    let devices = db.lock().await.get_devices().await.unwrap();
    assert_eq!(devices[0].state, tkm_core::DeviceState::Disconnected);

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn connect_to_unreachable_device_reports_error() {
    let db = Arc::new(Mutex::new(Database::open_sqlite_in_memory(HashCollisionPolicy::Reject).unwrap()));
    db.lock().await.init_database().await.unwrap();
    // Port 1 is reserved and nothing answers there; the 3s connect timeout
    // in `device_worker::do_connect` bounds how long this test can take.
    let device = db.lock().await.add_device("unreachable", "127.0.0.1", 1, false).await.unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = device_worker::spawn(device, db.clone(), shutdown_rx);

    let (what, reason) = handle.send(ControlAction::Connect).await;
    assert_eq!(what, StatusWhat::Error);
    assert_eq!(reason, "Connection Failed");
}
