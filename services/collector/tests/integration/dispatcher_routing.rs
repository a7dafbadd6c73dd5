//! Exercises the dispatcher's routing rules directly: control-plane
//! requests reach the database, device-plane requests resolve by hash or
//! come back `Error` for an unknown one, and `QuitCollector` flips the
//! shared shutdown signal (spec.md scenarios E4/E5).

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use collector::database::Database;
use collector::dispatcher;
use tkm_core::HashCollisionPolicy;
use tkm_protocol::{ControlRequest, Message, StatusWhat};

fn req_id() -> String {
    "test-request".to_owned()
}

#[tokio::test]
async fn add_device_then_get_devices_round_trips() {
    let db = Arc::new(Mutex::new(Database::open_sqlite_in_memory(HashCollisionPolicy::Reject).unwrap()));
    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let dispatcher = dispatcher::spawn(db, shutdown_tx);

    let reply = dispatcher
        .dispatch(ControlRequest::InitDatabase { request_id: req_id(), forced: false })
        .await;
    assert!(matches!(reply, Message::Status { what: StatusWhat::Ok, .. }));

    let reply = dispatcher
        .dispatch(ControlRequest::AddDevice {
            request_id: req_id(),
            name: "dev1".to_owned(),
            address: "10.0.0.5".to_owned(),
            port: 9000,
            forced: false,
        })
        .await;
    assert!(matches!(reply, Message::Status { what: StatusWhat::Ok, .. }));

    let reply = dispatcher.dispatch(ControlRequest::GetDevices { request_id: req_id() }).await;
    match reply {
        Message::GetDevicesResult { devices, .. } => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].name, "dev1");
        }
        other => panic!("expected GetDevicesResult, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_add_device_is_rejected_unless_forced() {
    let db = Arc::new(Mutex::new(Database::open_sqlite_in_memory(HashCollisionPolicy::Reject).unwrap()));
    db.lock().await.init_database().await.unwrap();
    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let dispatcher = dispatcher::spawn(db, shutdown_tx);

    let add = |name: &str, forced: bool| ControlRequest::AddDevice {
        request_id: req_id(),
        name: name.to_owned(),
        address: "127.0.0.1".to_owned(),
        port: 3357,
        forced,
    };

    let reply = dispatcher.dispatch(add("dev1", false)).await;
    assert!(matches!(reply, Message::Status { what: StatusWhat::Ok, .. }));

    let reply = dispatcher.dispatch(add("dev1b", false)).await;
    match reply {
        Message::Status { what: StatusWhat::Error, reason, .. } => assert_eq!(reason, "Device already exists"),
        other => panic!("expected an error status, got {other:?}"),
    }

    let reply = dispatcher.dispatch(add("dev1b", true)).await;
    assert!(matches!(reply, Message::Status { what: StatusWhat::Ok, .. }));

    let reply = dispatcher.dispatch(ControlRequest::GetDevices { request_id: req_id() }).await;
    match reply {
        Message::GetDevicesResult { devices, .. } => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].name, "dev1b");
        }
        other => panic!("expected GetDevicesResult, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_device_hash_is_rejected_with_error_status() {
    let db = Arc::new(Mutex::new(Database::open_sqlite_in_memory(HashCollisionPolicy::Reject).unwrap()));
    db.lock().await.init_database().await.unwrap();
    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let dispatcher = dispatcher::spawn(db, shutdown_tx);

    let reply = dispatcher
        .dispatch(ControlRequest::ConnectDevice { request_id: req_id(), hash: "no-such-hash".to_owned() })
        .await;
    match reply {
        Message::Status { what: StatusWhat::Error, reason, .. } => assert_eq!(reason, "No such device"),
        other => panic!("expected an error status, got {other:?}"),
    }
}

#[tokio::test]
async fn start_collecting_request_id_never_leaks_across_device_actions() {
    // Regression guard for the original's copy-pasted `StopCollecting`
    // request id (see DESIGN.md Open Question 3): each `ControlRequest`
    // variant carries and echoes back its own request id, so a stop
    // request can never surface the string `"StartCollecting"`.
    let stop = ControlRequest::StopCollecting { request_id: "abc".to_owned(), hash: "h".to_owned() };
    assert_eq!(stop.request_id(), "abc");
    let start = ControlRequest::StartCollecting { request_id: "xyz".to_owned(), hash: "h".to_owned() };
    assert_eq!(start.request_id(), "xyz");
}

#[tokio::test]
async fn quit_collector_flips_shutdown_signal() {
    let db = Arc::new(Mutex::new(Database::open_sqlite_in_memory(HashCollisionPolicy::Reject).unwrap()));
    db.lock().await.init_database().await.unwrap();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let dispatcher = dispatcher::spawn(db, shutdown_tx);

    let reply = dispatcher.dispatch(ControlRequest::QuitCollector { request_id: req_id() }).await;
    assert!(matches!(reply, Message::Status { what: StatusWhat::Ok, .. }));

    shutdown_rx.changed().await.unwrap();
    assert!(*shutdown_rx.borrow());
}
