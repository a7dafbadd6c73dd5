//! Exercises both configured behaviours for a session-hash collision (an
//! `AddSession` whose hash matches a session that's still open) — spec.md
//! §9 Open Question 1, decided in DESIGN.md: `Reject` by default,
//! `Cascade` reproducing the original's delete-and-replace behaviour.

use collector::database::Database;
use tkm_core::HashCollisionPolicy;

async fn seeded_db(policy: HashCollisionPolicy) -> Database {
    let db = Database::open_sqlite_in_memory(policy).unwrap();
    db.init_database().await.unwrap();
    db.add_device("dev1", "10.0.0.1", 9000, false).await.unwrap();
    db
}

#[tokio::test]
async fn reject_policy_allows_a_fresh_hash() {
    let db = seeded_db(HashCollisionPolicy::Reject).await;
    let devices = db.get_devices().await.unwrap();
    let device_hash = devices[0].hash.clone();

    db.add_session("s1", "Collector.1.100", &device_hash, 100).await.unwrap();
    db.add_session("s2", "Collector.2.200", &device_hash, 200).await.unwrap();

    let sessions = db.get_sessions(None).await.unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn reject_policy_refuses_reusing_a_hash_still_open() {
    let db = seeded_db(HashCollisionPolicy::Reject).await;
    let devices = db.get_devices().await.unwrap();
    let device_hash = devices[0].hash.clone();

    db.add_session("dup", "Collector.1.100", &device_hash, 100).await.unwrap();
    let err = db.add_session("dup", "Collector.1.999", &device_hash, 999).await.unwrap_err();
    assert!(matches!(err, collector::database::DbError::SessionHashCollision(h) if h == "dup"));

    let sessions = db.get_sessions(None).await.unwrap();
    assert_eq!(sessions.len(), 1, "the rejected session must not have been inserted");
}

#[tokio::test]
async fn cascade_policy_deletes_the_prior_session_and_its_data() {
    let db = seeded_db(HashCollisionPolicy::Cascade).await;
    let devices = db.get_devices().await.unwrap();
    let device_hash = devices[0].hash.clone();

    db.add_session("dup", "Collector.1.100", &device_hash, 100).await.unwrap();
    db.add_data(
        "dup",
        &tkm_protocol::DataPayload::SysProcMeminfo(tkm_protocol::SysProcMeminfo {
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
    .await
    .unwrap();

    // A second session claiming the same hash cascades: the prior session
    // (and the data row just inserted under it) is deleted to make room.
    db.add_session("dup", "Collector.1.999", &device_hash, 999).await.unwrap();

    let sessions = db.get_sessions(None).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].started_at, 999);
}

#[tokio::test]
async fn reject_policy_refuses_reusing_a_hash_even_after_the_prior_session_ended() {
    // At most one session per hash ever exists; a hash is never freed up
    // just because the session holding it has already ended.
    let db = seeded_db(HashCollisionPolicy::Reject).await;
    let devices = db.get_devices().await.unwrap();
    let device_hash = devices[0].hash.clone();

    db.add_session("dup", "Collector.1.100", &device_hash, 100).await.unwrap();
    db.end_session("dup", 150).await.unwrap();

    let err = db.add_session("dup", "Collector.1.999", &device_hash, 999).await.unwrap_err();
    assert!(matches!(err, collector::database::DbError::SessionHashCollision(h) if h == "dup"));

    let sessions = db.get_sessions(None).await.unwrap();
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn cascade_policy_reuses_a_hash_even_after_the_prior_session_ended() {
    let db = seeded_db(HashCollisionPolicy::Cascade).await;
    let devices = db.get_devices().await.unwrap();
    let device_hash = devices[0].hash.clone();

    db.add_session("dup", "Collector.1.100", &device_hash, 100).await.unwrap();
    db.end_session("dup", 150).await.unwrap();

    db.add_session("dup", "Collector.1.999", &device_hash, 999).await.unwrap();
    let sessions = db.get_sessions(None).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].started_at, 999);
}
