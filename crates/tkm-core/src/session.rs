use serde::{Deserialize, Serialize};

/// A collection session against one device.
///
/// The name follows the original's `"Collector.<pid>.<unix time>"`
/// convention, assigned when the agent's `SetSession` message first arrives
/// (`source/Connection.cpp`'s inbound handler), not when the database row
/// is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub device_hash: String,
    pub started_at: u64,
    pub ended_at: Option<u64>,
}

impl Session {
    pub fn name_for(pid: u32, started_at: u64) -> String {
        format!("Collector.{pid}.{started_at}")
    }
}

/// How the database worker resolves a session hash collision (a new
/// session whose hash matches one already open).
///
/// The original cascades: the colliding prior session and all of its data
/// rows are deleted to make room for the new one. `Reject` is the safer
/// default for this port; `Cascade` reproduces the original exactly for
/// operators who rely on it. See `DESIGN.md` Open Question 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashCollisionPolicy {
    #[default]
    Reject,
    Cascade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_matches_collector_dot_pid_dot_time_convention() {
        assert_eq!(Session::name_for(1234, 1_700_000_000), "Collector.1234.1700000000");
    }

    #[test]
    fn default_collision_policy_is_reject() {
        assert_eq!(HashCollisionPolicy::default(), HashCollisionPolicy::Reject);
    }
}
