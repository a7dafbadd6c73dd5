use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of one monitored device, matching the original
/// `DeviceState` enum exactly (`source/MonitorDevice.cpp`'s `updateState`
/// call sites).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Unknown,
    Loaded,
    Connected,
    SessionSet,
    Collecting,
    Idle,
    Disconnected,
    Reconnecting,
}

/// An event driving the device state machine. Named after the handler that
/// produces it in the original (`doConnect`, `doSendDescriptor`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device row has been loaded/registered; it is now eligible to
    /// connect.
    Load,
    /// A connection attempt is starting.
    Connect,
    /// The connection attempt failed (`doConnect`'s failure branch).
    ConnectFailed,
    /// The descriptor handshake completed (`doSendDescriptor`'s success
    /// branch).
    DescriptorSent,
    /// `StartCollecting` was requested while already connected — a no-op
    /// guard transition that confirms a session can be requested.
    RequestSession,
    /// The agent assigned a session (`doSetSession`).
    SetSession,
    /// Streaming was turned on (`doStartStream`).
    StartStream,
    /// Streaming was turned off (`doStopStream`).
    StopStream,
    /// The connection was closed, intentionally or not
    /// (`Connection::disconnect`).
    Disconnect,
    /// An automatic reconnect attempt is starting after an unexpected
    /// disconnect.
    Reconnect,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no transition from state {state:?} on event {event:?}")]
pub struct TransitionError {
    pub state: DeviceState,
    pub event: DeviceEvent,
}

impl DeviceState {
    /// Apply one event to the current state, returning the resulting state
    /// or an error if the event is not valid from this state.
    ///
    /// Side effects that accompany a transition in the original (pushing a
    /// `CreateSession` request on `RequestSession`, pushing `EndSession` to
    /// the database when a session-holding device becomes `Disconnected`)
    /// are the caller's responsibility — this function only computes the
    /// resulting state.
    pub fn apply(self, event: DeviceEvent) -> Result<DeviceState, TransitionError> {
        use DeviceEvent as E;
        use DeviceState as S;

        let next = match (self, event) {
            (S::Unknown, E::Load) => S::Loaded,

            (S::Loaded, E::Connect) => S::Loaded,
            (S::Disconnected, E::Connect) => S::Disconnected,
            (S::Reconnecting, E::Connect) => S::Reconnecting,

            // A failed connection attempt always lands on Disconnected,
            // regardless of which state the attempt started from.
            (_, E::ConnectFailed) => S::Disconnected,

            (S::Loaded, E::DescriptorSent) => S::Connected,
            (S::Reconnecting, E::DescriptorSent) => S::Connected,

            (S::Connected, E::RequestSession) => S::Connected,
            (S::Idle, E::RequestSession) => S::Idle,

            (S::Connected, E::SetSession) => S::SessionSet,

            (S::SessionSet, E::StartStream) => S::Collecting,
            (S::Idle, E::StartStream) => S::Collecting,

            (S::Collecting, E::StopStream) => S::Idle,

            (s, E::Disconnect) if s != S::Disconnected => S::Disconnected,

            (S::Disconnected, E::Reconnect) => S::Reconnecting,

            _ => return Err(TransitionError { state: self, event }),
        };
        Ok(next)
    }
}

/// A monitored device, keyed by its stable [`crate::hash_for_device`] hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub state: DeviceState,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: &[DeviceState] = &[
        DeviceState::Unknown,
        DeviceState::Loaded,
        DeviceState::Connected,
        DeviceState::SessionSet,
        DeviceState::Collecting,
        DeviceState::Idle,
        DeviceState::Disconnected,
        DeviceState::Reconnecting,
    ];

    const ALL_EVENTS: &[DeviceEvent] = &[
        DeviceEvent::Load,
        DeviceEvent::Connect,
        DeviceEvent::ConnectFailed,
        DeviceEvent::DescriptorSent,
        DeviceEvent::RequestSession,
        DeviceEvent::SetSession,
        DeviceEvent::StartStream,
        DeviceEvent::StopStream,
        DeviceEvent::Disconnect,
        DeviceEvent::Reconnect,
    ];

    /// Table-driven: every (state, event) pair either yields a deterministic
    /// next state or a `TransitionError` — never a panic.
    #[test]
    fn every_state_event_pair_is_handled_without_panicking() {
        for &state in ALL_STATES {
            for &event in ALL_EVENTS {
                let _ = state.apply(event);
            }
        }
    }

    #[test]
    fn full_happy_path_reaches_collecting() {
        let s = DeviceState::Unknown;
        let s = s.apply(DeviceEvent::Load).unwrap();
        assert_eq!(s, DeviceState::Loaded);
        let s = s.apply(DeviceEvent::DescriptorSent).unwrap();
        assert_eq!(s, DeviceState::Connected);
        let s = s.apply(DeviceEvent::SetSession).unwrap();
        assert_eq!(s, DeviceState::SessionSet);
        let s = s.apply(DeviceEvent::StartStream).unwrap();
        assert_eq!(s, DeviceState::Collecting);
        let s = s.apply(DeviceEvent::StopStream).unwrap();
        assert_eq!(s, DeviceState::Idle);
        let s = s.apply(DeviceEvent::Disconnect).unwrap();
        assert_eq!(s, DeviceState::Disconnected);
        let s = s.apply(DeviceEvent::Reconnect).unwrap();
        assert_eq!(s, DeviceState::Reconnecting);
    }

    #[test]
    fn disconnect_is_idempotent_refusal_when_already_disconnected() {
        let err = DeviceState::Disconnected.apply(DeviceEvent::Disconnect).unwrap_err();
        assert_eq!(err.state, DeviceState::Disconnected);
    }

    #[test]
    fn connect_failed_always_lands_on_disconnected() {
        for &state in ALL_STATES {
            assert_eq!(state.apply(DeviceEvent::ConnectFailed).unwrap(), DeviceState::Disconnected);
        }
    }

    #[test]
    fn session_set_requires_connected_state() {
        assert!(DeviceState::Loaded.apply(DeviceEvent::SetSession).is_err());
        assert!(DeviceState::Idle.apply(DeviceEvent::SetSession).is_err());
    }
}
