//! Device/session data model and the device state machine shared by every
//! collector component.

mod device;
mod hash;
mod session;

pub use device::{Device, DeviceEvent, DeviceState, TransitionError};
pub use hash::{hash_for_device, hash_string};
pub use session::{HashCollisionPolicy, Session};
