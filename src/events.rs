use crate::errors::CameraError;
use crate::types::{Device, SessionState};

/// Observable change published by a camera session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The device list was replaced by a fresh enumeration
    DevicesChanged(Vec<Device>),
    DeviceSelected(Device),
    TorchChanged(bool),
    Error(CameraError),
}

/// Capacity of the per-session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
