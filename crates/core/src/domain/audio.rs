//! Audio device abstractions and routing errors
//!
//! This module defines the platform-agnostic device model the routing engine
//! works with. Implementations that talk to the OS (CPAL) live in the `infra`
//! crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur while configuring routing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    /// Cross-point, level or slot index outside the current dimensions
    #[error("{axis} index {index} out of range (0..{len})")]
    IndexOutOfRange { axis: Axis, index: usize, len: usize },

    /// Negative or non-finite gain value
    #[error("Invalid gain: {0} (must be finite and >= 0)")]
    InvalidGain(f32),

    /// Device uid is not part of the current topology
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device cannot be placed inside the physical output channel space
    #[error(
        "Topology mismatch: device {uid} at offset {offset} needs {required} channel(s), \
         output exposes {total}"
    )]
    TopologyMismatch {
        uid: String,
        offset: usize,
        required: usize,
        total: usize,
    },

    /// Invalid policy configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error reported by the OS audio backend
    #[error("OS error: {0}")]
    OsError(String),

    /// The control thread owning the engine has shut down
    #[error("Control thread is no longer running")]
    ControlClosed,
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Dimension an index was checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Input,
    Output,
    Slot,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Input => write!(f, "input"),
            Axis::Output => write!(f, "output"),
            Axis::Slot => write!(f, "slot"),
        }
    }
}

/// Checks `index < len`, reporting the axis on failure
pub(crate) fn check_index(axis: Axis, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(AudioError::IndexOutOfRange { axis, index, len })
    }
}

/// Stable identity of an output device
///
/// Display names may repeat (two identical USB interfaces), the uid does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceUid(String);

impl DeviceUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceUid {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

impl From<String> for DeviceUid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

/// An output device as reported by the enumeration layer
///
/// Equality and hashing only look at the uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub uid: DeviceUid,
    pub channel_count: usize,
}

impl Device {
    pub fn new(name: impl Into<String>, uid: impl Into<DeviceUid>, channel_count: usize) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            channel_count,
        }
    }

    /// Whether the device exposes a single channel
    pub fn is_mono(&self) -> bool {
        self.channel_count == 1
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

/// Source of the currently available output devices
///
/// Implemented by the platform layer and called on every OS route change.
pub trait DeviceSource: Send + Sync {
    /// Output devices in the order the OS lays out its flat channel space
    fn output_devices(&self) -> Result<Vec<Device>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_device_equality_uses_uid() {
        let a = Device::new("Speakers", "uid-1", 2);
        let b = Device::new("Speakers (renamed)", "uid-1", 8);
        let c = Device::new("Speakers", "uid-2", 2);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_device_uid() {
        let uid = DeviceUid::new("usb-1");
        assert_eq!(uid.as_str(), "usb-1");
        assert_eq!(uid.to_string(), "usb-1");
    }

    #[test]
    fn test_error_display() {
        let err = AudioError::IndexOutOfRange {
            axis: Axis::Output,
            index: 4,
            len: 2,
        };
        assert_eq!(err.to_string(), "output index 4 out of range (0..2)");

        let err = AudioError::DeviceNotFound("B".to_string());
        assert_eq!(err.to_string(), "Device not found: B");
    }

    #[test]
    fn test_check_index() {
        assert!(check_index(Axis::Input, 0, 1).is_ok());
        assert!(matches!(
            check_index(Axis::Input, 1, 1),
            Err(AudioError::IndexOutOfRange { axis: Axis::Input, index: 1, len: 1 })
        ));
    }
}
