//! Output device topology
//!
//! The OS exposes every active output device through one flat channel space.
//! A device's offset is the first physical channel it owns. Offsets are always
//! recomputed from the full device list; nothing is patched incrementally.

use crate::domain::audio::{AudioError, Device, DeviceUid, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Ordered output devices and their offsets in the flat channel space
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceTopology {
    devices: Vec<Device>,
    offsets: Vec<usize>,
    #[serde(skip)]
    index: HashMap<DeviceUid, usize>,
    total_channels: usize,
}

impl DeviceTopology {
    /// Empty topology (no output devices)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a topology from the device list in OS order
    ///
    /// Later devices reusing an already seen uid are dropped so uids stay unique.
    pub fn rebuild(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut topology = Self::default();
        let mut offset = 0;

        for device in devices {
            if topology.index.contains_key(&device.uid) {
                warn!(
                    uid = %device.uid,
                    name = %device.name,
                    "Dropping device with duplicate uid"
                );
                continue;
            }

            topology.index.insert(device.uid.clone(), topology.devices.len());
            topology.offsets.push(offset);
            offset += device.channel_count;
            topology.devices.push(device);
        }

        topology.total_channels = offset;
        debug!(
            devices = topology.devices.len(),
            channels = topology.total_channels,
            "Rebuilt device topology"
        );
        topology
    }

    /// First physical channel owned by `uid`
    pub fn offset(&self, uid: &DeviceUid) -> Result<usize> {
        self.index
            .get(uid)
            .map(|&position| self.offsets[position])
            .ok_or_else(|| AudioError::DeviceNotFound(uid.as_str().to_string()))
    }

    /// Look up a device by uid
    pub fn device(&self, uid: &DeviceUid) -> Result<&Device> {
        self.index
            .get(uid)
            .map(|&position| &self.devices[position])
            .ok_or_else(|| AudioError::DeviceNotFound(uid.as_str().to_string()))
    }

    pub fn contains(&self, uid: &DeviceUid) -> bool {
        self.index.contains_key(uid)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Devices paired with their offsets, in OS order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Device)> {
        self.offsets.iter().copied().zip(self.devices.iter())
    }

    /// First device that exposes at least one channel
    pub fn first_available(&self) -> Option<&Device> {
        self.devices.iter().find(|device| device.channel_count > 0)
    }

    /// Sum of all device channel counts
    pub fn total_channels(&self) -> usize {
        self.total_channels
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl PartialEq for DeviceTopology {
    fn eq(&self, other: &Self) -> bool {
        self.offsets == other.offsets
            && self.devices.len() == other.devices.len()
            && self
                .devices
                .iter()
                .zip(&other.devices)
                .all(|(a, b)| a.uid == b.uid && a.channel_count == b.channel_count)
    }
}
