//! CPAL-based output device enumeration
//!
//! CPAL has no stable device uid, so the device name is used, with a `#n`
//! suffix for the second and later devices sharing a name.

use cpal::traits::{DeviceTrait, HostTrait};
use crosspoint_core::{AudioError, Device, DeviceSource, DeviceUid, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Output channels CPAL reports for a device, 0 when it cannot be queried
fn output_channels(device: &cpal::Device) -> usize {
    if let Ok(config) = device.default_output_config() {
        return usize::from(config.channels());
    }

    // No default config: take the widest supported one
    match device.supported_output_configs() {
        Ok(configs) => configs
            .map(|config| usize::from(config.channels()))
            .max()
            .unwrap_or(0),
        Err(e) => {
            warn!("Could not query output configs: {}", e);
            0
        }
    }
}

/// Turn (name, channel count) pairs into devices with unique uids
pub fn assign_uids(entries: impl IntoIterator<Item = (String, usize)>) -> Vec<Device> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    entries
        .into_iter()
        .map(|(name, channels)| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            let uid = if *count == 1 {
                name.clone()
            } else {
                format!("{}#{}", name, count)
            };
            Device::new(name, uid, channels)
        })
        .collect()
}

/// Uid of the only device called `name`
///
/// CPAL identifies the default device by name alone, so a name shared by
/// several devices cannot be resolved to one of them.
pub fn uid_for_name(devices: &[Device], name: &str) -> Option<DeviceUid> {
    let mut matches = devices.iter().filter(|device| device.name == name);
    let first = matches.next()?;
    if matches.next().is_some() {
        warn!(name, "Default output device name is ambiguous");
        return None;
    }
    Some(first.uid.clone())
}

/// CPAL-based output device source
pub struct CpalDeviceSource {
    host: cpal::Host,
}

impl Default for CpalDeviceSource {
    fn default() -> Self {
        info!("Initializing CPAL device source");
        Self::new()
    }
}

impl CpalDeviceSource {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    /// Uid of the system default output device
    ///
    /// `None` when there is no default, or when its name is shared with
    /// another output device.
    pub fn default_output_uid(&self) -> Result<Option<DeviceUid>> {
        let Some(default) = self.host.default_output_device() else {
            return Ok(None);
        };
        #[allow(deprecated)]
        let name = default
            .name()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let devices = self.output_devices()?;
        Ok(uid_for_name(&devices, &name))
    }
}

impl DeviceSource for CpalDeviceSource {
    fn output_devices(&self) -> Result<Vec<Device>> {
        info!("Enumerating output devices");

        let cpal_devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let entries: Vec<(String, usize)> = cpal_devices
            .map(|device| {
                #[allow(deprecated)]
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Unknown Device".to_string());
                let channels = output_channels(&device);
                debug!("Found output device: {} ({} channels)", name, channels);
                (name, channels)
            })
            .collect();

        let devices = assign_uids(entries);
        info!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl std::fmt::Debug for CpalDeviceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalDeviceSource")
            .field("host", &self.host.id())
            .finish()
    }
}
