//! Physical channel map resolution
//!
//! The channel map translates the flat physical output space into logical
//! channels: entry `k` holds the logical channel that physical channel `k`
//! plays, or nothing. Logical channels 0 and 1 are the stereo pair (left,
//! right) and always land on the first two channels of the selected device.

use crate::domain::audio::{AudioError, DeviceUid, Result};
use crate::domain::topology::DeviceTopology;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Raw sentinel for an unmapped physical channel
pub const UNMAPPED: i32 = -1;

/// Number of logical channels placed on the selected device (left, right)
pub const STEREO: usize = 2;

/// What to do when the selected device exposes a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonoPolicy {
    /// Place logical channel 0 on the only channel and leave logical 1
    /// unmapped. The default routing then sums every input into it.
    #[default]
    FoldDown,
    /// Refuse mono devices with a topology mismatch
    Reject,
}

/// Physical slot -> logical channel table, with its inverse
///
/// Serialized in the raw [`UNMAPPED`]-sentinel form of [`ChannelMap::to_raw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<i32>", try_from = "Vec<i32>")]
pub struct ChannelMap {
    slots: Vec<Option<usize>>,
    physical: [Option<usize>; STEREO],
}

impl ChannelMap {
    /// Map of `len` physical channels with nothing mapped
    pub fn unmapped(len: usize) -> Self {
        Self {
            slots: vec![None; len],
            physical: [None; STEREO],
        }
    }

    /// Number of physical output channels covered
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Logical channel played by physical channel `slot`
    pub fn logical_at(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).copied().flatten()
    }

    /// Physical channel carrying logical channel `logical`
    #[inline]
    pub fn physical_channel_for(&self, logical: usize) -> Option<usize> {
        self.physical.get(logical).copied().flatten()
    }

    /// Physical channels with a logical channel assigned, ascending
    pub fn mapped_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, logical)| logical.map(|_| slot))
            .collect()
    }

    /// True when no physical channel plays anything
    pub fn is_silent(&self) -> bool {
        self.physical.iter().all(Option::is_none)
    }

    /// The map as the OS expects it, with [`UNMAPPED`] for empty entries
    pub fn to_raw(&self) -> Vec<i32> {
        self.slots
            .iter()
            .map(|logical| logical.map_or(UNMAPPED, |l| l as i32))
            .collect()
    }

    fn assign(&mut self, slot: usize, logical: usize) {
        self.slots[slot] = Some(logical);
        self.physical[logical] = Some(slot);
    }
}

impl From<ChannelMap> for Vec<i32> {
    fn from(map: ChannelMap) -> Self {
        map.to_raw()
    }
}

impl TryFrom<Vec<i32>> for ChannelMap {
    type Error = AudioError;

    /// Each logical channel may appear once; anything else must be [`UNMAPPED`]
    fn try_from(raw: Vec<i32>) -> Result<Self> {
        let mut map = ChannelMap::unmapped(raw.len());
        for (slot, &entry) in raw.iter().enumerate() {
            if entry == UNMAPPED {
                continue;
            }
            let logical = usize::try_from(entry)
                .ok()
                .filter(|&logical| logical < STEREO)
                .ok_or_else(|| {
                    AudioError::InvalidConfiguration(format!(
                        "channel map entry {} at slot {} is not a logical channel",
                        entry, slot
                    ))
                })?;
            if let Some(previous) = map.physical[logical] {
                return Err(AudioError::InvalidConfiguration(format!(
                    "logical channel {} mapped to both {} and {}",
                    logical, previous, slot
                )));
            }
            map.assign(slot, logical);
        }
        Ok(map)
    }
}

/// Computes the channel map for a device selection
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelMapResolver {
    mono_policy: MonoPolicy,
}

impl ChannelMapResolver {
    pub fn new(mono_policy: MonoPolicy) -> Self {
        Self { mono_policy }
    }

    pub fn mono_policy(&self) -> MonoPolicy {
        self.mono_policy
    }

    /// Build a complete map for `selected` inside `total_outputs` channels
    ///
    /// No selection yields an all-unmapped map. The map is always built from
    /// scratch so nothing from a previous selection survives.
    pub fn resolve(
        &self,
        topology: &DeviceTopology,
        selected: Option<&DeviceUid>,
        total_outputs: usize,
    ) -> Result<ChannelMap> {
        let mut map = ChannelMap::unmapped(total_outputs);
        let Some(uid) = selected else {
            return Ok(map);
        };

        let offset = topology.offset(uid)?;
        let device = topology.device(uid)?;

        let mismatch = |required: usize| AudioError::TopologyMismatch {
            uid: uid.as_str().to_string(),
            offset,
            required,
            total: total_outputs,
        };

        let placed = match device.channel_count {
            0 => return Err(mismatch(1)),
            1 => match self.mono_policy {
                MonoPolicy::FoldDown => 1,
                MonoPolicy::Reject => return Err(mismatch(STEREO)),
            },
            _ => STEREO,
        };

        if offset + placed > total_outputs {
            return Err(mismatch(placed));
        }

        for logical in 0..placed {
            map.assign(offset + logical, logical);
        }

        debug!(
            device = %uid,
            offset,
            placed,
            total_outputs,
            "Resolved channel map"
        );
        Ok(map)
    }
}
