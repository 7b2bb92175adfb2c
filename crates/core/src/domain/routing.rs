//! Default routing policy
//!
//! Every input goes to the physical channels of the currently selected output
//! pair (whatever the channel map says is mapped) and nowhere else. Without a
//! selection the matrix is all zeros: nothing is ever sent to a physical
//! channel nobody asked for.

use crate::domain::audio::Result;
use crate::domain::channel_map::ChannelMap;
use crate::domain::matrix::{validate_gain, GainMatrix, UNITY};
use tracing::debug;

/// Computes default gain tables from the channel map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingPolicy {
    default_gain: f32,
}

impl RoutingPolicy {
    /// Policy routing at `default_gain` instead of unity
    pub fn with_gain(default_gain: f32) -> Result<Self> {
        Ok(Self {
            default_gain: validate_gain(default_gain)?,
        })
    }

    pub fn default_gain(&self) -> f32 {
        self.default_gain
    }

    /// Fresh `inputs` x `outputs` matrix routed to the mapped output pair
    ///
    /// Mapped slots beyond `outputs` are ignored, so a mono or empty output
    /// never receives an out-of-range write.
    pub fn default_routing(&self, inputs: usize, outputs: usize, map: &ChannelMap) -> GainMatrix {
        let targets = map.mapped_slots();
        debug!(
            inputs,
            outputs,
            ?targets,
            gain = self.default_gain,
            "Applying default routing"
        );
        GainMatrix::broadcast(inputs, outputs, &targets, self.default_gain)
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            default_gain: UNITY,
        }
    }
}
