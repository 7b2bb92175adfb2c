//! Routing engine: the composition root
//!
//! The engine lives on the control side. Every reconfiguration builds a
//! complete [`RoutingSnapshot`] (gain matrix, channel map, selection) and
//! publishes it with a single pointer swap. The render thread holds a
//! [`RoutingReader`], loads the snapshot once at the start of each block and
//! keeps using it until the block is done. Readers never lock and never see a
//! matrix from one configuration next to a channel map from another.
//!
//! Control methods take `&mut self`, so updates are applied one at a time in
//! the order the caller issues them.
//!
//! Device-list and format changes arrive independently. A selected device
//! that does not fit the current output count stays selected and silent
//! until a later change makes room for it.
//!
//! Replaced snapshots still held by a reader are parked on the engine, so
//! the last reference, and the free, always happens on the control side.

use crate::domain::audio::{AudioError, Device, DeviceUid, Result};
use crate::domain::channel_map::{ChannelMap, ChannelMapResolver};
use crate::domain::config::{RoutingConfig, SelectionFallback};
use crate::domain::matrix::GainMatrix;
use crate::domain::routing::RoutingPolicy;
use crate::domain::topology::DeviceTopology;
use arc_swap::{ArcSwap, Guard};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One immutable, internally consistent routing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSnapshot {
    generation: u64,
    matrix: GainMatrix,
    channel_map: ChannelMap,
    selected: Option<DeviceUid>,
}

impl RoutingSnapshot {
    fn silent() -> Self {
        Self {
            generation: 0,
            matrix: GainMatrix::default(),
            channel_map: ChannelMap::unmapped(0),
            selected: None,
        }
    }

    /// Increases by one with every publish
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn matrix(&self) -> &GainMatrix {
        &self.matrix
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.channel_map
    }

    pub fn selected(&self) -> Option<&DeviceUid> {
        self.selected.as_ref()
    }

    /// Effective gain of cross-point (input, output); 0.0 outside the matrix
    #[inline]
    pub fn gain_at(&self, input: usize, output: usize) -> f32 {
        self.matrix.effective_or_silent(input, output)
    }

    /// Physical channel carrying logical output slot `logical`, if mapped
    #[inline]
    pub fn physical_channel_for(&self, logical: usize) -> Option<usize> {
        self.channel_map.physical_channel_for(logical)
    }

    pub fn input_channel_count(&self) -> usize {
        self.matrix.input_count()
    }

    pub fn output_channel_count(&self) -> usize {
        self.matrix.output_count()
    }
}

/// Render-side handle on the published routing
///
/// Cheap to clone and safe to move to the audio thread.
#[derive(Clone)]
pub struct RoutingReader {
    current: Arc<ArcSwap<RoutingSnapshot>>,
}

impl RoutingReader {
    /// Current snapshot, without locking or allocating
    ///
    /// Load once per processing block and keep the guard for the whole block.
    #[inline]
    pub fn snapshot(&self) -> Guard<Arc<RoutingSnapshot>> {
        self.current.load()
    }

    /// Owned handle on the current snapshot, for non real-time callers
    pub fn load_full(&self) -> Arc<RoutingSnapshot> {
        self.current.load_full()
    }
}

impl std::fmt::Debug for RoutingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingReader")
            .field("generation", &self.current.load().generation)
            .finish()
    }
}

/// Owns the routing state and reacts to device and format changes
pub struct RoutingEngine {
    policy: RoutingPolicy,
    resolver: ChannelMapResolver,
    fallback: SelectionFallback,
    preferred: Option<DeviceUid>,
    topology: DeviceTopology,
    selected: Option<DeviceUid>,
    inputs: usize,
    outputs: usize,
    generation: u64,
    current: Arc<ArcSwap<RoutingSnapshot>>,
    retired: Vec<Arc<RoutingSnapshot>>,
}

impl RoutingEngine {
    /// Engine with no devices, no channels and nothing selected
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        Ok(Self {
            policy: config.policy()?,
            resolver: config.resolver(),
            fallback: config.selection_fallback,
            preferred: config.preferred_device.as_deref().map(DeviceUid::new),
            topology: DeviceTopology::new(),
            selected: None,
            inputs: 0,
            outputs: 0,
            generation: 0,
            current: Arc::new(ArcSwap::from_pointee(RoutingSnapshot::silent())),
            retired: Vec::new(),
        })
    }

    /// Handle for the real-time render path
    pub fn reader(&self) -> RoutingReader {
        RoutingReader {
            current: Arc::clone(&self.current),
        }
    }

    /// Currently published snapshot
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.current.load_full()
    }

    pub fn topology(&self) -> &DeviceTopology {
        &self.topology
    }

    /// Device the user selected, routed or waiting for room
    ///
    /// The published snapshot's `selected()` names the device actually
    /// receiving audio.
    pub fn selected(&self) -> Option<&DeviceUid> {
        self.selected.as_ref()
    }

    pub fn input_channel_count(&self) -> usize {
        self.inputs
    }

    pub fn output_channel_count(&self) -> usize {
        self.outputs
    }

    pub fn gain_at(&self, input: usize, output: usize) -> f32 {
        self.current.load().gain_at(input, output)
    }

    pub fn physical_channel_for(&self, logical: usize) -> Option<usize> {
        self.current.load().physical_channel_for(logical)
    }

    /// The audio graph's channel counts changed
    ///
    /// The matrix is reallocated and default routing reapplied, and the
    /// channel map is resolved again for the new output count. A selection
    /// that no longer fits is kept and goes silent.
    pub fn set_channel_counts(&mut self, inputs: usize, outputs: usize) -> Result<()> {
        info!(
            inputs,
            outputs,
            previous_inputs = self.inputs,
            previous_outputs = self.outputs,
            "Channel counts changed"
        );
        self.inputs = inputs;
        self.outputs = outputs;
        self.reconfigure_or_wait()
    }

    /// The OS reported a new output device list
    ///
    /// Offsets are recomputed from scratch. A selection whose device vanished
    /// is handled by the configured [`SelectionFallback`]; a selection that
    /// is still present but no longer fits is kept and goes silent.
    pub fn update_devices(&mut self, devices: Vec<Device>) -> Result<()> {
        let first_list = self.topology.is_empty();
        self.topology = DeviceTopology::rebuild(devices);
        info!(
            devices = self.topology.len(),
            channels = self.topology.total_channels(),
            "Output devices changed"
        );

        let lost = match self.selected.take() {
            Some(uid) if self.topology.contains(&uid) => {
                self.selected = Some(uid);
                false
            }
            Some(uid) => {
                warn!(device = %uid, fallback = ?self.fallback, "Selected device disappeared");
                true
            }
            None => false,
        };

        if self.selected.is_none() {
            self.selected = self.replacement_selection(lost || first_list);
            if let Some(uid) = &self.selected {
                info!(device = %uid, "Selecting replacement device");
            }
        }

        self.reconfigure_or_wait()
    }

    /// `vacant` is set when a selection was lost or no devices existed before
    fn replacement_selection(&self, vacant: bool) -> Option<DeviceUid> {
        if let Some(preferred) = self.preferred.as_ref().filter(|uid| self.topology.contains(uid)) {
            return Some(preferred.clone());
        }
        match self.fallback {
            SelectionFallback::FirstAvailable if vacant => {
                self.topology.first_available().map(|device| device.uid.clone())
            }
            _ => None,
        }
    }

    /// Select the output device that receives the stereo pair
    ///
    /// A uid missing from the topology fails with `DeviceNotFound` and
    /// changes nothing. A device that exists but cannot be placed in the
    /// output space leaves the engine with no selection (silence).
    pub fn select(&mut self, uid: &DeviceUid) -> Result<()> {
        if !self.topology.contains(uid) {
            warn!(device = %uid, "Rejected selection of unknown device");
            return Err(AudioError::DeviceNotFound(uid.as_str().to_string()));
        }

        info!(device = %uid, "Device selected");
        self.selected = Some(uid.clone());
        self.reconfigure().map_err(|e| {
            warn!(error = %e, "Selection failed, falling back to silence");
            self.selected = None;
            e
        })
    }

    /// Drop the selection; all outputs go silent
    pub fn deselect(&mut self) {
        info!("Device deselected");
        self.selected = None;
        let map = ChannelMap::unmapped(self.outputs);
        let matrix = self.policy.default_routing(self.inputs, self.outputs, &map);
        self.publish(matrix, map, None);
    }

    /// Override one cross-point of the published matrix
    ///
    /// The override lasts until the next reconfiguration reapplies the policy.
    pub fn set_gain(&mut self, input: usize, output: usize, value: f32) -> Result<()> {
        self.edit_matrix(|matrix| matrix.set_gain(input, output, value))
    }

    pub fn set_master_level(&mut self, value: f32) -> Result<()> {
        self.edit_matrix(|matrix| matrix.set_master_level(value))
    }

    pub fn set_input_level(&mut self, input: usize, value: f32) -> Result<()> {
        self.edit_matrix(|matrix| matrix.set_input_level(input, value))
    }

    pub fn set_output_level(&mut self, output: usize, value: f32) -> Result<()> {
        self.edit_matrix(|matrix| matrix.set_output_level(output, value))
    }

    fn edit_matrix(&mut self, edit: impl FnOnce(&mut GainMatrix) -> Result<()>) -> Result<()> {
        let current = self.current.load_full();
        let mut matrix = current.matrix.clone();
        edit(&mut matrix)?;
        self.publish(matrix, current.channel_map.clone(), current.selected.clone());
        Ok(())
    }

    /// Resolve the map for the current selection and reapply the policy
    ///
    /// On failure a silent configuration is published before the error is
    /// returned. The selection itself is left to the caller.
    fn reconfigure(&mut self) -> Result<()> {
        match self
            .resolver
            .resolve(&self.topology, self.selected.as_ref(), self.outputs)
        {
            Ok(map) => {
                let matrix = self.policy.default_routing(self.inputs, self.outputs, &map);
                let routed = self.selected.clone();
                self.publish(matrix, map, routed);
                Ok(())
            }
            Err(e) => {
                let map = ChannelMap::unmapped(self.outputs);
                let matrix = self.policy.default_routing(self.inputs, self.outputs, &map);
                self.publish(matrix, map, None);
                Err(e)
            }
        }
    }

    /// Reconfigure after a device or format change
    ///
    /// A mismatch only means the other half of the change has not arrived
    /// yet, so the selection is kept and re-resolved on the next change.
    fn reconfigure_or_wait(&mut self) -> Result<()> {
        match self.reconfigure() {
            Err(AudioError::TopologyMismatch {
                uid,
                offset,
                required,
                total,
            }) => {
                warn!(
                    device = %uid,
                    offset,
                    required,
                    total,
                    "Selected device does not fit the output channels, silent until it does"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn publish(&mut self, matrix: GainMatrix, channel_map: ChannelMap, routed: Option<DeviceUid>) {
        self.generation += 1;
        let snapshot = RoutingSnapshot {
            generation: self.generation,
            matrix,
            channel_map,
            selected: routed,
        };
        debug!(
            generation = snapshot.generation,
            selected = ?snapshot.selected,
            "Publishing routing snapshot"
        );
        let previous = self.current.swap(Arc::new(snapshot));

        // Keep snapshots a reader still holds, drop the rest here
        self.retired.retain(|snapshot| Arc::strong_count(snapshot) > 1);
        if Arc::strong_count(&previous) > 1 {
            self.retired.push(previous);
        }
    }
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self {
            policy: RoutingPolicy::default(),
            resolver: ChannelMapResolver::default(),
            fallback: SelectionFallback::default(),
            preferred: None,
            topology: DeviceTopology::new(),
            selected: None,
            inputs: 0,
            outputs: 0,
            generation: 0,
            current: Arc::new(ArcSwap::from_pointee(RoutingSnapshot::silent())),
            retired: Vec::new(),
        }
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("topology", &self.topology)
            .field("selected", &self.selected)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("generation", &self.generation)
            .field("retired", &self.retired.len())
            .finish()
    }
}
