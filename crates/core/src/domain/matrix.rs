//! Cross-point gain matrix
//!
//! A matrix mixer routes N logical inputs to M physical outputs. Every
//! (input, output) pair is a cross-point with its own linear gain. On top of
//! the cross-points sit three level stages (master, per input, per output)
//! that all default to unity:
//!
//! ```text
//! effective(i, j) = master * input_level[i] * gain[i][j] * output_level[j]
//! ```

use crate::domain::audio::{check_index, AudioError, Axis, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Unity gain (0 dB)
pub const UNITY: f32 = 1.0;

/// Gains must be finite and non-negative. Values above unity amplify.
pub fn validate_gain(value: f32) -> Result<f32> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(AudioError::InvalidGain(value))
    }
}

/// A single (input, output) pair of the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossPoint {
    pub input: u16,
    pub output: u16,
}

impl CrossPoint {
    /// Build a cross-point from channel indices, which must fit in 16 bits
    pub fn new(input: usize, output: usize) -> Result<Self> {
        let input = u16::try_from(input).map_err(|_| AudioError::IndexOutOfRange {
            axis: Axis::Input,
            index: input,
            len: usize::from(u16::MAX) + 1,
        })?;
        let output = u16::try_from(output).map_err(|_| AudioError::IndexOutOfRange {
            axis: Axis::Output,
            index: output,
            len: usize::from(u16::MAX) + 1,
        })?;
        Ok(Self { input, output })
    }

    /// Packed element address: input in the high half-word, output in the low one
    pub fn element(self) -> u32 {
        (u32::from(self.input) << 16) | u32::from(self.output)
    }

    pub fn from_element(element: u32) -> Self {
        Self {
            input: (element >> 16) as u16,
            output: (element & 0xFFFF) as u16,
        }
    }
}

/// N x M table of cross-point gains, row-major by input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGainMatrix")]
pub struct GainMatrix {
    inputs: usize,
    outputs: usize,
    gains: Vec<f32>,
    master: f32,
    input_levels: Vec<f32>,
    output_levels: Vec<f32>,
}

/// Unchecked wire form of [`GainMatrix`]
#[derive(Deserialize)]
struct RawGainMatrix {
    inputs: usize,
    outputs: usize,
    gains: Vec<f32>,
    master: f32,
    input_levels: Vec<f32>,
    output_levels: Vec<f32>,
}

impl TryFrom<RawGainMatrix> for GainMatrix {
    type Error = AudioError;

    fn try_from(raw: RawGainMatrix) -> Result<Self> {
        let shape = |what: &str, len: usize, expected: usize| {
            if len == expected {
                Ok(())
            } else {
                Err(AudioError::InvalidConfiguration(format!(
                    "{} has {} entries, expected {}",
                    what, len, expected
                )))
            }
        };
        let cells = raw.inputs.checked_mul(raw.outputs).ok_or_else(|| {
            AudioError::InvalidConfiguration(format!(
                "{} x {} matrix is too large",
                raw.inputs, raw.outputs
            ))
        })?;
        shape("gains", raw.gains.len(), cells)?;
        shape("input_levels", raw.input_levels.len(), raw.inputs)?;
        shape("output_levels", raw.output_levels.len(), raw.outputs)?;

        validate_gain(raw.master)?;
        for &value in raw
            .gains
            .iter()
            .chain(&raw.input_levels)
            .chain(&raw.output_levels)
        {
            validate_gain(value)?;
        }

        Ok(Self {
            inputs: raw.inputs,
            outputs: raw.outputs,
            gains: raw.gains,
            master: raw.master,
            input_levels: raw.input_levels,
            output_levels: raw.output_levels,
        })
    }
}

impl GainMatrix {
    /// Zeroed matrix with unity level stages
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            gains: vec![0.0; inputs * outputs],
            master: UNITY,
            input_levels: vec![UNITY; inputs],
            output_levels: vec![UNITY; outputs],
        }
    }

    /// Every input at `value` on each of `targets`, everything else muted
    ///
    /// Targets outside the output range are skipped. `value` must already
    /// have passed [`validate_gain`].
    pub(crate) fn broadcast(inputs: usize, outputs: usize, targets: &[usize], value: f32) -> Self {
        let mut matrix = Self::new(inputs, outputs);
        for input in 0..inputs {
            let start = matrix.flat(input, 0);
            for &output in targets.iter().filter(|&&output| output < outputs) {
                matrix.gains[start + output] = value;
            }
        }
        matrix
    }

    pub fn input_count(&self) -> usize {
        self.inputs
    }

    pub fn output_count(&self) -> usize {
        self.outputs
    }

    #[inline]
    fn flat(&self, input: usize, output: usize) -> usize {
        input * self.outputs + output
    }

    fn check(&self, input: usize, output: usize) -> Result<()> {
        check_index(Axis::Input, input, self.inputs)?;
        check_index(Axis::Output, output, self.outputs)
    }

    /// Overwrite the gain of one cross-point
    pub fn set_gain(&mut self, input: usize, output: usize, value: f32) -> Result<()> {
        self.check(input, output)?;
        let value = validate_gain(value)?;
        let index = self.flat(input, output);
        self.gains[index] = value;
        trace!(input, output, value, "Cross-point gain set");
        Ok(())
    }

    /// Stored gain of one cross-point
    pub fn gain(&self, input: usize, output: usize) -> Result<f32> {
        self.check(input, output)?;
        Ok(self.gains[self.flat(input, output)])
    }

    pub fn set_gain_at(&mut self, point: CrossPoint, value: f32) -> Result<()> {
        self.set_gain(usize::from(point.input), usize::from(point.output), value)
    }

    /// Route `input` to exactly `targets` at `value`, muting every other output
    ///
    /// All targets are validated before anything is written.
    pub fn route(&mut self, input: usize, targets: &[usize], value: f32) -> Result<()> {
        check_index(Axis::Input, input, self.inputs)?;
        for &output in targets {
            check_index(Axis::Output, output, self.outputs)?;
        }
        let value = validate_gain(value)?;

        let start = self.flat(input, 0);
        let row = &mut self.gains[start..start + self.outputs];
        row.fill(0.0);
        for &output in targets {
            row[output] = value;
        }
        trace!(input, ?targets, value, "Input routed");
        Ok(())
    }

    /// Reallocate for new dimensions, discarding every previous value
    ///
    /// Cross-points come back at 0.0 and levels at unity. Defaults are the
    /// caller's business (see `RoutingPolicy`).
    pub fn resize(&mut self, inputs: usize, outputs: usize) {
        debug!(
            from_inputs = self.inputs,
            from_outputs = self.outputs,
            inputs,
            outputs,
            "Resizing gain matrix"
        );
        *self = Self::new(inputs, outputs);
    }

    pub fn master_level(&self) -> f32 {
        self.master
    }

    pub fn set_master_level(&mut self, value: f32) -> Result<()> {
        self.master = validate_gain(value)?;
        Ok(())
    }

    pub fn input_level(&self, input: usize) -> Result<f32> {
        check_index(Axis::Input, input, self.inputs)?;
        Ok(self.input_levels[input])
    }

    pub fn set_input_level(&mut self, input: usize, value: f32) -> Result<()> {
        check_index(Axis::Input, input, self.inputs)?;
        self.input_levels[input] = validate_gain(value)?;
        Ok(())
    }

    pub fn output_level(&self, output: usize) -> Result<f32> {
        check_index(Axis::Output, output, self.outputs)?;
        Ok(self.output_levels[output])
    }

    pub fn set_output_level(&mut self, output: usize, value: f32) -> Result<()> {
        check_index(Axis::Output, output, self.outputs)?;
        self.output_levels[output] = validate_gain(value)?;
        Ok(())
    }

    /// Cross-point gain with all level stages applied
    pub fn effective_gain(&self, input: usize, output: usize) -> Result<f32> {
        let gain = self.gain(input, output)?;
        Ok(self.master * self.input_levels[input] * gain * self.output_levels[output])
    }

    /// Effective gain for the render path: silent instead of failing
    ///
    /// Indices are validated when the configuration is built, so an
    /// out-of-range read here is a caller bug and must not reach the speakers.
    #[inline]
    pub fn effective_or_silent(&self, input: usize, output: usize) -> f32 {
        if input < self.inputs && output < self.outputs {
            self.master
                * self.input_levels[input]
                * self.gains[self.flat(input, output)]
                * self.output_levels[output]
        } else {
            0.0
        }
    }

    /// Outputs of `input` with a non-zero cross-point
    pub fn routed_outputs(&self, input: usize) -> Vec<usize> {
        if input >= self.inputs {
            return Vec::new();
        }
        let start = self.flat(input, 0);
        self.gains[start..start + self.outputs]
            .iter()
            .enumerate()
            .filter(|&(_, &gain)| gain > 0.0)
            .map(|(output, _)| output)
            .collect()
    }

    /// True when every cross-point is muted
    pub fn is_silent(&self) -> bool {
        self.gains.iter().all(|&gain| gain == 0.0)
    }
}

impl Default for GainMatrix {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
