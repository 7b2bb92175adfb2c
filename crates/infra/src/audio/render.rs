//! Real-time renderer
//!
//! Runs inside the audio callback. Each call loads the published routing
//! snapshot once and uses it for the whole block: no locks, no allocation,
//! no reconfiguration. Buffers are interleaved `f32` frames.
//!
//! A snapshot replaced mid-block stays owned by the engine, so releasing it
//! at the end of the block never frees memory on the audio thread.

use crosspoint_core::RoutingReader;

/// Applies the published routing to audio blocks
#[derive(Debug, Clone)]
pub struct Renderer {
    reader: RoutingReader,
}

impl Renderer {
    pub fn new(reader: RoutingReader) -> Self {
        Self { reader }
    }

    /// Mix `input` through the gain matrix into `output`
    ///
    /// Channel counts describe the buffers actually handed over by the
    /// stream, which may lag behind the snapshot during a format change.
    /// Cross-points outside the snapshot's matrix contribute silence.
    /// Returns the number of frames written.
    pub fn mix(
        &self,
        input: &[f32],
        input_channels: usize,
        output: &mut [f32],
        output_channels: usize,
    ) -> usize {
        output.fill(0.0);
        if input_channels == 0 || output_channels == 0 {
            return 0;
        }

        let snapshot = self.reader.snapshot();
        let frames = (input.len() / input_channels).min(output.len() / output_channels);

        for (frame_in, frame_out) in input
            .chunks_exact(input_channels)
            .zip(output.chunks_exact_mut(output_channels))
            .take(frames)
        {
            for (j, out) in frame_out.iter_mut().enumerate() {
                let mut sum = 0.0;
                for (i, &sample) in frame_in.iter().enumerate() {
                    sum += sample * snapshot.gain_at(i, j);
                }
                *out = sum;
            }
        }

        frames
    }

    /// Place logical channels (left, right, ...) on their physical channels
    ///
    /// Logical channels without a physical channel, or whose physical channel
    /// lies outside `output_channels`, are dropped. Returns frames written.
    pub fn place_logical(
        &self,
        logical: &[f32],
        logical_channels: usize,
        output: &mut [f32],
        output_channels: usize,
    ) -> usize {
        output.fill(0.0);
        if logical_channels == 0 || output_channels == 0 {
            return 0;
        }

        let snapshot = self.reader.snapshot();
        let frames = (logical.len() / logical_channels).min(output.len() / output_channels);

        for (frame_in, frame_out) in logical
            .chunks_exact(logical_channels)
            .zip(output.chunks_exact_mut(output_channels))
            .take(frames)
        {
            for (k, &sample) in frame_in.iter().enumerate() {
                if let Some(physical) = snapshot.physical_channel_for(k) {
                    if let Some(out) = frame_out.get_mut(physical) {
                        *out += sample;
                    }
                }
            }
        }

        frames
    }

    /// Output channel count of the current routing
    pub fn output_channel_count(&self) -> usize {
        self.reader.snapshot().output_channel_count()
    }
}
