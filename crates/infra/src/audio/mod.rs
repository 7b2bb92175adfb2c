//! Audio backend adapters
//!
//! Device enumeration goes through CPAL, which abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod control;
pub mod cpal_backend;
pub mod render;

pub use control::*;
pub use cpal_backend::*;
pub use render::*;
