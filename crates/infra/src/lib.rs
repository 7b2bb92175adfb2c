//! Platform adapters for the Crosspoint routing core
//!
//! - CPAL output-device enumeration feeding the device topology
//! - A control thread that applies routing changes in order
//! - The real-time renderer reading published routing snapshots

pub mod audio;
