//! Crosspoint core: channel routing and gain-matrix engine
//!
//! Everything here is platform-agnostic. Device enumeration through CPAL and
//! the real-time renderer live in the `infra` crate.

pub mod domain;

pub use domain::*;
