//! Domain entities and routing rules

pub mod audio;
pub mod channel_map;
pub mod config;
pub mod engine;
pub mod matrix;
pub mod routing;
pub mod topology;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioError, Axis, Device, DeviceSource, DeviceUid, Result};
pub use channel_map::{ChannelMap, ChannelMapResolver, MonoPolicy, UNMAPPED};
pub use config::{ConfigError, ConfigManager, CrosspointConfig, RoutingConfig, SelectionFallback};
pub use engine::{RoutingEngine, RoutingReader, RoutingSnapshot};
pub use matrix::{CrossPoint, GainMatrix};
pub use routing::RoutingPolicy;
pub use topology::DeviceTopology;
