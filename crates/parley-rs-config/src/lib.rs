//! Gateway settings for Parley.
//!
//! `GatewayConfig` holds the tunables the orchestrator reads at startup.
//! `LayeredConfig::load` builds one from JSON5 files found on disk, letting a
//! requirements file pin keys that later layers cannot change.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
