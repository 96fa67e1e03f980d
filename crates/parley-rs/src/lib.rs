//! Entry point for embedding the Parley gateway.
//!
//! Member crates are re-exported under short names; the `orchestrator_from_*`
//! helpers go from a directory or a config to a ready orchestrator.

pub use parley_rs_config as config;
pub use parley_rs_core as core;
pub use parley_rs_memory as memory;
pub use parley_rs_protocol as protocol;

use log::info;
use parley_rs_config::{ConfigError, GatewayConfig, LayeredConfig};
use parley_rs_core::{Collaborators, GatewayError, Orchestrator};
use std::path::Path;
use thiserror::Error;

/// Failures while bootstrapping a gateway.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Route `log` records to stderr through `env_logger`, filtered by `RUST_LOG`.
///
/// Does nothing without the `logging` feature or when a logger is already set.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}

/// Load layered configuration for `cwd` and build an orchestrator over the
/// local collaborators it describes.
///
/// Providers still have to be registered on the returned orchestrator.
pub fn orchestrator_from_dir(
    cwd: impl AsRef<Path>,
) -> Result<(Orchestrator, LayeredConfig), BootstrapError> {
    let layered = GatewayConfig::load_layered(cwd)?;
    for layer in &layered.layers {
        if let Some(path) = &layer.path {
            info!(
                "applied config layer (source={}, path={})",
                layer.source.label(),
                path.display()
            );
        }
    }
    let orchestrator = orchestrator_from_config(layered.config.clone())?;
    Ok((orchestrator, layered))
}

/// Build an orchestrator from an already loaded configuration.
pub fn orchestrator_from_config(config: GatewayConfig) -> Result<Orchestrator, BootstrapError> {
    let collaborators = Collaborators::from_config(&config)?;
    Ok(Orchestrator::new(config, collaborators)?)
}
