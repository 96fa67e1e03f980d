//! JSON5 layer discovery and merging.
//!
//! Each file is checked on its own first, then the merged value is checked
//! again as a complete `GatewayConfig`.

mod layer_io;
mod merge;
mod schema;
mod utils;


use crate::{ConfigError, GatewayConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File name every layer uses.
const DEFAULT_CONFIG_FILE: &str = "parley.json5";
/// Hidden directory under home and project roots.
const DEFAULT_CONFIG_DIR: &str = ".parley";
/// Entries that mark a project root.
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];

const MAX_ATTEMPTS_RANGE: (u64, u64) = (1, 10);

/// Effective config plus the layers it was built from.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: GatewayConfig,
    /// Layers that contributed, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Origin of a config layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Locked settings no other layer may override.
    Requirements,
    /// System-wide configuration.
    System,
    /// User-specific configuration.
    User,
    /// Project root configuration.
    Project,
    /// Current working directory configuration.
    Cwd,
    /// `.parley/` directory at the project root.
    Repo,
    /// Explicit override files, applied last.
    Runtime,
}

impl ConfigLayerSource {
    /// Short lowercase name used in logs and error paths.
    pub fn label(&self) -> &'static str {
        match self {
            ConfigLayerSource::Requirements => "requirements",
            ConfigLayerSource::System => "system",
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Project => "project",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Repo => "repo",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

/// A layer that was found and loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    /// Single layer; sections may be incomplete.
    Partial,
    /// Effective config.
    Full,
}

/// Where to look for each layer.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Starting point for project root discovery.
    pub cwd: PathBuf,
    /// Defaults to `/etc/parley/parley.json5` on Unix.
    pub system_config_path: Option<PathBuf>,
    /// Defaults to `~/.parley/parley.json5`.
    pub user_config_path: Option<PathBuf>,
    /// Defaults to `/etc/parley/requirements.json5` on Unix.
    pub requirements_path: Option<PathBuf>,
    /// Runtime override files applied last, in order.
    pub runtime_paths: Vec<PathBuf>,
    /// Entries whose presence marks a directory as the project root.
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    /// Built-in locations for every layer, discovering local ones from `cwd`.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: layer_io::default_layer_path(ConfigLayerSource::System),
            user_config_path: layer_io::default_layer_path(ConfigLayerSource::User),
            requirements_path: layer_io::default_layer_path(ConfigLayerSource::Requirements),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Append an override file; later calls win over earlier ones.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl GatewayConfig {
    /// Read one JSON5 file as the whole config.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config (path={})", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Parse JSON5 text as the whole config.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("parsing config contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Layered load with [`LayeredConfigOptions::new`].
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Merge every layer that exists, honoring keys pinned by requirements.
    ///
    /// Precedence (low -> high): requirements, system, user, project, cwd,
    /// repo, runtime. Keys present in the requirements layer are locked.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        let mut layers = Vec::new();
        let mut stack = Vec::new();

        let requirements = layer_io::load_optional_layer(
            ConfigLayerSource::Requirements,
            options.requirements_path.as_deref(),
        )?;
        let locked = requirements.as_ref().map(|layer| layer.value.clone());
        if let Some(layer) = requirements {
            layers.push(layer.meta);
        }

        for (source, path) in [
            (
                ConfigLayerSource::System,
                options.system_config_path.as_deref(),
            ),
            (ConfigLayerSource::User, options.user_config_path.as_deref()),
        ] {
            if let Some(layer) = layer_io::load_optional_layer(source, path)? {
                layers.push(layer.meta.clone());
                stack.push(layer);
            }
        }

        let mut seen = HashSet::new();
        for (source, path) in local_layer_paths(&cwd, &options.project_root_markers) {
            if path.exists() && seen.insert(utils::dedup_key(&path)) {
                let layer = layer_io::load_required_layer(source, &path)?;
                layers.push(layer.meta.clone());
                stack.push(layer);
            }
        }

        for path in &options.runtime_paths {
            let layer = layer_io::load_required_layer(ConfigLayerSource::Runtime, path)?;
            layers.push(layer.meta.clone());
            stack.push(layer);
        }

        let mut merged = locked.clone().unwrap_or_else(|| Value::Object(Default::default()));
        for layer in &stack {
            merge::overlay_locked(&mut merged, &layer.value, locked.as_ref());
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let attempts = u64::from(self.generation.max_attempts);
        let (min, max) = MAX_ATTEMPTS_RANGE;
        if !(min..=max).contains(&attempts) {
            return Err(ConfigError::OutOfRange {
                field: "generation.max_attempts",
                value: attempts,
                min,
                max,
            });
        }
        if self.generation.stream_buffer == 0 {
            return Err(ConfigError::OutOfRange {
                field: "generation.stream_buffer",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        for (alias, target) in &self.models.aliases {
            if alias.is_empty() || target.provider.trim().is_empty() || target.model.is_empty() {
                return Err(ConfigError::IncompleteAlias {
                    alias: alias.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

/// Project, cwd and repo layer candidates, lowest precedence first.
///
/// Outside a project only the cwd file is considered.
fn local_layer_paths(cwd: &Path, markers: &[String]) -> Vec<(ConfigLayerSource, PathBuf)> {
    let cwd_layer = (ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE));
    let Some(root) = utils::find_project_root(cwd, markers) else {
        debug!("no project root above cwd (cwd={})", cwd.display());
        return vec![cwd_layer];
    };
    debug!("resolved project root (path={})", root.display());
    vec![
        (ConfigLayerSource::Project, root.join(DEFAULT_CONFIG_FILE)),
        cwd_layer,
        (
            ConfigLayerSource::Repo,
            root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
        ),
    ]
}

fn config_from_value(value: Value, label: &str) -> Result<GatewayConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let config: GatewayConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
