//! Reading config layers from disk.

use super::{
    ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, LoadedLayer,
    SchemaMode, schema,
};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Machine-wide config directory.
const SYSTEM_CONFIG_DIR: &str = "/etc/parley";
const REQUIREMENTS_FILE: &str = "requirements.json5";

/// Built-in location of a discoverable layer.
///
/// Project-relative and runtime layers have no fixed location.
pub(super) fn default_layer_path(source: ConfigLayerSource) -> Option<PathBuf> {
    match source {
        ConfigLayerSource::Requirements if cfg!(unix) => {
            Some(Path::new(SYSTEM_CONFIG_DIR).join(REQUIREMENTS_FILE))
        }
        ConfigLayerSource::System if cfg!(unix) => {
            Some(Path::new(SYSTEM_CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
        }
        ConfigLayerSource::User => UserDirs::new().map(|dirs| {
            dirs.home_dir()
                .join(DEFAULT_CONFIG_DIR)
                .join(DEFAULT_CONFIG_FILE)
        }),
        _ => None,
    }
}

/// Load a layer when `path` is set and the file exists.
pub(super) fn load_optional_layer(
    source: ConfigLayerSource,
    path: Option<&Path>,
) -> Result<Option<LoadedLayer>, ConfigError> {
    match path {
        Some(path) if path.exists() => read_layer(source, path).map(Some),
        Some(path) => {
            debug!(
                "skipping absent config layer (source={}, path={})",
                source.label(),
                path.display()
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Load a layer that must exist.
pub(super) fn load_required_layer(
    source: ConfigLayerSource,
    path: &Path,
) -> Result<LoadedLayer, ConfigError> {
    read_layer(source, path)
}

/// Parse one layer file and check it against the partial schema.
fn read_layer(source: ConfigLayerSource, path: &Path) -> Result<LoadedLayer, ConfigError> {
    let contents = fs::read_to_string(path)?;
    debug!(
        "read config layer (source={}, path={}, len={})",
        source.label(),
        path.display(),
        contents.len()
    );
    let value: Value = json5::from_str(&contents)?;
    schema::validate_layer_schema(
        &value,
        SchemaMode::Partial,
        &format!("{}({})", source.label(), path.display()),
    )?;
    let meta = ConfigLayer {
        source,
        path: Some(path.to_path_buf()),
    };
    Ok(LoadedLayer { meta, value })
}
