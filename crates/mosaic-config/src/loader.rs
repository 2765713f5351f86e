use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::compose::ComposeConfig;
use crate::env::interpolate_env;
use crate::error::ConfigError;
use crate::normalize::normalize_compose;

/// File names looked up when no compose file is given.
pub const DEFAULT_COMPOSE_FILES: &[&str] = &["mosaic-compose.yml", "mosaic-compose.yaml"];

/// Load and merge compose files in order; later files override earlier ones.
pub fn load_compose_files(
  paths: &[PathBuf],
  env: &HashMap<String, String>,
) -> Result<ComposeConfig, ConfigError> {
  if paths.is_empty() {
    return Err(ConfigError::NoFiles);
  }

  let mut document = Value::Object(Default::default());
  for path in paths {
    debug!(path = %path.display(), "loading_compose_file");
    merge(&mut document, read_document(path)?);
  }

  from_document(document, env)
}

/// Parse a single YAML or JSON compose document.
pub fn parse_compose_str(
  text: &str,
  env: &HashMap<String, String>,
) -> Result<ComposeConfig, ConfigError> {
  let document: Value = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
    path: PathBuf::from("<inline>"),
    source,
  })?;
  from_document(document, env)
}

/// Interpolate env, expand shorthands and deserialize.
pub fn from_document(
  mut document: Value,
  env: &HashMap<String, String>,
) -> Result<ComposeConfig, ConfigError> {
  if document.is_null() {
    document = Value::Object(Default::default());
  }
  interpolate_env(&mut document, env);
  normalize_compose(&mut document);
  Ok(serde_json::from_value(document)?)
}

/// The first default compose file present in `dir`.
pub fn find_default_compose_file(dir: &Path) -> Option<PathBuf> {
  DEFAULT_COMPOSE_FILES
    .iter()
    .map(|name| dir.join(name))
    .find(|path| path.is_file())
}

fn read_document(path: &Path) -> Result<Value, ConfigError> {
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

/// Deep-merge `overlay` into `base`: maps merge by key, anything else is
/// replaced.
pub fn merge(base: &mut Value, overlay: Value) {
  match (base, overlay) {
    (Value::Object(base), Value::Object(overlay)) => {
      for (key, value) in overlay {
        match base.get_mut(&key) {
          Some(existing) => merge(existing, value),
          None => {
            base.insert(key, value);
          }
        }
      }
    }
    (base, Value::Null) if !base.is_null() => {}
    (base, overlay) => *base = overlay,
  }
}
