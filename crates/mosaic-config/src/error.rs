use std::path::PathBuf;

/// Errors raised while loading a compose configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// No compose file was given or found.
  #[error("no compose file found")]
  NoFiles,

  /// A compose file could not be read.
  #[error("failed to read '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A compose file is not valid YAML or JSON.
  #[error("failed to parse '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  /// The merged document does not match the compose schema.
  #[error("invalid compose configuration: {0}")]
  Invalid(#[from] serde_json::Error),
}
