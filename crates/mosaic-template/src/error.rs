//! Template rendering errors.

/// Errors raised while rendering a template.
///
/// Unknown sources and path misses are not errors; they resolve to null.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
  /// A value could not be converted to the requested type.
  #[error("cannot convert {value} to {target}")]
  Coercion { target: String, value: String },

  /// A `json` conversion got text that is not valid JSON.
  #[error("invalid json value: {0}")]
  Json(#[from] serde_json::Error),

  /// A `;base64` file payload could not be decoded.
  #[error("invalid base64 payload: {0}")]
  Base64(#[from] base64::DecodeError),

  /// A `;url` file payload could not be downloaded.
  #[error("failed to download file: {0}")]
  Download(#[from] reqwest::Error),

  /// Reading or writing a materialized file failed.
  #[error("file io error: {0}")]
  Io(#[from] std::io::Error),
}

impl RenderError {
  pub(crate) fn coercion(target: &str, value: &serde_json::Value) -> Self {
    Self::Coercion {
      target: target.to_string(),
      value: value.to_string(),
    }
  }
}

/// Failure reported by a [`crate::SourceResolver`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
  #[error("unknown source: {0}")]
  UnknownSource(String),

  #[error("source '{key}' has no item at index {index}")]
  IndexOutOfRange { key: String, index: usize },
}
