use mosaic_template::RenderError;
use thiserror::Error;

/// Errors raised while running a component action.
#[derive(Debug, Error)]
pub enum ComponentError {
  #[error("action '{action}' not found in component '{component}'")]
  ActionNotFound { component: String, action: String },

  /// Rendering an action template failed.
  #[error("{0}")]
  Render(#[from] RenderError),

  /// The action ran and reported a failure.
  #[error("{0}")]
  Execution(String),

  #[error("Command timed out: {command}")]
  Timeout { command: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("component '{0}' is not started")]
  NotStarted(String),
}
