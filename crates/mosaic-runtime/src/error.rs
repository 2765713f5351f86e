//! Runtime error types.

use mosaic_component::ComponentError;
use mosaic_template::RenderError;
use mosaic_workflow::WorkflowError;

/// Errors that can occur while running workflows.
///
/// Job failures display as the underlying message, which becomes the run's
/// `error`.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  #[error("Component not found: {0}")]
  ComponentNotFound(String),

  #[error("Workflow not found: {0}")]
  WorkflowNotFound(String),

  /// A component action failed.
  #[error("{0}")]
  Component(#[from] ComponentError),

  /// A job template failed to render.
  #[error("{0}")]
  Render(#[from] RenderError),

  /// A job definition is unusable at run time.
  #[error("invalid job '{job_id}': {message}")]
  InvalidJob { job_id: String, message: String },

  #[error("invalid workflow '{workflow_id}': {source}")]
  InvalidGraph {
    workflow_id: String,
    #[source]
    source: WorkflowError,
  },

  /// The configuration failed validation.
  #[error("invalid configuration:\n  {}", .0.join("\n  "))]
  Validation(Vec<String>),
}
