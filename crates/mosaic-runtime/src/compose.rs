use std::sync::Arc;

use mosaic_config::{ComposeConfig, DEFAULT_ID};
use mosaic_schema::{WorkflowSchema, create_workflow_schema};
use mosaic_validator::ComposeValidator;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::RuntimeError;
use crate::registry::ComponentRegistry;
use crate::runner::{WorkflowRunState, WorkflowRunner};

/// Entry point for one compose configuration: validation, schema
/// extraction, workflow runs and component lifecycle.
pub struct ComposeRuntime {
  config: Arc<ComposeConfig>,
  registry: Arc<ComponentRegistry>,
}

impl ComposeRuntime {
  pub fn new(config: ComposeConfig) -> Self {
    let config = Arc::new(config);
    Self {
      registry: ComponentRegistry::new(config.clone()),
      config,
    }
  }

  pub fn config(&self) -> &ComposeConfig {
    &self.config
  }

  pub fn registry(&self) -> &Arc<ComponentRegistry> {
    &self.registry
  }

  /// Semantic diagnostics; empty when the configuration is usable.
  pub fn validate(&self) -> Vec<String> {
    ComposeValidator::new(&self.config).validate()
  }

  /// Fail with every diagnostic if the configuration is invalid.
  pub fn ensure_valid(&self) -> Result<(), RuntimeError> {
    let errors = self.validate();
    if errors.is_empty() {
      Ok(())
    } else {
      Err(RuntimeError::Validation(errors))
    }
  }

  pub fn schema(&self) -> Vec<WorkflowSchema> {
    create_workflow_schema(&self.config)
  }

  /// Run a workflow; `None` selects the default one.
  ///
  /// Job failures are reported in the returned state. Only an unknown
  /// workflow is an error.
  pub async fn run_workflow(&self, workflow_id: Option<&str>, input: Value) -> Result<WorkflowRunState, RuntimeError> {
    let id = workflow_id.unwrap_or(DEFAULT_ID);
    let workflow = self
      .config
      .find_workflow(id)
      .ok_or_else(|| RuntimeError::WorkflowNotFound(id.to_string()))?;

    Ok(WorkflowRunner::new(&self.registry, workflow).run(input).await)
  }

  #[instrument(name = "services_start", skip(self))]
  pub async fn start_services(&self) -> Result<(), RuntimeError> {
    self.registry.start_all().await?;
    info!(components = self.config.components.len(), "services_started");
    Ok(())
  }

  #[instrument(name = "services_stop", skip(self))]
  pub async fn stop_services(&self) -> Result<(), RuntimeError> {
    self.registry.stop_all().await?;
    info!("services_stopped");
    Ok(())
  }
}
