use std::sync::{Arc, Weak};

use async_trait::async_trait;
use mosaic_component::{Component, ComponentError, ComponentLifecycle, ExecutionContext, GatewayLookup, RESULT_SOURCE};
use mosaic_config::{ActionConfig, WorkflowAction, find_by_id};
use serde_json::Value;
use tracing::instrument;

use crate::registry::ComponentRegistry;
use crate::runner::WorkflowRunner;

/// Runs another workflow of the same compose configuration as an action.
///
/// The nested run shares the owning registry, so components referenced by
/// both workflows are the same instances.
pub struct WorkflowComponent {
  id: String,
  actions: Vec<ActionConfig<WorkflowAction>>,
  registry: Weak<ComponentRegistry>,
  gateways: Option<Arc<dyn GatewayLookup>>,
  lifecycle: ComponentLifecycle,
}

impl WorkflowComponent {
  pub fn new(
    id: impl Into<String>,
    actions: Vec<ActionConfig<WorkflowAction>>,
    registry: Weak<ComponentRegistry>,
  ) -> Self {
    Self {
      id: id.into(),
      actions,
      registry,
      gateways: None,
      lifecycle: ComponentLifecycle::new(),
    }
  }

  pub fn with_gateways(mut self, gateways: Arc<dyn GatewayLookup>) -> Self {
    self.gateways = Some(gateways);
    self
  }
}

#[async_trait]
impl Component for WorkflowComponent {
  fn id(&self) -> &str {
    &self.id
  }

  fn started(&self) -> bool {
    self.lifecycle.is_started()
  }

  async fn start(&self) -> Result<(), ComponentError> {
    self.lifecycle.start(&self.id, || async { Ok(()) }).await
  }

  async fn stop(&self) -> Result<(), ComponentError> {
    self.lifecycle.stop(&self.id, || async { Ok(()) }).await
  }

  #[instrument(name = "workflow_component_run", skip(self, input), fields(component_id = %self.id))]
  async fn run(&self, action_id: &str, call_id: &str, input: Value) -> Result<Value, ComponentError> {
    self.lifecycle.ensure_started(&self.id)?;
    let action = find_by_id(&self.actions, action_id).ok_or_else(|| ComponentError::ActionNotFound {
      component: self.id.clone(),
      action: action_id.to_string(),
    })?;
    let registry = self
      .registry
      .upgrade()
      .ok_or_else(|| ComponentError::NotStarted(self.id.clone()))?;
    let workflow = registry.config().find_workflow(&action.spec.workflow).ok_or_else(|| {
      ComponentError::Execution(format!("Workflow not found: {}", action.spec.workflow))
    })?;

    let mut ctx = ExecutionContext::new(call_id, input).with_gateways(self.gateways.clone());
    let workflow_input = match &action.spec.input {
      Some(template) => ctx.render(template, false).await?,
      None => ctx.input().clone(),
    };

    let state = WorkflowRunner::new(&registry, workflow).run(workflow_input).await;
    if let Some(error) = state.error {
      return Err(ComponentError::Execution(error));
    }
    let result = state.output.unwrap_or(Value::Null);
    ctx.register_source(RESULT_SOURCE, result.clone());

    match &action.output {
      Some(output) => Ok(ctx.render(output, false).await?),
      None => Ok(result),
    }
  }
}
