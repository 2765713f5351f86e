use mosaic_config::ComposeConfig;
use serde::Serialize;

use crate::resolver::{InputVariableResolver, OutputVariableResolver};
use crate::variable::{OutputVariable, WorkflowVariable};

/// Public description of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSchema {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub input: Vec<WorkflowVariable>,
  pub output: Vec<OutputVariable>,
}

/// Schemas for every workflow, in declaration order.
pub fn create_workflow_schema(config: &ComposeConfig) -> Vec<WorkflowSchema> {
  let inputs = InputVariableResolver::new(config);
  let outputs = OutputVariableResolver::new(config);

  config
    .workflows
    .iter()
    .map(|workflow| WorkflowSchema {
      id: workflow.id.clone(),
      name: workflow.name.clone(),
      title: workflow.title.clone(),
      description: workflow.description.clone(),
      input: inputs.resolve(workflow),
      output: outputs.resolve(workflow),
    })
    .collect()
}
