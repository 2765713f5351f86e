use serde::{Deserialize, Serialize};

use crate::component::ComponentConfig;
use crate::service::{ControllerConfig, GatewayConfig, ListenerConfig};
use crate::workflow::{ComponentRef, JobConfig, WorkflowConfig};
use crate::{Identified, find_by_id};

/// A whole compose file after normalization.
///
/// Sections are kept as ordered lists so duplicate ids survive loading and
/// can be reported by validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeConfig {
  #[serde(default)]
  pub controller: ControllerConfig,
  #[serde(default)]
  pub components: Vec<ComponentConfig>,
  #[serde(default)]
  pub workflows: Vec<WorkflowConfig>,
  #[serde(default)]
  pub listeners: Vec<ListenerConfig>,
  #[serde(default)]
  pub gateways: Vec<GatewayConfig>,
}

impl ComposeConfig {
  /// Resolve a component id; `__default__` picks the default-marked or only
  /// component.
  pub fn find_component(&self, id: &str) -> Option<&ComponentConfig> {
    find_by_id(&self.components, id)
  }

  /// Resolve a workflow id; `__default__` picks the default-marked or only
  /// workflow.
  pub fn find_workflow(&self, id: &str) -> Option<&WorkflowConfig> {
    find_by_id(&self.workflows, id)
  }

  /// The component a job runs: its inline definition or the referenced one.
  pub fn job_component<'a>(&'a self, job: &'a JobConfig) -> Option<&'a ComponentConfig> {
    match &job.as_action()?.component {
      ComponentRef::Id(id) => self.find_component(id),
      ComponentRef::Inline(component) => Some(component.as_ref()),
    }
  }

  pub fn default_component_ambiguous(&self) -> bool {
    is_default_ambiguous(&self.components)
  }

  pub fn default_workflow_ambiguous(&self) -> bool {
    is_default_ambiguous(&self.workflows)
  }

  pub fn find_gateway_by_port(&self, port: u16) -> Option<&GatewayConfig> {
    self.gateways.iter().find(|g| g.port == port)
  }
}

/// More than one item and none marked `default: true`.
fn is_default_ambiguous<T: Identified>(items: &[T]) -> bool {
  items.len() > 1 && !items.iter().any(Identified::is_default)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn compose(value: serde_json::Value) -> ComposeConfig {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_find_component_default() {
    let config = compose(json!({
      "components": [
        { "id": "a", "type": "shell", "actions": [] },
        { "id": "b", "type": "shell", "actions": [], "default": true }
      ]
    }));
    assert_eq!(config.find_component("__default__").unwrap().id, "b");
    assert_eq!(config.find_component("a").unwrap().id, "a");
    assert!(!config.default_component_ambiguous());
  }

  #[test]
  fn test_find_component_single() {
    let config = compose(json!({
      "components": [{ "id": "only", "type": "shell" }]
    }));
    assert_eq!(config.find_component("__default__").unwrap().id, "only");
  }

  #[test]
  fn test_find_component_ambiguous() {
    let config = compose(json!({
      "components": [
        { "id": "a", "type": "shell" },
        { "id": "b", "type": "shell" }
      ]
    }));
    assert!(config.find_component("__default__").is_none());
    assert!(config.default_component_ambiguous());
  }

  #[test]
  fn test_job_component_inline() {
    let config = compose(json!({
      "workflows": [{
        "id": "wf",
        "jobs": [{ "id": "j", "type": "action", "component": { "id": "inline", "type": "shell" } }]
      }]
    }));
    let workflow = config.find_workflow("__default__").unwrap();
    let component = config.job_component(&workflow.jobs[0]).unwrap();
    assert_eq!(component.id, "inline");
  }
}
