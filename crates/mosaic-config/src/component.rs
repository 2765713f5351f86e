use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{DEFAULT_ID, Identified, find_by_id};

fn default_component_id() -> String {
  "__component__".to_string()
}

fn default_id() -> String {
  DEFAULT_ID.to_string()
}

fn default_max_concurrent_count() -> usize {
  1
}

fn default_method() -> String {
  "POST".to_string()
}

/// A component: an independently started unit exposing named actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
  #[serde(default = "default_component_id")]
  pub id: String,
  #[serde(default)]
  pub default: bool,
  /// Concurrent action invocations allowed; 0 means unlimited.
  #[serde(default = "default_max_concurrent_count")]
  pub max_concurrent_count: usize,
  #[serde(flatten)]
  pub kind: ComponentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ComponentKind {
  Shell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_dir: Option<String>,
    #[serde(default)]
    env: Map<String, Value>,
    #[serde(default)]
    actions: Vec<ActionConfig<ShellAction>>,
  },
  HttpClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    actions: Vec<ActionConfig<HttpClientAction>>,
  },
  Workflow {
    #[serde(default)]
    actions: Vec<ActionConfig<WorkflowAction>>,
  },
}

/// An action declared on a component. `spec` holds the type-specific part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig<T> {
  #[serde(default = "default_id")]
  pub id: String,
  #[serde(default)]
  pub default: bool,
  /// Template rendered against the action's `result` source.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(flatten)]
  pub spec: T,
}

/// Runs a local command. A string command goes through `sh -c`; a list is
/// executed directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellAction {
  pub command: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub working_dir: Option<String>,
  #[serde(default)]
  pub env: Map<String, Value>,
  /// Seconds or a duration string.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpClientAction {
  /// Absolute URL; takes precedence over `path`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint: Option<String>,
  /// Path joined onto the component's `base_url`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default)]
  pub headers: Map<String, Value>,
  #[serde(default)]
  pub params: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Value>,
}

/// Runs another workflow of the same compose file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAction {
  #[serde(default = "default_id")]
  pub workflow: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input: Option<Value>,
}

/// Type-independent view of an action, for analysis and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionView<'a> {
  pub id: &'a str,
  pub default: bool,
  pub output: Option<&'a Value>,
  /// Referenced workflow, for workflow components.
  pub workflow: Option<&'a str>,
  /// The whole action as JSON, for template scanning.
  pub template: Value,
}

impl<T> Identified for ActionConfig<T> {
  fn id(&self) -> &str {
    &self.id
  }

  fn is_default(&self) -> bool {
    self.default
  }
}

impl Identified for ComponentConfig {
  fn id(&self) -> &str {
    &self.id
  }

  fn is_default(&self) -> bool {
    self.default
  }
}

fn view<'a, T: Serialize>(action: &'a ActionConfig<T>, workflow: Option<&'a str>) -> ActionView<'a> {
  ActionView {
    id: &action.id,
    default: action.default,
    output: action.output.as_ref(),
    workflow,
    template: serde_json::to_value(action).unwrap_or(Value::Null),
  }
}

fn find_view<'a, T: Serialize>(
  actions: &'a [ActionConfig<T>],
  id: &str,
  workflow: impl Fn(&'a ActionConfig<T>) -> Option<&'a str>,
) -> Option<ActionView<'a>> {
  find_by_id(actions, id).map(|action| view(action, workflow(action)))
}

impl ComponentConfig {
  /// The `type` tag as written in compose files.
  pub fn type_name(&self) -> &'static str {
    match self.kind {
      ComponentKind::Shell { .. } => "shell",
      ComponentKind::HttpClient { .. } => "http-client",
      ComponentKind::Workflow { .. } => "workflow",
    }
  }

  pub fn is_workflow(&self) -> bool {
    matches!(self.kind, ComponentKind::Workflow { .. })
  }

  pub fn action_ids(&self) -> Vec<&str> {
    match &self.kind {
      ComponentKind::Shell { actions, .. } => actions.iter().map(|a| a.id.as_str()).collect(),
      ComponentKind::HttpClient { actions, .. } => actions.iter().map(|a| a.id.as_str()).collect(),
      ComponentKind::Workflow { actions } => actions.iter().map(|a| a.id.as_str()).collect(),
    }
  }

  /// Look up an action; `__default__` resolves to the default-marked or
  /// only action.
  pub fn find_action(&self, id: &str) -> Option<ActionView<'_>> {
    match &self.kind {
      ComponentKind::Shell { actions, .. } => find_view(actions, id, |_| None),
      ComponentKind::HttpClient { actions, .. } => find_view(actions, id, |_| None),
      ComponentKind::Workflow { actions } => {
        find_view(actions, id, |a| Some(a.spec.workflow.as_str()))
      }
    }
  }

  /// All actions in declaration order.
  pub fn actions(&self) -> Vec<ActionView<'_>> {
    match &self.kind {
      ComponentKind::Shell { actions, .. } => actions.iter().map(|a| view(a, None)).collect(),
      ComponentKind::HttpClient { actions, .. } => actions.iter().map(|a| view(a, None)).collect(),
      ComponentKind::Workflow { actions } => actions
        .iter()
        .map(|a| view(a, Some(a.spec.workflow.as_str())))
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_shell_component() {
    let component: ComponentConfig = serde_json::from_value(json!({
      "id": "echo",
      "type": "shell",
      "actions": [
        { "id": "say", "command": ["echo", "${input.text}"], "output": "${result.stdout}" }
      ]
    }))
    .unwrap();

    assert_eq!(component.id, "echo");
    assert_eq!(component.max_concurrent_count, 1);
    assert_eq!(component.type_name(), "shell");
    assert_eq!(component.action_ids(), vec!["say"]);

    let action = component.find_action("say").unwrap();
    assert_eq!(action.output, Some(&json!("${result.stdout}")));
    assert_eq!(action.template["command"][1], json!("${input.text}"));
  }

  #[test]
  fn test_default_action_resolution() {
    let component: ComponentConfig = serde_json::from_value(json!({
      "type": "http-client",
      "base_url": "http://localhost",
      "actions": [
        { "id": "a", "path": "/a" },
        { "id": "b", "path": "/b", "default": true }
      ]
    }))
    .unwrap();

    assert_eq!(component.id, "__component__");
    assert_eq!(component.find_action("__default__").unwrap().id, "b");
    assert_eq!(component.find_action("a").unwrap().id, "a");
    assert!(component.find_action("c").is_none());
  }

  #[test]
  fn test_workflow_action_view() {
    let component: ComponentConfig = serde_json::from_value(json!({
      "id": "sub",
      "type": "workflow",
      "actions": [{ "workflow": "inner" }]
    }))
    .unwrap();

    assert!(component.is_workflow());
    let action = component.find_action("__default__").unwrap();
    assert_eq!(action.id, "__default__");
    assert_eq!(action.workflow, Some("inner"));
  }

  #[test]
  fn test_unknown_component_type_is_rejected() {
    let result = serde_json::from_value::<ComponentConfig>(json!({ "type": "quantum" }));
    assert!(result.is_err());
  }
}
