use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::ComponentConfig;
use crate::{DEFAULT_ID, Identified};

fn default_workflow_id() -> String {
  "__workflow__".to_string()
}

fn default_job_id() -> String {
  "__job__".to_string()
}

fn default_id() -> String {
  DEFAULT_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
  #[serde(default = "default_workflow_id")]
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub default: bool,
  /// Jobs in declaration order.
  #[serde(default)]
  pub jobs: Vec<JobConfig>,
}

impl Identified for WorkflowConfig {
  fn id(&self) -> &str {
    &self.id
  }

  fn is_default(&self) -> bool {
    self.default
  }
}

impl WorkflowConfig {
  pub fn job(&self, id: &str) -> Option<&JobConfig> {
    self.jobs.iter().find(|job| job.id == id)
  }
}

/// One node of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
  #[serde(default = "default_job_id")]
  pub id: String,
  #[serde(default)]
  pub depends_on: Vec<String>,
  /// Template rendered once the job has a result.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(flatten)]
  pub kind: JobKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobKind {
  Action(ActionJob),
  Delay(DelayJob),
  Wait(WaitJob),
  Filter {},
  If(IfJob),
  Switch(SwitchJob),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionJob {
  #[serde(default)]
  pub component: ComponentRef,
  #[serde(default = "default_id")]
  pub action: String,
  /// Rendered against the workflow input; the raw input is passed when unset.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input: Option<Value>,
  /// Fan-out count: a literal integer or a template.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repeats: Option<Value>,
}

/// A job's component: an id of a declared component, or one defined inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentRef {
  Id(String),
  Inline(Box<ComponentConfig>),
}

impl Default for ComponentRef {
  fn default() -> Self {
    ComponentRef::Id(DEFAULT_ID.to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayJob {
  pub duration: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitMode {
  #[default]
  TimeInterval,
  SpecificTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitJob {
  #[serde(default)]
  pub mode: WaitMode,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time: Option<Value>,
  /// Fixed offset such as `+09:00` or `UTC`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timezone: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IfOperator {
  #[default]
  Eq,
  Neq,
  Gt,
  Gte,
  Lt,
  Lte,
  In,
  NotIn,
  StartsWith,
  EndsWith,
  Match,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfCondition {
  #[serde(default)]
  pub operator: IfOperator,
  #[serde(default)]
  pub input: Value,
  #[serde(default)]
  pub value: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub if_true: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub if_false: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfJob {
  #[serde(default)]
  pub conditions: Vec<IfCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
  #[serde(default)]
  pub value: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub then: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchJob {
  #[serde(default)]
  pub input: Value,
  #[serde(default)]
  pub cases: Vec<SwitchCase>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub otherwise: Option<String>,
}

impl JobConfig {
  pub fn as_action(&self) -> Option<&ActionJob> {
    match &self.kind {
      JobKind::Action(action) => Some(action),
      _ => None,
    }
  }

  /// The `type` tag as written in compose files.
  pub fn type_name(&self) -> &'static str {
    match self.kind {
      JobKind::Action(_) => "action",
      JobKind::Delay(_) => "delay",
      JobKind::Wait(_) => "wait",
      JobKind::Filter {} => "filter",
      JobKind::If(_) => "if",
      JobKind::Switch(_) => "switch",
    }
  }

  /// Jobs an `if` or `switch` job can route to, without duplicates.
  pub fn routing_jobs(&self) -> Vec<&str> {
    let targets: Vec<&str> = match &self.kind {
      JobKind::If(job) => job
        .conditions
        .iter()
        .flat_map(|c| [c.if_true.as_deref(), c.if_false.as_deref()])
        .flatten()
        .collect(),
      JobKind::Switch(job) => job
        .cases
        .iter()
        .map(|c| c.then.as_deref())
        .chain([job.otherwise.as_deref()])
        .flatten()
        .collect(),
      _ => Vec::new(),
    };

    let mut unique = Vec::with_capacity(targets.len());
    for target in targets {
      if !unique.contains(&target) {
        unique.push(target);
      }
    }
    unique
  }
}

impl ActionJob {
  /// The `input` template. Null and empty strings, lists or objects count
  /// as unset, so the workflow input passes through.
  pub fn input_template(&self) -> Option<&Value> {
    self.input.as_ref().filter(|input| !is_empty_template(input))
  }
}

fn is_empty_template(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(text) => text.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
    _ => false,
  }
}
