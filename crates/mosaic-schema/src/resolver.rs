use std::collections::HashSet;

use mosaic_config::{ActionJob, ActionView, ComponentConfig, ComposeConfig, JobConfig, WorkflowConfig};
use mosaic_template::{is_bare_reference, scan};
use mosaic_workflow::JobGraph;
use serde_json::Value;
use tracing::trace;

use crate::variable::{
  OutputVariable, WorkflowVariable, WorkflowVariableGroup, dedup_outputs, dedup_variables,
};

const INPUT_KEY: &str = "input";
const OUTPUT_KEY: &str = "output";

/// The component and action an action job runs, when both resolve.
fn job_target<'a>(
  config: &'a ComposeConfig,
  job: &'a JobConfig,
  action: &'a ActionJob,
) -> Option<(&'a ComponentConfig, ActionView<'a>)> {
  let component = config.job_component(job)?;
  let view = component.find_action(&action.action)?;
  Some((component, view))
}

/// True when `template` is unset or exactly `${key}`.
fn passes_through(template: Option<&Value>, key: &str) -> bool {
  match template {
    None => true,
    Some(Value::String(text)) => is_bare_reference(text, key),
    Some(_) => false,
  }
}

/// Variables a workflow expects in its input.
pub struct InputVariableResolver<'a> {
  config: &'a ComposeConfig,
}

impl<'a> InputVariableResolver<'a> {
  pub fn new(config: &'a ComposeConfig) -> Self {
    Self { config }
  }

  pub fn resolve(&self, workflow: &WorkflowConfig) -> Vec<WorkflowVariable> {
    let mut visited = HashSet::new();
    dedup_variables(self.resolve_workflow(workflow, &mut visited))
  }

  fn resolve_workflow<'w>(
    &'w self,
    workflow: &'w WorkflowConfig,
    visited: &mut HashSet<&'w str>,
  ) -> Vec<WorkflowVariable> {
    if !visited.insert(workflow.id.as_str()) {
      return Vec::new();
    }

    let mut variables = Vec::new();
    for job in &workflow.jobs {
      match job.as_action() {
        Some(action) if passes_through(action.input_template(), INPUT_KEY) => {
          if let Some((component, view)) = job_target(self.config, job, action) {
            variables.extend(self.resolve_component(component, &view, visited));
          }
        }
        _ => {
          let mut template = serde_json::to_value(job).unwrap_or(Value::Null);
          if let Value::Object(map) = &mut template {
            map.remove("component");
          }
          collect_inputs(&template, false, &mut variables);
        }
      }
    }

    visited.remove(workflow.id.as_str());
    variables
  }

  fn resolve_component<'w>(
    &'w self,
    component: &'w ComponentConfig,
    action: &ActionView<'w>,
    visited: &mut HashSet<&'w str>,
  ) -> Vec<WorkflowVariable> {
    if component.is_workflow() {
      let id = action.workflow.unwrap_or(mosaic_config::DEFAULT_ID);
      return match self.config.find_workflow(id) {
        Some(workflow) => self.resolve_workflow(workflow, visited),
        None => Vec::new(),
      };
    }

    let mut variables = Vec::new();
    collect_inputs(&action.template, true, &mut variables);
    variables
  }
}

/// `${input...}` references anywhere in `value`, named by their path.
fn collect_inputs(value: &Value, internal: bool, out: &mut Vec<WorkflowVariable>) {
  match value {
    Value::String(text) => {
      for expr in scan(text).iter().filter(|e| e.key == INPUT_KEY) {
        out.push(WorkflowVariable::from_expression(expr.path.clone(), expr, internal));
      }
    }
    Value::Array(items) => items.iter().for_each(|item| collect_inputs(item, internal, out)),
    Value::Object(map) => map.values().for_each(|item| collect_inputs(item, internal, out)),
    _ => {}
  }
}

/// Variables a workflow produces, from its terminal jobs.
pub struct OutputVariableResolver<'a> {
  config: &'a ComposeConfig,
}

impl<'a> OutputVariableResolver<'a> {
  pub fn new(config: &'a ComposeConfig) -> Self {
    Self { config }
  }

  pub fn resolve(&self, workflow: &WorkflowConfig) -> Vec<OutputVariable> {
    let mut visited = HashSet::new();
    dedup_outputs(self.resolve_workflow(workflow, &mut visited))
  }

  fn resolve_workflow<'w>(
    &'w self,
    workflow: &'w WorkflowConfig,
    visited: &mut HashSet<&'w str>,
  ) -> Vec<OutputVariable> {
    if !visited.insert(workflow.id.as_str()) {
      return Vec::new();
    }

    let graph = JobGraph::new(workflow);
    let mut outputs = Vec::new();

    for job_id in graph.terminal_jobs() {
      let Some(job) = workflow.job(job_id) else {
        continue;
      };
      let job_outputs = self.resolve_job(job, visited);
      let repeat_count = repeat_count(job);
      trace!(job_id = %job.id, repeat_count, "terminal_job_outputs");

      if repeat_count == 1 {
        outputs.extend(job_outputs);
      } else {
        outputs.push(OutputVariable::Group(WorkflowVariableGroup {
          name: None,
          variables: flatten(job_outputs),
          repeat_count,
        }));
      }
    }

    visited.remove(workflow.id.as_str());
    outputs
  }

  fn resolve_job<'w>(
    &'w self,
    job: &'w JobConfig,
    visited: &mut HashSet<&'w str>,
  ) -> Vec<OutputVariable> {
    if let Some(action) = job.as_action()
      && passes_through(job.output.as_ref(), OUTPUT_KEY)
    {
      let Some((component, view)) = job_target(self.config, job, action) else {
        return Vec::new();
      };
      if component.is_workflow() {
        let id = view.workflow.unwrap_or(mosaic_config::DEFAULT_ID);
        return match self.config.find_workflow(id) {
          Some(workflow) => self.resolve_workflow(workflow, visited),
          None => Vec::new(),
        };
      }
      return variables(collect_outputs(None, view.output, true));
    }

    variables(collect_outputs(None, job.output.as_ref(), false))
  }
}

fn variables(list: Vec<WorkflowVariable>) -> Vec<OutputVariable> {
  list.into_iter().map(OutputVariable::Variable).collect()
}

/// Nested groups of a sub-workflow collapse into the enclosing group.
fn flatten(outputs: Vec<OutputVariable>) -> Vec<WorkflowVariable> {
  outputs
    .into_iter()
    .flat_map(|output| match output {
      OutputVariable::Variable(variable) => vec![variable],
      OutputVariable::Group(group) => group.variables,
    })
    .collect()
}

/// Every expression in an output template, named by its position in the
/// template (`result.score`, `items[0]`).
fn collect_outputs(name: Option<String>, template: Option<&Value>, internal: bool) -> Vec<WorkflowVariable> {
  let mut out = Vec::new();
  if let Some(template) = template {
    collect_output_into(name, template, internal, &mut out);
  }
  out
}

fn collect_output_into(
  name: Option<String>,
  value: &Value,
  internal: bool,
  out: &mut Vec<WorkflowVariable>,
) {
  match value {
    Value::String(text) => {
      for expr in scan(text) {
        out.push(WorkflowVariable::from_expression(name.clone(), &expr, internal));
      }
    }
    Value::Object(map) => {
      for (key, item) in map {
        let child = match &name {
          Some(name) => format!("{name}.{key}"),
          None => key.clone(),
        };
        collect_output_into(Some(child), item, internal, out);
      }
    }
    Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        let child = format!("{}[{i}]", name.as_deref().unwrap_or_default());
        collect_output_into(Some(child), item, internal, out);
      }
    }
    _ => {}
  }
}

/// Statically known result count: 1 when unset, the literal when given, 0
/// when it depends on a template.
/// Literal counts below one run once, as at runtime. Anything not known
/// until the run gives 0.
fn repeat_count(job: &JobConfig) -> usize {
  let Some(repeats) = job.as_action().and_then(|a| a.repeats.as_ref()) else {
    return 1;
  };
  let literal = match repeats {
    Value::Number(n) => n.as_u64().map(|n| n as usize),
    Value::String(s) => s.trim().parse::<usize>().ok(),
    _ => None,
  };
  literal.map_or(0, |count| count.max(1))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn compose(value: Value) -> ComposeConfig {
    serde_json::from_value(value).unwrap()
  }

  fn names(variables: &[WorkflowVariable]) -> Vec<Option<&str>> {
    variables.iter().map(|v| v.name.as_deref()).collect()
  }

  #[test]
  fn test_input_dedup_by_name() {
    let config = compose(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "true" }] }],
      "workflows": [{
        "id": "wf",
        "jobs": [
          { "id": "a", "type": "action", "component": "sh", "input": { "x": "${input.x as integer}" } },
          { "id": "b", "type": "action", "component": "sh", "input": "${input.x as boolean} ${input.y}" }
        ]
      }]
    }));

    let variables = InputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(names(&variables), vec![Some("x"), Some("y")]);
    assert_eq!(variables[0].kind, "integer");
    assert!(!variables[0].internal);
  }

  #[test]
  fn test_input_inherited_from_action() {
    let config = compose(json!({
      "components": [{
        "id": "sh",
        "type": "shell",
        "actions": [{ "id": "greet", "command": ["echo", "${input.name | world}"] }]
      }],
      "workflows": [{
        "id": "wf",
        "jobs": [{ "id": "a", "type": "action", "component": "sh", "action": "greet", "input": "${input}" }]
      }]
    }));

    let variables = InputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name.as_deref(), Some("name"));
    assert_eq!(variables[0].default, Some(json!("world")));
    assert!(variables[0].internal);
  }

  #[test]
  fn test_input_through_nested_workflow() {
    let config = compose(json!({
      "components": [
        { "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "echo ${input.text}" }] },
        { "id": "inner", "type": "workflow", "actions": [{ "id": "call", "workflow": "child" }] }
      ],
      "workflows": [
        { "id": "parent", "jobs": [{ "id": "a", "type": "action", "component": "inner" }] },
        { "id": "child", "jobs": [{ "id": "b", "type": "action", "component": "sh", "input": { "t": "${input.text as string}" } }] }
      ]
    }));

    let variables = InputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(names(&variables), vec![Some("text")]);
  }

  #[test]
  fn test_recursive_workflow_terminates() {
    let config = compose(json!({
      "components": [{ "id": "self", "type": "workflow", "actions": [{ "id": "call", "workflow": "loop" }] }],
      "workflows": [{ "id": "loop", "jobs": [{ "id": "a", "type": "action", "component": "self" }] }]
    }));

    let resolver = InputVariableResolver::new(&config);
    assert!(resolver.resolve(&config.workflows[0]).is_empty());
    let outputs = OutputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert!(outputs.is_empty());
  }

  #[test]
  fn test_unresolved_component_contributes_nothing() {
    let config = compose(json!({
      "workflows": [{ "id": "wf", "jobs": [{ "id": "a", "type": "action", "component": "ghost" }] }]
    }));
    assert!(InputVariableResolver::new(&config).resolve(&config.workflows[0]).is_empty());
    assert!(OutputVariableResolver::new(&config).resolve(&config.workflows[0]).is_empty());
  }

  #[test]
  fn test_output_only_terminal_jobs() {
    let config = compose(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "true" }] }],
      "workflows": [{
        "id": "wf",
        "jobs": [
          { "id": "a", "type": "action", "component": "sh", "output": { "hidden": "${result}" } },
          {
            "id": "b",
            "type": "action",
            "component": "sh",
            "depends_on": ["a"],
            "output": { "result": { "score": "${result.score as number}" }, "tags": ["${result.tag}"] }
          }
        ]
      }]
    }));

    let outputs = OutputVariableResolver::new(&config).resolve(&config.workflows[0]);
    let expected: Vec<Option<&str>> = vec![Some("result.score"), Some("tags[0]")];
    let actual: Vec<Option<&str>> = outputs
      .iter()
      .map(|o| match o {
        OutputVariable::Variable(v) => v.name.as_deref(),
        OutputVariable::Group(_) => panic!("unexpected group"),
      })
      .collect();
    assert_eq!(actual, expected);
  }

  #[test]
  fn test_fan_out_group() {
    let config = compose(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "true" }] }],
      "workflows": [{
        "id": "wf",
        "jobs": [{
          "id": "score",
          "type": "action",
          "component": "sh",
          "repeats": 3,
          "output": { "score": "${result.score}" }
        }]
      }]
    }));

    let outputs = OutputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(outputs.len(), 1);
    match &outputs[0] {
      OutputVariable::Group(group) => {
        assert_eq!(group.repeat_count, 3);
        assert_eq!(names(&group.variables), vec![Some("score")]);
      }
      other => panic!("expected group, got {:?}", other),
    }
  }

  #[test]
  fn test_templated_repeats_unknown_count() {
    let config = compose(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "true", "output": "${result.stdout}" }] }],
      "workflows": [{
        "id": "wf",
        "jobs": [{ "id": "a", "type": "action", "component": "sh", "repeats": "${input.n}" }]
      }]
    }));

    let outputs = OutputVariableResolver::new(&config).resolve(&config.workflows[0]);
    match &outputs[0] {
      OutputVariable::Group(group) => {
        assert_eq!(group.repeat_count, 0);
        assert_eq!(group.variables.len(), 1);
        assert!(group.variables[0].internal);
      }
      other => panic!("expected group, got {:?}", other),
    }
  }

  #[test]
  fn test_zero_repeats_runs_once() {
    let config = compose(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "true" }] }],
      "workflows": [{
        "id": "wf",
        "jobs": [
          { "id": "a", "type": "action", "component": "sh", "repeats": 0, "output": { "v": "${result.v}" } },
          { "id": "b", "type": "action", "component": "sh", "repeats": "0", "output": { "w": "${result.w}" } }
        ]
      }]
    }));

    let outputs = OutputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(outputs.len(), 2);
    assert!(outputs.iter().all(|o| matches!(o, OutputVariable::Variable(_))));
  }

  #[test]
  fn test_empty_input_inherits_from_action() {
    let config = compose(json!({
      "components": [{
        "id": "sh",
        "type": "shell",
        "actions": [{ "id": "greet", "command": ["echo", "${input.name}"] }]
      }],
      "workflows": [{
        "id": "wf",
        "jobs": [
          { "id": "a", "type": "action", "component": "sh", "action": "greet", "input": {} },
          { "id": "b", "type": "action", "component": "sh", "action": "greet", "input": "" }
        ]
      }]
    }));

    let variables = InputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(names(&variables), vec![Some("name")]);
    assert!(variables[0].internal);
  }

  #[test]
  fn test_groups_do_not_dedupe_across() {
    let config = compose(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "id": "run", "command": "true" }] }],
      "workflows": [{
        "id": "wf",
        "jobs": [
          { "id": "a", "type": "action", "component": "sh", "repeats": 2, "output": { "v": "${result.v}", "w": "${result.v}" } },
          { "id": "b", "type": "action", "component": "sh", "repeats": 2, "output": { "v": "${result.v}" } },
          { "id": "c", "type": "action", "component": "sh", "output": { "v": "${result.v}" } },
          { "id": "d", "type": "action", "component": "sh", "output": { "v": "${result.x}" } }
        ]
      }]
    }));

    let outputs = OutputVariableResolver::new(&config).resolve(&config.workflows[0]);
    assert_eq!(outputs.len(), 3);
  }
}
