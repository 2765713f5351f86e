//! Workflow execution.

use std::collections::HashMap;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use mosaic_component::ExecutionContext;
use mosaic_config::WorkflowConfig;
use mosaic_workflow::JobGraph;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::job::{JOBS_SOURCE, JobOutcome, OUTPUT_SOURCE, run_job};
use crate::registry::ComponentRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Completed,
  Failed,
}

/// Record of one workflow run. Exactly one of `output` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRunState {
  pub run_id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl WorkflowRunState {
  fn completed(run_id: String, workflow_id: String, output: Value) -> Self {
    Self {
      run_id,
      workflow_id,
      status: RunStatus::Completed,
      output: Some(output),
      error: None,
    }
  }

  fn failed(run_id: String, workflow_id: String, error: &RuntimeError) -> Self {
    Self {
      run_id,
      workflow_id,
      status: RunStatus::Failed,
      output: None,
      error: Some(error.to_string()),
    }
  }

  pub fn is_completed(&self) -> bool {
    self.status == RunStatus::Completed
  }

  /// The caller-visible result: the error message if the run failed,
  /// otherwise the output.
  pub fn result(&self) -> Value {
    match &self.error {
      Some(error) => Value::String(error.clone()),
      None => self.output.clone().unwrap_or(Value::Null),
    }
  }
}

#[derive(Debug, Clone)]
enum JobState {
  Pending,
  Running,
  Completed { output: Value, order: usize },
  Skipped,
}

enum Readiness {
  Run,
  Skip,
  Wait,
}

/// Runs one workflow against a component registry.
pub struct WorkflowRunner<'a> {
  registry: &'a ComponentRegistry,
  workflow: &'a WorkflowConfig,
}

impl<'a> WorkflowRunner<'a> {
  pub fn new(registry: &'a ComponentRegistry, workflow: &'a WorkflowConfig) -> Self {
    Self { registry, workflow }
  }

  /// Run the workflow with a fresh run id.
  pub async fn run(&self, input: Value) -> WorkflowRunState {
    self.run_with_id(Uuid::new_v4().to_string(), input).await
  }

  #[instrument(
    name = "workflow_run",
    skip(self, input),
    fields(workflow_id = %self.workflow.id, run_id = %run_id)
  )]
  pub async fn run_with_id(&self, run_id: String, input: Value) -> WorkflowRunState {
    info!(run_id = %run_id, workflow_id = %self.workflow.id, "workflow_started");

    match self.execute(&run_id, input).await {
      Ok(output) => {
        info!(run_id = %run_id, "workflow_completed");
        WorkflowRunState::completed(run_id, self.workflow.id.clone(), output)
      }
      Err(e) => {
        error!(run_id = %run_id, error = %e, "workflow_failed");
        WorkflowRunState::failed(run_id, self.workflow.id.clone(), &e)
      }
    }
  }

  async fn execute(&self, run_id: &str, input: Value) -> Result<Value, RuntimeError> {
    let graph = JobGraph::new(self.workflow);
    graph.check().map_err(|source| RuntimeError::InvalidGraph {
      workflow_id: self.workflow.id.clone(),
      source,
    })?;

    let mut states: HashMap<&str, JobState> = graph
      .jobs()
      .iter()
      .map(|id| (id.as_str(), JobState::Pending))
      .collect();
    let mut routes: HashMap<String, Vec<String>> = HashMap::new();
    let mut completed_count = 0;
    let mut running = FuturesUnordered::new();

    loop {
      // Skips can unblock further jobs, so settle until nothing changes.
      let mut changed = true;
      while changed {
        changed = false;
        for id in graph.jobs() {
          if !matches!(states.get(id.as_str()), Some(JobState::Pending)) {
            continue;
          }
          match readiness(&graph, id, &states, &routes) {
            Readiness::Wait => {}
            Readiness::Skip => {
              info!(run_id = %run_id, job_id = %id, "job_skipped");
              states.insert(id, JobState::Skipped);
              changed = true;
            }
            Readiness::Run => {
              let Some(job) = self.workflow.job(id) else {
                continue;
              };
              let ctx = self.job_context(run_id, &input, &graph, id, &states);
              info!(run_id = %run_id, job_id = %id, job_type = job.type_name(), "job_started");
              states.insert(id, JobState::Running);
              let registry = self.registry;
              running.push(async move { (job, run_job(job, registry, ctx).await) });
            }
          }
        }
      }

      let Some((job, result)) = running.next().await else {
        break;
      };

      match result {
        Ok(JobOutcome { output, routes: selected }) => {
          info!(run_id = %run_id, job_id = %job.id, "job_completed");
          if let Some(selected) = selected {
            routes.insert(job.id.clone(), selected);
          }
          completed_count += 1;
          states.insert(
            job.id.as_str(),
            JobState::Completed {
              output,
              order: completed_count,
            },
          );
        }
        Err(e) => {
          error!(run_id = %run_id, job_id = %job.id, error = %e, "job_failed");
          // Dropping `running` cancels the jobs still in flight.
          return Err(e);
        }
      }
    }

    for (id, state) in &states {
      if matches!(state, JobState::Pending) {
        warn!(run_id = %run_id, job_id = %id, "job_unreachable");
      }
    }

    Ok(workflow_output(&graph, &states))
  }

  /// Context of a job about to run: workflow input plus the upstream
  /// `output` and the `jobs` map of completed outputs.
  fn job_context(
    &self,
    run_id: &str,
    input: &Value,
    graph: &JobGraph,
    job_id: &str,
    states: &HashMap<&str, JobState>,
  ) -> ExecutionContext {
    let mut ctx =
      ExecutionContext::new(run_id, input.clone()).with_gateways(Some(self.registry.gateways()));

    let upstream = graph
      .dependencies(job_id)
      .iter()
      .chain(graph.routers_of(job_id))
      .filter_map(|id| match states.get(id.as_str()) {
        Some(JobState::Completed { output, order }) => Some((order, output)),
        _ => None,
      })
      .max_by_key(|(order, _)| **order);
    if let Some((_, output)) = upstream {
      ctx.register_source(OUTPUT_SOURCE, output.clone());
    }

    let mut jobs = Map::new();
    for id in graph.jobs() {
      if let Some(JobState::Completed { output, .. }) = states.get(id.as_str()) {
        jobs.insert(id.clone(), json!({ "output": output }));
      }
    }
    ctx.register_source(JOBS_SOURCE, Value::Object(jobs));

    ctx
  }
}

fn readiness(
  graph: &JobGraph,
  job_id: &str,
  states: &HashMap<&str, JobState>,
  routes: &HashMap<String, Vec<String>>,
) -> Readiness {
  let settled = |id: &String| {
    matches!(
      states.get(id.as_str()),
      Some(JobState::Completed { .. } | JobState::Skipped)
    )
  };
  let completed = |id: &String| matches!(states.get(id.as_str()), Some(JobState::Completed { .. }));

  let dependencies = graph.dependencies(job_id);
  let routers = graph.routers_of(job_id);
  if !dependencies.iter().all(settled) || !routers.iter().all(settled) {
    return Readiness::Wait;
  }

  if !routers.is_empty() {
    let selected = routers.iter().any(|router| {
      routes
        .get(router)
        .is_some_and(|targets| targets.iter().any(|t| t == job_id))
    });
    return if selected { Readiness::Run } else { Readiness::Skip };
  }

  if dependencies.is_empty() || dependencies.iter().any(completed) {
    Readiness::Run
  } else {
    Readiness::Skip
  }
}

/// Output of the completed terminal jobs: a single output as is, several
/// object outputs merged in job order, anything else as a list.
fn workflow_output(graph: &JobGraph, states: &HashMap<&str, JobState>) -> Value {
  let mut outputs: Vec<&Value> = graph
    .terminal_jobs()
    .iter()
    .filter_map(|id| match states.get(id.as_str()) {
      Some(JobState::Completed { output, .. }) => Some(output),
      _ => None,
    })
    .collect();

  match outputs.len() {
    0 => Value::Null,
    1 => outputs.remove(0).clone(),
    _ if outputs.iter().all(|o| o.is_object()) => {
      let mut merged = Map::new();
      for output in outputs {
        if let Value::Object(map) = output {
          merged.extend(map.clone());
        }
      }
      Value::Object(merged)
    }
    _ => Value::Array(outputs.into_iter().cloned().collect()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  fn workflow(jobs: Value) -> WorkflowConfig {
    serde_json::from_value(json!({ "id": "wf", "jobs": jobs })).unwrap()
  }

  fn registry() -> Arc<ComponentRegistry> {
    ComponentRegistry::new(Arc::new(serde_json::from_value(json!({})).unwrap()))
  }

  #[tokio::test]
  async fn test_control_jobs_pass_output_along() {
    let workflow = workflow(json!([
      { "id": "start", "type": "filter", "output": { "value": "${input.n}" } },
      { "id": "pause", "type": "delay", "duration": 0, "depends_on": ["start"] },
      { "id": "done", "type": "filter", "output": "${output.value}", "depends_on": ["pause"] }
    ]));
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow).run(json!({ "n": 3 })).await;

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.output, Some(json!(3)));
    assert_eq!(state.error, None);
  }

  #[tokio::test]
  async fn test_routing_skips_unselected_branch() {
    let workflow = workflow(json!([
      { "id": "check", "type": "if", "conditions": [
        { "operator": "gt", "input": "${input.n}", "value": 10, "if_true": "big", "if_false": "small" }
      ]},
      { "id": "big", "type": "filter", "output": { "size": "big" }, "depends_on": ["check"] },
      { "id": "small", "type": "filter", "output": { "size": "small" }, "depends_on": ["check"] },
      { "id": "after-big", "type": "filter", "output": { "after": true }, "depends_on": ["big"] }
    ]));
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow).run(json!({ "n": 3 })).await;

    assert_eq!(state.output, Some(json!({ "size": "small" })));
  }

  #[tokio::test]
  async fn test_terminal_objects_merge() {
    let workflow = workflow(json!([
      { "id": "a", "type": "filter", "output": { "a": 1 } },
      { "id": "b", "type": "filter", "output": { "b": 2 } }
    ]));
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow).run(Value::Null).await;
    assert_eq!(state.output, Some(json!({ "a": 1, "b": 2 })));
  }

  #[tokio::test]
  async fn test_terminal_scalars_collect() {
    let workflow = workflow(json!([
      { "id": "a", "type": "filter", "output": "x" },
      { "id": "b", "type": "filter", "output": { "b": 2 } }
    ]));
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow).run(Value::Null).await;
    assert_eq!(state.output, Some(json!(["x", { "b": 2 }])));
  }

  #[tokio::test]
  async fn test_jobs_source() {
    let workflow = workflow(json!([
      { "id": "a", "type": "filter", "output": "first" },
      { "id": "b", "type": "filter", "output": "second", "depends_on": ["a"] },
      { "id": "c", "type": "filter", "output": "${jobs.a.output}-${output}", "depends_on": ["b"] }
    ]));
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow).run(Value::Null).await;
    assert_eq!(state.output, Some(json!("first-second")));
  }

  #[tokio::test]
  async fn test_cycle_fails_run() {
    let workflow = workflow(json!([
      { "id": "start", "type": "filter" },
      { "id": "a", "type": "filter", "depends_on": ["start", "b"] },
      { "id": "b", "type": "filter", "depends_on": ["a"] }
    ]));
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow).run(Value::Null).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.output.is_none());
    assert!(state.error.unwrap().starts_with("invalid workflow 'wf'"));
  }

  #[tokio::test]
  async fn test_empty_workflow() {
    let registry = registry();
    let state = WorkflowRunner::new(&registry, &workflow(json!([]))).run(Value::Null).await;
    assert_eq!(state.output, Some(Value::Null));
  }

  #[test]
  fn test_run_state_serialization() {
    let state = WorkflowRunState::completed("r".into(), "wf".into(), json!({ "ok": true }));
    assert_eq!(
      serde_json::to_value(&state).unwrap(),
      json!({ "run_id": "r", "workflow_id": "wf", "status": "completed", "output": { "ok": true } })
    );
    assert_eq!(state.result(), json!({ "ok": true }));
  }
}
