//! Execution of a single job against its own context.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use mosaic_component::{ExecutionContext, RESULT_SOURCE};
use mosaic_config::{ActionJob, DelayJob, IfJob, JobConfig, JobKind, SwitchJob, WaitJob, WaitMode};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::condition;
use crate::error::RuntimeError;
use crate::registry::ComponentRegistry;
use crate::wait;

/// Source holding the output of the job's upstream job, and the raw result
/// of an action job once it has run.
pub const OUTPUT_SOURCE: &str = "output";

/// Source mapping completed job ids to `{ "output": ... }`.
pub const JOBS_SOURCE: &str = "jobs";

/// What a finished job hands to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
  pub output: Value,
  /// Targets selected by a routing job; `None` for other jobs.
  pub routes: Option<Vec<String>>,
}

impl JobOutcome {
  fn output(output: Value) -> Self {
    Self { output, routes: None }
  }

  fn routed(output: Value, routes: Vec<String>) -> Self {
    Self {
      output,
      routes: Some(routes),
    }
  }
}

/// Run one job. `ctx` carries the workflow input and the job's upstream
/// sources.
#[instrument(name = "job_run", skip(job, registry, ctx), fields(job_id = %job.id, job_type = job.type_name()))]
pub async fn run_job(
  job: &JobConfig,
  registry: &ComponentRegistry,
  mut ctx: ExecutionContext,
) -> Result<JobOutcome, RuntimeError> {
  match &job.kind {
    JobKind::Action(action) => {
      let result = run_action(job, action, registry, &ctx).await?;
      ctx.register_source(OUTPUT_SOURCE, result.clone());
      ctx.register_source(RESULT_SOURCE, result.clone());
      let output = match &job.output {
        Some(template) => ctx.render(template, false).await?,
        None => result,
      };
      Ok(JobOutcome::output(output))
    }
    JobKind::Delay(delay) => {
      run_delay(job, delay, &ctx).await?;
      Ok(JobOutcome::output(pass_through(job, &ctx, false).await?))
    }
    JobKind::Wait(wait) => {
      run_wait(job, wait, &ctx).await?;
      Ok(JobOutcome::output(pass_through(job, &ctx, false).await?))
    }
    JobKind::Filter {} => Ok(JobOutcome::output(pass_through(job, &ctx, true).await?)),
    JobKind::If(branch) => {
      let routes = route_if(job, branch, &ctx).await?;
      Ok(JobOutcome::routed(pass_through(job, &ctx, false).await?, routes))
    }
    JobKind::Switch(switch) => {
      let routes = route_switch(switch, &ctx).await?;
      Ok(JobOutcome::routed(pass_through(job, &ctx, false).await?, routes))
    }
  }
}

/// The rendered `output` of a control job, else its upstream output.
async fn pass_through(job: &JobConfig, ctx: &ExecutionContext, ignore_files: bool) -> Result<Value, RuntimeError> {
  match &job.output {
    Some(template) => Ok(ctx.render(template, ignore_files).await?),
    None => Ok(ctx.source(OUTPUT_SOURCE).cloned().unwrap_or(Value::Null)),
  }
}

async fn run_action(
  job: &JobConfig,
  action: &ActionJob,
  registry: &ComponentRegistry,
  ctx: &ExecutionContext,
) -> Result<Value, RuntimeError> {
  let component = registry.resolve(job)?;
  component.ensure_started().await?;

  let input = match action.input_template() {
    Some(template) => ctx.render(template, false).await?,
    None => ctx.input().clone(),
  };
  let count = repeat_count(job, action, ctx).await?;

  let mut calls: FuturesUnordered<_> = (0..count)
    .map(|_| {
      let call_id = Uuid::new_v4().to_string();
      let input = input.clone();
      let component = &component;
      async move {
        debug!(component_id = %component.id(), action_id = %action.action, %call_id, "action_called");
        component.run(&action.action, &call_id, input).await
      }
    })
    .collect();

  // Arrival order; the first failure drops the remaining calls.
  let mut results = Vec::with_capacity(count);
  while let Some(result) = calls.next().await {
    results.push(result?);
  }

  Ok(match results.len() {
    1 => results.pop().unwrap_or(Value::Null),
    _ => Value::Array(results),
  })
}

/// Rendered fan-out count; unset and zero both mean one call.
async fn repeat_count(job: &JobConfig, action: &ActionJob, ctx: &ExecutionContext) -> Result<usize, RuntimeError> {
  let Some(repeats) = &action.repeats else {
    return Ok(1);
  };
  let count = match ctx.render(repeats, true).await? {
    Value::Null => Some(0),
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse::<u64>().ok(),
    _ => None,
  };
  match count.and_then(|n| usize::try_from(n).ok()) {
    Some(0) => Ok(1),
    Some(n) => Ok(n),
    None => Err(RuntimeError::InvalidJob {
      job_id: job.id.clone(),
      message: format!("invalid repeats: {}", repeats),
    }),
  }
}

async fn run_delay(job: &JobConfig, delay: &DelayJob, ctx: &ExecutionContext) -> Result<(), RuntimeError> {
  let rendered = ctx.render(&delay.duration, true).await?;
  let duration = mosaic_config::parse_duration(&rendered).ok_or_else(|| RuntimeError::InvalidJob {
    job_id: job.id.clone(),
    message: format!("invalid duration: {}", rendered),
  })?;
  tokio::time::sleep(duration).await;
  Ok(())
}

async fn run_wait(job: &JobConfig, config: &WaitJob, ctx: &ExecutionContext) -> Result<(), RuntimeError> {
  let duration = match config.mode {
    WaitMode::TimeInterval => {
      let rendered = render_optional(config.duration.as_ref(), ctx).await?;
      wait::interval(rendered.as_ref())
    }
    WaitMode::SpecificTime => {
      let time = render_optional(config.time.as_ref(), ctx).await?.unwrap_or(Value::Null);
      let timezone = render_optional(config.timezone.as_ref(), ctx).await?;
      wait::until(&time, timezone.as_ref(), chrono::Utc::now()).map_err(|message| RuntimeError::InvalidJob {
        job_id: job.id.clone(),
        message,
      })?
    }
  };

  if !duration.is_zero() {
    debug!(job_id = %job.id, ?duration, "job_waiting");
    tokio::time::sleep(duration).await;
  }
  Ok(())
}

async fn render_optional(template: Option<&Value>, ctx: &ExecutionContext) -> Result<Option<Value>, RuntimeError> {
  match template {
    Some(template) => Ok(Some(ctx.render(template, true).await?)),
    None => Ok(None),
  }
}

/// The branch of the first condition that names one for its outcome.
async fn route_if(job: &JobConfig, branch: &IfJob, ctx: &ExecutionContext) -> Result<Vec<String>, RuntimeError> {
  for cond in &branch.conditions {
    let input = ctx.render(&cond.input, true).await?;
    let value = ctx.render(&cond.value, true).await?;
    let holds = condition::evaluate(cond.operator, &input, &value).map_err(|e| RuntimeError::InvalidJob {
      job_id: job.id.clone(),
      message: e.to_string(),
    })?;

    let target = if holds { &cond.if_true } else { &cond.if_false };
    if let Some(target) = target {
      return Ok(vec![target.clone()]);
    }
  }
  Ok(Vec::new())
}

/// `then` of the first case equal to the input, else `otherwise`.
async fn route_switch(switch: &SwitchJob, ctx: &ExecutionContext) -> Result<Vec<String>, RuntimeError> {
  let input = ctx.render(&switch.input, true).await?;
  for case in &switch.cases {
    if condition::equals(&ctx.render(&case.value, true).await?, &input) {
      return Ok(case.then.iter().cloned().collect());
    }
  }
  Ok(switch.otherwise.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::Arc;

  fn registry() -> Arc<ComponentRegistry> {
    ComponentRegistry::new(Arc::new(serde_json::from_value(json!({})).unwrap()))
  }

  fn job(value: Value) -> JobConfig {
    serde_json::from_value(value).unwrap()
  }

  fn context(output: Value) -> ExecutionContext {
    let mut ctx = ExecutionContext::new("run-1", json!({ "score": 0.8, "kind": "b" }));
    ctx.register_source(OUTPUT_SOURCE, output);
    ctx
  }

  #[tokio::test]
  async fn test_if_routes_first_decided_branch() {
    let job = job(json!({
      "id": "check",
      "type": "if",
      "conditions": [
        { "operator": "lt", "input": "${input.score}", "value": 0.5, "if_true": "low" },
        { "operator": "gte", "input": "${input.score}", "value": 0.5, "if_true": "high", "if_false": "low" }
      ]
    }));
    let outcome = run_job(&job, &registry(), context(json!("upstream"))).await.unwrap();
    assert_eq!(outcome.routes, Some(vec!["high".to_string()]));
    assert_eq!(outcome.output, json!("upstream"));
  }

  #[tokio::test]
  async fn test_if_without_decision_routes_nothing() {
    let job = job(json!({
      "id": "check",
      "type": "if",
      "conditions": [{ "operator": "eq", "input": "${input.kind}", "value": "a", "if_true": "a" }]
    }));
    let outcome = run_job(&job, &registry(), context(Value::Null)).await.unwrap();
    assert_eq!(outcome.routes, Some(vec![]));
  }

  #[tokio::test]
  async fn test_switch_matches_case_or_otherwise() {
    let switch = job(json!({
      "id": "route",
      "type": "switch",
      "input": "${input.kind}",
      "cases": [{ "value": "a", "then": "job-a" }, { "value": "b", "then": "job-b" }],
      "otherwise": "fallback"
    }));
    let outcome = run_job(&switch, &registry(), context(Value::Null)).await.unwrap();
    assert_eq!(outcome.routes, Some(vec!["job-b".to_string()]));

    let mut ctx = ExecutionContext::new("run-1", json!({ "kind": "z" }));
    ctx.register_source(OUTPUT_SOURCE, Value::Null);
    let outcome = run_job(&switch, &registry(), ctx).await.unwrap();
    assert_eq!(outcome.routes, Some(vec!["fallback".to_string()]));
  }

  #[tokio::test]
  async fn test_filter_renders_output() {
    let job = job(json!({ "id": "pick", "type": "filter", "output": { "first": "${output[0]}" } }));
    let outcome = run_job(&job, &registry(), context(json!(["x", "y"]))).await.unwrap();
    assert_eq!(outcome.output, json!({ "first": "x" }));
    assert_eq!(outcome.routes, None);
  }

  #[tokio::test]
  async fn test_delay_passes_output_through() {
    let job = job(json!({ "id": "pause", "type": "delay", "duration": "10ms" }));
    let outcome = run_job(&job, &registry(), context(json!({ "n": 1 }))).await.unwrap();
    assert_eq!(outcome.output, json!({ "n": 1 }));
  }

  #[tokio::test]
  async fn test_delay_invalid_duration() {
    let job = job(json!({ "id": "pause", "type": "delay", "duration": "soon" }));
    let err = run_job(&job, &registry(), context(Value::Null)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidJob { .. }));
  }

  #[tokio::test]
  async fn test_wait_for_past_time_returns() {
    let job = job(json!({
      "id": "later",
      "type": "wait",
      "mode": "specific-time",
      "time": "2000-01-01 00:00",
      "timezone": "UTC"
    }));
    let outcome = run_job(&job, &registry(), context(json!("kept"))).await.unwrap();
    assert_eq!(outcome.output, json!("kept"));
  }

  #[tokio::test]
  async fn test_invalid_repeats() {
    let registry = ComponentRegistry::new(Arc::new(
      serde_json::from_value(json!({
        "components": [{ "id": "sh", "type": "shell", "actions": [{ "command": "true" }] }]
      }))
      .unwrap(),
    ));
    let job = job(json!({ "id": "many", "type": "action", "component": "sh", "repeats": "lots" }));
    let err = run_job(&job, &registry, context(Value::Null)).await.unwrap_err();
    assert_eq!(err.to_string(), "invalid job 'many': invalid repeats: \"lots\"");
  }
}
