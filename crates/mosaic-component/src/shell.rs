use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use mosaic_config::{ActionConfig, ShellAction, find_by_id, parse_duration};
use mosaic_template::stringify;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::component::{Component, ComponentLifecycle};
use crate::context::{ExecutionContext, RESULT_SOURCE};
use crate::error::ComponentError;
use crate::gateway::GatewayLookup;

/// Runs local commands.
///
/// The result of a call is `{ stdout, stderr, exit_code }` with both streams
/// trimmed. A non-zero exit code is not an error.
pub struct ShellComponent {
  id: String,
  base_dir: Option<PathBuf>,
  env: Map<String, Value>,
  actions: Vec<ActionConfig<ShellAction>>,
  gateways: Option<Arc<dyn GatewayLookup>>,
  lifecycle: ComponentLifecycle,
}

impl ShellComponent {
  pub fn new(
    id: impl Into<String>,
    base_dir: Option<String>,
    env: Map<String, Value>,
    actions: Vec<ActionConfig<ShellAction>>,
  ) -> Self {
    Self {
      id: id.into(),
      base_dir: base_dir.map(PathBuf::from),
      env,
      actions,
      gateways: None,
      lifecycle: ComponentLifecycle::new(),
    }
  }

  pub fn with_gateways(mut self, gateways: Arc<dyn GatewayLookup>) -> Self {
    self.gateways = Some(gateways);
    self
  }

  /// Rendered argv: a string runs through `sh -c`, a list is used as is.
  async fn command(&self, action: &ShellAction, ctx: &ExecutionContext) -> Result<Vec<String>, ComponentError> {
    match ctx.render(&action.command, true).await? {
      Value::String(line) => Ok(vec!["sh".to_string(), "-c".to_string(), line]),
      Value::Array(parts) if !parts.is_empty() => Ok(parts.iter().map(stringify).collect()),
      other => Err(ComponentError::Execution(format!(
        "Invalid command for action in component '{}': {}",
        self.id, other
      ))),
    }
  }

  async fn working_dir(&self, action: &ShellAction, ctx: &ExecutionContext) -> Result<Option<PathBuf>, ComponentError> {
    let Some(dir) = &action.working_dir else {
      return Ok(self.base_dir.clone());
    };
    let dir = PathBuf::from(stringify(&ctx.render(&Value::String(dir.clone()), true).await?));
    Ok(Some(match &self.base_dir {
      Some(base) => base.join(dir),
      None => dir,
    }))
  }

  /// Component env overlaid with the action env, rendered.
  async fn env(&self, action: &ShellAction, ctx: &ExecutionContext) -> Result<Vec<(String, String)>, ComponentError> {
    let mut merged = self.env.clone();
    merged.extend(action.env.clone());
    let rendered = ctx.render(&Value::Object(merged), true).await?;

    Ok(match rendered {
      Value::Object(map) => map.into_iter().map(|(k, v)| (k, stringify(&v))).collect(),
      _ => Vec::new(),
    })
  }

  async fn execute(&self, action: &ShellAction, ctx: &ExecutionContext) -> Result<Value, ComponentError> {
    let argv = self.command(action, ctx).await?;
    let working_dir = self.working_dir(action, ctx).await?;
    let env = self.env(action, ctx).await?;
    let timeout = match &action.timeout {
      Some(timeout) => parse_duration(&ctx.render(timeout, true).await?),
      None => None,
    };

    let mut command = Command::new(&argv[0]);
    command
      .args(&argv[1..])
      .envs(env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &working_dir {
      command.current_dir(dir);
    }

    debug!(component_id = %self.id, command = ?argv, "shell_command_spawned");
    let child = command.spawn()?;

    let output = match timeout {
      Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => output?,
        // Dropping the child future kills the process.
        Err(_) => {
          return Err(ComponentError::Timeout {
            command: argv.join(" "),
          });
        }
      },
      None => child.wait_with_output().await?,
    };

    Ok(json!({
      "stdout": String::from_utf8_lossy(&output.stdout).trim(),
      "stderr": String::from_utf8_lossy(&output.stderr).trim(),
      "exit_code": output.status.code(),
    }))
  }
}

#[async_trait]
impl Component for ShellComponent {
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

  #[instrument(name = "shell_run", skip(self, input), fields(component_id = %self.id))]
  async fn run(&self, action_id: &str, call_id: &str, input: Value) -> Result<Value, ComponentError> {
    self.lifecycle.ensure_started(&self.id)?;
    let action = find_by_id(&self.actions, action_id).ok_or_else(|| ComponentError::ActionNotFound {
      component: self.id.clone(),
      action: action_id.to_string(),
    })?;

    let mut ctx = ExecutionContext::new(call_id, input).with_gateways(self.gateways.clone());
    let result = self.execute(&action.spec, &ctx).await?;
    ctx.register_source(RESULT_SOURCE, result.clone());

    match &action.output {
      Some(output) => Ok(ctx.render(output, true).await?),
      None => Ok(result),
    }
  }
}
