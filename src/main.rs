use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mosaic_config::{find_default_compose_file, load_compose_files};
use mosaic_runtime::ComposeRuntime;

/// Mosaic - run workflows of components described in compose files
#[derive(Parser)]
#[command(name = "mosaic")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Compose file(s); later files override earlier ones
  #[arg(short = 'f', long = "file", global = true)]
  files: Vec<PathBuf>,

  /// Env file(s) used for `${env.X}` interpolation
  #[arg(long = "env-file", global = true)]
  env_files: Vec<PathBuf>,

  /// Extra variables as KEY=VALUE
  #[arg(short = 'e', long = "env", global = true, value_parser = parse_key_value)]
  env: Vec<(String, String)>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate the configuration and start every component
  Up {
    /// Return once components are started instead of waiting for Ctrl-C
    #[arg(short, long)]
    detach: bool,
  },

  /// Stop every component
  Down,

  /// Start every component and wait for Ctrl-C
  Start,

  /// Stop every component
  Stop,

  /// Run a workflow and print its output (or error) as JSON
  Run {
    /// Workflow id; the default workflow when omitted
    workflow: Option<String>,

    /// Workflow input as JSON
    #[arg(short, long)]
    input: Option<String>,
  },

  /// Print configuration diagnostics
  Validate,

  /// Print the input/output schema of workflows as JSON
  Schema {
    /// Only this workflow
    workflow: Option<String>,
  },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let env = load_env(&cli.env_files, &cli.env)?;
  let runtime = ComposeRuntime::new(load_config(&cli.files, &env)?);

  match cli.command {
    Commands::Up { detach } => {
      runtime.ensure_valid()?;
      runtime.start_services().await.context("failed to start components")?;
      if !detach {
        wait_for_shutdown(&runtime).await?;
      }
    }
    Commands::Start => {
      runtime.start_services().await.context("failed to start components")?;
      wait_for_shutdown(&runtime).await?;
    }
    Commands::Down | Commands::Stop => {
      runtime.stop_services().await.context("failed to stop components")?;
    }
    Commands::Run { workflow, input } => {
      let input = match input {
        Some(text) => serde_json::from_str(&text).map_err(|_| anyhow!("Invalid JSON provided for --input"))?,
        None => Value::Object(Default::default()),
      };
      let state = runtime.run_workflow(workflow.as_deref(), input).await?;
      println!("{}", serde_json::to_string_pretty(&state.result())?);
    }
    Commands::Validate => {
      let errors = runtime.validate();
      if errors.is_empty() {
        eprintln!("Configuration is valid");
      } else {
        for error in &errors {
          println!("{}", error);
        }
        bail!("{} configuration error(s)", errors.len());
      }
    }
    Commands::Schema { workflow } => {
      let schemas: Vec<_> = runtime
        .schema()
        .into_iter()
        .filter(|schema| workflow.as_deref().is_none_or(|id| schema.id == id))
        .collect();
      if let Some(id) = &workflow
        && schemas.is_empty()
      {
        bail!("Workflow not found: {}", id);
      }
      println!("{}", serde_json::to_string_pretty(&schemas)?);
    }
  }

  Ok(())
}

/// Logs go to stderr so stdout carries only results.
fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_ansi(std::io::stderr().is_terminal())
    .init();
}

/// Process env, overlaid by env files in order, then `--env` pairs.
fn load_env(env_files: &[PathBuf], pairs: &[(String, String)]) -> Result<HashMap<String, String>> {
  let mut env: HashMap<String, String> = std::env::vars().collect();

  for path in env_files {
    let entries = dotenvy::from_path_iter(path)
      .with_context(|| format!("failed to read env file: {}", path.display()))?;
    for entry in entries {
      let (key, value) = entry.with_context(|| format!("failed to parse env file: {}", path.display()))?;
      env.insert(key, value);
    }
  }

  env.extend(pairs.iter().cloned());
  Ok(env)
}

fn load_config(files: &[PathBuf], env: &HashMap<String, String>) -> Result<mosaic_config::ComposeConfig> {
  let files = if files.is_empty() {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    vec![find_default_compose_file(&cwd).ok_or_else(|| anyhow!("no compose file found in {}", cwd.display()))?]
  } else {
    files.to_vec()
  };

  load_compose_files(&files, env).context("failed to load compose configuration")
}

async fn wait_for_shutdown(runtime: &ComposeRuntime) -> Result<()> {
  info!("waiting for Ctrl-C");
  tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
  runtime.stop_services().await.context("failed to stop components")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_run_input_short_flag() {
    let cli = Cli::try_parse_from(["mosaic", "run", "greet", "-i", r#"{"name": "ada"}"#]).unwrap();
    match cli.command {
      Commands::Run { workflow, input } => {
        assert_eq!(workflow.as_deref(), Some("greet"));
        assert_eq!(input.as_deref(), Some(r#"{"name": "ada"}"#));
      }
      _ => panic!("expected run command"),
    }
  }

  #[test]
  fn test_parse_key_value() {
    assert_eq!(parse_key_value("A=b=c").unwrap(), ("A".to_string(), "b=c".to_string()));
    assert!(parse_key_value("missing").is_err());
  }
}
