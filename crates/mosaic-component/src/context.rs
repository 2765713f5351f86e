use std::collections::HashMap;
use std::sync::Arc;

use mosaic_template::{RenderError, SourceError, SourceResolver, VariableRenderer};
use serde_json::{Value, json};

use crate::gateway::GatewayLookup;

/// Source under which a component registers its raw action result.
pub const RESULT_SOURCE: &str = "result";

const INPUT_SOURCE: &str = "input";
const CONTEXT_SOURCE: &str = "context";
const GATEWAY_PREFIX: &str = "gateway:";

/// Sources visible to the templates of one run or action call.
///
/// Resolution order: registered sources, then `input`, `context` and
/// `gateway:<port>`. Contexts are never shared between concurrent runs.
pub struct ExecutionContext {
  run_id: String,
  input: Value,
  context: Value,
  sources: HashMap<String, Value>,
  gateways: Option<Arc<dyn GatewayLookup>>,
}

impl ExecutionContext {
  pub fn new(run_id: impl Into<String>, input: Value) -> Self {
    let run_id = run_id.into();
    Self {
      context: json!({ "run_id": run_id }),
      run_id,
      input,
      sources: HashMap::new(),
      gateways: None,
    }
  }

  pub fn with_gateways(mut self, gateways: Option<Arc<dyn GatewayLookup>>) -> Self {
    self.gateways = gateways;
    self
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn input(&self) -> &Value {
    &self.input
  }

  /// Register (or replace) a named source. A source registered once per
  /// fan-out call is a list addressed as `${key[n]}`.
  pub fn register_source(&mut self, key: impl Into<String>, value: Value) {
    self.sources.insert(key.into(), value);
  }

  pub fn source(&self, key: &str) -> Option<&Value> {
    self.sources.get(key)
  }

  /// Render `data` against this context's sources.
  pub async fn render(&self, data: &Value, ignore_files: bool) -> Result<Value, RenderError> {
    VariableRenderer::new(self).render(data, ignore_files).await
  }

  fn resolve_gateway(&self, key: &str) -> Value {
    let port = key
      .strip_prefix(GATEWAY_PREFIX)
      .and_then(|port| port.trim().parse::<u16>().ok());
    match (port, &self.gateways) {
      (Some(port), Some(gateways)) => gateways
        .find_gateway_by_port(port)
        .map(|gateway| gateway.context())
        .unwrap_or(Value::Null),
      _ => Value::Null,
    }
  }
}

impl SourceResolver for ExecutionContext {
  fn resolve(&self, key: &str, index: Option<usize>) -> Result<Value, SourceError> {
    if let Some(source) = self.sources.get(key) {
      return match index {
        None => Ok(source.clone()),
        Some(index) => source
          .as_array()
          .and_then(|items| items.get(index))
          .cloned()
          .ok_or_else(|| SourceError::IndexOutOfRange {
            key: key.to_string(),
            index,
          }),
      };
    }

    match key {
      INPUT_SOURCE => Ok(self.input.clone()),
      CONTEXT_SOURCE => Ok(self.context.clone()),
      _ if key.starts_with(GATEWAY_PREFIX) => Ok(self.resolve_gateway(key)),
      _ => Err(SourceError::UnknownSource(key.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gateway::ConfiguredGateways;
  use mosaic_config::GatewayConfig;

  fn context() -> ExecutionContext {
    let gateways: Vec<GatewayConfig> = serde_json::from_value(json!([
      { "type": "http-tunnel", "port": 8080, "public_url": "https://abc.example" }
    ]))
    .unwrap();
    ExecutionContext::new("run-1", json!({ "name": "mosaic" }))
      .with_gateways(Some(Arc::new(ConfiguredGateways::new(&gateways))))
  }

  #[test]
  fn test_resolve_builtin_sources() {
    let ctx = context();
    assert_eq!(ctx.resolve("input", None).unwrap(), json!({ "name": "mosaic" }));
    assert_eq!(ctx.resolve("context", None).unwrap(), json!({ "run_id": "run-1" }));
    assert_eq!(
      ctx.resolve("unknown", None),
      Err(SourceError::UnknownSource("unknown".to_string()))
    );
  }

  #[test]
  fn test_registered_source_shadows_input() {
    let mut ctx = context();
    ctx.register_source("input", json!("shadowed"));
    assert_eq!(ctx.resolve("input", None).unwrap(), json!("shadowed"));
  }

  #[test]
  fn test_indexed_source() {
    let mut ctx = context();
    ctx.register_source("result", json!([{ "n": 1 }, { "n": 2 }]));
    assert_eq!(ctx.resolve("result", Some(1)).unwrap(), json!({ "n": 2 }));
    assert_eq!(
      ctx.resolve("result", Some(5)),
      Err(SourceError::IndexOutOfRange {
        key: "result".to_string(),
        index: 5,
      })
    );
  }

  #[test]
  fn test_gateway_source() {
    let ctx = context();
    assert_eq!(
      ctx.resolve("gateway:8080", None).unwrap()["public_url"],
      json!("https://abc.example")
    );
    assert_eq!(ctx.resolve("gateway:9999", None).unwrap(), Value::Null);
    assert_eq!(ctx.resolve("gateway:abc", None).unwrap(), Value::Null);
  }

  #[tokio::test]
  async fn test_render_with_context() {
    let mut ctx = context();
    ctx.register_source("result", json!({ "stdout": "42" }));
    let rendered = ctx
      .render(
        &json!({
          "value": "${result.stdout as integer}",
          "run": "${context.run_id}",
          "url": "${gateway:8080.public_url}/hook",
          "missing": "${result.nope | none}"
        }),
        false,
      )
      .await
      .unwrap();
    assert_eq!(
      rendered,
      json!({
        "value": 42,
        "run": "run-1",
        "url": "https://abc.example/hook",
        "missing": "none"
      })
    );
  }
}
