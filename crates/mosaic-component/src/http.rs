use std::sync::Arc;

use async_trait::async_trait;
use mosaic_config::{ActionConfig, HttpClientAction, find_by_id};
use mosaic_template::stringify;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::component::{Component, ComponentLifecycle};
use crate::context::{ExecutionContext, RESULT_SOURCE};
use crate::error::ComponentError;
use crate::gateway::GatewayLookup;

/// Calls HTTP endpoints.
///
/// The result of a call is the response body, parsed as JSON when possible.
/// A non-success status fails the call.
pub struct HttpClientComponent {
  id: String,
  base_url: Option<String>,
  headers: Map<String, Value>,
  actions: Vec<ActionConfig<HttpClientAction>>,
  client: Client,
  gateways: Option<Arc<dyn GatewayLookup>>,
  lifecycle: ComponentLifecycle,
}

impl HttpClientComponent {
  pub fn new(
    id: impl Into<String>,
    base_url: Option<String>,
    headers: Map<String, Value>,
    actions: Vec<ActionConfig<HttpClientAction>>,
  ) -> Self {
    Self {
      id: id.into(),
      base_url,
      headers,
      actions,
      client: Client::new(),
      gateways: None,
      lifecycle: ComponentLifecycle::new(),
    }
  }

  pub fn with_gateways(mut self, gateways: Arc<dyn GatewayLookup>) -> Self {
    self.gateways = Some(gateways);
    self
  }

  /// `endpoint` as is, or `path` joined onto the base URL.
  fn url(&self, action: &HttpClientAction) -> Result<String, ComponentError> {
    if let Some(endpoint) = &action.endpoint {
      return Ok(endpoint.clone());
    }
    match (&self.base_url, &action.path) {
      (Some(base), Some(path)) => Ok(join_url(base, path)),
      (Some(base), None) => Ok(base.clone()),
      (None, _) => Err(ComponentError::Execution(format!(
        "Action in component '{}' has no endpoint and the component has no base_url",
        self.id
      ))),
    }
  }

  async fn send(&self, action: &HttpClientAction, ctx: &ExecutionContext) -> Result<Value, ComponentError> {
    let url = stringify(&ctx.render(&Value::String(self.url(action)?), true).await?);
    let method = parse_method(&action.method)?;

    let mut headers = self.headers.clone();
    headers.extend(action.headers.clone());
    let headers = ctx.render(&Value::Object(headers), true).await?;
    let params = ctx.render(&Value::Object(action.params.clone()), true).await?;

    let mut request = self.client.request(method.clone(), &url);
    if let Value::Object(headers) = &headers {
      for (key, value) in headers {
        request = request.header(key.as_str(), stringify(value));
      }
    }
    if let Value::Object(params) = &params {
      let query: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), stringify(v))).collect();
      request = request.query(&query);
    }
    if let Some(body) = &action.body {
      request = request.json(&ctx.render(body, true).await?);
    }

    debug!(component_id = %self.id, %method, %url, "http_request_sent");
    let response = request.send().await?.error_for_status()?;
    let body = response.text().await?;

    // Try to parse body as JSON, fall back to string
    Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
  }
}

fn join_url(base: &str, path: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn parse_method(method: &str) -> Result<Method, ComponentError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    _ => Err(ComponentError::Execution(format!(
      "unsupported HTTP method: {}",
      method
    ))),
  }
}

#[async_trait]
impl Component for HttpClientComponent {
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

  #[instrument(name = "http_client_run", skip(self, input), fields(component_id = %self.id))]
  async fn run(&self, action_id: &str, call_id: &str, input: Value) -> Result<Value, ComponentError> {
    self.lifecycle.ensure_started(&self.id)?;
    let action = find_by_id(&self.actions, action_id).ok_or_else(|| ComponentError::ActionNotFound {
      component: self.id.clone(),
      action: action_id.to_string(),
    })?;

    let mut ctx = ExecutionContext::new(call_id, input).with_gateways(self.gateways.clone());
    let result = self.send(&action.spec, &ctx).await?;
    ctx.register_source(RESULT_SOURCE, result.clone());

    match &action.output {
      Some(output) => Ok(ctx.render(output, false).await?),
      None => Ok(result),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn component(base_url: Option<&str>, actions: Value) -> HttpClientComponent {
    let actions: Vec<ActionConfig<HttpClientAction>> = serde_json::from_value(actions).unwrap();
    HttpClientComponent::new("api", base_url.map(str::to_string), Map::new(), actions)
  }

  #[test]
  fn test_url_from_base_and_path() {
    let api = component(Some("https://api.example.com/"), json!([{ "path": "/v1/items" }]));
    assert_eq!(api.url(&api.actions[0].spec).unwrap(), "https://api.example.com/v1/items");
  }

  #[test]
  fn test_endpoint_takes_precedence() {
    let api = component(
      Some("https://api.example.com"),
      json!([{ "endpoint": "https://other.example.com/x", "path": "/ignored" }]),
    );
    assert_eq!(api.url(&api.actions[0].spec).unwrap(), "https://other.example.com/x");
  }

  #[test]
  fn test_missing_base_url() {
    let api = component(None, json!([{ "path": "/v1/items" }]));
    assert!(matches!(api.url(&api.actions[0].spec), Err(ComponentError::Execution(_))));
  }

  #[test]
  fn test_parse_method() {
    assert_eq!(parse_method("get").unwrap(), Method::GET);
    assert!(parse_method("FETCH").is_err());
  }

  #[tokio::test]
  async fn test_invalid_method_fails_call() {
    let api = component(Some("http://127.0.0.1:9"), json!([{ "method": "FETCH" }]));
    api.start().await.unwrap();
    let err = api.run("__default__", "call-1", Value::Null).await.unwrap_err();
    assert_eq!(err.to_string(), "unsupported HTTP method: FETCH");
  }
}
