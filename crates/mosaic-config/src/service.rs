//! Controller, listener and gateway sections.
//!
//! These are parsed and validated but only gateway contexts are used at run
//! time (through the `gateway:<port>` template source).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DEFAULT_ID;

fn default_host() -> String {
  "0.0.0.0".to_string()
}

fn default_controller_port() -> u16 {
  8080
}

fn default_service_port() -> u16 {
  8090
}

fn default_method() -> String {
  "POST".to_string()
}

fn default_id() -> String {
  DEFAULT_ID.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerKind {
  #[default]
  HttpServer,
  McpServer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
  #[serde(rename = "type", default)]
  pub kind: ControllerKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_controller_port")]
  pub port: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_path: Option<String>,
  /// Concurrent workflow runs; 0 means unlimited.
  #[serde(default)]
  pub max_concurrent_count: usize,
}

impl Default for ControllerConfig {
  fn default() -> Self {
    Self {
      kind: ControllerKind::default(),
      name: None,
      host: default_host(),
      port: default_controller_port(),
      base_path: None,
      max_concurrent_count: 0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ListenerConfig {
  /// Incoming requests start workflows.
  HttpTrigger {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_service_port")]
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_path: Option<String>,
    #[serde(default)]
    triggers: Vec<HttpTriggerConfig>,
  },
  /// Incoming requests complete pending asynchronous calls.
  HttpCallback {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_service_port")]
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_path: Option<String>,
    #[serde(default)]
    callbacks: Vec<HttpCallbackConfig>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpTriggerConfig {
  pub path: String,
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default = "default_id")]
  pub workflow: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCallbackConfig {
  pub path: String,
  #[serde(default = "default_method")]
  pub method: String,
  pub identify_by: String,
  #[serde(default)]
  pub bulk: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(default)]
  pub success_when: Vec<String>,
  #[serde(default)]
  pub fail_when: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
  /// Local port the gateway exposes.
  #[serde(default = "default_service_port")]
  pub port: u16,
  /// Public address, when known ahead of time.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_url: Option<String>,
  #[serde(flatten)]
  pub kind: GatewayKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayKind {
  HttpTunnel {
    #[serde(default = "default_driver")]
    driver: String,
  },
  SshTunnel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_port: Option<u16>,
  },
}

fn default_driver() -> String {
  "ngrok".to_string()
}

impl GatewayConfig {
  pub fn type_name(&self) -> &'static str {
    match self.kind {
      GatewayKind::HttpTunnel { .. } => "http-tunnel",
      GatewayKind::SshTunnel { .. } => "ssh-tunnel",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_controller_defaults() {
    let controller: ControllerConfig = serde_json::from_value(json!({})).unwrap();
    assert_eq!(controller, ControllerConfig::default());
    assert_eq!(controller.port, 8080);
  }

  #[test]
  fn test_trigger_listener() {
    let listener: ListenerConfig = serde_json::from_value(json!({
      "type": "http-trigger",
      "port": 9000,
      "triggers": [{ "path": "/hook" }]
    }))
    .unwrap();
    match listener {
      ListenerConfig::HttpTrigger { port, triggers, .. } => {
        assert_eq!(port, 9000);
        assert_eq!(triggers[0].workflow, "__default__");
        assert_eq!(triggers[0].method, "POST");
      }
      other => panic!("unexpected listener: {:?}", other),
    }
  }

  #[test]
  fn test_gateway() {
    let gateway: GatewayConfig = serde_json::from_value(json!({
      "type": "http-tunnel",
      "port": 8081,
      "public_url": "https://abc.example"
    }))
    .unwrap();
    assert_eq!(gateway.type_name(), "http-tunnel");
    assert_eq!(gateway.port, 8081);
  }
}
