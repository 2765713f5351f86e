use mosaic_config::GatewayConfig;
use serde_json::{Value, json};

/// A gateway exposing a local port, addressed in templates as
/// `${gateway:<port>...}`.
pub trait Gateway: Send + Sync {
  fn port(&self) -> u16;

  /// Runtime details of the gateway, such as its public address.
  fn context(&self) -> Value;
}

/// Finds the gateway bound to a local port.
pub trait GatewayLookup: Send + Sync {
  fn find_gateway_by_port(&self, port: u16) -> Option<&dyn Gateway>;
}

/// A gateway whose context comes straight from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredGateway {
  port: u16,
  context: Value,
}

impl ConfiguredGateway {
  pub fn new(config: &GatewayConfig) -> Self {
    Self {
      port: config.port,
      context: json!({
        "type": config.type_name(),
        "port": config.port,
        "public_url": config.public_url,
      }),
    }
  }
}

impl Gateway for ConfiguredGateway {
  fn port(&self) -> u16 {
    self.port
  }

  fn context(&self) -> Value {
    self.context.clone()
  }
}

/// Static gateway table built from the compose `gateways` section.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredGateways {
  gateways: Vec<ConfiguredGateway>,
}

impl ConfiguredGateways {
  pub fn new(configs: &[GatewayConfig]) -> Self {
    Self {
      gateways: configs.iter().map(ConfiguredGateway::new).collect(),
    }
  }
}

impl GatewayLookup for ConfiguredGateways {
  fn find_gateway_by_port(&self, port: u16) -> Option<&dyn Gateway> {
    self
      .gateways
      .iter()
      .find(|g| g.port == port)
      .map(|g| g as &dyn Gateway)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_find_gateway_by_port() {
    let configs: Vec<GatewayConfig> = serde_json::from_value(json!([
      { "type": "http-tunnel", "port": 8080, "public_url": "https://abc.example" },
      { "type": "ssh-tunnel", "port": 9000 }
    ]))
    .unwrap();
    let gateways = ConfiguredGateways::new(&configs);

    let gateway = gateways.find_gateway_by_port(8080).unwrap();
    assert_eq!(
      gateway.context(),
      json!({ "type": "http-tunnel", "port": 8080, "public_url": "https://abc.example" })
    );
    assert_eq!(
      gateways.find_gateway_by_port(9000).unwrap().context()["public_url"],
      Value::Null
    );
    assert!(gateways.find_gateway_by_port(1234).is_none());
  }
}
