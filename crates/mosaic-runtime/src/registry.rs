//! Component instances shared by the runs of one compose configuration.
//!
//! Instances are created on first use from their configuration and cached
//! by component id, so concurrent runs referencing the same id share one
//! instance. Each registry is independent; nothing is process-global.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use mosaic_component::{
  Component, ComponentError, ConfiguredGateways, GatewayLookup, HttpClientComponent, ShellComponent,
};
use mosaic_config::{ComponentConfig, ComponentKind, ComponentRef, ComposeConfig, JobConfig};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::error::RuntimeError;
use crate::workflow_component::WorkflowComponent;

const PLACEHOLDER_COMPONENT_ID: &str = "__component__";

/// A cached component plus its concurrency limit.
#[derive(Clone)]
pub struct ComponentHandle {
  component: Arc<dyn Component>,
  permits: Option<Arc<Semaphore>>,
}

impl ComponentHandle {
  fn new(component: Arc<dyn Component>, max_concurrent_count: usize) -> Self {
    let permits = (max_concurrent_count > 0).then(|| Arc::new(Semaphore::new(max_concurrent_count)));
    Self { component, permits }
  }

  pub fn id(&self) -> &str {
    self.component.id()
  }

  pub fn component(&self) -> &Arc<dyn Component> {
    &self.component
  }

  /// Start the component unless it already runs.
  pub async fn ensure_started(&self) -> Result<(), ComponentError> {
    if !self.component.started() {
      self.component.start().await?;
    }
    Ok(())
  }

  /// Run an action, waiting for a free slot when the component is limited.
  pub async fn run(&self, action_id: &str, call_id: &str, input: Value) -> Result<Value, ComponentError> {
    let _permit = match &self.permits {
      Some(permits) => Some(
        permits
          .acquire()
          .await
          .map_err(|_| ComponentError::NotStarted(self.id().to_string()))?,
      ),
      None => None,
    };
    self.component.run(action_id, call_id, input).await
  }
}

pub struct ComponentRegistry {
  config: Arc<ComposeConfig>,
  gateways: Arc<dyn GatewayLookup>,
  instances: RwLock<HashMap<String, ComponentHandle>>,
  this: Weak<ComponentRegistry>,
}

impl ComponentRegistry {
  /// Registry whose gateway contexts come from the config's `gateways`.
  pub fn new(config: Arc<ComposeConfig>) -> Arc<Self> {
    let gateways = Arc::new(ConfiguredGateways::new(&config.gateways));
    Self::with_gateways(config, gateways)
  }

  pub fn with_gateways(config: Arc<ComposeConfig>, gateways: Arc<dyn GatewayLookup>) -> Arc<Self> {
    Arc::new_cyclic(|this| Self {
      config,
      gateways,
      instances: RwLock::new(HashMap::new()),
      this: this.clone(),
    })
  }

  pub fn config(&self) -> &ComposeConfig {
    &self.config
  }

  pub fn gateways(&self) -> Arc<dyn GatewayLookup> {
    self.gateways.clone()
  }

  /// Seed an instance under `id`, replacing any cached one.
  ///
  /// The declared component with that id, if any, sets the concurrency
  /// limit; otherwise calls are unlimited.
  pub fn insert(&self, id: impl Into<String>, component: Arc<dyn Component>) {
    let id = id.into();
    let limit = self
      .config
      .components
      .iter()
      .find(|c| c.id == id)
      .map(|c| c.max_concurrent_count)
      .unwrap_or(0);
    self.write().insert(id, ComponentHandle::new(component, limit));
  }

  pub fn get(&self, id: &str) -> Option<ComponentHandle> {
    self
      .instances
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(id)
      .cloned()
  }

  /// The instance an action job runs on, created if needed.
  pub fn resolve(&self, job: &JobConfig) -> Result<ComponentHandle, RuntimeError> {
    let action = job.as_action().ok_or_else(|| RuntimeError::InvalidJob {
      job_id: job.id.clone(),
      message: "not an action job".to_string(),
    })?;

    match &action.component {
      ComponentRef::Id(id) => {
        let declared = self.config.find_component(id);
        let key = declared.map(|c| c.id.as_str()).unwrap_or(id);
        if let Some(handle) = self.get(key) {
          return Ok(handle);
        }
        match declared {
          Some(config) => Ok(self.get_or_create(key, config)),
          None => Err(RuntimeError::ComponentNotFound(id.clone())),
        }
      }
      ComponentRef::Inline(config) => {
        let key = if config.id == PLACEHOLDER_COMPONENT_ID {
          job.id.as_str()
        } else {
          config.id.as_str()
        };
        Ok(self.get_or_create(key, config))
      }
    }
  }

  fn get_or_create(&self, key: &str, config: &ComponentConfig) -> ComponentHandle {
    let mut instances = self.write();
    instances
      .entry(key.to_string())
      .or_insert_with(|| {
        debug!(component_id = %key, component_type = config.type_name(), "component_created");
        ComponentHandle::new(self.create(key, config), config.max_concurrent_count)
      })
      .clone()
  }

  fn create(&self, id: &str, config: &ComponentConfig) -> Arc<dyn Component> {
    match &config.kind {
      ComponentKind::Shell {
        base_dir,
        env,
        actions,
      } => Arc::new(
        ShellComponent::new(id, base_dir.clone(), env.clone(), actions.clone())
          .with_gateways(self.gateways.clone()),
      ),
      ComponentKind::HttpClient {
        base_url,
        headers,
        actions,
      } => Arc::new(
        HttpClientComponent::new(id, base_url.clone(), headers.clone(), actions.clone())
          .with_gateways(self.gateways.clone()),
      ),
      ComponentKind::Workflow { actions } => Arc::new(
        WorkflowComponent::new(id, actions.clone(), self.this.clone())
          .with_gateways(self.gateways.clone()),
      ),
    }
  }

  /// Create and start every declared component.
  pub async fn start_all(&self) -> Result<(), RuntimeError> {
    let handles: Vec<ComponentHandle> = self
      .config
      .components
      .iter()
      .map(|config| match self.get(&config.id) {
        Some(handle) => handle,
        None => self.get_or_create(&config.id, config),
      })
      .collect();

    for handle in handles {
      handle.ensure_started().await?;
    }
    Ok(())
  }

  /// Stop every started instance. All instances are attempted; the first
  /// failure is returned.
  pub async fn stop_all(&self) -> Result<(), RuntimeError> {
    let handles: Vec<ComponentHandle> = self
      .instances
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();

    let mut first_error = None;
    for handle in handles {
      if let Err(e) = handle.component.stop().await {
        error!(component_id = %handle.id(), error = %e, "component_stop_failed");
        first_error.get_or_insert(e);
      }
    }

    match first_error {
      Some(e) => Err(e.into()),
      None => Ok(()),
    }
  }

  fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ComponentHandle>> {
    self.instances.write().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn registry(value: Value) -> Arc<ComponentRegistry> {
    ComponentRegistry::new(Arc::new(serde_json::from_value(value).unwrap()))
  }

  fn job(value: Value) -> JobConfig {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_resolve_is_memoized() {
    let registry = registry(json!({
      "components": [{ "id": "sh", "type": "shell", "actions": [{ "command": "true" }] }]
    }));
    let by_id = registry.resolve(&job(json!({ "id": "a", "type": "action", "component": "sh" }))).unwrap();
    let by_default = registry.resolve(&job(json!({ "id": "b", "type": "action" }))).unwrap();

    assert_eq!(by_id.id(), "sh");
    assert!(Arc::ptr_eq(by_id.component(), by_default.component()));
  }

  #[test]
  fn test_resolve_unknown_component() {
    let registry = registry(json!({}));
    let err = registry
      .resolve(&job(json!({ "id": "a", "type": "action", "component": "ghost" })))
      .err()
      .unwrap();
    assert_eq!(err.to_string(), "Component not found: ghost");
  }

  #[test]
  fn test_inline_component_keyed_by_job() {
    let registry = registry(json!({}));
    let handle = registry
      .resolve(&job(json!({
        "id": "inline-job",
        "type": "action",
        "component": { "type": "shell", "actions": [{ "command": "true" }] }
      })))
      .unwrap();
    assert_eq!(handle.id(), "inline-job");
    assert!(registry.get("inline-job").is_some());
  }

  #[tokio::test]
  async fn test_start_and_stop_all() {
    let registry = registry(json!({
      "components": [
        { "id": "a", "type": "shell", "actions": [{ "command": "true" }] },
        { "id": "b", "type": "http-client", "base_url": "http://localhost" }
      ]
    }));

    registry.start_all().await.unwrap();
    assert!(registry.get("a").unwrap().component().started());
    assert!(registry.get("b").unwrap().component().started());

    registry.stop_all().await.unwrap();
    assert!(!registry.get("a").unwrap().component().started());
  }
}
