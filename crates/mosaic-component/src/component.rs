use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ComponentError;

/// An independently started unit exposing named actions.
///
/// One instance is shared by every run that references its id, so
/// implementations must be safe to call concurrently.
#[async_trait]
pub trait Component: Send + Sync {
  fn id(&self) -> &str;

  fn started(&self) -> bool;

  /// Start the component. Repeated calls are no-ops.
  async fn start(&self) -> Result<(), ComponentError>;

  /// Stop the component. Repeated calls are no-ops.
  async fn stop(&self) -> Result<(), ComponentError>;

  /// Run one action call with an already rendered input.
  async fn run(&self, action_id: &str, call_id: &str, input: Value) -> Result<Value, ComponentError>;
}

/// Start/stop bookkeeping shared by component implementations.
///
/// Transitions are serialized so concurrent `start` calls run the startup
/// routine once.
#[derive(Debug, Default)]
pub struct ComponentLifecycle {
  started: AtomicBool,
  transition: Mutex<()>,
}

impl ComponentLifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_started(&self) -> bool {
    self.started.load(Ordering::Acquire)
  }

  /// Run `serve` unless already started.
  pub async fn start<F, Fut>(&self, id: &str, serve: F) -> Result<(), ComponentError>
  where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<(), ComponentError>> + Send,
  {
    let _guard = self.transition.lock().await;
    if self.is_started() {
      return Ok(());
    }
    serve().await?;
    self.started.store(true, Ordering::Release);
    info!(component_id = %id, "component_started");
    Ok(())
  }

  /// Run `shutdown` if started.
  pub async fn stop<F, Fut>(&self, id: &str, shutdown: F) -> Result<(), ComponentError>
  where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<(), ComponentError>> + Send,
  {
    let _guard = self.transition.lock().await;
    if !self.is_started() {
      return Ok(());
    }
    shutdown().await?;
    self.started.store(false, Ordering::Release);
    info!(component_id = %id, "component_stopped");
    Ok(())
  }

  /// Fail with [`ComponentError::NotStarted`] unless started.
  pub fn ensure_started(&self, id: &str) -> Result<(), ComponentError> {
    if self.is_started() {
      Ok(())
    } else {
      Err(ComponentError::NotStarted(id.to_string()))
    }
  }
}
