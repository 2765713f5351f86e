//! Mosaic Config
//!
//! Serializable compose configuration: components with their actions,
//! workflows made of jobs, and the listener/gateway/controller sections.
//!
//! Compose files are YAML or JSON. Several files merge in order, `${env.X}`
//! expressions are interpolated, and shorthand forms are expanded by a
//! normalization pass before the typed structures are built, so the types
//! here always see the canonical list-based shape.

mod component;
mod compose;
mod duration;
mod env;
mod error;
mod loader;
mod normalize;
mod service;
mod workflow;

pub use component::{
  ActionConfig, ActionView, ComponentConfig, ComponentKind, HttpClientAction, ShellAction,
  WorkflowAction,
};
pub use compose::ComposeConfig;
pub use duration::{parse_duration, parse_duration_str};
pub use env::interpolate_env;
pub use error::ConfigError;
pub use loader::{
  DEFAULT_COMPOSE_FILES, find_default_compose_file, from_document, load_compose_files, merge,
  parse_compose_str,
};
pub use normalize::normalize_compose;
pub use service::{
  ControllerConfig, ControllerKind, GatewayConfig, GatewayKind, HttpCallbackConfig,
  HttpTriggerConfig, ListenerConfig,
};
pub use workflow::{
  ActionJob, ComponentRef, DelayJob, IfCondition, IfJob, IfOperator, JobConfig, JobKind,
  SwitchCase, SwitchJob, WaitJob, WaitMode, WorkflowConfig,
};

/// Placeholder id that resolves to the default-marked (or only) entry.
pub const DEFAULT_ID: &str = "__default__";

/// Entries addressable by id with `__default__` resolution.
pub trait Identified {
  fn id(&self) -> &str;
  fn is_default(&self) -> bool;
}

/// Find an entry by id. `__default__` resolves to the entry marked
/// `default: true`, else the only entry, else an entry literally named
/// `__default__`.
pub fn find_by_id<'a, T: Identified>(items: &'a [T], id: &str) -> Option<&'a T> {
  if id == DEFAULT_ID {
    if let Some(item) = items.iter().find(|item| item.is_default()) {
      return Some(item);
    }
    if items.len() == 1 {
      return items.first();
    }
  }
  items.iter().find(|item| item.id() == id)
}
