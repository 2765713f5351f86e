//! Mosaic Component
//!
//! The contract between the workflow engine and the things it runs. A
//! [`Component`] exposes named actions and is started lazily by the engine;
//! each action call gets its own [`ExecutionContext`] holding the call input
//! and the sources its templates can address.

mod component;
mod context;
mod error;
mod gateway;
mod http;
mod shell;

pub use component::{Component, ComponentLifecycle};
pub use context::{ExecutionContext, RESULT_SOURCE};
pub use error::ComponentError;
pub use gateway::{ConfiguredGateway, ConfiguredGateways, Gateway, GatewayLookup};
pub use http::HttpClientComponent;
pub use shell::ShellComponent;
