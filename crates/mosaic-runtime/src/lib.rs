//! Mosaic Runtime
//!
//! Runs workflows. A [`WorkflowRunner`] schedules a workflow's jobs as
//! their dependencies settle and runs ready jobs concurrently on the
//! calling task. Action jobs call components held by a
//! [`ComponentRegistry`], which creates each component on first use and
//! shares it between runs.
//!
//! Routing jobs (`if`, `switch`) select which of their targets run; the
//! others are skipped, along with jobs whose dependencies were all
//! skipped. The first failing job ends the run and its message becomes the
//! run's `error`.
//!
//! [`ComposeRuntime`] ties a configuration, its registry, validation and
//! schema extraction together.

mod compose;
mod condition;
mod error;
mod job;
mod registry;
mod runner;
mod wait;
mod workflow_component;

pub use compose::ComposeRuntime;
pub use error::RuntimeError;
pub use job::{JOBS_SOURCE, JobOutcome, OUTPUT_SOURCE, run_job};
pub use registry::{ComponentHandle, ComponentRegistry};
pub use runner::{RunStatus, WorkflowRunState, WorkflowRunner};
pub use workflow_component::WorkflowComponent;
