//! Mosaic Schema
//!
//! Determines what a workflow takes and produces without running it, by
//! scanning the template expressions reachable from its jobs.
//!
//! Input variables are the `${input...}` references of each job, inherited
//! from the component action when the job passes its input straight
//! through. Output variables come from terminal jobs only; a fan-out job
//! contributes a [`WorkflowVariableGroup`] carrying its repeat count.

mod resolver;
mod schema;
mod variable;

pub use resolver::{InputVariableResolver, OutputVariableResolver};
pub use schema::{WorkflowSchema, create_workflow_schema};
pub use variable::{OutputVariable, WorkflowVariable, WorkflowVariableGroup};
