use thiserror::Error;

/// Structural problems that make a workflow impossible to schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  #[error("duplicate job id '{0}'")]
  DuplicateJob(String),

  #[error("job '{job}' depends on unknown job '{dependency}'")]
  UnknownDependency { job: String, dependency: String },

  #[error("no entry job found (all jobs have depends_on)")]
  NoEntryJobs,

  #[error("dependency cycle detected involving job '{0}'")]
  CycleDetected(String),
}
