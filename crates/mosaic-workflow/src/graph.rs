use std::collections::{HashMap, HashSet};

use mosaic_config::WorkflowConfig;

use crate::error::WorkflowError;

/// Job graph for traversal and analysis.
///
/// Edges point from a job to the jobs that depend on it. Dependencies on
/// ids outside the workflow are kept in `depends_on` (so validation can
/// report them) but never become edges.
#[derive(Debug, Clone)]
pub struct JobGraph {
  /// Job ids in declaration order, first occurrence only.
  jobs: Vec<String>,
  /// Job id -> ids listed in its `depends_on`.
  depends_on: HashMap<String, Vec<String>>,
  /// Job id -> known upstream jobs.
  dependencies: HashMap<String, Vec<String>>,
  /// Job id -> downstream jobs.
  dependents: HashMap<String, Vec<String>>,
  /// Routing target -> `if`/`switch` jobs that can select it.
  routers: HashMap<String, Vec<String>>,
  /// Jobs with an empty `depends_on`.
  entry_jobs: Vec<String>,
  /// Jobs no other job depends on.
  terminal_jobs: Vec<String>,
  duplicates: Vec<String>,
}

impl JobGraph {
  /// Build the graph of a workflow's jobs.
  pub fn new(workflow: &WorkflowConfig) -> Self {
    let mut jobs: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates = Vec::new();
    let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();

    for job in &workflow.jobs {
      if !seen.insert(job.id.as_str()) {
        duplicates.push(job.id.clone());
        continue;
      }
      jobs.push(job.id.clone());
      depends_on.insert(job.id.clone(), job.depends_on.clone());
    }

    let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all jobs
    for id in &jobs {
      dependencies.entry(id.clone()).or_default();
      dependents.entry(id.clone()).or_default();
    }

    for id in &jobs {
      for dep in &depends_on[id] {
        if dep == id || !seen.contains(dep.as_str()) {
          continue;
        }
        let upstream = dependencies.entry(id.clone()).or_default();
        if !upstream.contains(dep) {
          upstream.push(dep.clone());
          dependents.entry(dep.clone()).or_default().push(id.clone());
        }
      }
    }

    let mut routers: HashMap<String, Vec<String>> = HashMap::new();
    for job in &workflow.jobs {
      for target in job.routing_jobs() {
        if seen.contains(target) && target != job.id {
          routers
            .entry(target.to_string())
            .or_default()
            .push(job.id.clone());
        }
      }
    }

    let entry_jobs: Vec<String> = jobs
      .iter()
      .filter(|id| depends_on.get(*id).is_none_or(|deps| deps.is_empty()))
      .cloned()
      .collect();

    // Terminal: not listed in any other job's depends_on
    let terminal_jobs: Vec<String> = jobs
      .iter()
      .filter(|id| {
        !workflow
          .jobs
          .iter()
          .any(|other| &other.id != *id && other.depends_on.contains(id))
      })
      .cloned()
      .collect();

    Self {
      jobs,
      depends_on,
      dependencies,
      dependents,
      routers,
      entry_jobs,
      terminal_jobs,
      duplicates,
    }
  }

  /// All job ids in declaration order.
  pub fn jobs(&self) -> &[String] {
    &self.jobs
  }

  /// Jobs with no `depends_on`.
  pub fn entry_jobs(&self) -> &[String] {
    &self.entry_jobs
  }

  /// Jobs that no other job depends on.
  pub fn terminal_jobs(&self) -> &[String] {
    &self.terminal_jobs
  }

  pub fn is_terminal(&self, job_id: &str) -> bool {
    self.terminal_jobs.iter().any(|id| id == job_id)
  }

  /// Known upstream jobs of a job.
  pub fn dependencies(&self, job_id: &str) -> &[String] {
    self
      .dependencies
      .get(job_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Downstream jobs of a job.
  pub fn dependents(&self, job_id: &str) -> &[String] {
    self
      .dependents
      .get(job_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Routing jobs that can select `job_id`.
  pub fn routers_of(&self, job_id: &str) -> &[String] {
    self
      .routers
      .get(job_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every job at which the depth-first walk over `depends_on` closes a
  /// cycle, in walk order. Self-dependencies count as cycles.
  pub fn cycle_jobs(&self) -> Vec<String> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = self.jobs.iter().map(|id| (id.as_str(), 0u8)).collect();
    let mut found = Vec::new();

    fn dfs<'a>(
      job: &'a str,
      depends_on: &'a HashMap<String, Vec<String>>,
      color: &mut HashMap<&'a str, u8>,
      found: &mut Vec<String>,
    ) {
      match color.get(job) {
        Some(1) => {
          found.push(job.to_string());
          return;
        }
        Some(0) => {}
        // Done, or not a job of this workflow
        _ => return,
      }

      color.insert(job, 1);
      if let Some(deps) = depends_on.get(job) {
        for dep in deps {
          dfs(dep, depends_on, color, found);
        }
      }
      color.insert(job, 2);
    }

    for id in &self.jobs {
      if color.get(id.as_str()) == Some(&0) {
        dfs(id, &self.depends_on, &mut color, &mut found);
      }
    }

    found
  }

  /// Check that the graph can be scheduled.
  pub fn check(&self) -> Result<(), WorkflowError> {
    if let Some(id) = self.duplicates.first() {
      return Err(WorkflowError::DuplicateJob(id.clone()));
    }
    for id in &self.jobs {
      for dep in &self.depends_on[id] {
        if !self.depends_on.contains_key(dep) {
          return Err(WorkflowError::UnknownDependency {
            job: id.clone(),
            dependency: dep.clone(),
          });
        }
      }
    }
    if !self.jobs.is_empty() && self.entry_jobs.is_empty() {
      return Err(WorkflowError::NoEntryJobs);
    }
    if let Some(id) = self.cycle_jobs().into_iter().next() {
      return Err(WorkflowError::CycleDetected(id));
    }
    Ok(())
  }
}
