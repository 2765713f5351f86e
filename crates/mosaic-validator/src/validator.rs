use std::collections::{HashMap, HashSet};

use mosaic_config::{
  ComponentKind, ComponentRef, ComposeConfig, DEFAULT_ID, ListenerConfig, WorkflowConfig,
};
use mosaic_workflow::JobGraph;
use tracing::debug;

const PLACEHOLDER_COMPONENT_ID: &str = "__component__";
const PLACEHOLDER_WORKFLOW_ID: &str = "__workflow__";
const PLACEHOLDER_JOB_ID: &str = "__job__";

/// Collects diagnostics for a compose configuration.
///
/// Each diagnostic is prefixed with the path of the offending entry, e.g.
/// `workflows[0].jobs[2].depends_on: ...`.
pub struct ComposeValidator<'a> {
  config: &'a ComposeConfig,
  errors: Vec<String>,
}

impl<'a> ComposeValidator<'a> {
  pub fn new(config: &'a ComposeConfig) -> Self {
    Self {
      config,
      errors: Vec::new(),
    }
  }

  /// Run every check. An empty list means the configuration is accepted.
  pub fn validate(mut self) -> Vec<String> {
    self.check_duplicate_component_ids();
    self.check_duplicate_workflow_ids();
    self.check_duplicate_job_ids();
    self.check_component_references();
    self.check_action_references();
    self.check_workflow_references();
    self.check_job_graphs();

    debug!(count = self.errors.len(), "compose_validated");
    self.errors
  }

  fn check_duplicate_component_ids(&mut self) {
    let ids = self.config.components.iter().map(|c| c.id.as_str());
    for (i, first, id) in duplicates(ids, PLACEHOLDER_COMPONENT_ID) {
      self.errors.push(format!(
        "components[{i}].id: Duplicate component ID '{id}' (first seen at components[{first}])"
      ));
    }
  }

  fn check_duplicate_workflow_ids(&mut self) {
    let ids = self.config.workflows.iter().map(|w| w.id.as_str());
    for (i, first, id) in duplicates(ids, PLACEHOLDER_WORKFLOW_ID) {
      self.errors.push(format!(
        "workflows[{i}].id: Duplicate workflow ID '{id}' (first seen at workflows[{first}])"
      ));
    }
  }

  fn check_duplicate_job_ids(&mut self) {
    for (wi, workflow) in self.config.workflows.iter().enumerate() {
      let ids = workflow.jobs.iter().map(|j| j.id.as_str());
      for (ji, _, id) in duplicates(ids, PLACEHOLDER_JOB_ID) {
        self.errors.push(format!(
          "workflows[{wi}].jobs[{ji}].id: Duplicate job ID '{id}' in workflow '{}'",
          workflow.id
        ));
      }
    }
  }

  fn check_component_references(&mut self) {
    let component_ids: HashSet<&str> = self.config.components.iter().map(|c| c.id.as_str()).collect();
    let ambiguous = self.config.default_component_ambiguous();

    for (wi, workflow) in self.config.workflows.iter().enumerate() {
      for (ji, job) in workflow.jobs.iter().enumerate() {
        let Some(ComponentRef::Id(component)) = job.as_action().map(|a| &a.component) else {
          continue;
        };
        if component == DEFAULT_ID {
          if ambiguous {
            self.errors.push(format!(
              "workflows[{wi}].jobs[{ji}].component: Uses default component but multiple components exist and none has 'default: true'"
            ));
          }
        } else if !component_ids.contains(component.as_str()) {
          self.errors.push(format!(
            "workflows[{wi}].jobs[{ji}].component: References non-existent component '{component}'"
          ));
        }
      }
    }
  }

  fn check_action_references(&mut self) {
    for (wi, workflow) in self.config.workflows.iter().enumerate() {
      for (ji, job) in workflow.jobs.iter().enumerate() {
        let Some(action) = job.as_action() else {
          continue;
        };
        if action.action == DEFAULT_ID {
          continue;
        }

        let component = match &action.component {
          ComponentRef::Id(id) if id == DEFAULT_ID => continue,
          ComponentRef::Id(id) => match self.config.components.iter().find(|c| &c.id == id) {
            Some(component) => component,
            None => continue,
          },
          ComponentRef::Inline(component) => component.as_ref(),
        };

        if !component.action_ids().contains(&action.action.as_str()) {
          self.errors.push(format!(
            "workflows[{wi}].jobs[{ji}].action: References non-existent action '{}' on component '{}'",
            action.action, component.id
          ));
        }
      }
    }
  }

  fn check_workflow_references(&mut self) {
    for (ci, component) in self.config.components.iter().enumerate() {
      let ComponentKind::Workflow { actions } = &component.kind else {
        continue;
      };
      for (ai, action) in actions.iter().enumerate() {
        let location = format!("components[{ci}].actions[{ai}].workflow");
        self.check_workflow_reference(&location, &action.spec.workflow);
      }
    }

    for (li, listener) in self.config.listeners.iter().enumerate() {
      let ListenerConfig::HttpTrigger { triggers, .. } = listener else {
        continue;
      };
      for (ti, trigger) in triggers.iter().enumerate() {
        let location = format!("listeners[{li}].triggers[{ti}].workflow");
        self.check_workflow_reference(&location, &trigger.workflow);
      }
    }
  }

  fn check_workflow_reference(&mut self, location: &str, workflow: &str) {
    if workflow == DEFAULT_ID {
      if self.config.default_workflow_ambiguous() {
        self.errors.push(format!(
          "{location}: Uses default workflow but multiple workflows exist and none has 'default: true'"
        ));
      }
    } else if !self.config.workflows.iter().any(|w| w.id == workflow) {
      self.errors.push(format!(
        "{location}: References non-existent workflow '{workflow}'"
      ));
    }
  }

  fn check_job_graphs(&mut self) {
    for (wi, workflow) in self.config.workflows.iter().enumerate() {
      if workflow.jobs.is_empty() {
        continue;
      }
      self.check_job_graph(wi, workflow);
    }
  }

  fn check_job_graph(&mut self, wi: usize, workflow: &WorkflowConfig) {
    let job_ids: HashSet<&str> = workflow.jobs.iter().map(|j| j.id.as_str()).collect();

    for (ji, job) in workflow.jobs.iter().enumerate() {
      for dep in &job.depends_on {
        if dep == &job.id {
          self.errors.push(format!(
            "workflows[{wi}].jobs[{ji}].depends_on: Job '{}' depends on itself",
            job.id
          ));
        } else if !job_ids.contains(dep.as_str()) {
          self.errors.push(format!(
            "workflows[{wi}].jobs[{ji}].depends_on: Job '{}' references non-existent job '{dep}'",
            job.id
          ));
        }
      }

      for target in job.routing_jobs() {
        if !job_ids.contains(target) {
          self.errors.push(format!(
            "workflows[{wi}].jobs[{ji}]: Routing target '{target}' does not exist in workflow '{}'",
            workflow.id
          ));
        }
      }
    }

    let graph = JobGraph::new(workflow);
    if graph.entry_jobs().is_empty() {
      self.errors.push(format!(
        "workflows[{wi}]: Workflow '{}' has no entry job (all jobs have depends_on)",
        workflow.id
      ));
    }

    for job in graph.cycle_jobs() {
      self.errors.push(format!(
        "workflows[{wi}]: Dependency cycle detected involving job '{job}' in workflow '{}'",
        workflow.id
      ));
    }
  }
}

/// `(index, first_index, id)` for every repeated id, skipping `placeholder`.
fn duplicates<'a>(
  ids: impl Iterator<Item = &'a str>,
  placeholder: &str,
) -> Vec<(usize, usize, &'a str)> {
  let mut seen: HashMap<&str, usize> = HashMap::new();
  let mut found = Vec::new();
  for (i, id) in ids.enumerate() {
    if id == placeholder {
      continue;
    }
    match seen.get(id) {
      Some(first) => found.push((i, *first, id)),
      None => {
        seen.insert(id, i);
      }
    }
  }
  found
}
