//! Shorthand expansion applied to a raw compose document before it is
//! deserialized.
//!
//! - `component:` / `workflow:` become a one-entry section keyed `__default__`,
//!   `listener:` / `gateway:` become one-element lists.
//! - Map-form sections (`components`, `workflows`, `jobs`, `actions`) become
//!   ordered lists, with each map key injected as the entry's `id`.
//! - A component without `actions` gets a single action from its `action:`
//!   key or from its remaining non-component fields; a workflow without
//!   `jobs` gets a single job the same way.
//! - Jobs default to `type: action`; `if` and `switch` jobs written with a
//!   single inline condition or case get a one-element list.

use serde_json::{Map, Value};

use crate::DEFAULT_ID;

const COMPONENT_KEYS: &[&str] = &[
  "id",
  "type",
  "runtime",
  "max_concurrent_count",
  "default",
  "actions",
  "action",
  "base_dir",
  "base_url",
  "headers",
  "env",
];
const WORKFLOW_KEYS: &[&str] = &["id", "name", "title", "description", "default", "jobs"];
const CONDITION_KEYS: &[&str] = &["operator", "input", "value", "if_true", "if_false"];
const CASE_KEYS: &[&str] = &["value", "then"];
const TRIGGER_KEYS: &[&str] = &["path", "method", "workflow", "input"];
const CALLBACK_KEYS: &[&str] = &[
  "path",
  "method",
  "bulk",
  "item",
  "identify_by",
  "status",
  "success_when",
  "fail_when",
  "result",
];

pub fn normalize_compose(document: &mut Value) {
  let Some(root) = document.as_object_mut() else {
    return;
  };

  inflate_keyed(root, "component", "components");
  inflate_keyed(root, "workflow", "workflows");
  inflate_list(root, "listener", "listeners");
  inflate_list(root, "gateway", "gateways");

  if let Some(components) = root.get_mut("components") {
    keyed_to_list(components);
    for_each_item(components, normalize_component);
  }
  if let Some(workflows) = root.get_mut("workflows") {
    keyed_to_list(workflows);
    for_each_item(workflows, normalize_workflow);
  }
  if let Some(listeners) = root.get_mut("listeners") {
    for_each_item(listeners, normalize_listener);
  }
}

fn normalize_component(component: &mut Map<String, Value>) {
  if !component.contains_key("actions") {
    if let Some(action) = component.remove("action") {
      component.insert("actions".to_string(), Value::Array(vec![action]));
    } else {
      let action = take_foreign_keys(component, COMPONENT_KEYS);
      if !action.is_empty() {
        component.insert(
          "actions".to_string(),
          Value::Array(vec![Value::Object(action)]),
        );
      }
    }
  }
  if let Some(actions) = component.get_mut("actions") {
    keyed_to_list(actions);
  }
}

fn normalize_workflow(workflow: &mut Map<String, Value>) {
  if !workflow.contains_key("jobs") {
    let job = take_foreign_keys(workflow, WORKFLOW_KEYS);
    if !job.is_empty() {
      let mut jobs = Map::new();
      jobs.insert(DEFAULT_ID.to_string(), Value::Object(job));
      workflow.insert("jobs".to_string(), Value::Object(jobs));
    }
  }
  if let Some(jobs) = workflow.get_mut("jobs") {
    keyed_to_list(jobs);
    for_each_item(jobs, normalize_job);
  }
}

fn normalize_job(job: &mut Map<String, Value>) {
  if !job.contains_key("type") {
    job.insert("type".to_string(), Value::String("action".to_string()));
  }
  if let Some(Value::String(dep)) = job.get("depends_on") {
    let dep = Value::String(dep.clone());
    job.insert("depends_on".to_string(), Value::Array(vec![dep]));
  }

  match job.get("type").and_then(Value::as_str) {
    Some("if") => inflate_fields(job, "conditions", CONDITION_KEYS),
    Some("switch") => inflate_fields(job, "cases", CASE_KEYS),
    Some("action") => {
      if let Some(Value::Object(component)) = job.get_mut("component") {
        normalize_component(component);
      }
    }
    _ => {}
  }
}

fn normalize_listener(listener: &mut Map<String, Value>) {
  match listener.get("type").and_then(Value::as_str) {
    Some("http-trigger") => inflate_fields(listener, "triggers", TRIGGER_KEYS),
    Some("http-callback") => {
      inflate_fields(listener, "callbacks", CALLBACK_KEYS);
      if let Some(callbacks) = listener.get_mut("callbacks") {
        for_each_item(callbacks, |callback| {
          for key in ["success_when", "fail_when"] {
            if let Some(Value::String(s)) = callback.get(key) {
              let single = Value::String(s.clone());
              callback.insert(key.to_string(), Value::Array(vec![single]));
            }
          }
        });
      }
    }
    _ => {}
  }
}

fn inflate_keyed(root: &mut Map<String, Value>, single: &str, plural: &str) {
  if root.contains_key(plural) {
    return;
  }
  if let Some(value) = root.remove(single)
    && !value.is_null()
  {
    let mut section = Map::new();
    section.insert(DEFAULT_ID.to_string(), value);
    root.insert(plural.to_string(), Value::Object(section));
  }
}

fn inflate_list(root: &mut Map<String, Value>, single: &str, plural: &str) {
  if root.contains_key(plural) {
    return;
  }
  if let Some(value) = root.remove(single)
    && !value.is_null()
  {
    root.insert(plural.to_string(), Value::Array(vec![value]));
  }
}

/// Move the listed keys into a single-element list under `plural`.
fn inflate_fields(object: &mut Map<String, Value>, plural: &str, keys: &[&str]) {
  if object.contains_key(plural) || !keys.iter().any(|k| object.contains_key(*k)) {
    return;
  }
  let mut item = Map::new();
  for key in keys {
    if let Some(value) = object.remove(*key) {
      item.insert(key.to_string(), value);
    }
  }
  object.insert(plural.to_string(), Value::Array(vec![Value::Object(item)]));
}

/// Remove and return every entry whose key is not in `own`.
fn take_foreign_keys(object: &mut Map<String, Value>, own: &[&str]) -> Map<String, Value> {
  let foreign: Vec<String> = object
    .keys()
    .filter(|k| !own.contains(&k.as_str()))
    .cloned()
    .collect();
  let mut taken = Map::new();
  for key in foreign {
    if let Some(value) = object.remove(&key) {
      taken.insert(key, value);
    }
  }
  taken
}

/// `{a: {...}, b: {...}}` becomes `[{id: a, ...}, {id: b, ...}]`.
fn keyed_to_list(section: &mut Value) {
  let Value::Object(map) = section else {
    return;
  };
  let items = std::mem::take(map)
    .into_iter()
    .map(|(key, value)| {
      let mut item = match value {
        Value::Object(item) => item,
        Value::Null => Map::new(),
        other => return other,
      };
      if !item.contains_key("id") {
        item.insert("id".to_string(), Value::String(key));
      }
      Value::Object(item)
    })
    .collect();
  *section = Value::Array(items);
}

fn for_each_item(section: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
  if let Value::Array(items) = section {
    for item in items.iter_mut() {
      if let Value::Object(object) = item {
        f(object);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn normalized(mut value: Value) -> Value {
    normalize_compose(&mut value);
    value
  }

  #[test]
  fn test_single_component_and_workflow() {
    let doc = normalized(json!({
      "component": { "type": "shell", "command": ["echo", "hi"] },
      "workflow": { "title": "Echo", "input": "${input}" }
    }));

    assert_eq!(
      doc["components"],
      json!([{
        "type": "shell",
        "actions": [{ "command": ["echo", "hi"] }],
        "id": "__default__"
      }])
    );
    assert_eq!(
      doc["workflows"],
      json!([{
        "title": "Echo",
        "jobs": [{ "input": "${input}", "id": "__default__", "type": "action" }],
        "id": "__default__"
      }])
    );
  }

  #[test]
  fn test_keyed_sections_keep_order() {
    let doc = normalized(json!({
      "workflows": {
        "main": {
          "jobs": {
            "zeta": { "component": "c" },
            "alpha": { "component": "c", "depends_on": "zeta" }
          }
        }
      }
    }));

    let jobs = &doc["workflows"][0]["jobs"];
    assert_eq!(jobs[0]["id"], json!("zeta"));
    assert_eq!(jobs[1]["id"], json!("alpha"));
    assert_eq!(jobs[1]["depends_on"], json!(["zeta"]));
    assert_eq!(doc["workflows"][0]["id"], json!("main"));
  }

  #[test]
  fn test_single_action_key() {
    let doc = normalized(json!({
      "components": { "api": { "type": "http-client", "base_url": "http://x", "action": { "path": "/a" } } }
    }));
    assert_eq!(doc["components"][0]["actions"], json!([{ "path": "/a" }]));
    assert_eq!(doc["components"][0]["base_url"], json!("http://x"));
  }

  #[test]
  fn test_if_and_switch_inflation() {
    let doc = normalized(json!({
      "workflows": [{
        "id": "w",
        "jobs": [
          { "id": "check", "type": "if", "operator": "gt", "input": "${input.n}", "value": 1, "if_true": "a" },
          { "id": "route", "type": "switch", "input": "${input.k}", "value": "x", "then": "b" }
        ]
      }]
    }));

    let jobs = &doc["workflows"][0]["jobs"];
    assert_eq!(
      jobs[0]["conditions"],
      json!([{ "operator": "gt", "input": "${input.n}", "value": 1, "if_true": "a" }])
    );
    assert_eq!(jobs[1]["cases"], json!([{ "value": "x", "then": "b" }]));
    assert_eq!(jobs[1]["input"], json!("${input.k}"));
  }

  #[test]
  fn test_inline_job_component() {
    let doc = normalized(json!({
      "workflow": {
        "jobs": [{ "id": "j", "component": { "type": "shell", "command": "date" } }]
      }
    }));
    let component = &doc["workflows"][0]["jobs"][0]["component"];
    assert_eq!(component["actions"], json!([{ "command": "date" }]));
  }

  #[test]
  fn test_listener_and_callback() {
    let doc = normalized(json!({
      "listener": {
        "type": "http-callback",
        "path": "/cb",
        "identify_by": "${body.id}",
        "success_when": "done"
      },
      "gateway": { "type": "http-tunnel", "port": 8080 }
    }));
    assert_eq!(doc["listeners"][0]["callbacks"][0]["success_when"], json!(["done"]));
    assert_eq!(doc["gateways"][0]["port"], json!(8080));
  }
}
