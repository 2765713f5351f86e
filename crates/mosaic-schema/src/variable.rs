use std::collections::HashSet;

use mosaic_template::{Annotation, Expression, parse_literal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Types whose subtype lists the accepted options.
const OPTION_TYPES: &[&str] = &["image", "audio", "video", "file", "select"];

/// A single input or output value of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVariable {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subtype: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<String>>,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
  #[serde(default)]
  pub annotations: Vec<Annotation>,
  /// Declared by a component action rather than the workflow itself.
  #[serde(default)]
  pub internal: bool,
}

impl WorkflowVariable {
  /// Build a variable from a scanned expression.
  ///
  /// The default is parsed into the declared type; a default that does not
  /// parse is kept as written.
  pub(crate) fn from_expression(name: Option<String>, expr: &Expression, internal: bool) -> Self {
    let kind = expr.kind().unwrap_or("string").to_string();
    let subtype = expr.subtype().map(str::to_string);

    let default = expr.default.as_ref().map(|raw| match expr.kind() {
      Some(kind) => parse_literal(raw, kind).unwrap_or_else(|_| Value::String(raw.clone())),
      None => Value::String(raw.clone()),
    });

    let options = subtype
      .as_deref()
      .filter(|_| OPTION_TYPES.contains(&kind.as_str()))
      .map(|s| s.split(',').map(str::to_string).collect());

    Self {
      name,
      kind,
      subtype,
      format: expr.format().map(str::to_string),
      options,
      required: false,
      default,
      annotations: expr.annotations.clone(),
      internal,
    }
  }

  pub fn annotation(&self, name: &str) -> Option<&str> {
    self
      .annotations
      .iter()
      .find(|a| a.name == name)
      .map(|a| a.value.as_str())
  }
}

/// Variables produced together by each call of a fan-out job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVariableGroup {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub variables: Vec<WorkflowVariable>,
  /// Number of results; 0 when only known at run time.
  pub repeat_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputVariable {
  Group(WorkflowVariableGroup),
  Variable(WorkflowVariable),
}

/// Drop repeated names, keeping the first occurrence. Unnamed variables are
/// always kept.
pub(crate) fn dedup_variables(variables: Vec<WorkflowVariable>) -> Vec<WorkflowVariable> {
  let mut seen: HashSet<String> = HashSet::new();
  variables
    .into_iter()
    .filter(|v| match &v.name {
      Some(name) => seen.insert(name.clone()),
      None => true,
    })
    .collect()
}

/// Dedup ungrouped variables against each other and each group internally.
pub(crate) fn dedup_outputs(outputs: Vec<OutputVariable>) -> Vec<OutputVariable> {
  let mut seen: HashSet<String> = HashSet::new();
  let mut result = Vec::with_capacity(outputs.len());

  for output in outputs {
    match output {
      OutputVariable::Group(mut group) => {
        group.variables = dedup_variables(group.variables);
        result.push(OutputVariable::Group(group));
      }
      OutputVariable::Variable(variable) => {
        let keep = match &variable.name {
          Some(name) => seen.insert(name.clone()),
          None => true,
        };
        if keep {
          result.push(OutputVariable::Variable(variable));
        }
      }
    }
  }

  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn variable(text: &str) -> WorkflowVariable {
    let expr = Expression::parse(text).unwrap();
    WorkflowVariable::from_expression(expr.path.clone(), &expr, false)
  }

  #[test]
  fn test_typed_default() {
    let v = variable("${input.count as integer | 5}");
    assert_eq!(v.name.as_deref(), Some("count"));
    assert_eq!(v.kind, "integer");
    assert_eq!(v.default, Some(json!(5)));
  }

  #[test]
  fn test_unparsable_default_kept() {
    let v = variable("${input.count as integer | many}");
    assert_eq!(v.default, Some(json!("many")));
  }

  #[test]
  fn test_untyped_default_is_string() {
    let v = variable("${input.flag | true}");
    assert_eq!(v.kind, "string");
    assert_eq!(v.default, Some(json!("true")));
  }

  #[test]
  fn test_options_and_annotations() {
    let v = variable("${input.photo as image/png,jpeg;base64 @(description A photo)}");
    assert_eq!(v.options, Some(vec!["png".to_string(), "jpeg".to_string()]));
    assert_eq!(v.format.as_deref(), Some("base64"));
    assert_eq!(v.annotation("description"), Some("A photo"));
  }

  #[test]
  fn test_dedup_first_wins() {
    let variables = dedup_variables(vec![
      variable("${input.x as integer}"),
      variable("${input}"),
      variable("${input.x as boolean}"),
      variable("${input}"),
    ]);
    assert_eq!(variables.len(), 3);
    assert_eq!(variables[0].kind, "integer");
  }

  #[test]
  fn test_serialize_output_variable() {
    let group = OutputVariable::Group(WorkflowVariableGroup {
      name: None,
      variables: vec![variable("${input.x}")],
      repeat_count: 2,
    });
    assert_eq!(
      serde_json::to_value(&group).unwrap(),
      json!({
        "variables": [{
          "name": "x",
          "type": "string",
          "required": false,
          "annotations": [],
          "internal": false
        }],
        "repeat_count": 2
      })
    );
  }
}
