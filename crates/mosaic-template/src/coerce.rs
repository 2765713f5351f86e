//! Conversions requested with `as type`.

use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::path;

/// Target of an `as` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
  Number,
  Integer,
  Boolean,
  Json,
  ObjectList,
  Base64,
  /// `image`, `audio`, `video` or `file`.
  File(FileKind),
  /// Anything else (`string`, `select`, ...) passes through unchanged.
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
  Image,
  Audio,
  Video,
  File,
}

impl FileKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      FileKind::Image => "image",
      FileKind::Audio => "audio",
      FileKind::Video => "video",
      FileKind::File => "file",
    }
  }

  /// Only media kinds carry their subtype into the content type.
  pub fn is_media(&self) -> bool {
    !matches!(self, FileKind::File)
  }
}

impl ValueType {
  pub fn parse(kind: &str) -> Self {
    match kind {
      "number" => ValueType::Number,
      "integer" => ValueType::Integer,
      "boolean" => ValueType::Boolean,
      "json" => ValueType::Json,
      "object[]" => ValueType::ObjectList,
      "base64" => ValueType::Base64,
      "image" => ValueType::File(FileKind::Image),
      "audio" => ValueType::File(FileKind::Audio),
      "video" => ValueType::File(FileKind::Video),
      "file" => ValueType::File(FileKind::File),
      _ => ValueType::Other,
    }
  }
}

/// Apply a scalar conversion. Base64 and file conversions need I/O and are
/// handled by the renderer; here they pass through.
pub fn coerce_value(
  value: Value,
  value_type: ValueType,
  subtype: Option<&str>,
) -> Result<Value, RenderError> {
  match value_type {
    ValueType::Number => to_number(&value),
    ValueType::Integer => to_integer(&value),
    ValueType::Boolean => Ok(Value::Bool(to_boolean(&value))),
    ValueType::Json => match value {
      Value::String(text) => Ok(serde_json::from_str(&text)?),
      other => Ok(other),
    },
    ValueType::ObjectList => Ok(to_object_list(value, subtype)),
    ValueType::Base64 | ValueType::File(_) | ValueType::Other => Ok(value),
  }
}

/// Parse a literal (e.g. a default written in a template) as `kind`.
///
/// Used by static analysis, where an unparsable literal is not fatal.
pub fn parse_literal(raw: &str, kind: &str) -> Result<Value, RenderError> {
  coerce_value(Value::String(raw.to_string()), ValueType::parse(kind), None)
}

fn to_number(value: &Value) -> Result<Value, RenderError> {
  let number = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    _ => None,
  };
  number
    .and_then(serde_json::Number::from_f64)
    .map(Value::Number)
    .ok_or_else(|| RenderError::coercion("number", value))
}

fn to_integer(value: &Value) -> Result<Value, RenderError> {
  let integer = match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
    Value::String(s) => s.trim().parse::<i64>().ok(),
    Value::Bool(b) => Some(i64::from(*b)),
    _ => None,
  };
  integer
    .map(|n| Value::Number(n.into()))
    .ok_or_else(|| RenderError::coercion("integer", value))
}

/// `"true"` and `"1"` (case-insensitive) are true; everything else is false.
fn to_boolean(value: &Value) -> bool {
  match value {
    Value::Bool(b) => *b,
    Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1"),
    Value::Number(n) => n.to_string() == "1",
    _ => false,
  }
}

/// Keep only object elements; with a subtype of comma-separated paths,
/// project each object onto those paths keyed by the last path segment.
fn to_object_list(value: Value, subtype: Option<&str>) -> Value {
  let Value::Array(items) = value else {
    return Value::Array(Vec::new());
  };

  let objects = items.into_iter().filter(Value::is_object);

  match subtype {
    Some(subtype) => {
      let paths: Vec<(&str, &str)> = subtype
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| (p, p.rsplit('.').next().unwrap_or(p)))
        .collect();

      objects
        .map(|object| {
          let projected: Map<String, Value> = paths
            .iter()
            .map(|(p, key)| (key.to_string(), path::resolve(&object, Some(*p))))
            .collect();
          Value::Object(projected)
        })
        .collect()
    }
    None => objects.collect(),
  }
}
