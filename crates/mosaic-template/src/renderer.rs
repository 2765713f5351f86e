//! Variable renderer.
//!
//! Walks arbitrary JSON data and replaces every embedded `${...}` expression
//! with the value it resolves to. A string that is exactly one expression
//! keeps the resolved value's native type; otherwise values are stringified
//! and spliced into the surrounding text.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use crate::coerce::{ValueType, coerce_value};
use crate::error::{RenderError, SourceError};
use crate::expr::{Expression, scan};
use crate::file::{encode_base64, materialize};
use crate::path;

/// Supplies the value for a source key such as `input` or `result[1]`.
pub trait SourceResolver: Send + Sync {
  fn resolve(&self, key: &str, index: Option<usize>) -> Result<Value, SourceError>;
}

impl<F> SourceResolver for F
where
  F: Fn(&str, Option<usize>) -> Result<Value, SourceError> + Send + Sync,
{
  fn resolve(&self, key: &str, index: Option<usize>) -> Result<Value, SourceError> {
    self(key, index)
  }
}

/// Renders template data against a [`SourceResolver`].
pub struct VariableRenderer<'a> {
  resolver: &'a dyn SourceResolver,
}

impl<'a> VariableRenderer<'a> {
  pub fn new(resolver: &'a dyn SourceResolver) -> Self {
    Self { resolver }
  }

  /// Render `data`. With `ignore_files` set, file conversions pass the raw
  /// value through instead of materializing it.
  pub async fn render(&self, data: &Value, ignore_files: bool) -> Result<Value, RenderError> {
    self.render_element(data, ignore_files).await
  }

  /// Render a single string.
  pub async fn render_text(&self, text: &str, ignore_files: bool) -> Result<Value, RenderError> {
    self.render_str(text, ignore_files).await
  }

  fn render_element<'b>(
    &'b self,
    element: &'b Value,
    ignore_files: bool,
  ) -> BoxFuture<'b, Result<Value, RenderError>> {
    async move {
      match element {
        Value::String(text) => self.render_str(text, ignore_files).await,
        Value::Object(map) => {
          let mut rendered = Map::with_capacity(map.len());
          for (key, value) in map {
            rendered.insert(key.clone(), self.render_element(value, ignore_files).await?);
          }
          Ok(Value::Object(rendered))
        }
        Value::Array(items) => {
          let mut rendered = Vec::with_capacity(items.len());
          for item in items {
            rendered.push(self.render_element(item, ignore_files).await?);
          }
          Ok(Value::Array(rendered))
        }
        other => Ok(other.clone()),
      }
    }
    .boxed()
  }

  /// Matches are replaced from last to first so earlier spans stay valid.
  fn render_str<'b>(
    &'b self,
    text: &'b str,
    ignore_files: bool,
  ) -> BoxFuture<'b, Result<Value, RenderError>> {
    async move {
      let expressions = scan(text);
      let mut rendered = text.to_string();

      for expr in expressions.iter().rev() {
        let value = self.evaluate(expr, ignore_files).await?;

        if expr.span.start == 0 && expr.span.end == text.len() {
          return Ok(value);
        }
        rendered.replace_range(expr.span.clone(), &stringify(&value));
      }

      Ok(Value::String(rendered))
    }
    .boxed()
  }

  async fn evaluate(&self, expr: &Expression, ignore_files: bool) -> Result<Value, RenderError> {
    let source = match self.resolver.resolve(&expr.key, expr.index) {
      Ok(source) => source,
      Err(e) => {
        debug!(key = %expr.key, error = %e, "source_unresolved");
        Value::Null
      }
    };
    let mut value = path::resolve(&source, expr.path.as_deref());

    if value.is_null()
      && let Some(default) = &expr.default
    {
      value = self.render_str(default, ignore_files).await?;
    }

    if let Some(kind) = expr.kind()
      && !value.is_null()
    {
      value = self
        .convert(value, ValueType::parse(kind), expr.subtype(), expr.format(), ignore_files)
        .await?;
    }

    Ok(value)
  }

  async fn convert(
    &self,
    value: Value,
    value_type: ValueType,
    subtype: Option<&str>,
    format: Option<&str>,
    ignore_files: bool,
  ) -> Result<Value, RenderError> {
    match value_type {
      ValueType::Base64 => encode_base64(&value).await,
      ValueType::File(_) if ignore_files => Ok(value),
      ValueType::File(kind) => materialize(value, kind, subtype, format).await,
      other => coerce_value(value, other, subtype),
    }
  }
}

/// Text form of a value spliced into a larger string.
pub fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}
