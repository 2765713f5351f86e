//! `${env.NAME | default}` interpolation, applied once at load time.

use std::collections::HashMap;

use mosaic_template::scan;
use serde_json::Value;

const ENV_KEY: &str = "env";

/// Replace every `${env.NAME}` expression in string values of `document`.
///
/// Unknown variables use the expression's default, or an empty string.
/// Expressions addressing other sources are left for run time.
pub fn interpolate_env(document: &mut Value, env: &HashMap<String, String>) {
  match document {
    Value::String(text) => {
      if let Some(replaced) = interpolate_text(text, env) {
        *text = replaced;
      }
    }
    Value::Array(items) => {
      for item in items {
        interpolate_env(item, env);
      }
    }
    Value::Object(map) => {
      for (_, value) in map.iter_mut() {
        interpolate_env(value, env);
      }
    }
    _ => {}
  }
}

/// Returns `None` when `text` contains no env expression.
fn interpolate_text(text: &str, env: &HashMap<String, String>) -> Option<String> {
  let expressions: Vec<_> = scan(text)
    .into_iter()
    .filter(|expr| expr.key == ENV_KEY && expr.path.is_some())
    .collect();
  if expressions.is_empty() {
    return None;
  }

  let mut result = text.to_string();
  for expr in expressions.iter().rev() {
    let name = expr.path.as_deref().unwrap_or_default();
    let value = match env.get(name) {
      Some(value) => value.clone(),
      None => match &expr.default {
        Some(default) => interpolate_text(default, env).unwrap_or_else(|| default.clone()),
        None => String::new(),
      },
    };
    result.replace_range(expr.span.clone(), &value);
  }
  Some(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn env() -> HashMap<String, String> {
    HashMap::from([
      ("API_KEY".to_string(), "secret".to_string()),
      ("PORT".to_string(), "9000".to_string()),
    ])
  }

  #[test]
  fn test_interpolate_nested() {
    let mut doc = json!({
      "headers": { "Authorization": "Bearer ${env.API_KEY}" },
      "list": ["${env.PORT}", 5]
    });
    interpolate_env(&mut doc, &env());
    assert_eq!(
      doc,
      json!({
        "headers": { "Authorization": "Bearer secret" },
        "list": ["9000", 5]
      })
    );
  }

  #[test]
  fn test_interpolate_default() {
    let mut doc = json!(["${env.MISSING | fallback}", "${env.MISSING}", "${env.MISSING | ${env.PORT}}"]);
    interpolate_env(&mut doc, &env());
    assert_eq!(doc, json!(["fallback", "", "9000"]));
  }

  #[test]
  fn test_other_sources_untouched() {
    let mut doc = json!("${input.text} at ${env.PORT}");
    interpolate_env(&mut doc, &env());
    assert_eq!(doc, json!("${input.text} at 9000"));
  }
}
