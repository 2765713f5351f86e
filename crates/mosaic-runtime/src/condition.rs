//! Comparison operators for `if` jobs.

use std::cmp::Ordering;

use mosaic_config::IfOperator;
use mosaic_template::stringify;
use regex::Regex;
use serde_json::Value;

/// Evaluate `input <operator> value` on rendered operands.
///
/// Ordering operators compare numbers numerically and strings
/// lexicographically; any other pairing is false. An invalid `match`
/// pattern is an error.
pub fn evaluate(operator: IfOperator, input: &Value, value: &Value) -> Result<bool, regex::Error> {
  Ok(match operator {
    IfOperator::Eq => equals(input, value),
    IfOperator::Neq => !equals(input, value),
    IfOperator::Gt => compare(input, value) == Some(Ordering::Greater),
    IfOperator::Gte => matches!(compare(input, value), Some(Ordering::Greater | Ordering::Equal)),
    IfOperator::Lt => compare(input, value) == Some(Ordering::Less),
    IfOperator::Lte => matches!(compare(input, value), Some(Ordering::Less | Ordering::Equal)),
    IfOperator::In => contains(value, input),
    IfOperator::NotIn => !contains(value, input),
    IfOperator::StartsWith => stringify(input).starts_with(&stringify(value)),
    IfOperator::EndsWith => stringify(input).ends_with(&stringify(value)),
    IfOperator::Match => Regex::new(&stringify(value))?.is_match(&stringify(input)),
  })
}

/// Equality where `1` and `1.0` are the same number.
pub fn equals(a: &Value, b: &Value) -> bool {
  match (a.as_f64(), b.as_f64()) {
    (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
    _ => a == b,
  }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    _ => None,
  }
}

/// Membership of `item` in a list, a string or an object's keys.
fn contains(haystack: &Value, item: &Value) -> bool {
  match haystack {
    Value::Array(items) => items.iter().any(|v| equals(v, item)),
    Value::String(text) => text.contains(&stringify(item)),
    Value::Object(map) => item.as_str().is_some_and(|key| map.contains_key(key)),
    _ => false,
  }
}
