use std::time::Duration;

use serde_json::Value;

/// Parse a duration written as seconds (`1.5`, `"30"`) or with units
/// (`"500ms"`, `"10s"`, `"1h30m"`, `"2d"`). Negative values clamp to zero.
pub fn parse_duration(value: &Value) -> Option<Duration> {
  match value {
    Value::Number(n) => n.as_f64().map(seconds),
    Value::String(s) => parse_duration_str(s),
    _ => None,
  }
}

pub fn parse_duration_str(text: &str) -> Option<Duration> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }
  if let Ok(secs) = text.parse::<f64>() {
    return Some(seconds(secs));
  }

  let mut total = 0.0;
  let mut rest = text;
  while !rest.is_empty() {
    let number_len = rest
      .find(|c: char| !(c.is_ascii_digit() || c == '.'))
      .unwrap_or(rest.len());
    let amount: f64 = rest[..number_len].parse().ok()?;
    rest = rest[number_len..].trim_start();

    let unit_len = rest
      .find(|c: char| !c.is_ascii_alphabetic())
      .unwrap_or(rest.len());
    let factor = match &rest[..unit_len] {
      "ms" => 0.001,
      "s" | "sec" | "secs" => 1.0,
      "m" | "min" | "mins" => 60.0,
      "h" | "hr" | "hrs" => 3600.0,
      "d" | "day" | "days" => 86400.0,
      _ => return None,
    };
    total += amount * factor;
    rest = rest[unit_len..].trim_start();
  }

  Some(seconds(total))
}

fn seconds(secs: f64) -> Duration {
  if secs.is_finite() && secs > 0.0 {
    Duration::from_secs_f64(secs)
  } else {
    Duration::ZERO
  }
}
