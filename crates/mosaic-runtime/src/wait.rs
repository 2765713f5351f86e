//! Sleep computations for `delay` and `wait` jobs.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use mosaic_config::parse_duration;
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
];

/// A rendered duration; unset or unparsable durations do not sleep.
pub fn interval(duration: Option<&Value>) -> Duration {
  duration.and_then(parse_duration).unwrap_or(Duration::ZERO)
}

/// Time left from `now` until the rendered `time`, zero once it has passed.
pub fn until(time: &Value, timezone: Option<&Value>, now: DateTime<Utc>) -> Result<Duration, String> {
  let Some(text) = time.as_str() else {
    return Err(format!("invalid wait time: {}", time));
  };
  let offset = match timezone.and_then(Value::as_str) {
    Some(zone) => parse_offset(zone).ok_or_else(|| format!("invalid timezone: {}", zone))?,
    None => FixedOffset::east_opt(0).ok_or("invalid timezone")?,
  };
  let target = parse_datetime(text, offset).ok_or_else(|| format!("invalid wait time: {}", text))?;

  Ok((target.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO))
}

/// RFC 3339, or a local `YYYY-MM-DD HH:MM[:SS]` in `offset`.
fn parse_datetime(text: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
  let text = text.trim();
  if let Ok(time) = DateTime::parse_from_rfc3339(text) {
    return Some(time);
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    .and_then(|naive| offset.from_local_datetime(&naive).single())
}

/// `UTC`, `Z`, `+09:00`, `-0530` or `+9`.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
  let zone = zone.trim();
  if zone.eq_ignore_ascii_case("utc") || zone.eq_ignore_ascii_case("z") {
    return FixedOffset::east_opt(0);
  }

  let (sign, rest) = match zone.as_bytes().first()? {
    b'+' => (1, &zone[1..]),
    b'-' => (-1, &zone[1..]),
    _ => return None,
  };
  let (hours, minutes) = match rest.split_once(':') {
    Some((h, m)) => (h, m),
    None if rest.len() == 4 => rest.split_at(2),
    None => (rest, "0"),
  };
  let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
  FixedOffset::east_opt(sign * seconds)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
  }

  #[test]
  fn test_interval() {
    assert_eq!(interval(Some(&json!("1m30s"))), Duration::from_secs(90));
    assert_eq!(interval(Some(&json!(2))), Duration::from_secs(2));
    assert_eq!(interval(None), Duration::ZERO);
    assert_eq!(interval(Some(&json!("soon"))), Duration::ZERO);
  }

  #[test]
  fn test_until_rfc3339() {
    let left = until(&json!("2024-05-01T12:00:30Z"), None, now()).unwrap();
    assert_eq!(left, Duration::from_secs(30));
  }

  #[test]
  fn test_until_local_time_with_offset() {
    let left = until(&json!("2024-05-01 21:01"), Some(&json!("+09:00")), now()).unwrap();
    assert_eq!(left, Duration::from_secs(60));
  }

  #[test]
  fn test_until_past_time() {
    let left = until(&json!("2024-05-01 11:00:00"), Some(&json!("UTC")), now()).unwrap();
    assert_eq!(left, Duration::ZERO);
  }

  #[test]
  fn test_until_invalid() {
    assert!(until(&json!("tomorrow"), None, now()).is_err());
    assert!(until(&json!("2024-05-01 12:00"), Some(&json!("Mars/Olympus")), now()).is_err());
    assert!(until(&json!(42), None, now()).is_err());
  }

  #[test]
  fn test_parse_offset() {
    assert_eq!(parse_offset("-0530"), FixedOffset::west_opt(5 * 3600 + 30 * 60));
    assert_eq!(parse_offset("+9"), FixedOffset::east_opt(9 * 3600));
  }
}
