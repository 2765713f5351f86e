use serde_json::Value;

/// One step of a key path: `name` or `[n]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Key(String),
  Index(usize),
}

/// Split a path such as `items[0].name` into segments.
///
/// Word runs (`[-_A-Za-z0-9]` and other alphanumerics) become keys and
/// `[digits]` becomes an index; any other character only separates segments.
pub fn segments(path: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut word = String::new();
  let mut chars = path.char_indices().peekable();

  while let Some((i, c)) = chars.next() {
    if c.is_alphanumeric() || c == '_' || c == '-' {
      word.push(c);
      continue;
    }
    if !word.is_empty() {
      segments.push(Segment::Key(std::mem::take(&mut word)));
    }
    if c == '[' {
      let rest = &path[i + 1..];
      let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
      if !digits.is_empty()
        && rest[digits.len()..].starts_with(']')
        && let Ok(index) = digits.parse()
      {
        segments.push(Segment::Index(index));
        for _ in 0..=digits.len() {
          chars.next();
        }
      }
    }
  }
  if !word.is_empty() {
    segments.push(Segment::Key(word));
  }

  segments
}

/// Walk `path` into `source`. Any missing key, out-of-range index or type
/// mismatch yields `Value::Null`.
pub fn resolve(source: &Value, path: Option<&str>) -> Value {
  let Some(path) = path else {
    return source.clone();
  };

  let mut current = source;
  for segment in segments(path) {
    let next = match (&segment, current) {
      (Segment::Key(key), Value::Object(map)) => map.get(key),
      (Segment::Index(index), Value::Array(items)) => items.get(*index),
      _ => None,
    };
    match next {
      Some(value) => current = value,
      None => return Value::Null,
    }
  }

  current.clone()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_segments() {
    assert_eq!(
      segments("items[0].first-name"),
      vec![
        Segment::Key("items".to_string()),
        Segment::Index(0),
        Segment::Key("first-name".to_string()),
      ]
    );
    assert_eq!(segments("[12]"), vec![Segment::Index(12)]);
  }

  #[test]
  fn test_resolve_nested() {
    let source = json!({ "a": { "b": [10, { "c": "deep" }] } });
    assert_eq!(resolve(&source, Some("a.b[1].c")), json!("deep"));
    assert_eq!(resolve(&source, Some("a.b[0]")), json!(10));
  }

  #[test]
  fn test_resolve_failures_are_null() {
    let source = json!({ "a": 5, "list": [1] });
    assert_eq!(resolve(&source, Some("a.b")), Value::Null);
    assert_eq!(resolve(&source, Some("missing")), Value::Null);
    assert_eq!(resolve(&source, Some("list[3]")), Value::Null);
    assert_eq!(resolve(&source, Some("list.x")), Value::Null);
  }

  #[test]
  fn test_resolve_without_path() {
    let source = json!([1, 2]);
    assert_eq!(resolve(&source, None), source);
  }
}
