//! Template expression grammar.
//!
//! An expression has the shape:
//!
//! ```text
//! ${ key[index].path as type/subtype;format | default @(name value) ... }
//! ```
//!
//! Every part after `key` is optional. Expressions are located by a leftmost
//! scan over the text; a `${` that does not start a well-formed expression is
//! treated as literal text and scanning resumes one character later.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A `@(name value)` annotation attached to an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
  pub name: String,
  pub value: String,
}

/// The `as type/subtype;format` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
  pub kind: String,
  pub subtype: Option<String>,
  pub format: Option<String>,
}

/// A parsed template expression and its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
  /// Source key (`input`, `result`, `gateway:8080`, ...).
  pub key: String,
  /// Optional `[n]` index applied to the source itself.
  pub index: Option<usize>,
  /// Dotted/bracketed accessor into the source value.
  pub path: Option<String>,
  pub conversion: Option<Conversion>,
  /// Fallback text with escapes removed, rendered on demand when the value
  /// resolves to null.
  pub default: Option<String>,
  pub annotations: Vec<Annotation>,
  pub span: Range<usize>,
}

/// Failure to parse a standalone expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid template expression at offset {offset}: {message}")]
pub struct ParseError {
  pub offset: usize,
  pub message: String,
}

impl Expression {
  /// Parse a single expression that must cover all of `text`.
  pub fn parse(text: &str) -> Result<Self, ParseError> {
    let expr = Parser::new(text, 0).expression()?;
    if expr.span.end != text.len() {
      return Err(ParseError {
        offset: expr.span.end,
        message: "unexpected text after expression".to_string(),
      });
    }
    Ok(expr)
  }

  /// True for the bare pass-through form, e.g. `${input}` or `${output}`.
  pub fn is_bare(&self, key: &str) -> bool {
    self.key == key
      && self.index.is_none()
      && self.path.is_none()
      && self.conversion.is_none()
      && self.default.is_none()
      && self.annotations.is_empty()
  }

  pub fn kind(&self) -> Option<&str> {
    self.conversion.as_ref().map(|c| c.kind.as_str())
  }

  pub fn subtype(&self) -> Option<&str> {
    self.conversion.as_ref().and_then(|c| c.subtype.as_deref())
  }

  pub fn format(&self) -> Option<&str> {
    self.conversion.as_ref().and_then(|c| c.format.as_deref())
  }
}

/// Find all expressions in `text`, leftmost first, without overlap.
pub fn scan(text: &str) -> Vec<Expression> {
  let mut expressions = Vec::new();
  let mut pos = 0;

  while let Some(offset) = text[pos..].find("${") {
    let start = pos + offset;
    match Parser::new(text, start).expression() {
      Ok(expr) => {
        pos = expr.span.end;
        expressions.push(expr);
      }
      Err(_) => pos = start + 1,
    }
  }

  expressions
}

/// True when `text` is exactly one `${key}` expression with nothing else.
pub fn is_bare_reference(text: &str, key: &str) -> bool {
  Expression::parse(text).is_ok_and(|expr| expr.is_bare(key))
}

struct Parser<'a> {
  text: &'a str,
  bytes: &'a [u8],
  start: usize,
  pos: usize,
}

impl<'a> Parser<'a> {
  fn new(text: &'a str, start: usize) -> Self {
    Self {
      text,
      bytes: text.as_bytes(),
      start,
      pos: start,
    }
  }

  fn expression(mut self) -> Result<Expression, ParseError> {
    self.expect("${")?;
    self.skip_whitespace();

    let key = self.key()?;
    let index = self.index()?;
    let path = self.path()?;
    self.skip_whitespace();
    let conversion = self.conversion()?;
    self.skip_whitespace();
    let default = self.default_value()?;
    self.skip_whitespace();
    let annotations = self.annotations()?;
    self.skip_whitespace();
    self.expect("}")?;

    Ok(Expression {
      key,
      index,
      path,
      conversion,
      default,
      annotations,
      span: self.start..self.pos,
    })
  }

  fn key(&mut self) -> Result<String, ParseError> {
    match self.peek() {
      Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
      _ => return Err(self.error("expected source key")),
    }
    let key = self.take_while(|b| !matches!(b, b'.' | b'[' | b'}' | b'|') && !b.is_ascii_whitespace());
    Ok(key.to_string())
  }

  fn index(&mut self) -> Result<Option<usize>, ParseError> {
    if self.peek() != Some(b'[') {
      return Ok(None);
    }
    self.pos += 1;
    let digits = self.take_while(|b| b.is_ascii_digit());
    let index = digits
      .parse::<usize>()
      .map_err(|_| self.error("expected index digits"))?;
    self.expect("]")?;
    Ok(Some(index))
  }

  fn path(&mut self) -> Result<Option<String>, ParseError> {
    if self.peek() != Some(b'.') {
      return Ok(None);
    }
    self.pos += 1;
    let path = self.take_while(|b| !matches!(b, b'|' | b'}') && !b.is_ascii_whitespace());
    if path.is_empty() {
      return Err(self.error("expected path after '.'"));
    }
    Ok(Some(path.to_string()))
  }

  fn conversion(&mut self) -> Result<Option<Conversion>, ParseError> {
    if !self.starts_with("as") {
      return Ok(None);
    }
    self.pos += 2;
    self.skip_whitespace();

    let kind = self.take_while(|b| !matches!(b, b'/' | b';' | b'}' | b'|') && !b.is_ascii_whitespace());
    if kind.is_empty() {
      return Err(self.error("expected type after 'as'"));
    }

    let subtype = if self.peek() == Some(b'/') {
      self.pos += 1;
      let subtype = self.take_while(|b| !matches!(b, b';' | b'}' | b'|') && !b.is_ascii_whitespace());
      Some(subtype.to_string())
    } else {
      None
    };

    let format = if self.peek() == Some(b';') {
      self.pos += 1;
      let format = self.take_while(|b| !matches!(b, b'}' | b'|') && !b.is_ascii_whitespace());
      Some(format.to_string())
    } else {
      None
    };

    Ok(Some(Conversion {
      kind: kind.to_string(),
      subtype: subtype.filter(|s| !s.is_empty()),
      format: format.filter(|s| !s.is_empty()),
    }))
  }

  /// Default text runs to the first unbalanced `}` or to an `@(` annotation.
  /// Escapes are removed as in annotation values.
  fn default_value(&mut self) -> Result<Option<String>, ParseError> {
    if self.peek() != Some(b'|') {
      return Ok(None);
    }
    self.pos += 1;
    self.skip_whitespace();

    let begin = self.pos;
    let mut depth = 0usize;

    while let Some(b) = self.peek() {
      match b {
        b'\\' if self.is_escape() => self.pos += 2,
        b'{' => {
          depth += 1;
          self.pos += 1;
        }
        b'}' if depth > 0 => {
          depth -= 1;
          self.pos += 1;
        }
        b'}' => break,
        b'@' if depth == 0 && self.bytes.get(self.pos + 1) == Some(&b'(') => break,
        _ => self.advance_char(),
      }
    }

    let default = self.text[begin..self.pos].trim_end();
    if default.is_empty() {
      return Err(self.error("expected default value after '|'"));
    }
    Ok(Some(unescape(default)))
  }

  fn annotations(&mut self) -> Result<Vec<Annotation>, ParseError> {
    let mut annotations = Vec::new();

    while self.starts_with("@(") {
      self.pos += 2;
      self.skip_whitespace();

      let name = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
      if name.is_empty() {
        return Err(self.error("expected annotation name"));
      }
      let name = name.to_string();

      if !self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
        return Err(self.error("expected whitespace after annotation name"));
      }
      self.skip_whitespace();

      let begin = self.pos;
      loop {
        match self.peek() {
          None => return Err(self.error("unterminated annotation")),
          Some(b')') if self.closes_annotation() => break,
          Some(b'\\') if self.is_escape() => self.pos += 2,
          Some(_) => self.advance_char(),
        }
      }

      let value = unescape(self.text[begin..self.pos].trim_end());
      if value.is_empty() {
        return Err(self.error("expected annotation value"));
      }
      self.pos += 1;
      self.skip_whitespace();

      annotations.push(Annotation { name, value });
    }

    Ok(annotations)
  }

  /// A `)` closes an annotation only when followed by another `@(` or the final `}`.
  fn closes_annotation(&self) -> bool {
    let rest = self.text[self.pos + 1..].trim_start();
    rest.starts_with("@(") || rest.starts_with('}')
  }

  fn is_escape(&self) -> bool {
    matches!(
      self.bytes.get(self.pos + 1),
      Some(b'$' | b'@' | b'{' | b'}')
    )
  }

  fn peek(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  fn starts_with(&self, s: &str) -> bool {
    self.text[self.pos..].starts_with(s)
  }

  fn expect(&mut self, s: &str) -> Result<(), ParseError> {
    if self.starts_with(s) {
      self.pos += s.len();
      Ok(())
    } else {
      Err(self.error(&format!("expected '{}'", s)))
    }
  }

  fn advance_char(&mut self) {
    self.pos += self.text[self.pos..]
      .chars()
      .next()
      .map_or(1, char::len_utf8);
  }

  fn skip_whitespace(&mut self) {
    while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
      self.pos += 1;
    }
  }

  /// Delimiters are all ASCII, so stopping on one always lands on a char boundary.
  fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
    let begin = self.pos;
    while self.peek().is_some_and(&pred) {
      self.pos += 1;
    }
    &self.text[begin..self.pos]
  }

  fn error(&self, message: &str) -> ParseError {
    ParseError {
      offset: self.pos,
      message: message.to_string(),
    }
  }
}

fn unescape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '\\'
      && let Some(&next) = chars.peek()
      && matches!(next, '$' | '@' | '{' | '}')
    {
      out.push(next);
      chars.next();
      continue;
    }
    out.push(c);
  }
  out
}
