//! File references produced by `as image|audio|video|file` conversions.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::coerce::FileKind;
use crate::error::RenderError;

/// Key under which a [`FileRef`] is embedded in JSON data.
pub const FILE_MARKER: &str = "$file";

/// A materialized file that can be handed to a component as an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
  pub path: PathBuf,
  pub filename: String,
  pub content_type: String,
}

impl FileRef {
  pub fn new(path: impl Into<PathBuf>, kind: FileKind, subtype: Option<&str>) -> Self {
    let path = path.into();
    let filename = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    Self {
      content_type: content_type(kind, subtype, &filename),
      path,
      filename,
    }
  }

  /// Embed as `{"$file": {...}}`.
  pub fn to_value(&self) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
      FILE_MARKER.to_string(),
      serde_json::to_value(self).unwrap_or(Value::Null),
    );
    Value::Object(map)
  }

  pub fn from_value(value: &Value) -> Option<Self> {
    let inner = value.as_object()?.get(FILE_MARKER)?;
    serde_json::from_value(inner.clone()).ok()
  }

  pub async fn read(&self) -> Result<Vec<u8>, RenderError> {
    Ok(tokio::fs::read(&self.path).await?)
  }
}

/// `type/subtype` for media kinds, otherwise `application/octet-stream`.
/// Without a subtype the filename's extension stands in for it.
pub fn content_type(kind: FileKind, subtype: Option<&str>, filename: &str) -> String {
  let extension = Path::new(filename)
    .extension()
    .and_then(|ext| ext.to_str())
    .filter(|ext| !ext.is_empty());

  match first_subtype(subtype).or(extension) {
    Some(subtype) if kind.is_media() => format!("{}/{}", kind.as_str(), subtype),
    _ => "application/octet-stream".to_string(),
  }
}

fn first_subtype(subtype: Option<&str>) -> Option<&str> {
  subtype
    .and_then(|s| s.split(',').next())
    .map(str::trim)
    .filter(|s| !s.is_empty())
}

/// Turn a resolved value into a file reference.
///
/// With `format=path` the value is taken to be a local path; with `base64`
/// or `url` the payload is written to a kept temporary file. Values that
/// cannot be materialized resolve to null.
pub(crate) async fn materialize(
  value: Value,
  kind: FileKind,
  subtype: Option<&str>,
  format: Option<&str>,
) -> Result<Value, RenderError> {
  if FileRef::from_value(&value).is_some() {
    return Ok(value);
  }

  let path = match (format, &value) {
    (Some("path"), Value::String(path)) => Some(PathBuf::from(path)),
    (Some("base64"), Value::String(data)) => {
      let bytes = STANDARD.decode(strip_data_url(data).trim())?;
      Some(save_temporary_file(&bytes, subtype).await?)
    }
    (Some("url"), Value::String(url)) => {
      let bytes = reqwest::get(url.as_str())
        .await?
        .error_for_status()?
        .bytes()
        .await?;
      Some(save_temporary_file(&bytes, subtype).await?)
    }
    _ => None,
  };

  Ok(match path {
    Some(path) => FileRef::new(path, kind, subtype).to_value(),
    None => Value::Null,
  })
}

/// Base64 of a file reference's contents, or of a string's bytes.
pub(crate) async fn encode_base64(value: &Value) -> Result<Value, RenderError> {
  if let Some(file) = FileRef::from_value(value) {
    let bytes = file.read().await?;
    return Ok(Value::String(STANDARD.encode(bytes)));
  }
  match value {
    Value::String(text) => Ok(Value::String(STANDARD.encode(text.as_bytes()))),
    other => Err(RenderError::coercion("base64", other)),
  }
}

fn strip_data_url(data: &str) -> &str {
  match data.strip_prefix("data:") {
    Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
    None => data,
  }
}

async fn save_temporary_file(bytes: &[u8], subtype: Option<&str>) -> Result<PathBuf, RenderError> {
  let suffix = first_subtype(subtype)
    .map(|ext| format!(".{}", ext))
    .unwrap_or_default();

  let file = tempfile::Builder::new()
    .prefix("mosaic-")
    .suffix(&suffix)
    .tempfile()?;
  let (_, path) = file.keep().map_err(|e| RenderError::Io(e.error))?;
  tokio::fs::write(&path, bytes).await?;

  debug!(path = %path.display(), size = bytes.len(), "file_materialized");
  Ok(path)
}
