//! Mosaic Template
//!
//! Template expressions embedded in compose files, e.g.
//! `${input.image as image/png;base64 | ${context.fallback}}`.
//!
//! [`scan`] locates expressions in text, [`VariableRenderer`] resolves them
//! against a [`SourceResolver`] and applies the requested conversions.
//! Static analysis (schema extraction, env interpolation) works directly on
//! the parsed [`Expression`]s.

mod coerce;
mod error;
mod expr;
mod file;
mod path;
mod renderer;

pub use coerce::{FileKind, ValueType, coerce_value, parse_literal};
pub use error::{RenderError, SourceError};
pub use expr::{Annotation, Conversion, Expression, ParseError, is_bare_reference, scan};
pub use file::{FILE_MARKER, FileRef, content_type};
pub use path::{Segment, resolve as resolve_path, segments as path_segments};
pub use renderer::{SourceResolver, VariableRenderer, stringify};
