//! Placeholder substitution for contribution templates.
//!
//! Provisions declared in a manifest reference the provider's outputs, which
//! only get concrete paths once the provider is placed in the build root.
//!
//! # Placeholder Formats
//!
//! - `$${out}` - the provider's output directory
//! - `$${output:NAME}` - a named output (`library`, `headers`, `executable`, ...)
//! - `$${package}` - the directory of the manifest that declared the provider
//!
//! A single `$` passes through unchanged. `$$${` produces a literal `$${`.
//!
//! # Example
//!
//! ```
//! use kiln_lib::placeholder::{parse, Placeholder, Segment};
//!
//! let segments = parse("-L$${out}/lib").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("-L".to_string()),
//!     Segment::Placeholder(Placeholder::Out),
//!     Segment::Literal("/lib".to_string()),
//! ]);
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  Out,
  Output(String),
  Package,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("output '{0}' is not produced by the provider")]
  UnresolvedOutput(String),

  #[error("path is not valid UTF-8: {0}")]
  NonUtf8Path(String),
}

/// Source of values for placeholders.
pub trait Resolver {
  fn resolve_out(&self) -> Result<&str, PlaceholderError>;

  fn resolve_output(&self, name: &str) -> Result<&str, PlaceholderError>;

  fn resolve_package(&self) -> Result<&str, PlaceholderError>;
}

/// Split a template into literal text and placeholders.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;
  let mut offset = 0;

  while let Some(start) = rest.find("$${") {
    // `$$${` escapes to a literal `$${`
    if start > 0 && rest.as_bytes()[start - 1] == b'$' {
      literal.push_str(&rest[..start - 1]);
      literal.push_str("$${");
      rest = &rest[start + 3..];
      offset += start + 3;
      continue;
    }

    literal.push_str(&rest[..start]);
    let body_start = start + 3;
    let end = rest[body_start..]
      .find('}')
      .ok_or(PlaceholderError::Unclosed(offset + start))?;

    if !literal.is_empty() {
      segments.push(Segment::Literal(std::mem::take(&mut literal)));
    }
    segments.push(Segment::Placeholder(parse_body(&rest[body_start..body_start + end])?));

    let consumed = body_start + end + 1;
    rest = &rest[consumed..];
    offset += consumed;
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_body(body: &str) -> Result<Placeholder, PlaceholderError> {
  match body.split_once(':') {
    None if body == "out" => Ok(Placeholder::Out),
    None if body == "package" => Ok(Placeholder::Package),
    None => Err(PlaceholderError::UnknownType(body.to_string())),
    Some(("output", name)) if !name.is_empty() => Ok(Placeholder::Output(name.to_string())),
    Some(("output", _)) => Err(PlaceholderError::Malformed(format!("missing output name in '{body}'"))),
    Some((kind, _)) => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// Parse and substitute in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  let mut result = String::with_capacity(input.len());

  for segment in &segments {
    match segment {
      Segment::Literal(text) => result.push_str(text),
      Segment::Placeholder(Placeholder::Out) => result.push_str(resolver.resolve_out()?),
      Segment::Placeholder(Placeholder::Output(name)) => result.push_str(resolver.resolve_output(name)?),
      Segment::Placeholder(Placeholder::Package) => result.push_str(resolver.resolve_package()?),
    }
  }

  Ok(result)
}
