//! Database object names.

use std::fmt;

use crate::error::{Error, Result};

/// A possibly schema-qualified object name.
///
/// Parsing strips `"double"`, `[bracket]` and `` `backtick` `` delimiters so
/// the same object is found however the caller quoted it. Comparison is
/// case-insensitive through [`ObjectName::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName {
    /// Schema, if the name was qualified.
    pub schema: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectName {
    /// Creates an unqualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Creates a schema-qualified name.
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parses `name`, `schema.name`, or any quoted variant of those.
    ///
    /// # Errors
    ///
    /// Fails on empty names, unbalanced delimiters, or more than two parts.
    pub fn parse(input: &str) -> Result<Self> {
        let parts = split_parts(input.trim())?;
        match parts.as_slice() {
            [name] => Ok(Self::new(name.clone())),
            [schema, name] => Ok(Self::qualified(schema.clone(), name.clone())),
            _ => Err(Error::InvalidArgument(format!(
                "'{input}' is not a valid object name"
            ))),
        }
    }

    /// Returns the case-insensitive cache key.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema.to_lowercase(), self.name.to_lowercase()),
            None => self.name.to_lowercase(),
        }
    }

    /// Returns whether `other` names the same object, ignoring case.
    ///
    /// An unqualified name matches a qualified one with the same object name.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        if !self.name.eq_ignore_ascii_case(&other.name) {
            return false;
        }
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

fn split_parts(input: &str) -> Result<Vec<String>> {
    let invalid = || Error::InvalidArgument(format!("'{input}' is not a valid object name"));
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    for c in input.chars() {
        match closing {
            Some(close) if c == close => closing = None,
            Some(_) => current.push(c),
            None => match c {
                '"' => closing = Some('"'),
                '`' => closing = Some('`'),
                '[' => closing = Some(']'),
                '.' => {
                    if current.is_empty() {
                        return Err(invalid());
                    }
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }

    if closing.is_some() || current.is_empty() {
        return Err(invalid());
    }
    parts.push(current);
    Ok(parts)
}
