//! Parameter accumulation and portable `@name` marker rewriting.

use std::sync::OnceLock;

use regex::Regex;

use crate::command::Parameter;
use crate::dialect::ParameterStyle;
use crate::error::{Error, Result};
use crate::metadata::ParameterDirection;
use crate::value::{SqlType, SqlValue};

/// Ordered, de-duplicated parameter list for one command.
///
/// Every call to [`ParameterList::bind`] yields a parameter with a name not
/// used before, so a column repeated in several clauses never collides with
/// itself. Only parameters bound through [`ParameterList::bind_shared`] are
/// ever referenced twice.
#[derive(Debug, Clone)]
pub struct ParameterList {
    style: ParameterStyle,
    parameters: Vec<Parameter>,
    // requested name -> index, for parameters bound through bind_shared
    shared: Vec<(String, usize)>,
}

impl ParameterList {
    /// Creates an empty list rendering placeholders in `style`.
    #[must_use]
    pub const fn new(style: ParameterStyle) -> Self {
        Self {
            style,
            parameters: Vec::new(),
            shared: Vec::new(),
        }
    }

    /// Returns the placeholder style.
    #[must_use]
    pub const fn style(&self) -> ParameterStyle {
        self.style
    }

    /// Binds a new parameter and returns its placeholder.
    pub fn bind(&mut self, name: &str, value: SqlValue, sql_type: SqlType) -> String {
        let name = self.unique_name(name);
        self.parameters.push(Parameter::new(name, value, sql_type));
        self.placeholder(self.parameters.len() - 1)
    }

    /// Binds a parameter that may be referenced more than once.
    ///
    /// Named and numbered styles reuse an earlier shared parameter of the
    /// same name; the positional style needs one parameter per reference.
    /// Parameters from [`ParameterList::bind`] are never reused, so a marker
    /// cannot pick up a column value that happens to share its name.
    pub fn bind_shared(&mut self, name: &str, value: SqlValue, sql_type: SqlType) -> String {
        if !matches!(self.style, ParameterStyle::Positional) {
            if let Some(index) = self.shared_index(name) {
                return self.placeholder(index);
            }
        }
        let placeholder = self.bind(name, value, sql_type);
        self.shared.push((name.to_string(), self.parameters.len() - 1));
        placeholder
    }

    /// Returns whether a shared parameter was bound for `name`.
    #[must_use]
    pub fn contains_shared(&self, name: &str) -> bool {
        self.shared_index(name).is_some()
    }

    fn shared_index(&self, name: &str) -> Option<usize> {
        self.shared
            .iter()
            .find(|(requested, _)| requested.eq_ignore_ascii_case(name))
            .map(|(_, index)| *index)
    }

    /// Returns whether a parameter with `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns the number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns whether no parameters are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Returns the bound parameters.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sets the direction of the parameter at `index`.
    pub(crate) fn set_direction(&mut self, index: usize, direction: ParameterDirection) {
        if let Some(parameter) = self.parameters.get_mut(index) {
            parameter.direction = direction;
        }
    }

    /// Consumes the list.
    #[must_use]
    pub fn into_parameters(self) -> Vec<Parameter> {
        self.parameters
    }

    fn placeholder(&self, index: usize) -> String {
        match self.style {
            ParameterStyle::Positional => "?".to_string(),
            ParameterStyle::Numbered(prefix) => format!("{prefix}{}", index + 1),
            ParameterStyle::Named(prefix) => format!("{prefix}{}", self.parameters[index].name),
        }
    }

    fn unique_name(&self, name: &str) -> String {
        let base: String = name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        let base = if base.is_empty() { "p".to_string() } else { base };
        if !self.contains(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or(base)
    }
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // string literals and @@variables are matched so they can be skipped
    PATTERN.get_or_init(|| {
        Regex::new(r"'(?:[^']|'')*'|@@\w+|@(\w+)").expect("valid parameter marker pattern")
    })
}

/// Returns the `@name` markers referenced by `text`, in order of first use.
#[must_use]
pub fn referenced_markers(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for captures in marker_pattern().captures_iter(text) {
        if let Some(name) = captures.get(1) {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name.as_str())) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Rewrites the `@name` markers of a where-text fragment into the
/// placeholders of `params`.
///
/// Every referenced marker must be supplied. Supplied values that the text
/// never references are bound anyway for named styles, where the provider
/// tolerates extras, and dropped for positional and numbered styles.
///
/// # Errors
///
/// Returns [`Error::Mapping`] when a marker has no supplied value.
pub fn rewrite_markers(
    text: &str,
    supplied: &[(String, SqlValue)],
    params: &mut ParameterList,
) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for captures in marker_pattern().captures_iter(text) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let (_, value) = supplied
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.as_str()))
            .ok_or_else(|| {
                Error::Mapping(format!(
                    "where text references @{} but no such parameter was supplied",
                    name.as_str()
                ))
            })?;
        output.push_str(&text[last..whole.start()]);
        output.push_str(&params.bind_shared(name.as_str(), value.clone(), value.sql_type()));
        last = whole.end();
    }
    output.push_str(&text[last..]);

    if matches!(params.style(), ParameterStyle::Named(_)) {
        for (name, value) in supplied {
            if !params.contains_shared(name) {
                params.bind(name, value.clone(), value.sql_type());
            }
        }
    }
    Ok(output)
}
