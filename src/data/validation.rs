use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn duplicate(field: &'static str) -> Self {
        Self::new(field, format!("{field} must be unique"))
    }
}

/// Every rule that failed for one record, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    #[serde(skip)]
    entity: &'static str,
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub const fn new(entity: &'static str) -> Self {
        Self {
            entity,
            errors: Vec::new(),
        }
    }

    pub fn single(entity: &'static str, error: FieldError) -> Self {
        let mut errors = Self::new(entity);
        errors.push(error);
        errors
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.errors.iter().map(|e| e.field)
    }

    /// `Ok(value)` if nothing was pushed, otherwise the collected errors.
    pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} validation failed: ", self.entity)?;
        for (i, FieldError { field, message }) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

/// A form field as the client sent it. Values are coerced while validating so that one
/// wrongly typed field is reported next to the others instead of rejecting the whole body.
pub type RawField = Option<Value>;

enum Text {
    Missing,
    Present(String),
    WrongType,
}

/// Strings are trimmed, numbers and booleans are taken as their JSON text, blanks count as missing.
fn text(value: RawField) -> Text {
    let text = match value {
        None | Some(Value::Null) => return Text::Missing,
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(_) | Value::Object(_)) => return Text::WrongType,
    };
    if text.is_empty() {
        Text::Missing
    } else {
        Text::Present(text)
    }
}

fn wrong_type(field: &'static str) -> FieldError {
    FieldError::new(field, format!("{field} must be a string"))
}

/// True when `value` would be read as absent: missing, `null` or only whitespace.
pub fn is_blank(value: &RawField) -> bool {
    matches!(text(value.clone()), Text::Missing)
}

/// Optional text: `None` when absent or blank. A value that cannot be read as text is recorded.
pub fn optional_text(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: RawField,
) -> Option<String> {
    match text(value) {
        Text::Missing => None,
        Text::Present(s) => Some(s),
        Text::WrongType => {
            errors.push(wrong_type(field));
            None
        }
    }
}

/// Trimmed text, recording `message` against `field` if it ends up empty or was never sent.
pub fn required_text(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: RawField,
    message: &str,
) -> String {
    match text(value) {
        Text::Present(s) => s,
        Text::Missing => {
            errors.push(FieldError::new(field, message));
            String::new()
        }
        Text::WrongType => {
            errors.push(wrong_type(field));
            String::new()
        }
    }
}

/// A required number; numeric strings such as `"12"` are accepted.
pub fn required_number(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: RawField,
    missing: &str,
    not_a_number: &str,
) -> Option<f64> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        None | Some(Value::Null | Value::String(_)) => {
            errors.push(FieldError::new(field, missing));
            return None;
        }
        Some(_) => None,
    };
    if number.is_none() {
        errors.push(FieldError::new(field, not_a_number));
    }
    number
}
