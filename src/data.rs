use crate::data::validation::{FieldError, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

pub mod course;
pub mod stats;
pub mod student;
pub mod validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "record_status", rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    pub const ALL: [Self; 2] = [Self::Active, Self::Inactive];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|x| x.as_str() == s).ok_or(())
    }
}

/// Parses an optional enum field, falling back to the default when absent and
/// recording `field` when the text matches no variant.
pub(crate) fn enum_field<T: FromStr + Default + Display + Copy>(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<String>,
    all: &[T],
) -> T {
    let Some(value) = value else {
        return T::default();
    };
    value.trim().parse().unwrap_or_else(|_| {
        let allowed = all
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let mut name = field.to_string();
        if let Some(first) = name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        errors.push(FieldError::new(
            field,
            format!("{name} must be one of: {allowed}"),
        ));
        T::default()
    })
}
