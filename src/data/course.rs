use crate::data::{
    RecordStatus, enum_field,
    validation::{
        FieldError, RawField, ValidationErrors, optional_text, required_number, required_text,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub duration: f64,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CourseForm {
    pub name: RawField,
    pub description: RawField,
    pub duration: RawField,
    pub status: RawField,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCourse {
    pub name: String,
    pub description: String,
    pub duration: f64,
    pub status: RecordStatus,
}

impl CourseForm {
    pub fn validate(self) -> Result<NewCourse, ValidationErrors> {
        let mut errors = ValidationErrors::new("Course");

        let name = required_text(&mut errors, "name", self.name, "Course name is required");
        let description = required_text(
            &mut errors,
            "description",
            self.description,
            "Course description is required",
        );
        let duration = required_number(
            &mut errors,
            "duration",
            self.duration,
            "Course duration is required",
            "Course duration must be a number",
        )
        .unwrap_or_default();
        if !duration.is_finite() || duration < 0.0 {
            errors.push(FieldError::new(
                "duration",
                "Course duration must be a non-negative number",
            ));
        }
        let status = optional_text(&mut errors, "status", self.status);
        let status = enum_field(&mut errors, "status", status, &RecordStatus::ALL);

        errors.finish(|| NewCourse {
            name,
            description,
            duration,
            status,
        })
    }

    /// Fields present in `self` win over the ones taken from `existing`.
    pub fn merged_onto(self, existing: &Course) -> Self {
        Self {
            name: self.name.or_else(|| Some(existing.name.clone().into())),
            description: self
                .description
                .or_else(|| Some(existing.description.clone().into())),
            duration: self.duration.or_else(|| Some(existing.duration.into())),
            status: self
                .status
                .or_else(|| Some(existing.status.as_str().into())),
        }
    }
}
