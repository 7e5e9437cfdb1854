use crate::data::{
    RecordStatus, enum_field,
    validation::{FieldError, RawField, ValidationErrors, is_blank, optional_text, required_text},
};
use chrono::{DateTime, NaiveDate, Utc};
use email_address::EmailAddress;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

pub const STUDENT_NUMBER_WIDTH: usize = 8;
const ID_NUMBER_WIDTH: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "student_gender", rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub const ALL: [Self; 3] = [Self::Male, Self::Female, Self::Other];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

impl Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|x| x.as_str() == s).ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub fname: String,
    pub lname: String,
    pub gender: Gender,
    pub email: String,
    pub id_num: String,
    pub student_number: String,
    pub course: String,
    pub enrollment_date: DateTime<Utc>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Case-insensitive substring match over names, course and email. `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        [&self.fname, &self.lname, &self.course, &self.email]
            .into_iter()
            .any(|haystack| haystack.to_lowercase().contains(needle))
    }
}

/// Body of `POST /api/students` and `PUT /api/students/{id}`. Every field is loosely typed so
/// that missing or mistyped fields show up as validation errors rather than as a body that
/// fails to parse.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentForm {
    pub fname: RawField,
    pub lname: RawField,
    pub gender: RawField,
    pub email: RawField,
    pub id_num: RawField,
    pub student_number: RawField,
    pub course: RawField,
    pub enrollment_date: RawField,
    pub status: RawField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentNumber {
    Supplied(String),
    Generated(String),
}

impl StudentNumber {
    pub fn generate() -> Self {
        Self::Generated(generate_student_number())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Supplied(s) | Self::Generated(s) => s,
        }
    }

    pub const fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub fname: String,
    pub lname: String,
    pub gender: Gender,
    pub email: String,
    pub id_num: String,
    pub student_number: StudentNumber,
    pub course: String,
    pub enrollment_date: DateTime<Utc>,
    pub status: RecordStatus,
}

impl NewStudent {
    /// Replaces a generated student number with `fresh()`. Supplied numbers are left alone.
    pub fn regenerate_student_number(&mut self, fresh: impl FnOnce() -> String) -> bool {
        if self.student_number.is_generated() {
            self.student_number = StudentNumber::Generated(fresh());
            true
        } else {
            false
        }
    }
}

/// Zero-padded, always [`STUDENT_NUMBER_WIDTH`] digits.
pub fn generate_student_number() -> String {
    let n: u32 = rng().random_range(0..100_000_000);
    format!("{n:0width$}", width = STUDENT_NUMBER_WIDTH)
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_valid_email(s: &str) -> bool {
    EmailAddress::is_valid(s)
        && s.rsplit_once('@')
            .is_some_and(|(_, domain)| domain.contains('.') && !domain.ends_with('.'))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

impl StudentForm {
    pub fn validate(self) -> Result<NewStudent, ValidationErrors> {
        let mut errors = ValidationErrors::new("Student");

        let fname = required_text(&mut errors, "fname", self.fname, "First name is required");
        let lname = required_text(&mut errors, "lname", self.lname, "Last name is required");
        let gender = optional_text(&mut errors, "gender", self.gender);
        let gender = enum_field(&mut errors, "gender", gender, &Gender::ALL);

        let email = required_text(&mut errors, "email", self.email, "Email is required");
        if !email.is_empty() && !is_valid_email(&email) {
            errors.push(FieldError::new("email", "Please use a valid email address."));
        }

        let id_num = required_text(&mut errors, "idNum", self.id_num, "ID number is required");
        if !id_num.is_empty() && !is_digits(&id_num, ID_NUMBER_WIDTH) {
            errors.push(FieldError::new("idNum", "ID number must be 13 digits."));
        }

        let student_number = match optional_text(&mut errors, "studentNumber", self.student_number)
        {
            Some(s) => {
                if !is_digits(&s, STUDENT_NUMBER_WIDTH) {
                    errors.push(FieldError::new(
                        "studentNumber",
                        "Student number must be 8 digits.",
                    ));
                }
                StudentNumber::Supplied(s)
            }
            None => StudentNumber::generate(),
        };

        let course = required_text(&mut errors, "course", self.course, "Course is required");
        // course ids are stored in one spelling so the enrolment count on course delete sees them
        let course = Uuid::try_parse(&course).map_or(course, |id| id.to_string());

        let enrollment_date = required_text(
            &mut errors,
            "enrollmentDate",
            self.enrollment_date,
            "Enrollment date is required",
        );
        let enrollment_date = if enrollment_date.is_empty() {
            None
        } else {
            let parsed = parse_date(&enrollment_date);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    "enrollmentDate",
                    "Enrollment date must be a valid date",
                ));
            }
            parsed
        };

        let status = optional_text(&mut errors, "status", self.status);
        let status = enum_field(&mut errors, "status", status, &RecordStatus::ALL);

        errors.finish(|| NewStudent {
            fname,
            lname,
            gender,
            email,
            id_num,
            student_number,
            course,
            enrollment_date: enrollment_date.unwrap_or_default(),
            status,
        })
    }

    /// Fields present in `self` win over the ones taken from `existing`. A blank student number
    /// keeps the stored one, since on create a blank number means "generate one".
    pub fn merged_onto(self, existing: &Student) -> Self {
        let keep = |value: &str| -> RawField { Some(value.into()) };
        Self {
            fname: self.fname.or_else(|| keep(&existing.fname)),
            lname: self.lname.or_else(|| keep(&existing.lname)),
            gender: self.gender.or_else(|| keep(existing.gender.as_str())),
            email: self.email.or_else(|| keep(&existing.email)),
            id_num: self.id_num.or_else(|| keep(&existing.id_num)),
            student_number: if is_blank(&self.student_number) {
                keep(&existing.student_number)
            } else {
                self.student_number
            },
            course: self.course.or_else(|| keep(&existing.course)),
            enrollment_date: self
                .enrollment_date
                .or_else(|| keep(&existing.enrollment_date.to_rfc3339())),
            status: self.status.or_else(|| keep(existing.status.as_str())),
        }
    }
}
