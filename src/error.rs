use crate::data::validation::ValidationErrors;
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use snafu::Snafu;
use std::num::ParseIntError;
use uuid::Uuid;

pub type AppResult<T> = Result<T, AppError>;

pub const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AppError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    MigrateError { source: sqlx::migrate::MigrateError },
    #[snafu(display("Unable to parse port {:?}", original))]
    ParsePort {
        source: ParseIntError,
        original: String,
    },
    #[snafu(display("Unable to set up logging in {:?}", dir))]
    SetupLogging {
        source: tracing_appender::rolling::InitError,
        dir: String,
    },
    #[snafu(display("Unable to install the tracing subscriber"))]
    InstallSubscriber {
        source: tracing_subscriber::util::TryInitError,
    },
    #[snafu(display("{}", errors))]
    Validation { errors: ValidationErrors },
    #[snafu(display("Invalid request body: {}", source.body_text()))]
    InvalidBody { source: JsonRejection },
    #[snafu(display("Invalid query string: {}", source.body_text()))]
    InvalidQuery { source: QueryRejection },
    #[snafu(display("Course not found"))]
    MissingCourse { id: String },
    #[snafu(display("Student not found"))]
    MissingStudent { id: String },
    #[snafu(display("Cannot delete course with enrolled students"))]
    CourseHasEnrolledStudents { id: Uuid, enrolled: u64 },
    #[snafu(display("Unable to read process status from {:?}", path))]
    ReadProcessStatus {
        source: std::io::Error,
        path: String,
    },
}

impl AppError {
    pub const fn status_code(&self) -> StatusCode {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input

        match self {
            Self::OpenDatabase { .. } | Self::MakeQuery { .. } | Self::MigrateError { .. } => ISE,
            Self::ParsePort { .. } | Self::SetupLogging { .. } | Self::InstallSubscriber { .. } => {
                ISE
            }
            Self::Validation { .. } => BI,
            Self::InvalidBody { .. } | Self::InvalidQuery { .. } => BI,
            Self::MissingCourse { .. } | Self::MissingStudent { .. } => NF,
            Self::CourseHasEnrolledStudents { .. } => BI,
            Self::ReadProcessStatus { .. } => ISE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let body = if status_code.is_server_error() {
            error!(?self, "Error!");
            ErrorBody {
                message: INTERNAL_SERVER_ERROR_MESSAGE.to_string(),
                errors: None,
            }
        } else {
            debug!(?self, %status_code, "Rejected request");
            let message = self.to_string();
            let errors = match self {
                Self::Validation { errors } => Some(errors),
                _ => None,
            };
            ErrorBody { message, errors }
        };

        (status_code, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation { errors }
    }
}
