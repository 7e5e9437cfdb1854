use crate::{
    data::course::{Course, CourseForm},
    error::{AppResult, CourseHasEnrolledStudentsSnafu, InvalidBodySnafu, MissingCourseSnafu},
    routes::{Message, parse_id},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use snafu::{OptionExt, ResultExt, ensure};

pub async fn get_courses(State(state): State<AppState>) -> AppResult<Json<Vec<Course>>> {
    let courses = state.list_courses().await?;
    info!(count = courses.len(), "Retrieved courses");
    Ok(Json(courses))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Course>> {
    let course = match parse_id(&id) {
        Some(uuid) => state.get_course(uuid).await?,
        None => None,
    }
    .context(MissingCourseSnafu { id })?;

    Ok(Json(course))
}

pub async fn post_course(
    State(state): State<AppState>,
    payload: Result<Json<CourseForm>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let Json(form) = payload.context(InvalidBodySnafu)?;
    let course = state.insert_course(form.validate()?).await?;

    info!(id = %course.id, name = %course.name, "Created course");
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn put_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CourseForm>, JsonRejection>,
) -> AppResult<Json<Course>> {
    let Json(patch) = payload.context(InvalidBodySnafu)?;
    let uuid = parse_id(&id).context(MissingCourseSnafu { id: id.clone() })?;
    let existing = state
        .get_course(uuid)
        .await?
        .context(MissingCourseSnafu { id: id.clone() })?;

    let changes = patch.merged_onto(&existing).validate()?;
    let course = state
        .update_course(uuid, changes)
        .await?
        .context(MissingCourseSnafu { id })?;

    info!(id = %course.id, "Updated course");
    Ok(Json(course))
}

/// Refuses while any student's `course` still names this course. The count and the delete are
/// separate store calls, so a student enrolled in between is not noticed.
pub async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    let uuid = parse_id(&id).context(MissingCourseSnafu { id: id.clone() })?;

    let enrolled = state.count_students_in_course(&uuid.to_string()).await?;
    ensure!(
        enrolled == 0,
        CourseHasEnrolledStudentsSnafu { id: uuid, enrolled }
    );

    ensure!(
        state.delete_course(uuid).await?,
        MissingCourseSnafu { id }
    );

    info!(%uuid, "Deleted course");
    Ok(Json(Message::new("Course deleted successfully")))
}
