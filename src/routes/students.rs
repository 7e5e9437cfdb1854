use crate::{
    data::student::{NewStudent, Student, StudentForm, generate_student_number},
    error::{AppError, AppResult, InvalidBodySnafu, InvalidQuerySnafu, MissingStudentSnafu},
    routes::{Message, parse_id},
    state::AppState,
    store::Store,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, ensure};

const STUDENT_NUMBER_ATTEMPTS: usize = 5;

pub async fn get_students(State(state): State<AppState>) -> AppResult<Json<Vec<Student>>> {
    let students = state.list_students().await?;
    info!(count = students.len(), "Retrieved students");
    Ok(Json(students))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

/// A missing or blank `q` lists everyone.
pub async fn search_students(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Student>>> {
    let Query(SearchQuery { q }) = query.context(InvalidQuerySnafu)?;
    let q = q.as_deref().map(str::trim).unwrap_or_default();

    let students = if q.is_empty() {
        state.list_students().await?
    } else {
        state.search_students(q).await?
    };

    info!(query = q, count = students.len(), "Searched students");
    Ok(Json(students))
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Student>> {
    let student = match parse_id(&id) {
        Some(uuid) => state.get_student(uuid).await?,
        None => None,
    }
    .context(MissingStudentSnafu { id })?;

    Ok(Json(student))
}

fn only_student_number_clashed(err: &AppError) -> bool {
    matches!(err, AppError::Validation { errors } if errors.fields().eq(["studentNumber"]))
}

/// Generated student numbers that turn out to be taken are replaced and the insert is tried
/// again, up to [`STUDENT_NUMBER_ATTEMPTS`] times. A number the client chose is never replaced.
pub async fn insert_with_unique_number(store: &dyn Store, student: NewStudent) -> AppResult<Student> {
    insert_retrying(store, student, generate_student_number).await
}

async fn insert_retrying(
    store: &dyn Store,
    mut student: NewStudent,
    mut fresh_number: impl FnMut() -> String + Send,
) -> AppResult<Student> {
    let mut attempt = 1;
    loop {
        match store.insert_student(student.clone()).await {
            Err(e)
                if attempt < STUDENT_NUMBER_ATTEMPTS
                    && student.student_number.is_generated()
                    && only_student_number_clashed(&e) =>
            {
                warn!(attempt, "Generated student number already taken, regenerating");
                student.regenerate_student_number(&mut fresh_number);
                attempt += 1;
            }
            result => return result,
        }
    }
}

pub async fn post_student(
    State(state): State<AppState>,
    payload: Result<Json<StudentForm>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Student>)> {
    let Json(form) = payload.context(InvalidBodySnafu)?;
    let student = insert_with_unique_number(&*state, form.validate()?).await?;

    info!(id = %student.id, student_number = %student.student_number, "Created student");
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn put_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StudentForm>, JsonRejection>,
) -> AppResult<Json<Student>> {
    let Json(patch) = payload.context(InvalidBodySnafu)?;
    let uuid = parse_id(&id).context(MissingStudentSnafu { id: id.clone() })?;
    let existing = state
        .get_student(uuid)
        .await?
        .context(MissingStudentSnafu { id: id.clone() })?;

    let changes = patch.merged_onto(&existing).validate()?;
    let student = state
        .update_student(uuid, changes)
        .await?
        .context(MissingStudentSnafu { id })?;

    info!(id = %student.id, "Updated student");
    Ok(Json(student))
}

pub async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    let uuid = parse_id(&id).context(MissingStudentSnafu { id: id.clone() })?;
    ensure!(
        state.delete_student(uuid).await?,
        MissingStudentSnafu { id }
    );

    info!(%uuid, "Deleted student");
    Ok(Json(Message::new("Student deleted successfully")))
}
