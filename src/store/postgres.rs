use crate::{
    data::{
        RecordStatus,
        course::{Course, NewCourse},
        stats::CourseEnrollment,
        student::{NewStudent, Student},
        validation::{FieldError, ValidationErrors},
    },
    error::{AppError, AppResult, MakeQuerySnafu, MigrateSnafu, OpenDatabaseSnafu},
    store::Store,
};
use async_trait::async_trait;
use chrono::Utc;
use snafu::ResultExt;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Builds the pool without touching the network, so a database that is down at startup
    /// only shows up later as failed queries and a `disconnected` health report.
    pub fn connect_lazy(options: PgPoolOptions, url: &str) -> AppResult<Self> {
        let pool = options.connect_lazy(url).context(OpenDatabaseSnafu)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!().run(&self.pool).await.context(MigrateSnafu)
    }
}

fn duplicate_field(err: &sqlx::Error) -> Option<&'static str> {
    let db_err = err.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }
    match db_err.constraint()? {
        "students_email_key" => Some("email"),
        "students_id_num_key" => Some("idNum"),
        "students_student_number_key" => Some("studentNumber"),
        _ => None,
    }
}

/// Which unique fields of a candidate student are already held by someone else.
#[derive(Debug, Default, PartialEq, Eq, sqlx::FromRow)]
struct Clashes {
    email: Option<bool>,
    id_num: Option<bool>,
    student_number: Option<bool>,
}

impl Clashes {
    /// `reported` is the field named by the violated index, kept even if the lookup raced a delete.
    fn into_errors(self, reported: &'static str) -> ValidationErrors {
        let mut errors = ValidationErrors::new("Student");
        for (field, clashed) in [
            ("email", self.email),
            ("idNum", self.id_num),
            ("studentNumber", self.student_number),
        ] {
            if clashed.unwrap_or_default() || field == reported {
                errors.push(FieldError::duplicate(field));
            }
        }
        errors
    }
}

/// `%`, `_` and `\` are matched literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

impl PostgresStore {
    /// Postgres stops at the first unique index that fails, so the other unique fields are
    /// looked up separately. `ignore` is the student being updated.
    async fn student_write_error(
        &self,
        err: sqlx::Error,
        student: &NewStudent,
        ignore: Option<Uuid>,
    ) -> AppError {
        let Some(reported) = duplicate_field(&err) else {
            return AppError::MakeQuery { source: err };
        };

        let clashes = sqlx::query_as::<_, Clashes>(
            "SELECT bool_or(email = $1) AS email, bool_or(id_num = $2) AS id_num, bool_or(student_number = $3) AS student_number FROM public.students WHERE $4::uuid IS NULL OR id <> $4",
        )
        .bind(&student.email)
        .bind(&student.id_num)
        .bind(student.student_number.as_str())
        .bind(ignore)
        .fetch_one(&self.pool)
        .await
        .unwrap_or_else(|e| {
            warn!(?e, "Unable to look up clashing student fields");
            Clashes::default()
        });

        clashes.into_errors(reported).into()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn list_courses(&self) -> AppResult<Vec<Course>> {
        sqlx::query_as::<_, Course>("SELECT * FROM public.courses ORDER BY name COLLATE \"C\" ASC")
            .fetch_all(&self.pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_course(&self, id: Uuid) -> AppResult<Option<Course>> {
        sqlx::query_as::<_, Course>("SELECT * FROM public.courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_course(&self, course: NewCourse) -> AppResult<Course> {
        let NewCourse {
            name,
            description,
            duration,
            status,
        } = course;
        let now = Utc::now();

        sqlx::query_as::<_, Course>(
            "INSERT INTO public.courses (id, name, description, duration, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(duration)
        .bind(status)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn update_course(&self, id: Uuid, course: NewCourse) -> AppResult<Option<Course>> {
        let NewCourse {
            name,
            description,
            duration,
            status,
        } = course;

        sqlx::query_as::<_, Course>(
            "UPDATE public.courses SET name = $2, description = $3, duration = $4, status = $5, updated_at = $6 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(duration)
        .bind(status)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn delete_course(&self, id: Uuid) -> AppResult<bool> {
        Ok(sqlx::query("DELETE FROM public.courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected()
            > 0)
    }

    async fn list_students(&self) -> AppResult<Vec<Student>> {
        sqlx::query_as::<_, Student>("SELECT * FROM public.students ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn search_students(&self, query: &str) -> AppResult<Vec<Student>> {
        sqlx::query_as::<_, Student>(
            "SELECT * FROM public.students WHERE fname ILIKE $1 OR lname ILIKE $1 OR course ILIKE $1 OR email ILIKE $1 ORDER BY created_at DESC",
        )
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn get_student(&self, id: Uuid) -> AppResult<Option<Student>> {
        sqlx::query_as::<_, Student>("SELECT * FROM public.students WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_student(&self, student: NewStudent) -> AppResult<Student> {
        let inserted = sqlx::query_as::<_, Student>(
            "INSERT INTO public.students (id, fname, lname, gender, email, id_num, student_number, course, enrollment_date, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&student.fname)
        .bind(&student.lname)
        .bind(student.gender)
        .bind(&student.email)
        .bind(&student.id_num)
        .bind(student.student_number.as_str())
        .bind(&student.course)
        .bind(student.enrollment_date)
        .bind(student.status)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(inserted) => Ok(inserted),
            Err(e) => Err(self.student_write_error(e, &student, None).await),
        }
    }

    async fn update_student(&self, id: Uuid, student: NewStudent) -> AppResult<Option<Student>> {
        let updated = sqlx::query_as::<_, Student>(
            "UPDATE public.students SET fname = $2, lname = $3, gender = $4, email = $5, id_num = $6, student_number = $7, course = $8, enrollment_date = $9, status = $10, updated_at = $11 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&student.fname)
        .bind(&student.lname)
        .bind(student.gender)
        .bind(&student.email)
        .bind(&student.id_num)
        .bind(student.student_number.as_str())
        .bind(&student.course)
        .bind(student.enrollment_date)
        .bind(student.status)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await;

        match updated {
            Ok(updated) => Ok(updated),
            Err(e) => Err(self.student_write_error(e, &student, Some(id)).await),
        }
    }

    async fn delete_student(&self, id: Uuid) -> AppResult<bool> {
        Ok(sqlx::query("DELETE FROM public.students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected()
            > 0)
    }

    async fn count_students(&self, status: Option<RecordStatus>) -> AppResult<u64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM public.students WHERE $1::record_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context(MakeQuerySnafu)
        .map(to_count)
    }

    async fn count_students_in_course(&self, course: &str) -> AppResult<u64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM public.students WHERE course = $1")
            .bind(course)
            .fetch_one(&self.pool)
            .await
            .context(MakeQuerySnafu)
            .map(to_count)
    }

    async fn count_courses(&self, status: Option<RecordStatus>) -> AppResult<u64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM public.courses WHERE $1::record_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context(MakeQuerySnafu)
        .map(to_count)
    }

    async fn enrollments_by_course(&self) -> AppResult<Vec<CourseEnrollment>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT course, COUNT(*) AS count FROM public.students GROUP BY course ORDER BY count DESC, course COLLATE \"C\" ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context(MakeQuerySnafu)?;

        Ok(rows
            .into_iter()
            .map(|(course, count)| CourseEnrollment {
                course,
                count: to_count(count),
            })
            .collect())
    }

    async fn is_connected(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
