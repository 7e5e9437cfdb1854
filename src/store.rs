use crate::{
    data::{
        RecordStatus,
        course::{Course, NewCourse},
        stats::CourseEnrollment,
        student::{NewStudent, Student},
    },
    error::AppResult,
};
use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Persistence for students and courses.
///
/// Uniqueness of a student's `email`, `idNum` and `studentNumber` is enforced here, and a
/// violation comes back as [`crate::error::AppError::Validation`] naming the offending fields.
/// Every method is a single independent operation: nothing is held between calls.
#[async_trait]
pub trait Store: Debug + Send + Sync {
    /// All courses, ordered by name (byte order, so case-sensitive).
    async fn list_courses(&self) -> AppResult<Vec<Course>>;
    async fn get_course(&self, id: Uuid) -> AppResult<Option<Course>>;
    async fn insert_course(&self, course: NewCourse) -> AppResult<Course>;
    /// `None` if there was no course with that id.
    async fn update_course(&self, id: Uuid, course: NewCourse) -> AppResult<Option<Course>>;
    /// `false` if there was no course with that id.
    async fn delete_course(&self, id: Uuid) -> AppResult<bool>;

    /// All students, newest first.
    async fn list_students(&self) -> AppResult<Vec<Student>>;
    /// Students whose names, course or email contain `query`, ignoring case. Newest first.
    async fn search_students(&self, query: &str) -> AppResult<Vec<Student>>;
    async fn get_student(&self, id: Uuid) -> AppResult<Option<Student>>;
    async fn insert_student(&self, student: NewStudent) -> AppResult<Student>;
    async fn update_student(&self, id: Uuid, student: NewStudent) -> AppResult<Option<Student>>;
    async fn delete_student(&self, id: Uuid) -> AppResult<bool>;

    async fn count_students(&self, status: Option<RecordStatus>) -> AppResult<u64>;
    async fn count_students_in_course(&self, course: &str) -> AppResult<u64>;
    async fn count_courses(&self, status: Option<RecordStatus>) -> AppResult<u64>;
    /// Students grouped by their `course` field, largest group first.
    async fn enrollments_by_course(&self) -> AppResult<Vec<CourseEnrollment>>;

    async fn is_connected(&self) -> bool;
    async fn close(&self);
}
