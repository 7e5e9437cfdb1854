use crate::{
    data::{
        RecordStatus,
        course::{Course, NewCourse},
        stats::CourseEnrollment,
        student::{NewStudent, Student},
        validation::{FieldError, ValidationErrors},
    },
    error::{AppError, AppResult},
    store::Store,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store, used by the tests and when `DATABASE_URL` is `memory://`.
///
/// Records are kept in insertion order. The lock is only held for the duration of one call.
#[derive(Debug)]
pub struct MemoryStore {
    courses: RwLock<Vec<Course>>,
    students: RwLock<Vec<Student>>,
    connected: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(Vec::new()),
            students: RwLock::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Flips the liveness signal reported by [`Store::is_connected`].
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

fn duplicates(students: &[Student], candidate: &NewStudent, ignore: Option<Uuid>) -> AppResult<()> {
    let mut errors = ValidationErrors::new("Student");
    let others = || students.iter().filter(|s| Some(s.id) != ignore);

    if others().any(|s| s.email == candidate.email) {
        errors.push(FieldError::duplicate("email"));
    }
    if others().any(|s| s.id_num == candidate.id_num) {
        errors.push(FieldError::duplicate("idNum"));
    }
    if others().any(|s| s.student_number == candidate.student_number.as_str()) {
        errors.push(FieldError::duplicate("studentNumber"));
    }

    errors.finish(|| ()).map_err(AppError::from)
}

/// Newest first. Ties keep the later insertion in front.
fn newest_first<'a>(students: impl DoubleEndedIterator<Item = &'a Student>) -> Vec<Student> {
    let mut out: Vec<Student> = students.rev().cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

fn to_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_courses(&self) -> AppResult<Vec<Course>> {
        let mut courses = self.courses.read().await.clone();
        courses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(courses)
    }

    async fn get_course(&self, id: Uuid) -> AppResult<Option<Course>> {
        Ok(self
            .courses
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn insert_course(&self, course: NewCourse) -> AppResult<Course> {
        let NewCourse {
            name,
            description,
            duration,
            status,
        } = course;
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            name,
            description,
            duration,
            status,
            created_at: now,
            updated_at: now,
        };

        self.courses.write().await.push(course.clone());
        Ok(course)
    }

    async fn update_course(&self, id: Uuid, course: NewCourse) -> AppResult<Option<Course>> {
        let mut courses = self.courses.write().await;
        let Some(existing) = courses.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };

        let NewCourse {
            name,
            description,
            duration,
            status,
        } = course;
        existing.name = name;
        existing.description = description;
        existing.duration = duration;
        existing.status = status;
        existing.updated_at = Utc::now();

        Ok(Some(existing.clone()))
    }

    async fn delete_course(&self, id: Uuid) -> AppResult<bool> {
        let mut courses = self.courses.write().await;
        let before = courses.len();
        courses.retain(|c| c.id != id);
        Ok(courses.len() != before)
    }

    async fn list_students(&self) -> AppResult<Vec<Student>> {
        Ok(newest_first(self.students.read().await.iter()))
    }

    async fn search_students(&self, query: &str) -> AppResult<Vec<Student>> {
        let needle = query.to_lowercase();
        Ok(newest_first(
            self.students
                .read()
                .await
                .iter()
                .filter(|s| s.matches_search(&needle))
                .collect::<Vec<_>>()
                .into_iter(),
        ))
    }

    async fn get_student(&self, id: Uuid) -> AppResult<Option<Student>> {
        Ok(self
            .students
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn insert_student(&self, student: NewStudent) -> AppResult<Student> {
        let mut students = self.students.write().await;
        duplicates(&students, &student, None)?;

        let NewStudent {
            fname,
            lname,
            gender,
            email,
            id_num,
            student_number,
            course,
            enrollment_date,
            status,
        } = student;
        let now = Utc::now();
        let student = Student {
            id: Uuid::new_v4(),
            fname,
            lname,
            gender,
            email,
            id_num,
            student_number: student_number.as_str().to_string(),
            course,
            enrollment_date,
            status,
            created_at: now,
            updated_at: now,
        };

        students.push(student.clone());
        Ok(student)
    }

    async fn update_student(&self, id: Uuid, student: NewStudent) -> AppResult<Option<Student>> {
        let mut students = self.students.write().await;
        if !students.iter().any(|s| s.id == id) {
            return Ok(None);
        }
        duplicates(&students, &student, Some(id))?;

        let Some(existing) = students.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        let NewStudent {
            fname,
            lname,
            gender,
            email,
            id_num,
            student_number,
            course,
            enrollment_date,
            status,
        } = student;
        existing.fname = fname;
        existing.lname = lname;
        existing.gender = gender;
        existing.email = email;
        existing.id_num = id_num;
        existing.student_number = student_number.as_str().to_string();
        existing.course = course;
        existing.enrollment_date = enrollment_date;
        existing.status = status;
        existing.updated_at = Utc::now();

        Ok(Some(existing.clone()))
    }

    async fn delete_student(&self, id: Uuid) -> AppResult<bool> {
        let mut students = self.students.write().await;
        let before = students.len();
        students.retain(|s| s.id != id);
        Ok(students.len() != before)
    }

    async fn count_students(&self, status: Option<RecordStatus>) -> AppResult<u64> {
        Ok(to_count(
            self.students
                .read()
                .await
                .iter()
                .filter(|s| status.is_none_or(|status| s.status == status))
                .count(),
        ))
    }

    async fn count_students_in_course(&self, course: &str) -> AppResult<u64> {
        Ok(to_count(
            self.students
                .read()
                .await
                .iter()
                .filter(|s| s.course == course)
                .count(),
        ))
    }

    async fn count_courses(&self, status: Option<RecordStatus>) -> AppResult<u64> {
        Ok(to_count(
            self.courses
                .read()
                .await
                .iter()
                .filter(|c| status.is_none_or(|status| c.status == status))
                .count(),
        ))
    }

    async fn enrollments_by_course(&self) -> AppResult<Vec<CourseEnrollment>> {
        let mut groups: HashMap<String, u64> = HashMap::new();
        for student in self.students.read().await.iter() {
            *groups.entry(student.course.clone()).or_default() += 1;
        }

        let mut enrollments: Vec<CourseEnrollment> = groups
            .into_iter()
            .map(|(course, count)| CourseEnrollment { course, count })
            .collect();
        enrollments.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.course.cmp(&b.course)));
        Ok(enrollments)
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn close(&self) {
        self.set_connected(false);
    }
}
