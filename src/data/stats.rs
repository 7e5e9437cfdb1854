use crate::{data::RecordStatus, error::AppResult, store::Store};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseEnrollment {
    pub course: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: u64,
    pub active_students: u64,
    pub total_courses: u64,
    pub active_courses: u64,
    /// Inactive students, which is how graduation is recorded.
    pub graduates: u64,
    pub course_enrollments: Vec<CourseEnrollment>,
    pub success_rate: u64,
}

/// Percentage of students that graduated, rounded half away from zero. 0 with no students.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn success_rate(graduates: u64, total_students: u64) -> u64 {
    if total_students == 0 {
        return 0;
    }
    (graduates as f64 / total_students as f64 * 100.0).round() as u64
}

impl DashboardStats {
    /// Each count is its own store call, so under concurrent writes the numbers may disagree
    /// with each other slightly.
    pub async fn gather(store: &dyn Store) -> AppResult<Self> {
        let (
            total_students,
            active_students,
            graduates,
            total_courses,
            active_courses,
            course_enrollments,
        ) = tokio::try_join!(
            store.count_students(None),
            store.count_students(Some(RecordStatus::Active)),
            store.count_students(Some(RecordStatus::Inactive)),
            store.count_courses(None),
            store.count_courses(Some(RecordStatus::Active)),
            store.enrollments_by_course(),
        )?;

        Ok(Self {
            total_students,
            active_students,
            total_courses,
            active_courses,
            graduates,
            course_enrollments,
            success_rate: success_rate(graduates, total_students),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{course::CourseForm, student::StudentForm},
        store::MemoryStore,
    };

    fn student(n: u32, course: &str, status: &str) -> StudentForm {
        StudentForm {
            fname: Some(format!("Student{n}").into()),
            lname: Some("Test".into()),
            email: Some(format!("student{n}@example.com").into()),
            id_num: Some(format!("{n:013}").into()),
            course: Some(course.into()),
            enrollment_date: Some("2024-01-15".into()),
            status: Some(status.into()),
            ..StudentForm::default()
        }
    }

    #[test]
    fn success_rate_rounds() {
        assert_eq!(success_rate(0, 0), 0);
        assert_eq!(success_rate(5, 0), 0);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(2, 3), 67);
        assert_eq!(success_rate(1, 8), 13);
        assert_eq!(success_rate(4, 4), 100);
    }

    #[tokio::test]
    async fn empty_store_has_zeroed_stats() {
        let store = MemoryStore::new();
        let stats = DashboardStats::gather(&store).await.unwrap();
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.success_rate, 0);
        assert!(stats.course_enrollments.is_empty());
    }

    #[tokio::test]
    async fn counts_are_split_by_status_and_course() {
        let store = MemoryStore::new();
        for (n, course, status) in [
            (1, "maths", "active"),
            (2, "maths", "inactive"),
            (3, "art", "inactive"),
            (4, "maths", "active"),
        ] {
            store
                .insert_student(student(n, course, status).validate().unwrap())
                .await
                .unwrap();
        }
        store
            .insert_course(
                CourseForm {
                    name: Some("Maths".into()),
                    description: Some("Numbers".into()),
                    duration: Some(serde_json::json!(3)),
                    status: Some("inactive".into()),
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();

        let stats = DashboardStats::gather(&store).await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total_students: 4,
                active_students: 2,
                total_courses: 1,
                active_courses: 0,
                graduates: 2,
                course_enrollments: vec![
                    CourseEnrollment {
                        course: "maths".into(),
                        count: 3
                    },
                    CourseEnrollment {
                        course: "art".into(),
                        count: 1
                    },
                ],
                success_rate: 50,
            }
        );
    }
}
