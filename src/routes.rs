use crate::{
    error::ErrorBody,
    request_log::{handle_panic, log_requests},
    routes::{
        courses::{delete_course, get_course, get_courses, post_course, put_course},
        dashboard::get_dashboard_stats,
        health::{get_detailed_health, get_health},
        students::{
            delete_student, get_student, get_students, post_student, put_student, search_students,
        },
    },
    state::AppState,
};
use axum::{
    Json, Router,
    handler::HandlerWithoutStateExt,
    http::{StatusCode, Uri},
    middleware,
    routing::get,
};
use serde::Serialize;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

pub mod courses;
pub mod dashboard;
pub mod health;
pub mod students;

#[derive(Debug, Serialize)]
pub struct Message {
    message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Ids that don't parse can't name anything, so callers treat them like a missing record.
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::try_parse(raw.trim()).ok()
}

pub async fn route_not_found(uri: Uri) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            message: format!("Route not found: {}", uri.path()),
            errors: None,
        }),
    )
}

pub fn app(state: AppState) -> Router {
    let static_dir = state.config().server_config().static_dir().clone();

    let router = Router::new()
        .route("/api/courses", get(get_courses).post(post_course))
        .route(
            "/api/courses/{id}",
            get(get_course).put(put_course).delete(delete_course),
        )
        .route("/api/students", get(get_students).post(post_student))
        .route("/api/students/search", get(search_students))
        .route(
            "/api/students/{id}",
            get(get_student).put(put_student).delete(delete_student),
        )
        .route("/api/dashboard/stats", get(get_dashboard_stats))
        .route("/health", get(get_health))
        .route("/health/detailed", get(get_detailed_health));

    let router = if static_dir.is_dir() {
        info!(?static_dir, "Serving static files");
        router.fallback_service(
            ServeDir::new(static_dir).not_found_service(route_not_found.into_service()),
        )
    } else {
        router.fallback(route_not_found)
    };

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RuntimeConfiguration,
        store::{MemoryStore, Store},
    };
    use axum::{
        body::Body,
        http::{Method, Request, header},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
    }

    impl TestApp {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let config = RuntimeConfiguration::from_lookup(|_| None).unwrap();
            let state = AppState::new(store.clone(), config);
            Self {
                router: app(state),
                store,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let request = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            };
            self.send(request.unwrap()).await
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.call(Method::GET, uri, None).await
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, Some(body)).await
        }

        async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.call(Method::PUT, uri, Some(body)).await
        }

        async fn delete(&self, uri: &str) -> (StatusCode, Value) {
            self.call(Method::DELETE, uri, None).await
        }

        async fn create_course(&self, name: &str) -> Value {
            let (status, body) = self
                .post(
                    "/api/courses",
                    json!({"name": name, "description": format!("All about {name}"), "duration": 12}),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            body
        }

        async fn create_student(&self, n: u32, course: &str, status: &str) -> Value {
            let (code, body) = self
                .post(
                    "/api/students",
                    json!({
                        "fname": format!("Student{n}"),
                        "lname": "Tester",
                        "email": format!("student{n}@example.com"),
                        "idNum": format!("{n:013}"),
                        "course": course,
                        "enrollmentDate": "2024-02-01",
                        "status": status,
                    }),
                )
                .await;
            assert_eq!(code, StatusCode::CREATED, "{body}");
            body
        }
    }

    fn is_student_number(value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|s| s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()))
    }

    #[tokio::test]
    async fn created_students_get_unique_student_numbers() {
        let app = TestApp::new();
        let first = app.create_student(1, "maths", "active").await;
        let second = app.create_student(2, "maths", "active").await;

        assert!(is_student_number(&first["studentNumber"]), "{first}");
        assert!(is_student_number(&second["studentNumber"]), "{second}");
        assert_ne!(first["studentNumber"], second["studentNumber"]);
        assert_eq!(first["gender"], "other");
        assert_eq!(first["status"], "active");
        assert!(first["createdAt"].is_string());
        assert!(first["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn duplicate_id_number_is_rejected_and_first_student_kept() {
        let app = TestApp::new();
        let first = app.create_student(1, "maths", "active").await;

        let (status, body) = app
            .post(
                "/api/students",
                json!({
                    "fname": "Other",
                    "lname": "Person",
                    "email": "other@example.com",
                    "idNum": first["idNum"],
                    "course": "maths",
                    "enrollmentDate": "2024-02-01",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Student validation failed: idNum: idNum must be unique");
        assert_eq!(body["errors"][0]["field"], "idNum");

        let (status, students) = app.get("/api/students").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(students.as_array().unwrap().len(), 1);
        assert_eq!(students[0]["id"], first["id"]);
    }

    #[tokio::test]
    async fn invalid_student_lists_every_failing_field() {
        let app = TestApp::new();
        let (status, body) = app
            .post("/api/students", json!({"email": "nope", "idNum": "123"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let fields: Vec<_> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            fields,
            ["fname", "lname", "email", "idNum", "course", "enrollmentDate"]
        );
        assert_eq!(app.store.count_students(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn course_with_students_cannot_be_deleted() {
        let app = TestApp::new();
        let course = app.create_course("Physics").await;
        let course_id = course["id"].as_str().unwrap();
        let student = app.create_student(1, course_id, "active").await;

        let uri = format!("/api/courses/{course_id}");
        let (status, body) = app.delete(&uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot delete course with enrolled students");
        assert_eq!(app.get(&uri).await.0, StatusCode::OK);

        let (status, body) = app
            .delete(&format!("/api/students/{}", student["id"].as_str().unwrap()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Student deleted successfully");

        let (status, body) = app.delete(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Course deleted successfully");

        let (status, body) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Course not found");
    }

    #[tokio::test]
    async fn missing_and_malformed_ids_are_not_found() {
        let app = TestApp::new();
        let missing = Uuid::new_v4();

        for uri in [
            format!("/api/courses/{missing}"),
            "/api/courses/not-a-uuid".to_string(),
        ] {
            let (status, body) = app.get(&uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["message"], "Course not found");
            assert_eq!(app.delete(&uri).await.0, StatusCode::NOT_FOUND);
        }

        let (status, body) = app.get(&format!("/api/students/{missing}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Student not found");
        assert_eq!(
            app.delete(&format!("/api/students/{missing}")).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            app.put(&format!("/api/courses/{missing}"), json!({"name": "X"}))
                .await
                .0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn courses_are_sorted_by_name_case_sensitively() {
        let app = TestApp::new();
        for name in ["Zoology", "algebra", "Biology"] {
            app.create_course(name).await;
        }

        let (status, body) = app.get("/api/courses").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Biology", "Zoology", "algebra"]);
    }

    #[tokio::test]
    async fn invalid_course_is_rejected_with_every_message() {
        let app = TestApp::new();
        let (status, body) = app.post("/api/courses", json!({"name": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Course validation failed: name: Course name is required, description: Course description is required, duration: Course duration is required"
        );
        assert_eq!(app.store.count_courses(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn course_update_merges_supplied_fields() {
        let app = TestApp::new();
        let course = app.create_course("Chemistry").await;
        let uri = format!("/api/courses/{}", course["id"].as_str().unwrap());

        let (status, body) = app.put(&uri, json!({"status": "inactive", "duration": 6})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["name"], "Chemistry");
        assert_eq!(body["status"], "inactive");
        assert_eq!(body["duration"], 6.0);

        let (status, body) = app.put(&uri, json!({"status": "archived"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Course validation failed: status: Status must be one of: active, inactive"
        );
    }

    #[tokio::test]
    async fn student_update_merges_supplied_fields() {
        let app = TestApp::new();
        let student = app.create_student(1, "maths", "active").await;
        let uri = format!("/api/students/{}", student["id"].as_str().unwrap());

        let (status, body) = app.put(&uri, json!({"status": "inactive"})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "inactive");
        assert_eq!(body["studentNumber"], student["studentNumber"]);
        assert_eq!(body["email"], student["email"]);
    }

    #[tokio::test]
    async fn blank_student_number_on_update_keeps_the_old_one() {
        let app = TestApp::new();
        let student = app.create_student(1, "maths", "active").await;
        let uri = format!("/api/students/{}", student["id"].as_str().unwrap());

        let (status, body) = app
            .put(&uri, json!({"studentNumber": "", "status": "inactive"}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["studentNumber"], student["studentNumber"]);
        assert_eq!(body["status"], "inactive");
    }

    #[tokio::test]
    async fn mistyped_fields_are_reported_with_the_others() {
        let app = TestApp::new();
        let (status, body) = app
            .post(
                "/api/courses",
                json!({"name": "", "description": "d", "duration": "twelve"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["errors"],
            json!([
                {"field": "name", "message": "Course name is required"},
                {"field": "duration", "message": "Course duration must be a number"},
            ])
        );

        let (status, body) = app
            .post(
                "/api/courses",
                json!({"name": "Law", "description": "Torts", "duration": "12"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["duration"], 12.0);

        let (status, body) = app
            .post(
                "/api/students",
                json!({
                    "fname": "Numeric",
                    "lname": "Ids",
                    "email": "numeric@example.com",
                    "idNum": 9_001_015_009_087_u64,
                    "course": "law",
                    "enrollmentDate": "2024-02-01",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["idNum"], "9001015009087");
    }

    #[tokio::test]
    async fn course_id_in_another_case_still_blocks_delete() {
        let app = TestApp::new();
        let course = app.create_course("Physics").await;
        let course_id = course["id"].as_str().unwrap();
        app.create_student(1, &course_id.to_uppercase(), "active")
            .await;

        let (status, body) = app.delete(&format!("/api/courses/{course_id}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot delete course with enrolled students");
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/courses")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\": "))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn empty_store_stats_do_not_divide_by_zero() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/dashboard/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalStudents"], 0);
        assert_eq!(body["successRate"], 0);
        assert_eq!(body["courseEnrollments"], json!([]));
    }

    #[tokio::test]
    async fn all_inactive_students_are_all_graduates() {
        let app = TestApp::new();
        for n in 1..=3 {
            app.create_student(n, "history", "inactive").await;
        }

        let (status, body) = app.get("/api/dashboard/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalStudents"], 3);
        assert_eq!(body["activeStudents"], 0);
        assert_eq!(body["graduates"], 3);
        assert_eq!(body["successRate"], 100);
        assert_eq!(
            body["courseEnrollments"],
            json!([{"course": "history", "count": 3}])
        );
    }

    #[tokio::test]
    async fn search_matches_email_ignoring_case() {
        let app = TestApp::new();
        let (status, john) = app
            .post(
                "/api/students",
                json!({
                    "fname": "Alpha",
                    "lname": "Beta",
                    "email": "john@example.com",
                    "idNum": "0000000000001",
                    "course": "maths",
                    "enrollmentDate": "2024-02-01",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        app.create_student(2, "maths", "active").await;

        let (status, body) = app.get("/api/students/search?q=JOHN").await;
        assert_eq!(status, StatusCode::OK);
        let found = body.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], john["id"]);
    }

    #[tokio::test]
    async fn blank_search_lists_everyone_newest_first() {
        let app = TestApp::new();
        for n in 1..=3 {
            app.create_student(n, "maths", "active").await;
        }

        for uri in ["/api/students/search", "/api/students/search?q=%20%20"] {
            let (status, body) = app.get(uri).await;
            assert_eq!(status, StatusCode::OK);
            let names: Vec<_> = body
                .as_array()
                .unwrap()
                .iter()
                .map(|s| s["fname"].as_str().unwrap().to_string())
                .collect();
            assert_eq!(names, ["Student3", "Student2", "Student1"]);
        }
    }

    #[tokio::test]
    async fn singular_student_path_is_not_served() {
        let app = TestApp::new();
        let student = app.create_student(1, "maths", "active").await;

        let (status, body) = app
            .delete(&format!("/api/student/{}", student["id"].as_str().unwrap()))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().starts_with("Route not found"));
        assert_eq!(app.store.count_students(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn health_is_up_even_when_store_is_down() {
        let app = TestApp::new();
        app.store.set_connected(false);

        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert_eq!(body["environment"], "development");
        assert!(body["uptime"].is_number());
        assert!(body["timestamp"].is_string());

        let (status, body) = app.get("/health/detailed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"]["status"], "disconnected");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["uptime"].is_string());
        assert!(body["platform"].is_string());
    }

    #[tokio::test]
    async fn detailed_health_reports_connected_store() {
        let app = TestApp::new();
        let (status, body) = app.get("/health/detailed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert_eq!(body["database"]["status"], "connected");
    }
}
