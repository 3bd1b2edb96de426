#[cfg(test)]
mod tests {
    use crate::api::{LoginResponse, MetricsResponse};
    use crate::init_rocket;
    use crate::test::utils::test_db::{TestDb, TestDbBuilder};
    use chrono::{Duration, Local};
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};

    async fn setup_client(test_db: &TestDb) -> Client {
        let rocket = init_rocket(test_db.pool.clone()).await;
        Client::tracked(rocket)
            .await
            .expect("Failed to build test client")
    }

    async fn login(client: &Client, username: &str) {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();
        assert!(login_response.success, "Login must succeed for {}", username);
    }

    fn future_date(days: i64) -> String {
        (Local::now().date_naive() + Duration::days(days)).to_string()
    }

    fn standard_fixture() -> TestDbBuilder {
        TestDbBuilder::new()
            .manager("gerente")
            .manager("other_gerente")
            .instructor("prof")
            .student("aluno")
            .student("aluna")
            .superuser("root")
            .center("Praia CT", "gerente", "12345678000195")
            .center("Dune CT", "other_gerente", "98765432000110")
            .link("Praia CT", "prof", true, true)
    }

    #[rocket::async_test]
    async fn test_health() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let client = setup_client(&test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_signup_login_me() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let client = setup_client(&test_db).await;

        let response = client
            .post("/api/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "new_aluno",
                    "password": "password123",
                    "role": "student",
                    "display_name": "New Student"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        login(&client, "new_aluno").await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let me: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(me["username"], "new_aluno");
        assert_eq!(me["role"], "student");
        assert_eq!(me["display_name"], "New Student");
    }

    #[rocket::async_test]
    async fn test_signup_rejects_unknown_role() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let client = setup_client(&test_db).await;

        let response = client
            .post("/api/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "weird",
                    "password": "password123",
                    "role": "admin"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_auth_required_endpoints() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        for endpoint in ["/api/me", "/api/schedules", "/api/enrollments", "/api/sessions"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    async fn test_public_catalog_and_metrics() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        let response = client.get("/api/centers").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let centers: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(centers.as_array().unwrap().len(), 2);

        let response = client.get("/api/metrics").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let metrics: MetricsResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(metrics.centers, 2);
        assert_eq!(metrics.instructors, 1);
        assert_eq!(metrics.students, 2);
    }

    #[rocket::async_test]
    async fn test_schedule_create_generates_windowed_sessions() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        login(&client, "gerente").await;

        let response = client
            .post("/api/schedules")
            .header(ContentType::JSON)
            .body(
                json!({
                    "center": test_db.center_id("Praia CT").unwrap(),
                    "instructor": test_db.user_id("prof").unwrap(),
                    "activity": "beach volleyball",
                    "capacity": 10,
                    "slots": [
                        {"weekday": 0, "start_time": "06:00:00", "end_time": "07:00:00"}
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let created = body["occurrences_created"].as_u64().unwrap();
        // One weekly slot in a 31-day inclusive window.
        assert!(
            (4..=5).contains(&created),
            "Expected 4-5 occurrences, got {}",
            created
        );

        let response = client.get("/api/sessions").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let sessions: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(sessions.as_array().unwrap().len() as u64, created);

        // Direct mutation of a generated session is rejected for everyone.
        let generated_id = sessions[0]["session"]["id"].as_i64().unwrap();
        let response = client
            .put(format!("/api/sessions/{}", generated_id))
            .header(ContentType::JSON)
            .body(json!({"capacity": 20}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_enrollment_flow() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        // The manager sets up a session with a single seat.
        login(&client, "gerente").await;
        let response = client
            .post("/api/sessions")
            .header(ContentType::JSON)
            .body(
                json!({
                    "center": test_db.center_id("Praia CT").unwrap(),
                    "instructor": test_db.user_id("prof").unwrap(),
                    "activity": "sunrise session",
                    "date": future_date(3),
                    "start_time": "06:00:00",
                    "end_time": "07:00:00",
                    "capacity": 1
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let session_id = body["session"]["id"].as_i64().unwrap();
        assert_eq!(body["seats_available"], 1);

        // First student takes the seat.
        login(&client, "aluno").await;
        let response = client
            .post("/api/enrollments")
            .header(ContentType::JSON)
            .body(json!({"session": session_id}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let enrollment: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(enrollment["status"], "CONFIRMED");
        let enrollment_id = enrollment["id"].as_i64().unwrap();

        // Enrolling twice is a validation failure.
        let response = client
            .post("/api/enrollments")
            .header(ContentType::JSON)
            .body(json!({"session": session_id}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        // The session is full for the second student.
        login(&client, "aluna").await;
        let response = client
            .post("/api/enrollments")
            .header(ContentType::JSON)
            .body(json!({"session": session_id}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        // Only the owner may cancel.
        let response = client
            .post(format!("/api/enrollments/{}/cancel", enrollment_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        login(&client, "aluno").await;
        let response = client
            .post(format!("/api/enrollments/{}/cancel", enrollment_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let canceled: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(canceled["status"], "CANCELED");

        // The freed seat is available again.
        login(&client, "aluna").await;
        let response = client
            .post("/api/enrollments")
            .header(ContentType::JSON)
            .body(json!({"session": session_id}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_instructor_cannot_enroll() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        login(&client, "gerente").await;
        let response = client
            .post("/api/sessions")
            .header(ContentType::JSON)
            .body(
                json!({
                    "center": test_db.center_id("Praia CT").unwrap(),
                    "instructor": test_db.user_id("prof").unwrap(),
                    "activity": "sunrise session",
                    "date": future_date(3),
                    "start_time": "06:00:00",
                    "end_time": "07:00:00",
                    "capacity": 5
                })
                .to_string(),
            )
            .dispatch()
            .await;
        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let session_id = body["session"]["id"].as_i64().unwrap();

        login(&client, "prof").await;
        let response = client
            .post("/api/enrollments")
            .header(ContentType::JSON)
            .body(json!({"session": session_id}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_foreign_manager_cannot_update_center() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        login(&client, "other_gerente").await;

        let response = client
            .put(format!(
                "/api/centers/{}",
                test_db.center_id("Praia CT").unwrap()
            ))
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Hijacked CT",
                    "address": "Nowhere 1",
                    "contact": "x@example.com",
                    "activities": "",
                    "tax_id": "12345678000195"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_instructor_cannot_grant_own_rights() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        login(&client, "prof").await;

        // The instructor can list their own links...
        let response = client.get("/api/instructor-links").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let links: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let link_id = links[0]["id"].as_i64().unwrap();

        // ...but never mutate the flags on them.
        let response = client
            .put(format!("/api/instructor-links/{}", link_id))
            .header(ContentType::JSON)
            .body(json!({"can_create_session": true, "can_cancel_session": true}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_maintenance_requires_superuser() {
        let test_db = standard_fixture().build().await.unwrap();
        let client = setup_client(&test_db).await;

        login(&client, "gerente").await;
        let response = client.post("/api/maintenance/run").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        login(&client, "root").await;
        let response = client.post("/api/maintenance/run").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        // A negative window is a caller bug and maps to 400.
        let response = client
            .post("/api/maintenance/run?days_ahead=-1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }
}
