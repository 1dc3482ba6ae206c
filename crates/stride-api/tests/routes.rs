use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use stride_api::auth::AppStateInner;
use stride_db::Database;

struct TestApp {
    router: Router,
    upload_dir: PathBuf,
}

impl TestApp {
    fn new() -> Self {
        let upload_dir = std::env::temp_dir().join(format!("stride-test-{}", Uuid::new_v4()));
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            upload_dir: upload_dir.clone(),
        });
        Self {
            router: stride_api::router(state),
            upload_dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    /// Registers a user and returns (user_id, token).
    async fn register(&self, username: &str, role: &str) -> (String, String) {
        let (status, body) = self
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct-horse", "role": role })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// `a` requests, `b` accepts.
    async fn connect(&self, a_token: &str, b_id: &str, b_token: &str) {
        let (status, conn) = self
            .call("POST", "/connections", Some(a_token), Some(json!({ "recipient_id": b_id })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{conn}");
        let uri = format!("/connections/{}", conn["id"].as_str().unwrap());
        let (status, _) = self
            .call("PUT", &uri, Some(b_token), Some(json!({ "action": "accept" })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.upload_dir);
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_login_and_auth_guard() {
    let app = TestApp::new();
    let (user_id, token) = app.register("ana", "ATHLETE").await;

    let (status, body) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "ANA", "password": "another-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "boss", "password": "correct-horse", "role": "ADMIN" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "ana", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "ana", "password": "correct-horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.as_str());
    assert_eq!(body["role"], "ATHLETE");

    let (status, _) = app.call("GET", "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call("GET", "/users/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = app.call("GET", "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["username"], "ana");
    assert_eq!(me["is_self"], true);
}

#[tokio::test]
async fn test_connection_request_and_accept() {
    let app = TestApp::new();
    let (u1, t1) = app.register("ana", "ATHLETE").await;
    let (u2, t2) = app.register("ben", "ATHLETE").await;

    let (status, conn) = app
        .call("POST", "/connections", Some(&t1), Some(json!({ "recipient_id": u2 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(conn["status"], "PENDING");
    assert_eq!(conn["is_initiator"], true);

    // Either direction counts as the same pair.
    let (status, _) = app
        .call("POST", "/connections", Some(&t2), Some(json!({ "recipient_id": u1 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/connections/{}", conn["id"].as_str().unwrap());
    let (status, _) = app
        .call("PUT", &uri, Some(&t1), Some(json!({ "action": "accept" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = app
        .call("PUT", &uri, Some(&t2), Some(json!({ "action": "accept", "version": 1 })))
        .await;
    assert_eq!(status, StatusCode::OK, "{accepted}");
    assert_eq!(accepted["status"], "ACCEPTED");
    assert_eq!(accepted["is_initiator"], false);

    let (status, _) = app
        .call("PUT", &uri, Some(&t2), Some(json!({ "action": "reject" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = app.call("GET", "/connections?status=ACCEPTED", Some(&t1), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["is_initiator"], true);
    assert_eq!(list[0]["counterpart"]["username"], "ben");

    let (status, _) = app.call("DELETE", &uri, Some(&t2), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("GET", &uri, Some(&t1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_workout_proposal_approval_materializes() {
    let app = TestApp::new();
    let (coach_id, coach) = app.register("coach", "COACH").await;
    let (athlete_id, athlete) = app.register("ana", "ATHLETE").await;

    let proposal = json!({
        "proposed_for_id": athlete_id,
        "action": "CREATE",
        "title": "Leg Day",
        "duration": 45,
        "workout_type": "STRENGTH"
    });

    let (status, _) = app
        .call("POST", "/proposals/workouts", Some(&coach), Some(proposal.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.connect(&athlete, &coach_id, &coach).await;

    let (status, created) = app
        .call("POST", "/proposals/workouts", Some(&coach), Some(proposal))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "PENDING_APPROVAL");

    let (_, received) = app
        .call("GET", "/proposals/workouts?direction=received", Some(&athlete), None)
        .await;
    assert_eq!(received.as_array().unwrap().len(), 1);

    let respond = json!({
        "proposal_id": created["id"],
        "proposal_type": "workout",
        "response": "approve"
    });
    let (status, _) = app
        .call("PUT", "/proposals/respond", Some(&coach), Some(respond.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, resolution) = app
        .call("PUT", "/proposals/respond", Some(&athlete), Some(respond.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{resolution}");
    assert_eq!(resolution["status"], "APPROVED");
    assert_eq!(resolution["applied"], true);

    let uri = format!("/workouts/{}", resolution["record_id"].as_str().unwrap());
    let (status, workout) = app.call("GET", &uri, Some(&athlete), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(workout["title"], "Leg Day");
    assert_eq!(workout["duration"], 45);
    assert_eq!(workout["owner_id"], athlete_id.as_str());

    // Owner-scoped: the coach can't read the athlete's workout directly.
    let (status, _) = app.call("GET", &uri, Some(&coach), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("PUT", "/proposals/respond", Some(&athlete), Some(respond))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_direct_chat_is_deduplicated() {
    let app = TestApp::new();
    let (a_id, a) = app.register("ana", "ATHLETE").await;
    let (b_id, b) = app.register("ben", "ATHLETE").await;

    let (status, _) = app
        .call(
            "POST",
            "/chats",
            Some(&a),
            Some(json!({ "participant_ids": [b_id], "chat_type": "DIRECT" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.connect(&a, &b_id, &b).await;

    let (status, first) = app
        .call(
            "POST",
            "/chats",
            Some(&a),
            Some(json!({ "participant_ids": [b_id], "chat_type": "DIRECT" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{first}");

    let (status, again) = app
        .call(
            "POST",
            "/chats",
            Some(&b),
            Some(json!({ "participant_ids": [a_id], "chat_type": "DIRECT" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], first["id"]);

    let messages = format!("/chats/{}/messages", first["id"].as_str().unwrap());
    let (status, _) = app
        .call("POST", &messages, Some(&a), Some(json!({ "content": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, sent) = app
        .call("POST", &messages, Some(&a), Some(json!({ "content": "track at 6?" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["status"], "SENT");

    let (_, page) = app.call("GET", &messages, Some(&b), None).await;
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["status"], "READ");

    let missing = format!("/chats/{}", Uuid::new_v4());
    let (status, _) = app.call("GET", &missing, Some(&b), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_requests_get_json_bad_request() {
    let app = TestApp::new();
    let (_, t) = app.register("ana", "ATHLETE").await;
    let unknown = format!("/connections/{}", Uuid::new_v4());

    let cases = [
        ("POST", "/connections".to_string(), Some(json!({}))),
        ("POST", "/connections".to_string(), Some(json!({ "recipient_id": "nobody" }))),
        ("PUT", unknown.clone(), Some(json!({ "action": "maybe" }))),
        ("GET", "/connections/not-a-uuid".to_string(), None),
        ("GET", "/connections?status=SOMETIMES".to_string(), None),
        ("GET", "/calendar".to_string(), None),
        ("GET", "/calendar?date=tomorrow".to_string(), None),
        ("GET", "/calendar/range?from=2024-06-01".to_string(), None),
    ];
    for (method, uri, body) in cases {
        let (status, body) = app.call(method, &uri, Some(&t), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert!(body["error"].is_string(), "{method} {uri}: {body}");
    }

    // Unparseable JSON and a missing content type are rejected the same way.
    let req = Request::builder()
        .method("POST")
        .uri("/connections")
        .header(header::AUTHORIZATION, format!("Bearer {t}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"recipient_id\":"))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .body(Body::from(r#"{"username":"ana","password":"correct-horse"}"#))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_message_pages_clamp_limit_and_follow_cursor() {
    let app = TestApp::new();
    let (_, a) = app.register("ana", "ATHLETE").await;
    let (b_id, b) = app.register("ben", "ATHLETE").await;
    app.connect(&a, &b_id, &b).await;

    let (_, chat) = app
        .call(
            "POST",
            "/chats",
            Some(&a),
            Some(json!({ "participant_ids": [b_id], "chat_type": "DIRECT" })),
        )
        .await;
    let messages = format!("/chats/{}/messages", chat["id"].as_str().unwrap());
    for content in ["one", "two", "three"] {
        let (status, _) = app
            .call("POST", &messages, Some(&a), Some(json!({ "content": content })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app
        .call("GET", &format!("{messages}?limit=0"), Some(&b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["content"], "three");

    let chat_uri = format!("/chats/{}", chat["id"].as_str().unwrap());
    let (_, overview) = app.call("GET", &chat_uri, Some(&b), None).await;
    assert_eq!(overview["unread_count"], 2);

    let (_, all) = app
        .call("GET", &format!("{messages}?limit=5000"), Some(&b), None)
        .await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, newest) = app
        .call("GET", &format!("{messages}?limit=2"), Some(&b), None)
        .await;
    let newest = newest.as_array().unwrap();
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[1]["content"], "two");

    let cursor = newest[1]["created_at"].as_str().unwrap();
    let (status, older) = app
        .call("GET", &format!("{messages}?limit=2&before={cursor}"), Some(&b), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{older}");
    let older = older.as_array().unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0]["content"], "one");
}

#[tokio::test]
async fn test_calendar_day_and_range_limits() {
    let app = TestApp::new();
    let (_, t) = app.register("ana", "ATHLETE").await;

    let (status, _) = app
        .call("POST", "/races", Some(&t), Some(json!({
            "event_name": "Parkrun", "event_type": "5K", "date": "2024-06-01"
        })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call("POST", "/workouts", Some(&t), Some(json!({ "title": "Intervals", "date": "2024-06-01" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call("POST", "/activities", Some(&t), Some(json!({ "title": "Physio", "date": "2024-06-01" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call("POST", "/activities", Some(&t), Some(json!({ "title": "Yoga", "date": "2024-06-02" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, day) = app.call("GET", "/calendar?date=2024-06-01", Some(&t), None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = day["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["activity", "workout", "race"]);

    let (status, days) = app
        .call("GET", "/calendar/range?from=2024-06-01&to=2024-06-03", Some(&t), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let days = days.as_array().unwrap();
    assert_eq!(days.len(), 3);
    assert_eq!(days[1]["entries"][0]["data"]["title"], "Yoga");
    assert!(days[2]["entries"].as_array().unwrap().is_empty());

    let (status, _) = app
        .call("GET", "/calendar/range?from=2024-01-01&to=2024-06-01", Some(&t), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_profile_visibility_and_search() {
    let app = TestApp::new();
    let (a_id, a) = app.register("ana", "ATHLETE").await;
    let (b_id, b) = app.register("ben", "COACH").await;

    let (status, profile) = app
        .call("PUT", "/users/profile", Some(&a), Some(json!({
            "bio": "Trail runner", "sports": "running, cycling", "tags": ["ultra"]
        })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["profile"]["sports"], json!(["running", "cycling"]));

    let uri = format!("/users/{a_id}/profile");
    let (status, seen) = app.call("GET", &uri, Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["is_self"], false);
    assert!(seen["profile"].is_null());
    assert!(seen["connection_status"].is_null());

    app.connect(&a, &b_id, &b).await;

    let (_, seen) = app.call("GET", &uri, Some(&b), None).await;
    assert_eq!(seen["connection_status"], "ACCEPTED");
    assert_eq!(seen["profile"]["bio"], "Trail runner");

    let (status, _) = app.call("GET", "/users/search?q=a", Some(&b), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, found) = app.call("GET", "/users/search?q=AN", Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["username"], "ana");
}

fn multipart(kind: &str, file: &[u8]) -> (String, Vec<u8>) {
    let boundary = "stride-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\n{kind}\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"img\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[tokio::test]
async fn test_upload_image_detects_format() {
    let app = TestApp::new();
    let (_, t) = app.register("ana", "ATHLETE").await;

    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";
    let (content_type, body) = multipart("avatar", png);
    let req = Request::builder()
        .method("POST")
        .uri("/users/profile/upload-image")
        .header(header::AUTHORIZATION, format!("Bearer {t}"))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let (status, uploaded) = app.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{uploaded}");
    let url = uploaded["url"].as_str().unwrap();
    assert!(url.starts_with("/uploads/") && url.ends_with(".png"));

    let stored = app.upload_dir.join(url.trim_start_matches("/uploads/"));
    assert_eq!(std::fs::read(stored).unwrap(), png.to_vec());

    let (_, me) = app.call("GET", "/users/me", Some(&t), None).await;
    assert_eq!(me["avatar_url"], url);

    let (content_type, body) = multipart("cover", b"GIF89a\x01\0\x01\0");
    let req = Request::builder()
        .method("POST")
        .uri("/users/profile/upload-image")
        .header(header::AUTHORIZATION, format!("Bearer {t}"))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
