use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, MockState, ADMIN_EMAIL, ADMIN_PASSWORD};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes: bytes::Bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<String> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .unwrap(),
        None => builder.body(String::new()).unwrap(),
    }
}

async fn login(app: &Router) -> String {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/admin/login",
            None,
            Some(json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    body["data"]["token"].as_str().unwrap().to_string()
}

// --- auth ---

#[tokio::test]
async fn login_returns_token_and_user() {
    let app = app();
    let resp = app
        .oneshot(request(
            "POST",
            "/api/admin/login",
            None,
            Some(json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD})),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(!body["data"]["token"].as_str().unwrap().is_empty());
    assert_eq!(body["data"]["user"]["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn wrong_password_is_401() {
    let resp = app()
        .oneshot(request(
            "POST",
            "/api/admin/login",
            None,
            Some(json!({"email": ADMIN_EMAIL, "password": "nope"})),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["message"], "invalid credentials");
}

#[tokio::test]
async fn admin_routes_require_token() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/admin/posts", None, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(request("GET", "/api/admin/posts", Some("forged"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn public_routes_need_no_token() {
    let app = app();
    for uri in ["/api/public/profile", "/api/public/skills", "/api/public/experiences"] {
        let resp = app.clone().oneshot(request("GET", uri, None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    }
}

// --- posts ---

#[tokio::test]
async fn post_crud_lifecycle() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/admin/posts",
            Some(&token),
            Some(json!({
                "title": "Hello World",
                "summary": "",
                "content_markdown": "# Hi",
                "tags": ["rust", "web"],
                "is_published": true,
                "images": []
            })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await["data"].clone();
    let id = created["ID"].as_str().unwrap().to_string();
    assert_eq!(created["Slug"], "hello-world");
    assert_eq!(created["Tags"][1]["Name"], "web");
    assert!(created["PublishedAt"].is_string());

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/admin/posts/{id}"),
            Some(&token),
            Some(json!({"title": "Renamed", "content_markdown": "x", "is_published": false})),
        ))
        .await
        .unwrap();
    let updated = body_json(resp).await["data"].clone();
    assert_eq!(updated["Title"], "Renamed");
    assert!(updated["PublishedAt"].is_null());

    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/admin/posts/{id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(request("DELETE", &format!("/api/admin/posts/{id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_without_title_is_400() {
    let app = app();
    let token = login(&app).await;
    let resp = app
        .oneshot(request(
            "POST",
            "/api/admin/posts",
            Some(&token),
            Some(json!({"title": " ", "content_markdown": "x"})),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["success"], false);
}

#[tokio::test]
async fn posts_are_paginated() {
    let state = MockState::new();
    state.seed_posts(25).await;
    let app = app_with_state(state);
    let token = login(&app).await;

    let resp = app
        .oneshot(request("GET", "/api/admin/posts?page=3&limit=10", Some(&token), None))
        .await
        .unwrap();
    let body = body_json(resp).await;

    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"]["data"][0]["Title"], "Post 21");
    assert_eq!(
        body["data"]["meta"],
        json!({"current_page": 3, "limit": 10, "total_data": 25, "total_page": 3})
    );
}

#[tokio::test]
async fn injected_failure_hits_next_mutation_only() {
    let state = MockState::new();
    let ids = state.seed_posts(1).await;
    let app = app_with_state(state.clone());
    let token = login(&app).await;
    state.fail_next_mutation(500).await;

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/admin/posts", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let uri = format!("/api/admin/posts/{}", ids[0]);
    let resp = app
        .clone()
        .oneshot(request("DELETE", &uri, Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.post_count().await, 1);

    let resp = app.oneshot(request("DELETE", &uri, Some(&token), None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.post_count().await, 0);
}

// --- skills, projects, experiences ---

#[tokio::test]
async fn project_links_skills_and_experience() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/admin/skills",
            Some(&token),
            Some(json!({"name": "Rust", "category": "language"})),
        ))
        .await
        .unwrap();
    let skill_id = body_json(resp).await["data"]["ID"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/admin/experiences",
            Some(&token),
            Some(json!({
                "company": "Acme",
                "position": "Engineer",
                "description": "",
                "start_date": "2022-01-01",
                "is_current": true
            })),
        ))
        .await
        .unwrap();
    let experience_id = body_json(resp).await["data"]["ID"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/admin/projects",
            Some(&token),
            Some(json!({
                "title": "CMS",
                "experience_id": experience_id,
                "skill_ids": [skill_id]
            })),
        ))
        .await
        .unwrap();
    let project = body_json(resp).await["data"].clone();
    assert_eq!(project["Skills"][0]["Name"], "Rust");
    assert_eq!(project["ExperienceID"], experience_id.as_str());

    let resp = app
        .oneshot(request("GET", "/api/public/experiences", None, None))
        .await
        .unwrap();
    let experiences = body_json(resp).await["data"].clone();
    assert_eq!(experiences[0]["Projects"][0]["Title"], "CMS");
    assert!(experiences[0]["EndDate"].is_null());
}

// --- images & messages ---

#[tokio::test]
async fn upload_accepts_multipart_image() {
    let app = app();
    let token = login(&app).await;
    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"cover.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         PNGDATA\r\n\
         --{boundary}--\r\n"
    );
    let req = Request::builder()
        .method("POST")
        .uri("/api/admin/images/upload")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(body)
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let upload = body_json(resp).await["data"].clone();
    assert_eq!(upload["file_name"], "cover.png");
    assert_eq!(upload["mime_type"], "image/png");
    assert_eq!(upload["size"], 7);

    let id = upload["id"].as_str().unwrap();
    let resp = app
        .oneshot(request("DELETE", &format!("/api/admin/images/{id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn messages_list_is_a_bare_array() {
    let state = MockState::new();
    state
        .add_message("Ada", "ada@example.com", "Hi", "Hello there")
        .await;
    let app = app_with_state(state);
    let token = login(&app).await;

    let resp = app
        .oneshot(request("GET", "/api/admin/messages", Some(&token), None))
        .await
        .unwrap();
    let body = body_json(resp).await;

    assert_eq!(body["data"][0]["Message"], "Hello there");
    assert_eq!(body["data"][0]["Status"], "unread");
}

#[tokio::test]
async fn email_update_changes_login() {
    let app = app();
    let token = login(&app).await;
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            "/api/admin/update-email",
            Some(&token),
            Some(json!({"email": "new@example.com"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(request(
            "POST",
            "/api/admin/login",
            None,
            Some(json!({"email": "new@example.com", "password": ADMIN_PASSWORD})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
