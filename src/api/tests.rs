//! HTTP tests against the full router

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};

use super::{build_router, AppState};
use crate::services::testing::{self, TestContext, PASSWORD};

struct Harness {
    ctx: TestContext,
    server: TestServer,
}

async fn harness() -> Harness {
    let ctx = testing::context().await;
    let state = AppState::new(ctx.services.clone(), ctx.config.clone());
    let server = TestServer::new(build_router(state)).unwrap();
    Harness { ctx, server }
}

impl Harness {
    /// Seeded user plus a bearer token for it
    async fn login_as(&self, username: &str, role: &str) -> (i64, String) {
        let user = self.ctx.user(username, role).await;
        let response = self
            .server
            .post("/api/v1/auth/login")
            .json(&json!({ "login": username, "password": PASSWORD }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let token = body["data"]["token"].as_str().unwrap().to_string();
        (user.id, token)
    }
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let h = harness().await;

    let response = h
        .server
        .post("/api/v1/auth/register")
        .json(&json!({
            "username": "founder",
            "email": "founder@example.com",
            "password": "correct horse battery"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["roles"], json!(["admin"]));
    assert!(body["data"].get("password_hash").is_none());
    assert!(body["error"].is_null());

    let response = h
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "login": "founder", "password": "correct horse battery" }))
        .await;
    response.assert_status_ok();
    let token = response.json::<Value>()["data"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let me = h
        .server
        .get("/api/v1/auth/me")
        .authorization_bearer(&token)
        .await;
    me.assert_status_ok();
    assert_eq!(me.json::<Value>()["data"]["username"], "founder");

    h.server
        .post("/api/v1/auth/logout")
        .authorization_bearer(&token)
        .await
        .assert_status_ok();
    h.server
        .get("/api/v1/auth/me")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let h = harness().await;
    h.ctx.user("ada", "author").await;

    let response = h
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "login": "ada", "password": "wrong password" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "unauthorized");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let h = harness().await;

    let response = h.server.get("/api/v1/notifications").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "unauthorized");

    h.server
        .get("/api/v1/auth/me")
        .authorization_bearer("not-a-session")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_payloads_are_unprocessable() {
    let h = harness().await;
    let (_, token) = h.login_as("root", "admin").await;

    // Malformed JSON
    h.server
        .post("/api/v1/auth/register")
        .bytes("{\"username\":".into())
        .content_type("application/json")
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Missing required field
    h.server
        .post("/api/v1/auth/register")
        .json(&json!({ "username": "x" }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Non-numeric id
    h.server
        .get("/api/v1/users/abc")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Service-level validation carries field details
    let response = h
        .server
        .post("/api/v1/auth/register")
        .json(&json!({ "username": "ok_name", "email": "nope", "password": "long enough pw" }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "validation_failed");
    assert!(body["error"]["details"]["email"].is_array());
}

#[tokio::test]
async fn test_admin_self_actions_are_forbidden() {
    let h = harness().await;
    let (admin_id, token) = h.login_as("root", "admin").await;

    h.server
        .post(&format!("/api/v1/users/{}/ban", admin_id))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .delete(&format!("/api/v1/users/{}", admin_id))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .put(&format!("/api/v1/users/{}/roles", admin_id))
        .authorization_bearer(&token)
        .json(&json!({ "roles": ["subscriber"] }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    h.server
        .get("/api/v1/users/9999")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let h = harness().await;
    let (_, token) = h.login_as("reader", "subscriber").await;

    h.server
        .get("/api/v1/users")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .get("/api/v1/roles")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .post("/api/v1/articles")
        .authorization_bearer(&token)
        .json(&json!({ "title": "Nope", "content": "Body" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ban_and_unban() {
    let h = harness().await;
    let (_, admin) = h.login_as("root", "admin").await;
    let (ada_id, ada) = h.login_as("ada", "author").await;

    let response = h
        .server
        .post(&format!("/api/v1/users/{}/ban", ada_id))
        .authorization_bearer(&admin)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["status"], "banned");

    // Banning revokes every session the user held
    h.server
        .get("/api/v1/auth/me")
        .authorization_bearer(&ada)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let credentials = json!({ "login": "ada", "password": PASSWORD });
    let response = h.server.post("/api/v1/auth/login").json(&credentials).await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "forbidden");

    h.server
        .post(&format!("/api/v1/users/{}/unban", ada_id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
    h.server
        .post("/api/v1/auth/login")
        .json(&credentials)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_article_review_workflow() {
    let h = harness().await;
    let (author_id, author) = h.login_as("writer", "author").await;
    let (editor_id, editor) = h.login_as("editor", "editor").await;

    let response = h
        .server
        .post("/api/v1/articles")
        .authorization_bearer(&author)
        .json(&json!({
            "title": "Hello World",
            "content": "# Hi\n\nFirst post",
            "status": "published",
            "tags": ["intro"]
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let id = created["data"]["id"].as_i64().unwrap();
    let slug = created["data"]["slug"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["status"], "pending");

    // Hidden from the public until approved, visible to its author
    h.server
        .get(&format!("/api/v1/articles/{}", slug))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get(&format!("/api/v1/articles/{}", slug))
        .authorization_bearer(&author)
        .await
        .assert_status_ok();

    h.server
        .post(&format!("/api/v1/articles/{}/approve", id))
        .authorization_bearer(&author)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = h
        .server
        .post(&format!("/api/v1/articles/{}/approve", id))
        .authorization_bearer(&editor)
        .await;
    response.assert_status_ok();
    let approved: Value = response.json();
    assert_eq!(approved["data"]["status"], "published");
    assert_eq!(approved["data"]["approved_by"], editor_id);

    let public = h.server.get(&format!("/api/v1/articles/{}", slug)).await;
    public.assert_status_ok();
    assert_eq!(public.json::<Value>()["data"]["author"]["id"], author_id);

    let listing: Value = h.server.get("/api/v1/articles").await.json();
    assert_eq!(listing["data"]["meta"]["total"], 1);
    assert_eq!(listing["data"]["items"][0]["id"], id);

    // The approval reached the author through the notification listener
    let notes: Value = h
        .server
        .get("/api/v1/notifications")
        .authorization_bearer(&author)
        .await
        .json();
    assert_eq!(notes["data"]["items"][0]["kind"], "article.approved");
    let unread: Value = h
        .server
        .get("/api/v1/notifications/unread-count")
        .authorization_bearer(&author)
        .await
        .json();
    assert_eq!(unread["data"]["count"], 1);
}

#[tokio::test]
async fn test_reports_increment_counts() {
    let h = harness().await;
    let (_, editor) = h.login_as("editor", "editor").await;
    let (_, reader) = h.login_as("reader", "subscriber").await;

    let created: Value = h
        .server
        .post("/api/v1/articles")
        .authorization_bearer(&editor)
        .json(&json!({ "title": "Reportable", "content": "Text", "status": "published" }))
        .await
        .json();
    let id = created["data"]["id"].as_i64().unwrap();

    for expected in 1..=2 {
        let response = h
            .server
            .post(&format!("/api/v1/articles/{}/report", id))
            .authorization_bearer(&reader)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["report_count"], expected);
    }

    let comment: Value = h
        .server
        .post(&format!("/api/v1/articles/{}/comments", id))
        .authorization_bearer(&editor)
        .json(&json!({ "content": "Editor note" }))
        .await
        .json();
    let comment_id = comment["data"]["id"].as_i64().unwrap();

    let response = h
        .server
        .post(&format!("/api/v1/comments/{}/report", comment_id))
        .authorization_bearer(&reader)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["report_count"], 1);

    let threads: Value = h
        .server
        .get(&format!("/api/v1/articles/{}/comments", id))
        .await
        .json();
    assert_eq!(threads["data"][0]["content"], "Editor note");
}

#[tokio::test]
async fn test_force_delete_removes_article() {
    let h = harness().await;
    let (_, admin) = h.login_as("root", "admin").await;

    let created: Value = h
        .server
        .post("/api/v1/articles")
        .authorization_bearer(&admin)
        .json(&json!({ "title": "Temporary", "content": "Text", "status": "published" }))
        .await
        .json();
    let id = created["data"]["id"].as_i64().unwrap();

    h.server
        .delete(&format!("/api/v1/articles/{}", id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
    h.server
        .post(&format!("/api/v1/articles/{}/restore", id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();

    h.server
        .delete(&format!("/api/v1/articles/{}?force=true", id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
    h.server
        .post(&format!("/api/v1/articles/{}/restore", id))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_management_round() {
    let h = harness().await;
    let (_, admin) = h.login_as("root", "admin").await;

    let response = h
        .server
        .post("/api/v1/roles")
        .authorization_bearer(&admin)
        .json(&json!({
            "name": "moderator",
            "display_name": "Moderator",
            "permissions": ["comments.moderate"]
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let role_id = response.json::<Value>()["data"]["id"].as_i64().unwrap();

    let response = h
        .server
        .put(&format!("/api/v1/roles/{}/permissions", role_id))
        .authorization_bearer(&admin)
        .json(&json!({ "permissions": ["comments.moderate", "articles.approve"] }))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>()["data"]["permissions"]
            .as_array()
            .unwrap()
            .len(),
        2
    );

    h.server
        .delete("/api/v1/roles/1")
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .delete(&format!("/api/v1/roles/{}", role_id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_media_upload_and_download() {
    let h = harness().await;
    let (_, token) = h.login_as("writer", "author").await;

    let form = MultipartForm::new().add_text("alt_text", "A dot").add_part(
        "file",
        Part::bytes(b"\x89PNG fake".to_vec())
            .file_name("dot.png")
            .mime_type("image/png"),
    );
    let response = h
        .server
        .post("/api/v1/media")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["data"]["alt_text"], "A dot");
    let url = body["data"]["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/"));

    let file = h.server.get(&url).await;
    file.assert_status_ok();
    assert_eq!(file.as_bytes().as_ref(), b"\x89PNG fake");

    // Not a multipart body at all
    h.server
        .post("/api/v1/media")
        .authorization_bearer(&token)
        .json(&json!({ "file": "dot.png" }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let form = MultipartForm::new().add_text("alt_text", "no file");
    h.server
        .post("/api/v1/media")
        .authorization_bearer(&token)
        .multipart(form)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_newsletter_subscription_cycle() {
    let h = harness().await;
    let (_, admin) = h.login_as("root", "admin").await;

    let response = h
        .server
        .post("/api/v1/newsletter/subscribe")
        .json(&json!({ "email": "Reader@Example.com" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"].get("token").is_none());

    h.server
        .post("/api/v1/newsletter/confirm")
        .json(&json!({ "token": "unknown" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let stats: Value = h
        .server
        .get("/api/v1/newsletter/stats")
        .authorization_bearer(&admin)
        .await
        .json();
    assert_eq!(stats["data"]["pending"], 1);

    // Mail is disabled in tests
    h.server
        .post("/api/v1/newsletter/send")
        .authorization_bearer(&admin)
        .json(&json!({ "subject": "News", "body": "Hello" }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let h = harness().await;
    let response = h.server.get("/api/v1/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "not_found");
}
