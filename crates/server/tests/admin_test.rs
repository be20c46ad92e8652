//! # User and Admin Endpoint Tests
//!
//! Covers `/me`, the admin-only `/users` listing, and role bootstrapping for
//! users created implicitly from a token.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{generate_jwt, TestApp};
use core_access::{user_id_for, Role};
use serde_json::{json, Value};

#[tokio::test]
async fn test_get_users_as_admin_and_viewer() -> Result<()> {
    // --- Arrange ---
    let app = TestApp::spawn().await?;
    let (admin, admin_token) = app.login_as("admin@example.com", Role::Admin).await?;
    let (_, viewer_token) = app.login_as("viewer@example.com", Role::Viewer).await?;

    // --- Act & Assert: admin ---
    let response = app
        .client
        .get(app.url("/users?debug=true"))
        .bearer_auth(&admin_token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let users = body["result"].as_array().expect("users array");
    assert_eq!(users.len(), 2);
    assert!(users.iter().any(|u| u["id"] == admin.id && u["role"] == "admin"));
    assert_eq!(body["debug"]["user_count"], 2);

    // --- Act & Assert: viewer ---
    let response = app
        .client
        .get(app.url("/users"))
        .bearer_auth(&viewer_token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    assert_eq!(
        body["error"],
        "You do not have permission to access this resource."
    );
    Ok(())
}

#[tokio::test]
async fn test_me_returns_the_resolved_user() -> Result<()> {
    let app = TestApp::spawn().await?;
    let (editor, token) = app.login_as("editor@example.com", Role::Editor).await?;

    let response = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["id"], editor.id);
    assert_eq!(body["role"], "editor");
    Ok(())
}

#[tokio::test]
async fn test_first_implicit_user_bootstraps_as_admin() -> Result<()> {
    let app = TestApp::spawn().await?;

    // Neither user exists before their first request.
    let first_token = generate_jwt("first@example.com")?;
    let second_token = generate_jwt("second@example.com")?;

    let first: Value = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&first_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(first["id"], user_id_for("first@example.com"));
    assert_eq!(first["role"], "admin");

    let second: Value = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&second_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(second["role"], "viewer");

    // The same subject resolves to the same user on later requests.
    let again: Value = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&first_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(again["id"], first["id"]);
    assert_eq!(again["role"], "admin");
    Ok(())
}

#[tokio::test]
async fn test_admin_assigns_editor_role() -> Result<()> {
    let app = TestApp::spawn().await?;
    let (_, admin_token) = app.login_as("admin@example.com", Role::Admin).await?;
    // A user created implicitly after the bootstrap admin starts as a viewer.
    let newcomer_token = generate_jwt("newcomer@example.com")?;
    let newcomer_id = user_id_for("newcomer@example.com");
    let me: Value = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&newcomer_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["role"], "viewer");

    // The viewer may not promote itself.
    let response = app
        .client
        .patch(app.url(&format!("/users/{newcomer_id}")))
        .bearer_auth(&newcomer_token)
        .json(&json!({ "role": "editor" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .patch(app.url(&format!("/users/{newcomer_id}")))
        .bearer_auth(&admin_token)
        .json(&json!({ "role": "editor" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["result"]["id"], newcomer_id);
    assert_eq!(body["result"]["role"], "editor");

    // The promoted user can now author processes.
    let created = app
        .create_process(&newcomer_token, json!({ "type": "api_sync" }))
        .await?;
    assert_eq!(created["initiatedBy"], newcomer_id);

    // Unknown users and roles.
    let response = app
        .client
        .patch(app.url("/users/no-such-user"))
        .bearer_auth(&admin_token)
        .json(&json!({ "role": "editor" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .client
        .patch(app.url(&format!("/users/{newcomer_id}")))
        .bearer_auth(&admin_token)
        .json(&json!({ "role": "owner" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
