//! API integration tests against a running server
//!
//! Start the server with the default admin credentials overridden:
//! `ADMIN_PASSWORD=admin-pass cargo run`, then run
//! `cargo test --test api_tests -- --ignored`.

use reqwest::{multipart, Client};
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Helper to get an admin token
async fn get_auth_token(client: &Client) -> String {
    login(client, "admin", "admin-pass").await
}

async fn login(client: &Client, username: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": username,
            "password": password
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["data"]["token"]
        .as_str()
        .expect("No token in response")
        .to_string()
}

/// Register a throwaway reader and return its token
async fn reader_token(client: &Client) -> String {
    let username = format!("r{}", &Uuid::new_v4().simple().to_string()[..12]);
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({ "username": username, "password": "reader-pass" }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), 201);

    login(client, &username, "reader-pass").await
}

async fn create_book(client: &Client, token: &str, copies: i32) -> i64 {
    let form = multipart::Form::new()
        .text("title", format!("Live Book {}", Uuid::new_v4()))
        .text("author", "Integration Suite")
        .text("initial_stock", copies.to_string());

    let response = client
        .post(format!("{}/admin/books", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.expect("Failed to parse response");
    body["data"]["id"].as_i64().expect("No book ID")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_get_current_user() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["role"], "admin");
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_cycle() {
    let client = Client::new();
    let admin = get_auth_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    let response = client
        .post(format!("{}/borrows", BASE_URL))
        .header("Authorization", format!("Bearer {}", reader))
        .json(&json!({ "id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    // The only copy is out
    let other = reader_token(&client).await;
    let response = client
        .post(format!("{}/borrows", BASE_URL))
        .header("Authorization", format!("Bearer {}", other))
        .json(&json!({ "id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);

    // Deleting with a copy out is refused
    let response = client
        .delete(format!("{}/admin/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);

    let response = client
        .post(format!("{}/borrows/return", BASE_URL))
        .header("Authorization", format!("Bearer {}", reader))
        .json(&json!({ "id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["status"], "returned");
    assert!(body["data"]["return_date"].is_string());

    let response = client
        .delete(format!("{}/admin/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["status"], "deleted");
}

#[tokio::test]
#[ignore]
async fn test_stock_update_rejects_inverted_range() {
    let client = Client::new();
    let admin = get_auth_token(&client).await;
    let book_id = create_book(&client, &admin, 2).await;

    let form = multipart::Form::new()
        .text("stock", "5")
        .text("total_stock", "3");
    let response = client
        .put(format!("{}/admin/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["stock"], 2);
    assert_eq!(body["data"]["total_stock"], 2);
}

#[tokio::test]
#[ignore]
async fn test_admin_routes_require_admin() {
    let client = Client::new();
    let reader = reader_token(&client).await;

    let response = client
        .get(format!("{}/admin/records", BASE_URL))
        .header("Authorization", format!("Bearer {}", reader))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}
