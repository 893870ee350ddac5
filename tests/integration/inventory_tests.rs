//! Router-level tests on the in-memory store

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use shelfkeeper::{
    api::create_router, config::AppConfig, repository::Repository, services::Services, AppState,
};

const BOUNDARY: &str = "shelfkeeper-test-boundary";

struct TestApp {
    router: Router,
    admin_token: String,
    _uploads: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let dir = uploads.path().to_string_lossy().into_owned();

        let mut config = AppConfig::default();
        config.uploads.default_cover = format!("{}/default.png", dir);
        config.uploads.dir = dir;
        config.auth.jwt_secret = "inventory-tests".to_string();
        config.admin.password = "admin-pass".to_string();
        config.server.allowed_origins = vec![];
        std::fs::write(&config.uploads.default_cover, b"png").unwrap();

        let repository = Repository::in_memory(Duration::from_secs(2));
        let services = Services::new(repository, &config);
        services.auth.seed_admin(&config.admin).await.unwrap();

        let router = create_router(AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        });

        let mut app = Self {
            router,
            admin_token: String::new(),
            _uploads: uploads,
        };
        app.admin_token = app.login("admin", "admin-pass").await;
        app
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn form(
        &self,
        method: &str,
        uri: &str,
        fields: &[(&str, &str)],
        cover: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.admin_token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, cover)))
            .unwrap();
        self.send(request).await
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/v1/auth/login",
                None,
                json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Register a reader and return (token, user id)
    async fn reader(&self, username: &str) -> (String, i64) {
        let (status, body) = self
            .json(
                "POST",
                "/api/v1/auth/register",
                None,
                json!({ "username": username, "password": "reader-pass" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = body["data"]["id"].as_i64().unwrap();
        (self.login(username, "reader-pass").await, id)
    }

    async fn create_book(&self, title: &str, copies: i32) -> Value {
        let copies = copies.to_string();
        let (status, body) = self
            .form(
                "POST",
                "/api/v1/admin/books",
                &[("title", title), ("author", "Ted Chiang"), ("initial_stock", &copies)],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"].clone()
    }

    async fn book(&self, id: i64) -> Value {
        let (status, body) = self.get(&format!("/api/v1/books/{}", id), Some(self.admin_token.as_str())).await;
        assert_eq!(status, StatusCode::OK);
        body["data"].clone()
    }
}

fn multipart_body(fields: &[(&str, &str)], cover: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = cover {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"cover\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new().await;
    let (token, id) = app.reader("borges").await;

    let (status, body) = app.get("/api/v1/auth/me", Some(token.as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["role"], "user");
    assert!(body["data"].get("password").is_none());

    let (status, body) = app
        .json(
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "username": "borges", "password": "whatever" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn test_lending_scenario() {
    let app = TestApp::new().await;
    let book = app.create_book("Exhalation", 2).await;
    let id = book["id"].as_i64().unwrap();
    assert_eq!(book["summary"], "No summary available.");

    let (first, _) = app.reader("first").await;
    let (second, _) = app.reader("second").await;
    let (third, _) = app.reader("third").await;

    for token in [first.as_str(), second.as_str()] {
        let (status, body) = app.json("POST", "/api/v1/borrows", Some(token), json!({ "id": id })).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["status"], "borrowed");
        assert_eq!(body["data"]["return_date"], Value::Null);
    }

    let (status, body) = app.json("POST", "/api/v1/borrows", Some(third.as_str()), json!({ "id": id })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "OutOfStock");

    let (status, body) = app.json("POST", "/api/v1/borrows/return", Some(first.as_str()), json!({ "id": id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "returned");
    assert!(body["data"]["return_date"].is_string());

    let book = app.book(id).await;
    assert_eq!(book["stock"], 1);
    assert_eq!(book["total_stock"], 2);

    // Second return of the same borrow
    let (status, body) = app.json("POST", "/api/v1/borrows/return", Some(first.as_str()), json!({ "id": id })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchRecord");
    assert_eq!(app.book(id).await["stock"], 1);

    let (_, mine) = app.get("/api/v1/records", Some(first.as_str())).await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 1);

    let (_, all) = app.get("/api/v1/admin/records?status=borrowed", Some(app.admin_token.as_str())).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_through_the_router() {
    let app = Arc::new(TestApp::new().await);
    let id = app.create_book("Stories of Your Life", 3).await["id"].as_i64().unwrap();

    let mut tokens = Vec::new();
    for n in 0..8 {
        tokens.push(app.reader(&format!("reader{}", n)).await.0);
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let app = app.clone();
            tokio::spawn(async move {
                app.json("POST", "/api/v1/borrows", Some(token.as_str()), json!({ "id": id }))
                    .await
                    .0
            })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!((created, conflicts), (3, 5));
    assert_eq!(app.book(id).await["stock"], 0);
}

#[tokio::test]
async fn test_stock_update_validation() {
    let app = TestApp::new().await;
    let id = app.create_book("The Lifecycle of Software Objects", 2).await["id"].as_i64().unwrap();
    let uri = format!("/api/v1/admin/books/{}", id);

    let (status, body) = app
        .form("PUT", &uri, &[("stock", "5"), ("total_stock", "3")], None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRange");

    let (status, _) = app.form("PUT", &uri, &[("stock", "many")], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let book = app.book(id).await;
    assert_eq!((book["stock"].as_i64(), book["total_stock"].as_i64()), (Some(2), Some(2)));

    let (status, body) = app
        .form("PUT", &uri, &[("title", "Renamed"), ("stock", "4"), ("total_stock", "6")], None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["title"], "Renamed");
    assert_eq!(body["data"]["stock"], 4);
    assert_eq!(body["data"]["total_stock"], 6);
    assert_eq!(body["data"]["initial_stock"], 2);
}

#[tokio::test]
async fn test_blank_summary_on_update_restores_default() {
    let app = TestApp::new().await;
    let id = app.create_book("Exhalation", 1).await["id"].as_i64().unwrap();
    let uri = format!("/api/v1/admin/books/{}", id);

    let (status, body) = app
        .form("PUT", &uri, &[("summary", "A scientist dissects his own brain")], None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["summary"], "A scientist dissects his own brain");

    // Leaving the field out keeps the current summary
    let (status, body) = app.form("PUT", &uri, &[("title", "Exhalation: Stories")], None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["summary"], "A scientist dissects his own brain");

    let (status, body) = app.form("PUT", &uri, &[("summary", "  ")], None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["summary"], "No summary available.");
}

#[tokio::test]
async fn test_cover_lifecycle() {
    let app = TestApp::new().await;

    let (status, body) = app
        .form(
            "POST",
            "/api/v1/admin/books",
            &[("title", "Tower of Babylon"), ("author", "Ted Chiang"), ("initial_stock", "1")],
            Some(("tower.png", &b"first-cover"[..])),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let id = body["data"]["id"].as_i64().unwrap();
    let first_cover = body["data"]["cover_path"].as_str().unwrap().to_string();
    assert!(Path::new(&first_cover).exists());

    // Replacing the cover releases the old file
    let (status, body) = app
        .form(
            "PUT",
            &format!("/api/v1/admin/books/{}", id),
            &[],
            Some(("tower.jpg", &b"second-cover"[..])),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let second_cover = body["data"]["cover_path"].as_str().unwrap().to_string();
    assert_ne!(first_cover, second_cover);
    assert!(!Path::new(&first_cover).exists());
    assert_eq!(std::fs::read(&second_cover).unwrap(), b"second-cover");

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/admin/books/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "deleted");
    assert!(!Path::new(&second_cover).exists());

    let (status, _) = app.get(&format!("/api/v1/books/{}", id), Some(app.admin_token.as_str())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_refused_while_copies_are_out() {
    let app = TestApp::new().await;
    let id = app.create_book("Understand", 2).await["id"].as_i64().unwrap();
    let (reader, _) = app.reader("leon").await;
    app.json("POST", "/api/v1/borrows", Some(reader.as_str()), json!({ "id": id })).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/admin/books/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let book = app.book(id).await;
    assert_eq!(book["stock"], 1);
    assert_eq!(book["total_stock"], 2);
}

#[tokio::test]
async fn test_role_gates() {
    let app = TestApp::new().await;
    let (reader, _) = app.reader("patron").await;

    let (status, _) = app.get("/api/v1/books", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/books", Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/admin/records", Some(reader.as_str())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/v1/admin/users/1/records", Some(app.admin_token.as_str())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/v1/books", Some(reader.as_str())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_books_filters() {
    let app = TestApp::new().await;
    app.create_book("Seventy-Two Letters", 1).await;
    app.create_book("Hell Is the Absence of God", 1).await;

    let (_, body) = app.get("/api/v1/books", Some(app.admin_token.as_str())).await;
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Hell Is the Absence of God", "Seventy-Two Letters"]);

    let (_, body) = app.get("/api/v1/books?title=letters", Some(app.admin_token.as_str())).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Duplicate title and author
    let (status, _) = app
        .form(
            "POST",
            "/api/v1/admin/books",
            &[("title", "Seventy-Two Letters"), ("author", "Ted Chiang"), ("initial_stock", "3")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/api/v1/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}
