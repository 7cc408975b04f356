use axum::{routing::get, Router};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use team_hub::api;
use team_hub_core::storage::{Document, Role, Store, User};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

fn seeded_store(dir: &std::path::Path) -> Arc<RwLock<Store>> {
    let store = Store::open(dir.join("db.json")).unwrap();
    let doc = Document {
        users: vec![User {
            id: 100_001,
            name: "Meera".into(),
            mobile: "9999999999".into(),
            password: "secret".into(),
            role: Role::Manager,
        }],
        ..Document::default()
    };
    store.save(&doc).unwrap();
    Arc::new(RwLock::new(store))
}

#[tokio::test]
async fn server_health_endpoint() {
    let tempdir = tempfile::tempdir().unwrap();
    let store = seeded_store(tempdir.path());
    let app = Router::new()
        .merge(api::router(store))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, app.into_make_service()).into_future());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let resp = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let text = resp.text().await.unwrap();
    assert_eq!(text, "OK");

    server.abort();
}

#[tokio::test]
async fn login_over_the_wire() {
    let tempdir = tempfile::tempdir().unwrap();
    let store = seeded_store(tempdir.path());
    let app = Router::new().merge(api::router(store));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, app.into_make_service()).into_future());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/login", addr))
        .json(&serde_json::json!({ "mobile": "9999999999", "password": "secret" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["role"], "manager");

    let resp = client
        .post(format!("http://{}/api/login", addr))
        .json(&serde_json::json!({ "mobile": "9999999999", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    server.abort();
}

#[tokio::test]
async fn document_survives_restart() {
    let tempdir = tempfile::tempdir().unwrap();
    let store = seeded_store(tempdir.path());
    let app = Router::new().merge(api::router(store));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, app.into_make_service()).into_future());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/resources", addr))
        .header("x-user-id", "100001")
        .json(&serde_json::json!({
            "name": "Asha",
            "project": "Atlas",
            "joiningDate": "2023-06-01",
            "birthday": "1995-02-14",
            "diet": "Non-Veg",
            "skills": "rust",
            "gender": "Female",
            "mobile": "9000000001",
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    server.abort();

    // a fresh server over the same file sees the same document
    let store = Arc::new(RwLock::new(
        Store::open(tempdir.path().join("db.json")).unwrap(),
    ));
    let app = Router::new().merge(api::router(store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, app.into_make_service()).into_future());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let resp = reqwest::get(format!("http://{}/api/resources", addr))
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["diet"], "Non-Veg");

    server.abort();
}
