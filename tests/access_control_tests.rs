//! HTTP-level access guard scenarios: deny-by-default, the flat permission
//! model, and brand scoping, exercised through the real router.

use chrono::Utc;
use magnus_stella::{
    AppConfig, AppState, MemoryRepository, create_router,
    models::{Brand, Permission, PermissionSet, User},
    repository::RepositoryState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub repo: Arc<MemoryRepository>,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, repo }
}

fn seed_user(app: &TestApp, brand: Option<Brand>, permissions: Vec<Permission>) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    app.repo.seed_user(
        User {
            id,
            name: "Test User".to_string(),
            email: format!("user-{}@example.com", id.simple()),
            brand,
            permissions: PermissionSet::from(permissions),
            active: true,
            created_at: now,
            updated_at: now,
        },
        "unused-hash",
    );
    id
}

async fn denial_code(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    body["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_unauthenticated_denied_before_brand_resolution() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Valid and invalid brand segments alike answer 401: the session check
    // runs before the brand is even looked at.
    for path in [
        "/graphics/dashboard/LU1",
        "/graphics/dashboard/ZZZ",
        "/reviews/resenas/NO1",
        "/usuarios/1/MA1",
    ] {
        let response = client
            .get(format!("{}{}", app.address, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401, "path {path}");
        assert_eq!(denial_code(response).await, "unauthenticated");
    }
}

#[tokio::test]
async fn test_ver_only_user_reaches_dashboard_but_not_users() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&app, None, vec![Permission::Ver]);

    let response = client
        .get(format!("{}/graphics/dashboard/LU1", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/usuarios/1/LU1", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(denial_code(response).await, "insufficient-permission");
}

#[tokio::test]
async fn test_administracion_alone_does_not_grant_dashboard() {
    // The three flags are independent booleans, not a ladder.
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&app, None, vec![Permission::Administracion]);

    let response = client
        .get(format!("{}/graphics/dashboard/LU1", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(denial_code(response).await, "insufficient-permission");

    // The same user does reach their own section.
    let response = client
        .get(format!("{}/usuarios/1/LU1", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_empty_permission_set_denied_everywhere() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&app, None, vec![]);

    for path in [
        "/graphics/dashboard/LU1",
        "/reviews/resenas/LU1",
        "/emails/correos/LU1",
        "/usuarios/1/LU1",
        "/usuarios/historial/LU1",
    ] {
        let response = client
            .get(format!("{}{}", app.address, path))
            .header("x-user-id", user_id.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403, "path {path}");
        assert_eq!(denial_code(response).await, "insufficient-permission");
    }
}

#[tokio::test]
async fn test_brand_pinned_user_cannot_cross_brands() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&app, Some(Brand::Lu1), vec![Permission::Ver]);

    let response = client
        .get(format!("{}/reviews/resenas/LU1", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    for other in ["NO1", "MA1"] {
        let response = client
            .get(format!("{}/reviews/resenas/{}", app.address, other))
            .header("x-user-id", user_id.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403, "brand {other}");
        assert_eq!(denial_code(response).await, "brand-mismatch");
    }
}

#[tokio::test]
async fn test_invalid_brand_is_rejected_not_defaulted() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&app, None, vec![Permission::Ver]);

    // A probe with a bogus brand must land on 404, never on LU1 data.
    let response = client
        .get(format!("{}/graphics/dashboard/LU2", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(denial_code(response).await, "invalid-brand");
}

#[tokio::test]
async fn test_me_reports_sections_from_the_requirement_table() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&app, Some(Brand::No1), vec![Permission::Ver, Permission::Editar]);

    let response = client
        .get(format!("{}/me", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["brand"], "NO1");
    assert_eq!(body["sections"]["dashboard"], true);
    assert_eq!(body["sections"]["reviews"], true);
    assert_eq!(body["sections"]["emails"], true);
    assert_eq!(body["sections"]["users"], false);
}

#[tokio::test]
async fn test_brand_theme_is_public_and_validated() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/brands/NO1/theme", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Nooz");
    assert_eq!(body["brand"], "NO1");

    let response = client
        .get(format!("{}/brands/XXL/theme", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
