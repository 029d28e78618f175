//! Session lifecycle over the wire: login, CSRF enforcement, logout and
//! the public survey intake.

use chrono::Utc;
use magnus_stella::{
    AppConfig, AppState, MemoryRepository, auth, create_router,
    config::Env,
    models::{Brand, LoginResponse, Permission, PermissionSet, SurveyInvite, User},
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
    // Production mode: no dev bypass, sessions and CSRF fully enforced.
    let mut config = AppConfig::default();
    config.env = Env::Production;
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        config,
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

const TEST_PASSWORD: &str = "Abcdef123!";

fn seed_account(app: &TestApp, email: &str, permissions: Vec<Permission>, active: bool) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let hash = auth::hash_password(TEST_PASSWORD).unwrap();
    app.repo.seed_user(
        User {
            id,
            name: "Cuenta de Prueba".to_string(),
            email: email.to_string(),
            brand: None,
            permissions: PermissionSet::from(permissions),
            active,
            created_at: now,
            updated_at: now,
        },
        &hash,
    );
    id
}

async fn login(app: &TestApp, client: &reqwest::Client, email: &str) -> LoginResponse {
    let response = client
        .post(format!("{}/users/login", app.address))
        .json(&serde_json::json!({ "email": email, "password": TEST_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

// --- Login & Session ---

#[tokio::test]
async fn test_login_issues_usable_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_account(&app, "demo@example.com", vec![Permission::Ver], true);

    let login = login(&app, &client, "demo@example.com").await;
    assert!(!login.csrf_token.is_empty());
    assert!(login.user.sections.dashboard);
    assert!(!login.user.sections.users);

    let response = client
        .get(format!("{}/me", app.address))
        .bearer_auth(&login.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["email"], "demo@example.com");
}

#[tokio::test]
async fn test_login_rejects_bad_credentials_uniformly() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_account(&app, "demo@example.com", vec![Permission::Ver], true);
    seed_account(&app, "inactive@example.com", vec![Permission::Ver], false);

    // Wrong password, unknown account and deactivated account all answer
    // the same 401.
    for (email, password) in [
        ("demo@example.com", "Wrong12345!"),
        ("nobody@example.com", TEST_PASSWORD),
        ("inactive@example.com", TEST_PASSWORD),
    ] {
        let response = client
            .post(format!("{}/users/login", app.address))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401, "account {email}");
    }
}

#[tokio::test]
async fn test_logout_revokes_the_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_account(&app, "demo@example.com", vec![Permission::Ver], true);

    let login = login(&app, &client, "demo@example.com").await;

    let response = client
        .get(format!("{}/users/logout", app.address))
        .bearer_auth(&login.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // The token is signed and unexpired, but the session row is gone.
    let response = client
        .get(format!("{}/me", app.address))
        .bearer_auth(&login.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

// --- CSRF ---

#[tokio::test]
async fn test_mutating_request_requires_csrf_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_account(&app, "editor@example.com", vec![Permission::Editar], true);

    let login = login(&app, &client, "editor@example.com").await;
    let payload = serde_json::json!({
        "questions": [{ "text": "¿Todo bien?", "kind": "abierta" }]
    });

    // Missing header.
    let response = client
        .put(format!("{}/emails/correos/LU1", app.address))
        .bearer_auth(&login.token)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid-csrf");

    // Wrong token.
    let response = client
        .put(format!("{}/emails/correos/LU1", app.address))
        .bearer_auth(&login.token)
        .header("x-csrf-token", "forged")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Correct token.
    let response = client
        .put(format!("{}/emails/correos/LU1", app.address))
        .bearer_auth(&login.token)
        .header("x-csrf-token", &login.csrf_token)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_reads_are_exempt_from_csrf() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_account(&app, "viewer@example.com", vec![Permission::Ver], true);

    let login = login(&app, &client, "viewer@example.com").await;

    let response = client
        .get(format!("{}/reviews/resenas/LU1", app.address))
        .bearer_auth(&login.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

// --- Password Policy ---

#[tokio::test]
async fn test_validate_password_endpoint() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .post(format!("{}/users/validate-password", app.address))
        .json(&serde_json::json!({ "password": "Abcdef123!" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["valid"], true);

    let body: serde_json::Value = client
        .post(format!("{}/users/validate-password", app.address))
        .json(&serde_json::json!({ "password": "tooweak" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["valid"], false);
    assert!(body["message"].as_str().unwrap().contains("10 caracteres"));
}

// --- Survey Intake ---

#[tokio::test]
async fn test_survey_submission_first_wins_then_repetida() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let token = Uuid::new_v4();
    app.repo.seed_invite(SurveyInvite {
        token,
        brand: Brand::Ma1,
        sent_at: Utc::now(),
        answered_at: None,
    });

    let payload = serde_json::json!({ "token": token, "stars": 5, "comment": "Excelente" });

    let body: serde_json::Value = client
        .post(format!("{}/encuestas/MA1", app.address))
        .json(&payload)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["resultado"], "exitosa");

    // Resubmitting the same token reports the duplicate.
    let body: serde_json::Value = client
        .post(format!("{}/encuestas/MA1", app.address))
        .json(&payload)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["resultado"], "repetida");
}

#[tokio::test]
async fn test_survey_submission_validations() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let token = Uuid::new_v4();
    app.repo.seed_invite(SurveyInvite {
        token,
        brand: Brand::Ma1,
        sent_at: Utc::now(),
        answered_at: None,
    });

    // Unknown token.
    let response = client
        .post(format!("{}/encuestas/MA1", app.address))
        .json(&serde_json::json!({ "token": Uuid::new_v4(), "stars": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // A token is bound to its brand's survey.
    let response = client
        .post(format!("{}/encuestas/LU1", app.address))
        .json(&serde_json::json!({ "token": token, "stars": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Out-of-range rating.
    let response = client
        .post(format!("{}/encuestas/MA1", app.address))
        .json(&serde_json::json!({ "token": token, "stars": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // Unknown brand segment on a public route is still rejected.
    let response = client
        .post(format!("{}/encuestas/ZZZ", app.address))
        .json(&serde_json::json!({ "token": token, "stars": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
