use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: the login gateway, the password
/// policy check backing the signup form, per-brand theme metadata, the
/// customer-facing survey intake, and the health probe.
///
/// The survey intake is the only public write; it is keyed by the emailed
/// single-use token rather than a session, so the CSRF layer does not
/// apply to it.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Monitoring/load-balancer probe; answers immediately.
        .route("/health", get(|| async { "ok" }))
        // POST /users/login
        // Credential check; opens a session and returns token + CSRF token.
        .route("/users/login", post(handlers::login))
        // POST /users/validate-password
        // Inline policy feedback for the provisioning form.
        .route("/users/validate-password", post(handlers::validate_password))
        // GET /brands/{marca}/theme
        // Brand display name and color variables. Unknown codes are 404.
        .route("/brands/{marca}/theme", get(handlers::brand_theme))
        // POST /encuestas/{marca}
        // Survey response intake; first submission per token wins.
        .route("/encuestas/{marca}", post(handlers::submit_survey))
}
