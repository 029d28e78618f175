use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Authenticated Router Module
///
/// Everything here sits behind the session guard layer (authentication +
/// CSRF on mutating methods). Section permissions — `ver` for dashboard
/// and reviews, `editar` for the survey configuration and moderation —
/// are enforced inside the handlers through the access guard, against the
/// brand resolved from the path.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // Session profile plus section visibility for the navigation.
        .route("/me", get(handlers::get_me))
        // GET /users/logout
        // Revokes the backing session.
        .route("/users/logout", get(handlers::logout))
        // --- Dashboard (ver) ---
        .route("/graphics/dashboard/{marca}", get(handlers::get_dashboard))
        .route(
            "/graphics/dashboard/{marca}/{categoria}",
            get(handlers::get_dashboard_category),
        )
        // --- Reviews (ver; moderation requires editar) ---
        .route("/reviews/resenas/{marca}", get(handlers::list_reviews))
        .route(
            "/reviews/resenas_completas/{marca}/{id}",
            get(handlers::get_review_detail),
        )
        .route(
            "/reviews/resenas/{marca}/{id}/visibilidad",
            put(handlers::set_review_visibility),
        )
        // --- Survey configuration (editar) ---
        .route(
            "/emails/correos/{marca}",
            get(handlers::get_questions).put(handlers::replace_questions),
        )
}
