use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// User administration, nested under `/usuarios` and restricted to
/// `administracion` holders. Every mutation is guarded against the target
/// account's brand and recorded in the user change log.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /usuarios
        // Provisions an account; password policy and closed permission
        // tags are validated before anything is written.
        .route("/", post(handlers::create_user))
        // GET /usuarios/historial/{marca}
        // Per-brand change log, newest first.
        .route("/historial/{marca}", get(handlers::get_user_history))
        // GET /usuarios/{page}/{marca}
        // Paginated brand listing; cross-brand staff appear everywhere.
        .route("/{page}/{marca}", get(handlers::list_users))
        // PUT/DELETE /usuarios/{id}
        // Name/permissions/state updates and removal. Self-modification is
        // rejected to keep escalation impossible through these routes.
        .route(
            "/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
}
