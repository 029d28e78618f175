use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, Method},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod access;
pub mod auth;
pub mod brand;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use error::AppError;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Core state types for the application entry point and tests.
pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generated OpenAPI documentation, aggregating every handler
/// decorated with `#[utoipa::path]` and the schemas they exchange. Served
/// at `/api-docs/openapi.json` behind the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::validate_password, handlers::brand_theme,
        handlers::submit_survey, handlers::get_me, handlers::logout,
        handlers::get_dashboard, handlers::get_dashboard_category,
        handlers::list_reviews, handlers::get_review_detail,
        handlers::set_review_visibility, handlers::get_questions,
        handlers::replace_questions, handlers::list_users, handlers::create_user,
        handlers::update_user, handlers::delete_user, handlers::get_user_history
    ),
    components(
        schemas(
            models::Brand, models::Permission, models::PermissionSet, models::User,
            models::Review, models::SurveyQuestion, models::QuestionOption,
            models::QuestionKind, models::SurveyOutcome, models::UserAuditEntry,
            models::LoginRequest, models::LoginResponse, models::UserProfile,
            models::SectionVisibility, models::CreateUserRequest,
            models::UpdateUserRequest, models::PasswordCheckRequest,
            models::PasswordCheckResponse, models::VisibilityUpdate,
            models::QuestionDraft, models::ReplaceQuestionsRequest,
            models::SurveySubmission, models::SurveyResult, models::UserPage,
            models::MonthlySeries, models::DashboardData, brand::BrandTheme
        )
    ),
    tags(
        (name = "magnus-stella", description = "Brand-aware review management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding all application services and
/// configuration, shared across every request.
#[derive(Clone)]
pub struct AppState {
    /// Repository layer: abstracts database access.
    pub repo: RepositoryState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Allow extractors to pull individual components from the shared state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// session_guard
///
/// Middleware for the protected routers. Extracting `AuthUser` rejects
/// unauthenticated requests with 401 before any handler (or brand
/// resolution) runs; on mutating methods the session's CSRF token must be
/// echoed in `x-csrf-token` or the request stops here with 403. Read
/// methods are exempt, mirroring the legacy double-submit setup.
async fn session_guard(
    auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let method = request.method();
    let mutating = method != Method::GET && method != Method::HEAD && method != Method::OPTIONS;

    if mutating {
        // A bypass identity (local dev) has no session and no token.
        if let Some(expected) = &auth_user.csrf_token {
            let provided = request
                .headers()
                .get("x-csrf-token")
                .and_then(|value| value.to_str().ok());
            if provided != Some(expected.as_str()) {
                return Err(AppError::Forbidden("invalid-csrf"));
            }
        }
    }

    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware,
/// and registers the application state.
///
/// # Panics
/// Panics when the static route requirement table is malformed; an
/// undeclared section is a programming mistake the process must not start
/// with.
pub fn create_router(state: AppState) -> Router {
    access::validate_requirements().expect("FATAL: route requirement table is malformed");

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        // Documentation: auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes: no session layer.
        .merge(public::public_routes())
        // Authenticated routes behind the session + CSRF guard.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_guard,
            )),
        )
        // User administration, nested under '/usuarios' behind the same
        // guard; the `administracion` check runs in the handlers.
        .nest(
            "/usuarios",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_guard,
            )),
        )
        .with_state(state);

    // Observability and correlation layers, outermost.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes the `TraceLayer` span so every log line of a request is
/// correlated by the generated request id alongside method and URI.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
