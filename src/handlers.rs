use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    access::{self, Section},
    auth::{self, AuthUser},
    brand::{BrandPath, BrandTheme},
    error::AppError,
    models::{
        Brand, CreateUserRequest, DashboardData, LoginRequest, LoginResponse,
        PasswordCheckRequest, PasswordCheckResponse, Permission, ReplaceQuestionsRequest,
        Review, ReviewFilter, SurveyQuestion, SurveyResult, SurveySubmission,
        UpdateUserRequest, User, UserAuditEntry, UserPage, UserProfile, VisibilityUpdate,
    },
    repository::{NewAuditEntry, NewUser},
};

// --- Guard & Profile Helpers ---

/// Applies the access guard for a section. The requirement comes from the
/// declarative route table; the decision itself is the pure `authorize`.
fn require(user: &AuthUser, section: Section, brand: Option<Brand>) -> Result<(), AppError> {
    access::authorize(
        Some(user.actor()),
        access::required_permission(section),
        brand,
    )
    .map_err(AppError::from)
}

fn profile_of(user: &User) -> UserProfile {
    UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        brand: user.brand,
        permissions: user.permissions.clone(),
        sections: access::section_visibility(&user.permissions),
    }
}

// --- Public Handlers ---

/// login
///
/// [Public Route] Verifies credentials, opens a session and returns the
/// bearer token plus the session's CSRF token. Every failure mode (unknown
/// email, bad password, deactivated account) answers the same 401 so the
/// response does not reveal which part was wrong.
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (user, password_hash) = state
        .repo
        .get_user_with_credentials(&payload.email)
        .await
        .ok_or(AppError::Unauthenticated)?;

    if !auth::verify_password(&payload.password, &password_hash)? {
        return Err(AppError::Unauthenticated);
    }
    if !user.active {
        return Err(AppError::Unauthenticated);
    }

    let session = auth::new_session(user.id, state.config.session_hours);
    state.repo.create_session(session.clone()).await?;
    let token = auth::issue_token(&state.config, &session)?;

    tracing::info!(user = %user.email, "login");

    Ok(Json(LoginResponse {
        token,
        csrf_token: session.csrf_token,
        user: profile_of(&user),
    }))
}

/// validate_password
///
/// [Public Route] Checks a candidate password against the provisioning
/// policy, returning the policy message on failure. Used by the signup
/// form for inline feedback; the same check runs server-side on creation.
#[utoipa::path(
    post,
    path = "/users/validate-password",
    request_body = PasswordCheckRequest,
    responses((status = 200, description = "Policy verdict", body = PasswordCheckResponse))
)]
pub async fn validate_password(
    Json(payload): Json<PasswordCheckRequest>,
) -> Json<PasswordCheckResponse> {
    if auth::password_meets_policy(&payload.password) {
        Json(PasswordCheckResponse {
            valid: true,
            message: None,
        })
    } else {
        Json(PasswordCheckResponse {
            valid: false,
            message: Some(auth::PASSWORD_POLICY_MESSAGE.to_string()),
        })
    }
}

/// brand_theme
///
/// [Public Route] Theme variables for a brand. Unknown codes are rejected
/// by the `BrandPath` extractor before this body runs.
#[utoipa::path(
    get,
    path = "/brands/{marca}/theme",
    responses(
        (status = 200, description = "Theme", body = BrandTheme),
        (status = 404, description = "Unknown brand")
    )
)]
pub async fn brand_theme(BrandPath(brand): BrandPath) -> Json<BrandTheme> {
    Json(brand.theme())
}

/// submit_survey
///
/// [Public Route] Survey intake from the emailed link. The first
/// submission for a token is recorded (`exitosa`); any repeat answers
/// `repetida` without overwriting the stored response.
#[utoipa::path(
    post,
    path = "/encuestas/{marca}",
    request_body = SurveySubmission,
    responses(
        (status = 200, description = "Recorded", body = SurveyResult),
        (status = 404, description = "Unknown token"),
        (status = 422, description = "Invalid rating")
    )
)]
pub async fn submit_survey(
    State(state): State<AppState>,
    BrandPath(brand): BrandPath,
    Json(payload): Json<SurveySubmission>,
) -> Result<Json<SurveyResult>, AppError> {
    if !(1..=5).contains(&payload.stars) {
        return Err(AppError::Validation(
            "stars must be between 1 and 5".to_string(),
        ));
    }
    let resultado = state.repo.record_survey_response(brand, payload).await?;
    Ok(Json(SurveyResult { resultado }))
}

// --- Session Handlers ---

/// get_me
///
/// [Authenticated Route] The session user's profile plus the per-section
/// visibility flags the client uses to build its navigation. The flags are
/// computed from the same route table the server guard consults.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(user: AuthUser) -> Json<UserProfile> {
    Json(UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        brand: user.brand,
        sections: access::section_visibility(&user.permissions),
        permissions: user.permissions,
    })
}

/// logout
///
/// [Authenticated Route] Revokes the backing session; the JWT stops
/// authenticating immediately. A bypass identity has no session to revoke.
#[utoipa::path(
    get,
    path = "/users/logout",
    responses((status = 204, description = "Session revoked"))
)]
pub async fn logout(user: AuthUser, State(state): State<AppState>) -> StatusCode {
    if let Some(session_id) = user.session_id {
        state.repo.delete_session(session_id).await;
    }
    StatusCode::NO_CONTENT
}

// --- Dashboard Handlers (`ver`) ---

/// get_dashboard
///
/// [`ver` Route] Brand dashboard metrics over the trailing months.
#[utoipa::path(
    get,
    path = "/graphics/dashboard/{marca}",
    responses(
        (status = 200, description = "Metrics", body = DashboardData),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Denied")
    )
)]
pub async fn get_dashboard(
    user: AuthUser,
    State(state): State<AppState>,
    BrandPath(brand): BrandPath,
) -> Result<Json<DashboardData>, AppError> {
    require(&user, Section::Dashboard, Some(brand))?;
    Ok(Json(state.repo.dashboard_stats(brand, None).await))
}

/// get_dashboard_category
///
/// [`ver` Route] Dashboard narrowed to one product category.
#[utoipa::path(
    get,
    path = "/graphics/dashboard/{marca}/{categoria}",
    responses((status = 200, description = "Metrics", body = DashboardData))
)]
pub async fn get_dashboard_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path((marca, categoria)): Path<(String, String)>,
) -> Result<Json<DashboardData>, AppError> {
    let brand = Brand::resolve_segment(&marca)?;
    require(&user, Section::Dashboard, Some(brand))?;
    Ok(Json(state.repo.dashboard_stats(brand, Some(categoria)).await))
}

// --- Review Handlers (`ver` / `editar`) ---

/// list_reviews
///
/// [`ver` Route] Brand-scoped review listing with the client's filter set:
/// order by score, date range, and product search.
#[utoipa::path(
    get,
    path = "/reviews/resenas/{marca}",
    params(ReviewFilter),
    responses((status = 200, description = "Reviews", body = [Review]))
)]
pub async fn list_reviews(
    user: AuthUser,
    State(state): State<AppState>,
    BrandPath(brand): BrandPath,
    Query(filter): Query<ReviewFilter>,
) -> Result<Json<Vec<Review>>, AppError> {
    require(&user, Section::Reviews, Some(brand))?;
    Ok(Json(state.repo.list_reviews(brand, filter).await))
}

/// get_review_detail
///
/// [`ver` Route] Full detail of one review. The repository query is itself
/// brand-scoped, so an id belonging to another brand reads as missing.
#[utoipa::path(
    get,
    path = "/reviews/resenas_completas/{marca}/{id}",
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_review_detail(
    user: AuthUser,
    State(state): State<AppState>,
    Path((marca, id)): Path<(String, Uuid)>,
) -> Result<Json<Review>, AppError> {
    let brand = Brand::resolve_segment(&marca)?;
    require(&user, Section::Reviews, Some(brand))?;
    let review = state
        .repo
        .get_review(brand, id)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(Json(review))
}

/// set_review_visibility
///
/// [`editar` Route] Moderation toggle for a review's public visibility.
#[utoipa::path(
    put,
    path = "/reviews/resenas/{marca}/{id}/visibilidad",
    request_body = VisibilityUpdate,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 404, description = "Not found")
    )
)]
pub async fn set_review_visibility(
    user: AuthUser,
    State(state): State<AppState>,
    Path((marca, id)): Path<(String, Uuid)>,
    Json(payload): Json<VisibilityUpdate>,
) -> Result<Json<Review>, AppError> {
    let brand = Brand::resolve_segment(&marca)?;
    // Moderation is the `editar` action inside the reviews section.
    access::authorize(Some(user.actor()), Permission::Editar, Some(brand))?;
    let review = state
        .repo
        .set_review_visibility(brand, id, payload.visible)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(Json(review))
}

// --- Survey Configuration Handlers (`editar`) ---

/// get_questions
///
/// [`editar` Route] The brand's configured survey questions, in order.
#[utoipa::path(
    get,
    path = "/emails/correos/{marca}",
    responses((status = 200, description = "Questions", body = [SurveyQuestion]))
)]
pub async fn get_questions(
    user: AuthUser,
    State(state): State<AppState>,
    BrandPath(brand): BrandPath,
) -> Result<Json<Vec<SurveyQuestion>>, AppError> {
    require(&user, Section::Emails, Some(brand))?;
    Ok(Json(state.repo.get_questions(brand).await))
}

/// replace_questions
///
/// [`editar` Route] Saves the editor's question list, replacing the
/// brand's previous configuration. Ids and positions are assigned in list
/// order; free-text questions drop any submitted options.
#[utoipa::path(
    put,
    path = "/emails/correos/{marca}",
    request_body = ReplaceQuestionsRequest,
    responses((status = 200, description = "Saved", body = [SurveyQuestion]))
)]
pub async fn replace_questions(
    user: AuthUser,
    State(state): State<AppState>,
    BrandPath(brand): BrandPath,
    Json(payload): Json<ReplaceQuestionsRequest>,
) -> Result<Json<Vec<SurveyQuestion>>, AppError> {
    require(&user, Section::Emails, Some(brand))?;

    for draft in &payload.questions {
        if draft.text.trim().is_empty() {
            return Err(AppError::Validation(
                "question text must not be empty".to_string(),
            ));
        }
    }

    let questions = state
        .repo
        .replace_questions(brand, payload.questions)
        .await?;
    Ok(Json(questions))
}

// --- User Administration Handlers (`administracion`) ---

/// list_users
///
/// [`administracion` Route] Paginated user listing for a brand. Cross-brand
/// staff (no affiliation) appear on every brand's list.
#[utoipa::path(
    get,
    path = "/usuarios/{page}/{marca}",
    responses((status = 200, description = "Users", body = UserPage))
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    Path((page, marca)): Path<(i64, String)>,
) -> Result<Json<UserPage>, AppError> {
    let brand = Brand::resolve_segment(&marca)?;
    require(&user, Section::Users, Some(brand))?;
    Ok(Json(state.repo.list_users(brand, page).await))
}

/// create_user
///
/// [`administracion` Route] Provisions an account. The permission tags are
/// validated by deserialization against the closed set; the password must
/// satisfy the policy `validate_password` advertises. The guard is applied
/// against the new account's brand, so a brand-pinned administrator cannot
/// provision into another tenant.
#[utoipa::path(
    post,
    path = "/usuarios",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 409, description = "Email taken"),
        (status = 422, description = "Policy violation")
    )
)]
pub async fn create_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    require(&user, Section::Users, payload.brand)?;

    if !auth::password_meets_policy(&payload.password) {
        return Err(AppError::Validation(
            auth::PASSWORD_POLICY_MESSAGE.to_string(),
        ));
    }

    let password_hash = auth::hash_password(&payload.password)?;
    let created = state
        .repo
        .create_user(NewUser {
            id: Uuid::new_v4(),
            name: payload.name,
            email: payload.email,
            brand: payload.brand,
            permissions: payload.permissions,
            active: true,
            password_hash,
        })
        .await?;

    state
        .repo
        .record_user_audit(NewAuditEntry {
            user_id: created.id,
            brand: created.brand,
            action: "Usuario creado".to_string(),
            actor: user.email.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// update_user
///
/// [`administracion` Route] Updates name, permission set and/or active
/// state. The guard runs against the target's brand. An administrator
/// cannot edit their own row here, which closes the self-escalation path.
#[utoipa::path(
    put,
    path = "/usuarios/{id}",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let target = state.repo.get_user(id).await.ok_or(AppError::NotFound)?;
    require(&user, Section::Users, target.brand)?;

    if target.id == user.id {
        return Err(AppError::Validation(
            "cannot modify own account through user administration".to_string(),
        ));
    }

    let mut actions: Vec<&str> = Vec::new();
    if payload.name.is_some() {
        actions.push("nombre");
    }
    if payload.permissions.is_some() {
        actions.push("permisos");
    }
    let active_change = payload.active;

    let updated = state
        .repo
        .update_user(id, payload)
        .await?
        .ok_or(AppError::NotFound)?;

    let action = match active_change {
        Some(true) => "Estado cambiado a activo".to_string(),
        Some(false) => "Estado cambiado a inactivo".to_string(),
        None if actions.is_empty() => "Usuario actualizado".to_string(),
        None => format!("Actualizado: {}", actions.join(", ")),
    };
    state
        .repo
        .record_user_audit(NewAuditEntry {
            user_id: updated.id,
            brand: updated.brand,
            action,
            actor: user.email.clone(),
        })
        .await;

    Ok(Json(updated))
}

/// delete_user
///
/// [`administracion` Route] Removes an account and its sessions. Guarded
/// against the target's brand; self-deletion is rejected.
#[utoipa::path(
    delete,
    path = "/usuarios/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let target = state.repo.get_user(id).await.ok_or(AppError::NotFound)?;
    require(&user, Section::Users, target.brand)?;

    if target.id == user.id {
        return Err(AppError::Validation(
            "cannot modify own account through user administration".to_string(),
        ));
    }

    if !state.repo.delete_user(id).await {
        return Err(AppError::NotFound);
    }

    state
        .repo
        .record_user_audit(NewAuditEntry {
            user_id: target.id,
            brand: target.brand,
            action: "Usuario eliminado".to_string(),
            actor: user.email.clone(),
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// get_user_history
///
/// [`administracion` Route] The brand's user change log, newest first.
#[utoipa::path(
    get,
    path = "/usuarios/historial/{marca}",
    responses((status = 200, description = "Change log", body = [UserAuditEntry]))
)]
pub async fn get_user_history(
    user: AuthUser,
    State(state): State<AppState>,
    BrandPath(brand): BrandPath,
) -> Result<Json<Vec<UserAuditEntry>>, AppError> {
    require(&user, Section::Users, Some(brand))?;
    Ok(Json(state.repo.list_user_audit(brand).await))
}
