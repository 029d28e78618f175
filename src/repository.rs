use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use sqlx::{PgPool, Row, postgres::PgRow, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        Brand, DashboardData, MonthlySeries, PermissionSet, QuestionDraft, QuestionKind,
        QuestionOption, Review, ReviewFilter, Session, SortOrder, SurveyInvite, SurveyOutcome,
        SurveyQuestion, SurveySubmission, UpdateUserRequest, User, UserAuditEntry, UserPage,
    },
};

/// Users per page of the admin listing.
pub const USERS_PER_PAGE: i64 = 10;

// --- Internal Write Payloads ---

/// NewUser
///
/// Provisioning payload as the repository sees it: validated fields plus
/// the already-computed password hash. The plaintext never reaches this
/// layer.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub brand: Option<Brand>,
    pub permissions: PermissionSet,
    pub active: bool,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: Uuid,
    pub brand: Option<Brand>,
    pub action: String,
    pub actor: String,
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, so handlers never see
/// the pool and tests run against the in-memory implementation.
/// `Send + Sync + async_trait` make the trait object (`Arc<dyn Repository>`)
/// shareable across axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Sessions ---
    async fn create_session(&self, session: Session) -> Result<(), AppError>;
    async fn get_session(&self, id: Uuid) -> Option<Session>;
    // Returns true if a row was removed (logout of a live session).
    async fn delete_session(&self, id: Uuid) -> bool;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    // Login lookup: the user plus their stored password hash.
    async fn get_user_with_credentials(&self, email: &str) -> Option<(User, String)>;
    // Brand-scoped listing; cross-brand staff appear on every brand's page.
    async fn list_users(&self, brand: Brand, page: i64) -> UserPage;
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest)
    -> Result<Option<User>, AppError>;
    // Also revokes the user's sessions.
    async fn delete_user(&self, id: Uuid) -> bool;

    // --- User Change Log ---
    async fn record_user_audit(&self, entry: NewAuditEntry);
    async fn list_user_audit(&self, brand: Brand) -> Vec<UserAuditEntry>;

    // --- Reviews ---
    async fn list_reviews(&self, brand: Brand, filter: ReviewFilter) -> Vec<Review>;
    async fn get_review(&self, brand: Brand, id: Uuid) -> Option<Review>;
    // Moderation toggle; brand scoping is enforced in the query itself.
    async fn set_review_visibility(&self, brand: Brand, id: Uuid, visible: bool)
    -> Option<Review>;

    // --- Survey Configuration ---
    async fn get_questions(&self, brand: Brand) -> Vec<SurveyQuestion>;
    // Replaces the brand's whole question list, assigning ids and positions.
    async fn replace_questions(
        &self,
        brand: Brand,
        drafts: Vec<QuestionDraft>,
    ) -> Result<Vec<SurveyQuestion>, AppError>;

    // --- Survey Intake ---
    // First submission for a token answers it (`exitosa`); any later one is
    // reported as `repetida`. Unknown tokens are NotFound.
    async fn record_survey_response(
        &self,
        brand: Brand,
        submission: SurveySubmission,
    ) -> Result<SurveyOutcome, AppError>;

    // --- Dashboard ---
    async fn dashboard_stats(&self, brand: Brand, category: Option<String>) -> DashboardData;
}

/// RepositoryState
///
/// The concrete type used to share persistence access across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Shared Row Mapping ---

fn parse_brand_column(value: Option<String>) -> Result<Option<Brand>, AppError> {
    match value {
        None => Ok(None),
        Some(code) => Brand::resolve(&code)
            .map(Some)
            .ok_or_else(|| AppError::Internal(format!("stored row carries unknown brand {code}"))),
    }
}

fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

// --- Postgres Implementation ---

/// PostgresRepository
///
/// Concrete implementation backed by the PostgreSQL pool. Reads follow the
/// log-and-default convention (an infrastructure error yields an empty
/// result, never a panic); writes propagate typed errors.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &PgRow) -> Result<(User, String), AppError> {
        let tags: Vec<String> = row.get("permissions");
        let permissions = PermissionSet::try_from_tags(&tags)
            .map_err(|tag| AppError::Internal(format!("stored unknown permission tag {tag}")))?;
        let brand = parse_brand_column(row.get("brand"))?;

        let user = User {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            brand,
            permissions,
            active: row.get("active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        };
        let hash: String = row.get("password_hash");
        Ok((user, hash))
    }

    fn review_from_row(row: &PgRow) -> Result<Review, AppError> {
        let brand_code: String = row.get("brand");
        let brand = Brand::resolve(&brand_code).ok_or_else(|| {
            AppError::Internal(format!("stored review carries unknown brand {brand_code}"))
        })?;
        Ok(Review {
            id: row.get("id"),
            brand,
            title: row.get("title"),
            item_code: row.get("item_code"),
            category: row.get("category"),
            stars: row.get("stars"),
            body: row.get("body"),
            visible: row.get("visible"),
            created_at: row.get("created_at"),
        })
    }

    async fn fetch_question_options(&self, question_id: Uuid) -> Vec<QuestionOption> {
        let result = sqlx::query(
            r#"SELECT id, option_text, position
               FROM survey_options
               WHERE question_id = $1
               ORDER BY position ASC"#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows
                .iter()
                .map(|row| QuestionOption {
                    id: row.get("id"),
                    text: row.get("option_text"),
                    position: row.get("position"),
                })
                .collect(),
            Err(e) => {
                tracing::error!("fetch_question_options error: {:?}", e);
                vec![]
            }
        }
    }

    /// Collects one monthly series; the query must return `month` and
    /// `value` columns grouped per month label, with `$1` as the brand.
    async fn monthly_series(&self, sql: &str, brand: Brand) -> MonthlySeries {
        let result = sqlx::query(sql).bind(brand.as_code()).fetch_all(&self.pool).await;
        match result {
            Ok(rows) => {
                let mut series = MonthlySeries::default();
                for row in &rows {
                    series.labels.push(row.get("month"));
                    series.data.push(row.get("value"));
                }
                series
            }
            Err(e) => {
                tracing::error!("monthly_series error: {:?}", e);
                MonthlySeries::default()
            }
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_session(&self, session: Session) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO sessions (id, user_id, csrf_token, created_at, expires_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.csrf_token)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Option<Session> {
        let result = sqlx::query(
            r#"SELECT id, user_id, csrf_token, created_at, expires_at
               FROM sessions WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => row.map(|row| Session {
                id: row.get("id"),
                user_id: row.get("user_id"),
                csrf_token: row.get("csrf_token"),
                created_at: row.get("created_at"),
                expires_at: row.get("expires_at"),
            }),
            Err(e) => {
                tracing::error!("get_session error: {:?}", e);
                None
            }
        }
    }

    async fn delete_session(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_session error: {:?}", e);
                false
            }
        }
    }

    async fn get_user(&self, id: Uuid) -> Option<User> {
        let result = sqlx::query(
            r#"SELECT id, name, email, brand, permissions, active, password_hash,
                      created_at, updated_at
               FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => match Self::user_from_row(&row) {
                Ok((user, _)) => Some(user),
                Err(e) => {
                    tracing::error!("get_user mapping error: {:?}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!("get_user error: {:?}", e);
                None
            }
        }
    }

    async fn get_user_with_credentials(&self, email: &str) -> Option<(User, String)> {
        let result = sqlx::query(
            r#"SELECT id, name, email, brand, permissions, active, password_hash,
                      created_at, updated_at
               FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => match Self::user_from_row(&row) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::error!("get_user_with_credentials mapping error: {:?}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!("get_user_with_credentials error: {:?}", e);
                None
            }
        }
    }

    async fn list_users(&self, brand: Brand, page: i64) -> UserPage {
        let page = page.max(1);
        let offset = (page - 1) * USERS_PER_PAGE;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE brand = $1 OR brand IS NULL",
        )
        .bind(brand.as_code())
        .fetch_one(&self.pool)
        .await
        .unwrap_or(0);

        let result = sqlx::query(
            r#"SELECT id, name, email, brand, permissions, active, password_hash,
                      created_at, updated_at
               FROM users
               WHERE brand = $1 OR brand IS NULL
               ORDER BY created_at ASC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(brand.as_code())
        .bind(USERS_PER_PAGE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await;

        let users = match result {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| match Self::user_from_row(row) {
                    Ok((user, _)) => Some(user),
                    Err(e) => {
                        tracing::error!("list_users mapping error: {:?}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::error!("list_users error: {:?}", e);
                vec![]
            }
        };

        UserPage {
            users,
            page,
            total_pages: (total + USERS_PER_PAGE - 1) / USERS_PER_PAGE,
            total,
        }
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO users
                   (id, name, email, brand, permissions, active, password_hash,
                    created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               RETURNING id, name, email, brand, permissions, active,
                         password_hash, created_at, updated_at"#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.brand.map(|b| b.as_code()))
        .bind(user.permissions.to_tags())
        .bind(user.active)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Self::user_from_row(&row).map(|(user, _)| user),
            Err(e) => {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return Err(AppError::Conflict("email already registered"));
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn update_user(
        &self,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<Option<User>, AppError> {
        let result = sqlx::query(
            r#"UPDATE users
               SET name = COALESCE($2, name),
                   permissions = COALESCE($3, permissions),
                   active = COALESCE($4, active),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING id, name, email, brand, permissions, active,
                         password_hash, created_at, updated_at"#,
        )
        .bind(id)
        .bind(req.name)
        .bind(req.permissions.map(|p| p.to_tags()))
        .bind(req.active)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Self::user_from_row(&row).map(|(user, _)| Some(user)),
            None => Ok(None),
        }
    }

    async fn delete_user(&self, id: Uuid) -> bool {
        if let Err(e) = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            tracing::error!("delete_user session cleanup error: {:?}", e);
        }

        match sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_user error: {:?}", e);
                false
            }
        }
    }

    async fn record_user_audit(&self, entry: NewAuditEntry) {
        let result = sqlx::query(
            r#"INSERT INTO user_audit (id, user_id, brand, action, actor, created_at)
               VALUES ($1, $2, $3, $4, $5, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.brand.map(|b| b.as_code()))
        .bind(&entry.action)
        .bind(&entry.actor)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            // The change log must not block the mutation it describes.
            tracing::error!("record_user_audit error: {:?}", e);
        }
    }

    async fn list_user_audit(&self, brand: Brand) -> Vec<UserAuditEntry> {
        let result = sqlx::query(
            r#"SELECT id, user_id, brand, action, actor, created_at
               FROM user_audit
               WHERE brand = $1 OR brand IS NULL
               ORDER BY created_at DESC"#,
        )
        .bind(brand.as_code())
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| {
                    let brand = match parse_brand_column(row.get("brand")) {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::error!("list_user_audit mapping error: {:?}", e);
                            return None;
                        }
                    };
                    Some(UserAuditEntry {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        brand,
                        action: row.get("action"),
                        actor: row.get("actor"),
                        created_at: row.get("created_at"),
                    })
                })
                .collect(),
            Err(e) => {
                tracing::error!("list_user_audit error: {:?}", e);
                vec![]
            }
        }
    }

    async fn list_reviews(&self, brand: Brand, filter: ReviewFilter) -> Vec<Review> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT id, brand, title, item_code, category, stars, body, visible, created_at
            FROM reviews
            WHERE brand = "#,
        );
        builder.push_bind(brand.as_code());

        if let Some(category) = filter.categoria {
            builder.push(" AND category = ");
            builder.push_bind(category);
        }

        if let Some(producto) = filter.producto {
            // Case-insensitive search across item code and title.
            let pattern = format!("%{}%", producto);
            builder.push(" AND (item_code ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR title ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        if let Some(start) = filter.start_date {
            builder.push(" AND created_at::date >= ");
            builder.push_bind(start);
        }

        if let Some(end) = filter.end_date {
            builder.push(" AND created_at::date <= ");
            builder.push_bind(end);
        }

        match filter.orden {
            Some(SortOrder::Ascendente) => {
                builder.push(" ORDER BY stars ASC, created_at DESC");
            }
            Some(SortOrder::Descendente) => {
                builder.push(" ORDER BY stars DESC, created_at DESC");
            }
            None => {
                builder.push(" ORDER BY created_at DESC");
            }
        }

        match builder.build().fetch_all(&self.pool).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| match Self::review_from_row(row) {
                    Ok(review) => Some(review),
                    Err(e) => {
                        tracing::error!("list_reviews mapping error: {:?}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::error!("list_reviews error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_review(&self, brand: Brand, id: Uuid) -> Option<Review> {
        let result = sqlx::query(
            r#"SELECT id, brand, title, item_code, category, stars, body, visible, created_at
               FROM reviews WHERE id = $1 AND brand = $2"#,
        )
        .bind(id)
        .bind(brand.as_code())
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => match Self::review_from_row(&row) {
                Ok(review) => Some(review),
                Err(e) => {
                    tracing::error!("get_review mapping error: {:?}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!("get_review error: {:?}", e);
                None
            }
        }
    }

    async fn set_review_visibility(
        &self,
        brand: Brand,
        id: Uuid,
        visible: bool,
    ) -> Option<Review> {
        let result = sqlx::query(
            r#"UPDATE reviews SET visible = $3
               WHERE id = $1 AND brand = $2
               RETURNING id, brand, title, item_code, category, stars, body, visible, created_at"#,
        )
        .bind(id)
        .bind(brand.as_code())
        .bind(visible)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => match Self::review_from_row(&row) {
                Ok(review) => Some(review),
                Err(e) => {
                    tracing::error!("set_review_visibility mapping error: {:?}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!("set_review_visibility error: {:?}", e);
                None
            }
        }
    }

    async fn get_questions(&self, brand: Brand) -> Vec<SurveyQuestion> {
        let result = sqlx::query(
            r#"SELECT id, brand, question, kind, position
               FROM survey_questions
               WHERE brand = $1
               ORDER BY position ASC"#,
        )
        .bind(brand.as_code())
        .fetch_all(&self.pool)
        .await;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("get_questions error: {:?}", e);
                return vec![];
            }
        };

        let mut questions = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind_code: String = row.get("kind");
            let kind = match kind_code.as_str() {
                "cerrada" => QuestionKind::Cerrada,
                "checkbox" => QuestionKind::Checkbox,
                "abierta" => QuestionKind::Abierta,
                other => {
                    tracing::error!("stored question carries unknown kind {other}");
                    continue;
                }
            };
            let id: Uuid = row.get("id");
            let options = if kind == QuestionKind::Abierta {
                vec![]
            } else {
                self.fetch_question_options(id).await
            };
            questions.push(SurveyQuestion {
                id,
                brand,
                text: row.get("question"),
                kind,
                position: row.get("position"),
                options,
            });
        }
        questions
    }

    async fn replace_questions(
        &self,
        brand: Brand,
        drafts: Vec<QuestionDraft>,
    ) -> Result<Vec<SurveyQuestion>, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"DELETE FROM survey_options
               WHERE question_id IN (SELECT id FROM survey_questions WHERE brand = $1)"#,
        )
        .bind(brand.as_code())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM survey_questions WHERE brand = $1")
            .bind(brand.as_code())
            .execute(&mut *tx)
            .await?;

        let questions = materialize_questions(brand, drafts);

        for question in &questions {
            let kind_code = match question.kind {
                QuestionKind::Cerrada => "cerrada",
                QuestionKind::Checkbox => "checkbox",
                QuestionKind::Abierta => "abierta",
            };
            sqlx::query(
                r#"INSERT INTO survey_questions (id, brand, question, kind, position)
                   VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(question.id)
            .bind(brand.as_code())
            .bind(&question.text)
            .bind(kind_code)
            .bind(question.position)
            .execute(&mut *tx)
            .await?;

            for option in &question.options {
                sqlx::query(
                    r#"INSERT INTO survey_options (id, question_id, option_text, position)
                       VALUES ($1, $2, $3, $4)"#,
                )
                .bind(option.id)
                .bind(question.id)
                .bind(&option.text)
                .bind(option.position)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(questions)
    }

    async fn record_survey_response(
        &self,
        brand: Brand,
        submission: SurveySubmission,
    ) -> Result<SurveyOutcome, AppError> {
        // Single-shot conditional update keeps the first-submission-wins
        // rule intact under concurrent submits for the same token.
        let updated = sqlx::query(
            r#"UPDATE survey_invites
               SET answered_at = NOW(), stars = $3, comment = $4
               WHERE token = $1 AND brand = $2 AND answered_at IS NULL"#,
        )
        .bind(submission.token)
        .bind(brand.as_code())
        .bind(submission.stars)
        .bind(&submission.comment)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(SurveyOutcome::Exitosa);
        }

        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM survey_invites WHERE token = $1 AND brand = $2",
        )
        .bind(submission.token)
        .bind(brand.as_code())
        .fetch_one(&self.pool)
        .await?;

        if exists > 0 {
            Ok(SurveyOutcome::Repetida)
        } else {
            Err(AppError::NotFound)
        }
    }

    async fn dashboard_stats(&self, brand: Brand, category: Option<String>) -> DashboardData {
        // Monthly average rating over the trailing window, optionally
        // narrowed to one product category.
        let mut avg_builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT to_char(date_trunc('month', created_at), 'YYYY-MM') AS month,
                   AVG(stars)::float8 AS value
            FROM reviews
            WHERE created_at >= NOW() - INTERVAL '6 months' AND brand = "#,
        );
        avg_builder.push_bind(brand.as_code());
        if let Some(category) = &category {
            avg_builder.push(" AND category = ");
            avg_builder.push_bind(category.clone());
        }
        avg_builder.push(" GROUP BY 1 ORDER BY 1");

        let average_scores = match avg_builder.build().fetch_all(&self.pool).await {
            Ok(rows) => {
                let mut series = MonthlySeries::default();
                for row in &rows {
                    series.labels.push(row.get("month"));
                    series.data.push(row.get("value"));
                }
                series
            }
            Err(e) => {
                tracing::error!("dashboard average_scores error: {:?}", e);
                MonthlySeries::default()
            }
        };

        let surveys_sent = self
            .monthly_series(
                r#"SELECT to_char(date_trunc('month', sent_at), 'YYYY-MM') AS month,
                          COUNT(*)::float8 AS value
                   FROM survey_invites
                   WHERE sent_at >= NOW() - INTERVAL '6 months' AND brand = $1
                   GROUP BY 1 ORDER BY 1"#,
                brand,
            )
            .await;

        let response_rate = self
            .monthly_series(
                r#"SELECT to_char(date_trunc('month', sent_at), 'YYYY-MM') AS month,
                          (COUNT(answered_at)::float8 * 100.0
                           / GREATEST(COUNT(*), 1)::float8) AS value
                   FROM survey_invites
                   WHERE sent_at >= NOW() - INTERVAL '6 months' AND brand = $1
                   GROUP BY 1 ORDER BY 1"#,
                brand,
            )
            .await;

        let mut rating_distribution = vec![0i64; 5];
        let distribution = sqlx::query(
            r#"SELECT stars, COUNT(*) AS count
               FROM reviews WHERE brand = $1 GROUP BY stars"#,
        )
        .bind(brand.as_code())
        .fetch_all(&self.pool)
        .await;
        match distribution {
            Ok(rows) => {
                for row in &rows {
                    let stars: i16 = row.get("stars");
                    let count: i64 = row.get("count");
                    if (1..=5).contains(&stars) {
                        // Index 0 holds five stars, matching the client.
                        rating_distribution[(5 - stars) as usize] = count;
                    }
                }
            }
            Err(e) => tracing::error!("dashboard distribution error: {:?}", e),
        }

        let average_stars: f64 = sqlx::query_scalar(
            "SELECT COALESCE(AVG(stars)::float8, 0) FROM reviews WHERE brand = $1",
        )
        .bind(brand.as_code())
        .fetch_one(&self.pool)
        .await
        .unwrap_or(0.0);

        DashboardData {
            average_scores,
            response_rate,
            surveys_sent,
            rating_distribution,
            average_stars,
            average_percent: average_stars / 5.0 * 100.0,
        }
    }
}

/// Assigns ids and list-order positions to editor drafts. `abierta`
/// questions lose any submitted options.
fn materialize_questions(brand: Brand, drafts: Vec<QuestionDraft>) -> Vec<SurveyQuestion> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            let options = if draft.kind == QuestionKind::Abierta {
                vec![]
            } else {
                draft
                    .options
                    .into_iter()
                    .enumerate()
                    .map(|(opt_index, text)| QuestionOption {
                        id: Uuid::new_v4(),
                        text,
                        position: opt_index as i32 + 1,
                    })
                    .collect()
            };
            SurveyQuestion {
                id: Uuid::new_v4(),
                brand,
                text: draft.text,
                kind: draft.kind,
                position: index as i32 + 1,
                options,
            }
        })
        .collect()
}

// --- In-Memory Implementation (Tests and Local Tooling) ---

/// MemoryRepository
///
/// Mock implementation of `Repository` holding everything in a mutex-held
/// struct. Lets extractor and handler tests run the full HTTP stack with
/// no database. Seed helpers populate state directly.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: Vec<(User, String)>,
    sessions: Vec<Session>,
    reviews: Vec<Review>,
    questions: HashMap<Brand, Vec<SurveyQuestion>>,
    invites: Vec<SurveyInvite>,
    audit: Vec<UserAuditEntry>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user: User, password_hash: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.push((user, password_hash.to_string()));
    }

    pub fn seed_review(&self, review: Review) {
        let mut inner = self.inner.lock().unwrap();
        inner.reviews.push(review);
    }

    pub fn seed_invite(&self, invite: SurveyInvite) {
        let mut inner = self.inner.lock().unwrap();
        inner.invites.push(invite);
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_session(&self, session: Session) -> Result<(), AppError> {
        self.inner.lock().unwrap().sessions.push(session);
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Option<Session> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    async fn delete_session(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.id != id);
        inner.sessions.len() < before
    }

    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.inner
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.clone())
    }

    async fn get_user_with_credentials(&self, email: &str) -> Option<(User, String)> {
        self.inner
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .cloned()
    }

    async fn list_users(&self, brand: Brand, page: i64) -> UserPage {
        let page = page.max(1);
        let inner = self.inner.lock().unwrap();
        let matching: Vec<User> = inner
            .users
            .iter()
            .filter(|(u, _)| u.brand.is_none() || u.brand == Some(brand))
            .map(|(u, _)| u.clone())
            .collect();

        let total = matching.len() as i64;
        let start = ((page - 1) * USERS_PER_PAGE) as usize;
        let users = matching
            .into_iter()
            .skip(start)
            .take(USERS_PER_PAGE as usize)
            .collect();

        UserPage {
            users,
            page,
            total_pages: (total + USERS_PER_PAGE - 1) / USERS_PER_PAGE,
            total,
        }
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|(u, _)| u.email == user.email) {
            return Err(AppError::Conflict("email already registered"));
        }
        let now = Utc::now();
        let created = User {
            id: user.id,
            name: user.name,
            email: user.email,
            brand: user.brand,
            permissions: user.permissions,
            active: user.active,
            created_at: now,
            updated_at: now,
        };
        inner.users.push((created.clone(), user.password_hash));
        Ok(created)
    }

    async fn update_user(
        &self,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<Option<User>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((user, _)) = inner.users.iter_mut().find(|(u, _)| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            user.name = name;
        }
        if let Some(permissions) = req.permissions {
            user.permissions = permissions;
        }
        if let Some(active) = req.active {
            user.active = active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|(u, _)| u.id != id);
        inner.sessions.retain(|s| s.user_id != id);
        inner.users.len() < before
    }

    async fn record_user_audit(&self, entry: NewAuditEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner.audit.push(UserAuditEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            brand: entry.brand,
            action: entry.action,
            actor: entry.actor,
            created_at: Utc::now(),
        });
    }

    async fn list_user_audit(&self, brand: Brand) -> Vec<UserAuditEntry> {
        let mut entries: Vec<UserAuditEntry> = self
            .inner
            .lock()
            .unwrap()
            .audit
            .iter()
            .filter(|e| e.brand.is_none() || e.brand == Some(brand))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    async fn list_reviews(&self, brand: Brand, filter: ReviewFilter) -> Vec<Review> {
        let inner = self.inner.lock().unwrap();
        let mut reviews: Vec<Review> = inner
            .reviews
            .iter()
            .filter(|r| r.brand == brand)
            .filter(|r| match &filter.categoria {
                Some(category) => r.category.as_deref() == Some(category.as_str()),
                None => true,
            })
            .filter(|r| match &filter.producto {
                Some(producto) => {
                    let needle = producto.to_lowercase();
                    r.item_code.to_lowercase().contains(&needle)
                        || r.title.to_lowercase().contains(&needle)
                }
                None => true,
            })
            .filter(|r| match filter.start_date {
                Some(start) => r.created_at.date_naive() >= start,
                None => true,
            })
            .filter(|r| match filter.end_date {
                Some(end) => r.created_at.date_naive() <= end,
                None => true,
            })
            .cloned()
            .collect();

        match filter.orden {
            Some(SortOrder::Ascendente) => reviews.sort_by_key(|r| r.stars),
            Some(SortOrder::Descendente) => {
                reviews.sort_by_key(|r| std::cmp::Reverse(r.stars))
            }
            None => reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        reviews
    }

    async fn get_review(&self, brand: Brand, id: Uuid) -> Option<Review> {
        self.inner
            .lock()
            .unwrap()
            .reviews
            .iter()
            .find(|r| r.id == id && r.brand == brand)
            .cloned()
    }

    async fn set_review_visibility(
        &self,
        brand: Brand,
        id: Uuid,
        visible: bool,
    ) -> Option<Review> {
        let mut inner = self.inner.lock().unwrap();
        let review = inner
            .reviews
            .iter_mut()
            .find(|r| r.id == id && r.brand == brand)?;
        review.visible = visible;
        Some(review.clone())
    }

    async fn get_questions(&self, brand: Brand) -> Vec<SurveyQuestion> {
        self.inner
            .lock()
            .unwrap()
            .questions
            .get(&brand)
            .cloned()
            .unwrap_or_default()
    }

    async fn replace_questions(
        &self,
        brand: Brand,
        drafts: Vec<QuestionDraft>,
    ) -> Result<Vec<SurveyQuestion>, AppError> {
        let questions = materialize_questions(brand, drafts);
        self.inner
            .lock()
            .unwrap()
            .questions
            .insert(brand, questions.clone());
        Ok(questions)
    }

    async fn record_survey_response(
        &self,
        brand: Brand,
        submission: SurveySubmission,
    ) -> Result<SurveyOutcome, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let invite = inner
            .invites
            .iter_mut()
            .find(|i| i.token == submission.token && i.brand == brand)
            .ok_or(AppError::NotFound)?;

        if invite.answered_at.is_some() {
            return Ok(SurveyOutcome::Repetida);
        }
        invite.answered_at = Some(Utc::now());
        Ok(SurveyOutcome::Exitosa)
    }

    async fn dashboard_stats(&self, brand: Brand, category: Option<String>) -> DashboardData {
        let inner = self.inner.lock().unwrap();

        let reviews: Vec<&Review> = inner
            .reviews
            .iter()
            .filter(|r| r.brand == brand)
            .filter(|r| match &category {
                Some(category) => r.category.as_deref() == Some(category.as_str()),
                None => true,
            })
            .collect();

        // Average rating per month, keyed by label so months sort naturally.
        let mut per_month: HashMap<String, (f64, i64)> = HashMap::new();
        for review in &reviews {
            let label = month_label(review.created_at.date_naive());
            let entry = per_month.entry(label).or_insert((0.0, 0));
            entry.0 += review.stars as f64;
            entry.1 += 1;
        }
        let mut labels: Vec<String> = per_month.keys().cloned().collect();
        labels.sort();
        let average_scores = MonthlySeries {
            data: labels
                .iter()
                .map(|label| {
                    let (sum, count) = per_month[label];
                    sum / count as f64
                })
                .collect(),
            labels,
        };

        let mut sent_per_month: HashMap<String, (i64, i64)> = HashMap::new();
        for invite in inner.invites.iter().filter(|i| i.brand == brand) {
            let label = month_label(invite.sent_at.date_naive());
            let entry = sent_per_month.entry(label).or_insert((0, 0));
            entry.0 += 1;
            if invite.answered_at.is_some() {
                entry.1 += 1;
            }
        }
        let mut invite_labels: Vec<String> = sent_per_month.keys().cloned().collect();
        invite_labels.sort();
        let surveys_sent = MonthlySeries {
            data: invite_labels
                .iter()
                .map(|label| sent_per_month[label].0 as f64)
                .collect(),
            labels: invite_labels.clone(),
        };
        let response_rate = MonthlySeries {
            data: invite_labels
                .iter()
                .map(|label| {
                    let (sent, answered) = sent_per_month[label];
                    answered as f64 * 100.0 / sent.max(1) as f64
                })
                .collect(),
            labels: invite_labels,
        };

        let mut rating_distribution = vec![0i64; 5];
        for review in &reviews {
            if (1..=5).contains(&review.stars) {
                rating_distribution[(5 - review.stars) as usize] += 1;
            }
        }

        let average_stars = if reviews.is_empty() {
            0.0
        } else {
            reviews.iter().map(|r| r.stars as f64).sum::<f64>() / reviews.len() as f64
        };

        DashboardData {
            average_scores,
            response_rate,
            surveys_sent,
            rating_distribution,
            average_stars,
            average_percent: average_stars / 5.0 * 100.0,
        }
    }
}
