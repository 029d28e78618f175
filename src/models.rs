use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Closed Vocabularies ---

/// Brand
///
/// One of the three tenant identifiers partitioning all review data and UI.
/// The set is closed: every brand-scoped resource carries exactly one of
/// these codes, and an unrecognized path segment is rejected rather than
/// defaulted (see `Brand::resolve` in the brand module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Brand {
    Lu1,
    No1,
    Ma1,
}

/// Permission
///
/// One of the three independent capability flags a user may hold. These are
/// NOT a ranked role ladder: `administracion` does not imply `ver` or
/// `editar`. The serialized tags are the canonical wire vocabulary shared
/// with the client; serde rejects anything outside the closed set, which is
/// the boundary validation the access guard relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Permission {
    /// Dashboard and review browsing.
    Ver,
    /// Survey/email-question configuration and review moderation.
    Editar,
    /// User administration.
    Administracion,
}

impl Permission {
    /// All members of the closed set, in canonical order.
    pub const ALL: [Permission; 3] =
        [Permission::Ver, Permission::Editar, Permission::Administracion];

    /// The canonical tag, as stored and serialized.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Permission::Ver => "ver",
            Permission::Editar => "editar",
            Permission::Administracion => "administracion",
        }
    }

    /// Parses a stored tag. Returns `None` for anything outside the closed
    /// set; callers at the persistence boundary turn that into an error
    /// instead of silently dropping the tag.
    pub fn parse(tag: &str) -> Option<Permission> {
        match tag {
            "ver" => Some(Permission::Ver),
            "editar" => Some(Permission::Editar),
            "administracion" => Some(Permission::Administracion),
            _ => None,
        }
    }
}

/// PermissionSet
///
/// A user's capability set: unordered, duplicate-free, drawn only from the
/// closed `Permission` vocabulary. Construction deduplicates; membership is
/// O(set size) over at most three elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(from = "Vec<Permission>", into = "Vec<Permission>")]
#[ts(export)]
pub struct PermissionSet(Vec<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Canonical tags for persistence (TEXT[] column).
    pub fn to_tags(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_tag().to_string()).collect()
    }

    /// Parses stored tags, rejecting anything outside the closed set.
    /// The `Err` carries the offending tag.
    pub fn try_from_tags<I, S>(tags: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = PermissionSet::new();
        for tag in tags {
            match Permission::parse(tag.as_ref()) {
                Some(p) => {
                    if !set.contains(p) {
                        set.0.push(p);
                    }
                }
                None => return Err(tag.as_ref().to_string()),
            }
        }
        Ok(set)
    }
}

impl From<Vec<Permission>> for PermissionSet {
    fn from(permissions: Vec<Permission>) -> Self {
        let mut set = PermissionSet::new();
        for p in permissions {
            if !set.contains(p) {
                set.0.push(p);
            }
        }
        set
    }
}

impl From<PermissionSet> for Vec<Permission> {
    fn from(set: PermissionSet) -> Self {
        set.0
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A back-office account. `brand = None` marks cross-brand staff; a user
/// pinned to a brand only reaches that brand's resources. The stored
/// password hash lives in the repository layer and never appears here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Brand affiliation; `None` means the user may act on any brand.
    pub brand: Option<Brand>,
    pub permissions: PermissionSet,
    /// The original `estado` flag: inactive users cannot log in and their
    /// existing sessions stop authenticating.
    pub active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Session
///
/// One login. The JWT handed to the client carries only the session id;
/// everything else is resolved from this row on every request, so revoking
/// the row (logout) or passing `expires_at` invalidates the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Anti-forgery token issued at login; mutating requests must echo it
    /// in the `x-csrf-token` header.
    pub csrf_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Review
///
/// A customer review, tagged with exactly one brand. `visible` is the
/// moderation flag toggled by `editar` holders.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Review {
    pub id: Uuid,
    pub brand: Brand,
    pub title: String,
    /// Product identifier the review refers to.
    pub item_code: String,
    pub category: Option<String>,
    /// Star rating, 1 through 5.
    pub stars: i16,
    pub body: String,
    pub visible: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// QuestionKind
///
/// The three survey question shapes the editor supports. `abierta` carries
/// no options; the other two are option lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum QuestionKind {
    /// Single choice.
    Cerrada,
    /// Multiple choice.
    Checkbox,
    /// Free text.
    Abierta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuestionOption {
    pub id: Uuid,
    pub text: String,
    pub position: i32,
}

/// SurveyQuestion
///
/// One configured question of a brand's review survey, ordered by
/// `position`. The whole per-brand list is replaced atomically by the
/// editor (see `Repository::replace_questions`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SurveyQuestion {
    pub id: Uuid,
    pub brand: Brand,
    pub text: String,
    pub kind: QuestionKind,
    pub position: i32,
    pub options: Vec<QuestionOption>,
}

/// SurveyInvite
///
/// One emailed survey link. The token is single-use: the first submission
/// marks `answered_at`, later ones are reported as `repetida`. Invite
/// creation belongs to the external email pipeline; this service only
/// consumes the rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyInvite {
    pub token: Uuid,
    pub brand: Brand,
    pub sent_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

/// SurveyOutcome
///
/// Result of a public survey submission, mirrored to the client's result
/// screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SurveyOutcome {
    Exitosa,
    Repetida,
}

/// UserAuditEntry
///
/// Change-log row written on every administrative user mutation. `brand`
/// is denormalized from the affected user so the per-brand history page
/// needs no join.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserAuditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub brand: Option<Brand>,
    /// Human-readable action, e.g. "Usuario creado".
    pub action: String,
    /// Email of the administrator who performed the action.
    pub actor: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CreateUserRequest
///
/// Admin provisioning payload. `permissions` deserialization enforces the
/// closed tag set: an unknown tag fails the request with 422 before any
/// handler logic runs.
#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub brand: Option<Brand>,
    pub permissions: PermissionSet,
}

/// UpdateUserRequest
///
/// Partial update; only provided fields change. Email is immutable after
/// provisioning.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionSet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct PasswordCheckRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PasswordCheckResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// SortOrder
///
/// Review listing order by star rating, matching the client's filter
/// dropdown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SortOrder {
    /// Lowest score first.
    Ascendente,
    /// Highest score first.
    Descendente,
}

/// ReviewFilter
///
/// Query parameters of the review listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct ReviewFilter {
    pub orden: Option<SortOrder>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Substring match on title or item code.
    pub producto: Option<String>,
    pub categoria: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct VisibilityUpdate {
    pub visible: bool,
}

/// QuestionDraft
///
/// Editor input for one question; ids and positions are assigned on save,
/// in list order. Options are ignored for `abierta` questions.
#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct QuestionDraft {
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ReplaceQuestionsRequest {
    pub questions: Vec<QuestionDraft>,
}

/// SurveySubmission
///
/// Public survey intake payload; the token comes from the emailed link.
#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct SurveySubmission {
    pub token: Uuid,
    pub stars: i16,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SurveyResult {
    pub resultado: SurveyOutcome,
}

// --- Profile & Navigation Schemas (Output) ---

/// SectionVisibility
///
/// Which back-office sections the current user may see. Computed from the
/// same route-requirement table the server guard consults, so the client's
/// conditional rendering can never disagree with the server decision. The
/// flags are UX only; the server check remains authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SectionVisibility {
    pub dashboard: bool,
    pub reviews: bool,
    pub emails: bool,
    pub users: bool,
}

/// UserProfile
///
/// Output of `GET /me` and of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub brand: Option<Brand>,
    pub permissions: PermissionSet,
    pub sections: SectionVisibility,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    /// Bearer token for the Authorization header.
    pub token: String,
    /// Session CSRF token; echo in `x-csrf-token` on mutating requests.
    pub csrf_token: String,
    pub user: UserProfile,
}

/// UserPage
///
/// One page of the brand-scoped user listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: i64,
    pub total_pages: i64,
    pub total: i64,
}

// --- Dashboard Schemas (Output) ---

/// MonthlySeries
///
/// A labeled time series over the trailing months, ready for the client's
/// chart components. Labels are `YYYY-MM`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MonthlySeries {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

/// DashboardData
///
/// Brand-scoped dashboard metrics, computed from stored reviews and survey
/// invites rather than served as canned datasets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardData {
    /// Average star rating per month.
    pub average_scores: MonthlySeries,
    /// Answered / sent survey ratio per month, as a percentage.
    pub response_rate: MonthlySeries,
    /// Survey invites sent per month.
    pub surveys_sent: MonthlySeries,
    /// Review counts by rating, 5 stars down to 1.
    pub rating_distribution: Vec<i64>,
    /// Overall average rating.
    pub average_stars: f64,
    /// `average_stars` as a percentage of 5, for the star-fill widget.
    pub average_percent: f64,
}
