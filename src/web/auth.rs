use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::web::{ApiMessage, AppState, json_error};

pub const SESSION_COOKIE: &str = "auth_token";
pub const SESSION_TTL_DAYS: i64 = 7;
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;
const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Clone, sqlx::FromRow)]
pub struct DbUserAuth {
    pub id: Uuid,
    pub password_hash: String,
    pub role: String,
}

#[derive(Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Error surface for JSON handlers that require an authenticated caller.
pub struct JsonAuthError {
    pub status: StatusCode,
    pub message: &'static str,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub role: String,
    pub user: UserSummary,
}

#[derive(Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), (StatusCode, Json<ApiMessage>)> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email and password are required",
        ));
    }

    let user = match fetch_user_by_email(state.pool_ref(), &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(invalid_credentials()),
        Err(err) => {
            error!(?err, "failed to fetch user during login");
            return Err(server_error());
        }
    };

    if !verify_password(&request.password, &user.password_hash) {
        return Err(invalid_credentials());
    }

    // Student sessions are useless without an application to show.
    if user.role == "student" {
        match applicant_exists(state.pool_ref(), user.id).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(json_error(StatusCode::NOT_FOUND, "Application not found"));
            }
            Err(err) => {
                error!(?err, "failed to check applicant record during login");
                return Err(server_error());
            }
        }
    }

    let jar = match create_session(state.pool_ref(), user.id, jar).await {
        Ok(jar) => jar,
        Err(err) => {
            error!(?err, "failed to create session");
            return Err(server_error());
        }
    };

    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            role: user.role,
            user: UserSummary { id: user.id, email },
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiMessage>) {
    let mut jar = jar;

    if let Some(token_cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(token) = Uuid::parse_str(token_cookie.value()) {
            if let Err(err) = sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(token)
                .execute(state.pool_ref())
                .await
            {
                error!(?err, "failed to remove session during logout");
            }
        }
    }

    jar = jar.remove(removal_cookie());

    (jar, Json(ApiMessage::new("Signed out")))
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

#[derive(Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
}

pub async fn session(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    match current_user(&state, &jar).await {
        Some(user) => (
            StatusCode::OK,
            Json(SessionResponse {
                authenticated: true,
                user: Some(SessionUser {
                    id: user.id,
                    email: user.email,
                    role: user.role,
                    email_verified: user.email_verified,
                }),
            }),
        ),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(SessionResponse {
                authenticated: false,
                user: None,
            }),
        ),
    }
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct ForgotPasswordResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Always answers success so the endpoint cannot be used to probe which
/// emails hold accounts. Every failure on the way is logged and swallowed.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Json<ForgotPasswordResponse> {
    let email = request.email.trim().to_lowercase();

    let response = Json(ForgotPasswordResponse {
        success: true,
        message: "If an account exists, a reset email has been sent",
    });

    if email.is_empty() {
        return response;
    }

    let user_id: Option<Uuid> =
        match sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(state.pool_ref())
            .await
        {
            Ok(user_id) => user_id,
            Err(err) => {
                error!(?err, "failed to look up account for password reset");
                return response;
            }
        };

    let Some(user_id) = user_id else {
        return response;
    };

    let token = generate_reset_token();
    let expires_at = Utc::now() + ChronoDuration::hours(RESET_TOKEN_TTL_HOURS);

    if let Err(err) = sqlx::query(
        "INSERT INTO password_reset_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(&token)
    .bind(user_id)
    .bind(expires_at)
    .execute(state.pool_ref())
    .await
    {
        error!(?err, "failed to store password reset token");
        return response;
    }

    if let Err(err) = state.mailer().send_password_reset(&email, &token).await {
        warn!(?err, "failed to deliver password reset email");
    }

    response
}

#[derive(Deserialize)]
pub struct VerifyResetTokenQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct VerifyResetTokenResponse {
    pub success: bool,
    pub valid: bool,
}

pub async fn verify_reset_token(
    State(state): State<AppState>,
    Query(query): Query<VerifyResetTokenQuery>,
) -> Result<Json<VerifyResetTokenResponse>, (StatusCode, Json<ApiMessage>)> {
    match fetch_open_reset_token(state.pool_ref(), &query.token).await {
        Ok(Some(_)) => Ok(Json(VerifyResetTokenResponse {
            success: true,
            valid: true,
        })),
        Ok(None) => Err(json_error(
            StatusCode::BAD_REQUEST,
            "Invalid or expired reset token",
        )),
        Err(err) => {
            error!(?err, "failed to verify reset token");
            Err(server_error())
        }
    }
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiMessage>)> {
    if request.token.is_empty() || request.password.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Token and password are required",
        ));
    }

    if request.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
        ));
    }

    let token_row = match fetch_open_reset_token(state.pool_ref(), &request.token).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "Invalid or expired reset token",
            ));
        }
        Err(err) => {
            error!(?err, "failed to load reset token");
            return Err(server_error());
        }
    };

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(?err, "failed to hash replacement password");
            return Err(server_error());
        }
    };

    let result: sqlx::Result<()> = async {
        let mut tx = state.pool_ref().begin().await?;
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(token_row.user_id)
            .bind(&password_hash)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE token = $1")
            .bind(&request.token)
            .execute(&mut *tx)
            .await?;
        // A reset invalidates every open session for the account.
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(token_row.user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }
    .await;

    if let Err(err) = result {
        error!(?err, "failed to apply password reset");
        return Err(server_error());
    }

    Ok(Json(ApiMessage::new("Password reset successful")))
}

#[derive(sqlx::FromRow)]
struct ResetTokenRow {
    user_id: Uuid,
}

async fn fetch_open_reset_token(pool: &PgPool, token: &str) -> sqlx::Result<Option<ResetTokenRow>> {
    sqlx::query_as::<_, ResetTokenRow>(
        "SELECT user_id FROM password_reset_tokens
         WHERE token = $1 AND used = FALSE AND expires_at > NOW()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// Resolve the caller from the session cookie. Lookup failures are logged
/// and treated as unauthenticated.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Option<AuthUser> {
    let token_cookie = jar.get(SESSION_COOKIE)?;
    let token = Uuid::parse_str(token_cookie.value()).ok()?;

    match fetch_user_by_session(state.pool_ref(), token).await {
        Ok(user) => user,
        Err(err) => {
            error!(?err, "failed to validate session");
            None
        }
    }
}

pub async fn current_user_or_json_error(
    state: &AppState,
    jar: &CookieJar,
) -> Result<AuthUser, JsonAuthError> {
    current_user(state, jar).await.ok_or(JsonAuthError {
        status: StatusCode::UNAUTHORIZED,
        message: "Unauthorized",
    })
}

pub async fn require_admin(
    state: &AppState,
    jar: &CookieJar,
) -> Result<AuthUser, (StatusCode, Json<ApiMessage>)> {
    let user = current_user(state, jar)
        .await
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    if !user.is_admin() {
        return Err(json_error(StatusCode::FORBIDDEN, "Admin access required"));
    }

    Ok(user)
}

pub async fn create_session(pool: &PgPool, user_id: Uuid, jar: CookieJar) -> sqlx::Result<CookieJar> {
    let session_token = Uuid::new_v4();
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(session_token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;

    let mut cookie = Cookie::new(SESSION_COOKIE, session_token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));

    Ok(jar.add(cookie))
}

fn removal_cookie() -> Cookie<'static> {
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    removal
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// 64 hex characters from 32 random bytes, mailed inside the reset link.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let mut token = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        token.push_str(&format!("{byte:02x}"));
    }
    token
}

async fn applicant_exists(pool: &PgPool, user_id: Uuid) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM applicants WHERE user_id = $1)")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn fetch_user_by_email(pool: &PgPool, email: &str) -> sqlx::Result<Option<DbUserAuth>> {
    sqlx::query_as::<_, DbUserAuth>(
        "SELECT id, password_hash, role FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_user_by_session(pool: &PgPool, token: Uuid) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>(
        "SELECT users.id, users.email, users.role, users.email_verified FROM sessions
         JOIN users ON users.id = sessions.user_id
         WHERE sessions.id = $1 AND sessions.expires_at > NOW()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

fn invalid_credentials() -> (StatusCode, Json<ApiMessage>) {
    json_error(StatusCode::UNAUTHORIZED, "Invalid email or password")
}

fn server_error() -> (StatusCode, Json<ApiMessage>) {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Server error. Please try again later.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn reset_tokens_are_hex_and_unique() {
        let first = generate_reset_token();
        let second = generate_reset_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

}
