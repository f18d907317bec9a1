use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

pub mod schema;
pub mod wizard;

use crate::web::{ApiMessage, AppState, auth, json_error, json_validation_error};
use schema::{CompleteRegistration, is_email_shaped};

const OTP_TTL_MINUTES: i64 = 10;
const GENERATED_PASSWORD_CHARS: usize = 12;
// Ambiguous glyphs (0/O, 1/l/I) are left out of mailed credentials.
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/send-otp", post(send_otp))
        .route("/api/auth/verify-otp", post(verify_otp))
        .route("/api/registration/submit", post(submit))
}

#[derive(Deserialize)]
struct SendOtpRequest {
    email: String,
}

#[derive(Serialize)]
struct OtpResponse {
    success: bool,
    message: &'static str,
}

async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<OtpResponse>, (StatusCode, Json<ApiMessage>)> {
    let email = request.email.trim().to_lowercase();
    if !is_email_shaped(&email) {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "A valid email address is required",
        ));
    }

    match account_exists(state.pool_ref(), &email).await {
        Ok(false) => {}
        Ok(true) => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "Email already registered",
            ));
        }
        Err(err) => {
            error!(?err, "failed to check for existing account");
            return Err(server_error());
        }
    }

    let code = generate_otp_code();
    let expires_at = Utc::now() + ChronoDuration::minutes(OTP_TTL_MINUTES);

    if let Err(err) = sqlx::query(
        "INSERT INTO otp_codes (id, email, code, expires_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&code)
    .bind(expires_at)
    .execute(state.pool_ref())
    .await
    {
        error!(?err, "failed to store verification code");
        return Err(server_error());
    }

    if let Err(err) = state.mailer().send_verification_code(&email, &code).await {
        error!(?err, "failed to send verification email");
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send verification email",
        ));
    }

    Ok(Json(OtpResponse {
        success: true,
        message: "Verification code sent to your email",
    }))
}

#[derive(Deserialize)]
struct VerifyOtpRequest {
    email: String,
    code: String,
}

async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<OtpResponse>, (StatusCode, Json<ApiMessage>)> {
    let email = request.email.trim().to_lowercase();
    let code = request.code.trim();
    if email.is_empty() || code.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email and verification code are required",
        ));
    }

    let row = match fetch_latest_open_code(state.pool_ref(), &email, code).await {
        Ok(row) => row,
        Err(err) => {
            error!(?err, "failed to load verification code");
            return Err(server_error());
        }
    };

    match otp_verdict(row.as_ref(), Utc::now()) {
        OtpVerdict::Invalid => Err(json_error(
            StatusCode::BAD_REQUEST,
            "Invalid verification code",
        )),
        OtpVerdict::Expired => Err(json_error(
            StatusCode::BAD_REQUEST,
            "Verification code has expired",
        )),
        OtpVerdict::Valid => {
            let row = row.expect("verdict valid implies a row");
            if let Err(err) = sqlx::query("UPDATE otp_codes SET used = TRUE WHERE id = $1")
                .bind(row.id)
                .execute(state.pool_ref())
                .await
            {
                error!(?err, "failed to mark verification code used");
                return Err(server_error());
            }
            Ok(Json(OtpResponse {
                success: true,
                message: "Email verified successfully",
            }))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    success: bool,
    reference_number: String,
    message: &'static str,
}

async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<CompleteRegistration>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ApiMessage>)> {
    if let Err(errors) = payload.validate() {
        return Err(json_validation_error("Invalid form data", errors));
    }

    let email = payload.email.trim().to_lowercase();

    // The wizard only reaches review after the code exchange; re-check here
    // so a bypassed client cannot register an unverified address.
    match email_was_verified(state.pool_ref(), &email).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "Email has not been verified",
            ));
        }
        Err(err) => {
            error!(?err, "failed to check email verification");
            return Err(server_error());
        }
    }

    match account_exists(state.pool_ref(), &email).await {
        Ok(false) => {}
        Ok(true) => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "Email already registered",
            ));
        }
        Err(err) => {
            error!(?err, "failed to check for existing account");
            return Err(server_error());
        }
    }

    let password = generate_password();
    let password_hash = match auth::hash_password(&password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(?err, "failed to hash generated password");
            return Err(server_error());
        }
    };

    let user_id = Uuid::new_v4();
    let reference_number =
        match persist_registration(state.pool_ref(), user_id, &email, &password_hash, &payload)
            .await
        {
            Ok(reference_number) => reference_number,
            Err(PersistError::DuplicateEmail) => {
                // The pre-check raced with a concurrent submission; the
                // unique constraint is the authority.
                return Err(json_error(
                    StatusCode::BAD_REQUEST,
                    "Email already registered",
                ));
            }
            Err(PersistError::Database(err)) => {
                error!(?err, "failed to persist registration");
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create application",
                ));
            }
        };

    let name = format!(
        "{} {}",
        payload.personal.first_name, payload.personal.last_name
    );
    if let Err(err) = state
        .mailer()
        .send_registration_confirmation(&email, &name, &reference_number, &password)
        .await
    {
        // The account and record exist; delivery problems are operational
        // follow-up, never a submission failure.
        warn!(?err, %reference_number, "failed to deliver confirmation email");
    }

    Ok(Json(SubmitResponse {
        success: true,
        reference_number,
        message: "Registration successful! Check your email for login credentials.",
    }))
}

#[derive(Debug)]
enum PersistError {
    DuplicateEmail,
    Database(sqlx::Error),
}

impl From<sqlx::Error> for PersistError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                PersistError::DuplicateEmail
            }
            _ => PersistError::Database(err),
        }
    }
}

/// Account row, reference number, and applicant record are written as one
/// unit; a failure at any point leaves nothing behind.
async fn persist_registration(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    password_hash: &str,
    payload: &CompleteRegistration,
) -> Result<String, PersistError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, email_verified)
         VALUES ($1, $2, $3, 'student', TRUE)",
    )
    .bind(user_id)
    .bind(email)
    .bind(password_hash)
    .execute(&mut *tx)
    .await?;

    let reference_number: String = sqlx::query_scalar("SELECT generate_reference_number()")
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO applicants (
            id, user_id, reference_number,
            first_name, last_name, date_of_birth, gender, phone, nationality,
            current_country, city, postal_code, profile_picture_url,
            highest_education, institution_name, institution_country,
            field_of_study, graduation_year, gpa, transcript_url,
            desired_country, desired_program_level, desired_field,
            preferred_intake, budget_range, need_scholarship,
            passport_url, english_test_url, cv_url, motivation_letter_url,
            recommendation_letters, other_certificates,
            how_heard_about_us, referrer_name, special_notes, status
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
            $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28,
            $29, $30, $31, $32, $33, $34, $35, 'pending'
        )",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&reference_number)
    .bind(&payload.personal.first_name)
    .bind(&payload.personal.last_name)
    .bind(payload.personal.date_of_birth)
    .bind(blank_to_null(payload.personal.gender.as_deref()))
    .bind(&payload.personal.phone)
    .bind(&payload.personal.nationality)
    .bind(&payload.personal.current_country)
    .bind(blank_to_null(payload.personal.city.as_deref()))
    .bind(blank_to_null(payload.personal.postal_code.as_deref()))
    .bind(&payload.personal.profile_picture_url)
    .bind(&payload.education.highest_education)
    .bind(&payload.education.institution_name)
    .bind(blank_to_null(payload.education.institution_country.as_deref()))
    .bind(&payload.education.field_of_study)
    .bind(payload.education.graduation_year)
    .bind(&payload.education.gpa)
    .bind(&payload.education.transcript_url)
    .bind(&payload.application.desired_country)
    .bind(payload.application.desired_program_level.as_str())
    .bind(&payload.application.desired_field)
    .bind(payload.application.preferred_intake.as_str())
    .bind(payload.application.budget_range.as_str())
    .bind(payload.application.need_scholarship)
    .bind(&payload.documents.passport_url)
    .bind(blank_to_null(payload.documents.english_test_url.as_deref()))
    .bind(&payload.documents.cv_url)
    .bind(blank_to_null(
        payload.documents.motivation_letter_url.as_deref(),
    ))
    .bind(&payload.documents.recommendation_letters)
    .bind(&payload.documents.other_certificates)
    .bind(blank_to_null(payload.additional.how_heard_about_us.as_deref()))
    .bind(blank_to_null(payload.additional.referrer_name.as_deref()))
    .bind(blank_to_null(payload.additional.special_notes.as_deref()))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(reference_number)
}

async fn account_exists(pool: &PgPool, email: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await
}

async fn email_was_verified(pool: &PgPool, email: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM otp_codes WHERE email = $1 AND used = TRUE)")
        .bind(email)
        .fetch_one(pool)
        .await
}

#[derive(sqlx::FromRow)]
struct OtpRow {
    id: Uuid,
    expires_at: DateTime<Utc>,
}

async fn fetch_latest_open_code(
    pool: &PgPool,
    email: &str,
    code: &str,
) -> sqlx::Result<Option<OtpRow>> {
    sqlx::query_as::<_, OtpRow>(
        "SELECT id, expires_at FROM otp_codes
         WHERE email = $1 AND code = $2 AND used = FALSE
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(email)
    .bind(code)
    .fetch_optional(pool)
    .await
}

#[derive(Debug, PartialEq, Eq)]
enum OtpVerdict {
    Valid,
    Expired,
    Invalid,
}

/// Expiry and existence decision for a fetched code row. A used or absent
/// code is indistinguishable from a wrong one; an expired code is reported
/// distinctly.
fn otp_verdict(row: Option<&OtpRow>, now: DateTime<Utc>) -> OtpVerdict {
    match row {
        None => OtpVerdict::Invalid,
        Some(row) if now > row.expires_at => OtpVerdict::Expired,
        Some(_) => OtpVerdict::Valid,
    }
}

/// Uniform 6-digit numeric code.
fn generate_otp_code() -> String {
    let n = 100_000 + OsRng.next_u32() % 900_000;
    n.to_string()
}

/// Initial credential mailed to the applicant alongside the reference
/// number. The applicant is told to change it after first login.
fn generate_password() -> String {
    let mut password = String::with_capacity(GENERATED_PASSWORD_CHARS);
    for _ in 0..GENERATED_PASSWORD_CHARS {
        let index = OsRng.next_u32() as usize % PASSWORD_ALPHABET.len();
        password.push(PASSWORD_ALPHABET[index] as char);
    }
    password
}

fn blank_to_null(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
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

    fn code_row(expires_at: DateTime<Utc>) -> OtpRow {
        OtpRow {
            id: Uuid::new_v4(),
            expires_at,
        }
    }

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn missing_code_is_invalid_not_expired() {
        assert_eq!(otp_verdict(None, Utc::now()), OtpVerdict::Invalid);
    }

    #[test]
    fn expired_code_is_reported_distinctly() {
        let now = Utc::now();
        let row = code_row(now - ChronoDuration::seconds(1));
        assert_eq!(otp_verdict(Some(&row), now), OtpVerdict::Expired);
    }

    #[test]
    fn code_is_valid_until_the_window_closes() {
        let now = Utc::now();
        let fresh = code_row(now + ChronoDuration::minutes(OTP_TTL_MINUTES));
        assert_eq!(otp_verdict(Some(&fresh), now), OtpVerdict::Valid);

        // The boundary instant itself still verifies.
        let boundary = code_row(now);
        assert_eq!(otp_verdict(Some(&boundary), now), OtpVerdict::Valid);
    }

    #[test]
    fn generated_passwords_use_the_alphabet() {
        let first = generate_password();
        let second = generate_password();
        assert_eq!(first.len(), GENERATED_PASSWORD_CHARS);
        assert!(
            first
                .bytes()
                .all(|byte| PASSWORD_ALPHABET.contains(&byte))
        );
        assert_ne!(first, second);
    }

    #[test]
    fn blank_optionals_are_dropped() {
        assert_eq!(blank_to_null(None), None);
        assert_eq!(blank_to_null(Some("")), None);
        assert_eq!(blank_to_null(Some("value")), Some("value"));
    }
}
