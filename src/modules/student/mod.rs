use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::web::{
    ApiMessage, AppState, ApplicantRow,
    auth::{self, JsonAuthError},
    json_error, json_validation_error,
};
use crate::modules::registration::schema::FieldErrors;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/student/get-application", get(get_application))
        .route("/api/student/update-profile", post(update_profile))
}

#[derive(Serialize)]
struct ApplicationResponse {
    success: bool,
    applicant: ApplicantRow,
}

async fn get_application(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<ApplicationResponse>, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    let applicant = sqlx::query_as::<_, ApplicantRow>(
        "SELECT * FROM applicants WHERE user_id = $1",
    )
    .bind(user.id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, user_id = %user.id, "failed to load application");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server error. Please try again later.",
        )
    })?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Application not found"))?;

    Ok(Json(ApplicationResponse {
        success: true,
        applicant,
    }))
}

/// Students may only touch their contact details; everything else in the
/// record is owned by the review workflow.
#[derive(Deserialize)]
struct UpdateProfileRequest {
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

async fn update_profile(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    if let Some(phone) = request.phone.as_deref() {
        if phone.trim().chars().count() < 10 {
            let mut errors = FieldErrors::new();
            errors.push("phone", "Phone number must be at least 10 digits");
            return Err(json_validation_error("Invalid data", errors));
        }
    }

    let result = sqlx::query(
        "UPDATE applicants SET
            phone = COALESCE($2, phone),
            city = COALESCE($3, city),
            postal_code = COALESCE($4, postal_code),
            updated_at = NOW()
         WHERE user_id = $1",
    )
    .bind(user.id)
    .bind(request.phone.as_deref())
    .bind(request.city.as_deref())
    .bind(request.postal_code.as_deref())
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, user_id = %user.id, "failed to update profile");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update profile",
        )
    })?;

    if result.rows_affected() == 0 {
        return Err(json_error(StatusCode::NOT_FOUND, "Application not found"));
    }

    Ok(Json(ApiMessage::new("Profile updated successfully")))
}
