use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::web::{
    ApiMessage, AppState, ApplicantSummaryRow, ApplicationStatus, auth, json_error,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/applications", get(list_applications))
        .route("/api/admin/applications/status", post(update_status))
}

#[derive(Serialize)]
struct ApplicationsResponse {
    success: bool,
    applications: Vec<ApplicantSummaryRow>,
}

async fn list_applications(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<ApplicationsResponse>, (StatusCode, Json<ApiMessage>)> {
    let _admin = auth::require_admin(&state, &jar).await?;

    let applications = sqlx::query_as::<_, ApplicantSummaryRow>(
        "SELECT applicants.reference_number, applicants.first_name, applicants.last_name,
                users.email, applicants.status, applicants.created_at, applicants.updated_at
         FROM applicants
         JOIN users ON users.id = applicants.user_id
         ORDER BY applicants.created_at DESC",
    )
    .fetch_all(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to list applications");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server error. Please try again later.",
        )
    })?;

    Ok(Json(ApplicationsResponse {
        success: true,
        applications,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStatusRequest {
    reference_number: String,
    status: ApplicationStatus,
    #[serde(default)]
    note: Option<String>,
}

#[derive(sqlx::FromRow)]
struct StatusTargetRow {
    first_name: String,
    last_name: String,
    status: String,
    email: String,
}

async fn update_status(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiMessage>)> {
    let _admin = auth::require_admin(&state, &jar).await?;

    let target = sqlx::query_as::<_, StatusTargetRow>(
        "SELECT applicants.first_name, applicants.last_name, applicants.status, users.email
         FROM applicants
         JOIN users ON users.id = applicants.user_id
         WHERE applicants.reference_number = $1",
    )
    .bind(&request.reference_number)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to load application for status update");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server error. Please try again later.",
        )
    })?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Application not found"))?;

    if let Err(err) = sqlx::query(
        "UPDATE applicants SET status = $2, updated_at = NOW() WHERE reference_number = $1",
    )
    .bind(&request.reference_number)
    .bind(request.status.as_str())
    .execute(state.pool_ref())
    .await
    {
        error!(?err, "failed to update application status");
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update status",
        ));
    }

    let name = format!("{} {}", target.first_name, target.last_name);
    if let Err(err) = state
        .mailer()
        .send_status_update(
            &target.email,
            &name,
            &request.reference_number,
            &target.status,
            request.status.as_str(),
            request.note.as_deref(),
        )
        .await
    {
        // The status is already changed; the notification is best-effort.
        warn!(?err, reference_number = %request.reference_number,
            "failed to deliver status update email");
    }

    Ok(Json(ApiMessage::new("Status updated")))
}
