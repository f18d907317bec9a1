use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    modules,
    web::{AppState, auth},
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/verify-reset-token", get(auth::verify_reset_token))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/healthz", get(healthz))
        .merge(modules::registration::router())
        .merge(modules::student::router())
        .merge(modules::admin::router())
        .merge(modules::uploads::router())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
