use std::env;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::web::{ApiMessage, AppState, json_error};

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "jpg", "jpeg", "png", "webp"];
const DEFAULT_FOLDER: &str = "documents";
const FOLDER_ROOT: &str = "agency";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/uploads", post(upload))
}

/// Error returned when an uploaded file fails validation.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// Thin client for the Cloudinary unsigned-upload endpoint. The portal keeps
/// no file bytes of its own; every document lives at the returned URL.
#[derive(Clone)]
pub struct UploadClient {
    http: Client,
    config: UploadConfig,
}

#[derive(Clone)]
struct UploadConfig {
    cloud_name: Option<String>,
    upload_preset: String,
}

impl UploadClient {
    /// Build a client using environment variables. A missing cloud name is
    /// tolerated here and reported when an upload is attempted.
    pub fn from_env() -> Result<Self> {
        let cloud_name = env::var("CLOUDINARY_CLOUD_NAME").ok();
        let upload_preset =
            env::var("CLOUDINARY_UPLOAD_PRESET").unwrap_or_else(|_| "unsigned".to_string());

        Ok(Self {
            http: Client::new(),
            config: UploadConfig {
                cloud_name,
                upload_preset,
            },
        })
    }

    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>, folder: &str) -> Result<String> {
        let Some(cloud_name) = self.config.cloud_name.as_ref() else {
            bail!("CLOUDINARY_CLOUD_NAME is not configured but required for uploads");
        };

        let endpoint = format!("https://api.cloudinary.com/v1_1/{cloud_name}/auto/upload");
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("upload_preset", self.config.upload_preset.clone())
            .text("folder", folder.to_string());

        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .context("failed to reach file host")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("cloudinary call failed with status {status}: {body}");
        }

        let body: UploadApiResponse = response
            .json()
            .await
            .context("failed to parse file host response")?;

        Ok(body.secure_url)
    }
}

#[derive(Deserialize)]
struct UploadApiResponse {
    secure_url: String,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    url: String,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, Json<ApiMessage>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut folder = DEFAULT_FOLDER.to_string();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        json_error(
            StatusCode::BAD_REQUEST,
            format!("Malformed upload form: {err}"),
        )
    })? {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| {
                        json_error(
                            StatusCode::BAD_REQUEST,
                            format!("Failed to read uploaded file: {err}"),
                        )
                    })?
                    .to_vec();
                file = Some((file_name, bytes));
            }
            "folder" => {
                folder = field.text().await.map_err(|err| {
                    json_error(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read folder field: {err}"),
                    )
                })?;
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file else {
        return Err(json_error(StatusCode::BAD_REQUEST, "A file is required"));
    };

    if bytes.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Uploaded file is empty"));
    }

    let stored_name = accept_file_name(&file_name)
        .map_err(|err| json_error(StatusCode::BAD_REQUEST, err.message().to_string()))?;

    let url = state
        .uploader()
        .upload(&stored_name, bytes, &folder_path(&folder))
        .await
        .map_err(|err| {
            error!(?err, file_name = %stored_name, "failed to upload document");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file")
        })?;

    Ok(Json(UploadResponse { success: true, url }))
}

/// Checks the extension against the allowlist and returns the sanitized
/// filename to forward to the file host.
fn accept_file_name(file_name: &str) -> Result<String, UploadError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(UploadError::new(format!(
            "File type `{extension}` is not supported"
        )));
    }

    let sanitized = sanitize(file_name);
    if sanitized.is_empty() {
        return Err(UploadError::new("File name is empty"));
    }

    Ok(sanitized)
}

/// Uploads are grouped under one root folder on the file host, with the
/// client-chosen subfolder below it.
fn folder_path(folder: &str) -> String {
    let trimmed = folder.trim().trim_matches('/');
    if trimmed.is_empty() {
        format!("{FOLDER_ROOT}/{DEFAULT_FOLDER}")
    } else {
        format!("{FOLDER_ROOT}/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_extensions_pass() {
        for name in ["cv.pdf", "photo.JPG", "letter.docx", "scan.webp"] {
            assert!(accept_file_name(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn disallowed_extensions_are_rejected() {
        for name in ["script.exe", "archive.zip", "noextension", "page.html"] {
            let err = accept_file_name(name).unwrap_err();
            assert!(err.message().contains("not supported"), "{name}");
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        let stored = accept_file_name("../../etc/passwd.pdf").unwrap();
        assert!(!stored.contains(".."));
        assert!(!stored.contains('/'));
        assert!(stored.ends_with("passwd.pdf"));
    }

    #[test]
    fn folder_paths_are_rooted() {
        assert_eq!(folder_path("profile-pictures"), "agency/profile-pictures");
        assert_eq!(folder_path("/documents/"), "agency/documents");
        assert_eq!(folder_path("   "), "agency/documents");
        assert_eq!(folder_path(""), "agency/documents");
    }
}
