use std::env;

use anyhow::{Context, Result, bail};
use reqwest::Client;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const DEFAULT_FROM: &str = "onboarding@resend.dev";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";

/// Thin client for the Resend transactional email API. Holds the templates
/// for every message the portal sends.
#[derive(Clone)]
pub struct Mailer {
    http: Client,
    config: MailerConfig,
}

#[derive(Clone)]
struct MailerConfig {
    api_key: Option<String>,
    from: String,
    public_url: String,
}

impl Mailer {
    /// Build a client using environment variables. A missing API key is
    /// tolerated here and reported when a send is attempted.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("RESEND_API_KEY").ok();
        let from = env::var("RESEND_FROM_EMAIL").unwrap_or_else(|_| DEFAULT_FROM.to_string());
        let public_url = env::var("PUBLIC_URL").unwrap_or_else(|_| DEFAULT_PUBLIC_URL.to_string());

        Ok(Self {
            http: Client::new(),
            config: MailerConfig {
                api_key,
                from,
                public_url,
            },
        })
    }

    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        self.send(
            to,
            "Verify Your Email - Student Registration Agency",
            &verification_body(code),
        )
        .await
    }

    pub async fn send_registration_confirmation(
        &self,
        to: &str,
        name: &str,
        reference_number: &str,
        password: &str,
    ) -> Result<()> {
        self.send(
            to,
            &format!("Application Received - {reference_number}"),
            &confirmation_body(name, to, reference_number, password, &self.config.public_url),
        )
        .await
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<()> {
        self.send(
            to,
            "Password Reset Request - Student Registration Agency",
            &password_reset_body(token, &self.config.public_url),
        )
        .await
    }

    pub async fn send_status_update(
        &self,
        to: &str,
        name: &str,
        reference_number: &str,
        old_status: &str,
        new_status: &str,
        note: Option<&str>,
    ) -> Result<()> {
        self.send(
            to,
            &format!("Application Status Updated - {new_status}"),
            &status_update_body(name, reference_number, old_status, new_status, note),
        )
        .await
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            bail!("RESEND_API_KEY is not configured but required for outbound email");
        };

        let payload = serde_json::json!({
            "from": self.config.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to reach mail provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("resend call failed with status {status}: {body}");
        }

        Ok(())
    }
}

fn verification_body(code: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>Email Verification</h1>\
         <p>Your verification code is:</p>\
         <p style=\"font-size: 32px; font-weight: bold; letter-spacing: 8px;\">{code}</p>\
         <p>This code expires in 10 minutes.</p>\
         <p>If you didn't request this code, please ignore this email.</p>\
         </div>"
    )
}

fn confirmation_body(
    name: &str,
    email: &str,
    reference_number: &str,
    password: &str,
    public_url: &str,
) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>Application Submitted!</h1>\
         <p>Dear {name},</p>\
         <p>Thank you for submitting your application! We've successfully received your \
         documents and information.</p>\
         <p>Your Application Reference Number: <strong>{reference_number}</strong></p>\
         <p>Your Login Credentials:<br>Email: {email}<br>Password: {password}</p>\
         <p>Please save these credentials in a safe place and change your password after \
         first login.</p>\
         <p><a href=\"{public_url}/dashboard\">Access Your Dashboard</a></p>\
         <p>Best regards,<br><strong>Student Registration Agency Team</strong></p>\
         </div>"
    )
}

fn password_reset_body(token: &str, public_url: &str) -> String {
    let reset_url = format!("{public_url}/reset-password?token={token}");
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>Password Reset Request</h1>\
         <p>We received a request to reset your password. Click the link below to create \
         a new password:</p>\
         <p><a href=\"{reset_url}\">Reset Password</a></p>\
         <p>This link expires in 1 hour.</p>\
         <p>If you didn't request a password reset, please ignore this email.</p>\
         </div>"
    )
}

fn status_update_body(
    name: &str,
    reference_number: &str,
    old_status: &str,
    new_status: &str,
    note: Option<&str>,
) -> String {
    let note_block = match note {
        Some(note) if !note.is_empty() => {
            format!("<p>Message from your agent: {note}</p>")
        }
        _ => String::new(),
    };
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>Application Status Update</h1>\
         <p>Dear {name},</p>\
         <p>There's an update on your application (Ref: <strong>{reference_number}</strong>).</p>\
         <p>Your application status has changed from {old_status} to \
         <strong>{new_status}</strong>.</p>{note_block}\
         <p>Best regards,<br><strong>Student Registration Agency Team</strong></p>\
         </div>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_body_embeds_code() {
        let body = verification_body("482913");
        assert!(body.contains("482913"));
        assert!(body.contains("10 minutes"));
    }

    #[test]
    fn confirmation_body_embeds_credentials_and_reference() {
        let body = confirmation_body(
            "Aigerim Bekova",
            "a@x.com",
            "APP-2026-000001",
            "s3cret-pass",
            "https://portal.example.com",
        );
        assert!(body.contains("APP-2026-000001"));
        assert!(body.contains("a@x.com"));
        assert!(body.contains("s3cret-pass"));
        assert!(body.contains("https://portal.example.com/dashboard"));
    }

    #[test]
    fn password_reset_body_builds_link() {
        let body = password_reset_body("abc123", "https://portal.example.com");
        assert!(body.contains("https://portal.example.com/reset-password?token=abc123"));
    }

    #[test]
    fn status_update_body_includes_note_only_when_present() {
        let with_note = status_update_body("A", "APP-2026-000001", "pending", "approved", Some("Congrats"));
        assert!(with_note.contains("Congrats"));
        assert!(with_note.contains("approved"));

        let without_note = status_update_body("A", "APP-2026-000001", "pending", "approved", None);
        assert!(!without_note.contains("Message from your agent"));
    }
}
