use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a submitted application. New records always start at
/// `pending`; later transitions come from the admin review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Submitted,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Submitted => "submitted",
        }
    }
}

/// Full applicant record as persisted. Serialized with its column names so
/// the dashboard sees the same layout the database stores.
#[derive(Clone, FromRow, Serialize)]
pub struct ApplicantRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference_number: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Option<String>,
    pub phone: String,
    pub nationality: String,
    pub current_country: String,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub profile_picture_url: String,
    pub highest_education: String,
    pub institution_name: String,
    pub institution_country: Option<String>,
    pub field_of_study: String,
    pub graduation_year: i32,
    pub gpa: String,
    pub transcript_url: String,
    pub desired_country: String,
    pub desired_program_level: String,
    pub desired_field: String,
    pub preferred_intake: String,
    pub budget_range: String,
    pub need_scholarship: bool,
    pub passport_url: String,
    pub english_test_url: Option<String>,
    pub cv_url: String,
    pub motivation_letter_url: Option<String>,
    pub recommendation_letters: Vec<String>,
    pub other_certificates: Vec<String>,
    pub how_heard_about_us: Option<String>,
    pub referrer_name: Option<String>,
    pub special_notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact row for the admin listing.
#[derive(Clone, FromRow, Serialize)]
pub struct ApplicantSummaryRow {
    pub reference_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
