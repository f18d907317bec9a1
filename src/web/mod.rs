pub mod auth;
pub mod models;
pub mod responses;
pub mod router;
pub mod state;

pub use models::{ApplicantRow, ApplicantSummaryRow, ApplicationStatus};
pub use responses::{ApiMessage, json_error, json_validation_error};
pub use state::AppState;
