use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const GRADUATION_YEAR_MIN: i32 = 1950;
pub const GRADUATION_YEAR_MAX: i32 = 2030;
pub const MAX_RECOMMENDATION_LETTERS: usize = 3;
pub const MAX_OTHER_CERTIFICATES: usize = 5;

/// A single validation failure scoped to the field that produced it.
///
/// Field names use the wire spelling (camelCase, dotted for nested
/// sections) so clients can attach the message to the right input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Accumulator for field-scoped validation failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Merge another section's failures, prefixing each field with the
    /// section name (`personal.firstName`).
    fn absorb(&mut self, section: &str, result: Result<(), FieldErrors>) {
        if let Err(errors) = result {
            for error in errors.0 {
                self.0.push(FieldError {
                    field: format!("{section}.{}", error.field),
                    message: error.message,
                });
            }
        }
    }

    fn require_min_chars(&mut self, field: &str, value: &str, min: usize, message: &str) {
        if value.trim().chars().count() < min {
            self.push(field, message);
        }
    }

    fn require_url(&mut self, field: &str, value: &str, message: &str) {
        if !is_url_shaped(value) {
            self.push(field, message);
        }
    }

    /// Empty or absent optional document slots count as "not provided";
    /// anything else must be URL-shaped.
    fn optional_url(&mut self, field: &str, value: Option<&str>, message: &str) {
        if let Some(value) = value {
            if !value.is_empty() && !is_url_shaped(value) {
                self.push(field, message);
            }
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// Accepts an http(s) reference with a non-empty remainder. Uploaded files
/// resolve to hosted URLs, so anything else is treated as "not provided".
pub fn is_url_shaped(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => !rest.is_empty() && !rest.chars().any(char::is_whitespace),
        None => false,
    }
}

pub fn is_email_shaped(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub gender: Option<String>,
    pub phone: String,
    pub nationality: String,
    pub current_country: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub profile_picture_url: String,
}

impl PersonalInfo {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_min_chars(
            "firstName",
            &self.first_name,
            2,
            "First name must be at least 2 characters",
        );
        errors.require_min_chars(
            "lastName",
            &self.last_name,
            2,
            "Last name must be at least 2 characters",
        );
        errors.require_min_chars(
            "phone",
            &self.phone,
            10,
            "Phone number must be at least 10 digits",
        );
        errors.require_min_chars("nationality", &self.nationality, 1, "Nationality is required");
        errors.require_min_chars(
            "currentCountry",
            &self.current_country,
            1,
            "Current country is required",
        );
        errors.require_url(
            "profilePictureUrl",
            &self.profile_picture_url,
            "Profile picture is required",
        );
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationInfo {
    pub highest_education: String,
    pub institution_name: String,
    #[serde(default)]
    pub institution_country: Option<String>,
    pub field_of_study: String,
    pub graduation_year: i32,
    pub gpa: String,
    pub transcript_url: String,
}

impl EducationInfo {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_min_chars(
            "highestEducation",
            &self.highest_education,
            1,
            "Highest education is required",
        );
        errors.require_min_chars(
            "institutionName",
            &self.institution_name,
            2,
            "Institution name is required",
        );
        errors.require_min_chars(
            "fieldOfStudy",
            &self.field_of_study,
            2,
            "Field of study is required",
        );
        if self.graduation_year < GRADUATION_YEAR_MIN || self.graduation_year > GRADUATION_YEAR_MAX
        {
            errors.push(
                "graduationYear",
                format!(
                    "Graduation year must be between {GRADUATION_YEAR_MIN} and {GRADUATION_YEAR_MAX}"
                ),
            );
        }
        errors.require_min_chars("gpa", &self.gpa, 1, "GPA/Grade is required");
        errors.require_url("transcriptUrl", &self.transcript_url, "Transcript is required");
        errors.into_result()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramLevel {
    Bachelor,
    Master,
    Phd,
    Diploma,
    Certificate,
}

impl ProgramLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramLevel::Bachelor => "bachelor",
            ProgramLevel::Master => "master",
            ProgramLevel::Phd => "phd",
            ProgramLevel::Diploma => "diploma",
            ProgramLevel::Certificate => "certificate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intake {
    Fall,
    Spring,
    Summer,
}

impl Intake {
    pub fn as_str(self) -> &'static str {
        match self {
            Intake::Fall => "fall",
            Intake::Spring => "spring",
            Intake::Summer => "summer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetRange {
    #[serde(rename = "under-10k")]
    Under10k,
    #[serde(rename = "10k-20k")]
    Between10kAnd20k,
    #[serde(rename = "20k-30k")]
    Between20kAnd30k,
    #[serde(rename = "30k-50k")]
    Between30kAnd50k,
    #[serde(rename = "over-50k")]
    Over50k,
}

impl BudgetRange {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetRange::Under10k => "under-10k",
            BudgetRange::Between10kAnd20k => "10k-20k",
            BudgetRange::Between20kAnd30k => "20k-30k",
            BudgetRange::Between30kAnd50k => "30k-50k",
            BudgetRange::Over50k => "over-50k",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPreferences {
    pub desired_country: String,
    pub desired_program_level: ProgramLevel,
    pub desired_field: String,
    pub preferred_intake: Intake,
    pub budget_range: BudgetRange,
    pub need_scholarship: bool,
}

impl ApplicationPreferences {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_min_chars(
            "desiredCountry",
            &self.desired_country,
            1,
            "Desired country is required",
        );
        errors.require_min_chars(
            "desiredField",
            &self.desired_field,
            1,
            "Field of study is required",
        );
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSet {
    pub passport_url: String,
    #[serde(default)]
    pub english_test_url: Option<String>,
    pub cv_url: String,
    #[serde(default)]
    pub motivation_letter_url: Option<String>,
    #[serde(default)]
    pub recommendation_letters: Vec<String>,
    #[serde(default)]
    pub other_certificates: Vec<String>,
}

impl DocumentSet {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_url("passportUrl", &self.passport_url, "Passport is required");
        errors.require_url("cvUrl", &self.cv_url, "CV/Resume is required");
        errors.optional_url(
            "englishTestUrl",
            self.english_test_url.as_deref(),
            "English test result must be an uploaded document",
        );
        errors.optional_url(
            "motivationLetterUrl",
            self.motivation_letter_url.as_deref(),
            "Motivation letter must be an uploaded document",
        );
        if self.recommendation_letters.len() > MAX_RECOMMENDATION_LETTERS {
            errors.push(
                "recommendationLetters",
                format!("At most {MAX_RECOMMENDATION_LETTERS} recommendation letters are allowed"),
            );
        }
        for entry in &self.recommendation_letters {
            if !is_url_shaped(entry) {
                errors.push(
                    "recommendationLetters",
                    "Each recommendation letter must be an uploaded document",
                );
                break;
            }
        }
        if self.other_certificates.len() > MAX_OTHER_CERTIFICATES {
            errors.push(
                "otherCertificates",
                format!("At most {MAX_OTHER_CERTIFICATES} other certificates are allowed"),
            );
        }
        for entry in &self.other_certificates {
            if !is_url_shaped(entry) {
                errors.push(
                    "otherCertificates",
                    "Each certificate must be an uploaded document",
                );
                break;
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInfo {
    #[serde(default)]
    pub how_heard_about_us: Option<String>,
    #[serde(default)]
    pub referrer_name: Option<String>,
    #[serde(default)]
    pub special_notes: Option<String>,
    pub accept_terms: bool,
}

impl AdditionalInfo {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if !self.accept_terms {
            errors.push("acceptTerms", "You must accept the terms and conditions");
        }
        errors.into_result()
    }
}

/// The assembled payload the review step submits. The same validation runs
/// in the wizard and again at the submission boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRegistration {
    pub email: String,
    pub personal: PersonalInfo,
    pub education: EducationInfo,
    pub application: ApplicationPreferences,
    pub documents: DocumentSet,
    pub additional: AdditionalInfo,
}

impl CompleteRegistration {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if !is_email_shaped(&self.email) {
            errors.push("email", "A valid email address is required");
        }
        errors.absorb("personal", self.personal.validate());
        errors.absorb("education", self.education.validate());
        errors.absorb("application", self.application.validate());
        errors.absorb("documents", self.documents.validate());
        errors.absorb("additional", self.additional.validate());
        errors.into_result()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_personal() -> PersonalInfo {
        PersonalInfo {
            first_name: "Aigerim".to_string(),
            last_name: "Bekova".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2001, 4, 12).unwrap(),
            gender: Some("female".to_string()),
            phone: "+77011234567".to_string(),
            nationality: "Kazakh".to_string(),
            current_country: "Kazakhstan".to_string(),
            city: Some("Almaty".to_string()),
            postal_code: None,
            profile_picture_url: "https://files.example.com/profile.jpg".to_string(),
        }
    }

    pub(crate) fn valid_education() -> EducationInfo {
        EducationInfo {
            highest_education: "bachelor".to_string(),
            institution_name: "Nazarbayev University".to_string(),
            institution_country: Some("Kazakhstan".to_string()),
            field_of_study: "Computer Science".to_string(),
            graduation_year: 2023,
            gpa: "3.7/4.0".to_string(),
            transcript_url: "https://files.example.com/transcript.pdf".to_string(),
        }
    }

    pub(crate) fn valid_application() -> ApplicationPreferences {
        ApplicationPreferences {
            desired_country: "Germany".to_string(),
            desired_program_level: ProgramLevel::Master,
            desired_field: "Data Science".to_string(),
            preferred_intake: Intake::Fall,
            budget_range: BudgetRange::Between10kAnd20k,
            need_scholarship: true,
        }
    }

    pub(crate) fn valid_documents() -> DocumentSet {
        DocumentSet {
            passport_url: "https://files.example.com/passport.pdf".to_string(),
            english_test_url: Some("https://files.example.com/ielts.pdf".to_string()),
            cv_url: "https://files.example.com/cv.pdf".to_string(),
            motivation_letter_url: None,
            recommendation_letters: vec!["https://files.example.com/rec1.pdf".to_string()],
            other_certificates: Vec::new(),
        }
    }

    pub(crate) fn valid_additional() -> AdditionalInfo {
        AdditionalInfo {
            how_heard_about_us: Some("friend".to_string()),
            referrer_name: None,
            special_notes: None,
            accept_terms: true,
        }
    }

    pub(crate) fn valid_complete() -> CompleteRegistration {
        CompleteRegistration {
            email: "a@x.com".to_string(),
            personal: valid_personal(),
            education: valid_education(),
            application: valid_application(),
            documents: valid_documents(),
            additional: valid_additional(),
        }
    }

    fn fields(errors: FieldErrors) -> Vec<String> {
        errors.into_vec().into_iter().map(|e| e.field).collect()
    }

    #[test]
    fn valid_sections_pass() {
        assert!(valid_personal().validate().is_ok());
        assert!(valid_education().validate().is_ok());
        assert!(valid_application().validate().is_ok());
        assert!(valid_documents().validate().is_ok());
        assert!(valid_additional().validate().is_ok());
        assert!(valid_complete().validate().is_ok());
    }

    #[test]
    fn graduation_year_bounds_are_inclusive() {
        for year in [GRADUATION_YEAR_MIN, GRADUATION_YEAR_MAX] {
            let mut education = valid_education();
            education.graduation_year = year;
            assert!(education.validate().is_ok(), "{year} should be accepted");
        }
        for year in [GRADUATION_YEAR_MIN - 1, GRADUATION_YEAR_MAX + 1] {
            let mut education = valid_education();
            education.graduation_year = year;
            let errors = education.validate().unwrap_err();
            assert_eq!(fields(errors), vec!["graduationYear"], "{year} should be rejected");
        }
    }

    #[test]
    fn recommendation_letters_capped_at_three() {
        let url = "https://files.example.com/rec.pdf".to_string();
        let mut documents = valid_documents();
        documents.recommendation_letters = vec![url.clone(); MAX_RECOMMENDATION_LETTERS];
        assert!(documents.validate().is_ok());

        documents.recommendation_letters.push(url);
        let errors = documents.validate().unwrap_err();
        assert_eq!(fields(errors), vec!["recommendationLetters"]);
    }

    #[test]
    fn other_certificates_capped_at_five() {
        let url = "https://files.example.com/cert.pdf".to_string();
        let mut documents = valid_documents();
        documents.other_certificates = vec![url.clone(); MAX_OTHER_CERTIFICATES];
        assert!(documents.validate().is_ok());

        documents.other_certificates.push(url);
        let errors = documents.validate().unwrap_err();
        assert_eq!(fields(errors), vec!["otherCertificates"]);
    }

    #[test]
    fn terms_must_be_accepted() {
        let mut additional = valid_additional();
        additional.accept_terms = false;
        let errors = additional.validate().unwrap_err();
        assert_eq!(errors.errors().len(), 1);
        assert_eq!(errors.errors()[0].field, "acceptTerms");
        assert_eq!(
            errors.errors()[0].message,
            "You must accept the terms and conditions"
        );
    }

    #[test]
    fn short_names_and_phone_are_field_scoped() {
        let mut personal = valid_personal();
        personal.first_name = "A".to_string();
        personal.phone = "12345".to_string();
        let errors = personal.validate().unwrap_err();
        assert_eq!(fields(errors), vec!["firstName", "phone"]);
    }

    #[test]
    fn document_slots_require_url_shape() {
        let mut documents = valid_documents();
        documents.passport_url = "passport.pdf".to_string();
        documents.english_test_url = Some(String::new());
        let errors = documents.validate().unwrap_err();
        assert_eq!(fields(errors), vec!["passportUrl"]);
    }

    #[test]
    fn url_shape_rules() {
        assert!(is_url_shaped("https://files.example.com/a.pdf"));
        assert!(is_url_shaped("http://localhost:8080/a"));
        assert!(!is_url_shaped(""));
        assert!(!is_url_shaped("ftp://files.example.com/a.pdf"));
        assert!(!is_url_shaped("https://"));
        assert!(!is_url_shaped("https://bad host/a"));
    }

    #[test]
    fn email_shape_rules() {
        assert!(is_email_shaped("a@x.com"));
        assert!(is_email_shaped("first.last@mail.example.org"));
        assert!(!is_email_shaped("not-an-email"));
        assert!(!is_email_shaped("@x.com"));
        assert!(!is_email_shaped("a@nodot"));
        assert!(!is_email_shaped("a b@x.com"));
    }

    #[test]
    fn complete_validation_prefixes_section_fields() {
        let mut payload = valid_complete();
        payload.email = "nope".to_string();
        payload.education.graduation_year = 1949;
        payload.additional.accept_terms = false;
        let errors = payload.validate().unwrap_err();
        assert_eq!(
            fields(errors),
            vec!["email", "education.graduationYear", "additional.acceptTerms"]
        );
    }

    #[test]
    fn categorical_fields_reject_unknown_values() {
        let raw = r#"{
            "desiredCountry": "Germany",
            "desiredProgramLevel": "postdoc",
            "desiredField": "Data Science",
            "preferredIntake": "fall",
            "budgetRange": "under-10k",
            "needScholarship": false
        }"#;
        assert!(serde_json::from_str::<ApplicationPreferences>(raw).is_err());

        let raw = raw.replace("postdoc", "master");
        let parsed: ApplicationPreferences = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.desired_program_level, ProgramLevel::Master);
        assert_eq!(parsed.budget_range.as_str(), "under-10k");
    }
}
