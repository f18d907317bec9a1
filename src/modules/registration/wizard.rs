use std::fmt;

use super::schema::{
    AdditionalInfo, ApplicationPreferences, CompleteRegistration, DocumentSet, EducationInfo,
    FieldErrors, PersonalInfo, is_email_shaped,
};

/// Ordered phases of the registration wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Email,
    Personal,
    Education,
    Application,
    Documents,
    Additional,
    Review,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Email,
        Step::Personal,
        Step::Education,
        Step::Application,
        Step::Documents,
        Step::Additional,
        Step::Review,
    ];

    pub fn index(self) -> usize {
        Step::ALL.iter().position(|step| *step == self).unwrap_or(0)
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Email => "Email Verification",
            Step::Personal => "Personal Information",
            Step::Education => "Education Background",
            Step::Application => "Application Details",
            Step::Documents => "Documents",
            Step::Additional => "Additional Information",
            Step::Review => "Review & Submit",
        }
    }

    fn next(self) -> Step {
        let index = self.index();
        if index + 1 < Step::ALL.len() {
            Step::ALL[index + 1]
        } else {
            self
        }
    }

    fn previous(self) -> Option<Step> {
        self.index().checked_sub(1).map(|index| Step::ALL[index])
    }
}

/// Validated payload contributed by one step. The review step contributes
/// nothing; it only assembles.
#[derive(Debug, Clone)]
pub enum StepForm {
    Email(String),
    Personal(PersonalInfo),
    Education(EducationInfo),
    Application(ApplicationPreferences),
    Documents(DocumentSet),
    Additional(AdditionalInfo),
}

impl StepForm {
    pub fn step(&self) -> Step {
        match self {
            StepForm::Email(_) => Step::Email,
            StepForm::Personal(_) => Step::Personal,
            StepForm::Education(_) => Step::Education,
            StepForm::Application(_) => Step::Application,
            StepForm::Documents(_) => Step::Documents,
            StepForm::Additional(_) => Step::Additional,
        }
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        match self {
            StepForm::Email(email) => {
                let mut errors = FieldErrors::new();
                if !is_email_shaped(email) {
                    errors.push("email", "A valid email address is required");
                }
                errors.into_result()
            }
            StepForm::Personal(personal) => personal.validate(),
            StepForm::Education(education) => education.validate(),
            StepForm::Application(application) => application.validate(),
            StepForm::Documents(documents) => documents.validate(),
            StepForm::Additional(additional) => additional.validate(),
        }
    }
}

/// Accumulated step data for one registration attempt. Sections are filled
/// only by payloads that passed their own schema.
#[derive(Debug, Clone, Default)]
pub struct RegistrationDraft {
    email: Option<String>,
    personal: Option<PersonalInfo>,
    education: Option<EducationInfo>,
    application: Option<ApplicationPreferences>,
    documents: Option<DocumentSet>,
    additional: Option<AdditionalInfo>,
}

impl RegistrationDraft {
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn personal(&self) -> Option<&PersonalInfo> {
        self.personal.as_ref()
    }

    pub fn education(&self) -> Option<&EducationInfo> {
        self.education.as_ref()
    }

    pub fn application(&self) -> Option<&ApplicationPreferences> {
        self.application.as_ref()
    }

    pub fn documents(&self) -> Option<&DocumentSet> {
        self.documents.as_ref()
    }

    pub fn additional(&self) -> Option<&AdditionalInfo> {
        self.additional.as_ref()
    }

    fn store(&mut self, form: StepForm) {
        match form {
            StepForm::Email(email) => self.email = Some(email),
            StepForm::Personal(personal) => self.personal = Some(personal),
            StepForm::Education(education) => self.education = Some(education),
            StepForm::Application(application) => self.application = Some(application),
            StepForm::Documents(documents) => self.documents = Some(documents),
            StepForm::Additional(additional) => self.additional = Some(additional),
        }
    }
}

#[derive(Debug)]
pub enum WizardError {
    /// The payload belongs to a different step than the one being edited.
    WrongStep { expected: Step, got: Step },
    /// The payload failed its step schema; the wizard state is unchanged.
    Invalid(FieldErrors),
    /// The requested operation is only available from the review step.
    NotAtReview { current: Step },
    /// Assembly found a step whose data was never committed.
    MissingSection { step: Step },
}

impl fmt::Display for WizardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardError::WrongStep { expected, got } => write!(
                f,
                "expected data for step '{}', got data for step '{}'",
                expected.title(),
                got.title()
            ),
            WizardError::Invalid(errors) => write!(f, "step validation failed: {errors}"),
            WizardError::NotAtReview { current } => write!(
                f,
                "operation is only available from the review step (currently at '{}')",
                current.title()
            ),
            WizardError::MissingSection { step } => {
                write!(f, "step '{}' has no committed data", step.title())
            }
        }
    }
}

impl std::error::Error for WizardError {}

/// Finite sequence controller for the registration flow. Owns the draft for
/// the duration of the authoring session; persistence happens only when the
/// assembled payload is submitted.
#[derive(Debug, Clone)]
pub struct RegistrationWizard {
    step: Step,
    draft: RegistrationDraft,
}

impl Default for RegistrationWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationWizard {
    pub fn new() -> Self {
        Self {
            step: Step::Email,
            draft: RegistrationDraft::default(),
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn draft(&self) -> &RegistrationDraft {
        &self.draft
    }

    /// Commit the current step's payload and move forward. The payload must
    /// belong to the current step and pass its schema; otherwise the wizard
    /// is left exactly as it was.
    pub fn advance(&mut self, form: StepForm) -> Result<Step, WizardError> {
        if form.step() != self.step {
            return Err(WizardError::WrongStep {
                expected: self.step,
                got: form.step(),
            });
        }
        form.validate().map_err(WizardError::Invalid)?;
        self.draft.store(form);
        self.step = self.step.next();
        Ok(self.step)
    }

    /// Move back one step. Already-committed data for the current and later
    /// steps is kept.
    pub fn retreat(&mut self) -> Step {
        if let Some(previous) = self.step.previous() {
            self.step = previous;
        }
        self.step
    }

    /// Re-enter an earlier step for correction. Only offered from the
    /// review step; committed data for every step survives.
    pub fn jump_to(&mut self, target: Step) -> Result<Step, WizardError> {
        if self.step != Step::Review {
            return Err(WizardError::NotAtReview { current: self.step });
        }
        self.step = target;
        Ok(self.step)
    }

    /// Assemble the submission payload. Only permitted at the review step
    /// with every section committed; the draft is left intact so a failed
    /// submission can be retried without data loss.
    pub fn assemble(&self) -> Result<CompleteRegistration, WizardError> {
        if self.step != Step::Review {
            return Err(WizardError::NotAtReview { current: self.step });
        }

        let payload = CompleteRegistration {
            email: self.section(self.draft.email.clone(), Step::Email)?,
            personal: self.section(self.draft.personal.clone(), Step::Personal)?,
            education: self.section(self.draft.education.clone(), Step::Education)?,
            application: self.section(self.draft.application.clone(), Step::Application)?,
            documents: self.section(self.draft.documents.clone(), Step::Documents)?,
            additional: self.section(self.draft.additional.clone(), Step::Additional)?,
        };

        payload.validate().map_err(WizardError::Invalid)?;
        Ok(payload)
    }

    fn section<T>(&self, value: Option<T>, step: Step) -> Result<T, WizardError> {
        value.ok_or(WizardError::MissingSection { step })
    }
}

#[cfg(test)]
mod tests {
    use super::super::schema::tests::{
        valid_additional, valid_application, valid_documents, valid_education, valid_personal,
    };
    use super::*;

    fn wizard_at_review() -> RegistrationWizard {
        let mut wizard = RegistrationWizard::new();
        wizard.advance(StepForm::Email("a@x.com".to_string())).unwrap();
        wizard.advance(StepForm::Personal(valid_personal())).unwrap();
        wizard.advance(StepForm::Education(valid_education())).unwrap();
        wizard
            .advance(StepForm::Application(valid_application()))
            .unwrap();
        wizard.advance(StepForm::Documents(valid_documents())).unwrap();
        wizard
            .advance(StepForm::Additional(valid_additional()))
            .unwrap();
        assert_eq!(wizard.step(), Step::Review);
        wizard
    }

    #[test]
    fn starts_empty_at_email_step() {
        let wizard = RegistrationWizard::new();
        assert_eq!(wizard.step(), Step::Email);
        assert!(wizard.draft().email().is_none());
        assert!(wizard.draft().personal().is_none());
    }

    #[test]
    fn advance_rejects_invalid_payload_and_preserves_state() {
        let mut wizard = RegistrationWizard::new();
        wizard.advance(StepForm::Email("a@x.com".to_string())).unwrap();

        let mut personal = valid_personal();
        personal.phone = "123".to_string();
        let error = wizard.advance(StepForm::Personal(personal)).unwrap_err();
        match error {
            WizardError::Invalid(errors) => {
                assert_eq!(errors.errors()[0].field, "phone");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(wizard.step(), Step::Personal);
        assert!(wizard.draft().personal().is_none());
        assert_eq!(wizard.draft().email(), Some("a@x.com"));
    }

    #[test]
    fn advance_rejects_payload_for_another_step() {
        let mut wizard = RegistrationWizard::new();
        let error = wizard
            .advance(StepForm::Documents(valid_documents()))
            .unwrap_err();
        assert!(matches!(
            error,
            WizardError::WrongStep {
                expected: Step::Email,
                got: Step::Documents,
            }
        ));
        assert_eq!(wizard.step(), Step::Email);
    }

    #[test]
    fn retreat_keeps_committed_data() {
        let mut wizard = RegistrationWizard::new();
        wizard.advance(StepForm::Email("a@x.com".to_string())).unwrap();
        wizard.advance(StepForm::Personal(valid_personal())).unwrap();
        assert_eq!(wizard.step(), Step::Education);

        assert_eq!(wizard.retreat(), Step::Personal);
        assert_eq!(wizard.retreat(), Step::Email);
        assert_eq!(wizard.retreat(), Step::Email);

        assert_eq!(wizard.draft().email(), Some("a@x.com"));
        assert!(wizard.draft().personal().is_some());
    }

    #[test]
    fn jump_to_only_from_review() {
        let mut wizard = RegistrationWizard::new();
        wizard.advance(StepForm::Email("a@x.com".to_string())).unwrap();
        assert!(matches!(
            wizard.jump_to(Step::Email),
            Err(WizardError::NotAtReview {
                current: Step::Personal
            })
        ));

        let mut wizard = wizard_at_review();
        assert_eq!(wizard.jump_to(Step::Education).unwrap(), Step::Education);
        assert!(wizard.draft().documents().is_some());
        assert!(wizard.draft().additional().is_some());
    }

    #[test]
    fn corrected_step_flows_back_to_review_with_siblings_intact() {
        let mut wizard = wizard_at_review();
        wizard.jump_to(Step::Education).unwrap();

        let mut education = valid_education();
        education.graduation_year = 2024;
        wizard.advance(StepForm::Education(education)).unwrap();
        assert_eq!(wizard.step(), Step::Application);

        wizard
            .advance(StepForm::Application(valid_application()))
            .unwrap();
        wizard.advance(StepForm::Documents(valid_documents())).unwrap();
        wizard
            .advance(StepForm::Additional(valid_additional()))
            .unwrap();

        assert_eq!(wizard.step(), Step::Review);
        assert_eq!(wizard.draft().education().unwrap().graduation_year, 2024);
        assert_eq!(wizard.draft().email(), Some("a@x.com"));
    }

    #[test]
    fn assemble_requires_review_step() {
        let mut wizard = wizard_at_review();
        let payload = wizard.assemble().unwrap();
        assert_eq!(payload.email, "a@x.com");

        // A failed submission leaves the wizard at review with data intact.
        assert_eq!(wizard.step(), Step::Review);
        assert!(wizard.assemble().is_ok());

        wizard.jump_to(Step::Personal).unwrap();
        assert!(matches!(
            wizard.assemble(),
            Err(WizardError::NotAtReview {
                current: Step::Personal
            })
        ));
    }

    #[test]
    fn step_order_and_titles() {
        assert_eq!(Step::Email.index(), 0);
        assert_eq!(Step::Review.index(), 6);
        assert_eq!(Step::Additional.next(), Step::Review);
        assert_eq!(Step::Review.next(), Step::Review);
        assert_eq!(Step::Email.previous(), None);
        assert_eq!(Step::Review.title(), "Review & Submit");
    }
}
