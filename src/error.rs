use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no records found for {scope}")]
    EmptyInput { scope: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown grade {value:?} for subject {subject} (student {registration_number})")]
    UnknownGrade {
        registration_number: String,
        subject: String,
        value: String,
    },
    #[error("unknown grade {value:?}")]
    UnknownGradeLetter { value: String },
    #[error("missing registration number for student {name:?}")]
    MissingRegistrationNumber { name: String },
    #[error("duplicate registration number: {registration_number}")]
    DuplicateRegistrationNumber { registration_number: String },
    #[error("malformed {field} filter: {value:?}")]
    MalformedFilter { field: String, value: String },
    #[error("invalid credit hours for subject {subject}: {value}")]
    InvalidCredit { subject: String, value: f64 },
    #[error(
        "subject set of {registration_number} differs from the cohort \
         (missing: {missing:?}, extra: {extra:?})"
    )]
    SubjectSetMismatch {
        registration_number: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    #[error("unknown subject selected for report: {subject}")]
    UnknownSubject { subject: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataGap {
    MissingCredit {
        registration_number: String,
        year: u32,
        semester: u32,
        subject: String,
    },
    EmptySemester {
        registration_number: String,
        year: u32,
        semester: u32,
    },
    SubjectSetMismatch {
        registration_number: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
}

impl std::fmt::Display for DataGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataGap::MissingCredit {
                registration_number,
                year,
                semester,
                subject,
            } => write!(
                f,
                "{registration_number} Y{year}S{semester}: subject {subject} has no credit entry"
            ),
            DataGap::EmptySemester {
                registration_number,
                year,
                semester,
            } => write!(
                f,
                "{registration_number} Y{year}S{semester}: no gradable subjects, semester excluded"
            ),
            DataGap::SubjectSetMismatch {
                registration_number,
                missing,
                extra,
            } => write!(
                f,
                "{registration_number}: subject set differs from cohort (missing {}, extra {})",
                missing.join(","),
                extra.join(",")
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
