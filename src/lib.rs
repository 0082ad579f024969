pub mod cgpa;
pub mod cohort;
pub mod config;
pub mod credits;
pub mod error;
pub mod export;
pub mod gpa;
pub mod grades;
pub mod models;
pub mod ranking;
pub mod report;

pub use cgpa::{compute_cgpa_for_batch, CgpaBatch};
pub use cohort::{compute_semester_analysis, CohortAnalysis, SubjectUniverse};
pub use config::AnalysisOptions;
pub use credits::{CreditMap, MissingCreditPolicy};
pub use error::{AnalyticsError, DataGap, ValidationError};
pub use grades::{Grade, GradeTable};
pub use models::{
    CohortStatistics, RawSemesterRecord, SemesterKey, SemesterRecord, StatusLabel,
    StudentAggregate, StudentHistory,
};
pub use ranking::SortKey;
pub use report::{
    shape_report, FieldSelection, Metric, Report, ReportFilters, ReportFormat, ReportSource,
};
