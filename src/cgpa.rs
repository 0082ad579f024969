use std::collections::HashSet;

use log::{debug, warn};

use crate::credits::CreditMap;
use crate::error::{AnalyticsError, DataGap, Result, ValidationError};
use crate::gpa::{compute_semester_gpa, round2};
use crate::grades::GradeTable;
use crate::models::{SemesterGpa, StatusLabel, StudentAggregate, StudentHistory};
use crate::ranking::{rank_students, SortKey};

#[derive(Debug, Clone)]
pub struct CgpaBatch {
    pub students: Vec<StudentAggregate>,
    pub gaps: Vec<DataGap>,
}

pub fn aggregate_cgpa(semesters: &[SemesterGpa]) -> (f64, StatusLabel) {
    let valid: Vec<f64> = semesters.iter().map(|s| s.gpa).filter(|gpa| *gpa > 0.0).collect();
    if valid.is_empty() {
        return (0.0, StatusLabel::Poor);
    }
    let cgpa = round2(valid.iter().sum::<f64>() / valid.len() as f64);
    (cgpa, StatusLabel::from_score(cgpa))
}

pub fn aggregate_student(
    history: &StudentHistory,
    credits: &CreditMap,
    table: &GradeTable,
) -> (StudentAggregate, Vec<DataGap>) {
    let mut outcomes: Vec<_> = history
        .semesters
        .iter()
        .map(|record| compute_semester_gpa(record, credits, table))
        .collect();
    outcomes.sort_by_key(|outcome| (outcome.year, outcome.semester));

    let semesters: Vec<SemesterGpa> = outcomes.iter().map(|o| o.as_semester_gpa()).collect();
    let (cgpa, status) = aggregate_cgpa(&semesters);
    let arrear_count = outcomes.iter().map(|o| o.failing_subjects.len()).sum();
    let credits_earned = outcomes.iter().map(|o| o.credits_earned).sum();
    let gaps = outcomes.into_iter().flat_map(|o| o.gaps).collect();

    debug!(
        "{}: cgpa {:.2} ({}) across {} semesters",
        history.registration_number,
        cgpa,
        status,
        semesters.len()
    );

    let aggregate = StudentAggregate {
        registration_number: history.registration_number.clone(),
        name: history.name.clone(),
        semesters,
        cgpa,
        status,
        arrear_count,
        credits_earned,
        rank: 0,
    };
    (aggregate, gaps)
}

pub fn compute_cgpa_for_batch(
    histories: &[StudentHistory],
    credits: &CreditMap,
    table: &GradeTable,
    sort: SortKey,
) -> Result<CgpaBatch> {
    if histories.is_empty() {
        return Err(AnalyticsError::EmptyInput {
            scope: "cgpa batch".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for history in histories {
        if history.registration_number.trim().is_empty() {
            return Err(ValidationError::MissingRegistrationNumber {
                name: history.name.clone(),
            }
            .into());
        }
        if !seen.insert(history.registration_number.as_str()) {
            return Err(ValidationError::DuplicateRegistrationNumber {
                registration_number: history.registration_number.clone(),
            }
            .into());
        }
    }

    let mut students = Vec::with_capacity(histories.len());
    let mut gaps = Vec::new();
    for history in histories {
        let (aggregate, student_gaps) = aggregate_student(history, credits, table);
        students.push(aggregate);
        gaps.extend(student_gaps);
    }

    if !gaps.is_empty() {
        warn!("cgpa batch: {} data gaps recorded", gaps.len());
    }

    Ok(CgpaBatch {
        students: rank_students(students, sort),
        gaps,
    })
}
