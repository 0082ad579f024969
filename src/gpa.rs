use log::{debug, warn};
use serde::Serialize;

use crate::credits::CreditMap;
use crate::error::DataGap;
use crate::grades::GradeTable;
use crate::models::{SemesterGpa, SemesterRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterOutcome {
    pub registration_number: String,
    pub year: u32,
    pub semester: u32,
    pub gpa: f64,
    pub passed: bool,
    pub valid: bool,
    pub failing_subjects: Vec<String>,
    pub credits_attempted: f64,
    pub credits_earned: f64,
    pub gaps: Vec<DataGap>,
}

impl SemesterOutcome {
    pub fn as_semester_gpa(&self) -> SemesterGpa {
        SemesterGpa {
            year: self.year,
            semester: self.semester,
            gpa: if self.valid { self.gpa } else { 0.0 },
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compute_semester_gpa(
    record: &SemesterRecord,
    credits: &CreditMap,
    table: &GradeTable,
) -> SemesterOutcome {
    let mut weighted_points = 0.0;
    let mut credits_attempted = 0.0;
    let mut credits_earned = 0.0;
    let mut gaps = Vec::new();

    for (subject, grade) in &record.grades {
        let resolution = credits.resolve(subject);
        if resolution.is_gap() {
            warn!(
                "{} Y{}S{}: no credit entry for {} ({:?})",
                record.registration_number, record.year, record.semester, subject, resolution
            );
            gaps.push(DataGap::MissingCredit {
                registration_number: record.registration_number.clone(),
                year: record.year,
                semester: record.semester,
                subject: subject.clone(),
            });
        }

        let Some(weight) = resolution.weight() else {
            continue;
        };

        weighted_points += table.point(*grade) * weight;
        credits_attempted += weight;
        if table.is_pass(*grade) {
            credits_earned += weight;
        }
    }

    let valid = credits_attempted > 0.0;
    let gpa = if valid {
        round2((weighted_points / credits_attempted).clamp(0.0, 10.0))
    } else {
        warn!(
            "{} Y{}S{}: no gradable subjects",
            record.registration_number, record.year, record.semester
        );
        gaps.push(DataGap::EmptySemester {
            registration_number: record.registration_number.clone(),
            year: record.year,
            semester: record.semester,
        });
        0.0
    };

    let failing_subjects = record.failing_subjects(table);
    debug!(
        "{} Y{}S{}: gpa {:.2} over {} credits",
        record.registration_number, record.year, record.semester, gpa, credits_attempted
    );

    SemesterOutcome {
        registration_number: record.registration_number.clone(),
        year: record.year,
        semester: record.semester,
        gpa,
        passed: failing_subjects.is_empty(),
        valid,
        failing_subjects,
        credits_attempted,
        credits_earned,
        gaps,
    }
}
