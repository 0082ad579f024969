use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::grades::{Grade, GradeTable};

// An empty grade string means no grade was recorded for that subject.
#[derive(Debug, Clone)]
pub struct RawSemesterRecord {
    pub student_id: Uuid,
    pub registration_number: String,
    pub name: String,
    pub batch: String,
    pub department: String,
    pub year: u32,
    pub semester: u32,
    pub grades: BTreeMap<String, String>,
}

impl RawSemesterRecord {
    pub fn validate(self) -> Result<SemesterRecord, ValidationError> {
        let registration_number = self.registration_number.trim().to_string();
        if registration_number.is_empty() {
            return Err(ValidationError::MissingRegistrationNumber { name: self.name });
        }

        let mut grades = BTreeMap::new();
        for (subject, value) in self.grades {
            if value.trim().is_empty() {
                continue;
            }
            let grade = value
                .parse::<Grade>()
                .map_err(|_| ValidationError::UnknownGrade {
                    registration_number: registration_number.clone(),
                    subject: subject.clone(),
                    value: value.clone(),
                })?;
            grades.insert(subject, grade);
        }

        Ok(SemesterRecord {
            student_id: self.student_id,
            registration_number,
            name: self.name,
            batch: self.batch,
            department: self.department,
            year: self.year,
            semester: self.semester,
            grades,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterRecord {
    pub student_id: Uuid,
    pub registration_number: String,
    pub name: String,
    pub batch: String,
    pub department: String,
    pub year: u32,
    pub semester: u32,
    pub grades: BTreeMap<String, Grade>,
}

impl SemesterRecord {
    pub fn failing_subjects(&self, table: &GradeTable) -> Vec<String> {
        self.grades
            .iter()
            .filter(|(_, grade)| !table.is_pass(**grade))
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemesterKey {
    pub batch: String,
    pub department: String,
    pub year: u32,
    pub semester: u32,
}

impl SemesterKey {
    pub fn parse(
        batch: &str,
        department: &str,
        year: &str,
        semester: &str,
    ) -> Result<Self, ValidationError> {
        Ok(SemesterKey {
            batch: batch.trim().to_string(),
            department: department.trim().to_string(),
            year: parse_positive("year", year)?,
            semester: parse_positive("semester", semester)?,
        })
    }
}

impl std::fmt::Display for SemesterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch {} / {} / year {} / semester {}",
            self.batch, self.department, self.year, self.semester
        )
    }
}

fn parse_positive(field: &str, value: &str) -> Result<u32, ValidationError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ValidationError::MalformedFilter {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct StudentHistory {
    pub registration_number: String,
    pub name: String,
    pub semesters: Vec<SemesterRecord>,
}

pub fn group_by_student(records: Vec<SemesterRecord>) -> Vec<StudentHistory> {
    let mut order: Vec<StudentHistory> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for record in records {
        match index.get(&record.registration_number) {
            Some(&position) => order[position].semesters.push(record),
            None => {
                index.insert(record.registration_number.clone(), order.len());
                order.push(StudentHistory {
                    registration_number: record.registration_number.clone(),
                    name: record.name.clone(),
                    semesters: vec![record],
                });
            }
        }
    }

    order
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StatusLabel {
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    Good,
    Average,
    #[serde(rename = "Below Average")]
    BelowAverage,
    Poor,
}

impl StatusLabel {
    pub const ALL: [StatusLabel; 6] = [
        StatusLabel::Excellent,
        StatusLabel::VeryGood,
        StatusLabel::Good,
        StatusLabel::Average,
        StatusLabel::BelowAverage,
        StatusLabel::Poor,
    ];

    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 9.0 => StatusLabel::Excellent,
            s if s >= 8.0 => StatusLabel::VeryGood,
            s if s >= 7.0 => StatusLabel::Good,
            s if s >= 6.0 => StatusLabel::Average,
            s if s >= 5.0 => StatusLabel::BelowAverage,
            _ => StatusLabel::Poor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Excellent => "Excellent",
            StatusLabel::VeryGood => "Very Good",
            StatusLabel::Good => "Good",
            StatusLabel::Average => "Average",
            StatusLabel::BelowAverage => "Below Average",
            StatusLabel::Poor => "Poor",
        }
    }
}

impl std::fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterGpa {
    pub year: u32,
    pub semester: u32,
    pub gpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAggregate {
    pub registration_number: String,
    pub name: String,
    pub semesters: Vec<SemesterGpa>,
    pub cgpa: f64,
    pub status: StatusLabel,
    pub arrear_count: usize,
    pub credits_earned: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectStats {
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_percentage: u32,
    pub grade_distribution: BTreeMap<Grade, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub registration_number: String,
    pub name: String,
    pub excellent_count: usize,
    pub graded_count: usize,
    pub excellence_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttentionEntry {
    pub registration_number: String,
    pub name: String,
    pub failing_subjects: Vec<String>,
}

impl AttentionEntry {
    pub fn failing_count(&self) -> usize {
        self.failing_subjects.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortStatistics {
    pub total_students: usize,
    pub total_subjects: usize,
    pub passed_students: usize,
    pub pass_percentage: u32,
    pub subjects: Vec<String>,
    pub grade_distribution: BTreeMap<Grade, usize>,
    pub subject_wise: BTreeMap<String, SubjectStats>,
    pub top_performers: Vec<TopPerformer>,
    pub needs_attention: Vec<AttentionEntry>,
}
