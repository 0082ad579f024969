use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::error::ValidationError;
use crate::grades::{Grade, GradeTable};
use crate::models::{CohortStatistics, SemesterRecord, StatusLabel, StudentAggregate};
use crate::ranking::{self, SortKey};

pub const REG_NO_HEADER: &str = "Reg_No";
pub const NAME_HEADER: &str = "Student_Name";

#[derive(Debug, Clone, Copy)]
pub enum ReportSource<'a> {
    Semester {
        records: &'a [SemesterRecord],
        statistics: &'a CohortStatistics,
        table: &'a GradeTable,
    },
    Cgpa {
        students: &'a [StudentAggregate],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Result,
    ArrearCount,
    SemesterGpas,
    Cgpa,
    Status,
    Rank,
}

impl Metric {
    fn supported_by(self, source: &ReportSource<'_>) -> bool {
        match source {
            ReportSource::Semester { .. } => matches!(self, Metric::Result | Metric::ArrearCount),
            ReportSource::Cgpa { .. } => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Metric::Result => "Result",
            Metric::ArrearCount => "Arrears",
            Metric::SemesterGpas => "Semester_GPAs",
            Metric::Cgpa => "CGPA",
            Metric::Status => "Status",
            Metric::Rank => "Rank",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "result" => Ok(Metric::Result),
            "arrears" => Ok(Metric::ArrearCount),
            "semesters" | "semester_gpas" => Ok(Metric::SemesterGpas),
            "cgpa" => Ok(Metric::Cgpa),
            "status" => Ok(Metric::Status),
            "rank" => Ok(Metric::Rank),
            _ => Err(ValidationError::MalformedFilter {
                field: "metric".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldSelection {
    pub subjects: Option<Vec<String>>,
    pub metrics: Vec<Metric>,
}

impl FieldSelection {
    pub fn all_for(source: &ReportSource<'_>) -> Self {
        let metrics = [
            Metric::Result,
            Metric::ArrearCount,
            Metric::SemesterGpas,
            Metric::Cgpa,
            Metric::Status,
            Metric::Rank,
        ]
        .into_iter()
        .filter(|metric| metric.supported_by(source))
        .collect();
        FieldSelection { subjects: None, metrics }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    // Narrows the rows only. The statistics block always covers the whole cohort.
    pub students: Option<BTreeSet<String>>,
    pub sort: SortKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    RowTable,
    WithStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Count(usize),
    Empty,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(text) => f.write_str(text),
            Cell::Number(value) => write!(f, "{value:.2}"),
            Cell::Count(value) => write!(f, "{value}"),
            Cell::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub label: String,
    pub value: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsBlock {
    pub rows: Vec<StatRow>,
}

impl StatisticsBlock {
    fn push(&mut self, label: impl Into<String>, value: Cell) {
        self.rows.push(StatRow {
            label: label.into(),
            value,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub statistics: Option<StatisticsBlock>,
}

pub fn shape_report(
    source: ReportSource<'_>,
    selection: &FieldSelection,
    filters: &ReportFilters,
    format: ReportFormat,
) -> Result<Report, ValidationError> {
    for metric in &selection.metrics {
        if !metric.supported_by(&source) {
            return Err(ValidationError::MalformedFilter {
                field: "metric".to_string(),
                value: metric.name().to_string(),
            });
        }
    }
    let selection = FieldSelection {
        subjects: selection.subjects.as_ref().map(|chosen| distinct(chosen)),
        metrics: distinct(&selection.metrics),
    };

    let (title, header, rows) = match source {
        ReportSource::Semester {
            records,
            statistics,
            table,
        } => shape_semester(records, statistics, table, &selection, filters)?,
        ReportSource::Cgpa { students } => shape_cgpa(students, &selection, filters)?,
    };

    let statistics = match format {
        ReportFormat::RowTable => None,
        ReportFormat::WithStats => Some(match source {
            ReportSource::Semester { statistics, .. } => semester_statistics(statistics),
            ReportSource::Cgpa { students } => cgpa_statistics(students),
        }),
    };

    Ok(Report {
        title,
        generated_at: Utc::now(),
        header,
        rows,
        statistics,
    })
}

// Keeps the first mention of each column.
fn distinct<T: Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !kept.contains(item) {
            kept.push(item.clone());
        }
    }
    kept
}

fn keep_student(filters: &ReportFilters, registration_number: &str) -> bool {
    filters
        .students
        .as_ref()
        .map_or(true, |wanted| wanted.contains(registration_number))
}

fn warn_unmatched<'a>(filters: &ReportFilters, present: impl Iterator<Item = &'a str>) {
    if let Some(wanted) = &filters.students {
        let present: BTreeSet<&str> = present.collect();
        for reg in wanted.iter().filter(|reg| !present.contains(reg.as_str())) {
            warn!("report filter: no student with registration number {reg}");
        }
    }
}

type Shaped = (String, Vec<String>, Vec<Vec<Cell>>);

fn shape_semester(
    records: &[SemesterRecord],
    statistics: &CohortStatistics,
    table: &GradeTable,
    selection: &FieldSelection,
    filters: &ReportFilters,
) -> Result<Shaped, ValidationError> {
    let subjects: Vec<String> = match &selection.subjects {
        None => statistics.subjects.clone(),
        Some(chosen) => {
            for subject in chosen {
                if !statistics.subjects.contains(subject) {
                    return Err(ValidationError::UnknownSubject {
                        subject: subject.clone(),
                    });
                }
            }
            chosen.clone()
        }
    };

    let mut header = vec![REG_NO_HEADER.to_string(), NAME_HEADER.to_string()];
    header.extend(subjects.iter().cloned());
    header.extend(selection.metrics.iter().map(|m| m.name().to_string()));

    warn_unmatched(filters, records.iter().map(|r| r.registration_number.as_str()));
    let mut selected: Vec<&SemesterRecord> = records
        .iter()
        .filter(|r| keep_student(filters, &r.registration_number))
        .collect();
    // A single semester has no CGPA, so CGPA order falls back to registration number.
    match filters.sort {
        SortKey::Name => selected.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.registration_number.cmp(&b.registration_number))
        }),
        SortKey::Cgpa | SortKey::RegistrationNumber => {
            selected.sort_by(|a, b| a.registration_number.cmp(&b.registration_number))
        }
    }

    let rows = selected
        .into_iter()
        .map(|record| {
            let mut row = vec![
                Cell::Text(record.registration_number.clone()),
                Cell::Text(record.name.clone()),
            ];
            row.extend(subjects.iter().map(|subject| {
                record
                    .grades
                    .get(subject)
                    .map_or(Cell::Empty, |grade| Cell::Text(grade.to_string()))
            }));
            let failing = subjects
                .iter()
                .filter(|subject| {
                    record
                        .grades
                        .get(*subject)
                        .is_some_and(|grade| !table.is_pass(*grade))
                })
                .count();
            for metric in &selection.metrics {
                row.push(match metric {
                    Metric::Result => {
                        Cell::Text(if failing == 0 { "PASS" } else { "FAIL" }.to_string())
                    }
                    Metric::ArrearCount => Cell::Count(failing),
                    _ => Cell::Empty,
                });
            }
            row
        })
        .collect();

    let title = records
        .first()
        .map(|r| {
            format!(
                "Semester Results: {} {} Year {} Semester {}",
                r.batch, r.department, r.year, r.semester
            )
        })
        .unwrap_or_else(|| "Semester Results".to_string());

    Ok((title, header, rows))
}

fn shape_cgpa(
    students: &[StudentAggregate],
    selection: &FieldSelection,
    filters: &ReportFilters,
) -> Result<Shaped, ValidationError> {
    if let Some(subject) = selection.subjects.as_ref().and_then(|s| s.first()) {
        return Err(ValidationError::UnknownSubject {
            subject: subject.clone(),
        });
    }

    let semester_columns: Vec<(u32, u32)> = students
        .iter()
        .flat_map(|s| s.semesters.iter().map(|sem| (sem.year, sem.semester)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut header = vec![REG_NO_HEADER.to_string(), NAME_HEADER.to_string()];
    for metric in &selection.metrics {
        match metric {
            Metric::SemesterGpas => header.extend(
                semester_columns
                    .iter()
                    .map(|(year, semester)| format!("Y{year}S{semester}_GPA")),
            ),
            other => header.push(other.name().to_string()),
        }
    }

    warn_unmatched(filters, students.iter().map(|s| s.registration_number.as_str()));
    let mut selected: Vec<&StudentAggregate> = students
        .iter()
        .filter(|s| keep_student(filters, &s.registration_number))
        .collect();
    selected.sort_by(|a, b| ranking::compare(a, b, filters.sort));

    let rows = selected
        .into_iter()
        .map(|student| {
            let mut row = vec![
                Cell::Text(student.registration_number.clone()),
                Cell::Text(student.name.clone()),
            ];
            for metric in &selection.metrics {
                match metric {
                    Metric::SemesterGpas => {
                        row.extend(semester_columns.iter().map(|(year, semester)| {
                            student
                                .semesters
                                .iter()
                                .find(|s| s.year == *year && s.semester == *semester)
                                .map_or(Cell::Empty, |s| Cell::Number(s.gpa))
                        }))
                    }
                    Metric::Result => row.push(Cell::Text(
                        if student.arrear_count == 0 { "PASS" } else { "FAIL" }.to_string(),
                    )),
                    Metric::ArrearCount => row.push(Cell::Count(student.arrear_count)),
                    Metric::Cgpa => row.push(Cell::Number(student.cgpa)),
                    Metric::Status => row.push(Cell::Text(student.status.to_string())),
                    Metric::Rank => row.push(Cell::Count(student.rank)),
                }
            }
            row
        })
        .collect();

    Ok(("CGPA Report".to_string(), header, rows))
}

fn semester_statistics(statistics: &CohortStatistics) -> StatisticsBlock {
    let mut block = StatisticsBlock { rows: Vec::new() };
    block.push("Total Students", Cell::Count(statistics.total_students));
    block.push("Total Subjects", Cell::Count(statistics.total_subjects));
    block.push("Passed Students", Cell::Count(statistics.passed_students));
    block.push("Pass Percentage", Cell::Count(statistics.pass_percentage as usize));
    for grade in Grade::ALL {
        let count = statistics.grade_distribution.get(&grade).copied().unwrap_or(0);
        block.push(format!("Grade {grade}"), Cell::Count(count));
    }
    for (subject, stats) in &statistics.subject_wise {
        block.push(
            format!("{subject} Pass Percentage"),
            Cell::Count(stats.pass_percentage as usize),
        );
    }
    block
}

fn cgpa_statistics(students: &[StudentAggregate]) -> StatisticsBlock {
    let mut block = StatisticsBlock { rows: Vec::new() };
    let total = students.len();
    let cleared = students.iter().filter(|s| s.arrear_count == 0).count();
    let graded: Vec<f64> = students.iter().map(|s| s.cgpa).filter(|c| *c > 0.0).collect();

    block.push("Total Students", Cell::Count(total));
    block.push(
        "Average CGPA",
        if graded.is_empty() {
            Cell::Empty
        } else {
            Cell::Number(crate::gpa::round2(graded.iter().sum::<f64>() / graded.len() as f64))
        },
    );
    let pass_percentage = if total == 0 {
        0
    } else {
        (cleared as f64 / total as f64 * 100.0).round() as usize
    };
    block.push("Pass Percentage", Cell::Count(pass_percentage));

    let mut by_status: BTreeMap<StatusLabel, usize> = BTreeMap::new();
    for student in students {
        *by_status.entry(student.status).or_insert(0) += 1;
    }
    for status in StatusLabel::ALL {
        block.push(
            format!("Status {status}"),
            Cell::Count(by_status.get(&status).copied().unwrap_or(0)),
        );
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{compute_semester_analysis, SubjectUniverse};
    use crate::grades::GradeTable;
    use crate::models::SemesterGpa;
    use uuid::Uuid;

    fn record(reg: &str, name: &str, grades: &[(&str, Grade)]) -> SemesterRecord {
        SemesterRecord {
            student_id: Uuid::new_v4(),
            registration_number: reg.to_string(),
            name: name.to_string(),
            batch: "2023".to_string(),
            department: "MECH".to_string(),
            year: 1,
            semester: 2,
            grades: grades.iter().map(|(s, g)| (s.to_string(), *g)).collect(),
        }
    }

    fn records() -> Vec<SemesterRecord> {
        vec![
            record("23ME002", "Jules Moreno", &[("ME101", Grade::A), ("ME102", Grade::U)]),
            record("23ME001", "Kiara Patel", &[("ME101", Grade::O), ("ME102", Grade::BPlus)]),
            record("23ME003", "Avery Lee", &[("ME101", Grade::C)]),
        ]
    }

    fn cohort_stats(records: &[SemesterRecord]) -> CohortStatistics {
        compute_semester_analysis(records, &GradeTable::standard(), SubjectUniverse::Union)
            .unwrap()
            .statistics
    }

    fn aggregate(
        reg: &str,
        cgpa: f64,
        rank: usize,
        semesters: Vec<SemesterGpa>,
    ) -> StudentAggregate {
        StudentAggregate {
            registration_number: reg.to_string(),
            name: format!("Student {reg}"),
            semesters,
            cgpa,
            status: StatusLabel::from_score(cgpa),
            arrear_count: 0,
            credits_earned: 20.0,
            rank,
        }
    }

    #[test]
    fn semester_report_lists_grades_with_empty_marker() {
        let records = records();
        let stats = cohort_stats(&records);
        let source = ReportSource::Semester {
            records: &records,
            statistics: &stats,
            table: &GradeTable::standard(),
        };
        let report = shape_report(
            source,
            &FieldSelection::all_for(&source),
            &ReportFilters::default(),
            ReportFormat::RowTable,
        )
        .unwrap();

        assert_eq!(
            report.header,
            vec!["Reg_No", "Student_Name", "ME101", "ME102", "Result", "Arrears"]
        );
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0][0], Cell::Text("23ME001".to_string()));
        assert_eq!(report.rows[1][3], Cell::Text("U".to_string()));
        assert_eq!(report.rows[1][4], Cell::Text("FAIL".to_string()));
        assert_eq!(report.rows[2][3], Cell::Empty);
        assert!(report.statistics.is_none());
    }

    #[test]
    fn filters_students_and_subjects() {
        let records = records();
        let stats = cohort_stats(&records);
        let source = ReportSource::Semester {
            records: &records,
            statistics: &stats,
            table: &GradeTable::standard(),
        };
        let selection = FieldSelection {
            subjects: Some(vec!["ME102".to_string()]),
            metrics: Vec::new(),
        };
        let filters = ReportFilters {
            students: Some(["23ME002".to_string(), "23ME003".to_string()].into_iter().collect()),
            sort: SortKey::Name,
        };
        let report = shape_report(source, &selection, &filters, ReportFormat::WithStats).unwrap();

        assert_eq!(report.header, vec!["Reg_No", "Student_Name", "ME102"]);
        let regs: Vec<String> = report.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(regs, vec!["23ME003", "23ME002"]);

        // statistics still describe the whole cohort, not the two filtered rows
        let block = report.statistics.unwrap();
        let total = block.rows.iter().find(|r| r.label == "Total Students").unwrap();
        assert_eq!(total.value, Cell::Count(3));
        let pass = block.rows.iter().find(|r| r.label == "Pass Percentage").unwrap();
        assert_eq!(pass.value, Cell::Count(67));
        assert!(block.rows.iter().any(|r| r.label == "Grade O" && r.value == Cell::Count(1)));
    }

    #[test]
    fn rejects_unknown_subject_and_unsupported_metric() {
        let records = records();
        let stats = cohort_stats(&records);
        let source = ReportSource::Semester {
            records: &records,
            statistics: &stats,
            table: &GradeTable::standard(),
        };
        let bad_subject = FieldSelection {
            subjects: Some(vec!["CS999".to_string()]),
            metrics: Vec::new(),
        };
        assert!(matches!(
            shape_report(source, &bad_subject, &ReportFilters::default(), ReportFormat::RowTable),
            Err(ValidationError::UnknownSubject { .. })
        ));

        let bad_metric = FieldSelection {
            subjects: None,
            metrics: vec![Metric::Cgpa],
        };
        let filters = ReportFilters::default();
        assert!(shape_report(source, &bad_metric, &filters, ReportFormat::RowTable).is_err());
    }

    #[test]
    fn cgpa_report_expands_semester_columns_in_rank_order() {
        let students = vec![
            aggregate(
                "21CS002",
                7.5,
                2,
                vec![SemesterGpa { year: 1, semester: 1, gpa: 7.5 }],
            ),
            aggregate(
                "21CS001",
                8.75,
                1,
                vec![
                    SemesterGpa { year: 1, semester: 1, gpa: 8.5 },
                    SemesterGpa { year: 1, semester: 2, gpa: 9.0 },
                ],
            ),
        ];
        let source = ReportSource::Cgpa { students: &students };
        let report = shape_report(
            source,
            &FieldSelection::all_for(&source),
            &ReportFilters::default(),
            ReportFormat::WithStats,
        )
        .unwrap();

        assert_eq!(
            report.header,
            vec![
                "Reg_No",
                "Student_Name",
                "Result",
                "Arrears",
                "Y1S1_GPA",
                "Y1S2_GPA",
                "CGPA",
                "Status",
                "Rank"
            ]
        );
        assert_eq!(report.rows[0][0], Cell::Text("21CS001".to_string()));
        assert_eq!(report.rows[0][6], Cell::Number(8.75));
        assert_eq!(report.rows[1][5], Cell::Empty);
        assert_eq!(report.rows[1][8], Cell::Count(2));

        let block = report.statistics.unwrap();
        assert!(block
            .rows
            .iter()
            .any(|r| r.label == "Status Very Good" && r.value == Cell::Count(1)));
    }

    #[test]
    fn repeated_subjects_and_metrics_produce_one_column_each() {
        let records = records();
        let stats = cohort_stats(&records);
        let source = ReportSource::Semester {
            records: &records,
            statistics: &stats,
            table: &GradeTable::standard(),
        };
        let selection = FieldSelection {
            subjects: Some(vec!["ME102".to_string(), "ME101".to_string(), "ME102".to_string()]),
            metrics: vec![Metric::Result, Metric::Result, Metric::ArrearCount],
        };
        let filters = ReportFilters::default();
        let report = shape_report(source, &selection, &filters, ReportFormat::RowTable).unwrap();
        assert_eq!(
            report.header,
            vec!["Reg_No", "Student_Name", "ME102", "ME101", "Result", "Arrears"]
        );
        assert!(report.rows.iter().all(|row| row.len() == report.header.len()));
    }

    #[test]
    fn filtered_cgpa_report_keeps_batch_ranks() {
        let students = vec![
            aggregate("21CS003", 9.1, 1, Vec::new()),
            aggregate("21CS001", 8.2, 2, Vec::new()),
            aggregate("21CS004", 7.4, 3, Vec::new()),
            aggregate("21CS002", 6.0, 4, Vec::new()),
        ];
        let source = ReportSource::Cgpa { students: &students };
        let selection = FieldSelection {
            subjects: None,
            metrics: vec![Metric::Cgpa, Metric::Rank],
        };
        let filters = ReportFilters {
            students: Some(["21CS004".to_string(), "21CS002".to_string()].into_iter().collect()),
            sort: SortKey::RegistrationNumber,
        };
        let report = shape_report(source, &selection, &filters, ReportFormat::RowTable).unwrap();

        let rows: Vec<(String, Cell)> = report
            .rows
            .iter()
            .map(|row| (row[0].to_string(), row[3].clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("21CS002".to_string(), Cell::Count(4)),
                ("21CS004".to_string(), Cell::Count(3)),
            ]
        );
    }

    #[test]
    fn empty_cells_render_as_blank_never_zero() {
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::Number(7.0).to_string(), "7.00");
        assert_eq!(serde_json::to_value(Cell::Empty).unwrap(), serde_json::Value::Null);
    }
}
