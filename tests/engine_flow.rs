use std::collections::BTreeMap;

use result_analytics::export::{read_csv_table, write_csv};
use result_analytics::models::group_by_student;
use result_analytics::report::Cell;
use result_analytics::{
    compute_cgpa_for_batch, compute_semester_analysis, shape_report, AnalysisOptions,
    AnalyticsError, CreditMap, FieldSelection, RawSemesterRecord, ReportFilters, ReportFormat,
    ReportSource, SortKey, StatusLabel, ValidationError,
};
use uuid::Uuid;

fn raw(reg: &str, name: &str, semester: u32, grades: &[(&str, &str)]) -> RawSemesterRecord {
    RawSemesterRecord {
        student_id: Uuid::new_v4(),
        registration_number: reg.to_string(),
        name: name.to_string(),
        batch: "2022".to_string(),
        department: "CSE".to_string(),
        year: 1,
        semester,
        grades: grades
            .iter()
            .map(|(subject, grade)| (subject.to_string(), grade.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn credits() -> CreditMap {
    CreditMap::from_entries([
        ("MA101", 4.0),
        ("PH101", 3.0),
        ("CS101", 3.0),
        ("MA102", 4.0),
        ("CS102", 4.0),
    ])
    .unwrap()
}

#[test]
fn invalid_grade_is_rejected_before_any_statistics() {
    let err = raw("22CS001", "Avery Lee", 1, &[("MA101", "A"), ("PH101", "X")])
        .validate()
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnknownGrade { ref subject, .. } if subject == "PH101"));
}

#[test]
fn semester_analysis_to_csv_and_back() {
    let records: Vec<_> = vec![
        raw("22CS001", "Avery Lee", 1, &[("MA101", "O"), ("PH101", "A+"), ("CS101", "A")]),
        raw("22CS002", "Jules Moreno", 1, &[("MA101", "B"), ("PH101", "RA"), ("CS101", "C")]),
        raw("22CS003", "Kiara Patel", 1, &[("MA101", "A"), ("PH101", "B+"), ("CS101", "")]),
        raw("22CS004", "Rohan Iyer", 1, &[("MA101", "P"), ("PH101", "B"), ("CS101", "C")]),
    ]
    .into_iter()
    .map(|r| r.validate().unwrap())
    .collect();

    let options = AnalysisOptions::default();
    let analysis =
        compute_semester_analysis(&records, &options.grade_table, options.universe).unwrap();
    assert_eq!(analysis.statistics.pass_percentage, 75);
    assert_eq!(analysis.statistics.needs_attention[0].registration_number, "22CS002");
    // 22CS003 carries no CS101 grade
    assert_eq!(analysis.gaps.len(), 1);

    let source = ReportSource::Semester {
        records: &records,
        statistics: &analysis.statistics,
        table: &options.grade_table,
    };
    let report = shape_report(
        source,
        &FieldSelection::all_for(&source),
        &ReportFilters::default(),
        ReportFormat::WithStats,
    )
    .unwrap();

    let mut buffer = Vec::new();
    write_csv(&report, &mut buffer).unwrap();
    let (header, rows) = read_csv_table(buffer.as_slice()).unwrap();
    assert_eq!(&header[..2], ["Reg_No", "Student_Name"]);

    for record in &records {
        let row = rows
            .iter()
            .find(|row| row[0] == Cell::Text(record.registration_number.clone()))
            .unwrap();
        for (column, cell) in header.iter().zip(row) {
            if let Some(grade) = record.grades.get(column) {
                assert_eq!(cell, &Cell::Text(grade.to_string()));
            } else if records[0].grades.contains_key(column) {
                assert_eq!(cell, &Cell::Empty);
            }
        }
    }
}

#[test]
fn cgpa_pipeline_ranks_and_labels_students() {
    let records: Vec<_> = vec![
        raw("22CS002", "Jules Moreno", 1, &[("MA101", "A"), ("PH101", "A"), ("CS101", "A")]),
        raw("22CS001", "Avery Lee", 1, &[("MA101", "O"), ("PH101", "O"), ("CS101", "O")]),
        raw("22CS001", "Avery Lee", 2, &[("MA102", "A+"), ("CS102", "A+")]),
        raw("22CS002", "Jules Moreno", 2, &[("MA102", "A"), ("CS102", "A")]),
        raw("22CS003", "Kiara Patel", 1, &[("MA101", "A"), ("PH101", "A"), ("CS101", "A")]),
        raw("22CS003", "Kiara Patel", 2, &[("ZZ999", "O")]),
    ]
    .into_iter()
    .map(|r| r.validate().unwrap())
    .collect();

    let options = AnalysisOptions::default();
    let batch = compute_cgpa_for_batch(
        &group_by_student(records),
        &options.credits(credits()).unwrap(),
        &options.grade_table,
        SortKey::Cgpa,
    )
    .unwrap();

    let summary: Vec<(&str, f64, usize, StatusLabel)> = batch
        .students
        .iter()
        .map(|s| (s.registration_number.as_str(), s.cgpa, s.rank, s.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("22CS001", 9.5, 1, StatusLabel::Excellent),
            ("22CS002", 8.0, 2, StatusLabel::VeryGood),
            ("22CS003", 8.0, 3, StatusLabel::VeryGood),
        ]
    );
    // 22CS003's second semester has no creditable subject
    assert_eq!(batch.gaps.len(), 2);
}

#[test]
fn empty_cohort_is_distinct_from_zero_scores() {
    let options = AnalysisOptions::default();
    let err = compute_semester_analysis(&[], &options.grade_table, options.universe).unwrap_err();
    assert!(matches!(err, AnalyticsError::EmptyInput { .. }));
}
