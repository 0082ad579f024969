use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use result_analytics::{CreditMap, Grade, RawSemesterRecord, SemesterKey, SemesterRecord};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const SEED_STUDENTS: [(&str, &str, &str); 4] = [
    ("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2", "22CS001", "Avery Lee"),
    ("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc", "22CS002", "Jules Moreno"),
    ("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2", "22CS003", "Kiara Patel"),
    ("7b1e0c9a-5f2d-4c7e-9a31-2d8f6b0e4c15", "22CS004", "Rohan Iyer"),
];

const SEED_CREDITS: [(&str, f64); 6] = [
    ("MA101", 4.0),
    ("PH101", 3.0),
    ("CS101", 3.0),
    ("MA102", 4.0),
    ("CS102", 4.0),
    ("EE102", 3.0),
];

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let batch = "2022";
    let department = "CSE";
    let mut tx = pool.begin().await?;

    for (id, registration_number, name) in SEED_STUDENTS {
        sqlx::query(
            r#"
            INSERT INTO result_analytics.students
            (id, registration_number, full_name, batch, department)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (batch, registration_number) DO UPDATE
            SET full_name = EXCLUDED.full_name, department = EXCLUDED.department
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(registration_number)
        .bind(name)
        .bind(batch)
        .bind(department)
        .execute(&mut *tx)
        .await?;
    }

    for (subject, hours) in SEED_CREDITS {
        upsert_credit(&mut tx, batch, subject, hours).await?;
    }

    let grades: [(&str, u32, &str, &str); 24] = [
        ("22CS001", 1, "MA101", "O"),
        ("22CS001", 1, "PH101", "A+"),
        ("22CS001", 1, "CS101", "A"),
        ("22CS002", 1, "MA101", "B"),
        ("22CS002", 1, "PH101", "RA"),
        ("22CS002", 1, "CS101", "C"),
        ("22CS003", 1, "MA101", "A"),
        ("22CS003", 1, "PH101", "B+"),
        ("22CS003", 1, "CS101", "B+"),
        ("22CS004", 1, "MA101", "U"),
        ("22CS004", 1, "PH101", "UA"),
        ("22CS004", 1, "CS101", "P"),
        ("22CS001", 2, "MA102", "A+"),
        ("22CS001", 2, "CS102", "O"),
        ("22CS001", 2, "EE102", "A"),
        ("22CS002", 2, "MA102", "B+"),
        ("22CS002", 2, "CS102", "B"),
        ("22CS002", 2, "EE102", "B"),
        ("22CS003", 2, "MA102", "A"),
        ("22CS003", 2, "CS102", "A"),
        ("22CS003", 2, "EE102", "B+"),
        ("22CS004", 2, "MA102", "C"),
        ("22CS004", 2, "CS102", "RA"),
        ("22CS004", 2, "EE102", "P"),
    ];

    for (registration_number, semester, subject, grade) in grades {
        let student_id: Uuid = sqlx::query(
            r#"
            SELECT id FROM result_analytics.students
            WHERE batch = $1 AND registration_number = $2
            "#,
        )
        .bind(batch)
        .bind(registration_number)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let grade = grade.parse::<Grade>()?;
        upsert_grade(&mut tx, student_id, 1, semester, subject, grade).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn upsert_credit(
    conn: &mut PgConnection,
    batch: &str,
    subject: &str,
    hours: f64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO result_analytics.subject_credits (batch, subject_code, credit_hours)
        VALUES ($1, $2, $3)
        ON CONFLICT (batch, subject_code) DO UPDATE SET credit_hours = EXCLUDED.credit_hours
        "#,
    )
    .bind(batch)
    .bind(subject)
    .bind(hours)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_grade(
    conn: &mut PgConnection,
    student_id: Uuid,
    year: u32,
    semester: u32,
    subject: &str,
    grade: Grade,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO result_analytics.semester_grades
        (id, student_id, year_number, semester_number, subject_code, grade)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, year_number, semester_number, subject_code) DO UPDATE
        SET grade = EXCLUDED.grade
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(i32::try_from(year)?)
    .bind(i32::try_from(semester)?)
    .bind(subject)
    .bind(grade.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

const RECORD_COLUMNS: &str = "SELECT st.id AS student_id, st.registration_number, \
     st.full_name, st.batch, st.department, \
     g.year_number, g.semester_number, g.subject_code, g.grade \
     FROM result_analytics.semester_grades g \
     JOIN result_analytics.students st ON st.id = g.student_id \
     WHERE st.batch = $1 AND st.department = $2";

// One row per (student, semester, subject), validated on the way out of the store.
fn rows_to_records(rows: Vec<PgRow>) -> anyhow::Result<Vec<SemesterRecord>> {
    let mut raw: Vec<RawSemesterRecord> = Vec::new();
    let mut index: HashMap<(Uuid, i32, i32), usize> = HashMap::new();

    for row in rows {
        let student_id: Uuid = row.get("student_id");
        let year: i32 = row.get("year_number");
        let semester: i32 = row.get("semester_number");
        let subject: String = row.get("subject_code");
        let grade: String = row.get("grade");

        let position = match index.get(&(student_id, year, semester)) {
            Some(&position) => position,
            None => {
                raw.push(RawSemesterRecord {
                    student_id,
                    registration_number: row.get("registration_number"),
                    name: row.get("full_name"),
                    batch: row.get("batch"),
                    department: row.get("department"),
                    year: u32::try_from(year).context("negative year_number in store")?,
                    semester: u32::try_from(semester).context("negative semester_number in store")?,
                    grades: BTreeMap::new(),
                });
                index.insert((student_id, year, semester), raw.len() - 1);
                raw.len() - 1
            }
        };
        raw[position].grades.insert(subject, grade);
    }

    raw.into_iter()
        .map(|record| record.validate().context("invalid record in result store"))
        .collect()
}

pub async fn fetch_semester_records(
    pool: &PgPool,
    key: &SemesterKey,
) -> anyhow::Result<Vec<SemesterRecord>> {
    let query = format!(
        "{RECORD_COLUMNS} AND g.year_number = $3 AND g.semester_number = $4 \
         ORDER BY st.registration_number, g.subject_code"
    );
    let rows = sqlx::query(&query)
        .bind(&key.batch)
        .bind(&key.department)
        .bind(i32::try_from(key.year)?)
        .bind(i32::try_from(key.semester)?)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch records for {key}"))?;

    rows_to_records(rows)
}

pub async fn fetch_batch_records(
    pool: &PgPool,
    batch: &str,
    department: &str,
) -> anyhow::Result<Vec<SemesterRecord>> {
    let query = format!(
        "{RECORD_COLUMNS} ORDER BY st.registration_number, \
         g.year_number, g.semester_number, g.subject_code"
    );
    let rows = sqlx::query(&query)
        .bind(batch)
        .bind(department)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch records for batch {batch} / {department}"))?;

    rows_to_records(rows)
}

pub async fn fetch_credit_map(pool: &PgPool, batch: &str) -> anyhow::Result<CreditMap> {
    let rows = sqlx::query(
        "SELECT subject_code, credit_hours FROM result_analytics.subject_credits WHERE batch = $1",
    )
    .bind(batch)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch credit table for batch {batch}"))?;

    let entries = rows
        .into_iter()
        .map(|row| (row.get::<String, _>("subject_code"), row.get::<f64, _>("credit_hours")));
    Ok(CreditMap::from_entries(entries)?)
}

#[derive(Debug, serde::Deserialize)]
struct GradeRow {
    registration_number: String,
    full_name: String,
    batch: String,
    department: String,
    year: u32,
    semester: u32,
    subject_code: String,
    grade: String,
}

fn term_number(field: &str, value: u32) -> anyhow::Result<i32> {
    match i32::try_from(value) {
        Ok(number) if number > 0 => Ok(number),
        _ => anyhow::bail!("{field} must be a positive number, got {value}"),
    }
}

// Blank grades mean "not recorded" and yield `None`.
fn check_grade_row(line: usize, row: &GradeRow) -> anyhow::Result<Option<Grade>> {
    if row.registration_number.trim().is_empty() {
        anyhow::bail!("row {line}: missing registration number");
    }
    if row.subject_code.trim().is_empty() {
        anyhow::bail!("row {line}: {} has a blank subject code", row.registration_number);
    }
    term_number("year", row.year).with_context(|| format!("row {line}"))?;
    term_number("semester", row.semester).with_context(|| format!("row {line}"))?;
    if row.grade.trim().is_empty() {
        return Ok(None);
    }
    let grade = row.grade.parse::<Grade>().with_context(|| {
        format!("row {line}: {} {}", row.registration_number, row.subject_code)
    })?;
    Ok(Some(grade))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<GradeRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("row {line}"))?;
        if let Some(grade) = check_grade_row(line, &row)? {
            rows.push((row, grade));
        }
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    for (row, grade) in rows {
        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO result_analytics.students
            (id, registration_number, full_name, batch, department)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (batch, registration_number) DO UPDATE
            SET full_name = EXCLUDED.full_name, department = EXCLUDED.department
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.registration_number.trim())
        .bind(&row.full_name)
        .bind(&row.batch)
        .bind(&row.department)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let subject = row.subject_code.trim();
        if upsert_grade(&mut tx, student_id, row.year, row.semester, subject, grade).await? > 0 {
            inserted += 1;
        }
    }
    tx.commit().await?;

    Ok(inserted)
}

pub async fn import_credits_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        batch: String,
        subject_code: String,
        credit_hours: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        // Rejects negative or non-finite hours with the subject named.
        CreditMap::new().insert(row.subject_code.clone(), row.credit_hours)?;
        rows.push(row);
    }

    let mut tx = pool.begin().await?;
    for row in &rows {
        upsert_credit(&mut tx, &row.batch, &row.subject_code, row.credit_hours).await?;
    }
    tx.commit().await?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: u32, semester: u32, subject: &str, grade: &str) -> GradeRow {
        GradeRow {
            registration_number: "22CS001".to_string(),
            full_name: "Avery Lee".to_string(),
            batch: "2022".to_string(),
            department: "CSE".to_string(),
            year,
            semester,
            subject_code: subject.to_string(),
            grade: grade.to_string(),
        }
    }

    #[test]
    fn accepts_valid_rows_and_skips_blank_grades() {
        assert_eq!(check_grade_row(2, &row(1, 2, "MA101", "A+")).unwrap(), Some(Grade::APlus));
        assert_eq!(check_grade_row(3, &row(1, 2, "MA101", " ")).unwrap(), None);
    }

    #[test]
    fn rejects_rows_the_store_would_refuse() {
        for bad in [
            row(0, 1, "MA101", "A"),
            row(1, 0, "MA101", "A"),
            row(1, u32::MAX, "MA101", "A"),
            row(1, 1, "  ", "A"),
            row(1, 1, "MA101", "X"),
        ] {
            assert!(check_grade_row(4, &bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn zero_year_is_rejected_even_without_a_grade() {
        let err = check_grade_row(5, &row(0, 1, "MA101", "")).unwrap_err();
        assert!(format!("{err:#}").contains("row 5"));
    }
}
