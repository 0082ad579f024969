use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;

use result_analytics::export;
use result_analytics::models::group_by_student;
use result_analytics::{
    compute_cgpa_for_batch, compute_semester_analysis, shape_report, AnalysisOptions,
    AnalyticsError, DataGap, FieldSelection, Metric, MissingCreditPolicy, Report, ReportFilters,
    ReportFormat, ReportSource, SemesterKey, SortKey, SubjectUniverse,
};

mod db;

#[derive(Parser)]
#[command(name = "result-analytics")]
#[command(about = "Semester result analysis, CGPA ranking and report export", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
    Markdown,
    Workbook,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small realistic batch
    Seed,
    /// Import grades from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import subject credit hours from a CSV file
    ImportCredits {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Cohort statistics for one semester
    Analyze {
        #[arg(long)]
        batch: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        year: String,
        #[arg(long)]
        semester: String,
        #[arg(long, default_value = "union")]
        universe: SubjectUniverse,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Ranked CGPA across every semester of a batch
    Cgpa {
        #[arg(long)]
        batch: String,
        #[arg(long)]
        department: String,
        #[arg(long, default_value = "cgpa")]
        sort: SortKey,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "exclude")]
        missing_credit: MissingCreditPolicy,
        #[arg(long)]
        json: bool,
    },
    /// Write a shaped report; a semester report when --year/--semester are given, CGPA otherwise
    Export {
        #[arg(long)]
        batch: String,
        #[arg(long)]
        department: String,
        #[arg(long, requires = "semester")]
        year: Option<String>,
        #[arg(long, requires = "year")]
        semester: Option<String>,
        /// Comma separated subject codes
        #[arg(long, value_delimiter = ',')]
        subjects: Option<Vec<String>>,
        /// Comma separated registration numbers
        #[arg(long, value_delimiter = ',')]
        students: Option<Vec<String>>,
        /// Comma separated metric columns (result, arrears, semesters, cgpa, status, rank)
        #[arg(long, value_delimiter = ',')]
        metrics: Option<Vec<Metric>>,
        #[arg(long, default_value = "reg")]
        sort: SortKey,
        #[arg(long, default_value = "union")]
        universe: SubjectUniverse,
        #[arg(long, default_value = "exclude")]
        missing_credit: MissingCreditPolicy,
        #[arg(long)]
        with_stats: bool,
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,
        #[arg(long)]
        out: PathBuf,
    },
}

fn report_gaps(gaps: &[DataGap]) {
    if gaps.is_empty() {
        return;
    }
    eprintln!("{} data gaps (excluded from computation):", gaps.len());
    for gap in gaps {
        eprintln!("- {gap}");
    }
}

fn create_file(path: &Path) -> anyhow::Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

fn deliver(report: &Report, format: ExportFormat, out: &Path) -> anyhow::Result<()> {
    match format {
        ExportFormat::Csv => {
            let file = create_file(out)?;
            export::write_csv(report, file)?;
            if let Some(block) = &report.statistics {
                let stats_path = out.with_extension("statistics.csv");
                let file = create_file(&stats_path)?;
                export::write_statistics_csv(block, file)?;
            }
        }
        ExportFormat::Json => {
            let file = create_file(out)?;
            export::write_json(report, file)?;
        }
        ExportFormat::Markdown => std::fs::write(out, export::render_markdown(report))
            .with_context(|| format!("failed to write {}", out.display()))?,
        ExportFormat::Workbook => {
            let dir = out.parent().unwrap_or_else(|| Path::new("."));
            let stem = out
                .file_stem()
                .and_then(|s| s.to_str())
                .context("workbook --out needs a file name")?;
            for path in export::write_workbook(report, dir, stem)? {
                log::info!("wrote sheet {}", path.display());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the result store Postgres")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Imported {inserted} grades from {}.", csv.display());
        }
        Commands::ImportCredits { csv } => {
            let inserted = db::import_credits_csv(&pool, &csv).await?;
            println!("Imported {inserted} credit entries from {}.", csv.display());
        }
        Commands::Analyze {
            batch,
            department,
            year,
            semester,
            universe,
            limit,
            json,
        } => {
            let key = SemesterKey::parse(&batch, &department, &year, &semester)?;
            let options = AnalysisOptions {
                universe,
                ..AnalysisOptions::default()
            };
            let records = db::fetch_semester_records(&pool, &key).await?;
            if records.is_empty() {
                return Err(AnalyticsError::EmptyInput { scope: key.to_string() }.into());
            }

            let analysis =
                compute_semester_analysis(&records, &options.grade_table, options.universe)?;
            report_gaps(&analysis.gaps);
            let stats = &analysis.statistics;

            if json {
                println!("{}", serde_json::to_string_pretty(stats)?);
                return Ok(());
            }

            println!(
                "{}: {} students, {} subjects, {}% passed",
                key, stats.total_students, stats.total_subjects, stats.pass_percentage
            );
            println!("Grade distribution:");
            for (grade, count) in &stats.grade_distribution {
                println!("- {grade}: {count}");
            }
            println!("Top performers:");
            for top in stats.top_performers.iter().take(limit) {
                println!(
                    "- {} ({}) {} of {} excellent",
                    top.name, top.registration_number, top.excellent_count, top.graded_count
                );
            }
            println!("Needs attention:");
            for entry in stats.needs_attention.iter().take(limit) {
                println!(
                    "- {} ({}) failing {}",
                    entry.name,
                    entry.registration_number,
                    entry.failing_subjects.join(", ")
                );
            }
        }
        Commands::Cgpa {
            batch,
            department,
            sort,
            limit,
            missing_credit,
            json,
        } => {
            let options = AnalysisOptions {
                missing_credit,
                ..AnalysisOptions::default()
            };
            let records = db::fetch_batch_records(&pool, &batch, &department).await?;
            if records.is_empty() {
                return Err(AnalyticsError::EmptyInput {
                    scope: format!("batch {batch} / {department}"),
                }
                .into());
            }
            let credits = options.credits(db::fetch_credit_map(&pool, &batch).await?)?;
            if credits.is_empty() {
                log::warn!("credit table for batch {batch} is empty");
            }
            log::debug!("credit table for batch {batch}: {} subjects", credits.len());
            let histories = group_by_student(records);
            let result = compute_cgpa_for_batch(&histories, &credits, &options.grade_table, sort)?;
            report_gaps(&result.gaps);

            if json {
                println!("{}", serde_json::to_string_pretty(&result.students)?);
                return Ok(());
            }

            println!("Students by {sort:?}:");
            for student in result.students.iter().take(limit) {
                println!(
                    "{:>3}. {} ({}) CGPA {:.2} {} across {} semesters",
                    student.rank,
                    student.name,
                    student.registration_number,
                    student.cgpa,
                    student.status,
                    student.semesters.len()
                );
            }
        }
        Commands::Export {
            batch,
            department,
            year,
            semester,
            subjects,
            students,
            metrics,
            sort,
            universe,
            missing_credit,
            with_stats,
            format,
            out,
        } => {
            let options = AnalysisOptions {
                grade_table: Default::default(),
                missing_credit,
                universe,
            };
            let filters = ReportFilters {
                students: students.map(|regs| regs.into_iter().collect::<BTreeSet<_>>()),
                sort,
            };
            let report_format = if with_stats {
                ReportFormat::WithStats
            } else {
                ReportFormat::RowTable
            };

            let report = match (year, semester) {
                (Some(year), Some(semester)) => {
                    let key = SemesterKey::parse(&batch, &department, &year, &semester)?;
                    let records = db::fetch_semester_records(&pool, &key).await?;
                    if records.is_empty() {
                        return Err(AnalyticsError::EmptyInput { scope: key.to_string() }.into());
                    }
                    let analysis =
                compute_semester_analysis(&records, &options.grade_table, options.universe)?;
                    report_gaps(&analysis.gaps);
                    let source = ReportSource::Semester {
                        records: &records,
                        statistics: &analysis.statistics,
                        table: &options.grade_table,
                    };
                    let selection = FieldSelection {
                        subjects,
                        metrics: metrics
                            .unwrap_or_else(|| FieldSelection::all_for(&source).metrics),
                    };
                    shape_report(source, &selection, &filters, report_format)?
                }
                _ => {
                    let records = db::fetch_batch_records(&pool, &batch, &department).await?;
                    if records.is_empty() {
                        return Err(AnalyticsError::EmptyInput {
                            scope: format!("batch {batch} / {department}"),
                        }
                        .into());
                    }
                    let credits = options.credits(db::fetch_credit_map(&pool, &batch).await?)?;
                    let result = compute_cgpa_for_batch(
                        &group_by_student(records),
                        &credits,
                        &options.grade_table,
                        SortKey::Cgpa,
                    )?;
                    report_gaps(&result.gaps);
                    let source = ReportSource::Cgpa {
                        students: &result.students,
                    };
                    let selection = FieldSelection {
                        subjects,
                        metrics: metrics
                            .unwrap_or_else(|| FieldSelection::all_for(&source).metrics),
                    };
                    shape_report(source, &selection, &filters, report_format)?
                }
            };

            deliver(&report, format, &out)?;
            println!("Report written to {} ({} rows).", out.display(), report.rows.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_report() -> Report {
        Report {
            title: "CGPA Report".to_string(),
            generated_at: chrono::Utc::now(),
            header: vec!["Reg_No".to_string(), "Student_Name".to_string()],
            rows: Vec::new(),
            statistics: None,
        }
    }

    #[test]
    fn markdown_delivery_names_the_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing").join("report.md");
        let err = deliver(&empty_report(), ExportFormat::Markdown, &out).unwrap_err();
        assert!(err.to_string().contains("failed to write"));
        assert!(err.to_string().contains("report.md"));
    }

    #[test]
    fn markdown_delivery_writes_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.md");
        deliver(&empty_report(), ExportFormat::Markdown, &out).unwrap();
        let written = std::fs::read_to_string(out).unwrap();
        assert!(written.starts_with("# CGPA Report"));
    }
}
