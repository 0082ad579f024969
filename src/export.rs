use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::report::{Cell, Report, StatisticsBlock};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn write_csv<W: io::Write>(report: &Report, writer: W) -> Result<(), ExportError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&report.header)?;
    for row in &report.rows {
        out.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_statistics_csv<W: io::Write>(
    block: &StatisticsBlock,
    writer: W,
) -> Result<(), ExportError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["Metric", "Value"])?;
    for row in &block.rows {
        out.write_record([row.label.clone(), row.value.to_string()])?;
    }
    out.flush()?;
    Ok(())
}

fn cell_value(cell: &Cell) -> serde_json::Value {
    serde_json::to_value(cell).unwrap_or_default()
}

pub fn to_json(report: &Report) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = report
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = report
                .header
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.clone(), cell_value(cell)))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();

    json!({
        "title": report.title,
        "generated_at": report.generated_at.to_rfc3339(),
        "columns": report.header,
        "rows": rows,
        "statistics": report.statistics.as_ref().map(|block| {
            block
                .rows
                .iter()
                .map(|row| (row.label.clone(), cell_value(&row.value)))
                .collect::<serde_json::Map<_, _>>()
        }),
    })
}

pub fn write_json<W: io::Write>(report: &Report, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, &to_json(report))?;
    Ok(())
}

// One CSV sheet per block inside `dir`.
pub fn write_workbook(
    report: &Report,
    dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let results = dir.join(format!("{stem}.csv"));
    write_csv(report, std::fs::File::create(&results)?)?;
    written.push(results);

    if let Some(block) = &report.statistics {
        let stats = dir.join(format!("{stem}_statistics.csv"));
        write_statistics_csv(block, std::fs::File::create(&stats)?)?;
        written.push(stats);
    }

    Ok(written)
}

pub fn render_markdown(report: &Report) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", report.title);
    let _ = writeln!(output, "Generated {}", report.generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Results");

    if report.rows.is_empty() {
        let _ = writeln!(output, "No students matched this selection.");
    } else {
        let _ = writeln!(output, "| {} |", report.header.join(" | "));
        let _ = writeln!(output, "|{}", "---|".repeat(report.header.len()));
        for row in &report.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Cell::Empty => "-".to_string(),
                    other => other.to_string(),
                })
                .collect();
            let _ = writeln!(output, "| {} |", cells.join(" | "));
        }
    }

    if let Some(block) = &report.statistics {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Statistics");
        for row in &block.rows {
            let value = match &row.value {
                Cell::Empty => "n/a".to_string(),
                other => other.to_string(),
            };
            let _ = writeln!(output, "- {}: {}", row.label, value);
        }
    }

    output
}

type Table = (Vec<String>, Vec<Vec<Cell>>);

pub fn read_csv_table<R: io::Read>(reader: R) -> Result<Table, ExportError> {
    let mut input = csv::Reader::from_reader(reader);
    let header: Vec<String> = input.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in input.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok((header, rows))
}
