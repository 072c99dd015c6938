//! Flat CSV export and import of the score and Socratic tables.
//!
//! Layouts:
//! - scores: `student_id,attempt,<element columns in taxonomy order>`
//! - Socratic long: `student_id,attempt,metric_name,value`
//! - Socratic wide: `student_id,attempt,<metric columns>`
//!
//! Missing cells are written as empty fields and read back as absent.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use insights_core::model::{ScoreRecord, ScoreTable, SocraticLong, SocraticRecord, SocraticWide, WideRow};
use insights_core::taxonomy::Taxonomy;

pub const SCORES_FILE: &str = "scores.csv";
pub const SOCRATIC_LONG_FILE: &str = "socratic_long.csv";
pub const SOCRATIC_WIDE_FILE: &str = "socratic_wide.csv";

const KEY_COLUMNS: [&str; 2] = ["student_id", "attempt"];

fn fmt_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the score table in wide layout.
pub fn write_scores<W: Write>(table: &ScoreTable, writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    let mut header: Vec<&str> = KEY_COLUMNS.to_vec();
    header.extend(table.taxonomy().elements());
    w.write_record(&header)?;

    for row in table.rows() {
        let mut record = vec![row.student_id.clone(), row.attempt.to_string()];
        record.extend(row.scores.iter().map(|&s| fmt_value(s)));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Write the long Socratic table.
pub fn write_socratic_long<W: Write>(table: &SocraticLong, writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["student_id", "attempt", "metric_name", "value"])?;
    for r in table.records() {
        w.write_record([
            r.student_id.as_str(),
            &r.attempt.to_string(),
            r.metric.as_str(),
            &r.value.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Write the wide Socratic table.
pub fn write_socratic_wide<W: Write>(table: &SocraticWide, writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    let mut header: Vec<&str> = KEY_COLUMNS.to_vec();
    header.extend(table.metrics().iter().map(String::as_str));
    w.write_record(&header)?;
    for row in table.rows() {
        let mut record = vec![row.student_id.clone(), row.attempt.to_string()];
        record.extend(row.values.iter().map(|&v| fmt_value(v)));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

fn check_key_columns(headers: &csv::StringRecord) -> Result<()> {
    for (i, expected) in KEY_COLUMNS.iter().enumerate() {
        match headers.get(i) {
            Some(h) if h.trim() == *expected => {}
            Some(h) => bail!("column {} must be '{expected}', found '{h}'", i + 1),
            None => bail!("missing '{expected}' column"),
        }
    }
    Ok(())
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn parse_key(record: &csv::StringRecord) -> Result<(String, u32)> {
    let line = line_of(record);
    let student = record.get(0).unwrap_or_default().trim().to_string();
    if student.is_empty() {
        bail!("line {line}: empty student_id");
    }
    let attempt = record
        .get(1)
        .unwrap_or_default()
        .trim()
        .parse::<u32>()
        .with_context(|| format!("line {line}: attempt is not a positive integer"))?;
    Ok((student, attempt))
}

fn parse_cell(record: &csv::StringRecord, index: usize, column: &str) -> Result<Option<f64>> {
    let raw = record.get(index).unwrap_or_default().trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .with_context(|| format!("line {}: column '{column}' is not a number: {raw}", line_of(record)))?;
    if !value.is_finite() {
        bail!("line {}: column '{column}' is not finite", line_of(record));
    }
    Ok(Some(value))
}

/// Read a score table. Element columns are mapped through `taxonomy`;
/// unknown columns are an error, missing element columns are allowed.
pub fn read_scores<R: Read>(reader: R, taxonomy: &Taxonomy) -> Result<ScoreTable> {
    let mut r = csv::Reader::from_reader(reader);
    let headers = r.headers().context("failed to read CSV header")?.clone();
    check_key_columns(&headers)?;

    let columns: Vec<String> = headers.iter().skip(2).map(|h| h.trim().to_string()).collect();
    if let Some(unknown) = columns.iter().find(|c| taxonomy.element_index(c).is_none()) {
        bail!("unknown element column '{unknown}' for this taxonomy");
    }
    if let Some((i, repeated)) = columns
        .iter()
        .enumerate()
        .find(|(i, c)| columns[..*i].contains(*c))
    {
        bail!("column '{repeated}' appears twice (position {})", i + 3);
    }
    let declared = taxonomy.element_count();
    if columns.len() < declared {
        tracing::warn!(present = columns.len(), declared, "score CSV lacks some element columns");
    }

    let mut records = Vec::new();
    for row in r.records() {
        let row = row.context("malformed CSV row")?;
        let (student_id, attempt) = parse_key(&row)?;
        for (i, column) in columns.iter().enumerate() {
            if let Some(score) = parse_cell(&row, i + 2, column)? {
                records.push(ScoreRecord {
                    student_id: student_id.clone(),
                    attempt,
                    element: column.clone(),
                    score,
                });
            }
        }
    }

    Ok(ScoreTable::from_records(taxonomy.clone(), records)?)
}

/// Read a long Socratic table.
pub fn read_socratic_long<R: Read>(reader: R) -> Result<SocraticLong> {
    let mut r = csv::Reader::from_reader(reader);
    let headers = r.headers().context("failed to read CSV header")?.clone();
    check_key_columns(&headers)?;
    let expected = ["metric_name", "value"];
    let rest: Vec<&str> = headers.iter().skip(2).map(str::trim).collect();
    if rest != expected {
        bail!("expected columns metric_name,value after the key columns, found {rest:?}");
    }

    let mut records = Vec::new();
    for row in r.records() {
        let row = row.context("malformed CSV row")?;
        let (student_id, attempt) = parse_key(&row)?;
        let metric = row.get(2).unwrap_or_default().trim().to_string();
        let Some(value) = parse_cell(&row, 3, &metric)? else {
            continue;
        };
        records.push(SocraticRecord {
            student_id,
            attempt,
            metric,
            value,
        });
    }

    Ok(SocraticLong::new(Vec::new(), records)?)
}

/// Read a wide Socratic table.
pub fn read_socratic_wide<R: Read>(reader: R) -> Result<SocraticWide> {
    let mut r = csv::Reader::from_reader(reader);
    let headers = r.headers().context("failed to read CSV header")?.clone();
    check_key_columns(&headers)?;
    let metrics: Vec<String> = headers.iter().skip(2).map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for row in r.records() {
        let row = row.context("malformed CSV row")?;
        let (student_id, attempt) = parse_key(&row)?;
        let values = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| parse_cell(&row, i + 2, m))
            .collect::<Result<Vec<_>>>()?;
        rows.push(WideRow {
            student_id,
            attempt,
            values,
        });
    }

    Ok(SocraticWide::new(metrics, rows)?)
}

fn create(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Write the three tables into `dir`, returning the written paths.
pub fn write_all(dir: &Path, scores: &ScoreTable, socratic: &SocraticLong) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let scores_path = dir.join(SCORES_FILE);
    write_scores(scores, create(&scores_path)?)
        .with_context(|| format!("failed to write {}", scores_path.display()))?;

    let long_path = dir.join(SOCRATIC_LONG_FILE);
    write_socratic_long(socratic, create(&long_path)?)
        .with_context(|| format!("failed to write {}", long_path.display()))?;

    let wide_path = dir.join(SOCRATIC_WIDE_FILE);
    write_socratic_wide(&socratic.pivot(), create(&wide_path)?)
        .with_context(|| format!("failed to write {}", wide_path.display()))?;

    Ok(vec![scores_path, long_path, wide_path])
}

/// Read a score CSV file.
pub fn read_scores_file(path: &Path, taxonomy: &Taxonomy) -> Result<ScoreTable> {
    read_scores(open(path)?, taxonomy).with_context(|| format!("failed to read {}", path.display()))
}

/// Read a Socratic CSV file in either layout, detected from the header.
pub fn read_socratic_file(path: &Path) -> Result<SocraticLong> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let header = content.lines().next().unwrap_or_default();
    let is_long = header.split(',').nth(2).map(str::trim) == Some("metric_name");
    let table = if is_long {
        read_socratic_long(content.as_bytes())
    } else {
        read_socratic_wide(content.as_bytes()).map(|wide| wide.melt())
    };
    table.with_context(|| format!("failed to read {}", path.display()))
}
