use crate::error::{MonitorError, Result};
use crate::schema::{RawRow, Value};
use csv::ReaderBuilder;
use log::debug;
use regex::Regex;
use std::io;
use std::path::Path;

/// Plain decimal or scientific literals become numbers; thousands separators,
/// currency signs, `inf` and `NaN` stay text.
const NUMERIC_LITERAL: &str = r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$";

/// Converts one cell into a typed value.
pub struct CellTyper {
    numeric: Regex,
}

impl CellTyper {
    pub fn new() -> Result<Self> {
        let numeric = Regex::new(NUMERIC_LITERAL)
            .map_err(|e| MonitorError::InvalidConfig(format!("numeric literal pattern: {}", e)))?;
        Ok(Self { numeric })
    }

    pub fn type_cell(&self, raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Empty;
        }
        if self.numeric.is_match(raw) {
            if let Ok(n) = raw.trim().parse::<f64>() {
                return Value::Number(n);
            }
        }
        Value::Text(raw.to_string())
    }
}

/// Reads CSV with a header row. Blank lines and records whose cells are all
/// empty are skipped; short records only carry the columns they have.
pub fn read_rows<R: io::Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{FEFF}').to_string())
        .collect();

    let typer = CellTyper::new()?;
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for record in rdr.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            skipped += 1;
            continue;
        }

        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.clone(), typer.type_cell(cell)))
            .collect();
        rows.push(row);
    }

    debug!(
        "Parsed {} rows with {} columns ({} blank records skipped)",
        rows.len(),
        headers.len(),
        skipped
    );

    Ok(rows)
}

pub fn parse_rows(text: &str) -> Result<Vec<RawRow>> {
    read_rows(text.as_bytes())
}

pub fn read_rows_from_path(path: impl AsRef<Path>) -> Result<Vec<RawRow>> {
    let file = std::fs::File::open(path)?;
    read_rows(io::BufReader::new(file))
}
