use crate::engine::{ComparisonResult, ComparisonRun};
use crate::error::{MonitorError, Result};
use crate::schema::{ColumnNames, GroupBy};
use crate::utils::{format_fixed, format_percent};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use log::debug;
use std::io;
use std::path::Path;

/// Prepended so spreadsheet tools open the file as UTF-8.
pub const UTF8_BOM: &str = "\u{FEFF}";

/// Column layout of the tabular export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLayout {
    pub group_by: GroupBy,
    pub group_column: String,
    pub period1_label: String,
    pub period2_label: String,
    pub primary_metric: Option<String>,
}

impl ExportLayout {
    pub fn for_run(run: &ComparisonRun, columns: &ColumnNames) -> Self {
        Self {
            group_by: run.group_by,
            group_column: run.group_by.column(columns).to_string(),
            period1_label: run.period1.clone(),
            period2_label: run.period2.clone(),
            primary_metric: run.primary_metric.clone(),
        }
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec![self.group_column.clone()];
        if self.group_by.shows_metadata() {
            header.push("CS Manager".to_string());
            header.push("Client".to_string());
        }
        header.extend([
            "Metric".to_string(),
            format!("Period 1 ({})", self.period1_label),
            format!("Period 2 ({})", self.period2_label),
            "% Change".to_string(),
            format!("Flag (on {})", self.primary_metric.as_deref().unwrap_or("")),
        ]);
        header
    }

    /// One record per metric. Entity-level fields are repeated on every
    /// record of the entity.
    fn records(&self, result: &ComparisonResult) -> Vec<Vec<String>> {
        result
            .metrics
            .iter()
            .map(|m| {
                let mut record = vec![result.entity_key.clone()];
                if self.group_by.shows_metadata() {
                    record.push(result.meta.manager.clone().unwrap_or_default());
                    record.push(result.meta.client.clone().unwrap_or_default());
                }
                record.extend([
                    m.metric.clone(),
                    format_fixed(m.value1, 2),
                    format_fixed(m.value2, 2),
                    format_percent(m.change_pct, 2),
                    result.flag.to_string(),
                ]);
                record
            })
            .collect()
    }
}

/// Renders the results as CSV text: BOM, every field quoted, records joined
/// by `\n` with no newline after the last one.
pub fn export_csv(results: &[ComparisonResult], layout: &ExportLayout) -> Result<String> {
    if results.is_empty() {
        return Err(MonitorError::EmptyResult {
            operation: "export".to_string(),
        });
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(layout.header())?;
    let mut record_count = 0usize;
    for result in results {
        for record in layout.records(result) {
            writer.write_record(&record)?;
            record_count += 1;
        }
    }

    let bytes = writer.into_inner().map_err(|e| MonitorError::Io(e.into_error()))?;
    let body = String::from_utf8(bytes)
        .map_err(|e| MonitorError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    debug!(
        "Exported {} records for {} entities",
        record_count,
        results.len()
    );

    let body = body.strip_suffix('\n').unwrap_or(&body);
    Ok(format!("{}{}", UTF8_BOM, body))
}

pub fn export_csv_to_path(
    results: &[ComparisonResult],
    layout: &ExportLayout,
    path: impl AsRef<Path>,
) -> Result<()> {
    let content = export_csv(results, layout)?;
    std::fs::write(path, content)?;
    Ok(())
}
