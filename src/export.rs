use crate::extract::ExtractedRecord;
use crate::utils::sanitize_filename;
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Builds the artifact name for a download: source title, a tag telling the
/// two artifact flavours apart, and a date stamp
pub fn artifact_name(title: &str, tag: &str) -> String {
    let stamp = chrono::Local::now().format("%Y-%m-%d");
    sanitize_filename(&format!("{}({}) - {}", title, tag, stamp))
}

/// Union of record keys in first-seen order; this is the CSV header row
fn column_order(records: &[ExtractedRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Writes the records as a comma-separated file under `dir` and returns the
/// written path. Records missing a column render as empty fields.
pub fn write_csv(
    records: &[ExtractedRecord],
    dir: &Path,
    name: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(format!("{}.csv", name));
    let columns = column_order(records);

    let mut writer = csv::Writer::from_path(&path)?;
    if !columns.is_empty() {
        writer.write_record(&columns)?;
        for record in records {
            let row: Vec<String> = columns
                .iter()
                .map(|column| field_text(record.get(column)))
                .collect();
            writer.write_record(&row)?;
        }
    }
    writer.flush()?;

    ::log::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(path)
}
