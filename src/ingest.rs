// 📥 CSV Adapters - Platform exports in, compiled donor file out

use crate::engine::Resolution;
use crate::record::{Dataset, PlatformRecord, Row};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Load one platform export; every header becomes a column, blank cells
/// are kept as empty strings
pub fn load_dataset(file_path: &Path, platform: &str) -> Result<Dataset> {
    use csv::ReaderBuilder;
    use std::fs::File;

    let file = File::open(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV headers in {}", file_path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut dataset = Dataset::new(platform, headers.clone());

    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!(
                "Failed to parse CSV line {} in {}",
                line_num + 2,
                file_path.display()
            )
        })?;

        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        dataset.push_row(row);
    }

    Ok(dataset)
}

// ============================================================================
// OUTPUT
// ============================================================================

/// One line of the compiled file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRow {
    #[serde(rename = "Relationship ID")]
    pub relationship_id: String,

    #[serde(rename = "Giving Platform")]
    pub platform: String,

    #[serde(rename = "Transaction ID")]
    pub transaction_id: String,

    #[serde(rename = "Date")]
    pub date: String,

    #[serde(rename = "Amount")]
    pub amount: String,

    #[serde(rename = "Unique Transaction")]
    pub unique_transaction: String,

    #[serde(rename = "Duplicate")]
    pub duplicate: String,
}

impl ResolvedRow {
    pub fn from_record(record: &PlatformRecord) -> Self {
        ResolvedRow {
            relationship_id: record.relationship_id.clone(),
            platform: record.platform_name.clone(),
            transaction_id: record.row_id.clone(),
            date: record
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            amount: record.amount(),
            unique_transaction: unique_transaction_cell(record),
            duplicate: record
                .duplicate_flag
                .map(|f| f.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Base rows carry their own signature; other rows every signature they
/// matched, joined with '|'
fn unique_transaction_cell(record: &PlatformRecord) -> String {
    match &record.unique_transaction_signature {
        Some(signature) => signature.to_string(),
        None => record
            .matched_signatures
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("|"),
    }
}

/// Write every resolved record, base platform first
pub fn write_resolution(file_path: &Path, resolution: &Resolution) -> Result<usize> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Failed to create file: {}", file_path.display()))?;

    let mut written = 0;
    for record in resolution.records() {
        writer
            .serialize(ResolvedRow::from_record(record))
            .context("Failed to write resolved row")?;
        written += 1;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", file_path.display()))?;
    Ok(written)
}

/// Relationship IDs from a compiled file: the named column, else the first
pub fn read_relationship_ids(file_path: &Path, column: Option<&str>) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

    let index = match column {
        Some(name) => reader
            .headers()?
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("Column '{}' not found in {}", name, file_path.display()))?,
        None => 0,
    };

    let mut ids = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;
        ids.push(record.get(index).unwrap_or("").to_string());
    }

    Ok(ids)
}

// ============================================================================
// TESTS
// ============================================================================
