// 📐 Schema Validation - Datasets must expose what their descriptor names
// Missing fields are fatal; bad cells are only counted.

use crate::error::ResolutionError;
use crate::platform::Platform;
use crate::record::{normalize_key, parse_amount_cents, parse_date, Dataset};
use serde::{Deserialize, Serialize};

// ============================================================================
// DATA QUALITY COUNTERS
// ============================================================================

/// Row-level problems absorbed as absent values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityCounters {
    pub rows: usize,

    /// Date cell present but not a recognizable date
    pub unparsable_dates: usize,

    /// Date cell empty or missing
    pub missing_dates: usize,

    /// Amount cell empty, missing or unparsable (treated as zero)
    pub missing_amounts: usize,

    /// Neither link key present
    pub rows_without_keys: usize,
}

impl DataQualityCounters {
    pub fn add(&mut self, other: &DataQualityCounters) {
        self.rows += other.rows;
        self.unparsable_dates += other.unparsable_dates;
        self.missing_dates += other.missing_dates;
        self.missing_amounts += other.missing_amounts;
        self.rows_without_keys += other.rows_without_keys;
    }

    pub fn has_issues(&self) -> bool {
        self.unparsable_dates + self.missing_dates + self.missing_amounts + self.rows_without_keys
            > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} unparsable dates, {} missing dates, {} missing amounts, {} without keys",
            self.rows,
            self.unparsable_dates,
            self.missing_dates,
            self.missing_amounts,
            self.rows_without_keys
        )
    }
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator
    }

    /// Every field the descriptor references must be a dataset column
    pub fn validate_fields(
        &self,
        platform: &Platform,
        dataset: &Dataset,
    ) -> Result<(), ResolutionError> {
        // A headerless empty export has nothing to resolve
        if dataset.columns.is_empty() && dataset.is_empty() {
            return Ok(());
        }

        match platform
            .required_fields()
            .into_iter()
            .find(|field| !dataset.has_column(field))
        {
            Some(field) => Err(ResolutionError::MissingField {
                platform: platform.name.clone(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Count cells that will be absorbed as absent values
    pub fn inspect(&self, platform: &Platform, dataset: &Dataset) -> DataQualityCounters {
        let mut counters = DataQualityCounters {
            rows: dataset.len(),
            ..Default::default()
        };

        for row in &dataset.rows {
            match row.get(&platform.date_field).map(|d| d.trim()) {
                None | Some("") => counters.missing_dates += 1,
                Some(value) if parse_date(value).is_none() => counters.unparsable_dates += 1,
                Some(_) => {}
            }

            if row
                .get(&platform.amount_field)
                .and_then(|a| parse_amount_cents(a))
                .is_none()
            {
                counters.missing_amounts += 1;
            }

            let primary = normalize_key(row.get(&platform.primary_key_field).map(String::as_str));
            let secondary = platform
                .linking_secondary_field()
                .map(|field| normalize_key(row.get(field).map(String::as_str)))
                .unwrap_or_default();
            if primary.is_empty() && secondary.is_empty() {
                counters.rows_without_keys += 1;
            }
        }

        counters
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
