// 🧾 Platform Records - One transaction row from one data source
// Raw rows come in as string maps; the engine derives keys, dates and amounts
// from them and annotates each record with its resolved identity.

use crate::platform::Platform;
use crate::signature::TransactionSignature;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One raw input row: column name → cell value
pub type Row = HashMap<String, String>;

/// Canonical donor attributes concatenated (in this order) into a Fallback ID
pub const FALLBACK_ATTRIBUTES: [&str; 8] = [
    "Donor First Name",
    "Donor Last Name",
    "Donor Address Line 1",
    "Donor City",
    "Donor State",
    "Donor ZIP",
    "Donor Country",
    "Donor Employer",
];

// ============================================================================
// DATASET
// ============================================================================

/// Ordered rows exported from one platform
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub platform: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(platform: &str, columns: Vec<String>) -> Self {
        Dataset {
            platform: platform.to_string(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a dataset whose columns are the union of the row keys
    pub fn from_rows(platform: &str, rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            let mut keys: Vec<&String> = row.keys().collect();
            keys.sort();
            for key in keys {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        Dataset {
            platform: platform.to_string(),
            columns,
            rows,
        }
    }

    /// Build a dataset from JSON objects; values are coerced to strings and
    /// nulls are treated as missing cells
    pub fn from_json_rows(
        platform: &str,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut converted = Vec::with_capacity(rows.len());

        for object in rows {
            let mut row = Row::new();
            for (key, value) in object {
                if !columns.contains(&key) {
                    columns.push(key.clone());
                }
                if let Some(text) = json_cell_to_string(&value) {
                    row.insert(key, text);
                }
            }
            converted.push(row);
        }

        Dataset {
            platform: platform.to_string(),
            columns,
            rows: converted,
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn json_cell_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Normalize a link key: trimmed and lower-cased, empty when missing
pub fn normalize_key(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}

/// Parse a calendar date; unparsable or empty input is treated as absent
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // Two-digit years first: "%Y" would happily read "24" as year 24
    for format in ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.date_naive());
    }

    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Some(datetime.date());
        }
    }

    None
}

/// Largest amount accepted, in cents; every integer up to it is exact in f64
pub const MAX_AMOUNT_CENTS: i64 = 1 << 53;

/// Parse a money amount into integer cents
///
/// Accepts "$1,234.50", "-12", "(40.00)". Returns None for empty,
/// unparsable or out-of-range input.
pub fn parse_amount_cents(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();

    let amount: f64 = cleaned.parse().ok()?;
    if !amount.is_finite() {
        return None;
    }

    let scaled = (amount * 100.0).round();
    if scaled.abs() > MAX_AMOUNT_CENTS as f64 {
        return None;
    }

    let cents = scaled as i64;
    Some(if negative { -cents } else { cents })
}

/// Render cents as a plain decimal ("25.00", "-3.05")
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

// ============================================================================
// DONOR ATTRIBUTES
// ============================================================================

/// Descriptive donor fields used only to synthesize a Fallback ID
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DonorAttributes {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub employer: String,
}

impl DonorAttributes {
    /// Read attributes through the platform's column mapping; attributes
    /// without a mapping are read from a column of the same name
    pub fn from_row(platform: &Platform, row: &Row) -> Self {
        let read = |target: &str| -> String {
            match platform.mapping_for(target) {
                Some(mapping) if mapping.is_mapped() => match row.get(&mapping.source) {
                    Some(value) => value.clone(),
                    None => mapping.default.clone(),
                },
                Some(mapping) => mapping.default.clone(),
                None => row.get(target).cloned().unwrap_or_default(),
            }
        };

        let [first_name, last_name, address, city, state, zip, country, employer] =
            FALLBACK_ATTRIBUTES.map(read);

        DonorAttributes {
            first_name,
            last_name,
            address,
            city,
            state,
            zip,
            country,
            employer,
        }
    }

    /// Concatenation (no delimiter) of all attributes in fixed order
    pub fn fallback_id(&self) -> String {
        [
            &self.first_name,
            &self.last_name,
            &self.address,
            &self.city,
            &self.state,
            &self.zip,
            &self.country,
            &self.employer,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect()
    }
}

// ============================================================================
// DUPLICATE FLAG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateFlag {
    #[serde(rename = "Duplicate")]
    Duplicate,
    #[serde(rename = "Not Duplicate")]
    NotDuplicate,
}

impl DuplicateFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateFlag::Duplicate => "Duplicate",
            DuplicateFlag::NotDuplicate => "Not Duplicate",
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateFlag::Duplicate)
    }
}

impl fmt::Display for DuplicateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PLATFORM RECORD
// ============================================================================

/// One transaction row, with the values the engine links on and the
/// annotations each phase writes back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub platform_name: String,

    /// Zero-based row position within its dataset
    pub position: usize,

    /// Normalized primary link key (empty when absent)
    pub primary_key: String,

    /// Normalized secondary link key (empty when absent)
    pub secondary_key: String,

    /// The platform's own identifier for this row
    pub row_id: String,

    pub amount_cents: i64,

    /// Calendar date; None when missing or unparsable
    pub date: Option<NaiveDate>,

    pub attributes: DonorAttributes,

    // ========================================================================
    // ANNOTATIONS (written by the engine)
    // ========================================================================
    pub relationship_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_transaction_signature: Option<TransactionSignature>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_flag: Option<DuplicateFlag>,

    /// Non-base only: signatures this row implies for matched base rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_signatures: Vec<TransactionSignature>,
}

impl PlatformRecord {
    /// Derive a record from a raw row according to its platform descriptor
    pub fn from_row(platform: &Platform, position: usize, row: &Row) -> Self {
        let cell = |field: &str| row.get(field).map(String::as_str);

        let secondary_key = platform
            .linking_secondary_field()
            .map(|field| normalize_key(cell(field)))
            .unwrap_or_default();

        PlatformRecord {
            platform_name: platform.name.clone(),
            position,
            primary_key: normalize_key(cell(&platform.primary_key_field)),
            secondary_key,
            row_id: cell(&platform.id_field).unwrap_or("").trim().to_string(),
            amount_cents: cell(&platform.amount_field)
                .and_then(parse_amount_cents)
                .unwrap_or(0),
            date: cell(&platform.date_field).and_then(parse_date),
            attributes: DonorAttributes::from_row(platform, row),
            relationship_id: String::new(),
            unique_transaction_signature: None,
            duplicate_flag: None,
            matched_signatures: Vec::new(),
        }
    }

    /// Non-empty link keys, primary first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        [self.primary_key.as_str(), self.secondary_key.as_str()]
            .into_iter()
            .filter(|k| !k.is_empty())
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_flag.map(|f| f.is_duplicate()).unwrap_or(false)
    }

    pub fn amount(&self) -> String {
        format_cents(self.amount_cents)
    }
}

/// All records of one platform, in ingestion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecords {
    pub platform: Platform,
    pub records: Vec<PlatformRecord>,
}

impl PlatformRecords {
    pub fn from_dataset(platform: &Platform, dataset: &Dataset) -> Self {
        let records = dataset
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| PlatformRecord::from_row(platform, position, row))
            .collect();

        PlatformRecords {
            platform: platform.clone(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(Some("  A@X.com ")), "a@x.com");
        assert_eq!(normalize_key(Some("   ")), "");
        assert_eq!(normalize_key(None), "");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert_eq!(parse_date("2024-05-01"), Some(expected));
        assert_eq!(parse_date("05/01/2024"), Some(expected));
        assert_eq!(parse_date("5/1/24"), Some(expected));
        assert_eq!(parse_date("2024/05/01"), Some(expected));
        assert_eq!(parse_date("2024-05-01T13:45:00-04:00"), Some(expected));
        assert_eq!(parse_date("2024-05-01 13:45:00"), Some(expected));
    }

    #[test]
    fn test_parse_date_unparsable() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2024-13-45"), None);
    }

    #[test]
    fn test_parse_amount_cents() {
        assert_eq!(parse_amount_cents("25"), Some(2500));
        assert_eq!(parse_amount_cents("25.00"), Some(2500));
        assert_eq!(parse_amount_cents("$1,234.56"), Some(123456));
        assert_eq!(parse_amount_cents("-3.05"), Some(-305));
        assert_eq!(parse_amount_cents("(40.00)"), Some(-4000));
        assert_eq!(parse_amount_cents(""), None);
        assert_eq!(parse_amount_cents("abc"), None);
    }

    #[test]
    fn test_parse_amount_out_of_range() {
        assert_eq!(parse_amount_cents("1e20"), None);
        assert_eq!(parse_amount_cents("-1e20"), None);
        assert_eq!(parse_amount_cents("$1,000,000,000.00"), Some(100_000_000_000));
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(2500), "25.00");
        assert_eq!(format_cents(-305), "-3.05");
        assert_eq!(format_cents(7), "0.07");
    }

    #[test]
    fn test_record_from_row_base() {
        let platform = Platform::new("CRM", true, "Email", Some("Ref"), "ID", "Amount", "Date");
        let row = create_test_row(&[
            ("Email", " Donor@Example.org "),
            ("Ref", "AB-77"),
            ("ID", "1001"),
            ("Amount", "$25.00"),
            ("Date", "2024-05-01"),
        ]);

        let record = PlatformRecord::from_row(&platform, 3, &row);

        assert_eq!(record.primary_key, "donor@example.org");
        assert_eq!(record.secondary_key, "ab-77");
        assert_eq!(record.row_id, "1001");
        assert_eq!(record.amount_cents, 2500);
        assert_eq!(record.position, 3);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["donor@example.org", "ab-77"]);
    }

    #[test]
    fn test_record_from_row_non_base_links_through_id() {
        let platform =
            Platform::new("Processor", false, "Email", Some("Line"), "Order", "Amount", "Date");
        let row = create_test_row(&[
            ("Email", ""),
            ("Order", "AB-77"),
            ("Line", "L1"),
            ("Amount", ""),
            ("Date", "garbage"),
        ]);

        let record = PlatformRecord::from_row(&platform, 0, &row);

        assert_eq!(record.primary_key, "");
        assert_eq!(record.secondary_key, "ab-77");
        assert_eq!(record.amount_cents, 0);
        assert_eq!(record.date, None);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["ab-77"]);
    }

    #[test]
    fn test_donor_attributes_through_mapping() {
        let platform = Platform::new("CRM", true, "Email", None, "ID", "Amount", "Date")
            .with_column("Donor First Name", "First Name", "")
            .with_column("Donor Country", "N/A", "US");
        let row = create_test_row(&[
            ("First Name", "Ada"),
            ("Donor Last Name", "Lovelace"),
            ("Donor City", "London"),
        ]);

        let attributes = DonorAttributes::from_row(&platform, &row);

        assert_eq!(attributes.first_name, "Ada");
        assert_eq!(attributes.last_name, "Lovelace");
        assert_eq!(attributes.country, "US");
        assert_eq!(attributes.fallback_id(), "AdaLovelaceLondonUS");
    }

    #[test]
    fn test_dataset_from_json_rows() {
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = vec![serde_json::json!({
            "ID": 1001,
            "Amount": 25.5,
            "Email": null,
            "Name": "Ada"
        })
        .as_object()
        .cloned()
        .unwrap()];

        let dataset = Dataset::from_json_rows("CRM", rows);

        assert!(dataset.has_column("Email"));
        assert_eq!(dataset.rows[0].get("ID").map(String::as_str), Some("1001"));
        assert_eq!(dataset.rows[0].get("Amount").map(String::as_str), Some("25.5"));
        assert!(dataset.rows[0].get("Email").is_none());
    }

    #[test]
    fn test_duplicate_flag_display() {
        assert_eq!(DuplicateFlag::Duplicate.to_string(), "Duplicate");
        assert_eq!(DuplicateFlag::NotDuplicate.to_string(), "Not Duplicate");
        assert_eq!(
            serde_json::to_string(&DuplicateFlag::NotDuplicate).unwrap(),
            "\"Not Duplicate\""
        );
    }
}
