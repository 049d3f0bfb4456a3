// 🔏 Transaction Signatures & Cross-Platform Signature Matcher
// A signature is (row_id, YYYYMMDD, amount). It only ever answers "is this the
// same transaction?" and never participates in identity linkage.

use crate::error::Result;
use crate::index::KeyIndex;
use crate::progress::ProgressTracker;
use crate::record::{format_cents, PlatformRecord, PlatformRecords};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

// ============================================================================
// TRANSACTION SIGNATURE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub row_id: String,

    /// Date as a YYYYMMDD integer
    pub date: i32,

    pub amount_cents: i64,
}

impl TransactionSignature {
    pub fn new(row_id: &str, date: NaiveDate, amount_cents: i64) -> Self {
        TransactionSignature {
            row_id: row_id.to_string(),
            date: date_key(date),
            amount_cents,
        }
    }

    /// Signature of a record's own transaction; None when its date is absent
    pub fn for_record(record: &PlatformRecord) -> Option<Self> {
        record
            .date
            .map(|date| TransactionSignature::new(&record.row_id, date, record.amount_cents))
    }
}

impl fmt::Display for TransactionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.row_id,
            self.date,
            format_cents(self.amount_cents)
        )
    }
}

/// 2024-05-01 → 20240501
pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

// ============================================================================
// SIGNATURE MATCHER
// ============================================================================

/// Output of the matcher: the global set plus each non-base row's own set
#[derive(Debug, Clone, Default)]
pub struct SignatureMatches {
    /// Every signature implied by any non-base row
    pub observed: HashSet<TransactionSignature>,

    /// Per non-base platform (configuration order), per row: sorted signatures
    pub per_record: Vec<Vec<Vec<TransactionSignature>>>,
}

impl SignatureMatches {
    pub fn contains(&self, signature: &TransactionSignature) -> bool {
        self.observed.contains(signature)
    }
}

/// Signatures a non-base row would share with the base rows its keys reach
///
/// For every base row matched through either key, the signature is built
/// from that base row's id and this row's own date and amount. Rows without
/// a date imply nothing.
pub fn signatures_for_row(index: &KeyIndex, record: &PlatformRecord) -> Vec<TransactionSignature> {
    let Some(date) = record.date else {
        return Vec::new();
    };

    let mut signatures = BTreeSet::new();
    for key in record.keys() {
        for &base_index in index.lookup(key) {
            signatures.insert(TransactionSignature::new(
                index.row_id(base_index),
                date,
                record.amount_cents,
            ));
        }
    }

    signatures.into_iter().collect()
}

/// Run the matcher over every non-base platform
pub fn match_signatures(
    index: &KeyIndex,
    non_base: &[PlatformRecords],
    tracker: &mut ProgressTracker<'_>,
) -> Result<SignatureMatches> {
    let mut matches = SignatureMatches::default();

    for platform in non_base {
        let mut platform_matches = Vec::with_capacity(platform.len());
        let mut matched_rows = 0usize;

        for record in &platform.records {
            tracker.step()?;
            let signatures = signatures_for_row(index, record);
            if !signatures.is_empty() {
                matched_rows += 1;
            }
            matches.observed.extend(signatures.iter().cloned());
            platform_matches.push(signatures);
        }

        debug!(
            platform = %platform.platform.name,
            rows = platform.len(),
            matched_rows,
            "matched non-base rows against base index"
        );
        matches.per_record.push(platform_matches);
    }

    Ok(matches)
}

// ============================================================================
// TESTS
// ============================================================================
