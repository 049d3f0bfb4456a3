// 🗂️ Key Index Builder
// One pass over the base platform: key → base rows carrying it, plus each
// base row's own id and transaction signature.

use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::record::PlatformRecords;
use crate::signature::TransactionSignature;
use std::collections::HashMap;
use tracing::debug;

/// Inverted index over the base platform, read-only once built
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    postings: HashMap<String, Vec<usize>>,
    row_ids: Vec<String>,
    signatures: Vec<Option<TransactionSignature>>,
}

impl KeyIndex {
    /// Index every non-empty primary/secondary key of the base rows
    ///
    /// When `with_signatures` is false no signatures are computed; the
    /// postings are identical either way.
    pub fn build(
        base: &PlatformRecords,
        with_signatures: bool,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Self> {
        let mut index = KeyIndex {
            postings: HashMap::new(),
            row_ids: Vec::with_capacity(base.len()),
            signatures: Vec::with_capacity(base.len()),
        };

        for (position, record) in base.records.iter().enumerate() {
            tracker.step()?;

            index.row_ids.push(record.row_id.clone());
            index.signatures.push(if with_signatures {
                TransactionSignature::for_record(record)
            } else {
                None
            });

            for key in record.keys() {
                let rows = index.postings.entry(key.to_string()).or_default();
                // Primary and secondary may hold the same value
                if rows.last() != Some(&position) {
                    rows.push(position);
                }
            }
        }

        debug!(
            platform = %base.platform.name,
            rows = index.len(),
            keys = index.key_count(),
            "built base key index"
        );

        Ok(index)
    }

    /// Base rows carrying `key` (empty slice when unknown)
    pub fn lookup(&self, key: &str) -> &[usize] {
        self.postings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_id(&self, position: usize) -> &str {
        &self.row_ids[position]
    }

    pub fn signature(&self, position: usize) -> Option<&TransactionSignature> {
        self.signatures.get(position).and_then(Option::as_ref)
    }

    pub fn key_count(&self) -> usize {
        self.postings.len()
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
