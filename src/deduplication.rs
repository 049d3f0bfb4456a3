// 🔍 Duplicate Flagger - Base rows already captured by a processor export
// A base row is a Duplicate when its own signature is among the signatures
// implied by non-base rows. Only the base platform is flagged.

use crate::error::Result;
use crate::index::KeyIndex;
use crate::progress::ProgressTracker;
use crate::record::DuplicateFlag;
use crate::signature::SignatureMatches;
use tracing::debug;

/// Flag every base row, in base order
///
/// Rows without a signature (absent date) are never Duplicate.
pub fn flag_duplicates(
    index: &KeyIndex,
    matches: &SignatureMatches,
    tracker: &mut ProgressTracker<'_>,
) -> Result<Vec<DuplicateFlag>> {
    let mut flags = Vec::with_capacity(index.len());

    for position in 0..index.len() {
        tracker.step()?;

        let flag = match index.signature(position) {
            Some(signature) if matches.contains(signature) => DuplicateFlag::Duplicate,
            _ => DuplicateFlag::NotDuplicate,
        };
        flags.push(flag);
    }

    debug!(
        rows = flags.len(),
        duplicates = flags.iter().filter(|f| f.is_duplicate()).count(),
        "flagged base duplicates"
    );

    Ok(flags)
}

// ============================================================================
// TESTS
// ============================================================================
