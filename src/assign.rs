// 🏷️ Canonical ID Assigner
// Final pass: every record gets exactly one non-empty Relationship ID.

use crate::error::Result;
use crate::identity::KeyIdentityMap;
use crate::progress::ProgressTracker;
use crate::record::{PlatformRecord, PlatformRecords};
use serde::{Deserialize, Serialize};

/// Where a Relationship ID came from, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdSource {
    /// A key resolved to a seeded CanonicalID
    Identity,
    /// Base row with no resolvable key: its own row id
    OwnRowId,
    /// Keys reach only an unseeded group holding a primary key: that
    /// group's anchor key
    AnchorKey,
    /// No keys: concatenated donor attributes
    Attributes,
    /// Nothing to go on: "<platform>#<row number>"
    Synthesized,
}

impl IdSource {
    /// True when no linking key produced the id
    pub fn is_fallback(&self) -> bool {
        matches!(self, IdSource::Attributes | IdSource::Synthesized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub relationship_id: String,
    pub source: IdSource,
}

/// Resolve one record's Relationship ID against the frozen identity map
pub fn relationship_id_for(
    record: &PlatformRecord,
    is_base: bool,
    map: &KeyIdentityMap,
    delimiter: &str,
) -> Assignment {
    // Primary key first, then secondary
    if let Some(canonical) = record.keys().find_map(|key| map.resolve(key)) {
        return Assignment {
            relationship_id: canonical.render(delimiter),
            source: IdSource::Identity,
        };
    }

    if is_base && !record.row_id.is_empty() {
        return Assignment {
            relationship_id: record.row_id.clone(),
            source: IdSource::OwnRowId,
        };
    }

    // Order numbers alone never name a donor
    if let Some(group) = record
        .keys()
        .find_map(|key| map.group(key))
        .filter(|group| group.anchor_is_primary)
    {
        return Assignment {
            relationship_id: group.anchor_key.clone(),
            source: IdSource::AnchorKey,
        };
    }

    let fallback = record.attributes.fallback_id();
    if !fallback.is_empty() {
        return Assignment {
            relationship_id: fallback,
            source: IdSource::Attributes,
        };
    }

    Assignment {
        relationship_id: format!("{}#{}", record.platform_name, record.position + 1),
        source: IdSource::Synthesized,
    }
}

/// Assign every record of one platform
pub fn assign_platform(
    platform: &PlatformRecords,
    map: &KeyIdentityMap,
    delimiter: &str,
    tracker: &mut ProgressTracker<'_>,
) -> Result<Vec<Assignment>> {
    let is_base = platform.platform.is_base;
    let mut assignments = Vec::with_capacity(platform.len());

    for record in &platform.records {
        tracker.step()?;
        assignments.push(relationship_id_for(record, is_base, map, delimiter));
    }

    Ok(assignments)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{merge_identities, DEFAULT_ID_DELIMITER};
    use crate::platform::Platform;
    use crate::progress::{CancellationToken, NoProgress};
    use crate::record::Row;

    fn create_test_records(platform: Platform, rows: &[&[(&str, &str)]]) -> PlatformRecords {
        let records = rows
            .iter()
            .enumerate()
            .map(|(position, pairs)| {
                let row: Row = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                PlatformRecord::from_row(&platform, position, &row)
            })
            .collect();

        PlatformRecords { platform, records }
    }

    fn base_platform() -> Platform {
        Platform::new("CRM", true, "Email", Some("Ref"), "ID", "Amount", "Date")
    }

    fn processor_platform() -> Platform {
        Platform::new("Processor", false, "Email", None, "Order", "Amount", "Date")
    }

    fn resolve(base: &PlatformRecords, others: &[PlatformRecords]) -> Vec<Vec<Assignment>> {
        let cancel = CancellationToken::new();
        let mut tracker = ProgressTracker::new(&NoProgress, &cancel, 100, 100);
        let map = merge_identities(base, others, &mut tracker).unwrap();

        std::iter::once(base)
            .chain(others.iter())
            .map(|p| assign_platform(p, &map, DEFAULT_ID_DELIMITER, &mut tracker).unwrap())
            .collect()
    }

    #[test]
    fn test_identity_wins() {
        let base = create_test_records(
            base_platform(),
            &[&[("Email", "a@x.com"), ("Ref", "S1"), ("ID", "ID1")]],
        );
        let processor = create_test_records(
            processor_platform(),
            &[&[("Email", "a@x.com"), ("Order", "P2")]],
        );

        let assigned = resolve(&base, &[processor]);

        assert_eq!(assigned[0][0].relationship_id, "ID1");
        assert_eq!(assigned[1][0].relationship_id, "ID1");
        assert_eq!(assigned[1][0].source, IdSource::Identity);
    }

    #[test]
    fn test_base_without_keys_uses_own_id() {
        let base = create_test_records(base_platform(), &[&[("ID", "ID7")]]);

        let assigned = resolve(&base, &[]);

        assert_eq!(assigned[0][0].relationship_id, "ID7");
        assert_eq!(assigned[0][0].source, IdSource::OwnRowId);
    }

    #[test]
    fn test_unseeded_non_base_uses_anchor() {
        let base = create_test_records(base_platform(), &[&[("Email", "a@x.com"), ("ID", "ID1")]]);
        let processor = create_test_records(
            processor_platform(),
            &[
                &[("Email", "New@X.com"), ("Order", "O1")],
                &[("Email", ""), ("Order", "o1")],
            ],
        );

        let assigned = resolve(&base, &[processor]);

        assert_eq!(assigned[1][0].relationship_id, "new@x.com");
        assert_eq!(assigned[1][1].relationship_id, "new@x.com");
        assert_eq!(assigned[1][1].source, IdSource::AnchorKey);
    }

    #[test]
    fn test_order_number_alone_uses_attributes() {
        let base = create_test_records(base_platform(), &[&[("Email", "a@x.com"), ("ID", "ID1")]]);
        let donor = [
            ("Email", ""),
            ("Donor First Name", "Ada"),
            ("Donor Last Name", "Lovelace"),
            ("Donor City", "London"),
        ];
        let mut first = donor.to_vec();
        first.push(("Order", "O-1"));
        let mut second = donor.to_vec();
        second.push(("Order", "O-2"));
        let processor = create_test_records(processor_platform(), &[&first[..], &second[..]]);

        let assigned = resolve(&base, &[processor]);

        assert_eq!(assigned[1][0].relationship_id, "AdaLovelaceLondon");
        assert_eq!(assigned[1][0].relationship_id, assigned[1][1].relationship_id);
        assert_eq!(assigned[1][0].source, IdSource::Attributes);
    }

    #[test]
    fn test_keyless_non_base_uses_attributes() {
        let base = create_test_records(base_platform(), &[&[("Email", "a@x.com"), ("ID", "ID1")]]);
        let processor = create_test_records(
            processor_platform(),
            &[
                &[("Donor First Name", "Ada"), ("Donor ZIP", "02139")],
                &[("Donor First Name", "Ada"), ("Donor ZIP", "02139")],
                &[("Donor First Name", "Ada"), ("Donor ZIP", "02140")],
            ],
        );

        let assigned = resolve(&base, &[processor]);

        assert_eq!(assigned[1][0].relationship_id, "Ada02139");
        assert_eq!(assigned[1][0].relationship_id, assigned[1][1].relationship_id);
        assert_ne!(assigned[1][0].relationship_id, assigned[1][2].relationship_id);
        assert!(assigned[1][0].source.is_fallback());
    }

    #[test]
    fn test_empty_everything_is_synthesized() {
        let base = create_test_records(base_platform(), &[&[("Email", "a@x.com"), ("ID", "ID1")]]);
        let processor = create_test_records(processor_platform(), &[&[], &[]]);

        let assigned = resolve(&base, &[processor]);

        assert_eq!(assigned[1][0].relationship_id, "Processor#1");
        assert_eq!(assigned[1][1].relationship_id, "Processor#2");
        assert_eq!(assigned[1][1].source, IdSource::Synthesized);
    }
}
