// 🩺 Resolution Audit
// Post-hoc checks over compiled output: fragmented identities and giving totals.

use crate::engine::Resolution;
use crate::record::format_cents;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// FRAGMENTED IDENTITIES
// ============================================================================

/// An atomic id that shows up alone on some rows and inside a union on others
///
/// This means two rows of the same donor ended up with different
/// Relationship IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentedId {
    pub standalone: String,

    /// Distinct union ids containing it, sorted
    pub appears_in: Vec<String>,

    /// Zero-based rows carrying the standalone id
    pub standalone_rows: Vec<usize>,

    /// Zero-based rows carrying any of the union ids
    pub union_rows: Vec<usize>,
}

/// Scan Relationship IDs for identities that were split across rows
///
/// Union ids are split on the trimmed delimiter and each part trimmed, so
/// "A + B" and "A+B" read the same.
pub fn find_fragmented_ids<S: AsRef<str>>(ids: &[S], delimiter: &str) -> Vec<FragmentedId> {
    let separator = match delimiter.trim() {
        "" => delimiter,
        trimmed => trimmed,
    };

    let mut standalone: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut unions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut containing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for (row, id) in ids.iter().enumerate() {
        let id = id.as_ref().trim();
        if separator.is_empty() || !id.contains(separator) {
            standalone.entry(id).or_default().push(row);
            continue;
        }

        unions.entry(id).or_default().push(row);
        for part in id.split(separator).map(str::trim).filter(|p| !p.is_empty()) {
            containing.entry(part).or_default().insert(id);
        }
    }

    standalone
        .into_iter()
        .filter_map(|(id, rows)| {
            let holders = containing.get(id)?;
            let mut union_rows: Vec<usize> = holders
                .iter()
                .flat_map(|holder| unions.get(holder).into_iter().flatten().copied())
                .collect();
            union_rows.sort_unstable();

            Some(FragmentedId {
                standalone: id.to_string(),
                appears_in: holders.iter().map(|h| h.to_string()).collect(),
                standalone_rows: rows,
                union_rows,
            })
        })
        .collect()
}

// ============================================================================
// GIVING TOTALS
// ============================================================================

/// Money view of a resolution, all in cents; sums saturate rather than wrap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GivingTotals {
    pub base_rows: usize,
    pub gross_base_cents: i64,
    pub duplicate_rows: usize,
    pub duplicate_cents: i64,
    /// Gross base minus what other platforms already captured
    pub net_base_cents: i64,
    pub non_base_rows: usize,
    pub non_base_cents: i64,
}

impl GivingTotals {
    pub fn from_resolution(resolution: &Resolution) -> Self {
        let mut totals = GivingTotals::default();

        for record in &resolution.base.records {
            totals.base_rows += 1;
            totals.gross_base_cents = totals.gross_base_cents.saturating_add(record.amount_cents);
            if record.is_duplicate() {
                totals.duplicate_rows += 1;
                totals.duplicate_cents = totals.duplicate_cents.saturating_add(record.amount_cents);
            }
        }
        totals.net_base_cents = totals.gross_base_cents.saturating_sub(totals.duplicate_cents);

        for record in resolution.others.iter().flat_map(|p| p.records.iter()) {
            totals.non_base_rows += 1;
            totals.non_base_cents = totals.non_base_cents.saturating_add(record.amount_cents);
        }

        totals
    }

    pub fn summary(&self) -> String {
        format!(
            "base gross {} ({} rows), duplicates {} ({} rows), base net {}, other platforms {} ({} rows)",
            format_cents(self.gross_base_cents),
            self.base_rows,
            format_cents(self.duplicate_cents),
            self.duplicate_rows,
            format_cents(self.net_base_cents),
            format_cents(self.non_base_cents),
            self.non_base_rows
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ResolutionEngine;
    use crate::platform::{Platform, PlatformRegistry};
    use crate::record::{Dataset, Row};

    fn create_test_row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_clean_ids() {
        let ids = ["ID1 + ID2", "ID1 + ID2", "ID3", "ID4"];

        assert!(find_fragmented_ids(&ids, " + ").is_empty());
    }

    #[test]
    fn test_fragmented_id_found() {
        let ids = ["ID1 + ID2", "ID2", "ID3", "ID1+ID2", "ID2 + ID5"];

        let found = find_fragmented_ids(&ids, " + ");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].standalone, "ID2");
        assert_eq!(found[0].appears_in, vec!["ID1 + ID2", "ID1+ID2", "ID2 + ID5"]);
        assert_eq!(found[0].standalone_rows, vec![1]);
        assert_eq!(found[0].union_rows, vec![0, 3, 4]);
    }

    #[test]
    fn test_custom_delimiter() {
        let ids = vec!["A|B".to_string(), "B".to_string()];

        let found = find_fragmented_ids(&ids, "|");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].standalone, "B");
    }

    #[test]
    fn test_giving_totals() {
        let registry = PlatformRegistry::from_platforms(vec![
            Platform::new("CRM", true, "Email", None, "ID", "Amount", "Date"),
            Platform::new("Processor", false, "Email", None, "Order", "Amount", "Date"),
        ]);
        let crm = Dataset::from_rows(
            "CRM",
            vec![
                create_test_row(&[("Email", "a@x.com"), ("ID", "T1"), ("Amount", "25.00"), ("Date", "2024-05-01")]),
                create_test_row(&[("Email", "b@x.com"), ("ID", "T2"), ("Amount", "10.50"), ("Date", "2024-05-02")]),
            ],
        );
        let processor = Dataset::from_rows(
            "Processor",
            vec![create_test_row(&[("Email", "a@x.com"), ("Order", "P1"), ("Amount", "25"), ("Date", "2024-05-01")])],
        );

        let resolution = ResolutionEngine::new(registry)
            .resolve(&[crm, processor])
            .unwrap();
        let totals = GivingTotals::from_resolution(&resolution);

        assert_eq!(totals.gross_base_cents, 3550);
        assert_eq!(totals.duplicate_cents, 2500);
        assert_eq!(totals.net_base_cents, 1050);
        assert_eq!(totals.non_base_cents, 2500);
        assert_eq!(totals.duplicate_rows, 1);
        assert!(totals.summary().contains("base net 10.50"));
    }

    #[test]
    fn test_giving_totals_saturate() {
        let registry = PlatformRegistry::from_platforms(vec![Platform::new(
            "CRM", true, "Email", None, "ID", "Amount", "Date",
        )]);
        let crm = Dataset::from_rows(
            "CRM",
            vec![
                create_test_row(&[("Email", "a@x.com"), ("ID", "T1"), ("Amount", "1e20"), ("Date", "")]),
                create_test_row(&[("Email", "b@x.com"), ("ID", "T2"), ("Amount", "5"), ("Date", "")]),
                create_test_row(&[("Email", "c@x.com"), ("ID", "T3"), ("Amount", "5"), ("Date", "")]),
            ],
        );

        let mut resolution = ResolutionEngine::new(registry).resolve(&[crm]).unwrap();

        // Out-of-range amounts are absorbed as missing
        assert_eq!(resolution.base.records[0].amount_cents, 0);
        assert_eq!(resolution.report.quality.missing_amounts, 1);

        resolution.base.records[1].amount_cents = i64::MAX;
        let totals = GivingTotals::from_resolution(&resolution);

        assert_eq!(totals.gross_base_cents, i64::MAX);
        assert_eq!(totals.net_base_cents, i64::MAX);
    }
}
