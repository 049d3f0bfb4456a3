// 🏛️ Platform Descriptors - Which column means what, per data source
// Loaded from a JSON config file (a list of platforms) or the built-in defaults

use crate::error::ResolutionError;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Marker used in column mappings for "no source column, use the default"
pub const NOT_MAPPED: &str = "N/A";

// ============================================================================
// COLUMN MAPPING
// ============================================================================

/// Maps a canonical donor attribute (e.g. "Donor City") to a platform column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Source column in the platform export, or "N/A"
    pub source: String,

    /// Value used when the source column is unmapped or absent
    #[serde(default)]
    pub default: String,
}

impl ColumnMapping {
    pub fn new(source: &str, default: &str) -> Self {
        ColumnMapping {
            source: source.to_string(),
            default: default.to_string(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.source != NOT_MAPPED && !self.source.is_empty()
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

/// Static metadata for one donation data source
///
/// The base platform links rows through `primary_key_field` and
/// `secondary_key_field`. Every other platform links through
/// `primary_key_field` and its own `id_field` (an ActBlue order number is what
/// the CRM stores in its "ActBlue ID" column), so a non-base
/// `secondary_key_field` is descriptive only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,

    #[serde(default)]
    pub is_base: bool,

    pub primary_key_field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key_field: Option<String>,

    pub id_field: String,

    pub amount_field: String,

    pub date_field: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_mapping: BTreeMap<String, ColumnMapping>,
}

impl Platform {
    pub fn new(
        name: &str,
        is_base: bool,
        primary_key_field: &str,
        secondary_key_field: Option<&str>,
        id_field: &str,
        amount_field: &str,
        date_field: &str,
    ) -> Self {
        Platform {
            name: name.to_string(),
            is_base,
            primary_key_field: primary_key_field.to_string(),
            secondary_key_field: secondary_key_field.map(str::to_string),
            id_field: id_field.to_string(),
            amount_field: amount_field.to_string(),
            date_field: date_field.to_string(),
            column_mapping: BTreeMap::new(),
        }
    }

    /// Builder pattern: map a canonical attribute to a source column
    pub fn with_column(mut self, target: &str, source: &str, default: &str) -> Self {
        self.column_mapping
            .insert(target.to_string(), ColumnMapping::new(source, default));
        self
    }

    /// Field carrying this platform's secondary link key
    pub fn linking_secondary_field(&self) -> Option<&str> {
        if self.is_base {
            self.secondary_key_field.as_deref()
        } else {
            Some(&self.id_field)
        }
    }

    /// Every field a dataset must expose for this platform to be resolvable
    pub fn required_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.primary_key_field.as_str(),
            self.id_field.as_str(),
            self.amount_field.as_str(),
            self.date_field.as_str(),
        ];
        if let Some(secondary) = self.linking_secondary_field() {
            if !fields.contains(&secondary) {
                fields.push(secondary);
            }
        }
        fields
    }

    /// Column mapping for a canonical attribute, if configured
    pub fn mapping_for(&self, target: &str) -> Option<&ColumnMapping> {
        self.column_mapping.get(target)
    }
}

// ============================================================================
// PLATFORM REGISTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlatformRegistry {
    platforms: Vec<Platform>,
}

impl PlatformRegistry {
    /// Create registry from a list of platforms (order is processing order)
    pub fn from_platforms(platforms: Vec<Platform>) -> Self {
        PlatformRegistry { platforms }
    }

    /// Load platforms from a JSON file holding an array of descriptors
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read platform config: {:?}", path.as_ref()))?;

        let platforms: Vec<Platform> =
            serde_json::from_str(&content).context("Failed to parse platform config JSON")?;

        Ok(PlatformRegistry::from_platforms(platforms))
    }

    /// Write the registry as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.platforms)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write platform config: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Built-in configuration: EveryAction CRM as base, ActBlue as processor
    pub fn defaults() -> Self {
        let everyaction = Platform::new(
            "EveryAction",
            true,
            "Personal Email",
            Some("ActBlue ID"),
            "VANID",
            "Amount",
            "Date Received",
        )
        .with_column("Transaction ID", "Contribution ID", "")
        .with_column("Secondary ID", "ActBlue ID", "")
        .with_column("Donor First Name", "First Name", "")
        .with_column("Donor Last Name", "Last Name", "")
        .with_column("Donor Address Line 1", "Home Street Address", "")
        .with_column("Donor City", "Home City", "")
        .with_column("Donor State", "Home State/Province", "")
        .with_column("Donor ZIP", "Home Zip/Postal", "")
        .with_column("Donor Country", "Home Country", "")
        .with_column("Donor Email", "Personal Email", "")
        .with_column("Donor Phone", "Home Phone", "");

        let actblue = Platform::new(
            "ActBlue",
            false,
            "Donor Email",
            Some("Lineitem ID"),
            "Order Number",
            "Amount",
            "Paid At",
        )
        .with_column("Transaction ID", "Lineitem ID", "")
        .with_column("Secondary ID", "Order Number", "")
        .with_column("Donor First Name", "Donor First Name", "")
        .with_column("Donor Last Name", "Donor Last Name", "")
        .with_column("Donor Address Line 1", "Donor Address Line 1", "")
        .with_column("Donor City", "Donor City", "")
        .with_column("Donor State", "Donor State", "")
        .with_column("Donor ZIP", "Donor ZIP", "")
        .with_column("Donor Country", "Donor Country", "")
        .with_column("Donor Employer", "Donor Employer", "")
        .with_column("Donor Email", "Donor Email", "")
        .with_column("Donor Phone", "Donor Phone", "");

        PlatformRegistry::from_platforms(vec![everyaction, actblue])
    }

    /// Check that exactly one platform is base and names are unique
    pub fn validate(&self) -> std::result::Result<(), ResolutionError> {
        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if !seen.insert(platform.name.as_str()) {
                return Err(ResolutionError::DuplicatePlatform {
                    platform: platform.name.clone(),
                });
            }
        }

        let bases: Vec<&Platform> = self.platforms.iter().filter(|p| p.is_base).collect();
        match bases.len() {
            0 => Err(ResolutionError::NoBasePlatform),
            1 => Ok(()),
            _ => Err(ResolutionError::MultipleBasePlatforms {
                names: bases.iter().map(|p| p.name.clone()).collect(),
            }),
        }
    }

    /// The single base platform
    pub fn base(&self) -> std::result::Result<&Platform, ResolutionError> {
        self.validate()?;
        self.platforms
            .iter()
            .find(|p| p.is_base)
            .ok_or(ResolutionError::NoBasePlatform)
    }

    /// Non-base platforms in configuration order
    pub fn non_base(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter().filter(|p| !p.is_base)
    }

    pub fn get(&self, name: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.name == name)
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_platform(name: &str, is_base: bool) -> Platform {
        Platform::new(name, is_base, "Email", Some("Order"), "ID", "Amount", "Date")
    }

    #[test]
    fn test_defaults_have_single_base() {
        let registry = PlatformRegistry::defaults();

        assert!(registry.validate().is_ok());
        assert_eq!(registry.base().unwrap().name, "EveryAction");
        assert_eq!(registry.non_base().count(), 1);
    }

    #[test]
    fn test_no_base_platform() {
        let registry = PlatformRegistry::from_platforms(vec![
            create_test_platform("A", false),
            create_test_platform("B", false),
        ]);

        assert_eq!(registry.validate(), Err(ResolutionError::NoBasePlatform));
    }

    #[test]
    fn test_multiple_base_platforms() {
        let registry = PlatformRegistry::from_platforms(vec![
            create_test_platform("A", true),
            create_test_platform("B", true),
        ]);

        assert_eq!(
            registry.validate(),
            Err(ResolutionError::MultipleBasePlatforms {
                names: vec!["A".to_string(), "B".to_string()]
            })
        );
    }

    #[test]
    fn test_duplicate_platform_name() {
        let registry = PlatformRegistry::from_platforms(vec![
            create_test_platform("A", true),
            create_test_platform("A", false),
        ]);

        assert!(matches!(
            registry.validate(),
            Err(ResolutionError::DuplicatePlatform { .. })
        ));
    }

    #[test]
    fn test_linking_secondary_field() {
        let base = create_test_platform("CRM", true);
        let processor = create_test_platform("Processor", false);

        assert_eq!(base.linking_secondary_field(), Some("Order"));
        // Non-base platforms link through their own transaction id
        assert_eq!(processor.linking_secondary_field(), Some("ID"));
        assert_eq!(processor.required_fields(), vec!["Email", "ID", "Amount", "Date"]);
        assert_eq!(base.required_fields(), vec!["Email", "ID", "Amount", "Date", "Order"]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform_config.json");

        let registry = PlatformRegistry::defaults();
        registry.save(&path).unwrap();
        let loaded = PlatformRegistry::from_file(&path).unwrap();

        assert_eq!(loaded, registry);
    }

    #[test]
    fn test_load_minimal_json() {
        let json = r#"[
            {"name": "CRM", "is_base": true, "primary_key_field": "Email",
             "secondary_key_field": "Ref", "id_field": "Donor ID",
             "amount_field": "Amount", "date_field": "Date"},
            {"name": "Stripe", "primary_key_field": "Email", "id_field": "Charge",
             "amount_field": "Amount", "date_field": "Created"}
        ]"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platforms.json");
        std::fs::write(&path, json).unwrap();

        let registry = PlatformRegistry::from_file(&path).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(!registry.get("Stripe").unwrap().is_base);
        assert!(registry.get("Stripe").unwrap().column_mapping.is_empty());
    }

    #[test]
    fn test_unmapped_column() {
        let platform = create_test_platform("A", false).with_column("Recurring ID", NOT_MAPPED, "");

        assert!(!platform.mapping_for("Recurring ID").unwrap().is_mapped());
        assert!(platform.mapping_for("Donor City").is_none());
    }
}
