// ⚙️ Resolution Engine - Cross-platform identity resolution pipeline
//
//   validate → Key Index → Signature Matcher → Union-Merger
//            → Canonical ID Assigner → Duplicate Flagger
//
// Phases run strictly in that order on one thread. Each phase reads the
// finished output of the previous one; nothing partial is ever returned.

use crate::assign::{assign_platform, IdSource};
use crate::deduplication::flag_duplicates;
use crate::error::{ResolutionError, Result};
use crate::identity::{merge_identities, KeyIdentityMap, DEFAULT_ID_DELIMITER};
use crate::index::KeyIndex;
use crate::platform::{Platform, PlatformRegistry};
use crate::progress::{
    CancellationToken, NoProgress, ProgressSink, ProgressTracker, DEFAULT_PROGRESS_INTERVAL,
};
use crate::record::{Dataset, PlatformRecord, PlatformRecords};
use crate::schema::{DataQualityCounters, SchemaValidator};
use crate::signature::match_signatures;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::mpsc;
use std::thread;
use tracing::{info, warn};

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOptions {
    /// Rows between progress notifications
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Separator between atomic ids in a merged Relationship ID
    #[serde(default = "default_id_delimiter")]
    pub id_delimiter: String,

    /// Run the Signature Matcher and Duplicate Flagger
    #[serde(default = "default_detect_duplicates")]
    pub detect_duplicates: bool,
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_id_delimiter() -> String {
    DEFAULT_ID_DELIMITER.to_string()
}

fn default_detect_duplicates() -> bool {
    true
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        ResolutionOptions {
            progress_interval: default_progress_interval(),
            id_delimiter: default_id_delimiter(),
            detect_duplicates: default_detect_duplicates(),
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRowCount {
    pub platform: String,
    pub is_base: bool,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSourceCounts {
    pub identity: usize,
    pub own_row_id: usize,
    pub anchor_key: usize,
    pub fallback: usize,
}

impl IdSourceCounts {
    fn record(&mut self, source: IdSource) {
        match source {
            IdSource::Identity => self.identity += 1,
            IdSource::OwnRowId => self.own_row_id += 1,
            IdSource::AnchorKey => self.anchor_key += 1,
            IdSource::Attributes | IdSource::Synthesized => self.fallback += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub run_id: String,
    pub resolved_at: DateTime<Utc>,
    pub platforms: Vec<PlatformRowCount>,
    pub total_rows: usize,
    /// Distinct Relationship IDs across all platforms
    pub donors: usize,
    /// CanonicalIDs joining more than one base row id
    pub merged_identities: usize,
    pub id_sources: IdSourceCounts,
    pub duplicate_detection: bool,
    pub duplicates: usize,
    pub quality: DataQualityCounters,
}

impl ResolutionReport {
    pub fn summary(&self) -> String {
        format!(
            "Resolution {}: {} rows across {} platforms, {} donors ({} merged identities, {} fallback ids), {} base duplicates",
            self.run_id,
            self.total_rows,
            self.platforms.len(),
            self.donors,
            self.merged_identities,
            self.id_sources.fallback,
            self.duplicates
        )
    }
}

// ============================================================================
// RESOLUTION (output)
// ============================================================================

#[derive(Debug, Clone)]
pub struct Resolution {
    pub base: PlatformRecords,
    /// Non-base platforms in configuration order
    pub others: Vec<PlatformRecords>,
    pub identities: KeyIdentityMap,
    pub report: ResolutionReport,
}

impl Resolution {
    /// All platforms, base first
    pub fn platforms(&self) -> impl Iterator<Item = &PlatformRecords> {
        std::iter::once(&self.base).chain(self.others.iter())
    }

    /// All records, base first
    pub fn records(&self) -> impl Iterator<Item = &PlatformRecord> {
        self.platforms().flat_map(|p| p.records.iter())
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformRecords> {
        self.platforms().find(|p| p.platform.name == name)
    }

    /// Base rows that are not already captured by another export
    pub fn deduplicated_base(&self) -> impl Iterator<Item = &PlatformRecord> {
        self.base.records.iter().filter(|r| !r.is_duplicate())
    }
}

// ============================================================================
// RESOLUTION ENGINE
// ============================================================================

pub struct ResolutionEngine {
    registry: PlatformRegistry,
    options: ResolutionOptions,
    validator: SchemaValidator,
}

impl ResolutionEngine {
    /// Create engine with default options
    pub fn new(registry: PlatformRegistry) -> Self {
        Self::with_options(registry, ResolutionOptions::default())
    }

    pub fn with_options(registry: PlatformRegistry, options: ResolutionOptions) -> Self {
        ResolutionEngine {
            registry,
            options,
            validator: SchemaValidator::new(),
        }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ResolutionOptions {
        &self.options
    }

    /// Resolve without progress reporting or cancellation
    pub fn resolve(&self, datasets: &[Dataset]) -> Result<Resolution> {
        self.resolve_with(datasets, &NoProgress, &CancellationToken::new())
    }

    /// Resolve every dataset; several datasets for one platform are
    /// concatenated in the order given
    pub fn resolve_with(
        &self,
        datasets: &[Dataset],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let (mut base, mut others, quality) = self.prepare(datasets)?;

        let base_rows = base.len();
        let other_rows: usize = others.iter().map(PlatformRecords::len).sum();
        let detect = self.options.detect_duplicates;
        // index + merge + assign, then matcher + flagger when detecting
        let mut total_steps = 3 * base_rows + 2 * other_rows;
        if detect {
            total_steps += other_rows + base_rows;
        }

        let mut tracker =
            ProgressTracker::new(sink, cancel, total_steps, self.options.progress_interval);
        tracker.start();

        info!(base = %base.platform.name, base_rows, other_rows, "phase 1: building key index");
        let index = KeyIndex::build(&base, detect, &mut tracker)?;

        let matches = if detect {
            info!("phase 2: matching cross-platform signatures");
            Some(match_signatures(&index, &others, &mut tracker)?)
        } else {
            None
        };

        info!("phase 3: merging identities");
        let identities = merge_identities(&base, &others, &mut tracker)?;

        info!("phase 4: assigning relationship ids");
        let delimiter = self.options.id_delimiter.as_str();
        let base_assignments = assign_platform(&base, &identities, delimiter, &mut tracker)?;
        let mut other_assignments = Vec::with_capacity(others.len());
        for platform in &others {
            other_assignments.push(assign_platform(platform, &identities, delimiter, &mut tracker)?);
        }

        let flags = match &matches {
            Some(matches) => {
                info!("phase 5: flagging base duplicates");
                Some(flag_duplicates(&index, matches, &mut tracker)?)
            }
            None => None,
        };

        tracker.check_cancelled()?;

        // Stamp annotations only once every phase has succeeded
        let mut id_sources = IdSourceCounts::default();
        for (position, (record, assignment)) in
            base.records.iter_mut().zip(base_assignments).enumerate()
        {
            id_sources.record(assignment.source);
            record.relationship_id = assignment.relationship_id;
            record.unique_transaction_signature = index.signature(position).cloned();
            record.duplicate_flag = flags.as_ref().map(|f| f[position]);
        }
        for (platform_index, (platform, assignments)) in
            others.iter_mut().zip(other_assignments).enumerate()
        {
            for (position, (record, assignment)) in
                platform.records.iter_mut().zip(assignments).enumerate()
            {
                id_sources.record(assignment.source);
                record.relationship_id = assignment.relationship_id;
                if let Some(matches) = &matches {
                    record.matched_signatures = matches.per_record[platform_index][position].clone();
                }
            }
        }

        let report = self.build_report(&base, &others, &identities, id_sources, quality);
        info!("{}", report.summary());
        tracker.finish();

        Ok(Resolution {
            base,
            others,
            identities,
            report,
        })
    }

    /// Run the resolution on a background thread
    pub fn spawn(self, datasets: Vec<Dataset>) -> ResolutionHandle {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = thread::spawn(move || self.resolve_with(&datasets, &sender, &worker_cancel));

        ResolutionHandle {
            progress: receiver,
            cancel,
            handle,
        }
    }

    /// Validate configuration and datasets, then derive records
    fn prepare(
        &self,
        datasets: &[Dataset],
    ) -> Result<(PlatformRecords, Vec<PlatformRecords>, DataQualityCounters)> {
        let base_platform = self.registry.base()?;

        for dataset in datasets {
            let platform = self.registry.get(&dataset.platform).ok_or_else(|| {
                ResolutionError::UnknownPlatform {
                    platform: dataset.platform.clone(),
                }
            })?;
            self.validator.validate_fields(platform, dataset)?;
        }

        if !datasets.iter().any(|d| d.platform == base_platform.name) {
            return Err(ResolutionError::MissingDataset {
                platform: base_platform.name.clone(),
            });
        }

        let mut quality = DataQualityCounters::default();
        let base = self.collect_records(base_platform, datasets, &mut quality);

        let mut others = Vec::new();
        for platform in self.registry.non_base() {
            if !datasets.iter().any(|d| d.platform == platform.name) {
                info!(platform = %platform.name, "no dataset supplied, skipping platform");
                continue;
            }
            others.push(self.collect_records(platform, datasets, &mut quality));
        }

        Ok((base, others, quality))
    }

    fn collect_records(
        &self,
        platform: &Platform,
        datasets: &[Dataset],
        quality: &mut DataQualityCounters,
    ) -> PlatformRecords {
        let mut records = Vec::new();
        let mut counters = DataQualityCounters::default();

        for dataset in datasets.iter().filter(|d| d.platform == platform.name) {
            counters.add(&self.validator.inspect(platform, dataset));
            for row in &dataset.rows {
                let position = records.len();
                records.push(PlatformRecord::from_row(platform, position, row));
            }
        }

        if counters.has_issues() {
            warn!(platform = %platform.name, "data quality: {}", counters.summary());
        }
        quality.add(&counters);

        PlatformRecords {
            platform: platform.clone(),
            records,
        }
    }

    fn build_report(
        &self,
        base: &PlatformRecords,
        others: &[PlatformRecords],
        identities: &KeyIdentityMap,
        id_sources: IdSourceCounts,
        quality: DataQualityCounters,
    ) -> ResolutionReport {
        let platforms: Vec<PlatformRowCount> = std::iter::once(base)
            .chain(others.iter())
            .map(|p| PlatformRowCount {
                platform: p.platform.name.clone(),
                is_base: p.platform.is_base,
                rows: p.len(),
            })
            .collect();

        let donors: HashSet<&str> = std::iter::once(base)
            .chain(others.iter())
            .flat_map(|p| p.records.iter().map(|r| r.relationship_id.as_str()))
            .collect();

        ResolutionReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            resolved_at: Utc::now(),
            total_rows: platforms.iter().map(|p| p.rows).sum(),
            platforms,
            donors: donors.len(),
            merged_identities: identities.merged_count(),
            id_sources,
            duplicate_detection: self.options.detect_duplicates,
            duplicates: base.records.iter().filter(|r| r.is_duplicate()).count(),
            quality,
        }
    }
}

// ============================================================================
// BACKGROUND HANDLE
// ============================================================================

/// A resolution running on its own thread
pub struct ResolutionHandle {
    progress: mpsc::Receiver<u8>,
    cancel: CancellationToken,
    handle: thread::JoinHandle<Result<Resolution>>,
}

impl ResolutionHandle {
    /// Progress percentages, non-decreasing, ending with 100 on success
    pub fn progress(&self) -> &mpsc::Receiver<u8> {
        &self.progress
    }

    /// Request cancellation; the worker stops before its next row
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the whole run
    pub fn join(self) -> Result<Resolution> {
        self.handle
            .join()
            .unwrap_or(Err(ResolutionError::WorkerPanicked))
    }
}

// ============================================================================
// TESTS
// ============================================================================
