// Donor Linkage - Core Library
// Cross-platform identity resolution and duplicate-transaction detection
// for donation exports. Exposes all modules for the CLI, API server, and tests.

pub mod error;
pub mod platform;       // Platform descriptors + registry config
pub mod record;         // Datasets, records, parsing helpers
pub mod schema;         // Field validation + data-quality counters
pub mod progress;       // Progress sink, tracker, cancellation
pub mod index;          // Phase 1: Key Index Builder
pub mod signature;      // Phase 2: Signature Matcher
pub mod identity;       // Phase 3: Identity Union-Merger
pub mod assign;         // Phase 4: Canonical ID Assigner
pub mod deduplication;  // Phase 5: Duplicate Flagger
pub mod engine;
pub mod audit;
pub mod ingest;

// Re-export commonly used types
pub use error::{ResolutionError, Result};
pub use platform::{ColumnMapping, Platform, PlatformRegistry, NOT_MAPPED};
pub use record::{
    Dataset, DonorAttributes, DuplicateFlag, PlatformRecord, PlatformRecords, Row,
    normalize_key, parse_amount_cents, parse_date, format_cents, MAX_AMOUNT_CENTS,
};
pub use schema::{DataQualityCounters, SchemaValidator};
pub use progress::{
    CancellationToken, NoProgress, ProgressSink, ProgressTracker, DEFAULT_PROGRESS_INTERVAL,
};
pub use index::KeyIndex;
pub use signature::{TransactionSignature, SignatureMatches, match_signatures};
pub use identity::{
    CanonicalId, IdentityGraph, IdentityGroup, KeyIdentityMap,
    merge_identities, DEFAULT_ID_DELIMITER,
};
pub use assign::{Assignment, IdSource, assign_platform, relationship_id_for};
pub use deduplication::flag_duplicates;
pub use engine::{
    IdSourceCounts, PlatformRowCount, Resolution, ResolutionEngine, ResolutionHandle,
    ResolutionOptions, ResolutionReport,
};
pub use audit::{FragmentedId, GivingTotals, find_fragmented_ids};
pub use ingest::{ResolvedRow, load_dataset, read_relationship_ids, write_resolution};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
