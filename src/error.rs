// ⛔ Resolution Errors
// Configuration problems abort a run before any phase starts; row-level
// problems never reach this type (they become absent values instead).

use thiserror::Error;

/// Error type for a resolution run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("configuration error: no platform is marked as the base platform")]
    NoBasePlatform,

    #[error("configuration error: more than one base platform configured ({})", names.join(", "))]
    MultipleBasePlatforms { names: Vec<String> },

    #[error("configuration error: platform '{platform}' is configured more than once")]
    DuplicatePlatform { platform: String },

    #[error("configuration error: platform '{platform}' references field '{field}' which is absent from its dataset")]
    MissingField { platform: String, field: String },

    #[error("configuration error: no dataset supplied for base platform '{platform}'")]
    MissingDataset { platform: String },

    #[error("configuration error: dataset supplied for unknown platform '{platform}'")]
    UnknownPlatform { platform: String },

    #[error("resolution cancelled")]
    Cancelled,

    #[error("resolution worker terminated unexpectedly")]
    WorkerPanicked,
}

impl ResolutionError {
    /// True for errors raised by validation before any phase runs
    pub fn is_configuration(&self) -> bool {
        !matches!(self, ResolutionError::Cancelled | ResolutionError::WorkerPanicked)
    }
}

pub type Result<T> = std::result::Result<T, ResolutionError>;
