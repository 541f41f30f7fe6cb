//! Catalog error types

use telm_types::{ModuleKey, ModuleValidationError};
use thiserror::Error;

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleKey),

    #[error("Version not found: {key} {version}")]
    VersionNotFound {
        key: ModuleKey,
        version: semver::Version,
    },

    #[error("Version already published: {key} {version}")]
    DuplicateVersion {
        key: ModuleKey,
        version: semver::Version,
    },

    #[error("No installable version of {0}: all versions are deprecated")]
    NoInstallableVersion(ModuleKey),

    #[error("Invalid module record: {0}")]
    InvalidModule(#[from] ModuleValidationError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
