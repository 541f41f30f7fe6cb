//! Module catalog records
//!
//! A ModuleRecord describes one published version of a module - what it is
//! called, which tier it requires, and the migration groups that install it.

use crate::{ModuleKey, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which schema plane a migration group touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationScope {
    /// Shared control-plane schema, applied once per module version.
    ControlPlane,
    /// Per-tenant schema, applied inside each tenant partition.
    TenantPlane,
}

impl MigrationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlPlane => "control_plane",
            Self::TenantPlane => "tenant_plane",
        }
    }
}

impl std::fmt::Display for MigrationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ordered group of schema changes in a module descriptor.
///
/// Group order within the descriptor is install order; uninstall reverses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationGroup {
    /// Plane this group applies to
    pub scope: MigrationScope,

    /// Stable identifier, unique within the descriptor
    pub identifier: String,

    /// Primary table the group creates or alters (informational)
    pub table_hint: Option<String>,

    /// Whether the group has a usable down-migration
    pub reversible: bool,
}

impl MigrationGroup {
    /// Create a reversible group with no table hint
    pub fn new(scope: MigrationScope, identifier: impl Into<String>) -> Self {
        Self {
            scope,
            identifier: identifier.into(),
            table_hint: None,
            reversible: true,
        }
    }

    pub fn with_table_hint(mut self, hint: impl Into<String>) -> Self {
        self.table_hint = Some(hint.into());
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }
}

/// One published version of a module.
///
/// Records are immutable once published; a new version is a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Stable module key, shared by all versions
    pub key: ModuleKey,

    /// Human-readable name for consoles and audit output
    pub display_name: String,

    /// Semantic version of this record
    pub version: semver::Version,

    /// Lowest subscription tier allowed to install this version
    pub min_tier: Tier,

    /// Ordered migration groups that install this version
    pub migration_groups: Vec<MigrationGroup>,

    /// Deprecated versions stay resolvable but reject new installs
    pub deprecated: bool,

    /// When this record was published
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl ModuleRecord {
    /// Create a record with defaults suitable for publishing
    pub fn new(key: ModuleKey, display_name: impl Into<String>, version: semver::Version) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            version,
            min_tier: Tier::default(),
            migration_groups: Vec::new(),
            deprecated: false,
            published_at: chrono::Utc::now(),
        }
    }

    pub fn with_min_tier(mut self, tier: Tier) -> Self {
        self.min_tier = tier;
        self
    }

    pub fn with_migration_group(mut self, group: MigrationGroup) -> Self {
        self.migration_groups.push(group);
        self
    }

    /// Validate the record before publishing
    pub fn validate(&self) -> Result<(), ModuleValidationError> {
        if self.display_name.is_empty() {
            return Err(ModuleValidationError::EmptyDisplayName);
        }

        if self.migration_groups.is_empty() {
            return Err(ModuleValidationError::NoMigrationGroups);
        }

        let mut seen = HashSet::new();
        for group in &self.migration_groups {
            if group.identifier.is_empty() {
                return Err(ModuleValidationError::EmptyGroupIdentifier);
            }
            if !seen.insert(group.identifier.as_str()) {
                return Err(ModuleValidationError::DuplicateGroupIdentifier(
                    group.identifier.clone(),
                ));
            }
        }

        // Control-plane groups run before any tenant-plane group; a descriptor
        // that interleaves them cannot be planned.
        let mut tenant_seen = false;
        for group in &self.migration_groups {
            match group.scope {
                MigrationScope::TenantPlane => tenant_seen = true,
                MigrationScope::ControlPlane if tenant_seen => {
                    return Err(ModuleValidationError::ControlPlaneAfterTenantPlane(
                        group.identifier.clone(),
                    ));
                }
                MigrationScope::ControlPlane => {}
            }
        }

        Ok(())
    }
}

/// Module record validation errors
#[derive(Debug, thiserror::Error)]
pub enum ModuleValidationError {
    #[error("Display name cannot be empty")]
    EmptyDisplayName,

    #[error("Module must declare at least one migration group")]
    NoMigrationGroups,

    #[error("Migration group identifier cannot be empty")]
    EmptyGroupIdentifier,

    #[error("Duplicate migration group identifier: {0}")]
    DuplicateGroupIdentifier(String),

    #[error("Control-plane group '{0}' declared after a tenant-plane group")]
    ControlPlaneAfterTenantPlane(String),
}
