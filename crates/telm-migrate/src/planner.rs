//! Migration plan construction
//!
//! The planner re-validates descriptor structure even though the catalog
//! validated it at publish time; a plan is only ever built from a descriptor
//! it has checked itself.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use telm_types::{MigrationScope, MigrationStep, ModuleKey, ModuleRecord, PlanDirection};

/// Ordered, validated steps for one (module, version, direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Module the plan installs or uninstalls
    pub module_key: ModuleKey,

    /// Version the plan was built from
    pub version: semver::Version,

    /// Direction the steps run in
    pub direction: PlanDirection,

    /// Steps in execution order, sequence numbers starting at 0
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Identifiers of steps that cannot be reverted once applied.
    pub fn irreversible_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|step| !step.reversible)
            .map(|step| step.identifier.as_str())
            .collect()
    }
}

/// Builds migration plans from module descriptors.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlanner;

impl MigrationPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build a plan for a module record in the given direction.
    ///
    /// Steps carry the executed order: for install that is every
    /// control-plane group before any tenant-plane group; for uninstall the
    /// exact reverse of the install order.
    pub fn plan(&self, record: &ModuleRecord, direction: PlanDirection) -> Result<MigrationPlan> {
        self.check_descriptor(record)?;

        // Partition preserves declared order within each scope
        let control = record
            .migration_groups
            .iter()
            .filter(|group| group.scope == MigrationScope::ControlPlane);
        let tenant = record
            .migration_groups
            .iter()
            .filter(|group| group.scope == MigrationScope::TenantPlane);
        let install_order: Vec<_> = control.chain(tenant).collect();

        let ordered: Vec<_> = match direction {
            PlanDirection::Install => install_order,
            PlanDirection::Uninstall => install_order.into_iter().rev().collect(),
        };

        let steps = ordered
            .into_iter()
            .enumerate()
            .map(|(sequence, group)| MigrationStep {
                sequence: sequence as u32,
                scope: group.scope,
                identifier: group.identifier.clone(),
                table_hint: group.table_hint.clone(),
                reversible: group.reversible,
            })
            .collect();

        Ok(MigrationPlan {
            module_key: record.key.clone(),
            version: record.version.clone(),
            direction,
            steps,
        })
    }

    fn check_descriptor(&self, record: &ModuleRecord) -> Result<()> {
        if record.migration_groups.is_empty() {
            return Err(self.malformed(record, "descriptor declares no migration groups"));
        }

        let mut seen = HashSet::new();
        for group in &record.migration_groups {
            if !seen.insert(group.identifier.as_str()) {
                return Err(self.malformed(
                    record,
                    format!("duplicate step identifier '{}'", group.identifier),
                ));
            }
        }

        let mut tenant_seen = false;
        for group in &record.migration_groups {
            match group.scope {
                MigrationScope::TenantPlane => tenant_seen = true,
                MigrationScope::ControlPlane if tenant_seen => {
                    return Err(self.malformed(
                        record,
                        format!(
                            "control-plane group '{}' declared after a tenant-plane group",
                            group.identifier
                        ),
                    ));
                }
                MigrationScope::ControlPlane => {}
            }
        }

        Ok(())
    }

    fn malformed(&self, record: &ModuleRecord, reason: impl Into<String>) -> PlanError {
        PlanError::MalformedDescriptor {
            key: record.key.clone(),
            version: record.version.clone(),
            reason: reason.into(),
        }
    }
}
