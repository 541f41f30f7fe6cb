//! End-to-end installation lifecycle tests
//!
//! Each test wires the full stack: in-memory catalog, entitlement store and
//! cache, mock tenant partition, and the installer driving one job through
//! its state machine.

use semver::Version;
use std::sync::Arc;
use telm_catalog::{InMemoryModuleCatalog, ModuleCatalog};
use telm_entitlement::{
    CacheConfig, EntitlementCache, EntitlementError, EntitlementStore, InMemoryEntitlementBackend,
};
use telm_installer::{
    AllowAllAuthorizer, InMemoryJobStore, MockTenantPartition, ModuleInstaller,
};
use telm_types::{
    ActorId, JobState, LifecycleEvent, MigrationGroup, MigrationScope, ModuleKey, ModuleRecord,
    TenantId, Tier,
};

struct Stack {
    catalog: Arc<InMemoryModuleCatalog>,
    store: Arc<EntitlementStore>,
    partition: Arc<MockTenantPartition>,
    installer: ModuleInstaller,
}

fn digital_card(version: Version) -> ModuleRecord {
    ModuleRecord::new(ModuleKey::new("digital_card"), "Digital Card", version)
        .with_migration_group(
            MigrationGroup::new(MigrationScope::ControlPlane, "card_products")
                .with_table_hint("card_products"),
        )
        .with_migration_group(
            MigrationGroup::new(MigrationScope::TenantPlane, "cards").with_table_hint("cards"),
        )
        .with_migration_group(MigrationGroup::new(
            MigrationScope::TenantPlane,
            "card_transactions",
        ))
}

async fn stack(partition: MockTenantPartition) -> Stack {
    let catalog = Arc::new(InMemoryModuleCatalog::new());
    catalog
        .register(digital_card(Version::new(1, 0, 0)))
        .await
        .unwrap();

    let backend = Arc::new(InMemoryEntitlementBackend::new());
    let cache = Arc::new(EntitlementCache::new(
        backend.clone(),
        CacheConfig::default(),
    ));
    let store = Arc::new(EntitlementStore::new(backend, cache));
    let partition = Arc::new(partition);

    let installer = ModuleInstaller::new(
        catalog.clone(),
        store.clone(),
        partition.clone(),
        Arc::new(AllowAllAuthorizer),
        Arc::new(InMemoryJobStore::new()),
    );

    Stack {
        catalog,
        store,
        partition,
        installer,
    }
}

fn admin() -> ActorId {
    ActorId::new("admin@platform")
}

#[tokio::test]
async fn completed_install_creates_a_basic_tier_entitlement() {
    let stack = stack(MockTenantPartition::new()).await;
    let tenant = TenantId::new("T1");
    let card = ModuleKey::new("digital_card");

    let job = stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    assert_eq!(job.state, JobState::Completed { no_op: false });
    assert!(job.steps.iter().all(|record| record.is_applied()));

    let entitlement = stack.store.get(&tenant, &card).await.unwrap().unwrap();
    assert_eq!(entitlement.tier, Tier(1));
    assert!(entitlement.enabled);
    assert_eq!(entitlement.usage_count, 0);
    assert_eq!(entitlement.installed_version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn repeated_install_keeps_a_single_entitlement_row() {
    let stack = stack(MockTenantPartition::new()).await;
    let tenant = TenantId::new("T1");
    let card = ModuleKey::new("digital_card");

    let first = stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();
    let second = stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    assert_eq!(first.state, JobState::Completed { no_op: false });
    assert_eq!(second.state, JobState::Completed { no_op: true });
    // The retry planned no steps, so nothing ran twice
    assert!(second.steps.is_empty());

    let rows = stack.store.list_for_tenant(&tenant).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn failed_tenant_plane_step_leaves_no_entitlement() {
    let stack = stack(MockTenantPartition::new().failing_apply("card_transactions")).await;
    let tenant = TenantId::new("T2");
    let card = ModuleKey::new("digital_card");

    let job = stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    assert!(matches!(job.state, JobState::Failed { .. }));
    assert!(stack.store.get(&tenant, &card).await.unwrap().is_none());
    assert!(stack.partition.is_empty().await);
}

#[tokio::test]
async fn rollback_restores_the_exact_pre_install_state() {
    let stack = stack(MockTenantPartition::new().failing_apply("ledger_balances")).await;
    let tenant = TenantId::new("T1");

    // An earlier module's state must survive a later module's rollback
    stack
        .installer
        .install(&tenant, &ModuleKey::new("digital_card"), &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();
    let control_before = stack.partition.control_plane_steps().await;
    let tenant_before = stack.partition.tenant_plane_steps(&tenant).await;

    stack
        .catalog
        .register(
            ModuleRecord::new(ModuleKey::new("ledger"), "Ledger", Version::new(1, 0, 0))
                .with_migration_group(MigrationGroup::new(
                    MigrationScope::ControlPlane,
                    "ledger_schema",
                ))
                .with_migration_group(MigrationGroup::new(
                    MigrationScope::TenantPlane,
                    "ledger_balances",
                )),
        )
        .await
        .unwrap();

    let job = stack
        .installer
        .install(&tenant, &ModuleKey::new("ledger"), &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    assert!(matches!(job.state, JobState::Failed { .. }));
    assert_eq!(stack.partition.control_plane_steps().await, control_before);
    assert_eq!(stack.partition.tenant_plane_steps(&tenant).await, tenant_before);
}

#[tokio::test]
async fn irreversible_step_parks_the_job_for_an_operator() {
    let stack = stack(MockTenantPartition::new().failing_apply("ledger_balances")).await;
    let tenant = TenantId::new("T1");
    let ledger = ModuleKey::new("ledger");

    stack
        .catalog
        .register(
            ModuleRecord::new(ledger.clone(), "Ledger", Version::new(1, 0, 0))
                .with_migration_group(MigrationGroup::new(
                    MigrationScope::ControlPlane,
                    "ledger_schema",
                ))
                .with_migration_group(
                    MigrationGroup::new(MigrationScope::TenantPlane, "ledger_entries")
                        .irreversible(),
                )
                .with_migration_group(MigrationGroup::new(
                    MigrationScope::TenantPlane,
                    "ledger_balances",
                )),
        )
        .await
        .unwrap();

    let job = stack
        .installer
        .install(&tenant, &ledger, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    match &job.state {
        JobState::ManualInterventionRequired { reason, unreverted } => {
            assert!(reason.contains("ledger_entries"));
            assert_eq!(unreverted, &vec![
                "ledger_entries".to_string(),
                "ledger_schema".to_string(),
            ]);
        }
        other => panic!("expected manual intervention, got {other:?}"),
    }

    // Nothing was reverted; an operator finishes from here
    assert_eq!(
        stack.partition.control_plane_steps().await,
        vec!["ledger_schema"]
    );
    assert_eq!(
        stack.partition.tenant_plane_steps(&tenant).await,
        vec!["ledger_entries"]
    );

    assert!(stack.store.get(&tenant, &ledger).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_revert_parks_the_job_with_remaining_steps() {
    let stack = stack(
        MockTenantPartition::new()
            .failing_apply("card_transactions")
            .failing_revert("cards"),
    )
    .await;
    let tenant = TenantId::new("T1");
    let card = ModuleKey::new("digital_card");

    let job = stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    match &job.state {
        JobState::ManualInterventionRequired { unreverted, .. } => {
            assert_eq!(unreverted, &vec![
                "cards".to_string(),
                "card_products".to_string(),
            ]);
        }
        other => panic!("expected manual intervention, got {other:?}"),
    }
    assert!(stack.store.get(&tenant, &card).await.unwrap().is_none());
}

#[tokio::test]
async fn install_emits_the_full_event_sequence() {
    let stack = stack(MockTenantPartition::new()).await;
    let mut events = stack.installer.subscribe();
    let tenant = TenantId::new("T1");
    let card = ModuleKey::new("digital_card");

    stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();

    let mut states = Vec::new();
    let mut completed = None;
    while let Ok(envelope) = events.try_recv() {
        match envelope.event {
            LifecycleEvent::JobStateChanged { state, .. } => states.push(state),
            LifecycleEvent::InstallCompleted { no_op, .. } => completed = Some(no_op),
            _ => {}
        }
    }

    assert_eq!(
        states,
        vec!["validating", "installing", "installing", "installing", "completed"]
    );
    assert_eq!(completed, Some(false));
}

#[tokio::test]
async fn usage_limit_rejects_an_increment_that_would_cross_it() {
    let stack = stack(MockTenantPartition::new()).await;
    let tenant = TenantId::new("T1");
    let card = ModuleKey::new("digital_card");

    stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();
    stack.store.set_usage_limit(&tenant, &card, 500).await.unwrap();

    let err = stack
        .store
        .increment_usage(&tenant, &card, 501)
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::LimitExceeded { .. }));

    let entitlement = stack.store.get(&tenant, &card).await.unwrap().unwrap();
    assert_eq!(entitlement.usage_count, 0);
}

#[tokio::test]
async fn uninstall_then_reinstall_round_trips_the_tenant() {
    let stack = stack(MockTenantPartition::new()).await;
    let tenant = TenantId::new("T1");
    let card = ModuleKey::new("digital_card");

    stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();
    let uninstall = stack
        .installer
        .uninstall(&tenant, &card, &admin())
        .await
        .unwrap();
    assert_eq!(uninstall.state, JobState::Completed { no_op: false });
    assert!(stack.partition.is_empty().await);

    let reinstall = stack
        .installer
        .install(&tenant, &card, &Version::new(1, 0, 0), &admin())
        .await
        .unwrap();
    assert_eq!(reinstall.state, JobState::Completed { no_op: false });

    let entitlement = stack.store.get(&tenant, &card).await.unwrap().unwrap();
    assert!(entitlement.enabled);
    assert_eq!(
        stack.partition.tenant_plane_steps(&tenant).await,
        vec!["cards", "card_transactions"]
    );

    // One row throughout; history lives in job records, not extra rows
    assert_eq!(stack.store.list_for_tenant(&tenant).await.unwrap().len(), 1);
}
