//! Property tests: usage counters never go negative and never pass a
//! non-zero limit, no matter what delta sequence arrives.

use proptest::prelude::*;
use semver::Version;
use telm_entitlement::{checked_usage_delta, EntitlementBackend, InMemoryEntitlementBackend};
use telm_types::{ModuleKey, TenantEntitlement, TenantId, Tier};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// Generate a delta sequence with plenty of rejection candidates.
fn arb_deltas() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-20i64..40, 0..50)
}

/// Apply one delta sequence through the reference function.
fn fold_reference(limit: u64, deltas: &[i64]) -> u64 {
    let mut count = 0u64;
    for &delta in deltas {
        if let Ok(new_count) = checked_usage_delta(count, limit, delta) {
            count = new_count;
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// The count stays within [0, limit] for every prefix of every sequence.
    #[test]
    fn count_stays_in_bounds(limit in 0u64..30, deltas in arb_deltas()) {
        let mut count = 0u64;
        for delta in deltas {
            match checked_usage_delta(count, limit, delta) {
                Ok(new_count) => count = new_count,
                // Rejection leaves the count where it was
                Err(_) => {}
            }
            if limit > 0 {
                prop_assert!(count <= limit);
            }
        }
    }

    /// An accepted delta changes the count by exactly that delta.
    #[test]
    fn accepted_delta_is_exact(limit in 0u64..30, count in 0u64..30, delta in -40i64..40) {
        if let Ok(new_count) = checked_usage_delta(count, limit, delta) {
            prop_assert_eq!(new_count as i128, count as i128 + delta as i128);
        }
    }

    /// The in-memory backend applies deltas exactly like the reference
    /// function, including which deltas it rejects.
    #[test]
    fn backend_matches_reference(limit in 0u64..30, deltas in arb_deltas()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");

        let final_count = runtime.block_on(async {
            let backend = InMemoryEntitlementBackend::new();
            let tenant = TenantId::new("T1");
            let module = ModuleKey::new("digital_card");
            backend
                .create(
                    TenantEntitlement::new(
                        tenant.clone(),
                        module.clone(),
                        Tier::BASIC,
                        Version::new(1, 0, 0),
                    )
                    .with_usage_limit(limit),
                )
                .await
                .expect("create");

            for delta in &deltas {
                // Rejections are expected; the count must simply not move
                let _ = backend.increment_usage(&tenant, &module, *delta).await;
            }

            backend
                .get(&tenant, &module)
                .await
                .expect("get")
                .expect("row")
                .usage_count
        });

        prop_assert_eq!(final_count, fold_reference(limit, &deltas));
    }
}
