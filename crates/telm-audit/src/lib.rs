//! TELM Audit - Scheduled usage reconciliation
//!
//! Incremental usage counting drifts: concurrent writers, partial failures
//! and out-of-band writes all leave the recorded count adrift of what the
//! tenant plane really holds. The auditor is the correcting loop. On a
//! fixed schedule it recomputes each tenant's actual usage through
//! [`UsageSource`] and overwrites the recorded count where the two
//! disagree; the audited value is authoritative over incremental counting.
//!
//! Corrections are reported as [`Discrepancy`] records and surface as
//! reconciliation events from the store, never silently absorbed, so
//! operators can spot abuse patterns in the drift itself.
//!
//! Audits run off the request path. A sweep that exceeds its budget is cut
//! off and deferred to the next scheduled tick.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod auditor;
pub mod error;
pub mod source;

// Re-exports
pub use auditor::{AuditorConfig, Discrepancy, UsageAuditor};
pub use error::{AuditError, Result};
pub use source::{MockUsageSource, UsageSource};
