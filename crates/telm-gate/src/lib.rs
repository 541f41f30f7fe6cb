//! TELM Gate - Access decisions for gated domain operations
//!
//! The access gate is what a domain module consults before serving a gated
//! request: `gate.check(tenant, module, required_tier)`. It is a pure
//! decision function over the entitlement cache and never talks to the
//! store directly, so it stays cheap enough to call on every request.
//!
//! ## Store outage
//!
//! A cache miss during a backend outage is a distinct [`GateError::StoreUnavailable`]
//! outcome, never a denial: "you are not entitled" and "we cannot know right
//! now" must not be conflated. What happens next is the constructor-chosen
//! [`UnavailableFallback`]; there is no implicit fail-open.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod decision;
pub mod error;
pub mod gate;

// Re-exports
pub use decision::{decide, AccessDecision, DenialReason};
pub use error::{GateError, Result};
pub use gate::{AccessGate, UnavailableFallback};
