//! Install authorization seam
//!
//! Authorization itself lives outside this workspace; the installer only
//! needs a yes/no answer during validation.

use async_trait::async_trait;
use telm_types::{ActorId, ModuleKey, TenantId};

/// Authorization check consulted while a job is validating
#[async_trait]
pub trait InstallAuthorizer: Send + Sync {
    /// Whether `actor` may install or uninstall `module` for `tenant`
    async fn is_authorized(&self, actor: &ActorId, tenant: &TenantId, module: &ModuleKey)
        -> bool;
}

/// Authorizer that allows every actor
pub struct AllowAllAuthorizer;

#[async_trait]
impl InstallAuthorizer for AllowAllAuthorizer {
    async fn is_authorized(
        &self,
        _actor: &ActorId,
        _tenant: &TenantId,
        _module: &ModuleKey,
    ) -> bool {
        true
    }
}

/// Authorizer that denies every actor
pub struct DenyAllAuthorizer;

#[async_trait]
impl InstallAuthorizer for DenyAllAuthorizer {
    async fn is_authorized(
        &self,
        _actor: &ActorId,
        _tenant: &TenantId,
        _module: &ModuleKey,
    ) -> bool {
        false
    }
}
