use async_trait::async_trait;
use serde_json::Value;

use crate::core::{
    container::Scope,
    error::KernelResult,
    http::{Identity, Request},
    route::RouteMetadata,
};

/// Resolves the caller's identity. Called once per request, before parameter resolution.
///
/// `Ok(None)` means an anonymous caller. Errors propagate unchanged to the kernel, which
/// converts them into a response.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        request: &Request,
        metadata: &RouteMetadata,
        scope: &Scope,
    ) -> KernelResult<Option<Identity>>;
}

/// Decides whether the request may reach its handler. Called once per request, after
/// parameter resolution and before invocation. `false` becomes a 403.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(
        &self,
        request: &Request,
        metadata: &RouteMetadata,
        scope: &Scope,
        identity: Option<&Identity>,
    ) -> KernelResult<bool>;
}

/// A per-route authorization check, referenced from route metadata by keyname.
#[async_trait]
pub trait Guard: Send + Sync {
    fn keyname(&self) -> &str;

    /// `options` is the guard entry's `options` value from the route metadata.
    async fn is_authorized(
        &self,
        request: &Request,
        identity: Option<&Identity>,
        options: &Value,
    ) -> KernelResult<bool>;
}
