//! Default authentication and authorization collaborators.
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    core::{
        container::Scope,
        error::KernelResult,
        http::{Identity, Request},
        route::{GUARDS_METADATA_KEY, RouteMetadata},
    },
    ports::security::{Authenticator, Authorizer},
};

/// Treats every caller as anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(
        &self,
        _request: &Request,
        _metadata: &RouteMetadata,
        _scope: &Scope,
    ) -> KernelResult<Option<Identity>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct GuardEntry {
    keyname: String,
    #[serde(default)]
    options: Value,
}

/// Evaluates the guards listed under the route's `guards` metadata.
///
/// A route without guards is authorized. Otherwise every guard runs and all must agree; a
/// guard that is not registered, or that fails, counts as a refusal.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardAuthorizer;

impl GuardAuthorizer {
    /// `None` when the metadata entry is malformed.
    fn guard_entries(metadata: &RouteMetadata) -> Option<Vec<GuardEntry>> {
        let Some(guards) = metadata.get(GUARDS_METADATA_KEY) else {
            return Some(Vec::new());
        };

        serde_json::from_value::<Vec<GuardEntry>>(guards.clone())
            .inspect_err(|e| {
                tracing::error!("Malformed '{}' route metadata: {}", GUARDS_METADATA_KEY, e)
            })
            .ok()
    }
}

#[async_trait]
impl Authorizer for GuardAuthorizer {
    async fn is_authorized(
        &self,
        request: &Request,
        metadata: &RouteMetadata,
        scope: &Scope,
        identity: Option<&Identity>,
    ) -> KernelResult<bool> {
        let Some(entries) = Self::guard_entries(metadata) else {
            return Ok(false);
        };

        let mut authorized = true;
        for entry in entries {
            let Some(guard) = scope.container().guard(&entry.keyname) else {
                tracing::error!("Guard '{}' is not registered", entry.keyname);
                authorized = false;
                continue;
            };

            match guard.is_authorized(request, identity, &entry.options).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Guard '{}' refused the request", entry.keyname);
                    authorized = false;
                }
                Err(e) => {
                    tracing::error!("Guard '{}' failed: {}", entry.keyname, e);
                    authorized = false;
                }
            }
        }

        Ok(authorized)
    }
}
