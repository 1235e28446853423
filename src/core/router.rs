//! Route registration and request execution.
use std::sync::Arc;

use http::Method;

use crate::{
    core::{
        container::Scope,
        error::{KernelError, KernelResult},
        http::{Request, Response},
        resolvers::ResolverChain,
        route::Route,
        trie::PathTrie,
    },
    ports::security::{Authenticator, Authorizer},
    utils::url::split_path,
};

/// Owns the route trie and runs the per-request routing algorithm.
///
/// Routes are registered while the kernel initializes; afterwards the router is only read,
/// so lookups need no locking.
pub struct Router {
    trie: PathTrie,
    resolvers: ResolverChain,
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
}

impl Router {
    pub fn new(
        resolvers: ResolverChain,
        authenticator: Arc<dyn Authenticator>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            trie: PathTrie::new(),
            resolvers,
            authenticator,
            authorizer,
        }
    }

    /// Bind `route` to `(path, method)`.
    ///
    /// Every declared argument must be claimed by a resolver. Re-registering an existing
    /// `(path, method)` pair replaces the earlier binding.
    pub fn register(&mut self, path: &str, method: Method, route: Route) -> KernelResult<()> {
        self.resolvers.validate(&route)?;

        let description = route.describe();
        let segments = split_path(path);
        if let Some(previous) = self.trie.add(&segments, method.clone(), Arc::new(route))? {
            tracing::warn!(
                "Route {} {} rebound from {} to {}",
                method,
                path,
                previous.describe(),
                description
            );
        } else {
            tracing::debug!("Registered route {} {} -> {}", method, path, description);
        }

        Ok(())
    }

    pub fn route_count(&self) -> usize {
        self.trie.route_count()
    }

    pub fn trie(&self) -> &PathTrie {
        &self.trie
    }

    /// Look up the route for `method` and `path` without executing it.
    pub fn find(&self, method: &Method, path: &str) -> Option<&Arc<Route>> {
        self.trie
            .find(&split_path(path), method)
            .map(|method_node| method_node.route())
    }

    /// Route and run a request: lookup, authentication, parameter resolution,
    /// authorization, invocation, then normalization of the handler's return value.
    pub async fn execute(&self, request: &Request, scope: &Scope) -> KernelResult<Response> {
        let path = request.path();
        let segments = split_path(&path);

        let method_node =
            self.trie
                .find(&segments, &request.method)
                .ok_or_else(|| KernelError::NotFound {
                    method: request.method.clone(),
                    path: path.clone(),
                })?;
        let route = method_node.route();
        let route_parameters = self.trie.route_parameters(method_node, &segments);

        tracing::debug!(
            route = %route.describe(),
            parameters = ?route_parameters,
            "Matched {} {}",
            request.method,
            path
        );

        let controller = scope.resolve_controller(&route.controller).await?;

        let identity = self
            .authenticator
            .authenticate(request, &route.metadata, scope)
            .await?;

        let arguments = self
            .resolvers
            .resolve_all(route, request, &route_parameters, identity.as_ref())
            .await?;

        let authorized = self
            .authorizer
            .is_authorized(request, &route.metadata, scope, identity.as_ref())
            .await?;
        if !authorized {
            tracing::debug!(route = %route.describe(), "Authorization refused");
            return Err(KernelError::Forbidden);
        }

        let outcome = controller.invoke(&route.member, arguments).await?;
        Ok(outcome.into_response())
    }
}
