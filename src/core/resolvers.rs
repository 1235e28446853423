//! Parameter resolution: turning declared handler arguments into concrete values.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::{
    error::{KernelError, KernelResult},
    http::{Identity, Request},
    route::{ArgumentDescriptor, Route},
    trie::RouteParameters,
};

/// Produces the value of one declared argument.
///
/// A missing value resolves to `Value::Null`; it is up to the handler to reject it.
#[async_trait]
pub trait ParameterResolver: Send + Sync {
    fn supports(&self, argument: &ArgumentDescriptor) -> bool;

    async fn resolve(
        &self,
        argument: &ArgumentDescriptor,
        request: &Request,
        route_parameters: &RouteParameters,
        identity: Option<&Identity>,
    ) -> KernelResult<Value>;
}

/// Value captured by a `:name` path segment.
pub struct RouteParameterResolver;

#[async_trait]
impl ParameterResolver for RouteParameterResolver {
    fn supports(&self, argument: &ArgumentDescriptor) -> bool {
        matches!(argument, ArgumentDescriptor::RouteParameter { .. })
    }

    async fn resolve(
        &self,
        argument: &ArgumentDescriptor,
        _request: &Request,
        route_parameters: &RouteParameters,
        _identity: Option<&Identity>,
    ) -> KernelResult<Value> {
        let ArgumentDescriptor::RouteParameter { name } = argument else {
            return Ok(Value::Null);
        };

        Ok(route_parameters
            .get(name)
            .map(|value| Value::String(value.clone()))
            .unwrap_or(Value::Null))
    }
}

pub struct QueryParameterResolver;

#[async_trait]
impl ParameterResolver for QueryParameterResolver {
    fn supports(&self, argument: &ArgumentDescriptor) -> bool {
        matches!(argument, ArgumentDescriptor::QueryParameter { .. })
    }

    async fn resolve(
        &self,
        argument: &ArgumentDescriptor,
        request: &Request,
        _route_parameters: &RouteParameters,
        _identity: Option<&Identity>,
    ) -> KernelResult<Value> {
        let ArgumentDescriptor::QueryParameter { name } = argument else {
            return Ok(Value::Null);
        };

        Ok(request
            .query_parameter(name)
            .map(Value::String)
            .unwrap_or(Value::Null))
    }
}

/// The whole query string as a JSON object. Always an object, possibly empty.
pub struct QueryParametersResolver;

#[async_trait]
impl ParameterResolver for QueryParametersResolver {
    fn supports(&self, argument: &ArgumentDescriptor) -> bool {
        matches!(argument, ArgumentDescriptor::QueryParameters)
    }

    async fn resolve(
        &self,
        _argument: &ArgumentDescriptor,
        request: &Request,
        _route_parameters: &RouteParameters,
        _identity: Option<&Identity>,
    ) -> KernelResult<Value> {
        let parameters: Map<String, Value> = request
            .query_parameters()
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();

        Ok(Value::Object(parameters))
    }
}

pub struct BodyResolver;

#[async_trait]
impl ParameterResolver for BodyResolver {
    fn supports(&self, argument: &ArgumentDescriptor) -> bool {
        matches!(argument, ArgumentDescriptor::Body)
    }

    async fn resolve(
        &self,
        _argument: &ArgumentDescriptor,
        request: &Request,
        _route_parameters: &RouteParameters,
        _identity: Option<&Identity>,
    ) -> KernelResult<Value> {
        Ok(request.body.clone())
    }
}

/// The authenticated identity, or null for anonymous callers.
pub struct IdentityResolver;

#[async_trait]
impl ParameterResolver for IdentityResolver {
    fn supports(&self, argument: &ArgumentDescriptor) -> bool {
        matches!(argument, ArgumentDescriptor::Identity)
    }

    async fn resolve(
        &self,
        _argument: &ArgumentDescriptor,
        _request: &Request,
        _route_parameters: &RouteParameters,
        identity: Option<&Identity>,
    ) -> KernelResult<Value> {
        match identity {
            Some(identity) => serde_json::to_value(identity)
                .map_err(|e| KernelError::Other(eyre::Report::new(e))),
            None => Ok(Value::Null),
        }
    }
}

/// Ordered set of resolvers. The first resolver that supports an argument resolves it.
#[derive(Clone)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn ParameterResolver>>,
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ResolverChain {
    /// A chain without any resolver. Every argument is unsupported.
    pub fn empty() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// The five built-in resolvers.
    pub fn with_defaults() -> Self {
        Self {
            resolvers: vec![
                Arc::new(RouteParameterResolver),
                Arc::new(QueryParameterResolver),
                Arc::new(QueryParametersResolver),
                Arc::new(BodyResolver),
                Arc::new(IdentityResolver),
            ],
        }
    }

    /// Append a resolver. Built-ins keep precedence for the kinds they claim.
    pub fn push(&mut self, resolver: Arc<dyn ParameterResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn supports(&self, argument: &ArgumentDescriptor) -> bool {
        self.resolvers
            .iter()
            .any(|resolver| resolver.supports(argument))
    }

    /// Fail with [`KernelError::UnsupportedArgument`] if any argument of `route` is unclaimed.
    pub fn validate(&self, route: &Route) -> KernelResult<()> {
        match route
            .arguments
            .iter()
            .find(|argument| !self.supports(argument))
        {
            Some(argument) => Err(KernelError::UnsupportedArgument {
                route: route.describe(),
                kind: argument.kind().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Resolve a single argument.
    pub async fn resolve(
        &self,
        route: &Route,
        argument: &ArgumentDescriptor,
        request: &Request,
        route_parameters: &RouteParameters,
        identity: Option<&Identity>,
    ) -> KernelResult<Value> {
        let resolver = self
            .resolvers
            .iter()
            .find(|resolver| resolver.supports(argument))
            .ok_or_else(|| KernelError::UnsupportedArgument {
                route: route.describe(),
                kind: argument.kind().to_string(),
            })?;

        resolver
            .resolve(argument, request, route_parameters, identity)
            .await
    }

    /// Resolve every argument of `route` sequentially, in declaration order.
    pub async fn resolve_all(
        &self,
        route: &Route,
        request: &Request,
        route_parameters: &RouteParameters,
        identity: Option<&Identity>,
    ) -> KernelResult<Vec<Value>> {
        let mut values = Vec::with_capacity(route.arguments.len());
        for argument in &route.arguments {
            values.push(
                self.resolve(route, argument, request, route_parameters, identity)
                    .await?,
            );
        }
        Ok(values)
    }
}
