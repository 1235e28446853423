//! Provider registrations and per-call resolution scopes.
//!
//! The [`Container`] is filled while the kernel initializes and frozen behind an `Arc`
//! once serving begins. Every request and every event gets its own [`Scope`], which caches
//! the controller instances it builds so request-scoped state never leaks across calls.
use std::{collections::HashMap, fmt, sync::Arc};

use uuid::Uuid;

use crate::{
    config::manager::ConfigurationValues,
    core::{
        error::{KernelError, KernelResult},
        resolvers::ParameterResolver,
    },
    ports::{
        controller::{Controller, ControllerFactory},
        events::{EventDispatcher, EventListener, EventParser, EventTransformer},
        interceptor::{
            ErrorResponseInterceptor, EventInterceptor, RawEventInterceptor, RequestInterceptor,
            ResponseInterceptor,
        },
        security::{Authenticator, Authorizer, Guard},
        tracer::Tracer,
    },
};

/// Something a module or the application contributes to the container.
#[derive(Clone)]
pub enum Provider {
    Controller {
        token: String,
        factory: ControllerFactory,
    },
    RequestInterceptor(Arc<dyn RequestInterceptor>),
    ResponseInterceptor(Arc<dyn ResponseInterceptor>),
    ErrorResponseInterceptor(Arc<dyn ErrorResponseInterceptor>),
    RawEventInterceptor(Arc<dyn RawEventInterceptor>),
    EventInterceptor(Arc<dyn EventInterceptor>),
    ParameterResolver(Arc<dyn ParameterResolver>),
    Guard(Arc<dyn Guard>),
    EventParser(Arc<dyn EventParser>),
    EventListener(Arc<dyn EventListener>),
    EventTransformer(Arc<dyn EventTransformer>),
    EventDispatcher(Arc<dyn EventDispatcher>),
    Authenticator(Arc<dyn Authenticator>),
    Authorizer(Arc<dyn Authorizer>),
    Tracer(Arc<dyn Tracer>),
}

impl Provider {
    /// A controller built once per scope by `factory`.
    pub fn controller<F>(token: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Scope) -> Arc<dyn Controller> + Send + Sync + 'static,
    {
        Provider::Controller {
            token: token.into(),
            factory: Arc::new(factory),
        }
    }

    /// A controller shared by every scope.
    pub fn singleton_controller(token: impl Into<String>, controller: Arc<dyn Controller>) -> Self {
        Self::controller(token, move |_| controller.clone())
    }

    pub fn request_interceptor(interceptor: impl RequestInterceptor + 'static) -> Self {
        Provider::RequestInterceptor(Arc::new(interceptor))
    }

    pub fn response_interceptor(interceptor: impl ResponseInterceptor + 'static) -> Self {
        Provider::ResponseInterceptor(Arc::new(interceptor))
    }

    pub fn error_response_interceptor(
        interceptor: impl ErrorResponseInterceptor + 'static,
    ) -> Self {
        Provider::ErrorResponseInterceptor(Arc::new(interceptor))
    }

    pub fn raw_event_interceptor(interceptor: impl RawEventInterceptor + 'static) -> Self {
        Provider::RawEventInterceptor(Arc::new(interceptor))
    }

    pub fn event_interceptor(interceptor: impl EventInterceptor + 'static) -> Self {
        Provider::EventInterceptor(Arc::new(interceptor))
    }

    pub fn parameter_resolver(resolver: impl ParameterResolver + 'static) -> Self {
        Provider::ParameterResolver(Arc::new(resolver))
    }

    pub fn guard(guard: impl Guard + 'static) -> Self {
        Provider::Guard(Arc::new(guard))
    }

    pub fn event_parser(parser: impl EventParser + 'static) -> Self {
        Provider::EventParser(Arc::new(parser))
    }

    pub fn event_listener(listener: impl EventListener + 'static) -> Self {
        Provider::EventListener(Arc::new(listener))
    }

    pub fn authenticator(authenticator: impl Authenticator + 'static) -> Self {
        Provider::Authenticator(Arc::new(authenticator))
    }

    pub fn authorizer(authorizer: impl Authorizer + 'static) -> Self {
        Provider::Authorizer(Arc::new(authorizer))
    }

    pub fn tracer(tracer: impl Tracer + 'static) -> Self {
        Provider::Tracer(Arc::new(tracer))
    }

    /// Human-readable description used in logs and registration errors.
    pub fn describe(&self) -> String {
        match self {
            Provider::Controller { token, .. } => format!("controller '{token}'"),
            Provider::RequestInterceptor(i) => format!("request interceptor '{}'", i.name()),
            Provider::ResponseInterceptor(i) => format!("response interceptor '{}'", i.name()),
            Provider::ErrorResponseInterceptor(i) => {
                format!("error response interceptor '{}'", i.name())
            }
            Provider::RawEventInterceptor(i) => format!("raw event interceptor '{}'", i.name()),
            Provider::EventInterceptor(i) => format!("event interceptor '{}'", i.name()),
            Provider::ParameterResolver(_) => "parameter resolver".to_string(),
            Provider::Guard(guard) => format!("guard '{}'", guard.keyname()),
            Provider::EventParser(_) => "event parser".to_string(),
            Provider::EventListener(_) => "event listener".to_string(),
            Provider::EventTransformer(_) => "event transformer".to_string(),
            Provider::EventDispatcher(_) => "event dispatcher".to_string(),
            Provider::Authenticator(_) => "authenticator".to_string(),
            Provider::Authorizer(_) => "authorizer".to_string(),
            Provider::Tracer(_) => "tracer".to_string(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A provider registered with the kernel up front, optionally conditional on a module.
///
/// A registration scoped to a module is installed only if that module ends up instantiated.
#[derive(Debug, Clone)]
pub struct TaggedRegistration {
    pub provider: Provider,
    pub module_scope: Option<String>,
}

impl TaggedRegistration {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            module_scope: None,
        }
    }

    pub fn scoped_to(mut self, module_keyname: impl Into<String>) -> Self {
        self.module_scope = Some(module_keyname.into());
        self
    }
}

impl From<Provider> for TaggedRegistration {
    fn from(provider: Provider) -> Self {
        Self::new(provider)
    }
}

/// Every provider known to the kernel, grouped by role. Chains keep registration order.
#[derive(Default)]
pub struct Container {
    controllers: HashMap<String, ControllerFactory>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error_response_interceptors: Vec<Arc<dyn ErrorResponseInterceptor>>,
    raw_event_interceptors: Vec<Arc<dyn RawEventInterceptor>>,
    event_interceptors: Vec<Arc<dyn EventInterceptor>>,
    parameter_resolvers: Vec<Arc<dyn ParameterResolver>>,
    guards: HashMap<String, Arc<dyn Guard>>,
    event_parsers: Vec<Arc<dyn EventParser>>,
    event_listeners: Vec<Arc<dyn EventListener>>,
    event_transformer: Option<Arc<dyn EventTransformer>>,
    event_dispatcher: Option<Arc<dyn EventDispatcher>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    tracers: Vec<Arc<dyn Tracer>>,
    configuration: ConfigurationValues,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a provider.
    ///
    /// Controller tokens and guard keynames must be unique, and each single-instance
    /// collaborator (authenticator, authorizer, event transformer, event dispatcher) may be
    /// provided only once. Violations fail with [`KernelError::ProviderRegistration`].
    pub fn register(&mut self, provider: Provider) -> KernelResult<()> {
        tracing::debug!("Registering {}", provider.describe());

        let description = provider.describe();
        let duplicate = |reason: &str| KernelError::ProviderRegistration {
            provider: description.clone(),
            reason: reason.to_string(),
        };

        match provider {
            Provider::Controller { token, factory } => {
                if self.controllers.contains_key(&token) {
                    return Err(duplicate("a controller with this token is already registered"));
                }
                self.controllers.insert(token, factory);
            }
            Provider::RequestInterceptor(i) => self.request_interceptors.push(i),
            Provider::ResponseInterceptor(i) => self.response_interceptors.push(i),
            Provider::ErrorResponseInterceptor(i) => self.error_response_interceptors.push(i),
            Provider::RawEventInterceptor(i) => self.raw_event_interceptors.push(i),
            Provider::EventInterceptor(i) => self.event_interceptors.push(i),
            Provider::ParameterResolver(resolver) => self.parameter_resolvers.push(resolver),
            Provider::Guard(guard) => {
                let keyname = guard.keyname().to_string();
                if self.guards.contains_key(&keyname) {
                    return Err(duplicate("a guard with this keyname is already registered"));
                }
                self.guards.insert(keyname, guard);
            }
            Provider::EventParser(parser) => self.event_parsers.push(parser),
            Provider::EventListener(listener) => self.event_listeners.push(listener),
            Provider::EventTransformer(transformer) => {
                Self::set_once(&mut self.event_transformer, transformer)
                    .map_err(|_| duplicate("an event transformer is already registered"))?;
            }
            Provider::EventDispatcher(dispatcher) => {
                Self::set_once(&mut self.event_dispatcher, dispatcher)
                    .map_err(|_| duplicate("an event dispatcher is already registered"))?;
            }
            Provider::Authenticator(authenticator) => {
                Self::set_once(&mut self.authenticator, authenticator)
                    .map_err(|_| duplicate("an authenticator is already registered"))?;
            }
            Provider::Authorizer(authorizer) => {
                Self::set_once(&mut self.authorizer, authorizer)
                    .map_err(|_| duplicate("an authorizer is already registered"))?;
            }
            Provider::Tracer(tracer) => self.tracers.push(tracer),
        }

        Ok(())
    }

    fn set_once<T: ?Sized>(slot: &mut Option<Arc<T>>, value: Arc<T>) -> Result<(), Arc<T>> {
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn has_controller(&self, token: &str) -> bool {
        self.controllers.contains_key(token)
    }

    pub fn controller_factory(&self, token: &str) -> Option<&ControllerFactory> {
        self.controllers.get(token)
    }

    pub fn request_interceptors(&self) -> &[Arc<dyn RequestInterceptor>] {
        &self.request_interceptors
    }

    pub fn response_interceptors(&self) -> &[Arc<dyn ResponseInterceptor>] {
        &self.response_interceptors
    }

    pub fn error_response_interceptors(&self) -> &[Arc<dyn ErrorResponseInterceptor>] {
        &self.error_response_interceptors
    }

    pub fn raw_event_interceptors(&self) -> &[Arc<dyn RawEventInterceptor>] {
        &self.raw_event_interceptors
    }

    pub fn event_interceptors(&self) -> &[Arc<dyn EventInterceptor>] {
        &self.event_interceptors
    }

    pub fn parameter_resolvers(&self) -> &[Arc<dyn ParameterResolver>] {
        &self.parameter_resolvers
    }

    pub fn guard(&self, keyname: &str) -> Option<&Arc<dyn Guard>> {
        self.guards.get(keyname)
    }

    pub fn event_parsers(&self) -> &[Arc<dyn EventParser>] {
        &self.event_parsers
    }

    pub fn event_listeners(&self) -> &[Arc<dyn EventListener>] {
        &self.event_listeners
    }

    pub fn event_transformer(&self) -> Option<&Arc<dyn EventTransformer>> {
        self.event_transformer.as_ref()
    }

    pub fn event_dispatcher(&self) -> Option<&Arc<dyn EventDispatcher>> {
        self.event_dispatcher.as_ref()
    }

    pub fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.authenticator.as_ref()
    }

    pub fn authorizer(&self) -> Option<&Arc<dyn Authorizer>> {
        self.authorizer.as_ref()
    }

    pub fn tracers(&self) -> &[Arc<dyn Tracer>] {
        &self.tracers
    }

    /// Resolved module configuration. Empty until the configuration phase has run.
    pub fn configuration(&self) -> &ConfigurationValues {
        &self.configuration
    }

    pub fn set_configuration(&mut self, configuration: ConfigurationValues) {
        self.configuration = configuration;
    }

    /// Open a fresh resolution scope over this container.
    pub fn create_scope(self: &Arc<Self>) -> Scope {
        Scope::new(self.clone())
    }
}

/// Per-call resolution context.
pub struct Scope {
    id: Uuid,
    container: Arc<Container>,
    instances: scc::HashMap<String, Arc<dyn Controller>>,
}

impl Scope {
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            id: Uuid::new_v4(),
            container,
            instances: scc::HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Resolve the controller bound to `token`, building it at most once per scope.
    pub async fn resolve_controller(&self, token: &str) -> KernelResult<Arc<dyn Controller>> {
        if let Some(entry) = self.instances.get_async(token).await {
            return Ok(entry.get().clone());
        }

        let factory = self.container.controller_factory(token).ok_or_else(|| {
            KernelError::ProviderRegistration {
                provider: format!("controller '{token}'"),
                reason: "no controller is registered under this token".to_string(),
            }
        })?;

        let instance = factory(self);
        match self
            .instances
            .insert_async(token.to_string(), instance.clone())
            .await
        {
            Ok(()) => Ok(instance),
            // Another task of this scope won the race; keep its instance.
            Err(_) => Ok(self
                .instances
                .get_async(token)
                .await
                .map(|entry| entry.get().clone())
                .unwrap_or(instance)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::core::http::Outcome;

    struct Echo;

    #[async_trait]
    impl Controller for Echo {
        async fn invoke(&self, member: &str, _arguments: Vec<Value>) -> KernelResult<Outcome> {
            Ok(Outcome::from(member))
        }
    }

    struct NamedGuard(&'static str);

    #[async_trait]
    impl Guard for NamedGuard {
        fn keyname(&self) -> &str {
            self.0
        }

        async fn is_authorized(
            &self,
            _request: &crate::core::http::Request,
            _identity: Option<&crate::core::http::Identity>,
            _options: &Value,
        ) -> KernelResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_duplicate_controller_and_guard_are_rejected() {
        let mut container = Container::new();
        container
            .register(Provider::singleton_controller("echo", Arc::new(Echo)))
            .unwrap();
        container.register(Provider::guard(NamedGuard("admin"))).unwrap();

        assert!(matches!(
            container.register(Provider::singleton_controller("echo", Arc::new(Echo))),
            Err(KernelError::ProviderRegistration { .. })
        ));
        assert!(matches!(
            container.register(Provider::guard(NamedGuard("admin"))),
            Err(KernelError::ProviderRegistration { .. })
        ));
        assert!(container.guard("admin").is_some());
    }

    #[tokio::test]
    async fn test_scope_builds_controller_once_per_scope() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();

        let mut container = Container::new();
        container
            .register(Provider::controller("echo", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(Echo)
            }))
            .unwrap();
        let container = Arc::new(container);

        let scope = container.create_scope();
        scope.resolve_controller("echo").await.unwrap();
        scope.resolve_controller("echo").await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let other = container.create_scope();
        other.resolve_controller("echo").await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_ne!(scope.id(), other.id());

        assert!(scope.resolve_controller("missing").await.is_err());
    }
}
