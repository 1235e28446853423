//! The kernel: module lifecycle and the request and raw-event pipelines.
//!
//! Initialization runs four strictly ordered phases, each finished before the next begins:
//!
//! 1. **ModulesInitialized**: the import graph is walked depth-first (imports first, each
//!    keyname once) and every module's providers are registered, then its `on_init` hook runs.
//! 2. **ServiceTagsRegistered**: registrations handed to the [`KernelBuilder`] are installed,
//!    except those scoped to a module that was never instantiated.
//! 3. **ConfigurationLoaded**: every module's configuration definitions are registered, then
//!    all values are resolved at once.
//! 4. **AfterInitRun**: the router is built from the modules' controller declarations and
//!    every module's `after_init` hook runs, in initialization order.
//!
//! Once initialized, [`Kernel::handle_request`] always yields a [`Response`] and
//! [`Kernel::handle_raw_event`] never lets one event's failure affect another.
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use futures_util::{FutureExt, future::join_all};
use serde_json::Value;
use tracing::Instrument;

use crate::{
    config::manager::{ConfigurationManager, ConfigurationValues},
    core::{
        container::{Container, Provider, Scope, TaggedRegistration},
        error::{InterceptionExecutionError, InterceptionStage, KernelError, KernelResult},
        events::{
            Event, EventBatchReport, EventOutcome, ListenerEventDispatcher,
            ParserEventTransformer,
        },
        http::{Request, Response},
        module::{Module, resolve_initialization_order},
        resolvers::ResolverChain,
        router::Router,
        security::{AnonymousAuthenticator, GuardAuthorizer},
        telemetry::{
            EVENT_EXECUTION_SPAN, KERNEL_INITIALIZATION_SPAN, REQUEST_EXECUTION_SPAN, Span,
            Trace, TracingManager,
        },
    },
    ports::events::{EventDispatcher, EventTransformer},
    tracing_setup::{create_event_span, create_request_span},
};

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Lifecycle of a [`Kernel`]. Variants are ordered: each state implies all earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KernelState {
    Uninitialized,
    ModulesInitialized,
    ServiceTagsRegistered,
    ConfigurationLoaded,
    AfterInitRun,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KernelState::Uninitialized => "uninitialized",
            KernelState::ModulesInitialized => "modules initialized",
            KernelState::ServiceTagsRegistered => "service tags registered",
            KernelState::ConfigurationLoaded => "configuration loaded",
            KernelState::AfterInitRun => "after init run",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KernelOptions {
    /// Deadline for routing and handling one request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

/// Collects the registrations and options a [`Kernel`] starts from.
#[derive(Default)]
pub struct KernelBuilder {
    registrations: Vec<TaggedRegistration>,
    options: KernelOptions,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration installed during the service-tag phase.
    pub fn register(mut self, registration: impl Into<TaggedRegistration>) -> Self {
        self.registrations.push(registration.into());
        self
    }

    /// Add an unconditional provider.
    pub fn provider(self, provider: Provider) -> Self {
        self.register(TaggedRegistration::new(provider))
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = Some(timeout);
        self
    }

    pub fn options(mut self, options: KernelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Kernel {
        Kernel {
            state: KernelState::Uninitialized,
            options: self.options,
            pending: Container::new(),
            registrations: self.registrations,
            modules: Vec::new(),
            runtime: None,
            initialization_trace: None,
        }
    }
}

/// Everything the serving phase reads. Built once, never mutated.
struct Runtime {
    container: Arc<Container>,
    router: Router,
    event_transformer: Arc<dyn EventTransformer>,
    event_dispatcher: Arc<dyn EventDispatcher>,
}

pub struct Kernel {
    state: KernelState,
    options: KernelOptions,
    /// Filled during initialization, then frozen into the runtime.
    pending: Container,
    registrations: Vec<TaggedRegistration>,
    modules: Vec<Arc<dyn Module>>,
    runtime: Option<Runtime>,
    initialization_trace: Option<Trace>,
}

impl Default for Kernel {
    fn default() -> Self {
        KernelBuilder::new().build()
    }
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    /// Keynames of the instantiated modules, in initialization order.
    pub fn module_keynames(&self) -> Vec<&str> {
        self.modules.iter().map(|module| module.keyname()).collect()
    }

    /// The frozen container, once initialization completed.
    pub fn container(&self) -> Option<&Arc<Container>> {
        self.runtime.as_ref().map(|runtime| &runtime.container)
    }

    pub fn router(&self) -> Option<&Router> {
        self.runtime.as_ref().map(|runtime| &runtime.router)
    }

    pub fn configuration(&self) -> Option<&ConfigurationValues> {
        self.container().map(|container| container.configuration())
    }

    /// Trace recorded around the last initialization attempt.
    ///
    /// Tracers are themselves provided by modules, so they only exist once initialization
    /// has finished. The initialization span is timed while `init` runs and then replayed
    /// to every tracer after the fact: tracers never observe it open. Its `started_at`
    /// therefore precedes the enclosing trace's.
    pub fn initialization_trace(&self) -> Option<&Trace> {
        self.initialization_trace.as_ref()
    }

    /// Initialize the kernel from its root module and explicit configuration values.
    pub async fn init(
        &mut self,
        root: Arc<dyn Module>,
        configuration: HashMap<String, Value>,
    ) -> KernelResult<()> {
        if self.state != KernelState::Uninitialized {
            return Err(KernelError::KernelInitialization(format!(
                "kernel already initialized (state: {})",
                self.state
            )));
        }

        let span = Span::new(KERNEL_INITIALIZATION_SPAN, uuid::Uuid::nil(), None);
        let result = self
            .initialize(root, configuration)
            .instrument(tracing::info_span!("kernel_initialization"))
            .await;

        // Replay the span, now that module-provided tracers are known.
        let tracers = match &self.runtime {
            Some(runtime) => runtime.container.tracers().to_vec(),
            None => self.pending.tracers().to_vec(),
        };
        let mut manager = TracingManager::new(tracers);
        manager.start_tracing(KERNEL_INITIALIZATION_SPAN);
        let span_id = manager.add_span(span);
        manager.end_span(span_id);
        self.initialization_trace = manager.end_trace();

        match &result {
            Ok(()) => tracing::info!(
                modules = self.modules.len(),
                routes = self.router().map(Router::route_count).unwrap_or_default(),
                "Kernel initialized"
            ),
            Err(e) => tracing::error!(state = %self.state, "Kernel initialization failed: {}", e),
        }
        result
    }

    async fn initialize(
        &mut self,
        root: Arc<dyn Module>,
        configuration: HashMap<String, Value>,
    ) -> KernelResult<()> {
        self.initialize_modules(root).await?;
        self.state = KernelState::ModulesInitialized;

        self.register_service_tags()?;
        self.state = KernelState::ServiceTagsRegistered;

        self.load_configuration(&configuration)?;
        self.state = KernelState::ConfigurationLoaded;

        let runtime = self.build_runtime()?;
        for module in &self.modules {
            tracing::debug!("Running after_init for module '{}'", module.keyname());
            module.after_init(&runtime.container).await?;
        }
        self.runtime = Some(runtime);
        self.state = KernelState::AfterInitRun;
        Ok(())
    }

    async fn initialize_modules(&mut self, root: Arc<dyn Module>) -> KernelResult<()> {
        for module in resolve_initialization_order(root)? {
            tracing::debug!("Initializing module '{}'", module.keyname());
            for provider in module.providers() {
                self.pending.register(provider)?;
            }
            module.on_init(&mut self.pending).await?;
            self.modules.push(module);
        }
        Ok(())
    }

    fn register_service_tags(&mut self) -> KernelResult<()> {
        let instantiated: HashSet<&str> = self.modules.iter().map(|m| m.keyname()).collect();

        for registration in self.registrations.drain(..) {
            if let Some(module) = &registration.module_scope {
                if !instantiated.contains(module.as_str()) {
                    tracing::debug!(
                        "Skipping {}: module '{}' is not instantiated",
                        registration.provider.describe(),
                        module
                    );
                    continue;
                }
            }
            self.pending.register(registration.provider)?;
        }
        Ok(())
    }

    fn load_configuration(&mut self, provided: &HashMap<String, Value>) -> KernelResult<()> {
        let mut manager = ConfigurationManager::new();
        for module in &self.modules {
            for definition in module.configuration_definitions() {
                manager.register(definition)?;
            }
        }

        let values = manager.load(provided)?;
        tracing::debug!("Loaded {} configuration values", values.len());
        self.pending.set_configuration(values);
        Ok(())
    }

    fn build_runtime(&mut self) -> KernelResult<Runtime> {
        let container = &self.pending;

        let mut resolvers = ResolverChain::with_defaults();
        for resolver in container.parameter_resolvers() {
            resolvers.push(resolver.clone());
        }

        let mut router = Router::new(
            resolvers,
            container
                .authenticator()
                .cloned()
                .unwrap_or_else(|| Arc::new(AnonymousAuthenticator)),
            container
                .authorizer()
                .cloned()
                .unwrap_or_else(|| Arc::new(GuardAuthorizer)),
        );

        for module in &self.modules {
            for controller in module.controllers() {
                if !container.has_controller(&controller.token) {
                    return Err(KernelError::ProviderRegistration {
                        provider: format!("controller '{}'", controller.token),
                        reason: format!(
                            "declared by module '{}' but no controller provider is registered",
                            module.keyname()
                        ),
                    });
                }
                for (path, method, route) in controller.build_routes() {
                    router.register(&path, method, route)?;
                }
            }
        }

        let event_transformer = container.event_transformer().cloned().unwrap_or_else(|| {
            Arc::new(ParserEventTransformer::new(container.event_parsers().to_vec()))
        });
        let event_dispatcher = container.event_dispatcher().cloned().unwrap_or_else(|| {
            Arc::new(ListenerEventDispatcher::new(
                container.event_listeners().to_vec(),
            ))
        });

        Ok(Runtime {
            container: Arc::new(std::mem::take(&mut self.pending)),
            router,
            event_transformer,
            event_dispatcher,
        })
    }

    fn runtime(&self) -> KernelResult<&Runtime> {
        self.runtime.as_ref().ok_or_else(|| {
            KernelError::KernelInitialization(format!(
                "router is not available (state: {})",
                self.state
            ))
        })
    }

    /// Run one request through the full pipeline. Never fails: every error is converted.
    pub async fn handle_request(&self, request: Request) -> Response {
        let path = request.path();
        let request_span = create_request_span(
            request.method.as_str(),
            &path,
            request.header(REQUEST_ID_HEADER).unwrap_or_default(),
        );

        async move {
            let started = std::time::Instant::now();
            let response = match self.runtime() {
                Ok(runtime) => self.process_request(runtime, request).await,
                Err(e) => {
                    tracing::error!("Request received before initialization: {}", e);
                    e.to_response()
                }
            };

            let current = tracing::Span::current();
            current.record("http.status_code", response.status.as_u16());
            current.record("duration_ms", started.elapsed().as_millis() as u64);
            response
        }
        .instrument(request_span)
        .await
    }

    async fn process_request(&self, runtime: &Runtime, request: Request) -> Response {
        let mut tracing_manager = TracingManager::new(runtime.container.tracers().to_vec());
        tracing_manager.start_tracing(REQUEST_EXECUTION_SPAN);
        let span_id = tracing_manager.start_span(REQUEST_EXECUTION_SPAN, None);

        let scope = runtime.container.create_scope();
        let original = request.clone();

        let (request, outcome) = match self.intercept_request(runtime, request).await {
            Ok(request) => {
                if let Some(request_id) = request.header(REQUEST_ID_HEADER) {
                    tracing::Span::current().record("request.id", request_id);
                }
                let outcome = self.route(runtime, &request, &scope).await;
                (request, outcome)
            }
            Err(e) => (original, Err(e)),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(error) => self.convert_error(runtime, &error, &request).await,
        };

        let response = match self.intercept_response(runtime, response, &request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Response interception failed: {}", e);
                e.to_response()
            }
        };

        tracing_manager.end_span(span_id);
        tracing_manager.end_trace();
        response
    }

    async fn route(
        &self,
        runtime: &Runtime,
        request: &Request,
        scope: &Scope,
    ) -> KernelResult<Response> {
        let execution = runtime.router.execute(request, scope);
        match self.options.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, execution)
                .await
                .map_err(|_| KernelError::Timeout(deadline))?,
            None => execution.await,
        }
    }

    /// Build the response for a failed request through the error-response chain.
    ///
    /// If the chain itself fails, the error's default response is used.
    async fn convert_error(
        &self,
        runtime: &Runtime,
        error: &KernelError,
        request: &Request,
    ) -> Response {
        if error.status().is_server_error() {
            tracing::error!(error.kind = error.kind(), "Request failed: {}", error);
        } else {
            tracing::debug!(error.kind = error.kind(), "Request failed: {}", error);
        }

        match self.intercept_error(runtime, error, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error response interception failed: {}", e);
                error.to_response()
            }
        }
    }

    async fn intercept_request(
        &self,
        runtime: &Runtime,
        mut request: Request,
    ) -> KernelResult<Request> {
        for interceptor in runtime.container.request_interceptors() {
            let subject = describe_request(&request);
            request = interceptor
                .intercept_request(request)
                .await
                .map_err(|e| {
                    InterceptionExecutionError::new(
                        InterceptionStage::Request,
                        interceptor.name(),
                        subject,
                        e,
                    )
                })?;
        }
        Ok(request)
    }

    async fn intercept_response(
        &self,
        runtime: &Runtime,
        mut response: Response,
        request: &Request,
    ) -> KernelResult<Response> {
        for interceptor in runtime.container.response_interceptors() {
            response = interceptor
                .intercept_response(response, request)
                .await
                .map_err(|e| {
                    InterceptionExecutionError::new(
                        InterceptionStage::Response,
                        interceptor.name(),
                        describe_request(request),
                        e,
                    )
                })?;
        }
        Ok(response)
    }

    async fn intercept_error(
        &self,
        runtime: &Runtime,
        error: &KernelError,
        request: &Request,
    ) -> KernelResult<Response> {
        let mut response = error.to_response();
        for interceptor in runtime.container.error_response_interceptors() {
            response = interceptor
                .intercept_error(error, request, response)
                .await
                .map_err(|e| {
                    InterceptionExecutionError::new(
                        InterceptionStage::ErrorResponse,
                        interceptor.name(),
                        format!("{} ({})", describe_request(request), error.kind()),
                        e,
                    )
                })?;
        }
        Ok(response)
    }

    /// Whether the configured event transformer recognizes `raw_event`.
    pub fn is_raw_event_supported(&self, raw_event: &Value) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|runtime| runtime.event_transformer.is_supported(raw_event))
    }

    /// Run one raw input through the event pipeline.
    ///
    /// Raw-event interception and transformation failures are returned. Once events exist,
    /// each runs its own sub-pipeline concurrently with the others; their failures are only
    /// recorded in the returned report.
    pub async fn handle_raw_event(&self, raw_event: Value) -> KernelResult<EventBatchReport> {
        let runtime = self.runtime()?;

        let mut tracing_manager = TracingManager::new(runtime.container.tracers().to_vec());
        tracing_manager.start_tracing(EVENT_EXECUTION_SPAN);
        let span_id = tracing_manager.start_span(EVENT_EXECUTION_SPAN, None);

        let result = self
            .process_raw_event(runtime, raw_event)
            .instrument(create_event_span())
            .await;

        tracing_manager.end_span(span_id);
        tracing_manager.end_trace();
        result
    }

    async fn process_raw_event(
        &self,
        runtime: &Runtime,
        raw_event: Value,
    ) -> KernelResult<EventBatchReport> {
        let raw_event = self.intercept_raw_event(runtime, raw_event).await?;
        let events = runtime.event_transformer.transform(raw_event)?;

        let current = tracing::Span::current();
        current.record("event.count", events.len());

        let outcomes = join_all(
            events
                .into_iter()
                .map(|event| self.process_event(runtime, event)),
        )
        .await;

        let report = EventBatchReport { outcomes };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Raw event handled"
        );
        Ok(report)
    }

    async fn process_event(&self, runtime: &Runtime, event: Event) -> EventOutcome {
        let scope = runtime.container.create_scope();
        let span = tracing::info_span!(
            "event",
            event.id = %event.id,
            event.kind = %event.event_type
        );

        async {
            let pipeline = async {
                match self.intercept_event(runtime, event.clone()).await {
                    Ok(intercepted) => {
                        runtime.event_dispatcher.dispatch(&intercepted, &scope).await
                    }
                    Err(e) => Err(e),
                }
            };

            // A panicking listener or interceptor only fails its own event.
            let result = match AssertUnwindSafe(pipeline).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(KernelError::Other(eyre::eyre!(
                    "event pipeline panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };

            match result {
                Ok(()) => EventOutcome::succeeded(&event),
                Err(e) => {
                    tracing::error!("Event handling failed: {}", e);
                    EventOutcome::failed(&event, &e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn intercept_raw_event(
        &self,
        runtime: &Runtime,
        mut raw_event: Value,
    ) -> KernelResult<Value> {
        for interceptor in runtime.container.raw_event_interceptors() {
            raw_event = interceptor
                .intercept_raw_event(raw_event)
                .await
                .map_err(|e| {
                    InterceptionExecutionError::new(
                        InterceptionStage::RawEvent,
                        interceptor.name(),
                        "raw event",
                        e,
                    )
                })?;
        }
        Ok(raw_event)
    }

    async fn intercept_event(&self, runtime: &Runtime, mut event: Event) -> KernelResult<Event> {
        for interceptor in runtime.container.event_interceptors() {
            let subject = format!("event '{}' ({})", event.event_type, event.id);
            event = interceptor.intercept_event(event).await.map_err(|e| {
                InterceptionExecutionError::new(
                    InterceptionStage::Event,
                    interceptor.name(),
                    subject,
                    e,
                )
            })?;
        }
        Ok(event)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn describe_request(request: &Request) -> String {
    format!("request {} {}", request.method, request.path())
}
