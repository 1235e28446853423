//! Ports: the narrow interfaces through which the kernel talks to its collaborators.
//!
//! Implementations live in [`crate::adapters`], in the application, or (for the defaults
//! the kernel cannot run without) in [`crate::core`].
pub mod controller;
pub mod events;
pub mod interceptor;
pub mod security;
pub mod tracer;

pub use controller::{Controller, ControllerFactory};
pub use events::{EventDispatcher, EventListener, EventParser, EventTransformer};
pub use interceptor::{
    ErrorResponseInterceptor, EventInterceptor, RawEventInterceptor, RequestInterceptor,
    ResponseInterceptor,
};
pub use security::{Authenticator, Authorizer, Guard};
pub use tracer::Tracer;
