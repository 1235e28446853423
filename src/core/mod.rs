pub mod container;
pub mod error;
pub mod events;
pub mod http;
pub mod kernel;
pub mod module;
pub mod resolvers;
pub mod route;
pub mod router;
pub mod security;
pub mod telemetry;
pub mod trie;

pub use container::{Container, Provider, Scope, TaggedRegistration};
pub use error::{
    HttpError, InterceptionExecutionError, InterceptionStage, KernelError, KernelResult,
};
pub use events::{Event, EventBatchReport, EventOutcome};
pub use http::{Identity, Outcome, Request, Response};
pub use kernel::{Kernel, KernelBuilder, KernelOptions, KernelState};
pub use module::Module;
pub use route::{ArgumentDescriptor, ControllerDefinition, Route, RouteDefinition, RouteMetadata};
pub use router::Router;
