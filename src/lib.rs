//! Keel - a request-processing kernel.
//!
//! Keel accepts an HTTP-shaped request (or a raw asynchronous event), resolves it to a
//! handler, runs that handler inside chains of cross-cutting interceptors and produces a
//! normalized response. It follows a **hexagonal architecture**: the routing trie, the
//! pipelines and the module lifecycle live in `core`, the collaborators they talk to are
//! traits in `ports`, and stock implementations of those traits live in `adapters`.
//!
//! # Features
//! - Trie routing with static segments preferred over `:param` captures
//! - Request, response, error, raw-event and event interceptor chains
//! - Declarative modules with imports, providers, configuration and lifecycle hooks
//! - Guard-based authorization driven by route metadata
//! - Concurrent, isolated event fan-out with a per-event outcome report
//! - Kernel traces and spans that close exactly once, plus `tracing` spans per request
//! - An `axum` adapter and a small `keel` binary with graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::{collections::HashMap, sync::Arc};
//!
//! use keel::{Kernel, Request, modules::SystemModule};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let mut kernel = Kernel::builder().build();
//! kernel.init(Arc::new(SystemModule::new()), HashMap::new()).await?;
//!
//! let response = kernel
//!     .handle_request(Request::new(http::Method::GET, "/health"))
//!     .await;
//! assert_eq!(response.status, http::StatusCode::OK);
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Kernel operations return [`KernelResult`], whose error kinds map onto HTTP statuses.
//! `handle_request` never fails: every error is converted into a [`Response`]. Application
//! plumbing (configuration loading, the binary) uses `eyre::Result` with `WrapErr` context.
//!
//! # Concurrency & Data Structures
//! Every request and every event gets its own [`Scope`]. A scope caches the controller
//! instances it builds in an `scc::HashMap`, so a controller is constructed at most once
//! per call and never shared between calls. Events of one batch run concurrently, each in
//! its own scope; a failing or panicking event only affects its own outcome.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;
pub mod modules;

pub use crate::{
    adapters::{HandlerController, HttpHandler},
    core::{
        ArgumentDescriptor, Container, ControllerDefinition, Event, EventBatchReport,
        HttpError, Identity, Kernel, KernelBuilder, KernelError, KernelResult, KernelState,
        Module, Outcome, Provider, Request, Response, RouteDefinition, Scope,
    },
    utils::GracefulShutdown,
};
