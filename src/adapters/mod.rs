//! Adapters: stock implementations of the kernel's ports and the HTTP front end.
pub mod controller;
pub mod http_handler;
pub mod interceptors;
pub mod log_tracer;

pub use controller::HandlerController;
pub use http_handler::HttpHandler;
pub use interceptors::{RequestIdInterceptor, RequestLoggingInterceptor};
pub use log_tracer::LogTracer;
