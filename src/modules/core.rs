use async_trait::async_trait;

use crate::{
    adapters::{LogTracer, RequestIdInterceptor, RequestLoggingInterceptor},
    core::{Module, Provider},
};

pub const CORE_MODULE_KEYNAME: &str = "keel.core";

/// Request ids, request logging and span logging.
///
/// Request ids are assigned before the logging interceptor runs, so every log line of a
/// request can carry its id.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreModule;

#[async_trait]
impl Module for CoreModule {
    fn keyname(&self) -> &str {
        CORE_MODULE_KEYNAME
    }

    fn providers(&self) -> Vec<Provider> {
        vec![
            Provider::request_interceptor(RequestIdInterceptor),
            Provider::request_interceptor(RequestLoggingInterceptor),
            Provider::response_interceptor(RequestLoggingInterceptor),
            Provider::response_interceptor(RequestIdInterceptor),
            Provider::error_response_interceptor(RequestLoggingInterceptor),
            Provider::tracer(LogTracer),
        ]
    }
}
