//! Stock interceptors registered by [`CoreModule`](crate::modules::CoreModule).
use async_trait::async_trait;

use crate::{
    core::{
        error::{KernelError, KernelResult},
        http::{Request, Response},
        kernel::REQUEST_ID_HEADER,
    },
    ports::interceptor::{ErrorResponseInterceptor, RequestInterceptor, ResponseInterceptor},
};

/// Log each inbound request, each outbound response and each converted error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggingInterceptor;

#[async_trait]
impl RequestInterceptor for RequestLoggingInterceptor {
    fn name(&self) -> &str {
        "request-logging"
    }

    async fn intercept_request(&self, request: Request) -> KernelResult<Request> {
        tracing::info!(
            http.method = %request.method,
            http.path = %request.path(),
            "Started processing request"
        );
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for RequestLoggingInterceptor {
    fn name(&self) -> &str {
        "request-logging"
    }

    async fn intercept_response(
        &self,
        response: Response,
        request: &Request,
    ) -> KernelResult<Response> {
        tracing::info!(
            http.method = %request.method,
            http.path = %request.path(),
            http.status_code = response.status.as_u16(),
            "Completed request"
        );
        Ok(response)
    }
}

#[async_trait]
impl ErrorResponseInterceptor for RequestLoggingInterceptor {
    fn name(&self) -> &str {
        "request-logging"
    }

    async fn intercept_error(
        &self,
        error: &KernelError,
        request: &Request,
        response: Response,
    ) -> KernelResult<Response> {
        tracing::error!(
            error.kind = error.kind(),
            http.method = %request.method,
            http.path = %request.path(),
            http.status_code = response.status.as_u16(),
            "Request converted to error response: {}",
            error
        );
        Ok(response)
    }
}

/// Give every request an `x-request-id` and echo it on the response.
///
/// An id supplied by the caller is kept as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdInterceptor;

#[async_trait]
impl RequestInterceptor for RequestIdInterceptor {
    fn name(&self) -> &str {
        "request-id"
    }

    async fn intercept_request(&self, request: Request) -> KernelResult<Request> {
        if request.header(REQUEST_ID_HEADER).is_some() {
            return Ok(request);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        Ok(request.with_header(REQUEST_ID_HEADER, &request_id))
    }
}

#[async_trait]
impl ResponseInterceptor for RequestIdInterceptor {
    fn name(&self) -> &str {
        "request-id"
    }

    async fn intercept_response(
        &self,
        response: Response,
        request: &Request,
    ) -> KernelResult<Response> {
        match request.header(REQUEST_ID_HEADER) {
            Some(request_id) if response.header(REQUEST_ID_HEADER).is_none() => {
                Ok(response.with_header(REQUEST_ID_HEADER, request_id))
            }
            _ => Ok(response),
        }
    }
}
