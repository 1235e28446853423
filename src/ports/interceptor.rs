//! Interceptor ports, one closed trait per subject.
//!
//! Each chain runs its interceptors sequentially in registration order; every interceptor
//! sees the previous one's output. Returning an error aborts the chain with an
//! [`InterceptionExecutionError`](crate::core::error::InterceptionExecutionError).
use async_trait::async_trait;
use serde_json::Value;

use crate::core::{
    error::{KernelError, KernelResult},
    events::Event,
    http::{Request, Response},
};

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Name reported when this interceptor fails.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn intercept_request(&self, request: Request) -> KernelResult<Request>;
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn intercept_response(
        &self,
        response: Response,
        request: &Request,
    ) -> KernelResult<Response>;
}

/// Builds (or refines) the response for a failed request.
#[async_trait]
pub trait ErrorResponseInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn intercept_error(
        &self,
        error: &KernelError,
        request: &Request,
        response: Response,
    ) -> KernelResult<Response>;
}

/// Transforms the opaque raw input before it is turned into typed events.
#[async_trait]
pub trait RawEventInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn intercept_raw_event(&self, raw_event: Value) -> KernelResult<Value>;
}

#[async_trait]
pub trait EventInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn intercept_event(&self, event: Event) -> KernelResult<Event>;
}
